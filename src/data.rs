//! Input data synthesis and storage
//!
//! [`InputDataStore`] holds everything workers read when binding request
//! inputs: caller-supplied shapes for wildcard dimensions, per-input data
//! loaded from a data directory, and two shared synthetic buffers sized in a
//! single validation pass to the largest batch-1 requirement across all
//! inputs. The store is built once before any worker thread starts and is
//! read-only afterwards, so concurrent readers need no locking.
//!
//! ## Sizing pass
//!
//! ```text
//! for each declared input:
//!   1. Reject a caller shape incompatible with the declared dims
//!   2. Apply the caller shape to resolve wildcard dims
//!   3. Data directory supplied -> load that input's file verbatim
//!   4. Otherwise accumulate the batch-1 byte/string requirement maximum
//! allocate shared buffers to the accumulated maxima
//! ```

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::client::{ClientFactory, ElementKind, InputSpec};
use crate::error::{CargadorError, Result};

/// Generation parameters for synthetic input data
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyntheticDataOptions {
    /// Length of generated strings when no fixed string content is given
    pub string_length: usize,
    /// Fixed string content repeated into every slot of the string buffer
    pub string_data: Option<String>,
    /// Zero-fill the shared byte buffer instead of randomizing it
    pub zero_input: bool,
    /// Directory of pre-recorded per-input data files, one file per input
    /// named exactly as the input
    pub data_directory: Option<PathBuf>,
}

impl Default for SyntheticDataOptions {
    fn default() -> Self {
        Self {
            string_length: 128,
            string_data: None,
            zero_input: false,
            data_directory: None,
        }
    }
}

impl SyntheticDataOptions {
    /// Set the generated string length
    #[must_use]
    pub fn with_string_length(mut self, string_length: usize) -> Self {
        self.string_length = string_length;
        self
    }

    /// Use a fixed string for every string-buffer slot
    #[must_use]
    pub fn with_string_data(mut self, string_data: impl Into<String>) -> Self {
        self.string_data = Some(string_data.into());
        self
    }

    /// Zero-fill the shared byte buffer
    #[must_use]
    pub fn with_zero_input(mut self, zero_input: bool) -> Self {
        self.zero_input = zero_input;
        self
    }

    /// Load per-input data from a directory instead of synthesizing
    #[must_use]
    pub fn with_data_directory(mut self, dir: impl Into<PathBuf>) -> Self {
        self.data_directory = Some(dir.into());
        self
    }
}

/// Process-lifetime store of input values shared read-only by all workers
#[derive(Debug, Default)]
pub struct InputDataStore {
    input_shapes: HashMap<String, Vec<i64>>,
    input_data: HashMap<String, Vec<u8>>,
    input_string_data: HashMap<String, Vec<String>>,
    input_buf: Vec<u8>,
    string_buf: Vec<String>,
}

impl InputDataStore {
    /// Build and validate the store against the model's declared inputs
    ///
    /// Opens a throwaway context to enumerate inputs, verifies every
    /// caller-supplied shape, loads per-input files when a data directory is
    /// configured, and otherwise sizes the two shared synthetic buffers to
    /// the maximum batch-1 requirement. This is the only setup-time failure
    /// point; it runs to completion before any worker thread is spawned.
    ///
    /// # Errors
    /// Returns a configuration error for an incompatible caller shape or a
    /// wildcard dimension that cannot be resolved, and an I/O error for an
    /// unreadable data file.
    pub fn build(
        factory: &dyn ClientFactory,
        input_shapes: HashMap<String, Vec<i64>>,
        options: &SyntheticDataOptions,
    ) -> Result<Self> {
        let mut ctx = factory.create_context()?;

        // Validate caller shapes, then resolve wildcard dims on the
        // throwaway context so sizing below sees concrete extents.
        let specs: Vec<InputSpec> = ctx.inputs().to_vec();
        for spec in &specs {
            if let Some(supplied) = input_shapes.get(spec.name()) {
                if !dims_compatible(spec.dims(), supplied) {
                    return Err(CargadorError::InvalidConfiguration {
                        reason: format!(
                            "input '{}' expects shape {} and user supplied shape {}",
                            spec.name(),
                            dims_to_string(spec.dims()),
                            dims_to_string(supplied)
                        ),
                    });
                }
            }
            if spec.shape().is_empty() {
                if let Some(supplied) = input_shapes.get(spec.name()) {
                    ctx.set_shape(spec.name(), supplied)?;
                }
            }
        }

        let mut input_data: HashMap<String, Vec<u8>> = HashMap::new();
        let mut input_string_data: HashMap<String, Vec<String>> = HashMap::new();
        let mut max_input_byte_size = 0usize;
        let mut max_batch1_num_strings = 0usize;
        let mut needs_string_input = false;

        let specs: Vec<InputSpec> = ctx.inputs().to_vec();
        for spec in &specs {
            if let Some(dir) = &options.data_directory {
                load_input_file(spec, dir, &mut input_data, &mut input_string_data)?;
                continue;
            }

            let count = spec.batch1_element_count().ok_or_else(|| {
                CargadorError::InvalidConfiguration {
                    reason: format!(
                        "input '{}' has variable-size shape and the shape to be used is \
                         not specified, unable to create input values for model '{}'",
                        spec.name(),
                        ctx.model_name()
                    ),
                }
            })?;

            match spec.kind() {
                ElementKind::Numeric { elem_size } => {
                    max_input_byte_size = max_input_byte_size.max(count * elem_size);
                }
                ElementKind::String => {
                    needs_string_input = true;
                    max_batch1_num_strings = max_batch1_num_strings.max(count);
                }
            }
        }

        // One buffer large enough for the largest numeric input, reused for
        // every input value.
        let mut input_buf = vec![0u8; max_input_byte_size];
        if max_input_byte_size > 0 && !options.zero_input {
            rand::thread_rng().fill(&mut input_buf[..]);
        }

        let string_buf = if needs_string_input {
            match &options.string_data {
                Some(fixed) => vec![fixed.clone(); max_batch1_num_strings],
                None => (0..max_batch1_num_strings)
                    .map(|_| random_string(options.string_length))
                    .collect(),
            }
        } else {
            Vec::new()
        };

        Ok(Self {
            input_shapes,
            input_data,
            input_string_data,
            input_buf,
            string_buf,
        })
    }

    /// Caller-supplied concrete shape for an input, if any
    #[must_use]
    pub fn shape_for(&self, name: &str) -> Option<&[i64]> {
        self.input_shapes.get(name).map(Vec::as_slice)
    }

    /// Explicit byte data for an input, if loaded from the data directory
    #[must_use]
    pub fn explicit_bytes(&self, name: &str) -> Option<&[u8]> {
        self.input_data.get(name).map(Vec::as_slice)
    }

    /// Explicit string data for an input, if loaded from the data directory
    #[must_use]
    pub fn explicit_strings(&self, name: &str) -> Option<&[String]> {
        self.input_string_data.get(name).map(Vec::as_slice)
    }

    /// Shared synthetic byte buffer, empty if no numeric input needed it
    #[must_use]
    pub fn shared_bytes(&self) -> &[u8] {
        &self.input_buf
    }

    /// Shared synthetic string buffer, empty if no string input needed it
    #[must_use]
    pub fn shared_strings(&self) -> &[String] {
        &self.string_buf
    }
}

fn load_input_file(
    spec: &InputSpec,
    dir: &Path,
    input_data: &mut HashMap<String, Vec<u8>>,
    input_string_data: &mut HashMap<String, Vec<String>>,
) -> Result<()> {
    let path = dir.join(spec.name());
    match spec.kind() {
        ElementKind::Numeric { .. } => {
            let bytes = fs::read(&path).map_err(|source| CargadorError::Io {
                path: path.display().to_string(),
                source,
            })?;
            input_data.insert(spec.name().to_string(), bytes);
        }
        ElementKind::String => {
            let text = fs::read_to_string(&path).map_err(|source| CargadorError::Io {
                path: path.display().to_string(),
                source,
            })?;
            let values = text.lines().map(String::from).collect();
            input_string_data.insert(spec.name().to_string(), values);
        }
    }
    Ok(())
}

/// Wildcard-aware dimension compatibility check
///
/// Shapes are compatible when they have the same rank and every pair of
/// extents either matches exactly or contains a `-1` wildcard.
#[must_use]
pub fn dims_compatible(declared: &[i64], supplied: &[i64]) -> bool {
    declared.len() == supplied.len()
        && declared
            .iter()
            .zip(supplied)
            .all(|(&d, &s)| d == -1 || s == -1 || d == s)
}

/// Render dims as `[d0,d1,...]` for error messages
#[must_use]
pub fn dims_to_string(dims: &[i64]) -> String {
    let rendered: Vec<String> = dims.iter().map(ToString::to_string).collect();
    format!("[{}]", rendered.join(","))
}

fn random_string(length: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(length)
        .map(char::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use proptest::prelude::*;

    use super::*;
    use crate::testing::MockClientFactory;

    // === Shape Compatibility Tests ===

    #[test]
    fn test_dims_compatible_exact_match() {
        assert!(dims_compatible(&[2, 3], &[2, 3]));
    }

    #[test]
    fn test_dims_compatible_wildcard_matches_any_extent() {
        assert!(dims_compatible(&[-1, 3], &[7, 3]));
        assert!(dims_compatible(&[-1, -1], &[1, 1000]));
    }

    #[test]
    fn test_dims_compatible_rejects_fixed_mismatch() {
        assert!(!dims_compatible(&[2, 3], &[2, 4]));
    }

    #[test]
    fn test_dims_compatible_rejects_rank_mismatch() {
        assert!(!dims_compatible(&[2, 3], &[2, 3, 1]));
        assert!(!dims_compatible(&[-1], &[]));
    }

    #[test]
    fn test_dims_to_string_format() {
        assert_eq!(dims_to_string(&[2, -1, 3]), "[2,-1,3]");
        assert_eq!(dims_to_string(&[]), "[]");
    }

    // === Sizing Pass Tests ===

    #[test]
    fn test_byte_buffer_sized_to_largest_numeric_input() {
        // Per-batch requirements of 10 and 20 bytes -> 20-byte buffer.
        let factory = MockClientFactory::new(8)
            .with_numeric_input("small", vec![10], 1)
            .with_numeric_input("large", vec![5], 4);
        let options = SyntheticDataOptions::default().with_zero_input(true);

        let store =
            InputDataStore::build(&factory, HashMap::new(), &options).expect("build store");
        assert_eq!(store.shared_bytes().len(), 20);
        assert!(store.shared_bytes().iter().all(|&b| b == 0));
        assert!(store.shared_strings().is_empty());
    }

    #[test]
    fn test_string_buffer_sized_to_largest_string_input() {
        let factory = MockClientFactory::new(8)
            .with_string_input("a", vec![3])
            .with_string_input("b", vec![7]);
        let options = SyntheticDataOptions::default().with_string_length(16);

        let store =
            InputDataStore::build(&factory, HashMap::new(), &options).expect("build store");
        assert_eq!(store.shared_strings().len(), 7);
        assert!(store.shared_strings().iter().all(|s| s.len() == 16));
    }

    #[test]
    fn test_fixed_string_fills_every_slot() {
        let factory = MockClientFactory::new(8).with_string_input("words", vec![3]);
        let options = SyntheticDataOptions::default().with_string_data("foo");

        let store =
            InputDataStore::build(&factory, HashMap::new(), &options).expect("build store");
        assert_eq!(store.shared_strings(), ["foo", "foo", "foo"]);
    }

    #[test]
    fn test_incompatible_caller_shape_rejected() {
        let factory = MockClientFactory::new(8).with_numeric_input("input0", vec![2, 3], 4);
        let mut shapes = HashMap::new();
        shapes.insert("input0".to_string(), vec![2, 4]);

        let err = InputDataStore::build(&factory, shapes, &SyntheticDataOptions::default())
            .expect_err("shape mismatch must fail");
        assert!(matches!(
            err,
            CargadorError::InvalidConfiguration { .. }
        ));
        assert!(err.to_string().contains("input0"));
    }

    #[test]
    fn test_caller_shape_resolves_wildcard() {
        let factory = MockClientFactory::new(8).with_numeric_input("input0", vec![-1, 4], 4);
        let mut shapes = HashMap::new();
        shapes.insert("input0".to_string(), vec![2, 4]);

        let store = InputDataStore::build(&factory, shapes, &SyntheticDataOptions::default())
            .expect("build store");
        assert_eq!(store.shared_bytes().len(), 2 * 4 * 4);
        assert_eq!(store.shape_for("input0"), Some(&[2, 4][..]));
    }

    #[test]
    fn test_unresolved_wildcard_without_data_fails() {
        let factory = MockClientFactory::new(8).with_numeric_input("input0", vec![-1, 4], 4);

        let err = InputDataStore::build(
            &factory,
            HashMap::new(),
            &SyntheticDataOptions::default(),
        )
        .expect_err("unresolved wildcard must fail");
        assert!(err.to_string().contains("variable-size shape"));
    }

    // === Data Directory Tests ===

    #[test]
    fn test_data_directory_loads_raw_bytes() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut file = std::fs::File::create(dir.path().join("input0")).expect("create");
        file.write_all(&[1, 2, 3, 4]).expect("write");

        let factory = MockClientFactory::new(8).with_numeric_input("input0", vec![4], 1);
        let options = SyntheticDataOptions::default().with_data_directory(dir.path());

        let store =
            InputDataStore::build(&factory, HashMap::new(), &options).expect("build store");
        assert_eq!(store.explicit_bytes("input0"), Some(&[1, 2, 3, 4][..]));
        // Explicit data bypasses synthesis entirely.
        assert!(store.shared_bytes().is_empty());
    }

    #[test]
    fn test_data_directory_loads_newline_delimited_strings() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(dir.path().join("words"), "alpha\nbeta\ngamma\n").expect("write");

        let factory = MockClientFactory::new(8).with_string_input("words", vec![3]);
        let options = SyntheticDataOptions::default().with_data_directory(dir.path());

        let store =
            InputDataStore::build(&factory, HashMap::new(), &options).expect("build store");
        assert_eq!(
            store.explicit_strings("words"),
            Some(&["alpha".to_string(), "beta".to_string(), "gamma".to_string()][..])
        );
    }

    #[test]
    fn test_missing_data_file_is_io_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let factory = MockClientFactory::new(8).with_numeric_input("input0", vec![4], 1);
        let options = SyntheticDataOptions::default().with_data_directory(dir.path());

        let err = InputDataStore::build(&factory, HashMap::new(), &options)
            .expect_err("missing file must fail");
        assert!(matches!(err, CargadorError::Io { .. }));
    }

    // === Property Tests ===

    proptest! {
        #[test]
        fn prop_compatible_when_all_pairs_match_or_wildcard(
            dims in prop::collection::vec(1i64..16, 0..5)
        ) {
            // A shape is always compatible with itself and with all-wildcards.
            prop_assert!(dims_compatible(&dims, &dims));
            let wildcards = vec![-1i64; dims.len()];
            prop_assert!(dims_compatible(&wildcards, &dims));
        }

        #[test]
        fn prop_byte_buffer_covers_every_numeric_input(
            sizes in prop::collection::vec(1usize..64, 1..6)
        ) {
            let mut factory = MockClientFactory::new(8);
            for (i, size) in sizes.iter().enumerate() {
                factory = factory.with_numeric_input(format!("input{i}"), vec![*size as i64], 1);
            }
            let options = SyntheticDataOptions::default().with_zero_input(true);
            let store = InputDataStore::build(&factory, HashMap::new(), &options)
                .expect("build store");
            for size in &sizes {
                prop_assert!(store.shared_bytes().len() >= *size);
            }
        }
    }
}
