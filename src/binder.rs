//! Request input binding
//!
//! [`RequestBinder::prepare`] takes a request context and binds one batch's
//! worth of input data from an [`InputDataStore`] so the request is ready to
//! send. Binding is purely a function of the store and the context's
//! declared inputs and is idempotent per call; the only state a binder
//! carries is the [`RunOptions`] value it constructs on first use and
//! reuses for every subsequent request against the same model.
//!
//! Source selection per input: explicit data loaded from the data directory
//! always wins; otherwise the shared synthetic buffer supplies a bounded
//! prefix of exactly the batch-1 size. An undersized explicit source is a
//! configuration error. An undersized shared buffer is an internal
//! invariant violation, since the sizing pass guaranteed it covers every
//! input.

use crate::client::{ElementKind, InferContext, InputSpec, RunOptions};
use crate::data::InputDataStore;
use crate::error::{CargadorError, Result};

/// Binds per-batch input data into request contexts
#[derive(Debug)]
pub struct RequestBinder {
    batch_size: usize,
    options: Option<RunOptions>,
}

impl RequestBinder {
    /// Create a binder for the given batch size
    #[must_use]
    pub fn new(batch_size: usize) -> Self {
        Self {
            batch_size,
            options: None,
        }
    }

    /// Batch size applied to every prepared request
    #[must_use]
    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Run options constructed on first use, if any
    #[must_use]
    pub fn options(&self) -> Option<&RunOptions> {
        self.options.as_ref()
    }

    /// Validate the context against the store and bind every input
    ///
    /// # Errors
    /// Returns a configuration error if the batch size is incompatible with
    /// the model or an explicit data source has the wrong size, and an
    /// internal invariant error if the shared synthetic buffer is smaller
    /// than a requirement it was sized to cover.
    pub fn prepare(&mut self, ctx: &mut dyn InferContext, store: &InputDataStore) -> Result<()> {
        self.validate_batch_size(ctx)?;

        // Request every declared output; built once and reused so repeated
        // prepare calls on the hot path do not reallocate.
        if self.options.is_none() {
            self.options = Some(RunOptions::new(self.batch_size, ctx.outputs().to_vec()));
        }
        if let Some(options) = &self.options {
            ctx.set_run_options(options)?;
        }

        // Resolve wildcard dims from caller-supplied shapes before sizing.
        let unresolved: Vec<String> = ctx
            .inputs()
            .iter()
            .filter(|spec| spec.shape().is_empty())
            .map(|spec| spec.name().to_string())
            .collect();
        for name in unresolved {
            if let Some(shape) = store.shape_for(&name) {
                ctx.set_shape(&name, shape)?;
            }
        }

        let specs: Vec<InputSpec> = ctx.inputs().to_vec();
        for spec in &specs {
            ctx.reset_input(spec.name())?;
            match spec.kind() {
                ElementKind::Numeric { .. } => self.bind_numeric(ctx, store, spec)?,
                ElementKind::String => self.bind_string(ctx, store, spec)?,
            }
        }

        Ok(())
    }

    fn validate_batch_size(&self, ctx: &dyn InferContext) -> Result<()> {
        let max_batch_size = ctx.max_batch_size();
        // Maximum batch size 0 means the model has no batch dimension and
        // only a single instance can be inferred at a time.
        if max_batch_size == 0 {
            if self.batch_size != 1 {
                return Err(CargadorError::InvalidConfiguration {
                    reason: format!(
                        "expecting batch size 1 for model '{}' which does not support batching",
                        ctx.model_name()
                    ),
                });
            }
        } else if self.batch_size > max_batch_size {
            return Err(CargadorError::InvalidConfiguration {
                reason: format!(
                    "expecting batch size <= {} for model '{}'",
                    max_batch_size,
                    ctx.model_name()
                ),
            });
        }
        Ok(())
    }

    fn bind_numeric(
        &self,
        ctx: &mut dyn InferContext,
        store: &InputDataStore,
        spec: &InputSpec,
    ) -> Result<()> {
        let required = spec.byte_size();

        let data: &[u8] = if let Some(bytes) = store.explicit_bytes(spec.name()) {
            if let Some(required) = required {
                if bytes.len() != required {
                    return Err(CargadorError::InvalidConfiguration {
                        reason: format!(
                            "input '{}' requires {} bytes for each batch, but provided data \
                             has {} bytes",
                            spec.name(),
                            required,
                            bytes.len()
                        ),
                    });
                }
            }
            bytes
        } else if !store.shared_bytes().is_empty() {
            let required = required.ok_or_else(|| CargadorError::InvalidConfiguration {
                reason: format!(
                    "input '{}' has variable-size shape and the shape to be used is not \
                     specified",
                    spec.name()
                ),
            })?;
            let shared = store.shared_bytes();
            if required > shared.len() {
                return Err(CargadorError::InternalInvariant {
                    reason: format!(
                        "input '{}' requires {} bytes for each batch, but generated data \
                         has {} bytes",
                        spec.name(),
                        required,
                        shared.len()
                    ),
                });
            }
            &shared[..required]
        } else {
            return Err(CargadorError::InvalidConfiguration {
                reason: format!("unable to find data for input '{}'", spec.name()),
            });
        };

        for _ in 0..self.batch_size {
            ctx.bind_bytes(spec.name(), data)?;
        }
        Ok(())
    }

    fn bind_string(
        &self,
        ctx: &mut dyn InferContext,
        store: &InputDataStore,
        spec: &InputSpec,
    ) -> Result<()> {
        let required = spec.batch1_element_count();

        let values: &[String] = if let Some(strings) = store.explicit_strings(spec.name()) {
            if let Some(required) = required {
                if strings.len() != required {
                    return Err(CargadorError::InvalidConfiguration {
                        reason: format!(
                            "input '{}' requires {} strings for each batch, but provided \
                             data has {} strings",
                            spec.name(),
                            required,
                            strings.len()
                        ),
                    });
                }
            }
            strings
        } else if !store.shared_strings().is_empty() {
            let required = required.ok_or_else(|| CargadorError::InvalidConfiguration {
                reason: format!(
                    "input '{}' has variable-size shape and the shape to be used is not \
                     specified",
                    spec.name()
                ),
            })?;
            let shared = store.shared_strings();
            if required > shared.len() {
                return Err(CargadorError::InternalInvariant {
                    reason: format!(
                        "input '{}' requires {} strings for each batch, but generated data \
                         has {} strings",
                        spec.name(),
                        required,
                        shared.len()
                    ),
                });
            }
            // Bounded view: the shared buffer may be larger than this input
            // needs and must not leak past the exact count.
            &shared[..required]
        } else {
            return Err(CargadorError::InvalidConfiguration {
                reason: format!("unable to find data for input '{}'", spec.name()),
            });
        };

        for _ in 0..self.batch_size {
            ctx.bind_strings(spec.name(), values)?;
        }
        Ok(())
    }
}
