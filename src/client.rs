//! Inference client boundary
//!
//! The engine never talks to a serving endpoint directly. Everything it
//! needs from the wire layer is expressed here as two traits: a
//! [`ClientFactory`] that opens per-request contexts, and an
//! [`InferContext`] through which inputs are bound and a request is
//! executed. Concrete transports (HTTP, gRPC, in-process) implement these
//! traits outside this crate; [`crate::testing`] ships a scriptable mock.
//!
//! ## Contract
//!
//! - Declared inputs/outputs, model name, and maximum batch size are fixed
//!   for the lifetime of a context.
//! - A maximum batch size of 0 means the model does not support batching.
//! - `run` is synchronous from the worker's perspective; bounded shutdown
//!   must be enforced by the transport's own timeout.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Element kind of a model input
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ElementKind {
    /// Fixed-width numeric elements of the given byte size
    Numeric {
        /// Size of one element in bytes
        elem_size: usize,
    },
    /// Variable-length UTF-8 string elements
    String,
}

/// Descriptor for one declared model input
///
/// `dims` is the shape declared by the model, where `-1` marks a wildcard
/// dimension whose extent is not fixed. `shape` is the concrete shape
/// applied at runtime via [`InferContext::set_shape`]; it stays empty until
/// a wildcard is resolved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputSpec {
    name: String,
    kind: ElementKind,
    dims: Vec<i64>,
    shape: Vec<i64>,
}

impl InputSpec {
    /// Create a numeric input descriptor
    #[must_use]
    pub fn numeric(name: impl Into<String>, dims: Vec<i64>, elem_size: usize) -> Self {
        Self {
            name: name.into(),
            kind: ElementKind::Numeric { elem_size },
            dims,
            shape: Vec::new(),
        }
    }

    /// Create a string input descriptor
    #[must_use]
    pub fn string(name: impl Into<String>, dims: Vec<i64>) -> Self {
        Self {
            name: name.into(),
            kind: ElementKind::String,
            dims,
            shape: Vec::new(),
        }
    }

    /// Input name, unique within a model
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Element kind
    #[must_use]
    pub fn kind(&self) -> ElementKind {
        self.kind
    }

    /// Declared dimensions, `-1` for wildcards
    #[must_use]
    pub fn dims(&self) -> &[i64] {
        &self.dims
    }

    /// Concrete shape applied at runtime, empty if none was set
    #[must_use]
    pub fn shape(&self) -> &[i64] {
        &self.shape
    }

    /// Whether the declared shape contains a wildcard dimension
    #[must_use]
    pub fn is_variable(&self) -> bool {
        self.dims.contains(&-1)
    }

    /// Apply a concrete shape, resolving wildcard dimensions
    pub fn set_shape(&mut self, shape: &[i64]) {
        self.shape = shape.to_vec();
    }

    /// Dimensions to use for sizing: the applied shape if set, else the
    /// declared dims
    #[must_use]
    pub fn resolved_dims(&self) -> &[i64] {
        if self.shape.is_empty() {
            &self.dims
        } else {
            &self.shape
        }
    }

    /// Number of elements in one batch-1 tensor, `None` while a wildcard
    /// dimension remains unresolved
    #[must_use]
    pub fn batch1_element_count(&self) -> Option<usize> {
        let mut count: usize = 1;
        for &dim in self.resolved_dims() {
            if dim < 0 {
                return None;
            }
            count *= dim as usize;
        }
        Some(count)
    }

    /// Byte size of one batch-1 tensor for numeric inputs, `None` for string
    /// inputs or while a wildcard dimension remains unresolved
    #[must_use]
    pub fn byte_size(&self) -> Option<usize> {
        match self.kind {
            ElementKind::Numeric { elem_size } => {
                self.batch1_element_count().map(|n| n * elem_size)
            }
            ElementKind::String => None,
        }
    }
}

/// Per-request run options: batch size plus the set of requested outputs
///
/// Constructed once per model and reused across all requests so the hot
/// request loop does not reallocate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunOptions {
    batch_size: usize,
    requested_outputs: Vec<String>,
}

impl RunOptions {
    /// Create run options with the given batch size and output set
    #[must_use]
    pub fn new(batch_size: usize, requested_outputs: Vec<String>) -> Self {
        Self {
            batch_size,
            requested_outputs,
        }
    }

    /// Batch size applied to every request
    #[must_use]
    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Names of the outputs requested from every request
    #[must_use]
    pub fn requested_outputs(&self) -> &[String] {
        &self.requested_outputs
    }
}

/// Timing breakdown reported by the transport for one completed request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RequestTiming {
    /// Time spent serializing and sending the request
    pub send_time: Duration,
    /// Time spent receiving and deserializing the response
    pub receive_time: Duration,
}

/// A per-request handle to a model endpoint
///
/// Input binding state is mutable per request; the declared input/output
/// lists and model metadata are fixed for the context's lifetime.
pub trait InferContext: Send {
    /// Name of the model this context targets
    fn model_name(&self) -> &str;

    /// Maximum batch size supported by the model, 0 if batching is
    /// unsupported
    fn max_batch_size(&self) -> usize;

    /// Declared inputs
    fn inputs(&self) -> &[InputSpec];

    /// Declared output names
    fn outputs(&self) -> &[String];

    /// Apply a concrete shape to a variable-size input
    ///
    /// # Errors
    /// Returns an error if the input name is unknown.
    fn set_shape(&mut self, name: &str, shape: &[i64]) -> Result<()>;

    /// Clear any previously bound data for an input
    ///
    /// # Errors
    /// Returns an error if the input name is unknown.
    fn reset_input(&mut self, name: &str) -> Result<()>;

    /// Bind one batch replica of raw bytes to a numeric input
    ///
    /// # Errors
    /// Returns an error if the input name is unknown or not numeric.
    fn bind_bytes(&mut self, name: &str, data: &[u8]) -> Result<()>;

    /// Bind one batch replica of string values to a string input
    ///
    /// # Errors
    /// Returns an error if the input name is unknown or not a string input.
    fn bind_strings(&mut self, name: &str, values: &[String]) -> Result<()>;

    /// Attach run options to the context
    ///
    /// # Errors
    /// Returns an error if the transport rejects the options.
    fn set_run_options(&mut self, options: &RunOptions) -> Result<()>;

    /// Execute the request synchronously and report its timing breakdown
    ///
    /// # Errors
    /// Returns an error if the request fails at the transport.
    fn run(&mut self) -> Result<RequestTiming>;
}

/// Factory for per-request contexts, shared across worker threads
pub trait ClientFactory: Send + Sync {
    /// Open a fresh context for the configured model
    ///
    /// # Errors
    /// Returns an error if the endpoint is unreachable or the model unknown.
    fn create_context(&self) -> Result<Box<dyn InferContext>>;
}
