//! Test support: a scriptable in-process inference client
//!
//! [`MockClientFactory`] builds [`MockContext`] instances that implement the
//! [`InferContext`] boundary without any transport. Contexts record every
//! binding call for assertions, simulate request latency, and can be
//! scripted to fail so worker-isolation behavior is observable from tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;

use crate::client::{ClientFactory, InferContext, InputSpec, RequestTiming, RunOptions};
use crate::error::{CargadorError, Result};

/// Factory producing scriptable mock contexts
#[derive(Debug)]
pub struct MockClientFactory {
    model_name: String,
    max_batch_size: usize,
    inputs: Vec<InputSpec>,
    outputs: Vec<String>,
    request_latency: Duration,
    failing_context: Option<usize>,
    created: AtomicUsize,
}

impl MockClientFactory {
    /// Create a factory for a model with the given maximum batch size
    #[must_use]
    pub fn new(max_batch_size: usize) -> Self {
        Self {
            model_name: "mock_model".to_string(),
            max_batch_size,
            inputs: Vec::new(),
            outputs: vec!["output0".to_string()],
            request_latency: Duration::ZERO,
            failing_context: None,
            created: AtomicUsize::new(0),
        }
    }

    /// Set the model name reported by contexts
    #[must_use]
    pub fn with_model_name(mut self, name: impl Into<String>) -> Self {
        self.model_name = name.into();
        self
    }

    /// Declare a numeric input
    #[must_use]
    pub fn with_numeric_input(
        mut self,
        name: impl Into<String>,
        dims: Vec<i64>,
        elem_size: usize,
    ) -> Self {
        self.inputs.push(InputSpec::numeric(name, dims, elem_size));
        self
    }

    /// Declare a string input
    #[must_use]
    pub fn with_string_input(mut self, name: impl Into<String>, dims: Vec<i64>) -> Self {
        self.inputs.push(InputSpec::string(name, dims));
        self
    }

    /// Declare an additional output
    ///
    /// The factory starts with a single `output0`; the first call replaces
    /// that default.
    #[must_use]
    pub fn with_output(mut self, name: impl Into<String>) -> Self {
        if self.outputs == ["output0"] {
            self.outputs.clear();
        }
        self.outputs.push(name.into());
        self
    }

    /// Sleep this long inside every `run` call
    #[must_use]
    pub fn with_request_latency(mut self, latency: Duration) -> Self {
        self.request_latency = latency;
        self
    }

    /// Make the n-th created context (0-based) fail every `run` call
    #[must_use]
    pub fn with_failing_context(mut self, index: usize) -> Self {
        self.failing_context = Some(index);
        self
    }

    /// Number of contexts created so far
    #[must_use]
    pub fn contexts_created(&self) -> usize {
        self.created.load(Ordering::Relaxed)
    }

    /// Create a concrete context, bypassing the trait object
    ///
    /// Unit tests use this to reach [`MockContext`] accessors directly.
    #[must_use]
    pub fn create_context_raw(&self) -> MockContext {
        let index = self.created.fetch_add(1, Ordering::Relaxed);
        MockContext {
            model_name: self.model_name.clone(),
            max_batch_size: self.max_batch_size,
            inputs: self.inputs.clone(),
            outputs: self.outputs.clone(),
            request_latency: self.request_latency,
            fail_runs: self.failing_context == Some(index),
            options: None,
            bound_bytes: HashMap::new(),
            bound_strings: HashMap::new(),
            run_count: 0,
        }
    }
}

impl ClientFactory for MockClientFactory {
    fn create_context(&self) -> Result<Box<dyn InferContext>> {
        Ok(Box::new(self.create_context_raw()))
    }
}

/// Scriptable mock request context
#[derive(Debug)]
pub struct MockContext {
    model_name: String,
    max_batch_size: usize,
    inputs: Vec<InputSpec>,
    outputs: Vec<String>,
    request_latency: Duration,
    fail_runs: bool,
    options: Option<RunOptions>,
    bound_bytes: HashMap<String, Vec<Vec<u8>>>,
    bound_strings: HashMap<String, Vec<Vec<String>>>,
    run_count: u64,
}

impl MockContext {
    /// Byte replicas bound to an input since its last reset
    #[must_use]
    pub fn bound_bytes(&self, name: &str) -> Option<&[Vec<u8>]> {
        self.bound_bytes.get(name).map(Vec::as_slice)
    }

    /// String replicas bound to an input since its last reset
    #[must_use]
    pub fn bound_strings(&self, name: &str) -> Option<&[Vec<String>]> {
        self.bound_strings.get(name).map(Vec::as_slice)
    }

    /// Run options attached to this context, if any
    #[must_use]
    pub fn run_options(&self) -> Option<&RunOptions> {
        self.options.as_ref()
    }

    /// Number of completed `run` calls
    #[must_use]
    pub fn run_count(&self) -> u64 {
        self.run_count
    }

    fn spec_index(&self, name: &str) -> Result<usize> {
        self.inputs
            .iter()
            .position(|spec| spec.name() == name)
            .ok_or_else(|| CargadorError::InvalidConfiguration {
                reason: format!("unknown input '{name}' for model '{}'", self.model_name),
            })
    }
}

impl InferContext for MockContext {
    fn model_name(&self) -> &str {
        &self.model_name
    }

    fn max_batch_size(&self) -> usize {
        self.max_batch_size
    }

    fn inputs(&self) -> &[InputSpec] {
        &self.inputs
    }

    fn outputs(&self) -> &[String] {
        &self.outputs
    }

    fn set_shape(&mut self, name: &str, shape: &[i64]) -> Result<()> {
        let index = self.spec_index(name)?;
        self.inputs[index].set_shape(shape);
        Ok(())
    }

    fn reset_input(&mut self, name: &str) -> Result<()> {
        self.spec_index(name)?;
        self.bound_bytes.remove(name);
        self.bound_strings.remove(name);
        Ok(())
    }

    fn bind_bytes(&mut self, name: &str, data: &[u8]) -> Result<()> {
        self.spec_index(name)?;
        self.bound_bytes
            .entry(name.to_string())
            .or_default()
            .push(data.to_vec());
        Ok(())
    }

    fn bind_strings(&mut self, name: &str, values: &[String]) -> Result<()> {
        self.spec_index(name)?;
        self.bound_strings
            .entry(name.to_string())
            .or_default()
            .push(values.to_vec());
        Ok(())
    }

    fn set_run_options(&mut self, options: &RunOptions) -> Result<()> {
        self.options = Some(options.clone());
        Ok(())
    }

    fn run(&mut self) -> Result<RequestTiming> {
        if self.options.is_none() {
            return Err(CargadorError::Request(
                "run called before run options were set".to_string(),
            ));
        }
        if self.fail_runs {
            return Err(CargadorError::Request(format!(
                "injected failure for model '{}'",
                self.model_name
            )));
        }
        if !self.request_latency.is_zero() {
            thread::sleep(self.request_latency);
        }
        self.run_count += 1;
        Ok(RequestTiming {
            send_time: Duration::from_micros(10),
            receive_time: Duration::from_micros(5),
        })
    }
}
