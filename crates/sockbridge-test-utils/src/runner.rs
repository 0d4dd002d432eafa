//! A [`LocalRunner`] that records invocations instead of spawning anything.

use std::sync::{Arc, Mutex};

use sockbridge_core::BoxFuture;
use sockbridge_core::shim::{Invocation, LocalRunner, ShimError};

/// Records each local execution and reports a fixed exit code.
///
/// Clones share the same record, so a test can keep one handle while the
/// shim owns another.
#[derive(Debug, Clone, Default)]
pub struct RecordingRunner {
    exit_code: i32,
    calls: Arc<Mutex<Vec<Invocation>>>,
}

impl RecordingRunner {
    pub fn with_exit_code(exit_code: i32) -> Self {
        Self {
            exit_code,
            calls: Arc::default(),
        }
    }

    /// Invocations executed so far.
    pub fn calls(&self) -> Vec<Invocation> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }
}

impl LocalRunner for RecordingRunner {
    fn run<'a>(&'a self, invocation: &'a Invocation) -> BoxFuture<'a, Result<i32, ShimError>> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(invocation.clone());
        }
        let code = self.exit_code;
        Box::pin(async move { Ok(code) })
    }
}
