mod types;

pub use types::{Measurement, Reading, SamplerInfo};

use std::sync::{Arc, Mutex, MutexGuard};

/// Append-only, chronologically ordered samples for one session.
///
/// Clones share storage. The sampling loop is the only writer; everyone
/// else reads through [`snapshot`](Self::snapshot) or [`latest`](Self::latest).
/// The lock is held for a single push or a single copy, never across a sleep.
#[derive(Debug, Default)]
pub struct MeasurementBuffer {
    inner: Arc<Mutex<Vec<Measurement>>>,
}

impl MeasurementBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&self, measurement: Measurement) {
        self.lock().push(measurement);
    }

    /// Independent copy of every sample appended before this call.
    pub fn snapshot(&self) -> Vec<Measurement> {
        self.lock().clone()
    }

    pub fn latest(&self) -> Option<Measurement> {
        self.lock().last().copied()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Measurement>> {
        // A panic mid-push cannot leave a half-written Measurement behind,
        // so a poisoned buffer is still consistent.
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl Clone for MeasurementBuffer {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}
