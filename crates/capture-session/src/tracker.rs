//! In-flight capture request table

use std::collections::HashMap;
use std::time::Duration;

use thiserror::Error;
use tracing::debug;

use crate::request::{CaptureRequest, RequestId};

/// Tracker errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TrackerError {
    #[error("Capture request {0} is already tracked")]
    Duplicate(RequestId),
}

/// Owns every in-flight capture request until it is finalized.
///
/// Entries are only removed by `finalize`; a request that never completes
/// stays visible through `outstanding` and `stale`.
#[derive(Debug, Default)]
pub struct CaptureRequestTracker {
    requests: HashMap<RequestId, CaptureRequest>,
}

impl CaptureRequestTracker {
    /// Create an empty tracker
    pub fn new() -> Self {
        Self::default()
    }

    /// Start tracking a request
    pub fn register(&mut self, request: CaptureRequest) -> Result<(), TrackerError> {
        let id = request.id;
        if self.requests.contains_key(&id) {
            return Err(TrackerError::Duplicate(id));
        }
        self.requests.insert(id, request);
        debug!("Tracking capture request {} ({} in flight)", id, self.requests.len());
        self.publish_count();
        Ok(())
    }

    /// Look up a request
    pub fn get(&self, id: RequestId) -> Option<&CaptureRequest> {
        self.requests.get(&id)
    }

    /// Look up a request for update
    pub fn get_mut(&mut self, id: RequestId) -> Option<&mut CaptureRequest> {
        self.requests.get_mut(&id)
    }

    /// Remove a request permanently
    pub fn finalize(&mut self, id: RequestId) -> Option<CaptureRequest> {
        let request = self.requests.remove(&id)?;
        debug!("Finalized capture request {} ({} in flight)", id, self.requests.len());
        self.publish_count();
        Some(request)
    }

    /// Number of requests in flight
    pub fn count(&self) -> usize {
        self.requests.len()
    }

    /// Check if nothing is in flight
    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }

    /// Ids of all requests in flight, oldest first
    pub fn outstanding(&self) -> Vec<RequestId> {
        let mut ids: Vec<_> = self.requests.keys().copied().collect();
        ids.sort();
        ids
    }

    /// Ids of requests in flight for longer than `older_than`
    pub fn stale(&self, older_than: Duration) -> Vec<RequestId> {
        let mut ids: Vec<_> = self
            .requests
            .values()
            .filter(|r| r.age() > older_than)
            .map(|r| r.id)
            .collect();
        ids.sort();
        ids
    }

    fn publish_count(&self) {
        metrics::gauge!("capture_requests_in_flight").set(self.requests.len() as f64);
    }
}
