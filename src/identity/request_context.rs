use std::time::Instant;

use uuid::Uuid;

/// Per-request bookkeeping attached by the HTTP layer.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub request_id: String,
    pub started: Instant,
}

impl Default for RequestContext {
    fn default() -> Self {
        Self { request_id: Uuid::new_v4().to_string(), started: Instant::now() }
    }
}

impl RequestContext {
    pub fn new() -> Self { Self::default() }

    pub fn elapsed_ms(&self) -> u128 { self.started.elapsed().as_millis() }
}
