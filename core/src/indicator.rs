//! Loading indicator seam.
//!
//! The indicator is UI feedback owned by the host application. The client only
//! signals `start` before dispatch and `stop` once the call ends, whichever
//! way it ends.

use std::sync::Arc;

/// Receives start/stop signals around a request. Fire-and-forget.
pub trait LoadingIndicator: Send + Sync {
    fn start(&self);
    fn stop(&self);
}

/// Indicator that ignores every signal.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopIndicator;

impl LoadingIndicator for NoopIndicator {
    fn start(&self) {}
    fn stop(&self) {}
}

/// Started indicator that is stopped exactly once, when the guard is dropped.
///
/// Living inside the request task, the guard is dropped on completion, on
/// early return and when the task is aborted.
pub(crate) struct IndicatorGuard {
    indicator: Arc<dyn LoadingIndicator>,
}

impl IndicatorGuard {
    pub(crate) fn start(indicator: &Arc<dyn LoadingIndicator>) -> Self {
        indicator.start();
        Self {
            indicator: Arc::clone(indicator),
        }
    }
}

impl Drop for IndicatorGuard {
    fn drop(&mut self) {
        self.indicator.stop();
    }
}
