//! Progress reporting
//!
//! Checkout fires `"<prefix>progress"` events while analyzing the working
//! directory and while applying the plan. `loaded` is a monotonic counter;
//! `total` is known only during apply. There are no start or end events.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

pub const PHASE_ANALYZING: &str = "Analyzing workdir";
pub const PHASE_UPDATING: &str = "Updating workdir";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressEvent {
    pub phase: &'static str,
    pub loaded: usize,
    pub total: Option<usize>,
}

/// Callback invoked with the event name (`"<prefix>progress"`) and payload.
pub type ProgressCallback = Arc<dyn Fn(&str, &ProgressEvent) + Send + Sync>;

/// Event emitter bound to one stage of the operation. Cloning shares the
/// counter, so concurrent applier tasks keep `loaded` monotonic.
#[derive(Clone)]
pub struct Emitter {
    event_name: String,
    callback: Option<ProgressCallback>,
    loaded: Arc<AtomicUsize>,
}

impl Emitter {
    pub fn new(prefix: &str, callback: Option<ProgressCallback>) -> Self {
        Emitter {
            event_name: format!("{prefix}progress"),
            callback,
            loaded: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Count one completed unit and notify the subscriber, if any.
    pub fn tick(&self, phase: &'static str, total: Option<usize>) {
        let loaded = self.loaded.fetch_add(1, Ordering::Relaxed) + 1;

        if let Some(callback) = &self.callback {
            callback(
                &self.event_name,
                &ProgressEvent {
                    phase,
                    loaded,
                    total,
                },
            );
        }
    }
}
