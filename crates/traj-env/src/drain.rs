use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Shared stop flag. Once raised no further run is started; runs already
/// executing finish and are committed.
#[derive(Debug, Clone, Default)]
pub struct DrainHandle {
    raised: Arc<AtomicBool>,
}

impl DrainHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn raise(&self) {
        self.raised.store(true, Ordering::SeqCst);
    }

    pub fn is_raised(&self) -> bool {
        self.raised.load(Ordering::SeqCst)
    }

    pub fn reset(&self) {
        self.raised.store(false, Ordering::SeqCst);
    }
}
