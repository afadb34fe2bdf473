use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::signal::Signal;

use super::Callback;

/// A completion callback that can be awaited.
///
/// ```ignore
/// static DONE: CompletionSignal = CompletionSignal::new();
///
/// DONE.reset();
/// REGISTRY.begin_async_transmit(&config, &FRAME, &DONE)?;
/// DONE.wait().await;
/// ```
pub struct CompletionSignal {
    signal: Signal<CriticalSectionRawMutex, ()>,
}

impl CompletionSignal {
    pub const fn new() -> Self {
        Self { signal: Signal::new() }
    }

    /// Wait for the next completion and consume it.
    pub async fn wait(&self) {
        self.signal.wait().await
    }

    pub fn reset(&self) {
        self.signal.reset()
    }

    pub fn signaled(&self) -> bool {
        self.signal.signaled()
    }
}

impl Default for CompletionSignal {
    fn default() -> Self {
        Self::new()
    }
}

impl Callback for CompletionSignal {
    fn on_complete(&self) {
        self.signal.signal(())
    }
}
