//! Adaptive batch sizing.

/// Tracks how many calls go into the next batch.
///
/// When adaptive, a batch that completes without any error grows the size by one up to
/// the maximum, and a batch with any error halves it, never below one. Otherwise the size
/// stays at the maximum.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdaptiveBatchSize {
    current: usize,
    max: usize,
    adaptive: bool,
}

impl AdaptiveBatchSize {
    /// Creates a new [`AdaptiveBatchSize`] starting at `max`.
    pub fn new(max: usize, adaptive: bool) -> Self {
        let max = max.max(1);
        Self { current: max, max, adaptive }
    }

    /// Returns the size of the next batch.
    pub const fn current(&self) -> usize {
        self.current
    }

    /// Records a batch in which every call succeeded.
    pub fn on_success(&mut self) {
        if self.adaptive {
            self.current = (self.current + 1).min(self.max);
        }
    }

    /// Records a batch that failed, fully or for some of its calls.
    pub fn on_error(&mut self) {
        if self.adaptive {
            self.current = (self.current / 2).max(1);
        }
    }
}
