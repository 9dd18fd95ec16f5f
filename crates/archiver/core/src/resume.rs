//! Computes where a restarted archiver picks up.

use crate::ResumeError;
use archiver_storage::{BlockSink, StorageError, WatermarkStore};

/// Reads the sink and the watermark to find the next block to fetch.
#[derive(Debug)]
pub struct ResumeTracker<'a, S: ?Sized, W: ?Sized> {
    sink: &'a S,
    watermark: &'a W,
}

impl<'a, S, W> ResumeTracker<'a, S, W>
where
    S: BlockSink + ?Sized,
    W: WatermarkStore + ?Sized,
{
    /// Creates a new [`ResumeTracker`].
    pub const fn new(sink: &'a S, watermark: &'a W) -> Self {
        Self { sink, watermark }
    }

    /// Returns the sink's highest stored block, `None` if it is empty.
    pub fn last_stored(&self) -> Result<Option<u64>, StorageError> {
        match self.sink.last_stored_block_number() {
            Ok(number) => Ok(Some(number)),
            Err(err) if err.is_not_found() => Ok(None),
            Err(err) => Err(err),
        }
    }

    /// Returns the first block to fetch.
    ///
    /// * With a watermark, the block after it. A sink holding blocks past the watermark
    ///   is rewritten from there, since writes are upserts.
    /// * Without a watermark, the block after the sink's last stored block.
    /// * With neither, `start_block`.
    ///
    /// Fails with [`ResumeError::WatermarkAhead`] if the watermark claims blocks the sink
    /// does not hold.
    pub fn resume_point(&self, start_block: u64) -> Result<u64, ResumeError> {
        let watermark = self.watermark.load_watermark()?;
        let last_stored = self.last_stored()?;

        let next = match (watermark, last_stored) {
            (Some(watermark), Some(last)) if watermark > last => {
                return Err(ResumeError::WatermarkAhead { watermark, last_stored });
            }
            (Some(watermark), None) => {
                return Err(ResumeError::WatermarkAhead { watermark, last_stored: None });
            }
            (Some(watermark), Some(last)) => {
                if last > watermark {
                    warn!(
                        target: "archiver",
                        watermark,
                        last_stored = last,
                        "Sink is ahead of the watermark, rewriting from the watermark"
                    );
                }
                watermark + 1
            }
            (None, Some(last)) => last + 1,
            (None, None) => start_block,
        };

        info!(target: "archiver", ?watermark, ?last_stored, next, "Computed resume point");
        Ok(next)
    }
}
