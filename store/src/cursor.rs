//! Processing cursor storage trait.

use crate::StoreError;

/// Durable record of the last chain block whose events are fully projected.
///
/// The cursor is a single process-wide value. It is created once and only
/// ever moves forward.
pub trait CursorStore {
    /// The last processed block, `None` before the first run.
    fn cursor(&self) -> Result<Option<u64>, StoreError>;

    /// Create the cursor at `initial` if it does not exist yet and return the
    /// effective value (the existing one wins).
    fn init_cursor(&self, initial: u64) -> Result<u64, StoreError>;

    /// Move the cursor to `height`.
    ///
    /// Fails with [`StoreError::CursorRegression`] if `height` is below the
    /// stored value; advancing to the current value is a no-op.
    fn advance_cursor(&self, height: u64) -> Result<(), StoreError>;
}
