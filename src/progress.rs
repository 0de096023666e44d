//! Defines structures and types for progress reporting.

/// Represents a snapshot of the progress during a long-running operation.
#[derive(Debug, Clone)]
pub struct ProgressUpdate {
    /// A description of the current stage (e.g., "Importing sentences").
    pub stage_description: String,
    /// Number of items processed in the current stage.
    pub current_item: u64,
    /// Total number of items expected in the current stage (if calculable).
    pub total_items: Option<u64>,
    /// An optional message providing more context (e.g., "Sentence 12").
    pub message: Option<String>,
}

/// Type alias for the progress callback function.
///
/// The callback receives a `ProgressUpdate` and returns `true` to continue the operation,
/// or `false` to cancel it. A cancelled import rolls back everything it wrote.
pub type ProgressCallback = Box<dyn FnMut(ProgressUpdate) -> bool + Send + Sync>;

impl ProgressUpdate {
    /// Creates a new progress update for the start of a stage.
    pub fn new_stage(description: String, total_items: Option<u64>) -> Self {
        ProgressUpdate {
            stage_description: description,
            current_item: 0,
            total_items,
            message: None,
        }
    }

    /// True once `current_item` has reached a known total.
    pub fn is_complete(&self) -> bool {
        self.total_items
            .is_some_and(|total| self.current_item >= total)
    }
}

/// Invokes the callback if one is set. Missing callbacks never cancel.
pub(crate) fn report(callback: &mut Option<ProgressCallback>, update: ProgressUpdate) -> bool {
    match callback.as_mut() {
        Some(cb) => cb(update),
        None => true,
    }
}
