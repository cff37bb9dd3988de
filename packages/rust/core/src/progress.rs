//! Progress reporting hooks, decoupling the core from any terminal UI.

/// Progress callback for reporting stage status.
pub trait ProgressReporter: Send + Sync {
    /// Called when entering a new phase.
    fn phase(&self, name: &str);
    /// Called after each chunk (generation) or batch (curation) finishes.
    fn unit_done(&self, current: usize, total: usize, detail: &str);
    /// Called when a stage completes.
    fn done(&self, message: &str);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn phase(&self, _name: &str) {}
    fn unit_done(&self, _current: usize, _total: usize, _detail: &str) {}
    fn done(&self, _message: &str) {}
}
