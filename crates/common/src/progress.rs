//! Generic progress callback trait and implementations.

use std::marker::PhantomData;

/// Generic progress callback trait.
///
/// Type parameter `T` is the progress data type, so each operation can
/// report its own progress shape through the same callback pattern.
/// Saves cannot be cancelled once started, so callbacks only observe.
pub trait ProgressCallback<T>: Send + Sync {
    /// Called with progress updates.
    ///
    /// # Arguments
    /// * `progress` - Progress data for the current operation
    fn on_progress(&self, progress: &T);
}

/// A progress callback that ignores every update.
pub struct NoOpProgress;

impl<T> ProgressCallback<T> for NoOpProgress {
    fn on_progress(&self, _progress: &T) {}
}

/// A progress callback that wraps a closure.
pub struct FnProgress<F, T> {
    callback: F,
    _marker: PhantomData<fn(&T)>,
}

impl<F, T> FnProgress<F, T>
where
    F: Fn(&T) + Send + Sync,
{
    /// Create a new closure-based progress callback.
    ///
    /// # Arguments
    /// * `callback` - Closure that receives each progress update
    pub fn new(callback: F) -> Self {
        Self {
            callback,
            _marker: PhantomData,
        }
    }
}

impl<F, T> ProgressCallback<T> for FnProgress<F, T>
where
    F: Fn(&T) + Send + Sync,
{
    fn on_progress(&self, progress: &T) {
        (self.callback)(progress)
    }
}

/// Create a progress callback from a closure.
///
/// # Arguments
/// * `f` - Closure that receives each progress update
pub fn progress_fn<F, T>(f: F) -> FnProgress<F, T>
where
    F: Fn(&T) + Send + Sync,
{
    FnProgress::new(f)
}
