use crate::comparison::ComparisonEngine;
use crate::progress::{progress_channel, ProgressObserver};
use crate::structure::StructureComparer;
use crossbeam::channel::{self, Receiver, TryRecvError};
use drivediff_common::{
    CancellationToken, ComparisonResult, DriveDiffError, ProgressSnapshot, ScanConfiguration,
    StructureResult,
};
use std::path::PathBuf;
use std::thread::{self, JoinHandle};
use tracing::debug;

/// Snapshots buffered before the observer starts dropping them.
pub const PROGRESS_QUEUE_CAPACITY: usize = 256;

/// A comparison running on its own thread.
///
/// Dropping the handle does not stop the run; call [`RunHandle::cancel`].
#[derive(Debug)]
pub struct RunHandle<T> {
    cancel: CancellationToken,
    progress: Receiver<ProgressSnapshot>,
    completion: Receiver<Result<T, DriveDiffError>>,
    thread: Option<JoinHandle<()>>,
}

pub type ComparisonHandle = RunHandle<ComparisonResult>;
pub type StructureHandle = RunHandle<StructureResult>;

impl<T> RunHandle<T> {
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Progress snapshots. Disconnects once the run has finished.
    pub fn progress(&self) -> &Receiver<ProgressSnapshot> {
        &self.progress
    }

    /// Block until the run delivers its result.
    pub fn wait(mut self) -> Result<T, DriveDiffError> {
        let result = self
            .completion
            .recv()
            .unwrap_or(Err(DriveDiffError::Cancelled));
        self.join();
        result
    }

    /// Return the result if the run has finished, without blocking.
    pub fn try_wait(&mut self) -> Option<Result<T, DriveDiffError>> {
        match self.completion.try_recv() {
            Ok(result) => {
                self.join();
                Some(result)
            }
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => {
                self.join();
                Some(Err(DriveDiffError::Cancelled))
            }
        }
    }

    fn join(&mut self) {
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                debug!("Comparison thread panicked");
            }
        }
    }
}

/// Start a content comparison in the background.
///
/// The configuration is validated before the thread starts, so a bad
/// configuration is reported here rather than through the handle.
pub fn spawn_compare(
    left_root: impl Into<PathBuf>,
    right_root: impl Into<PathBuf>,
    config: ScanConfiguration,
) -> Result<ComparisonHandle, DriveDiffError> {
    let engine = ComparisonEngine::new(config)?;
    let (left_root, right_root) = (left_root.into(), right_root.into());
    spawn_run("drivediff-compare", move |observer, cancel| {
        engine.compare_with(&left_root, &right_root, observer, cancel)
    })
}

/// Start a structure comparison in the background.
pub fn spawn_compare_structure(
    left_root: impl Into<PathBuf>,
    right_root: impl Into<PathBuf>,
    config: ScanConfiguration,
) -> Result<StructureHandle, DriveDiffError> {
    let comparer = StructureComparer::new(config)?;
    let (left_root, right_root) = (left_root.into(), right_root.into());
    spawn_run("drivediff-structure", move |observer, cancel| {
        comparer.compare_structure_with(&left_root, &right_root, observer, cancel)
    })
}

fn spawn_run<T, F>(name: &str, work: F) -> Result<RunHandle<T>, DriveDiffError>
where
    T: Send + 'static,
    F: FnOnce(&dyn ProgressObserver, &CancellationToken) -> Result<T, DriveDiffError> + Send + 'static,
{
    let cancel = CancellationToken::new();
    let worker_cancel = cancel.clone();
    let (observer, progress) = progress_channel(PROGRESS_QUEUE_CAPACITY);
    let (done_tx, completion) = channel::bounded(1);

    let thread = thread::Builder::new()
        .name(name.to_string())
        .spawn(move || {
            let result = work(&observer, &worker_cancel);
            // Close the progress stream before the result is visible
            drop(observer);
            let _ = done_tx.send(result);
        })
        .map_err(|e| DriveDiffError::Pool(e.to_string()))?;

    Ok(RunHandle {
        cancel,
        progress,
        completion,
        thread: Some(thread),
    })
}
