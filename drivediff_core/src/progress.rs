use crossbeam::channel::{self, Receiver, Sender};
use drivediff_common::{ProgressPhase, ProgressSnapshot};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Receives progress snapshots while a run is in flight.
///
/// Called from worker threads; implementations must not block.
pub trait ProgressObserver: Send + Sync {
    fn on_progress(&self, snapshot: &ProgressSnapshot);
}

impl<F> ProgressObserver for F
where
    F: Fn(&ProgressSnapshot) + Send + Sync,
{
    fn on_progress(&self, snapshot: &ProgressSnapshot) {
        self(snapshot)
    }
}

/// Observer that discards every snapshot
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProgress;

impl ProgressObserver for NoProgress {
    fn on_progress(&self, _snapshot: &ProgressSnapshot) {}
}

/// Forwards snapshots into a bounded channel, dropping them when it is full
#[derive(Debug, Clone)]
pub struct ChannelObserver {
    sender: Sender<ProgressSnapshot>,
}

impl ChannelObserver {
    pub fn new(sender: Sender<ProgressSnapshot>) -> Self {
        Self { sender }
    }
}

impl ProgressObserver for ChannelObserver {
    fn on_progress(&self, snapshot: &ProgressSnapshot) {
        // A full or abandoned queue loses the snapshot; the run carries on.
        let _ = self.sender.try_send(snapshot.clone());
    }
}

/// Create a channel-backed observer and the receiver a caller drains.
pub fn progress_channel(capacity: usize) -> (ChannelObserver, Receiver<ProgressSnapshot>) {
    let (sender, receiver) = channel::bounded(capacity.max(1));
    (ChannelObserver::new(sender), receiver)
}

/// Counts produced entries and reports each one to an observer.
pub(crate) struct ProgressTracker<'a> {
    observer: &'a dyn ProgressObserver,
    phase: ProgressPhase,
    processed: AtomicUsize,
    total: usize,
}

impl<'a> ProgressTracker<'a> {
    pub(crate) fn new(observer: &'a dyn ProgressObserver, phase: ProgressPhase, total: usize) -> Self {
        Self {
            observer,
            phase,
            processed: AtomicUsize::new(0),
            total,
        }
    }

    pub(crate) fn advance(&self, current_path: &Path) {
        let processed = self.processed.fetch_add(1, Ordering::Relaxed) + 1;
        self.observer.on_progress(&ProgressSnapshot {
            phase: self.phase,
            processed,
            total: self.total,
            current_path: current_path.to_path_buf(),
        });
    }

    #[cfg(test)]
    pub(crate) fn processed(&self) -> usize {
        self.processed.load(Ordering::Relaxed)
    }
}

/// Announce a phase change with no items processed yet.
pub(crate) fn announce(observer: &dyn ProgressObserver, phase: ProgressPhase, total: usize, path: &Path) {
    observer.on_progress(&ProgressSnapshot {
        phase,
        processed: 0,
        total,
        current_path: path.to_path_buf(),
    });
}
