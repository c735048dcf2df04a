//! Sequential, cancellable per-file batch runner.
//!
//! One blocking worker walks the batch in order and posts [`BatchEvent`]s to
//! an unbounded channel. The UI side owns the [`Batch`] and applies events as
//! it drains them, so item state has exactly one writer.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use thiserror::Error;
use tokio::runtime::Handle;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel};
use tokio::task::JoinHandle;

use crate::cancel::CancellationScope;
use crate::model::{Batch, BatchEvent, ItemResult, ItemStatus};

/// Precondition violations when starting a run
#[derive(Debug, Error, PartialEq, Eq)]
pub enum BatchError {
    #[error("cannot start an empty batch")]
    EmptyBatch,
    #[error("item {index} is not pending")]
    NotPending { index: usize },
    #[error("a batch is already running")]
    AlreadyRunning,
}

pub struct BatchProcessor {
    runtime: Handle,
    scope: CancellationScope,
    running: Arc<AtomicBool>,
}

impl BatchProcessor {
    pub fn new(runtime: Handle) -> Self {
        Self {
            runtime,
            scope: CancellationScope::new(),
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Scope to hand to the next `start`
    pub fn scope(&self) -> CancellationScope {
        self.scope.clone()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Cancels the current scope and replaces it with a fresh one, so the
    /// next `start` goes through right away. A worker still finishing its
    /// in-flight item only clears its own run flag.
    /// Safe to call when idle or after the run already finished.
    pub fn cancel(&mut self) {
        if self.is_running() {
            tracing::info!("cancelling running batch");
            self.running = Arc::new(AtomicBool::new(false));
        }
        self.scope.cancel();
        self.scope = CancellationScope::new();
    }

    /// Spawns the worker for `batch`. Progress is observed through the
    /// returned [`BatchRun`].
    pub fn start<A>(
        &self,
        batch: &Batch,
        action: A,
        scope: CancellationScope,
    ) -> Result<BatchRun, BatchError>
    where
        A: Fn(&Path, &CancellationScope) -> ItemResult + Send + 'static,
    {
        if batch.is_empty() {
            return Err(BatchError::EmptyBatch);
        }
        if let Some(index) = batch
            .items()
            .iter()
            .position(|item| item.status() != &ItemStatus::Pending)
        {
            return Err(BatchError::NotPending { index });
        }
        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(BatchError::AlreadyRunning);
        }

        let sources = batch.sources();
        let running = Arc::clone(&self.running);
        let (tx, rx) = unbounded_channel();

        tracing::info!(items = sources.len(), "starting batch");
        let worker = self.runtime.spawn_blocking(move || {
            let cancelled = run_items(&sources, &action, &scope, &tx);
            running.store(false, Ordering::SeqCst);
            tracing::info!(cancelled, "batch finished");
            let _ = tx.send(BatchEvent::Finished { cancelled });
        });

        Ok(BatchRun {
            events: rx,
            worker,
            finished: false,
        })
    }
}

/// Returns true when the loop stopped early because the scope was cancelled.
fn run_items<A>(
    sources: &[PathBuf],
    action: &A,
    scope: &CancellationScope,
    tx: &UnboundedSender<BatchEvent>,
) -> bool
where
    A: Fn(&Path, &CancellationScope) -> ItemResult,
{
    for (index, source) in sources.iter().enumerate() {
        if scope.is_cancelled() {
            tracing::debug!(remaining = sources.len() - index, "scope cancelled, stopping");
            return true;
        }

        let _ = tx.send(BatchEvent::Started { index });
        let result = match panic::catch_unwind(AssertUnwindSafe(|| action(source, scope))) {
            Ok(result) => result,
            Err(payload) => Err(panic_message(payload)),
        };

        match &result {
            Ok(_) => tracing::debug!(path = %source.display(), "item succeeded"),
            Err(reason) => tracing::warn!(path = %source.display(), %reason, "item failed"),
        }
        // Always reported, even if the scope was cancelled mid-action
        let _ = tx.send(BatchEvent::Completed { index, result });
    }
    false
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("panicked: {s}")
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("panicked: {s}")
    } else {
        "panicked".to_string()
    }
}

/// Receiving end of one run
pub struct BatchRun {
    events: UnboundedReceiver<BatchEvent>,
    worker: JoinHandle<()>,
    finished: bool,
}

impl BatchRun {
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Drains whatever the worker has posted so far without blocking.
    /// Returns true if at least one event was applied.
    pub fn poll_into(&mut self, batch: &mut Batch) -> bool {
        let mut applied = false;
        while let Ok(event) = self.events.try_recv() {
            self.apply(batch, event);
            applied = true;
        }
        applied
    }

    /// Awaits the next event, applies it and hands it back.
    /// `None` once the end-of-batch signal has been applied.
    pub async fn next_into(&mut self, batch: &mut Batch) -> Option<BatchEvent> {
        if self.finished {
            return None;
        }
        let event = self.events.recv().await?;
        self.apply(batch, event.clone());
        Some(event)
    }

    /// Applies events until the end-of-batch signal arrives.
    pub async fn wait_into(&mut self, batch: &mut Batch) {
        while self.next_into(batch).await.is_some() {}
    }

    /// Waits for the worker thread itself to exit.
    pub async fn join(self) {
        if let Err(e) = self.worker.await {
            tracing::error!(error = %e, "batch worker did not exit cleanly");
        }
    }

    fn apply(&mut self, batch: &mut Batch, event: BatchEvent) {
        if matches!(event, BatchEvent::Finished { .. }) {
            self.finished = true;
        }
        if let Err(e) = batch.apply(event) {
            tracing::error!(error = %e, "dropped out-of-order batch event");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ItemOutput;
    use std::sync::Mutex;
    use std::sync::mpsc;

    fn paths(n: usize) -> Vec<PathBuf> {
        (0..n).map(|i| PathBuf::from(format!("/nonexistent/{i}.png"))).collect()
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_empty_batch_rejected() {
        let processor = BatchProcessor::new(Handle::current());
        let batch = Batch::default();
        let err = processor
            .start(&batch, |_, _| Ok(ItemOutput::Resized), processor.scope())
            .err();
        assert_eq!(err, Some(BatchError::EmptyBatch));
        assert!(!processor.is_running());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_reentrant_start_rejected() {
        let processor = BatchProcessor::new(Handle::current());
        let batch = Batch::from_paths(paths(2));
        let (release_tx, release_rx) = mpsc::channel::<()>();
        let release_rx = Mutex::new(release_rx);

        let mut run = processor
            .start(
                &batch,
                move |_, _| {
                    let _ = release_rx.lock().unwrap().recv();
                    Ok(ItemOutput::Resized)
                },
                processor.scope(),
            )
            .unwrap();

        let again = processor
            .start(&batch, |_, _| Ok(ItemOutput::Resized), processor.scope())
            .err();
        assert_eq!(again, Some(BatchError::AlreadyRunning));

        release_tx.send(()).unwrap();
        release_tx.send(()).unwrap();
        let mut observed = batch.clone();
        run.wait_into(&mut observed).await;
        run.join().await;
        assert!(!processor.is_running());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_not_pending_rejected() {
        let processor = BatchProcessor::new(Handle::current());
        let mut batch = Batch::from_paths(paths(2));
        batch.apply(BatchEvent::Started { index: 1 }).unwrap();
        let err = processor
            .start(&batch, |_, _| Ok(ItemOutput::Resized), processor.scope())
            .err();
        assert_eq!(err, Some(BatchError::NotPending { index: 1 }));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_panic_becomes_failed() {
        let processor = BatchProcessor::new(Handle::current());
        let mut batch = Batch::from_paths(paths(2));
        let mut run = processor
            .start(
                &batch,
                |path, _| {
                    if path.ends_with("0.png") {
                        panic!("decoder exploded");
                    }
                    Ok(ItemOutput::Resized)
                },
                processor.scope(),
            )
            .unwrap();
        run.wait_into(&mut batch).await;

        match batch.items()[0].status() {
            ItemStatus::Failed(reason) => assert!(reason.contains("decoder exploded")),
            other => panic!("unexpected status {other:?}"),
        }
        assert_eq!(batch.items()[1].status(), &ItemStatus::Succeeded);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_cancel_replaces_scope() {
        let mut processor = BatchProcessor::new(Handle::current());
        let old = processor.scope();
        processor.cancel();
        assert!(old.is_cancelled());
        assert!(!processor.scope().is_cancelled());

        // Idle cancel twice is a no-op
        processor.cancel();
        processor.cancel();
        assert!(!processor.is_running());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_start_with_cancelled_scope_leaves_all_pending() {
        let processor = BatchProcessor::new(Handle::current());
        let mut batch = Batch::from_paths(paths(3));
        let scope = processor.scope();
        scope.cancel();

        let mut run = processor
            .start(&batch, |_, _| Ok(ItemOutput::Resized), scope)
            .unwrap();
        run.wait_into(&mut batch).await;

        assert!(batch.was_cancelled());
        assert!(batch.items().iter().all(|i| i.status() == &ItemStatus::Pending));
    }
}
