//! Data models for batch items, their status and the UI-owned batch store

use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::imaging::CompressionStats;

/// Represents the current state of one file in a batch
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemStatus {
    /// Waiting for the worker to reach it
    Pending,
    /// The per-item action is in flight
    Running,
    /// The action returned successfully
    Succeeded,
    /// The action failed or panicked; carries the reason
    Failed(String),
}

impl ItemStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ItemStatus::Succeeded | ItemStatus::Failed(_))
    }
}

/// Operation-specific result of a successful action
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemOutput {
    /// Byte sizes before and after lossless compression
    Compressed(CompressionStats),
    /// Path of the converted copy
    Converted(PathBuf),
    /// The source was resized in place
    Resized,
}

/// Outcome of one per-item action as reported by the worker
pub type ItemResult = Result<ItemOutput, String>;

#[derive(Debug, Error, PartialEq, Eq)]
#[error("illegal status transition from {from:?} to {to}")]
pub struct TransitionError {
    pub from: ItemStatus,
    pub to: &'static str,
}

/// Data structure for tracking one file in the UI
#[derive(Debug, Clone)]
pub struct BatchItem {
    /// Full path of the dropped file
    pub source: PathBuf,
    /// Display name (last path component)
    pub file_name: String,
    /// File length when the batch was opened
    pub byte_length: u64,
    status: ItemStatus,
    output: Option<ItemOutput>,
}

impl BatchItem {
    /// Reads name and size from the file system. Unreadable metadata yields size 0.
    pub fn new(source: impl AsRef<Path>) -> Self {
        let source = source.as_ref().to_path_buf();
        let file_name = source
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| source.display().to_string());
        let byte_length = std::fs::metadata(&source).map(|m| m.len()).unwrap_or(0);
        Self {
            source,
            file_name,
            byte_length,
            status: ItemStatus::Pending,
            output: None,
        }
    }

    pub fn status(&self) -> &ItemStatus {
        &self.status
    }

    pub fn output(&self) -> Option<&ItemOutput> {
        self.output.as_ref()
    }

    pub fn is_running(&self) -> bool {
        self.status == ItemStatus::Running
    }

    pub fn mark_running(&mut self) -> Result<(), TransitionError> {
        if self.status != ItemStatus::Pending {
            return Err(TransitionError {
                from: self.status.clone(),
                to: "Running",
            });
        }
        self.status = ItemStatus::Running;
        Ok(())
    }

    pub fn finish(&mut self, result: ItemResult) -> Result<(), TransitionError> {
        if self.status != ItemStatus::Running {
            let to = if result.is_ok() { "Succeeded" } else { "Failed" };
            return Err(TransitionError {
                from: self.status.clone(),
                to,
            });
        }
        match result {
            Ok(output) => {
                self.status = ItemStatus::Succeeded;
                self.output = Some(output);
            }
            Err(reason) => self.status = ItemStatus::Failed(reason),
        }
        Ok(())
    }
}

/// Message posted by the batch worker to the store that owns the items
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchEvent {
    Started { index: usize },
    Completed { index: usize, result: ItemResult },
    /// Sent exactly once per run, whether it ran out of items or was cancelled
    Finished { cancelled: bool },
}

/// Ordered, fixed list of items for one run. Only `apply` mutates item state.
#[derive(Debug, Clone, Default)]
pub struct Batch {
    items: Vec<BatchItem>,
    finished: Option<bool>,
}

impl Batch {
    pub fn from_paths<I, P>(paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        Self {
            items: paths.into_iter().map(BatchItem::new).collect(),
            finished: None,
        }
    }

    pub fn items(&self) -> &[BatchItem] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn sources(&self) -> Vec<PathBuf> {
        self.items.iter().map(|i| i.source.clone()).collect()
    }

    /// Applies one worker event. Events for unknown indices or out-of-order
    /// transitions are rejected without touching the store.
    pub fn apply(&mut self, event: BatchEvent) -> Result<(), TransitionError> {
        match event {
            BatchEvent::Started { index } => match self.items.get_mut(index) {
                Some(item) => item.mark_running(),
                None => Err(TransitionError {
                    from: ItemStatus::Pending,
                    to: "Running",
                }),
            },
            BatchEvent::Completed { index, result } => match self.items.get_mut(index) {
                Some(item) => item.finish(result),
                None => Err(TransitionError {
                    from: ItemStatus::Running,
                    to: "terminal",
                }),
            },
            BatchEvent::Finished { cancelled } => {
                self.finished = Some(cancelled);
                Ok(())
            }
        }
    }

    /// True once the end-of-batch signal was received
    pub fn is_finished(&self) -> bool {
        self.finished.is_some()
    }

    pub fn was_cancelled(&self) -> bool {
        self.finished == Some(true)
    }

    pub fn running_count(&self) -> usize {
        self.items.iter().filter(|i| i.is_running()).count()
    }

    pub fn completed(&self) -> usize {
        self.items.iter().filter(|i| i.status().is_terminal()).count()
    }

    pub fn failed(&self) -> usize {
        self.items
            .iter()
            .filter(|i| matches!(i.status(), ItemStatus::Failed(_)))
            .count()
    }

    /// Fraction of items in a terminal state (0.0 to 1.0)
    pub fn progress(&self) -> f32 {
        if self.items.is_empty() {
            return 0.0;
        }
        self.completed() as f32 / self.items.len() as f32
    }
}
