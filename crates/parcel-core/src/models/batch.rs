use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::{BatchError, ItemError, StateError, UploadError};
use crate::models::item::{ItemId, ItemState, UploadItem, Visibility};

/// Lifecycle of a batch: Idle → Running → {Succeeded, Aborted, Faulted}.
///
/// `Faulted` ends a run whose driver broke the state machine; it is never
/// caused by an item's upload failing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum BatchStatus {
    #[default]
    Idle,
    Running,
    Succeeded,
    Aborted {
        failed_item: ItemId,
        reason: UploadError,
    },
    Faulted {
        reason: String,
    },
}

impl BatchStatus {
    pub fn label(&self) -> &'static str {
        match self {
            BatchStatus::Idle => "idle",
            BatchStatus::Running => "running",
            BatchStatus::Succeeded => "succeeded",
            BatchStatus::Aborted { .. } => "aborted",
            BatchStatus::Faulted { .. } => "faulted",
        }
    }

    pub fn is_finished(&self) -> bool {
        matches!(
            self,
            BatchStatus::Succeeded | BatchStatus::Aborted { .. } | BatchStatus::Faulted { .. }
        )
    }
}

/// The ordered set of items submitted together.
///
/// Item order is processing order. Edits are accepted only for Pending items;
/// the driver moves items with [`advance`](Self::advance), which rejects any
/// transition that would skip a phase or put two items in flight at once.
#[derive(Debug, Clone, Default)]
pub struct BatchSession {
    items: Vec<UploadItem>,
    status: BatchStatus,
    started_at: Option<DateTime<Utc>>,
}

impl BatchSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_items(items: impl IntoIterator<Item = UploadItem>) -> Self {
        Self {
            items: items.into_iter().collect(),
            ..Self::default()
        }
    }

    pub fn items(&self) -> &[UploadItem] {
        &self.items
    }

    pub fn get(&self, id: ItemId) -> Option<&UploadItem> {
        self.items.iter().find(|item| item.id() == id)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn status(&self) -> &BatchStatus {
        &self.status
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    /// Ids of items still waiting, in processing order.
    pub fn pending_ids(&self) -> Vec<ItemId> {
        self.items
            .iter()
            .filter(|item| item.is_pending())
            .map(|item| item.id())
            .collect()
    }

    /// The item currently in flight, if any.
    pub fn active_item(&self) -> Option<&UploadItem> {
        self.items.iter().find(|item| item.state().is_active())
    }

    /// Appends a file to the batch. Only an idle batch accepts new items, and
    /// each id may appear once.
    pub fn add(&mut self, item: UploadItem) -> Result<ItemId, ItemError> {
        if self.status != BatchStatus::Idle {
            return Err(ItemError::BatchNotIdle(self.status.label()));
        }
        let id = item.id();
        if self.index_of(id).is_some() {
            return Err(ItemError::DuplicateItem(id));
        }
        self.items.push(item);
        Ok(id)
    }

    /// Removes a Pending item and hands it back.
    pub fn remove(&mut self, id: ItemId) -> Result<UploadItem, ItemError> {
        let index = self.pending_index(id)?;
        Ok(self.items.remove(index))
    }

    pub fn set_display_name(&mut self, id: ItemId, name: impl Into<String>) -> Result<(), ItemError> {
        let index = self.pending_index(id)?;
        self.items[index].set_display_name(name.into());
        Ok(())
    }

    pub fn set_description(
        &mut self,
        id: ItemId,
        description: impl Into<String>,
    ) -> Result<(), ItemError> {
        let index = self.pending_index(id)?;
        self.items[index].set_description(description.into());
        Ok(())
    }

    pub fn set_visibility(&mut self, id: ItemId, visibility: Visibility) -> Result<(), ItemError> {
        let index = self.pending_index(id)?;
        self.items[index].set_visibility(visibility);
        Ok(())
    }

    /// Idle → Running. Rejects empty batches, batches that already ran, and
    /// batches holding the same item twice.
    pub fn begin(&mut self, now: DateTime<Utc>) -> Result<(), BatchError> {
        if self.status != BatchStatus::Idle {
            return Err(BatchError::NotIdle(self.status.label()));
        }
        if self.items.is_empty() {
            return Err(BatchError::EmptyBatch);
        }
        if let Some(id) = self.first_duplicate() {
            return Err(BatchError::DuplicateItem(id));
        }
        self.status = BatchStatus::Running;
        self.started_at = Some(now);
        Ok(())
    }

    /// Moves one item to its next state.
    pub fn advance(&mut self, id: ItemId, next: ItemState) -> Result<(), StateError> {
        if self.status != BatchStatus::Running {
            return Err(StateError::BatchNotRunning(self.status.label()));
        }
        let index = self
            .index_of(id)
            .ok_or(StateError::UnknownItem(id))?;

        let current = self.items[index].state();
        if !current.can_advance_to(&next) {
            return Err(StateError::IllegalTransition {
                id,
                from: current.label(),
                to: next.label(),
            });
        }

        if next.is_active() {
            if let Some(active) = self.active_item() {
                if active.id() != id {
                    return Err(StateError::AnotherItemActive {
                        active: active.id(),
                        requested: id,
                    });
                }
            }
        }

        self.items[index].set_state(next);
        Ok(())
    }

    /// Running → Succeeded. The batch is cleared and its items handed back.
    pub fn succeed(&mut self) -> Result<Vec<UploadItem>, StateError> {
        if self.status != BatchStatus::Running {
            return Err(StateError::BatchNotRunning(self.status.label()));
        }
        self.status = BatchStatus::Succeeded;
        Ok(std::mem::take(&mut self.items))
    }

    /// Running → Aborted. Items after the failed one stay Pending.
    pub fn abort(&mut self, failed_item: ItemId, reason: UploadError) -> Result<(), StateError> {
        if self.status != BatchStatus::Running {
            return Err(StateError::BatchNotRunning(self.status.label()));
        }
        self.status = BatchStatus::Aborted {
            failed_item,
            reason,
        };
        Ok(())
    }

    /// Running → Faulted. Ends a run that hit a [`StateError`]; items that
    /// never left Pending stay resubmittable. A finished batch is left as is.
    pub fn fault(&mut self, error: &StateError) {
        if self.status == BatchStatus::Running {
            self.status = BatchStatus::Faulted {
                reason: error.to_string(),
            };
        }
    }

    /// A fresh idle batch holding the still-Pending items of this one, with
    /// their ids and metadata intact.
    pub fn resubmit_remaining(&self) -> BatchSession {
        BatchSession::from_items(
            self.items
                .iter()
                .filter(|item| item.is_pending())
                .cloned(),
        )
    }

    fn first_duplicate(&self) -> Option<ItemId> {
        let mut seen = HashSet::with_capacity(self.items.len());
        self.items
            .iter()
            .map(|item| item.id())
            .find(|id| !seen.insert(*id))
    }

    fn index_of(&self, id: ItemId) -> Option<usize> {
        self.items.iter().position(|item| item.id() == id)
    }

    fn pending_index(&self, id: ItemId) -> Result<usize, ItemError> {
        let index = self.index_of(id).ok_or(ItemError::NotFound(id))?;
        let item = &self.items[index];
        if !item.is_pending() {
            return Err(ItemError::NotPending {
                id,
                state: item.state().label(),
            });
        }
        Ok(index)
    }
}
