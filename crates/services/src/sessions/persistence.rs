use std::sync::Arc;

use exam_core::model::SessionProgress;
use storage::repository::{ProgressKey, ProgressRepository, StorageError};
use tokio::sync::watch;

use crate::error::SessionError;

/// Latest snapshot handed to the saver, numbered in queue order.
#[derive(Debug, Clone, Default)]
struct Queued {
    generation: u64,
    snapshot: Option<SessionProgress>,
}

/// Outcome of the most recent save the saver finished.
#[derive(Debug, Clone, Copy)]
struct Saved {
    generation: u64,
    ok: bool,
}

/// Loads and saves one session's snapshot through the progress collaborator.
///
/// Saves run on a background task, one at a time. Snapshots queued while a
/// save is in flight collapse into the newest one, so a slow backend never
/// holds up the caller.
pub struct ProgressAdapter {
    repo: Arc<dyn ProgressRepository>,
    key: ProgressKey,
    queue: watch::Sender<Queued>,
    saved: watch::Receiver<Saved>,
}

impl ProgressAdapter {
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime, since the saver task is
    /// spawned here.
    #[must_use]
    pub fn new(repo: Arc<dyn ProgressRepository>, key: ProgressKey) -> Self {
        let (queue, queued) = watch::channel(Queued::default());
        let (done, saved) = watch::channel(Saved {
            generation: 0,
            ok: true,
        });
        tokio::spawn(save_loop(Arc::clone(&repo), key.clone(), queued, done));
        Self {
            repo,
            key,
            queue,
            saved,
        }
    }

    #[must_use]
    pub fn key(&self) -> &ProgressKey {
        &self.key
    }

    /// Fetch the saved snapshot, if there is one.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::ProgressLoad` if the collaborator fails.
    pub async fn load(&self) -> Result<Option<SessionProgress>, SessionError> {
        self.repo
            .load_progress(&self.key)
            .await
            .map_err(SessionError::ProgressLoad)
    }

    /// Queue `snapshot` for saving and return at once. A failed save is
    /// logged; the next queued snapshot is tried regardless.
    pub fn autosave(&self, snapshot: SessionProgress) {
        self.queue.send_modify(|queued| {
            queued.generation += 1;
            queued.snapshot = Some(snapshot);
        });
    }

    /// Wait until everything queued so far has been written. Returns whether
    /// the last write succeeded.
    pub async fn flush(&self) -> bool {
        let target = self.queue.borrow().generation;
        let mut saved = self.saved.clone();
        // the saver only stops once this adapter is gone
        saved
            .wait_for(|s| s.generation >= target)
            .await
            .is_ok_and(|outcome| outcome.ok)
    }

    /// Drop the snapshot once the attempt has been submitted. Pending saves
    /// land first, so none can resurrect the snapshot afterwards.
    ///
    /// # Errors
    ///
    /// Returns the collaborator's `StorageError`.
    pub async fn clear(&self) -> Result<(), StorageError> {
        self.flush().await;
        self.repo.clear_progress(&self.key).await
    }
}

async fn save_loop(
    repo: Arc<dyn ProgressRepository>,
    key: ProgressKey,
    mut queued: watch::Receiver<Queued>,
    done: watch::Sender<Saved>,
) {
    // ends once the adapter is dropped and the last snapshot is written
    while queued.changed().await.is_ok() {
        let Queued {
            generation,
            snapshot,
        } = queued.borrow_and_update().clone();
        let Some(snapshot) = snapshot else {
            continue;
        };

        let ok = match repo.save_progress(&key, &snapshot).await {
            Ok(()) => true,
            Err(err) => {
                tracing::warn!(key = %key.storage_key(), error = %err, "autosave failed");
                false
            }
        };
        done.send_replace(Saved { generation, ok });
    }
}
