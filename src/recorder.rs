//! Visit recorder: assigns visit ids and merges emotion scores into the store.

use parking_lot::Mutex;
use std::sync::Arc;
use thiserror::Error;

use crate::emotion::EmotionVector;
use crate::state::{StateError, StoreSnapshot, VisitId, VisitStore};

#[derive(Error, Debug)]
pub enum RecordError {
    #[error("Refusing to record a visit with an empty URL")]
    EmptyUrl,

    #[error("Storage error: {0}")]
    Storage(#[from] StateError),
}

/// Turns one `(url, emotions)` pair into a durable record.
///
/// The read, id assignment and commit all happen under `commit_lock`, so two
/// callers can never derive the same id from the same store image.
pub struct VisitRecorder {
    store: Arc<dyn VisitStore>,
    commit_lock: Mutex<()>,
}

impl VisitRecorder {
    pub fn new(store: Arc<dyn VisitStore>) -> Self {
        Self {
            store,
            commit_lock: Mutex::new(()),
        }
    }

    /// Record one visit and return its id.
    ///
    /// On error the store is left exactly as it was and no id is consumed.
    pub fn record(&self, url: &str, emotions: &EmotionVector) -> Result<VisitId, RecordError> {
        if url.is_empty() {
            return Err(RecordError::EmptyUrl);
        }

        let _guard = self.commit_lock.lock();

        let current = self.store.get_all()?;
        let (visit_id, updated) = merge_visit(&current, url, emotions);
        self.store.set_all(&updated)?;

        tracing::info!(visit_id, url, scores = emotions.len(), "Saved analysis");
        Ok(visit_id)
    }

    /// Current store contents.
    pub fn snapshot(&self) -> Result<StoreSnapshot, RecordError> {
        Ok(self.store.get_all()?)
    }
}

/// Next visit id for a store image: the number of recorded visits plus one.
///
/// Never lower than one past the highest id already issued.
pub fn next_visit_id(snapshot: &StoreSnapshot) -> VisitId {
    let count = snapshot.id_to_url.len() as VisitId;
    let last = snapshot.id_to_url.keys().next_back().copied().unwrap_or(0);

    // Only differs from count + 1 if the mapping was edited outside the recorder.
    if last > count {
        tracing::warn!(count, last, "id_to_url has gaps, continuing after the highest id");
    }
    count.max(last) + 1
}

/// Pure merge step: the id the visit gets and the store image with it added.
///
/// Emotions missing from `emotions` get no entry at all for the new id.
pub fn merge_visit(
    current: &StoreSnapshot,
    url: &str,
    emotions: &EmotionVector,
) -> (VisitId, StoreSnapshot) {
    let visit_id = next_visit_id(current);

    let mut updated = current.clone();
    updated.id_to_url.insert(visit_id, url.to_string());
    for (key, score) in emotions.iter() {
        updated.scores_mut(key).insert(visit_id, score);
    }

    (visit_id, updated)
}
