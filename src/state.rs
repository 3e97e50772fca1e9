use parking_lot::Mutex;
use redb::{Database, ReadableTable, TableDefinition};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

use crate::config::Config;
use crate::emotion::{EmotionKey, EmotionVector};

/// Identifier of one recorded page visit. Starts at 1 and only grows.
pub type VisitId = u64;

#[derive(Error, Debug)]
pub enum StateError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Database error: {0}")]
    Redb(#[from] redb::Error),

    #[error("Database creation error: {0}")]
    RedbCreate(#[from] redb::DatabaseError),

    #[error("Transaction error: {0}")]
    Transaction(#[from] redb::TransactionError),

    #[error("Table error: {0}")]
    Table(#[from] redb::TableError),

    #[error("Commit error: {0}")]
    Commit(#[from] redb::CommitError),

    #[error("Storage error: {0}")]
    Storage(#[from] redb::StorageError),

    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

// ============================================================================
// STORE LAYOUT
// ============================================================================

/// Store key holding the visit id to URL mapping.
pub const ID_TO_URL_KEY: &str = "id_to_url";

/// Whole-store image: the URL mapping plus one score mapping per emotion.
///
/// Serializes to the persisted layout, with every mapping keyed by the decimal
/// string form of the visit id.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StoreSnapshot {
    #[serde(default)]
    pub id_to_url: BTreeMap<VisitId, String>,
    #[serde(default)]
    pub anger: BTreeMap<VisitId, f64>,
    #[serde(default)]
    pub joy: BTreeMap<VisitId, f64>,
    #[serde(default)]
    pub sadness: BTreeMap<VisitId, f64>,
    #[serde(default)]
    pub fear: BTreeMap<VisitId, f64>,
    #[serde(default)]
    pub neutral: BTreeMap<VisitId, f64>,
    #[serde(default)]
    pub surprise: BTreeMap<VisitId, f64>,
}

impl StoreSnapshot {
    pub fn scores(&self, key: EmotionKey) -> &BTreeMap<VisitId, f64> {
        match key {
            EmotionKey::Anger => &self.anger,
            EmotionKey::Joy => &self.joy,
            EmotionKey::Sadness => &self.sadness,
            EmotionKey::Fear => &self.fear,
            EmotionKey::Neutral => &self.neutral,
            EmotionKey::Surprise => &self.surprise,
        }
    }

    pub fn scores_mut(&mut self, key: EmotionKey) -> &mut BTreeMap<VisitId, f64> {
        match key {
            EmotionKey::Anger => &mut self.anger,
            EmotionKey::Joy => &mut self.joy,
            EmotionKey::Sadness => &mut self.sadness,
            EmotionKey::Fear => &mut self.fear,
            EmotionKey::Neutral => &mut self.neutral,
            EmotionKey::Surprise => &mut self.surprise,
        }
    }

    pub fn visit_count(&self) -> usize {
        self.id_to_url.len()
    }

    /// Reassemble one visit from the parallel mappings.
    pub fn visit(&self, id: VisitId) -> Option<VisitRecord> {
        let url = self.id_to_url.get(&id)?;
        let mut emotions = EmotionVector::new();
        for key in EmotionKey::ALL {
            if let Some(score) = self.scores(key).get(&id) {
                emotions.insert(key, *score);
            }
        }
        Some(VisitRecord {
            id,
            url: url.clone(),
            emotions,
        })
    }

    /// All visits in id order.
    pub fn visits(&self) -> impl Iterator<Item = VisitRecord> + '_ {
        self.id_to_url.keys().filter_map(move |id| self.visit(*id))
    }
}

/// Logical view of one recorded visit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VisitRecord {
    pub id: VisitId,
    pub url: String,
    pub emotions: EmotionVector,
}

// ============================================================================
// STORE INTERFACE
// ============================================================================

/// Durable whole-store persistence. Reads and writes always move the full snapshot.
pub trait VisitStore: Send + Sync {
    fn get_all(&self) -> Result<StoreSnapshot, StateError>;

    /// Replace the stored contents with `snapshot` in one commit.
    fn set_all(&self, snapshot: &StoreSnapshot) -> Result<(), StateError>;
}

/// redb-backed store. Each of the seven mappings lives under its own key as a JSON document.
pub struct RedbStore {
    db: Arc<Database>,
    path: PathBuf,
}

impl RedbStore {
    // Single table so one write transaction covers every mapping.
    const STORE: TableDefinition<'static, &'static str, &'static [u8]> = TableDefinition::new("store");

    pub fn new<P: AsRef<Path>>(data_dir: P) -> Result<Self, StateError> {
        let data_path = data_dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&data_path)?;

        let db_path = data_path.join(Config::STORE_FILE_NAME);
        let db = Database::create(&db_path)?;

        // Open the table once so readers never race its creation.
        let write_txn = db.begin_write()?;
        {
            let _store = write_txn.open_table(Self::STORE)?;
        }
        write_txn.commit()?;

        Ok(Self {
            db: Arc::new(db),
            path: db_path,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn decode<T: for<'de> Deserialize<'de>>(key: &str, bytes: &[u8]) -> Result<T, StateError> {
        serde_json::from_slice(bytes)
            .map_err(|e| StateError::Serialization(format!("Decoding '{}' failed: {}", key, e)))
    }

    fn encode<T: Serialize>(key: &str, value: &T) -> Result<Vec<u8>, StateError> {
        serde_json::to_vec(value)
            .map_err(|e| StateError::Serialization(format!("Encoding '{}' failed: {}", key, e)))
    }
}

impl VisitStore for RedbStore {
    fn get_all(&self) -> Result<StoreSnapshot, StateError> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(Self::STORE)?;

        let mut snapshot = StoreSnapshot::default();
        if let Some(bytes) = table.get(ID_TO_URL_KEY)? {
            snapshot.id_to_url = Self::decode(ID_TO_URL_KEY, bytes.value())?;
        }
        for key in EmotionKey::ALL {
            if let Some(bytes) = table.get(key.as_str())? {
                *snapshot.scores_mut(key) = Self::decode(key.as_str(), bytes.value())?;
            }
        }

        Ok(snapshot)
    }

    fn set_all(&self, snapshot: &StoreSnapshot) -> Result<(), StateError> {
        // Encode everything up front so a serialization failure never opens a transaction.
        let mut encoded = Vec::with_capacity(EmotionKey::ALL.len() + 1);
        encoded.push((ID_TO_URL_KEY, Self::encode(ID_TO_URL_KEY, &snapshot.id_to_url)?));
        for key in EmotionKey::ALL {
            encoded.push((key.as_str(), Self::encode(key.as_str(), snapshot.scores(key))?));
        }

        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(Self::STORE)?;
            for (key, bytes) in &encoded {
                table.insert(*key, bytes.as_slice())?;
            }
        }
        write_txn.commit()?;
        Ok(())
    }
}

impl RedbStore {
    /// Raw store keys currently present, for schema checks.
    pub fn keys(&self) -> Result<Vec<String>, StateError> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(Self::STORE)?;

        let mut keys = Vec::new();
        for result in table.iter()? {
            let (key, _value) = result?;
            keys.push(key.value().to_string());
        }
        Ok(keys)
    }
}

/// Process-local store, used for ephemeral runs and tests.
#[derive(Default)]
pub struct MemoryStore {
    snapshot: Mutex<StoreSnapshot>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_snapshot(snapshot: StoreSnapshot) -> Self {
        Self {
            snapshot: Mutex::new(snapshot),
        }
    }
}

impl VisitStore for MemoryStore {
    fn get_all(&self) -> Result<StoreSnapshot, StateError> {
        Ok(self.snapshot.lock().clone())
    }

    fn set_all(&self, snapshot: &StoreSnapshot) -> Result<(), StateError> {
        *self.snapshot.lock() = snapshot.clone();
        Ok(())
    }
}
