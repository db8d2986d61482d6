use inbox_core::{InboxItem, ItemStatus, SeqNo, Session};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("lock poisoned: {0}")]
    Poisoned(&'static str),
    #[error("session {0} already exists")]
    DuplicateSession(String),
}

impl StorageError {
    fn poisoned<T>(what: &'static str) -> impl FnOnce(PoisonError<T>) -> Self {
        move |_| StorageError::Poisoned(what)
    }
}

/// A stored session behind its own lock. Holding the guard is the per-session
/// critical section: changes made through it are the persisted state.
pub type SessionSlot = Arc<Mutex<Session>>;

pub fn lock_session(slot: &SessionSlot) -> Result<MutexGuard<'_, Session>, StorageError> {
    slot.lock().map_err(StorageError::poisoned("session"))
}

pub trait SessionStore: Send + Sync {
    fn insert(&self, session: Session) -> Result<(), StorageError>;

    fn slot(&self, session_id: &str) -> Result<Option<SessionSlot>, StorageError>;

    /// Point-in-time copy of every stored session, in no particular order.
    fn list(&self) -> Result<Vec<Session>, StorageError>;

    fn get(&self, session_id: &str) -> Result<Option<Session>, StorageError> {
        let Some(slot) = self.slot(session_id)? else {
            return Ok(None);
        };
        let session = lock_session(&slot)?.clone();
        Ok(Some(session))
    }
}

pub trait ItemStore: Send + Sync {
    fn get(&self, session_id: &str, seq_no: SeqNo) -> Result<Option<InboxItem>, StorageError>;

    /// Stores `item` unless its `(session_id, seq_no)` key is taken. Returns
    /// whether the insert happened.
    fn insert_if_absent(&self, item: InboxItem) -> Result<bool, StorageError>;

    /// Replaces the stored item with `item` only while the stored status still
    /// equals `expected`. Returns whether the swap happened.
    fn compare_and_swap(&self, expected: ItemStatus, item: InboxItem)
        -> Result<bool, StorageError>;

    /// All items of a session, ascending by sequence number.
    fn list(&self, session_id: &str) -> Result<Vec<InboxItem>, StorageError>;

    fn list_by_status(
        &self,
        session_id: &str,
        status: ItemStatus,
    ) -> Result<Vec<InboxItem>, StorageError> {
        Ok(self
            .list(session_id)?
            .into_iter()
            .filter(|item| item.status == status)
            .collect())
    }
}

#[derive(Debug, Default)]
pub struct InMemorySessionStore {
    sessions: RwLock<HashMap<String, SessionSlot>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionStore for InMemorySessionStore {
    fn insert(&self, session: Session) -> Result<(), StorageError> {
        let mut sessions = self
            .sessions
            .write()
            .map_err(StorageError::poisoned("sessions"))?;
        if sessions.contains_key(&session.id) {
            return Err(StorageError::DuplicateSession(session.id));
        }
        sessions.insert(session.id.clone(), Arc::new(Mutex::new(session)));
        Ok(())
    }

    fn slot(&self, session_id: &str) -> Result<Option<SessionSlot>, StorageError> {
        let sessions = self
            .sessions
            .read()
            .map_err(StorageError::poisoned("sessions"))?;
        Ok(sessions.get(session_id).cloned())
    }

    fn list(&self) -> Result<Vec<Session>, StorageError> {
        let slots: Vec<SessionSlot> = self
            .sessions
            .read()
            .map_err(StorageError::poisoned("sessions"))?
            .values()
            .cloned()
            .collect();

        slots
            .iter()
            .map(|slot| lock_session(slot).map(|session| session.clone()))
            .collect()
    }
}

type Partition = Arc<Mutex<BTreeMap<SeqNo, InboxItem>>>;

/// Items partitioned per session; each partition has its own lock so that
/// sessions never contend with each other.
#[derive(Debug, Default)]
pub struct InMemoryItemStore {
    partitions: RwLock<HashMap<String, Partition>>,
}

impl InMemoryItemStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn partition(&self, session_id: &str) -> Result<Option<Partition>, StorageError> {
        let partitions = self
            .partitions
            .read()
            .map_err(StorageError::poisoned("items"))?;
        Ok(partitions.get(session_id).cloned())
    }

    fn partition_or_create(&self, session_id: &str) -> Result<Partition, StorageError> {
        if let Some(partition) = self.partition(session_id)? {
            return Ok(partition);
        }
        let mut partitions = self
            .partitions
            .write()
            .map_err(StorageError::poisoned("items"))?;
        Ok(partitions
            .entry(session_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(BTreeMap::new())))
            .clone())
    }
}

impl ItemStore for InMemoryItemStore {
    fn get(&self, session_id: &str, seq_no: SeqNo) -> Result<Option<InboxItem>, StorageError> {
        let Some(partition) = self.partition(session_id)? else {
            return Ok(None);
        };
        let items = partition.lock().map_err(StorageError::poisoned("items"))?;
        Ok(items.get(&seq_no).cloned())
    }

    fn insert_if_absent(&self, item: InboxItem) -> Result<bool, StorageError> {
        let partition = self.partition_or_create(&item.session_id)?;
        let mut items = partition.lock().map_err(StorageError::poisoned("items"))?;
        if items.contains_key(&item.seq_no) {
            return Ok(false);
        }
        items.insert(item.seq_no, item);
        Ok(true)
    }

    fn compare_and_swap(
        &self,
        expected: ItemStatus,
        item: InboxItem,
    ) -> Result<bool, StorageError> {
        let Some(partition) = self.partition(&item.session_id)? else {
            return Ok(false);
        };
        let mut items = partition.lock().map_err(StorageError::poisoned("items"))?;
        match items.get_mut(&item.seq_no) {
            Some(current) if current.status == expected => {
                *current = item;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    fn list(&self, session_id: &str) -> Result<Vec<InboxItem>, StorageError> {
        let Some(partition) = self.partition(session_id)? else {
            return Ok(Vec::new());
        };
        let items = partition.lock().map_err(StorageError::poisoned("items"))?;
        Ok(items.values().cloned().collect())
    }
}
