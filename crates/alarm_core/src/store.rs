use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::debug;

use crate::alarm::{Alarm, AlarmId, UNSAVED_ID};
use crate::error::StoreResult;

/// Durable alarm records. Implementations must keep `subscribe_active` in step with every write.
pub trait AlarmStore: Send + Sync {
    /// Live view of non-deleted alarms ordered by hour, then minute.
    fn subscribe_active(&self) -> watch::Receiver<Vec<Alarm>>;
    fn list_active(&self) -> StoreResult<Vec<Alarm>>;
    fn get(&self, id: AlarmId) -> StoreResult<Option<Alarm>>;
    /// Inserts `alarm`, replacing any row with the same non-zero id. Returns the row id.
    fn insert(&self, alarm: Alarm) -> StoreResult<AlarmId>;
    /// Overwrites the row with `alarm.id`; absent rows are left alone.
    fn update(&self, alarm: &Alarm) -> StoreResult<()>;
    fn delete(&self, alarm: &Alarm) -> StoreResult<()> {
        self.delete_by_id(alarm.id)
    }
    fn delete_by_id(&self, id: AlarmId) -> StoreResult<()>;
    /// Removes every soft-deleted row, returning how many went.
    fn purge_deleted(&self) -> StoreResult<usize>;
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct TableFile {
    next_id: AlarmId,
    alarms: Vec<Alarm>,
}

#[derive(Debug, Clone, PartialEq)]
struct Rows {
    next_id: AlarmId,
    alarms: BTreeMap<AlarmId, Alarm>,
}

impl Rows {
    fn empty() -> Self {
        Self {
            next_id: 1,
            alarms: BTreeMap::new(),
        }
    }
}

/// The alarm table: in memory, optionally mirrored to a JSON file after every write.
///
/// A file-backed table treats the file as the source of truth. Every write first re-reads it, so
/// rows written by another process sharing the file are merged rather than overwritten. Readers
/// in long-lived processes call [`AlarmTable::reload`] to pick up such writes.
pub struct AlarmTable {
    rows: RwLock<Rows>,
    path: Option<PathBuf>,
    active_tx: watch::Sender<Vec<Alarm>>,
}

impl AlarmTable {
    pub fn in_memory() -> Self {
        Self::from_rows(Rows::empty(), None)
    }

    /// Opens the table stored at `path`, starting empty when the file does not exist yet.
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref().to_path_buf();
        let rows = read_rows(&path)?;
        debug!(path = %path.display(), rows = rows.alarms.len(), "alarm table loaded");
        Ok(Self::from_rows(rows, Some(path)))
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Every row, soft-deleted ones included.
    pub fn all(&self) -> Vec<Alarm> {
        self.rows.read().alarms.values().cloned().collect()
    }

    /// Re-reads the backing file. Returns `true` when it held changes made elsewhere, in which
    /// case subscribers receive the new snapshot.
    pub fn reload(&self) -> StoreResult<bool> {
        let mut rows = self.rows.write();
        let changed = self.sync_from_disk(&mut rows)?;
        if changed {
            debug!(rows = rows.alarms.len(), "alarm table changed on disk");
            self.active_tx.send_replace(active_snapshot(&rows.alarms));
        }
        Ok(changed)
    }

    fn from_rows(rows: Rows, path: Option<PathBuf>) -> Self {
        let (active_tx, _) = watch::channel(active_snapshot(&rows.alarms));
        Self {
            rows: RwLock::new(rows),
            path,
            active_tx,
        }
    }

    fn sync_from_disk(&self, rows: &mut Rows) -> StoreResult<bool> {
        let Some(path) = &self.path else {
            return Ok(false);
        };
        let fresh = read_rows(path)?;
        if fresh == *rows {
            return Ok(false);
        }
        *rows = fresh;
        Ok(true)
    }

    /// Applies `apply` to the freshest rows. The closure reports whether it changed anything;
    /// unchanged tables are not rewritten.
    fn mutate<T>(&self, apply: impl FnOnce(&mut Rows) -> (T, bool)) -> StoreResult<T> {
        let mut rows = self.rows.write();
        let reloaded = self.sync_from_disk(&mut rows)?;
        let before = rows.clone();
        let (outcome, changed) = apply(&mut rows);
        if changed {
            if let Err(err) = self.persist(&rows) {
                *rows = before;
                if reloaded {
                    self.active_tx.send_replace(active_snapshot(&rows.alarms));
                }
                return Err(err);
            }
        }
        if changed || reloaded {
            self.active_tx.send_replace(active_snapshot(&rows.alarms));
        }
        Ok(outcome)
    }

    fn persist(&self, rows: &Rows) -> StoreResult<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let file = TableFile {
            next_id: rows.next_id,
            alarms: rows.alarms.values().cloned().collect(),
        };
        let payload = serde_json::to_vec_pretty(&file)?;
        let staging = path.with_extension("json.tmp");
        {
            let mut out = fs::File::create(&staging)?;
            out.write_all(&payload)?;
            out.sync_all()?;
        }
        fs::rename(&staging, path)?;
        Ok(())
    }
}

fn read_rows(path: &Path) -> StoreResult<Rows> {
    if !path.exists() {
        return Ok(Rows::empty());
    }
    let raw = fs::read_to_string(path)?;
    if raw.trim().is_empty() {
        return Ok(Rows::empty());
    }
    let file = serde_json::from_str::<TableFile>(&raw)?;
    let alarms: BTreeMap<AlarmId, Alarm> = file
        .alarms
        .into_iter()
        .filter(|alarm| alarm.id != UNSAVED_ID)
        .map(|alarm| (alarm.id, alarm))
        .collect();
    let highest = alarms.keys().next_back().copied().unwrap_or(0);
    let next_id = file.next_id.max(highest + 1);
    Ok(Rows { next_id, alarms })
}

fn active_snapshot(alarms: &BTreeMap<AlarmId, Alarm>) -> Vec<Alarm> {
    let mut active: Vec<Alarm> = alarms.values().filter(|a| a.is_active()).cloned().collect();
    active.sort_by(|a, b| a.time.cmp(&b.time).then_with(|| a.id.cmp(&b.id)));
    active
}

impl AlarmStore for AlarmTable {
    fn subscribe_active(&self) -> watch::Receiver<Vec<Alarm>> {
        self.active_tx.subscribe()
    }

    fn list_active(&self) -> StoreResult<Vec<Alarm>> {
        Ok(active_snapshot(&self.rows.read().alarms))
    }

    fn get(&self, id: AlarmId) -> StoreResult<Option<Alarm>> {
        Ok(self.rows.read().alarms.get(&id).cloned())
    }

    fn insert(&self, mut alarm: Alarm) -> StoreResult<AlarmId> {
        self.mutate(|rows| {
            if alarm.id == UNSAVED_ID {
                alarm.id = rows.next_id;
            }
            rows.next_id = rows.next_id.max(alarm.id + 1);
            let id = alarm.id;
            rows.alarms.insert(id, alarm);
            (id, true)
        })
    }

    fn update(&self, alarm: &Alarm) -> StoreResult<()> {
        self.mutate(|rows| match rows.alarms.get_mut(&alarm.id) {
            Some(row) => {
                *row = alarm.clone();
                ((), true)
            }
            None => {
                debug!(id = alarm.id, "update skipped, row absent");
                ((), false)
            }
        })
    }

    fn delete_by_id(&self, id: AlarmId) -> StoreResult<()> {
        self.mutate(|rows| ((), rows.alarms.remove(&id).is_some()))
    }

    fn purge_deleted(&self) -> StoreResult<usize> {
        self.mutate(|rows| {
            let before = rows.alarms.len();
            rows.alarms.retain(|_, alarm| !alarm.deleted);
            let purged = before - rows.alarms.len();
            (purged, purged > 0)
        })
    }
}
