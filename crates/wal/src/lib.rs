//! Companion write-ahead log for a single HARE page file.
//!
//! The log is a flat, append-only sequence of `{txnId, op, pageId, payload}`
//! records, one record per staged disk-manager effect (`update`, `allocate`,
//! `free`), optionally terminated by a `Commit` or `Abort` marker record.
//! States form a sealed set: `Logging` (no terminal marker yet written),
//! `Aborted`, and `Committed` — the latter two are terminal. Replay treats
//! `Logging` the same as `Committed` (redo), and only `Aborted` discards;
//! see `DESIGN.md` for why this is the prescribed, not merely convenient,
//! choice.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use log::{debug, warn};
use thiserror::Error;

pub type PageId = u64;
pub type TxnId = u64;

#[derive(Debug, Error)]
pub enum WalError {
    #[error("wal io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("wal corruption: {0}")]
    Corrupt(String),
}

pub type WalResult<T> = Result<T, WalError>;

/// One staged disk-manager effect, plus the two terminal markers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WalOp {
    Update { page_id: PageId, data: Vec<u8> },
    Allocate { page_id: PageId },
    Free { page_id: PageId },
    Commit,
    Abort,
}

impl WalOp {
    fn kind(&self) -> u8 {
        match self {
            WalOp::Update { .. } => 0,
            WalOp::Allocate { .. } => 1,
            WalOp::Free { .. } => 2,
            WalOp::Commit => 3,
            WalOp::Abort => 4,
        }
    }
}

/// A single framed log record: `{txnId, op}`. Framing includes a per-record
/// length prefix (counting itself) so replay can resync after any record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalRecord {
    pub txn_id: TxnId,
    pub op: WalOp,
}

impl WalRecord {
    fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.extend_from_slice(&0u32.to_le_bytes()); // length placeholder
        buf.push(self.op.kind());
        buf.extend_from_slice(&self.txn_id.to_le_bytes());
        match &self.op {
            WalOp::Update { page_id, data } => {
                buf.extend_from_slice(&page_id.to_le_bytes());
                buf.extend_from_slice(&(data.len() as u32).to_le_bytes());
                buf.extend_from_slice(data);
            }
            WalOp::Allocate { page_id } | WalOp::Free { page_id } => {
                buf.extend_from_slice(&page_id.to_le_bytes());
            }
            WalOp::Commit | WalOp::Abort => {}
        }
        let len = buf.len() as u32;
        buf[0..4].copy_from_slice(&len.to_le_bytes());
        buf
    }

    fn from_reader(file: &mut File) -> WalResult<Option<WalRecord>> {
        let mut len_bytes = [0u8; 4];
        match file.read_exact(&mut len_bytes) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
            Err(e) => return Err(e.into()),
        }
        let len = u32::from_le_bytes(len_bytes) as usize;
        if len < 4 + 1 + 8 {
            return Err(WalError::Corrupt(format!("record length {len} too small")));
        }
        let mut body = vec![0u8; len - 4];
        file.read_exact(&mut body)?;
        let kind = body[0];
        let txn_id = u64::from_le_bytes(body[1..9].try_into().unwrap());
        let op = match kind {
            0 => {
                if body.len() < 9 + 8 + 4 {
                    return Err(WalError::Corrupt("update record truncated".into()));
                }
                let page_id = u64::from_le_bytes(body[9..17].try_into().unwrap());
                let data_len = u32::from_le_bytes(body[17..21].try_into().unwrap()) as usize;
                if body.len() < 21 + data_len {
                    return Err(WalError::Corrupt("update payload truncated".into()));
                }
                WalOp::Update {
                    page_id,
                    data: body[21..21 + data_len].to_vec(),
                }
            }
            1 | 2 => {
                if body.len() < 9 + 8 {
                    return Err(WalError::Corrupt("allocate/free record truncated".into()));
                }
                let page_id = u64::from_le_bytes(body[9..17].try_into().unwrap());
                if kind == 1 {
                    WalOp::Allocate { page_id }
                } else {
                    WalOp::Free { page_id }
                }
            }
            3 => WalOp::Commit,
            4 => WalOp::Abort,
            other => return Err(WalError::Corrupt(format!("unknown wal record kind {other}"))),
        };
        Ok(Some(WalRecord { txn_id, op }))
    }
}

/// Outcome of scanning a log's records for its terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxnLogState {
    /// No terminal marker was found. Treated the same as `Committed` on
    /// replay: a crash mid-session is assumed to want its staged effects
    /// completed (redo), since page writes are idempotent.
    Logging,
    Aborted,
    Committed,
}

/// The records that should be applied to the page file on replay, in order,
/// together with the state that led to that decision.
pub struct ReplayPlan {
    pub state: TxnLogState,
    pub ops: Vec<(TxnId, WalOp)>,
}

/// Companion write-ahead log file for one page file.
pub struct WalLog {
    file: File,
    path: PathBuf,
}

impl WalLog {
    /// Opens (creating if absent) the companion log at `path`. Does not
    /// truncate or replay; callers drive replay explicitly via [`WalLog::replay_plan`].
    pub fn open(path: impl AsRef<Path>) -> WalResult<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(&path)?;
        Ok(Self { file, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn append(&mut self, record: &WalRecord) -> WalResult<()> {
        self.file.seek(SeekFrom::End(0))?;
        self.file.write_all(&record.to_bytes())?;
        Ok(())
    }

    pub fn append_update(&mut self, txn_id: TxnId, page_id: PageId, data: Vec<u8>) -> WalResult<()> {
        self.append(&WalRecord {
            txn_id,
            op: WalOp::Update { page_id, data },
        })
    }

    pub fn append_allocate(&mut self, txn_id: TxnId, page_id: PageId) -> WalResult<()> {
        self.append(&WalRecord {
            txn_id,
            op: WalOp::Allocate { page_id },
        })
    }

    pub fn append_free(&mut self, txn_id: TxnId, page_id: PageId) -> WalResult<()> {
        self.append(&WalRecord {
            txn_id,
            op: WalOp::Free { page_id },
        })
    }

    /// Writes the `Commit` marker. Per the prescribed "marker-before-truncate"
    /// ordering, callers must fsync this before applying staged effects to
    /// the page file, and must only [`WalLog::truncate`] afterward.
    pub fn append_commit(&mut self, txn_id: TxnId) -> WalResult<()> {
        self.append(&WalRecord {
            txn_id,
            op: WalOp::Commit,
        })
    }

    /// Writes the `Abort` marker. Discards on replay; no effects are applied.
    pub fn append_abort(&mut self, txn_id: TxnId) -> WalResult<()> {
        self.append(&WalRecord {
            txn_id,
            op: WalOp::Abort,
        })
    }

    /// Forces the log's durability.
    pub fn sync(&self) -> WalResult<()> {
        self.file.sync_data()?;
        Ok(())
    }

    /// Discards all records, resetting the log to empty. Called after a
    /// successful apply (post-commit) or after an explicit rollback.
    pub fn truncate(&mut self) -> WalResult<()> {
        self.file.set_len(0)?;
        self.file.seek(SeekFrom::Start(0))?;
        self.file.sync_data()?;
        Ok(())
    }

    pub fn is_empty(&self) -> WalResult<bool> {
        Ok(self.file.metadata()?.len() == 0)
    }

    /// Reads every record currently in the log, in order.
    pub fn read_all(&mut self) -> WalResult<Vec<WalRecord>> {
        self.file.seek(SeekFrom::Start(0))?;
        let mut records = Vec::new();
        loop {
            match WalRecord::from_reader(&mut self.file) {
                Ok(Some(record)) => records.push(record),
                Ok(None) => break,
                Err(e) => {
                    warn!("wal {:?}: stopping replay scan on corrupt record: {e}", self.path);
                    return Err(e);
                }
            }
        }
        Ok(records)
    }

    /// Scans the log and decides what replay should do: which non-marker
    /// ops to apply (possibly none, if aborted) and the terminal state that
    /// led to that decision.
    pub fn replay_plan(&mut self) -> WalResult<ReplayPlan> {
        let records = self.read_all()?;
        let state = match records.last().map(|r| &r.op) {
            Some(WalOp::Commit) => TxnLogState::Committed,
            Some(WalOp::Abort) => TxnLogState::Aborted,
            _ => TxnLogState::Logging,
        };
        let ops = match state {
            TxnLogState::Aborted => Vec::new(),
            TxnLogState::Committed | TxnLogState::Logging => records
                .into_iter()
                .filter(|r| !matches!(r.op, WalOp::Commit | WalOp::Abort))
                .map(|r| (r.txn_id, r.op))
                .collect(),
        };
        debug!(
            "wal {:?}: replay decided state={:?} ops={}",
            self.path,
            state,
            ops.len()
        );
        Ok(ReplayPlan { state, ops })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn round_trips_update_record() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.wal");
        let mut log = WalLog::open(&path).unwrap();
        log.append_update(1, 7, vec![1, 2, 3]).unwrap();
        log.append_commit(1).unwrap();
        log.sync().unwrap();

        let mut reopened = WalLog::open(&path).unwrap();
        let plan = reopened.replay_plan().unwrap();
        assert_eq!(plan.state, TxnLogState::Committed);
        assert_eq!(plan.ops.len(), 1);
        assert_eq!(
            plan.ops[0],
            (1, WalOp::Update { page_id: 7, data: vec![1, 2, 3] })
        );
    }

    #[test]
    fn abort_marker_discards_ops() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.wal");
        let mut log = WalLog::open(&path).unwrap();
        log.append_allocate(2, 9).unwrap();
        log.append_abort(2).unwrap();

        let plan = log.replay_plan().unwrap();
        assert_eq!(plan.state, TxnLogState::Aborted);
        assert!(plan.ops.is_empty());
    }

    #[test]
    fn missing_terminal_marker_is_logging_and_applies() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.wal");
        let mut log = WalLog::open(&path).unwrap();
        log.append_free(3, 11).unwrap();

        let plan = log.replay_plan().unwrap();
        assert_eq!(plan.state, TxnLogState::Logging);
        assert_eq!(plan.ops, vec![(3, WalOp::Free { page_id: 11 })]);
    }

    #[test]
    fn truncate_empties_the_log() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.wal");
        let mut log = WalLog::open(&path).unwrap();
        log.append_allocate(4, 1).unwrap();
        log.truncate().unwrap();
        assert!(log.is_empty().unwrap());
        let plan = log.replay_plan().unwrap();
        assert_eq!(plan.state, TxnLogState::Logging);
        assert!(plan.ops.is_empty());
    }
}
