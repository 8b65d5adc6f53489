use thiserror::Error;

/// Errors surfaced by any layer of the HARE storage engine.
///
/// Lower layers define their own narrower error enums (`storage::DiskError`,
/// `wal::WalError`); this is the umbrella type the column-file / reader /
/// writer / cursor API returns, wrapping those via `#[from]` so a caller
/// only ever needs to match on one enum.
#[derive(Debug, Error)]
pub enum HareError {
    /// Header/magic/version mismatch, negative counters, or an unknown page
    /// type. Unrecoverable for the affected file.
    #[error("data corruption: {0}")]
    DataCorruption(String),

    /// Another process holds the exclusive file lock.
    #[error("file is locked by another process")]
    FileLocked,

    /// A `PageId`, `TupleId`, or slot index fell outside the legal range.
    #[error("out of bounds: {0}")]
    OutOfBounds(String),

    /// A read/update/delete targeted a tombstoned tuple.
    #[error("entry {0} is deleted")]
    EntryDeleted(u64),

    /// A write attempted to store null in a non-nullable column.
    #[error("null not allowed in non-nullable column")]
    NullNotAllowed,

    /// A variable-length value did not fit within a single page.
    #[error("value too large to fit in one page")]
    ValueTooLarge,

    /// An operation was attempted on a buffer pool whose close has begun.
    #[error("buffer pool is closed")]
    PoolClosed,

    /// An operation was attempted on a closed file/reader/writer/cursor.
    #[error("handle is closed")]
    Closed,

    /// Transport-level I/O failure, propagated as-is.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type HareResult<T> = Result<T, HareError>;
