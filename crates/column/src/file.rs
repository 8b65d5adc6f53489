//! The common contract [`crate::reader::Reader`], [`crate::writer::Writer`],
//! and [`crate::cursor::Cursor`] are built against, implemented by both
//! [`crate::fixed::FixedColumnFile`] and [`crate::variable::VariableColumnFile`],
//! plus the file-wide close-lock and writer-exclusive discipline those
//! handles coordinate through.

use std::marker::PhantomData;
use std::sync::Arc;

use parking_lot::{Condvar, Mutex};

use hare_common::{ColumnType, HareError, HareResult, TupleId};

/// Operations shared by the fixed and variable column file layouts.
///
/// `PositionHint` lets a [`crate::cursor::Cursor`] carry state between steps
/// that helps the backing file avoid repeating work it would otherwise redo
/// from scratch — a variable file's current directory page, for a fixed
/// file nothing (`get` is already constant-time arithmetic).
pub trait ColumnFile<C: ColumnType> {
    type PositionHint: Copy + Default;

    /// Reads `tuple_id`, using (and returning an updated) position hint.
    fn get_with_hint(
        &self,
        hint: Self::PositionHint,
        tuple_id: TupleId,
    ) -> HareResult<(Option<C::Value>, Self::PositionHint)>;

    fn get(&self, tuple_id: TupleId) -> HareResult<Option<C::Value>> {
        Ok(self.get_with_hint(Self::PositionHint::default(), tuple_id)?.0)
    }

    fn is_null(&self, tuple_id: TupleId) -> HareResult<bool> {
        Ok(self.get(tuple_id)?.is_none())
    }

    fn is_deleted(&self, tuple_id: TupleId) -> HareResult<bool> {
        match self.get(tuple_id) {
            Ok(_) => Ok(false),
            Err(HareError::EntryDeleted(_)) => Ok(true),
            Err(e) => Err(e),
        }
    }

    fn count(&self) -> HareResult<u64>;
    fn max_tuple_id(&self) -> HareResult<Option<TupleId>>;

    fn append(&self, value: Option<&C::Value>) -> HareResult<TupleId>;
    fn update(&self, tuple_id: TupleId, value: Option<&C::Value>) -> HareResult<()>;
    fn compare_and_update(
        &self,
        tuple_id: TupleId,
        expected: Option<&C::Value>,
        new: Option<&C::Value>,
    ) -> HareResult<bool>;
    fn delete(&self, tuple_id: TupleId) -> HareResult<Option<C::Value>>;

    fn commit(&self) -> HareResult<()>;
    fn rollback(&self) -> HareResult<()>;
    fn close(&self) -> HareResult<()>;
}

// ---------------------------------------------------------------------
// Close-lock and writer-exclusive discipline (spec.md §5 shared-resource
// policy): any live reader/writer/cursor holds the close-lock shared,
// `close()` takes it exclusive; at most one `Writer` is active at a time.
// ---------------------------------------------------------------------

struct CloseLockState {
    holders: u64,
    closing: bool,
}

#[derive(Clone)]
struct CloseLock {
    inner: Arc<Mutex<CloseLockState>>,
    released: Arc<Condvar>,
}

impl CloseLock {
    fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(CloseLockState {
                holders: 0,
                closing: false,
            })),
            released: Arc::new(Condvar::new()),
        }
    }

    fn acquire_shared(&self) -> HareResult<CloseLockGuard> {
        let mut state = self.inner.lock();
        if state.closing {
            return Err(HareError::Closed);
        }
        state.holders += 1;
        Ok(CloseLockGuard { lock: self.clone() })
    }

    /// Blocks until every shared holder has released, then marks the file
    /// closing so no new reader/writer can be issued.
    fn acquire_exclusive(&self) {
        let mut state = self.inner.lock();
        loop {
            if state.holders == 0 {
                state.closing = true;
                return;
            }
            self.released.wait(&mut state);
        }
    }
}

pub(crate) struct CloseLockGuard {
    lock: CloseLock,
}

impl Drop for CloseLockGuard {
    fn drop(&mut self) {
        let mut state = self.lock.inner.lock();
        state.holders -= 1;
        if state.holders == 0 {
            drop(state);
            self.lock.released.notify_all();
        }
    }
}

struct WriterLockState {
    active: bool,
}

#[derive(Clone)]
struct WriterLock {
    inner: Arc<Mutex<WriterLockState>>,
    released: Arc<Condvar>,
}

impl WriterLock {
    fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(WriterLockState { active: false })),
            released: Arc::new(Condvar::new()),
        }
    }

    fn acquire(&self) -> WriterLockGuard {
        let mut state = self.inner.lock();
        while state.active {
            self.released.wait(&mut state);
        }
        state.active = true;
        WriterLockGuard { lock: self.clone() }
    }
}

pub(crate) struct WriterLockGuard {
    lock: WriterLock,
}

impl Drop for WriterLockGuard {
    fn drop(&mut self) {
        let mut state = self.lock.inner.lock();
        state.active = false;
        drop(state);
        self.lock.released.notify_all();
    }
}

/// An opened column file shared between however many [`crate::reader::Reader`]s
/// and at most one [`crate::writer::Writer`] are live at a time. Cheaply
/// `Clone`; every clone refers to the same underlying file and locks.
pub struct ColumnFileHandle<F, C: ColumnType> {
    file: Arc<F>,
    close_lock: CloseLock,
    writer_lock: WriterLock,
    next_txn_id: Arc<Mutex<u64>>,
    _value: PhantomData<C>,
}

impl<F, C: ColumnType> Clone for ColumnFileHandle<F, C> {
    fn clone(&self) -> Self {
        Self {
            file: self.file.clone(),
            close_lock: self.close_lock.clone(),
            writer_lock: self.writer_lock.clone(),
            next_txn_id: self.next_txn_id.clone(),
            _value: PhantomData,
        }
    }
}

impl<F: ColumnFile<C>, C: ColumnType> ColumnFileHandle<F, C> {
    pub fn new(file: F) -> Self {
        Self {
            file: Arc::new(file),
            close_lock: CloseLock::new(),
            writer_lock: WriterLock::new(),
            next_txn_id: Arc::new(Mutex::new(1)),
            _value: PhantomData,
        }
    }

    /// Opens a read-only handle. Fails with [`HareError::Closed`] once
    /// [`ColumnFileHandle::close`] has begun.
    pub fn reader(&self) -> HareResult<crate::reader::Reader<F, C>> {
        let guard = self.close_lock.acquire_shared()?;
        Ok(crate::reader::Reader::new(self.file.clone(), guard))
    }

    /// Blocks until any other live `Writer` for this file has dropped, then
    /// opens one. Fails with [`HareError::Closed`] once close has begun.
    pub fn writer(&self) -> HareResult<crate::writer::Writer<F, C>> {
        let guard = self.close_lock.acquire_shared()?;
        let writer_guard = self.writer_lock.acquire();
        let txn_id = {
            let mut next = self.next_txn_id.lock();
            let id = *next;
            *next += 1;
            id
        };
        Ok(crate::writer::Writer::new(
            self.file.clone(),
            guard,
            writer_guard,
            txn_id,
        ))
    }

    /// Waits for every live reader/writer to drop, then closes the file.
    pub fn close(&self) -> HareResult<()> {
        self.close_lock.acquire_exclusive();
        self.file.close()
    }
}
