//! The sole writer of a column file at any given time. Every reader
//! operation is also available on `Writer`; mutations are tied to a
//! `TransactionId` assigned when the writer is opened. Dropping a `Writer`
//! that has staged writes without an explicit `commit()` rolls them back —
//! in the WAL configuration this is the only way an abandoned transaction's
//! effects are guaranteed discarded (spec.md §4.5/§4.6).

use std::marker::PhantomData;
use std::sync::Arc;

use log::warn;

use hare_common::{ColumnType, HareResult, TupleId, TxnId};

use crate::cursor::Cursor;
use crate::file::{CloseLockGuard, ColumnFile, WriterLockGuard};

pub struct Writer<F, C: ColumnType> {
    file: Arc<F>,
    _close_guard: CloseLockGuard,
    _writer_guard: WriterLockGuard,
    txn_id: TxnId,
    dirty: bool,
    closed: bool,
    _value: PhantomData<C>,
}

impl<F: ColumnFile<C>, C: ColumnType> Writer<F, C> {
    pub(crate) fn new(
        file: Arc<F>,
        close_guard: CloseLockGuard,
        writer_guard: WriterLockGuard,
        txn_id: TxnId,
    ) -> Self {
        Self {
            file,
            _close_guard: close_guard,
            _writer_guard: writer_guard,
            txn_id,
            dirty: false,
            closed: false,
            _value: PhantomData,
        }
    }

    pub fn transaction_id(&self) -> TxnId {
        self.txn_id
    }

    pub fn get(&self, tuple_id: TupleId) -> HareResult<Option<C::Value>> {
        self.file.get(tuple_id)
    }

    pub fn is_null(&self, tuple_id: TupleId) -> HareResult<bool> {
        self.file.is_null(tuple_id)
    }

    pub fn is_deleted(&self, tuple_id: TupleId) -> HareResult<bool> {
        self.file.is_deleted(tuple_id)
    }

    pub fn count(&self) -> HareResult<u64> {
        self.file.count()
    }

    pub fn max_tuple_id(&self) -> HareResult<Option<TupleId>> {
        self.file.max_tuple_id()
    }

    pub fn cursor(&self) -> Cursor<'_, F, C> {
        Cursor::new(&self.file)
    }

    pub fn append(&mut self, value: Option<&C::Value>) -> HareResult<TupleId> {
        let tuple_id = self.file.append(value)?;
        self.dirty = true;
        Ok(tuple_id)
    }

    pub fn update(&mut self, tuple_id: TupleId, value: Option<&C::Value>) -> HareResult<()> {
        self.file.update(tuple_id, value)?;
        self.dirty = true;
        Ok(())
    }

    pub fn compare_and_update(
        &mut self,
        tuple_id: TupleId,
        expected: Option<&C::Value>,
        new: Option<&C::Value>,
    ) -> HareResult<bool> {
        let applied = self.file.compare_and_update(tuple_id, expected, new)?;
        if applied {
            self.dirty = true;
        }
        Ok(applied)
    }

    pub fn delete(&mut self, tuple_id: TupleId) -> HareResult<Option<C::Value>> {
        let prior = self.file.delete(tuple_id)?;
        self.dirty = true;
        Ok(prior)
    }

    /// Makes every write since the last `commit`/`rollback` durable and
    /// visible to new readers (the sole such point in the WAL configuration).
    pub fn commit(&mut self) -> HareResult<()> {
        self.file.commit()?;
        self.dirty = false;
        Ok(())
    }

    /// Discards every write since the last `commit`.
    pub fn rollback(&mut self) -> HareResult<()> {
        self.file.rollback()?;
        self.dirty = false;
        Ok(())
    }

    /// Rolls back any uncommitted writes, then releases the writer-exclusive
    /// and close-lock holds. Equivalent to dropping the writer, but lets the
    /// caller observe the result.
    pub fn close(mut self) -> HareResult<()> {
        if self.dirty {
            self.file.rollback()?;
            self.dirty = false;
        }
        self.closed = true;
        Ok(())
    }
}

impl<F: ColumnFile<C>, C: ColumnType> Drop for Writer<F, C> {
    fn drop(&mut self) {
        if !self.closed && self.dirty {
            warn!("writer txn={} dropped with uncommitted writes, rolling back", self.txn_id);
            let _ = self.file.rollback();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixed::FixedColumnFile;
    use crate::file::ColumnFileHandle;
    use hare_common::F64Scalar;
    use hare_storage::EvictionPolicy;
    use tempfile::tempdir;

    #[test]
    fn dropping_writer_without_commit_rolls_back() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("writer1.hare");
        FixedColumnFile::create(&path, &F64Scalar, true, Some(12)).unwrap();
        let file = FixedColumnFile::open(&path, F64Scalar, false, true, 16, EvictionPolicy::Lru).unwrap();
        let handle = ColumnFileHandle::new(file);

        {
            let mut writer = handle.writer().unwrap();
            writer.append(Some(&1.0)).unwrap();
            writer.commit().unwrap();
        }
        {
            let mut writer = handle.writer().unwrap();
            writer.append(Some(&2.0)).unwrap();
            // dropped without commit: staged append must roll back
        }

        let reader = handle.reader().unwrap();
        assert_eq!(reader.count().unwrap(), 1);
        assert_eq!(reader.get(0).unwrap(), Some(1.0));
    }

    #[test]
    fn only_one_writer_is_issued_at_a_time() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("writer2.hare");
        FixedColumnFile::create(&path, &F64Scalar, false, Some(12)).unwrap();
        let file = FixedColumnFile::open(&path, F64Scalar, false, false, 16, EvictionPolicy::Lru).unwrap();
        let handle = ColumnFileHandle::new(file);

        let first = handle.writer().unwrap();
        let handle2 = handle.clone();
        let second = std::thread::spawn(move || {
            let _writer = handle2.writer().unwrap();
        });
        // Give the spawned thread a chance to block on the writer lock
        // before releasing it.
        std::thread::sleep(std::time::Duration::from_millis(20));
        drop(first);
        second.join().unwrap();
    }
}
