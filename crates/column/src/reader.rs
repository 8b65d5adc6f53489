//! Read-only access to a column file, holding the file's close-lock shared
//! for as long as the `Reader` lives.

use std::marker::PhantomData;
use std::sync::Arc;

use hare_common::{ColumnType, HareResult, TupleId};

use crate::cursor::Cursor;
use crate::file::{ColumnFile, CloseLockGuard};

/// A shared handle for point reads and cursors over a column file. Several
/// readers may be live at once alongside at most one [`crate::writer::Writer`].
pub struct Reader<F, C: ColumnType> {
    file: Arc<F>,
    _close_guard: CloseLockGuard,
    _value: PhantomData<C>,
}

impl<F: ColumnFile<C>, C: ColumnType> Reader<F, C> {
    pub(crate) fn new(file: Arc<F>, close_guard: CloseLockGuard) -> Self {
        Self {
            file,
            _close_guard: close_guard,
            _value: PhantomData,
        }
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
    fn reader_sees_committed_writes_and_classifies_null_and_deleted() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("reader.hare");
        FixedColumnFile::create(&path, &F64Scalar, false, Some(12)).unwrap();
        let file = FixedColumnFile::open(&path, F64Scalar, true, false, 16, EvictionPolicy::Lru).unwrap();
        let handle = ColumnFileHandle::new(file);

        {
            let mut writer = handle.writer().unwrap();
            writer.append(Some(&1.0)).unwrap();
            writer.append(None).unwrap();
            writer.append(Some(&3.0)).unwrap();
            writer.delete(2).unwrap();
            writer.commit().unwrap();
        }

        let reader = handle.reader().unwrap();
        assert_eq!(reader.get(0).unwrap(), Some(1.0));
        assert!(reader.is_null(1).unwrap());
        assert!(reader.is_deleted(2).unwrap());
        assert_eq!(reader.count().unwrap(), 2);
    }

    #[test]
    fn two_readers_may_be_live_at_once() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("reader2.hare");
        FixedColumnFile::create(&path, &F64Scalar, false, Some(12)).unwrap();
        let file = FixedColumnFile::open(&path, F64Scalar, false, false, 16, EvictionPolicy::Lru).unwrap();
        let handle = ColumnFileHandle::new(file);
        let r1 = handle.reader().unwrap();
        let r2 = handle.reader().unwrap();
        assert_eq!(r1.count().unwrap(), 0);
        assert_eq!(r2.count().unwrap(), 0);
    }
}
