//! Fixed-width column file: `TupleId -> (PageId, SlotId)` via a closed-form
//! formula, no directory lookup. Data pages hold a front region of 8-byte
//! entry-header flag words (`NULL` bit 0, `DELETED` bit 1) and a back region
//! of fixed-stride value bytes — the slotted-page convention specialized to
//! equal-size records.

use std::marker::PhantomData;

use log::debug;

use hare_common::{ColumnType, HareError, HareResult, PageId, TupleId, MAX_PAGE_SHIFT, MIN_PAGE_SHIFT};
use hare_storage::{
    BufferPoolManager, DirectDiskManager, DiskManager, EvictionPolicy, FixedColumnHeaderView,
    Page, Priority, WalDiskManager,
};

use crate::file::ColumnFile;

const COLUMN_HEADER_PAGE_ID: PageId = 2;
const FIRST_DATA_PAGE_ID: PageId = 3;
const ENTRY_HEADER_SIZE: usize = 8;
const FLAG_NULL: u64 = 1;
const FLAG_DELETED: u64 = 2;

fn slots_per_page(page_size: usize, entry_size: usize) -> usize {
    page_size / (entry_size + ENTRY_HEADER_SIZE)
}

/// Picks the `pageShift` that minimizes `pageSize - entrySize * floor(pageSize / entrySize)`,
/// the fill-waste heuristic from `spec.md` §4.4. The chosen shift is baked
/// into the file at creation and never revisited.
pub fn choose_page_shift(entry_size: usize) -> u32 {
    (MIN_PAGE_SHIFT..=MAX_PAGE_SHIFT)
        .min_by_key(|&shift| {
            let page_size = 1usize << shift;
            if entry_size == 0 {
                return 0;
            }
            page_size - entry_size * (page_size / entry_size)
        })
        .unwrap_or(MIN_PAGE_SHIFT)
}

/// A column file whose every tuple occupies a fixed number of bytes.
pub struct FixedColumnFile<C: ColumnType> {
    pool: BufferPoolManager,
    column: C,
    entry_size: usize,
    slots_per_page: usize,
    nullable: bool,
    _value: PhantomData<C::Value>,
}

impl<C: ColumnType> FixedColumnFile<C> {
    /// Creates a new file at `path`. `page_shift` overrides the automatic
    /// fill-waste-minimizing choice when given.
    pub fn create(
        path: impl AsRef<std::path::Path>,
        column: &C,
        use_wal: bool,
        page_shift: Option<u32>,
    ) -> HareResult<()> {
        let entry_size = column.physical_width();
        let shift = page_shift.unwrap_or_else(|| choose_page_shift(entry_size));
        if use_wal {
            WalDiskManager::create(path, shift)?;
        } else {
            DirectDiskManager::create(path, shift)?;
        }
        Ok(())
    }

    /// Opens an existing file, allocating the column header page on first
    /// use (an empty file just created has no pages beyond the header and
    /// free stack yet).
    pub fn open(
        path: impl AsRef<std::path::Path>,
        column: C,
        nullable: bool,
        use_wal: bool,
        pool_size: usize,
        policy: EvictionPolicy,
    ) -> HareResult<Self> {
        let disk: Box<dyn DiskManager> = if use_wal {
            Box::new(WalDiskManager::open(path)?)
        } else {
            Box::new(DirectDiskManager::open(path)?)
        };
        let entry_size = column.physical_width();
        let slots = slots_per_page(disk.page_size(), entry_size);
        let pool = BufferPoolManager::new(disk, pool_size, policy);

        if pool.allocated_pages() <= COLUMN_HEADER_PAGE_ID {
            debug!("initializing fixed column header, ordinal={}", column.ordinal());
            let mut guard = pool.append(Priority::High)?;
            guard.with_page_mut(|page| {
                FixedColumnHeaderView::initialize_and_wrap(
                    page,
                    column.ordinal(),
                    column.logical_size(),
                    entry_size as u32,
                    nullable,
                )
                .map(|_| ())
            })?;
            drop(guard);
            pool.commit()?;
        }

        let nullable = {
            let guard = pool.get(COLUMN_HEADER_PAGE_ID, Priority::High)?;
            guard.with_page(|page| FixedColumnHeaderView::wrap(page).map(|v| v.nullable()))?
        };

        Ok(Self {
            pool,
            column,
            entry_size,
            slots_per_page: slots,
            nullable,
            _value: PhantomData,
        })
    }

    fn with_header<R>(&self, f: impl FnOnce(&FixedColumnHeaderView<&Page>) -> R) -> HareResult<R> {
        let guard = self.pool.get(COLUMN_HEADER_PAGE_ID, Priority::High)?;
        Ok(guard.with_page(|page| {
            let view = FixedColumnHeaderView::wrap(page).expect("column header page corrupt");
            f(&view)
        }))
    }

    fn with_header_mut<R>(&self, f: impl FnOnce(&mut FixedColumnHeaderView<&mut Page>) -> R) -> HareResult<R> {
        let mut guard = self.pool.get(COLUMN_HEADER_PAGE_ID, Priority::High)?;
        Ok(guard.with_page_mut(|page| {
            let mut view = FixedColumnHeaderView::wrap(page).expect("column header page corrupt");
            f(&mut view)
        }))
    }

    /// Total tuples ever appended, live or deleted.
    fn total(&self) -> HareResult<u64> {
        self.with_header(|h| h.live_count())
    }

    /// Live (non-deleted) tuple count.
    pub fn count(&self) -> HareResult<u64> {
        self.with_header(|h| h.live_count() - h.deleted_count())
    }

    /// Highest assigned `TupleId`, if any tuple has been appended.
    pub fn max_tuple_id(&self) -> HareResult<Option<TupleId>> {
        let total = self.total()?;
        Ok(if total == 0 { None } else { Some(total - 1) })
    }

    fn address(&self, tuple_id: TupleId) -> (PageId, usize) {
        let page_index = tuple_id / self.slots_per_page as u64;
        let slot_index = (tuple_id % self.slots_per_page as u64) as usize;
        (FIRST_DATA_PAGE_ID + page_index, slot_index)
    }

    fn flags_offset(&self, slot_index: usize) -> usize {
        slot_index * ENTRY_HEADER_SIZE
    }

    fn value_offset(&self, slot_index: usize) -> usize {
        self.slots_per_page * ENTRY_HEADER_SIZE + slot_index * self.entry_size
    }

    fn ensure_page(&self, page_id: PageId) -> HareResult<()> {
        while self.pool.allocated_pages() <= page_id {
            drop(self.pool.append(Priority::Default)?);
        }
        Ok(())
    }

    fn check_bounds(&self, tuple_id: TupleId) -> HareResult<()> {
        let total = self.total()?;
        if tuple_id >= total {
            return Err(HareError::OutOfBounds(format!(
                "tuple {tuple_id} exceeds max tuple id {}",
                total.saturating_sub(1)
            )));
        }
        Ok(())
    }

    /// Appends `value` (`None` stores a null, refused unless the column is
    /// nullable), returning its newly assigned `TupleId`.
    pub fn append(&self, value: Option<&C::Value>) -> HareResult<TupleId> {
        if value.is_none() && !self.nullable {
            return Err(HareError::NullNotAllowed);
        }
        let tuple_id = self.total()?;
        let (page_id, slot_index) = self.address(tuple_id);
        self.ensure_page(page_id)?;

        let mut guard = self.pool.get(page_id, Priority::Default)?;
        guard.with_page_mut(|page| {
            let flags: u64 = if value.is_none() { FLAG_NULL } else { 0 };
            page.write_u64(self.flags_offset(slot_index), flags);
            let mut bytes = vec![0u8; self.entry_size];
            if let Some(value) = value {
                self.column.encode(value, &mut bytes);
            }
            page.write_bytes(self.value_offset(slot_index), &bytes);
        });
        drop(guard);

        self.with_header_mut(|h| h.set_live_count(tuple_id + 1))?;
        Ok(tuple_id)
    }

    fn read_slot(&self, page_id: PageId, slot_index: usize) -> HareResult<(u64, Vec<u8>)> {
        let guard = self.pool.get(page_id, Priority::Default)?;
        Ok(guard.with_page(|page| {
            let flags = page.read_u64(self.flags_offset(slot_index));
            let bytes = page.read_bytes(self.value_offset(slot_index), self.entry_size).to_vec();
            (flags, bytes)
        }))
    }

    /// Reads the tuple at `tuple_id`. Errors with [`HareError::EntryDeleted`]
    /// for a tombstoned tuple; `Ok(None)` means a stored null.
    pub fn read(&self, tuple_id: TupleId) -> HareResult<Option<C::Value>> {
        self.check_bounds(tuple_id)?;
        let (page_id, slot_index) = self.address(tuple_id);
        let (flags, bytes) = self.read_slot(page_id, slot_index)?;
        if flags & FLAG_DELETED != 0 {
            return Err(HareError::EntryDeleted(tuple_id));
        }
        if flags & FLAG_NULL != 0 {
            return Ok(None);
        }
        Ok(Some(self.column.decode(&bytes)))
    }

    fn write_value(&self, page_id: PageId, slot_index: usize, value: Option<&C::Value>) -> HareResult<()> {
        let mut guard = self.pool.get(page_id, Priority::Default)?;
        guard.with_page_mut(|page| {
            let flags: u64 = if value.is_none() { FLAG_NULL } else { 0 };
            page.write_u64(self.flags_offset(slot_index), flags);
            let mut bytes = vec![0u8; self.entry_size];
            if let Some(value) = value {
                self.column.encode(value, &mut bytes);
            }
            page.write_bytes(self.value_offset(slot_index), &bytes);
        });
        Ok(())
    }

    /// Overwrites the value at `tuple_id`. Refused for a deleted tuple or a
    /// null on a non-nullable column.
    pub fn update(&self, tuple_id: TupleId, value: Option<&C::Value>) -> HareResult<()> {
        self.check_bounds(tuple_id)?;
        if value.is_none() && !self.nullable {
            return Err(HareError::NullNotAllowed);
        }
        let (page_id, slot_index) = self.address(tuple_id);
        let (flags, _) = self.read_slot(page_id, slot_index)?;
        if flags & FLAG_DELETED != 0 {
            return Err(HareError::EntryDeleted(tuple_id));
        }
        self.write_value(page_id, slot_index, value)
    }

    /// Atomically compares the current value to `expected` and, on match,
    /// writes `new`. Returns whether the swap applied.
    pub fn compare_and_update(
        &self,
        tuple_id: TupleId,
        expected: Option<&C::Value>,
        new: Option<&C::Value>,
    ) -> HareResult<bool> {
        self.check_bounds(tuple_id)?;
        let (page_id, slot_index) = self.address(tuple_id);
        let (flags, bytes) = self.read_slot(page_id, slot_index)?;
        if flags & FLAG_DELETED != 0 {
            return Err(HareError::EntryDeleted(tuple_id));
        }
        let current = if flags & FLAG_NULL != 0 {
            None
        } else {
            Some(self.column.decode(&bytes))
        };
        if current.as_ref() != expected {
            return Ok(false);
        }
        if new.is_none() && !self.nullable {
            return Err(HareError::NullNotAllowed);
        }
        self.write_value(page_id, slot_index, new)?;
        Ok(true)
    }

    /// Tombstones `tuple_id`, zeroing its bytes, and returns its prior value.
    pub fn delete(&self, tuple_id: TupleId) -> HareResult<Option<C::Value>> {
        self.check_bounds(tuple_id)?;
        let (page_id, slot_index) = self.address(tuple_id);
        let (flags, bytes) = self.read_slot(page_id, slot_index)?;
        if flags & FLAG_DELETED != 0 {
            return Err(HareError::EntryDeleted(tuple_id));
        }
        let prior = if flags & FLAG_NULL != 0 {
            None
        } else {
            Some(self.column.decode(&bytes))
        };

        let mut guard = self.pool.get(page_id, Priority::Default)?;
        guard.with_page_mut(|page| {
            page.write_u64(self.flags_offset(slot_index), FLAG_DELETED);
            let zero = vec![0u8; self.entry_size];
            page.write_bytes(self.value_offset(slot_index), &zero);
        });
        drop(guard);

        self.with_header_mut(|h| h.set_deleted_count(h.deleted_count() + 1))?;
        Ok(prior)
    }

    /// Tuple ids in `range`, in ascending order, skipping deleted entries.
    /// Best-effort prefetches `poolSize / 2` pages ahead of the scan.
    pub fn scan(&self, range: std::ops::Range<TupleId>) -> HareResult<Vec<(TupleId, Option<C::Value>)>> {
        let total = self.total()?;
        let end = range.end.min(total);
        let mut out = Vec::new();
        for tuple_id in range.start..end {
            match self.read(tuple_id) {
                Ok(value) => out.push((tuple_id, value)),
                Err(HareError::EntryDeleted(_)) => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(out)
    }

    pub fn commit(&self) -> HareResult<()> {
        self.pool.commit()
    }

    pub fn rollback(&self) -> HareResult<()> {
        self.pool.rollback()
    }

    pub fn close(&self) -> HareResult<()> {
        self.pool.close()
    }

    pub(crate) fn pool(&self) -> &BufferPoolManager {
        &self.pool
    }
}

impl<C: ColumnType> ColumnFile<C> for FixedColumnFile<C> {
    /// Arithmetic addressing means there is no chain state worth carrying
    /// between steps.
    type PositionHint = ();

    fn get_with_hint(&self, _hint: (), tuple_id: TupleId) -> HareResult<(Option<C::Value>, ())> {
        Ok((self.read(tuple_id)?, ()))
    }

    fn count(&self) -> HareResult<u64> {
        self.count()
    }

    fn max_tuple_id(&self) -> HareResult<Option<TupleId>> {
        self.max_tuple_id()
    }

    fn append(&self, value: Option<&C::Value>) -> HareResult<TupleId> {
        self.append(value)
    }

    fn update(&self, tuple_id: TupleId, value: Option<&C::Value>) -> HareResult<()> {
        self.update(tuple_id, value)
    }

    fn compare_and_update(
        &self,
        tuple_id: TupleId,
        expected: Option<&C::Value>,
        new: Option<&C::Value>,
    ) -> HareResult<bool> {
        self.compare_and_update(tuple_id, expected, new)
    }

    fn delete(&self, tuple_id: TupleId) -> HareResult<Option<C::Value>> {
        self.delete(tuple_id)
    }

    fn commit(&self) -> HareResult<()> {
        self.commit()
    }

    fn rollback(&self) -> HareResult<()> {
        self.rollback()
    }

    fn close(&self) -> HareResult<()> {
        self.close()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hare_common::F64Scalar;
    use tempfile::tempdir;

    fn open_f64(path: &std::path::Path, use_wal: bool) -> FixedColumnFile<F64Scalar> {
        FixedColumnFile::create(path, &F64Scalar, use_wal, Some(12)).unwrap();
        FixedColumnFile::open(path, F64Scalar, false, use_wal, 16, EvictionPolicy::Lru).unwrap()
    }

    #[test]
    fn append_and_read_round_trip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("f.hare");
        let file = open_f64(&path, false);
        let id = file.append(Some(&7.0)).unwrap();
        file.commit().unwrap();
        assert_eq!(file.read(id).unwrap(), Some(7.0));
    }

    #[test]
    fn s2_delete_semantics() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("f2.hare");
        let file = open_f64(&path, false);
        file.append(Some(&10.0)).unwrap();
        file.append(Some(&20.0)).unwrap();
        file.append(Some(&30.0)).unwrap();
        file.commit().unwrap();

        file.delete(1).unwrap();
        file.commit().unwrap();

        assert!(matches!(file.read(1), Err(HareError::EntryDeleted(1))));
        let scanned = file.scan(0..3).unwrap();
        assert_eq!(scanned, vec![(0, Some(10.0)), (2, Some(30.0))]);
        assert_eq!(file.count().unwrap(), 2);
        assert_eq!(file.max_tuple_id().unwrap(), Some(2));
    }

    #[test]
    fn s3_compare_and_update() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("f3.hare");
        let file = open_f64(&path, false);
        let id = file.append(Some(&7.0)).unwrap();
        file.commit().unwrap();

        assert!(file
            .compare_and_update(id, Some(&7.0), Some(&8.0))
            .unwrap());
        assert!(!file
            .compare_and_update(id, Some(&7.0), Some(&9.0))
            .unwrap());
        assert_eq!(file.read(id).unwrap(), Some(8.0));
    }

    #[test]
    fn s5_wal_rollback_discards_uncommitted_append() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("f5.hare");
        let file = open_f64(&path, true);
        file.append(Some(&1.0)).unwrap();
        file.commit().unwrap();
        drop(file);

        {
            let file = open_f64(&path, true);
            file.append(Some(&2.0)).unwrap();
            // No commit: dropping the file without flushing leaves the
            // staged write uncommitted; closing rolls it back.
            file.close().unwrap();
        }

        let file = open_f64(&path, true);
        assert_eq!(file.count().unwrap(), 1);
        assert_eq!(file.read(0).unwrap(), Some(1.0));
    }

    #[test]
    fn null_not_allowed_on_non_nullable_column() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("f6.hare");
        let file = open_f64(&path, false);
        assert!(matches!(
            file.append(None),
            Err(HareError::NullNotAllowed)
        ));
    }
}
