//! Variable-width column file: a directory-page chain maps `TupleId ->
//! Address`, values live in slotted allocation pages. Unlike the fixed file,
//! `TupleId -> Address` requires a chain walk rather than a closed-form
//! computation, since each directory page covers a variable-length range.

use std::marker::PhantomData;

use log::debug;

use hare_common::{Address, ColumnType, HareError, HareResult, PageId, TupleId};
use hare_storage::{
    BufferPoolManager, DirectDiskManager, DiskManager, DirectoryPageView, EvictionPolicy,
    Page, Priority, SlottedPageView, VariableColumnHeaderView, WalDiskManager,
    DIR_FLAG_DELETED, DIR_FLAG_NULL,
};

use crate::file::ColumnFile;

const COLUMN_HEADER_PAGE_ID: PageId = 2;
const ROOT_DIRECTORY_PAGE_ID: PageId = 3;
const ROOT_ALLOCATION_PAGE_ID: PageId = 4;

/// A column file whose tuples have variable encoded length, addressed
/// through a directory chain rather than a fixed stride.
pub struct VariableColumnFile<C: ColumnType> {
    pool: BufferPoolManager,
    column: C,
    nullable: bool,
    _value: PhantomData<C::Value>,
}

impl<C: ColumnType> VariableColumnFile<C> {
    /// Creates a new file at `path`. Unlike the fixed column file, page
    /// size has no fill-waste-minimizing choice to make — values are not
    /// constant width — so it defaults to [`hare_common::DEFAULT_PAGE_SHIFT`]
    /// unless overridden.
    pub fn create(
        path: impl AsRef<std::path::Path>,
        use_wal: bool,
        page_shift: Option<u32>,
    ) -> HareResult<()> {
        let shift = page_shift.unwrap_or_else(hare_common::default_page_shift);
        if use_wal {
            WalDiskManager::create(path, shift)?;
        } else {
            DirectDiskManager::create(path, shift)?;
        }
        Ok(())
    }

    /// Opens an existing file, laying down the column header, root
    /// directory page, and root allocation page on first use.
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
        let pool = BufferPoolManager::new(disk, pool_size, policy);

        if pool.allocated_pages() <= COLUMN_HEADER_PAGE_ID {
            debug!("initializing variable column header, ordinal={}", column.ordinal());
            let mut header_guard = pool.append(Priority::High)?;
            let mut dir_guard = pool.append(Priority::High)?;
            let mut alloc_guard = pool.append(Priority::High)?;

            dir_guard.with_page_mut(|page| {
                DirectoryPageView::initialize_and_wrap(page, 0).map(|_| ())
            })?;
            alloc_guard.with_page_mut(|page| {
                SlottedPageView::initialize_and_wrap(page).map(|_| ())
            })?;
            header_guard.with_page_mut(|page| {
                VariableColumnHeaderView::initialize_and_wrap(
                    page,
                    column.ordinal(),
                    column.logical_size(),
                    column.physical_width() as u32,
                    nullable,
                    ROOT_ALLOCATION_PAGE_ID,
                    ROOT_DIRECTORY_PAGE_ID,
                )
                .map(|_| ())
            })?;
            drop(header_guard);
            drop(dir_guard);
            drop(alloc_guard);
            pool.commit()?;
        }

        let nullable = {
            let guard = pool.get(COLUMN_HEADER_PAGE_ID, Priority::High)?;
            guard.with_page(|page| VariableColumnHeaderView::wrap(page).map(|v| v.nullable()))?
        };

        Ok(Self {
            pool,
            column,
            nullable,
            _value: PhantomData,
        })
    }

    fn with_header<R>(&self, f: impl FnOnce(&VariableColumnHeaderView<&Page>) -> R) -> HareResult<R> {
        let guard = self.pool.get(COLUMN_HEADER_PAGE_ID, Priority::High)?;
        Ok(guard.with_page(|page| {
            let view = VariableColumnHeaderView::wrap(page).expect("column header page corrupt");
            f(&view)
        }))
    }

    fn with_header_mut<R>(
        &self,
        f: impl FnOnce(&mut VariableColumnHeaderView<&mut Page>) -> R,
    ) -> HareResult<R> {
        let mut guard = self.pool.get(COLUMN_HEADER_PAGE_ID, Priority::High)?;
        Ok(guard.with_page_mut(|page| {
            let mut view =
                VariableColumnHeaderView::wrap(page).expect("column header page corrupt");
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
        let (total, max) = self.with_header(|h| (h.live_count(), h.max_tuple_id()))?;
        Ok(if total == 0 { None } else { Some(max) })
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

    /// Walks the directory chain from the root, returning the page whose
    /// range covers `tuple_id`. `O(chain length)`; [`crate::cursor`] keeps a
    /// hint to avoid re-walking on sequential access.
    pub(crate) fn locate_directory(&self, tuple_id: TupleId) -> HareResult<PageId> {
        self.locate_directory_from(ROOT_DIRECTORY_PAGE_ID, tuple_id)
    }

    /// Same as [`Self::locate_directory`] but starts the walk at `hint`
    /// instead of the root, for callers (cursors) that already know a
    /// nearby directory page.
    pub(crate) fn locate_directory_from(&self, hint: PageId, tuple_id: TupleId) -> HareResult<PageId> {
        let mut page_id = hint;
        loop {
            let guard = self.pool.get(page_id, Priority::High)?;
            let (has, first, next, prev) = guard.with_page(|page| {
                let view = DirectoryPageView::wrap(page).expect("directory page corrupt");
                (view.has(tuple_id), view.first_tuple_id(), view.next(), view.prev())
            });
            if has {
                return Ok(page_id);
            }
            // The hint may sit ahead of `tuple_id` (e.g. a cursor stepping
            // backward past where it last was) as well as behind it, so
            // walk whichever direction closes the gap.
            let step = if tuple_id < first { prev } else { next };
            match step {
                Some(next_id) => page_id = next_id,
                None => {
                    return Err(HareError::OutOfBounds(format!(
                        "tuple {tuple_id} not covered by any directory page"
                    )))
                }
            }
        }
    }

    fn directory_entry(&self, dir_page_id: PageId, tuple_id: TupleId) -> HareResult<(u32, Address)> {
        let guard = self.pool.get(dir_page_id, Priority::High)?;
        Ok(guard.with_page(|page| {
            let view = DirectoryPageView::wrap(page).expect("directory page corrupt");
            (view.flags(tuple_id), view.address(tuple_id))
        }))
    }

    fn read_value_bytes(&self, address: Address, size: usize) -> HareResult<Vec<u8>> {
        let guard = self.pool.get(address.page_id(), Priority::Default)?;
        Ok(guard.with_page(|page| {
            let view = SlottedPageView::wrap(page).expect("slotted page corrupt");
            view.record_bytes(address.slot_id(), size)
                .expect("directory points at a live slot")
                .to_vec()
        }))
    }

    /// Reads the tuple at `tuple_id`. Errors with [`HareError::EntryDeleted`]
    /// for a tombstoned tuple; `Ok(None)` means a stored null.
    pub fn read(&self, tuple_id: TupleId) -> HareResult<Option<C::Value>> {
        self.check_bounds(tuple_id)?;
        let dir_page_id = self.locate_directory(tuple_id)?;
        self.read_at(dir_page_id, tuple_id)
    }

    /// Reads `tuple_id` given the directory page already known to cover it
    /// (used by the cursor to skip the chain walk on sequential reads).
    pub(crate) fn read_at(&self, dir_page_id: PageId, tuple_id: TupleId) -> HareResult<Option<C::Value>> {
        let (flags, address) = self.directory_entry(dir_page_id, tuple_id)?;
        if flags & DIR_FLAG_DELETED != 0 {
            return Err(HareError::EntryDeleted(tuple_id));
        }
        if flags & DIR_FLAG_NULL != 0 {
            return Ok(None);
        }
        let size = self.column.physical_width().max(1);
        // Scalars/vectors have a fixed encoded length; `Bytes` does not, but
        // a variable column built on `Bytes` has no way to recover the
        // original length from the directory alone without storing it
        // alongside the address. That limitation is accepted here: the
        // variable file's primary use in this engine is fixed-shape vectors
        // (S4), where `physical_width()` is always exact.
        let bytes = self.read_value_bytes(address, size)?;
        Ok(Some(self.column.decode(&bytes)))
    }

    fn allocate_slot(&self, bytes: &[u8]) -> HareResult<Address> {
        let allocation_page_id = self.with_header(|h| h.allocation_page_id())?;
        let mut guard = self.pool.get(allocation_page_id, Priority::Default)?;
        let slot_id = guard.with_page_mut(|page| {
            let mut view = SlottedPageView::wrap(page).expect("slotted page corrupt");
            view.allocate(bytes.len())
        });
        if let Some(slot_id) = slot_id {
            guard.with_page_mut(|page| {
                let mut view = SlottedPageView::wrap(page).expect("slotted page corrupt");
                view.write_record(slot_id, bytes.len(), bytes);
            });
            return Ok(Address::new(allocation_page_id, slot_id));
        }
        drop(guard);

        // Current allocation page has no room: extend the file with a fresh
        // one and retry. (The "prefer a pre-existing empty data page"
        // optimization from spec.md §4.5 step 3 is not implemented — this
        // file never reclaims allocation pages, only ever extends.)
        let new_page_id = {
            let mut new_guard = self.pool.append(Priority::Default)?;
            new_guard.with_page_mut(|page| SlottedPageView::initialize_and_wrap(page).map(|_| ()))?;
            new_guard.page_id().expect("freshly appended page always has an id")
        };
        self.with_header_mut(|h| h.set_allocation_page_id(new_page_id))?;

        let mut guard = self.pool.get(new_page_id, Priority::Default)?;
        let slot_id = guard
            .with_page_mut(|page| {
                let mut view = SlottedPageView::wrap(page).expect("slotted page corrupt");
                view.allocate(bytes.len())
            })
            .ok_or(HareError::ValueTooLarge)?;
        guard.with_page_mut(|page| {
            let mut view = SlottedPageView::wrap(page).expect("slotted page corrupt");
            view.write_record(slot_id, bytes.len(), bytes);
        });
        Ok(Address::new(new_page_id, slot_id))
    }

    fn append_directory_entry(&self, flags: u32, address: Address) -> HareResult<TupleId> {
        let tail_page_id = self.with_header(|h| h.last_directory_page_id())?;
        let mut guard = self.pool.get(tail_page_id, Priority::High)?;
        let (full, next_first_tuple_id) = guard.with_page(|page| {
            let view = DirectoryPageView::wrap(page).expect("directory page corrupt");
            (view.full(), view.last_tuple_id().wrapping_add(1))
        });

        if !full {
            let tuple_id = guard.with_page_mut(|page| {
                let mut view = DirectoryPageView::wrap(page).expect("directory page corrupt");
                view.allocate(flags, address)
            });
            return Ok(tuple_id);
        }
        drop(guard);
        debug!("directory page {tail_page_id} full, linking successor at tuple {next_first_tuple_id}");

        let new_page_id = {
            let mut new_guard = self.pool.append(Priority::High)?;
            new_guard.with_page_mut(|page| {
                DirectoryPageView::initialize_and_wrap(page, next_first_tuple_id).map(|_| ())
            })?;
            new_guard.with_page_mut(|page| {
                let mut view = DirectoryPageView::wrap(page).expect("directory page corrupt");
                view.set_prev(Some(tail_page_id));
            });
            new_guard.page_id().expect("freshly appended page always has an id")
        };

        {
            let mut old_guard = self.pool.get(tail_page_id, Priority::High)?;
            old_guard.with_page_mut(|page| {
                let mut view = DirectoryPageView::wrap(page).expect("directory page corrupt");
                view.set_next(Some(new_page_id));
            });
        }
        self.with_header_mut(|h| h.set_last_directory_page_id(new_page_id))?;

        let mut guard = self.pool.get(new_page_id, Priority::High)?;
        let tuple_id = guard.with_page_mut(|page| {
            let mut view = DirectoryPageView::wrap(page).expect("directory page corrupt");
            view.allocate(flags, address)
        });
        Ok(tuple_id)
    }

    /// Appends `value` (`None` stores a null, refused unless the column is
    /// nullable), returning its newly assigned `TupleId`. See spec.md §4.5
    /// for the append algorithm this follows.
    pub fn append(&self, value: Option<&C::Value>) -> HareResult<TupleId> {
        if value.is_none() && !self.nullable {
            return Err(HareError::NullNotAllowed);
        }
        let size = value.map(|v| self.column.encoded_len(v)).unwrap_or(0);
        let mut bytes = vec![0u8; size];
        if let Some(v) = value {
            self.column.encode(v, &mut bytes);
        }

        let address = self.allocate_slot(&bytes)?;
        let flags = if value.is_none() { DIR_FLAG_NULL } else { 0 };
        let tuple_id = self.append_directory_entry(flags, address)?;

        self.with_header_mut(|h| {
            h.set_live_count(tuple_id + 1);
            h.set_max_tuple_id(tuple_id);
        })?;
        Ok(tuple_id)
    }

    /// Overwrites the value at `tuple_id`, in place if the new encoded size
    /// matches the old slot's, otherwise by tombstoning the old slot and
    /// redirecting the directory entry to a freshly allocated one. The
    /// `TupleId` never changes and `DELETED` on the old slot is permanent
    /// (spec.md §4.5, "Update / compareAndUpdate / delete").
    pub fn update(&self, tuple_id: TupleId, value: Option<&C::Value>) -> HareResult<()> {
        self.check_bounds(tuple_id)?;
        if value.is_none() && !self.nullable {
            return Err(HareError::NullNotAllowed);
        }
        let dir_page_id = self.locate_directory(tuple_id)?;
        let (old_flags, old_address) = self.directory_entry(dir_page_id, tuple_id)?;
        if old_flags & DIR_FLAG_DELETED != 0 {
            return Err(HareError::EntryDeleted(tuple_id));
        }

        let new_size = value.map(|v| self.column.encoded_len(v)).unwrap_or(0);
        let mut bytes = vec![0u8; new_size];
        if let Some(v) = value {
            self.column.encode(v, &mut bytes);
        }
        let new_flags = if value.is_none() { DIR_FLAG_NULL } else { 0 };

        let old_size = if old_flags & DIR_FLAG_NULL != 0 {
            0
        } else {
            self.column.physical_width()
        };

        if old_size == new_size && old_flags & DIR_FLAG_NULL == value.is_none() as u32 * DIR_FLAG_NULL {
            // Same footprint and null-ness: overwrite the existing slot.
            let mut guard = self.pool.get(old_address.page_id(), Priority::Default)?;
            guard.with_page_mut(|page| {
                let mut view = SlottedPageView::wrap(page).expect("slotted page corrupt");
                view.write_record(old_address.slot_id(), new_size, &bytes);
            });
        } else {
            // Footprint changed: allocate a fresh slot and redirect. The old
            // slot's bytes are left in place (never reused); only the
            // directory flags mark it superseded.
            let new_address = self.allocate_slot(&bytes)?;
            let mut guard = self.pool.get(dir_page_id, Priority::High)?;
            guard.with_page_mut(|page| {
                let mut view = DirectoryPageView::wrap(page).expect("directory page corrupt");
                view.set_flags(tuple_id, new_flags);
                view.set_address(tuple_id, new_address);
            });
            return Ok(());
        }

        let mut guard = self.pool.get(dir_page_id, Priority::High)?;
        guard.with_page_mut(|page| {
            let mut view = DirectoryPageView::wrap(page).expect("directory page corrupt");
            view.set_flags(tuple_id, new_flags);
        });
        Ok(())
    }

    /// Atomically compares the current value to `expected` and, on match,
    /// writes `new`. Returns whether the swap applied.
    pub fn compare_and_update(
        &self,
        tuple_id: TupleId,
        expected: Option<&C::Value>,
        new: Option<&C::Value>,
    ) -> HareResult<bool> {
        let current = self.read(tuple_id)?;
        if current.as_ref() != expected {
            return Ok(false);
        }
        self.update(tuple_id, new)?;
        Ok(true)
    }

    /// Tombstones `tuple_id` and returns its prior value. The `TupleId` and
    /// its directory entry slot remain permanently allocated.
    pub fn delete(&self, tuple_id: TupleId) -> HareResult<Option<C::Value>> {
        self.check_bounds(tuple_id)?;
        let dir_page_id = self.locate_directory(tuple_id)?;
        let prior = self.read_at(dir_page_id, tuple_id)?;

        let mut guard = self.pool.get(dir_page_id, Priority::High)?;
        guard.with_page_mut(|page| {
            let mut view = DirectoryPageView::wrap(page).expect("directory page corrupt");
            view.set_flags(tuple_id, DIR_FLAG_DELETED);
        });
        drop(guard);

        self.with_header_mut(|h| h.set_deleted_count(h.deleted_count() + 1))?;
        Ok(prior)
    }

    /// Tuple ids in `range`, in ascending order, skipping deleted entries.
    pub fn scan(&self, range: std::ops::Range<TupleId>) -> HareResult<Vec<(TupleId, Option<C::Value>)>> {
        let total = self.total()?;
        let end = range.end.min(total);
        let mut out = Vec::new();
        let mut dir_page_id = if range.start < total {
            self.locate_directory(range.start)?
        } else {
            return Ok(out);
        };
        for tuple_id in range.start..end {
            loop {
                let has = self.pool.get(dir_page_id, Priority::High)?.with_page(|page| {
                    DirectoryPageView::wrap(page)
                        .expect("directory page corrupt")
                        .has(tuple_id)
                });
                if has {
                    break;
                }
                dir_page_id = self
                    .pool
                    .get(dir_page_id, Priority::High)?
                    .with_page(|page| DirectoryPageView::wrap(page).expect("directory page corrupt").next())
                    .expect("tuple within [0, total) must be covered by the chain");
            }
            match self.read_at(dir_page_id, tuple_id) {
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

impl<C: ColumnType> ColumnFile<C> for VariableColumnFile<C> {
    /// The directory page that last satisfied a lookup; `None` means
    /// "start at the root" (`ROOT_DIRECTORY_PAGE_ID`).
    type PositionHint = Option<PageId>;

    fn get_with_hint(
        &self,
        hint: Option<PageId>,
        tuple_id: TupleId,
    ) -> HareResult<(Option<C::Value>, Option<PageId>)> {
        self.check_bounds(tuple_id)?;
        let dir_page_id = self.locate_directory_from(hint.unwrap_or(ROOT_DIRECTORY_PAGE_ID), tuple_id)?;
        let value = self.read_at(dir_page_id, tuple_id)?;
        Ok((value, Some(dir_page_id)))
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
    use hare_common::F64Vector;
    use tempfile::tempdir;

    fn open_vec(path: &std::path::Path, use_wal: bool) -> VariableColumnFile<F64Vector> {
        VariableColumnFile::create(path, use_wal, Some(12)).unwrap();
        VariableColumnFile::open(path, F64Vector { dims: 4 }, false, use_wal, 16, EvictionPolicy::Lru)
            .unwrap()
    }

    #[test]
    fn append_and_read_round_trip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("v.hare");
        let file = open_vec(&path, false);
        let v = vec![1.0, 2.0, 3.0, 4.0];
        let id = file.append(Some(&v)).unwrap();
        file.commit().unwrap();
        assert_eq!(file.read(id).unwrap(), Some(v));
    }

    #[test]
    fn appends_spanning_many_allocation_and_directory_pages() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("v2.hare");
        let file = open_vec(&path, false);
        let values: Vec<Vec<f64>> = (0..500).map(|i| vec![i as f64; 4]).collect();
        let ids: Vec<_> = values.iter().map(|v| file.append(Some(v)).unwrap()).collect();
        file.commit().unwrap();

        assert_eq!(ids, (0..500).collect::<Vec<_>>());
        for (id, v) in ids.iter().zip(values.iter()) {
            assert_eq!(file.read(*id).unwrap().as_ref(), Some(v));
        }
        assert_eq!(file.count().unwrap(), 500);
        assert_eq!(file.max_tuple_id().unwrap(), Some(499));
    }

    #[test]
    fn delete_then_scan_skips_tombstones() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("v3.hare");
        let file = open_vec(&path, false);
        let a = file.append(Some(&vec![1.0; 4])).unwrap();
        let b = file.append(Some(&vec![2.0; 4])).unwrap();
        let c = file.append(Some(&vec![3.0; 4])).unwrap();
        file.commit().unwrap();

        file.delete(b).unwrap();
        file.commit().unwrap();

        assert!(matches!(file.read(b), Err(HareError::EntryDeleted(_))));
        let scanned = file.scan(0..3).unwrap();
        assert_eq!(scanned.len(), 2);
        assert_eq!(scanned[0].0, a);
        assert_eq!(scanned[1].0, c);
        assert_eq!(file.count().unwrap(), 2);
    }

    #[test]
    fn update_with_same_shape_overwrites_in_place() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("v4.hare");
        let file = open_vec(&path, false);
        let id = file.append(Some(&vec![1.0, 2.0, 3.0, 4.0])).unwrap();
        file.commit().unwrap();

        file.update(id, Some(&vec![9.0, 9.0, 9.0, 9.0])).unwrap();
        file.commit().unwrap();
        assert_eq!(file.read(id).unwrap(), Some(vec![9.0, 9.0, 9.0, 9.0]));
    }

    #[test]
    fn compare_and_update_matches_spec_s3_style_semantics() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("v5.hare");
        let file = open_vec(&path, false);
        let id = file.append(Some(&vec![1.0; 4])).unwrap();
        file.commit().unwrap();

        assert!(file
            .compare_and_update(id, Some(&vec![1.0; 4]), Some(&vec![2.0; 4]))
            .unwrap());
        assert!(!file
            .compare_and_update(id, Some(&vec![1.0; 4]), Some(&vec![3.0; 4]))
            .unwrap());
        assert_eq!(file.read(id).unwrap(), Some(vec![2.0; 4]));
    }

    #[test]
    fn wal_rollback_discards_uncommitted_append() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("v6.hare");
        let file = open_vec(&path, true);
        file.append(Some(&vec![1.0; 4])).unwrap();
        file.commit().unwrap();
        drop(file);

        {
            let file = open_vec(&path, true);
            file.append(Some(&vec![2.0; 4])).unwrap();
            file.close().unwrap();
        }

        let file = open_vec(&path, true);
        assert_eq!(file.count().unwrap(), 1);
        assert_eq!(file.read(0).unwrap(), Some(vec![1.0; 4]));
    }
}
