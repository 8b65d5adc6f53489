//! Typed overlays on a raw [`Page`]: slotted page, directory page, and
//! column header page. Each view type has an identifier stored in the
//! page's first four bytes; [`wrap`]-style constructors reject a page whose
//! identifier does not match, and `initialize_and_wrap`-style constructors
//! require an uninitialized page (identifier `0`).
//!
//! Every view is generic over its page reference (`P: Deref<Target = Page>`)
//! so the same type serves both a shared `&Page` (read-only access, e.g.
//! from [`crate::buffer::PageGuard::with_page`]) and a `&mut Page` (from
//! `with_page_mut`); mutating methods and `initialize_and_wrap` live in a
//! second `impl` block specialized to `&'a mut Page`.

use std::ops::Deref;

use hare_common::{Address, HareError, HareResult, PageId, TupleId, NONE_PAGE_ID};

use crate::page::Page;

pub const TYPE_UNINITIALIZED: u32 = 0;
pub const TYPE_SLOTTED: u32 = 128;
pub const TYPE_DIRECTORY: u32 = 129;
pub const TYPE_FIXED_COLUMN_HEADER: u32 = 512;
pub const TYPE_VARIABLE_COLUMN_HEADER: u32 = 513;

fn page_type(page: &Page) -> u32 {
    page.read_u32(0)
}

fn expect_type(page: &Page, expected: u32, name: &str) -> HareResult<()> {
    let actual = page_type(page);
    if actual != expected {
        return Err(HareError::DataCorruption(format!(
            "expected {name} page (type {expected}), found type {actual}"
        )));
    }
    Ok(())
}

fn expect_uninitialized(page: &Page) -> HareResult<()> {
    let actual = page_type(page);
    if actual != TYPE_UNINITIALIZED {
        return Err(HareError::DataCorruption(format!(
            "expected an uninitialized page, found type {actual}"
        )));
    }
    Ok(())
}

// ---------------------------------------------------------------------
// Slotted page
// ---------------------------------------------------------------------

const SLOTTED_HEADER_SIZE: usize = 12;
const SLOT_ENTRY_SIZE: usize = 4;
const RELEASED_SLOT: i32 = -1;

/// A page laid out as a growing slot-offset array from the front and record
/// bytes from the back. Used by variable column files for value storage.
pub struct SlottedPageView<P> {
    page: P,
}

impl<P: Deref<Target = Page>> SlottedPageView<P> {
    pub fn wrap(page: P) -> HareResult<Self> {
        expect_type(&*page, TYPE_SLOTTED, "slotted")?;
        Ok(Self { page })
    }

    pub fn slot_count(&self) -> u32 {
        self.page.read_u32(4)
    }

    fn free_space_pointer(&self) -> u32 {
        self.page.read_u32(8)
    }

    fn slot_entry_offset(slot_id: u32) -> usize {
        SLOTTED_HEADER_SIZE + slot_id as usize * SLOT_ENTRY_SIZE
    }

    /// Bytes available for a new slot entry plus its record bytes.
    pub fn free_space(&self) -> usize {
        let used_by_slots = SLOTTED_HEADER_SIZE + self.slot_count() as usize * SLOT_ENTRY_SIZE;
        self.free_space_pointer() as usize - used_by_slots
    }

    /// Offset of a live slot's record bytes. `None` if the slot was released.
    pub fn offset(&self, slot_id: u32) -> Option<usize> {
        let raw = self.page.read_i32(Self::slot_entry_offset(slot_id));
        if raw == RELEASED_SLOT {
            None
        } else {
            Some(raw as usize)
        }
    }

    pub fn record_bytes(&self, slot_id: u32, size: usize) -> Option<&[u8]> {
        let offset = self.offset(slot_id)?;
        Some(self.page.read_bytes(offset, size))
    }
}

impl<'a> SlottedPageView<&'a mut Page> {
    pub fn initialize_and_wrap(page: &'a mut Page) -> HareResult<Self> {
        expect_uninitialized(page)?;
        page.write_u32(0, TYPE_SLOTTED);
        page.write_u32(4, 0); // slot_count
        let free_space_pointer = page.page_size() as u32;
        page.write_u32(8, free_space_pointer);
        Ok(Self { page })
    }

    fn set_slot_count(&mut self, count: u32) {
        self.page.write_u32(4, count);
    }

    fn set_free_space_pointer(&mut self, value: u32) {
        self.page.write_u32(8, value);
    }

    /// Allocates `size` bytes for a new record, returning its slot id, or
    /// `None` if there is not enough free space.
    pub fn allocate(&mut self, size: usize) -> Option<u32> {
        let needed = SLOT_ENTRY_SIZE + size;
        if self.free_space() < needed {
            return None;
        }
        let slot_id = self.slot_count();
        let record_offset = self.free_space_pointer() as usize - size;
        self.page
            .write_i32(Self::slot_entry_offset(slot_id), record_offset as i32);
        self.set_free_space_pointer(record_offset as u32);
        self.set_slot_count(slot_id + 1);
        Some(slot_id)
    }

    /// Releases a slot. Releasing the last slot reclaims its space;
    /// releasing an interior slot only marks the offset released
    /// (compaction is out of scope, per `spec.md` §4.2).
    pub fn release(&mut self, slot_id: u32) {
        let is_last = slot_id + 1 == self.slot_count();
        self.page
            .write_i32(Self::slot_entry_offset(slot_id), RELEASED_SLOT);
        if is_last {
            self.set_slot_count(slot_id);
        }
    }

    pub fn write_record(&mut self, slot_id: u32, size: usize, bytes: &[u8]) {
        let offset = self.offset(slot_id).expect("slot must be live");
        debug_assert_eq!(bytes.len(), size);
        self.page.write_bytes(offset, bytes);
    }
}

// ---------------------------------------------------------------------
// Directory page
// ---------------------------------------------------------------------

const DIRECTORY_HEADER_SIZE: usize = 36;
const DIRECTORY_ENTRY_SIZE: usize = 12; // 4-byte flags + 8-byte Address

pub const DIR_FLAG_NULL: u32 = 0b01;
pub const DIR_FLAG_DELETED: u32 = 0b10;

/// Maps a contiguous `[firstTupleId, lastTupleId]` range to `(flags,
/// Address)` entries. Directory pages form a doubly linked list ordered by
/// tuple-id range.
pub struct DirectoryPageView<P> {
    page: P,
}

impl<P: Deref<Target = Page>> DirectoryPageView<P> {
    pub fn wrap(page: P) -> HareResult<Self> {
        expect_type(&*page, TYPE_DIRECTORY, "directory")?;
        Ok(Self { page })
    }

    pub fn prev(&self) -> Option<PageId> {
        let raw = self.page.read_u64(4);
        (raw != NONE_PAGE_ID).then_some(raw)
    }

    pub fn next(&self) -> Option<PageId> {
        let raw = self.page.read_u64(12);
        (raw != NONE_PAGE_ID).then_some(raw)
    }

    pub fn first_tuple_id(&self) -> TupleId {
        self.page.read_u64(20)
    }

    pub fn last_tuple_id(&self) -> TupleId {
        self.page.read_u64(28)
    }

    /// `true` if there is room for at least one more entry.
    pub fn full(&self) -> bool {
        let entry_count = self
            .last_tuple_id()
            .wrapping_sub(self.first_tuple_id())
            .wrapping_add(1);
        DIRECTORY_HEADER_SIZE + (entry_count as usize + 1) * DIRECTORY_ENTRY_SIZE > self.page.page_size()
    }

    pub fn has(&self, tuple_id: TupleId) -> bool {
        tuple_id >= self.first_tuple_id() && tuple_id <= self.last_tuple_id()
    }

    fn entry_offset(&self, tuple_id: TupleId) -> usize {
        let index = (tuple_id - self.first_tuple_id()) as usize;
        DIRECTORY_HEADER_SIZE + index * DIRECTORY_ENTRY_SIZE
    }

    pub fn flags(&self, tuple_id: TupleId) -> u32 {
        self.page.read_u32(self.entry_offset(tuple_id))
    }

    pub fn address(&self, tuple_id: TupleId) -> Address {
        Address::from_u64(self.page.read_u64(self.entry_offset(tuple_id) + 4))
    }
}

impl<'a> DirectoryPageView<&'a mut Page> {
    pub fn initialize_and_wrap(page: &'a mut Page, first_tuple_id: TupleId) -> HareResult<Self> {
        expect_uninitialized(page)?;
        page.write_u32(0, TYPE_DIRECTORY);
        page.write_u64(4, NONE_PAGE_ID);
        page.write_u64(12, NONE_PAGE_ID);
        page.write_u64(20, first_tuple_id);
        // last_tuple_id = first_tuple_id - 1 encodes "empty range", per the
        // invariant firstTupleId <= lastTupleId + 1.
        page.write_u64(28, first_tuple_id.wrapping_sub(1));
        Ok(Self { page })
    }

    pub fn set_prev(&mut self, prev: Option<PageId>) {
        self.page.write_u64(4, prev.unwrap_or(NONE_PAGE_ID));
    }

    pub fn set_next(&mut self, next: Option<PageId>) {
        self.page.write_u64(12, next.unwrap_or(NONE_PAGE_ID));
    }

    fn set_last_tuple_id(&mut self, value: TupleId) {
        self.page.write_u64(28, value);
    }

    pub fn set_flags(&mut self, tuple_id: TupleId, flags: u32) {
        let offset = self.entry_offset(tuple_id);
        self.page.write_u32(offset, flags);
    }

    pub fn set_address(&mut self, tuple_id: TupleId, address: Address) {
        let offset = self.entry_offset(tuple_id) + 4;
        self.page.write_u64(offset, address.as_u64());
    }

    /// Appends a new entry at `lastTupleId + 1`. Caller must check
    /// [`DirectoryPageView::full`] first and create/link a successor page
    /// if so.
    ///
    /// `lastTupleId` starts as `firstTupleId.wrapping_sub(1)` to encode an
    /// empty range (see `initialize_and_wrap`), so the next id is always
    /// `lastTupleId.wrapping_add(1)` — for an empty page starting at tuple
    /// `0` that wraps `u64::MAX + 1` back to `0`, never overflows.
    pub fn allocate(&mut self, flags: u32, address: Address) -> TupleId {
        let tuple_id = self.last_tuple_id().wrapping_add(1);
        let offset = DIRECTORY_HEADER_SIZE
            + (tuple_id - self.first_tuple_id()) as usize * DIRECTORY_ENTRY_SIZE;
        self.page.write_u32(offset, flags);
        self.page.write_u64(offset + 4, address.as_u64());
        self.set_last_tuple_id(tuple_id);
        tuple_id
    }
}

// ---------------------------------------------------------------------
// Column header pages
// ---------------------------------------------------------------------

pub const COLUMN_FLAG_NULLABLE: u64 = 1;

fn fixed_header_magic() -> [u8; 6] {
    let mut magic = [0u8; 6];
    for (i, ch) in "HCF".encode_utf16().enumerate() {
        magic[i * 2..i * 2 + 2].copy_from_slice(&ch.to_le_bytes());
    }
    magic
}

/// Fields shared by the fixed- and variable-column header layouts.
pub struct FixedColumnHeaderView<P> {
    page: P,
}

impl<P: Deref<Target = Page>> FixedColumnHeaderView<P> {
    pub fn wrap(page: P) -> HareResult<Self> {
        if page.read_bytes(0, 6) != fixed_header_magic() {
            return Err(HareError::DataCorruption("bad fixed column header magic".into()));
        }
        Ok(Self { page })
    }

    pub fn column_ordinal(&self) -> u32 {
        self.page.read_u32(6)
    }

    pub fn logical_size(&self) -> i32 {
        self.page.read_i32(10)
    }

    pub fn physical_entry_size(&self) -> u32 {
        self.page.read_u32(14)
    }

    pub fn nullable(&self) -> bool {
        self.page.read_u64(18) & COLUMN_FLAG_NULLABLE != 0
    }

    pub fn live_count(&self) -> u64 {
        self.page.read_u64(26)
    }

    pub fn deleted_count(&self) -> u64 {
        self.page.read_u64(34)
    }
}

impl<'a> FixedColumnHeaderView<&'a mut Page> {
    pub fn initialize_and_wrap(
        page: &'a mut Page,
        column_ordinal: u32,
        logical_size: i32,
        physical_entry_size: u32,
        nullable: bool,
    ) -> HareResult<Self> {
        expect_uninitialized(page)?;
        page.write_bytes(0, &fixed_header_magic());
        page.write_u32(6, column_ordinal);
        page.write_i32(10, logical_size);
        page.write_u32(14, physical_entry_size);
        let flags = if nullable { COLUMN_FLAG_NULLABLE } else { 0 };
        page.write_u64(18, flags);
        page.write_u64(26, 0); // live count
        page.write_u64(34, 0); // deleted count
        Ok(Self { page })
    }

    pub fn set_live_count(&mut self, value: u64) {
        self.page.write_u64(26, value);
    }

    pub fn set_deleted_count(&mut self, value: u64) {
        self.page.write_u64(34, value);
    }
}

/// The variable-column header layout. Identical to the fixed layout through
/// byte 25, then diverges: `allocationPageId`, `lastDirectoryPageId`,
/// `maxTupleId`, and (an extension beyond the bit-exact layout in
/// `spec.md` §6, see `DESIGN.md`) a trailing deleted-tuple count.
pub struct VariableColumnHeaderView<P> {
    page: P,
}

fn variable_header_magic() -> [u8; 6] {
    let mut magic = [0u8; 6];
    for (i, ch) in "HCV".encode_utf16().enumerate() {
        magic[i * 2..i * 2 + 2].copy_from_slice(&ch.to_le_bytes());
    }
    magic
}

impl<P: Deref<Target = Page>> VariableColumnHeaderView<P> {
    pub fn wrap(page: P) -> HareResult<Self> {
        if page.read_bytes(0, 6) != variable_header_magic() {
            return Err(HareError::DataCorruption(
                "bad variable column header magic".into(),
            ));
        }
        Ok(Self { page })
    }

    pub fn column_ordinal(&self) -> u32 {
        self.page.read_u32(6)
    }

    pub fn logical_size(&self) -> i32 {
        self.page.read_i32(10)
    }

    pub fn physical_entry_size(&self) -> u32 {
        self.page.read_u32(14)
    }

    pub fn nullable(&self) -> bool {
        self.page.read_u64(18) & COLUMN_FLAG_NULLABLE != 0
    }

    pub fn live_count(&self) -> u64 {
        self.page.read_u64(26)
    }

    pub fn allocation_page_id(&self) -> PageId {
        self.page.read_u64(34)
    }

    pub fn last_directory_page_id(&self) -> PageId {
        self.page.read_u64(42)
    }

    pub fn max_tuple_id(&self) -> TupleId {
        self.page.read_u64(50)
    }

    pub fn deleted_count(&self) -> u64 {
        self.page.read_u64(58)
    }
}

impl<'a> VariableColumnHeaderView<&'a mut Page> {
    pub fn initialize_and_wrap(
        page: &'a mut Page,
        column_ordinal: u32,
        logical_size: i32,
        physical_entry_size: u32,
        nullable: bool,
        allocation_page_id: PageId,
        root_directory_page_id: PageId,
    ) -> HareResult<Self> {
        expect_uninitialized(page)?;
        page.write_bytes(0, &variable_header_magic());
        page.write_u32(6, column_ordinal);
        page.write_i32(10, logical_size);
        page.write_u32(14, physical_entry_size);
        let flags = if nullable { COLUMN_FLAG_NULLABLE } else { 0 };
        page.write_u64(18, flags);
        page.write_u64(26, 0); // live count
        page.write_u64(34, allocation_page_id);
        page.write_u64(42, root_directory_page_id); // last_directory_page_id
        page.write_u64(50, 0); // max_tuple_id unused until first append
        page.write_u64(58, 0); // deleted count (extension)
        // maxTupleId is only meaningful once count > 0; NONE_PAGE_ID-style
        // sentinels are unnecessary here since readers check live_count().
        Ok(Self { page })
    }

    pub fn set_live_count(&mut self, value: u64) {
        self.page.write_u64(26, value);
    }

    pub fn set_allocation_page_id(&mut self, value: PageId) {
        self.page.write_u64(34, value);
    }

    pub fn set_last_directory_page_id(&mut self, value: PageId) {
        self.page.write_u64(42, value);
    }

    pub fn set_max_tuple_id(&mut self, value: TupleId) {
        self.page.write_u64(50, value);
    }

    pub fn set_deleted_count(&mut self, value: u64) {
        self.page.write_u64(58, value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_page() -> Page {
        Page::new(4096)
    }

    #[test]
    fn slotted_allocate_and_release_last() {
        let mut page = new_page();
        let mut view = SlottedPageView::initialize_and_wrap(&mut page).unwrap();
        let s0 = view.allocate(8).unwrap();
        let s1 = view.allocate(16).unwrap();
        assert_eq!(view.slot_count(), 2);
        view.write_record(s0, 8, &[1u8; 8]);
        view.write_record(s1, 16, &[2u8; 16]);
        assert_eq!(view.record_bytes(s0, 8).unwrap(), &[1u8; 8]);
        view.release(s1);
        assert_eq!(view.slot_count(), 1);
    }

    #[test]
    fn slotted_release_interior_leaves_gap() {
        let mut page = new_page();
        let mut view = SlottedPageView::initialize_and_wrap(&mut page).unwrap();
        let s0 = view.allocate(8).unwrap();
        let _s1 = view.allocate(8).unwrap();
        view.release(s0);
        assert_eq!(view.slot_count(), 2);
        assert!(view.offset(s0).is_none());
    }

    #[test]
    fn slotted_allocate_fails_when_full() {
        let mut page = Page::new(64);
        let mut view = SlottedPageView::initialize_and_wrap(&mut page).unwrap();
        assert!(view.allocate(40).is_some());
        assert!(view.allocate(40).is_none());
    }

    #[test]
    fn slotted_read_only_wrap_over_shared_reference() {
        let mut page = new_page();
        {
            let mut view = SlottedPageView::initialize_and_wrap(&mut page).unwrap();
            view.allocate(8).unwrap();
        }
        let shared: &Page = &page;
        let view = SlottedPageView::wrap(shared).unwrap();
        assert_eq!(view.slot_count(), 1);
    }

    #[test]
    fn directory_allocate_appends_in_order() {
        let mut page = new_page();
        let mut view = DirectoryPageView::initialize_and_wrap(&mut page, 0).unwrap();
        let t0 = view.allocate(0, Address::new(5, 0));
        let t1 = view.allocate(0, Address::new(5, 1));
        assert_eq!(t0, 0);
        assert_eq!(t1, 1);
        assert_eq!(view.first_tuple_id(), 0);
        assert_eq!(view.last_tuple_id(), 1);
        assert!(view.has(0));
        assert!(view.has(1));
        assert!(!view.has(2));
    }

    #[test]
    fn directory_full_once_entries_exceed_page() {
        let mut page = Page::new(64);
        let mut view = DirectoryPageView::initialize_and_wrap(&mut page, 0).unwrap();
        assert!(!view.full());
        while !view.full() {
            view.allocate(0, Address::new(1, 0));
        }
        assert!(view.full());
    }

    #[test]
    fn fixed_column_header_round_trips() {
        let mut page = new_page();
        let mut view =
            FixedColumnHeaderView::initialize_and_wrap(&mut page, 4, -1, 16, true).unwrap();
        view.set_live_count(3);
        view.set_deleted_count(1);
        assert_eq!(view.column_ordinal(), 4);
        assert_eq!(view.logical_size(), -1);
        assert_eq!(view.physical_entry_size(), 16);
        assert!(view.nullable());
        assert_eq!(view.live_count(), 3);
        assert_eq!(view.deleted_count(), 1);
    }

    #[test]
    fn variable_column_header_round_trips() {
        let mut page = new_page();
        let mut view = VariableColumnHeaderView::initialize_and_wrap(
            &mut page, 6, 2048, 16392, false, 4, 3,
        )
        .unwrap();
        view.set_max_tuple_id(41);
        view.set_live_count(42);
        assert_eq!(view.allocation_page_id(), 4);
        assert_eq!(view.last_directory_page_id(), 3);
        assert_eq!(view.max_tuple_id(), 41);
        assert_eq!(view.live_count(), 42);
    }
}
