//! A fixed-size, in-memory byte buffer for one page, with random-access
//! typed reads/writes at any offset. Page size is established once, at file
//! creation, and is immutable thereafter (`spec.md` §3).

use hare_common::PageId;

/// Random-access page buffer. Size is `2^page_shift`, `12 <= page_shift <= 22`.
#[derive(Debug, Clone)]
pub struct Page {
    data: Vec<u8>,
    page_id: Option<PageId>,
    is_dirty: bool,
    pin_count: u32,
}

impl Page {
    pub fn new(page_size: usize) -> Self {
        Self {
            data: vec![0u8; page_size],
            page_id: None,
            is_dirty: false,
            pin_count: 0,
        }
    }

    pub fn page_size(&self) -> usize {
        self.data.len()
    }

    pub fn page_id(&self) -> Option<PageId> {
        self.page_id
    }

    pub(crate) fn set_page_id(&mut self, page_id: Option<PageId>) {
        self.page_id = page_id;
    }

    pub fn is_dirty(&self) -> bool {
        self.is_dirty
    }

    pub(crate) fn set_dirty(&mut self, dirty: bool) {
        self.is_dirty = dirty;
    }

    pub fn pin_count(&self) -> u32 {
        self.pin_count
    }

    pub(crate) fn pin_count_mut(&mut self) -> &mut u32 {
        &mut self.pin_count
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// Resets bytes and metadata to a pristine, uninitialized state, ready
    /// to be reused for a different `PageId` by the buffer pool.
    pub(crate) fn reset(&mut self) {
        self.data.fill(0);
        self.page_id = None;
        self.is_dirty = false;
        self.pin_count = 0;
    }

    pub fn read_bytes(&self, offset: usize, len: usize) -> &[u8] {
        &self.data[offset..offset + len]
    }

    pub fn write_bytes(&mut self, offset: usize, bytes: &[u8]) {
        self.data[offset..offset + bytes.len()].copy_from_slice(bytes);
        self.is_dirty = true;
    }

    pub fn read_u32(&self, offset: usize) -> u32 {
        u32::from_le_bytes(self.data[offset..offset + 4].try_into().unwrap())
    }

    pub fn write_u32(&mut self, offset: usize, value: u32) {
        self.write_bytes(offset, &value.to_le_bytes());
    }

    pub fn read_i32(&self, offset: usize) -> i32 {
        i32::from_le_bytes(self.data[offset..offset + 4].try_into().unwrap())
    }

    pub fn write_i32(&mut self, offset: usize, value: i32) {
        self.write_bytes(offset, &value.to_le_bytes());
    }

    pub fn read_u64(&self, offset: usize) -> u64 {
        u64::from_le_bytes(self.data[offset..offset + 8].try_into().unwrap())
    }

    pub fn write_u64(&mut self, offset: usize, value: u64) {
        self.write_bytes(offset, &value.to_le_bytes());
    }

    pub fn read_i64(&self, offset: usize) -> i64 {
        i64::from_le_bytes(self.data[offset..offset + 8].try_into().unwrap())
    }

    pub fn write_i64(&mut self, offset: usize, value: i64) {
        self.write_bytes(offset, &value.to_le_bytes());
    }
}
