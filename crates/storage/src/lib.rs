//! Disk manager, page views, replacer policies, and buffer pool for the
//! HARE storage engine.

pub mod buffer;
pub mod disk;
pub mod page;
pub mod replacer;
pub mod views;

pub use buffer::{BufferPoolManager, EvictionPolicy, PageGuard};
pub use disk::{DirectDiskManager, DiskError, DiskManager, DiskResult, WalDiskManager};
pub use page::Page;
pub use replacer::{FifoReplacer, FrameId, LruReplacer, Priority, Replacer};
pub use views::{
    DirectoryPageView, FixedColumnHeaderView, SlottedPageView, VariableColumnHeaderView,
    COLUMN_FLAG_NULLABLE, DIR_FLAG_DELETED, DIR_FLAG_NULL, TYPE_DIRECTORY,
    TYPE_FIXED_COLUMN_HEADER, TYPE_SLOTTED, TYPE_UNINITIALIZED, TYPE_VARIABLE_COLUMN_HEADER,
};
