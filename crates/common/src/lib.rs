mod column;
mod error;
mod ids;

pub use column::{Bytes, ColumnType, F32Vector, F64Vector, F32Scalar, F64Scalar, I32Scalar, I64Scalar};
pub use error::{HareError, HareResult};
pub use ids::{Address, PageId, SlotId, TxnId, TupleId, NONE_PAGE_ID};

/// Default `pageShift` used when creating a file and no caller-side override
/// (`HARE_DEFAULT_PAGE_SHIFT`) is set. See `spec.md` §6: this is a
/// creation-time convenience only, never an on-disk contract.
pub const DEFAULT_PAGE_SHIFT: u32 = 12;

pub const MIN_PAGE_SHIFT: u32 = 12;
pub const MAX_PAGE_SHIFT: u32 = 22;

/// Reads the caller-side page-shift override, falling back to
/// [`DEFAULT_PAGE_SHIFT`] when unset, malformed, or out of range.
pub fn default_page_shift() -> u32 {
    std::env::var("HARE_DEFAULT_PAGE_SHIFT")
        .ok()
        .and_then(|v| v.parse::<u32>().ok())
        .filter(|shift| (MIN_PAGE_SHIFT..=MAX_PAGE_SHIFT).contains(shift))
        .unwrap_or(DEFAULT_PAGE_SHIFT)
}
