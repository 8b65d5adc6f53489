//! Fixed and variable column files, and the cursor/reader/writer API built
//! on top of them.

pub mod cursor;
pub mod file;
pub mod fixed;
pub mod reader;
pub mod variable;
pub mod writer;

pub use cursor::Cursor;
pub use file::{ColumnFile, ColumnFileHandle};
pub use fixed::FixedColumnFile;
pub use reader::Reader;
pub use variable::VariableColumnFile;
pub use writer::Writer;
