//! The append-only log: a writer that frames nothing itself and returns the
//! offset of every write, and a reader that recovers frames by scanning for
//! the record delimiter.

mod reader;
mod writer;


pub use reader::{Frames, LogReader};
pub use writer::LogWriter;

/// One record's payload as found in the log, delimiter stripped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub offset: u64,
    pub payload: Vec<u8>,
}
