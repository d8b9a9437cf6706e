//! An append-only record store with delimiter framing.
//!
//! Records are encoded as text fields joined by a field separator, written
//! to a log file followed by a record delimiter, and read back by scanning
//! for that delimiter. Nothing but the frames is stored: no header, no
//! lengths, no schema. Writer and reader agree on the [`Framing`] and the
//! [`Schema`] out of band.
//!
//! ```no_run
//! use framelog::{FieldValue, OsDir, Table, TableConfig};
//!
//! # fn main() -> framelog::Result<()> {
//! let config = TableConfig::new("int,str".parse()?);
//! let mut table = Table::new(OsDir::new("/tmp"), "people", config)?;
//! let offset = table.insert(&[FieldValue::Int(1), "John Doe".into()])?;
//! assert_eq!(table.get(offset)?[1], FieldValue::from("John Doe"));
//! table.close()?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod encoding;
pub mod error;
pub mod fs;
pub mod log;
pub mod scan;
pub mod table;

pub use config::{Framing, LogOptions, TableConfig};
pub use encoding::{decode, encode, encode_json, FieldType, FieldValue, Schema};
pub use error::{Error, Result};
pub use fs::{DbDir, DbFile, MockDir, OsDir};
pub use crate::log::{Frame, LogReader, LogWriter};
pub use scan::Delimiter;
pub use table::Table;
