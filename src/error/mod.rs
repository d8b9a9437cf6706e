use std::{io, path::PathBuf};

use thiserror::Error;

use crate::encoding::FieldType;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),

    #[error("no such log: {}", .0.display())]
    NotFound(PathBuf),

    /// The data ran out before a fixed-length read or a delimiter match could
    /// complete. `consumed` counts the bytes that were read and then dropped.
    #[error("unexpected end of data: wanted {wanted}, consumed {consumed} bytes")]
    Eof { wanted: String, consumed: u64 },

    #[error("handle is closed")]
    Closed,

    #[error("only a sequence can be a record, got {0}")]
    NotARecord(String),

    #[error("record has {found} fields, schema expects {expected}")]
    SchemaMismatch { expected: usize, found: usize },

    #[error("field {field} is a {found}, schema expects {expected}")]
    TypeMismatch {
        field: usize,
        expected: FieldType,
        found: FieldType,
    },

    #[error("field {field}: {text:?} is not a valid {ty}")]
    Parse {
        field: usize,
        ty: FieldType,
        text: String,
    },

    #[error("unsupported field type: {0}")]
    UnsupportedType(String),

    #[error("field {field} contains the field separator or record delimiter")]
    FramingConflict { field: usize },

    #[error("bad configuration: {0}")]
    Config(String),
}

impl Error {
    pub(crate) fn eof_bytes(wanted: usize, consumed: u64) -> Self {
        Error::Eof {
            wanted: format!("{} bytes", wanted),
            consumed,
        }
    }

    pub(crate) fn eof_delimiter(delimiter: &[u8], consumed: u64) -> Self {
        Error::Eof {
            wanted: format!("delimiter {:?}", String::from_utf8_lossy(delimiter)),
            consumed,
        }
    }

    /// True when the stream was exhausted, as opposed to the input being bad.
    pub fn is_eof(&self) -> bool {
        matches!(self, Error::Eof { .. })
    }

    /// True for errors caused by the caller's data or schema rather than by
    /// the storage underneath.
    pub fn is_invalid_input(&self) -> bool {
        matches!(
            self,
            Error::NotARecord(_)
                | Error::SchemaMismatch { .. }
                | Error::TypeMismatch { .. }
                | Error::Parse { .. }
                | Error::UnsupportedType(_)
                | Error::FramingConflict { .. }
                | Error::Config(_)
        )
    }
}

#[test]
fn test_error_categories() {
    let eof = Error::eof_bytes(4, 2);
    assert!(eof.is_eof());
    assert!(!eof.is_invalid_input());
    assert_eq!(
        eof.to_string(),
        "unexpected end of data: wanted 4 bytes, consumed 2 bytes"
    );

    let mismatch = Error::SchemaMismatch {
        expected: 2,
        found: 3,
    };
    assert!(mismatch.is_invalid_input());
    assert!(!mismatch.is_eof());

    let io = Error::from(io::Error::new(io::ErrorKind::Other, "disk on fire"));
    assert!(!io.is_eof());
    assert!(!io.is_invalid_input());
}
