use std::{
    fs::{self, OpenOptions},
    io::{self, Write},
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};

use crate::{
    encoding::{FieldValue, Schema},
    error::{Error, Result},
    scan::Delimiter,
};

pub const DEFAULT_FIELD_SEPARATOR: &str = "||||";
pub const DEFAULT_RECORD_DELIMITER: &str = "******";

/// The byte sequences that join fields inside a record and end a record in
/// the log. Both ends of a log must agree on them; changing them part way
/// through a file makes the rest of it unreadable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Framing {
    pub field_separator: String,
    pub record_delimiter: String,
}

impl Default for Framing {
    fn default() -> Self {
        Framing {
            field_separator: DEFAULT_FIELD_SEPARATOR.to_owned(),
            record_delimiter: DEFAULT_RECORD_DELIMITER.to_owned(),
        }
    }
}

impl Framing {
    pub fn new<S, D>(field_separator: S, record_delimiter: D) -> Result<Self>
    where
        S: Into<String>,
        D: Into<String>,
    {
        let framing = Framing {
            field_separator: field_separator.into(),
            record_delimiter: record_delimiter.into(),
        };
        framing.validate()?;
        Ok(framing)
    }

    pub fn validate(&self) -> Result<()> {
        if self.field_separator.is_empty() {
            return Err(Error::Config("field separator is empty".into()));
        }
        if self.record_delimiter.is_empty() {
            return Err(Error::Config("record delimiter is empty".into()));
        }
        if self.field_separator == self.record_delimiter {
            return Err(Error::Config(
                "field separator and record delimiter are the same".into(),
            ));
        }
        Ok(())
    }

    pub fn record_delimiter(&self) -> Result<Delimiter> {
        Delimiter::new(self.record_delimiter.as_bytes())
    }

    /// Rejects records whose text would make field or record boundaries
    /// ambiguous. The codec itself does not escape anything.
    pub fn check_fields(&self, record: &[FieldValue]) -> Result<()> {
        for (idx, v) in record.iter().enumerate() {
            let text = v.to_string();
            if text.contains(&self.field_separator) || text.contains(&self.record_delimiter) {
                return Err(Error::FramingConflict { field: idx });
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogOptions {
    /// Sync the file after every append.
    pub sync_on_append: bool,
}

impl Default for LogOptions {
    fn default() -> Self {
        LogOptions {
            sync_on_append: true,
        }
    }
}

/// Everything a table needs besides its directory and file name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TableConfig {
    pub framing: Framing,
    pub schema: Schema,
    pub log: LogOptions,
}

impl TableConfig {
    pub fn new(schema: Schema) -> Self {
        TableConfig {
            schema,
            ..Default::default()
        }
    }

    pub fn load<P>(path: P) -> Result<Self>
    where
        P: AsRef<Path>,
    {
        let path = path.as_ref();
        let contents = match fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(Error::NotFound(path.to_path_buf()))
            }
            Err(e) => return Err(e.into()),
        };
        let config: TableConfig = serde_json::from_str(&contents)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;
        config.framing.validate()?;
        Ok(config)
    }

    fn tmp_path(path: &Path) -> PathBuf {
        let mut name = path.file_name().unwrap_or_default().to_os_string();
        name.push(".tmp");
        path.with_file_name(name)
    }

    /// Writes the config next to `path` and renames it into place, so a
    /// reader sees either the old file or the new one.
    pub fn save<P>(&self, path: P) -> Result<()>
    where
        P: AsRef<Path>,
    {
        let path = path.as_ref();
        self.framing.validate()?;
        let tmp_path = Self::tmp_path(path);
        let mut file = OpenOptions::new()
            .write(true)
            .truncate(true)
            .create(true)
            .open(&tmp_path)?;
        let encoded = serde_json::to_string_pretty(self)
            .map_err(|e| Error::Config(e.to_string()))?;
        file.write_all(encoded.as_bytes())?;
        file.sync_all()?;
        fs::rename(tmp_path, path)?;
        Ok(())
    }
}
