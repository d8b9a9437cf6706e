use std::{
    fmt::Display,
    path::{Path, PathBuf},
};

use log::debug;

use crate::{
    config::{Framing, LogOptions},
    encoding::{FieldValue, RecordWriter},
    error::{Error, Result},
    fs::{DbDir, DbFile},
};

#[derive(Debug)]
pub struct LogWriter<F>
where
    F: DbFile,
{
    // None once closed.
    file: Option<F>,
    path: PathBuf,
    options: LogOptions,
}

impl<F> LogWriter<F>
where
    F: DbFile,
{
    /// Opens `fname` in `dir` for appending, creating an empty log if there
    /// is none.
    pub fn open_or_create<D, P>(dir: &mut D, fname: &P, options: LogOptions) -> Result<Self>
    where
        D: DbDir<DbFile = F>,
        P: AsRef<Path>,
    {
        let path = dir.path(fname);
        let file = dir.open_append(fname)?;
        debug!("opened {} for append at {}", path.display(), file.len()?);
        Ok(LogWriter {
            file: Some(file),
            path,
            options,
        })
    }

    fn file(&mut self) -> Result<&mut F> {
        self.file.as_mut().ok_or(Error::Closed)
    }

    /// Writes `bytes` at the end of the log and returns the offset they
    /// start at. The buffer goes down in a single write.
    pub fn append(&mut self, bytes: &[u8]) -> Result<u64> {
        let sync = self.options.sync_on_append;
        let file = self.file()?;
        let offset = file.append(bytes)?;
        if sync {
            file.sync()?;
        }
        debug!(
            "appended {} bytes to {} at {}",
            bytes.len(),
            self.path.display(),
            offset
        );
        Ok(offset)
    }

    /// Appends the plain text form of `value`. This is not framed and not
    /// schema-aware; callers add their own delimiter if they want one.
    pub fn append_value<V>(&mut self, value: &V) -> Result<u64>
    where
        V: Display + ?Sized,
    {
        self.append(value.to_string().as_bytes())
    }

    /// Encodes `record` and appends it followed by the record delimiter.
    pub fn append_record(&mut self, record: &[FieldValue], framing: &Framing) -> Result<u64> {
        let mut w = RecordWriter::new(framing.field_separator.as_bytes());
        w.record(record);
        w.raw(framing.record_delimiter.as_bytes());
        self.append(w.as_bytes())
    }

    /// The offset the next append will start at.
    pub fn end_offset(&self) -> Result<u64> {
        self.file.as_ref().ok_or(Error::Closed)?.len()
    }

    pub fn sync(&mut self) -> Result<()> {
        self.file()?.sync()
    }

    pub fn close(&mut self) -> Result<()> {
        let mut file = self.file.take().ok_or(Error::Closed)?;
        file.sync()?;
        debug!("closed {}", self.path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use time::macros::date;

    use crate::{
        config::{Framing, LogOptions},
        encoding::FieldValue,
        error::Error,
        fs::{MockDir, OsDir},
        log::LogWriter,
    };

    #[test]
    fn test_offsets() -> anyhow::Result<()> {
        let mut dir = MockDir::new();
        let framing = Framing::default();
        let mut w = LogWriter::open_or_create(&mut dir, &"people", LogOptions::default())?;

        let record = vec![
            FieldValue::Int(2025067),
            FieldValue::from("John Doe"),
            FieldValue::Date(date!(1971-12-16)),
        ];
        assert_eq!(0, w.append_record(&record, &framing)?);
        // "2025067||||John Doe||||12/16/1971" is 33 bytes, plus 6 of delimiter.
        assert_eq!(39, w.append_record(&record, &framing)?);
        assert_eq!(78, w.end_offset()?);
        Ok(())
    }

    #[test]
    fn test_append_value() -> anyhow::Result<()> {
        let mut dir = MockDir::new();
        let mut w = LogWriter::open_or_create(&mut dir, &"t", LogOptions::default())?;
        assert_eq!(0, w.append_value("Hello World Cup!")?);
        assert_eq!(16, w.append_value(&256)?);
        assert_eq!(19, w.append_value(&FieldValue::Float(1.5))?);
        assert_eq!(22, w.end_offset()?);
        Ok(())
    }

    #[test]
    fn test_use_after_close() -> anyhow::Result<()> {
        let mut dir = MockDir::new();
        let mut w = LogWriter::open_or_create(&mut dir, &"t", LogOptions::default())?;
        w.append(b"abc")?;
        w.close()?;

        assert!(matches!(w.append(b"def"), Err(Error::Closed)));
        assert!(matches!(w.append_value("x"), Err(Error::Closed)));
        assert!(matches!(w.end_offset(), Err(Error::Closed)));
        assert!(matches!(w.sync(), Err(Error::Closed)));
        assert!(matches!(w.close(), Err(Error::Closed)));
        Ok(())
    }

    #[test]
    fn test_reopen_appends_at_end() -> anyhow::Result<()> {
        let tmp = tempfile::tempdir()?;
        let mut dir = OsDir::new(tmp.path());

        let mut w = LogWriter::open_or_create(&mut dir, &"log", LogOptions::default())?;
        assert_eq!(0, w.append(b"Hello World Cup!")?);
        assert_eq!(16, w.append(b"I am unhappy.")?);
        w.close()?;

        let mut w = LogWriter::open_or_create(&mut dir, &"log", LogOptions::default())?;
        assert_eq!(29, w.append_value(&192)?);
        assert_eq!(32, w.append(b"How come?")?);
        w.close()?;

        assert_eq!(
            "Hello World Cup!I am unhappy.192How come?",
            std::fs::read_to_string(tmp.path().join("log"))?
        );
        Ok(())
    }

    #[test]
    fn test_failed_append_is_io_error() -> anyhow::Result<()> {
        let mut dir = MockDir::new();
        let mut w = LogWriter::open_or_create(&mut dir, &"t", LogOptions::default())?;
        (*dir.fs).borrow_mut().schedule_crash(0);
        let err = w.append(b"abc").unwrap_err();
        assert!(matches!(err, Error::Io(_)));
        assert!(!err.is_eof());
        Ok(())
    }

    #[test]
    fn test_no_sync_on_append() -> anyhow::Result<()> {
        let mut dir = MockDir::new();
        let options = LogOptions {
            sync_on_append: false,
        };
        let mut w = LogWriter::open_or_create(&mut dir, &"t", options)?;
        w.append(b"abc")?;
        (*dir.fs).borrow_mut().reboot();
        // Nothing was synced, so the reboot dropped the write.
        assert_eq!(0, w.end_offset()?);

        w.append(b"abc")?;
        w.sync()?;
        (*dir.fs).borrow_mut().reboot();
        assert_eq!(3, w.end_offset()?);
        Ok(())
    }
}
