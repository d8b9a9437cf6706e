use std::path::{Path, PathBuf};

use log::debug;

use crate::{
    config::TableConfig,
    encoding::{FieldValue, RecordReader},
    error::{Error, Result},
    fs::DbDir,
    log::{LogReader, LogWriter},
    scan::Delimiter,
};

/// A log of records that all share one schema. The log file is created by
/// the first insert.
pub struct Table<D>
where
    D: DbDir,
{
    dir: D,
    fname: PathBuf,
    config: TableConfig,
    delimiter: Delimiter,
    records: RecordReader,
    writer: Option<LogWriter<D::DbFile>>,
}

impl<D> Table<D>
where
    D: DbDir,
{
    pub fn new<P>(dir: D, fname: P, config: TableConfig) -> Result<Self>
    where
        P: AsRef<Path>,
    {
        config.framing.validate()?;
        let delimiter = config.framing.record_delimiter()?;
        let records = RecordReader::new(config.framing.field_separator.as_bytes())?;
        Ok(Table {
            dir,
            fname: fname.as_ref().to_path_buf(),
            config,
            delimiter,
            records,
            writer: None,
        })
    }

    pub fn config(&self) -> &TableConfig {
        &self.config
    }

    /// Appends `record` and returns the offset of its frame. Records that do
    /// not fit the schema, or whose text contains the separator or the
    /// delimiter, are refused before anything is written.
    pub fn insert(&mut self, record: &[FieldValue]) -> Result<u64> {
        self.config.schema.check(record)?;
        self.config.framing.check_fields(record)?;
        if self.writer.is_none() {
            let w = LogWriter::open_or_create(&mut self.dir, &self.fname, self.config.log)?;
            self.writer = Some(w);
        }
        let writer = self.writer.as_mut().ok_or(Error::Closed)?;
        writer.append_record(record, &self.config.framing)
    }

    /// Reads the record whose frame starts at `offset`.
    pub fn get(&mut self, offset: u64) -> Result<Vec<FieldValue>> {
        let mut r = LogReader::open(&mut self.dir, &self.fname)?;
        r.seek(offset)?;
        let payload = r.read_until_delimiter(&self.delimiter)?;
        r.close()?;
        self.records.decode(&payload, &self.config.schema)
    }

    /// Every record in the log, in write order, with its offset. A table
    /// nothing has been inserted into yet is empty.
    pub fn scan(&mut self) -> Result<Vec<(u64, Vec<FieldValue>)>> {
        let mut r = match LogReader::open(&mut self.dir, &self.fname) {
            Ok(r) => r,
            Err(Error::NotFound(path)) => {
                debug!("{} does not exist yet", path.display());
                return Ok(Vec::new());
            }
            Err(e) => return Err(e),
        };
        let mut out = Vec::new();
        for frame in r.frames(&self.delimiter) {
            let frame = frame?;
            let record = self.records.decode(&frame.payload, &self.config.schema)?;
            out.push((frame.offset, record));
        }
        r.close()?;
        Ok(out)
    }

    pub fn close(&mut self) -> Result<()> {
        if let Some(mut w) = self.writer.take() {
            w.close()?;
        }
        Ok(())
    }
}
