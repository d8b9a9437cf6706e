use std::{
    io::{self, BufRead, BufReader, Read, Seek, SeekFrom},
    path::{Path, PathBuf},
};

use log::{debug, warn};

use crate::{
    config::Framing,
    encoding::{FieldValue, RecordReader, Schema},
    error::{Error, Result},
    fs::{DbDir, DbFile},
    scan::Delimiter,
};

use super::Frame;

pub struct LogReader<F>
where
    F: DbFile,
{
    // None once closed.
    file: Option<BufReader<F>>,
    path: PathBuf,
    pos: u64,
}

impl<F> LogReader<F>
where
    F: DbFile,
{
    pub fn open<D, P>(dir: &mut D, fname: &P) -> Result<Self>
    where
        D: DbDir<DbFile = F>,
        P: AsRef<Path>,
    {
        let path = dir.path(fname);
        let file = dir
            .open(fname)?
            .ok_or_else(|| Error::NotFound(path.clone()))?;
        debug!("opened {} for reading", path.display());
        Ok(LogReader {
            file: Some(BufReader::new(file)),
            path,
            pos: 0,
        })
    }

    pub fn position(&self) -> Result<u64> {
        self.file.as_ref().ok_or(Error::Closed)?;
        Ok(self.pos)
    }

    /// Moves the cursor to `offset`. Seeking past the end of the data is
    /// fine; the next read reports end of data.
    pub fn seek(&mut self, offset: u64) -> Result<()> {
        let file = self.file.as_mut().ok_or(Error::Closed)?;
        self.pos = file.seek(SeekFrom::Start(offset))?;
        Ok(())
    }

    /// Reads exactly `n` bytes. If the data runs out first nothing is
    /// returned and the cursor goes back to where it was.
    pub fn read_exact(&mut self, n: usize) -> Result<Vec<u8>> {
        let file = self.file.as_mut().ok_or(Error::Closed)?;
        // Grows with the data actually read, so a length far past the end
        // costs no more than the rest of the log.
        let mut buf = Vec::new();
        if let Err(e) = file.by_ref().take(n as u64).read_to_end(&mut buf) {
            file.seek(SeekFrom::Start(self.pos))?;
            return Err(e.into());
        }
        if buf.len() < n {
            file.seek(SeekFrom::Start(self.pos))?;
            return Err(Error::eof_bytes(n, buf.len() as u64));
        }
        self.pos += n as u64;
        Ok(buf)
    }

    /// Returns the bytes between the cursor and the next occurrence of
    /// `delimiter`, and leaves the cursor just past it.
    ///
    /// If the data ends before a whole delimiter is seen, the bytes read are
    /// dropped, the cursor goes back to where this call started and an
    /// [`Error::Eof`] is returned. A reader following a log that is still
    /// being written can simply try again later.
    pub fn read_until_delimiter(&mut self, delimiter: &Delimiter) -> Result<Vec<u8>> {
        let file = self.file.as_mut().ok_or(Error::Closed)?;
        let mut out = Vec::new();
        match scan_frame(file, delimiter, &mut out) {
            Ok(true) => {
                self.pos += out.len() as u64;
                out.truncate(out.len() - delimiter.len());
                return Ok(out);
            }
            Ok(false) => {}
            Err(e) => {
                file.seek(SeekFrom::Start(self.pos))?;
                return Err(e.into());
            }
        }

        file.seek(SeekFrom::Start(self.pos))?;
        if !out.is_empty() {
            warn!(
                "{}: {} bytes at {} are not terminated by a delimiter",
                self.path.display(),
                out.len(),
                self.pos
            );
        }
        Err(Error::eof_delimiter(delimiter.as_bytes(), out.len() as u64))
    }

    /// Reads the next frame and decodes it with `schema`.
    pub fn read_record(&mut self, framing: &Framing, schema: &Schema) -> Result<Vec<FieldValue>> {
        let delimiter = framing.record_delimiter()?;
        let records = RecordReader::new(framing.field_separator.as_bytes())?;
        let payload = self.read_until_delimiter(&delimiter)?;
        records.decode(&payload, schema)
    }

    /// Iterates over the frames from the cursor to the end of the data. A
    /// clean end stops the iteration; a trailing partial frame is reported
    /// once as an [`Error::Eof`].
    pub fn frames<'a>(&'a mut self, delimiter: &'a Delimiter) -> Frames<'a, F> {
        Frames {
            reader: self,
            delimiter,
            done: false,
        }
    }

    pub fn close(&mut self) -> Result<()> {
        self.file.take().ok_or(Error::Closed)?;
        debug!("closed {}", self.path.display());
        Ok(())
    }
}

/// Copies bytes from `r` into `out` up to and including the next
/// `delimiter`. Returns false if the data ends first.
fn scan_frame<R>(r: &mut R, delimiter: &Delimiter, out: &mut Vec<u8>) -> io::Result<bool>
where
    R: BufRead,
{
    let mut m = delimiter.matcher();
    loop {
        let buf = r.fill_buf()?;
        if buf.is_empty() {
            return Ok(false);
        }
        // Every byte goes into `out` exactly once; on a match the last
        // `delimiter.len()` of them are the delimiter itself.
        let (used, found) = match buf.iter().position(|b| m.push(*b)) {
            Some(idx) => (idx + 1, true),
            None => (buf.len(), false),
        };
        out.extend_from_slice(&buf[..used]);
        r.consume(used);
        if found {
            return Ok(true);
        }
    }
}

pub struct Frames<'a, F>
where
    F: DbFile,
{
    reader: &'a mut LogReader<F>,
    delimiter: &'a Delimiter,
    done: bool,
}

impl<'a, F> Iterator for Frames<'a, F>
where
    F: DbFile,
{
    type Item = Result<Frame>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let offset = self.reader.pos;
        match self.reader.read_until_delimiter(self.delimiter) {
            Ok(payload) => Some(Ok(Frame { offset, payload })),
            Err(Error::Eof { consumed: 0, .. }) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use time::macros::date;

    use crate::{
        config::{Framing, LogOptions},
        encoding::{encode, FieldValue, Schema},
        error::Error,
        fs::{MockDir, OsDir},
        log::{LogReader, LogWriter},
        scan::Delimiter,
    };

    fn write_raw(dir: &mut MockDir, contents: &[u8]) -> anyhow::Result<()> {
        let mut w = LogWriter::open_or_create(dir, &"log", LogOptions::default())?;
        w.append(contents)?;
        w.close()?;
        Ok(())
    }

    #[test]
    fn test_missing_log() {
        let mut dir = MockDir::new();
        assert!(matches!(
            LogReader::open(&mut dir, &"nope"),
            Err(Error::NotFound(_))
        ));

        let tmp = tempfile::tempdir().unwrap();
        let mut dir = OsDir::new(tmp.path());
        assert!(matches!(
            LogReader::open(&mut dir, &"nope"),
            Err(Error::NotFound(_))
        ));
    }

    #[test]
    fn test_read_exact() -> anyhow::Result<()> {
        let mut dir = MockDir::new();
        write_raw(&mut dir, b"Hello World Cup!I am unhappy.")?;
        let mut r = LogReader::open(&mut dir, &"log")?;

        assert_eq!(b"Hell".to_vec(), r.read_exact(4)?);
        assert_eq!(b"o Wo".to_vec(), r.read_exact(4)?);
        assert_eq!(8, r.position()?);

        r.seek(15)?;
        assert_eq!(b"!I a".to_vec(), r.read_exact(4)?);
        r.seek(13)?;
        assert_eq!(b"up!I".to_vec(), r.read_exact(4)?);

        r.seek(27)?;
        let err = r.read_exact(4).unwrap_err();
        assert!(err.is_eof());
        // Nothing was consumed by the failed read.
        assert_eq!(27, r.position()?);
        assert_eq!(b"y.".to_vec(), r.read_exact(2)?);
        Ok(())
    }

    #[test]
    fn test_seek_past_end() -> anyhow::Result<()> {
        let mut dir = MockDir::new();
        write_raw(&mut dir, b"abc******")?;
        let mut r = LogReader::open(&mut dir, &"log")?;
        r.seek(100)?;
        assert_eq!(100, r.position()?);
        let d = Delimiter::new("******")?;
        assert!(r.read_until_delimiter(&d).unwrap_err().is_eof());
        assert!(r.read_exact(1).unwrap_err().is_eof());
        assert_eq!(0, r.frames(&d).count());
        Ok(())
    }

    #[test]
    fn test_read_exact_longer_than_log() -> anyhow::Result<()> {
        let mut dir = MockDir::new();
        write_raw(&mut dir, b"abc")?;
        let mut r = LogReader::open(&mut dir, &"log")?;
        r.seek(1)?;
        match r.read_exact(usize::MAX) {
            Err(Error::Eof { consumed, .. }) => assert_eq!(2, consumed),
            other => panic!("expected eof, got {:?}", other),
        }
        assert_eq!(1, r.position()?);
        assert_eq!(b"bc".to_vec(), r.read_exact(2)?);
        Ok(())
    }

    #[test]
    fn test_read_fault_keeps_cursor() -> anyhow::Result<()> {
        // Longer than one BufReader fill, so the fault lands mid-frame.
        let mut contents: Vec<u8> = (0..10_000).map(|i| b'0' + (i % 10) as u8).collect();
        contents.extend(b"##");
        let mut dir = MockDir::new();
        write_raw(&mut dir, &contents)?;
        let d = Delimiter::new("##")?;

        let mut r = LogReader::open(&mut dir, &"log")?;
        (*dir.fs).borrow_mut().schedule_crash(1);
        assert!(matches!(r.read_until_delimiter(&d), Err(Error::Io(_))));
        assert_eq!(0, r.position()?);
        (*dir.fs).borrow_mut().reboot();
        assert_eq!(&contents[..10_000], &r.read_until_delimiter(&d)?[..]);
        assert_eq!(10_002, r.position()?);

        r.seek(0)?;
        (*dir.fs).borrow_mut().schedule_crash(1);
        assert!(matches!(r.read_exact(20_000), Err(Error::Io(_))));
        assert_eq!(0, r.position()?);
        (*dir.fs).borrow_mut().reboot();
        assert_eq!(contents, r.read_exact(10_002)?);
        Ok(())
    }

    #[test]
    fn test_ordered_recovery() -> anyhow::Result<()> {
        let tmp = tempfile::tempdir()?;
        let mut dir = OsDir::new(tmp.path());
        let framing = Framing::default();

        let payloads: Vec<Vec<u8>> = (0..50)
            .map(|i| {
                encode(
                    &[FieldValue::Int(i), FieldValue::from(format!("name {}", i))],
                    b"||||",
                )
            })
            .collect();

        let mut w = LogWriter::open_or_create(&mut dir, &"log", LogOptions::default())?;
        let mut offsets = Vec::new();
        for p in &payloads {
            let mut framed = p.clone();
            framed.extend(framing.record_delimiter.as_bytes());
            offsets.push(w.append(&framed)?);
        }
        w.close()?;

        let mut r = LogReader::open(&mut dir, &"log")?;
        let d = framing.record_delimiter()?;
        let frames = r.frames(&d).collect::<Result<Vec<_>, _>>()?;
        assert_eq!(payloads.len(), frames.len());
        for ((frame, payload), offset) in frames.iter().zip(&payloads).zip(&offsets) {
            assert_eq!(&frame.payload, payload);
            assert_eq!(frame.offset, *offset);
        }

        // Offsets returned by the writer are valid read positions.
        r.seek(offsets[17])?;
        assert_eq!(payloads[17], r.read_until_delimiter(&d)?);
        r.close()?;
        Ok(())
    }

    #[test]
    fn test_truncated_tail() -> anyhow::Result<()> {
        let mut dir = MockDir::new();
        write_raw(&mut dir, b"one******two****")?;
        let mut r = LogReader::open(&mut dir, &"log")?;
        let d = Delimiter::new("******")?;

        assert_eq!(b"one".to_vec(), r.read_until_delimiter(&d)?);
        match r.read_until_delimiter(&d) {
            Err(Error::Eof { consumed, .. }) => assert_eq!(7, consumed),
            other => panic!("expected eof, got {:?}", other),
        }
        assert_eq!(9, r.position()?);

        // The writer finishes the frame; the reader picks it up from where
        // the failed read started.
        let mut w = LogWriter::open_or_create(&mut dir, &"log", LogOptions::default())?;
        w.append(b"**")?;
        assert_eq!(b"two".to_vec(), r.read_until_delimiter(&d)?);
        Ok(())
    }

    #[test]
    fn test_frames_reports_truncated_tail_once() -> anyhow::Result<()> {
        let mut dir = MockDir::new();
        write_raw(&mut dir, b"a##b##c#")?;
        let mut r = LogReader::open(&mut dir, &"log")?;
        let d = Delimiter::new("##")?;
        let results: Vec<_> = r.frames(&d).collect();
        assert_eq!(3, results.len());
        assert_eq!(b"a".to_vec(), results[0].as_ref().unwrap().payload);
        assert_eq!(3, results[1].as_ref().unwrap().offset);
        assert!(results[2].as_ref().unwrap_err().is_eof());
        Ok(())
    }

    #[test]
    fn test_self_overlapping_delimiter() -> anyhow::Result<()> {
        let mut dir = MockDir::new();
        write_raw(&mut dir, b"aaaaaab")?;
        let mut r = LogReader::open(&mut dir, &"log")?;
        let d = Delimiter::new("aaab")?;
        assert_eq!(b"aaa".to_vec(), r.read_until_delimiter(&d)?);
        assert_eq!(7, r.position()?);
        assert!(r.read_until_delimiter(&d).unwrap_err().is_eof());
        Ok(())
    }

    #[test]
    fn test_delimiter_across_buffer_boundary() -> anyhow::Result<()> {
        // BufReader's default buffer is 8 KiB; put a delimiter straddling it
        // and make the bytes before it look like a delimiter prefix.
        let mut contents = vec![b'x'; 8190];
        contents.extend(b"aaaaab");
        contents.extend(b"tail");
        let mut dir = MockDir::new();
        write_raw(&mut dir, &contents)?;

        let mut r = LogReader::open(&mut dir, &"log")?;
        let d = Delimiter::new("aaab")?;
        let payload = r.read_until_delimiter(&d)?;
        assert_eq!(8192, payload.len());
        assert_eq!(b"xxaa", &payload[8188..]);
        assert_eq!(8196, r.position()?);
        assert_eq!(b"tail".to_vec(), r.read_exact(4)?);
        Ok(())
    }

    #[test]
    fn test_read_record() -> anyhow::Result<()> {
        let mut dir = MockDir::new();
        let framing = Framing::default();
        let schema: Schema = "int,str,date".parse()?;
        let record = vec![
            FieldValue::Int(2025067),
            FieldValue::from("John Doe"),
            FieldValue::Date(date!(1971-12-16)),
        ];

        let mut w = LogWriter::open_or_create(&mut dir, &"log", LogOptions::default())?;
        w.append_record(&record, &framing)?;
        w.append_record(&record, &framing)?;
        w.close()?;

        let mut r = LogReader::open(&mut dir, &"log")?;
        assert_eq!(record, r.read_record(&framing, &schema)?);
        assert_eq!(record, r.read_record(&framing, &schema)?);
        assert!(r.read_record(&framing, &schema).unwrap_err().is_eof());

        let wrong: Schema = "int,str".parse()?;
        r.seek(0)?;
        assert!(matches!(
            r.read_record(&framing, &wrong),
            Err(Error::SchemaMismatch { .. })
        ));
        Ok(())
    }

    #[test]
    fn test_use_after_close() -> anyhow::Result<()> {
        let mut dir = MockDir::new();
        write_raw(&mut dir, b"abc")?;
        let mut r = LogReader::open(&mut dir, &"log")?;
        r.close()?;
        let d = Delimiter::new("#")?;
        assert!(matches!(r.seek(0), Err(Error::Closed)));
        assert!(matches!(r.read_exact(1), Err(Error::Closed)));
        assert!(matches!(r.read_until_delimiter(&d), Err(Error::Closed)));
        assert!(matches!(r.position(), Err(Error::Closed)));
        assert!(matches!(r.close(), Err(Error::Closed)));
        Ok(())
    }
}
