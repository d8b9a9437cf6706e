use std::{
    cell::RefCell,
    collections::HashMap,
    fs::{File, OpenOptions},
    io::{self, Read, Seek, SeekFrom, Write},
    path::{Path, PathBuf},
    rc::Rc,
};

use crate::error::Result;

pub trait DbFile: std::fmt::Debug + Read + Seek {
    /// Writes all of `buf` at the current end of the file and returns the
    /// offset the write began at.
    fn append(&mut self, buf: &[u8]) -> Result<u64>;
    fn sync(&mut self) -> Result<()>;
    fn len(&self) -> Result<u64>;
}

pub trait DbDir: Clone {
    type DbFile: DbFile;

    /// Opens `fname` for appending, creating it empty if it does not exist.
    fn open_append<P>(&mut self, fname: &P) -> Result<Self::DbFile>
    where
        P: AsRef<Path>;

    /// Opens an existing file for reading. `None` if it does not exist.
    fn open<P>(&mut self, fname: &P) -> Result<Option<Self::DbFile>>
    where
        P: AsRef<Path>;

    fn path<P>(&self, fname: &P) -> PathBuf
    where
        P: AsRef<Path>;
}

// OS implementation

#[derive(Clone, Debug)]
pub struct OsDir {
    root: PathBuf,
}

impl OsDir {
    pub fn new<P>(root: P) -> Self
    where
        P: Into<PathBuf>,
    {
        OsDir { root: root.into() }
    }
}

#[derive(Debug)]
pub struct OsFile {
    file: File,
}

impl Read for OsFile {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.file.read(buf)
    }
}

impl Seek for OsFile {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.file.seek(pos)
    }
}

impl DbFile for OsFile {
    fn append(&mut self, buf: &[u8]) -> Result<u64> {
        let offset = self.file.seek(SeekFrom::End(0))?;
        self.file.write_all(buf)?;
        Ok(offset)
    }

    fn sync(&mut self) -> Result<()> {
        self.file.flush()?;
        self.file.sync_all()?;
        Ok(())
    }

    fn len(&self) -> Result<u64> {
        Ok(self.file.metadata()?.len())
    }
}

impl DbDir for OsDir {
    type DbFile = OsFile;

    fn open_append<P>(&mut self, fname: &P) -> Result<Self::DbFile>
    where
        P: AsRef<Path>,
    {
        let file = OpenOptions::new()
            .read(true)
            .append(true)
            .create(true)
            .open(self.path(fname))?;
        Ok(OsFile { file })
    }

    fn open<P>(&mut self, fname: &P) -> Result<Option<Self::DbFile>>
    where
        P: AsRef<Path>,
    {
        match File::open(self.path(fname)) {
            Ok(file) => Ok(Some(OsFile { file })),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn path<P>(&self, fname: &P) -> PathBuf
    where
        P: AsRef<Path>,
    {
        self.root.join(fname)
    }
}

// Mock Implementation
#[derive(Default, Debug)]
struct MockData {
    synced: Vec<u8>,
    unsynced: Vec<u8>,
}

#[derive(Clone, Debug)]
pub struct MockFile {
    idx: usize,
    pub file_id: FileId,
    fs: Rc<RefCell<MockFs>>,
}

impl MockFile {
    fn read_all(&self) -> Vec<u8> {
        (*self.fs).borrow().data[self.file_id].unsynced.clone()
    }

    #[allow(unused)]
    fn read_all_synced(&self) -> Vec<u8> {
        (*self.fs).borrow().data[self.file_id].synced.clone()
    }
}

impl Seek for MockFile {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let target = match pos {
            SeekFrom::Start(i) => i as i64,
            SeekFrom::End(i) => (*self.fs).borrow().stat(self.file_id).len as i64 + i,
            SeekFrom::Current(i) => self.idx as i64 + i,
        };
        if target < 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "seek to a negative position",
            ));
        }
        self.idx = target as usize;
        Ok(target as u64)
    }
}

impl Read for MockFile {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        (*self.fs).borrow_mut().perform_op()?;
        let data = self.read_all();
        // Seeking past the end is allowed; reads there see nothing.
        let rest = data.get(self.idx..).unwrap_or(&[]);
        let n = std::cmp::min(rest.len(), buf.len());
        buf[..n].copy_from_slice(&rest[..n]);
        self.idx += n;
        Ok(n)
    }
}

impl DbFile for MockFile {
    fn append(&mut self, buf: &[u8]) -> Result<u64> {
        let offset = (*self.fs)
            .borrow_mut()
            .append(self.file_id, buf.to_vec())?;
        self.idx = offset as usize + buf.len();
        Ok(offset)
    }

    fn sync(&mut self) -> Result<()> {
        (*self.fs).borrow_mut().sync(self.file_id)?;
        Ok(())
    }

    fn len(&self) -> Result<u64> {
        Ok((*self.fs).borrow().stat(self.file_id).len as u64)
    }
}

struct FileMeta {
    len: usize,
}

#[derive(Clone, Debug)]
pub struct MockDir {
    pub fs: Rc<RefCell<MockFs>>,
}

impl MockDir {
    #[allow(clippy::new_without_default)]
    pub fn new() -> Self {
        MockDir {
            fs: Rc::new(RefCell::new(MockFs::new())),
        }
    }

    fn file(&self, file_id: FileId) -> MockFile {
        MockFile {
            fs: self.fs.clone(),
            file_id,
            idx: 0,
        }
    }
}

impl DbDir for MockDir {
    type DbFile = MockFile;

    fn open_append<P>(&mut self, fname: &P) -> Result<Self::DbFile>
    where
        P: AsRef<Path>,
    {
        let file_id = (*self.fs).borrow_mut().open_append(&self.path(fname))?;
        Ok(self.file(file_id))
    }

    fn open<P>(&mut self, fname: &P) -> Result<Option<Self::DbFile>>
    where
        P: AsRef<Path>,
    {
        let file_id = (*self.fs).borrow_mut().open(&self.path(fname));
        Ok(file_id.map(|id| self.file(id)))
    }

    fn path<P>(&self, fname: &P) -> PathBuf
    where
        P: AsRef<Path>,
    {
        fname.as_ref().to_path_buf()
    }
}

type FileId = usize;

#[derive(Debug, Clone)]
pub enum Event {
    Create(String, FileId),
    Open(String),
    Write(FileId, usize, Vec<u8>),
    Sync(FileId),
}

impl Event {
    pub fn write_abbrev<W: std::fmt::Write>(&self, w: &mut W) -> std::fmt::Result {
        match self {
            Event::Create(name, file_id) => {
                write!(w, "Create({}, {})", name, file_id)?;
            }
            Event::Open(name) => {
                write!(w, "Open({})", name)?;
            }
            Event::Write(file_id, idx, contents) => {
                write!(w, "Write({}, {}, ", file_id, idx)?;
                let escaped: String = contents
                    .iter()
                    .flat_map(|ch| std::ascii::escape_default(*ch))
                    .map(char::from)
                    .collect();
                write!(w, "{})", escaped)?;
            }
            Event::Sync(file_id) => {
                write!(w, "Sync({})", file_id)?;
            }
        }
        Ok(())
    }
}

#[derive(Debug)]
pub struct MockFs {
    names: HashMap<String, FileId>,
    data: Vec<MockData>,
    events: Vec<Event>,

    // After this many "things happen," "crash" the FS, meaning stop accepting
    // reads and writes and discard any unsynced data.
    time_to_crash: Option<usize>,
}

impl MockFs {
    fn new() -> Self {
        MockFs {
            names: HashMap::new(),
            data: Vec::new(),
            events: Vec::new(),
            time_to_crash: None,
        }
    }

    fn check_crashed(&self) -> io::Result<()> {
        if self.time_to_crash == Some(0) {
            Err(io::Error::new(io::ErrorKind::Other, "filesystem is down"))
        } else {
            Ok(())
        }
    }

    pub fn schedule_crash(&mut self, ops: usize) {
        self.time_to_crash = Some(ops);
    }

    // Discard all unsynced state, become uncrashed.
    pub fn reboot(&mut self) {
        for f in self.data.iter_mut() {
            f.unsynced.clear();
            f.unsynced.extend(&f.synced);
        }
        self.time_to_crash = None;
    }

    fn perform_op(&mut self) -> io::Result<()> {
        self.check_crashed()?;
        if let Some(x) = self.time_to_crash {
            self.time_to_crash = Some(x - 1);
        }
        Ok(())
    }

    fn record(&mut self, e: Event) {
        self.events.push(e);
    }

    pub fn take_events(&mut self) -> Vec<Event> {
        std::mem::take(&mut self.events)
    }

    fn stat(&self, file: FileId) -> FileMeta {
        FileMeta {
            len: self.data[file].unsynced.len(),
        }
    }

    fn open_append(&mut self, fname: &Path) -> io::Result<FileId> {
        self.perform_op()?;

        let path = fname.to_string_lossy().into_owned();
        if let Some(id) = self.names.get(&path).cloned() {
            self.record(Event::Open(path));
            return Ok(id);
        }
        let id = self.data.len();
        self.record(Event::Create(path.clone(), id));
        self.names.insert(path, id);
        self.data.push(MockData::default());
        Ok(id)
    }

    fn open(&mut self, fname: &Path) -> Option<FileId> {
        let path = fname.to_string_lossy().into_owned();
        let id = self.names.get(&path).cloned();
        self.record(Event::Open(path));
        id
    }

    fn append(&mut self, file: FileId, data: Vec<u8>) -> io::Result<u64> {
        self.perform_op()?;

        let offset = self.data[file].unsynced.len();
        self.data[file].unsynced.extend(&data);

        self.record(Event::Write(file, offset, data));
        Ok(offset as u64)
    }

    fn sync(&mut self, file: FileId) -> io::Result<()> {
        self.perform_op()?;

        self.record(Event::Sync(file));
        let d = &mut self.data[file];
        d.synced = d.unsynced.clone();

        Ok(())
    }
}
