use crate::model::Record;
use crate::store::query::{self, Document, Filter, Projection, SortSpec};
use crate::store::{InsertTicket, RecordStore, StoreError, StoreResult};
use log::{error, info, warn};
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::RwLock;

/// Append-only JSON-lines file, one record per line, mirrored in memory.
pub struct JsonlStore {
    path: PathBuf,
    records: RwLock<Vec<Record>>,
    /// Set when a failed append could not be rolled back; the file then
    /// ends in a fragment. Cleared by `remove_all`, which truncates it away;
    /// a reopen also drops it.
    broken: AtomicBool,
}

impl JsonlStore {
    /// Opens (or creates) the file at `path` and loads every stored record.
    pub fn open<P: AsRef<Path>>(path: P) -> StoreResult<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        OpenOptions::new().create(true).append(true).open(&path)?;

        let (records, torn) = load_records(&path)?;
        if torn {
            rewrite(&path, &records)?;
        }
        info!(
            "opened record file {} with {} records",
            path.display(),
            records.len()
        );
        Ok(Self {
            path,
            records: RwLock::new(records),
            broken: AtomicBool::new(false),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn ensure_usable(&self) -> StoreResult<()> {
        if self.broken.load(Ordering::Acquire) {
            return Err(StoreError::Unavailable(format!(
                "{} ends in an uncommitted fragment; reopen the store",
                self.path.display()
            )));
        }
        Ok(())
    }
}

/// File operations an append needs, so the rollback path can be exercised
/// without a failing disk.
trait AppendTarget: Write {
    fn size(&self) -> io::Result<u64>;
    fn sync(&self) -> io::Result<()>;
    fn truncate(&self, len: u64) -> io::Result<()>;
}

impl AppendTarget for File {
    fn size(&self) -> io::Result<u64> {
        Ok(self.metadata()?.len())
    }

    fn sync(&self) -> io::Result<()> {
        self.sync_data()
    }

    fn truncate(&self, len: u64) -> io::Result<()> {
        self.set_len(len)
    }
}

/// Appends `line` durably, or truncates back to the pre-append length.
fn append_line<T: AppendTarget>(target: &mut T, line: &[u8]) -> StoreResult<()> {
    let committed_len = target.size()?;
    let write = match target.write_all(line).and_then(|_| target.sync()) {
        Ok(()) => return Ok(()),
        Err(err) => err,
    };
    match target.truncate(committed_len) {
        Ok(()) => Err(StoreError::Io(write)),
        Err(truncate) => Err(StoreError::RollbackFailed { write, truncate }),
    }
}

/// Returns the parsed records and whether a torn final line was dropped.
fn load_records(path: &Path) -> StoreResult<(Vec<Record>, bool)> {
    let lines: Vec<String> = BufReader::new(File::open(path)?)
        .lines()
        .collect::<Result<_, _>>()?;
    let last = lines.len();

    let mut records = Vec::with_capacity(last);
    let mut torn = false;
    for (idx, line) in lines.iter().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<Record>(line) {
            Ok(record) => records.push(record),
            // a crash mid-append can only tear the final line
            Err(err) if idx + 1 == last => {
                warn!("dropping torn trailing line in {}: {}", path.display(), err);
                torn = true;
            }
            Err(source) => {
                return Err(StoreError::Corrupt {
                    line: idx + 1,
                    source,
                })
            }
        }
    }
    Ok((records, torn))
}

fn rewrite(path: &Path, records: &[Record]) -> StoreResult<()> {
    let mut contents = String::new();
    for record in records {
        contents.push_str(&serde_json::to_string(record)?);
        contents.push('\n');
    }
    let mut file = File::create(path)?;
    file.write_all(contents.as_bytes())?;
    file.sync_all()?;
    Ok(())
}

impl RecordStore for JsonlStore {
    fn insert(&self, record: &Record, ticket: &InsertTicket) -> StoreResult<()> {
        let mut line = serde_json::to_string(record)?;
        line.push('\n');

        let mut records = self.records.write().map_err(|_| StoreError::Poisoned)?;
        self.ensure_usable()?;
        let mut file = OpenOptions::new().append(true).open(&self.path)?;
        if !ticket.claim() {
            return Err(StoreError::Abandoned);
        }
        match append_line(&mut file, line.as_bytes()) {
            Ok(()) => {
                records.push(record.clone());
                Ok(())
            }
            Err(err) => {
                if matches!(err, StoreError::RollbackFailed { .. }) {
                    error!("{}: {}; refusing further writes", self.path.display(), err);
                    self.broken.store(true, Ordering::Release);
                }
                Err(err)
            }
        }
    }

    fn find_by(
        &self,
        filter: &Filter,
        projection: Projection,
        sort: Option<SortSpec>,
    ) -> StoreResult<Vec<Document>> {
        let records = self.records.read().map_err(|_| StoreError::Poisoned)?;
        self.ensure_usable()?;
        Ok(query::apply(records.iter(), filter, projection, sort))
    }

    fn remove_all(&self) -> StoreResult<usize> {
        let mut records = self.records.write().map_err(|_| StoreError::Poisoned)?;
        // the file is empty once create succeeds; keep memory in step with it
        let file = File::create(&self.path)?;
        let removed = records.len();
        records.clear();
        self.broken.store(false, Ordering::Release);
        file.sync_all()?;
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Detection;
    use tempfile::tempdir;

    fn sample(mac: &str) -> Record {
        Record::new(
            mac,
            "t0",
            "temp",
            vec![Detection::new(vec![1.0], 0.0), Detection::new(vec![2.0], 1.0)],
        )
    }

    #[test]
    fn records_survive_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("specs.jsonl");
        {
            let store = JsonlStore::open(&path).unwrap();
            store.insert(&sample("a"), &InsertTicket::new()).unwrap();
            store.insert(&sample("b"), &InsertTicket::new()).unwrap();
        }
        let store = JsonlStore::open(&path).unwrap();
        assert_eq!(store.path(), path.as_path());
        let docs = store
            .find_by(&Filter::all(), Projection::Full, None)
            .unwrap();
        assert_eq!(docs.len(), 2);
        assert_eq!(docs[1].mac(), "b");
    }

    #[test]
    fn remove_all_truncates_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("specs.jsonl");
        let store = JsonlStore::open(&path).unwrap();
        store.insert(&sample("a"), &InsertTicket::new()).unwrap();
        assert_eq!(store.remove_all().unwrap(), 1);
        assert_eq!(fs::read_to_string(&path).unwrap(), "");
        assert_eq!(JsonlStore::open(&path).unwrap().remove_all().unwrap(), 0);
    }

    #[test]
    fn torn_trailing_line_is_dropped_but_inner_corruption_fails() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("specs.jsonl");
        let good = serde_json::to_string(&sample("a")).unwrap();

        let mut file = File::create(&path).unwrap();
        writeln!(file, "{}", good).unwrap();
        write!(file, "{{\"mac\":\"b\",\"sen").unwrap();
        drop(file);
        let store = JsonlStore::open(&path).unwrap();
        store.insert(&sample("c"), &InsertTicket::new()).unwrap();
        drop(store);
        let docs = JsonlStore::open(&path)
            .unwrap()
            .find_by(&Filter::all(), Projection::Full, None)
            .unwrap();
        let macs: Vec<&str> = docs.iter().map(Document::mac).collect();
        assert_eq!(macs, vec!["a", "c"]);

        let mut file = File::create(&path).unwrap();
        writeln!(file, "not json").unwrap();
        writeln!(file, "{}", good).unwrap();
        drop(file);
        assert!(matches!(
            JsonlStore::open(&path),
            Err(StoreError::Corrupt { line: 1, .. })
        ));
    }

    /// Accepts `accept` bytes, then fails every write; cannot be truncated.
    struct FlakyFile {
        data: Vec<u8>,
        accept: usize,
    }

    impl Write for FlakyFile {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            if self.accept == 0 {
                return Err(io::Error::new(io::ErrorKind::Other, "disk full"));
            }
            let n = buf.len().min(self.accept);
            self.accept -= n;
            self.data.extend_from_slice(&buf[..n]);
            Ok(n)
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl AppendTarget for FlakyFile {
        fn size(&self) -> io::Result<u64> {
            Ok(self.data.len() as u64)
        }

        fn sync(&self) -> io::Result<()> {
            Ok(())
        }

        fn truncate(&self, _len: u64) -> io::Result<()> {
            Err(io::Error::new(io::ErrorKind::Other, "read-only"))
        }
    }

    #[test]
    fn failed_append_is_rolled_back_to_committed_length() {
        let dir = tempdir().unwrap();
        let mut file = File::create(dir.path().join("specs.jsonl")).unwrap();
        let line = serde_json::to_string(&sample("a")).unwrap() + "\n";
        append_line(&mut file, line.as_bytes()).unwrap();
        let committed = AppendTarget::size(&file).unwrap();

        // a short write followed by an error on the real file
        struct HalfWrite<'a>(&'a mut File);
        impl Write for HalfWrite<'_> {
            fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
                self.0.write_all(&buf[..buf.len() / 2])?;
                Err(io::Error::new(io::ErrorKind::Other, "disk full"))
            }
            fn flush(&mut self) -> io::Result<()> {
                Ok(())
            }
        }
        impl AppendTarget for HalfWrite<'_> {
            fn size(&self) -> io::Result<u64> {
                AppendTarget::size(&*self.0)
            }
            fn sync(&self) -> io::Result<()> {
                self.0.sync_data()
            }
            fn truncate(&self, len: u64) -> io::Result<()> {
                self.0.set_len(len)
            }
        }

        let err = append_line(&mut HalfWrite(&mut file), line.as_bytes()).unwrap_err();
        assert!(matches!(err, StoreError::Io(_)));
        assert_eq!(AppendTarget::size(&file).unwrap(), committed);
    }

    #[test]
    fn failed_rollback_is_reported_distinctly() {
        let mut target = FlakyFile {
            data: Vec::new(),
            accept: 4,
        };
        let err = append_line(&mut target, b"{\"mac\":\"a\"}\n").unwrap_err();
        assert!(matches!(err, StoreError::RollbackFailed { .. }));
        assert_eq!(target.data, b"{\"ma");
    }

    #[test]
    fn broken_store_refuses_work_until_truncated() {
        let dir = tempdir().unwrap();
        let store = JsonlStore::open(dir.path().join("specs.jsonl")).unwrap();
        store.insert(&sample("a"), &InsertTicket::new()).unwrap();
        store.broken.store(true, Ordering::Release);

        assert!(matches!(
            store.insert(&sample("b"), &InsertTicket::new()),
            Err(StoreError::Unavailable(_))
        ));
        assert!(store
            .find_by(&Filter::all(), Projection::Full, None)
            .is_err());

        assert_eq!(store.remove_all().unwrap(), 1);
        store.insert(&sample("c"), &InsertTicket::new()).unwrap();
    }

    #[test]
    fn unwritable_path_leaves_memory_and_disk_in_step() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("specs.jsonl");
        let store = JsonlStore::open(&path).unwrap();
        store.insert(&sample("a"), &InsertTicket::new()).unwrap();

        // replacing the file with a directory makes every open fail
        fs::remove_file(&path).unwrap();
        fs::create_dir(&path).unwrap();

        assert!(store.insert(&sample("b"), &InsertTicket::new()).is_err());
        assert!(store.remove_all().is_err());
        let docs = store
            .find_by(&Filter::all(), Projection::Full, None)
            .unwrap();
        assert_eq!(docs.len(), 1);
    }

    #[test]
    fn abandoned_insert_leaves_file_untouched() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("specs.jsonl");
        let store = JsonlStore::open(&path).unwrap();
        let ticket = InsertTicket::new();
        ticket.abandon();
        assert!(matches!(
            store.insert(&sample("a"), &ticket),
            Err(StoreError::Abandoned)
        ));
        assert_eq!(fs::read_to_string(&path).unwrap(), "");
    }
}
