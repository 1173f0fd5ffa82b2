//! Temporary run files and the store that tracks them.

use std::collections::VecDeque;
use std::fs;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use log;
use tempfile;

/// A sealed, sorted temporary file produced by the split or merge phase.
///
/// The handle is the only reference to the backing file. Deleting a run
/// consumes the handle, so a run cannot be deleted twice or read after
/// deletion.
#[derive(Debug)]
pub struct Run {
    id: u64,
    path: PathBuf,
    len: u64,
}

impl Run {
    pub(crate) fn new(id: u64, path: PathBuf, len: u64) -> Self {
        Run { id, path, len }
    }

    /// Identifier the backing file is named after.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Total length of the run in bytes.
    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Opens the backing file for reading.
    pub fn open(&self) -> io::Result<fs::File> {
        fs::File::open(&self.path)
    }
}

/// Buffered writer for a run under construction.
///
/// Counts what it writes; [`RunWriter::finish`] flushes and seals the file
/// into a [`Run`] carrying the recorded length.
pub struct RunWriter {
    id: u64,
    path: PathBuf,
    writer: BufWriter<fs::File>,
    written: u64,
}

impl RunWriter {
    /// Appends raw element bytes to the run.
    pub fn write_all(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.writer.write_all(bytes)?;
        self.written += bytes.len() as u64;
        Ok(())
    }

    /// Flushes buffered data and seals the run.
    pub fn finish(mut self) -> io::Result<Run> {
        self.writer.flush()?;
        Ok(Run::new(self.id, self.path, self.written))
    }
}

/// Creates, queues and deletes the temporary runs a sort produces.
///
/// Runs live in a private directory created under the caller's temporary
/// path and are named `run-<id>` with a monotonically increasing id. The
/// queue is FIFO: the split phase enqueues initial runs in input order and
/// every merge group dequeues from the front and enqueues its result at the
/// back. Dropping the store removes the directory with anything still in
/// it, so temporary files never outlive a sort, on error paths included.
pub struct RunStore {
    dir: tempfile::TempDir,
    pending: VecDeque<Run>,
    next_id: u64,
}

impl RunStore {
    /// Opens a store under `tmp_path`, creating the directory if absent.
    /// The OS temporary directory is used when `tmp_path` is [`None`].
    pub fn new(tmp_path: Option<&Path>) -> io::Result<Self> {
        let dir = match tmp_path {
            Some(path) => {
                fs::create_dir_all(path)?;
                tempfile::tempdir_in(path)?
            }
            None => tempfile::tempdir()?,
        };

        log::info!("storing temporary runs under {}", dir.path().display());

        Ok(RunStore {
            dir,
            pending: VecDeque::new(),
            next_id: 0,
        })
    }

    /// Starts a new uniquely-named run file with a `buf_size`-byte write
    /// buffer.
    pub fn create(&mut self, buf_size: usize) -> io::Result<RunWriter> {
        let id = self.next_id;
        self.next_id += 1;

        let path = self.dir.path().join(format!("run-{}", id));
        let file = fs::File::create(&path)?;

        Ok(RunWriter {
            id,
            path,
            writer: BufWriter::with_capacity(buf_size, file),
            written: 0,
        })
    }

    /// Queues a sealed run behind any already pending.
    pub fn enqueue(&mut self, run: Run) {
        self.pending.push_back(run);
    }

    /// Takes the oldest pending run, if any.
    pub fn dequeue(&mut self) -> Option<Run> {
        self.pending.pop_front()
    }

    /// Number of runs waiting to be merged.
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Removes a run's backing file.
    ///
    /// A failed unlink is logged and otherwise ignored; the directory
    /// cleanup on drop retries it.
    pub fn delete(&self, run: Run) {
        if let Err(err) = fs::remove_file(&run.path) {
            log::warn!("run {} not deleted: {}", run.id, err);
        }
    }
}

#[cfg(test)]
mod test {
    use rstest::*;

    use super::RunStore;

    #[fixture]
    fn tmp_dir() -> tempfile::TempDir {
        tempfile::tempdir().unwrap()
    }

    #[rstest]
    fn test_created_runs_record_length(tmp_dir: tempfile::TempDir) {
        let mut store = RunStore::new(Some(tmp_dir.path())).unwrap();

        let mut writer = store.create(64).unwrap();
        writer.write_all(&[1, 2, 3]).unwrap();
        writer.write_all(&[4, 5]).unwrap();
        let run = writer.finish().unwrap();

        assert_eq!(run.len(), 5);
        assert!(!run.is_empty());
    }

    #[rstest]
    fn test_queue_is_fifo_with_monotonic_ids(tmp_dir: tempfile::TempDir) {
        let mut store = RunStore::new(Some(tmp_dir.path())).unwrap();

        for _ in 0..3 {
            let run = store.create(64).unwrap().finish().unwrap();
            store.enqueue(run);
        }
        assert_eq!(store.pending_count(), 3);

        let ids = Vec::from_iter((0..3).map(|_| store.dequeue().unwrap().id()));
        assert_eq!(ids, vec![0, 1, 2]);
        assert_eq!(store.pending_count(), 0);
        assert!(store.dequeue().is_none());
    }

    #[rstest]
    fn test_delete_removes_backing_file(tmp_dir: tempfile::TempDir) {
        let mut store = RunStore::new(Some(tmp_dir.path())).unwrap();

        let mut writer = store.create(64).unwrap();
        writer.write_all(&[7]).unwrap();
        let run = writer.finish().unwrap();
        let path = run.path.clone();

        assert!(path.exists());
        store.delete(run);
        assert!(!path.exists());
    }

    #[rstest]
    fn test_drop_removes_leftover_files(tmp_dir: tempfile::TempDir) {
        {
            let mut store = RunStore::new(Some(tmp_dir.path())).unwrap();
            let mut writer = store.create(64).unwrap();
            writer.write_all(&[9; 32]).unwrap();
            store.enqueue(writer.finish().unwrap());
        }

        let leftovers = std::fs::read_dir(tmp_dir.path()).unwrap().count();
        assert_eq!(leftovers, 0);
    }
}
