//! External merge sorter.

use std::error::Error;
use std::fmt;
use std::fmt::{Debug, Display};
use std::fs;
use std::io::{self, BufReader, BufWriter, Write};
use std::marker::PhantomData;
use std::path::Path;

use log;

use crate::cursor::read_full;
use crate::element::Element;
use crate::merge;
use crate::run::RunStore;

/// Default number of elements sorted in memory at once.
pub const DEFAULT_CHUNK_CAPACITY: usize = 1 << 20;
/// Default number of runs merged per group.
pub const DEFAULT_FAN_IN: usize = 16;

/// Block length for the final run-to-output copy.
const COPY_BLOCK_LEN: usize = 64 * 1024;

/// Sorting error.
#[derive(Debug)]
pub enum SortError {
    /// Temporary directory or file creation error.
    TempDir(io::Error),
    /// Common I/O error.
    IO(io::Error),
    /// Rejected configuration parameter.
    Config(String),
    /// A run's declared length exceeds its actual content.
    TruncatedRun { run: u64, expected: u64, actual: u64 },
    /// Input length is not a multiple of the element width.
    UnalignedInput { residue: usize },
}

impl Error for SortError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            SortError::TempDir(err) | SortError::IO(err) => Some(err),
            _ => None,
        }
    }
}

impl Display for SortError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SortError::TempDir(err) => write!(f, "temporary directory or file not created: {}", err),
            SortError::IO(err) => write!(f, "I/O operation failed: {}", err),
            SortError::Config(reason) => write!(f, "invalid configuration: {}", reason),
            SortError::TruncatedRun { run, expected, actual } => {
                write!(f, "run {} declares {} bytes but only {} are readable", run, expected, actual)
            }
            SortError::UnalignedInput { residue } => {
                write!(f, "input ends with {} trailing bytes, less than one element", residue)
            }
        }
    }
}

/// Counters describing one completed sort.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SortSummary {
    /// Elements read from the input and written to the output.
    pub elements: u64,
    /// Sorted runs the split phase produced: `ceil(elements / chunk_capacity)`.
    pub initial_runs: usize,
    /// Merge rounds needed to reduce the runs to one.
    pub merge_rounds: usize,
}

/// External merge sorter builder. Provides methods for [`ExternalSorter`]
/// initialization.
#[derive(Clone)]
pub struct ExternalSorterBuilder<T: Element> {
    /// Directory to be used to store temporary data.
    tmp_dir: Option<Box<Path>>,
    /// Elements sorted in memory at once; also the output flush granularity.
    chunk_capacity: usize,
    /// Maximum number of runs merged per group.
    fan_in: usize,

    /// Element type.
    element_type: PhantomData<T>,
}

impl<T: Element> ExternalSorterBuilder<T> {
    /// Creates an instance of a builder with default parameters.
    pub fn new() -> Self {
        ExternalSorterBuilder::default()
    }

    /// Builds an [`ExternalSorter`] instance using provided configuration.
    pub fn build(self) -> Result<ExternalSorter<T>, SortError> {
        ExternalSorter::new(self.tmp_dir.as_deref(), self.chunk_capacity, self.fan_in)
    }

    /// Sets directory to be used to store temporary data.
    pub fn with_tmp_dir(mut self, path: &Path) -> ExternalSorterBuilder<T> {
        self.tmp_dir = Some(path.into());
        return self;
    }

    /// Sets how many elements are sorted in memory at once.
    pub fn with_chunk_capacity(mut self, chunk_capacity: usize) -> ExternalSorterBuilder<T> {
        self.chunk_capacity = chunk_capacity;
        return self;
    }

    /// Sets the maximum number of runs merged per group.
    pub fn with_fan_in(mut self, fan_in: usize) -> ExternalSorterBuilder<T> {
        self.fan_in = fan_in;
        return self;
    }
}

impl<T: Element> Default for ExternalSorterBuilder<T> {
    fn default() -> Self {
        ExternalSorterBuilder {
            tmp_dir: None,
            chunk_capacity: DEFAULT_CHUNK_CAPACITY,
            fan_in: DEFAULT_FAN_IN,
            element_type: PhantomData,
        }
    }
}

/// Disk-backed k-way external merge sorter.
///
/// [`ExternalSorter::execute`] sorts a file of fixed-width elements into an
/// output file in three strictly sequential phases: split the input into
/// sorted runs of at most `chunk_capacity` elements, merge runs `fan_in` at
/// a time until one remains, then copy that run to the output. Phases
/// communicate only through run files, so peak memory stays within one
/// chunk regardless of input size.
pub struct ExternalSorter<T: Element> {
    /// Directory to be used to store temporary data.
    tmp_dir: Option<Box<Path>>,
    /// Elements sorted in memory at once; also the output flush granularity.
    chunk_capacity: usize,
    /// Maximum number of runs merged per group.
    fan_in: usize,

    /// Element type.
    element_type: PhantomData<T>,
}

impl<T: Element> ExternalSorter<T> {
    /// Creates a new external sorter instance.
    ///
    /// # Arguments
    /// * `tmp_path` - Directory to be used to store temporary runs, created if absent.
    ///   If the parameter is [`None`] the default OS temporary directory will be used.
    /// * `chunk_capacity` - Number of elements sorted in memory at once. Must be at least 1.
    /// * `fan_in` - Maximum number of runs merged per group. Must be at least 2.
    pub fn new(
        tmp_path: Option<&Path>,
        chunk_capacity: usize,
        fan_in: usize,
    ) -> Result<Self, SortError> {
        if fan_in < 2 {
            return Err(SortError::Config(format!("fan-in must be at least 2, got {}", fan_in)));
        }
        if chunk_capacity < 1 {
            return Err(SortError::Config("chunk capacity must be at least 1".to_string()));
        }

        return Ok(ExternalSorter {
            tmp_dir: tmp_path.map(|path| path.into()),
            chunk_capacity,
            fan_in,
            element_type: PhantomData,
        });
    }

    /// Sorts the `input` file into the `output` file.
    ///
    /// Every temporary run is gone by the time this returns, on success and
    /// on error alike. On error the output file is absent or incomplete and
    /// the sort must be re-run from the beginning.
    pub fn execute(&self, input: &Path, output: &Path) -> Result<SortSummary, SortError> {
        let mut store = RunStore::new(self.tmp_dir.as_deref()).map_err(SortError::TempDir)?;

        let elements = self.split(input, &mut store)?;
        let initial_runs = store.pending_count();
        log::info!("split {} elements into {} sorted runs", elements, initial_runs);

        let merge_rounds = merge::merge_runs::<T>(&mut store, self.chunk_capacity, self.fan_in)?;
        log::info!("reduced to a single run in {} merge rounds", merge_rounds);

        self.finalize(&mut store, output)?;
        log::info!("sorted output written to {}", output.display());

        Ok(SortSummary {
            elements,
            initial_runs,
            merge_rounds,
        })
    }

    /// Cuts the input into sorted runs of at most `chunk_capacity` elements.
    fn split(&self, input: &Path, store: &mut RunStore) -> Result<u64, SortError> {
        let file = fs::File::open(input).map_err(SortError::IO)?;
        let mut reader = BufReader::new(file);

        let chunk_bytes = self.chunk_capacity * T::WIDTH;
        let mut raw = vec![0u8; chunk_bytes];
        let mut chunk: Vec<T> = Vec::with_capacity(self.chunk_capacity);
        let mut elements = 0u64;

        loop {
            let got = read_full(&mut reader, &mut raw).map_err(SortError::IO)?;
            if got == 0 {
                break;
            }
            let residue = got % T::WIDTH;
            if residue != 0 {
                return Err(SortError::UnalignedInput { residue });
            }

            chunk.clear();
            chunk.extend(raw[..got].chunks_exact(T::WIDTH).map(T::decode));
            chunk.sort_unstable();
            elements += chunk.len() as u64;

            for (slot, element) in chunk.iter().enumerate() {
                element.encode(&mut raw[slot * T::WIDTH..(slot + 1) * T::WIDTH]);
            }

            let mut writer = store.create(chunk_bytes).map_err(SortError::IO)?;
            writer.write_all(&raw[..got]).map_err(SortError::IO)?;
            let run = writer.finish().map_err(SortError::IO)?;
            log::debug!("run {}: {} elements", run.id(), chunk.len());
            store.enqueue(run);

            if got < chunk_bytes {
                break;
            }
        }

        Ok(elements)
    }

    /// Copies the single surviving run to the output path and deletes it.
    /// An empty pending queue produces an empty output file.
    fn finalize(&self, store: &mut RunStore, output: &Path) -> Result<(), SortError> {
        let out_file = fs::File::create(output).map_err(SortError::IO)?;
        let mut writer = BufWriter::new(out_file);

        let run = match store.dequeue() {
            Some(run) => run,
            None => {
                writer.flush().map_err(SortError::IO)?;
                return Ok(());
            }
        };
        debug_assert_eq!(store.pending_count(), 0, "finalize expects a fully merged queue");

        let mut reader = run.open().map_err(SortError::IO)?;
        let mut block = vec![0u8; COPY_BLOCK_LEN];
        loop {
            let got = read_full(&mut reader, &mut block).map_err(SortError::IO)?;
            if got == 0 {
                break;
            }
            writer.write_all(&block[..got]).map_err(SortError::IO)?;
            if got < block.len() {
                break;
            }
        }

        writer.flush().map_err(SortError::IO)?;
        store.delete(run);
        return Ok(());
    }
}
