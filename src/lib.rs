//! `runsort` is a disk-backed k-way external merge sort.
//!
//! External sorting handles data far larger than the main memory (RAM) of a
//! computer by keeping it in slower external memory, usually a disk drive.
//! Sorting happens in two phases. The split phase cuts the input file into
//! chunks of at most `M` elements, sorts each chunk in memory and persists
//! it as a sorted run file. The merge phase repeatedly merges up to `k` runs
//! at a time through a priority-queue frontier of lazily refilled cursors,
//! producing fewer, longer runs until a single run remains; that run becomes
//! the output. Peak memory stays bounded by the chunk size regardless of
//! input length: a merge group holds `k` refill buffers of `M / k` elements
//! recycled through a buffer pool, plus one `M`-element output buffer. For
//! more information see
//! [External Sorting](https://en.wikipedia.org/wiki/External_sorting).
//!
//! # Overview
//!
//! `runsort` supports the following features:
//!
//! * **Fixed-width records:**
//!   any type implementing the [`Element`] codec (totally ordered, fixed
//!   encoded width) can be sorted; single bytes and big-endian unsigned
//!   integers are provided.
//! * **Bounded memory:**
//!   chunk capacity and merge fan-in are free configuration parameters, so
//!   the buffered working set is a verifiable `O(M)` bound.
//! * **Self-cleaning temporary state:**
//!   every run file lives in a private temporary directory that is removed
//!   on success and failure paths alike.
//!
//! # Example
//!
//! ```no_run
//! use std::path::Path;
//!
//! use runsort::{ExternalSorter, ExternalSorterBuilder};
//!
//! fn main() {
//!     let sorter: ExternalSorter<u8> = ExternalSorterBuilder::new()
//!         .with_tmp_dir(Path::new("./"))
//!         .with_chunk_capacity(1 << 20)
//!         .with_fan_in(16)
//!         .build()
//!         .unwrap();
//!
//!     let summary = sorter
//!         .execute(Path::new("input.bin"), Path::new("output.bin"))
//!         .unwrap();
//!
//!     println!(
//!         "sorted {} elements in {} merge rounds",
//!         summary.elements, summary.merge_rounds
//!     );
//! }
//! ```

pub mod cursor;
pub mod element;
pub mod merge;
pub mod pool;
pub mod run;
pub mod sort;

pub use cursor::RunCursor;
pub use element::Element;
pub use pool::BufferPool;
pub use run::{Run, RunStore, RunWriter};
pub use sort::{ExternalSorter, ExternalSorterBuilder, SortError, SortSummary};
