//! Lazy buffered readers over sorted runs.

use std::fs;
use std::io::{self, Read};
use std::marker::PhantomData;

use crate::element::Element;
use crate::run::Run;
use crate::sort::SortError;

/// Buffered forward reader over one sorted run.
///
/// The cursor starts fresh, fills its borrowed buffer on first use and
/// refills from disk whenever the buffer drains with declared bytes still
/// unread; the consumed offset plus the unread remainder never exceeds the
/// run length. It reports exhaustion exactly when every declared byte has
/// been returned;
/// at that point [`RunCursor::into_parts`] surrenders the buffer back to
/// the pool and the run handle for deletion. Polling past exhaustion is a
/// caller bug and panics.
pub struct RunCursor<T: Element> {
    run: Run,
    file: fs::File,
    /// Refill buffer borrowed from the merge round's pool.
    buf: Vec<u8>,
    /// Byte offset of the next element inside `buf`.
    pos: usize,
    /// Valid bytes in `buf`.
    valid: usize,
    /// Bytes read from the file so far.
    fetched: u64,
    element_type: PhantomData<T>,
}

impl<T: Element> RunCursor<T> {
    /// Opens a cursor over `run`, refilling through `buf`.
    ///
    /// The buffer must hold a whole number of elements, at least one.
    pub fn open(run: Run, buf: Vec<u8>) -> Result<Self, SortError> {
        assert!(buf.len() >= T::WIDTH, "cursor buffer holds less than one element");
        debug_assert_eq!(buf.len() % T::WIDTH, 0);

        let file = run.open().map_err(SortError::IO)?;

        Ok(RunCursor {
            run,
            file,
            buf,
            pos: 0,
            valid: 0,
            fetched: 0,
            element_type: PhantomData,
        })
    }

    /// Whether another element can be returned.
    pub fn has_next(&self) -> bool {
        self.pos < self.valid || self.fetched < self.run.len()
    }

    /// Current element without advancing.
    pub fn peek(&mut self) -> Result<T, SortError> {
        self.prime()?;
        Ok(T::decode(&self.buf[self.pos..self.pos + T::WIDTH]))
    }

    /// Current element, advancing past it.
    pub fn next(&mut self) -> Result<T, SortError> {
        let element = self.peek()?;
        self.pos += T::WIDTH;
        Ok(element)
    }

    /// Byte offset of the next unreturned element within the run.
    pub fn consumed(&self) -> u64 {
        self.fetched - (self.valid - self.pos) as u64
    }

    /// Surrenders the refill buffer and the run handle.
    ///
    /// Called once the cursor reports exhaustion so the buffer can go back
    /// to the pool and the run can be deleted.
    pub fn into_parts(self) -> (Vec<u8>, Run) {
        (self.buf, self.run)
    }

    /// Ensures the element at `pos` is in memory, refilling after a drain.
    fn prime(&mut self) -> Result<(), SortError> {
        assert!(self.has_next(), "run cursor polled after exhaustion");
        if self.pos == self.valid {
            self.fill()?;
        }
        Ok(())
    }

    fn fill(&mut self) -> Result<(), SortError> {
        let remaining = self.run.len() - self.fetched;
        let want = self.buf.len().min(remaining as usize);

        let got = read_full(&mut self.file, &mut self.buf[..want]).map_err(SortError::IO)?;
        if got < want {
            // The file ended before the declared run length was served.
            return Err(SortError::TruncatedRun {
                run: self.run.id(),
                expected: self.run.len(),
                actual: self.fetched + got as u64,
            });
        }

        self.fetched += got as u64;
        self.pos = 0;
        self.valid = got;
        Ok(())
    }
}

/// Reads until `buf` is full or the reader ends. Short reads are normal on
/// block devices and are retried; only end-of-file stops the loop early.
pub(crate) fn read_full(reader: &mut impl Read, buf: &mut [u8]) -> io::Result<usize> {
    let mut got = 0;
    while got < buf.len() {
        match reader.read(&mut buf[got..]) {
            Ok(0) => break,
            Ok(n) => got += n,
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(err) => return Err(err),
        }
    }
    Ok(got)
}

#[cfg(test)]
mod test {
    use std::fs;

    use rstest::*;

    use super::RunCursor;
    use crate::run::Run;
    use crate::sort::SortError;

    #[fixture]
    fn tmp_dir() -> tempfile::TempDir {
        tempfile::tempdir().unwrap()
    }

    fn run_with_bytes(dir: &tempfile::TempDir, bytes: &[u8], declared_len: u64) -> Run {
        let path = dir.path().join("run-0");
        fs::write(&path, bytes).unwrap();
        Run::new(0, path, declared_len)
    }

    #[rstest]
    fn test_cursor_refills_across_buffer_boundaries(tmp_dir: tempfile::TempDir) {
        let run = run_with_bytes(&tmp_dir, &[1, 2, 3, 4, 5], 5);
        // Two-element buffer over five elements forces three fills.
        let mut cursor: RunCursor<u8> = RunCursor::open(run, vec![0; 2]).unwrap();

        let mut collected = Vec::new();
        while cursor.has_next() {
            let before = cursor.consumed();
            assert_eq!(cursor.peek().unwrap(), cursor.next().unwrap());
            assert_eq!(cursor.consumed(), before + 1);
            collected.push(cursor.consumed() as u8);
        }

        assert_eq!(collected, vec![1, 2, 3, 4, 5]);
        assert_eq!(cursor.consumed(), 5);
        assert!(!cursor.has_next());
    }

    #[rstest]
    fn test_cursor_returns_elements_in_run_order(tmp_dir: tempfile::TempDir) {
        let run = run_with_bytes(&tmp_dir, &[10, 20, 30], 3);
        let mut cursor: RunCursor<u8> = RunCursor::open(run, vec![0; 2]).unwrap();

        assert_eq!(cursor.peek().unwrap(), 10);
        assert_eq!(cursor.next().unwrap(), 10);
        assert_eq!(cursor.next().unwrap(), 20);
        assert_eq!(cursor.next().unwrap(), 30);
        assert!(!cursor.has_next());

        let (buf, run) = cursor.into_parts();
        assert_eq!(buf.len(), 2);
        assert_eq!(run.len(), 3);
    }

    #[rstest]
    fn test_overdeclared_run_is_a_truncation_error(tmp_dir: tempfile::TempDir) {
        let run = run_with_bytes(&tmp_dir, &[1, 2, 3], 5);
        let mut cursor: RunCursor<u8> = RunCursor::open(run, vec![0; 4]).unwrap();

        match cursor.next() {
            Err(SortError::TruncatedRun { run: 0, expected: 5, actual: 3 }) => {}
            other => panic!("expected truncation error, got {:?}", other),
        }
    }

    #[rstest]
    #[should_panic(expected = "polled after exhaustion")]
    fn test_polling_an_exhausted_cursor_panics(tmp_dir: tempfile::TempDir) {
        let run = run_with_bytes(&tmp_dir, &[1], 1);
        let mut cursor: RunCursor<u8> = RunCursor::open(run, vec![0; 1]).unwrap();

        cursor.next().unwrap();
        let _ = cursor.peek();
    }
}
