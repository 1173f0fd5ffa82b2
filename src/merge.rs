//! Bounded fan-in merging of pending runs.

use std::cmp::Reverse;
use std::collections::BinaryHeap;

use log;

use crate::cursor::RunCursor;
use crate::element::Element;
use crate::pool::BufferPool;
use crate::run::RunStore;
use crate::sort::SortError;

/// Merges pending runs in rounds of at most `fan_in` until one remains.
///
/// Cursor refill buffers hold `max(1, chunk_capacity / fan_in)` elements,
/// so one group's buffered working set stays within the split-phase memory
/// budget, and merged output drains through a `chunk_capacity`-element
/// write buffer. Returns the number of rounds performed:
/// `ceil(log_fan_in(initial_runs))`.
pub fn merge_runs<T: Element>(
    store: &mut RunStore,
    chunk_capacity: usize,
    fan_in: usize,
) -> Result<usize, SortError> {
    let buf_len = (chunk_capacity / fan_in).max(1) * T::WIDTH;
    let mut pool = BufferPool::new(buf_len);
    let mut rounds = 0;

    while store.pending_count() > 1 {
        rounds += 1;
        let mut this_round = store.pending_count();
        log::debug!("merge round {}: {} runs pending", rounds, this_round);

        // A lone tail run is carried into the next round untouched rather
        // than pushed through a one-way merge.
        while this_round > 1 {
            let group = this_round.min(fan_in);
            merge_group::<T>(store, &mut pool, group, chunk_capacity)?;
            this_round -= group;
        }
    }

    Ok(rounds)
}

/// Merges the next `group` pending runs into a single new run enqueued at
/// the back of the store.
fn merge_group<T: Element>(
    store: &mut RunStore,
    pool: &mut BufferPool,
    group: usize,
    chunk_capacity: usize,
) -> Result<(), SortError> {
    let mut cursors: Vec<Option<RunCursor<T>>> = Vec::with_capacity(group);
    // Min-heap over each cursor's current element. The element is decoded
    // and cached at push time, so heap ordering never touches the disk.
    let mut frontier = BinaryHeap::with_capacity(group);

    for slot in 0..group {
        let run = store.dequeue().expect("merge group exceeds pending queue");
        let mut cursor = RunCursor::open(run, pool.acquire())?;

        if cursor.has_next() {
            let element = cursor.next()?;
            frontier.push((Reverse(element), slot));
            cursors.push(Some(cursor));
        } else {
            // Split never emits empty runs; a cursor over one is born
            // exhausted and reclaimed on the spot.
            let (buf, run) = cursor.into_parts();
            pool.release(buf);
            store.delete(run);
            cursors.push(None);
        }
    }

    let mut output = store.create(chunk_capacity * T::WIDTH).map_err(SortError::IO)?;
    let mut encoded = vec![0u8; T::WIDTH];

    while let Some((Reverse(element), slot)) = frontier.pop() {
        element.encode(&mut encoded);
        output.write_all(&encoded).map_err(SortError::IO)?;

        let cursor = cursors[slot]
            .as_mut()
            .expect("cursor alive while its element is queued");
        if cursor.has_next() {
            let next = cursor.next()?;
            frontier.push((Reverse(next), slot));
        } else {
            let exhausted = cursors[slot].take().expect("cursor taken once");
            let (buf, run) = exhausted.into_parts();
            pool.release(buf);
            store.delete(run);
        }
    }

    let run = output.finish().map_err(SortError::IO)?;
    log::debug!("merged {} runs into run {} ({} bytes)", group, run.id(), run.len());
    store.enqueue(run);

    Ok(())
}

#[cfg(test)]
mod test {
    use std::io::Read;

    use rstest::*;

    use super::{merge_group, merge_runs};
    use crate::pool::BufferPool;
    use crate::run::RunStore;

    #[fixture]
    fn tmp_dir() -> tempfile::TempDir {
        tempfile::tempdir().unwrap()
    }

    fn enqueue_run(store: &mut RunStore, bytes: &[u8]) {
        let mut writer = store.create(64).unwrap();
        writer.write_all(bytes).unwrap();
        store.enqueue(writer.finish().unwrap());
    }

    fn read_single_pending(store: &mut RunStore) -> Vec<u8> {
        assert_eq!(store.pending_count(), 1);
        let run = store.dequeue().unwrap();
        let mut content = Vec::new();
        run.open().unwrap().read_to_end(&mut content).unwrap();
        store.delete(run);
        content
    }

    #[rstest]
    fn test_three_runs_at_fan_in_two_take_two_rounds(tmp_dir: tempfile::TempDir) {
        let mut store = RunStore::new(Some(tmp_dir.path())).unwrap();
        enqueue_run(&mut store, &[3, 5]);
        enqueue_run(&mut store, &[1, 4]);
        enqueue_run(&mut store, &[2]);

        let rounds = merge_runs::<u8>(&mut store, 2, 2).unwrap();

        assert_eq!(rounds, 2);
        assert_eq!(read_single_pending(&mut store), vec![1, 2, 3, 4, 5]);
    }

    #[rstest]
    fn test_fan_in_covering_all_runs_takes_one_round(tmp_dir: tempfile::TempDir) {
        let mut store = RunStore::new(Some(tmp_dir.path())).unwrap();
        enqueue_run(&mut store, &[4, 8]);
        enqueue_run(&mut store, &[2, 6]);
        enqueue_run(&mut store, &[1, 3]);
        enqueue_run(&mut store, &[5, 7]);

        let rounds = merge_runs::<u8>(&mut store, 4, 8).unwrap();

        assert_eq!(rounds, 1);
        assert_eq!(read_single_pending(&mut store), vec![1, 2, 3, 4, 5, 6, 7, 8]);
    }

    #[rstest]
    fn test_single_pending_run_needs_no_round(tmp_dir: tempfile::TempDir) {
        let mut store = RunStore::new(Some(tmp_dir.path())).unwrap();
        enqueue_run(&mut store, &[1, 2, 3]);

        let rounds = merge_runs::<u8>(&mut store, 4, 2).unwrap();

        assert_eq!(rounds, 0);
        assert_eq!(read_single_pending(&mut store), vec![1, 2, 3]);
    }

    #[rstest]
    fn test_duplicates_survive_merging(tmp_dir: tempfile::TempDir) {
        let mut store = RunStore::new(Some(tmp_dir.path())).unwrap();
        enqueue_run(&mut store, &[2, 2, 9]);
        enqueue_run(&mut store, &[2, 9]);

        merge_runs::<u8>(&mut store, 3, 2).unwrap();

        assert_eq!(read_single_pending(&mut store), vec![2, 2, 2, 9, 9]);
    }

    #[rstest]
    fn test_groups_reuse_pooled_buffers(tmp_dir: tempfile::TempDir) {
        let mut store = RunStore::new(Some(tmp_dir.path())).unwrap();
        enqueue_run(&mut store, &[1, 5]);
        enqueue_run(&mut store, &[2, 6]);
        enqueue_run(&mut store, &[3, 7]);
        enqueue_run(&mut store, &[4, 8]);

        let mut pool = BufferPool::new(2);
        merge_group::<u8>(&mut store, &mut pool, 2, 4).unwrap();
        merge_group::<u8>(&mut store, &mut pool, 2, 4).unwrap();

        // The second group ran entirely on buffers released by the first.
        assert_eq!(pool.allocated(), 2);
        assert_eq!(store.pending_count(), 2);
    }
}
