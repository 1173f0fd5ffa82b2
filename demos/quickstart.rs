use std::fs;
use std::path::Path;

use env_logger;
use log;

use runsort::{ExternalSorter, ExternalSorterBuilder};

fn main() {
    env_logger::Builder::new().filter_level(log::LevelFilter::Debug).init();

    // Scrambled bytes via a multiplicative hash; no two neighbours in order.
    let data: Vec<u8> = (0..100_000u32)
        .map(|i| (i.wrapping_mul(2654435761) >> 24) as u8)
        .collect();
    fs::write("input.bin", &data).unwrap();

    let sorter: ExternalSorter<u8> = ExternalSorterBuilder::new()
        .with_tmp_dir(Path::new("./"))
        .with_chunk_capacity(8 * 1024)
        .with_fan_in(8)
        .build()
        .unwrap();

    let summary = sorter
        .execute(Path::new("input.bin"), Path::new("output.bin"))
        .unwrap();

    log::info!(
        "sorted {} elements: {} initial runs, {} merge rounds",
        summary.elements,
        summary.initial_runs,
        summary.merge_rounds
    );

    let sorted = fs::read("output.bin").unwrap();
    assert_eq!(sorted.len(), data.len());
    assert!(sorted.windows(2).all(|pair| pair[0] <= pair[1]));
}
