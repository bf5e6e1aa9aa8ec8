//! Synthetic reading source
//!
//! Stands in for a south plugin: every call to [`SyntheticSource::next_batch`]
//! produces `readings_per_batch` readings for the configured asset, one
//! datapoint per configured name, with monotonically increasing ids.

use contracts::{Datapoint, Reading, ReadingSet, SourceConfig};

#[derive(Debug)]
pub struct SyntheticSource {
    config: SourceConfig,
    next_id: u64,
}

impl SyntheticSource {
    pub fn new(config: SourceConfig) -> Self {
        Self { config, next_id: 1 }
    }

    /// Ids handed out so far
    pub fn produced(&self) -> u64 {
        self.next_id - 1
    }

    pub fn next_batch(&mut self) -> ReadingSet {
        let mut readings = Vec::with_capacity(self.config.readings_per_batch);
        for _ in 0..self.config.readings_per_batch {
            let id = self.next_id;
            self.next_id += 1;

            // Slow sine per datapoint, phase-shifted by its position
            let datapoints = self
                .config
                .datapoints
                .iter()
                .enumerate()
                .map(|(idx, name)| {
                    let phase = id as f64 / 10.0 + idx as f64;
                    Datapoint::new(name, (phase.sin() * 100.0).round() / 10.0)
                })
                .collect();

            readings.push(Reading::new(&self.config.asset, datapoints).with_id(id));
        }
        ReadingSet::new(readings)
    }
}
