//! Per-concentration accumulation of extracted series.
//!
//! Groups are kept in first-reference order (the order in which the metadata rows
//! first mention a concentration); batches inside a group keep file-discovery
//! order. Equal concentrations merge into one group.

use std::collections::HashMap;

use tracing::debug;

use crate::domain::{Concentration, SeriesBatch};

/// All samples associated with one concentration.
#[derive(Debug, Clone)]
pub struct ConcentrationGroup {
    pub concentration: Concentration,
    /// One batch per contributing file, in discovery order. Never holds empty batches.
    pub batches: Vec<SeriesBatch>,
}

impl ConcentrationGroup {
    pub fn new(concentration: Concentration) -> Self {
        Self {
            concentration,
            batches: Vec::new(),
        }
    }

    pub fn sample_count(&self) -> usize {
        self.batches.iter().map(SeriesBatch::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.sample_count() == 0
    }

    /// Order-preserving concatenation of every batch: `(x, y)`.
    pub fn concatenated(&self) -> (Vec<f64>, Vec<f64>) {
        let n = self.sample_count();
        let mut x = Vec::with_capacity(n);
        let mut y = Vec::with_capacity(n);
        for batch in &self.batches {
            x.extend_from_slice(&batch.x);
            y.extend_from_slice(&batch.y);
        }
        (x, y)
    }

    /// Basenames of the contributing files, in discovery order.
    pub fn basenames(&self) -> Vec<String> {
        self.batches.iter().map(SeriesBatch::basename).collect()
    }
}

/// Insertion-ordered map from concentration to its group.
#[derive(Debug, Default)]
pub struct SeriesAggregator {
    groups: Vec<ConcentrationGroup>,
    index: HashMap<Concentration, usize>,
}

impl SeriesAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make sure a group exists for `concentration` and return its position.
    pub fn register(&mut self, concentration: Concentration) -> usize {
        if let Some(&idx) = self.index.get(&concentration) {
            return idx;
        }
        let idx = self.groups.len();
        self.groups.push(ConcentrationGroup::new(concentration));
        self.index.insert(concentration, idx);
        idx
    }

    /// Append one file's series to its group.
    ///
    /// Empty batches (failed or out-of-window extractions) are dropped, but the
    /// group is still registered so it keeps its position.
    pub fn add(&mut self, concentration: Concentration, batch: SeriesBatch) {
        let idx = self.register(concentration);
        if batch.is_empty() {
            debug!(
                concentration = %concentration,
                file = %batch.source.display(),
                "skipping empty series"
            );
            return;
        }
        self.groups[idx].batches.push(batch);
    }

    pub fn groups(&self) -> &[ConcentrationGroup] {
        &self.groups
    }

    pub fn total_samples(&self) -> usize {
        self.groups.iter().map(ConcentrationGroup::sample_count).sum()
    }

    /// Finish aggregation: groups with zero samples are dropped, order is kept.
    pub fn into_groups(self) -> Vec<ConcentrationGroup> {
        self.groups
            .into_iter()
            .filter(|g| {
                let keep = !g.is_empty();
                if !keep {
                    debug!(concentration = %g.concentration, "dropping group with no samples");
                }
                keep
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn conc(v: f64) -> Concentration {
        Concentration::new(v).unwrap()
    }

    fn batch(name: &str, xs: &[f64]) -> SeriesBatch {
        let mut b = SeriesBatch::new(format!("/data/{name}"));
        for &x in xs {
            b.push(x, x * 10.0);
        }
        b
    }

    #[test]
    fn concatenation_preserves_length_and_order() {
        let mut agg = SeriesAggregator::new();
        agg.add(conc(5.0), batch("a.csv", &[0.0, 1.0, 2.0]));
        agg.add(conc(5.0), batch("b.csv", &[10.0]));
        agg.add(conc(5.0), batch("c.csv", &[20.0, 21.0]));

        let groups = agg.into_groups();
        assert_eq!(groups.len(), 1);
        let (x, y) = groups[0].concatenated();
        assert_eq!(x, vec![0.0, 1.0, 2.0, 10.0, 20.0, 21.0]);
        assert_eq!(y.len(), 6);
        assert_eq!(y[3], 100.0);
        assert_eq!(groups[0].basenames(), vec!["a.csv", "b.csv", "c.csv"]);
    }

    #[test]
    fn empty_batches_do_not_short_circuit_the_group() {
        let mut agg = SeriesAggregator::new();
        agg.add(conc(2.0), batch("bad.csv", &[]));
        agg.add(conc(2.0), batch("good.csv", &[1.0, 2.0]));

        let groups = agg.into_groups();
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].batches.len(), 1);
        assert_eq!(groups[0].basenames(), vec!["good.csv"]);
    }

    #[test]
    fn groups_without_samples_are_dropped_and_order_is_kept() {
        let mut agg = SeriesAggregator::new();
        agg.add(conc(8.0), batch("a.csv", &[1.0]));
        agg.add(conc(1.0), batch("b.csv", &[]));
        agg.add(conc(3.0), batch("c.csv", &[1.0]));
        agg.add(conc(8.0), batch("d.csv", &[2.0]));

        assert_eq!(agg.groups().len(), 3);
        assert_eq!(agg.total_samples(), 3);

        let keys: Vec<f64> = agg
            .into_groups()
            .iter()
            .map(|g| g.concentration.value())
            .collect();
        assert_eq!(keys, vec![8.0, 3.0]);
    }
}
