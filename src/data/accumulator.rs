use std::collections::{BTreeMap, HashMap};

use log::warn;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::error::IngestError;

// ---------------------------------------------------------------------------
// ColumnStatistics – streaming count / min / max / mean / std
// ---------------------------------------------------------------------------

/// Running aggregates over the finite values of one column.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnStatistics {
    count: u64,
    sum: f64,
    sum_sq: f64,
    min: f64,
    max: f64,
}

impl Default for ColumnStatistics {
    fn default() -> Self {
        Self {
            count: 0,
            sum: 0.0,
            sum_sq: 0.0,
            min: f64::INFINITY,
            max: f64::NEG_INFINITY,
        }
    }
}

impl ColumnStatistics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Non-finite values are ignored entirely.
    pub fn update(&mut self, value: f64) {
        if !value.is_finite() {
            return;
        }
        self.count += 1;
        self.sum += value;
        self.sum_sq += value * value;
        self.min = self.min.min(value);
        self.max = self.max.max(value);
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn min(&self) -> Option<f64> {
        (self.count > 0).then_some(self.min)
    }

    pub fn max(&self) -> Option<f64> {
        (self.count > 0).then_some(self.max)
    }

    pub fn mean(&self) -> Option<f64> {
        (self.count > 0).then(|| self.sum / self.count as f64)
    }

    /// Population standard deviation.
    pub fn std(&self) -> Option<f64> {
        let mean = self.mean()?;
        let variance = self.sum_sq / self.count as f64 - mean * mean;
        Some(variance.max(0.0).sqrt())
    }

    pub fn summary(&self) -> Option<ColumnSummary> {
        Some(ColumnSummary {
            count: self.count,
            min: self.min()?,
            max: self.max()?,
            mean: self.mean()?,
            std: self.std()?,
        })
    }
}

/// Serialised form of [`ColumnStatistics`], stored as JSON in the metadata.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ColumnSummary {
    pub count: u64,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub std: f64,
}

// ---------------------------------------------------------------------------
// ReservoirTier – fixed-capacity uniform sample over the row stream
// ---------------------------------------------------------------------------

/// A sampled row: column label → finite value.
pub type SampledRow = BTreeMap<String, f64>;

/// Algorithm R reservoir.  After `n` offers each offered row is retained with
/// probability `capacity / n`, regardless of chunk boundaries.
#[derive(Debug, Clone)]
pub struct ReservoirTier {
    capacity: usize,
    seen: u64,
    rows: Vec<Vec<(usize, f64)>>,
}

impl ReservoirTier {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            seen: 0,
            rows: Vec::with_capacity(capacity.min(8192)),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Rows offered so far.
    pub fn seen(&self) -> u64 {
        self.seen
    }

    /// The row is only materialised when it is actually kept.
    fn offer<F>(&mut self, rng: &mut StdRng, row: F)
    where
        F: FnOnce() -> Vec<(usize, f64)>,
    {
        self.seen += 1;
        if self.rows.len() < self.capacity {
            self.rows.push(row());
            return;
        }
        if self.capacity == 0 {
            return;
        }
        let slot = rng.gen_range(0..self.seen) as usize;
        if slot < self.capacity {
            self.rows[slot] = row();
        }
    }
}

// ---------------------------------------------------------------------------
// ChunkAccumulator
// ---------------------------------------------------------------------------

/// Per-column buffer with deferred NaN padding.
///
/// A chunk without a single finite value only bumps `pending_nan`; the NaNs
/// are materialised once a later chunk proves the column numeric, or at
/// finalize.  Columns that never see a finite value never allocate.
#[derive(Debug)]
struct ColumnState {
    name: String,
    chunks: Vec<Vec<f64>>,
    pending_nan: usize,
    stats: ColumnStatistics,
}

impl ColumnState {
    fn new(name: String, backlog: usize) -> Self {
        Self {
            name,
            chunks: Vec::new(),
            pending_nan: backlog,
            stats: ColumnStatistics::new(),
        }
    }

    fn push_chunk(&mut self, values: &[f64]) {
        let before = self.stats.count();
        for &value in values {
            self.stats.update(value);
        }
        if self.stats.count() == before {
            self.pending_nan += values.len();
            return;
        }
        self.flush_pending();
        self.chunks.push(values.to_vec());
    }

    fn defer(&mut self, rows: usize) {
        self.pending_nan += rows;
    }

    fn flush_pending(&mut self) {
        if self.pending_nan > 0 {
            self.chunks.push(vec![f64::NAN; self.pending_nan]);
            self.pending_nan = 0;
        }
    }

    fn into_values(mut self) -> Vec<f64> {
        self.flush_pending();
        self.chunks.concat()
    }
}

/// Consumes successive column-major chunks and keeps everything needed to
/// describe the whole stream: buffers, statistics and reservoir tiers.
#[derive(Debug)]
pub struct ChunkAccumulator {
    columns: Vec<ColumnState>,
    index: HashMap<String, usize>,
    tiers: Vec<ReservoirTier>,
    rng: StdRng,
    row_count: usize,
}

impl ChunkAccumulator {
    /// One tier per distinct capacity; `seed` drives this instance's sampler.
    pub fn new(tier_capacities: &[usize], seed: u64) -> Self {
        let mut capacities = tier_capacities.to_vec();
        capacities.sort_unstable();
        capacities.dedup();
        Self {
            columns: Vec::new(),
            index: HashMap::new(),
            tiers: capacities.into_iter().map(ReservoirTier::new).collect(),
            rng: StdRng::seed_from_u64(seed),
            row_count: 0,
        }
    }

    pub fn row_count(&self) -> usize {
        self.row_count
    }

    pub fn tiers(&self) -> &[ReservoirTier] {
        &self.tiers
    }

    fn slot_for(&mut self, name: &str) -> usize {
        if let Some(&slot) = self.index.get(name) {
            return slot;
        }
        let slot = self.columns.len();
        // A column first seen now owes NaNs for every earlier row.
        self.columns
            .push(ColumnState::new(name.to_string(), self.row_count));
        self.index.insert(name.to_string(), slot);
        slot
    }

    /// Fold one chunk into the running state.
    ///
    /// `values[i]` holds the chunk's cells for `column_names[i]`; all columns
    /// of a chunk have the same length.  Columns known from earlier chunks but
    /// absent here are padded with NaN.
    pub fn process_chunk(&mut self, column_names: &[String], values: &[Vec<f64>]) {
        let rows = values.iter().map(Vec::len).max().unwrap_or(0);
        let slots: Vec<usize> = column_names
            .iter()
            .take(values.len())
            .map(|name| self.slot_for(name))
            .collect();

        let mut touched = vec![false; self.columns.len()];
        for (&slot, column) in slots.iter().zip(values) {
            self.columns[slot].push_chunk(column);
            touched[slot] = true;
        }
        for (state, _) in self
            .columns
            .iter_mut()
            .zip(&touched)
            .filter(|(_, touched)| !**touched)
        {
            state.defer(rows);
        }

        let (tiers, rng) = (&mut self.tiers, &mut self.rng);
        for row in 0..rows {
            let cell = |pos: usize| values[pos].get(row).copied().unwrap_or(f64::NAN);
            let finite = (0..slots.len()).filter(|&pos| cell(pos).is_finite()).count();
            if finite < 2 {
                continue;
            }
            for tier in tiers.iter_mut() {
                tier.offer(rng, || {
                    slots
                        .iter()
                        .enumerate()
                        .map(|(pos, &slot)| (slot, cell(pos)))
                        .filter(|(_, value)| value.is_finite())
                        .collect()
                });
            }
        }

        self.row_count += rows;
    }

    /// Consume the accumulator and assemble contiguous columns.
    pub fn finalize(self) -> FinalizedTable {
        let names: Vec<String> = self.columns.iter().map(|c| c.name.clone()).collect();

        let mut columns = Vec::new();
        let mut skipped_columns = Vec::new();
        let mut statistics = BTreeMap::new();
        for state in self.columns {
            match state.stats.summary() {
                Some(summary) => {
                    statistics.insert(state.name.clone(), summary);
                    columns.push(NumericColumn {
                        name: state.name.clone(),
                        values: state.into_values(),
                    });
                }
                None => skipped_columns.push(state.name),
            }
        }

        let tiers = self
            .tiers
            .into_iter()
            .map(|tier| {
                let rows = tier
                    .rows
                    .into_iter()
                    .map(|row| {
                        row.into_iter()
                            .map(|(slot, value)| (names[slot].clone(), value))
                            .collect::<SampledRow>()
                    })
                    .collect();
                (tier.capacity, rows)
            })
            .collect();

        FinalizedTable {
            columns,
            skipped_columns,
            statistics,
            tiers,
            row_count: self.row_count,
        }
    }
}

// ---------------------------------------------------------------------------
// FinalizedTable
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct NumericColumn {
    pub name: String,
    pub values: Vec<f64>,
}

/// Everything the accumulator learnt about a stream.
#[derive(Debug, Clone, PartialEq)]
pub struct FinalizedTable {
    /// Numeric columns in first-seen order, each `row_count` long.
    pub columns: Vec<NumericColumn>,
    /// Columns that never held a finite value.
    pub skipped_columns: Vec<String>,
    /// Only for columns with at least one finite value.
    pub statistics: BTreeMap<String, ColumnSummary>,
    /// Tier capacity → sampled rows.
    pub tiers: BTreeMap<usize, Vec<SampledRow>>,
    pub row_count: usize,
}

impl FinalizedTable {
    pub fn column(&self, name: &str) -> Option<&[f64]> {
        self.columns
            .iter()
            .find(|c| c.name == name)
            .map(|c| c.values.as_slice())
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    /// Reject empty or entirely non-numeric input and report skipped columns.
    pub fn validate(self, origin: &str) -> Result<Self, IngestError> {
        if self.row_count == 0 {
            return Err(IngestError::EmptyInput {
                origin: origin.to_string(),
            });
        }
        for name in &self.skipped_columns {
            warn!("Skipping non-numeric column '{name}' in {origin}");
        }
        if self.columns.is_empty() {
            return Err(IngestError::NoNumericColumns {
                origin: origin.to_string(),
            });
        }
        Ok(self)
    }
}
