use serde::{Deserialize, Serialize};

/// Rows per chunk when streaming a table.
pub const DEFAULT_CHUNK_SIZE: usize = 200_000;

/// Capacities of the reservoir tiers kept for downsampled previews.
pub const DEFAULT_TIER_CAPACITIES: [usize; 3] = [512, 2048, 8192];

/// Seed for the per-ingestion reservoir sampler.
pub const DEFAULT_SEED: u64 = 0x5eed_5bec;

// ---------------------------------------------------------------------------
// Ingestion options
// ---------------------------------------------------------------------------

/// Knobs for a single ingestion call.
///
/// Serde-enabled so a session config file can carry them; every field falls
/// back to its default when absent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestOptions {
    /// Rows parsed and accumulated per chunk; bounds peak memory.
    pub chunk_size: usize,
    /// One reservoir is kept per capacity.
    pub tier_capacities: Vec<usize>,
    /// Seed for the reservoir sampler owned by each accumulator.
    pub seed: u64,
}

impl Default for IngestOptions {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            tier_capacities: DEFAULT_TIER_CAPACITIES.to_vec(),
            seed: DEFAULT_SEED,
        }
    }
}

impl IngestOptions {
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    pub fn with_tier_capacities(mut self, capacities: impl Into<Vec<usize>>) -> Self {
        self.tier_capacities = capacities.into();
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }
}
