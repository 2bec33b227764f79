//! Data layer: streaming ingestion into canonical spectrum records.
//!
//! Architecture:
//! ```text
//!  .csv / .txt / .tsv / .dat        .parquet / .pq
//!        │                               │
//!        ▼                               ▼
//!   ┌──────────┐                  record batches
//!   │  reader   │  text → column-major chunks
//!   └──────────┘                         │
//!        │                               │
//!        ▼                               ▼
//!   ┌─────────────┐
//!   │ accumulator  │  columns, statistics, reservoir tiers
//!   └─────────────┘
//!        │
//!        ▼
//!   ┌──────────┐
//!   │  loader   │  pick columns, infer units
//!   └──────────┘
//!        │
//!        ▼
//!   ┌───────────┐
//!   │ normalize  │  nm axis, sorted, deduplicated; flux → Jy
//!   └───────────┘
//!        │
//!        ▼
//!   SpectrumRecord (model)
//! ```

pub mod accumulator;
pub mod loader;
pub mod model;
pub mod normalize;
pub mod reader;
