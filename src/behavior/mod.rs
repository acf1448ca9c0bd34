//! Behavior engine: raw telemetry in, engagement insights out.
//!
//! Two pure, stateless stages. [`fusion::DataFusionEngine`] classifies a
//! telemetry snapshot on three axes (provenance, iteration, cognitive) and
//! derives "effective" metrics cleaned of non-productive activity.
//! [`ces::CesCalculator`] normalizes and weights those into a single bounded
//! Cognitive Engagement Score.
//!
//! Every call classifies the current snapshot in isolation: no flag from a
//! previous tick carries over, so a learner who pasted once and then edits
//! normally is re-classified as editing normally.

pub mod ces;
pub mod fusion;
pub mod metrics;

pub use ces::{CesCalculator, CesClassification, CesResult};
pub use fusion::{CognitiveState, DataFusionEngine, FusionInsights, IterationState, ProvenanceState};
pub use metrics::SessionMetrics;
