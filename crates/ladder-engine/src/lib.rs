//! Ladder engine
//!
//! Decides which records of a chart belong on a ladder:
//!
//! ```text
//! ladder.rule_filters ──► LadderEvaluator ──► RecordQualifier ──┬─ chosen:   store filter -> records
//!                                                                ├─ computed: ImplicationResolver + unions
//!                                                                └─ materialized: MaterializationManager
//! ```
//!
//! - [`ImplicationResolver`]: chosen filters implying an implied filter
//! - [`RecordQualifier`]: records of a chart satisfying one filter
//! - [`LadderEvaluator`]: conjunction of a ladder's rule filters, plus ranking
//! - [`MaterializationManager`]: record -> implied-filter index kept current
//!   by write triggers, with verification and repair
//! - [`LadderEngine`]: the facade combining them under one [`EngineConfig`]

pub mod config;
mod engine;
mod error;
pub mod evaluator;
pub mod materialize;
pub mod qualifier;
pub mod resolver;
pub mod verify;


pub use config::{EngineConfig, MaterializationConfig, QualifyStrategy, TriggerMode};
pub use engine::LadderEngine;
pub use error::{EngineError, Result};
pub use evaluator::{Evaluation, LadderEvaluator, RankedRecord};
pub use materialize::{BatchReport, CancelToken, MaterializationManager, MaterializedIndex};
pub use qualifier::{QualifyPath, RecordQualifier};
pub use resolver::ImplicationResolver;
pub use verify::{IndexDiscrepancy, VerificationReport};
