//! Engine configuration.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{EngineError, Result};

/// Above this many implying chosen filters, `Adaptive` reads the
/// materialized index instead of unioning per-filter record sets.
pub const DEFAULT_ADAPTIVE_THRESHOLD: usize = 256;

/// How implied filters are answered by the record qualifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QualifyStrategy {
    /// Union of `records holding cf` over every implying chosen filter.
    Computed,
    /// Direct lookup in the materialized record -> implied-filter index.
    Materialized,
    /// Materialized when the filter is implied by more than `threshold`
    /// chosen filters, computed otherwise.
    Adaptive { threshold: usize },
}

impl Default for QualifyStrategy {
    fn default() -> Self {
        QualifyStrategy::Adaptive {
            threshold: DEFAULT_ADAPTIVE_THRESHOLD,
        }
    }
}

/// When write hooks update the materialized index.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerMode {
    /// Recompute inside the hook call.
    #[default]
    Synchronous,
    /// Queue affected records; flushed at `max_pending` or on demand.
    Deferred,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MaterializationConfig {
    pub enabled: bool,
    pub trigger_mode: TriggerMode,
    /// Deferred mode flushes once this many records are queued.
    pub max_pending: usize,
}

impl Default for MaterializationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            trigger_mode: TriggerMode::Synchronous,
            max_pending: 1024,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub strategy: QualifyStrategy,
    pub materialization: MaterializationConfig,
}

impl EngineConfig {
    /// Computed-only engine with no materialized index.
    pub fn computed_only() -> Self {
        Self {
            strategy: QualifyStrategy::Computed,
            materialization: MaterializationConfig {
                enabled: false,
                ..MaterializationConfig::default()
            },
        }
    }

    pub fn from_json_str(text: &str) -> Result<Self> {
        let config: EngineConfig = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        Self::from_json_str(&std::fs::read_to_string(path)?)
    }

    pub fn validate(&self) -> Result<()> {
        if self.strategy == QualifyStrategy::Materialized && !self.materialization.enabled {
            return Err(EngineError::Config(
                "materialized strategy requires materialization.enabled".to_string(),
            ));
        }
        if self.materialization.trigger_mode == TriggerMode::Deferred
            && self.materialization.max_pending == 0
        {
            return Err(EngineError::Config(
                "deferred trigger mode needs max_pending > 0".to_string(),
            ));
        }
        Ok(())
    }
}
