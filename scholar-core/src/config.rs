//! Configuration for the memory subsystem.
//!
//! These sections are embedded in the simulation's `scholar.toml`; every
//! field has a default so a partial file is always valid TOML input.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};

/// Per-agent memory capacity and importance bounds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryConfig {
    /// Short-term buffer capacity `K`; overflow is archived, never dropped.
    #[serde(default = "default_capacity")]
    pub short_term_capacity: usize,
    /// Importance given to memories that do not specify one.
    #[serde(default = "default_importance")]
    pub default_importance: f32,
    /// Lower importance bound (inclusive).
    #[serde(default)]
    pub importance_min: f32,
    /// Upper importance bound (inclusive).
    #[serde(default = "default_importance_max")]
    pub importance_max: f32,
    /// How many memories an agent pulls into a prompt.
    #[serde(default = "default_recall_context")]
    pub recall_context: usize,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            short_term_capacity: 20,
            default_importance: 0.5,
            importance_min: 0.0,
            importance_max: 1.0,
            recall_context: 5,
        }
    }
}

impl MemoryConfig {
    /// Check the section for internally inconsistent values.
    ///
    /// # Errors
    /// Returns [`CoreError::Config`] describing the first problem found.
    pub fn validate(&self) -> Result<()> {
        if self.short_term_capacity == 0 {
            return Err(CoreError::Config(
                "memory.short_term_capacity must be at least 1".into(),
            ));
        }
        if !(self.importance_min.is_finite() && self.importance_max.is_finite())
            || self.importance_min > self.importance_max
        {
            return Err(CoreError::Config(format!(
                "memory importance bounds are invalid: {}..={}",
                self.importance_min, self.importance_max
            )));
        }
        if !self.importance_in_bounds(self.default_importance) {
            return Err(CoreError::Config(format!(
                "memory.default_importance {} is outside {}..={}",
                self.default_importance, self.importance_min, self.importance_max
            )));
        }
        Ok(())
    }

    /// Whether `value` lies inside the configured bounds. NaN never does.
    #[must_use]
    pub fn importance_in_bounds(&self, value: f32) -> bool {
        value >= self.importance_min && value <= self.importance_max
    }

    /// Clamp `value` into the configured bounds.
    #[must_use]
    pub fn clamp_importance(&self, value: f32) -> f32 {
        if value.is_nan() {
            return self.importance_min;
        }
        value.clamp(self.importance_min, self.importance_max)
    }
}

/// Search ranking settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    /// Weight tuning for the composite score.
    #[serde(default)]
    pub weights: RetrievalWeights,
    /// Recency decay constant λ per tick: `recency = exp(-λ · Δticks)`.
    #[serde(default = "default_recency_decay")]
    pub recency_decay: f64,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            weights: RetrievalWeights::default(),
            recency_decay: 0.1,
        }
    }
}

impl RetrievalConfig {
    /// Check that every weight and the decay constant are finite and non-negative.
    ///
    /// # Errors
    /// Returns [`CoreError::Config`] naming the offending value.
    pub fn validate(&self) -> Result<()> {
        let w = &self.weights;
        for (name, value) in [
            ("importance", w.importance),
            ("access", w.access),
            ("recency", w.recency),
            ("recency_decay", self.recency_decay),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(CoreError::Config(format!(
                    "retrieval {name} must be finite and non-negative, got {value}"
                )));
            }
        }
        Ok(())
    }
}

/// Composite score weights: `importance·w₁ + ln(1+access)·w₂ + recency·w₃`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalWeights {
    /// Weight for the record's importance.
    #[serde(default = "default_w_importance")]
    pub importance: f64,
    /// Weight for `ln(1 + access_count)`.
    #[serde(default = "default_w_access")]
    pub access: f64,
    /// Weight for the recency bonus.
    #[serde(default = "default_w_recency")]
    pub recency: f64,
}

impl Default for RetrievalWeights {
    fn default() -> Self {
        Self {
            importance: 0.6,
            access: 0.15,
            recency: 0.25,
        }
    }
}

/// Where periodic snapshots of agent memories go.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PersistenceBackend {
    /// One JSON document per agent inside `directory`.
    #[default]
    Json,
    /// All agents in one SQLite database at `database`.
    Sqlite,
}

/// Persistence / save configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistenceConfig {
    /// Snapshot backend.
    #[serde(default)]
    pub backend: PersistenceBackend,
    /// Directory for per-agent JSON documents.
    #[serde(default = "default_directory")]
    pub directory: PathBuf,
    /// SQLite database file for the `sqlite` backend.
    #[serde(default = "default_database")]
    pub database: PathBuf,
    /// Auto-save every N simulated days (0 disables auto-save).
    #[serde(default = "default_auto_save")]
    pub auto_save_every_days: u32,
    /// Detect save corruption via checksums (SQLite backend).
    #[serde(default = "default_true")]
    pub checksum_enabled: bool,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            backend: PersistenceBackend::Json,
            directory: default_directory(),
            database: default_database(),
            auto_save_every_days: 1,
            checksum_enabled: true,
        }
    }
}

// ---------------------------------------------------------------------------
// Serde default helpers
// ---------------------------------------------------------------------------

fn default_true() -> bool { true }
fn default_capacity() -> usize { 20 }
fn default_importance() -> f32 { 0.5 }
fn default_importance_max() -> f32 { 1.0 }
fn default_recall_context() -> usize { 5 }
fn default_recency_decay() -> f64 { 0.1 }
fn default_w_importance() -> f64 { 0.6 }
fn default_w_access() -> f64 { 0.15 }
fn default_w_recency() -> f64 { 0.25 }
fn default_auto_save() -> u32 { 1 }
fn default_directory() -> PathBuf { PathBuf::from("memory") }
fn default_database() -> PathBuf { PathBuf::from("memory/town.db") }

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        MemoryConfig::default().validate().expect("memory defaults");
        RetrievalConfig::default().validate().expect("retrieval defaults");
    }

    #[test]
    fn partial_toml_fills_defaults() {
        let memory: MemoryConfig = toml::from_str("short_term_capacity = 3").expect("parse");
        assert_eq!(memory.short_term_capacity, 3);
        assert_eq!(memory.recall_context, 5);

        let retrieval: RetrievalConfig = toml::from_str("[weights]\nrecency = 0.5").expect("parse");
        assert!((retrieval.weights.recency - 0.5).abs() < f64::EPSILON);
        assert!((retrieval.weights.importance - 0.6).abs() < f64::EPSILON);

        let persistence: PersistenceConfig = toml::from_str("backend = \"sqlite\"").expect("parse");
        assert_eq!(persistence.backend, PersistenceBackend::Sqlite);
        assert_eq!(persistence.auto_save_every_days, 1);
    }

    #[test]
    fn zero_capacity_is_rejected() {
        let config = MemoryConfig {
            short_term_capacity: 0,
            ..MemoryConfig::default()
        };
        assert!(matches!(config.validate(), Err(CoreError::Config(_))));
    }

    #[test]
    fn negative_weight_is_rejected() {
        let mut config = RetrievalConfig::default();
        config.weights.access = -1.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn clamp_handles_nan() {
        let config = MemoryConfig::default();
        assert!((config.clamp_importance(f32::NAN) - 0.0).abs() < f32::EPSILON);
        assert!((config.clamp_importance(3.0) - 1.0).abs() < f32::EPSILON);
        assert!(!config.importance_in_bounds(f32::NAN));
    }
}
