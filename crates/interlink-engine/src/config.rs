//! Run configuration (JSON on disk).

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};
use crate::kb::KbInfo;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunConfig {
    pub source: KbInfo,
    pub target: KbInfo,
    /// Specification expression, e.g. `trigrams(x.name,y.label)`.
    pub metric: String,
    /// Pairs at or above this confidence are accepted.
    pub acceptance_threshold: f64,
    /// Pairs in `[verification_threshold, acceptance_threshold)` go to review.
    pub verification_threshold: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub acceptance_file: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verification_file: Option<PathBuf>,
}

impl RunConfig {
    pub fn from_path(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        let config: RunConfig = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.metric.trim().is_empty() {
            return Err(EngineError::Config("metric is empty".to_string()));
        }
        for (name, value) in [
            ("acceptance_threshold", self.acceptance_threshold),
            ("verification_threshold", self.verification_threshold),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(EngineError::Config(format!(
                    "{name} must lie in [0, 1], got {value}"
                )));
            }
        }
        if self.verification_threshold > self.acceptance_threshold {
            return Err(EngineError::Config(format!(
                "verification_threshold {} exceeds acceptance_threshold {}",
                self.verification_threshold, self.acceptance_threshold
            )));
        }
        for kb in [&self.source, &self.target] {
            if kb.bare_var().is_empty() {
                return Err(EngineError::Config(format!(
                    "knowledge base `{}` has no variable",
                    kb.id
                )));
            }
        }
        Ok(())
    }
}
