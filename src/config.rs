//! Engine configuration.
//!
//! Every section has a documented `Default`, and missing JSON fields fall back
//! to it, so a config file only needs the settings it changes.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::bradley_terry::BradleyTerryConfig;
use crate::driver::DriverConfig;
use crate::error::ConfigurationError;
use crate::query::SelectorConfig;
use crate::uncertainty::UncertaintyConfig;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub bradley_terry: BradleyTerryConfig,
    pub uncertainty: UncertaintyConfig,
    pub selector: SelectorConfig,
    pub driver: DriverConfig,
}

impl EngineConfig {
    pub fn from_json_str(json: &str) -> Result<Self, ConfigurationError> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| ConfigurationError::File(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_path(path: impl AsRef<Path>) -> Result<Self, ConfigurationError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|e| ConfigurationError::File(format!("{}: {e}", path.display())))?;
        Self::from_json_str(&raw)
    }

    /// Reseed every random component from one value.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.uncertainty.seed = seed;
        self.selector.seed = seed.rotate_left(17) ^ 0x5e1e_c7ed;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigurationError> {
        let bt = &self.bradley_terry;
        if bt.max_iterations == 0 {
            return Err(ConfigurationError::invalid(
                "bradley_terry.max_iterations",
                "must be >= 1",
            ));
        }
        if !(bt.tolerance.is_finite() && bt.tolerance > 0.0) {
            return Err(ConfigurationError::invalid(
                "bradley_terry.tolerance",
                format!("must be finite and > 0 (got {})", bt.tolerance),
            ));
        }
        if !(bt.prior_strength.is_finite() && bt.prior_strength >= 0.0) {
            return Err(ConfigurationError::invalid(
                "bradley_terry.prior_strength",
                format!("must be finite and >= 0 (got {})", bt.prior_strength),
            ));
        }

        if self.uncertainty.n_bootstrap < 2 {
            return Err(ConfigurationError::invalid(
                "uncertainty.n_bootstrap",
                "must be >= 2",
            ));
        }

        let sel = &self.selector;
        if sel.diversity_until > sel.information_gain_from {
            return Err(ConfigurationError::invalid(
                "selector.diversity_until",
                format!(
                    "must be <= selector.information_gain_from ({} > {})",
                    sel.diversity_until, sel.information_gain_from
                ),
            ));
        }

        let drv = &self.driver;
        if matches!(drv.max_comparisons, Some(0)) {
            return Err(ConfigurationError::invalid("driver.max_comparisons", "must be >= 1"));
        }
        if matches!(drv.max_passes, Some(0)) {
            return Err(ConfigurationError::invalid("driver.max_passes", "must be >= 1"));
        }
        if let Some(target) = drv.target_confidence {
            if !(target.is_finite() && target > 0.0 && target <= 1.0) {
                return Err(ConfigurationError::invalid(
                    "driver.target_confidence",
                    format!("must be in (0, 1] (got {target})"),
                ));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::QueryStrategy;

    #[test]
    fn defaults_validate() {
        EngineConfig::default().validate().unwrap();
    }

    #[test]
    fn partial_json_keeps_other_defaults() {
        let cfg = EngineConfig::from_json_str(
            r#"{"selector": {"strategy": "information_gain"}, "driver": {"max_comparisons": 40}}"#,
        )
        .unwrap();
        assert_eq!(cfg.selector.strategy, QueryStrategy::InformationGain);
        assert_eq!(cfg.selector.repeat_window, 10);
        assert_eq!(cfg.driver.max_comparisons, Some(40));
        assert_eq!(cfg.uncertainty.n_bootstrap, 50);
    }

    #[test]
    fn rejects_out_of_range_settings() {
        let mut cfg = EngineConfig::default();
        cfg.driver.target_confidence = Some(1.5);
        assert!(matches!(
            cfg.validate(),
            Err(ConfigurationError::InvalidSetting {
                field: "driver.target_confidence",
                ..
            })
        ));

        let mut cfg = EngineConfig::default();
        cfg.bradley_terry.prior_strength = -1.0;
        assert!(cfg.validate().is_err());

        assert!(matches!(
            EngineConfig::from_json_str("{not json"),
            Err(ConfigurationError::File(_))
        ));
    }
}
