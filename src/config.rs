//! Pipeline configuration, validated once at construction and immutable afterwards.

use crate::types::{Episode, SeasonId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fs;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("ANOVA F significance must lie strictly between 0 and 1, but was {0}.")]
    InvalidSignificance(f64),

    #[error("PCA explained-variance fraction must lie in (0, 1], but was {0}.")]
    InvalidExplainFraction(f64),

    #[error("No train seasons remain after excluding predict season {0}.")]
    NoTrainSeasons(SeasonId),

    #[error("Failed to read or write configuration file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse TOML configuration: {0}")]
    TomlParseError(#[from] toml::de::Error),

    #[error("Failed to serialize configuration to TOML: {0}")]
    TomlSerializeError(#[from] toml::ser::Error),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// The season for which predictions are made.
    pub predict_season: SeasonId,
    /// The latest episode of the predict season whose data may be used.
    pub predict_episode: Episode,
    /// Seasons used as train data. Never contains `predict_season`.
    pub train_seasons: BTreeSet<SeasonId>,
    /// Only features with an ANOVA F p-value below this value are kept.
    pub anova_f_significance: f64,
    /// PCA keeps the fewest components explaining at least this fraction of variance.
    pub pca_explain: f64,
    /// How many additional bins the allocator may hand out.
    pub max_splits: usize,
}

impl PipelineConfig {
    /// Builds a validated configuration. The predict season is removed from the train
    /// seasons.
    pub fn new(
        predict_season: SeasonId,
        predict_episode: Episode,
        train_seasons: impl IntoIterator<Item = SeasonId>,
        anova_f_significance: f64,
        pca_explain: f64,
        max_splits: usize,
    ) -> Result<Self, ConfigError> {
        let mut config = Self {
            predict_season,
            predict_episode,
            train_seasons: train_seasons.into_iter().collect(),
            anova_f_significance,
            pca_explain,
            max_splits,
        };
        config.normalize()?;
        Ok(config)
    }

    fn normalize(&mut self) -> Result<(), ConfigError> {
        self.train_seasons.remove(&self.predict_season);
        self.validate()
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        // Written as negated range checks so NaN is rejected too.
        if !(self.anova_f_significance > 0.0 && self.anova_f_significance < 1.0) {
            return Err(ConfigError::InvalidSignificance(self.anova_f_significance));
        }
        if !(self.pca_explain > 0.0 && self.pca_explain <= 1.0) {
            return Err(ConfigError::InvalidExplainFraction(self.pca_explain));
        }
        if self.train_seasons.is_empty() || self.train_seasons.contains(&self.predict_season) {
            return Err(ConfigError::NoTrainSeasons(self.predict_season));
        }
        Ok(())
    }

    /// Loads and validates a configuration from a TOML file.
    pub fn load(path: &str) -> Result<Self, ConfigError> {
        let toml_string = fs::read_to_string(path)?;
        Self::from_toml_str(&toml_string)
    }

    pub fn from_toml_str(toml_string: &str) -> Result<Self, ConfigError> {
        let mut config: Self = toml::from_str(toml_string)?;
        config.normalize()?;
        Ok(config)
    }

    pub fn save(&self, path: &str) -> Result<(), ConfigError> {
        fs::write(path, toml::to_string_pretty(self)?)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn predict_season_is_removed_from_train_seasons() {
        let config = PipelineConfig::new(22, 6, 5..=22, 0.05, 0.9, 20).unwrap();
        assert!(!config.train_seasons.contains(&22));
        assert_eq!(config.train_seasons.len(), 17);
    }

    #[test]
    fn out_of_range_values_are_rejected() {
        assert!(matches!(
            PipelineConfig::new(22, 6, [5], 0.0, 0.9, 0),
            Err(ConfigError::InvalidSignificance(_))
        ));
        assert!(matches!(
            PipelineConfig::new(22, 6, [5], 1.0, 0.9, 0),
            Err(ConfigError::InvalidSignificance(_))
        ));
        assert!(matches!(
            PipelineConfig::new(22, 6, [5], f64::NAN, 0.9, 0),
            Err(ConfigError::InvalidSignificance(_))
        ));
        assert!(matches!(
            PipelineConfig::new(22, 6, [5], 0.05, 0.0, 0),
            Err(ConfigError::InvalidExplainFraction(_))
        ));
        assert!(matches!(
            PipelineConfig::new(22, 6, [5], 0.05, 1.01, 0),
            Err(ConfigError::InvalidExplainFraction(_))
        ));
        assert!(PipelineConfig::new(22, 6, [5], 0.05, 1.0, 0).is_ok());
    }

    #[test]
    fn train_set_of_only_the_predict_season_is_rejected() {
        assert!(matches!(
            PipelineConfig::new(22, 6, [22], 0.05, 0.9, 3),
            Err(ConfigError::NoTrainSeasons(22))
        ));
    }

    #[test]
    fn toml_files_are_validated_on_load() {
        let parsed = PipelineConfig::from_toml_str(
            "predict_season = 10\npredict_episode = 4\ntrain_seasons = [8, 9, 10]\n\
             anova_f_significance = 0.1\npca_explain = 0.8\nmax_splits = 5\n",
        )
        .unwrap();
        assert_eq!(parsed.train_seasons.iter().copied().collect::<Vec<_>>(), vec![8, 9]);

        let invalid = PipelineConfig::from_toml_str(
            "predict_season = 10\npredict_episode = 4\ntrain_seasons = [8]\n\
             anova_f_significance = 2.0\npca_explain = 0.8\nmax_splits = 5\n",
        );
        assert!(matches!(invalid, Err(ConfigError::InvalidSignificance(_))));
    }
}
