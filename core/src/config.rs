//! Serializable filter configuration.
//!
//! A [`FilterConfig`] carries every tunable of a tracking run. It can be
//! written and read as JSON, YAML, or TOML; [`FilterConfig::to_file`] and
//! [`FilterConfig::from_file`] pick the format from the file extension.
use std::fs::File;
use std::io::{self, Read, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::evaluator::EvaluationModel;
use crate::models::ProcessNoise;
use crate::particle::AveragingStrategy;
use crate::resampler::ResamplingStrategy;

fn default_seed() -> u64 {
    42
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    pub num_particles: usize,
    /// Process noise standard deviation per state dimension. A single value applies to every dimension.
    pub process_noise_std: Vec<f64>,
    /// Standard deviation of the initial cloud around the starting state.
    pub prior_std: f64,
    /// Expected standard deviation of observation residuals.
    pub observation_std: f64,
    /// Normalised effective sample size at or below which the cloud is resampled.
    pub threshold: f64,
    pub resampling_strategy: ResamplingStrategy,
    pub averaging_strategy: AveragingStrategy,
    #[serde(default = "default_seed")]
    pub seed: u64,
}

impl Default for FilterConfig {
    fn default() -> Self {
        FilterConfig {
            num_particles: 500,
            process_noise_std: vec![0.05],
            prior_std: 0.5,
            observation_std: 0.25,
            threshold: 0.5,
            resampling_strategy: ResamplingStrategy::default(),
            averaging_strategy: AveragingStrategy::default(),
            seed: default_seed(),
        }
    }
}

impl FilterConfig {
    /// Check every field against its valid range.
    pub fn validate(&self) -> Result<(), String> {
        if self.num_particles == 0 {
            return Err("num_particles must be positive".to_string());
        }
        if self.process_noise_std.is_empty() {
            return Err("process_noise_std must contain at least one value".to_string());
        }
        if let Some(bad) = self
            .process_noise_std
            .iter()
            .find(|s| !(s.is_finite() && **s >= 0.0))
        {
            return Err(format!(
                "process_noise_std values must be finite and non-negative, got {bad}"
            ));
        }
        if !(self.prior_std.is_finite() && self.prior_std >= 0.0) {
            return Err(format!(
                "prior_std must be finite and non-negative, got {}",
                self.prior_std
            ));
        }
        if !(self.observation_std.is_finite() && self.observation_std >= 0.0) {
            return Err(format!(
                "observation_std must be finite and non-negative, got {}",
                self.observation_std
            ));
        }
        if !(self.threshold > 0.0 && self.threshold <= 1.0) {
            return Err(format!(
                "threshold must lie in (0, 1], got {}",
                self.threshold
            ));
        }
        Ok(())
    }

    /// Process noise for a state of `dimension` components.
    ///
    /// # Panics
    /// When more than one standard deviation is configured and their count differs from `dimension`.
    pub fn process_noise(&self, dimension: usize) -> ProcessNoise {
        match self.process_noise_std.as_slice() {
            [std] => ProcessNoise::isotropic(dimension, *std),
            stds => {
                assert_eq!(
                    stds.len(),
                    dimension,
                    "process_noise_std has {} values for a {}-dimensional state",
                    stds.len(),
                    dimension
                );
                ProcessNoise::from_std(stds)
            }
        }
    }

    pub fn evaluation_model(&self) -> EvaluationModel {
        EvaluationModel::new(self.threshold)
    }

    /// Write the configuration to a JSON file (pretty-printed).
    pub fn to_json<P: AsRef<Path>>(&self, path: P) -> io::Result<()> {
        let file = File::create(path)?;
        serde_json::to_writer_pretty(file, self).map_err(io::Error::other)
    }

    pub fn from_json<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        let file = File::open(path)?;
        serde_json::from_reader(file).map_err(io::Error::other)
    }

    pub fn to_yaml<P: AsRef<Path>>(&self, path: P) -> io::Result<()> {
        let mut file = File::create(path)?;
        let s = serde_yaml::to_string(self).map_err(io::Error::other)?;
        file.write_all(s.as_bytes())
    }

    pub fn from_yaml<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        let file = File::open(path)?;
        serde_yaml::from_reader(file).map_err(io::Error::other)
    }

    pub fn to_toml<P: AsRef<Path>>(&self, path: P) -> io::Result<()> {
        let mut file = File::create(path)?;
        let s = toml::to_string(self).map_err(io::Error::other)?;
        file.write_all(s.as_bytes())
    }

    pub fn from_toml<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        let mut s = String::new();
        File::open(path)?.read_to_string(&mut s)?;
        toml::from_str(&s).map_err(io::Error::other)
    }

    /// Generic write: choose format by file extension (.json/.yaml/.yml/.toml)
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> io::Result<()> {
        let p = path.as_ref();
        match extension(p).as_deref() {
            Some("json") => self.to_json(p),
            Some("yaml") | Some("yml") => self.to_yaml(p),
            Some("toml") => self.to_toml(p),
            _ => Err(unsupported(p)),
        }
    }

    /// Generic read: choose format by file extension (.json/.yaml/.yml/.toml)
    pub fn from_file<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        let p = path.as_ref();
        match extension(p).as_deref() {
            Some("json") => Self::from_json(p),
            Some("yaml") | Some("yml") => Self::from_yaml(p),
            Some("toml") => Self::from_toml(p),
            _ => Err(unsupported(p)),
        }
    }
}

fn extension(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|s| s.to_str())
        .map(|s| s.to_lowercase())
}

fn unsupported(path: &Path) -> io::Error {
    io::Error::new(
        io::ErrorKind::InvalidInput,
        format!("unsupported configuration file extension: {}", path.display()),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn sample_cfg() -> FilterConfig {
        FilterConfig {
            num_particles: 250,
            process_noise_std: vec![0.1, 0.1, 0.02, 0.02],
            prior_std: 1.0,
            observation_std: 0.3,
            threshold: 0.75,
            resampling_strategy: ResamplingStrategy::Residual,
            averaging_strategy: AveragingStrategy::HighestWeight,
            seed: 7,
        }
    }

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("pf_config_{}_{}", std::process::id(), name))
    }

    #[test]
    fn json_roundtrip() {
        let cfg = sample_cfg();
        let path = temp_path("roundtrip.json");
        cfg.to_json(&path).unwrap();
        assert_eq!(FilterConfig::from_json(&path).unwrap(), cfg);
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn yaml_roundtrip() {
        let cfg = sample_cfg();
        let path = temp_path("roundtrip.yaml");
        cfg.to_yaml(&path).unwrap();
        assert_eq!(FilterConfig::from_yaml(&path).unwrap(), cfg);
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn toml_roundtrip() {
        let cfg = sample_cfg();
        let path = temp_path("roundtrip.toml");
        cfg.to_toml(&path).unwrap();
        assert_eq!(FilterConfig::from_toml(&path).unwrap(), cfg);
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn generic_dispatch_by_extension() {
        let cfg = FilterConfig::default();
        for name in ["dispatch.json", "dispatch.yml", "dispatch.TOML"] {
            let path = temp_path(name);
            cfg.to_file(&path).unwrap();
            assert_eq!(FilterConfig::from_file(&path).unwrap(), cfg);
            std::fs::remove_file(&path).ok();
        }
    }

    #[test]
    fn unsupported_extension_is_an_error() {
        let err = FilterConfig::default()
            .to_file(temp_path("config.ini"))
            .unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
    }

    #[test]
    fn missing_fields_take_defaults() {
        let cfg: FilterConfig = serde_json::from_str(r#"{"num_particles": 64}"#).unwrap();
        assert_eq!(cfg.num_particles, 64);
        assert_eq!(cfg.seed, 42);
        assert_eq!(cfg.resampling_strategy, ResamplingStrategy::StochasticUniversal);
        let cfg: FilterConfig =
            serde_yaml::from_str("resampling_strategy: residual\naveraging_strategy: unweighted_average\n")
                .unwrap();
        assert_eq!(cfg.resampling_strategy, ResamplingStrategy::Residual);
        assert_eq!(cfg.averaging_strategy, AveragingStrategy::UnweightedAverage);
    }

    #[test]
    fn validation() {
        assert!(FilterConfig::default().validate().is_ok());
        assert!(sample_cfg().validate().is_ok());
        let mut cfg = FilterConfig::default();
        cfg.num_particles = 0;
        assert!(cfg.validate().unwrap_err().contains("num_particles"));
        let mut cfg = FilterConfig::default();
        cfg.threshold = 1.5;
        assert!(cfg.validate().unwrap_err().contains("threshold"));
        let mut cfg = FilterConfig::default();
        cfg.process_noise_std = vec![0.1, -0.1];
        assert!(cfg.validate().unwrap_err().contains("process_noise_std"));
    }

    #[test]
    fn process_noise_broadcasts_a_single_value() {
        assert_eq!(FilterConfig::default().process_noise(4).dimension(), 4);
        assert_eq!(sample_cfg().process_noise(4).dimension(), 4);
    }

    #[test]
    #[should_panic(expected = "process_noise_std has 4 values for a 2-dimensional state")]
    fn process_noise_dimension_mismatch_panics() {
        let _ = sample_cfg().process_noise(2);
    }
}
