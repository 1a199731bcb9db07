//! Configuration loading for limiter settings.

use serde::{Deserialize, Serialize};

use crate::backoff::{Jitter, MS_IN_SEC};
use crate::error::Result;
use crate::limiter::{Limiter, DEFAULT_CONSUME};

/// Limiter settings as declared in configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Refill rate in tokens per second
    pub rate: f64,

    /// Maximum tokens a bucket holds
    pub capacity: f64,

    /// Tokens consumed per admission
    #[serde(default = "default_consume")]
    pub consume: f64,

    /// Bucket name admissions draw from
    #[serde(default = "default_bucket")]
    pub bucket: String,

    /// Jitter policy for backoff delays
    #[serde(default)]
    pub jitter: JitterSetting,

    /// Divisor converting jitter magnitudes to seconds
    #[serde(default = "default_unit")]
    pub unit: f64,
}

fn default_consume() -> f64 {
    DEFAULT_CONSUME
}

fn default_bucket() -> String {
    "default".to_string()
}

fn default_unit() -> f64 {
    MS_IN_SEC
}

/// Jitter as it appears in configuration: a flag, a fixed number of
/// seconds, or an integer range with optional step.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum JitterSetting {
    /// `false` for no jitter, `true` for the default bounded range.
    Flag(bool),
    /// Fixed magnitude in seconds.
    Fixed(f64),
    /// `[start, stop]` range in time units.
    Range([i64; 2]),
    /// `[start, stop, step]` range in time units.
    RangeStep([i64; 3]),
}

impl Default for JitterSetting {
    fn default() -> Self {
        JitterSetting::Flag(false)
    }
}

impl From<JitterSetting> for Jitter {
    fn from(setting: JitterSetting) -> Self {
        match setting {
            JitterSetting::Flag(false) => Jitter::None,
            JitterSetting::Flag(true) => Jitter::Bounded,
            JitterSetting::Fixed(seconds) => Jitter::Fixed(seconds),
            JitterSetting::Range([start, stop]) => Jitter::range(start, stop),
            JitterSetting::RangeStep([start, stop, step]) => Jitter::Range { start, stop, step },
        }
    }
}

impl Settings {
    /// Load settings from a YAML file.
    pub fn from_file(path: &str) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        serde_yaml::from_str(&contents)
            .map_err(|e| crate::error::Error::Config(e.to_string()))
    }

    /// Build a limiter from these settings, backed by a fresh in-memory
    /// store.
    pub fn build(self) -> Result<Limiter> {
        Limiter::builder(self.rate, self.capacity)
            .consume(self.consume)
            .bucket(self.bucket)
            .jitter(self.jitter.into())
            .unit(self.unit)
            .build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_settings_use_defaults() {
        let settings: Settings = serde_yaml::from_str("rate: 2\ncapacity: 3\n").unwrap();

        assert_eq!(settings.rate, 2.0);
        assert_eq!(settings.capacity, 3.0);
        assert_eq!(settings.consume, 1.0);
        assert_eq!(settings.bucket, "default");
        assert!(matches!(settings.jitter, JitterSetting::Flag(false)));
        assert_eq!(settings.unit, 1000.0);
    }

    #[test]
    fn test_full_settings_parse() {
        let yaml = r#"
rate: 10
capacity: 20
consume: 2
bucket: writes
jitter: [0, 50, 5]
unit: 100
"#;
        let settings: Settings = serde_yaml::from_str(yaml).unwrap();

        assert_eq!(settings.consume, 2.0);
        assert_eq!(settings.bucket, "writes");
        assert!(matches!(settings.jitter, JitterSetting::RangeStep([0, 50, 5])));
        assert_eq!(settings.unit, 100.0);
    }

    #[test]
    fn test_jitter_setting_variants_map_to_policies() {
        let flag_on: Settings = serde_yaml::from_str("rate: 1\ncapacity: 1\njitter: true").unwrap();
        assert_eq!(Jitter::from(flag_on.jitter), Jitter::Bounded);

        let fixed: Settings = serde_yaml::from_str("rate: 1\ncapacity: 1\njitter: 0.25").unwrap();
        assert_eq!(Jitter::from(fixed.jitter), Jitter::Fixed(0.25));

        let range: Settings =
            serde_yaml::from_str("rate: 1\ncapacity: 1\njitter: [10, 40]").unwrap();
        assert_eq!(
            Jitter::from(range.jitter),
            Jitter::Range { start: 10, stop: 40, step: 1 }
        );
    }

    #[test]
    fn test_build_produces_a_configured_limiter() {
        let settings: Settings =
            serde_yaml::from_str("rate: 2\ncapacity: 3\nbucket: api\n").unwrap();
        let limiter = settings.build().unwrap();

        assert_eq!(limiter.rate(), 2.0);
        assert_eq!(limiter.capacity(), 3.0);
        assert_eq!(limiter.bucket().as_bytes(), b"api");
    }

    #[test]
    fn test_build_rejects_invalid_numbers() {
        let settings: Settings = serde_yaml::from_str("rate: 0\ncapacity: 3\n").unwrap();
        assert!(settings.build().is_err());
    }

    #[test]
    fn test_build_rejects_zero_step_jitter_range() {
        // A zero step parses, but must be refused before it can reach a
        // live gate's backoff draw.
        let settings: Settings =
            serde_yaml::from_str("rate: 1\ncapacity: 1\njitter: [0, 50, 0]").unwrap();
        assert!(matches!(
            settings.build().unwrap_err(),
            crate::error::Error::Config(_)
        ));
    }

    #[test]
    fn test_from_file_round_trip() {
        let path = std::env::temp_dir().join("tokengate-settings-test.yaml");
        std::fs::write(&path, "rate: 5\ncapacity: 9\n").unwrap();

        let settings = Settings::from_file(path.to_str().unwrap()).unwrap();
        assert_eq!(settings.rate, 5.0);
        assert_eq!(settings.capacity, 9.0);

        std::fs::remove_file(&path).ok();
    }
}
