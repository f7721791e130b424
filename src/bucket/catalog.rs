//! Named bucket configurations loaded from YAML.
//!
//! Callers decide which configuration applies to which key; this module only
//! gives those configurations names so they can live in a file instead of
//! being rebuilt in code at every call site. A `default` entry, when present,
//! backs any lookup that misses.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;
use tracing::info;

use crate::error::{Result, TollgateError};

use super::bandwidth::{Bandwidth, BucketConfiguration, RefillStrategy};

/// Name of the catalog entry used when a lookup misses.
const DEFAULT_ENTRY: &str = "default";

/// Serialized form of one bandwidth in a catalog file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BandwidthSpec {
    /// Maximum tokens the bandwidth can hold
    pub capacity: u64,
    /// Tokens added per refill period
    pub refill_tokens: u64,
    /// Refill period in seconds
    pub period_secs: u64,
    /// Refill strategy
    #[serde(default = "default_strategy")]
    pub strategy: RefillStrategy,
    /// Starting token count for a fresh bucket (defaults to capacity)
    #[serde(default)]
    pub initial_tokens: Option<u64>,
}

fn default_strategy() -> RefillStrategy {
    RefillStrategy::Greedy
}

impl BandwidthSpec {
    fn build(&self) -> Bandwidth {
        let period = Duration::from_secs(self.period_secs);
        let bandwidth = match self.strategy {
            RefillStrategy::Greedy => Bandwidth::greedy(self.capacity, self.refill_tokens, period),
            RefillStrategy::Interval => {
                Bandwidth::interval(self.capacity, self.refill_tokens, period)
            }
        };
        match self.initial_tokens {
            Some(tokens) => bandwidth.with_initial_tokens(tokens),
            None => bandwidth,
        }
    }
}

/// Serialized form of one named limit in a catalog file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitSpec {
    /// Bandwidths evaluated together with all-or-nothing semantics
    pub bandwidths: Vec<BandwidthSpec>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct CatalogFile {
    #[serde(default)]
    limits: HashMap<String, LimitSpec>,
}

/// A catalog of named, validated bucket configurations.
#[derive(Debug, Clone, Default)]
pub struct LimitCatalog {
    limits: HashMap<String, BucketConfiguration>,
}

impl LimitCatalog {
    /// Create an empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a catalog from a YAML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!(path = %path.display(), "Loading limit catalog");

        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    /// Load a catalog from a YAML string, validating every entry.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let file: CatalogFile = serde_yaml::from_str(yaml)
            .map_err(|e| TollgateError::Config(format!("Failed to parse limit catalog: {}", e)))?;

        let mut limits = HashMap::with_capacity(file.limits.len());
        for (name, spec) in file.limits {
            let bandwidths = spec.bandwidths.iter().map(BandwidthSpec::build).collect();
            let config = BucketConfiguration::new(bandwidths).map_err(|e| {
                TollgateError::InvalidConfiguration(format!("limit '{}': {}", name, e))
            })?;
            limits.insert(name, config);
        }
        Ok(Self { limits })
    }

    /// Add or replace a named configuration.
    pub fn insert(&mut self, name: impl Into<String>, config: BucketConfiguration) {
        self.limits.insert(name.into(), config);
    }

    /// Look up a configuration by name.
    pub fn get(&self, name: &str) -> Option<&BucketConfiguration> {
        self.limits.get(name)
    }

    /// Look up a configuration by name, falling back to the `default` entry.
    pub fn get_or_default(&self, name: &str) -> Option<&BucketConfiguration> {
        self.limits.get(name).or_else(|| self.limits.get(DEFAULT_ENTRY))
    }

    /// Number of named configurations.
    pub fn len(&self) -> usize {
        self.limits.len()
    }

    /// Whether the catalog has no entries.
    pub fn is_empty(&self) -> bool {
        self.limits.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_simple_catalog() {
        let yaml = r#"
limits:
  default:
    bandwidths:
      - capacity: 200
        refill_tokens: 200
        period_secs: 60
"#;
        let catalog = LimitCatalog::from_yaml(yaml).unwrap();
        assert_eq!(catalog.len(), 1);

        let config = catalog.get("default").unwrap();
        assert_eq!(config.bandwidths().len(), 1);
        assert_eq!(config.bandwidths()[0].capacity(), 200);
        assert_eq!(config.bandwidths()[0].strategy(), RefillStrategy::Greedy);
    }

    #[test]
    fn test_parse_burst_composition() {
        let yaml = r#"
limits:
  events:
    bandwidths:
      - capacity: 100
        refill_tokens: 100
        period_secs: 60
      - capacity: 150
        refill_tokens: 100
        period_secs: 60
        strategy: interval
        initial_tokens: 50
"#;
        let catalog = LimitCatalog::from_yaml(yaml).unwrap();
        let config = catalog.get("events").unwrap();
        assert_eq!(config.bandwidths().len(), 2);
        assert_eq!(config.bandwidths()[1].strategy(), RefillStrategy::Interval);
        assert_eq!(config.bandwidths()[1].initial_tokens(), 50);
    }

    #[test]
    fn test_lookup_falls_back_to_default() {
        let yaml = r#"
limits:
  default:
    bandwidths:
      - capacity: 200
        refill_tokens: 200
        period_secs: 60
  analytics:
    bandwidths:
      - capacity: 50
        refill_tokens: 50
        period_secs: 60
"#;
        let catalog = LimitCatalog::from_yaml(yaml).unwrap();

        let analytics = catalog.get_or_default("analytics").unwrap();
        assert_eq!(analytics.bandwidths()[0].capacity(), 50);

        let other = catalog.get_or_default("uploads").unwrap();
        assert_eq!(other.bandwidths()[0].capacity(), 200);

        assert!(catalog.get("uploads").is_none());
    }

    #[test]
    fn test_invalid_entry_rejected() {
        let yaml = r#"
limits:
  broken:
    bandwidths:
      - capacity: 0
        refill_tokens: 10
        period_secs: 60
"#;
        let result = LimitCatalog::from_yaml(yaml);
        assert!(matches!(
            result,
            Err(TollgateError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn test_empty_bandwidth_list_rejected() {
        let yaml = r#"
limits:
  hollow:
    bandwidths: []
"#;
        let result = LimitCatalog::from_yaml(yaml);
        assert!(matches!(
            result,
            Err(TollgateError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn test_malformed_yaml_rejected() {
        let result = LimitCatalog::from_yaml("limits: [not, a, map]");
        assert!(matches!(result, Err(TollgateError::Config(_))));
    }
}
