use crate::error::{NetworkError, NetworkResult};
use crate::parsers::background_parser::EvidenceFilter;

pub const DEFAULT_SIMILARITY_THRESHOLD: f64 = 0.5;
pub const DEFAULT_ENRICHMENT_THRESHOLD: f64 = 0.0;
pub const DEFAULT_MAX_SUBNETWORKS: usize = 10;

#[derive(Debug, Clone, PartialEq)]
pub struct NetworkConfig {
    /// Minimum Jaccard index for an edge between two terms.
    pub similarity_threshold: f64,
    /// Terms with a log(Odds Ratio) at or below this value are left out of subnetworks.
    pub enrichment_threshold: f64,
    pub max_subnetworks: usize,
    pub num_workers: usize,
    /// Cores kept free for the rest of the system.
    pub reserved_cores: usize,
    pub evidence: EvidenceFilter,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            similarity_threshold: DEFAULT_SIMILARITY_THRESHOLD,
            enrichment_threshold: DEFAULT_ENRICHMENT_THRESHOLD,
            max_subnetworks: DEFAULT_MAX_SUBNETWORKS,
            num_workers: num_cpus::get(),
            reserved_cores: 0,
            evidence: EvidenceFilter::All,
        }
    }
}

impl NetworkConfig {
    pub fn worker_count(&self) -> usize {
        self.num_workers.saturating_sub(self.reserved_cores).max(1)
    }

    pub fn validate(&self) -> NetworkResult<()> {
        if !(0.0..=1.0).contains(&self.similarity_threshold) {
            return Err(NetworkError::InvalidConfig(format!(
                "similarity threshold must be within [0, 1], got {}",
                self.similarity_threshold
            )));
        }
        if !self.enrichment_threshold.is_finite() {
            return Err(NetworkError::InvalidConfig(format!(
                "enrichment threshold must be a finite number, got {}",
                self.enrichment_threshold
            )));
        }
        if self.max_subnetworks == 0 {
            return Err(NetworkError::InvalidConfig(
                "at least one subnetwork per namespace must be requested".to_string(),
            ));
        }
        if self.num_workers == 0 {
            return Err(NetworkError::InvalidConfig(
                "worker count must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = NetworkConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.similarity_threshold, 0.5);
        assert!(config.worker_count() >= 1);
    }

    #[test]
    fn headroom_never_empties_the_pool() {
        let config = NetworkConfig {
            num_workers: 4,
            reserved_cores: 1,
            ..NetworkConfig::default()
        };
        assert_eq!(config.worker_count(), 3);

        let config = NetworkConfig {
            num_workers: 2,
            reserved_cores: 8,
            ..NetworkConfig::default()
        };
        assert_eq!(config.worker_count(), 1);
    }

    #[test]
    fn rejects_out_of_range_values() {
        let bad_similarity = NetworkConfig {
            similarity_threshold: 1.5,
            ..NetworkConfig::default()
        };
        assert!(matches!(bad_similarity.validate(), Err(NetworkError::InvalidConfig(_))));

        let bad_enrichment = NetworkConfig {
            enrichment_threshold: f64::NAN,
            ..NetworkConfig::default()
        };
        assert!(bad_enrichment.validate().is_err());

        let no_subnetworks = NetworkConfig {
            max_subnetworks: 0,
            ..NetworkConfig::default()
        };
        assert!(no_subnetworks.validate().is_err());
    }
}
