use rustc_hash::FxHashMap;
use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use log::{info, warn};
use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};
use crate::analysis::{
    network_assembly::BipartiteMapping,
    subnetworks::taxon_subnetworks,
    term_network::{build_taxon_networks, TermNetwork},
};
use crate::config::NetworkConfig;
use crate::error::{NetworkError, NetworkResult};
use crate::parsers::enrichment_parser::{EnrichmentTable, NameSpace};

pub type TaxonNetworks = FxHashMap<String, FxHashMap<NameSpace, TermNetwork>>;
pub type TaxonSubnetworks = FxHashMap<String, FxHashMap<NameSpace, Vec<TermNetwork>>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    BuildNetworks,
    ExtractSubnetworks,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::BuildNetworks => write!(f, "network construction"),
            Stage::ExtractSubnetworks => write!(f, "subnetwork extraction"),
        }
    }
}

#[derive(Debug)]
pub struct TaskFailure {
    pub taxon: String,
    pub stage: Stage,
    pub error: NetworkError,
}

impl fmt::Display for TaskFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} failed for {}: {}", self.stage, self.taxon, self.error)
    }
}

#[derive(Debug)]
pub struct StageReport<T> {
    pub results: FxHashMap<String, T>,
    pub failures: Vec<TaskFailure>,
}

/// Final output of both stages.
#[derive(Debug, Default)]
pub struct NetworkRun {
    pub networks: TaxonNetworks,
    pub subnetworks: TaxonSubnetworks,
    pub failures: Vec<TaskFailure>,
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

pub struct Coordinator {
    pool: ThreadPool,
}

impl Coordinator {
    pub fn new(num_workers: usize) -> NetworkResult<Self> {
        let pool = ThreadPoolBuilder::new()
            .num_threads(num_workers.max(1))
            .thread_name(|index| format!("taxago-network-{}", index))
            .build()?;
        Ok(Self { pool })
    }

    pub fn num_workers(&self) -> usize {
        self.pool.current_num_threads()
    }

    /// Runs `task` once per taxon on the pool and waits for all of them.
    /// Errors and panics stay with their taxon; the merge happens here, on
    /// the calling thread.
    pub fn run_stage<I, T, F>(&self, stage: Stage, inputs: Vec<(String, I)>, task: F) -> StageReport<T>
    where
        I: Send,
        T: Send,
        F: Fn(&str, I) -> NetworkResult<T> + Sync,
    {
        let outcomes: Vec<Result<(String, T), TaskFailure>> = self.pool.install(|| {
            inputs
                .into_par_iter()
                .map(|(taxon, input)| {
                    let outcome = panic::catch_unwind(AssertUnwindSafe(|| task(&taxon, input)));
                    match outcome {
                        Ok(Ok(value)) => Ok((taxon, value)),
                        Ok(Err(error)) => Err(TaskFailure { taxon, stage, error }),
                        Err(payload) => Err(TaskFailure {
                            taxon,
                            stage,
                            error: NetworkError::TaskPanicked(panic_message(payload)),
                        }),
                    }
                })
                .collect()
        });

        let mut results = FxHashMap::default();
        let mut failures = Vec::new();
        for outcome in outcomes {
            match outcome {
                Ok((taxon, value)) => {
                    results.insert(taxon, value);
                }
                Err(failure) => {
                    warn!("{}", failure);
                    failures.push(failure);
                }
            }
        }
        failures.sort_by(|a, b| a.taxon.cmp(&b.taxon));

        StageReport { results, failures }
    }

    pub fn build_networks(
        &self,
        network_data: &FxHashMap<String, BipartiteMapping>,
        tables: &FxHashMap<String, EnrichmentTable>,
        similarity_threshold: f64,
    ) -> StageReport<FxHashMap<NameSpace, TermNetwork>> {
        let mut inputs = Vec::with_capacity(network_data.len());
        let mut failures = Vec::new();
        for (taxon, mapping) in network_data {
            match tables.get(taxon) {
                Some(table) => inputs.push((taxon.clone(), (mapping, table))),
                None => {
                    let failure = TaskFailure {
                        taxon: taxon.clone(),
                        stage: Stage::BuildNetworks,
                        error: NetworkError::MissingEnrichmentTable(taxon.clone()),
                    };
                    warn!("{}", failure);
                    failures.push(failure);
                }
            }
        }

        let mut report = self.run_stage(Stage::BuildNetworks, inputs, |_, (mapping, table)| {
            build_taxon_networks(mapping, table, similarity_threshold)
        });
        report.failures.extend(failures);
        report.failures.sort_by(|a, b| a.taxon.cmp(&b.taxon));
        report
    }

    pub fn extract_subnetworks(
        &self,
        networks: &TaxonNetworks,
        enrichment_threshold: f64,
        max_count: usize,
    ) -> StageReport<FxHashMap<NameSpace, Vec<TermNetwork>>> {
        let inputs: Vec<(String, &FxHashMap<NameSpace, TermNetwork>)> = networks
            .iter()
            .map(|(taxon, taxon_networks)| (taxon.clone(), taxon_networks))
            .collect();

        self.run_stage(Stage::ExtractSubnetworks, inputs, |_, taxon_networks| {
            Ok(taxon_subnetworks(taxon_networks, enrichment_threshold, max_count))
        })
    }

    /// Builds every taxon's graphs, then extracts subnetworks from the
    /// complete set. Extraction never starts before construction has
    /// finished for all taxa.
    pub fn run(
        &self,
        network_data: &FxHashMap<String, BipartiteMapping>,
        tables: &FxHashMap<String, EnrichmentTable>,
        config: &NetworkConfig,
    ) -> NetworkRun {
        info!(
            "Building GO term networks for {} taxa with {} worker(s)",
            network_data.len(),
            self.num_workers()
        );
        let built = self.build_networks(network_data, tables, config.similarity_threshold);

        info!("Extracting subnetworks for {} taxa", built.results.len());
        let extracted = self.extract_subnetworks(
            &built.results,
            config.enrichment_threshold,
            config.max_subnetworks,
        );

        let mut failures = built.failures;
        failures.extend(extracted.failures);
        failures.sort_by(|a, b| a.taxon.cmp(&b.taxon));
        if !failures.is_empty() {
            warn!("{} taxa were skipped; see warnings above", failures.len());
        }

        NetworkRun {
            networks: built.results,
            subnetworks: extracted.results,
            failures,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::parsers::background_parser::{GOTermID, Protein};
    use crate::parsers::enrichment_parser::{EnrichmentCounts, EnrichmentRecord};
    use compact_str::CompactString;
    use rustc_hash::FxHashSet;
    use std::sync::Arc;

    fn proteins(ids: &[&str]) -> FxHashSet<Protein> {
        ids.iter().map(|id| Arc::new(CompactString::new(*id))).collect()
    }

    fn table(scores: &[(GOTermID, f64)]) -> EnrichmentTable {
        EnrichmentTable::from_records(scores.iter().map(|&(go_id, log_odds_ratio)| EnrichmentRecord {
            go_id,
            name: format!("term {}", go_id),
            namespace: NameSpace::BiologicalProcess,
            log_odds_ratio,
            stat_sig: 0.01,
            counts: EnrichmentCounts::Species {
                study_with_term: 1,
                study_without_term: 1,
                background_with_term: 1,
                background_without_term: 1,
            },
            subnetwork: None,
        }))
    }

    fn mapping() -> BipartiteMapping {
        let mut mapping = BipartiteMapping::default();
        let terms = mapping.entry(NameSpace::BiologicalProcess).or_default();
        terms.insert(1, proteins(&["p1", "p2", "p3"]));
        terms.insert(2, proteins(&["p2", "p3", "p4"]));
        terms.insert(3, proteins(&["p5"]));
        mapping
    }

    fn config() -> NetworkConfig {
        NetworkConfig {
            similarity_threshold: 0.3,
            enrichment_threshold: 0.0,
            max_subnetworks: 5,
            ..NetworkConfig::default()
        }
    }

    #[test]
    fn one_corrupted_taxon_does_not_affect_the_others() {
        let mut network_data = FxHashMap::default();
        let mut tables = FxHashMap::default();
        for taxon in ["Taxon a", "Taxon b", "Taxon c"] {
            network_data.insert(taxon.to_string(), mapping());
            tables.insert(taxon.to_string(), table(&[(1, 1.0), (2, 1.0), (3, 1.0)]));
        }

        let coordinator = Coordinator::new(2).unwrap();
        let clean = coordinator.run(&network_data, &tables, &config());
        assert!(clean.failures.is_empty());

        tables.insert("Taxon b".to_string(), table(&[(1, f64::NAN), (2, 1.0), (3, 1.0)]));
        let degraded = coordinator.run(&network_data, &tables, &config());

        assert_eq!(degraded.failures.len(), 1);
        assert_eq!(degraded.failures[0].taxon, "Taxon b");
        assert_eq!(degraded.failures[0].stage, Stage::BuildNetworks);
        assert!(!degraded.subnetworks.contains_key("Taxon b"));

        for taxon in ["Taxon a", "Taxon c"] {
            let expected = &clean.subnetworks[taxon][&NameSpace::BiologicalProcess];
            let actual = &degraded.subnetworks[taxon][&NameSpace::BiologicalProcess];
            assert_eq!(expected.len(), actual.len());
            for (e, a) in expected.iter().zip(actual) {
                assert_eq!(e.sorted_edges(), a.sorted_edges());
            }
        }
        assert_eq!(
            degraded.subnetworks["Taxon a"][&NameSpace::BiologicalProcess][0].sorted_edges(),
            vec![(1, 2, 0.5)]
        );
    }

    #[test]
    fn panics_are_contained_to_their_task() {
        let coordinator = Coordinator::new(3).unwrap();
        let inputs: Vec<(String, u32)> = (0..6).map(|i| (format!("taxon {}", i), i)).collect();

        let report = coordinator.run_stage(Stage::ExtractSubnetworks, inputs, |_, value| {
            if value == 4 {
                panic!("corrupted input");
            }
            Ok(value * 2)
        });

        assert_eq!(report.results.len(), 5);
        assert_eq!(report.results["taxon 3"], 6);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].taxon, "taxon 4");
        assert!(matches!(
            &report.failures[0].error,
            NetworkError::TaskPanicked(message) if message.contains("corrupted input")
        ));
    }

    #[test]
    fn taxa_without_tables_are_reported() {
        let mut network_data = FxHashMap::default();
        network_data.insert("Orphan".to_string(), mapping());
        let tables = FxHashMap::default();

        let coordinator = Coordinator::new(1).unwrap();
        let run = coordinator.run(&network_data, &tables, &config());
        assert!(run.subnetworks.is_empty());
        assert_eq!(run.failures.len(), 1);
        assert_eq!(run.failures[0].taxon, "Orphan");
    }

    #[test]
    fn failure_log_is_ordered_by_taxon() {
        let mut network_data = FxHashMap::default();
        let mut tables = FxHashMap::default();
        for taxon in ["Taxon a", "Taxon b", "Taxon c", "Taxon d"] {
            network_data.insert(taxon.to_string(), mapping());
        }
        tables.insert("Taxon b".to_string(), table(&[(1, 1.0), (2, 1.0), (3, 1.0)]));
        tables.insert("Taxon c".to_string(), table(&[(1, 1.0), (2, f64::NAN), (3, 1.0)]));
        tables.insert("Taxon d".to_string(), table(&[(1, f64::INFINITY), (2, 1.0), (3, 1.0)]));

        let run = Coordinator::new(2).unwrap().run(&network_data, &tables, &config());
        let failed: Vec<&str> = run.failures.iter().map(|f| f.taxon.as_str()).collect();
        assert_eq!(failed, vec!["Taxon a", "Taxon c", "Taxon d"]);
        assert!(matches!(run.failures[0].error, NetworkError::MissingEnrichmentTable(_)));
        assert!(run.subnetworks.contains_key("Taxon b"));
    }
}
