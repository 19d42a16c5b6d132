use rustc_hash::FxHashMap;
use std::fs::read_dir;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use csv::{ReaderBuilder, StringRecord};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumIter, EnumString};
use crate::error::{NetworkError, NetworkResult};
use crate::parsers::background_parser::{parse_go_id, GOTermID};

pub const SINGLE_TAXON_RESULTS: &str = "single_taxon_results";
pub const COMBINED_TAXONOMY_RESULTS: &str = "combined_taxonomy_results";
const RESULTS_SUFFIX: &str = "_GOEA_results";

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord,
    EnumIter, EnumString, Display, Serialize, Deserialize,
)]
pub enum NameSpace {
    #[strum(serialize = "biological_process", to_string = "Biological Process")]
    BiologicalProcess,
    #[strum(serialize = "molecular_function", to_string = "Molecular Function")]
    MolecularFunction,
    #[strum(serialize = "cellular_component", to_string = "Cellular Component")]
    CellularComponent,
}

impl NameSpace {
    pub fn dir_name(&self) -> &'static str {
        match self {
            NameSpace::BiologicalProcess => "Biological_Process",
            NameSpace::MolecularFunction => "Molecular_Function",
            NameSpace::CellularComponent => "Cellular_Component",
        }
    }
}

/// Which upstream table a result directory holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultLevel {
    Species,
    Taxonomy,
}

impl ResultLevel {
    pub fn dir_name(&self) -> &'static str {
        match self {
            ResultLevel::Species => SINGLE_TAXON_RESULTS,
            ResultLevel::Taxonomy => COMBINED_TAXONOMY_RESULTS,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum EnrichmentCounts {
    Species {
        study_with_term: usize,
        study_without_term: usize,
        background_with_term: usize,
        background_without_term: usize,
    },
    Taxonomy {
        heterogeneity: f64,
        species_percentage: f64,
        n_with_term: usize,
        n_in_taxonomy: usize,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct EnrichmentRecord {
    pub go_id: GOTermID,
    pub name: String,
    pub namespace: NameSpace,
    pub log_odds_ratio: f64,
    pub stat_sig: f64,
    pub counts: EnrichmentCounts,
    /// 1-based rank of the subnetwork holding this term, once annotated.
    pub subnetwork: Option<usize>,
}

#[derive(Debug, Clone, Default)]
pub struct EnrichmentTable {
    records: FxHashMap<GOTermID, EnrichmentRecord>,
}

struct ColumnIndex {
    go_id: usize,
    name: usize,
    namespace: usize,
    log_odds_ratio: usize,
    stat_sig: usize,
    counts: CountColumns,
}

enum CountColumns {
    Species([usize; 4]),
    Taxonomy([usize; 4]),
}

const SPECIES_COUNT_COLUMNS: [&str; 4] = [
    "N Study with term",
    "N Study without term",
    "N Background with term",
    "N Background without term",
];

const TAXONOMY_COUNT_COLUMNS: [&str; 4] = [
    "Heterogeneity",
    "Species Percentage",
    "N with GO term",
    "N in taxonomy",
];

impl ColumnIndex {
    fn from_headers(headers: &StringRecord, path: &Path) -> NetworkResult<Self> {
        let find = |column: &str| headers.iter().position(|header| header.trim() == column);
        let require = |column: &'static str| {
            find(column).ok_or_else(|| NetworkError::MissingColumn {
                path: path.to_path_buf(),
                column,
            })
        };

        let counts = if find(SPECIES_COUNT_COLUMNS[0]).is_some() {
            let mut indices = [0; 4];
            for (slot, column) in indices.iter_mut().zip(SPECIES_COUNT_COLUMNS) {
                *slot = require(column)?;
            }
            CountColumns::Species(indices)
        } else {
            let mut indices = [0; 4];
            for (slot, column) in indices.iter_mut().zip(TAXONOMY_COUNT_COLUMNS) {
                *slot = require(column)?;
            }
            CountColumns::Taxonomy(indices)
        };

        Ok(Self {
            go_id: require("GO Term ID")?,
            name: require("Name")?,
            namespace: require("Namespace")?,
            log_odds_ratio: require("log(Odds Ratio)")?,
            stat_sig: require("Statistical significance")?,
            counts,
        })
    }
}

fn field<T: FromStr>(
    record: &StringRecord,
    index: usize,
    column: &str,
    path: &Path,
) -> NetworkResult<T> {
    let raw = record.get(index).map(str::trim).unwrap_or_default();
    raw.parse::<T>().map_err(|_| NetworkError::MalformedEnrichmentTable {
        path: path.to_path_buf(),
        reason: format!(
            "invalid value '{}' in column '{}' at line {}",
            raw,
            column,
            record.position().map_or(0, |p| p.line())
        ),
    })
}

impl EnrichmentTable {
    pub fn read_table(path: impl AsRef<Path>) -> NetworkResult<Self> {
        let path = path.as_ref();
        let mut reader = ReaderBuilder::new()
            .delimiter(b'\t')
            .flexible(true)
            .from_path(path)?;

        let columns = ColumnIndex::from_headers(&reader.headers()?.clone(), path)?;
        let mut records = FxHashMap::default();

        for result in reader.records() {
            let row = result?;
            if row.iter().all(|value| value.trim().is_empty()) {
                continue;
            }

            let go_text: String = field(&row, columns.go_id, "GO Term ID", path)?;
            let go_id = parse_go_id(&go_text).ok_or_else(|| NetworkError::MalformedEnrichmentTable {
                path: path.to_path_buf(),
                reason: format!("invalid GO term id '{}'", go_text),
            })?;
            let namespace_text: String = field(&row, columns.namespace, "Namespace", path)?;
            let namespace = NameSpace::from_str(&namespace_text).map_err(|_| {
                NetworkError::MalformedEnrichmentTable {
                    path: path.to_path_buf(),
                    reason: format!("unknown namespace '{}' for {}", namespace_text, go_text),
                }
            })?;

            let counts = match &columns.counts {
                CountColumns::Species(idx) => EnrichmentCounts::Species {
                    study_with_term: field(&row, idx[0], SPECIES_COUNT_COLUMNS[0], path)?,
                    study_without_term: field(&row, idx[1], SPECIES_COUNT_COLUMNS[1], path)?,
                    background_with_term: field(&row, idx[2], SPECIES_COUNT_COLUMNS[2], path)?,
                    background_without_term: field(&row, idx[3], SPECIES_COUNT_COLUMNS[3], path)?,
                },
                CountColumns::Taxonomy(idx) => EnrichmentCounts::Taxonomy {
                    heterogeneity: field(&row, idx[0], TAXONOMY_COUNT_COLUMNS[0], path)?,
                    species_percentage: field(&row, idx[1], TAXONOMY_COUNT_COLUMNS[1], path)?,
                    n_with_term: field(&row, idx[2], TAXONOMY_COUNT_COLUMNS[2], path)?,
                    n_in_taxonomy: field(&row, idx[3], TAXONOMY_COUNT_COLUMNS[3], path)?,
                },
            };

            records.insert(
                go_id,
                EnrichmentRecord {
                    go_id,
                    name: field(&row, columns.name, "Name", path)?,
                    namespace,
                    log_odds_ratio: field(&row, columns.log_odds_ratio, "log(Odds Ratio)", path)?,
                    stat_sig: field(&row, columns.stat_sig, "Statistical significance", path)?,
                    counts,
                    subnetwork: None,
                },
            );
        }

        Ok(Self { records })
    }

    pub fn from_records(records: impl IntoIterator<Item = EnrichmentRecord>) -> Self {
        Self {
            records: records.into_iter().map(|record| (record.go_id, record)).collect(),
        }
    }

    pub fn get(&self, go_id: &GOTermID) -> Option<&EnrichmentRecord> {
        self.records.get(go_id)
    }

    pub fn get_mut(&mut self, go_id: &GOTermID) -> Option<&mut EnrichmentRecord> {
        self.records.get_mut(go_id)
    }

    pub fn contains(&self, go_id: &GOTermID) -> bool {
        self.records.contains_key(go_id)
    }

    pub fn namespace_of(&self, go_id: &GOTermID) -> Option<NameSpace> {
        self.records.get(go_id).map(|record| record.namespace)
    }

    pub fn records(&self) -> impl Iterator<Item = &EnrichmentRecord> {
        self.records.values()
    }

    pub fn in_namespace(&self, namespace: NameSpace) -> impl Iterator<Item = &EnrichmentRecord> {
        self.records.values().filter(move |record| record.namespace == namespace)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

fn taxon_name_from_file(path: &Path) -> Option<String> {
    let stem = path.file_name()?.to_str()?.strip_suffix(".txt")?;
    let taxon = stem.strip_suffix(RESULTS_SUFFIX)?;
    Some(taxon.replace('_', " "))
}

/// Reads every `<Taxon_Name>_GOEA_results.txt` table of one result level.
/// Tables that fail to parse are logged and skipped.
pub fn read_enrichment_results(
    results_dir: impl AsRef<Path>,
    level: ResultLevel,
) -> NetworkResult<FxHashMap<String, EnrichmentTable>> {
    let level_dir = results_dir.as_ref().join(level.dir_name());
    if !level_dir.is_dir() {
        return Err(NetworkError::MissingResultsDir {
            path: results_dir.as_ref().to_path_buf(),
            expected: level.dir_name(),
        });
    }

    let mut table_files: Vec<(String, PathBuf)> = read_dir(&level_dir)
        .map_err(|e| NetworkError::io(&level_dir, e))?
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .filter(|path| path.is_file())
        .filter_map(|path| taxon_name_from_file(&path).map(|taxon| (taxon, path)))
        .collect();
    table_files.sort();

    let mut tables = FxHashMap::default();
    for (taxon, path) in table_files {
        match EnrichmentTable::read_table(&path) {
            Ok(table) => {
                debug!("Read {} enriched terms for {}", table.len(), taxon);
                tables.insert(taxon, table);
            }
            Err(e) => warn!("Skipping enrichment results for {}: {}", taxon, e),
        }
    }

    Ok(tables)
}
