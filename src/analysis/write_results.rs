use rustc_hash::FxHashMap;
use std::fs::{self, create_dir_all, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use itertools::Itertools;
use log::info;
use serde::Serialize;
use crate::analysis::{coordinator::TaxonSubnetworks, term_network::TermNetwork};
use crate::error::{NetworkError, NetworkResult};
use crate::parsers::{
    background_parser::{format_go_id, GOTermID},
    enrichment_parser::{EnrichmentCounts, EnrichmentTable, NameSpace},
};

pub const NETWORKS_DIR: &str = "networks";
pub const ANNOTATED_DIR: &str = "annotated_results";
const BUFFER_SIZE: usize = 8192 * 32;

#[derive(Debug, Serialize)]
struct NodeRecord<'a> {
    go_id: String,
    name: &'a str,
    log_odds_ratio: f64,
}

#[derive(Debug, Serialize)]
struct EdgeRecord {
    source: String,
    target: String,
    jaccard: f64,
}

#[derive(Debug, Serialize)]
struct SubnetworkRecord<'a> {
    rank: usize,
    nodes: Vec<NodeRecord<'a>>,
    edges: Vec<EdgeRecord>,
}

#[derive(Debug, Serialize)]
struct TaxonRecord<'a> {
    taxon: &'a str,
    namespace: NameSpace,
    subnetworks: Vec<SubnetworkRecord<'a>>,
}

pub fn clean_directory(dir_path: &Path) -> NetworkResult<()> {
    if dir_path.exists() {
        let entries = fs::read_dir(dir_path).map_err(|e| NetworkError::io(dir_path, e))?;
        for entry in entries {
            let path = entry.map_err(|e| NetworkError::io(dir_path, e))?.path();
            if path.is_file() {
                fs::remove_file(&path).map_err(|e| NetworkError::io(&path, e))?;
            } else if path.is_dir() {
                fs::remove_dir_all(&path).map_err(|e| NetworkError::io(&path, e))?;
            }
        }
    }
    Ok(())
}

pub fn subnetwork_file_path(output_dir: &Path, namespace: NameSpace, taxon: &str) -> PathBuf {
    output_dir
        .join(NETWORKS_DIR)
        .join(namespace.dir_name())
        .join(format!("{}_subnetworks.json", taxon.replace(' ', "_")))
}

fn term_name<'a>(table: Option<&'a EnrichmentTable>, go_id: GOTermID) -> &'a str {
    table
        .and_then(|table| table.get(&go_id))
        .map_or("", |record| record.name.as_str())
}

fn subnetwork_record<'a>(
    rank: usize,
    subnetwork: &TermNetwork,
    table: Option<&'a EnrichmentTable>,
) -> SubnetworkRecord<'a> {
    let nodes = subnetwork
        .terms()
        .map(|go_id| NodeRecord {
            go_id: format_go_id(go_id),
            name: term_name(table, go_id),
            log_odds_ratio: subnetwork.log_odds_ratio(go_id).unwrap_or_default(),
        })
        .collect();
    let edges = subnetwork
        .sorted_edges()
        .into_iter()
        .map(|(source, target, jaccard)| EdgeRecord {
            source: format_go_id(source),
            target: format_go_id(target),
            jaccard,
        })
        .collect();

    SubnetworkRecord { rank, nodes, edges }
}

/// Writes one JSON file per taxon and namespace under `<output_dir>/networks`.
/// Namespaces without subnetworks produce no file. Returns the number of
/// files written.
pub fn write_subnetworks(
    subnetworks: &TaxonSubnetworks,
    tables: &FxHashMap<String, EnrichmentTable>,
    output_dir: &Path,
) -> NetworkResult<usize> {
    let mut written = 0;
    for taxon in subnetworks.keys().sorted() {
        let table = tables.get(taxon);
        let namespaces = subnetworks[taxon]
            .iter()
            .sorted_by_key(|(namespace, _)| **namespace);

        for (namespace, ranked) in namespaces {
            if ranked.is_empty() {
                continue;
            }
            let record = TaxonRecord {
                taxon,
                namespace: *namespace,
                subnetworks: ranked
                    .iter()
                    .enumerate()
                    .map(|(index, subnetwork)| subnetwork_record(index + 1, subnetwork, table))
                    .collect(),
            };

            let path = subnetwork_file_path(output_dir, *namespace, taxon);
            if let Some(parent) = path.parent() {
                create_dir_all(parent).map_err(|e| NetworkError::io(parent, e))?;
            }
            let file = File::create(&path).map_err(|e| NetworkError::io(&path, e))?;
            let mut writer = BufWriter::with_capacity(BUFFER_SIZE, file);
            serde_json::to_writer_pretty(&mut writer, &record)?;
            writer.flush().map_err(|e| NetworkError::io(&path, e))?;
            written += 1;
        }
    }

    Ok(written)
}

pub fn annotated_table_path(output_dir: &Path, taxon: &str) -> PathBuf {
    output_dir
        .join(NETWORKS_DIR)
        .join(ANNOTATED_DIR)
        .join(format!("{}_GOEA_results.txt", taxon.replace(' ', "_")))
}

const SPECIES_COUNTS_HEADER: &str =
    "N Study with term\tN Study without term\tN Background with term\tN Background without term";
const TAXONOMY_COUNTS_HEADER: &str = "Heterogeneity\tSpecies Percentage\tN with GO term\tN in taxonomy";

fn counts_header(counts: &EnrichmentCounts) -> &'static str {
    match counts {
        EnrichmentCounts::Species { .. } => SPECIES_COUNTS_HEADER,
        EnrichmentCounts::Taxonomy { .. } => TAXONOMY_COUNTS_HEADER,
    }
}

fn format_counts(counts: &EnrichmentCounts) -> String {
    match counts {
        EnrichmentCounts::Species {
            study_with_term,
            study_without_term,
            background_with_term,
            background_without_term,
        } => format!(
            "{}\t{}\t{}\t{}",
            study_with_term, study_without_term, background_with_term, background_without_term
        ),
        EnrichmentCounts::Taxonomy {
            heterogeneity,
            species_percentage,
            n_with_term,
            n_in_taxonomy,
        } => format!(
            "{:.5e}\t{:.3}\t{}\t{}",
            heterogeneity, species_percentage, n_with_term, n_in_taxonomy
        ),
    }
}

/// Enrichment table of one taxon with an extra `Subnetwork` column holding
/// the rank of the subnetwork each term belongs to, empty when it has none.
pub fn write_annotated_table(table: &EnrichmentTable, taxon: &str, output_dir: &Path) -> NetworkResult<()> {
    let path = annotated_table_path(output_dir, taxon);
    if let Some(parent) = path.parent() {
        create_dir_all(parent).map_err(|e| NetworkError::io(parent, e))?;
    }
    let file = File::create(&path).map_err(|e| NetworkError::io(&path, e))?;
    let mut writer = BufWriter::with_capacity(BUFFER_SIZE, file);

    let records: Vec<_> = table.records().sorted_by_key(|record| record.go_id).collect();
    let header = records
        .first()
        .map_or(SPECIES_COUNTS_HEADER, |record| counts_header(&record.counts));

    writeln!(
        writer,
        "GO Term ID\tName\tNamespace\tlog(Odds Ratio)\tStatistical significance\t{}\tSubnetwork",
        header
    )
    .map_err(|e| NetworkError::io(&path, e))?;

    for record in records {
        let subnetwork = record.subnetwork.map_or(String::new(), |rank| rank.to_string());
        writeln!(
            writer,
            "{}\t{}\t{}\t{:.3}\t{:.5e}\t{}\t{}",
            format_go_id(record.go_id),
            record.name,
            record.namespace,
            record.log_odds_ratio,
            record.stat_sig,
            format_counts(&record.counts),
            subnetwork
        )
        .map_err(|e| NetworkError::io(&path, e))?;
    }

    writer.flush().map_err(|e| NetworkError::io(&path, e))
}

/// Replaces `<output_dir>/networks` with the subnetwork JSON files and the
/// annotated tables of every taxon that produced subnetworks.
pub fn write_network_results(
    subnetworks: &TaxonSubnetworks,
    tables: &FxHashMap<String, EnrichmentTable>,
    output_dir: &Path,
) -> NetworkResult<usize> {
    let networks_dir = output_dir.join(NETWORKS_DIR);
    clean_directory(&networks_dir)?;
    info!("Writing subnetworks to: {}", networks_dir.display());

    let written = write_subnetworks(subnetworks, tables, output_dir)?;
    for taxon in subnetworks.keys().sorted() {
        if let Some(table) = tables.get(taxon) {
            write_annotated_table(table, taxon, output_dir)?;
        }
    }
    Ok(written)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::parsers::enrichment_parser::{EnrichmentCounts, EnrichmentRecord};
    use serde_json::Value;
    use tempfile::tempdir;

    fn subnetwork() -> TermNetwork {
        let mut network = TermNetwork::default();
        network.add_term(6915, 1.25);
        network.add_term(8150, 0.75);
        network.graph.add_edge(6915, 8150, 0.5);
        network
    }

    fn table() -> EnrichmentTable {
        EnrichmentTable::from_records([EnrichmentRecord {
            go_id: 6915,
            name: "apoptotic process".to_string(),
            namespace: NameSpace::BiologicalProcess,
            log_odds_ratio: 1.25,
            stat_sig: 0.001,
            counts: EnrichmentCounts::Species {
                study_with_term: 4,
                study_without_term: 6,
                background_with_term: 10,
                background_without_term: 90,
            },
            subnetwork: Some(1),
        }])
    }

    #[test]
    fn writes_one_file_per_namespace_with_subnetworks() {
        let dir = tempdir().unwrap();
        let stale = dir.path().join(NETWORKS_DIR).join("stale.json");
        fs::create_dir_all(stale.parent().unwrap()).unwrap();
        fs::write(&stale, "{}").unwrap();

        let mut per_namespace = FxHashMap::default();
        per_namespace.insert(NameSpace::BiologicalProcess, vec![subnetwork()]);
        per_namespace.insert(NameSpace::CellularComponent, Vec::new());
        let mut subnetworks = TaxonSubnetworks::default();
        subnetworks.insert("Homo sapiens".to_string(), per_namespace);
        let mut tables = FxHashMap::default();
        tables.insert("Homo sapiens".to_string(), table());

        let written = write_network_results(&subnetworks, &tables, dir.path()).unwrap();
        assert_eq!(written, 1);
        assert!(!stale.exists());

        let path = subnetwork_file_path(dir.path(), NameSpace::BiologicalProcess, "Homo sapiens");
        assert!(path.ends_with("networks/Biological_Process/Homo_sapiens_subnetworks.json"));
        assert!(!subnetwork_file_path(dir.path(), NameSpace::CellularComponent, "Homo sapiens").exists());

        let json: Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(json["taxon"], "Homo sapiens");
        assert_eq!(json["namespace"], "BiologicalProcess");
        let first = &json["subnetworks"][0];
        assert_eq!(first["rank"], 1);
        assert_eq!(first["nodes"][0]["go_id"], "GO:0006915");
        assert_eq!(first["nodes"][0]["name"], "apoptotic process");
        assert_eq!(first["nodes"][1]["name"], "");
        assert_eq!(first["edges"][0]["source"], "GO:0006915");
        assert_eq!(first["edges"][0]["target"], "GO:0008150");
        assert_eq!(first["edges"][0]["jaccard"], 0.5);

        let annotated = fs::read_to_string(annotated_table_path(dir.path(), "Homo sapiens")).unwrap();
        let lines: Vec<&str> = annotated.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("GO Term ID\tName"));
        assert!(lines[0].ends_with("N Background without term\tSubnetwork"));
        assert!(lines[1].starts_with("GO:0006915\tapoptotic process\tBiological Process\t1.250\t"));
        assert!(lines[1].ends_with("\t4\t6\t10\t90\t1"));
    }
}
