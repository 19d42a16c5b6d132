use rustc_hash::{FxHashMap, FxHashSet};
use std::path::{Path, PathBuf};
use log::{debug, warn};
use rayon::prelude::*;
use strum::IntoEnumIterator;
use crate::error::{NetworkError, NetworkResult};
use crate::parsers::{
    background_parser::*,
    enrichment_parser::{EnrichmentTable, NameSpace},
    lineage_parser::{Lineage, TaxonGroups},
    study_parser::StudyPop,
};

/// Enriched GO terms of one taxon and the study proteins behind them, per namespace.
pub type BipartiteMapping = FxHashMap<NameSpace, GOTermToProteinSet>;

/// Read-only inputs shared by every taxon during network assembly.
pub struct NetworkContext<'a> {
    pub lineage: &'a Lineage,
    pub study_pop: &'a StudyPop,
    pub background_dir: PathBuf,
    pub evidence: EvidenceFilter,
}

impl<'a> NetworkContext<'a> {
    pub fn new(
        lineage: &'a Lineage,
        study_pop: &'a StudyPop,
        background_dir: impl AsRef<Path>,
        evidence: EvidenceFilter,
    ) -> Self {
        Self {
            lineage,
            study_pop,
            background_dir: background_dir.as_ref().to_path_buf(),
            evidence,
        }
    }

    /// Background associations of one taxon, split by namespace and limited
    /// to the terms `table` reports as enriched. `Ok(None)` when the taxon has
    /// no study population to contribute.
    fn restricted_association(
        &self,
        taxon_id: TaxonID,
        table: &EnrichmentTable,
    ) -> NetworkResult<Option<BipartiteMapping>> {
        let species_name = self
            .lineage
            .species_name(taxon_id)
            .ok_or(NetworkError::UnknownTaxon(taxon_id))?;

        let study_proteins = match self.study_pop.proteins(species_name) {
            Some(proteins) => proteins,
            None => return Ok(None),
        };

        let association = BackgroundAssociation::read_background(
            background_file_path(&self.background_dir, taxon_id),
            study_proteins,
            &self.evidence,
        )?;

        let mut mapping: BipartiteMapping = FxHashMap::default();
        for (go_id, proteins) in association.go_term_to_proteins {
            if let Some(namespace) = table.namespace_of(&go_id) {
                mapping
                    .entry(namespace)
                    .or_insert_with(FxHashMap::default)
                    .insert(go_id, proteins);
            }
        }

        Ok(Some(mapping))
    }

    fn read_members(
        &self,
        taxon_ids: &[TaxonID],
        table: &EnrichmentTable,
    ) -> Vec<BipartiteMapping> {
        taxon_ids
            .par_iter()
            .filter_map(|&taxon_id| match self.restricted_association(taxon_id, table) {
                Ok(mapping) => mapping,
                Err(e) => {
                    warn!("Skipping taxon {}: {}", taxon_id, e);
                    None
                }
            })
            .collect()
    }
}

/// Unions `other` into `target`, term by term.
pub fn merge_mapping(target: &mut BipartiteMapping, other: BipartiteMapping) {
    for (namespace, terms) in other {
        let namespace_terms = target.entry(namespace).or_insert_with(FxHashMap::default);
        for (go_id, proteins) in terms {
            namespace_terms
                .entry(go_id)
                .or_insert_with(FxHashSet::default)
                .extend(proteins);
        }
    }
}

/// Namespaces of `mapping` with no enriched term backed by a study protein.
/// No network is built for them.
pub fn empty_namespaces(mapping: &BipartiteMapping) -> Vec<NameSpace> {
    NameSpace::iter()
        .filter(|namespace| mapping.get(namespace).map_or(true, |terms| terms.is_empty()))
        .collect()
}

fn log_empty_namespaces(taxon: &str, mapping: &BipartiteMapping) {
    for namespace in empty_namespaces(mapping) {
        warn!("Skipping {} for {}: no enriched terms with study proteins", namespace, taxon);
    }
}

pub fn assemble_species_networks(
    context: &NetworkContext,
    tables: &FxHashMap<String, EnrichmentTable>,
) -> FxHashMap<String, BipartiteMapping> {
    let per_taxon: Vec<(String, BipartiteMapping)> = context
        .study_pop
        .taxon_ids
        .par_iter()
        .filter_map(|&taxon_id| {
            let species_name = context.lineage.species_name(taxon_id)?;
            let table = tables.get(species_name)?;
            match context.restricted_association(taxon_id, table) {
                Ok(mapping) => mapping.map(|m| (species_name.to_string(), m)),
                Err(e) => {
                    warn!("Skipping taxon {} ({}): {}", taxon_id, species_name, e);
                    None
                }
            }
        })
        .collect();

    let mut network_data: FxHashMap<String, BipartiteMapping> = FxHashMap::default();
    for (species_name, mapping) in per_taxon {
        merge_mapping(network_data.entry(species_name).or_default(), mapping);
    }
    for (species_name, mapping) in &network_data {
        log_empty_namespaces(species_name, mapping);
    }
    network_data
}

pub fn assemble_taxonomy_networks(
    context: &NetworkContext,
    tables: &FxHashMap<String, EnrichmentTable>,
    groups: &TaxonGroups,
) -> FxHashMap<String, BipartiteMapping> {
    let mut network_data: FxHashMap<String, BipartiteMapping> = FxHashMap::default();

    for (group_name, members) in groups {
        let table = match tables.get(group_name) {
            Some(table) => table,
            None => continue,
        };

        let mut group_mapping = BipartiteMapping::default();
        let member_mappings = context.read_members(members, table);
        if member_mappings.is_empty() {
            debug!("No member of {} contributed study proteins", group_name);
            continue;
        }
        for mapping in member_mappings {
            merge_mapping(&mut group_mapping, mapping);
        }

        log_empty_namespaces(group_name, &group_mapping);
        network_data.insert(group_name.clone(), group_mapping);
    }

    network_data
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::analysis::{subnetworks::taxon_subnetworks, term_network::build_taxon_networks};
    use crate::parsers::enrichment_parser::{EnrichmentCounts, EnrichmentRecord};
    use crate::parsers::lineage_parser::TaxonLineage;
    use compact_str::CompactString;
    use std::fs;
    use std::sync::Arc;
    use tempfile::tempdir;

    fn protein_set(ids: &[&str]) -> FxHashSet<Protein> {
        ids.iter().map(|id| Arc::new(CompactString::new(*id))).collect()
    }

    fn record(go_id: GOTermID, namespace: NameSpace) -> EnrichmentRecord {
        EnrichmentRecord {
            go_id,
            name: format!("term {}", go_id),
            namespace,
            log_odds_ratio: 1.0,
            stat_sig: 0.01,
            counts: EnrichmentCounts::Taxonomy {
                heterogeneity: 0.0,
                species_percentage: 100.0,
                n_with_term: 2,
                n_in_taxonomy: 2,
            },
            subnetwork: None,
        }
    }

    fn lineage() -> Lineage {
        let mut lineage = Lineage::default();
        for (taxon_id, species) in [(1, "Species one"), (2, "Species two"), (3, "Species three")] {
            let ranks: [String; 8] = std::array::from_fn(|i| match i {
                0 => species.to_string(),
                1 => "Genus".to_string(),
                _ => format!("rank{}", i),
            });
            lineage.insert(taxon_id, TaxonLineage::new(ranks));
        }
        lineage
    }

    fn study_pop() -> StudyPop {
        let mut species_proteins = FxHashMap::default();
        species_proteins.insert("Species one".to_string(), protein_set(&["p1", "p2", "p9"]));
        species_proteins.insert("Species two".to_string(), protein_set(&["p2", "p3"]));
        StudyPop {
            taxon_ids: vec![1, 2],
            species_proteins,
        }
    }

    #[test]
    fn group_mapping_is_a_union_of_members() {
        let dir = tempdir().unwrap();
        fs::write(
            dir.path().join("1_background.txt"),
            "p1\tGO:0000010\np2\tGO:0000010\np9\tGO:0000099\np1\tGO:0000020\n",
        )
        .unwrap();
        fs::write(
            dir.path().join("2_background.txt"),
            "p2\tGO:0000010\np3\tGO:0000010\n",
        )
        .unwrap();

        let lineage = lineage();
        let study = study_pop();
        let context = NetworkContext::new(&lineage, &study, dir.path(), EvidenceFilter::All);

        let mut tables = FxHashMap::default();
        tables.insert(
            "Genus".to_string(),
            EnrichmentTable::from_records([
                record(10, NameSpace::BiologicalProcess),
                record(20, NameSpace::CellularComponent),
            ]),
        );
        let groups = lineage.group_taxa_by_name(&["Genus"]);

        let network_data = assemble_taxonomy_networks(&context, &tables, &groups);
        let genus = &network_data["Genus"];

        assert_eq!(genus[&NameSpace::BiologicalProcess][&10], protein_set(&["p1", "p2", "p3"]));
        assert_eq!(genus[&NameSpace::CellularComponent][&20], protein_set(&["p1"]));
        assert!(!genus[&NameSpace::BiologicalProcess].contains_key(&99));
        assert!(!genus.contains_key(&NameSpace::MolecularFunction));
    }

    #[test]
    fn species_mapping_skips_missing_backgrounds() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("1_background.txt"), "p1\tGO:0000010\np2\tGO:0000030\n").unwrap();

        let lineage = lineage();
        let study = study_pop();
        let context = NetworkContext::new(&lineage, &study, dir.path(), EvidenceFilter::All);

        let mut tables = FxHashMap::default();
        tables.insert(
            "Species one".to_string(),
            EnrichmentTable::from_records([
                record(10, NameSpace::BiologicalProcess),
                record(30, NameSpace::MolecularFunction),
            ]),
        );
        tables.insert(
            "Species two".to_string(),
            EnrichmentTable::from_records([record(10, NameSpace::BiologicalProcess)]),
        );

        let network_data = assemble_species_networks(&context, &tables);
        assert_eq!(network_data.len(), 1);
        let species_one = &network_data["Species one"];
        assert_eq!(species_one[&NameSpace::BiologicalProcess][&10], protein_set(&["p1"]));
        assert_eq!(species_one[&NameSpace::MolecularFunction][&30], protein_set(&["p2"]));
    }

    #[test]
    fn namespaces_without_terms_are_skipped() {
        let mut mapping = BipartiteMapping::default();
        mapping
            .entry(NameSpace::BiologicalProcess)
            .or_default()
            .insert(10, protein_set(&["p1", "p2"]));
        mapping
            .entry(NameSpace::BiologicalProcess)
            .or_default()
            .insert(11, protein_set(&["p1", "p2", "p3"]));
        mapping.insert(NameSpace::MolecularFunction, GOTermToProteinSet::default());

        assert_eq!(
            empty_namespaces(&mapping),
            vec![NameSpace::MolecularFunction, NameSpace::CellularComponent]
        );

        let table = EnrichmentTable::from_records([
            record(10, NameSpace::BiologicalProcess),
            record(11, NameSpace::BiologicalProcess),
        ]);
        let networks = build_taxon_networks(&mapping, &table, 0.5).unwrap();
        assert_eq!(networks.len(), 1);
        assert!(networks.contains_key(&NameSpace::BiologicalProcess));

        let subnetworks = taxon_subnetworks(&networks, 0.0, 10);
        assert_eq!(subnetworks[&NameSpace::BiologicalProcess].len(), 1);
        assert!(!subnetworks.contains_key(&NameSpace::MolecularFunction));
        assert!(!subnetworks.contains_key(&NameSpace::CellularComponent));
    }

    #[test]
    fn merge_unions_without_duplicates() {
        let mut target = BipartiteMapping::default();
        let mut first = BipartiteMapping::default();
        first.entry(NameSpace::BiologicalProcess).or_default().insert(7, protein_set(&["p1", "p2"]));
        let mut second = BipartiteMapping::default();
        second.entry(NameSpace::BiologicalProcess).or_default().insert(7, protein_set(&["p2", "p3"]));

        merge_mapping(&mut target, first);
        merge_mapping(&mut target, second);
        assert_eq!(target[&NameSpace::BiologicalProcess][&7].len(), 3);
    }
}
