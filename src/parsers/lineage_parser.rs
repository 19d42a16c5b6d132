use rustc_hash::{FxHashMap, FxHashSet};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use log::debug;
use strum::IntoEnumIterator;
use strum_macros::{Display, EnumIter, EnumString};
use crate::error::{NetworkError, NetworkResult};
use crate::parsers::background_parser::TaxonID;

pub type TaxonGroups = FxHashMap<String, Vec<TaxonID>>;

const LINEAGE_COLUMNS: usize = 9;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, EnumString, Display)]
#[strum(ascii_case_insensitive)]
pub enum TaxonomicRank {
    Species,
    Genus,
    Family,
    Order,
    Class,
    Phylum,
    Kingdom,
    Superkingdom,
}

impl TaxonomicRank {
    fn index(self) -> usize {
        self as usize
    }
}

/// Rank names of a single taxon, ordered from species up to superkingdom.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaxonLineage {
    ranks: [String; 8],
}

impl TaxonLineage {
    pub fn new(ranks: [String; 8]) -> Self {
        Self { ranks }
    }

    pub fn rank(&self, rank: TaxonomicRank) -> &str {
        &self.ranks[rank.index()]
    }

    pub fn species(&self) -> &str {
        self.rank(TaxonomicRank::Species)
    }

    pub fn iter(&self) -> impl Iterator<Item = (TaxonomicRank, &str)> {
        TaxonomicRank::iter().map(move |rank| (rank, self.rank(rank)))
    }
}

#[derive(Debug, Clone, Default)]
pub struct Lineage {
    taxa: FxHashMap<TaxonID, TaxonLineage>,
}

impl Lineage {
    pub fn read_lineage<P: AsRef<Path>>(path: P) -> NetworkResult<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| NetworkError::io(path, e))?;
        let reader = BufReader::with_capacity(32 * 1024, file);
        let mut taxa = FxHashMap::default();

        for (index, line) in reader.lines().enumerate().skip(1) {
            let line = line.map_err(|e| NetworkError::io(path, e))?;
            if line.trim().is_empty() {
                continue;
            }
            let line_number = index + 1;
            let fields: Vec<&str> = line.split('\t').collect();

            if fields.len() < LINEAGE_COLUMNS {
                return Err(NetworkError::MalformedLineage {
                    path: path.to_path_buf(),
                    line: line_number,
                    reason: format!(
                        "expected {} tab-separated fields, found {}",
                        LINEAGE_COLUMNS,
                        fields.len()
                    ),
                });
            }

            let taxon_id = fields[0].trim().parse::<TaxonID>().map_err(|e| {
                NetworkError::MalformedLineage {
                    path: path.to_path_buf(),
                    line: line_number,
                    reason: format!("invalid taxon id '{}': {}", fields[0], e),
                }
            })?;

            let ranks: [String; 8] =
                std::array::from_fn(|i| fields[i + 1].trim().to_string());
            taxa.insert(taxon_id, TaxonLineage::new(ranks));
        }

        debug!("Read lineage for {} taxa from {}", taxa.len(), path.display());
        Ok(Self { taxa })
    }

    pub fn insert(&mut self, taxon_id: TaxonID, lineage: TaxonLineage) {
        self.taxa.insert(taxon_id, lineage);
    }

    pub fn get(&self, taxon_id: TaxonID) -> Option<&TaxonLineage> {
        self.taxa.get(&taxon_id)
    }

    pub fn len(&self) -> usize {
        self.taxa.len()
    }

    pub fn is_empty(&self) -> bool {
        self.taxa.is_empty()
    }

    pub fn species_name(&self, taxon_id: TaxonID) -> Option<&str> {
        self.get(taxon_id).map(TaxonLineage::species)
    }

    pub fn rank_name(&self, taxon_id: TaxonID, rank: TaxonomicRank) -> Option<&str> {
        self.get(taxon_id).map(|lineage| lineage.rank(rank))
    }

    fn sorted_taxon_ids(&self) -> Vec<TaxonID> {
        let mut ids: Vec<TaxonID> = self.taxa.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Assigns each taxon to the first requested name met while walking its
    /// ranks from species upwards. Every requested name gets an entry.
    pub fn group_taxa_by_name<S: AsRef<str>>(&self, names: &[S]) -> TaxonGroups {
        let wanted: FxHashSet<&str> = names.iter().map(|name| name.as_ref()).collect();
        let mut groups: TaxonGroups = names
            .iter()
            .map(|name| (name.as_ref().to_string(), Vec::new()))
            .collect();

        for taxon_id in self.sorted_taxon_ids() {
            let lineage = &self.taxa[&taxon_id];
            if let Some((_, name)) = lineage.iter().find(|(_, name)| wanted.contains(name)) {
                if let Some(members) = groups.get_mut(name) {
                    members.push(taxon_id);
                }
            }
        }

        groups
    }

    pub fn taxa_at_rank(&self, taxon_ids: &[TaxonID], rank: TaxonomicRank) -> TaxonGroups {
        let mut ids = taxon_ids.to_vec();
        ids.sort_unstable();
        ids.dedup();

        let mut grouped: TaxonGroups = FxHashMap::default();
        for taxon_id in ids {
            if let Some(level_name) = self.rank_name(taxon_id, rank) {
                grouped
                    .entry(level_name.to_string())
                    .or_default()
                    .push(taxon_id);
            }
        }
        grouped
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::io::Write;
    use std::str::FromStr;
    use tempfile::NamedTempFile;

    const HEADER: &str = "Taxon ID\tSpecies\tGenus\tFamily\tOrder\tClass\tPhylum\tKingdom\tSuperkingdom\n";

    fn lineage_file(rows: &[&str]) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(HEADER.as_bytes()).unwrap();
        for row in rows {
            writeln!(file, "{}", row).unwrap();
        }
        file
    }

    fn sample_lineage() -> Lineage {
        let file = lineage_file(&[
            "562\tEscherichia coli\tEscherichia\tEnterobacteriaceae\tEnterobacterales\tGammaproteobacteria\tPseudomonadota\tPseudomonadati\tBacteria",
            "28901\tSalmonella enterica\tSalmonella\tEnterobacteriaceae\tEnterobacterales\tGammaproteobacteria\tPseudomonadota\tPseudomonadati\tBacteria",
            "287\tPseudomonas aeruginosa\tPseudomonas\tPseudomonadaceae\tPseudomonadales\tGammaproteobacteria\tPseudomonadota\tPseudomonadati\tBacteria",
        ]);
        Lineage::read_lineage(file.path()).unwrap()
    }

    #[test]
    fn reads_rank_names() {
        let lineage = sample_lineage();
        assert_eq!(lineage.len(), 3);
        assert_eq!(lineage.species_name(562), Some("Escherichia coli"));
        assert_eq!(lineage.rank_name(287, TaxonomicRank::Family), Some("Pseudomonadaceae"));
        assert_eq!(lineage.rank_name(287, TaxonomicRank::Superkingdom), Some("Bacteria"));
        assert!(lineage.get(9606).is_none());
    }

    #[test]
    fn short_row_is_rejected() {
        let file = lineage_file(&["562\tEscherichia coli\tEscherichia"]);
        match Lineage::read_lineage(file.path()) {
            Err(NetworkError::MalformedLineage { line, .. }) => assert_eq!(line, 2),
            other => panic!("expected MalformedLineage, got {:?}", other),
        }
    }

    #[test]
    fn missing_file_reports_path() {
        let err = Lineage::read_lineage("/nonexistent/lineage.txt").unwrap_err();
        assert!(err.to_string().contains("/nonexistent/lineage.txt"));
    }

    #[test]
    fn groups_by_first_matching_rank() {
        let lineage = sample_lineage();
        let groups = lineage.group_taxa_by_name(&[
            "Enterobacteriaceae",
            "Gammaproteobacteria",
            "Firmicutes",
        ]);

        assert_eq!(groups["Enterobacteriaceae"], vec![562, 28901]);
        assert_eq!(groups["Gammaproteobacteria"], vec![287]);
        assert!(groups["Firmicutes"].is_empty());
    }

    #[test]
    fn species_name_wins_over_higher_ranks() {
        let lineage = sample_lineage();
        let groups = lineage.group_taxa_by_name(&["Bacteria", "Escherichia coli"]);
        assert_eq!(groups["Escherichia coli"], vec![562]);
        assert_eq!(groups["Bacteria"], vec![287, 28901]);
    }

    #[test]
    fn groups_requested_taxa_at_rank() {
        let lineage = sample_lineage();
        let grouped = lineage.taxa_at_rank(&[28901, 562, 287, 1], TaxonomicRank::Family);
        assert_eq!(grouped["Enterobacteriaceae"], vec![562, 28901]);
        assert_eq!(grouped["Pseudomonadaceae"], vec![287]);
        assert_eq!(grouped.len(), 2);
    }

    #[test]
    fn rank_parses_case_insensitively() {
        assert_eq!(TaxonomicRank::from_str("genus").unwrap(), TaxonomicRank::Genus);
        assert_eq!(TaxonomicRank::from_str("SUPERKINGDOM").unwrap(), TaxonomicRank::Superkingdom);
        assert!(TaxonomicRank::from_str("tribe").is_err());
    }
}
