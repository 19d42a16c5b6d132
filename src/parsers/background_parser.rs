use rustc_hash::{FxHashMap, FxHashSet};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use compact_str::CompactString;
use lazy_static::lazy_static;
use regex::Regex;
use crate::error::{NetworkError, NetworkResult};

pub type TaxonID = u32;
pub type GOTermID = u32;
pub type Protein = Arc<CompactString>;
pub type GOTermToProteinSet = FxHashMap<GOTermID, FxHashSet<Protein>>;

lazy_static! {
    static ref GO_ID_REGEX: Regex = Regex::new(r"^GO:(\d{1,7})$").unwrap();
}

pub fn parse_go_id(input: &str) -> Option<GOTermID> {
    GO_ID_REGEX
        .captures(input.trim())
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

pub fn format_go_id(go_id: GOTermID) -> String {
    format!("GO:{:07}", go_id)
}

pub fn background_file_path(dir: impl AsRef<Path>, taxon_id: TaxonID) -> PathBuf {
    dir.as_ref().join(format!("{}_background.txt", taxon_id))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EvidenceCategory {
    Experimental,
    Phylogenetic,
    Computational,
    Author,
    Curator,
    Electronic,
}

impl EvidenceCategory {
    pub const ALL: [EvidenceCategory; 6] = [
        EvidenceCategory::Experimental,
        EvidenceCategory::Phylogenetic,
        EvidenceCategory::Computational,
        EvidenceCategory::Author,
        EvidenceCategory::Curator,
        EvidenceCategory::Electronic,
    ];

    pub fn from_code(code: &str) -> NetworkResult<Self> {
        match code {
            "EXP" | "IDA" | "IPI" | "IMP" | "IGI" | "IEP" | "HTP" | "HDA" | "HMP" | "HGI" | "HEP" => Ok(EvidenceCategory::Experimental),
            "IBA" | "IBD" | "IKR" | "IRD" => Ok(EvidenceCategory::Phylogenetic),
            "ISS" | "ISO" | "ISA" | "ISM" | "IGC" | "RCA" => Ok(EvidenceCategory::Computational),
            "TAS" | "NAS" => Ok(EvidenceCategory::Author),
            "IC" | "ND" => Ok(EvidenceCategory::Curator),
            "IEA" => Ok(EvidenceCategory::Electronic),
            _ => Err(NetworkError::UnknownEvidenceCode(code.to_string())),
        }
    }
}

/// Evidence categories accepted when a background row carries an evidence code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EvidenceFilter {
    All,
    Only(Vec<EvidenceCategory>),
}

impl Default for EvidenceFilter {
    fn default() -> Self {
        EvidenceFilter::All
    }
}

impl EvidenceFilter {
    /// Parses a comma separated list such as `experimental,phylogenetic` or `all`.
    pub fn parse(input: &str) -> NetworkResult<Self> {
        let parts: Vec<String> = input
            .to_lowercase()
            .split(',')
            .map(|part| part.trim().to_string())
            .filter(|part| !part.is_empty())
            .collect();

        if parts.iter().any(|part| part == "all") {
            return Ok(EvidenceFilter::All);
        }

        let mut categories = Vec::with_capacity(parts.len());
        for part in parts {
            let category = match part.as_str() {
                "experimental" => EvidenceCategory::Experimental,
                "phylogenetic" => EvidenceCategory::Phylogenetic,
                "computational" => EvidenceCategory::Computational,
                "author" => EvidenceCategory::Author,
                "curator" => EvidenceCategory::Curator,
                "electronic" => EvidenceCategory::Electronic,
                _ => return Err(NetworkError::InvalidConfig(format!(
                    "unrecognized evidence category '{}'; valid categories are: experimental, phylogenetic, computational, author, curator, electronic or all",
                    part
                ))),
            };
            if !categories.contains(&category) {
                categories.push(category);
            }
        }

        if categories.is_empty() {
            return Err(NetworkError::InvalidConfig(
                "no evidence categories provided".to_string(),
            ));
        }

        if categories.len() == EvidenceCategory::ALL.len() {
            Ok(EvidenceFilter::All)
        } else {
            Ok(EvidenceFilter::Only(categories))
        }
    }

    fn accepts(&self, code: Option<&str>) -> NetworkResult<bool> {
        match (self, code) {
            (EvidenceFilter::All, _) | (_, None) => Ok(true),
            (EvidenceFilter::Only(categories), Some(code)) => {
                let category = EvidenceCategory::from_code(code.trim())?;
                Ok(categories.contains(&category))
            }
        }
    }
}

/// GO term to protein associations of one species, limited to its study proteins.
#[derive(Debug, Default, Clone)]
pub struct BackgroundAssociation {
    pub go_term_to_proteins: GOTermToProteinSet,
}

impl BackgroundAssociation {
    pub fn read_background(
        path: impl AsRef<Path>,
        study_proteins: &FxHashSet<Protein>,
        evidence: &EvidenceFilter,
    ) -> NetworkResult<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| NetworkError::io(path, e))?;
        let reader = BufReader::with_capacity(128 * 1024, file);

        let mut go_term_to_proteins: GOTermToProteinSet = FxHashMap::default();

        for (index, line_result) in reader.lines().enumerate() {
            let line = line_result.map_err(|e| NetworkError::io(path, e))?;
            if line.trim().is_empty() {
                continue;
            }

            let malformed = |reason: String| NetworkError::MalformedBackground {
                path: path.to_path_buf(),
                line: index + 1,
                reason,
            };

            let parts: Vec<&str> = line.split('\t').collect();
            if parts.len() < 2 {
                return Err(malformed(format!(
                    "expected 'protein<TAB>GO term', found '{}'",
                    line
                )));
            }

            let go_id = parse_go_id(parts[1])
                .ok_or_else(|| malformed(format!("invalid GO term id '{}'", parts[1])))?;

            let accepted = evidence
                .accepts(parts.get(2).copied())
                .map_err(|e| malformed(e.to_string()))?;
            if !accepted {
                continue;
            }

            let key = CompactString::new(parts[0].trim());
            if let Some(protein) = study_proteins.get(&key) {
                go_term_to_proteins
                    .entry(go_id)
                    .or_insert_with(FxHashSet::default)
                    .insert(Arc::clone(protein));
            }
        }

        Ok(Self { go_term_to_proteins })
    }

    pub fn len(&self) -> usize {
        self.go_term_to_proteins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.go_term_to_proteins.is_empty()
    }
}
