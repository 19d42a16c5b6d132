use rustc_hash::{FxHashMap, FxHashSet};
use std::fs::{read_dir, File};
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use csv::Reader;
use compact_str::CompactString;
use log::{debug, warn};
use crate::error::{NetworkError, NetworkResult};
use crate::parsers::background_parser::*;
use crate::parsers::lineage_parser::Lineage;

const EXPECTED_STUDY_INPUT: &str =
    "a directory of FASTA files, a FASTA file (.fa/.fasta) or a CSV file (.csv)";

#[derive(Debug, Default, Clone)]
pub struct StudyPop {
    pub taxon_ids: Vec<TaxonID>,
    pub species_proteins: FxHashMap<String, FxHashSet<Protein>>,
}

enum StudyInput {
    FastaDir,
    Fasta,
    Csv,
}

fn is_fasta(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|s| s.to_str()),
        Some("fa") | Some("fasta")
    )
}

fn classify_input(path: &Path) -> NetworkResult<StudyInput> {
    if path.is_dir() {
        return Ok(StudyInput::FastaDir);
    }
    if path.is_file() {
        if is_fasta(path) {
            return Ok(StudyInput::Fasta);
        }
        if let Some("csv") = path.extension().and_then(|s| s.to_str()) {
            return Ok(StudyInput::Csv);
        }
    }
    Err(NetworkError::UnsupportedInput {
        path: path.to_path_buf(),
        expected: EXPECTED_STUDY_INPUT,
    })
}

impl StudyPop {
    pub fn read_study_pop(
        study_data: impl AsRef<Path>,
        lineage: &Lineage,
    ) -> NetworkResult<Self> {
        let path = study_data.as_ref();
        let mut study_pop = StudyPop::default();

        match classify_input(path)? {
            StudyInput::Csv => study_pop.add_csv_file(path, lineage)?,
            StudyInput::Fasta => study_pop.add_fasta_file(path, lineage)?,
            StudyInput::FastaDir => {
                let mut fasta_files: Vec<PathBuf> = read_dir(path)
                    .map_err(|e| NetworkError::io(path, e))?
                    .filter_map(Result::ok)
                    .map(|entry| entry.path())
                    .filter(|entry_path| entry_path.is_file() && is_fasta(entry_path))
                    .collect();
                fasta_files.sort();

                for fasta_file in &fasta_files {
                    study_pop.add_fasta_file(fasta_file, lineage)?;
                }
            }
        }

        debug!(
            "Read study population for {} taxa ({} species) from {}",
            study_pop.taxon_ids.len(),
            study_pop.species_proteins.len(),
            path.display()
        );
        Ok(study_pop)
    }

    pub fn proteins(&self, species_name: &str) -> Option<&FxHashSet<Protein>> {
        self.species_proteins.get(species_name)
    }

    fn add_proteins<'a, I>(&mut self, taxon_id: TaxonID, species_name: &str, proteins: I)
    where
        I: IntoIterator<Item = &'a str>,
    {
        if !self.taxon_ids.contains(&taxon_id) {
            self.taxon_ids.push(taxon_id);
        }
        let protein_set = self
            .species_proteins
            .entry(species_name.to_string())
            .or_insert_with(FxHashSet::default);
        for protein in proteins {
            protein_set.insert(Arc::new(CompactString::new(protein)));
        }
    }

    fn add_csv_file(&mut self, csv_file: &Path, lineage: &Lineage) -> NetworkResult<()> {
        let file = File::open(csv_file).map_err(|e| NetworkError::io(csv_file, e))?;
        let mut csv_reader = Reader::from_reader(file);

        let headers = csv_reader.headers()?.clone();
        let columns: Vec<Option<(TaxonID, String)>> = headers
            .iter()
            .map(|header| {
                let taxon_id = match header.trim().parse::<TaxonID>() {
                    Ok(id) => id,
                    Err(_) => {
                        warn!("Skipping CSV column '{}': not a taxon id", header);
                        return None;
                    }
                };
                match lineage.species_name(taxon_id) {
                    Some(species) => Some((taxon_id, species.to_string())),
                    None => {
                        warn!("Skipping taxon {}: not present in the lineage", taxon_id);
                        None
                    }
                }
            })
            .collect();

        let mut column_proteins: Vec<Vec<String>> = vec![Vec::new(); columns.len()];
        for result in csv_reader.records() {
            let record = result?;
            for (index, protein) in record.iter().enumerate() {
                let protein = protein.trim();
                if protein.is_empty() {
                    continue;
                }
                if let Some(Some(_)) = columns.get(index) {
                    column_proteins[index].push(protein.to_string());
                }
            }
        }

        for (column, proteins) in columns.iter().zip(column_proteins.iter()) {
            if let Some((taxon_id, species)) = column {
                self.add_proteins(*taxon_id, species, proteins.iter().map(String::as_str));
            }
        }
        Ok(())
    }

    fn add_fasta_file(&mut self, fasta_file: &Path, lineage: &Lineage) -> NetworkResult<()> {
        for (taxon_id, proteins) in parse_fasta_file(fasta_file)? {
            match lineage.species_name(taxon_id) {
                Some(species) => {
                    let species = species.to_string();
                    self.add_proteins(taxon_id, &species, proteins.iter().map(String::as_str));
                }
                None => warn!(
                    "Skipping taxon {} in {}: not present in the lineage",
                    taxon_id,
                    fasta_file.display()
                ),
            }
        }
        Ok(())
    }
}

/// Splits a FASTA-like study file into `(taxon id, protein ids)` records.
pub fn parse_fasta_file(fasta_file_path: impl AsRef<Path>) -> NetworkResult<Vec<(TaxonID, Vec<String>)>> {
    let path = fasta_file_path.as_ref();
    let file = File::open(path).map_err(|e| NetworkError::io(path, e))?;
    let reader = BufReader::with_capacity(128 * 1024, file);

    let mut records: Vec<(TaxonID, Vec<String>)> = Vec::new();

    for (index, line_result) in reader.lines().enumerate() {
        let line = line_result.map_err(|e| NetworkError::io(path, e))?;
        let trimmed_line = line.trim();
        if trimmed_line.is_empty() {
            continue;
        }

        if let Some(id_str) = trimmed_line.strip_prefix('>') {
            let taxon_id = id_str.trim().parse::<TaxonID>().map_err(|e| {
                NetworkError::MalformedStudyPopulation {
                    path: path.to_path_buf(),
                    line: index + 1,
                    reason: format!("failed to parse taxon id '{}': {}", id_str.trim(), e),
                }
            })?;
            records.push((taxon_id, Vec::new()));
        } else {
            match records.last_mut() {
                Some((_, proteins)) => proteins.push(trimmed_line.to_string()),
                None => {
                    return Err(NetworkError::MalformedStudyPopulation {
                        path: path.to_path_buf(),
                        line: index + 1,
                        reason: "protein listed before any '>' taxon header".to_string(),
                    })
                }
            }
        }
    }

    Ok(records)
}
