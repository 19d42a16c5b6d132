use rustc_hash::{FxHashMap, FxHashSet};
use itertools::Itertools;
use petgraph::graphmap::UnGraphMap;
use strum::IntoEnumIterator;
use crate::analysis::network_assembly::BipartiteMapping;
use crate::error::{NetworkError, NetworkResult};
use crate::parsers::{
    background_parser::*,
    enrichment_parser::{EnrichmentTable, NameSpace},
};

pub type JaccardIndex = f64;
pub type GoTermNetworkGraph = UnGraphMap<GOTermID, JaccardIndex>;

/// Term-term similarity graph. Nodes carry their log(Odds Ratio).
#[derive(Debug, Clone, Default)]
pub struct TermNetwork {
    pub graph: GoTermNetworkGraph,
    pub log_odds_ratios: FxHashMap<GOTermID, f64>,
}

impl TermNetwork {
    pub fn add_term(&mut self, go_id: GOTermID, log_odds_ratio: f64) {
        self.graph.add_node(go_id);
        self.log_odds_ratios.insert(go_id, log_odds_ratio);
    }

    pub fn log_odds_ratio(&self, go_id: GOTermID) -> Option<f64> {
        self.log_odds_ratios.get(&go_id).copied()
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    pub fn terms(&self) -> impl Iterator<Item = GOTermID> + '_ {
        self.graph.nodes()
    }

    /// Edges as `(smaller id, larger id, weight)`, sorted.
    pub fn sorted_edges(&self) -> Vec<(GOTermID, GOTermID, JaccardIndex)> {
        self.graph
            .all_edges()
            .map(|(a, b, &w)| if a < b { (a, b, w) } else { (b, a, w) })
            .sorted_by(|x, y| (x.0, x.1).cmp(&(y.0, y.1)))
            .collect()
    }
}

/// Four decimals, halves rounded away from zero (`1/32` gives `0.0313`).
pub fn round_similarity(value: f64) -> JaccardIndex {
    (value * 10_000.0).round() / 10_000.0
}

/// `min/max` of the set sizes never underestimates the Jaccard index.
/// Rounded like the weights, so a pair whose rounded similarity would reach
/// the threshold is never dropped here.
pub fn similarity_upper_bound(size1: usize, size2: usize) -> f64 {
    if size1 == 0 || size2 == 0 {
        return 0.0;
    }
    round_similarity(size1.min(size2) as f64 / size1.max(size2) as f64)
}

pub fn jaccard_similarity(
    proteins1: &FxHashSet<Protein>,
    proteins2: &FxHashSet<Protein>,
) -> Option<JaccardIndex> {
    let (smaller, larger) = if proteins1.len() <= proteins2.len() {
        (proteins1, proteins2)
    } else {
        (proteins2, proteins1)
    };
    let intersection_size = smaller.iter().filter(|p| larger.contains(*p)).count();
    if intersection_size == 0 {
        return None;
    }
    let union_size = proteins1.len() + proteins2.len() - intersection_size;
    Some(round_similarity(intersection_size as f64 / union_size as f64))
}

/// Unordered term pairs that share at least one protein.
fn candidate_pairs(term_proteins: &FxHashMap<GOTermID, &FxHashSet<Protein>>) -> FxHashSet<(GOTermID, GOTermID)> {
    let mut protein_to_terms: FxHashMap<&Protein, Vec<GOTermID>> = FxHashMap::default();
    for (&term_id, proteins) in term_proteins {
        for protein in proteins.iter() {
            protein_to_terms.entry(protein).or_default().push(term_id);
        }
    }

    let mut pairs: FxHashSet<(GOTermID, GOTermID)> = FxHashSet::default();
    for terms_sharing_protein in protein_to_terms.values_mut() {
        if terms_sharing_protein.len() < 2 {
            continue;
        }
        terms_sharing_protein.sort_unstable();
        for (&term1, &term2) in terms_sharing_protein.iter().tuple_combinations() {
            pairs.insert((term1, term2));
        }
    }
    pairs
}

pub fn build_term_network(
    term_to_proteins: &GOTermToProteinSet,
    table: &EnrichmentTable,
    threshold: f64,
) -> NetworkResult<TermNetwork> {
    let mut network = TermNetwork::default();

    let mut node_terms: Vec<GOTermID> = term_to_proteins
        .keys()
        .copied()
        .filter(|go_id| table.contains(go_id))
        .collect();
    node_terms.sort_unstable();

    let mut term_proteins: FxHashMap<GOTermID, &FxHashSet<Protein>> = FxHashMap::default();
    for go_id in node_terms {
        let log_odds_ratio = table.get(&go_id).map_or(f64::NAN, |record| record.log_odds_ratio);
        if !log_odds_ratio.is_finite() {
            return Err(NetworkError::InvalidEnrichmentScore {
                go_id,
                value: log_odds_ratio,
            });
        }
        network.add_term(go_id, log_odds_ratio);
        term_proteins.insert(go_id, &term_to_proteins[&go_id]);
    }

    for (term1, term2) in candidate_pairs(&term_proteins) {
        let proteins1 = term_proteins[&term1];
        let proteins2 = term_proteins[&term2];

        if similarity_upper_bound(proteins1.len(), proteins2.len()) < threshold {
            continue;
        }

        if let Some(similarity) = jaccard_similarity(proteins1, proteins2) {
            if similarity >= threshold {
                network.graph.add_edge(term1, term2, similarity);
            }
        }
    }

    Ok(network)
}

/// One graph per namespace holding enriched terms. Namespaces without any
/// are left out of the result.
pub fn build_taxon_networks(
    mapping: &BipartiteMapping,
    table: &EnrichmentTable,
    threshold: f64,
) -> NetworkResult<FxHashMap<NameSpace, TermNetwork>> {
    NameSpace::iter()
        .filter_map(|namespace| {
            mapping
                .get(&namespace)
                .filter(|terms| !terms.is_empty())
                .map(|terms| (namespace, terms))
        })
        .map(|(namespace, terms)| {
            build_term_network(terms, table, threshold).map(|network| (namespace, network))
        })
        .collect()
}
