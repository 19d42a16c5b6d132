use rustc_hash::{FxHashMap, FxHashSet};
use std::cmp::Reverse;
use petgraph::visit::Bfs;
use crate::analysis::term_network::TermNetwork;
use crate::parsers::{
    background_parser::GOTermID,
    enrichment_parser::{EnrichmentTable, NameSpace},
};

/// Copy of `network` without the terms whose log(Odds Ratio) is at or below
/// `enrichment_threshold`. Node order of the source graph is preserved.
pub fn filter_by_enrichment(network: &TermNetwork, enrichment_threshold: f64) -> TermNetwork {
    let mut filtered = TermNetwork::default();
    for go_id in network.terms() {
        if let Some(log_odds_ratio) = network.log_odds_ratio(go_id) {
            if log_odds_ratio > enrichment_threshold {
                filtered.add_term(go_id, log_odds_ratio);
            }
        }
    }
    for (term1, term2, &weight) in network.graph.all_edges() {
        if filtered.graph.contains_node(term1) && filtered.graph.contains_node(term2) {
            filtered.graph.add_edge(term1, term2, weight);
        }
    }
    filtered
}

/// Connected components in order of discovery.
pub fn connected_components(network: &TermNetwork) -> Vec<Vec<GOTermID>> {
    let mut seen: FxHashSet<GOTermID> = FxHashSet::default();
    let mut components = Vec::new();

    for start in network.terms() {
        if seen.contains(&start) {
            continue;
        }
        let mut component = Vec::new();
        let mut bfs = Bfs::new(&network.graph, start);
        while let Some(go_id) = bfs.next(&network.graph) {
            seen.insert(go_id);
            component.push(go_id);
        }
        components.push(component);
    }

    components
}

fn induced_subnetwork(network: &TermNetwork, members: &[GOTermID]) -> TermNetwork {
    let mut subnetwork = TermNetwork::default();
    let mut sorted_members = members.to_vec();
    sorted_members.sort_unstable();

    for &go_id in &sorted_members {
        if let Some(log_odds_ratio) = network.log_odds_ratio(go_id) {
            subnetwork.add_term(go_id, log_odds_ratio);
        }
    }
    for &go_id in &sorted_members {
        for (source, target, &weight) in network.graph.edges(go_id) {
            if source < target && subnetwork.graph.contains_node(target) {
                subnetwork.graph.add_edge(source, target, weight);
            }
        }
    }
    subnetwork
}

/// Largest connected groups of enriched terms. Components of a single term
/// are dropped; equal sizes are ordered by their smallest GO term id.
pub fn top_subnetworks(
    network: &TermNetwork,
    enrichment_threshold: f64,
    max_count: usize,
) -> Vec<TermNetwork> {
    let filtered = filter_by_enrichment(network, enrichment_threshold);

    let mut components: Vec<Vec<GOTermID>> = connected_components(&filtered)
        .into_iter()
        .filter(|component| component.len() > 1)
        .collect();

    components.sort_by_key(|component| {
        let smallest = component.iter().min().copied().unwrap_or(GOTermID::MAX);
        (Reverse(component.len()), smallest)
    });

    components
        .iter()
        .take(max_count)
        .map(|members| induced_subnetwork(&filtered, members))
        .collect()
}

pub fn taxon_subnetworks(
    networks: &FxHashMap<NameSpace, TermNetwork>,
    enrichment_threshold: f64,
    max_count: usize,
) -> FxHashMap<NameSpace, Vec<TermNetwork>> {
    networks
        .iter()
        .map(|(namespace, network)| {
            (*namespace, top_subnetworks(network, enrichment_threshold, max_count))
        })
        .collect()
}

/// Records, on each enrichment row, the rank of the subnetwork that holds it.
pub fn annotate_subnetworks(
    table: &mut EnrichmentTable,
    subnetworks: &FxHashMap<NameSpace, Vec<TermNetwork>>,
) {
    for (namespace, ranked) in subnetworks {
        for (rank, subnetwork) in ranked.iter().enumerate() {
            for go_id in subnetwork.terms() {
                if let Some(record) = table.get_mut(&go_id) {
                    if record.namespace == *namespace {
                        record.subnetwork = Some(rank + 1);
                    }
                }
            }
        }
    }
}
