use jemallocator::Jemalloc;

#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

use clap::Parser;
use std::env::var;
use std::path::PathBuf;
use std::process::ExitCode;
use dirs::home_dir;
use log::{error, info, warn};
use rustc_hash::FxHashSet;

use taxago_networks::config::NetworkConfig;
use taxago_networks::parsers::{
    background_parser::EvidenceFilter,
    enrichment_parser::{read_enrichment_results, ResultLevel},
    lineage_parser::{Lineage, TaxonomicRank},
    study_parser::StudyPop,
};
use taxago_networks::analysis::{
    coordinator::Coordinator,
    network_assembly::{assemble_species_networks, assemble_taxonomy_networks, NetworkContext},
    subnetworks::annotate_subnetworks,
    write_results::write_network_results,
};

fn get_default_asset_path(filename: &str) -> Option<PathBuf> {
    let cargo_home = match var("CARGO_HOME") {
        Ok(path) => PathBuf::from(path),
        Err(_) => home_dir()?.join(".cargo"),
    };
    Some(cargo_home.join("taxago_assets").join(filename))
}

#[derive(Parser, Debug)]
#[command(name = "taxago-networks", about, version, author)]
struct CliArgs {
    #[arg(
        short = 'i',
        long = "results-dir",
        value_name = "DIRECTORY",
        help = "Directory holding the enrichment results (single_taxon_results or combined_taxonomy_results).",
        required = true
    )]
    results_dir: PathBuf,

    #[arg(
        short = 's',
        long = "study",
        value_name = "FILE_OR_DIR",
        help = "Directory containing study population for each taxon in FASTA format or CSV file with the study population for each species.",
        required = true
    )]
    study_pop: PathBuf,

    #[arg(
        short = 'b',
        long = "background",
        value_name = "DIRECTORY",
        help = "Directory containing background populations.",
    )]
    background_pop: Option<PathBuf>,

    #[arg(
        long = "lineage",
        value_name = "FILE",
        help = "Path to the taxonomic lineage file.",
    )]
    lineage: Option<PathBuf>,

    #[arg(
        short = 'g',
        long = "group-results",
        value_name = "TAXONOMIC_LEVEL",
        help = "Build networks for the combined results at the specified taxonomic level instead of single taxa.",
    )]
    combine_results: Option<TaxonomicRank>,

    #[arg(
        short = 'e',
        long = "evidence",
        value_name = "CATEGORY",
        help = "Evidence code categories to parse in background associations. [possible values: all, experimental, phylogenetic, computational, author, curator, electronic]",
        default_value = "all"
    )]
    evidence_categories: String,

    #[arg(
        short = 'j',
        long = "similarity",
        value_name = "THRESHOLD",
        help = "Minimum Jaccard index for two GO terms to be connected.",
        default_value_t = 0.5
    )]
    similarity_threshold: f64,

    #[arg(
        short = 'r',
        long = "min-score",
        value_name = "SCORE",
        help = "GO terms must have a log(odds ratio) above this value to be part of a subnetwork.",
        default_value_t = 0.0
    )]
    min_odds_ratio: f64,

    #[arg(
        short = 'n',
        long = "max-subnetworks",
        value_name = "COUNT",
        help = "Maximum number of subnetworks kept per taxon and namespace.",
        default_value_t = 10
    )]
    max_subnetworks: usize,

    #[arg(
        long = "cores",
        value_name = "NUMBER",
        help = "Number of cores to use for the analysis. Uses all available by default.",
        default_value_t = num_cpus::get()
    )]
    num_cores: usize,

    #[arg(
        long = "reserve-cores",
        value_name = "NUMBER",
        help = "Number of cores to leave free for other processes.",
        default_value_t = 0
    )]
    reserved_cores: usize,

    #[arg(
        short = 'd',
        long = "dir",
        value_name = "DIRECTORY",
        help = "Directory to write the subnetworks to.",
        required = true
    )]
    output_dir: PathBuf,
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli_args: CliArgs = CliArgs::parse();

    let evidence = match EvidenceFilter::parse(&cli_args.evidence_categories) {
        Ok(evidence) => evidence,
        Err(e) => {
            error!("Error parsing evidence categories '{}': {}", cli_args.evidence_categories, e);
            return ExitCode::FAILURE;
        }
    };

    let config = NetworkConfig {
        similarity_threshold: cli_args.similarity_threshold,
        enrichment_threshold: cli_args.min_odds_ratio,
        max_subnetworks: cli_args.max_subnetworks,
        num_workers: cli_args.num_cores,
        reserved_cores: cli_args.reserved_cores,
        evidence,
    };
    if let Err(e) = config.validate() {
        error!("{}", e);
        return ExitCode::FAILURE;
    }

    let lineage_path = match cli_args.lineage.or_else(|| get_default_asset_path("lineage.txt")) {
        Some(path) => path,
        None => {
            error!("Could not determine the default lineage location; pass --lineage");
            return ExitCode::FAILURE;
        }
    };
    let background_dir = match cli_args.background_pop.or_else(|| get_default_asset_path("background_pop")) {
        Some(path) => path,
        None => {
            error!("Could not determine the default background directory; pass --background");
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = rayon::ThreadPoolBuilder::new()
        .num_threads(config.worker_count())
        .build_global()
    {
        warn!("Failed to initialize Rayon global thread pool: {}", e);
    }

    info!("Reading taxonomic lineage from: {}", lineage_path.display());
    let lineage = match Lineage::read_lineage(&lineage_path) {
        Ok(lineage) => lineage,
        Err(e) => {
            error!("{}", e);
            return ExitCode::FAILURE;
        }
    };

    info!("Reading study populations from: {}", cli_args.study_pop.display());
    let study_pop = match StudyPop::read_study_pop(&cli_args.study_pop, &lineage) {
        Ok(study_pop) if !study_pop.taxon_ids.is_empty() => study_pop,
        Ok(_) => {
            error!("No study population data could be loaded from '{}'", cli_args.study_pop.display());
            return ExitCode::FAILURE;
        }
        Err(e) => {
            error!("{}", e);
            return ExitCode::FAILURE;
        }
    };

    let level = match cli_args.combine_results {
        Some(_) => ResultLevel::Taxonomy,
        None => ResultLevel::Species,
    };
    info!("Reading enrichment results from: {}", cli_args.results_dir.display());
    let mut tables = match read_enrichment_results(&cli_args.results_dir, level) {
        Ok(tables) => tables,
        Err(e) => {
            error!("{}", e);
            return ExitCode::FAILURE;
        }
    };

    info!("Reading background populations from: {}", background_dir.display());
    let context = NetworkContext::new(&lineage, &study_pop, &background_dir, config.evidence.clone());
    let network_data = match cli_args.combine_results {
        None => assemble_species_networks(&context, &tables),
        Some(rank) => {
            let expected: FxHashSet<String> = lineage
                .taxa_at_rank(&study_pop.taxon_ids, rank)
                .into_keys()
                .collect();
            let mut names: Vec<&String> = tables.keys().collect();
            names.sort();
            for name in names.iter().filter(|name| !expected.contains(name.as_str())) {
                warn!("{} is not a {} of any study taxon", name, rank);
            }
            let groups = lineage.group_taxa_by_name(&names);
            assemble_taxonomy_networks(&context, &tables, &groups)
        }
    };
    info!("Assembled GO term-protein mappings for {} taxa", network_data.len());

    let coordinator = match Coordinator::new(config.worker_count()) {
        Ok(coordinator) => coordinator,
        Err(e) => {
            error!("{}", e);
            return ExitCode::FAILURE;
        }
    };
    let run = coordinator.run(&network_data, &tables, &config);

    for (taxon, subnetworks) in &run.subnetworks {
        if let Some(table) = tables.get_mut(taxon) {
            annotate_subnetworks(table, subnetworks);
        }
    }

    match write_network_results(&run.subnetworks, &tables, &cli_args.output_dir) {
        Ok(written) => info!("Wrote {} subnetwork files", written),
        Err(e) => {
            error!("Error writing subnetworks: {}", e);
            return ExitCode::FAILURE;
        }
    }

    if !run.failures.is_empty() {
        warn!("Finished with {} failed taxa", run.failures.len());
    }
    ExitCode::SUCCESS
}
