pub mod parsers {
    pub mod background_parser;
    pub mod enrichment_parser;
    pub mod lineage_parser;
    pub mod study_parser;
}

pub mod analysis {
    pub mod coordinator;
    pub mod network_assembly;
    pub mod subnetworks;
    pub mod term_network;
    pub mod write_results;
}

pub mod config;
pub mod error;
