pub mod classifier;
pub mod config;
pub mod db;
pub mod ingest;
pub mod logging;
pub mod panel;
pub mod resolver;
pub mod stats;
pub mod types;
pub mod workers;

pub const TARGET_DB: &str = "db_query";
pub const TARGET_INGEST: &str = "ingest";
pub const TARGET_CLASSIFIER: &str = "classifier";
pub const TARGET_RESOLVER: &str = "resolver";
pub const TARGET_PANEL: &str = "panel";
