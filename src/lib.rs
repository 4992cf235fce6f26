pub mod canonicalize;
pub mod composite_rank;
pub mod config;
pub mod export;
pub mod logging;
pub mod merge;
pub mod model;
pub mod pipeline;
pub mod source_tables;
pub mod team_alias;
