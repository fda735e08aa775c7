pub mod analyzers;
pub mod config;
pub mod error;
pub mod loaders;
pub mod output;
pub mod stats;
pub mod table;
pub mod time;
pub mod uid;
