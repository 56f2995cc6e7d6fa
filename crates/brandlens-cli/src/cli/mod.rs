mod config;

pub use config::CliConfig;
