use clap::Subcommand;
use rmx_config::{ConfigSource, LoadedConfig};
use rmx_core::Result;

pub mod check_config;
pub mod serve;

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Commands {
    /// Run the exporter (default)
    Serve,

    /// Load and validate the configuration, then print it as JSON
    CheckConfig,
}

impl Commands {
    pub async fn execute(self, loaded: LoadedConfig) -> eyre::Result<()> {
        match self {
            Commands::Serve => serve::execute(loaded).await,
            Commands::CheckConfig => check_config::execute(&loaded),
        }
    }
}

/// Apply command-line flags on top of a loaded configuration
pub fn apply_cli_overrides(
    loaded: &mut LoadedConfig,
    address: Option<String>,
    log_level: Option<String>,
) -> Result<()> {
    if address.is_none() && log_level.is_none() {
        return Ok(());
    }

    if let Some(address) = address {
        loaded.config.server.address = address;
    }
    if let Some(level) = log_level {
        loaded.config.logging.level = level;
    }
    loaded.sources.push(ConfigSource::CommandLine);
    loaded.config.validate()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rmx_config::Config;

    fn loaded() -> LoadedConfig {
        LoadedConfig {
            config: Config::default(),
            sources: vec![ConfigSource::Default],
        }
    }

    #[test]
    fn test_flags_override_loaded_config() {
        let mut loaded = loaded();
        apply_cli_overrides(
            &mut loaded,
            Some("127.0.0.1:9000".to_string()),
            Some("debug".to_string()),
        )
        .unwrap();

        assert_eq!(loaded.config.server.address, "127.0.0.1:9000");
        assert_eq!(loaded.config.logging.level, "debug");
        assert_eq!(loaded.sources.last(), Some(&ConfigSource::CommandLine));
    }

    #[test]
    fn test_no_flags_leave_sources_alone() {
        let mut loaded = loaded();
        apply_cli_overrides(&mut loaded, None, None).unwrap();
        assert_eq!(loaded.sources, vec![ConfigSource::Default]);
    }

    #[test]
    fn test_invalid_flag_is_rejected() {
        let mut loaded = loaded();
        assert!(apply_cli_overrides(&mut loaded, None, Some("loud".to_string())).is_err());
    }
}
