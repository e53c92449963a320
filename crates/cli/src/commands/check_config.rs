use rmx_config::LoadedConfig;

/// Print the effective configuration and where it came from
pub fn execute(loaded: &LoadedConfig) -> eyre::Result<()> {
    for source in &loaded.sources {
        eprintln!("source: {source:?}");
    }
    println!("{}", serde_json::to_string_pretty(&loaded.config)?);
    Ok(())
}
