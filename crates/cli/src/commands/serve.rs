use crate::app::App;
use crate::server;
use rmx_config::LoadedConfig;
use std::sync::Arc;

pub async fn execute(loaded: LoadedConfig) -> eyre::Result<()> {
    rmx_utils::init(&loaded.config.logging)?;
    for source in &loaded.sources {
        tracing::debug!(?source, "Configuration source");
    }

    let shutdown = rmx_utils::shutdown_token();
    let app = Arc::new(App::build(loaded.config, shutdown.clone())?);
    let background = app.spawn_background();

    let result = server::serve(Arc::clone(&app)).await;

    // Stop background tasks even when the server failed to start
    shutdown.cancel();
    for handle in background {
        if let Err(e) = handle.await {
            tracing::warn!(error = %e, "Background task ended abnormally");
        }
    }

    result?;
    tracing::info!("Exporter stopped");
    Ok(())
}
