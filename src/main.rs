use std::sync::Arc;

use questup::{
    App, AppHandle, Config,
    app::now_fixed_offset,
    notify::LocalNotifier,
    store::{FileKv, Persistence},
};
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "failed to listen for ctrl-c");
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::from_env();
    init_tracing(config.log_json);

    let kv = Arc::new(FileKv::new(&config.data_dir));
    let notifier = Arc::new(LocalNotifier::new(config.notifications));
    let app = App::open(Persistence::new(kv), notifier, now_fixed_offset());
    let handle = AppHandle::new(app);

    let listener = tokio::net::TcpListener::bind(config.bind).await?;

    // Print the link to the server
    info!(addr = %config.bind, data_dir = %config.data_dir.display(), "QuestUp running");
    info!("API base: http://{}/api", config.bind);

    axum::serve(listener, questup::router(handle))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("shut down cleanly");
    Ok(())
}
