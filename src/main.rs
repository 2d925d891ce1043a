//! Collector binary entrypoint: wires the configuration watcher to the
//! Manager, starts the query API, and exits cleanly on signal (spec §1,
//! translating the original's `server/main.go` wiring).

use std::net::SocketAddr;
use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use profcollect::collector::Manager;
use profcollect::config::loader::ConfigWatcher;
use profcollect::store::moka_store::MokaStore;
use profcollect::store::ProfileStore;

/// Continuous profiling collector.
#[derive(Debug, Parser)]
#[command(name = "profcollect", about = "Continuous profiling collector")]
struct Cli {
    /// Collector configuration file path.
    #[arg(long, default_value = "./conf/profcollect.yml")]
    config_path: String,

    /// Address the query API binds to.
    #[arg(long, default_value = "0.0.0.0:8080")]
    bind_addr: SocketAddr,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("profcollect=info".parse()?))
        .init();

    let cli = Cli::parse();
    tracing::info!(config_path = %cli.config_path, bind_addr = %cli.bind_addr, "flag parse");

    let store: Arc<dyn ProfileStore> = Arc::new(MokaStore::new());
    let manager = Arc::new(Manager::new(store.clone()));

    let reload_manager = manager.clone();
    let _watcher = ConfigWatcher::watch(&cli.config_path, move |config| {
        let manager = reload_manager.clone();
        async move {
            tracing::info!("config change, reload collector");
            manager.load(config).await;
        }
    })
    .await?;

    let app = profcollect::api::router(store.clone());
    let listener = tokio::net::TcpListener::bind(cli.bind_addr).await?;
    tracing::info!(addr = %cli.bind_addr, "api server listening");

    tokio::select! {
        result = axum::serve(listener, app) => {
            if let Err(err) = result {
                tracing::error!(error = %err, "api server error");
            }
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("signal received, exiting");
        }
    }

    manager.stop().await;
    store.close().await;
    tracing::info!("collector exit");
    Ok(())
}
