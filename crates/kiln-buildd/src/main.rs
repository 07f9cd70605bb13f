use std::{sync::Arc, time::Duration};

use anyhow::Context;
use kiln_api::EngineAdapter;
use kiln_core::{
    BuildSubscriber, CatalogSeed, ClassRouter, Engine, MemoryCatalog, Ports,
    spec::templates_from_json,
};
use kiln_exec::{ProcBuilder, ProcPusher};
use kiln_observe::{Journal, logger_init};
use kiln_prometheus::PrometheusMetrics;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

mod config;
mod scheduler;
mod server;

use config::DaemonConfig;
use scheduler::LogScheduler;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1) Config + logger
    let cfg = DaemonConfig::load()?;
    logger_init(&cfg.logger)?;
    info!(listen = %cfg.listen, "config loaded");

    // 2) Catalog + build classes
    let seed = match &cfg.catalog {
        Some(path) => {
            let raw = tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("reading catalog {}", path.display()))?;
            serde_json::from_str::<CatalogSeed>(&raw)
                .with_context(|| format!("parsing catalog {}", path.display()))?
        }
        None => {
            warn!("no catalog configured; every submission will be rejected");
            CatalogSeed::default()
        }
    };
    let mut classes = ClassRouter::with_builtins();
    if let Some(path) = &cfg.templates {
        let raw = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("reading templates {}", path.display()))?;
        for class in templates_from_json(&raw)
            .with_context(|| format!("parsing templates {}", path.display()))?
        {
            classes.register(Arc::new(class));
        }
    }

    // 3) Engine
    let metrics = Arc::new(PrometheusMetrics::new()?);
    let builder = ProcBuilder::new(cfg.builder.clone(), cfg.work_dir.clone());
    let pusher = ProcPusher::new(cfg.pusher.clone())
        .with_transient_exit_codes(cfg.push_transient_exit_codes.clone());
    let ports = Ports::in_memory(
        MemoryCatalog::from_seed(seed),
        Arc::new(builder),
        Arc::new(pusher),
        Arc::new(LogScheduler),
    );
    let engine = Engine::builder(ports)
        .config(cfg.build.clone())
        .classes(classes)
        .subscriber(Arc::new(Journal::new()))
        .subscriber(metrics.clone() as Arc<dyn BuildSubscriber>)
        .build()?;

    engine.recover().await?;

    // 4) Sweeper
    let shutdown = CancellationToken::new();
    let sweeper = tokio::spawn(engine.sweeper.clone().run(shutdown.clone()));

    // 5) HTTP
    let adapter = EngineAdapter::new(engine)
        .with_wait_timeout(Duration::from_millis(cfg.submit_wait_ms));
    let app = server::router(Arc::new(adapter), metrics);
    let listener = tokio::net::TcpListener::bind(cfg.listen)
        .await
        .with_context(|| format!("binding {}", cfg.listen))?;
    info!(addr = %cfg.listen, "kiln-buildd listening");

    let stop = shutdown.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "ctrl-c handler failed");
            }
            info!("shutting down...");
            stop.cancel();
        })
        .await?;

    shutdown.cancel();
    let _ = sweeper.await;
    info!("kiln-buildd stopped");
    Ok(())
}
