use anyhow::Context;
use docpipe::{api, config, gate, logging, processing, queue, storage, trigger};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = config::init_config().context("Failed to load configuration")?;
    logging::init_tracing();

    let pipeline = processing::PipelineService::from_config(&config)
        .context("Failed to initialize pipeline")?;
    let ingestion = trigger::IngestionService::new(
        gate::FileTypeGate::from_config(&config),
        Arc::new(storage::LocalBlobStore::under(&config.storage_root)),
        Arc::new(queue::LocalQueue::under(&config.storage_root)),
        pipeline.metrics(),
    );

    let shutdown = CancellationToken::new();
    let app = api::create_router(Arc::new(pipeline), Arc::new(ingestion), shutdown.clone());

    let (listener, port) = bind_listener(config.server_port)
        .await
        .context("Failed to bind listener")?;
    tracing::info!("Listening on http://0.0.0.0:{}", port);
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            tokio::signal::ctrl_c().await.ok();
            tracing::info!("Shutdown requested; cancelling in-flight documents");
            shutdown.cancel();
        })
        .await
        .context("Server error")?;
    Ok(())
}

async fn bind_listener(server_port: Option<u16>) -> Result<(TcpListener, u16), std::io::Error> {
    use std::net::Ipv4Addr;

    if let Some(port) = server_port {
        return TcpListener::bind((Ipv4Addr::UNSPECIFIED, port))
            .await
            .map(|listener| (listener, port));
    }

    const PORT_RANGE: std::ops::RangeInclusive<u16> = 4300..=4399;
    for port in PORT_RANGE {
        match TcpListener::bind((Ipv4Addr::UNSPECIFIED, port)).await {
            Ok(listener) => {
                tracing::debug!(port, "Bound server port");
                return Ok((listener, port));
            }
            Err(err) if err.kind() == std::io::ErrorKind::AddrInUse => {
                tracing::debug!(port, "Port already in use; trying next");
                continue;
            }
            Err(err) => return Err(err),
        }
    }

    Err(std::io::Error::new(
        std::io::ErrorKind::AddrNotAvailable,
        "No available port found in range 4300-4399",
    ))
}
