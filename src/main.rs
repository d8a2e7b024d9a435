// src/main.rs
use anyhow::Result;
use hyper::{Body, Request, Response, Server, StatusCode};
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info};

use svc_monitor::{
    config,
    metrics::MetricsRegistry,
    poller::StatusPoller,
    probe::HealthProber,
    registry::ServiceCatalog,
    resolve::{EndpointCache, EnvConfigSource, HttpRegistryClient, Resolver},
    sweep::{HealthAggregator, SweepOptions},
};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("svc_monitor=debug".parse()?)
                .add_directive("hyper=info".parse()?),
        )
        .init();

    // Load configuration
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "config.yaml".to_string());

    info!("Loading configuration from: {}", config_path);
    let config = config::load_config(&config_path).await?;

    // Initialize metrics
    let metrics_registry = Arc::new(MetricsRegistry::new()?);
    let metrics = metrics_registry.collector();

    // Static service catalog
    let catalog = Arc::new(ServiceCatalog::new(config.services.clone())?);
    info!("Loaded {} service descriptors", catalog.len());

    // Resolver: env overrides, optional dynamic registry, deterministic fallback
    let registry_client = config.registry.base_url.clone().map(|base_url| {
        Arc::new(HttpRegistryClient::new(base_url, config.registry.timeout()))
            as Arc<dyn svc_monitor::resolve::DynamicRegistry>
    });
    let resolver = Arc::new(
        Resolver::new(
            catalog.clone(),
            Arc::new(EndpointCache::new()),
            Arc::new(EnvConfigSource),
            registry_client,
        )
        .with_default_ttl(config.monitor.cache_ttl())
        .with_strict(config.monitor.strict),
    );

    // Prober -> aggregator -> poller
    let prober = Arc::new(HealthProber::new(resolver));
    let aggregator = Arc::new(HealthAggregator::new(prober, Some(metrics)));
    let sweep_options = SweepOptions {
        timeout: config.monitor.timeout(),
        batch_size: config.monitor.batch_size,
        filter: None,
    };
    let poller = Arc::new(StatusPoller::new(
        aggregator,
        catalog.all().to_vec(),
        sweep_options,
        config.monitor.interval(),
    ));
    poller.start().await;

    // Status/metrics endpoint
    if config.monitor.status_enabled {
        let status_addr: SocketAddr = ([0, 0, 0, 0], config.monitor.status_port).into();
        start_status_server(status_addr, poller.clone(), metrics_registry)?;
    }

    shutdown_signal().await;
    poller.teardown().await;
    info!("Monitor stopped");

    Ok(())
}

/// Serves the latest sweep report on /status and Prometheus text on /metrics.
fn start_status_server(
    addr: SocketAddr,
    poller: Arc<StatusPoller>,
    registry: Arc<MetricsRegistry>,
) -> Result<()> {
    let make_service = hyper::service::make_service_fn(move |_| {
        let poller = poller.clone();
        let registry = registry.clone();

        async move {
            Ok::<_, Infallible>(hyper::service::service_fn(move |req: Request<Body>| {
                let poller = poller.clone();
                let registry = registry.clone();

                async move {
                    let response = match req.uri().path() {
                        "/status" => status_response(&poller),
                        "/metrics" => Response::builder()
                            .status(StatusCode::OK)
                            .header("Content-Type", "text/plain; version=0.0.4")
                            .body(Body::from(registry.gather())),
                        _ => Response::builder()
                            .status(StatusCode::NOT_FOUND)
                            .body(Body::from("Not Found")),
                    };

                    Ok::<_, Infallible>(response.unwrap_or_else(|e| {
                        error!("Failed to build status response: {}", e);
                        Response::new(Body::from("internal error"))
                    }))
                }
            }))
        }
    });

    let server = Server::try_bind(&addr)?.serve(make_service);
    info!("Status server listening on http://{}/status", addr);

    tokio::spawn(async move {
        if let Err(e) = server.await {
            error!("Status server error: {}", e);
        }
    });

    Ok(())
}

fn status_response(poller: &StatusPoller) -> hyper::http::Result<Response<Body>> {
    match poller.latest_report() {
        Some(report) => {
            let body = serde_json::to_vec(report.as_ref()).unwrap_or_default();
            Response::builder()
                .status(StatusCode::OK)
                .header("Content-Type", "application/json")
                .body(Body::from(body))
        }
        None => Response::builder()
            .status(StatusCode::SERVICE_UNAVAILABLE)
            .body(Body::from("no sweep completed yet")),
    }
}

// Graceful shutdown handler
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}
