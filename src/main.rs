//! Azure Disk Snapshotter
//!
//! Runs the Azure volume driver behind a REST API, with separate health and
//! metrics listeners.
//!
//! In a cluster the driver discovers its subscription and resource group
//! from instance metadata and talks to Azure Resource Manager. With
//! `--standalone` it runs over in-memory adapters instead.

use clap::Parser;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use azure_disk_snapshotter::driver::identity::{METADATA_API_VERSION, METADATA_URL};
use azure_disk_snapshotter::{
    initialize_azure, ApiServer, ApiServerConfig, AzureDriver, BackendConfig, ComputeConfig,
    Credential, DriverConfig, DriverMetrics, DriverRegistry, Error, InMemoryDiskService,
    InMemoryVolumeDirectory, MetadataConfig, PlatformConfig, PlatformFactory, Result, Scope,
};

// =============================================================================
// CLI Arguments
// =============================================================================

/// Azure Disk Snapshotter - snapshot and restore volume driver for Azure managed disks
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// REST API bind address
    #[arg(long, env = "API_ADDR", default_value = "0.0.0.0:8090")]
    api_addr: String,

    /// Health server bind address
    #[arg(long, env = "HEALTH_ADDR", default_value = "0.0.0.0:8081")]
    health_addr: String,

    /// Metrics server bind address
    #[arg(long, env = "METRICS_ADDR", default_value = "0.0.0.0:8080")]
    metrics_addr: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Output logs as JSON
    #[arg(long, env = "LOG_JSON")]
    log_json: bool,

    /// Instance metadata endpoint
    #[arg(long, env = "AZURE_METADATA_URL", default_value = METADATA_URL)]
    metadata_url: String,

    /// Instance metadata API version
    #[arg(long, env = "AZURE_METADATA_API_VERSION", default_value = METADATA_API_VERSION)]
    metadata_api_version: String,

    /// Instance metadata timeout in milliseconds
    #[arg(long, env = "AZURE_METADATA_TIMEOUT_MS", default_value = "3000")]
    metadata_timeout_ms: u64,

    /// Resource Manager endpoint
    #[arg(long, env = "AZURE_ARM_ENDPOINT", default_value = "https://management.azure.com")]
    arm_endpoint: String,

    /// Compute API version
    #[arg(long, env = "AZURE_COMPUTE_API_VERSION", default_value = "2019-03-01")]
    compute_api_version: String,

    /// Azure AD authority for service principal logins
    #[arg(long, env = "AZURE_AUTHORITY", default_value = "https://login.microsoftonline.com")]
    authority: String,

    /// Deadline for a single remote request in seconds
    #[arg(long, env = "REQUEST_TIMEOUT", default_value = "30")]
    request_timeout_secs: u64,

    /// Upper bound on retrying transient remote failures in seconds
    #[arg(long, env = "MAX_RETRY_ELAPSED", default_value = "60")]
    max_retry_secs: u64,

    /// Run in standalone mode (no Kubernetes, no Azure)
    #[arg(long, env = "STANDALONE")]
    standalone: bool,

    /// Subscription used in standalone mode
    #[arg(long, env = "AZURE_SUBSCRIPTION_ID", default_value = "standalone")]
    subscription_id: String,

    /// Resource group used in standalone mode
    #[arg(long, env = "AZURE_RESOURCE_GROUP", default_value = "standalone")]
    resource_group: String,
}

// =============================================================================
// Main
// =============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    init_logging(&args);

    info!("Starting Azure Disk Snapshotter");
    info!("  Version: {}", azure_disk_snapshotter::VERSION);
    info!("  REST API: {}", args.api_addr);
    info!("  Standalone mode: {}", args.standalone);

    let shutdown = CancellationToken::new();
    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for shutdown signal: {}", e);
        }
        info!("Shutdown signal received");
        signal_token.cancel();
    });

    let registry = Arc::new(DriverRegistry::new());
    let driver = if args.standalone {
        Some(start_standalone(&args, &registry)?)
    } else {
        let directory = PlatformFactory::create(PlatformConfig::Kubernetes).await?;
        initialize_azure(&registry, &driver_config(&args), directory).await?
    };
    if driver.is_none() {
        warn!("Azure driver not available; serving without registered drivers");
    }
    let metrics = driver.as_ref().map(|d| d.metrics().clone());

    // Start health server
    let health_addr = parse_addr(&args.health_addr, "health server")?;
    let health_registry = registry.clone();
    let health_shutdown = shutdown.clone();
    tokio::spawn(async move {
        if let Err(e) = run_health_server(health_addr, health_registry, health_shutdown).await {
            error!("Health server error: {}", e);
        }
    });

    // Start metrics server
    let metrics_addr = parse_addr(&args.metrics_addr, "metrics server")?;
    let metrics_shutdown = shutdown.clone();
    tokio::spawn(async move {
        if let Err(e) = run_metrics_server(metrics_addr, metrics, metrics_shutdown).await {
            error!("Metrics server error: {}", e);
        }
    });

    // Create and run API server
    let api_config = ApiServerConfig {
        rest_addr: parse_addr(&args.api_addr, "REST API")?,
        ..Default::default()
    };
    ApiServer::new(api_config, registry.clone())
        .run(shutdown)
        .await?;

    registry.stop_all().await?;
    info!("Shutdown complete");
    Ok(())
}

fn parse_addr(addr: &str, what: &str) -> Result<SocketAddr> {
    addr.parse()
        .map_err(|e| Error::Configuration(format!("Invalid {} address {}: {}", what, addr, e)))
}

fn driver_config(args: &Args) -> DriverConfig {
    DriverConfig {
        metadata: MetadataConfig {
            url: args.metadata_url.clone(),
            api_version: args.metadata_api_version.clone(),
            timeout: Duration::from_millis(args.metadata_timeout_ms),
        },
        backend: BackendConfig::Arm {
            compute: ComputeConfig {
                endpoint: args.arm_endpoint.clone(),
                api_version: args.compute_api_version.clone(),
                authority: args.authority.clone(),
                request_timeout: Duration::from_secs(args.request_timeout_secs),
                max_retry_elapsed: Duration::from_secs(args.max_retry_secs),
            },
            credential: Credential::from_env(&args.authority),
        },
    }
}

/// In-memory directory and disk service with a fixed scope
fn start_standalone(args: &Args, registry: &DriverRegistry) -> Result<Arc<AzureDriver>> {
    let scope = Scope::new(&args.subscription_id, &args.resource_group);
    info!("Standalone scope: {}", scope);

    let driver = Arc::new(AzureDriver::new(
        scope,
        Arc::new(InMemoryVolumeDirectory::new()),
        Arc::new(InMemoryDiskService::new(&args.subscription_id)),
        Arc::new(DriverMetrics::new()?),
    ));
    registry.register(driver.clone())?;
    Ok(driver)
}

// =============================================================================
// Logging Setup
// =============================================================================

fn init_logging(args: &Args) {
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let mut filter = EnvFilter::from_default_env().add_directive(level.into());
    for directive in ["hyper=warn", "kube=info", "tower=warn", "reqwest=warn", "axum=info"] {
        if let Ok(directive) = directive.parse() {
            filter = filter.add_directive(directive);
        }
    }

    if args.log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true))
            .init();
    }
}

// =============================================================================
// Health Server
// =============================================================================

fn text_response(status: hyper::StatusCode, body: impl Into<hyper::Body>) -> hyper::Response<hyper::Body> {
    let mut response = hyper::Response::new(body.into());
    *response.status_mut() = status;
    response
}

async fn run_health_server(
    addr: SocketAddr,
    registry: Arc<DriverRegistry>,
    shutdown: CancellationToken,
) -> Result<()> {
    use hyper::service::{make_service_fn, service_fn};
    use hyper::{Body, Request, Server, StatusCode};

    let make_svc = make_service_fn(move |_conn| {
        let registry = registry.clone();
        async move {
            Ok::<_, Infallible>(service_fn(move |req: Request<Body>| {
                let registry = registry.clone();
                async move {
                    let response = match req.uri().path() {
                        "/healthz" | "/livez" => text_response(StatusCode::OK, "ok"),
                        "/readyz" if registry.names().is_empty() => {
                            text_response(StatusCode::SERVICE_UNAVAILABLE, "no drivers")
                        }
                        "/readyz" => text_response(StatusCode::OK, "ok"),
                        _ => text_response(StatusCode::NOT_FOUND, "not found"),
                    };
                    Ok::<_, Infallible>(response)
                }
            }))
        }
    });

    info!("Health server listening on {}", addr);
    Server::try_bind(&addr)
        .map_err(|e| Error::Internal(format!("Failed to bind health server: {}", e)))?
        .serve(make_svc)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
        .map_err(|e| Error::Internal(format!("Health server error: {}", e)))?;

    Ok(())
}

// =============================================================================
// Metrics Server
// =============================================================================

/// Driver counters followed by the process default registry
fn render_metrics(metrics: Option<&DriverMetrics>) -> Result<(String, Vec<u8>)> {
    use prometheus::{Encoder, TextEncoder};

    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    if let Some(metrics) = metrics {
        let (_, driver_text) = metrics.encode()?;
        buffer.extend_from_slice(&driver_text);
    }
    encoder.encode(&prometheus::gather(), &mut buffer)?;
    Ok((encoder.format_type().to_string(), buffer))
}

async fn run_metrics_server(
    addr: SocketAddr,
    metrics: Option<Arc<DriverMetrics>>,
    shutdown: CancellationToken,
) -> Result<()> {
    use hyper::service::{make_service_fn, service_fn};
    use hyper::{Body, Request, Server, StatusCode};

    let make_svc = make_service_fn(move |_conn| {
        let metrics = metrics.clone();
        async move {
            Ok::<_, Infallible>(service_fn(move |req: Request<Body>| {
                let metrics = metrics.clone();
                async move {
                    let response = match req.uri().path() {
                        "/metrics" => match render_metrics(metrics.as_deref()) {
                            Ok((content_type, body)) => {
                                let mut response = text_response(StatusCode::OK, body);
                                if let Ok(value) = content_type.parse() {
                                    response.headers_mut().insert("Content-Type", value);
                                }
                                response
                            }
                            Err(e) => {
                                error!("Failed to encode metrics: {}", e);
                                text_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
                            }
                        },
                        _ => text_response(StatusCode::NOT_FOUND, "not found"),
                    };
                    Ok::<_, Infallible>(response)
                }
            }))
        }
    });

    info!("Metrics server listening on {}", addr);
    Server::try_bind(&addr)
        .map_err(|e| Error::Internal(format!("Failed to bind metrics server: {}", e)))?
        .serve(make_svc)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
        .map_err(|e| Error::Internal(format!("Metrics server error: {}", e)))?;

    Ok(())
}
