use clap::Parser;
use dotenvy::dotenv;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use tubely::config::AppConfig;
use tubely::infrastructure::{database, storage};
use tubely::services::probe::{FfprobeProbe, MediaClassifier};
use tubely::services::storage::ObjectStore;
use tubely::services::upload_service::UploadService;
use tubely::services::videos::VideoService;
use tubely::{AppState, create_app};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Port for the API server (overrides PORT)
    #[arg(short, long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tubely=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("🚀 Starting Tubely...");

    let mut config = AppConfig::from_env();
    if let Some(port) = args.port {
        config.port = port;
    }
    info!(
        "🛡️  Upload limits: video={}MB thumbnail={}MB, probe={}",
        config.max_video_size / 1024 / 1024,
        config.max_thumbnail_size / 1024 / 1024,
        config.ffprobe_path
    );

    let db = database::setup_database(&config).await?;
    let video_store: Arc<dyn ObjectStore> = storage::setup_storage(&config).await;
    let thumbnail_store = storage::setup_thumbnail_storage(&config, video_store.clone()).await?;

    let videos = VideoService::new(db.clone());
    let classifier = MediaClassifier::new(Arc::new(FfprobeProbe::new(
        config.ffprobe_path.clone(),
    )));
    let upload_service = Arc::new(UploadService::new(
        &config,
        videos,
        classifier,
        video_store.clone(),
        thumbnail_store,
    ));
    info!(
        "🗂️  Staging uploads in {}",
        upload_service.staging().dir().display()
    );

    let state = AppState {
        db,
        video_store,
        upload_service,
        config: config.clone(),
    };

    let app = create_app(state).layer(
        TraceLayer::new_for_http()
            .make_span_with(|request: &axum::http::Request<_>| {
                let request_id = request
                    .headers()
                    .get("x-request-id")
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or("unknown");
                tracing::info_span!(
                    "http_request",
                    method = %request.method(),
                    uri = %request.uri(),
                    request_id = %request_id,
                )
            })
            .on_request(|request: &axum::http::Request<_>, _span: &tracing::Span| {
                info!("📥 {} {}", request.method(), request.uri());
            })
            .on_response(
                |response: &axum::http::Response<_>,
                 latency: std::time::Duration,
                 _span: &tracing::Span| {
                    info!(
                        "📤 Finished in {:?} with status {}",
                        latency,
                        response.status()
                    );
                },
            ),
    );

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    info!("✅ Server ready at http://{}", addr);
    info!("📖 Swagger UI: http://{}/swagger-ui", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("🛑 Server shut down gracefully.");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("⌨️  Ctrl+C received, starting graceful shutdown...");
        },
        _ = terminate => {
            info!("💤 SIGTERM received, starting graceful shutdown...");
        },
    }
}
