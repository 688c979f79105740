use std::{net::SocketAddr, sync::Arc, time::Duration};

use axum::http::HeaderValue;
use tokio::{signal, sync::mpsc};
use tower_http::{
    cors::{Any, CorsLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use tracing::info;

use smartpay_gateway as gateway;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cfg = gateway::config::load_config()?;
    gateway::config::init_tracing(cfg.log_level(), cfg.log_json);

    // Init DB
    let db_pool = gateway::db::establish_connection_from_app_config(&cfg).await?;
    if cfg.auto_migrate {
        gateway::db::run_migrations(&db_pool).await?;
    }
    let db_arc = Arc::new(db_pool);

    // Init events
    let (event_tx, event_rx) = mpsc::channel(1024);
    let event_sender = gateway::events::EventSender::new(event_tx);
    tokio::spawn(gateway::events::process_events(event_rx));

    // Build the reconciliation engine
    let client = gateway::smartpay::SmartpayClient::new(&cfg.smartpay)?;
    if cfg.smartpay.webhook_configured() {
        info!("Smartpay webhook confirmation enabled");
    } else {
        info!("Smartpay webhook id / signing secret not configured; webhook deliveries will be rejected");
    }
    let reconciliation = Arc::new(gateway::services::reconciliation::ReconciliationService::new(
        db_arc.clone(),
        client,
        cfg.smartpay.clone(),
        Arc::new(gateway::events::LoggingLifecycle),
        event_sender.clone(),
    ));

    // Compose shared app state
    let app_state = gateway::AppState {
        db: db_arc,
        config: cfg.clone(),
        event_sender,
        reconciliation,
    };

    // Build CORS layer from config
    let configured_origins: Option<Vec<HeaderValue>> = cfg
        .cors_allowed_origins
        .as_ref()
        .map(|raw| {
            raw.split(',')
                .filter_map(|origin| {
                    let trimmed = origin.trim();
                    if trimmed.is_empty() {
                        None
                    } else {
                        HeaderValue::from_str(trimmed).ok()
                    }
                })
                .collect::<Vec<_>>()
        })
        .filter(|origins| !origins.is_empty());

    let cors_layer = if let Some(origins) = configured_origins {
        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        info!("No CORS origins configured; using permissive CORS");
        CorsLayer::permissive()
    };

    let app = gateway::app_router(app_state)
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(Duration::from_secs(30)))
        .layer(cors_layer);

    // Bind and serve
    let addr = SocketAddr::new(cfg.host.parse()?, cfg.port);
    info!("smartpay-gateway listening on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigterm =
            signal(SignalKind::terminate()).expect("failed to install signal handler");
        sigterm.recv().await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
