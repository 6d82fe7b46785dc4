//! API Server

use super::{
    handlers::AppState,
    middleware::{create_cors_layer, request_id_middleware},
    routes::create_router,
};
use crate::config::ApiConfig;
use crate::errors::{ConfigurationError, Pc28Result};
use std::future::Future;
use std::{net::SocketAddr, sync::Arc, time::Duration};
use tokio::signal;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};
use tracing::{info, warn};

pub struct ApiServer {
    config: ApiConfig,
    state: Arc<AppState>,
}

impl ApiServer {
    pub fn new(config: ApiConfig, state: Arc<AppState>) -> Self {
        Self { config, state }
    }

    /// Serve until `shutdown` resolves, then drain in-flight requests
    pub async fn run<F>(self, shutdown: F) -> Pc28Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr = self.socket_addr()?;
        let app = create_app(self.state.clone(), &self.config);
        let listener = tokio::net::TcpListener::bind(addr).await?;

        info!("API server listening on http://{}", addr);
        info!("   CORS: {:?}", self.config.allowed_origins);
        info!("   Request timeout: {}s", self.config.request_timeout_secs);

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown)
            .await?;

        info!("API server stopped");
        Ok(())
    }

    fn socket_addr(&self) -> Pc28Result<SocketAddr> {
        let ip = self.config.host.parse::<std::net::IpAddr>().map_err(|e| {
            ConfigurationError::InvalidValue {
                field: "api.host".to_string(),
                value: self.config.host.clone(),
                reason: e.to_string(),
            }
        })?;
        Ok(SocketAddr::from((ip, self.config.port)))
    }
}

/// Router with the full middleware stack
pub fn create_app(state: Arc<AppState>, config: &ApiConfig) -> axum::Router {
    create_router(state)
        .layer(axum::middleware::from_fn(request_id_middleware))
        .layer(create_cors_layer(&config.allowed_origins))
        .layer(TimeoutLayer::new(Duration::from_secs(config.request_timeout_secs)))
        .layer(TraceLayer::new_for_http())
}

/// Resolves on Ctrl+C or SIGTERM
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!("failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        },
        _ = terminate => {
            info!("Received terminate signal");
        },
    }
}
