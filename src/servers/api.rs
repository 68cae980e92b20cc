use axum::{
    http::{header, HeaderValue, Method},
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;

use crate::auth::{auth_router, AuthState};
use crate::CargoHubError;

pub const API_PREFIX: &str = "/api/v1";

// Configuration for the REST API server
#[derive(Debug, Clone)]
pub struct ApiServerConfig {
    pub host: String,
    pub port: u16,
    /// Only origin allowed to make credentialed cross-origin calls
    pub front_uri: String,
}

impl Default for ApiServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            front_uri: "http://localhost:3000".to_string(),
        }
    }
}

pub struct ApiServer {
    config: ApiServerConfig,
    state: Arc<AuthState>,
}

impl ApiServer {
    pub fn new(config: ApiServerConfig, state: Arc<AuthState>) -> Self {
        Self { config, state }
    }

    pub async fn start(&self) -> crate::Result<()> {
        let app = self.router()?;
        let addr: SocketAddr = format!("{}:{}", self.config.host, self.config.port)
            .parse()
            .map_err(|e| CargoHubError::Config(format!("invalid listen address: {}", e)))?;
        let listener = TcpListener::bind(addr).await?;

        log::info!("API server listening on http://{}{}", addr, API_PREFIX);

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        log::info!("API server stopped");
        Ok(())
    }

    /// Full application router: auth routes under the API prefix, plus CORS
    pub fn router(&self) -> crate::Result<Router> {
        let origin = HeaderValue::from_str(self.config.front_uri.trim_end_matches('/'))
            .map_err(|e| CargoHubError::Config(format!("invalid front uri: {}", e)))?;

        Ok(Router::new()
            .nest(API_PREFIX, auth_router(self.state.clone()))
            .layer(
                CorsLayer::new()
                    .allow_origin(origin)
                    .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
                    .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
                    .allow_credentials(true),
            ))
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        log::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    log::info!("Shutdown signal received");
}
