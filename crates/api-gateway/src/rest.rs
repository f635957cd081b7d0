//! HTTP server

use std::future::Future;
use std::net::{SocketAddr, TcpListener};
use std::sync::Arc;
use anyhow::{anyhow, Context, Result};
use tracing::{error, info};

use model_manager::ModelLifecycleManager;
use service_config::{CorsSettings, ServerSettings};

use crate::handlers::AppState;
use crate::routes::create_router;

/// REST API server
pub struct RestApi {
    server: ServerSettings,
    cors: CorsSettings,
    state: AppState,
}

impl RestApi {
    /// Creates a new REST API server
    pub fn new(
        server: ServerSettings,
        cors: CorsSettings,
        manager: Arc<ModelLifecycleManager>,
    ) -> Self {
        Self {
            server,
            cors,
            state: AppState::new(manager),
        }
    }

    /// Binds the configured address and serves until `shutdown` resolves
    pub async fn serve<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let address = self.server.bind_address();
        let addr: SocketAddr = tokio::net::lookup_host(&address)
            .await
            .with_context(|| format!("Failed to resolve {}", address))?
            .next()
            .ok_or_else(|| anyhow!("No address found for {}", address))?;

        let listener =
            TcpListener::bind(addr).with_context(|| format!("Failed to bind {}", addr))?;
        self.serve_on(listener, shutdown).await
    }

    /// Serves on an already bound listener until `shutdown` resolves
    pub async fn serve_on<F>(self, listener: TcpListener, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr = listener.local_addr()?;
        let router = create_router(self.state, &self.cors);

        info!(%addr, "Starting HTTP server");

        axum::Server::from_tcp(listener)?
            .serve(router.into_make_service())
            .with_graceful_shutdown(shutdown)
            .await?;

        info!("HTTP server stopped");
        Ok(())
    }
}

/// Resolves on Ctrl-C
pub async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Shutdown signal received"),
        Err(e) => {
            error!(error = %e, "Failed to listen for shutdown signal");
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use model_manager::testing::ScriptedBackend;
    use service_config::ModelSettings;

    #[tokio::test]
    async fn test_serves_until_shutdown() {
        let manager = Arc::new(ModelLifecycleManager::new(
            Arc::new(ScriptedBackend::new()),
            ModelSettings::default(),
        ));
        let api = RestApi::new(ServerSettings::default(), CorsSettings::default(), manager);

        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let (stop, stopped) = tokio::sync::oneshot::channel::<()>();
        let server = tokio::spawn(api.serve_on(listener, async {
            let _ = stopped.await;
        }));

        let uri: hyper::Uri = format!("http://{}/status", addr).parse().unwrap();
        let response = hyper::Client::new().get(uri).await.unwrap();
        assert_eq!(response.status(), hyper::StatusCode::OK);
        let body = hyper::body::to_bytes(response.into_body()).await.unwrap();
        let status: common::ModelStatus = serde_json::from_slice(&body).unwrap();
        assert!(!status.is_loaded);

        stop.send(()).unwrap();
        server.await.unwrap().unwrap();
    }
}
