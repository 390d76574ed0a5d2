//! HTTP server hosting the delivery endpoints

use std::{sync::Arc, time::Duration};

use axum::{
    Router,
    routing::{get, post},
};
use courier_common::Signal;
use courier_delivery::DeliveryService;
use tokio::net::TcpListener;
use tower_http::timeout::TimeoutLayer;

use crate::{HttpConfig, HttpError, handlers};

/// Build the router for a delivery service.
///
/// Exposed separately from [`HttpServer`] so it can be driven without a
/// socket.
pub fn router(service: Arc<dyn DeliveryService>, request_timeout: Duration) -> Router {
    Router::new()
        .route("/", get(handlers::index))
        .route("/health", get(handlers::health))
        .route("/send-email", post(handlers::send_email))
        .route("/status", get(handlers::status))
        .route("/emails/{id}", get(handlers::lookup))
        .with_state(service)
        .layer(TimeoutLayer::new(request_timeout))
}

/// HTTP front end for the delivery engine
pub struct HttpServer {
    listener: TcpListener,
    router: Router,
}

impl HttpServer {
    /// Bind the listener and build the router
    ///
    /// # Errors
    ///
    /// Returns an error if binding to the specified address fails.
    pub async fn new(
        config: &HttpConfig,
        service: Arc<dyn DeliveryService>,
    ) -> Result<Self, HttpError> {
        let listener = TcpListener::bind(&config.listen_address)
            .await
            .map_err(|e| HttpError::BindError {
                address: config.listen_address.clone(),
                source: e,
            })?;

        tracing::info!(
            address = %config.listen_address,
            "HTTP server bound successfully"
        );

        let router = router(service, config.request_timeout());

        Ok(Self { listener, router })
    }

    /// Address the listener is bound to
    ///
    /// # Errors
    ///
    /// Returns an error if the socket has no local address.
    pub fn local_addr(&self) -> std::io::Result<std::net::SocketAddr> {
        self.listener.local_addr()
    }

    /// Run the server until a shutdown signal is received
    ///
    /// In-flight requests are allowed to finish before this returns.
    ///
    /// # Errors
    ///
    /// Returns an error if the server encounters a runtime error.
    pub async fn serve(
        self,
        mut shutdown: tokio::sync::broadcast::Receiver<Signal>,
    ) -> Result<(), HttpError> {
        tracing::info!("HTTP server starting");

        axum::serve(self.listener, self.router)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("HTTP server received shutdown signal");
            })
            .await
            .map_err(|e| HttpError::ServerError(e.to_string()))?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use courier_delivery::{DeliveryCoordinator, SimulatedTransport};

    use super::*;

    #[tokio::test]
    async fn test_serve_stops_on_shutdown() {
        let coordinator = DeliveryCoordinator::builder()
            .provider("Provider1", Arc::new(SimulatedTransport::reliable()))
            .build()
            .unwrap();
        let config = HttpConfig {
            listen_address: "127.0.0.1:0".to_string(),
            ..HttpConfig::default()
        };

        let server = HttpServer::new(&config, Arc::new(coordinator)).await.unwrap();
        assert!(server.local_addr().unwrap().port() > 0);

        let (shutdown, receiver) = tokio::sync::broadcast::channel(1);
        let handle = tokio::spawn(server.serve(receiver));

        shutdown.send(Signal::Shutdown).unwrap();
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_bind_error_names_address() {
        let config = HttpConfig {
            listen_address: "not an address".to_string(),
            ..HttpConfig::default()
        };
        let coordinator = DeliveryCoordinator::builder()
            .provider("Provider1", Arc::new(SimulatedTransport::reliable()))
            .build()
            .unwrap();

        let Err(error) = HttpServer::new(&config, Arc::new(coordinator)).await else {
            panic!("binding to an invalid address should fail");
        };
        assert!(error.to_string().contains("not an address"));
    }
}
