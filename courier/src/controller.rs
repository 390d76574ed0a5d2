use std::{net::SocketAddr, sync::Arc};

use courier_common::{Signal, internal, logging, tracing};
use courier_delivery::{CoordinatorConfig, DeliveryCoordinator};
use courier_http::{HttpConfig, HttpServer};
use serde::Deserialize;
use tokio::{sync::broadcast, task::JoinSet};

/// Top-level configuration, deserialized from `courier.config.ron`
#[derive(Debug, Default, Deserialize)]
pub struct Courier {
    #[serde(default)]
    delivery: CoordinatorConfig,
    #[serde(default)]
    http: HttpConfig,
}

/// A started courier instance
///
/// Owns the shutdown channel shared by the retry processor and the HTTP
/// server.
#[derive(Debug)]
pub struct Running {
    coordinator: Arc<DeliveryCoordinator>,
    shutdown: broadcast::Sender<Signal>,
    http_addr: Option<SocketAddr>,
    tasks: JoinSet<anyhow::Result<()>>,
}

async fn wait_for_signal() -> anyhow::Result<()> {
    let mut terminate = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            internal!(level = INFO, "CTRL+C entered, shutting down");
        }
        _ = terminate.recv() => {
            internal!(level = INFO, "Terminate Signal received, shutting down");
        }
    };

    Ok(())
}

impl Courier {
    /// Parse a configuration document
    ///
    /// # Errors
    ///
    /// Returns an error if the document is not valid RON for this structure.
    pub fn from_ron(source: &str) -> anyhow::Result<Self> {
        Ok(ron::from_str(source)?)
    }

    /// Build the engine and spawn the retry processor and HTTP server
    ///
    /// # Errors
    ///
    /// Returns an error if the delivery configuration is invalid, the HTTP
    /// request timeout is shorter than a full delivery pass, or the HTTP
    /// listener cannot be bound.
    pub async fn start(self) -> anyhow::Result<Running> {
        let coordinator = Arc::new(DeliveryCoordinator::from_config(&self.delivery)?);
        let (shutdown, _receiver) = broadcast::channel(64);
        let mut tasks: JoinSet<anyhow::Result<()>> = JoinSet::new();

        let http_addr = if self.http.enabled {
            self.http.validate(coordinator.longest_pass())?;
            let server = HttpServer::new(&self.http, Arc::clone(&coordinator) as _).await?;
            let addr = server.local_addr()?;
            let receiver = shutdown.subscribe();
            tasks.spawn(async move { server.serve(receiver).await.map_err(anyhow::Error::from) });
            Some(addr)
        } else {
            internal!(level = INFO, "HTTP server disabled");
            None
        };

        let receiver = shutdown.subscribe();
        let processor = Arc::clone(&coordinator);
        tasks.spawn(async move {
            processor.serve(receiver).await;
            Ok(())
        });

        internal!(level = INFO, "Controller running");

        Ok(Running {
            coordinator,
            shutdown,
            http_addr,
            tasks,
        })
    }

    /// Run until SIGINT or SIGTERM, then shut everything down
    ///
    /// # Errors
    ///
    /// Returns an error if startup fails, a task fails, or the signal
    /// handlers cannot be installed.
    pub async fn run(self) -> anyhow::Result<()> {
        logging::init();

        let mut running = self.start().await?;

        let result = tokio::select! {
            r = wait_for_signal() => r,
            r = running.wait_for_exit() => r,
        };

        internal!(level = INFO, "Shutting down...");

        let stopped = running.shutdown().await;
        result.and(stopped)
    }
}

impl Running {
    #[must_use]
    pub const fn coordinator(&self) -> &Arc<DeliveryCoordinator> {
        &self.coordinator
    }

    /// Address the HTTP server is bound to, if it is enabled
    #[must_use]
    pub const fn http_addr(&self) -> Option<SocketAddr> {
        self.http_addr
    }

    /// Resolves when any task ends on its own, which only happens on error
    async fn wait_for_exit(&mut self) -> anyhow::Result<()> {
        match self.tasks.join_next().await {
            Some(joined) => {
                joined??;
                anyhow::bail!("A courier task exited unexpectedly")
            }
            None => std::future::pending().await,
        }
    }

    /// Signal every task to stop and wait for them to finish
    ///
    /// # Errors
    ///
    /// Returns the first error reported by a task.
    pub async fn shutdown(mut self) -> anyhow::Result<()> {
        // No receivers means every task has already stopped
        let _ = self.shutdown.send(Signal::Shutdown);

        let mut result = Ok(());
        while let Some(joined) = self.tasks.join_next().await {
            let outcome = joined.map_err(anyhow::Error::from).and_then(|r| r);
            if let Err(e) = outcome {
                tracing::error!(error = %e, "Task failed during shutdown");
                if result.is_ok() {
                    result = Err(e);
                }
            }
        }

        let _ = self.shutdown.send(Signal::Finalised);

        internal!(
            level = INFO,
            queue_length = self.coordinator.queue().len(),
            "Courier stopped"
        );

        result
    }
}
