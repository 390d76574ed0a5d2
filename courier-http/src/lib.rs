//! HTTP front end for the courier delivery engine
//!
//! # Endpoints
//!
//! - **`GET /`** - Index of the available endpoints
//! - **`GET /health`** - Liveness: returns 200 while the process is running
//! - **`POST /send-email`** - Submit an email for delivery
//! - **`GET /status`** - Service status, breaker states and queue length
//! - **`GET /emails/{id}`** - Recorded outcome of a previous submission
//!
//! # Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use courier_delivery::{CoordinatorConfig, DeliveryCoordinator};
//! use courier_http::{HttpConfig, HttpServer};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let coordinator = Arc::new(DeliveryCoordinator::from_config(&CoordinatorConfig::default())?);
//! let server = HttpServer::new(&HttpConfig::default(), coordinator).await?;
//!
//! // Run the server
//! // server.serve(shutdown_receiver).await?;
//! # Ok(())
//! # }
//! ```

mod config;
mod error;
mod handlers;
mod server;

pub use config::HttpConfig;
pub use error::HttpError;
pub use server::{HttpServer, router};
