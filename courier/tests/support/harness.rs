//! End-to-end test harness for courier
//!
//! Starts a complete courier instance on a random local port and talks to it
//! with plain HTTP/1.1 over a TCP socket.

use std::net::SocketAddr;

use courier::{Courier, Running};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::TcpStream,
};

/// A running courier instance plus the address of its HTTP server
pub struct TestHarness {
    running: Running,
    addr: SocketAddr,
}

/// Status code and decoded JSON body of a response
pub struct TestResponse {
    pub status: u16,
    pub body: serde_json::Value,
}

impl TestHarness {
    /// Start courier with the given `delivery` section, listening on an
    /// ephemeral localhost port.
    pub async fn start(delivery: &str) -> anyhow::Result<Self> {
        let config = format!(
            r#"(
                delivery: {delivery},
                http: (listen_address: "127.0.0.1:0", request_timeout_secs: 30),
            )"#
        );

        let running = Courier::from_ron(&config)?.start().await?;
        let addr = running
            .http_addr()
            .ok_or_else(|| anyhow::anyhow!("HTTP server is not enabled"))?;

        Ok(Self { running, addr })
    }

    pub const fn running(&self) -> &Running {
        &self.running
    }

    pub async fn get(&self, path: &str) -> anyhow::Result<TestResponse> {
        self.request(&format!(
            "GET {path} HTTP/1.1\r\nHost: {}\r\nConnection: close\r\n\r\n",
            self.addr
        ))
        .await
    }

    pub async fn post_json(
        &self,
        path: &str,
        body: &serde_json::Value,
    ) -> anyhow::Result<TestResponse> {
        let body = body.to_string();
        self.request(&format!(
            "POST {path} HTTP/1.1\r\nHost: {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
            self.addr,
            body.len()
        ))
        .await
    }

    async fn request(&self, raw: &str) -> anyhow::Result<TestResponse> {
        let mut stream = TcpStream::connect(self.addr).await?;
        stream.write_all(raw.as_bytes()).await?;

        let mut response = String::new();
        stream.read_to_string(&mut response).await?;

        let (head, body) = response
            .split_once("\r\n\r\n")
            .ok_or_else(|| anyhow::anyhow!("malformed response: {response}"))?;

        let status = head
            .split_whitespace()
            .nth(1)
            .ok_or_else(|| anyhow::anyhow!("missing status line"))?
            .parse()?;

        Ok(TestResponse {
            status,
            body: serde_json::from_str(body)?,
        })
    }

    pub async fn shutdown(self) -> anyhow::Result<()> {
        self.running.shutdown().await
    }
}
