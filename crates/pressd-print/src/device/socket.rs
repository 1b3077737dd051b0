// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Raw TCP print transport (HP JetDirect / AppSocket, port 9100 by
// convention). The simplest print protocol there is: open a socket, dump
// bytes, keep the connection open for any status back-channel the
// printer chooses to send.

use std::time::Duration;

use async_trait::async_trait;
use pressd_core::{CoreError, Result};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::{debug, info};

use super::DeviceTransport;

const CHUNK_SIZE: usize = 8192;
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

pub struct SocketTransport {
    stream: TcpStream,
    host: String,
    port: u16,
}

impl SocketTransport {
    pub async fn connect(host: &str, port: u16, _read_timeout: Duration) -> Result<Self> {
        let addr = format!("{host}:{port}");
        info!(addr = %addr, "connecting to socket device");

        let stream = tokio::time::timeout(CONNECT_TIMEOUT, TcpStream::connect(&addr))
            .await
            .map_err(|_| CoreError::DeviceTimeout(CONNECT_TIMEOUT))?
            .map_err(|e| CoreError::DeviceUnavailable(format!("{addr}: {e}")))?;

        Ok(Self {
            stream,
            host: host.to_string(),
            port,
        })
    }
}

#[async_trait]
impl DeviceTransport for SocketTransport {
    async fn write(&mut self, data: &[u8]) -> Result<()> {
        let mut sent = 0;
        for chunk in data.chunks(CHUNK_SIZE) {
            self.stream.write_all(chunk).await?;
            sent += chunk.len();
            debug!(sent, total = data.len(), "socket transport progress");
        }
        self.stream.flush().await?;
        Ok(())
    }

    async fn read(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize> {
        tokio::time::timeout(timeout, self.stream.read(buf))
            .await
            .map_err(|_| CoreError::DeviceTimeout(timeout))?
            .map_err(CoreError::DeviceIo)
    }

    async fn close(&mut self) {
        if let Err(e) = self.stream.shutdown().await {
            debug!(host = %self.host, port = self.port, error = %e, "socket shutdown failed");
        }
    }
}
