//! Drives a [`Messenger`] over a TCP stream: the messenger never touches the
//! socket, this loop shuttles its bytes and ticks it between reads.

use std::time::Duration;

use anyhow::{bail, Context, Result};
use messenger_core::Messenger;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

const READ_BUF: usize = 64 * 1024;

pub struct Driver {
    messenger: Messenger,
    stream: TcpStream,
    heartbeat: Duration,
    buf: Vec<u8>,
    eof: bool,
}

impl Driver {
    pub async fn connect(messenger: Messenger, addr: &str, heartbeat: Duration) -> Result<Self> {
        let stream = TcpStream::connect(addr)
            .await
            .with_context(|| format!("connect to {}", addr))?;
        stream.set_nodelay(true)?;
        tracing::info!(%addr, "tcp connected");
        Ok(Self {
            messenger,
            stream,
            heartbeat,
            buf: vec![0u8; READ_BUF],
            eof: false,
        })
    }

    /// Run `op` and write whatever it left in the sink.
    pub async fn call<T>(
        &mut self,
        op: impl FnOnce(&mut Messenger, &mut Vec<u8>) -> messenger_core::Result<T>,
    ) -> Result<T> {
        let mut out = Vec::new();
        let value = op(&mut self.messenger, &mut out)?;
        self.write(&out).await?;
        Ok(value)
    }

    /// Poll `check` between turns until it reports true.
    pub async fn until(
        &mut self,
        mut check: impl FnMut(&mut Messenger) -> messenger_core::Result<bool>,
    ) -> Result<()> {
        loop {
            if check(&mut self.messenger)? {
                return Ok(());
            }
            if self.eof {
                bail!("connection closed by peer");
            }
            self.turn().await?;
        }
    }

    /// Flush pending output, then wait for input or one heartbeat interval.
    pub async fn turn(&mut self) -> Result<()> {
        let mut out = Vec::new();
        self.messenger.pop(&mut out, false);
        self.write(&out).await?;

        match tokio::time::timeout(self.heartbeat, self.stream.read(&mut self.buf)).await {
            Ok(Ok(0)) => {
                self.eof = true;
                tracing::debug!("peer closed the socket");
                self.messenger.closed()?;
            }
            Ok(Ok(n)) => {
                let mut offset = 0;
                while offset < n {
                    let taken = self.messenger.push(&self.buf[offset..n])?;
                    if taken == 0 {
                        bail!("input buffer full");
                    }
                    offset += taken;
                }
            }
            Ok(Err(e)) => return Err(e).context("read"),
            Err(_) => {
                out.clear();
                self.messenger.heartbeat(&mut out);
                self.write(&out).await?;
            }
        }
        Ok(())
    }

    /// Orderly stop: keep turning until the peer confirms the close.
    pub async fn shutdown(mut self) -> Result<()> {
        let mut out = Vec::new();
        let mut done = self.messenger.stop(&mut out);
        self.write(&out).await?;
        while !done && !self.eof {
            self.turn().await?;
            out.clear();
            done = self.messenger.stop(&mut out);
            self.write(&out).await?;
        }
        if let Err(e) = self.stream.shutdown().await {
            tracing::debug!(error = %e, "socket shutdown");
        }
        Ok(())
    }

    async fn write(&mut self, bytes: &[u8]) -> Result<()> {
        if bytes.is_empty() || self.eof {
            return Ok(());
        }
        self.stream.write_all(bytes).await.context("write")?;
        Ok(())
    }
}
