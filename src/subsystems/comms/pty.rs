//! PTY (console) channel: reads lines from stdin, runs them as commands for
//! one local user and prints the replies.
//!
//! Runs until the `shutdown` token is cancelled (Ctrl-C) or input closes.

use std::sync::Arc;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::AppError;
use super::CommsState;

pub struct PtyChannel {
    channel_id: String,
    user_id: String,
    state: Arc<CommsState>,
}

impl PtyChannel {
    pub fn new(channel_id: impl Into<String>, user_id: impl Into<String>, state: Arc<CommsState>) -> Self {
        Self { channel_id: channel_id.into(), user_id: user_id.into(), state }
    }

    /// Serve stdin/stdout.
    pub async fn run(self, shutdown: CancellationToken) -> Result<(), AppError> {
        info!(channel_id = %self.channel_id, user_id = %self.user_id, "pty channel started, Ctrl-C to quit");
        let mut out = tokio::io::stdout();
        out.write_all(b"---------------------------------\n zaban console  (/help, Ctrl-C to quit)\n---------------------------------\n")
            .await?;
        self.serve(BufReader::new(tokio::io::stdin()), out, shutdown).await
    }

    /// Line loop over any reader/writer pair.
    pub async fn serve<R, W>(&self, reader: R, mut out: W, shutdown: CancellationToken) -> Result<(), AppError>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut lines = reader.lines();

        loop {
            out.write_all(b"> ").await?;
            out.flush().await?;

            tokio::select! {
                biased;

                _ = shutdown.cancelled() => {
                    out.write_all(b"\n[pty] shutdown signal received, closing console\n").await?;
                    info!(channel_id = %self.channel_id, "pty channel shutting down");
                    break;
                }

                line = lines.next_line() => {
                    match line {
                        Err(e) => {
                            warn!(channel_id = %self.channel_id, "pty read error: {e}");
                            break;
                        }
                        Ok(None) => {
                            info!(channel_id = %self.channel_id, "pty input closed");
                            break;
                        }
                        Ok(Some(input)) => {
                            let input = input.trim();
                            if input.is_empty() { continue; }
                            debug!(input = %input, "pty received line");

                            for reply in self.state.handle(&self.user_id, input).await {
                                out.write_all(reply.as_bytes()).await?;
                                out.write_all(b"\n").await?;
                            }
                        }
                    }
                }
            }
        }

        out.flush().await?;
        Ok(())
    }
}
