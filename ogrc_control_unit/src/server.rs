//! GS-232 TCP server.
//!
//! One tokio task per connection. Lines are read independently per
//! connection; `P` is answered straight from the published snapshots and
//! everything else goes through the global [`Dispatcher`] queue. A
//! malformed or overlong line gets `ERROR` and the connection stays open.

use std::net::SocketAddr;
use std::sync::Arc;

use ogrc_common::consts::MAX_LINE_LEN;
use ogrc_common::rotator::CommandError;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::command::dispatcher::{DispatchHandle, Dispatcher, report};
use crate::command::protocol::{Command, Response, parse};
use crate::config::ServerConfig;
use crate::error::RuntimeError;
use crate::state::axis::AxisSet;

/// Bound listener plus the dispatcher it feeds.
pub struct Server {
    listener: TcpListener,
    axes: Arc<AxisSet>,
    dispatch: DispatchHandle,
}

impl Server {
    /// Bind the listener and start the dispatcher task.
    ///
    /// Must be called from inside a tokio runtime.
    pub async fn bind(config: &ServerConfig, axes: Arc<AxisSet>) -> Result<Self, RuntimeError> {
        let listener = TcpListener::bind(config.listen_addr()).await?;
        let (dispatch, _task) = Dispatcher::spawn(Arc::clone(&axes), config.queue_depth);
        info!(addr = %listener.local_addr()?, "GS-232 server listening");
        Ok(Self {
            listener,
            axes,
            dispatch,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, RuntimeError> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept connections until `shutdown` turns true.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) -> Result<(), RuntimeError> {
        loop {
            tokio::select! {
                accepted = self.listener.accept() => {
                    let (stream, peer) = match accepted {
                        Ok(conn) => conn,
                        Err(e) => {
                            warn!("accept failed: {e}");
                            continue;
                        }
                    };
                    let session = Session {
                        axes: Arc::clone(&self.axes),
                        dispatch: self.dispatch.clone(),
                        peer,
                    };
                    tokio::spawn(session.serve(stream, shutdown.clone()));
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        info!("GS-232 server stopped");
        Ok(())
    }
}

/// Outcome of reading one line.
enum Line {
    Text(String),
    TooLong,
    Eof,
}

struct Session {
    axes: Arc<AxisSet>,
    dispatch: DispatchHandle,
    peer: SocketAddr,
}

impl Session {
    async fn serve(self, stream: TcpStream, mut shutdown: watch::Receiver<bool>) {
        debug!(peer = %self.peer, "client connected");
        let (read, mut write) = stream.into_split();
        let mut reader = BufReader::new(read);

        loop {
            let line = tokio::select! {
                line = read_line(&mut reader) => line,
                _ = shutdown.changed() => break,
            };
            let response = match line {
                Ok(Line::Text(text)) => match parse(&text) {
                    Some(command) => self.answer(command).await,
                    None => continue,
                },
                Ok(Line::TooLong) => {
                    warn!(peer = %self.peer, "overlong line discarded");
                    Response::Error(CommandError::Protocol("line too long".into()))
                }
                Ok(Line::Eof) => break,
                Err(e) => {
                    debug!(peer = %self.peer, "read failed: {e}");
                    break;
                }
            };

            let mut out = response.to_string();
            out.push('\n');
            if let Err(e) = write.write_all(out.as_bytes()).await {
                debug!(peer = %self.peer, "write failed: {e}");
                break;
            }
        }
        debug!(peer = %self.peer, "client disconnected");
    }

    async fn answer(&self, command: Command) -> Response {
        debug!(peer = %self.peer, ?command, "command");
        if command.is_mutating() {
            return self.dispatch.submit(command).await;
        }
        match command {
            Command::Malformed(raw) => Response::Error(CommandError::Protocol(raw)),
            _ => Response::Position(report(&self.axes)),
        }
    }
}

/// Read one `\n`-terminated line of at most [`MAX_LINE_LEN`] bytes.
///
/// An overlong line is consumed up to its terminator and reported as
/// `TooLong`.
async fn read_line<R>(reader: &mut BufReader<R>) -> std::io::Result<Line>
where
    R: tokio::io::AsyncRead + Unpin,
{
    let mut buf = Vec::with_capacity(64);
    let limit = MAX_LINE_LEN as u64 + 1;
    let n = (&mut *reader).take(limit).read_until(b'\n', &mut buf).await?;
    if n == 0 {
        return Ok(Line::Eof);
    }
    if buf.last() != Some(&b'\n') && buf.len() > MAX_LINE_LEN {
        let mut scratch = Vec::new();
        loop {
            scratch.clear();
            let n = (&mut *reader).take(1024).read_until(b'\n', &mut scratch).await?;
            if n == 0 || scratch.last() == Some(&b'\n') {
                break;
            }
        }
        return Ok(Line::TooLong);
    }
    Ok(Line::Text(String::from_utf8_lossy(&buf).into_owned()))
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn lines(input: &'static [u8]) -> Vec<String> {
        let mut reader = BufReader::new(input);
        let mut out = Vec::new();
        loop {
            match read_line(&mut reader).await.unwrap() {
                Line::Text(t) => out.push(t.trim_end().to_string()),
                Line::TooLong => out.push("<too long>".into()),
                Line::Eof => break,
            }
        }
        out
    }

    #[tokio::test]
    async fn splits_lines_and_keeps_unterminated_tail() {
        assert_eq!(lines(b"AZ10\r\nP\nS").await, ["AZ10", "P", "S"]);
    }

    #[tokio::test]
    async fn overlong_line_is_discarded_whole() {
        let mut input = vec![b'A'; MAX_LINE_LEN * 3];
        input.extend_from_slice(b"\nP\n");
        let input: &'static [u8] = Box::leak(input.into_boxed_slice());
        assert_eq!(lines(input).await, ["<too long>", "P"]);
    }

    #[tokio::test]
    async fn line_at_limit_is_accepted() {
        let mut input = vec![b'9'; MAX_LINE_LEN];
        input.push(b'\n');
        let input: &'static [u8] = Box::leak(input.into_boxed_slice());
        let got = lines(input).await;
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].len(), MAX_LINE_LEN);
    }
}
