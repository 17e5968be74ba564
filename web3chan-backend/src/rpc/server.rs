use super::methods::{dispatch, Params, RpcMethod};
use super::protocol::{RpcError, RpcRequest, RpcResponse};
use crate::supervisor::Supervisor;
use futures_util::FutureExt;
use std::panic::AssertUnwindSafe;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;

/// Longest request line accepted
pub const MAX_REQUEST_BYTES: u64 = 64 * 1024;

/// How long a client may take to send its request line
pub const REQUEST_READ_TIMEOUT: Duration = Duration::from_secs(10);

/// Line-delimited JSON-RPC over TCP, one request per connection
#[derive(Clone)]
pub struct ControlPlaneServer {
    supervisor: Arc<Supervisor>,
    read_timeout: Duration,
}

impl ControlPlaneServer {
    pub fn new(supervisor: Arc<Supervisor>) -> Self {
        Self {
            supervisor,
            read_timeout: REQUEST_READ_TIMEOUT,
        }
    }

    pub fn with_read_timeout(mut self, read_timeout: Duration) -> Self {
        self.read_timeout = read_timeout;
        self
    }

    pub async fn bind(address: &str) -> std::io::Result<TcpListener> {
        TcpListener::bind(address).await
    }

    /// Accept connections until cancelled
    pub async fn run(self, listener: TcpListener, shutdown: CancellationToken) {
        if let Ok(addr) = listener.local_addr() {
            log::info!("running JSON-RPC server on: {}", addr);
        }

        loop {
            let accepted = tokio::select! {
                _ = shutdown.cancelled() => break,
                accepted = listener.accept() => accepted,
            };

            match accepted {
                Ok((stream, peer)) => {
                    log::debug!("RPC connection from {}", peer);
                    let server = self.clone();
                    tokio::spawn(async move {
                        if let Err(e) = server.handle_connection(stream).await {
                            log::error!("RPC connection error: {}", e);
                        }
                    });
                }
                Err(e) => log::error!("RPC accept error: {}", e),
            }
        }
        log::info!("JSON-RPC server stopped");
    }

    async fn handle_connection(&self, stream: TcpStream) -> std::io::Result<()> {
        let (read, mut write) = stream.into_split();
        let mut reader = BufReader::new(read).take(MAX_REQUEST_BYTES);

        let mut line = String::new();
        let response = match tokio::time::timeout(self.read_timeout, reader.read_line(&mut line)).await {
            Ok(Ok(_)) if !line.ends_with('\n') && reader.limit() == 0 => {
                log::error!("RPC request exceeds {} bytes", MAX_REQUEST_BYTES);
                RpcResponse::error(None, RpcError::parse_error())
            }
            Ok(Ok(_)) => self.handle_line(&line).await,
            Ok(Err(e)) => {
                log::error!("RPC command parser exception: {}", e);
                RpcResponse::error(None, RpcError::parse_error())
            }
            Err(_) => {
                log::error!("RPC request not received within {:?}", self.read_timeout);
                RpcResponse::error(None, RpcError::parse_error())
            }
        };

        let mut body = serde_json::to_vec(&response)?;
        body.push(b'\n');
        write.write_all(&body).await?;
        write.shutdown().await
    }

    /// Turn one request line into its response
    pub async fn handle_line(&self, line: &str) -> RpcResponse {
        let request = match RpcRequest::parse(line) {
            Ok(request) => request,
            Err(error) => {
                if error.code == RpcError::PARSE_ERROR {
                    log::error!("RPC command parser exception: {}", line.trim());
                }
                return RpcResponse::error(None, error);
            }
        };

        let Ok(method) = RpcMethod::from_str(&request.method) else {
            return RpcResponse::error(Some(request.id), RpcError::method_not_found());
        };

        let (args, kwargs) = request.arguments();
        log::debug!("JSON-RPC method called: {} {:?} {:?}", request.method, args, kwargs);

        let call = dispatch(&self.supervisor, method, Params::new(args, kwargs));
        match AssertUnwindSafe(call).catch_unwind().await {
            Ok(Ok(result)) => RpcResponse::success(request.id, result),
            Ok(Err(error)) => RpcResponse::error(Some(request.id), error),
            Err(_) => {
                log::error!("error while executing RPC method {}: handler panicked", request.method);
                RpcResponse::error(Some(request.id), RpcError::internal_error("Internal error"))
            }
        }
    }
}
