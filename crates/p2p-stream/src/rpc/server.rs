use std::{io, net::SocketAddr, time::Duration};

use tokio::{
	net::{TcpListener, TcpStream},
	spawn,
	task::{JoinHandle, JoinSet},
	time::timeout,
};
use tracing::{debug, error, info, trace, warn, Instrument};

use super::{
	wire::{read_frame, write_frame, Request, Response},
	HandlerRegistry,
};
use crate::TransportError;

const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// A bound RPC server dispatching calls to a [`HandlerRegistry`].
///
/// The accept loop and every open connection stop on [`RpcServer::shutdown`] or when the server
/// is dropped. Connections idle for longer than `idle_timeout` are closed by the server.
#[derive(Debug)]
pub(crate) struct RpcServer {
	local_addr: SocketAddr,
	cancel_tx: flume::Sender<()>,
	handle: JoinHandle<()>,
}

impl RpcServer {
	pub async fn bind(
		addr: SocketAddr,
		handlers: HandlerRegistry,
		max_frame_size: usize,
		idle_timeout: Duration,
	) -> io::Result<Self> {
		let listener = TcpListener::bind(addr).await?;
		let local_addr = listener.local_addr()?;

		let (cancel_tx, cancel_rx) = flume::bounded(1);

		let handle = spawn(
			run_loop(listener, handlers, max_frame_size, idle_timeout, cancel_rx).in_current_span(),
		);

		info!(%local_addr, "RPC server listening;");

		Ok(Self {
			local_addr,
			cancel_tx,
			handle,
		})
	}

	pub const fn local_addr(&self) -> SocketAddr {
		self.local_addr
	}

	/// Stop accepting new connections, close the open ones and release the port.
	pub async fn shutdown(mut self) {
		if self.cancel_tx.send_async(()).await.is_err() {
			// Accept loop is already gone
			return;
		}

		// The listener and the open connections are only dropped once the accept loop returns
		if timeout(SHUTDOWN_TIMEOUT, &mut self.handle).await.is_err() {
			warn!(local_addr = %self.local_addr, "RPC server shutdown timed out;");
		}
	}
}

impl Drop for RpcServer {
	fn drop(&mut self) {
		self.handle.abort();
	}
}

async fn run_loop(
	listener: TcpListener,
	handlers: HandlerRegistry,
	max_frame_size: usize,
	idle_timeout: Duration,
	cancel_rx: flume::Receiver<()>,
) {
	// Dropping the set aborts every connection still open, also when this loop is aborted
	let mut connections = JoinSet::new();

	loop {
		tokio::select! {
			accepted = listener.accept() => match accepted {
				Ok((stream, caller)) => {
					trace!(%caller, "Accepted RPC connection;");
					connections.spawn(
						handle_connection(
							stream,
							caller,
							handlers.clone(),
							max_frame_size,
							idle_timeout,
						)
						.in_current_span(),
					);
				}
				Err(e) => {
					error!(?e, "Failed to accept RPC connection;");
				}
			},

			Some(res) = connections.join_next(), if !connections.is_empty() => {
				if let Err(e) = res {
					if e.is_panic() {
						error!(?e, "RPC connection task panicked;");
					}
				}
			}

			_ = cancel_rx.recv_async() => {
				debug!(open_connections = connections.len(), "RPC server shutting down");
				break;
			}
		}
	}

	connections.shutdown().await;
}

async fn handle_connection(
	mut stream: TcpStream,
	caller: SocketAddr,
	handlers: HandlerRegistry,
	max_frame_size: usize,
	idle_timeout: Duration,
) {
	loop {
		let Ok(res) = timeout(idle_timeout, read_frame(&mut stream, max_frame_size)).await else {
			debug!(%caller, ?idle_timeout, "Closing idle RPC connection");
			break;
		};

		let Request { method, params } = match res {
			Ok(request) => request,
			Err(TransportError::Io(e)) if e.kind() == io::ErrorKind::UnexpectedEof => {
				// Caller is done with this connection
				break;
			}
			Err(e) => {
				warn!(?e, %caller, "Failed to read RPC request;");
				break;
			}
		};

		trace!(%caller, %method, "Dispatching RPC request;");

		let response = Response::from(handlers.dispatch(caller, &method, params));

		if let Err(e) = write_frame(&mut stream, &response, max_frame_size).await {
			warn!(?e, %caller, %method, "Failed to write RPC response;");
			break;
		}
	}
}
