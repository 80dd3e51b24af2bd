use std::time::Duration;

use rmpv::Value;
use tokio::{net::TcpStream, time::timeout};
use tracing::trace;

use super::wire::{read_frame, write_frame, Request, Response};
use crate::{StreamConfig, TransportError};

/// Calls methods on one remote RPC server. Each call uses its own connection.
#[derive(Debug, Clone)]
pub(crate) struct RpcClient {
	host: String,
	port: u16,
	endpoint: String,
	connect_timeout: Duration,
	call_timeout: Duration,
	max_frame_size: usize,
}

impl RpcClient {
	pub fn new(host: impl Into<String>, port: u16, config: &StreamConfig) -> Self {
		let host = host.into();
		Self {
			endpoint: format!("{host}:{port}"),
			host,
			port,
			connect_timeout: config.connect_timeout,
			call_timeout: config.call_timeout,
			max_frame_size: config.max_frame_size,
		}
	}

	pub fn endpoint(&self) -> &str {
		&self.endpoint
	}

	pub async fn call(&self, method: &str, params: Vec<Value>) -> Result<Value, TransportError> {
		let mut stream = timeout(
			self.connect_timeout,
			TcpStream::connect((self.host.as_str(), self.port)),
		)
		.await
		.map_err(|_| TransportError::ConnectTimeout {
			endpoint: self.endpoint.clone(),
			after: self.connect_timeout,
		})?
		.map_err(|source| TransportError::Connect {
			endpoint: self.endpoint.clone(),
			source,
		})?;

		trace!(endpoint = %self.endpoint, %method, "Calling remote method;");

		let request = Request {
			method: method.to_string(),
			params,
		};

		timeout(self.call_timeout, self.exchange(&mut stream, &request))
			.await
			.map_err(|_| TransportError::CallTimeout {
				method: method.to_string(),
				after: self.call_timeout,
			})?
	}

	async fn exchange(
		&self,
		stream: &mut TcpStream,
		request: &Request,
	) -> Result<Value, TransportError> {
		write_frame(stream, request, self.max_frame_size).await?;
		read_frame::<Response>(stream, self.max_frame_size)
			.await?
			.into()
	}
}
