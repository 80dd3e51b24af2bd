use rmpv::Value;
use tokio::{spawn, task::JoinHandle};
use tracing::{error, Instrument};

use crate::{
	rpc::{RpcClient, RESERVED_METHOD},
	ConfigurationError, ServiceDescriptor, StreamConfig, TransportError,
};

/// Sends messages and custom calls to one remote unicast reader.
///
/// Failures are logged and returned, a writer never retries on its own.
#[derive(Debug, Clone)]
pub struct UnicastWriter {
	peer: ServiceDescriptor,
	client: RpcClient,
}

impl UnicastWriter {
	pub fn new(peer: &ServiceDescriptor, config: &StreamConfig) -> Result<Self, ConfigurationError> {
		let address = peer.require_address()?;
		let port = peer.require_port()?;

		Ok(Self {
			client: RpcClient::new(address, port, config),
			peer: peer.clone(),
		})
	}

	#[must_use]
	pub const fn peer(&self) -> &ServiceDescriptor {
		&self.peer
	}

	/// `host:port` of the remote reader.
	#[must_use]
	pub fn endpoint(&self) -> &str {
		self.client.endpoint()
	}

	/// Deliver `payload` to the remote reader's receive listener.
	pub async fn write(&self, payload: impl Into<Value>) -> Result<(), TransportError> {
		self.client
			.call(
				RESERVED_METHOD,
				// Sender and recipient are left to the transport
				vec![Value::Nil, Value::Nil, payload.into()],
			)
			.await
			.map(|_| ())
			.inspect_err(|e| {
				error!(?e, peer = %self.endpoint(), "Failed to write message to peer;");
			})
	}

	/// Call the remote method `method` and wait for its answer.
	pub async fn custom_request(
		&self,
		method: &str,
		params: Vec<Value>,
	) -> Result<Value, TransportError> {
		self.client.call(method, params).await.inspect_err(|e| {
			error!(?e, peer = %self.endpoint(), %method, "Failed custom request to peer;");
		})
	}

	/// Call the remote method `method` in the background, `on_response` gets the outcome once
	/// the call completes.
	pub fn custom_request_with(
		&self,
		method: impl Into<String>,
		params: Vec<Value>,
		on_response: impl FnOnce(Result<Value, TransportError>) + Send + 'static,
	) -> JoinHandle<()> {
		let writer = self.clone();
		let method = method.into();

		spawn(
			async move { on_response(writer.custom_request(&method, params).await) }.in_current_span(),
		)
	}
}
