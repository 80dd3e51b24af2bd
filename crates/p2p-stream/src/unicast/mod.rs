use std::{
	io,
	net::{IpAddr, SocketAddr},
	sync::{Mutex, PoisonError},
};

use rmpv::Value;
use tracing::{debug, info, warn};

use crate::{
	listener::ListenerSlot,
	rpc::{Fault, Handler, HandlerRegistry, RpcServer, RESERVED_METHOD},
	ConfigurationError, Error, ServiceDescriptor, StartReader, StreamConfig,
};

mod writer;

pub use writer::UnicastWriter;

/// Where a unicast reader is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReaderState {
	/// Not started yet, or shut down.
	Unbound,
	/// Accepting calls on this address.
	Bound(SocketAddr),
	/// The last start attempt failed, it can be retried.
	Failed,
}

#[derive(Debug)]
enum Reader {
	Unbound,
	Bound(RpcServer),
	Failed,
}

/// The receiving end of a unicast peer: an RPC server on the descriptor's port.
///
/// Other peers send messages by calling its `message` method, extra methods can be added with
/// [`UnicastStream::register_handler`]. Writers to other peers are created with
/// [`UnicastStream::new_writer`] and aren't tied to this reader's lifetime.
#[derive(Debug)]
pub struct UnicastStream {
	descriptor: ServiceDescriptor,
	port: u16,
	config: StreamConfig,
	listener: ListenerSlot,
	handlers: HandlerRegistry,
	reader: Mutex<Reader>,
}

impl UnicastStream {
	pub async fn new(
		descriptor: &ServiceDescriptor,
		start_reader: StartReader,
		config: &StreamConfig,
	) -> Result<Self, Error> {
		let port = descriptor.require_port()?;
		let listener = ListenerSlot::default();
		let handlers = HandlerRegistry::default();

		handlers.insert(RESERVED_METHOD, message_handler(listener.clone()));

		let stream = Self {
			descriptor: descriptor.clone(),
			port,
			config: config.clone(),
			listener,
			handlers,
			reader: Mutex::new(Reader::Unbound),
		};

		if start_reader == StartReader::Now {
			stream.start_reader().await?;
		}

		Ok(stream)
	}

	#[must_use]
	pub const fn descriptor(&self) -> &ServiceDescriptor {
		&self.descriptor
	}

	/// Set the callback for incoming messages, replacing the previous one.
	pub fn set_receive_listener(&self, callback: impl Fn(IpAddr, Value) + Send + Sync + 'static) {
		self.listener.set(callback);
	}

	pub fn clear_receive_listener(&self) {
		self.listener.clear();
	}

	pub(crate) const fn listener(&self) -> &ListenerSlot {
		&self.listener
	}

	#[must_use]
	pub fn reader_state(&self) -> ReaderState {
		match &*self.reader.lock().unwrap_or_else(PoisonError::into_inner) {
			Reader::Unbound => ReaderState::Unbound,
			Reader::Bound(server) => ReaderState::Bound(server.local_addr()),
			Reader::Failed => ReaderState::Failed,
		}
	}

	#[must_use]
	pub fn local_addr(&self) -> Option<SocketAddr> {
		match self.reader_state() {
			ReaderState::Bound(addr) => Some(addr),
			ReaderState::Unbound | ReaderState::Failed => None,
		}
	}

	/// Bind the reader, returning the port it listens on.
	///
	/// When the port is taken this fails with [`Error::PortConflict`], unless
	/// [`StreamConfig::port_search`] allows trying the following ports.
	pub async fn start_reader(&self) -> Result<u16, Error> {
		if matches!(self.reader_state(), ReaderState::Bound(_)) {
			return Err(Error::ReaderAlreadyStarted);
		}

		let res = self.bind().await;

		let mut reader = self.reader.lock().unwrap_or_else(PoisonError::into_inner);
		if matches!(*reader, Reader::Bound(_)) {
			// Someone else started the reader while we were binding
			return Err(Error::ReaderAlreadyStarted);
		}

		match res {
			Ok(server) => {
				let port = server.local_addr().port();
				*reader = Reader::Bound(server);
				Ok(port)
			}
			Err(e) => {
				*reader = Reader::Failed;
				Err(e)
			}
		}
	}

	async fn bind(&self) -> Result<RpcServer, Error> {
		let mut last_conflict = None;

		for offset in 0..=self.config.port_search {
			let Some(port) = self.port.checked_add(offset) else {
				break;
			};

			match RpcServer::bind(
				SocketAddr::new(self.config.bind_address, port),
				self.handlers.clone(),
				self.config.max_frame_size,
				self.config.idle_timeout,
			)
			.await
			{
				Ok(server) => {
					if port != self.port {
						info!(
							requested = self.port,
							port, "Unicast reader bound on an alternate port;"
						);
					}

					return Ok(server);
				}
				Err(e) if e.kind() == io::ErrorKind::AddrInUse => {
					warn!(port, "Unicast reader port already in use;");
					last_conflict = Some(e);
				}
				Err(source) => return Err(Error::Bind { port, source }),
			}
		}

		Err(Error::PortConflict {
			port: self.port,
			source: last_conflict.unwrap_or_else(|| io::ErrorKind::AddrInUse.into()),
		})
	}

	/// Stop the reader, it goes back to [`ReaderState::Unbound`] and can be started again.
	pub async fn shutdown(&self) {
		let reader = std::mem::replace(
			&mut *self.reader.lock().unwrap_or_else(PoisonError::into_inner),
			Reader::Unbound,
		);

		if let Reader::Bound(server) = reader {
			server.shutdown().await;
			debug!(port = self.port, "Unicast reader stopped");
		}
	}

	/// Expose `handler` as the remote method `name`, replacing any previous handler of that name.
	///
	/// The handler gets the caller's address and the call's params. Works whether or not the
	/// reader is started.
	pub fn register_handler(
		&self,
		name: impl Into<String>,
		handler: impl Fn(SocketAddr, Vec<Value>) -> Result<Value, Fault> + Send + Sync + 'static,
	) -> Result<(), ConfigurationError> {
		let name = name.into();
		if name == RESERVED_METHOD {
			return Err(ConfigurationError::ReservedHandlerName(name));
		}
		if name.is_empty() {
			return Err(ConfigurationError::EmptyHandlerName);
		}

		if self.handlers.insert(name.clone(), Handler::new(handler)) {
			debug!(%name, "Replaced reader handler");
		}

		Ok(())
	}

	/// Remove a handler added with [`UnicastStream::register_handler`].
	pub fn unregister_handler(&self, name: &str) -> bool {
		name != RESERVED_METHOD && self.handlers.remove(name)
	}

	#[must_use]
	pub fn has_handler(&self, name: &str) -> bool {
		self.handlers.contains(name)
	}

	/// Create a writer to another peer, sharing this stream's config.
	pub fn new_writer(&self, peer: &ServiceDescriptor) -> Result<UnicastWriter, ConfigurationError> {
		UnicastWriter::new(peer, &self.config)
	}
}

fn message_handler(listener: ListenerSlot) -> Handler {
	Handler::new(move |caller, params| {
		let [_sender, _recipient, payload]: [Value; 3] =
			params.try_into().map_err(|params: Vec<Value>| {
				Fault::invalid_params(format!(
					"'{RESERVED_METHOD}' takes 3 params, got {}",
					params.len()
				))
			})?;

		listener.deliver(caller.ip(), payload);

		Ok(Value::Boolean(true))
	})
}
