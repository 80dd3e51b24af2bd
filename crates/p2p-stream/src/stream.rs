use std::net::IpAddr;

use rmpv::Value;
use tracing::debug;

use crate::{
	listener::ListenerSlot, AddressKind, Error, MulticastStream, ServiceDescriptor, StreamConfig,
	TransportError, UnicastStream, UnicastWriter,
};

/// Whether a unicast reader is bound when its stream is created.
///
/// Deferring lets the caller register handlers before any call can come in. Multicast streams
/// always start their reader right away.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StartReader {
	#[default]
	Now,
	Deferred,
}

/// A message stream to a service, over the transport its address calls for.
#[derive(Debug)]
pub enum Stream {
	Unicast(UnicastStream),
	Multicast(MulticastStream),
}

impl Stream {
	/// Build the stream for `descriptor`.
	///
	/// The descriptor must have a port. Multicast group addresses get a [`MulticastStream`], any
	/// other address (or none) gets a [`UnicastStream`].
	pub async fn from_service(
		descriptor: &ServiceDescriptor,
		start_reader: StartReader,
		config: &StreamConfig,
	) -> Result<Self, Error> {
		descriptor.require_port()?;

		let kind = descriptor.kind();
		debug!(%descriptor, %kind, "Creating stream");

		Ok(match kind {
			AddressKind::Multicast => {
				Self::Multicast(MulticastStream::new(descriptor, config)?)
			}
			AddressKind::Unicast => {
				Self::Unicast(UnicastStream::new(descriptor, start_reader, config).await?)
			}
		})
	}

	#[must_use]
	pub const fn kind(&self) -> AddressKind {
		match self {
			Self::Unicast(_) => AddressKind::Unicast,
			Self::Multicast(_) => AddressKind::Multicast,
		}
	}

	#[must_use]
	pub fn descriptor(&self) -> &ServiceDescriptor {
		match self {
			Self::Unicast(stream) => stream.descriptor(),
			Self::Multicast(stream) => stream.descriptor(),
		}
	}

	#[must_use]
	pub const fn as_unicast(&self) -> Option<&UnicastStream> {
		match self {
			Self::Unicast(stream) => Some(stream),
			Self::Multicast(_) => None,
		}
	}

	#[must_use]
	pub const fn as_multicast(&self) -> Option<&MulticastStream> {
		match self {
			Self::Unicast(_) => None,
			Self::Multicast(stream) => Some(stream),
		}
	}

	/// Set the callback for incoming messages.
	///
	/// A stream holds a single callback: setting one **replaces** the previous one, which won't
	/// be called again. Messages arriving while no callback is set are dropped, not buffered.
	pub fn set_receive_listener(&self, callback: impl Fn(IpAddr, Value) + Send + Sync + 'static) {
		self.listener().set(callback);
	}

	pub fn clear_receive_listener(&self) {
		self.listener().clear();
	}

	fn listener(&self) -> &ListenerSlot {
		match self {
			Self::Unicast(stream) => stream.listener(),
			Self::Multicast(stream) => stream.listener(),
		}
	}

	/// Start the reader and return the port it listens on.
	///
	/// Only does something for a unicast stream created with [`StartReader::Deferred`].
	pub async fn start_reader(&self) -> Result<u16, Error> {
		match self {
			Self::Unicast(stream) => stream.start_reader().await,
			Self::Multicast(stream) => Ok(stream.start_reader()),
		}
	}

	/// A writer to `peer`. For multicast streams the writer is the stream itself and `peer` is
	/// ignored.
	pub fn new_writer(&self, peer: &ServiceDescriptor) -> Result<Writer, Error> {
		Ok(match self {
			Self::Unicast(stream) => Writer::Unicast(stream.new_writer(peer)?),
			Self::Multicast(stream) => Writer::Multicast(stream.new_writer(peer)),
		})
	}
}

/// The sending side of a [`Stream`].
#[derive(Debug, Clone)]
pub enum Writer {
	Unicast(UnicastWriter),
	Multicast(MulticastStream),
}

impl Writer {
	/// Send `payload`. Failures are logged where they happen and returned, nothing is retried.
	pub async fn write(&self, payload: impl Into<Value>) -> Result<(), TransportError> {
		match self {
			Self::Unicast(writer) => writer.write(payload).await,
			Self::Multicast(stream) => stream.write(payload).await,
		}
	}

	#[must_use]
	pub const fn kind(&self) -> AddressKind {
		match self {
			Self::Unicast(_) => AddressKind::Unicast,
			Self::Multicast(_) => AddressKind::Multicast,
		}
	}
}
