use std::{
	io,
	net::{IpAddr, Ipv4Addr, SocketAddr, SocketAddrV4},
	sync::Arc,
};

use rmpv::Value;
use tokio::{spawn, task::JoinHandle};
use tracing::{debug, error, warn, Instrument};

use crate::{
	listener::ListenerSlot,
	rpc::wire::{decode_payload, encode_payload},
	ConfigurationError, Error, ServiceDescriptor, StreamConfig, TransportError,
};

mod pipe;

pub use pipe::{MulticastPipe, UdpPipe};

/// A stream over a multicast group.
///
/// One pipe is used both to send to the group and to receive from it, so there's no separate
/// writer: [`MulticastStream::new_writer`] hands back the stream itself. The reader starts as
/// soon as the stream is created. Clones share the same pipe, which is closed once the last
/// clone is dropped.
#[derive(Debug, Clone)]
pub struct MulticastStream(Arc<Inner>);

#[derive(Debug)]
struct Inner {
	descriptor: ServiceDescriptor,
	group: SocketAddrV4,
	pipe: Arc<dyn MulticastPipe>,
	listener: ListenerSlot,
	recv_task: JoinHandle<()>,
}

impl Drop for Inner {
	fn drop(&mut self) {
		self.recv_task.abort();
	}
}

impl MulticastStream {
	/// Join the group described by `descriptor` over UDP.
	///
	/// Must be called from within a tokio runtime, the receive task is spawned right away.
	pub fn new(descriptor: &ServiceDescriptor, config: &StreamConfig) -> Result<Self, Error> {
		let group = group_addr(descriptor)?;
		let pipe = UdpPipe::join(group, config).map_err(Error::Pipe)?;

		Self::with_pipe(descriptor, Arc::new(pipe))
	}

	/// Use an already opened `pipe` to the group described by `descriptor`.
	///
	/// Must be called from within a tokio runtime, the receive task is spawned right away.
	pub fn with_pipe(
		descriptor: &ServiceDescriptor,
		pipe: Arc<dyn MulticastPipe>,
	) -> Result<Self, Error> {
		let group = group_addr(descriptor)?;

		debug!(%group, "Starting multicast stream");

		let listener = ListenerSlot::default();
		let recv_task =
			spawn(recv_loop(Arc::clone(&pipe), listener.clone(), group).in_current_span());

		Ok(Self(Arc::new(Inner {
			descriptor: descriptor.clone(),
			group,
			pipe,
			listener,
			recv_task,
		})))
	}

	#[must_use]
	pub fn descriptor(&self) -> &ServiceDescriptor {
		&self.0.descriptor
	}

	#[must_use]
	pub fn group(&self) -> SocketAddrV4 {
		self.0.group
	}

	/// Address datagrams from this stream are sent from, as seen by the other members.
	pub fn local_addr(&self) -> io::Result<SocketAddr> {
		self.0.pipe.local_addr()
	}

	/// Set the callback for incoming messages, replacing the previous one.
	pub fn set_receive_listener(&self, callback: impl Fn(IpAddr, Value) + Send + Sync + 'static) {
		self.0.listener.set(callback);
	}

	pub fn clear_receive_listener(&self) {
		self.0.listener.clear();
	}

	pub(crate) fn listener(&self) -> &ListenerSlot {
		&self.0.listener
	}

	/// The reader is always running, this only reports the group's port.
	#[must_use]
	pub fn start_reader(&self) -> u16 {
		self.0.group.port()
	}

	/// Send `payload` to every member of the group. There is no acknowledgement.
	pub async fn write(&self, payload: impl Into<Value>) -> Result<(), TransportError> {
		let bytes = encode_payload(&payload.into())?;

		self.0
			.pipe
			.send(&bytes)
			.await
			.map_err(TransportError::from)
			.inspect_err(|e| {
				error!(?e, group = %self.0.group, "Failed to write message to multicast group;");
			})
	}

	/// The group is both read and written through the same pipe, so the writer is this stream.
	#[must_use]
	pub fn new_writer(&self, _peer: &ServiceDescriptor) -> Self {
		self.clone()
	}
}

fn group_addr(descriptor: &ServiceDescriptor) -> Result<SocketAddrV4, ConfigurationError> {
	let address = descriptor.require_address()?;
	let port = descriptor.require_port()?;

	let ip = address
		.parse::<Ipv4Addr>()
		.map_err(|source| ConfigurationError::InvalidAddress {
			address: address.to_string(),
			source,
		})?;

	if !ip.is_multicast() {
		return Err(ConfigurationError::NotMulticast(address.to_string()));
	}

	Ok(SocketAddrV4::new(ip, port))
}

async fn recv_loop(pipe: Arc<dyn MulticastPipe>, listener: ListenerSlot, group: SocketAddrV4) {
	loop {
		match pipe.recv().await {
			Ok(Some((bytes, from))) => match decode_payload(&bytes) {
				Ok(payload) => listener.deliver(from.ip(), payload),
				Err(e) => warn!(?e, %from, %group, "Dropping undecodable multicast datagram;"),
			},
			Ok(None) => {
				debug!(%group, "Multicast pipe closed");
				break;
			}
			Err(e) if is_transient(&e) => {
				warn!(?e, %group, "Transient error receiving from multicast group;");
			}
			Err(e) => {
				error!(?e, %group, "Failed to receive from multicast group, stopping reader;");
				break;
			}
		}
	}
}

fn is_transient(e: &io::Error) -> bool {
	matches!(
		e.kind(),
		io::ErrorKind::ConnectionRefused
			| io::ErrorKind::ConnectionReset
			| io::ErrorKind::Interrupted
			| io::ErrorKind::WouldBlock
			| io::ErrorKind::TimedOut
	)
}
