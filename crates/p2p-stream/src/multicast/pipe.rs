use std::{
	fmt, io,
	net::{Ipv4Addr, SocketAddr, SocketAddrV4},
};

use async_trait::async_trait;
use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::UdpSocket;
use tracing::{debug, warn};

use crate::StreamConfig;

/// Biggest payload a single datagram can carry.
const MAX_DATAGRAM_SIZE: usize = 65_507;

/// A bidirectional pipe to one multicast group.
///
/// How (and if) delivery is made reliable is up to the implementation.
#[async_trait]
pub trait MulticastPipe: fmt::Debug + Send + Sync + 'static {
	/// Address the pipe sends from.
	fn local_addr(&self) -> io::Result<SocketAddr>;

	/// Send one datagram to the group.
	async fn send(&self, payload: &[u8]) -> io::Result<()>;

	/// Wait for the next datagram from the group, with the address it came from.
	///
	/// `None` means the pipe is closed and won't yield anything anymore.
	async fn recv(&self) -> io::Result<Option<(Vec<u8>, SocketAddr)>>;
}

/// Best-effort multicast over a single UDP socket.
///
/// The socket is opened with address (and port) reuse, so several pipes, in this process or
/// others, can join the same group on the same port.
#[derive(Debug)]
pub struct UdpPipe {
	socket: UdpSocket,
	group: SocketAddrV4,
	local_addr: SocketAddr,
}

impl UdpPipe {
	pub fn join(group: SocketAddrV4, config: &StreamConfig) -> io::Result<Self> {
		let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
		socket.set_reuse_address(true)?;
		#[cfg(all(unix, not(any(target_os = "solaris", target_os = "illumos"))))]
		socket.set_reuse_port(true)?;
		socket.bind(&SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, group.port()).into())?;

		socket.join_multicast_v4(group.ip(), &config.multicast_interface)?;
		socket.set_multicast_if_v4(&config.multicast_interface)?;
		socket.set_multicast_loop_v4(true)?;
		socket.set_multicast_ttl_v4(config.multicast_ttl)?;
		socket.set_nonblocking(true)?;

		let socket = UdpSocket::from_std(socket.into())?;

		// Bound on every interface, receivers see the one the group is routed through
		let local_addr = SocketAddr::new(
			source_ip(group, config.multicast_interface).into(),
			socket.local_addr()?.port(),
		);

		debug!(%group, %local_addr, "Joined multicast group");

		Ok(Self {
			socket,
			group,
			local_addr,
		})
	}

	#[must_use]
	pub const fn group(&self) -> SocketAddrV4 {
		self.group
	}
}

/// Address datagrams to `group` leave from: the configured interface, or the one the system
/// routes the group through.
fn source_ip(group: SocketAddrV4, interface: Ipv4Addr) -> Ipv4Addr {
	if !interface.is_unspecified() {
		return interface;
	}

	// Connecting a datagram socket sends nothing, it only resolves the route
	let routed = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))
		.and_then(|route| {
			route.connect(&group.into())?;
			route.local_addr()
		})
		.map(|addr| addr.as_socket_ipv4().map(|addr| *addr.ip()));

	match routed {
		Ok(Some(ip)) => ip,
		Ok(None) => interface,
		Err(e) => {
			warn!(?e, %group, "Failed to resolve the interface of the multicast group;");
			interface
		}
	}
}

#[async_trait]
impl MulticastPipe for UdpPipe {
	fn local_addr(&self) -> io::Result<SocketAddr> {
		Ok(self.local_addr)
	}

	async fn send(&self, payload: &[u8]) -> io::Result<()> {
		if payload.len() > MAX_DATAGRAM_SIZE {
			return Err(io::Error::new(
				io::ErrorKind::InvalidInput,
				format!(
					"payload of {} bytes doesn't fit in a datagram",
					payload.len()
				),
			));
		}

		self.socket.send_to(payload, self.group).await.map(|_| ())
	}

	async fn recv(&self) -> io::Result<Option<(Vec<u8>, SocketAddr)>> {
		let mut buf = vec![0u8; MAX_DATAGRAM_SIZE];
		let (len, from) = self.socket.recv_from(&mut buf).await?;
		buf.truncate(len);

		Ok(Some((buf, from)))
	}
}
