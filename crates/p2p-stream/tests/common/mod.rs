#![allow(dead_code)]

use sd_p2p_stream::MulticastPipe;

use std::{
	io,
	net::{IpAddr, Ipv4Addr, SocketAddr},
	sync::{Arc, Mutex},
	time::Duration,
};

use async_trait::async_trait;
use tokio::time::timeout;

pub const RECV_TIMEOUT: Duration = Duration::from_secs(5);

type Datagram = (Vec<u8>, SocketAddr);

/// An in-process multicast group, every datagram sent by a member reaches all members
/// (the sender included, like a socket with multicast loop enabled).
#[derive(Debug, Clone, Default)]
pub struct MemoryHub {
	members: Arc<Mutex<Vec<flume::Sender<Datagram>>>>,
}

impl MemoryHub {
	pub fn join(&self, addr: SocketAddr) -> Arc<MemoryPipe> {
		let (tx, rx) = flume::unbounded();
		self.members.lock().unwrap().push(tx);

		Arc::new(MemoryPipe {
			addr,
			hub: self.clone(),
			rx,
		})
	}

	/// Drop every member's sending side, their pipes report closed once drained.
	pub fn close(&self) {
		self.members.lock().unwrap().clear();
	}
}

#[derive(Debug)]
pub struct MemoryPipe {
	addr: SocketAddr,
	hub: MemoryHub,
	rx: flume::Receiver<Datagram>,
}

#[async_trait]
impl MulticastPipe for MemoryPipe {
	fn local_addr(&self) -> io::Result<SocketAddr> {
		Ok(self.addr)
	}

	async fn send(&self, payload: &[u8]) -> io::Result<()> {
		for member in self.hub.members.lock().unwrap().iter() {
			let _ = member.send((payload.to_vec(), self.addr));
		}

		Ok(())
	}

	async fn recv(&self) -> io::Result<Option<Datagram>> {
		Ok(self.rx.recv_async().await.ok())
	}
}

pub fn member_addr(last_octet: u8, port: u16) -> SocketAddr {
	SocketAddr::new(IpAddr::V4(Ipv4Addr::new(10, 1, 0, last_octet)), port)
}

/// Wait for the next message pushed by a receive listener.
pub async fn next_message<T>(rx: &flume::Receiver<T>) -> T {
	timeout(RECV_TIMEOUT, rx.recv_async())
		.await
		.expect("timed out waiting for a message")
		.expect("listener channel closed")
}
