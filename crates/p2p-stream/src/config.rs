use std::{
	net::{IpAddr, Ipv4Addr},
	time::Duration,
};

use serde::{Deserialize, Serialize};

const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_MAX_FRAME_SIZE: usize = 16 * 1024 * 1024; // 16 MiB
const DEFAULT_MULTICAST_TTL: u32 = 1; // Stay on the local network

/// Tunables shared by every stream, reader and writer.
///
/// Missing fields fall back to their defaults, so this can be nested in a larger node config.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
	/// How long a writer waits for the TCP connection to a peer.
	pub connect_timeout: Duration,
	/// How long a writer waits for the remote method to answer, once connected.
	pub call_timeout: Duration,
	/// How long a reader keeps a connection open while waiting for the next call.
	pub idle_timeout: Duration,
	/// Biggest RPC frame we're willing to send or read.
	pub max_frame_size: usize,
	/// How many ports after the descriptor's one a reader may try when it's taken.
	///
	/// `0` disables the search, a taken port is then reported as a conflict.
	pub port_search: u16,
	/// Address unicast readers bind on.
	pub bind_address: IpAddr,
	/// Interface multicast groups are joined on.
	pub multicast_interface: Ipv4Addr,
	pub multicast_ttl: u32,
}

impl Default for StreamConfig {
	fn default() -> Self {
		Self {
			connect_timeout: DEFAULT_CONNECT_TIMEOUT,
			call_timeout: DEFAULT_CALL_TIMEOUT,
			idle_timeout: DEFAULT_IDLE_TIMEOUT,
			max_frame_size: DEFAULT_MAX_FRAME_SIZE,
			port_search: 0,
			bind_address: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
			multicast_interface: Ipv4Addr::UNSPECIFIED,
			multicast_ttl: DEFAULT_MULTICAST_TTL,
		}
	}
}
