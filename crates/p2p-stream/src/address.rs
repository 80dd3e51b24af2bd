use std::fmt;

use serde::{Deserialize, Serialize};

/// First octet of the IPv4 multicast block (`224.0.0.0/4`).
const MULTICAST_FIRST_OCTET_MIN: u8 = 224;
/// Last octet of the IPv4 multicast block.
const MULTICAST_FIRST_OCTET_MAX: u8 = 239;

/// The kind of transport a service address calls for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AddressKind {
	/// One-to-one delivery, carried over RPC.
	Unicast,
	/// One-to-many delivery to a shared group, carried over a multicast pipe.
	Multicast,
}

impl AddressKind {
	#[must_use]
	pub const fn is_multicast(self) -> bool {
		matches!(self, Self::Multicast)
	}
}

impl fmt::Display for AddressKind {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::Unicast => write!(f, "unicast"),
			Self::Multicast => write!(f, "multicast"),
		}
	}
}

/// Decide whether `address` is a multicast group or a unicast peer.
///
/// Only the first dotted octet is looked at. Missing, empty or malformed addresses are treated
/// as unicast, the error (if any) shows up when a transport actually needs the address.
#[must_use]
pub fn classify(address: Option<&str>) -> AddressKind {
	address
		.and_then(|address| address.split_once('.'))
		.and_then(|(first, _)| first.trim().parse::<u8>().ok())
		.filter(|octet| (MULTICAST_FIRST_OCTET_MIN..=MULTICAST_FIRST_OCTET_MAX).contains(octet))
		.map_or(AddressKind::Unicast, |_| AddressKind::Multicast)
}
