use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{address::classify, AddressKind, ConfigurationError};

/// Where a service can be reached, as resolved by presence.
///
/// An empty address and a port of `0` are both treated as absent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ServiceDescriptor {
	pub address: Option<String>,
	pub port: Option<u16>,
}

impl ServiceDescriptor {
	pub fn new(address: impl Into<String>, port: u16) -> Self {
		Self {
			address: Some(address.into()),
			port: Some(port),
		}
	}

	/// A descriptor with only a port, used for readers that listen on every interface.
	#[must_use]
	pub const fn with_port(port: u16) -> Self {
		Self {
			address: None,
			port: Some(port),
		}
	}

	#[must_use]
	pub fn address(&self) -> Option<&str> {
		self.address.as_deref().filter(|address| !address.is_empty())
	}

	#[must_use]
	pub fn port(&self) -> Option<u16> {
		self.port.filter(|port| *port != 0)
	}

	#[must_use]
	pub fn kind(&self) -> AddressKind {
		classify(self.address())
	}

	pub(crate) fn require_address(&self) -> Result<&str, ConfigurationError> {
		self.address().ok_or(ConfigurationError::MissingAddress)
	}

	pub(crate) fn require_port(&self) -> Result<u16, ConfigurationError> {
		self.port().ok_or(ConfigurationError::MissingPort)
	}
}

impl fmt::Display for ServiceDescriptor {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match (self.address(), self.port()) {
			(Some(address), Some(port)) => write!(f, "{address}:{port}"),
			(Some(address), None) => write!(f, "{address}:<no port>"),
			(None, Some(port)) => write!(f, "*:{port}"),
			(None, None) => write!(f, "<empty>"),
		}
	}
}
