use std::{io, net::AddrParseError, time::Duration};

use thiserror::Error;

use crate::Fault;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// A descriptor or registration that can never work. These are programmer errors.
#[derive(Debug, Error)]
pub enum ConfigurationError {
	#[error("service descriptor has no port")]
	MissingPort,
	#[error("service descriptor has no address")]
	MissingAddress,
	#[error("invalid address <address='{address}'>: {source}")]
	InvalidAddress {
		address: String,
		#[source]
		source: AddrParseError,
	},
	#[error("address is not a multicast group <address='{0}'>")]
	NotMulticast(String),
	#[error("handler name '{0}' is reserved")]
	ReservedHandlerName(String),
	#[error("handler name can't be empty")]
	EmptyHandlerName,
}

/// A call or send that failed on the way to, or at, the remote side.
///
/// These are expected operational conditions, they're logged where they happen and handed
/// back to the caller as values.
#[derive(Debug, Error)]
pub enum TransportError {
	#[error("connect to '{endpoint}': {source}")]
	Connect {
		endpoint: String,
		#[source]
		source: io::Error,
	},
	#[error("connect to '{endpoint}' timed out after {after:?}")]
	ConnectTimeout { endpoint: String, after: Duration },
	#[error("call to '{method}' timed out after {after:?}")]
	CallTimeout { method: String, after: Duration },
	#[error("io error: {0}")]
	Io(#[from] io::Error),
	#[error("encode frame: {0}")]
	Encode(#[from] rmp_serde::encode::Error),
	#[error("decode frame: {0}")]
	Decode(#[from] rmp_serde::decode::Error),
	#[error("frame of {size} bytes exceeds the limit of {limit} bytes")]
	FrameTooLarge { size: usize, limit: usize },
	#[error(transparent)]
	Fault(#[from] Fault),
}

#[derive(Debug, Error)]
pub enum Error {
	#[error(transparent)]
	Configuration(#[from] ConfigurationError),
	#[error("port {port} is already in use")]
	PortConflict {
		port: u16,
		#[source]
		source: io::Error,
	},
	#[error("bind reader on port {port}: {source}")]
	Bind {
		port: u16,
		#[source]
		source: io::Error,
	},
	#[error("reader is already started")]
	ReaderAlreadyStarted,
	#[error("open multicast pipe: {0}")]
	Pipe(#[source] io::Error),
}
