//!
//! # P2P Stream
//!
//! Message streams between peers found through local presence. A stream is built from an
//! already resolved [`ServiceDescriptor`] and picks its transport from the address:
//! - Unicast addresses get an RPC reader bound on the descriptor's port, and writers which call
//!   the reader's `message` method on other peers;
//! - Multicast addresses (`224.0.0.0` to `239.255.255.255`) get a single pipe joined to the group,
//!   used both to send and to receive;
//!
//! Either way, inbound messages are handed to one receive listener together with the sender's
//! address.
//!
//! ## Basic example
//!
//! ```no_run
//! use sd_p2p_stream::{ServiceDescriptor, StartReader, Stream, StreamConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), sd_p2p_stream::Error> {
//!     let config = StreamConfig::default();
//!     let stream = Stream::from_service(
//!         &ServiceDescriptor::new("127.0.0.1", 9100),
//!         StartReader::Now,
//!         &config,
//!     )
//!     .await?;
//!
//!     stream.set_receive_listener(|from, payload| println!("{from} sent {payload}"));
//!
//!     let writer = stream.new_writer(&ServiceDescriptor::new("127.0.0.1", 9100))?;
//!     if let Err(e) = writer.write("hello").await {
//!         eprintln!("peer unreachable: {e}");
//!     }
//!
//!     Ok(())
//! }
//! ```

#![warn(
	clippy::all,
	clippy::pedantic,
	clippy::correctness,
	clippy::perf,
	clippy::style,
	clippy::suspicious,
	clippy::complexity,
	clippy::nursery,
	clippy::unwrap_used,
	unused_qualifications,
	rust_2018_idioms,
	trivial_casts,
	trivial_numeric_casts,
	unused_allocation,
	clippy::unnecessary_cast,
	clippy::cast_lossless,
	clippy::cast_possible_truncation,
	clippy::cast_possible_wrap,
	clippy::cast_precision_loss,
	clippy::cast_sign_loss,
	clippy::dbg_macro,
	clippy::deprecated_cfg_attr,
	clippy::separated_literal_suffix,
	deprecated
)]
#![forbid(deprecated_in_future)]
#![allow(clippy::missing_errors_doc, clippy::module_name_repetitions)]

mod address;
mod config;
mod descriptor;
mod error;
mod listener;
mod multicast;
mod rpc;
mod stream;
mod unicast;

pub use address::{classify, AddressKind};
pub use config::StreamConfig;
pub use descriptor::ServiceDescriptor;
pub use error::{ConfigurationError, Error, Result, TransportError};
pub use multicast::{MulticastPipe, MulticastStream, UdpPipe};
pub use rpc::{Fault, RESERVED_METHOD};
pub use stream::{StartReader, Stream, Writer};
pub use unicast::{ReaderState, UnicastStream, UnicastWriter};

/// Opaque payload carried by every message.
pub use rmpv::Value;
