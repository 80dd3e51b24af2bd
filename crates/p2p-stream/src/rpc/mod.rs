//! A small request/response RPC over TCP.
//!
//! Every request names a method and carries positional params, the server looks the method up in
//! a [`HandlerRegistry`] and answers with either a value or a [`Fault`]. The peer address of the
//! TCP connection is handed to the handler, which is how readers know who sent a message.

use std::{
	collections::HashMap,
	fmt,
	net::SocketAddr,
	panic::{self, AssertUnwindSafe},
	sync::{Arc, PoisonError, RwLock},
};

use rmpv::Value;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::error;

mod client;
mod server;
pub(crate) mod wire;

pub(crate) use client::RpcClient;
pub(crate) use server::RpcServer;

/// Method every unicast reader answers to, with params `(sender, recipient, payload)`.
pub const RESERVED_METHOD: &str = "message";

/// A failure reported by the remote side of a call.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("remote fault <code={code}>: {message}")]
pub struct Fault {
	pub code: i32,
	pub message: String,
}

impl Fault {
	pub const METHOD_NOT_FOUND: i32 = -32601;
	pub const INVALID_PARAMS: i32 = -32602;
	pub const INTERNAL_ERROR: i32 = -32603;

	pub fn new(code: i32, message: impl Into<String>) -> Self {
		Self {
			code,
			message: message.into(),
		}
	}

	pub(crate) fn method_not_found(method: &str) -> Self {
		Self::new(
			Self::METHOD_NOT_FOUND,
			format!("method '{method}' is not registered"),
		)
	}

	pub fn invalid_params(message: impl Into<String>) -> Self {
		Self::new(Self::INVALID_PARAMS, message)
	}

	pub(crate) fn handler_panicked(method: &str) -> Self {
		Self::new(
			Self::INTERNAL_ERROR,
			format!("handler for method '{method}' panicked"),
		)
	}
}

type HandlerFn = dyn Fn(SocketAddr, Vec<Value>) -> Result<Value, Fault> + Send + Sync;

/// A remotely callable method.
#[derive(Clone)]
pub(crate) struct Handler(Arc<HandlerFn>);

impl fmt::Debug for Handler {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "Handler")
	}
}

impl Handler {
	pub fn new(
		f: impl Fn(SocketAddr, Vec<Value>) -> Result<Value, Fault> + Send + Sync + 'static,
	) -> Self {
		Self(Arc::new(f))
	}

	pub fn call(&self, caller: SocketAddr, params: Vec<Value>) -> Result<Value, Fault> {
		(self.0)(caller, params)
	}
}

/// Named methods a server dispatches to. Shared with the running server, so methods can be
/// added before or after it's bound.
#[derive(Debug, Clone, Default)]
pub(crate) struct HandlerRegistry(Arc<RwLock<HashMap<String, Handler>>>);

impl HandlerRegistry {
	/// Returns `true` if a handler was already registered under this name.
	pub fn insert(&self, name: impl Into<String>, handler: Handler) -> bool {
		self.0
			.write()
			.unwrap_or_else(PoisonError::into_inner)
			.insert(name.into(), handler)
			.is_some()
	}

	pub fn remove(&self, name: &str) -> bool {
		self.0
			.write()
			.unwrap_or_else(PoisonError::into_inner)
			.remove(name)
			.is_some()
	}

	pub fn get(&self, name: &str) -> Option<Handler> {
		self.0
			.read()
			.unwrap_or_else(PoisonError::into_inner)
			.get(name)
			.cloned()
	}

	pub fn contains(&self, name: &str) -> bool {
		self.0
			.read()
			.unwrap_or_else(PoisonError::into_inner)
			.contains_key(name)
	}

	/// Run the method named by `method`, answering with a fault when it isn't registered or when
	/// its handler panics.
	pub fn dispatch(
		&self,
		caller: SocketAddr,
		method: &str,
		params: Vec<Value>,
	) -> Result<Value, Fault> {
		// Handler is cloned out so it can register more methods while running
		let handler = self
			.get(method)
			.ok_or_else(|| Fault::method_not_found(method))?;

		panic::catch_unwind(AssertUnwindSafe(|| handler.call(caller, params))).unwrap_or_else(|_| {
			error!(%caller, %method, "RPC handler panicked;");
			Err(Fault::handler_panicked(method))
		})
	}
}
