use std::{
	fmt,
	net::IpAddr,
	sync::{Arc, PoisonError, RwLock},
};

use rmpv::Value;
use tracing::trace;

type ReceiveFn = Arc<dyn Fn(IpAddr, Value) + Send + Sync>;

/// The single receive callback of a stream.
///
/// Setting a callback replaces the previous one, there is no fan-out to several subscribers.
/// Messages arriving while no callback is set are dropped.
#[derive(Clone, Default)]
pub(crate) struct ListenerSlot(Arc<RwLock<Option<ReceiveFn>>>);

impl fmt::Debug for ListenerSlot {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("ListenerSlot")
			.field("is_set", &self.is_set())
			.finish()
	}
}

impl ListenerSlot {
	pub fn set(&self, callback: impl Fn(IpAddr, Value) + Send + Sync + 'static) {
		self.0
			.write()
			.unwrap_or_else(PoisonError::into_inner)
			.replace(Arc::new(callback));
	}

	pub fn clear(&self) {
		self.0.write().unwrap_or_else(PoisonError::into_inner).take();
	}

	pub fn is_set(&self) -> bool {
		self.0
			.read()
			.unwrap_or_else(PoisonError::into_inner)
			.is_some()
	}

	pub fn deliver(&self, from: IpAddr, payload: Value) {
		// Cloned out so the callback is free to replace itself
		let callback = self.0.read().unwrap_or_else(PoisonError::into_inner).clone();

		match callback {
			Some(callback) => callback(from, payload),
			None => trace!(%from, "No receive listener set, dropping message;"),
		}
	}
}
