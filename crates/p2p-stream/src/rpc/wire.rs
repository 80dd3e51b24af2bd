//! Frames are a `u32` little-endian length followed by a MessagePack body.

use std::io;

use rmpv::Value;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::{Fault, TransportError};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct Request {
	pub method: String,
	pub params: Vec<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) enum Response {
	Ok(Value),
	Fault(Fault),
}

impl From<Result<Value, Fault>> for Response {
	fn from(result: Result<Value, Fault>) -> Self {
		match result {
			Ok(value) => Self::Ok(value),
			Err(fault) => Self::Fault(fault),
		}
	}
}

impl From<Response> for Result<Value, TransportError> {
	fn from(response: Response) -> Self {
		match response {
			Response::Ok(value) => Ok(value),
			Response::Fault(fault) => Err(fault.into()),
		}
	}
}

pub(crate) async fn write_frame(
	io: &mut (impl AsyncWrite + Unpin),
	value: &impl Serialize,
	max_frame_size: usize,
) -> Result<(), TransportError> {
	let body = rmp_serde::to_vec_named(value)?;
	let len = u32::try_from(body.len())
		.ok()
		.filter(|len| *len as usize <= max_frame_size)
		.ok_or(TransportError::FrameTooLarge {
			size: body.len(),
			limit: max_frame_size,
		})?;

	io.write_u32_le(len).await?;
	io.write_all(&body).await?;
	io.flush().await?;

	Ok(())
}

pub(crate) async fn read_frame<T: DeserializeOwned>(
	stream: &mut (impl AsyncRead + Unpin),
	max_frame_size: usize,
) -> Result<T, TransportError> {
	let len = stream.read_u32_le().await?;
	if len as usize > max_frame_size {
		return Err(TransportError::FrameTooLarge {
			size: len as usize,
			limit: max_frame_size,
		});
	}

	// Grows with the bytes actually received, not with what the length prefix claims
	let mut body = Vec::new();
	stream.take(u64::from(len)).read_to_end(&mut body).await?;
	if body.len() != len as usize {
		return Err(io::Error::from(io::ErrorKind::UnexpectedEof).into());
	}

	rmp_serde::from_slice(&body).map_err(Into::into)
}

pub(crate) fn encode_payload(payload: &Value) -> Result<Vec<u8>, TransportError> {
	rmp_serde::to_vec_named(payload).map_err(Into::into)
}

pub(crate) fn decode_payload(bytes: &[u8]) -> Result<Value, TransportError> {
	rmp_serde::from_slice(bytes).map_err(Into::into)
}
