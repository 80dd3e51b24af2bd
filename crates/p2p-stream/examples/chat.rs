//! Line based chat between two peers, or between every member of a multicast group.
//!
//! ```text
//! cargo run --example chat -- 127.0.0.1:7001 127.0.0.1:7002
//! cargo run --example chat -- 127.0.0.1:7002 127.0.0.1:7001
//! cargo run --example chat -- 239.1.1.1:7100 239.1.1.1:7100
//! ```

use sd_p2p_stream::{ServiceDescriptor, StartReader, Stream, StreamConfig, Value};

use std::{env, error::Error};

use tokio::io::{stdin, AsyncBufReadExt, BufReader};
use tracing::info;

fn descriptor(arg: Option<String>) -> Result<ServiceDescriptor, Box<dyn Error>> {
	let arg = arg.ok_or("usage: chat <local host:port> <peer host:port>")?;
	let (host, port) = arg
		.rsplit_once(':')
		.ok_or_else(|| format!("expected host:port, got '{arg}'"))?;

	Ok(ServiceDescriptor::new(host, port.parse()?))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
	tracing_subscriber::fmt()
		.with_env_filter(
			tracing_subscriber::EnvFilter::try_from_default_env()
				.unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
		)
		.init();

	let mut args = env::args().skip(1);
	let local = descriptor(args.next())?;
	let peer = descriptor(args.next())?;

	let stream = Stream::from_service(&local, StartReader::Now, &StreamConfig::default()).await?;
	stream.set_receive_listener(|from, payload| match payload {
		Value::String(text) => println!("{from}> {}", text.as_str().unwrap_or_default()),
		other => println!("{from}> {other}"),
	});

	let writer = stream.new_writer(&peer)?;
	info!(kind = %stream.kind(), %local, %peer, "Chat ready, type a line to send it;");

	let mut lines = BufReader::new(stdin()).lines();
	while let Some(line) = lines.next_line().await? {
		// Failures are already logged by the writer
		let _ = writer.write(line).await;
	}

	Ok(())
}
