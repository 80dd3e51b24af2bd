use sd_p2p_stream::{
	ConfigurationError, Error, Fault, ReaderState, ServiceDescriptor, StartReader, Stream,
	StreamConfig, TransportError, UnicastStream, UnicastWriter, Value,
};

use std::{
	io,
	net::{IpAddr, Ipv4Addr},
	sync::{Arc, Mutex},
	time::Duration,
};

use serde::Serialize;
use tokio::{
	io::{AsyncReadExt, AsyncWriteExt},
	net::TcpStream,
	sync::oneshot,
	time::{sleep, timeout},
};
use tracing_test::traced_test;

mod common;

use common::next_message;

const LOCALHOST: &str = "127.0.0.1";

#[derive(Serialize)]
struct RawCall<'a> {
	method: &'a str,
	params: Vec<Value>,
}

/// Call `message` over an already open connection, without waiting for the answer.
async fn send_message(conn: &mut TcpStream, payload: &str) -> io::Result<()> {
	let body = rmp_serde::to_vec_named(&RawCall {
		method: "message",
		params: vec![Value::Nil, Value::Nil, Value::from(payload)],
	})
	.unwrap();

	conn.write_u32_le(u32::try_from(body.len()).unwrap()).await?;
	conn.write_all(&body).await
}

/// Wait for the reader to close `conn`.
async fn wait_closed(conn: &mut TcpStream) {
	let mut buf = Vec::new();
	// Either a clean close or a reset, as long as it happens
	let _ = timeout(Duration::from_secs(5), conn.read_to_end(&mut buf))
		.await
		.expect("connection was left open");
}

#[tokio::test]
#[traced_test]
async fn write_reaches_receive_listener_once() {
	let config = StreamConfig::default();
	let a_descriptor = ServiceDescriptor::new(LOCALHOST, 19100);

	let a = Stream::from_service(&a_descriptor, StartReader::Now, &config)
		.await
		.unwrap();
	let (tx, rx) = flume::unbounded();
	a.set_receive_listener(move |from, payload| {
		tx.send((from, payload)).unwrap();
	});

	let b = Stream::from_service(
		&ServiceDescriptor::new(LOCALHOST, 19101),
		StartReader::Now,
		&config,
	)
	.await
	.unwrap();

	let writer = b.new_writer(&a_descriptor).unwrap();
	writer.write("hello").await.unwrap();

	assert_eq!(
		next_message(&rx).await,
		(IpAddr::V4(Ipv4Addr::LOCALHOST), Value::from("hello"))
	);
	assert!(rx.is_empty());
}

#[tokio::test]
#[traced_test]
async fn write_to_unreachable_peer_fails_without_panicking() {
	let config = StreamConfig {
		connect_timeout: Duration::from_millis(200),
		..Default::default()
	};

	let writer = UnicastWriter::new(&ServiceDescriptor::new("10.0.0.9", 9), &config).unwrap();

	let res = writer.write("hello").await;
	assert!(matches!(
		res,
		Err(TransportError::ConnectTimeout { .. } | TransportError::Connect { .. })
	));
	assert!(logs_contain("Failed to write message to peer"));
}

#[tokio::test]
#[traced_test]
async fn write_to_closed_port_is_refused() {
	let writer = UnicastWriter::new(
		&ServiceDescriptor::new(LOCALHOST, 19199),
		&StreamConfig::default(),
	)
	.unwrap();

	assert!(matches!(
		writer.write(Value::Binary(vec![1, 2, 3])).await,
		Err(TransportError::Connect { .. })
	));
}

#[tokio::test]
#[traced_test]
async fn custom_handlers_are_callable_remotely() {
	let config = StreamConfig::default();
	let descriptor = ServiceDescriptor::new(LOCALHOST, 19102);

	let reader = UnicastStream::new(&descriptor, StartReader::Deferred, &config)
		.await
		.unwrap();
	assert_eq!(reader.reader_state(), ReaderState::Unbound);

	assert!(matches!(
		reader.register_handler("message", |_, _| Ok(Value::Nil)),
		Err(ConfigurationError::ReservedHandlerName(_))
	));

	let seen = Arc::new(Mutex::new(Vec::new()));
	reader
		.register_handler("ping", {
			let seen = Arc::clone(&seen);
			move |caller, params| {
				seen.lock().unwrap().push((caller.ip(), params));
				Ok(Value::from("pong"))
			}
		})
		.unwrap();

	assert_eq!(reader.start_reader().await.unwrap(), 19102);
	assert!(matches!(reader.reader_state(), ReaderState::Bound(addr) if addr.port() == 19102));

	let writer = reader.new_writer(&descriptor).unwrap();
	let response = writer
		.custom_request("ping", vec![Value::from(7), Value::from("seven")])
		.await
		.unwrap();

	assert_eq!(response, Value::from("pong"));
	assert_eq!(
		*seen.lock().unwrap(),
		vec![(
			IpAddr::V4(Ipv4Addr::LOCALHOST),
			vec![Value::from(7), Value::from("seven")]
		)]
	);

	// Handlers can also be added while the reader is running
	reader
		.register_handler("add", |_, params| {
			let sum = params
				.iter()
				.map(|value| value.as_i64().ok_or_else(|| Fault::invalid_params("not a number")))
				.sum::<Result<i64, Fault>>()?;
			Ok(Value::from(sum))
		})
		.unwrap();

	assert_eq!(
		writer
			.custom_request("add", vec![Value::from(2), Value::from(40)])
			.await
			.unwrap(),
		Value::from(42)
	);

	let fault = writer
		.custom_request("add", vec![Value::from("two")])
		.await
		.unwrap_err();
	assert!(matches!(
		fault,
		TransportError::Fault(Fault { code: Fault::INVALID_PARAMS, .. })
	));
}

#[tokio::test]
#[traced_test]
async fn unknown_method_is_a_remote_fault() {
	let config = StreamConfig::default();
	let descriptor = ServiceDescriptor::new(LOCALHOST, 19103);

	let reader = UnicastStream::new(&descriptor, StartReader::Now, &config)
		.await
		.unwrap();

	let res = reader
		.new_writer(&descriptor)
		.unwrap()
		.custom_request("missing", vec![])
		.await;

	assert!(matches!(
		res,
		Err(TransportError::Fault(Fault { code: Fault::METHOD_NOT_FOUND, .. }))
	));
	assert!(logs_contain("Failed custom request to peer"));
}

#[tokio::test]
#[traced_test]
async fn custom_request_with_calls_back() {
	let config = StreamConfig::default();
	let descriptor = ServiceDescriptor::new(LOCALHOST, 19104);

	let reader = UnicastStream::new(&descriptor, StartReader::Deferred, &config)
		.await
		.unwrap();
	reader
		.register_handler("echo", |_, mut params| {
			params
				.pop()
				.ok_or_else(|| Fault::invalid_params("nothing to echo"))
		})
		.unwrap();
	reader.start_reader().await.unwrap();

	let writer = reader.new_writer(&descriptor).unwrap();

	let (tx, rx) = oneshot::channel();
	let handle = writer.custom_request_with("echo", vec![Value::from("back")], move |res| {
		tx.send(res).unwrap();
	});

	handle.await.unwrap();
	assert_eq!(rx.await.unwrap().unwrap(), Value::from("back"));
}

#[tokio::test]
#[traced_test]
async fn port_conflict_fails_the_reader() {
	let config = StreamConfig::default();
	let descriptor = ServiceDescriptor::new(LOCALHOST, 19110);

	let first = UnicastStream::new(&descriptor, StartReader::Now, &config)
		.await
		.unwrap();

	let second = UnicastStream::new(&descriptor, StartReader::Deferred, &config)
		.await
		.unwrap();
	assert!(matches!(
		second.start_reader().await,
		Err(Error::PortConflict { port: 19110, .. })
	));
	assert_eq!(second.reader_state(), ReaderState::Failed);

	// Building with an immediate start reports the conflict right away
	assert!(matches!(
		UnicastStream::new(&descriptor, StartReader::Now, &config).await,
		Err(Error::PortConflict { port: 19110, .. })
	));

	// Once the port is released, a failed reader can be started again
	first.shutdown().await;
	assert_eq!(first.reader_state(), ReaderState::Unbound);

	assert_eq!(second.start_reader().await.unwrap(), 19110);
	assert!(matches!(
		second.start_reader().await,
		Err(Error::ReaderAlreadyStarted)
	));
}

#[tokio::test]
#[traced_test]
async fn port_search_is_explicit() {
	let descriptor = ServiceDescriptor::new(LOCALHOST, 19120);

	let _taken = UnicastStream::new(&descriptor, StartReader::Now, &StreamConfig::default())
		.await
		.unwrap();

	let config = StreamConfig {
		port_search: 4,
		..Default::default()
	};
	let moved = UnicastStream::new(&descriptor, StartReader::Deferred, &config)
		.await
		.unwrap();

	let port = moved.start_reader().await.unwrap();
	assert!((19121..=19124).contains(&port), "bound on {port}");
	assert_eq!(moved.local_addr().map(|addr| addr.port()), Some(port));
	assert!(logs_contain("Unicast reader port already in use"));
}

#[tokio::test]
#[traced_test]
async fn writers_outlive_their_reader() {
	let config = StreamConfig::default();
	let target = ServiceDescriptor::new(LOCALHOST, 19130);

	let receiver = UnicastStream::new(&target, StartReader::Now, &config)
		.await
		.unwrap();
	let (tx, rx) = flume::unbounded();
	receiver.set_receive_listener(move |_, payload| tx.send(payload).unwrap());

	let writer = {
		let origin = UnicastStream::new(
			&ServiceDescriptor::new(LOCALHOST, 19131),
			StartReader::Now,
			&config,
		)
		.await
		.unwrap();

		origin.new_writer(&target).unwrap()
	};

	writer.write("still here").await.unwrap();
	assert_eq!(next_message(&rx).await, Value::from("still here"));
}

#[tokio::test]
#[traced_test]
async fn shutdown_closes_open_connections() {
	let descriptor = ServiceDescriptor::new(LOCALHOST, 19140);
	let reader = UnicastStream::new(&descriptor, StartReader::Now, &StreamConfig::default())
		.await
		.unwrap();

	let (tx, rx) = flume::unbounded();
	reader.set_receive_listener(move |_, payload| tx.send(payload).unwrap());

	let mut conn = TcpStream::connect((LOCALHOST, 19140)).await.unwrap();
	send_message(&mut conn, "before").await.unwrap();
	assert_eq!(next_message(&rx).await, Value::from("before"));

	reader.shutdown().await;
	assert_eq!(reader.reader_state(), ReaderState::Unbound);
	wait_closed(&mut conn).await;

	let _ = send_message(&mut conn, "after").await;
	sleep(Duration::from_millis(100)).await;
	assert!(rx.is_empty());
}

#[tokio::test]
#[traced_test]
async fn dropping_the_stream_closes_open_connections() {
	let descriptor = ServiceDescriptor::new(LOCALHOST, 19141);
	let reader = UnicastStream::new(&descriptor, StartReader::Now, &StreamConfig::default())
		.await
		.unwrap();

	let (tx, rx) = flume::unbounded();
	reader.set_receive_listener(move |_, payload| tx.send(payload).unwrap());

	let mut conn = TcpStream::connect((LOCALHOST, 19141)).await.unwrap();
	send_message(&mut conn, "before").await.unwrap();
	assert_eq!(next_message(&rx).await, Value::from("before"));

	drop(reader);
	wait_closed(&mut conn).await;

	let _ = send_message(&mut conn, "after").await;
	sleep(Duration::from_millis(100)).await;
	assert!(rx.is_empty());
}

#[tokio::test]
#[traced_test]
async fn idle_connections_are_closed() {
	let config = StreamConfig {
		idle_timeout: Duration::from_millis(200),
		..Default::default()
	};
	let _reader = UnicastStream::new(
		&ServiceDescriptor::new(LOCALHOST, 19142),
		StartReader::Now,
		&config,
	)
	.await
	.unwrap();

	// Announce a 1 MiB frame and never send it
	let mut conn = TcpStream::connect((LOCALHOST, 19142)).await.unwrap();
	conn.write_u32_le(1 << 20).await.unwrap();

	wait_closed(&mut conn).await;
	assert!(logs_contain("Closing idle RPC connection"));
}

#[tokio::test]
#[traced_test]
async fn panicking_handler_answers_with_internal_error() {
	let config = StreamConfig::default();
	let descriptor = ServiceDescriptor::new(LOCALHOST, 19143);

	let reader = UnicastStream::new(&descriptor, StartReader::Deferred, &config)
		.await
		.unwrap();
	reader
		.register_handler("boom", |_, _| panic!("handler failure"))
		.unwrap();
	reader
		.register_handler("ping", |_, _| Ok(Value::from("pong")))
		.unwrap();
	reader.start_reader().await.unwrap();

	let writer = reader.new_writer(&descriptor).unwrap();
	assert!(matches!(
		writer.custom_request("boom", vec![]).await,
		Err(TransportError::Fault(Fault { code: Fault::INTERNAL_ERROR, .. }))
	));
	assert_eq!(
		writer.custom_request("ping", vec![]).await.unwrap(),
		Value::from("pong")
	);
	assert!(logs_contain("RPC handler panicked"));
}
