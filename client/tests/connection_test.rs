//! Connection behavior against a scripted mock daemon.
//!
//! These tests exercise the client half of the protocol without a real
//! daemon: a thread accepts one connection and plays a fixed script.

use periscope_client::{run, Connection, RunOptions};
use periscope_shared::protocol::frame;
use periscope_shared::protocol::wire::{PayloadMessage, TraceMessage};
use periscope_shared::{MeasurementSpec, ServerPayload, Tick, Trace, Value};
use std::io::{BufRead, BufReader, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

fn spawn_mock<F>(script: F) -> SocketAddr
where
    F: FnOnce(TcpStream) + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    thread::spawn(move || {
        let (stream, _) = listener.accept().unwrap();
        script(stream);
    });
    addr
}

fn read_command(reader: &mut BufReader<TcpStream>) -> String {
    let mut line = String::new();
    reader.read_line(&mut line).unwrap();
    line.trim_end().to_string()
}

fn test_payload() -> ServerPayload {
    let spec = MeasurementSpec::builder()
        .deferred("t", "timestamp", vec![], vec![])
        .build()
        .unwrap();
    ServerPayload::new(Duration::from_millis(50), spec)
}

fn one_tick_trace() -> Trace {
    Trace {
        ticks: vec![Tick {
            index: 0,
            elapsed_us: 50_000,
            samples: vec![("t".to_string(), Value::Int(1))],
        }],
    }
}

#[test]
fn test_ping_echo_is_true() {
    let addr = spawn_mock(|stream| {
        let mut reader = BufReader::new(stream.try_clone().unwrap());
        assert_eq!(read_command(&mut reader), "ping");
        let mut stream = stream;
        stream.write_all(b"ping\n").unwrap();
    });

    let mut conn = Connection::connect(addr).unwrap();
    assert!(conn.ping().unwrap());
}

#[test]
fn test_ping_wrong_reply_is_false() {
    let addr = spawn_mock(|stream| {
        let mut reader = BufReader::new(stream.try_clone().unwrap());
        read_command(&mut reader);
        let mut stream = stream;
        stream.write_all(b"pong\n").unwrap();
    });

    let mut conn = Connection::connect(addr).unwrap();
    assert!(!conn.ping().unwrap());
}

#[test]
fn test_send_payload_round_trips() {
    let (tx, rx) = mpsc::channel();
    let addr = spawn_mock(move |stream| {
        let mut reader = BufReader::new(stream);
        assert_eq!(read_command(&mut reader), "payload");
        let body = frame::read_frame(&mut reader).unwrap();
        let message = PayloadMessage::from_bytes(&body).unwrap();
        tx.send(message.payload).unwrap();
    });

    let payload = test_payload();
    let mut conn = Connection::connect(addr).unwrap();
    conn.send_payload(&payload).unwrap();

    let received = rx.recv_timeout(Duration::from_secs(5)).unwrap();
    assert_eq!(received, payload);
}

#[test]
fn test_receive_trace_decodes_frame() {
    let trace = one_tick_trace();
    let sent = trace.clone();
    let addr = spawn_mock(move |mut stream| {
        let body = TraceMessage::new(sent).to_bytes().unwrap();
        frame::write_frame(&mut stream, &body).unwrap();
    });

    let mut conn = Connection::connect(addr).unwrap();
    assert_eq!(conn.receive_trace().unwrap(), trace);
}

#[test]
fn test_run_choreography() {
    let trace = one_tick_trace();
    let sent = trace.clone();
    let addr = spawn_mock(move |stream| {
        let mut reader = BufReader::new(stream.try_clone().unwrap());
        let mut stream = stream;

        assert_eq!(read_command(&mut reader), "ping");
        stream.write_all(b"ping\n").unwrap();

        assert_eq!(read_command(&mut reader), "payload");
        frame::read_frame(&mut reader).unwrap();

        assert_eq!(read_command(&mut reader), "start");
        assert_eq!(read_command(&mut reader), "stop");

        let body = TraceMessage::new(sent).to_bytes().unwrap();
        frame::write_frame(&mut stream, &body).unwrap();
    });

    let outcome = run(addr, &test_payload(), &RunOptions::default(), || {
        thread::sleep(Duration::from_millis(20));
        Ok("hello")
    })
    .unwrap();

    assert_eq!(outcome.output, "hello");
    assert!(outcome.elapsed >= Duration::from_millis(20));
    assert_eq!(outcome.trace, trace);
}

#[test]
fn test_run_aborts_on_workload_failure() {
    let (tx, rx) = mpsc::channel();
    let addr = spawn_mock(move |stream| {
        let mut reader = BufReader::new(stream.try_clone().unwrap());
        let mut stream = stream;

        read_command(&mut reader);
        stream.write_all(b"ping\n").unwrap();
        read_command(&mut reader);
        frame::read_frame(&mut reader).unwrap();
        read_command(&mut reader); // start

        // everything the client sends after the workload fails
        let mut after_start = Vec::new();
        let mut line = String::new();
        while reader.read_line(&mut line).unwrap() > 0 {
            after_start.push(line.trim_end().to_string());
            line.clear();
        }
        tx.send(after_start).unwrap();
    });

    let err = run(
        addr,
        &test_payload(),
        &RunOptions::default(),
        || -> anyhow::Result<()> { Err(anyhow::anyhow!("workload exploded")) },
    )
    .unwrap_err();
    assert!(format!("{:#}", err).contains("workload exploded"));

    // no stop, no trace fetch after the failure
    let after_start = rx.recv_timeout(Duration::from_secs(5)).unwrap();
    assert!(after_start.is_empty(), "unexpected lines: {:?}", after_start);
}
