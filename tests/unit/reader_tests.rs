//! Unit tests for the line reader task.

use std::time::Duration;

use quectel_at::link::codec::LineCodec;
use quectel_at::link::reader::{run_reader, ReaderExit};
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

const PROMPTLY: Duration = Duration::from_secs(2);

#[tokio::test]
async fn forwards_lines_skips_garbage_and_stops_at_eof() {
    let (mut device, host) = tokio::io::duplex(256);
    let (line_tx, mut line_rx) = mpsc::unbounded_channel();
    let reader = tokio::spawn(run_reader(
        host,
        LineCodec::default(),
        line_tx,
        CancellationToken::new(),
    ));

    device
        .write_all(b"\r\nRING\r\n\xff\xfe\r\n+CLIP: \"5551234\",129\r\n")
        .await
        .expect("write");
    drop(device);

    let exit = tokio::time::timeout(PROMPTLY, reader)
        .await
        .expect("reader stops")
        .expect("join");
    assert_eq!(exit, ReaderExit::Eof);

    let mut lines = Vec::new();
    while let Some(line) = line_rx.recv().await {
        lines.push(line.into_string());
    }
    assert_eq!(lines, ["RING", "+CLIP: \"5551234\",129"]);
}

#[tokio::test]
async fn cancellation_stops_an_idle_reader() {
    let (_device, host) = tokio::io::duplex(256);
    let (line_tx, mut line_rx) = mpsc::unbounded_channel();
    let cancel = CancellationToken::new();
    let reader = tokio::spawn(run_reader(
        host,
        LineCodec::default(),
        line_tx,
        cancel.clone(),
    ));

    cancel.cancel();

    let exit = tokio::time::timeout(PROMPTLY, reader)
        .await
        .expect("reader stops")
        .expect("join");
    assert_eq!(exit, ReaderExit::Cancelled);
    assert!(line_rx.recv().await.is_none(), "sender dropped on exit");
}

#[tokio::test]
async fn dropped_receiver_stops_reader() {
    let (mut device, host) = tokio::io::duplex(256);
    let (line_tx, line_rx) = mpsc::unbounded_channel();
    drop(line_rx);
    let reader = tokio::spawn(run_reader(
        host,
        LineCodec::default(),
        line_tx,
        CancellationToken::new(),
    ));

    device.write_all(b"OK\r\n").await.expect("write");

    let exit = tokio::time::timeout(PROMPTLY, reader)
        .await
        .expect("reader stops")
        .expect("join");
    assert_eq!(exit, ReaderExit::EngineGone);
}
