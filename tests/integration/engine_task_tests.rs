//! The correlation engine task driven directly through its channels.

use std::time::Duration;

use quectel_at::link::engine::{Control, Engine, TerminalSet};
use quectel_at::models::{FailureReason, Line, PendingRequest, Verdict};
use quectel_at::AppError;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

use super::test_helpers::PROMPTLY;

struct Harness {
    line_tx: mpsc::UnboundedSender<Line>,
    control_tx: mpsc::Sender<Control>,
    unsolicited_rx: mpsc::Receiver<Line>,
    join: tokio::task::JoinHandle<()>,
}

fn start(capacity: usize) -> Harness {
    let (line_tx, line_rx) = mpsc::unbounded_channel();
    let (unsolicited_tx, unsolicited_rx) = mpsc::channel(capacity);
    let (control_tx, join) = Engine::new(TerminalSet::default(), line_rx, unsolicited_tx)
        .spawn()
        .into_parts();
    Harness {
        line_tx,
        control_tx,
        unsolicited_rx,
        join,
    }
}

async fn begin(
    control_tx: &mpsc::Sender<Control>,
    command: &str,
    timeout: Duration,
) -> (Result<(), AppError>, oneshot::Receiver<Verdict>) {
    let request = PendingRequest::new(command, None, timeout, CancellationToken::new());
    let (reply, reply_rx) = oneshot::channel();
    let (ack, ack_rx) = oneshot::channel();
    control_tx
        .send(Control::Begin {
            request,
            reply,
            ack,
        })
        .await
        .expect("engine running");
    (ack_rx.await.expect("ack"), reply_rx)
}

#[tokio::test]
async fn second_begin_while_pending_is_refused() {
    let harness = start(8);

    let (first, mut first_reply) = begin(&harness.control_tx, "AT+A", PROMPTLY).await;
    first.expect("first request accepted");

    let (second, _second_reply) = begin(&harness.control_tx, "AT+B", PROMPTLY).await;
    assert!(matches!(second, Err(AppError::Busy(_))), "got {second:?}");

    // The first request is untouched and still resolves normally.
    harness.line_tx.send(Line::new("+A: 1")).expect("line");
    harness.line_tx.send(Line::new("OK")).expect("line");
    let verdict = tokio::time::timeout(PROMPTLY, &mut first_reply)
        .await
        .expect("no hang")
        .expect("verdict");
    assert_eq!(verdict, Verdict::Success(vec!["+A: 1".to_owned()]));
}

#[tokio::test]
async fn lines_queued_before_begin_are_unsolicited() {
    let mut harness = start(8);

    harness.line_tx.send(Line::new("RING")).expect("line");
    let (ack, reply) = begin(&harness.control_tx, "ATA", PROMPTLY).await;
    ack.expect("accepted");

    assert_eq!(
        harness.unsolicited_rx.try_recv().expect("routed").as_str(),
        "RING"
    );

    harness.line_tx.send(Line::new("OK")).expect("line");
    let verdict = tokio::time::timeout(PROMPTLY, reply)
        .await
        .expect("no hang")
        .expect("verdict");
    assert_eq!(verdict, Verdict::Success(Vec::new()));
}

#[tokio::test]
async fn full_unsolicited_sink_drops_to_log_without_blocking() {
    let mut harness = start(1);

    for text in ["+CREG: 1", "+CREG: 2", "+CREG: 5"] {
        harness.line_tx.send(Line::new(text)).expect("line");
    }
    // The begin ack proves every queued line was routed first.
    let (ack, _reply) = begin(&harness.control_tx, "AT", PROMPTLY).await;
    ack.expect("accepted");

    assert_eq!(
        harness.unsolicited_rx.try_recv().expect("first kept").as_str(),
        "+CREG: 1"
    );
    assert!(harness.unsolicited_rx.try_recv().is_err());
}

#[tokio::test]
async fn deadline_resolves_timeout_and_returns_to_idle() {
    let harness = start(8);

    let (ack, reply) = begin(&harness.control_tx, "AT+X", Duration::from_millis(50)).await;
    ack.expect("accepted");
    harness.line_tx.send(Line::new("partial")).expect("line");

    let verdict = tokio::time::timeout(PROMPTLY, reply)
        .await
        .expect("no hang")
        .expect("verdict");
    assert_eq!(
        verdict,
        Verdict::failure(vec!["partial".to_owned()], FailureReason::Timeout)
    );

    let (next, _reply) = begin(&harness.control_tx, "AT+Y", PROMPTLY).await;
    next.expect("engine is idle again");
}

#[tokio::test]
async fn abort_resolves_pending_with_reason() {
    let harness = start(8);

    let (ack, reply) = begin(&harness.control_tx, "AT", PROMPTLY).await;
    ack.expect("accepted");
    harness
        .control_tx
        .send(Control::Abort(FailureReason::TransportClosed))
        .await
        .expect("engine running");

    let verdict = tokio::time::timeout(PROMPTLY, reply)
        .await
        .expect("no hang")
        .expect("verdict");
    assert_eq!(verdict.reason(), Some(FailureReason::TransportClosed));
}

#[tokio::test]
async fn closed_line_channel_drains_then_fails_pending() {
    let harness = start(8);
    let Harness {
        line_tx,
        control_tx,
        unsolicited_rx: _unsolicited_rx,
        join,
    } = harness;

    let (ack, reply) = begin(&control_tx, "AT+QGPSLOC?", PROMPTLY).await;
    ack.expect("accepted");
    line_tx.send(Line::new("+QGPSLOC: 1")).expect("line");
    drop(line_tx);

    let verdict = tokio::time::timeout(PROMPTLY, reply)
        .await
        .expect("no hang")
        .expect("verdict");
    assert_eq!(
        verdict,
        Verdict::failure(vec!["+QGPSLOC: 1".to_owned()], FailureReason::TransportClosed)
    );
    tokio::time::timeout(PROMPTLY, join)
        .await
        .expect("engine exits")
        .expect("no panic");
}
