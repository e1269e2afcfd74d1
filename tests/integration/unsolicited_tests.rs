//! Routing of lines that arrive while no command is pending.

use quectel_at::Verdict;

use super::test_helpers::{connect, script, Reply, PROMPTLY};

#[tokio::test]
async fn idle_line_goes_to_unsolicited_sink() {
    let (modem, fake) = connect(script(vec![]), 2_000);
    let mut unsolicited = modem.take_unsolicited().expect("unsolicited receiver");

    fake.emit("RING\r\n").await;

    let line = tokio::time::timeout(PROMPTLY, unsolicited.recv())
        .await
        .expect("line routed")
        .expect("sink open");
    assert_eq!(line.as_str(), "RING");
}

#[tokio::test]
async fn unsolicited_line_is_not_attributed_to_next_send() {
    let (modem, fake) = connect(
        script(vec![("AT+QGPSLOC?", Reply::lines(&["+QGPSLOC: 1", "OK"]))]),
        2_000,
    );
    let mut unsolicited = modem.take_unsolicited().expect("unsolicited receiver");

    fake.emit("+QIND: \"FOTA\",\"START\"\r\n").await;
    let notice = tokio::time::timeout(PROMPTLY, unsolicited.recv())
        .await
        .expect("line routed")
        .expect("sink open");
    assert_eq!(notice.as_str(), "+QIND: \"FOTA\",\"START\"");

    let verdict = modem.send("AT+QGPSLOC?").await.expect("send");
    assert_eq!(verdict, Verdict::Success(vec!["+QGPSLOC: 1".to_owned()]));
}

#[tokio::test]
async fn unsolicited_receiver_is_handed_out_once() {
    let (modem, _fake) = connect(script(vec![]), 2_000);

    assert!(modem.take_unsolicited().is_some());
    assert!(modem.take_unsolicited().is_none());
}

#[tokio::test]
async fn idle_lines_without_subscriber_do_not_disturb_the_link() {
    let (modem, fake) = connect(script(vec![("AT", Reply::lines(&["OK"]))]), 2_000);
    drop(modem.take_unsolicited());

    fake.emit("+CREG: 1\r\n+CGREG: 1\r\n").await;
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;

    let verdict = modem.send("AT").await.expect("send");
    assert_eq!(verdict, Verdict::Success(Vec::new()));
}

#[tokio::test]
async fn sink_closes_when_link_closes() {
    let (modem, _fake) = connect(script(vec![]), 2_000);
    let mut unsolicited = modem.take_unsolicited().expect("unsolicited receiver");

    modem.close().await.expect("close");

    let next = tokio::time::timeout(PROMPTLY, unsolicited.recv())
        .await
        .expect("no hang");
    assert!(next.is_none(), "sink must close with the link");
}
