//! End-to-end dispatcher behaviour through the `Dispatcher` trait object,
//! the way protocol adapters use it.

use std::sync::Arc;
use std::time::Duration;

use labwire_core::{Dispatcher, Error, TextRequest};
use labwire_test_harness::{MockTransport, ScriptedReply};
use labwire_text_io::{Connection, IoConfig};

fn dispatcher(mock: MockTransport) -> Arc<dyn Dispatcher> {
    Arc::new(Connection::spawn(Box::new(mock), IoConfig::default()))
}

#[tokio::test(start_paused = true)]
async fn concurrent_callers_share_one_link() {
    let mut mock = MockTransport::new();
    mock.reply(ScriptedReply::delayed("MT786V06.27\rAAVACK\r", Duration::from_millis(50)));
    mock.reply(ScriptedReply::delayed("OKMA\r", Duration::from_millis(50)));
    let sent = mock.sent_log();
    let conn = dispatcher(mock);

    let a = {
        let conn = Arc::clone(&conn);
        tokio::spawn(async move {
            conn.execute_one(TextRequest::sentinel("AAV", "AAVACK"))
                .await
        })
    };
    tokio::task::yield_now().await;
    let b = {
        let conn = Arc::clone(&conn);
        tokio::spawn(async move { conn.execute_one(TextRequest::sentinel("MA3LW", "OKMA")).await })
    };

    let version = a.await.unwrap().unwrap();
    let mode = b.await.unwrap().unwrap();
    assert_eq!(version.body(), &["MT786V06.27".to_string()]);
    assert_eq!(mode.lines(), &["OKMA"]);
    assert_eq!(sent.lines(), vec!["AAV", "MA3LW"]);
}

#[tokio::test(start_paused = true)]
async fn loadpoint_style_batch() {
    let mut mock = MockTransport::new();
    mock.expect(b"SFR50.00\r", b"SOKFR\r");
    mock.expect(b"SUIEEEEEE\r", b"SOKUI\r");
    let conn = dispatcher(mock);

    let replies = conn
        .execute_all(vec![
            TextRequest::prefixed("SFR50.00", "SOKFR"),
            TextRequest::prefixed("SUIEEEEEE", "SOKUI"),
        ])
        .await
        .unwrap();
    assert_eq!(replies[0].terminal_line(), Some("SOKFR"));
    assert_eq!(replies[1].terminal_line(), Some("SOKUI"));
}

#[tokio::test(start_paused = true)]
async fn silent_device_times_out_then_recovers() {
    let mut mock = MockTransport::new();
    mock.expect(b"AAV\r", b"");
    mock.expect(b"AAV\r", b"EPZ303V2.11\rAAVACK\r");
    let conn = dispatcher(mock);

    let first = conn
        .execute_one(TextRequest::sentinel("AAV", "AAVACK"))
        .await;
    assert!(matches!(first, Err(Error::Timeout)));

    let second = conn
        .execute_one(TextRequest::sentinel("AAV", "AAVACK"))
        .await
        .unwrap();
    assert_eq!(second.body(), &["EPZ303V2.11".to_string()]);
}

#[tokio::test(start_paused = true)]
async fn empty_batch_is_a_no_op() {
    let conn = dispatcher(MockTransport::new());
    let pending = conn.execute(Vec::new()).await.unwrap();
    assert!(pending.is_empty());
}
