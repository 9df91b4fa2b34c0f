
use std::time::Duration;

use wire_test_support::*;

#[tokio::test]
async fn test_startup_without_auth() {
    let server = WireTestServer::start().await;
    let mut client = server.connect().await;
    client.startup("postgres", Some("shop")).await;

    let messages = client.read_until_ready().await;
    // R, S x7, K, Z
    assert_eq!(tags(&messages), "RSSSSSSSKZ");
    assert_eq!(messages[0].body, 0i32.to_be_bytes());
    assert_eq!(messages.last().unwrap().body, b"I");
}

#[tokio::test]
async fn test_sequential_process_ids() {
    let server = WireTestServer::start().await;
    let mut pids = Vec::new();
    for _ in 0..2 {
        let mut client = server.connect().await;
        client.startup("postgres", None).await;
        let messages = client.read_until_ready().await;
        let key = messages.iter().find(|m| m.tag == b'K').unwrap();
        pids.push(i32::from_be_bytes(key.body[..4].try_into().unwrap()));
    }
    assert_eq!(pids[1], pids[0] + 1);
}

#[tokio::test]
async fn test_auth_flow_success() {
    let server = WireTestServer::start_with_password("u", "pw").await;
    let mut client = server.connect().await;
    client.startup("u", Some("shop")).await;

    let request = client.read_message().await;
    assert_eq!(request.tag, b'R');
    assert_eq!(request.body, 3i32.to_be_bytes());

    client.send(&password("pw")).await;
    let messages = client.read_until_ready().await;
    assert_eq!(messages[0].tag, b'R');
    assert_eq!(messages[0].body, 0i32.to_be_bytes());
    assert_eq!(messages.last().unwrap().body, b"I");
}

#[tokio::test]
async fn test_auth_flow_wrong_password() {
    let server = WireTestServer::start_with_password("u", "pw").await;
    let mut client = server.connect().await;
    client.startup("u", Some("shop")).await;
    assert_eq!(client.read_message().await.tag, b'R');

    client.send(&password("wrong")).await;
    let error = client.read_message().await;
    assert_eq!(error.tag, b'E');
    assert_eq!(error.sql_state().as_deref(), Some("28P01"));
    assert_eq!(error.field(b'S').as_deref(), Some("FATAL"));
    assert!(client.is_closed().await);
}

#[tokio::test]
async fn test_auth_flow_wrong_user() {
    let server = WireTestServer::start_with_password("u", "pw").await;
    let mut client = server.connect().await;
    client.startup("mallory", None).await;

    let error = client.read_message().await;
    assert_eq!(error.tag, b'E');
    assert_eq!(error.sql_state().as_deref(), Some("28P01"));
    assert!(client.is_closed().await);
}

#[tokio::test]
async fn test_non_password_message_while_awaiting_password_closes() {
    let server = WireTestServer::start_with_password("u", "pw").await;
    let mut client = server.connect().await;
    client.startup("u", None).await;
    assert_eq!(client.read_message().await.tag, b'R');

    client.send(&query("SELECT 1")).await;
    assert!(client.is_closed().await);
}

#[tokio::test]
async fn test_ssl_request_declined_then_startup() {
    let server = WireTestServer::start().await;
    let mut client = server.connect().await;

    client.send(&ssl_request()).await;
    let mut reply = [0u8; 1];
    tokio::io::AsyncReadExt::read_exact(&mut client.stream, &mut reply)
        .await
        .unwrap();
    assert_eq!(&reply, b"N");

    client.startup("postgres", Some("shop")).await;
    let messages = client.read_until_ready().await;
    assert_eq!(messages[0].tag, b'R');
}

#[tokio::test]
async fn test_cancel_request_is_ignored() {
    let server = WireTestServer::start().await;
    let mut client = server.connect().await;

    client.send(&cancel_request(1, 2)).await;
    // nothing comes back and the connection stays usable
    let mut buf = [0u8; 1];
    let read = tokio::time::timeout(
        Duration::from_millis(200),
        tokio::io::AsyncReadExt::read(&mut client.stream, &mut buf),
    )
    .await;
    assert!(read.is_err(), "expected no reply to a cancel request");

    client.startup("postgres", Some("shop")).await;
    let messages = client.read_until_ready().await;
    assert_eq!(messages[0].tag, b'R');
}

#[tokio::test]
async fn test_missing_user_is_fatal() {
    let server = WireTestServer::start().await;
    let mut client = server.connect().await;

    let mut body = (3i32 << 16).to_be_bytes().to_vec();
    body.push(0);
    let mut packet = ((body.len() + 4) as i32).to_be_bytes().to_vec();
    packet.extend_from_slice(&body);
    client.send(&packet).await;

    let error = client.read_message().await;
    assert_eq!(error.sql_state().as_deref(), Some("28000"));
    assert!(client.is_closed().await);
}

#[tokio::test]
async fn test_unsupported_protocol_version_is_fatal() {
    let server = WireTestServer::start().await;
    let mut client = server.connect().await;

    let mut packet = 9i32.to_be_bytes().to_vec();
    packet.extend_from_slice(&(2i32 << 16).to_be_bytes());
    packet.push(0);
    client.send(&packet).await;

    let error = client.read_message().await;
    assert_eq!(error.sql_state().as_deref(), Some("0A000"));
    assert!(client.is_closed().await);
}

#[tokio::test]
async fn test_simple_query_over_table() {
    let server = WireTestServer::start().await;
    let mut client = server.connect_ready("postgres").await;

    client
        .send(&query(
            "SELECT name, price FROM products WHERE in_stock = true ORDER BY id",
        ))
        .await;
    let messages = client.read_until_ready().await;
    assert_eq!(tags(&messages), "TDDCZ");
    assert_eq!(
        messages[1].data_row(),
        vec![Some("pen".to_string()), Some("1.5".to_string())]
    );
    assert_eq!(messages[2].data_row(), vec![Some("pad".to_string()), None]);
    assert_eq!(messages[3].command_tag(), "SELECT 2");
}

#[tokio::test]
async fn test_query_error_is_recoverable() {
    let server = WireTestServer::start().await;
    let mut client = server.connect_ready("postgres").await;

    client.send(&query("SELEC 1")).await;
    let messages = client.read_until_ready().await;
    assert_eq!(tags(&messages), "EZ");
    assert_eq!(messages[0].sql_state().as_deref(), Some("42601"));
    assert_eq!(messages[1].body, b"E");

    client.send(&query("SELECT 1")).await;
    let messages = client.read_until_ready().await;
    assert_eq!(tags(&messages), "TDCZ");
    assert_eq!(messages[3].body, b"I");
}

#[tokio::test]
async fn test_set_sends_notice() {
    let server = WireTestServer::start().await;
    let mut client = server.connect_ready("postgres").await;

    client.send(&query("SET DateStyle = 'ISO'")).await;
    let messages = client.read_until_ready().await;
    assert_eq!(tags(&messages), "NCZ");
    assert_eq!(messages[1].command_tag(), "SET");
}

#[tokio::test]
async fn test_extended_lifecycle() {
    let server = WireTestServer::start().await;
    let mut client = server.connect_ready("postgres").await;

    client.send(&parse("s1", "SELECT 1")).await;
    client.send(&bind("p1", "s1")).await;
    client.send(&describe(b'P', "p1")).await;
    client.send(&execute("p1")).await;
    client.send(&sync()).await;

    let messages = client.read_until_ready().await;
    assert_eq!(tags(&messages), "12TTDCZ");
    // one int4 column named ?column?
    let row_description = &messages[2].body;
    assert_eq!(&row_description[..2], &1i16.to_be_bytes());
    assert_eq!(&row_description[2..11], b"?column?\0");
    assert_eq!(&row_description[17..21], &23u32.to_be_bytes());
    assert_eq!(messages[4].data_row(), vec![Some("1".to_string())]);
    assert_eq!(messages[5].command_tag(), "SELECT 1");
    assert_eq!(messages[6].body, b"I");
}

#[tokio::test]
async fn test_idempotent_close() {
    let server = WireTestServer::start().await;
    let mut client = server.connect_ready("postgres").await;

    client.send(&parse("s1", "SELECT 1")).await;
    client.send(&close(b'S', "s1")).await;
    client.send(&close(b'S', "s1")).await;
    client.send(&sync()).await;

    let messages = client.read_until_ready().await;
    assert_eq!(tags(&messages), "133Z");
}

#[tokio::test]
async fn test_dispatch_ordering_within_one_read() {
    let server = WireTestServer::start().await;
    let mut client = server.connect_ready("postgres").await;

    let mut batch = Vec::new();
    batch.extend(parse("a", "SELECT 1"));
    batch.extend(bind("pa", "a"));
    batch.extend(execute("pa"));
    batch.extend(parse("b", "SELECT 'two'"));
    batch.extend(bind("pb", "b"));
    batch.extend(execute("pb"));
    batch.extend(sync());
    client.send(&batch).await;

    let messages = client.read_until_ready().await;
    assert_eq!(tags(&messages), "12TDC12TDCZ");
    assert_eq!(messages[3].data_row(), vec![Some("1".to_string())]);
    assert_eq!(messages[8].data_row(), vec![Some("two".to_string())]);
}

#[tokio::test]
async fn test_unknown_portal() {
    let server = WireTestServer::start().await;
    let mut client = server.connect_ready("postgres").await;

    client.send(&execute("missing")).await;
    let messages = client.read_until_ready().await;
    assert_eq!(tags(&messages), "EZ");
    assert!(messages[0].field(b'M').unwrap().contains("missing"));
    assert_eq!(messages[1].body, b"E");
}

#[tokio::test]
async fn test_sync_after_error_is_idle() {
    let server = WireTestServer::start().await;
    let mut client = server.connect_ready("postgres").await;

    client.send(&bind("p", "nope")).await;
    let messages = client.read_until_ready().await;
    assert_eq!(tags(&messages), "EZ");
    assert_eq!(messages[0].sql_state().as_deref(), Some("26000"));

    client.send(&sync()).await;
    let messages = client.read_until_ready().await;
    assert_eq!(tags(&messages), "Z");
    assert_eq!(messages[0].body, b"I");
}

#[tokio::test]
async fn test_unknown_message_tag() {
    let server = WireTestServer::start().await;
    let mut client = server.connect_ready("postgres").await;

    client.send(&frame(b'F', &[])).await;
    let messages = client.read_until_ready().await;
    assert_eq!(tags(&messages), "EZ");
    assert_eq!(messages[0].sql_state().as_deref(), Some("08P01"));

    client.send(&query("SELECT 1")).await;
    assert_eq!(tags(&client.read_until_ready().await), "TDCZ");
}

#[tokio::test]
async fn test_invalid_utf8_query_keeps_connection() {
    let server = WireTestServer::start().await;
    let mut client = server.connect_ready("postgres").await;

    client.send(&frame(b'Q', &[0xff, 0xfe, 0])).await;
    let messages = client.read_until_ready().await;
    assert_eq!(tags(&messages), "EZ");
    assert_eq!(messages[0].sql_state().as_deref(), Some("22021"));
    assert_eq!(messages[1].body, b"E");

    client.send(&query("SELECT 1")).await;
    assert_eq!(tags(&client.read_until_ready().await), "TDCZ");
}

#[tokio::test]
async fn test_comment_only_prepared_statement() {
    let server = WireTestServer::start().await;
    let mut client = server.connect_ready("postgres").await;

    let mut batch = parse("s", "-- x");
    batch.extend(bind("", "s"));
    batch.extend(execute(""));
    batch.extend(sync());
    client.send(&batch).await;
    assert_eq!(tags(&client.read_until_ready().await), "12IZ");
}

#[tokio::test]
async fn test_flush_sends_pending_replies() {
    let server = WireTestServer::start().await;
    let mut client = server.connect_ready("postgres").await;

    client.send(&parse("", "SELECT 1")).await;
    client.send(&flush()).await;
    let message = client.read_message().await;
    assert_eq!(message.tag, b'1');
}

#[tokio::test]
async fn test_chunked_messages() {
    let server = WireTestServer::start().await;
    let mut client = server.connect_ready("postgres").await;

    let bytes = query("SELECT id FROM products ORDER BY id DESC LIMIT 1");
    for chunk in bytes.chunks(3) {
        client.send(chunk).await;
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    let messages = client.read_until_ready().await;
    assert_eq!(tags(&messages), "TDCZ");
    assert_eq!(messages[1].data_row(), vec![Some("3".to_string())]);
}

#[tokio::test]
async fn test_terminate_closes() {
    let server = WireTestServer::start().await;
    let mut client = server.connect_ready("postgres").await;

    client.send(&terminate()).await;
    assert!(client.is_closed().await);
}

#[tokio::test]
async fn test_oversized_frame_closes_without_reply() {
    let server = WireTestServer::start().await;
    let mut client = server.connect_ready("postgres").await;

    let mut header = vec![b'Q'];
    header.extend_from_slice(&i32::MAX.to_be_bytes());
    client.send(&header).await;
    assert!(client.is_closed().await);
}

#[tokio::test]
async fn test_unknown_database() {
    let server = WireTestServer::start().await;
    let mut client = server.connect().await;
    client.startup("postgres", Some("nowhere")).await;
    client.read_until_ready().await;

    client.send(&query("SELECT * FROM products")).await;
    let messages = client.read_until_ready().await;
    assert_eq!(tags(&messages), "EZ");
    assert_eq!(messages[0].sql_state().as_deref(), Some("3D000"));
}
