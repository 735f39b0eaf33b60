//! Response path: reply → wire bytes.

use tokio::io::AsyncReadExt;

use geoingest::error::ConnectionFault;
use geoingest::protocol::Response;
use geoingest::response_flow;

#[tokio::test]
async fn writes_one_line_per_response() {
    let mut out: Vec<u8> = Vec::new();
    let mut scratch = Vec::new();

    response_flow::send_response(&mut out, &mut scratch, &Response::Ok)
        .await
        .unwrap();
    response_flow::send_response(
        &mut out,
        &mut scratch,
        &Response::Error("failed to insert record: db error".into()),
    )
    .await
    .unwrap();

    assert_eq!(out, b"OK\nERROR: failed to insert record: db error\n");
}

#[tokio::test]
async fn multi_line_cause_is_flattened() {
    let (mut server, mut client) = tokio::io::duplex(256);
    let mut scratch = Vec::new();

    response_flow::send_response(
        &mut server,
        &mut scratch,
        &Response::Error("line one\nline two".into()),
    )
    .await
    .unwrap();
    drop(server);

    let mut received = String::new();
    client.read_to_string(&mut received).await.unwrap();
    assert_eq!(received, "ERROR: line one line two\n");
}

#[tokio::test]
async fn write_to_closed_peer_is_reported_as_fault() {
    let (mut server, client) = tokio::io::duplex(256);
    drop(client);
    let mut scratch = Vec::new();

    let result = response_flow::send_response(&mut server, &mut scratch, &Response::Ok).await;
    assert!(matches!(result, Err(ConnectionFault::Write(_))));
}
