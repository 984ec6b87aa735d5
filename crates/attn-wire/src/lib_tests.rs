// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn encode_returns_json_without_length_prefix() {
    let response = Response::Ack;
    let encoded = encode(&response).expect("encode failed");
    let json_str = std::str::from_utf8(&encoded).expect("should be valid UTF-8");
    assert!(json_str.starts_with('{'), "should be JSON object: {json_str}");
}

#[tokio::test]
async fn read_write_message_roundtrip() {
    let original = b"hello world";

    let mut buffer = Vec::new();
    write_message(&mut buffer, original).await.expect("write failed");
    assert_eq!(buffer.len(), 4 + original.len());

    let mut cursor = std::io::Cursor::new(buffer);
    let read_back = read_message(&mut cursor).await.expect("read failed");
    assert_eq!(read_back, original);
}

#[tokio::test]
async fn write_message_adds_big_endian_length_prefix() {
    let data = b"test data";

    let mut buffer = Vec::new();
    write_message(&mut buffer, data).await.expect("write failed");

    let len = u32::from_be_bytes([buffer[0], buffer[1], buffer[2], buffer[3]]) as usize;
    assert_eq!(len, data.len());
    assert_eq!(&buffer[4..], data);
}

#[tokio::test]
async fn read_message_rejects_oversized_frame() {
    let mut buffer = Vec::new();
    buffer.extend_from_slice(&(MAX_MESSAGE_BYTES + 1).to_be_bytes());

    let mut cursor = std::io::Cursor::new(buffer);
    let err = read_message(&mut cursor).await.unwrap_err();
    assert!(matches!(err, ProtocolError::TooLarge(_)));
}

#[tokio::test]
async fn json_roundtrip_preserves_request_shape() {
    let req = Request::Hello {
        daemon_instance_id: "inst-1".to_string(),
        control_token: "tok".to_string(),
    };

    let mut buffer = Vec::new();
    write_json(&mut buffer, &req).await.expect("write failed");

    let mut cursor = std::io::Cursor::new(buffer);
    let read_back: Request = read_json(&mut cursor).await.expect("read failed");

    match read_back {
        Request::Hello { daemon_instance_id, control_token } => {
            assert_eq!(daemon_instance_id, "inst-1");
            assert_eq!(control_token, "tok");
        }
        other => panic!("unexpected request: {other:?}"),
    }
}

#[test]
fn output_event_seq_is_none_for_desync() {
    let ev = OutputEvent::Desync { reason: "buffer evicted".to_string() };
    assert_eq!(ev.seq(), None);

    let ev = OutputEvent::Output { seq: 5, data: vec![1, 2, 3] };
    assert_eq!(ev.seq(), Some(5));
}
