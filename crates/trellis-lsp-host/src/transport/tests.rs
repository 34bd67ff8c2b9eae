use std::io::Cursor;

use rstest::rstest;

use super::*;

fn reader(input: &[u8]) -> FrameReader<Cursor<Vec<u8>>> {
    FrameReader::new(Cursor::new(input.to_vec()))
}

#[rstest]
fn writes_content_length_header() {
    let mut buffer = Vec::new();
    {
        let mut writer = FrameWriter::new(&mut buffer);
        writer.send(br#"{"id":1}"#).expect("send failed");
    }

    assert_eq!(buffer, b"Content-Length: 8\r\n\r\n{\"id\":1}".to_vec());
}

#[rstest]
fn reads_consecutive_frames() {
    let mut frames = reader(b"Content-Length: 2\r\n\r\n{}Content-Length: 4\r\n\r\nnull");

    assert_eq!(frames.receive().expect("first frame"), b"{}".to_vec());
    assert_eq!(frames.receive().expect("second frame"), b"null".to_vec());
}

#[rstest]
#[case::content_type_first(
    b"Content-Type: application/vscode-jsonrpc; charset=utf-8\r\nContent-Length: 2\r\n\r\n{}".as_slice()
)]
#[case::lowercase_name(b"content-length: 2\r\n\r\n{}".as_slice())]
#[case::no_space(b"Content-Length:2\r\n\r\n{}".as_slice())]
fn tolerates_header_variants(#[case] input: &[u8]) {
    assert_eq!(reader(input).receive().expect("frame"), b"{}".to_vec());
}

#[rstest]
fn missing_length_is_reported() {
    let err = reader(b"Content-Type: text/plain\r\n\r\n{}")
        .receive()
        .expect_err("expected failure");

    assert!(matches!(err, TransportError::MissingContentLength));
}

#[rstest]
fn invalid_length_is_reported() {
    let err = reader(b"Content-Length: lots\r\n\r\n{}")
        .receive()
        .expect_err("expected failure");

    assert!(matches!(err, TransportError::InvalidHeader { value } if value == "lots"));
}

#[rstest]
#[case::empty(b"".as_slice())]
#[case::truncated_headers(b"Content-Length: 10\r\n".as_slice())]
#[case::truncated_body(b"Content-Length: 10\r\n\r\n{}".as_slice())]
fn end_of_stream_reads_as_closed(#[case] input: &[u8]) {
    let err = reader(input).receive().expect_err("expected failure");

    assert!(err.is_closed(), "unexpected error: {err}");
}

#[rstest]
fn written_frames_read_back() {
    let mut buffer = Vec::new();
    {
        let mut writer = FrameWriter::new(&mut buffer);
        writer.send("{\"text\":\"ünïcode\"}".as_bytes()).expect("send failed");
    }

    let body = reader(&buffer).receive().expect("frame");
    assert_eq!(body, "{\"text\":\"ünïcode\"}".as_bytes().to_vec());
}
