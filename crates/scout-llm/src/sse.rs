//! # SSE Parser
//!
//! Server-Sent Events parser for chat-completions streams:
//! - Line buffering from chunked responses
//! - `data: ` prefix extraction
//! - `[DONE]` ends the stream
//! - Read errors become a terminal `Err` item

use std::fmt::Display;

use bytes::{Bytes, BytesMut};
use futures::{Stream, StreamExt};
use tracing::warn;

use scout_core::GatewayError;

/// Classification of a single SSE line.
#[derive(Debug, PartialEq, Eq)]
enum SseLine {
    Data(String),
    Done,
    Skip,
}

/// Parse SSE lines from a byte stream and yield the raw `data:` payloads.
///
/// The stream ends after `[DONE]`, after the byte stream ends, or after the
/// first read error (yielded as `GatewayError::StreamInterrupted`).
pub fn parse_sse_lines<S, E>(byte_stream: S) -> impl Stream<Item = Result<String, GatewayError>> + Send
where
    S: Stream<Item = Result<Bytes, E>> + Send + Unpin + 'static,
    E: Display + Send + 'static,
{
    futures::stream::unfold(
        (byte_stream, BytesMut::with_capacity(8192), false),
        |(mut stream, mut buffer, done)| async move {
            if done {
                return None;
            }

            loop {
                if let Some(newline_pos) = buffer.iter().position(|&b| b == b'\n') {
                    let mut line_bytes = buffer.split_to(newline_pos + 1);
                    line_bytes.truncate(line_bytes.len() - 1);
                    if line_bytes.last() == Some(&b'\r') {
                        line_bytes.truncate(line_bytes.len() - 1);
                    }

                    let Ok(line) = std::str::from_utf8(&line_bytes) else {
                        warn!("skipping SSE line with invalid UTF-8");
                        continue;
                    };

                    match classify_line(line) {
                        SseLine::Data(data) => return Some((Ok(data), (stream, buffer, false))),
                        SseLine::Done => return None,
                        SseLine::Skip => continue,
                    }
                }

                match stream.next().await {
                    Some(Ok(chunk)) => buffer.extend_from_slice(&chunk),
                    Some(Err(e)) => {
                        warn!(error = %e, "SSE stream read error");
                        let err = GatewayError::StreamInterrupted(e.to_string());
                        return Some((Err(err), (stream, buffer, true)));
                    }
                    None => {
                        // A final line without a trailing newline still counts.
                        if !buffer.is_empty() {
                            let rest = std::str::from_utf8(&buffer).map(|s| classify_line(s.trim()));
                            buffer.clear();
                            if let Ok(SseLine::Data(data)) = rest {
                                return Some((Ok(data), (stream, buffer, true)));
                            }
                        }
                        return None;
                    }
                }
            }
        },
    )
}

fn classify_line(line: &str) -> SseLine {
    let trimmed = line.trim();

    if trimmed.is_empty() || trimmed.starts_with(':') {
        return SseLine::Skip;
    }

    let Some(data) = trimmed
        .strip_prefix("data: ")
        .or_else(|| trimmed.strip_prefix("data:"))
    else {
        // event:, id:, retry: carry nothing we use
        return SseLine::Skip;
    };

    match data.trim() {
        "[DONE]" => SseLine::Done,
        "" => SseLine::Skip,
        data => SseLine::Data(data.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunks(parts: &[&str]) -> impl Stream<Item = Result<Bytes, String>> + Send + Unpin + 'static {
        let items: Vec<Result<Bytes, String>> = parts
            .iter()
            .map(|p| Ok(Bytes::from(p.to_string())))
            .collect();
        futures::stream::iter(items)
    }

    async fn collect(stream: impl Stream<Item = Result<String, GatewayError>>) -> Vec<Result<String, GatewayError>> {
        stream.collect().await
    }

    #[test]
    fn classify() {
        assert_eq!(classify_line("data: {\"a\":1}"), SseLine::Data("{\"a\":1}".into()));
        assert_eq!(classify_line("data:{}"), SseLine::Data("{}".into()));
        assert_eq!(classify_line("data: [DONE]"), SseLine::Done);
        assert_eq!(classify_line(": keep-alive"), SseLine::Skip);
        assert_eq!(classify_line("event: message"), SseLine::Skip);
        assert_eq!(classify_line("data: "), SseLine::Skip);
        assert_eq!(classify_line(""), SseLine::Skip);
    }

    #[tokio::test]
    async fn lines_split_across_chunks() {
        let stream = chunks(&["data: {\"x\"", ":1}\n\ndata: {\"y\":2}\r\n", "\n"]);
        let out = collect(parse_sse_lines(stream)).await;
        let data: Vec<String> = out.into_iter().map(Result::unwrap).collect();
        assert_eq!(data, vec!["{\"x\":1}", "{\"y\":2}"]);
    }

    #[tokio::test]
    async fn done_marker_stops_stream() {
        let stream = chunks(&["data: a\n\ndata: [DONE]\n\ndata: after\n\n"]);
        let out = collect(parse_sse_lines(stream)).await;
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].as_deref().unwrap(), "a");
    }

    #[tokio::test]
    async fn trailing_line_without_newline() {
        let stream = chunks(&["data: a\n", "data: tail"]);
        let out = collect(parse_sse_lines(stream)).await;
        let data: Vec<String> = out.into_iter().map(Result::unwrap).collect();
        assert_eq!(data, vec!["a", "tail"]);
    }

    #[tokio::test]
    async fn read_error_is_terminal_err() {
        let items: Vec<Result<Bytes, String>> = vec![
            Ok(Bytes::from_static(b"data: first\n\n")),
            Err("connection reset".to_string()),
            Ok(Bytes::from_static(b"data: never\n\n")),
        ];
        let out = collect(parse_sse_lines(futures::stream::iter(items))).await;
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].as_deref().unwrap(), "first");
        match &out[1] {
            Err(GatewayError::StreamInterrupted(msg)) => assert!(msg.contains("connection reset")),
            other => panic!("expected StreamInterrupted, got {other:?}"),
        }
    }
}
