//! LSP-style `Content-Length` message framing.
//!
//! # Wire Format
//!
//! ```text
//! Content-Length:<length>\r\n
//! Content-Type: application/jsonrpc; charset=utf-8\r\n
//! \r\n
//! <message-body>
//! ```
//!
//! `Content-Length` counts bytes of the body. Header names are matched
//! case-insensitively and `Content-Type` is optional.

use tracing::trace;

/// `Content-Type` written on every outgoing frame.
pub const CONTENT_TYPE: &str = "application/jsonrpc; charset=utf-8";

/// `Content-Type` assumed when an incoming frame has none.
pub const DEFAULT_CONTENT_TYPE: &str = "application/vscode-jsonrpc; charset=utf-8";

const HEADER_END: &[u8] = b"\r\n\r\n";

/// One complete message extracted from the stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub content_type: String,
    pub body: Vec<u8>,
}

#[derive(Debug)]
struct FrameHeader {
    content_length: usize,
    content_type: String,
}

/// Accumulates bytes from one connection and splits them into frames.
///
/// The buffer is the only state carried between calls, so bytes may arrive in
/// any split and a single [`feed`](Self::feed) may produce zero, one or many
/// frames.
#[derive(Debug, Default)]
pub struct FrameBuffer {
    buf: Vec<u8>,
}

impl FrameBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `data` and returns every frame that is now complete.
    pub fn feed(&mut self, data: &[u8]) -> Vec<Frame> {
        self.buf.extend_from_slice(data);
        let mut frames = Vec::new();
        while let Some(frame) = self.next_frame() {
            frames.push(frame);
        }
        frames
    }

    /// Bytes received but not yet consumed by a complete frame.
    pub fn pending(&self) -> usize {
        self.buf.len()
    }

    fn next_frame(&mut self) -> Option<Frame> {
        let header_len = find(&self.buf, HEADER_END)?;
        let Some(header) = parse_header(&self.buf[..header_len]) else {
            trace!(buffered = self.buf.len(), "header without Content-Length, waiting");
            return None;
        };
        let start = header_len + HEADER_END.len();
        let end = start.checked_add(header.content_length)?;
        if self.buf.len() < end {
            return None;
        }
        let body = self.buf[start..end].to_vec();
        self.buf.drain(..end);
        Some(Frame {
            content_type: header.content_type,
            body,
        })
    }
}

fn parse_header(header: &[u8]) -> Option<FrameHeader> {
    let header = String::from_utf8_lossy(header);
    let mut content_length = None;
    let mut content_type = DEFAULT_CONTENT_TYPE.to_string();
    for line in header.split("\r\n") {
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let key = key.trim();
        let value = value.trim();
        if key.eq_ignore_ascii_case("Content-Length") {
            content_length = value.parse().ok();
        } else if key.eq_ignore_ascii_case("Content-Type") {
            content_type = value.to_string();
        }
    }
    Some(FrameHeader {
        content_length: content_length?,
        content_type,
    })
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

/// Prefixes `body` with its header block.
pub fn encode_frame(body: &[u8]) -> Vec<u8> {
    let header = format!(
        "Content-Length:{}\r\nContent-Type: {CONTENT_TYPE}\r\n\r\n",
        body.len()
    );
    let mut frame = Vec::with_capacity(header.len() + body.len());
    frame.extend_from_slice(header.as_bytes());
    frame.extend_from_slice(body);
    frame
}

#[cfg(test)]
mod tests {
    use super::*;

    const BODY: &[u8] = br#"{"jsonrpc":"2.0","method":"echo","params":{"x":1},"id":1}"#;

    fn bodies(frames: Vec<Frame>) -> Vec<Vec<u8>> {
        frames.into_iter().map(|f| f.body).collect()
    }

    #[test]
    fn single_frame() {
        let mut fb = FrameBuffer::new();
        let frames = fb.feed(&encode_frame(BODY));
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].body, BODY);
        assert_eq!(frames[0].content_type, CONTENT_TYPE);
        assert_eq!(fb.pending(), 0);
    }

    #[test]
    fn content_type_defaults_when_absent() {
        let mut fb = FrameBuffer::new();
        let frames = fb.feed(b"Content-Length: 2\r\n\r\n{}");
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].content_type, DEFAULT_CONTENT_TYPE);
        assert_eq!(frames[0].body, b"{}");
    }

    #[test]
    fn header_names_are_case_insensitive() {
        let mut fb = FrameBuffer::new();
        let frames = fb.feed(b"content-length: 2\r\n\r\n[]");
        assert_eq!(bodies(frames), [b"[]".to_vec()]);
    }

    #[test]
    fn pipelined_frames_in_one_feed() {
        let second = br#"[{"jsonrpc":"2.0","method":"a","id":2}]"#;
        let mut input = encode_frame(BODY);
        input.extend(encode_frame(second));
        let mut fb = FrameBuffer::new();
        assert_eq!(bodies(fb.feed(&input)), [BODY.to_vec(), second.to_vec()]);
    }

    #[test]
    fn truncated_body_waits_for_rest() {
        let frame = encode_frame(BODY);
        let header_len = frame.len() - BODY.len();
        for cut in header_len..frame.len() {
            let mut fb = FrameBuffer::new();
            assert!(fb.feed(&frame[..cut]).is_empty(), "cut at {cut}");
            assert_eq!(bodies(fb.feed(&frame[cut..])), [BODY.to_vec()], "cut at {cut}");
        }
    }

    #[test]
    fn any_split_yields_same_frames() {
        let mut input = encode_frame(BODY);
        input.extend(encode_frame(b"{}"));
        input.extend(encode_frame(BODY));
        let expected = {
            let mut fb = FrameBuffer::new();
            bodies(fb.feed(&input))
        };
        assert_eq!(expected.len(), 3);

        for a in 0..input.len() {
            for b in a..input.len() {
                let mut fb = FrameBuffer::new();
                let mut got = bodies(fb.feed(&input[..a]));
                got.extend(bodies(fb.feed(&input[a..b])));
                got.extend(bodies(fb.feed(&input[b..])));
                assert_eq!(got, expected, "split at {a}/{b}");
            }
        }

        let mut fb = FrameBuffer::new();
        let mut got = Vec::new();
        for byte in &input {
            got.extend(bodies(fb.feed(std::slice::from_ref(byte))));
        }
        assert_eq!(got, expected);
    }

    #[test]
    fn length_counts_bytes_not_chars() {
        let body = r#"{"m":"あいう"}"#.as_bytes();
        let mut input = encode_frame(body);
        input.extend(encode_frame(b"{}"));
        let mut fb = FrameBuffer::new();
        assert_eq!(bodies(fb.feed(&input)), [body.to_vec(), b"{}".to_vec()]);
    }

    #[test]
    fn missing_content_length_accumulates() {
        let mut fb = FrameBuffer::new();
        assert!(fb.feed(b"Content-Type: x\r\n\r\n{}").is_empty());
        assert!(fb.feed(&encode_frame(BODY)).is_empty());
        assert!(fb.pending() > BODY.len());
    }

    #[test]
    fn incomplete_header_waits() {
        let mut fb = FrameBuffer::new();
        assert!(fb.feed(b"Content-Length:2\r\n").is_empty());
        assert!(fb.feed(b"\r").is_empty());
        assert_eq!(bodies(fb.feed(b"\n{}")), [b"{}".to_vec()]);
    }
}
