//! Incremental Server-Sent Events decoder
//!
//! Bytes go in as they arrive from the socket; complete frames come out.
//! Lines starting with `:` are heartbeats. A blank line dispatches the
//! accumulated `data:` lines as one frame.

/// Decoded unit of the push stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SseFrame {
    /// A dispatched event; `data` is the `data:` lines joined by `\n`
    Event {
        event: Option<String>,
        id: Option<String>,
        data: String,
    },
    /// Comment line, used by the gateway as keepalive
    Heartbeat,
    /// `retry:` hint from the server, in milliseconds
    Retry(u64),
}

#[derive(Debug, Default)]
pub struct SseDecoder {
    buf: Vec<u8>,
    data: Vec<String>,
    event: Option<String>,
    id: Option<String>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk; returns every frame completed by it
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<SseFrame> {
        self.buf.extend_from_slice(chunk);
        let mut frames = Vec::new();

        while let Some(pos) = self.buf.iter().position(|b| *b == b'\n') {
            let mut line: Vec<u8> = self.buf.drain(..=pos).collect();
            line.pop();
            if line.last() == Some(&b'\r') {
                line.pop();
            }
            let line = String::from_utf8_lossy(&line);
            if let Some(frame) = self.process_line(&line) {
                frames.push(frame);
            }
        }

        frames
    }

    fn process_line(&mut self, line: &str) -> Option<SseFrame> {
        if line.is_empty() {
            return self.dispatch();
        }
        if line.starts_with(':') {
            return Some(SseFrame::Heartbeat);
        }

        let (field, value) = match line.split_once(':') {
            Some((f, v)) => (f, v.strip_prefix(' ').unwrap_or(v)),
            None => (line, ""),
        };

        match field {
            "data" => self.data.push(value.to_string()),
            "event" => self.event = Some(value.to_string()),
            "id" => self.id = Some(value.to_string()),
            "retry" => return value.trim().parse().ok().map(SseFrame::Retry),
            _ => {}
        }
        None
    }

    fn dispatch(&mut self) -> Option<SseFrame> {
        let event = self.event.take();
        if self.data.is_empty() {
            // Blank line with nothing buffered is a keepalive too
            return None;
        }
        let data = std::mem::take(&mut self.data).join("\n");
        Some(SseFrame::Event {
            event,
            id: self.id.clone(),
            data,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(data: &str) -> SseFrame {
        SseFrame::Event {
            event: None,
            id: None,
            data: data.to_string(),
        }
    }

    #[test]
    fn test_single_event() {
        let mut decoder = SseDecoder::new();
        let frames = decoder.feed(b"data: {\"type\":\"connected\"}\n\n");
        assert_eq!(frames, vec![event("{\"type\":\"connected\"}")]);
    }

    #[test]
    fn test_heartbeats_and_blank_lines() {
        let mut decoder = SseDecoder::new();
        let frames = decoder.feed(b": connected\n\n\n: ping\n");
        assert_eq!(frames, vec![SseFrame::Heartbeat, SseFrame::Heartbeat]);
    }

    #[test]
    fn test_split_across_chunks_and_crlf() {
        let mut decoder = SseDecoder::new();
        assert!(decoder.feed(b"event: msg\r\nid: 7\r\ndata: a").is_empty());
        assert!(decoder.feed(b"b\r\ndata: c\r\n").is_empty());
        let frames = decoder.feed(b"\r\n");
        assert_eq!(
            frames,
            vec![SseFrame::Event {
                event: Some("msg".to_string()),
                id: Some("7".to_string()),
                data: "ab\nc".to_string(),
            }]
        );
    }

    #[test]
    fn test_utf8_split_inside_character() {
        let mut decoder = SseDecoder::new();
        let bytes = "data: olá\n\n".as_bytes();
        let (head, tail) = bytes.split_at(9);
        assert!(decoder.feed(head).is_empty());
        assert_eq!(decoder.feed(tail), vec![event("olá")]);
    }

    #[test]
    fn test_retry_hint() {
        let mut decoder = SseDecoder::new();
        assert_eq!(decoder.feed(b"retry: 3000\n"), vec![SseFrame::Retry(3000)]);
    }
}
