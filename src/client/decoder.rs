//! Incremental `text/event-stream` decoder.

use crate::sse::frame::HANDSHAKE_DATA;

/// One dispatched event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub data: String,
    /// Last event id in effect when the message was dispatched.
    pub id: Option<String>,
}

impl Message {
    /// The server's synthetic "here is the current id" frame.
    pub fn is_handshake(&self) -> bool {
        self.data == HANDSHAKE_DATA
    }
}

/// Feeds on arbitrary byte chunks and yields complete messages.
///
/// Handles `data:`/`id:` fields with or without a space after the colon,
/// multi-line data, comment lines and CRLF line endings. Other fields are
/// ignored.
#[derive(Debug, Default)]
pub struct EventDecoder {
    pending: Vec<u8>,
    data: Vec<String>,
    last_event_id: Option<String>,
}

impl EventDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last_event_id(&self) -> Option<&str> {
        self.last_event_id.as_deref()
    }

    pub fn push(&mut self, chunk: &[u8]) -> Vec<Message> {
        self.pending.extend_from_slice(chunk);
        let mut messages = Vec::new();
        while let Some(end) = self.pending.iter().position(|b| *b == b'\n') {
            let mut line: Vec<u8> = self.pending.drain(..=end).collect();
            line.pop();
            if line.last() == Some(&b'\r') {
                line.pop();
            }
            if let Some(message) = self.line(&String::from_utf8_lossy(&line)) {
                messages.push(message);
            }
        }
        messages
    }

    fn line(&mut self, line: &str) -> Option<Message> {
        if line.is_empty() {
            if self.data.is_empty() {
                return None;
            }
            let data = std::mem::take(&mut self.data).join("\n");
            return Some(Message {
                data,
                id: self.last_event_id.clone(),
            });
        }
        if line.starts_with(':') {
            return None;
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };
        match field {
            "data" => self.data.push(value.to_string()),
            "id" if !value.contains('\0') => self.last_event_id = Some(value.to_string()),
            _ => {}
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_frames() {
        let mut decoder = EventDecoder::new();
        let messages = decoder.push(b"\ndata:initlasteventid\nid:4\n\ndata:[1,2]\nid:5\n\n");
        assert_eq!(messages.len(), 2);
        assert!(messages[0].is_handshake());
        assert_eq!(messages[0].id.as_deref(), Some("4"));
        assert_eq!(messages[1].data, "[1,2]");
        assert_eq!(decoder.last_event_id(), Some("5"));
    }

    #[test]
    fn test_split_chunks_and_crlf() {
        let mut decoder = EventDecoder::new();
        assert!(decoder.push(b"data: hel").is_empty());
        assert!(decoder.push(b"lo\r\ndata: world\r\n").is_empty());
        let messages = decoder.push(b": keepalive\r\n\r\n");
        assert_eq!(
            messages,
            vec![Message {
                data: "hello\nworld".into(),
                id: None,
            }]
        );
    }

    #[test]
    fn test_multibyte_split_across_chunks() {
        let mut decoder = EventDecoder::new();
        let frame = "data:\"é\"\n\n".as_bytes();
        let (a, b) = frame.split_at(7);
        assert!(decoder.push(a).is_empty());
        assert_eq!(decoder.push(b)[0].data, "\"é\"");
    }
}
