//! `text/event-stream` framing.

use serde::Serialize;

/// Data payload of the synthetic first frame sent to clients without an id.
pub const HANDSHAKE_DATA: &str = "initlasteventid";

/// Query parameter accepted in place of the `Last-Event-ID` header.
pub const LAST_EVENT_ID_PARAM: &str = "last-event-id";

/// Written before anything else so browsers consider the stream open.
pub const PREAMBLE: &str = "\n";

pub fn frame(data: &str, id: u64) -> String {
    format!("data:{data}\nid:{id}\n\n")
}

pub fn handshake(id: u64) -> String {
    frame(HANDSHAKE_DATA, id)
}

/// Frame a batch as a JSON array. `serde_json` escapes newlines, so the
/// payload always fits on one `data:` line.
pub fn batch<I: Serialize>(items: &[&I], id: u64) -> Result<String, serde_json::Error> {
    Ok(frame(&serde_json::to_string(items)?, id))
}
