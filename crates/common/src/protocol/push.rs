// Server push frames delivered over the `/ws/msg` websocket.
//
// A push frame is a single text frame: the debug marker, one space, then
// the rendered payload.

use serde_json::Value;

/// Marker that prefixes every server-initiated text frame.
pub const PUSH_MARKER: &str = "WS message from server ---";

/// Payload carried by a push. Any JSON value is accepted.
pub type PushMessage = Value;

/// Render a payload for the wire. Strings are written verbatim, every
/// other value as compact JSON.
pub fn render_payload(message: &Value) -> String {
    match message {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

/// Encode a payload as a complete push frame.
pub fn encode_push_frame(message: &Value) -> String {
    format!("{PUSH_MARKER} {}", render_payload(message))
}

/// Strip the marker from a received frame. Returns `None` for frames the
/// server did not push.
pub fn decode_push_frame(frame: &str) -> Option<&str> {
    frame.strip_prefix(PUSH_MARKER)?.strip_prefix(' ')
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn string_payloads_are_rendered_verbatim() {
        let frame = encode_push_frame(&json!("backend service shutting down..."));
        assert_eq!(frame, "WS message from server --- backend service shutting down...");
    }

    #[test]
    fn structured_payloads_are_rendered_as_json() {
        let frame = encode_push_frame(&json!({ "kind": "notice", "id": 7 }));
        let body = decode_push_frame(&frame).expect("frame should carry the marker");
        let parsed: Value = serde_json::from_str(body).expect("body should be json");
        assert_eq!(parsed["kind"], "notice");
        assert_eq!(parsed["id"], 7);
    }

    #[test]
    fn decode_rejects_frames_without_marker() {
        assert!(decode_push_frame("hello").is_none());
        assert!(decode_push_frame("WS message from server ---").is_none());
    }

    #[test]
    fn decode_keeps_payload_whitespace() {
        assert_eq!(decode_push_frame("WS message from server ---  padded"), Some(" padded"));
    }
}
