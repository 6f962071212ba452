fn main() {
    println!("Run `cargo test -p wire-compat` to execute wire compatibility tests.");
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::PathBuf;

    use roomdrop_protocol::{
        ChunkPayload, FileMetadata, Frame, Message, MessageType, derive_connect_id, derive_key,
    };
    use roomdrop_transfer::cipher;
    use serde::Deserialize;

    fn fixtures_dir() -> PathBuf {
        PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("fixtures")
    }

    fn load_fixture(name: &str) -> String {
        let path = fixtures_dir().join(name);
        fs::read_to_string(&path)
            .unwrap_or_else(|e| panic!("failed to read fixture {}: {e}", path.display()))
    }

    fn as_value(text: &str) -> serde_json::Value {
        serde_json::from_str(text).unwrap_or_else(|e| panic!("invalid JSON {text}: {e}"))
    }

    /// Parses a fixture into a typed frame, re-encodes it, and compares the
    /// JSON values (key order independent).
    fn frame_roundtrip(name: &str) -> Frame {
        let text = load_fixture(name);
        let msg = Message::from_json(&text)
            .unwrap_or_else(|e| panic!("failed to decode {name}: {e}"));
        let frame = Frame::from_message(&msg)
            .unwrap_or_else(|e| panic!("failed to validate {name}: {e}"));
        let encoded = frame.to_message().unwrap().to_json().unwrap();
        assert_eq!(
            as_value(&text),
            as_value(&encoded),
            "roundtrip mismatch for {name}:\n  fixture: {text}\n  encoded: {encoded}"
        );
        frame
    }

    #[test]
    fn fixture_request_metadata() {
        assert_eq!(frame_roundtrip("request_metadata.json"), Frame::RequestMetadata);
    }

    #[test]
    fn fixture_metadata() {
        let frame = frame_roundtrip("metadata.json");
        assert_eq!(
            frame,
            Frame::Metadata(FileMetadata::new("notes.txt", 40960, "text/plain"))
        );
    }

    #[test]
    fn fixture_request_chunk() {
        assert_eq!(frame_roundtrip("request_chunk.json"), Frame::request_chunk(16384));
    }

    #[test]
    fn fixture_chunk_decodes_with_room_key() {
        let Frame::Chunk(ChunkPayload { offset, buffer }) = frame_roundtrip("chunk.json") else {
            panic!("expected a chunk frame");
        };
        assert_eq!(offset, 0);
        assert_eq!(cipher::transform(&buffer, derive_key("Abc-Def#1234")), b"hi!");
    }

    #[test]
    fn fixture_chat() {
        assert_eq!(
            frame_roundtrip("chat.json"),
            Frame::chat("hello", Some("ana".into()))
        );
    }

    #[test]
    fn chat_without_sender_omits_field() {
        let json = Frame::chat("hi", None).to_message().unwrap().to_json().unwrap();
        assert_eq!(
            as_value(&json),
            serde_json::json!({"type": "chat", "payload": {"text": "hi"}})
        );
    }

    #[test]
    fn payload_missing_is_malformed() {
        let msg = Message::from_json(r#"{"type": "metadata"}"#).unwrap();
        assert_eq!(msg.msg_type, MessageType::Metadata);
        assert!(Frame::from_message(&msg).is_err());
    }

    #[test]
    fn unknown_type_is_rejected() {
        assert!(Message::from_json(r#"{"type": "offer"}"#).is_err());
    }

    #[derive(Deserialize)]
    struct CodeCase {
        code: String,
        connect_id: String,
        key: u8,
    }

    #[test]
    fn fixture_room_codes() {
        let cases: Vec<CodeCase> = serde_json::from_str(&load_fixture("room_codes.json")).unwrap();
        assert!(!cases.is_empty());
        for case in cases {
            assert_eq!(derive_connect_id(&case.code), case.connect_id, "{}", case.code);
            assert_eq!(derive_key(&case.code), case.key, "{}", case.code);
        }
    }
}
