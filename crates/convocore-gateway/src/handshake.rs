use convocore_protocol::handshake::{ConnectChallenge, ConnectParams};
use uuid::Uuid;

/// Random nonce for the pre-auth `connect_challenge` event. Carried so a
/// signed-token deployment can bind it into the token to resist replay.
pub fn make_nonce() -> String {
    Uuid::new_v4().simple().to_string()
}

/// Serialize the `connect_challenge` event every new connection opens with.
/// This and `connect` are the only frames exchanged
/// outside the typed `ClientEvent`/`ServerEvent` wire vocabulary — they exist
/// purely to establish identity before that vocabulary applies.
pub fn challenge_json(nonce: &str) -> String {
    let mut value = serde_json::to_value(ConnectChallenge { nonce: nonce.to_string() }).expect("ConnectChallenge serializes");
    value["type"] = serde_json::json!("connect_challenge");
    serde_json::to_string(&value).expect("challenge serialization is infallible")
}

/// Parse an inbound pre-auth frame as a `connect` request. Returns `None` for
/// anything else, including malformed JSON — the caller treats that as a
/// protocol violation and closes with `unauthenticated`.
pub fn parse_connect(text: &str) -> Option<ConnectParams> {
    let value: serde_json::Value = serde_json::from_str(text).ok()?;
    if value.get("type").and_then(|t| t.as_str()) != Some("connect") {
        return None;
    }
    serde_json::from_value(value).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn challenge_carries_the_nonce_under_its_own_type_tag() {
        let json = challenge_json("abc123");
        assert!(json.contains(r#""type":"connect_challenge""#));
        assert!(json.contains("abc123"));
    }

    #[test]
    fn parses_a_well_formed_connect_frame() {
        let params = parse_connect(r#"{"type":"connect","token":"alice.secret"}"#).unwrap();
        assert_eq!(params.token, "alice.secret");
    }

    #[test]
    fn rejects_anything_that_is_not_a_connect_frame() {
        assert!(parse_connect(r#"{"type":"chat_request","text":"hi"}"#).is_none());
        assert!(parse_connect("not json").is_none());
    }
}
