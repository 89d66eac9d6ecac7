//! Response identifier generation.

use uuid::Uuid;

fn random_alnum8() -> String {
    // A UUID's hex digits are a subset of [A-Za-z0-9]; take the first 8.
    Uuid::new_v4().simple().to_string()[..8].to_string()
}

/// Generate a chat-completion id: `chatcmpl-XXXXXXXX`.
pub fn completion_id() -> String {
    format!("chatcmpl-{}", random_alnum8())
}

/// Generate a tool-call id: `call_XXXXXXXX`.
pub fn tool_call_id() -> String {
    format!("call_{}", random_alnum8())
}

/// Unix-seconds timestamp, used as the `created` field.
pub fn unix_seconds() -> i64 {
    chrono::Utc::now().timestamp()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn completion_id_matches_pattern() {
        let id = completion_id();
        assert!(id.starts_with("chatcmpl-"));
        let suffix = &id["chatcmpl-".len()..];
        assert_eq!(suffix.len(), 8);
        assert!(suffix.chars().all(|c| c.is_ascii_alphanumeric()));
    }

    #[test]
    fn tool_call_id_matches_pattern() {
        let id = tool_call_id();
        assert!(id.starts_with("call_"));
        let suffix = &id["call_".len()..];
        assert_eq!(suffix.len(), 8);
        assert!(suffix.chars().all(|c| c.is_ascii_alphanumeric()));
    }
}
