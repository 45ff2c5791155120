//! Turn keys

use serde::{Deserialize, Serialize};

/// Durable identifier of one turn within a conversation.
///
/// Serializes as a plain string such as `chatgpt-3` (position-derived) or
/// `chatgpt-4f1c9e` (host-assigned).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TurnKey(String);

impl TurnKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Key derived purely from a turn's position.
    pub fn from_index(prefix: &str, index: usize) -> Self {
        Self(format!("{}-{}", prefix, index))
    }

    /// Key derived from a host-assigned identifier.
    pub fn from_host_id(prefix: &str, host_id: &str) -> Self {
        Self(format!("{}-{}", prefix, host_id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The part after `prefix-`, if the key carries that prefix.
    pub fn suffix<'a>(&'a self, prefix: &str) -> Option<&'a str> {
        self.0
            .strip_prefix(prefix)
            .and_then(|rest| rest.strip_prefix('-'))
            .filter(|rest| !rest.is_empty())
    }
}

impl std::fmt::Display for TurnKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TurnKey {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for TurnKey {
    fn from(s: String) -> Self {
        Self(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn index_and_host_keys_share_format() {
        assert_eq!(TurnKey::from_index("gemini", 4).as_str(), "gemini-4");
        assert_eq!(TurnKey::from_host_id("chatgpt", "abc123").as_str(), "chatgpt-abc123");
    }

    #[test]
    fn suffix_requires_prefix_and_dash() {
        let key = TurnKey::new("chatgpt-abc");
        assert_eq!(key.suffix("chatgpt"), Some("abc"));
        assert_eq!(key.suffix("chat"), None);
        assert_eq!(TurnKey::new("chatgpt-").suffix("chatgpt"), None);
    }

    #[test]
    fn serializes_as_plain_string() {
        let key = TurnKey::new("claude-2");
        assert_eq!(serde_json::to_string(&key).unwrap(), "\"claude-2\"");
    }
}
