//! Nostr event model.

use serde::{Deserialize, Serialize};

/// Kind of a short text note.
pub const KIND_TEXT_NOTE: u32 = 1;
/// Kind of a NIP-09 deletion request.
pub const KIND_DELETION: u32 = 5;
/// Kind of a NIP-23 long-form article.
pub const KIND_LONG_FORM: u32 = 30023;

/// Wrapper for a Nostr tag expressed as an array of strings.
///
/// Tags appear as small arrays where the first element denotes the type and the
/// following elements hold data. The ones this client emits are:
///
/// - `e` – references another event id
/// - `a` – references an addressable event as `<kind>:<pubkey>:<d>`
/// - `d` – unique identifier for replaceable events
/// - `title`, `published_at` – long-form article metadata
///
/// Every tag is stored verbatim so tags on events passed through in raw mode
/// survive unchanged.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Tag(pub Vec<String>);

impl Tag {
    /// Build a tag from its name followed by its values.
    pub fn new<I, S>(parts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Tag(parts.into_iter().map(Into::into).collect())
    }
}

/// A Nostr event, signed or not.
///
/// ```json
/// {
///   "id": "bde2...5285",
///   "pubkey": "79be...1798",
///   "created_at": 1700000000,
///   "kind": 1,
///   "tags": [["e", "a1b2..."]],
///   "content": "hello",
///   "sig": "..."
/// }
/// ```
///
/// `id` and `sig` are empty until the event is signed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Event {
    /// Event identifier (hex of SHA-256 hash).
    #[serde(default)]
    pub id: String,
    /// Author public key (x-only, hex).
    #[serde(default)]
    pub pubkey: String,
    /// Unix timestamp of creation.
    pub created_at: u64,
    /// Kind number, e.g. `1` or `30023`.
    pub kind: u32,
    #[serde(default)]
    pub tags: Vec<Tag>,
    #[serde(default)]
    pub content: String,
    /// Schnorr signature over the event id.
    #[serde(default)]
    pub sig: String,
}

impl Event {
    /// An unsigned event with empty `id` and `sig`.
    pub fn unsigned(
        pubkey: impl Into<String>,
        created_at: u64,
        kind: u32,
        tags: Vec<Tag>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            id: String::new(),
            pubkey: pubkey.into(),
            created_at,
            kind,
            tags,
            content: content.into(),
            sig: String::new(),
        }
    }

    pub fn is_signed(&self) -> bool {
        !self.sig.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tags_serialize_as_nested_arrays() {
        let ev = Event::unsigned(
            "p",
            1,
            KIND_TEXT_NOTE,
            vec![Tag::new(["e", "abc"]), Tag::new(["d", "slug"])],
            "hi",
        );
        let v = serde_json::to_value(&ev).unwrap();
        assert_eq!(v["tags"], serde_json::json!([["e", "abc"], ["d", "slug"]]));
    }

    #[test]
    fn missing_id_and_sig_default_to_empty() {
        let ev: Event =
            serde_json::from_str(r#"{"pubkey":"p","created_at":5,"kind":1,"content":"x"}"#)
                .unwrap();
        assert!(ev.id.is_empty());
        assert!(ev.tags.is_empty());
        assert!(!ev.is_signed());
    }
}
