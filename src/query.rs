//! Client-to-relay messages and the subscription filters sent with `REQ`.

use serde::{ser::SerializeSeq, Deserialize, Serialize, Serializer};
use serde_json::{Map, Value};

use crate::{
    error::{Error, Result},
    event::Event,
    nip19::{self, Decoded, Prefix},
};

/// Default `limit` for author, search and comment queries.
pub const DEFAULT_LIMIT: u64 = 100;

/// Client-chosen label correlating a `REQ` with the relay's replies.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubscriptionId(pub String);

impl SubscriptionId {
    pub fn new(label: impl Into<String>) -> Self {
        Self(label.into())
    }

    /// `label` followed by a random suffix, for sessions that may run several
    /// queries of the same kind at once.
    pub fn unique(label: &str) -> Self {
        Self(format!("{label}:{:08x}", rand::random::<u32>()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Subscription filter. Keys this client never builds still round-trip
/// through `extra`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Filter {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ids: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authors: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kinds: Option<Vec<u32>>,
    #[serde(rename = "#e", default, skip_serializing_if = "Option::is_none")]
    pub e_tags: Option<Vec<String>>,
    #[serde(rename = "#a", default, skip_serializing_if = "Option::is_none")]
    pub a_tags: Option<Vec<String>>,
    #[serde(rename = "#d", default, skip_serializing_if = "Option::is_none")]
    pub d_tags: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub search: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub since: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub until: Option<u64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Messages a client sends to a relay.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientMessage {
    /// `["REQ", sub, filter...]`
    Req(SubscriptionId, Vec<Filter>),
    /// `["EVENT", event]`
    Event(Box<Event>),
    /// `["CLOSE", sub]`
    Close(SubscriptionId),
    /// Any other array, sent exactly as given.
    Raw(Value),
}

impl ClientMessage {
    pub fn req(sub: SubscriptionId, filter: Filter) -> Self {
        ClientMessage::Req(sub, vec![filter])
    }

    pub fn verb(&self) -> &str {
        match self {
            ClientMessage::Req(..) => "REQ",
            ClientMessage::Event(_) => "EVENT",
            ClientMessage::Close(_) => "CLOSE",
            ClientMessage::Raw(value) => value[0].as_str().unwrap_or_default(),
        }
    }

    /// Subscription to close once the relay has answered: the `REQ`'s own id,
    /// or the literal `EVENT` for a published event. Raw messages use their
    /// second element when it is a string.
    pub fn close_id(&self) -> SubscriptionId {
        match self {
            ClientMessage::Req(sub, _) | ClientMessage::Close(sub) => sub.clone(),
            ClientMessage::Event(_) => SubscriptionId::new("EVENT"),
            ClientMessage::Raw(value) => match value.get(1).and_then(Value::as_str) {
                Some(sub) => SubscriptionId::new(sub),
                None => SubscriptionId::new("EVENT"),
            },
        }
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn to_value(&self) -> Result<Value> {
        Ok(serde_json::to_value(self)?)
    }

    /// Parse a literal wire array such as `["REQ","sub",{...}]`.
    pub fn parse(raw: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(raw)?;
        Self::try_from(value)
    }

    /// Wrap a literal array without interpreting its contents. Only the
    /// leading verb is checked.
    pub fn raw(raw: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(raw)?;
        match value.as_array().and_then(|arr| arr.first()) {
            Some(Value::String(_)) => Ok(ClientMessage::Raw(value)),
            _ => Err(Error::InvalidMessage(
                "expected a JSON array starting with a message type".into(),
            )),
        }
    }
}

impl TryFrom<Value> for ClientMessage {
    type Error = Error;

    fn try_from(value: Value) -> Result<Self> {
        let Value::Array(mut parts) = value else {
            return Err(Error::InvalidMessage("expected a JSON array".into()));
        };
        if parts.is_empty() {
            return Err(Error::InvalidMessage("empty message".into()));
        }
        let verb = parts.remove(0);
        let sub_id = |v: Option<Value>| -> Result<SubscriptionId> {
            match v {
                Some(Value::String(s)) => Ok(SubscriptionId(s)),
                _ => Err(Error::InvalidMessage("missing subscription id".into())),
            }
        };
        let mut parts = parts.into_iter();
        match verb.as_str() {
            Some("REQ") => {
                let sub = sub_id(parts.next())?;
                let filters = parts
                    .map(serde_json::from_value)
                    .collect::<std::result::Result<Vec<Filter>, _>>()?;
                Ok(ClientMessage::Req(sub, filters))
            }
            Some("EVENT") => {
                let event = parts
                    .next()
                    .ok_or_else(|| Error::InvalidMessage("EVENT without event".into()))?;
                Ok(ClientMessage::Event(Box::new(serde_json::from_value(event)?)))
            }
            Some("CLOSE") => Ok(ClientMessage::Close(sub_id(parts.next())?)),
            other => Err(Error::InvalidMessage(format!(
                "unsupported message type {}",
                other.unwrap_or("<non-string>")
            ))),
        }
    }
}

impl Serialize for ClientMessage {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            ClientMessage::Req(sub, filters) => {
                let mut seq = serializer.serialize_seq(Some(2 + filters.len()))?;
                seq.serialize_element("REQ")?;
                seq.serialize_element(sub)?;
                for filter in filters {
                    seq.serialize_element(filter)?;
                }
                seq.end()
            }
            ClientMessage::Event(event) => {
                let mut seq = serializer.serialize_seq(Some(2))?;
                seq.serialize_element("EVENT")?;
                seq.serialize_element(event)?;
                seq.end()
            }
            ClientMessage::Close(sub) => {
                let mut seq = serializer.serialize_seq(Some(2))?;
                seq.serialize_element("CLOSE")?;
                seq.serialize_element(sub)?;
                seq.end()
            }
            ClientMessage::Raw(value) => value.serialize(serializer),
        }
    }
}

/// What the caller wants to fetch.
#[derive(Debug, Clone)]
pub enum FetchIntent {
    /// A literal message, sent unmodified.
    Raw(String),
    /// A single note by id (`note`, `nevent`, hex) or address (`naddr`).
    Note(String),
    /// Replies referencing a note.
    Comments(String),
    Author {
        author: String,
        since: Option<u64>,
        limit: Option<u64>,
    },
    Search {
        terms: String,
        since: Option<u64>,
        limit: Option<u64>,
    },
}

/// Turns fetch intents into `REQ` messages.
#[derive(Debug, Clone, Default)]
pub struct QueryBuilder {
    /// Append a random suffix to each subscription id.
    pub unique_ids: bool,
}

impl QueryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn build(&self, intent: &FetchIntent) -> Result<ClientMessage> {
        match intent {
            FetchIntent::Raw(raw) => ClientMessage::raw(raw),
            FetchIntent::Note(note) => {
                let target = resolve_target(note, "note identifier")?;
                let filter = match target.identifier() {
                    Some(ident) if ident.prefix == Prefix::Naddr => Filter {
                        authors: Some(vec![ident.author.clone().ok_or_else(|| {
                            Error::MissingTarget("naddr without author".into())
                        })?]),
                        d_tags: Some(vec![ident.d.clone().unwrap_or_default()]),
                        limit: Some(1),
                        ..Default::default()
                    },
                    _ => Filter {
                        ids: Some(vec![target.lookup_key()]),
                        limit: Some(1),
                        ..Default::default()
                    },
                };
                Ok(ClientMessage::req(self.sub_id("fetchNote"), filter))
            }
            FetchIntent::Comments(note) => {
                let target = resolve_target(note, "note identifier")?;
                let mut filter = Filter {
                    limit: Some(DEFAULT_LIMIT),
                    ..Default::default()
                };
                match target.identifier().and_then(|i| i.coordinate()) {
                    Some(coordinate) => filter.a_tags = Some(vec![coordinate]),
                    None => filter.e_tags = Some(vec![target.lookup_key()]),
                }
                Ok(ClientMessage::req(self.sub_id("fetchComments"), filter))
            }
            FetchIntent::Author {
                author,
                since,
                limit,
            } => {
                let target = resolve_target(author, "author identifier")?;
                let filter = Filter {
                    authors: Some(vec![target.lookup_key()]),
                    limit: Some(limit.unwrap_or(DEFAULT_LIMIT)),
                    since: *since,
                    ..Default::default()
                };
                Ok(ClientMessage::req(self.sub_id("fetchNotesByAuthor"), filter))
            }
            FetchIntent::Search {
                terms,
                since,
                limit,
            } => {
                if terms.trim().is_empty() {
                    return Err(Error::MissingTarget("search terms".into()));
                }
                let filter = Filter {
                    search: Some(terms.clone()),
                    limit: Some(limit.unwrap_or(DEFAULT_LIMIT)),
                    since: *since,
                    ..Default::default()
                };
                Ok(ClientMessage::req(
                    self.sub_id("fetchNotesBySearchTerms"),
                    filter,
                ))
            }
        }
    }

    fn sub_id(&self, label: &str) -> SubscriptionId {
        if self.unique_ids {
            SubscriptionId::unique(label)
        } else {
            SubscriptionId::new(label)
        }
    }
}

/// Decode a note or author reference, mapping absence and decode failures to
/// `MissingTarget`. Secret keys and relay hints never name a target.
pub(crate) fn resolve_target(input: &str, what: &str) -> Result<Decoded> {
    let input = input.trim();
    if input.is_empty() {
        return Err(Error::MissingTarget(what.to_string()));
    }
    let decoded =
        nip19::decode(input).map_err(|e| Error::MissingTarget(format!("{what}: {e}")))?;
    match decoded.identifier().map(|i| i.prefix) {
        Some(prefix @ (Prefix::Nsec | Prefix::Nrelay)) => Err(Error::MissingTarget(format!(
            "{what}: {prefix} does not identify an event or author"
        ))),
        _ => Ok(decoded),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const ID: &str = "abcabcabcabcabcabcabcabcabcabcabcabcabcabcabcabcabcabcabcabcabca";
    const GX: &str = "79be667ef9dcbbac55a06295ce870b07029bfcdb2dce28d959f2815b16f81798";
    const NADDR: &str = "naddr1qqxk3safd3kx7tthcwm8ymryqythwumn8ghj7un9d3shjtn90psk6urvv5hxxmmdqgs8n0nx0muaewav2ksx99wwsu9swq5mlndjmn3gm9vl9q2mzmup0xqrqsqqqa28c8z0tl";

    fn build(intent: FetchIntent) -> Value {
        QueryBuilder::new().build(&intent).unwrap().to_value().unwrap()
    }

    #[test]
    fn note_by_id() {
        assert_eq!(
            QueryBuilder::new()
                .build(&FetchIntent::Note(ID.into()))
                .unwrap()
                .to_json()
                .unwrap(),
            format!(r#"["REQ","fetchNote",{{"ids":["{ID}"],"limit":1}}]"#)
        );
    }

    #[test]
    fn note_by_bech32_id() {
        let v = build(FetchIntent::Note(
            "note15xe2rv4pk2sm9gdj5xe2rv4pk2sm9gdj5xe2rv4pk2sm9gdj5xeqps0eaa".into(),
        ));
        assert_eq!(v[2]["ids"][0], "a1b2".repeat(16));
    }

    #[test]
    fn note_by_address_splits_author_and_d() {
        let v = build(FetchIntent::Note(NADDR.into()));
        assert_eq!(
            v,
            json!(["REQ", "fetchNote", {"authors": [GX], "#d": ["héllo-wörld"], "limit": 1}])
        );
    }

    #[test]
    fn comments_reference_the_note() {
        let v = build(FetchIntent::Comments(ID.into()));
        assert_eq!(v, json!(["REQ", "fetchComments", {"#e": [ID], "limit": 100}]));

        let v = build(FetchIntent::Comments(NADDR.into()));
        assert_eq!(v[2]["#a"][0], format!("30023:{GX}:héllo-wörld"));
    }

    #[test]
    fn author_with_since_and_limit() {
        let v = build(FetchIntent::Author {
            author: GX.into(),
            since: Some(1000),
            limit: Some(5),
        });
        assert_eq!(v[1], "fetchNotesByAuthor");
        assert_eq!(v[2], json!({"authors": [GX], "limit": 5, "since": 1000}));
    }

    #[test]
    fn author_defaults_to_limit_100() {
        let v = build(FetchIntent::Author {
            author: "npub10xlxvlhemja6c4dqv22uapctqupfhlxm9h8z3k2e72q4k9hcz7vqpkge6d".into(),
            since: None,
            limit: None,
        });
        assert_eq!(v[2], json!({"authors": [GX], "limit": 100}));
    }

    #[test]
    fn search_requires_terms() {
        let v = build(FetchIntent::Search {
            terms: "rust nostr".into(),
            since: None,
            limit: None,
        });
        assert_eq!(
            v,
            json!(["REQ", "fetchNotesBySearchTerms", {"search": "rust nostr", "limit": 100}])
        );
        let err = QueryBuilder::new()
            .build(&FetchIntent::Search {
                terms: " ".into(),
                since: None,
                limit: None,
            })
            .unwrap_err();
        assert!(matches!(err, Error::MissingTarget(_)));
    }

    #[test]
    fn undecodable_target_is_missing() {
        for bad in ["", "garbage", "note1qqqq"] {
            let err = QueryBuilder::new()
                .build(&FetchIntent::Note(bad.into()))
                .unwrap_err();
            assert!(matches!(err, Error::MissingTarget(_)), "{bad}");
        }
    }

    #[test]
    fn raw_messages_pass_through() {
        let raw = r##"["REQ","mine",{"kinds":[1],"#t":["rust"],"limit":3},{"ids":["x"]}]"##;
        let msg = QueryBuilder::new()
            .build(&FetchIntent::Raw(raw.into()))
            .unwrap();
        assert_eq!(msg.close_id(), SubscriptionId::new("mine"));
        let v = msg.to_value().unwrap();
        assert_eq!(v, serde_json::from_str::<Value>(raw).unwrap());
    }

    #[test]
    fn raw_fetch_keeps_unusual_values_and_verbs() {
        let raw = r#"["REQ","mine",{"kinds":"1","limit":"5"}]"#;
        let msg = QueryBuilder::new()
            .build(&FetchIntent::Raw(raw.into()))
            .unwrap();
        assert_eq!(msg.to_json().unwrap(), raw);
        assert_eq!(msg.verb(), "REQ");

        let msg = QueryBuilder::new()
            .build(&FetchIntent::Raw(r#"["COUNT","c",{"kinds":[1]}]"#.into()))
            .unwrap();
        assert_eq!(msg.verb(), "COUNT");
        assert_eq!(msg.close_id().as_str(), "c");

        for bad in ["{}", "[]", "[1]", "not json"] {
            assert!(
                QueryBuilder::new()
                    .build(&FetchIntent::Raw(bad.into()))
                    .is_err(),
                "{bad}"
            );
        }
    }

    #[test]
    fn secret_keys_and_relays_are_not_targets() {
        let nsec = "nsec1qqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqsmhltgl";
        let intents = [
            FetchIntent::Note(nsec.into()),
            FetchIntent::Comments(nsec.into()),
            FetchIntent::Author {
                author: nsec.into(),
                since: None,
                limit: None,
            },
        ];
        for intent in intents {
            let err = QueryBuilder::new().build(&intent).unwrap_err();
            assert!(matches!(err, Error::MissingTarget(_)), "{intent:?}");
            assert!(!err.to_string().contains(&"0".repeat(63)));
        }

        let mut params = nip19::EncodeParams::new(Prefix::Nrelay);
        params.hex = Some(hex::encode("wss://relay.example.com"));
        let nrelay = nip19::encode(&params).unwrap();
        let err = QueryBuilder::new()
            .build(&FetchIntent::Note(nrelay))
            .unwrap_err();
        assert!(matches!(err, Error::MissingTarget(_)));
    }

    #[test]
    fn raw_rejects_malformed_messages() {
        for raw in ["{}", "[]", r#"["REQ"]"#, r#"["AUTH","x"]"#, "not json"] {
            assert!(ClientMessage::parse(raw).is_err(), "{raw}");
        }
    }

    #[test]
    fn unique_ids_keep_the_label() {
        let builder = QueryBuilder { unique_ids: true };
        let msg = builder.build(&FetchIntent::Note(ID.into())).unwrap();
        let sub = msg.close_id();
        assert!(sub.as_str().starts_with("fetchNote:"));
        assert_eq!(sub.as_str().len(), "fetchNote:".len() + 8);
    }

    #[test]
    fn close_serializes_as_array() {
        let msg = ClientMessage::Close(SubscriptionId::new("fetchNote"));
        assert_eq!(msg.to_json().unwrap(), r#"["CLOSE","fetchNote"]"#);
        assert_eq!(msg.verb(), "CLOSE");
    }
}
