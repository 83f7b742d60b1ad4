//! Builds signed `EVENT` messages from publish intents.

use std::time::{SystemTime, UNIX_EPOCH};

use tracing::debug;

use crate::{
    error::{Error, Result},
    event::{Event, Tag, KIND_DELETION, KIND_LONG_FORM, KIND_TEXT_NOTE},
    media,
    nip19::Decoded,
    query::{resolve_target, ClientMessage},
    signer::{self, Keys},
};

/// Content of a deletion request.
pub const DELETE_CONTENT: &str = "Request to delete";

/// What the caller wants to publish. File contents are read by the caller.
#[derive(Debug, Clone)]
pub enum PublishIntent {
    /// A literal `["EVENT", event]` message; signed only if unsigned.
    Raw(String),
    Text(String),
    Comment {
        note: String,
        content: String,
    },
    Article {
        slug: String,
        title: String,
        body: String,
    },
    /// Published exactly like [`PublishIntent::Article`].
    Html {
        slug: String,
        title: String,
        body: String,
    },
    File {
        name: String,
        bytes: Vec<u8>,
    },
    Delete {
        note: String,
    },
}

/// Current unix time in seconds.
pub fn now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}

/// Turns publish intents into signed `EVENT` messages.
pub struct EventBuilder<'a> {
    keys: Option<&'a Keys>,
    created_at: u64,
}

impl<'a> EventBuilder<'a> {
    pub fn new(keys: Option<&'a Keys>) -> Self {
        Self {
            keys,
            created_at: now(),
        }
    }

    /// Override the creation timestamp.
    pub fn created_at(mut self, created_at: u64) -> Self {
        self.created_at = created_at;
        self
    }

    pub fn build(&self, intent: &PublishIntent) -> Result<ClientMessage> {
        let event = match intent {
            PublishIntent::Raw(raw) => {
                let ClientMessage::Event(event) = ClientMessage::parse(raw)? else {
                    return Err(Error::InvalidMessage(
                        "raw publish expects [\"EVENT\", event]".into(),
                    ));
                };
                if event.is_signed() {
                    *event
                } else {
                    signer::sign(*event, self.keys)?
                }
            }
            _ => signer::sign(self.unsigned(intent)?, self.keys)?,
        };
        debug!(id = %event.id, kind = event.kind, "built event");
        Ok(ClientMessage::Event(Box::new(event)))
    }

    /// The unsigned event for every intent except `Raw`.
    pub fn unsigned(&self, intent: &PublishIntent) -> Result<Event> {
        let (kind, tags, content) = match intent {
            PublishIntent::Raw(_) => {
                return Err(Error::InvalidMessage(
                    "raw events are parsed, not built".into(),
                ))
            }
            PublishIntent::Text(content) => {
                (KIND_TEXT_NOTE, vec![], required_content(content, "text")?)
            }
            PublishIntent::Comment { note, content } => {
                let target = resolve_target(note, "note to comment on")?;
                let content = required_content(content, "comment")?;
                (KIND_TEXT_NOTE, vec![reference_tag(&target)], content)
            }
            PublishIntent::Article { slug, title, body }
            | PublishIntent::Html { slug, title, body } => {
                if slug.trim().is_empty() {
                    return Err(Error::MissingTarget("article slug".into()));
                }
                let body = required_content(body, "article body")?;
                let tags = vec![
                    Tag::new(["d", slug.as_str()]),
                    Tag::new(["title", title.as_str()]),
                    Tag(vec!["published_at".into(), self.created_at.to_string()]),
                ];
                (KIND_LONG_FORM, tags, body)
            }
            PublishIntent::File { name, bytes } => {
                if bytes.is_empty() {
                    return Err(Error::MissingContent(format!("file {name}")));
                }
                (KIND_TEXT_NOTE, vec![], media::data_uri(name, bytes))
            }
            PublishIntent::Delete { note } => {
                let target = resolve_target(note, "note to delete")?;
                (KIND_DELETION, vec![reference_tag(&target)], DELETE_CONTENT.to_string())
            }
        };
        let pubkey = self.keys.map(Keys::public_key_hex).unwrap_or_default();
        Ok(Event::unsigned(pubkey, self.created_at, kind, tags, content))
    }
}

/// `["a", <coordinate>]` for addressable targets, `["e", <id>]` otherwise.
fn reference_tag(target: &Decoded) -> Tag {
    match target.identifier().and_then(|i| i.coordinate()) {
        Some(coordinate) => Tag(vec!["a".into(), coordinate]),
        None => Tag(vec!["e".into(), target.lookup_key()]),
    }
}

fn required_content(content: &str, what: &str) -> Result<String> {
    if content.is_empty() {
        return Err(Error::MissingContent(what.to_string()));
    }
    Ok(content.to_string())
}
