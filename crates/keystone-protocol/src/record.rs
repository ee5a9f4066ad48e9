//! The session record: what a session looks like at rest and in memory.
//!
//! A record has exactly one reserved entry, `authenticated`, which holds
//! whatever the authenticator handed back (tokens, user info, ...). Every
//! other top-level key is free-form session data owned by the application.
//!
//! ```json
//! {
//!   "authenticated": { "authenticator": "authenticator:token", "token": "t" },
//!   "locale": "en"
//! }
//! ```
//!
//! When a record is persisted while a session is active, the name of the
//! authenticator that produced it is merged into `authenticated` under the
//! `authenticator` key. That is how a later restore knows whom to ask.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// An opaque string-keyed mapping of JSON values.
///
/// Authenticators produce and consume these; the controller never looks
/// inside them except for the [`AUTHENTICATOR_KEY`] entry.
pub type ContentMap = serde_json::Map<String, Value>;

/// The reserved top-level key holding authenticated content.
pub const AUTHENTICATED_KEY: &str = "authenticated";

/// The key inside `authenticated` naming the authenticator that produced it.
pub const AUTHENTICATOR_KEY: &str = "authenticator";

/// A serializable session record.
///
/// `authenticated` is never null: a missing or `null` entry decodes as an
/// empty map, and an empty map means "unauthenticated".
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    /// Content produced by the authenticator, possibly tagged with the
    /// authenticator's name.
    #[serde(default, deserialize_with = "null_as_empty")]
    pub authenticated: ContentMap,

    /// Every other top-level key.
    #[serde(flatten)]
    pub data: ContentMap,
}

impl SessionRecord {
    /// Creates an empty, unauthenticated record.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the authenticator named in `authenticated`, if any.
    ///
    /// Only a non-empty string counts as a name.
    pub fn authenticator_name(&self) -> Option<&str> {
        match self.authenticated.get(AUTHENTICATOR_KEY) {
            Some(Value::String(name)) if !name.is_empty() => Some(name),
            _ => None,
        }
    }

    /// Removes the authenticator name from `authenticated` and returns it.
    ///
    /// What remains in `authenticated` is exactly the payload the named
    /// authenticator expects to restore from. Returns `None` (and leaves
    /// the record untouched) when no usable name is present.
    pub fn take_authenticator(&mut self) -> Option<String> {
        self.authenticator_name()?;
        match self.authenticated.remove(AUTHENTICATOR_KEY) {
            Some(Value::String(name)) => Some(name),
            _ => None,
        }
    }

    /// Returns a copy of this record with `authenticator` merged into
    /// `authenticated`.
    ///
    /// The name is inserted first; fields already present in
    /// `authenticated` are kept and win on conflict.
    pub fn tagged_with(&self, authenticator: &str) -> Self {
        let mut authenticated = ContentMap::new();
        authenticated.insert(
            AUTHENTICATOR_KEY.to_owned(),
            Value::String(authenticator.to_owned()),
        );
        authenticated.extend(self.authenticated.clone());
        Self {
            authenticated,
            data: self.data.clone(),
        }
    }

    /// Looks up a free-form session data entry.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.data.get(key)
    }
}

/// Treats `"authenticated": null` the same as a missing entry.
fn null_as_empty<'de, D>(deserializer: D) -> Result<ContentMap, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<ContentMap>::deserialize(deserializer)?.unwrap_or_default())
}
