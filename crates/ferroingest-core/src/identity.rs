//! Deterministic event identities.
//!
//! An event id is a UUIDv5 over `source` and an ordered list of key strings,
//! so re-ingesting the same logical unit always yields the same ids and the
//! downstream sink can treat replays as no-ops.

use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Fixed namespace all event ids are derived under.
pub const EVENT_NAMESPACE: Uuid = Uuid::from_u128(0x3b8f_6c1e_9d2a_5f47_b0c3_71e4_a95d_2e08);

const DELIMITER: char = ':';
const ESCAPE: char = '\\';

/// Identifier stamped on every emitted event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(Uuid);

impl EventId {
    /// Content-derived id for `source` and `keys`.
    pub fn derive<I, K>(source: &str, keys: I) -> Self
    where
        I: IntoIterator<Item = K>,
        K: AsRef<str>,
    {
        let composite = composite_key(source, keys);
        Self(Uuid::new_v5(&EVENT_NAMESPACE, composite.as_bytes()))
    }

    /// Random id for events that carry no idempotency keys.
    pub fn random() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Display for EventId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.hyphenated())
    }
}

impl FromStr for EventId {
    type Err = uuid::Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(value).map(Self)
    }
}

/// Shorthand for [`EventId::derive`].
pub fn event_id<I, K>(source: &str, keys: I) -> EventId
where
    I: IntoIterator<Item = K>,
    K: AsRef<str>,
{
    EventId::derive(source, keys)
}

/// Join `source` and `keys` with [`DELIMITER`], escaping the delimiter inside
/// each component so `["a:b"]` and `["a", "b"]` never alias.
fn composite_key<I, K>(source: &str, keys: I) -> String
where
    I: IntoIterator<Item = K>,
    K: AsRef<str>,
{
    let mut composite = String::with_capacity(source.len() + 32);
    push_escaped(&mut composite, source);
    for key in keys {
        composite.push(DELIMITER);
        push_escaped(&mut composite, key.as_ref());
    }
    composite
}

fn push_escaped(out: &mut String, component: &str) {
    for ch in component.chars() {
        if ch == DELIMITER || ch == ESCAPE {
            out.push(ESCAPE);
        }
        out.push(ch);
    }
}
