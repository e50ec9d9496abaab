use std::fmt::{Debug, Display};
use std::hash::Hash;
use std::marker::PhantomData;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// An opaque, UUID-backed identifier for a specific kind of entity.
///
/// Generalizes the pipeline's `Id<T>` counter from a process-local `u64` to
/// an opaque string, since the wire protocol (spec §6.2) calls for
/// "opaque UUID-like strings" rather than small integers clients could infer
/// ordering or scale from.
#[derive(Serialize, Deserialize)]
#[serde(transparent)]
pub struct Id<T> {
    value: Uuid,
    #[serde(skip)]
    kind: PhantomData<fn() -> T>,
}

impl<T> Id<T> {
    pub fn new() -> Self {
        Self {
            value: Uuid::new_v4(),
            kind: PhantomData,
        }
    }

    pub fn from_str_opaque(s: &str) -> Option<Self> {
        Uuid::parse_str(s).ok().map(|value| Self {
            value,
            kind: PhantomData,
        })
    }
}

impl<T> Default for Id<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Debug for Id<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.value)
    }
}

impl<T> Display for Id<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.value)
    }
}

impl<T> PartialEq for Id<T> {
    fn eq(&self, other: &Self) -> bool {
        self.value == other.value
    }
}

impl<T> Hash for Id<T> {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.value.hash(state)
    }
}

impl<T> Clone for Id<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Id<T> {}
impl<T> Eq for Id<T> {}

/// A user's identity, resolved once at connection time and never trusted from the wire again.
pub struct UserMarker;
pub type UserId = Id<UserMarker>;

pub struct RoomMarker;
pub type RoomId = Id<RoomMarker>;

pub struct ConnectionMarker;
pub type ConnectionId = Id<ConnectionMarker>;

pub struct VoteSessionMarker;
pub type VoteSessionId = Id<VoteSessionMarker>;

pub struct DjHistoryMarker;
pub type DjHistoryId = Id<DjHistoryMarker>;

pub struct TrackMarker;
pub type TrackId = Id<TrackMarker>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_of_the_same_kind_round_trip_through_display() {
        let id: RoomId = Id::new();
        let parsed: RoomId = Id::from_str_opaque(&id.to_string()).expect("valid uuid");
        assert_eq!(id, parsed, "round-tripping through Display must preserve equality");
    }

    #[test]
    fn distinct_ids_are_not_equal() {
        let a: RoomId = Id::new();
        let b: RoomId = Id::new();
        assert_ne!(a, b, "freshly generated ids must not collide in this test's lifetime");
    }
}
