//! Roster of participants currently joined to a room channel.
//!
//! The server tracks presences per key (usually a user id); each key holds one
//! meta entry per open connection, tagged with a unique `phx_ref`. A
//! `presence_state` frame replaces the whole roster and a `presence_diff`
//! frame carries `joins` and `leaves` in the same shape.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// All metas the server reports for one presence key.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PresenceEntry {
    #[serde(default)]
    pub metas: Vec<Value>,
}

impl PresenceEntry {
    fn phx_refs(&self) -> impl Iterator<Item = &str> {
        self.metas.iter().filter_map(meta_ref)
    }
}

fn meta_ref(meta: &Value) -> Option<&str> {
    meta.get("phx_ref").and_then(Value::as_str)
}

/// A snapshot of the presence roster, keyed by presence key.
pub type PresenceList = BTreeMap<String, PresenceEntry>;

/// A `presence_diff` payload.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PresenceDiff {
    #[serde(default)]
    pub joins: PresenceList,
    #[serde(default)]
    pub leaves: PresenceList,
}

/// The synced presence view of one channel instance.
///
/// Diffs that arrive before the first `presence_state` are held back and
/// applied on top of that state once it lands.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Presence {
    state: PresenceList,
    synced: bool,
    pending_diffs: Vec<PresenceDiff>,
}

impl Presence {
    /// An empty roster.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the roster with a full `presence_state` snapshot, then apply
    /// any diffs buffered before it.
    pub fn sync_state(&mut self, state: PresenceList) {
        self.state = state;
        self.synced = true;
        for diff in std::mem::take(&mut self.pending_diffs) {
            self.apply_diff(diff);
        }
    }

    /// Apply a `presence_diff`.
    ///
    /// Joins merge new metas into existing keys (metas already present by
    /// `phx_ref` are not duplicated). Leaves remove metas by `phx_ref` and drop
    /// keys left without any meta.
    ///
    /// Returns `false` if the diff was buffered because no state has been
    /// synced yet.
    pub fn sync_diff(&mut self, diff: PresenceDiff) -> bool {
        if !self.synced {
            self.pending_diffs.push(diff);
            return false;
        }
        self.apply_diff(diff);
        true
    }

    /// Returns `true` once a `presence_state` has been applied.
    pub fn is_synced(&self) -> bool {
        self.synced
    }

    fn apply_diff(&mut self, diff: PresenceDiff) {
        for (key, joined) in diff.joins {
            let entry = self.state.entry(key).or_default();
            for meta in joined.metas {
                let duplicate = meta_ref(&meta)
                    .is_some_and(|r| entry.phx_refs().any(|existing| existing == r));
                if !duplicate {
                    entry.metas.push(meta);
                }
            }
        }

        for (key, left) in diff.leaves {
            let Some(entry) = self.state.get_mut(&key) else {
                continue;
            };
            let gone: Vec<&str> = left.phx_refs().collect();
            entry
                .metas
                .retain(|meta| meta_ref(meta).is_none_or(|r| !gone.contains(&r)));
            if entry.metas.is_empty() {
                self.state.remove(&key);
            }
        }
    }

    /// The current roster.
    pub fn list(&self) -> &PresenceList {
        &self.state
    }

    /// Returns `true` if nobody is present.
    pub fn is_empty(&self) -> bool {
        self.state.is_empty()
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;
    use serde_json::json;

    fn list(value: Value) -> PresenceList {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn state_replaces_roster() {
        let mut presence = Presence::new();
        presence.sync_state(list(json!({"u1": {"metas": [{"phx_ref": "a"}]}})));
        presence.sync_state(list(json!({"u2": {"metas": [{"phx_ref": "b"}]}})));

        assert_eq!(presence.list().len(), 1);
        assert!(presence.list().contains_key("u2"));
    }

    #[test]
    fn diff_merges_joins_into_existing_keys() {
        let mut presence = Presence::new();
        presence.sync_state(list(json!({"u1": {"metas": [{"phx_ref": "a"}]}})));

        let diff: PresenceDiff = serde_json::from_value(json!({
            "joins": {
                "u1": {"metas": [{"phx_ref": "b"}, {"phx_ref": "a"}]},
                "u2": {"metas": [{"phx_ref": "c", "name": "Bea"}]}
            }
        }))
        .unwrap();
        presence.sync_diff(diff);

        assert_eq!(presence.list()["u1"].metas.len(), 2);
        assert_eq!(presence.list()["u2"].metas[0]["name"], "Bea");
    }

    #[test]
    fn diff_leave_removes_meta_and_empty_key() {
        let mut presence = Presence::new();
        presence.sync_state(list(json!({
            "u1": {"metas": [{"phx_ref": "a"}, {"phx_ref": "b"}]},
            "u2": {"metas": [{"phx_ref": "c"}]}
        })));

        let diff: PresenceDiff = serde_json::from_value(json!({
            "joins": {},
            "leaves": {
                "u1": {"metas": [{"phx_ref": "a"}]},
                "u2": {"metas": [{"phx_ref": "c"}]},
                "u9": {"metas": [{"phx_ref": "z"}]}
            }
        }))
        .unwrap();
        presence.sync_diff(diff);

        assert_eq!(presence.list()["u1"].metas, vec![json!({"phx_ref": "b"})]);
        assert!(!presence.list().contains_key("u2"));
        assert!(!presence.list().contains_key("u9"));
    }

    #[test]
    fn new_presence_is_empty() {
        let presence = Presence::new();
        assert!(presence.is_empty());
        assert!(!presence.is_synced());
    }

    #[test]
    fn diff_before_state_is_buffered_until_state() {
        let mut presence = Presence::new();
        let early: PresenceDiff = serde_json::from_value(json!({
            "joins": {"u2": {"metas": [{"phx_ref": "b"}]}},
            "leaves": {}
        }))
        .unwrap();

        assert!(!presence.sync_diff(early));
        assert!(presence.is_empty());

        presence.sync_state(list(json!({"u1": {"metas": [{"phx_ref": "a"}]}})));
        assert!(presence.is_synced());
        assert_eq!(presence.list().keys().collect::<Vec<_>>(), vec!["u1", "u2"]);

        let late: PresenceDiff = serde_json::from_value(json!({
            "leaves": {"u1": {"metas": [{"phx_ref": "a"}]}}
        }))
        .unwrap();
        assert!(presence.sync_diff(late));
        assert_eq!(presence.list().keys().collect::<Vec<_>>(), vec!["u2"]);
    }
}
