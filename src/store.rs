//! Sensor variable store shared by both client pools
//!
//! Holds the last-known value of every Mesh sensor variable. Values are kept
//! exactly as they appeared on the wire: a quoted string keeps its quotes, a
//! bare integer literal stays bare. That way relayed lines and snapshot
//! replies are valid Mesh messages without re-quoting logic.

use indexmap::IndexMap;

use crate::protocol::KW_SENSOR_UPDATE;

/// Last-write-wins map of sensor variables, ordered by first insertion.
///
/// Owned exclusively by the dispatcher task, so no interior locking.
#[derive(Debug, Default)]
pub struct SensorStore {
    vars: IndexMap<String, String>,
}

impl SensorStore {
    pub fn new() -> Self {
        Self {
            vars: IndexMap::new(),
        }
    }

    /// Insert or overwrite a variable. Overwriting keeps the variable's
    /// original position in iteration order.
    pub fn set(&mut self, name: &str, value: &str) {
        self.vars.insert(name.to_string(), value.to_string());
    }

    /// Last stored value for `name`. Absent keys are a caller concern.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.vars.get(name).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    /// All variables in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.vars.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    /// Render the full store as one snapshot payload for a newly joined
    /// Mesh client: `sensor-update "<name>" <value> ...` with trailing
    /// whitespace trimmed. An empty store renders exactly `sensor-update`.
    pub fn snapshot_payload(&self) -> String {
        let mut payload = String::from(KW_SENSOR_UPDATE);
        for (name, value) in self.iter() {
            payload.push_str(&format!(" \"{}\" {}", name, value));
        }
        payload
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_and_get() {
        let mut store = SensorStore::new();
        store.set("score", "5");
        assert_eq!(store.get("score"), Some("5"));
        assert_eq!(store.get("missing"), None);
    }

    #[test]
    fn test_last_write_wins() {
        let mut store = SensorStore::new();
        store.set("score", "1");
        store.set("score", "2");
        assert_eq!(store.get("score"), Some("2"));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_overwrite_keeps_position() {
        let mut store = SensorStore::new();
        store.set("x", "1");
        store.set("y", "2");
        store.set("x", "9");

        let order: Vec<_> = store.iter().collect();
        assert_eq!(order, vec![("x", "9"), ("y", "2")]);
    }

    #[test]
    fn test_snapshot_payload_insertion_order() {
        let mut store = SensorStore::new();
        store.set("x", "1");
        store.set("y", "2");
        assert_eq!(store.snapshot_payload(), r#"sensor-update "x" 1 "y" 2"#);
    }

    #[test]
    fn test_snapshot_payload_empty_store() {
        let store = SensorStore::new();
        assert_eq!(store.snapshot_payload(), "sensor-update");
    }

    #[test]
    fn test_snapshot_payload_quoted_value() {
        let mut store = SensorStore::new();
        store.set("greeting", "\"hello world\"");
        assert_eq!(
            store.snapshot_payload(),
            r#"sensor-update "greeting" "hello world""#
        );
    }
}
