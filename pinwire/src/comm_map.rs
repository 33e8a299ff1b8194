// comm_map.rs — Communication map: variable name → control slot index
//
// The host never exchanges a schema with the device; both sides derive the
// same table from the same model. Indices are therefore a pure function of
// model contents: sorted shared names first, then sorted pin-state names,
// numbered densely from zero.
//
// Preconditions: none.
// Postconditions: indices form the run 0..len() with no gaps; every entry
//                 with a pin kind carries its pin number.
// Failure modes: none; unparsable pin-state names are skipped.
// Side effects: none.

use std::collections::{BTreeSet, HashMap};
use std::fmt::{self, Write as _};

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::model::{pin_number_of, Model, PinKind};

// ── Entries ─────────────────────────────────────────────────────────────────

/// What a control slot is bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VarKind {
    Shared,
    Digital,
    Analog,
}

impl From<PinKind> for VarKind {
    fn from(kind: PinKind) -> Self {
        match kind {
            PinKind::Digital => VarKind::Digital,
            PinKind::Analog => VarKind::Analog,
        }
    }
}

impl fmt::Display for VarKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            VarKind::Shared => "shared",
            VarKind::Digital => "digital",
            VarKind::Analog => "analog",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommEntry {
    pub name: String,
    pub index: usize,
    pub kind: VarKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pin_number: Option<u32>,
}

// ── Map ─────────────────────────────────────────────────────────────────────

/// Immutable name → slot table. Entries are held in index order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<CommEntry>", into = "Vec<CommEntry>")]
pub struct CommMap {
    entries: Vec<CommEntry>,
    by_name: HashMap<String, usize>,
}

impl From<Vec<CommEntry>> for CommMap {
    fn from(mut entries: Vec<CommEntry>) -> Self {
        entries.sort_by_key(|e| e.index);
        let by_name = entries
            .iter()
            .enumerate()
            .map(|(pos, e)| (e.name.clone(), pos))
            .collect();
        CommMap { entries, by_name }
    }
}

impl From<CommMap> for Vec<CommEntry> {
    fn from(map: CommMap) -> Self {
        map.entries
    }
}

impl CommMap {
    /// Derive the map for `model`.
    pub fn build(model: &Model) -> CommMap {
        let mut entries = Vec::new();
        let mut taken = BTreeSet::new();

        let shared: BTreeSet<&str> = model
            .shared_variable_names()
            .iter()
            .map(String::as_str)
            .collect();
        for name in shared {
            taken.insert(name);
            entries.push(CommEntry {
                name: name.to_string(),
                index: entries.len(),
                kind: VarKind::Shared,
                pin_number: None,
            });
        }

        // BTreeMap keys are already in ascending order.
        for (name, state) in model.pin_states() {
            if taken.contains(name.as_str()) {
                continue;
            }
            let Some(pin) = pin_number_of(name) else {
                warn!(name = %name, "skipping pin state with malformed name");
                continue;
            };
            entries.push(CommEntry {
                name: name.clone(),
                index: entries.len(),
                kind: state.kind.into(),
                pin_number: Some(pin),
            });
        }

        CommMap::from(entries)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&CommEntry> {
        self.by_name.get(name).map(|&pos| &self.entries[pos])
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.get(name).map(|e| e.index)
    }

    /// Entries in index order.
    pub fn iter(&self) -> impl Iterator<Item = &CommEntry> {
        self.entries.iter()
    }

    /// Compact JSON with entries in index order. Stable across runs and used
    /// as the fingerprint input.
    pub fn canonical_json(&self) -> String {
        // Serializing plain structs and strings cannot fail.
        serde_json::to_string(&self.entries).unwrap_or_default()
    }

    /// Human-readable listing of the controllable variables.
    pub fn describe(&self) -> String {
        let mut out = String::from("--- Controllable Variables ---\n");
        if self.is_empty() {
            out.push_str("None detected. Use digital_write, analog_write or create_variable.");
            return out;
        }
        for e in &self.entries {
            let _ = write!(out, "- {} (index: {}, type: {}", e.name, e.index, e.kind);
            if let Some(pin) = e.pin_number {
                let _ = write!(out, ", pin: {}", pin);
            }
            out.push_str(")\n");
        }
        out
    }
}

impl<'a> IntoIterator for &'a CommMap {
    type Item = &'a CommEntry;
    type IntoIter = std::slice::Iter<'a, CommEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

// ── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Level;

    fn names(map: &CommMap) -> Vec<&str> {
        map.iter().map(|e| e.name.as_str()).collect()
    }

    #[test]
    fn empty_model_empty_map() {
        let map = CommMap::build(&Model::new());
        assert!(map.is_empty());
        assert_eq!(map.canonical_json(), "[]");
    }

    #[test]
    fn shared_first_then_pins() {
        let model = Model::new()
            .digital_write(13, Level::High)
            .create_variable("speed")
            .unwrap();
        let map = CommMap::build(&model);

        let speed = map.get("speed").unwrap();
        assert_eq!((speed.index, speed.kind, speed.pin_number), (0, VarKind::Shared, None));
        let pin = map.get("state_pin_13").unwrap();
        assert_eq!(
            (pin.index, pin.kind, pin.pin_number),
            (1, VarKind::Digital, Some(13))
        );
    }

    #[test]
    fn pin_names_sort_lexicographically_not_numerically() {
        let model = Model::new()
            .digital_write(9, Level::Low)
            .digital_write(10, Level::Low)
            .analog_write(3, 10);
        let map = CommMap::build(&model);
        assert_eq!(names(&map), ["state_pin_10", "state_pin_3", "state_pin_9"]);
        assert_eq!(map.index_of("state_pin_9"), Some(2));
        assert_eq!(map.get("state_pin_3").unwrap().kind, VarKind::Analog);
    }

    #[test]
    fn insertion_order_does_not_matter() {
        let a = Model::new()
            .create_variable("zeta")
            .and_then(|m| m.create_variable("alpha"))
            .unwrap()
            .digital_write(2, Level::High)
            .analog_write(5, 1);
        let b = Model::new()
            .analog_write(5, 1)
            .create_variable("alpha")
            .unwrap()
            .digital_write(2, Level::High)
            .create_variable("zeta")
            .unwrap();
        assert_eq!(CommMap::build(&a), CommMap::build(&b));
        assert_eq!(names(&CommMap::build(&a)), ["alpha", "zeta", "state_pin_2", "state_pin_5"]);
    }

    #[test]
    fn colliding_pin_state_is_skipped() {
        // Only reachable through a hand-written model document.
        let json = r#"{
            "pins_to_configure": [4],
            "pin_states": {"state_pin_4": {"kind": "digital", "initial_value": "LOW"}},
            "shared_variable_names": ["state_pin_4"]
        }"#;
        let model: Model = serde_json::from_str(json).unwrap();
        let map = CommMap::build(&model);
        assert_eq!(map.len(), 1);
        assert_eq!(map.get("state_pin_4").unwrap().kind, VarKind::Shared);
    }

    #[test]
    fn malformed_pin_state_does_not_leave_a_gap() {
        let json = r#"{
            "pins_to_configure": [],
            "pin_states": {
                "state_pin_1": {"kind": "digital", "initial_value": 1},
                "state_pin_x": {"kind": "digital", "initial_value": 1},
                "state_pin_2": {"kind": "analog", "initial_value": 5}
            },
            "shared_variable_names": []
        }"#;
        let model: Model = serde_json::from_str(json).unwrap();
        let map = CommMap::build(&model);
        let indices: Vec<usize> = map.iter().map(|e| e.index).collect();
        assert_eq!(indices, vec![0, 1]);
        assert!(map.get("state_pin_x").is_none());
    }

    #[test]
    fn canonical_json_shape() {
        let model = Model::new()
            .create_variable("speed")
            .unwrap()
            .digital_write(13, Level::High);
        assert_eq!(
            CommMap::build(&model).canonical_json(),
            r#"[{"name":"speed","index":0,"kind":"shared"},{"name":"state_pin_13","index":1,"kind":"digital","pin_number":13}]"#
        );
    }

    #[test]
    fn serde_rebuilds_name_lookup() {
        let model = Model::new().analog_write(6, 99);
        let map = CommMap::build(&model);
        let back: CommMap = serde_json::from_str(&map.canonical_json()).unwrap();
        assert_eq!(back.index_of("state_pin_6"), Some(0));
    }

    #[test]
    fn describe_lists_entries() {
        let model = Model::new().create_variable("speed").unwrap();
        let text = CommMap::build(&model).describe();
        assert!(text.contains("- speed (index: 0, type: shared)"));
        assert!(CommMap::build(&Model::new()).describe().contains("None detected"));
    }
}
