/// Rule-based troubleshooting lookup.
///
/// Maps a normalized (equipment type, symptom) pair to probable causes, ordered
/// remediation steps and follow-up actions. Unknown pairs get a generic inspection
/// procedure. Every response carries the same safety notes.
use std::collections::HashMap;

use serde_json::{Map, Value};
use tracing::debug;
use troubleshoot_common::http_api::{TroubleshootResponse, TroubleshootStep};

pub const SAFETY_NOTES: [&str; 3] = [
    "De-energize and lockout/tagout when possible before opening equipment.",
    "Use a properly rated meter and verify it on a known source before and after testing.",
    "Wear appropriate PPE for the available fault current and arc flash boundaries.",
];

const FALLBACK_CAUSES: [&str; 1] = ["Insufficient data"];

const FALLBACK_STEPS: [(&str, &str); 3] = [
    (
        "Verify power",
        "Confirm source voltage and upstream overcurrent device status.",
    ),
    (
        "Inspect connections",
        "De-energize and check all terminations for tightness and damage.",
    ),
    (
        "Measure under load",
        "Compare open-circuit vs under-load readings to detect drops.",
    ),
];

const FALLBACK_NEXT_ACTIONS: [&str; 1] = ["Provide more details or select a closer symptom"];

/// Authored form of a rule, as written in the built-in table.
pub struct RuleSpec {
    pub equipment_type: &'static str,
    pub symptom: &'static str,
    pub causes: &'static [&'static str],
    pub steps: &'static [(&'static str, &'static str)],
    pub next_actions: &'static [&'static str],
}

const BUILTIN_RULES: &[RuleSpec] = &[
    RuleSpec {
        equipment_type: "outlet",
        symptom: "no power",
        causes: &[
            "Tripped breaker",
            "Tripped GFCI upstream",
            "Loose neutral or hot",
        ],
        steps: &[
            (
                "Check panel",
                "Verify the branch breaker is not tripped; reset if safe.",
            ),
            (
                "Test GFCIs",
                "Locate and reset any GFCI receptacles upstream in bathrooms, kitchen, garage, exterior.",
            ),
            (
                "Voltage test",
                "Measure hot-to-neutral and hot-to-ground at the receptacle; expect ~120V.",
            ),
            (
                "Inspect terminations",
                "If safe, check receptacle backstabs vs. screw terminals; tighten as needed.",
            ),
        ],
        next_actions: &[
            "Document findings and load on circuit",
            "Consider replacing worn receptacle",
        ],
    },
    RuleSpec {
        equipment_type: "light",
        symptom: "flickering",
        causes: &[
            "Loose lamp",
            "Failed lamp/driver",
            "Loose neutral",
            "Dimmer incompatibility",
        ],
        steps: &[
            ("Secure lamp", "Reseat or replace lamp/fixture module."),
            (
                "Check dimmer",
                "Confirm fixture is compatible with installed dimmer; try bypassing dimmer.",
            ),
            (
                "Wiggle test",
                "With power off, tighten wire nuts and terminal screws in fixture box.",
            ),
        ],
        next_actions: &[
            "Check voltage stability under load",
            "Consider upgrading dimmer/driver",
        ],
    },
    RuleSpec {
        equipment_type: "breaker",
        symptom: "trips immediately",
        causes: &["Hard short to ground/neutral", "Faulty breaker"],
        steps: &[
            (
                "Isolate loads",
                "Disconnect downstream loads and retry; if still trips, inspect homerun",
            ),
            (
                "Megger/continuity",
                "With power off, test insulation resistance hot-to-neutral and hot-to-ground",
            ),
        ],
        next_actions: &["Replace breaker after fault cleared if nuisance persists"],
    },
];

/// Causes, steps and next actions for one (equipment type, symptom) pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleEntry {
    pub causes: Vec<String>,
    pub steps: Vec<TroubleshootStep>,
    pub next_actions: Vec<String>,
}

impl From<&RuleSpec> for RuleEntry {
    fn from(spec: &RuleSpec) -> Self {
        Self {
            causes: to_strings(spec.causes),
            steps: to_steps(spec.steps),
            next_actions: to_strings(spec.next_actions),
        }
    }
}

/// Immutable rule table, built once at startup.
#[derive(Debug, Clone)]
pub struct RuleBook {
    rules: HashMap<(String, String), RuleEntry>,
}

impl RuleBook {
    /// The rule set shipped with the service.
    pub fn builtin() -> Self {
        Self::new(BUILTIN_RULES)
    }

    pub fn new(specs: &[RuleSpec]) -> Self {
        let mut rules = HashMap::with_capacity(specs.len());
        for spec in specs {
            let key = rule_key(spec.equipment_type, spec.symptom);
            let previous = rules.insert(key, RuleEntry::from(spec));
            debug_assert!(
                previous.is_none(),
                "duplicate rule for ({:?}, {:?})",
                spec.equipment_type,
                spec.symptom
            );
        }
        Self { rules }
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// Find the entry for a pair, ignoring case and surrounding whitespace.
    pub fn lookup(&self, equipment_type: &str, symptom: &str) -> Option<&RuleEntry> {
        self.rules.get(&rule_key(equipment_type, symptom))
    }

    /// Build the response for a request. Never fails: unknown pairs get the generic
    /// inspection procedure.
    pub fn troubleshoot(
        &self,
        equipment_type: &str,
        symptom: &str,
        readings: Option<&Map<String, Value>>,
    ) -> TroubleshootResponse {
        if let Some(readings) = readings {
            debug!(readings = readings.len(), "readings received, not used for lookup");
        }

        match self.lookup(equipment_type, symptom) {
            Some(entry) => TroubleshootResponse {
                probable_causes: entry.causes.clone(),
                safety_notes: to_strings(&SAFETY_NOTES),
                steps: entry.steps.clone(),
                next_actions: entry.next_actions.clone(),
            },
            None => {
                debug!(equipment_type, symptom, "no rule matched, using fallback");
                fallback_response()
            }
        }
    }
}

pub fn fallback_response() -> TroubleshootResponse {
    TroubleshootResponse {
        probable_causes: to_strings(&FALLBACK_CAUSES),
        safety_notes: to_strings(&SAFETY_NOTES),
        steps: to_steps(&FALLBACK_STEPS),
        next_actions: to_strings(&FALLBACK_NEXT_ACTIONS),
    }
}

fn normalize(s: &str) -> String {
    s.trim().to_lowercase()
}

fn rule_key(equipment_type: &str, symptom: &str) -> (String, String) {
    (normalize(equipment_type), normalize(symptom))
}

fn to_strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

fn to_steps(steps: &[(&str, &str)]) -> Vec<TroubleshootStep> {
    steps
        .iter()
        .map(|(title, detail)| TroubleshootStep {
            title: title.to_string(),
            detail: detail.to_string(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    fn titles(response: &TroubleshootResponse) -> Vec<&str> {
        response.steps.iter().map(|s| s.title.as_str()).collect()
    }

    #[test]
    fn test_builtin_keys_are_unique_after_normalization() {
        let keys: HashSet<_> = BUILTIN_RULES
            .iter()
            .map(|r| rule_key(r.equipment_type, r.symptom))
            .collect();
        assert_eq!(keys.len(), BUILTIN_RULES.len());
        assert_eq!(RuleBook::builtin().len(), BUILTIN_RULES.len());
    }

    #[test]
    fn test_outlet_no_power_ignores_case_and_whitespace() {
        let book = RuleBook::builtin();
        let response = book.troubleshoot("Outlet", " No Power ", None);
        assert_eq!(
            response.probable_causes,
            vec![
                "Tripped breaker",
                "Tripped GFCI upstream",
                "Loose neutral or hot"
            ]
        );
        assert_eq!(
            titles(&response),
            vec!["Check panel", "Test GFCIs", "Voltage test", "Inspect terminations"]
        );
        assert_eq!(
            response.next_actions,
            vec![
                "Document findings and load on circuit",
                "Consider replacing worn receptacle"
            ]
        );
    }

    #[test]
    fn test_light_flickering() {
        let response = RuleBook::builtin().troubleshoot("light", "flickering", None);
        assert!(response
            .probable_causes
            .contains(&"Dimmer incompatibility".to_string()));
        assert_eq!(response.steps.len(), 3);
        assert!(response
            .next_actions
            .contains(&"Check voltage stability under load".to_string()));
    }

    #[test]
    fn test_breaker_trips_immediately() {
        let response = RuleBook::builtin().troubleshoot("BREAKER", "Trips Immediately\n", None);
        assert_eq!(
            response.probable_causes,
            vec!["Hard short to ground/neutral", "Faulty breaker"]
        );
        assert_eq!(titles(&response), vec!["Isolate loads", "Megger/continuity"]);
    }

    #[test]
    fn test_every_variant_of_a_known_pair_returns_the_same_entry() {
        let book = RuleBook::builtin();
        let expected = book.lookup("outlet", "no power").cloned().unwrap();
        for (equipment, symptom) in [
            ("OUTLET", "NO POWER"),
            ("\toutlet", "no power\n"),
            ("  Outlet  ", "No power"),
        ] {
            assert_eq!(book.lookup(equipment, symptom), Some(&expected));
        }
    }

    #[test]
    fn test_unknown_pair_returns_fallback() {
        let response = RuleBook::builtin().troubleshoot("fuse", "smells burnt", None);
        assert_eq!(response, fallback_response());
        assert_eq!(response.probable_causes, vec!["Insufficient data"]);
        assert_eq!(
            titles(&response),
            vec!["Verify power", "Inspect connections", "Measure under load"]
        );
        assert_eq!(
            response.next_actions,
            vec!["Provide more details or select a closer symptom"]
        );
    }

    #[test]
    fn test_inner_whitespace_is_significant() {
        let response = RuleBook::builtin().troubleshoot("outlet", "no  power", None);
        assert_eq!(response, fallback_response());
    }

    #[test]
    fn test_empty_input_falls_back() {
        let response = RuleBook::builtin().troubleshoot("", "", None);
        assert_eq!(response, fallback_response());
    }

    #[test]
    fn test_safety_notes_identical_for_matches_and_fallback() {
        let book = RuleBook::builtin();
        let expected = to_strings(&SAFETY_NOTES);
        for (equipment, symptom) in [
            ("outlet", "no power"),
            ("light", "flickering"),
            ("breaker", "trips immediately"),
            ("fuse", "smells burnt"),
        ] {
            assert_eq!(book.troubleshoot(equipment, symptom, None).safety_notes, expected);
        }
    }

    #[test]
    fn test_readings_do_not_change_the_result() {
        let book = RuleBook::builtin();
        let readings = serde_json::json!({"voltage": 0, "breaker_tripped": true});
        let with = book.troubleshoot("outlet", "no power", readings.as_object());
        let without = book.troubleshoot("outlet", "no power", None);
        assert_eq!(with, without);
    }

    #[test]
    fn test_custom_rule_keys_are_normalized_at_construction() {
        const RULES: &[RuleSpec] = &[RuleSpec {
            equipment_type: " Panel ",
            symptom: "HUMMING",
            causes: &["Loose lug"],
            steps: &[("Torque check", "Re-torque lugs with power off.")],
            next_actions: &["Schedule thermal scan"],
        }];
        let book = RuleBook::new(RULES);
        let entry = book.lookup("panel", "humming").unwrap();
        assert_eq!(entry.causes, vec!["Loose lug"]);
        assert_eq!(entry.steps[0].title, "Torque check");
    }
}
