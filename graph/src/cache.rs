//! Deep-tolerant equality cache used to suppress no-op writes.

use std::collections::HashMap;

use base::Mutex;
use serde_json::Value;

/// Default tolerance used for most subjects.
pub const DEFAULT_TOLERANCE: f64 = 0.01;

/// Tighter tolerance used on the hot `all_tracks.*` route.
pub const ALL_TRACKS_TOLERANCE: f64 = 0.001;

/// Per-subject "last seen payload" cache with a tolerance-based structural
/// comparison, so that republishing essentially-unchanged state (within
/// floating point noise) doesn't trigger a write.
pub struct ChangeCache {
    last: Mutex<HashMap<String, Value>>,
}

impl Default for ChangeCache {
    fn default() -> Self {
        Self::new()
    }
}

impl ChangeCache {
    pub fn new() -> Self {
        ChangeCache {
            last: Mutex::new(HashMap::new()),
        }
    }

    /// Returns `true` (and records `payload` as the new baseline) if
    /// `payload` differs from the last payload seen for `subject` by more
    /// than `tolerance` anywhere in its structure. The synchronous fast
    /// path the `all_tracks.*` route needs.
    pub fn has_changed(&self, subject: &str, payload: &Value, tolerance: f64) -> bool {
        let mut last = self.last.lock();
        let changed = match last.get(subject) {
            Some(prev) => is_meaningfully_different(prev, payload, tolerance),
            None => true,
        };
        if changed {
            last.insert(subject.to_string(), payload.clone());
        }
        changed
    }

    pub fn clear(&self) {
        self.last.lock().clear();
    }
}

/// Deep structural comparison: different JSON types are always different;
/// objects compare key-set-then-recursive; arrays compare element-wise by
/// position; numbers compare within `tolerance`; everything else uses
/// equality.
fn is_meaningfully_different(a: &Value, b: &Value, tolerance: f64) -> bool {
    match (a, b) {
        (Value::Object(ao), Value::Object(bo)) => {
            if ao.len() != bo.len() || ao.keys().any(|k| !bo.contains_key(k)) {
                return true;
            }
            ao.iter()
                .any(|(k, av)| is_meaningfully_different(av, &bo[k], tolerance))
        }
        (Value::Array(aa), Value::Array(ba)) => {
            if aa.len() != ba.len() {
                return true;
            }
            aa.iter()
                .zip(ba.iter())
                .any(|(av, bv)| is_meaningfully_different(av, bv, tolerance))
        }
        (Value::Number(an), Value::Number(bn)) => match (an.as_f64(), bn.as_f64()) {
            (Some(af), Some(bf)) => (af - bf).abs() > tolerance,
            _ => an != bn,
        },
        _ => a != b,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn first_observation_always_changed() {
        let cache = ChangeCache::new();
        assert!(cache.has_changed("all_tracks.cam1", &json!({"x": 1.0}), ALL_TRACKS_TOLERANCE));
    }

    #[test]
    fn within_tolerance_suppressed() {
        let cache = ChangeCache::new();
        assert!(cache.has_changed("all_tracks.cam1", &json!({"x": 1.0}), ALL_TRACKS_TOLERANCE));
        assert!(!cache.has_changed(
            "all_tracks.cam1",
            &json!({"x": 1.0004}),
            ALL_TRACKS_TOLERANCE
        ));
    }

    #[test]
    fn beyond_tolerance_triggers() {
        let cache = ChangeCache::new();
        assert!(cache.has_changed("all_tracks.cam1", &json!({"x": 1.0}), ALL_TRACKS_TOLERANCE));
        assert!(cache.has_changed(
            "all_tracks.cam1",
            &json!({"x": 1.01}),
            ALL_TRACKS_TOLERANCE
        ));
    }

    #[test]
    fn structural_change_triggers() {
        let cache = ChangeCache::new();
        assert!(cache.has_changed("ptzinfo.cam1", &json!({"pan": 1.0}), DEFAULT_TOLERANCE));
        assert!(cache.has_changed(
            "ptzinfo.cam1",
            &json!({"pan": 1.0, "tilt": 2.0}),
            DEFAULT_TOLERANCE
        ));
    }
}
