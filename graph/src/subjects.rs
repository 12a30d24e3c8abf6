//! The fixed subject set the orchestrator subscribes to, and the low-value
//! filter applied before anything is buffered.

use serde_json::Value;

pub const TICK_PER_FRAME: &str = "tickperframe";
pub const ALL_TRACKS_PREFIX: &str = "all_tracks.";
pub const PTZ_INFO_PREFIX: &str = "ptzinfo.";
pub const FUSION_BALL_3D: &str = "fusion.ball_3d";
pub const FUSED_PLAYERS: &str = "fused_players";
pub const INTENTS_PROCESSED: &str = "intents.processed";

/// Subscription patterns registered with the broker at startup.
pub const SUBSCRIPTIONS: &[&str] = &[
    TICK_PER_FRAME,
    "all_tracks.*",
    "ptzinfo.*",
    FUSION_BALL_3D,
    INTENTS_PROCESSED,
    FUSED_PLAYERS,
];

/// Subject prefixes that carry mostly-diagnostic traffic; combined with the
/// payload-size check in [`is_low_value`], these are dropped before ever
/// reaching the buffer.
const LOW_VALUE_PREFIXES: &[&str] = &["fps.", "colour-control.", "camera_mode_entry."];

/// A message is "low-value" if its subject starts with a
/// known low-value prefix *and* its payload object has three fields or
/// fewer. Non-object payloads (or payloads with more fields) are never
/// considered low-value even on a matching prefix.
pub fn is_low_value(subject: &str, payload: &Value) -> bool {
    let prefix_matches = LOW_VALUE_PREFIXES.iter().any(|p| subject.starts_with(p));
    if !prefix_matches {
        return false;
    }
    match payload.as_object() {
        Some(obj) => obj.len() <= 3,
        None => false,
    }
}

pub fn camera_id_from_all_tracks(subject: &str) -> Option<&str> {
    subject.strip_prefix(ALL_TRACKS_PREFIX)
}

pub fn camera_id_from_ptz_info(subject: &str) -> Option<&str> {
    subject.strip_prefix(PTZ_INFO_PREFIX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn low_value_requires_both_prefix_and_small_payload() {
        assert!(is_low_value("fps.cam1", &json!({"a": 1, "b": 2, "c": 3})));
        assert!(!is_low_value(
            "fps.cam1",
            &json!({"a": 1, "b": 2, "c": 3, "d": 4})
        ));
        assert!(!is_low_value("all_tracks.cam1", &json!({"a": 1})));
    }

    #[test]
    fn camera_id_extraction() {
        assert_eq!(camera_id_from_all_tracks("all_tracks.cam1"), Some("cam1"));
        assert_eq!(camera_id_from_ptz_info("ptzinfo.cam2"), Some("cam2"));
        assert_eq!(camera_id_from_all_tracks("tickperframe"), None);
    }
}
