//! Typed shapes of the payloads carried on each subscribed subject.
//!
//! These mirror the message contracts the upstream tracking pipeline
//! publishes. Every field beyond what a row builder actually touches is
//! kept optional, since the upstream publishers evolve independently of
//! this bridge and extra/missing fields must not break ingestion.
//!
//! `tickperframe`, `fusion.ball_3d` and `fused_players` have no struct
//! here: their row builders read straight off the `serde_json::Value`,
//! defaulting each field independently, so one missing measurement
//! never drops the whole message the way a required struct field would.

use serde::Deserialize;
use serde_json::Value;

#[derive(Debug, Clone, Deserialize, Default)]
pub struct BallTrack {
    pub world_x: Option<f64>,
    pub world_y: Option<f64>,
    #[serde(default)]
    pub bbox: Option<Vec<f64>>,
    pub transform_pan: Option<f64>,
    pub transform_tilt: Option<f64>,
    pub confidence: Option<f64>,
    pub dist: Option<f64>,
    pub phi: Option<f64>,
    pub track_id: Option<i64>,
    pub id: Option<i64>,
    pub velocity: Option<f64>,
    pub movement_score: Option<f64>,
    pub velocity_direction: Option<f64>,
    pub velocity_x: Option<f64>,
    pub velocity_y: Option<f64>,
    pub id_score: Option<f64>,
    pub dist_score: Option<f64>,
    pub is_best: Option<bool>,
    pub ray_origin: Option<Vec<f64>>,
    pub ray_world_space_dir: Option<Vec<f64>>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct PlayerDetection {
    pub category: Option<String>,
    pub track_id: Option<i64>,
    #[serde(default)]
    pub bbox: Option<Vec<f64>>,
    pub confidence: Option<f64>,
    pub world_x: Option<f64>,
    pub world_y: Option<f64>,
    pub transform_pan: Option<f64>,
    pub transform_tilt: Option<f64>,
    pub dist: Option<f64>,
    pub ray_origin: Option<Vec<f64>>,
    pub ray_world_space_dir: Option<Vec<f64>>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct PtzInfo {
    pub panposition: Option<f64>,
    pub tiltposition: Option<f64>,
    pub rollposition: Option<f64>,
    pub pansetpoint: Option<f64>,
    pub tiltsetpoint: Option<f64>,
    pub zoomsetpoint: Option<f64>,
    pub panpower: Option<f64>,
    pub tiltpower: Option<f64>,
    pub rollpower: Option<f64>,
    pub pan: Option<f64>,
    pub tilt: Option<f64>,
    pub zoomspeed: Option<f64>,
    pub zoomposition: Option<f64>,
    pub focusposition: Option<f64>,
    pub panvelocity: Option<f64>,
    pub tiltvelocity: Option<f64>,
    pub zoomvelocity: Option<f64>,
    #[serde(rename = "tickID")]
    pub tick_id: Option<i64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct CamParams {
    pub intrinsic: Option<Value>,
    pub rotation: Option<Value>,
    pub translation: Option<Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AllTracksFrame {
    #[serde(rename = "tickID")]
    pub tick_id: Option<i64>,
    #[serde(rename = "PTZ", default)]
    pub ptz: Option<PtzInfo>,
    #[serde(default)]
    pub cam_params: Option<CamParams>,
    #[serde(default)]
    pub balls: Vec<BallTrack>,
    #[serde(default)]
    pub players: Vec<PlayerDetection>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct IntentPayload {
    pub offset_level: Option<String>,
    pub direction: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct IntentRuleDefinition {
    pub action: Option<String>,
    pub axis: Option<String>,
    pub default_ttl_level: Option<String>,
}

/// Only `camera_id` is required (mirroring `CypherBuilder`'s
/// "drop only if camera_id is missing" rule); every other field may be
/// absent from an otherwise-valid intent.
#[derive(Debug, Clone, Deserialize)]
pub struct IntentProcessed {
    pub camera_id: String,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub intent_id: Option<String>,
    #[serde(default)]
    pub intent_type: Option<String>,
    #[serde(default)]
    pub resolved_ttl_ms: Option<i64>,
    #[serde(default)]
    pub payload: Option<IntentPayload>,
    #[serde(default)]
    pub rule_definition: Option<IntentRuleDefinition>,
    #[serde(default)]
    pub reason: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_tracks_frame_tolerates_missing_sections() {
        let v: AllTracksFrame = serde_json::from_value(serde_json::json!({
            "tickID": 42,
        }))
        .unwrap();
        assert_eq!(v.tick_id, Some(42));
        assert!(v.balls.is_empty());
        assert!(v.players.is_empty());
    }

    #[test]
    fn intent_processed_requires_core_fields() {
        let v: IntentProcessed = serde_json::from_value(serde_json::json!({
            "status": "active",
            "intent_id": "abc-123",
            "camera_id": "camera5",
            "intent_type": "nudge_tilt",
        }))
        .unwrap();
        assert_eq!(v.camera_id, "camera5");
        assert!(v.payload.is_none());
    }

    #[test]
    fn intent_processed_tolerates_missing_everything_but_camera_id() {
        let v: IntentProcessed =
            serde_json::from_value(serde_json::json!({"camera_id": "camera2"})).unwrap();
        assert!(v.status.is_none());
        assert!(v.intent_type.is_none());

        let missing_camera: Result<IntentProcessed, _> =
            serde_json::from_value(serde_json::json!({"status": "active"}));
        assert!(missing_camera.is_err());
    }
}
