//! Converts subject + payload into zero or more graph write rows.
//! This is the one component on the hot path that is pure
//! and synchronous: no I/O, no locks beyond the change cache's. A
//! subject whose payload fails to parse into a row is logged and
//! dropped here; a subject the change cache judges unchanged since
//! the last message returns no rows silently, since that's not an
//! error.

use std::collections::HashMap;

use serde_json::{json, Map, Value};
use tracing::{error, warn};

use crate::cache::{ChangeCache, ALL_TRACKS_TOLERANCE, DEFAULT_TOLERANCE};
use crate::messages::{AllTracksFrame, IntentProcessed};
use crate::subjects;

pub type Row = Map<String, Value>;

/// The ten node kinds a row can target, in the fixed write order the
/// batch writer applies them in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EntityKind {
    Frame,
    Camera,
    PlayerTrack,
    BallTrack,
    PtzState,
    CamParams,
    CameraConfigUpdate,
    FusionBall3D,
    FusedPlayer,
    Intent,
}

impl EntityKind {
    /// The order [`crate::writer::BatchWriter`] applies batch_groups in.
    pub const WRITE_ORDER: [EntityKind; 10] = [
        EntityKind::Frame,
        EntityKind::Camera,
        EntityKind::PlayerTrack,
        EntityKind::BallTrack,
        EntityKind::PtzState,
        EntityKind::CamParams,
        EntityKind::CameraConfigUpdate,
        EntityKind::FusionBall3D,
        EntityKind::FusedPlayer,
        EntityKind::Intent,
    ];
}

#[derive(Debug, Clone)]
pub struct TaggedRow {
    pub kind: EntityKind,
    pub row: Row,
}

fn row(fields: Vec<(&str, Value)>) -> Row {
    fields.into_iter().map(|(k, v)| (k.to_string(), v)).collect()
}

fn tagged(kind: EntityKind, fields: Vec<(&str, Value)>) -> TaggedRow {
    TaggedRow {
        kind,
        row: row(fields),
    }
}

fn opt_f64(v: Option<f64>) -> Value {
    v.map(|x| json!(x)).unwrap_or(Value::Null)
}

fn opt_i64(v: Option<i64>) -> Value {
    v.map(|x| json!(x)).unwrap_or(Value::Null)
}

/// Reads `data.timestamp` (already ISO-8601 UTC) if present, else
/// `data.last_updated` (a Unix timestamp, converted), else falls back to
/// `system_timestamp` set for the current batch.
fn timestamp_for(data: &Value, system_timestamp: &str) -> String {
    if let Some(ts) = data.get("timestamp").and_then(Value::as_str) {
        return ts.to_string();
    }
    if let Some(unix) = data.get("last_updated").and_then(Value::as_f64) {
        if let Some(zoned) = jiff::Timestamp::from_second(unix as i64)
            .ok()
            .map(|t| t.to_zoned(jiff::tz::TimeZone::UTC))
        {
            return zoned.strftime("%Y-%m-%dT%H:%M:%S%.6fZ").to_string();
        }
    }
    system_timestamp.to_string()
}

/// Builds the zero-or-more write rows a single message produces. The
/// caller is responsible for skipping this call entirely while
/// `current_tick` is unset (no `tickperframe` message has been seen
/// yet).
pub struct RowBuilder<'a> {
    cache: &'a ChangeCache,
}

impl<'a> RowBuilder<'a> {
    pub fn new(cache: &'a ChangeCache) -> Self {
        RowBuilder { cache }
    }

    pub fn build(
        &self,
        subject: &str,
        payload: &Value,
        current_tick: Option<i64>,
        system_timestamp: &str,
    ) -> Vec<TaggedRow> {
        let Some(current_tick) = current_tick else {
            warn!(subject, "dropping message: no tickperframe seen yet, current_tick unset");
            return Vec::new();
        };

        if subject == subjects::TICK_PER_FRAME {
            return self.build_tickperframe(payload, system_timestamp);
        }
        if let Some(camera_id) = subjects::camera_id_from_ptz_info(subject) {
            return self.build_ptzinfo(subject, camera_id, payload, current_tick, system_timestamp);
        }
        if let Some(camera_id) = subjects::camera_id_from_all_tracks(subject) {
            return self.build_all_tracks(camera_id, payload, current_tick, system_timestamp);
        }
        if subject == subjects::FUSION_BALL_3D {
            return self.build_fusion_ball(payload, system_timestamp);
        }
        if subject == subjects::FUSED_PLAYERS {
            return self.build_fused_players(payload, system_timestamp);
        }
        if subject == subjects::INTENTS_PROCESSED {
            return self.build_intent(subject, payload, system_timestamp);
        }
        tracing::debug!(subject, "skipping unsupported subject");
        Vec::new()
    }

    fn build_tickperframe(&self, payload: &Value, system_timestamp: &str) -> Vec<TaggedRow> {
        let count = payload.get("count").and_then(Value::as_i64).unwrap_or(0);
        let timestamp = timestamp_for(payload, system_timestamp);
        vec![tagged(
            EntityKind::Frame,
            vec![("tickID", json!(count)), ("timestamp", json!(timestamp))],
        )]
    }

    fn build_ptzinfo(
        &self,
        subject: &str,
        camera_id: &str,
        payload: &Value,
        current_tick: i64,
        system_timestamp: &str,
    ) -> Vec<TaggedRow> {
        if !self.cache.has_changed(subject, payload, DEFAULT_TOLERANCE) {
            return Vec::new();
        }
        let timestamp = timestamp_for(payload, system_timestamp);
        let ptz: crate::messages::PtzInfo =
            serde_json::from_value(payload.clone()).unwrap_or_default();

        vec![
            tagged(
                EntityKind::Camera,
                vec![
                    ("cameraID", json!(camera_id)),
                    ("tickID", json!(current_tick)),
                    ("timestamp", json!(timestamp)),
                    ("last_active_timestamp", json!(timestamp)),
                ],
            ),
            tagged(EntityKind::PtzState, ptz_state_fields(camera_id, &ptz, current_tick, &timestamp)),
        ]
    }

    fn build_all_tracks(
        &self,
        camera_id: &str,
        payload: &Value,
        current_tick: i64,
        system_timestamp: &str,
    ) -> Vec<TaggedRow> {
        let frame: AllTracksFrame = match serde_json::from_value(payload.clone()) {
            Ok(f) => f,
            Err(e) => {
                error!(camera_id, err = %e, "missing required field or malformed payload for all_tracks frame");
                return Vec::new();
            }
        };
        let timestamp = timestamp_for(payload, system_timestamp);
        let mut rows = Vec::new();

        rows.push(tagged(
            EntityKind::Frame,
            vec![("tickID", json!(current_tick)), ("timestamp", json!(timestamp))],
        ));
        rows.push(tagged(
            EntityKind::Camera,
            vec![
                ("cameraID", json!(camera_id)),
                ("tickID", json!(current_tick)),
                ("timestamp", json!(timestamp)),
                ("last_active_timestamp", json!(timestamp)),
            ],
        ));

        if let Some(ptz) = &frame.ptz {
            rows.push(tagged(
                EntityKind::PtzState,
                ptz_state_fields(camera_id, ptz, current_tick, &timestamp),
            ));
        }
        if let Some(cam_params) = &frame.cam_params {
            rows.push(tagged(
                EntityKind::CamParams,
                vec![
                    ("paramsID", json!(format!("{camera_id}_{current_tick}"))),
                    ("cameraID", json!(camera_id)),
                    ("tickID", json!(current_tick)),
                    ("timestamp", json!(timestamp)),
                    (
                        "intrinsic",
                        cam_params.intrinsic.clone().unwrap_or(Value::Null),
                    ),
                    (
                        "rotation",
                        cam_params.rotation.clone().unwrap_or(Value::Null),
                    ),
                    (
                        "translation",
                        cam_params.translation.clone().unwrap_or(Value::Null),
                    ),
                ],
            ));
        }

        if frame.ptz.is_some() || frame.cam_params.is_some() {
            let gimbal_position = json!({
                "pan": frame.ptz.as_ref().and_then(|p| p.panposition),
                "tilt": frame.ptz.as_ref().and_then(|p| p.tiltposition),
                "zoom": frame.ptz.as_ref().and_then(|p| p.zoomposition),
            });
            let camera_parameters = json!({
                "intrinsic": frame.cam_params.as_ref().and_then(|c| c.intrinsic.clone()),
                "rotation": frame.cam_params.as_ref().and_then(|c| c.rotation.clone()),
                "translation": frame.cam_params.as_ref().and_then(|c| c.translation.clone()),
            });
            rows.push(tagged(
                EntityKind::CameraConfigUpdate,
                vec![
                    ("cameraID", json!(camera_id)),
                    ("gimbal_position", gimbal_position),
                    ("camera_parameters", camera_parameters),
                    ("timestamp", json!(timestamp)),
                ],
            ));
        }

        for ball in &frame.balls {
            let Some(track_id) = ball.track_id.or(ball.id) else {
                continue;
            };
            rows.push(tagged(
                EntityKind::BallTrack,
                vec![
                    ("track_id", json!(track_id)),
                    ("cameraID", json!(camera_id)),
                    ("current_tick", json!(current_tick)),
                    ("timestamp", json!(timestamp)),
                    ("world_x", opt_f64(ball.world_x)),
                    ("world_y", opt_f64(ball.world_y)),
                    ("confidence", opt_f64(ball.confidence)),
                    ("bbox", ball.bbox.clone().map(Value::from).unwrap_or(Value::Null)),
                    ("transform_PAN", opt_f64(ball.transform_pan)),
                    ("transform_TILT", opt_f64(ball.transform_tilt)),
                    ("dist", opt_f64(ball.dist)),
                    ("phi", opt_f64(ball.phi)),
                    ("velocity", opt_f64(ball.velocity)),
                    ("velocity_x", opt_f64(ball.velocity_x)),
                    ("velocity_y", opt_f64(ball.velocity_y)),
                    ("velocity_direction", opt_f64(ball.velocity_direction)),
                    ("movement_score", opt_f64(ball.movement_score)),
                    ("is_best", ball.is_best.map(Value::from).unwrap_or(Value::Null)),
                    ("id", opt_i64(ball.id)),
                    ("id_score", opt_f64(ball.id_score)),
                    ("dist_score", opt_f64(ball.dist_score)),
                    (
                        "ray_origin",
                        ball.ray_origin.clone().map(Value::from).unwrap_or(Value::Null),
                    ),
                    (
                        "ray_world_space_dir",
                        ball.ray_world_space_dir
                            .clone()
                            .map(Value::from)
                            .unwrap_or(Value::Null),
                    ),
                ],
            ));
        }

        for player in &frame.players {
            let Some(track_id) = player.track_id else {
                continue;
            };
            rows.push(tagged(
                EntityKind::PlayerTrack,
                vec![
                    ("track_id", json!(track_id)),
                    ("cameraID", json!(camera_id)),
                    ("current_tick", json!(current_tick)),
                    ("timestamp", json!(timestamp)),
                    ("category", player.category.clone().map(Value::from).unwrap_or(Value::Null)),
                    ("world_x", opt_f64(player.world_x)),
                    ("world_y", opt_f64(player.world_y)),
                    ("confidence", opt_f64(player.confidence)),
                    (
                        "bbox",
                        player.bbox.clone().map(Value::from).unwrap_or(Value::Null),
                    ),
                    ("transform_PAN", opt_f64(player.transform_pan)),
                    ("transform_TILT", opt_f64(player.transform_tilt)),
                    ("dist", opt_f64(player.dist)),
                    (
                        "ray_origin",
                        player.ray_origin.clone().map(Value::from).unwrap_or(Value::Null),
                    ),
                    (
                        "ray_world_space_dir",
                        player
                            .ray_world_space_dir
                            .clone()
                            .map(Value::from)
                            .unwrap_or(Value::Null),
                    ),
                ],
            ));
        }

        rows
    }

    fn build_fusion_ball(&self, payload: &Value, system_timestamp: &str) -> Vec<TaggedRow> {
        if !self
            .cache
            .has_changed(subjects::FUSION_BALL_3D, payload, ALL_TRACKS_TOLERANCE)
        {
            return Vec::new();
        }
        let timestamp = timestamp_for(payload, system_timestamp);
        let position_world = json!([
            payload.get("world_x").cloned().unwrap_or(Value::Null),
            payload.get("world_y").cloned().unwrap_or(Value::Null),
        ]);
        let velocity_mps = json!([
            payload.get("average_velocity_x").cloned().unwrap_or(Value::Null),
            payload.get("average_velocity_y").cloned().unwrap_or(Value::Null),
        ]);
        vec![tagged(
            EntityKind::FusionBall3D,
            vec![
                ("timestamp", json!(timestamp)),
                ("position_world", position_world),
                ("velocity_mps", velocity_mps),
                (
                    "status",
                    payload.get("status").cloned().unwrap_or(Value::Null),
                ),
                (
                    "fusion_method",
                    payload.get("fusion_method").cloned().unwrap_or(Value::Null),
                ),
                (
                    "kalman_filtered",
                    payload.get("kalman_filtered").cloned().unwrap_or(Value::Null),
                ),
                (
                    "smooth_2d",
                    payload.get("smooth_2d").cloned().unwrap_or(Value::Null),
                ),
                (
                    "camera_ready",
                    payload.get("camera_ready").cloned().unwrap_or(Value::Null),
                ),
            ],
        )]
    }

    fn build_fused_players(&self, payload: &Value, system_timestamp: &str) -> Vec<TaggedRow> {
        let Some(players) = payload.as_array() else {
            warn!("fused_players data is not a list");
            return Vec::new();
        };
        let timestamp = system_timestamp.to_string();
        players
            .iter()
            .filter_map(|p| {
                let id = p.get("id")?.clone();
                Some(tagged(
                    EntityKind::FusedPlayer,
                    vec![
                        ("id", id),
                        ("x", p.get("x").cloned().unwrap_or(Value::Null)),
                        ("y", p.get("y").cloned().unwrap_or(Value::Null)),
                        (
                            "z",
                            p.get("z").cloned().unwrap_or_else(|| json!(0.0)),
                        ),
                        ("vel_x", p.get("vel_x").cloned().unwrap_or(Value::Null)),
                        ("vel_y", p.get("vel_y").cloned().unwrap_or(Value::Null)),
                        (
                            "status",
                            p.get("status").cloned().unwrap_or(Value::Null),
                        ),
                        (
                            "category",
                            p.get("category").cloned().unwrap_or(Value::Null),
                        ),
                        ("team", p.get("team").cloned().unwrap_or(Value::Null)),
                        ("timestamp", json!(timestamp)),
                    ],
                ))
            })
            .collect()
    }

    fn build_intent(&self, subject: &str, payload: &Value, system_timestamp: &str) -> Vec<TaggedRow> {
        let intent: IntentProcessed = match serde_json::from_value(payload.clone()) {
            Ok(i) => i,
            Err(e) => {
                warn!(subject, err = %e, "dropping intent: missing camera_id or malformed payload");
                return Vec::new();
            }
        };
        let timestamp = timestamp_for(payload, system_timestamp);
        let payload_json = intent
            .payload
            .as_ref()
            .map(|p| json!(p).to_string())
            .map(Value::from)
            .unwrap_or(Value::Null);
        let rule_json = intent
            .rule_definition
            .as_ref()
            .map(|r| json!(r).to_string())
            .map(Value::from)
            .unwrap_or(Value::Null);

        vec![tagged(
            EntityKind::Intent,
            vec![
                ("cameraID", json!(intent.camera_id)),
                ("status", intent.status.map(Value::from).unwrap_or(Value::Null)),
                ("intent_id", intent.intent_id.map(Value::from).unwrap_or(Value::Null)),
                ("intent_type", intent.intent_type.map(Value::from).unwrap_or(Value::Null)),
                ("resolved_ttl_ms", opt_i64(intent.resolved_ttl_ms)),
                ("payload", payload_json),
                ("rule_definition", rule_json),
                (
                    "reason",
                    intent.reason.map(Value::from).unwrap_or(Value::Null),
                ),
                ("timestamp", json!(timestamp)),
            ],
        )]
    }
}

fn ptz_state_fields(
    camera_id: &str,
    ptz: &crate::messages::PtzInfo,
    current_tick: i64,
    timestamp: &str,
) -> Vec<(&'static str, Value)> {
    vec![
        ("stateID", json!(format!("{camera_id}_{current_tick}"))),
        ("cameraID", json!(camera_id)),
        ("tickID", json!(current_tick)),
        ("timestamp", json!(timestamp)),
        ("panposition", opt_f64(ptz.panposition)),
        ("tiltposition", opt_f64(ptz.tiltposition)),
        ("rollposition", opt_f64(ptz.rollposition)),
        ("pansetpoint", opt_f64(ptz.pansetpoint)),
        ("tiltsetpoint", opt_f64(ptz.tiltsetpoint)),
        ("zoomsetpoint", opt_f64(ptz.zoomsetpoint)),
        ("panpower", opt_f64(ptz.panpower)),
        ("tiltpower", opt_f64(ptz.tiltpower)),
        ("rollpower", opt_f64(ptz.rollpower)),
        ("pan", opt_f64(ptz.pan)),
        ("tilt", opt_f64(ptz.tilt)),
        ("zoomspeed", opt_f64(ptz.zoomspeed)),
        ("zoomposition", opt_f64(ptz.zoomposition)),
        ("focusposition", opt_f64(ptz.focusposition)),
    ]
}

/// Groups a flat list of tagged rows by kind, preserving arrival order
/// within each kind (the shape [`crate::writer::BatchWriter`] consumes).
pub fn group_by_kind(rows: Vec<TaggedRow>) -> HashMap<EntityKind, Vec<Row>> {
    let mut groups: HashMap<EntityKind, Vec<Row>> = HashMap::new();
    for r in rows {
        groups.entry(r.kind).or_default().push(r.row);
    }
    groups
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn unset_tick_yields_nothing() {
        let cache = ChangeCache::new();
        let builder = RowBuilder::new(&cache);
        let rows = builder.build(
            subjects::TICK_PER_FRAME,
            &json!({"count": 5}),
            None,
            "2026-01-01T00:00:00Z",
        );
        assert!(rows.is_empty());
    }

    #[test]
    fn tickperframe_produces_frame_row() {
        let cache = ChangeCache::new();
        let builder = RowBuilder::new(&cache);
        let rows = builder.build(
            subjects::TICK_PER_FRAME,
            &json!({"count": 42, "framerate": 30.0}),
            Some(0),
            "2026-01-01T00:00:00Z",
        );
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].kind, EntityKind::Frame);
        assert_eq!(rows[0].row["tickID"], json!(42));
    }

    #[test]
    fn all_tracks_produces_frame_camera_and_tracks() {
        let cache = ChangeCache::new();
        let builder = RowBuilder::new(&cache);
        let payload = json!({
            "tickID": 42,
            "balls": [{"world_x": 1.0, "world_y": 2.0, "track_id": 7, "bbox": [0.0,0.0,1.0,1.0]}],
            "players": [{"category": "player", "track_id": 3, "confidence": 0.9, "bbox": [0.0,0.0,1.0,1.0]}],
        });
        let rows = builder.build("all_tracks.camera1", &payload, Some(42), "2026-01-01T00:00:00Z");
        let kinds: Vec<_> = rows.iter().map(|r| r.kind).collect();
        assert!(kinds.contains(&EntityKind::Frame));
        assert!(kinds.contains(&EntityKind::Camera));
        assert!(kinds.contains(&EntityKind::BallTrack));
        assert!(kinds.contains(&EntityKind::PlayerTrack));
    }

    #[test]
    fn ball_without_track_id_is_dropped() {
        let cache = ChangeCache::new();
        let builder = RowBuilder::new(&cache);
        let payload = json!({"tickID": 1, "balls": [{"world_x": 1.0}]});
        let rows = builder.build("all_tracks.camera1", &payload, Some(1), "2026-01-01T00:00:00Z");
        assert!(!rows.iter().any(|r| r.kind == EntityKind::BallTrack));
    }

    #[test]
    fn ptzinfo_suppressed_when_unchanged() {
        let cache = ChangeCache::new();
        let builder = RowBuilder::new(&cache);
        let payload = json!({"pan": 1.0, "tilt": 2.0});
        let first = builder.build("ptzinfo.camera1", &payload, Some(1), "2026-01-01T00:00:00Z");
        assert!(!first.is_empty());
        let second = builder.build("ptzinfo.camera1", &payload, Some(2), "2026-01-01T00:00:00Z");
        assert!(second.is_empty());
    }

    #[test]
    fn intent_requires_camera_id() {
        let cache = ChangeCache::new();
        let builder = RowBuilder::new(&cache);
        let payload = json!({
            "status": "active",
            "intent_id": "abc",
            "camera_id": "camera2",
            "intent_type": "nudge_pan",
        });
        let rows = builder.build(
            subjects::INTENTS_PROCESSED,
            &payload,
            Some(1),
            "2026-01-01T00:00:00Z",
        );
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].kind, EntityKind::Intent);
    }

    #[test]
    fn intent_tolerates_missing_optional_fields() {
        let cache = ChangeCache::new();
        let builder = RowBuilder::new(&cache);
        let payload = json!({"camera_id": "camera3"});
        let rows = builder.build(
            subjects::INTENTS_PROCESSED,
            &payload,
            Some(1),
            "2026-01-01T00:00:00Z",
        );
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].row["cameraID"], json!("camera3"));
        assert_eq!(rows[0].row["status"], Value::Null);
    }
}
