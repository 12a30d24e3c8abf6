//! Applies a grouped batch of rows to the graph in the fixed write order.
//! Each node kind gets one `UNWIND`ed statement except
//! `CameraConfigUpdate`, which updates one row at a time since each row
//! carries its own JSON-encoded nested properties.

use std::collections::HashMap;

use neo4rs::Query;
use tracing::debug;

use crate::bolt::rows_to_bolt;
use crate::client::GraphClient;
use crate::rows::{EntityKind, Row};

pub struct BatchWriter<'a> {
    client: &'a GraphClient,
}

impl<'a> BatchWriter<'a> {
    pub fn new(client: &'a GraphClient) -> Self {
        BatchWriter { client }
    }

    /// Writes every non-empty group in `batch_groups`, in
    /// [`EntityKind::WRITE_ORDER`].
    pub async fn write(&self, mut batch_groups: HashMap<EntityKind, Vec<Row>>) -> Result<(), base::Error> {
        for kind in EntityKind::WRITE_ORDER {
            let Some(rows) = batch_groups.remove(&kind) else {
                continue;
            };
            if rows.is_empty() {
                continue;
            }
            self.write_kind(kind, rows).await?;
        }
        Ok(())
    }

    async fn write_kind(&self, kind: EntityKind, rows: Vec<Row>) -> Result<(), base::Error> {
        debug!(?kind, count = rows.len(), "writing batch group");
        match kind {
            EntityKind::Frame => {
                self.client
                    .execute_pooled(
                        Query::new(
                            "UNWIND $rows AS row
                             MERGE (f:Frame {tickID: row.tickID})
                             SET f.timestamp = row.timestamp"
                                .to_string(),
                        )
                        .param("rows", rows_to_bolt(&rows)),
                    )
                    .await
            }
            EntityKind::Camera => {
                self.client
                    .execute(
                        Query::new(
                            "UNWIND $rows AS row
                             MERGE (c:Camera {cameraID: row.cameraID})
                             SET c.last_active_tick = row.tickID,
                                 c.timestamp = row.timestamp,
                                 c.last_active_timestamp = row.last_active_timestamp"
                                .to_string(),
                        )
                        .param("rows", rows_to_bolt(&rows)),
                    )
                    .await
            }
            EntityKind::PlayerTrack => {
                self.client
                    .execute(
                        Query::new(
                            "UNWIND $rows AS row
                             CREATE (pt:PlayerTrack {
                                 track_id: row.track_id,
                                 tickID: row.current_tick,
                                 timestamp: row.timestamp,
                                 category: row.category,
                                 world_x: row.world_x,
                                 world_y: row.world_y,
                                 confidence: row.confidence,
                                 bbox: row.bbox,
                                 transform_PAN: row.transform_PAN,
                                 transform_TILT: row.transform_TILT,
                                 dist: row.dist,
                                 ray_origin: row.ray_origin,
                                 ray_world_space_dir: row.ray_world_space_dir,
                                 last_updated: row.timestamp
                             })
                             WITH pt, row
                             MERGE (f:Frame {tickID: row.current_tick})
                             CREATE (f)-[:HAS_ACTIVE_TRACK]->(pt)
                             WITH pt, row
                             MERGE (c:Camera {cameraID: row.cameraID})
                             CREATE (c)-[:TRACKS_PLAYER]->(pt)"
                                .to_string(),
                        )
                        .param("rows", rows_to_bolt(&rows)),
                    )
                    .await
            }
            EntityKind::BallTrack => {
                self.client
                    .execute(
                        Query::new(
                            "UNWIND $rows AS row
                             CREATE (bt:BallTrack {
                                 track_id: row.track_id,
                                 tickID: row.current_tick,
                                 timestamp: row.timestamp,
                                 world_x: row.world_x,
                                 world_y: row.world_y,
                                 confidence: row.confidence,
                                 bbox: row.bbox,
                                 transform_PAN: row.transform_PAN,
                                 transform_TILT: row.transform_TILT,
                                 dist: row.dist,
                                 phi: row.phi,
                                 velocity: row.velocity,
                                 velocity_x: row.velocity_x,
                                 velocity_y: row.velocity_y,
                                 velocity_direction: row.velocity_direction,
                                 movement_score: row.movement_score,
                                 is_best: row.is_best,
                                 last_updated: row.timestamp
                             })
                             WITH bt, row
                             FOREACH (value IN CASE WHEN row.id IS NOT NULL THEN [row.id] ELSE [] END |
                                 SET bt.id = value)
                             FOREACH (value IN CASE WHEN row.id_score IS NOT NULL THEN [row.id_score] ELSE [] END |
                                 SET bt.id_score = value)
                             FOREACH (value IN CASE WHEN row.dist_score IS NOT NULL THEN [row.dist_score] ELSE [] END |
                                 SET bt.dist_score = value)
                             FOREACH (value IN CASE WHEN row.ray_origin IS NOT NULL THEN [row.ray_origin] ELSE [] END |
                                 SET bt.ray_origin = value)
                             FOREACH (value IN CASE WHEN row.ray_world_space_dir IS NOT NULL THEN [row.ray_world_space_dir] ELSE [] END |
                                 SET bt.ray_world_space_dir = value)
                             WITH bt, row
                             MERGE (f:Frame {tickID: row.current_tick})
                             CREATE (f)-[:HAS_ACTIVE_TRACK]->(bt)
                             WITH bt, row
                             MERGE (c:Camera {cameraID: row.cameraID})
                             CREATE (c)-[:TRACKS_BALL]->(bt)"
                                .to_string(),
                        )
                        .param("rows", rows_to_bolt(&rows)),
                    )
                    .await
            }
            EntityKind::PtzState => {
                self.client
                    .execute(
                        Query::new(
                            "UNWIND $rows AS row
                             CREATE (s:PTZState {
                                 stateID: row.stateID,
                                 cameraID: row.cameraID,
                                 tickID: row.tickID,
                                 panposition: row.panposition,
                                 tiltposition: row.tiltposition,
                                 rollposition: row.rollposition,
                                 pansetpoint: row.pansetpoint,
                                 tiltsetpoint: row.tiltsetpoint,
                                 zoomsetpoint: row.zoomsetpoint,
                                 panpower: row.panpower,
                                 tiltpower: row.tiltpower,
                                 rollpower: row.rollpower,
                                 pan: row.pan,
                                 tilt: row.tilt,
                                 zoomspeed: row.zoomspeed,
                                 zoomposition: row.zoomposition,
                                 focusposition: row.focusposition,
                                 timestamp: row.timestamp,
                                 last_updated: row.timestamp
                             })
                             WITH s, row
                             MERGE (f:Frame {tickID: row.tickID})
                             CREATE (f)-[:HAS_PTZ_STATE]->(s)
                             WITH s, row
                             MERGE (c:Camera {cameraID: row.cameraID})
                             CREATE (c)-[:HAS_PTZ_STATE]->(s)"
                                .to_string(),
                        )
                        .param("rows", rows_to_bolt(&rows)),
                    )
                    .await
            }
            EntityKind::CamParams => {
                self.client
                    .execute(
                        Query::new(
                            "UNWIND $rows AS row
                             CREATE (cp:CamParams {
                                 paramsID: row.paramsID,
                                 cameraID: row.cameraID,
                                 tickID: row.tickID,
                                 intrinsic: row.intrinsic,
                                 rotation: row.rotation,
                                 translation: row.translation,
                                 timestamp: row.timestamp,
                                 last_updated: row.timestamp
                             })
                             WITH cp, row
                             MERGE (f:Frame {tickID: row.tickID})
                             CREATE (f)-[:HAS_CAM_PARAMS]->(cp)
                             WITH cp, row
                             MERGE (c:Camera {cameraID: row.cameraID})
                             CREATE (c)-[:HAS_CAM_PARAMS]->(cp)"
                                .to_string(),
                        )
                        .param("rows", rows_to_bolt(&rows)),
                    )
                    .await
            }
            EntityKind::CameraConfigUpdate => {
                for row in &rows {
                    self.client
                        .execute(
                            Query::new(
                                "MERGE (cc:CameraConfig {cameraID: $cameraID})
                                 SET cc.gimbal_position = $gimbal_position,
                                     cc.camera_parameters = $camera_parameters,
                                     cc.last_updated = $timestamp"
                                    .to_string(),
                            )
                            .param("cameraID", crate::bolt::value_to_bolt(&row["cameraID"]))
                            .param("gimbal_position", row["gimbal_position"].to_string())
                            .param("camera_parameters", row["camera_parameters"].to_string())
                            .param("timestamp", crate::bolt::value_to_bolt(&row["timestamp"])),
                        )
                        .await?;
                }
                Ok(())
            }
            EntityKind::FusionBall3D => {
                self.client
                    .execute(
                        Query::new(
                            "UNWIND $rows AS row
                             MERGE (fb:FusionBall3D {id: 'singleton'})
                             SET fb.timestamp = row.timestamp,
                                 fb.`3dposition` = row.position_world,
                                 fb.velocity_mps = row.velocity_mps,
                                 fb.status = row.status,
                                 fb.fusion_method = row.fusion_method,
                                 fb.kalman_filtered = row.kalman_filtered,
                                 fb.smooth_2d = row.smooth_2d,
                                 fb.camera_ready = row.camera_ready,
                                 fb.last_updated = row.timestamp"
                                .to_string(),
                        )
                        .param("rows", rows_to_bolt(&rows)),
                    )
                    .await?;
                // Best-effort: the Scene_Descriptor may not exist yet on a
                // cold start, in which case this simply links nothing.
                let _ = self
                    .client
                    .execute(Query::new(
                        "MATCH (fb:FusionBall3D {id: 'singleton'})
                         MATCH (sd:Scene_Descriptor)
                         MERGE (sd)-[:HAS_BALL]->(fb)"
                            .to_string(),
                    ))
                    .await;
                Ok(())
            }
            EntityKind::FusedPlayer => {
                self.client
                    .execute(
                        Query::new(
                            "UNWIND $rows AS row
                             MERGE (fp:FusedPlayer {id: row.id})
                             SET fp.x = row.x,
                                 fp.y = row.y,
                                 fp.z = row.z,
                                 fp.vel_x = row.vel_x,
                                 fp.vel_y = row.vel_y,
                                 fp.status = row.status,
                                 fp.category = row.category,
                                 fp.team = row.team,
                                 fp.last_updated = row.timestamp"
                                .to_string(),
                        )
                        .param("rows", rows_to_bolt(&rows)),
                    )
                    .await?;
                let _ = self
                    .client
                    .execute(Query::new(
                        "MATCH (sd:Scene_Descriptor)
                         MATCH (fp:FusedPlayer)
                         MERGE (sd)-[:HAS_PLAYER]->(fp)"
                            .to_string(),
                    ))
                    .await;
                Ok(())
            }
            EntityKind::Intent => {
                self.client
                    .execute(
                        Query::new(
                            "UNWIND $rows AS row
                             MERGE (i:Intent {cameraID: row.cameraID})
                             SET i.status = row.status,
                                 i.intent_id = row.intent_id,
                                 i.intent_type = row.intent_type,
                                 i.resolved_ttl_ms = row.resolved_ttl_ms,
                                 i.payload = row.payload,
                                 i.rule_definition = row.rule_definition,
                                 i.reason = row.reason,
                                 i.timestamp = row.timestamp
                             WITH i, row
                             MERGE (cc:CameraConfig {cameraID: row.cameraID})
                             MERGE (cc)-[:HAS_INTENT]->(i)"
                                .to_string(),
                        )
                        .param("rows", rows_to_bolt(&rows)),
                    )
                    .await
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn write_order_matches_processing_order() {
        assert_eq!(
            EntityKind::WRITE_ORDER,
            [
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
            ]
        );
    }

    #[test]
    fn row_to_bolt_roundtrips_scalars() {
        let mut row = Row::new();
        row.insert("tickID".into(), json!(42));
        row.insert("timestamp".into(), json!("2026-01-01T00:00:00Z"));
        let bolt = crate::bolt::row_to_bolt(&row);
        assert!(matches!(bolt, neo4rs::BoltType::Map(_)));
    }
}
