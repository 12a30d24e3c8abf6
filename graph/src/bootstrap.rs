//! One-time, idempotent initialization of the persistent `Scene_Descriptor`
//! and `CameraConfig` nodes. Run once at startup,
//! before the bridge starts subscribing.

use base::ResultExt;
use neo4rs::Query;
use serde::Serialize;
use tracing::{info, warn};

use crate::bolt::value_to_bolt;
use crate::client::GraphClient;

/// Supplies the venue/pitch/camera data the scene is seeded with.
/// A fixed implementation (see [`FixedSceneProvider`]) is used in
/// production; tests can substitute a smaller scene.
pub trait SceneProvider: Send + Sync {
    fn venue_id(&self) -> &str;
    fn pitch_markers(&self) -> &[(&'static str, [f64; 2])];
    fn camera_configs(&self) -> &[CameraConfigSeed];
}

#[derive(Debug, Clone, Serialize)]
pub struct GimbalPosition {
    pub pan: f64,
    pub tilt: f64,
    pub zoom: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct CameraParameters {
    pub intrinsic: [[f64; 3]; 3],
    pub rotation: [[f64; 3]; 3],
    pub translation: [f64; 3],
}

#[derive(Debug, Clone)]
pub struct CameraConfigSeed {
    pub camera_id: &'static str,
    pub role: &'static str,
    pub status: &'static str,
    pub operation_mode: &'static str,
    pub zoom_mode: &'static str,
    pub pan_range: [f64; 2],
    pub tilt_range: [f64; 2],
    pub zoom_range: [f64; 2],
    pub camerapos: [f64; 3],
    pub gimbal_position: GimbalPosition,
    pub camera_parameters: CameraParameters,
}

pub struct FixedSceneProvider {
    venue_id: String,
}

impl FixedSceneProvider {
    pub fn new(venue_id: impl Into<String>) -> Self {
        FixedSceneProvider {
            venue_id: venue_id.into(),
        }
    }
}

impl Default for FixedSceneProvider {
    fn default() -> Self {
        Self::new("ozsports")
    }
}

impl SceneProvider for FixedSceneProvider {
    fn venue_id(&self) -> &str {
        &self.venue_id
    }

    fn pitch_markers(&self) -> &[(&'static str, [f64; 2])] {
        &PITCH_MARKERS
    }

    fn camera_configs(&self) -> &[CameraConfigSeed] {
        camera_configs_once()
    }
}

const PITCH_MARKERS: [(&str, [f64; 2]); 20] = [
    ("center_spot", [0.0, 0.0]),
    ("center_circle_radius", [9.15, 0.0]),
    ("penalty_spot_home", [-32.0, 0.0]),
    ("penalty_spot_away", [32.0, 0.0]),
    ("goal_post_home_left", [-52.5, -3.66]),
    ("goal_post_home_right", [-52.5, 3.66]),
    ("goal_post_away_left", [52.5, -3.66]),
    ("goal_post_away_right", [52.5, 3.66]),
    ("corner_home_left", [-52.5, -34.0]),
    ("corner_home_right", [-52.5, 34.0]),
    ("corner_away_left", [52.5, -34.0]),
    ("corner_away_right", [52.5, 34.0]),
    ("penalty_area_home_left", [-40.0, -20.16]),
    ("penalty_area_home_right", [-40.0, 20.16]),
    ("penalty_area_away_left", [40.0, -20.16]),
    ("penalty_area_away_right", [40.0, 20.16]),
    ("six_yard_home_left", [-46.0, -9.16]),
    ("six_yard_home_right", [-46.0, 9.16]),
    ("six_yard_away_left", [46.0, -9.16]),
    ("six_yard_away_right", [46.0, 9.16]),
];

const DEFAULT_INTRINSIC: [[f64; 3]; 3] = [[800.0, 0.0, 640.0], [0.0, 800.0, 360.0], [0.0, 0.0, 1.0]];
const IDENTITY_ROTATION: [[f64; 3]; 3] = [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]];

fn camera_configs() -> [CameraConfigSeed; 6] {
    [
        CameraConfigSeed {
            camera_id: "camera1",
            role: "main",
            status: "ACTIVE",
            operation_mode: "auto",
            zoom_mode: "wide",
            pan_range: [-180.0, 180.0],
            tilt_range: [-45.0, 45.0],
            zoom_range: [1.0, 10.0],
            camerapos: [0.0, 0.0, 10.0],
            gimbal_position: GimbalPosition { pan: 0.0, tilt: 0.0, zoom: 1.0 },
            camera_parameters: CameraParameters {
                intrinsic: DEFAULT_INTRINSIC,
                rotation: IDENTITY_ROTATION,
                translation: [0.0, 0.0, 10.0],
            },
        },
        CameraConfigSeed {
            camera_id: "camera2",
            role: "center",
            status: "ACTIVE",
            operation_mode: "auto",
            zoom_mode: "wide",
            pan_range: [-180.0, 180.0],
            tilt_range: [-45.0, 45.0],
            zoom_range: [1.0, 10.0],
            camerapos: [0.0, 0.0, 15.0],
            gimbal_position: GimbalPosition { pan: 0.0, tilt: -10.0, zoom: 1.5 },
            camera_parameters: CameraParameters {
                intrinsic: DEFAULT_INTRINSIC,
                rotation: IDENTITY_ROTATION,
                translation: [0.0, 0.0, 15.0],
            },
        },
        CameraConfigSeed {
            camera_id: "camera3",
            role: "l_sideline",
            status: "ACTIVE",
            operation_mode: "auto",
            zoom_mode: "wide",
            pan_range: [-180.0, 180.0],
            tilt_range: [-45.0, 45.0],
            zoom_range: [1.0, 10.0],
            camerapos: [-45.0, 0.0, 12.0],
            gimbal_position: GimbalPosition { pan: 90.0, tilt: -5.0, zoom: 1.0 },
            camera_parameters: CameraParameters {
                intrinsic: DEFAULT_INTRINSIC,
                rotation: [[0.0, 1.0, 0.0], [-1.0, 0.0, 0.0], [0.0, 0.0, 1.0]],
                translation: [-45.0, 0.0, 12.0],
            },
        },
        CameraConfigSeed {
            camera_id: "camera4",
            role: "r_sideline",
            status: "ACTIVE",
            operation_mode: "auto",
            zoom_mode: "wide",
            pan_range: [-180.0, 180.0],
            tilt_range: [-45.0, 45.0],
            zoom_range: [1.0, 10.0],
            camerapos: [45.0, 0.0, 12.0],
            gimbal_position: GimbalPosition { pan: -90.0, tilt: -5.0, zoom: 1.0 },
            camera_parameters: CameraParameters {
                intrinsic: DEFAULT_INTRINSIC,
                rotation: [[0.0, -1.0, 0.0], [1.0, 0.0, 0.0], [0.0, 0.0, 1.0]],
                translation: [45.0, 0.0, 12.0],
            },
        },
        CameraConfigSeed {
            camera_id: "camera5",
            role: "l_goal",
            status: "ACTIVE",
            operation_mode: "auto",
            zoom_mode: "closeup",
            pan_range: [-180.0, 180.0],
            tilt_range: [-45.0, 45.0],
            zoom_range: [1.0, 10.0],
            camerapos: [-52.5, 0.0, 8.0],
            gimbal_position: GimbalPosition { pan: 0.0, tilt: 0.0, zoom: 2.0 },
            camera_parameters: CameraParameters {
                intrinsic: DEFAULT_INTRINSIC,
                rotation: IDENTITY_ROTATION,
                translation: [-52.5, 0.0, 8.0],
            },
        },
        CameraConfigSeed {
            camera_id: "camera6",
            role: "r_goal",
            status: "ACTIVE",
            operation_mode: "auto",
            zoom_mode: "closeup",
            pan_range: [-180.0, 180.0],
            tilt_range: [-45.0, 45.0],
            zoom_range: [1.0, 10.0],
            camerapos: [52.5, 0.0, 8.0],
            gimbal_position: GimbalPosition { pan: 180.0, tilt: 0.0, zoom: 2.0 },
            camera_parameters: CameraParameters {
                intrinsic: DEFAULT_INTRINSIC,
                rotation: [[-1.0, 0.0, 0.0], [0.0, -1.0, 0.0], [0.0, 0.0, 1.0]],
                translation: [52.5, 0.0, 8.0],
            },
        },
    ]
}

// `CameraConfigSeed` isn't `Copy`, so the provider trait's `'static` slice
// is built once lazily rather than re-derived on every call.
static CAMERA_CONFIGS: std::sync::OnceLock<[CameraConfigSeed; 6]> = std::sync::OnceLock::new();

fn camera_configs_once() -> &'static [CameraConfigSeed; 6] {
    CAMERA_CONFIGS.get_or_init(camera_configs)
}

pub struct SceneBootstrapper<'a> {
    client: &'a GraphClient,
}

impl<'a> SceneBootstrapper<'a> {
    pub fn new(client: &'a GraphClient) -> Self {
        SceneBootstrapper { client }
    }

    /// Creates the `Scene_Descriptor` and all 6 `CameraConfig` nodes,
    /// unless a `Scene_Descriptor` already exists, in which case seeding
    /// is skipped entirely so a restart never overwrites persisted
    /// scene state (pitch markers, camera status/ranges, ...).
    pub async fn initialize_all(&self, provider: &dyn SceneProvider) -> Result<(), base::Error> {
        if self.scene_descriptor_count().await? > 0 {
            info!(venue_id = provider.venue_id(), "scene already initialized, skipping seed");
            return Ok(());
        }
        self.initialize_scene_descriptor(provider).await?;
        self.initialize_camera_configs(provider).await?;
        info!(venue_id = provider.venue_id(), "scene fully initialized");
        Ok(())
    }

    async fn scene_descriptor_count(&self) -> Result<i64, base::Error> {
        let mut stream = self
            .client
            .query(Query::new(
                "MATCH (sd:Scene_Descriptor) RETURN count(sd) as count".to_string(),
            ))
            .await?;
        match stream.next().await.err_kind(base::ErrorKind::Unavailable)? {
            Some(row) => row.get::<i64>("count").err_kind(base::ErrorKind::Internal),
            None => Ok(0),
        }
    }

    async fn initialize_scene_descriptor(&self, provider: &dyn SceneProvider) -> Result<(), base::Error> {
        let markers: serde_json::Value = provider
            .pitch_markers()
            .iter()
            .map(|(name, xy)| (name.to_string(), serde_json::json!(xy)))
            .collect::<serde_json::Map<_, _>>()
            .into();

        let query = Query::new(
            "MERGE (sd:Scene_Descriptor {venue_id: $venue_id})
             SET sd.units = $units,
                 sd.up_axis = $up_axis,
                 sd.origin = $origin,
                 sd.handedness = $handedness,
                 sd.version = $version,
                 sd.pitch_markers = $pitch_markers"
                .to_string(),
        )
        .param("venue_id", provider.venue_id().to_string())
        .param("units", "meters".to_string())
        .param("up_axis", "Z".to_string())
        .param("origin", "PITCH_TOP_LEFT".to_string())
        .param("handedness", "RIGHT".to_string())
        .param("version", "1.0".to_string())
        .param("pitch_markers", markers.to_string());

        self.client.execute(query).await
    }

    async fn initialize_camera_configs(&self, provider: &dyn SceneProvider) -> Result<(), base::Error> {
        let configs = provider.camera_configs();
        if configs.len() != 6 {
            warn!(count = configs.len(), "expected 6 camera configs");
        }

        for cfg in configs {
            let gimbal_json = serde_json::to_string(&cfg.gimbal_position)
                .err_kind(base::ErrorKind::Internal)?;
            let params_json = serde_json::to_string(&cfg.camera_parameters)
                .err_kind(base::ErrorKind::Internal)?;

            let query = Query::new(
                "MERGE (cc:CameraConfig {cameraID: $cameraID})
                 SET cc.role = $role,
                     cc.status = $status,
                     cc.operation_mode = $operation_mode,
                     cc.zoom_mode = $zoom_mode,
                     cc.pan_range = $pan_range,
                     cc.tilt_range = $tilt_range,
                     cc.zoom_range = $zoom_range,
                     cc.camerapos = $camerapos,
                     cc.venue = $venue,
                     cc.gimbal_position = $gimbal_position,
                     cc.camera_parameters = $camera_parameters
                 WITH cc
                 MATCH (sd:Scene_Descriptor {venue_id: $venue})
                 MERGE (sd)-[:HAS_CAMERA]->(cc)"
                    .to_string(),
            )
            .param("cameraID", cfg.camera_id.to_string())
            .param("role", cfg.role.to_string())
            .param("status", cfg.status.to_string())
            .param("operation_mode", cfg.operation_mode.to_string())
            .param("zoom_mode", cfg.zoom_mode.to_string())
            .param("pan_range", value_to_bolt(&serde_json::json!(cfg.pan_range)))
            .param("tilt_range", value_to_bolt(&serde_json::json!(cfg.tilt_range)))
            .param("zoom_range", value_to_bolt(&serde_json::json!(cfg.zoom_range)))
            .param("camerapos", value_to_bolt(&serde_json::json!(cfg.camerapos)))
            .param("venue", provider.venue_id().to_string())
            .param("gimbal_position", gimbal_json)
            .param("camera_parameters", params_json);

            self.client.execute(query).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_provider_has_twenty_markers_and_six_cameras() {
        let provider = FixedSceneProvider::default();
        assert_eq!(provider.pitch_markers().len(), 20);
        assert_eq!(provider.camera_configs().len(), 6);
        assert_eq!(provider.venue_id(), "ozsports");
    }

    #[test]
    fn camera_roles_are_unique() {
        let provider = FixedSceneProvider::default();
        let roles: std::collections::HashSet<_> =
            provider.camera_configs().iter().map(|c| c.role).collect();
        assert_eq!(roles.len(), 6);
    }
}
