//! Time-based TTL sweeper. Deletes ephemeral nodes whose
//! timestamp falls before the rolling window's cutoff, in a fixed order,
//! and never touches the persistent USD-schema nodes (`Scene_Descriptor`,
//! `CameraConfig`, `FusedPlayer`, `FusionBall3D`).

use std::time::Duration;

use neo4rs::Query;
use tracing::{debug, error, warn};

use crate::client::GraphClient;
use crate::config::Config;

const STATEMENTS: &[(&str, &str)] = &[
    (
        "PlayerTrack",
        "MATCH (pt:PlayerTrack) WHERE pt.last_updated < $cutoff_timestamp DETACH DELETE pt",
    ),
    (
        "BallTrack",
        "MATCH (bt:BallTrack) WHERE bt.last_updated < $cutoff_timestamp DETACH DELETE bt",
    ),
    (
        "PTZState",
        "MATCH (s:PTZState) WHERE s.timestamp < $cutoff_timestamp DETACH DELETE s",
    ),
    (
        "CamParams",
        "MATCH (cp:CamParams) WHERE cp.timestamp < $cutoff_timestamp DETACH DELETE cp",
    ),
    (
        "Frame",
        "MATCH (f:Frame) WHERE f.timestamp < $cutoff_timestamp DETACH DELETE f",
    ),
    (
        "Camera",
        "MATCH (c:Camera) WHERE c.last_active_timestamp < $cutoff_timestamp DETACH DELETE c",
    ),
];

const STATEMENT_TIMEOUT: Duration = Duration::from_secs(10);
const MAX_RETRIES: u32 = 3;
const BASE_DELAY: Duration = Duration::from_millis(100);

const STATS_QUERIES: &[(&str, &str)] = &[
    ("frames", "MATCH (f:Frame) WHERE f.timestamp < $cutoff_timestamp RETURN count(f) as count"),
    (
        "player_tracks",
        "MATCH (pt:PlayerTrack) WHERE pt.last_updated < $cutoff_timestamp RETURN count(pt) as count",
    ),
    (
        "ball_tracks",
        "MATCH (bt:BallTrack) WHERE bt.last_updated < $cutoff_timestamp RETURN count(bt) as count",
    ),
    (
        "ptz_states",
        "MATCH (s:PTZState) WHERE s.timestamp < $cutoff_timestamp RETURN count(s) as count",
    ),
    (
        "cam_params",
        "MATCH (cp:CamParams) WHERE cp.timestamp < $cutoff_timestamp RETURN count(cp) as count",
    ),
    (
        "cameras",
        "MATCH (c:Camera) WHERE c.last_active_timestamp < $cutoff_timestamp RETURN count(c) as count",
    ),
];

pub struct Sweeper<'a> {
    client: &'a GraphClient,
    rolling_window: Duration,
}

/// Read-only view of what the next sweep would remove, without
/// deleting anything.
#[derive(Debug, Clone, Default)]
pub struct SweepStats {
    pub counts: Vec<(String, i64)>,
}

impl<'a> Sweeper<'a> {
    pub fn new(client: &'a GraphClient, cfg: &Config) -> Self {
        Sweeper {
            client,
            rolling_window: cfg.rolling_window(),
        }
    }

    fn cutoff_timestamp(&self, now: jiff::Timestamp) -> String {
        let cutoff = now
            .checked_sub(jiff::SignedDuration::from_secs(self.rolling_window.as_secs() as i64))
            .unwrap_or(now);
        cutoff
            .to_zoned(jiff::tz::TimeZone::UTC)
            .strftime("%Y-%m-%dT%H:%M:%S%.6fZ")
            .to_string()
    }

    /// Runs one sweep pass, retrying on "conflicting transaction" with
    /// exponential backoff up to [`MAX_RETRIES`] attempts.
    pub async fn sweep(&self, now: jiff::Timestamp) -> Result<(), base::Error> {
        let cutoff_timestamp = self.cutoff_timestamp(now);
        debug!(%cutoff_timestamp, "running TTL sweep");

        for attempt in 0..MAX_RETRIES {
            let before = self.scene_descriptor_count().await;
            if before == Some(0) {
                warn!("Scene_Descriptor missing before cleanup; a previous sweep may have deleted it");
            }

            match self.run_statements(&cutoff_timestamp).await {
                Ok(()) => {
                    let after = self.scene_descriptor_count().await;
                    if after == Some(0) {
                        error!(
                            "CRITICAL: Scene_Descriptor was deleted during cleanup; \
                             sweep queries must never touch persistent nodes. Re-run scene bootstrap."
                        );
                    }
                    return Ok(());
                }
                Err(e) if is_conflict(&e) && attempt + 1 < MAX_RETRIES => {
                    let delay = BASE_DELAY * 2u32.pow(attempt);
                    warn!(attempt, err = %e.chain(), ?delay, "transaction conflict during sweep, retrying");
                    tokio::time::sleep(delay).await;
                }
                Err(e) if is_conflict(&e) => {
                    error!(attempts = MAX_RETRIES, "sweep failed after all retries due to transaction conflicts");
                    return Err(e);
                }
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    async fn run_statements(&self, cutoff_timestamp: &str) -> Result<(), base::Error> {
        for (label, cypher) in STATEMENTS {
            let query = Query::new((*cypher).to_string())
                .param("cutoff_timestamp", cutoff_timestamp.to_string());
            match tokio::time::timeout(STATEMENT_TIMEOUT, self.client.execute(query)).await {
                Ok(Ok(())) => debug!(label, "sweep statement completed"),
                Ok(Err(e)) => return Err(e),
                Err(_) => {
                    warn!(label, "sweep statement timed out, aborting this pass");
                    return Ok(());
                }
            }
        }
        Ok(())
    }

    async fn scene_descriptor_count(&self) -> Option<i64> {
        let mut stream = self
            .client
            .query(Query::new(
                "MATCH (sd:Scene_Descriptor) RETURN count(sd) as count".to_string(),
            ))
            .await
            .ok()?;
        let row = stream.next().await.ok()??;
        row.get::<i64>("count").ok()
    }

    /// Read-only diagnostic: counts what the next sweep would remove,
    /// without deleting anything.
    pub async fn sweep_stats(&self, now: jiff::Timestamp) -> SweepStats {
        let cutoff_timestamp = self.cutoff_timestamp(now);
        let mut counts = Vec::new();
        for (label, cypher) in STATS_QUERIES {
            let query = Query::new((*cypher).to_string())
                .param("cutoff_timestamp", cutoff_timestamp.clone());
            let count = match self.client.query(query).await {
                Ok(mut stream) => match stream.next().await {
                    Ok(Some(row)) => row.get::<i64>("count").unwrap_or(-1),
                    _ => -1,
                },
                Err(_) => -1,
            };
            counts.push((label.to_string(), count));
        }
        SweepStats { counts }
    }
}

fn is_conflict(e: &base::Error) -> bool {
    let msg = e.chain().to_lowercase();
    msg.contains("conflicting transaction") || msg.contains("cannot resolve")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statements_cover_all_ephemeral_kinds_in_order() {
        let labels: Vec<_> = STATEMENTS.iter().map(|(l, _)| *l).collect();
        assert_eq!(
            labels,
            vec!["PlayerTrack", "BallTrack", "PTZState", "CamParams", "Frame", "Camera"]
        );
    }

    #[test]
    fn persistent_kinds_never_appear_in_statements() {
        for (_, cypher) in STATEMENTS {
            for persistent in ["Scene_Descriptor", "CameraConfig", "FusedPlayer", "FusionBall3D"] {
                assert!(!cypher.contains(persistent));
            }
        }
    }
}
