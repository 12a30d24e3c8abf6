//! Graph database connection handling: primary connection, a pool of
//! extra connections for high-throughput paths, retry-on-conflict, and
//! the fixed index set.

use std::sync::Arc;
use std::time::Duration;

use base::{Mutex, ResultExt};
use neo4rs::{ConfigBuilder, Graph, Query};
use tracing::{debug, info, warn};

use crate::config::Config;

/// The fixed indexes this bridge relies on for interactive-latency
/// lookups. Mirrors the index set a deployed instance is expected to
/// have created once at startup.
const INDEXES: &[&str] = &[
    "CREATE INDEX ON :Frame(tickID)",
    "CREATE INDEX ON :Camera(cameraID)",
    "CREATE INDEX ON :BallTrack(track_id)",
    "CREATE INDEX ON :BallTrack(is_best)",
    "CREATE INDEX ON :PlayerTrack(track_id)",
    "CREATE INDEX ON :CamParams(cameraID)",
    "CREATE INDEX ON :Scene_Descriptor(venue_id)",
    "CREATE INDEX ON :FusedPlayer(id)",
    "CREATE INDEX ON :FusedPlayer(status)",
    "CREATE INDEX ON :FusedPlayer(x)",
    "CREATE INDEX ON :FusedPlayer(y)",
    "CREATE INDEX ON :FusedPlayer(z)",
    "CREATE INDEX ON :FusionBall3D(position_world)",
    "CREATE INDEX ON :FusionBall3D(status)",
    "CREATE INDEX ON :CameraConfig(cameraID)",
    "CREATE INDEX ON :CameraConfig(role)",
    "CREATE INDEX ON :CameraConfig(gimbal_position)",
    "CREATE INDEX ON :Intent(cameraID)",
    "CREATE INDEX ON :Intent(status)",
];

/// The two critical indexes whose presence is worth confirming after
/// creation; absence of the rest is non-fatal (an existing deployment
/// may already carry them under a different name).
const CRITICAL_INDEXES: &[(&str, &str)] = &[("Frame", "tickID"), ("Camera", "cameraID")];

/// A connected graph database handle with a small pool of extra
/// connections for the batch-write hot path. The primary connection is
/// never returned to the pool; pooled connections are handed out LIFO
/// and returned after use.
pub struct GraphClient {
    primary: Graph,
    pool: Mutex<Vec<Graph>>,
    pool_size: usize,
}

impl GraphClient {
    /// Connects the primary handle and fills the pool, retrying the
    /// initial connection per [`Config::connect_retries`] /
    /// [`Config::connect_retry_delay_ms`].
    pub async fn connect(cfg: &Config) -> Result<Self, base::Error> {
        let uri = format!("{}:{}", cfg.memgraph_host, cfg.memgraph_port);
        let neo_cfg = ConfigBuilder::default()
            .uri(&uri)
            .user("")
            .password("")
            .build()
            .err_kind(base::ErrorKind::InvalidArgument)?;

        let primary = Self::connect_with_retry(&neo_cfg, cfg).await?;
        info!(%uri, "connected to graph database");

        let mut pool = Vec::with_capacity(cfg.connection_pool_size);
        for _ in 0..cfg.connection_pool_size {
            match Graph::connect(neo_cfg.clone()).await {
                Ok(g) => pool.push(g),
                Err(e) => {
                    warn!(err = %e, "failed to fill connection pool entry; pool will run smaller");
                    break;
                }
            }
        }
        info!(pool_size = pool.len(), "connection pool initialized");

        Ok(GraphClient {
            primary,
            pool: Mutex::new(pool),
            pool_size: cfg.connection_pool_size,
        })
    }

    async fn connect_with_retry(
        neo_cfg: &neo4rs::Config,
        cfg: &Config,
    ) -> Result<Graph, base::Error> {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            match Graph::connect(neo_cfg.clone()).await {
                Ok(g) => return Ok(g),
                Err(e) => {
                    if attempt >= cfg.connect_retries {
                        return Err(base::format_err_t!(
                            Unavailable,
                            "connecting to {}:{}: {}",
                            cfg.memgraph_host,
                            cfg.memgraph_port,
                            e
                        ));
                    }
                    warn!(
                        attempt,
                        max = cfg.connect_retries,
                        err = %e,
                        "connection attempt failed, retrying"
                    );
                    tokio::time::sleep(Duration::from_millis(cfg.connect_retry_delay_ms)).await;
                }
            }
        }
    }

    /// `None` means the pool was empty and the caller should fall back
    /// to the primary connection; such a fallback must never be handed
    /// to [`Self::return_pooled`].
    fn take_pooled(&self) -> Option<Graph> {
        self.pool.lock().pop()
    }

    fn return_pooled(&self, conn: Graph) {
        let mut pool = self.pool.lock();
        if pool.len() < self.pool_size {
            pool.push(conn);
        }
    }

    /// Executes a write query on the primary connection, retrying once
    /// after a 1ms delay on a "conflicting transaction" error.
    pub async fn execute(&self, query: Query) -> Result<(), base::Error> {
        Self::execute_on(&self.primary, query).await
    }

    /// Executes a write query on a pooled connection (falling back to
    /// the primary connection if the pool is momentarily empty). The
    /// fallback primary is never returned to the pool.
    pub async fn execute_pooled(&self, query: Query) -> Result<(), base::Error> {
        match self.take_pooled() {
            Some(conn) => {
                let result = Self::execute_on(&conn, query).await;
                self.return_pooled(conn);
                result
            }
            None => Self::execute_on(&self.primary, query).await,
        }
    }

    async fn execute_on(conn: &Graph, query: Query) -> Result<(), base::Error> {
        match conn.run(query.clone()).await {
            Ok(()) => Ok(()),
            Err(e) if e.to_string().to_lowercase().contains("conflicting transaction") => {
                tokio::time::sleep(Duration::from_millis(1)).await;
                conn.run(query).await.err_kind(base::ErrorKind::Aborted)
            }
            Err(e) => Err(e).err_kind(base::ErrorKind::Unavailable),
        }
    }

    /// Runs a read query and returns the raw row stream.
    pub async fn query(&self, q: Query) -> Result<neo4rs::RowStream, base::Error> {
        self.primary.execute(q).await.err_kind(base::ErrorKind::Unavailable)
    }

    /// Creates the fixed index set, tolerating "already exists" errors,
    /// then logs whether the two critical indexes could be confirmed.
    pub async fn create_indexes(&self) -> Result<(), base::Error> {
        info!("creating database indexes");
        for stmt in INDEXES {
            match self.primary.run(Query::new((*stmt).to_string())).await {
                Ok(()) => debug!(query = %stmt, "created index"),
                Err(e) if e.to_string().to_lowercase().contains("already exists") => {
                    debug!(query = %stmt, "index already exists");
                }
                Err(e) => warn!(query = %stmt, err = %e, "failed to create index"),
            }
        }
        self.verify_critical_indexes().await;
        Ok(())
    }

    async fn verify_critical_indexes(&self) {
        for (label, property) in CRITICAL_INDEXES {
            match self.primary.execute(Query::new("SHOW INDEX INFO".to_string())).await {
                Ok(mut stream) => {
                    let mut found = false;
                    while let Ok(Some(row)) = stream.next().await {
                        let text = format!("{row:?}");
                        if text.contains(label) && text.contains(property) {
                            found = true;
                            break;
                        }
                    }
                    if found {
                        info!(label, property, "critical index verified");
                    } else {
                        debug!(label, property, "index status unknown; verification not supported");
                    }
                }
                Err(e) => debug!(err = %e, "could not verify indexes"),
            }
        }
    }
}

/// Shared, cloneable handle used throughout the orchestrator.
pub type SharedGraphClient = Arc<GraphClient>;
