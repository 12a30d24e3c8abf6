//! Transform and write telemetry into the graph database: message
//! validation, row construction, per-subject batching, connection
//! pooling, batched writes, TTL retention sweeps, and one-time scene
//! bootstrap.

pub mod bolt;
pub mod bootstrap;
pub mod buffer;
pub mod cache;
pub mod client;
pub mod config;
pub mod messages;
pub mod metrics;
pub mod rows;
pub mod subjects;
pub mod ttl;
pub mod writer;

pub use bootstrap::{CameraConfigSeed, FixedSceneProvider, SceneBootstrapper, SceneProvider};
pub use buffer::{BatchBuffer, BatchInfo, Entry, SubjectRate};
pub use cache::ChangeCache;
pub use client::{GraphClient, SharedGraphClient};
pub use config::Config;
pub use metrics::{Metrics, Summary};
pub use rows::{group_by_kind, EntityKind, Row, RowBuilder, TaggedRow};
pub use ttl::{Sweeper, SweepStats};
pub use writer::BatchWriter;
