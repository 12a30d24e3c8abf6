//! Wires the graph crate's pieces into a running bridge: connects to
//! NATS and Memgraph, runs the batch/cleanup/metrics loops, and shuts
//! down gracefully on a first SIGINT/SIGTERM (immediately on a second).

use std::sync::Arc;
use std::time::Instant;

use base::{Error, ResultExt};
use futures::StreamExt;
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, error, info, warn};

use graph::{
    BatchBuffer, BatchWriter, ChangeCache, Config, FixedSceneProvider, GraphClient, Metrics,
    RowBuilder, SceneBootstrapper, Sweeper,
};

const METRICS_INTERVAL: std::time::Duration = std::time::Duration::from_secs(2);

pub async fn async_run(config: Config) -> Result<i32, Error> {
    let (shutdown_tx, shutdown_rx) = base::shutdown::channel();
    let mut shutdown_tx = Some(shutdown_tx);

    tokio::pin! {
        let int = signal(SignalKind::interrupt()).err_kind(base::ErrorKind::Internal)?;
        let term = signal(SignalKind::terminate()).err_kind(base::ErrorKind::Internal)?;
        let inner = inner(config, shutdown_rx.clone());
    }

    tokio::select! {
        _ = int.recv() => {
            info!("received SIGINT; shutting down gracefully. Send another SIGINT or SIGTERM to shut down immediately.");
            shutdown_tx.take();
        }
        _ = term.recv() => {
            info!("received SIGTERM; shutting down gracefully. Send another SIGINT or SIGTERM to shut down immediately.");
            shutdown_tx.take();
        }
        result = &mut inner => return result,
    }

    tokio::select! {
        _ = int.recv() => Err(base::format_err_t!(Cancelled, "immediate shutdown due to second signal (SIGINT)")),
        _ = term.recv() => Err(base::format_err_t!(Cancelled, "immediate shutdown due to second signal (SIGTERM)")),
        result = &mut inner => result,
    }
}

struct State {
    client: Arc<GraphClient>,
    buffer: Arc<BatchBuffer>,
    cache: Arc<ChangeCache>,
    metrics: Arc<Metrics>,
    current_tick: AsyncMutex<Option<i64>>,
    max_batch_size: usize,
}

async fn inner(config: Config, shutdown_rx: base::shutdown::Receiver) -> Result<i32, Error> {
    let client = Arc::new(GraphClient::connect(&config).await?);
    client.create_indexes().await?;

    let provider = FixedSceneProvider::new(config.venue_id.clone());
    if let Err(e) = SceneBootstrapper::new(&client).initialize_all(&provider).await {
        warn!(err = %e.chain(), "scene bootstrap failed");
    } else {
        info!("scene bootstrap complete");
    }

    let state = Arc::new(State {
        client: client.clone(),
        buffer: Arc::new(BatchBuffer::new()),
        cache: Arc::new(ChangeCache::new()),
        metrics: Arc::new(Metrics::new()),
        current_tick: AsyncMutex::new(None),
        max_batch_size: config.max_batch_size,
    });

    let nc = async_nats::connect(&config.nats_url)
        .await
        .err_kind(base::ErrorKind::Unavailable)?;
    info!(url = %config.nats_url, "connected to NATS");

    let mut subscriptions = Vec::new();
    for subject in graph::subjects::SUBSCRIPTIONS {
        let sub = nc
            .subscribe(subject.to_string())
            .await
            .err_kind(base::ErrorKind::Unavailable)?;
        subscriptions.push(sub);
    }
    info!(count = subscriptions.len(), "subscribed to all topics");

    let dispatch_state = state.clone();
    let dispatch_handle = tokio::spawn(async move {
        let mut merged = futures::stream::select_all(subscriptions);
        while let Some(msg) = merged.next().await {
            handle_message(&dispatch_state, msg.subject.as_str(), &msg.payload).await;
        }
    });

    let batch_result = batch_loop(state.clone(), config, shutdown_rx).await;

    drop(nc);
    dispatch_handle.abort();

    batch_result?;
    info!("exiting");
    Ok(0)
}

async fn handle_message(state: &Arc<State>, subject: &str, payload: &[u8]) {
    let value: serde_json::Value = match serde_json::from_slice(payload) {
        Ok(v) => v,
        Err(e) => {
            error!(subject, err = %e, "JSON parse error");
            state.metrics.record_validation_error_sync(subject);
            state.metrics.record_dropped_message_sync(subject);
            return;
        }
    };

    if graph::subjects::is_low_value(subject, &value) {
        return;
    }
    state.metrics.record_message_received(subject);

    if subject == graph::subjects::TICK_PER_FRAME {
        let count = value.get("count").and_then(serde_json::Value::as_i64).unwrap_or(0);
        *state.current_tick.lock().await = Some(count);
    }

    if subject.starts_with(graph::subjects::ALL_TRACKS_PREFIX)
        && !state
            .cache
            .has_changed(subject, &value, graph::cache::ALL_TRACKS_TOLERANCE)
    {
        return;
    }

    state.buffer.push(subject, value);
}

async fn batch_loop(
    state: Arc<State>,
    config: Config,
    shutdown_rx: base::shutdown::Receiver,
) -> Result<(), Error> {
    let mut last_cleanup = Instant::now();
    let mut last_metrics = Instant::now();
    let sweeper = Sweeper::new(&state.client, &config);
    let writer = BatchWriter::new(&state.client);

    loop {
        tokio::select! {
            _ = shutdown_rx.as_future() => break,
            _ = tokio::time::sleep(config.batch_interval()) => {}
        }

        let current_tick = *state.current_tick.lock().await;
        if current_tick.is_none() {
            continue;
        }

        if let Err(e) = run_one_batch(&state, &writer, current_tick).await {
            error!(err = %e.chain(), "error during batch processing");
        }

        if last_cleanup.elapsed() >= config.cleanup_interval() {
            let now = jiff::Timestamp::now();
            if let Err(e) = sweeper.sweep(now).await {
                error!(err = %e.chain(), "TTL cleanup failed");
            }
            last_cleanup = Instant::now();
        }

        if last_metrics.elapsed() >= METRICS_INTERVAL {
            log_metrics(&state);
            last_metrics = Instant::now();
        }
    }

    info!("processing remaining buffered items before exit");
    let current_tick = *state.current_tick.lock().await;
    run_one_batch(&state, &writer, current_tick).await?;
    state.cache.clear();
    log_metrics(&state);
    Ok(())
}

async fn run_one_batch(
    state: &Arc<State>,
    writer: &BatchWriter<'_>,
    current_tick: Option<i64>,
) -> Result<(), Error> {
    let system_timestamp = jiff::Zoned::now().strftime("%Y-%m-%dT%H:%M:%S%.6fZ").to_string();
    let (entries, info) = state.buffer.drain(state.max_batch_size);
    if entries.is_empty() {
        return Ok(());
    }

    let start = Instant::now();
    let builder = RowBuilder::new(&state.cache);
    let mut rows = Vec::new();
    for entry in &entries {
        rows.extend(builder.build(&entry.subject, &entry.payload, current_tick, &system_timestamp));
    }
    let groups = graph::group_by_kind(rows);
    writer.write(groups).await?;

    let latency = start.elapsed();
    state.metrics.record_batch(entries.len(), latency);

    if info.batch_number % 10 == 0 {
        debug!(
            active_subjects = info.active_subjects,
            items = entries.len(),
            latency_ms = latency.as_secs_f64() * 1000.0,
            avg_concurrent = info.average_concurrent_subjects,
            "batch flushed"
        );
    }
    Ok(())
}

fn log_metrics(state: &Arc<State>) {
    let summary = state.metrics.summary();
    let sizes = state.buffer.subject_buffer_sizes();
    let active_subjects = sizes.values().filter(|&&n| n > 0).count();

    info!(
        total_received = summary.total_received,
        avg_batch_ms = summary.avg_batch_ms,
        p95_batch_ms = summary.p95_batch_ms,
        validation_errors = summary.validation_errors,
        dropped_messages = summary.dropped_messages,
        active_subjects,
        "metrics"
    );

    let mut top: Vec<_> = sizes.into_iter().filter(|(_, n)| *n > 0).collect();
    top.sort_by(|a, b| b.1.cmp(&a.1));
    top.truncate(5);
    if !top.is_empty() {
        let rendered: Vec<String> = top.iter().map(|(s, n)| format!("{s}:{n}")).collect();
        info!(buffers = %rendered.join(", "), "subject buffer sizes");
    }

    let rates = state.buffer.fill_rates();
    let hot: Vec<_> = rates.iter().filter(|(_, r)| r.fill_rate > 10.0).collect();
    if !hot.is_empty() {
        for (subject, rate) in hot.iter().take(5) {
            warn!(subject, fill_rate = rate.fill_rate, process_rate = rate.process_rate, "high fill rate");
        }
    }
}
