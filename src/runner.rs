//! The check pipeline: ingest, probe, persist.

use crate::config::CheckerConfig;
use crate::error::{IngestError, OutputError};
use crate::output::{render_failed, render_working, write_atomic};
use crate::progress::ProgressReporter;
use crate::proxy::{
    AdmissionScheduler, AggregateState, FetcherConfig, GeoLocator, ProbeExecutor, ProxyAddress,
    ReqwestDialer, ResultAggregator, SourceFetcher,
};
use std::future::Future;
use std::sync::Arc;
use tokio::task::JoinError;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Fetch every configured source into one backlog
pub async fn ingest(config: &CheckerConfig) -> Result<Vec<ProxyAddress>, IngestError> {
    let fetcher = SourceFetcher::with_config(
        FetcherConfig::new().with_parse_options(config.parse.clone()),
    )?;
    let backlog = fetcher.fetch_backlog(&config.sources).await?;
    info!(total = backlog.len(), sources = config.sources.len(), "backlog ready");
    Ok(backlog)
}

/// The reqwest-backed probe described by `config`
pub fn build_probe(config: &CheckerConfig) -> ProbeExecutor<ReqwestDialer> {
    let geo_locator = config.mmdb_path.as_ref().and_then(|path| {
        GeoLocator::from_path(path)
            .map_err(|e| warn!(path = %path.display(), error = %e, "geolocation disabled"))
            .ok()
    });

    ProbeExecutor::new(
        ReqwestDialer::new(config.timeout),
        config.test_targets.clone(),
        config.timeout,
    )
    .with_predicate(config.predicate.clone())
    .with_geo_locator(geo_locator)
}

/// Check `backlog` with the reqwest probe, recording into `aggregator`
pub async fn check(
    config: &CheckerConfig,
    backlog: Vec<ProxyAddress>,
    aggregator: Arc<ResultAggregator>,
    cancel: CancellationToken,
) -> AggregateState {
    AdmissionScheduler::new(Arc::new(build_probe(config)), config.retry)
        .with_aggregator(aggregator)
        .with_cancellation(cancel)
        .run(backlog, config.capacity)
        .await
}

/// Run the check in the background while `dashboard` owns the terminal.
///
/// `done` fires when the run returns. If the dashboard fails, the run keeps
/// going under the progress line so no results are lost.
pub async fn check_with_dashboard<F>(
    config: &CheckerConfig,
    backlog: Vec<ProxyAddress>,
    aggregator: Arc<ResultAggregator>,
    cancel: CancellationToken,
    done: CancellationToken,
    dashboard: F,
) -> Result<AggregateState, JoinError>
where
    F: Future<Output = crate::Result<()>>,
{
    let run = tokio::spawn({
        let config = config.clone();
        let aggregator = Arc::clone(&aggregator);
        async move {
            let state = check(&config, backlog, aggregator, cancel).await;
            done.cancel();
            state
        }
    });

    let reporter = match dashboard.await {
        Ok(()) => None,
        Err(e) => {
            warn!(error = %e, "dashboard unavailable, showing the progress line");
            Some(ProgressReporter::spawn(Arc::clone(&aggregator), config.poll_interval))
        }
    };

    let state = run.await?;
    if let Some(reporter) = reporter {
        reporter.finish().await;
    }
    Ok(state)
}

/// Write the working list and, if configured, the failed list
pub fn persist(config: &CheckerConfig, state: &AggregateState, annotate: bool) -> Result<(), OutputError> {
    write_atomic(&config.output, &render_working(state, annotate))?;
    info!(path = %config.output.display(), count = state.working_count(), "wrote working proxies");

    if let Some(path) = &config.failed_output {
        write_atomic(path, &render_failed(state))?;
        info!(path = %path.display(), count = state.failed_count(), "wrote failed proxies");
    }
    Ok(())
}
