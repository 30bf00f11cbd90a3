//! In-place progress line on stdout.

use crate::proxy::{ProgressSnapshot, ResultAggregator};
use std::io::{self, Write};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Render one progress line
pub fn render_line(snapshot: &ProgressSnapshot) -> String {
    format!(
        "Progress: {:.1}% ({}/{}) - Active: {} - Found: {} working",
        snapshot.percent(),
        snapshot.completed,
        snapshot.total,
        snapshot.in_flight,
        snapshot.working
    )
}

/// Redraws the progress line on an interval until stopped
pub struct ProgressReporter {
    stop: CancellationToken,
    handle: JoinHandle<()>,
}

impl ProgressReporter {
    pub fn spawn(aggregator: Arc<ResultAggregator>, interval: Duration) -> Self {
        let stop = CancellationToken::new();
        let token = stop.clone();

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => draw(&aggregator.snapshot()),
                }
            }
            draw(&aggregator.snapshot());
            println!();
        });

        Self { stop, handle }
    }

    /// Draw the final state and wait for the reporter to exit
    pub async fn finish(self) {
        self.stop.cancel();
        let _ = self.handle.await;
    }
}

fn draw(snapshot: &ProgressSnapshot) {
    let mut stdout = io::stdout().lock();
    // Progress is advisory; a closed stdout must not fail the run.
    let _ = write!(stdout, "\r{}", render_line(snapshot));
    let _ = stdout.flush();
}
