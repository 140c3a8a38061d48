// src/services/expiry.rs

//! Two independent ways an overdue attempt gets closed:
//!
//! * a delayed job per attempt, queued at start and fired at its deadline by
//!   [`ExpiryWorker`];
//! * a recurring sweep ([`run_sweep`]) that completes every open attempt whose deadline
//!   has passed, covering jobs lost to a worker outage or a restart.
//!
//! Both end in [`complete_attempt`], which tolerates the other having run first.

use std::{cmp::Reverse, collections::BinaryHeap, time::Duration};

use chrono::{DateTime, TimeDelta, Utc};
use sqlx::{FromRow, SqlitePool};
use tokio::{
    sync::mpsc,
    task::JoinHandle,
    time::{Instant, MissedTickBehavior, sleep_until},
};
use tokio_util::sync::CancellationToken;

use crate::{
    error::AppError,
    services::attempt::{CompletionOutcome, complete_attempt},
};

#[derive(Debug, Clone, Copy)]
struct ExpiryJob {
    attempt_id: i64,
    due: Instant,
}

/// Handle used to enqueue expiry jobs. Cheap to clone.
#[derive(Debug, Clone)]
pub struct ExpiryScheduler {
    tx: mpsc::UnboundedSender<ExpiryJob>,
}

/// Receives jobs from an [`ExpiryScheduler`] and runs them when due.
pub struct ExpiryWorker {
    rx: mpsc::UnboundedReceiver<ExpiryJob>,
}

impl ExpiryScheduler {
    pub fn channel() -> (ExpiryScheduler, ExpiryWorker) {
        let (tx, rx) = mpsc::unbounded_channel();
        (ExpiryScheduler { tx }, ExpiryWorker { rx })
    }

    /// Queues completion of `attempt_id` after `delay`. If no worker is listening the
    /// job is dropped with a warning and the sweep picks the attempt up later.
    pub fn schedule(&self, attempt_id: i64, delay: Duration) {
        let job = ExpiryJob {
            attempt_id,
            due: Instant::now() + delay,
        };
        if self.tx.send(job).is_err() {
            tracing::warn!(
                "Expiry worker unavailable, attempt {} left to the sweep",
                attempt_id
            );
        } else {
            tracing::debug!("Scheduled expiry of attempt {} in {:?}", attempt_id, delay);
        }
    }
}

impl ExpiryWorker {
    /// Runs until cancelled, or until every scheduler handle is gone and no job is left.
    pub async fn run(mut self, pool: SqlitePool, cancel: CancellationToken) {
        let mut pending: BinaryHeap<Reverse<(Instant, i64)>> = BinaryHeap::new();
        let mut open = true;

        tracing::info!("Expiry job worker started");
        loop {
            if !open && pending.is_empty() {
                break;
            }
            let next_due = pending.peek().map(|Reverse((due, _))| *due);

            tokio::select! {
                _ = cancel.cancelled() => break,
                job = self.rx.recv(), if open => match job {
                    Some(job) => pending.push(Reverse((job.due, job.attempt_id))),
                    None => open = false,
                },
                _ = wait_until(next_due) => {
                    let now = Instant::now();
                    while let Some(Reverse((due, attempt_id))) = pending.peek().copied() {
                        if due > now {
                            break;
                        }
                        pending.pop();
                        expire_attempt(&pool, attempt_id, Utc::now()).await;
                    }
                }
            }
        }
        tracing::info!("Expiry job worker stopped ({} jobs pending)", pending.len());
    }
}

async fn wait_until(due: Option<Instant>) {
    match due {
        Some(due) => sleep_until(due).await,
        None => std::future::pending().await,
    }
}

/// Completes one attempt on behalf of an expiry path. Failures are logged, never
/// propagated: one bad attempt must not stop the others.
/// Returns whether this call did the completion.
pub async fn expire_attempt(pool: &SqlitePool, attempt_id: i64, now: DateTime<Utc>) -> bool {
    match complete_attempt(pool, attempt_id, now).await {
        Ok(CompletionOutcome::Completed { card, .. }) => {
            tracing::info!(
                "Expired attempt {} scored {}/{}",
                attempt_id,
                card.score,
                card.total
            );
            true
        }
        Ok(CompletionOutcome::AlreadyCompleted(_)) => {
            tracing::debug!("Attempt {} was already completed", attempt_id);
            false
        }
        Err(AppError::NotFound(_)) => {
            tracing::warn!("Expiry for missing attempt {}", attempt_id);
            false
        }
        Err(e) => {
            tracing::error!("Failed to expire attempt {}: {}", attempt_id, e);
            false
        }
    }
}

#[derive(FromRow)]
struct OpenTimedAttempt {
    id: i64,
    started_at: DateTime<Utc>,
    time_limit_seconds: i64,
}

impl OpenTimedAttempt {
    fn deadline(&self) -> DateTime<Utc> {
        self.started_at + TimeDelta::seconds(self.time_limit_seconds)
    }
}

/// Open attempts on time-limited sets whose deadline is at or before `now`, in id
/// order. The query narrows to rows within a second of being due; the exact
/// comparison happens on the decoded timestamps.
pub async fn overdue_attempts(pool: &SqlitePool, now: DateTime<Utc>) -> Result<Vec<i64>, AppError> {
    let candidates = sqlx::query_as::<_, OpenTimedAttempt>(
        r#"
        SELECT a.id, a.started_at, s.time_limit_seconds
        FROM question_set_attempts a
        JOIN question_sets s ON s.id = a.question_set_id
        WHERE a.is_completed = FALSE
          AND s.is_time_limited = TRUE
          AND s.time_limit_seconds IS NOT NULL
          AND julianday(a.started_at) + (s.time_limit_seconds - 1) / 86400.0 <= julianday(?)
        ORDER BY a.id
        "#,
    )
    .bind(now)
    .fetch_all(pool)
    .await?;

    Ok(candidates
        .into_iter()
        .filter(|c| c.deadline() <= now)
        .map(|c| c.id)
        .collect())
}

/// One sweep pass: completes every open attempt on a time-limited set whose deadline
/// is at or before `now`. Returns how many this pass completed.
pub async fn sweep_expired(pool: &SqlitePool, now: DateTime<Utc>) -> Result<usize, AppError> {
    let mut completed = 0;
    for attempt_id in overdue_attempts(pool, now).await? {
        if expire_attempt(pool, attempt_id, now).await {
            completed += 1;
        }
    }
    Ok(completed)
}

/// Runs [`sweep_expired`] every `interval` until cancelled.
pub async fn run_sweep(pool: SqlitePool, interval: Duration, cancel: CancellationToken) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    tracing::info!("Expiry sweep started (every {:?})", interval);
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => match sweep_expired(&pool, Utc::now()).await {
                Ok(0) => {}
                Ok(n) => tracing::info!("Expiry sweep completed {} attempts", n),
                Err(e) => tracing::error!("Expiry sweep failed: {}", e),
            },
        }
    }
    tracing::info!("Expiry sweep stopped");
}

/// Waits for a background task at shutdown. A panic or abort is logged and reported
/// as `false`.
pub async fn join_background(name: &str, handle: JoinHandle<()>) -> bool {
    match handle.await {
        Ok(()) => true,
        Err(e) => {
            tracing::error!("Background task {} ended abnormally: {}", name, e);
            false
        }
    }
}
