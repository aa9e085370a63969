//! Background auto-refresh of a watch list.
//!
//! The scheduler owns a single timer task: on start it fires one forced
//! refresh immediately, then repeats on the configured interval. Each
//! tick's batch runs in its own task so a panicking run is reported as
//! an error event and the timer keeps ticking.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use log::{debug, info, warn};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::batch::BatchOrchestrator;
use crate::models::{BatchRequest, DataKind, SchedulerEvent};

/// Update subscribers that lag behind lose the oldest events.
const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Periodically refreshes a fixed watch list through the orchestrator.
///
/// `start`/`stop` are idempotent. Stopping aborts the timer only; a
/// tick already in flight runs to completion.
pub struct AutoRefreshScheduler {
    orchestrator: Arc<BatchOrchestrator>,
    watch_list: Vec<String>,
    kind: DataKind,
    handle: Mutex<Option<JoinHandle<()>>>,
    events_tx: broadcast::Sender<SchedulerEvent>,
}

impl AutoRefreshScheduler {
    pub fn new(orchestrator: Arc<BatchOrchestrator>, watch_list: Vec<String>) -> Self {
        let (events_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            orchestrator,
            watch_list,
            kind: DataKind::Quote,
            handle: Mutex::new(None),
            events_tx,
        }
    }

    fn lock_handle(&self) -> MutexGuard<'_, Option<JoinHandle<()>>> {
        self.handle.lock().unwrap_or_else(|poisoned| {
            warn!("Scheduler handle mutex was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    /// Subscribe to refresh outcome events.
    pub fn subscribe(&self) -> broadcast::Receiver<SchedulerEvent> {
        self.events_tx.subscribe()
    }

    /// Whether the timer task is currently running.
    pub fn is_running(&self) -> bool {
        self.lock_handle()
            .as_ref()
            .map(|h| !h.is_finished())
            .unwrap_or(false)
    }

    /// Start the refresh loop.
    ///
    /// The first refresh fires immediately (forced, bypassing caches),
    /// then one per `interval`. Calling start while already running is
    /// a logged no-op; the existing timer keeps its cadence.
    pub fn start(&self, interval: Duration) {
        let mut guard = self.lock_handle();

        if let Some(handle) = guard.as_ref() {
            if !handle.is_finished() {
                warn!("Scheduler: already running, ignoring start");
                return;
            }
        }

        info!(
            "Scheduler: starting auto-refresh of {} symbols every {:?}",
            self.watch_list.len(),
            interval
        );

        let orchestrator = self.orchestrator.clone();
        let watch_list = self.watch_list.clone();
        let kind = self.kind;
        let events_tx = self.events_tx.clone();

        *guard = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                ticker.tick().await;

                let mut request = BatchRequest::quotes(watch_list.clone()).forced();
                request.kind = kind;

                let orchestrator = orchestrator.clone();
                let run = tokio::spawn(async move { orchestrator.get_bulk_data(request).await });

                match run.await {
                    Ok(result) => {
                        debug!(
                            "Scheduler: refresh done, {}/{} symbols",
                            result.summary.succeeded, result.summary.total
                        );
                        let _ = events_tx.send(SchedulerEvent::AutoUpdate { result });
                    }
                    Err(join_error) => {
                        warn!("Scheduler: refresh task died: {}", join_error);
                        let _ = events_tx.send(SchedulerEvent::AutoUpdateError {
                            message: join_error.to_string(),
                        });
                    }
                }
            }
        }));
    }

    /// Stop the refresh loop. Idempotent; an in-flight tick finishes.
    pub fn stop(&self) {
        let mut guard = self.lock_handle();

        match guard.take() {
            Some(handle) => {
                handle.abort();
                info!("Scheduler: stopped");
            }
            None => {
                debug!("Scheduler: stop called while not running");
            }
        }
    }
}

impl Drop for AutoRefreshScheduler {
    fn drop(&mut self) {
        if let Some(handle) = self.lock_handle().take() {
            handle.abort();
        }
    }
}
