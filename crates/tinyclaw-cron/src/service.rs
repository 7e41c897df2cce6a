//! Cron service — 1 Hz scheduler daemon with job persistence.
//!
//! A single loop ticks once per second, fires every due job by building a
//! synthetic `system` inbound message and invoking the agent callback
//! inline, then recomputes next-run times and persists the table. Missed
//! firings are not replayed: only the next one matters. Schedules finer
//! than the tick are effectively quantized to one firing per second.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{Mutex, Notify, RwLock};
use tracing::{debug, error, info, warn};

use tinyclaw_core::bus::{InboundMessage, MessageBus, OutboundMessage, SYSTEM_CHANNEL};

use crate::types::{compute_next_run, CronJob, CronSchedule, CronStore, JobStatus};

/// Callback invoked when a job fires.
///
/// Receives the synthetic inbound message and returns the agent's response
/// text. In the gateway this wraps the agent loop's direct path.
pub type OnJobFn = Arc<
    dyn Fn(
            InboundMessage,
        )
            -> std::pin::Pin<Box<dyn std::future::Future<Output = anyhow::Result<String>> + Send>>
        + Send
        + Sync,
>;

/// Scheduler — manages jobs, persistence, and the tick loop.
pub struct CronService {
    /// Path to the jobs JSON file.
    store_path: PathBuf,
    /// In-memory job table.
    store: RwLock<CronStore>,
    /// Message bus for outbound delivery.
    bus: Arc<MessageBus>,
    /// Job execution callback (set once by the gateway).
    on_job: Mutex<Option<OnJobFn>>,
    /// Shutdown signal.
    shutdown: Notify,
}

impl CronService {
    /// Create a new cron service persisting to `store_path`.
    pub fn new(bus: Arc<MessageBus>, store_path: PathBuf) -> Self {
        Self {
            store_path,
            store: RwLock::new(CronStore::new()),
            bus,
            on_job: Mutex::new(None),
            shutdown: Notify::new(),
        }
    }

    /// Set the on-job callback. One-shot wiring that avoids a
    /// constructor cycle with the agent loop.
    pub async fn set_on_job(&self, callback: OnJobFn) {
        let mut on_job = self.on_job.lock().await;
        *on_job = Some(callback);
    }

    // ─────────────────────────────────────────
    // Persistence
    // ─────────────────────────────────────────

    /// Load the store from disk. Missing file means an empty table.
    pub async fn load(&self) -> anyhow::Result<()> {
        if !self.store_path.exists() {
            debug!(path = %self.store_path.display(), "no cron store file, starting empty");
            return Ok(());
        }

        let data = tokio::fs::read_to_string(&self.store_path).await?;
        let loaded: CronStore = serde_json::from_str(&data)
            .map_err(|e| anyhow::anyhow!("failed to parse cron store: {e}"))?;

        let mut store = self.store.write().await;
        let count = loaded.jobs.len();
        *store = loaded;
        info!(path = %self.store_path.display(), jobs = count, "loaded cron store");
        Ok(())
    }

    /// Save the store to disk atomically (write temp + rename).
    pub async fn save(&self) -> anyhow::Result<()> {
        if let Some(parent) = self.store_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let json = {
            let store = self.store.read().await;
            serde_json::to_string_pretty(&*store)?
        };

        let tmp = self.store_path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json).await?;
        tokio::fs::rename(&tmp, &self.store_path).await?;
        debug!(path = %self.store_path.display(), "saved cron store");
        Ok(())
    }

    // ─────────────────────────────────────────
    // Job management
    // ─────────────────────────────────────────

    /// Add a job. Computes the initial next-run time and saves.
    ///
    /// An unparsable cron expression is rejected here rather than left to
    /// fail on every tick.
    pub async fn add_job(&self, mut job: CronJob) -> anyhow::Result<String> {
        let now_ms = Utc::now().timestamp_millis();
        job.state.next_run_at_ms = compute_next_run(&job.schedule, now_ms)?;

        let id = job.id.clone();
        {
            let mut store = self.store.write().await;
            store.add(job);
        }
        self.save().await?;
        info!(id = %id, "added cron job");
        Ok(id)
    }

    /// Remove a job by id.
    pub async fn remove_job(&self, id: &str) -> anyhow::Result<bool> {
        let removed = {
            let mut store = self.store.write().await;
            store.remove(id)
        };
        if removed {
            self.save().await?;
            info!(id = %id, "removed cron job");
        }
        Ok(removed)
    }

    /// Enable or disable a job. Re-enabling recomputes the next run.
    pub async fn set_enabled(&self, id: &str, enabled: bool) -> anyhow::Result<bool> {
        let found = {
            let mut store = self.store.write().await;
            match store.find_mut(id) {
                Some(job) => {
                    job.enabled = enabled;
                    job.updated_at_ms = Utc::now().timestamp_millis();
                    if enabled {
                        let now = Utc::now().timestamp_millis();
                        job.state.next_run_at_ms =
                            compute_next_run(&job.schedule, now).unwrap_or(None);
                        job.state.last_error = None;
                    }
                    true
                }
                None => false,
            }
        };
        if found {
            self.save().await?;
        }
        Ok(found)
    }

    /// List all jobs (snapshot).
    pub async fn list_jobs(&self) -> Vec<CronJob> {
        self.store.read().await.jobs.clone()
    }

    /// Get a single job by id.
    pub async fn get_job(&self, id: &str) -> Option<CronJob> {
        self.store.read().await.find(id).cloned()
    }

    // ─────────────────────────────────────────
    // Tick loop
    // ─────────────────────────────────────────

    /// Run the scheduler: load persisted jobs, then tick at 1 Hz until
    /// `stop()` is called.
    pub async fn start(&self) -> anyhow::Result<()> {
        if let Err(e) = self.load().await {
            warn!(error = %e, "failed to load cron store, starting empty");
        }

        info!("cron service started");

        let mut ticker = tokio::time::interval(std::time::Duration::from_secs(1));
        // A busy agent can stall ticks; don't replay the backlog.
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.tick().await;
                }
                _ = self.shutdown.notified() => {
                    info!("cron service shutting down");
                    return Ok(());
                }
            }
        }
    }

    /// Stop the scheduler.
    pub fn stop(&self) {
        info!("stopping cron service");
        self.shutdown.notify_waiters();
    }

    /// One tick: fire every due job, at most once each.
    pub async fn tick(&self) {
        let now_ms = Utc::now().timestamp_millis();
        let due_ids = {
            let store = self.store.read().await;
            store.due_ids(now_ms)
        };

        if due_ids.is_empty() {
            return;
        }

        debug!(count = due_ids.len(), "executing due cron jobs");
        for id in &due_ids {
            self.execute_job(id).await;
        }
    }

    /// Execute a single job by id: invoke the callback inline, update
    /// state, compute the next run, persist.
    pub async fn execute_job(&self, id: &str) {
        let job = {
            let store = self.store.read().await;
            store.find(id).cloned()
        };

        let job = match job {
            Some(j) => j,
            None => {
                warn!(id = %id, "cron job not found for execution");
                return;
            }
        };

        info!(id = %job.id, name = %job.name, "executing cron job");

        // Synthetic inbound message on the system channel; the agent
        // serializes it against the target session like any other turn.
        let mut msg = InboundMessage::new(
            SYSTEM_CHANNEL,
            "cron",
            &job.payload.chat_id,
            &job.payload.content,
        );
        msg.metadata.insert("jobId".into(), job.id.clone());
        msg.metadata
            .insert("origin".into(), job.payload.channel.clone());

        let result = {
            let on_job = self.on_job.lock().await;
            match on_job.as_ref() {
                Some(callback) => Some(callback(msg).await),
                None => {
                    warn!(id = %id, "no on_job callback set, skipping execution");
                    None
                }
            }
        };

        let now_ms = Utc::now().timestamp_millis();
        let mut deliver: Option<OutboundMessage> = None;
        let mut should_delete = false;

        {
            let mut store = self.store.write().await;
            if let Some(j) = store.find_mut(id) {
                j.state.last_run_at_ms = Some(now_ms);
                j.state.run_count += 1;

                match &result {
                    Some(Ok(response)) => {
                        j.state.last_status = Some(JobStatus::Ok);
                        j.state.last_error = None;
                        if j.payload.deliver && !j.payload.channel.is_empty() {
                            deliver = Some(OutboundMessage::new(
                                &j.payload.channel,
                                &j.payload.chat_id,
                                response,
                            ));
                        }
                    }
                    Some(Err(e)) => {
                        j.state.last_status = Some(JobStatus::Error);
                        j.state.last_error = Some(e.to_string());
                        error!(id = %id, name = %j.name, error = %e, "cron job failed");
                    }
                    None => {
                        j.state.last_status = Some(JobStatus::Skipped);
                    }
                }

                // Next firing.
                match &j.schedule {
                    CronSchedule::At { .. } => {
                        j.state.next_run_at_ms = None;
                        if j.delete_after_run {
                            should_delete = true;
                        } else {
                            j.enabled = false;
                        }
                    }
                    schedule => match compute_next_run(schedule, now_ms) {
                        Ok(next) => j.state.next_run_at_ms = next,
                        Err(e) => {
                            // Parse failure disables this job only.
                            j.enabled = false;
                            j.state.next_run_at_ms = None;
                            j.state.last_error = Some(e.to_string());
                            error!(id = %id, error = %e, "disabling job with bad schedule");
                        }
                    },
                }

                j.updated_at_ms = now_ms;
            }

            if should_delete {
                store.remove(id);
            }
        }

        // Deliver outside the table lock.
        if let Some(outbound) = deliver {
            if let Err(e) = self.bus.publish_outbound(outbound) {
                error!(error = %e, "failed to deliver cron response");
            }
        }

        if let Err(e) = self.save().await {
            error!(error = %e, "failed to save cron store after job execution");
        }
    }
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::CronPayload;
    use tempfile::TempDir;

    fn make_bus() -> Arc<MessageBus> {
        Arc::new(MessageBus::new(10))
    }

    fn make_service(dir: &TempDir) -> CronService {
        CronService::new(make_bus(), dir.path().join("jobs.json"))
    }

    fn interval_job(name: &str, seconds: u64) -> CronJob {
        CronJob::new(name, CronSchedule::Interval { seconds }, CronPayload::default())
    }

    fn echo_callback() -> OnJobFn {
        Arc::new(|msg| Box::pin(async move { Ok(msg.content) }))
    }

    async fn force_due(svc: &CronService, id: &str) {
        let mut store = svc.store.write().await;
        store.find_mut(id).unwrap().state.next_run_at_ms = Some(0);
    }

    #[tokio::test]
    async fn test_add_and_list() {
        let dir = TempDir::new().unwrap();
        let svc = make_service(&dir);

        let id = svc.add_job(interval_job("tick", 10)).await.unwrap();
        let jobs = svc.list_jobs().await;
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].id, id);
        assert!(jobs[0].state.next_run_at_ms.is_some());
    }

    #[tokio::test]
    async fn test_add_rejects_bad_cron_expr() {
        let dir = TempDir::new().unwrap();
        let svc = make_service(&dir);

        let job = CronJob::new(
            "bad",
            CronSchedule::Cron {
                expr: "nope".into(),
            },
            CronPayload::default(),
        );
        assert!(svc.add_job(job).await.is_err());
    }

    #[tokio::test]
    async fn test_remove_job() {
        let dir = TempDir::new().unwrap();
        let svc = make_service(&dir);
        let id = svc.add_job(interval_job("j", 10)).await.unwrap();

        assert!(svc.remove_job(&id).await.unwrap());
        assert!(!svc.remove_job(&id).await.unwrap());
        assert!(svc.list_jobs().await.is_empty());
    }

    #[tokio::test]
    async fn test_set_enabled_recomputes_next_run() {
        let dir = TempDir::new().unwrap();
        let svc = make_service(&dir);
        let id = svc.add_job(interval_job("j", 10)).await.unwrap();

        svc.set_enabled(&id, false).await.unwrap();
        assert!(!svc.get_job(&id).await.unwrap().enabled);

        svc.set_enabled(&id, true).await.unwrap();
        let job = svc.get_job(&id).await.unwrap();
        assert!(job.enabled);
        assert!(job.state.next_run_at_ms.is_some());
    }

    #[tokio::test]
    async fn test_persistence_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("jobs.json");

        {
            let svc = CronService::new(make_bus(), path.clone());
            let mut job = interval_job("persistent", 5);
            job.payload.content = "hello".into();
            svc.add_job(job).await.unwrap();
        }

        {
            let svc = CronService::new(make_bus(), path);
            svc.load().await.unwrap();
            let jobs = svc.list_jobs().await;
            assert_eq!(jobs.len(), 1);
            assert_eq!(jobs[0].name, "persistent");
            assert_eq!(jobs[0].payload.content, "hello");
        }
    }

    #[tokio::test]
    async fn test_save_is_atomic_no_temp_left() {
        let dir = TempDir::new().unwrap();
        let svc = make_service(&dir);
        svc.add_job(interval_job("j", 1)).await.unwrap();

        let leftovers: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .flatten()
            .filter(|e| e.path().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty());
        assert!(dir.path().join("jobs.json").exists());
    }

    #[tokio::test]
    async fn test_execute_without_callback_skips() {
        let dir = TempDir::new().unwrap();
        let svc = make_service(&dir);
        let id = svc.add_job(interval_job("j", 10)).await.unwrap();
        force_due(&svc, &id).await;

        svc.execute_job(&id).await;

        let job = svc.get_job(&id).await.unwrap();
        assert_eq!(job.state.last_status, Some(JobStatus::Skipped));
        assert_eq!(job.state.run_count, 1);
    }

    #[tokio::test]
    async fn test_execute_builds_system_message() {
        let dir = TempDir::new().unwrap();
        let svc = make_service(&dir);

        let seen: Arc<std::sync::Mutex<Vec<InboundMessage>>> =
            Arc::new(std::sync::Mutex::new(Vec::new()));
        let seen_clone = seen.clone();
        let callback: OnJobFn = Arc::new(move |msg| {
            let seen = seen_clone.clone();
            Box::pin(async move {
                seen.lock().unwrap().push(msg);
                Ok("done".to_string())
            })
        });
        svc.set_on_job(callback).await;

        let mut job = interval_job("j", 10);
        job.payload.chat_id = "default".into();
        job.payload.content = "tick".into();
        job.payload.channel = "cli".into();
        let id = svc.add_job(job).await.unwrap();
        force_due(&svc, &id).await;

        svc.execute_job(&id).await;

        let msgs = seen.lock().unwrap();
        assert_eq!(msgs.len(), 1);
        assert_eq!(msgs[0].channel, SYSTEM_CHANNEL);
        assert_eq!(msgs[0].sender_id, "cron");
        assert_eq!(msgs[0].chat_id, "default");
        assert_eq!(msgs[0].content, "tick");
        assert_eq!(msgs[0].metadata.get("jobId").unwrap(), &id);
        assert_eq!(msgs[0].metadata.get("origin").unwrap(), "cli");
    }

    #[tokio::test]
    async fn test_interval_monotonicity() {
        let dir = TempDir::new().unwrap();
        let svc = make_service(&dir);
        svc.set_on_job(echo_callback()).await;

        let id = svc.add_job(interval_job("j", 10)).await.unwrap();
        force_due(&svc, &id).await;
        svc.execute_job(&id).await;

        let job = svc.get_job(&id).await.unwrap();
        let last = job.state.last_run_at_ms.unwrap();
        let next = job.state.next_run_at_ms.unwrap();
        assert!(next > last);
        assert!(next - last >= 9_000);
        assert_eq!(job.state.run_count, 1);
    }

    #[tokio::test]
    async fn test_execute_error_recorded() {
        let dir = TempDir::new().unwrap();
        let svc = make_service(&dir);
        let callback: OnJobFn = Arc::new(|_| Box::pin(async { Err(anyhow::anyhow!("boom")) }));
        svc.set_on_job(callback).await;

        let id = svc.add_job(interval_job("failing", 10)).await.unwrap();
        force_due(&svc, &id).await;
        svc.execute_job(&id).await;

        let job = svc.get_job(&id).await.unwrap();
        assert_eq!(job.state.last_status, Some(JobStatus::Error));
        assert_eq!(job.state.last_error.as_deref(), Some("boom"));
        // A failing job still reschedules.
        assert!(job.state.next_run_at_ms.is_some());
    }

    #[tokio::test]
    async fn test_oneshot_delete_after_run() {
        let dir = TempDir::new().unwrap();
        let svc = make_service(&dir);
        svc.set_on_job(echo_callback()).await;

        let mut job = CronJob::new(
            "oneshot",
            CronSchedule::At { epoch_ms: 0 },
            CronPayload::default(),
        );
        job.delete_after_run = true;
        let id = svc.add_job(job).await.unwrap();

        svc.execute_job(&id).await;
        assert!(svc.get_job(&id).await.is_none());
    }

    #[tokio::test]
    async fn test_oneshot_without_delete_is_disabled() {
        let dir = TempDir::new().unwrap();
        let svc = make_service(&dir);
        svc.set_on_job(echo_callback()).await;

        let job = CronJob::new(
            "oneshot",
            CronSchedule::At { epoch_ms: 0 },
            CronPayload::default(),
        );
        let id = svc.add_job(job).await.unwrap();

        svc.execute_job(&id).await;

        let job = svc.get_job(&id).await.unwrap();
        assert!(!job.enabled);
        assert!(job.state.next_run_at_ms.is_none());
        assert_eq!(job.state.run_count, 1);
    }

    #[tokio::test]
    async fn test_deliver_publishes_outbound() {
        use std::time::Duration;

        let dir = TempDir::new().unwrap();
        let bus = make_bus();
        let svc = CronService::new(bus.clone(), dir.path().join("jobs.json"));
        let callback: OnJobFn = Arc::new(|_| Box::pin(async { Ok("response text".into()) }));
        svc.set_on_job(callback).await;

        let mut job = interval_job("deliver", 10);
        job.payload = CronPayload {
            channel: "cli".into(),
            chat_id: "default".into(),
            content: "prompt".into(),
            deliver: true,
        };
        let id = svc.add_job(job).await.unwrap();
        force_due(&svc, &id).await;

        svc.execute_job(&id).await;

        let msg = bus
            .consume_outbound_timeout(Duration::from_secs(2))
            .await
            .expect("expected delivered outbound message");
        assert_eq!(msg.channel, "cli");
        assert_eq!(msg.chat_id, "default");
        assert_eq!(msg.content, "response text");
    }

    #[tokio::test]
    async fn test_no_deliver_keeps_quiet() {
        use std::time::Duration;

        let dir = TempDir::new().unwrap();
        let bus = make_bus();
        let svc = CronService::new(bus.clone(), dir.path().join("jobs.json"));
        svc.set_on_job(echo_callback()).await;

        let mut job = interval_job("quiet", 10);
        job.payload.deliver = false;
        let id = svc.add_job(job).await.unwrap();
        force_due(&svc, &id).await;

        svc.execute_job(&id).await;

        assert!(bus
            .consume_outbound_timeout(Duration::from_millis(100))
            .await
            .is_none());
    }

    #[tokio::test]
    async fn test_tick_fires_each_due_job_once() {
        let dir = TempDir::new().unwrap();
        let svc = make_service(&dir);

        let count = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let count_clone = count.clone();
        let callback: OnJobFn = Arc::new(move |_| {
            let count = count_clone.clone();
            Box::pin(async move {
                count.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                Ok("ok".into())
            })
        });
        svc.set_on_job(callback).await;

        let a = svc.add_job(interval_job("a", 60)).await.unwrap();
        let b = svc.add_job(interval_job("b", 60)).await.unwrap();
        force_due(&svc, &a).await;
        force_due(&svc, &b).await;

        svc.tick().await;
        assert_eq!(count.load(std::sync::atomic::Ordering::SeqCst), 2);

        // Both rescheduled into the future; a second tick fires nothing.
        svc.tick().await;
        assert_eq!(count.load(std::sync::atomic::Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_stop_without_start() {
        let dir = TempDir::new().unwrap();
        let svc = make_service(&dir);
        svc.stop();
    }
}
