use anyhow::{Context, Result};
use chrono::{DateTime, NaiveTime, Utc};
use habitlock_common::schedule::{describe_domains, upcoming_today};
use habitlock_common::{evaluate, BlockingDecision, Evaluation, HabitId};
use habitlock_db::{Database, DatabaseConfig};
use habitlock_proto::DaemonStatus;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use tokio::sync::{watch, RwLock};
use tracing::{debug, error, info, warn};

use crate::config::DaemonConfig;
use crate::error::DaemonError;
use crate::hosts::{HostsChange, HostsFileManager};
use crate::ipc::IpcServer;
use crate::store::{HabitStore, SqliteHabitStore};
use crate::trigger::{spawn_timer, RefreshSignal, Wake};

/// Shared view of the daemon's state, mirrored to the status file on every change.
#[derive(Debug, Clone)]
pub struct StatusHandle {
    inner: Arc<RwLock<DaemonStatus>>,
    file: Option<PathBuf>,
}

impl StatusHandle {
    pub fn new(file: Option<PathBuf>) -> Self {
        Self { inner: Arc::new(RwLock::new(DaemonStatus::starting())), file }
    }

    pub async fn snapshot(&self) -> DaemonStatus {
        self.inner.read().await.clone()
    }

    pub async fn update<F>(&self, apply: F)
    where
        F: FnOnce(&mut DaemonStatus),
    {
        let snapshot = {
            let mut status = self.inner.write().await;
            apply(&mut status);
            status.clone()
        };

        if let Some(path) = &self.file {
            if let Err(e) = snapshot.write_to(path) {
                warn!("Failed to write status file {}: {}", path.display(), e);
            }
        }
    }

    pub async fn mark_stopped(&self) {
        self.update(|status| status.is_running = false).await;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleAction {
    Applied,
    Removed,
    Unchanged,
    Reset,
}

impl fmt::Display for CycleAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CycleAction::Applied => "applied",
            CycleAction::Removed => "removed",
            CycleAction::Unchanged => "unchanged",
            CycleAction::Reset => "reset",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone)]
pub struct CycleReport {
    pub at: DateTime<Utc>,
    pub action: CycleAction,
    pub decision: BlockingDecision,
    pub evaluation: Evaluation,
    /// Habits newly recorded as missed during this cycle
    pub missed_recorded: Vec<HabitId>,
    pub next_habit_start: Option<NaiveTime>,
}

/// Serialized evaluate-persist-apply cycles. Owns the hosts file manager, so
/// at most one cycle ever touches the hosts file.
pub struct DaemonLoop {
    store: Arc<dyn HabitStore>,
    hosts: HostsFileManager,
    status: StatusHandle,
}

impl DaemonLoop {
    pub fn new(store: Arc<dyn HabitStore>, hosts: HostsFileManager, status: StatusHandle) -> Self {
        Self { store, hosts, status }
    }

    pub fn status(&self) -> StatusHandle {
        self.status.clone()
    }

    pub fn hosts(&self) -> &HostsFileManager {
        &self.hosts
    }

    /// Pick up the region a previous run left in the hosts file.
    pub async fn recover(&mut self) -> Result<(), DaemonError> {
        let recovered = self.hosts.recover().map_err(DaemonError::HostsRead)?;

        self.status
            .update(|status| {
                status.should_block = recovered.is_some();
                status.currently_blocked_domains = recovered.unwrap_or_default();
            })
            .await;
        Ok(())
    }

    pub async fn run_cycle(&mut self, wake: Wake) -> Result<CycleReport, DaemonError> {
        self.run_cycle_at(Utc::now(), wake).await
    }

    /// Run one cycle as of `now` and publish its outcome. Errors are logged
    /// here and returned for the caller to inspect; none of them stop the loop.
    pub async fn run_cycle_at(
        &mut self,
        now: DateTime<Utc>,
        wake: Wake,
    ) -> Result<CycleReport, DaemonError> {
        let result =
            if wake.reset { self.reset_cycle(now).await } else { self.evaluate_cycle(now).await };
        let blocked = self.hosts.last_applied().cloned();

        match &result {
            Ok(report) => {
                info!(
                    "Cycle at {}: should_block={} domains=[{}] action={}",
                    report.at.to_rfc3339(),
                    report.decision.should_block,
                    describe_domains(&report.decision.target_domains),
                    report.action
                );

                let report = report.clone();
                self.status
                    .update(move |status| {
                        status.is_running = true;
                        status.last_check = Some(now);
                        status.currently_blocked_domains = blocked.unwrap_or_default();
                        status.should_block = report.decision.should_block;
                        status.overdue_habits = report.evaluation.overdue;
                        status.next_habit_start = report.next_habit_start;
                        status.last_error = None;
                    })
                    .await;
            }
            Err(e) => {
                error!("Cycle at {} failed: {}", now.to_rfc3339(), e);

                let message = e.to_string();
                self.status
                    .update(move |status| {
                        status.last_check = Some(now);
                        status.currently_blocked_domains = blocked.unwrap_or_default();
                        status.last_error = Some(message);
                    })
                    .await;
            }
        }

        result
    }

    /// Wait for wakes until shutdown. A cycle that has started always runs to completion.
    pub async fn run(mut self, signal: RefreshSignal, mut shutdown: watch::Receiver<bool>) {
        info!("Daemon loop started");

        loop {
            let wake = tokio::select! {
                biased;
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                    continue;
                }
                wake = signal.wait() => wake,
            };

            // Errors are already logged and published by the cycle itself
            let _ = self.run_cycle(wake).await;
        }

        self.status.mark_stopped().await;
        info!("Daemon loop stopped");
    }

    async fn evaluate_cycle(&mut self, now: DateTime<Utc>) -> Result<CycleReport, DaemonError> {
        let today = now.date_naive();

        let habits = self.store.get_active_habits().await.map_err(DaemonError::StoreRead)?;
        let logs = self.store.get_today_logs(today).await.map_err(DaemonError::StoreRead)?;
        let settings = self.store.get_settings().await.map_err(DaemonError::StoreRead)?;

        let evaluation = evaluate(now, &habits, &logs);
        let decision = evaluation.decision(&settings);
        debug!(
            "Evaluated {} habits: overdue={:?} missed={:?}",
            habits.len(),
            evaluation.overdue,
            evaluation.missed_intents
        );

        // A failed missed write must not hold back the hosts file
        let mut missed_recorded = Vec::new();
        let mut write_error = None;
        for habit_id in &evaluation.missed_intents {
            match self.store.upsert_missed_log(habit_id, today).await {
                Ok(true) => {
                    info!("Recorded habit {} as missed for {}", habit_id, today);
                    missed_recorded.push(habit_id.clone());
                }
                Ok(false) => {}
                Err(e) => {
                    warn!("Failed to record habit {} as missed: {}", habit_id, e);
                    write_error.get_or_insert(e);
                }
            }
        }

        let change = if decision.should_block {
            self.hosts.apply_blocking(&decision.target_domains).await
        } else {
            self.hosts.remove_blocking().await
        }
        .map_err(|source| DaemonError::PrivilegeWrite { domains: decision.target_domains.clone(), source })?;

        if let Some(e) = write_error {
            return Err(DaemonError::StoreWrite(e));
        }

        let action = match (change, decision.should_block) {
            (HostsChange::Unchanged, _) => CycleAction::Unchanged,
            (HostsChange::Written, true) => CycleAction::Applied,
            (HostsChange::Written, false) => CycleAction::Removed,
        };

        let next_habit_start = upcoming_today(now, &habits).first().map(|(_, start)| *start);
        Ok(CycleReport { at: now, action, decision, evaluation, missed_recorded, next_habit_start })
    }

    /// Operator bypass: drop the region without consulting the schedule.
    async fn reset_cycle(&mut self, now: DateTime<Utc>) -> Result<CycleReport, DaemonError> {
        let previous = self.hosts.last_applied().cloned().unwrap_or_default();
        self.hosts
            .reset()
            .await
            .map_err(|source| DaemonError::PrivilegeWrite { domains: previous, source })?;

        Ok(CycleReport {
            at: now,
            action: CycleAction::Reset,
            decision: BlockingDecision::unblocked(),
            evaluation: Evaluation::default(),
            missed_recorded: Vec::new(),
            next_habit_start: None,
        })
    }
}

pub async fn initialize_database(config: &DaemonConfig) -> Result<Database> {
    info!("Initializing database");

    let database_config = DatabaseConfig { path: config.database.path.clone() };
    let database = Database::new(database_config).await.context("Failed to connect to database")?;

    database.run_migrations().await.context("Failed to run migrations")?;
    database.verify_migrations().await.context("Failed to verify migrations")?;

    info!("Database initialized successfully");
    Ok(database)
}

pub async fn run(config: DaemonConfig) -> Result<()> {
    info!("Initializing daemon");

    config.validate()?;

    let database = initialize_database(&config).await?;
    let store: Arc<dyn HabitStore> = Arc::new(SqliteHabitStore::new(database.clone()));

    let status = StatusHandle::new(Some(config.daemon.status_path.clone()));
    let mut daemon_loop = DaemonLoop::new(store, HostsFileManager::new(&config.hosts), status.clone());
    if let Err(e) = daemon_loop.recover().await {
        warn!("Could not read existing blocking state: {}", e);
    }

    let signal = RefreshSignal::new();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let server = IpcServer::bind(
        &config.daemon.socket_path,
        signal.clone(),
        config.daemon.connection_timeout(),
    )
    .await?;
    let ipc_task = tokio::spawn(server.serve(shutdown_rx.clone()));
    let timer_task = spawn_timer(signal.clone(), config.daemon.check_interval(), shutdown_rx.clone());
    let loop_task = tokio::spawn(daemon_loop.run(signal, shutdown_rx));

    info!("Daemon running, waiting for shutdown signal...");
    wait_for_shutdown().await?;

    // Blocking state is left as is; only an explicit reset clears it
    let _ = shutdown_tx.send(true);

    let limit = config.daemon.shutdown_timeout();
    match tokio::time::timeout(limit, loop_task).await {
        Ok(Ok(())) => debug!("Daemon loop finished"),
        Ok(Err(e)) => error!("Daemon loop task failed: {}", e),
        Err(_) => {
            warn!("In-flight cycle did not finish within {:?}", limit);
            status.mark_stopped().await;
        }
    }

    if let Err(e) = ipc_task.await {
        warn!("Control socket task failed: {}", e);
    }
    if let Err(e) = timer_task.await {
        warn!("Refresh timer task failed: {}", e);
    }

    database.close().await;
    info!("Daemon shutdown complete");

    Ok(())
}

async fn wait_for_shutdown() -> Result<()> {
    #[cfg(unix)]
    {
        let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate())?;
        let mut sigint = signal::unix::signal(signal::unix::SignalKind::interrupt())?;

        tokio::select! {
            _ = sigterm.recv() => {
                info!("Received SIGTERM, shutting down gracefully...");
            }
            _ = sigint.recv() => {
                info!("Received SIGINT, shutting down gracefully...");
            }
            _ = signal::ctrl_c() => {
                info!("Received Ctrl+C, shutting down gracefully...");
            }
        }
    }

    #[cfg(not(unix))]
    {
        signal::ctrl_c().await?;
        info!("Received Ctrl+C, shutting down gracefully...");
    }

    Ok(())
}
