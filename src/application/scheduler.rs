// Daily model scheduler - Recurring guarded runs with bounded job history
use crate::application::execution_guard::ExecutionGuard;
use crate::domain::execution::{ExecutionReport, ExecutionStatus, JobRecord, TriggerKind};
use crate::infrastructure::config::SchedulerSettings;
use chrono::{DateTime, Duration as ChronoDuration, NaiveTime, Utc};
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

pub const JOB_NAME: &str = "daily_model_run";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Schedule {
    pub hour: u32,
    pub minute: u32,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ScheduleError {
    #[error("Invalid schedule {hour}:{minute}: hour must be 0-23, minute must be 0-59")]
    InvalidTime { hour: u32, minute: u32 },
}

impl Schedule {
    pub fn new(hour: u32, minute: u32) -> Result<Self, ScheduleError> {
        if hour > 23 || minute > 59 {
            return Err(ScheduleError::InvalidTime { hour, minute });
        }
        Ok(Self { hour, minute })
    }

    fn time(self) -> NaiveTime {
        NaiveTime::from_hms_opt(self.hour, self.minute, 0).unwrap_or(NaiveTime::MIN)
    }
}

/// First `hour:minute` UTC strictly after `now`.
pub fn next_fire_after(now: DateTime<Utc>, schedule: Schedule) -> DateTime<Utc> {
    let today = now.date_naive().and_time(schedule.time()).and_utc();
    if today > now {
        today
    } else {
        today + ChronoDuration::days(1)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SchedulerStatus {
    pub job: &'static str,
    pub running: bool,
    pub paused: bool,
    pub schedule: Schedule,
    pub next_run: Option<DateTime<Utc>>,
    pub last_job: Option<JobRecord>,
    pub history_count: usize,
    pub misfire_grace_secs: u64,
}

/// Runs the guarded model daily at the configured UTC time with `force = true`.
/// Firings never overlap, missed firings coalesce into the next one, and a
/// firing later than the misfire grace is skipped.
pub struct Scheduler {
    guard: Arc<ExecutionGuard>,
    schedule: watch::Sender<Schedule>,
    paused: watch::Sender<bool>,
    misfire_grace: Duration,
    history_limit: usize,
    history: Mutex<VecDeque<JobRecord>>,
    next_run: Mutex<Option<DateTime<Utc>>>,
    task: Mutex<Option<JoinHandle<()>>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl Scheduler {
    pub fn new(guard: Arc<ExecutionGuard>, settings: &SchedulerSettings) -> Result<Self, ScheduleError> {
        let schedule = Schedule::new(settings.hour, settings.minute)?;
        Ok(Self {
            guard,
            schedule: watch::Sender::new(schedule),
            paused: watch::Sender::new(false),
            misfire_grace: Duration::from_secs(settings.misfire_grace_secs),
            history_limit: settings.history_limit.max(1),
            history: Mutex::new(VecDeque::new()),
            next_run: Mutex::new(None),
            task: Mutex::new(None),
        })
    }

    pub fn is_running(&self) -> bool {
        lock(&self.task).as_ref().is_some_and(|task| !task.is_finished())
    }

    /// Spawns the recurring job. Returns false if it is already running.
    pub fn start(self: &Arc<Self>) -> bool {
        let mut task = lock(&self.task);
        if task.as_ref().is_some_and(|t| !t.is_finished()) {
            return false;
        }

        let scheduler = Arc::clone(self);
        *task = Some(tokio::spawn(async move { scheduler.run_loop().await }));
        let schedule = *self.schedule.borrow();
        tracing::info!(job = JOB_NAME, hour = schedule.hour, minute = schedule.minute, "Scheduler started");
        true
    }

    pub fn stop(&self) {
        if let Some(task) = lock(&self.task).take() {
            task.abort();
            tracing::info!(job = JOB_NAME, "Scheduler stopped");
        }
        *lock(&self.next_run) = None;
    }

    async fn run_loop(self: Arc<Self>) {
        let mut schedule_rx = self.schedule.subscribe();
        let mut paused_rx = self.paused.subscribe();
        let mut last_fire: Option<DateTime<Utc>> = None;

        loop {
            let schedule = *schedule_rx.borrow_and_update();
            let paused = *paused_rx.borrow_and_update();

            if paused {
                *lock(&self.next_run) = None;
                tokio::select! {
                    changed = schedule_rx.changed() => if changed.is_err() { break },
                    changed = paused_rx.changed() => if changed.is_err() { break },
                }
                continue;
            }

            // Timer may wake before the wall clock reaches `next`; never reuse a fire time
            let now = Utc::now();
            let next = next_fire_after(last_fire.map_or(now, |fired| fired.max(now)), schedule);
            *lock(&self.next_run) = Some(next);
            let wait = (next - now).to_std().unwrap_or_default();

            tokio::select! {
                _ = tokio::time::sleep(wait) => {
                    last_fire = Some(next);
                    let late = (Utc::now() - next).to_std().unwrap_or_default();
                    if late > self.misfire_grace {
                        tracing::warn!(
                            job = JOB_NAME,
                            scheduled_for = %next,
                            late_secs = late.as_secs(),
                            "Missed run outside grace period, skipping"
                        );
                        continue;
                    }
                    self.run_job(TriggerKind::Scheduled, None, true).await;
                }
                changed = schedule_rx.changed() => if changed.is_err() { break },
                changed = paused_rx.changed() => if changed.is_err() { break },
            }
        }
    }

    /// Runs one job and records it. The guard call runs in its own task so a
    /// panic inside it is recorded as a failed job instead of ending the loop.
    async fn run_job(&self, trigger: TriggerKind, user_id: Option<String>, force: bool) -> ExecutionReport {
        let start_time = Utc::now();
        let job_id = JobRecord::job_id_for(trigger, start_time);
        tracing::info!(job_id = %job_id, ?trigger, user_id = user_id.as_deref(), "Running job");

        let guard = Arc::clone(&self.guard);
        let report = match tokio::spawn(async move { guard.trigger_execution(force).await }).await {
            Ok(report) => report,
            Err(e) => {
                tracing::error!(job_id = %job_id, "Job crashed: {}", e);
                ExecutionReport::rejected(format!("Job {job_id} crashed: {e}"))
            }
        };

        let record = JobRecord {
            job_id,
            execution_id: report.execution_id.clone(),
            start_time,
            end_time: Utc::now(),
            success: report.success,
            message: report.message.clone(),
            trigger,
            user_id,
        };

        let mut history = lock(&self.history);
        history.push_back(record);
        while history.len() > self.history_limit {
            history.pop_front();
        }
        report
    }

    /// Runs the model now, bypassing the cooldown. Overlapping runs still wait
    /// for the one in flight.
    pub async fn trigger_now(&self, user_id: Option<String>) -> ExecutionReport {
        self.run_job(TriggerKind::Manual, user_id, true).await
    }

    pub fn reschedule(&self, hour: u32, minute: u32) -> Result<Schedule, ScheduleError> {
        let schedule = Schedule::new(hour, minute)?;
        self.schedule.send_replace(schedule);
        self.refresh_next_run();
        tracing::info!(job = JOB_NAME, hour, minute, "Job rescheduled");
        Ok(schedule)
    }

    pub fn pause(&self) {
        self.paused.send_replace(true);
        *lock(&self.next_run) = None;
        tracing::info!(job = JOB_NAME, "Job paused");
    }

    pub fn resume(&self) {
        self.paused.send_replace(false);
        self.refresh_next_run();
        tracing::info!(job = JOB_NAME, "Job resumed");
    }

    fn refresh_next_run(&self) {
        let next = (self.is_running() && !*self.paused.borrow())
            .then(|| next_fire_after(Utc::now(), *self.schedule.borrow()));
        *lock(&self.next_run) = next;
    }

    pub fn next_run(&self) -> Option<DateTime<Utc>> {
        *lock(&self.next_run)
    }

    pub fn status(&self) -> SchedulerStatus {
        let history = lock(&self.history);
        SchedulerStatus {
            job: JOB_NAME,
            running: self.is_running(),
            paused: *self.paused.borrow(),
            schedule: *self.schedule.borrow(),
            next_run: self.next_run(),
            last_job: history.back().cloned(),
            history_count: history.len(),
            misfire_grace_secs: self.misfire_grace.as_secs(),
        }
    }

    /// Most recent first.
    pub fn job_history(&self, limit: usize) -> Vec<JobRecord> {
        lock(&self.history).iter().rev().take(limit).cloned().collect()
    }

    pub fn execution_status(&self) -> ExecutionStatus {
        ExecutionStatus {
            next_scheduled_run: self.next_run(),
            ..self.guard.status()
        }
    }
}
