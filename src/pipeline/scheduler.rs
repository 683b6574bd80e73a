//! Periodic task scheduling.
//!
//! Tasks fire immediately when registered and then every interval. Time comes
//! from a [`Clock`] so tests can step it by hand.

use std::future::Future;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::Utc;

use crate::pipeline::monitor::Monitor;

/// Idle wait when nothing is registered.
const IDLE_WAIT: Duration = Duration::from_secs(60);

pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    base: Instant,
    offset: Mutex<Duration>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            base: Instant::now(),
            offset: Mutex::new(Duration::ZERO),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut offset = self.offset.lock().unwrap_or_else(|e| e.into_inner());
        *offset += by;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        let offset = *self.offset.lock().unwrap_or_else(|e| e.into_inner());
        self.base + offset
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskKind {
    Tweets,
    Stats,
}

/// Something that can execute a scheduled task.
#[async_trait]
pub trait TaskRunner: Send + Sync {
    async fn run_task(&self, kind: TaskKind);
}

#[async_trait]
impl TaskRunner for Monitor {
    async fn run_task(&self, kind: TaskKind) {
        match kind {
            TaskKind::Tweets => {
                self.check_tweets().await;
            }
            TaskKind::Stats => {
                self.check_stats().await;
            }
        }
    }
}

#[derive(Debug, Clone)]
struct ScheduledTask {
    kind: TaskKind,
    interval: Duration,
    next_run: Instant,
}

pub struct Scheduler<C: Clock = SystemClock> {
    clock: C,
    tasks: Vec<ScheduledTask>,
}

impl Scheduler<SystemClock> {
    pub fn new() -> Self {
        Self::with_clock(SystemClock)
    }
}

impl Default for Scheduler<SystemClock> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Clock> Scheduler<C> {
    pub fn with_clock(clock: C) -> Self {
        Self {
            clock,
            tasks: Vec::new(),
        }
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    /// Register a periodic task. It is due right away. Registering the same
    /// kind again replaces its interval.
    pub fn register(&mut self, kind: TaskKind, interval: Duration) {
        let next_run = self.clock.now();
        match self.tasks.iter_mut().find(|t| t.kind == kind) {
            Some(task) => {
                task.interval = interval;
                task.next_run = next_run;
            }
            None => self.tasks.push(ScheduledTask {
                kind,
                interval,
                next_run,
            }),
        }
        log::info!("Scheduled {kind:?} every {:?}", interval);
    }

    /// Tasks whose next run is at or before now, in registration order.
    pub fn due_tasks(&self) -> Vec<TaskKind> {
        let now = self.clock.now();
        self.tasks
            .iter()
            .filter(|t| t.next_run <= now)
            .map(|t| t.kind)
            .collect()
    }

    /// Run every due task one after another and reschedule each one
    /// interval after it finished.
    pub async fn run_pending<R: TaskRunner + ?Sized>(&mut self, runner: &R) -> Vec<TaskKind> {
        let due = self.due_tasks();
        for kind in &due {
            log::debug!("Running scheduled {kind:?} check");
            runner.run_task(*kind).await;
            let finished = self.clock.now();
            if let Some(task) = self.tasks.iter_mut().find(|t| t.kind == *kind) {
                task.next_run = finished + task.interval;
            }
        }
        due
    }

    /// Time until the earliest task is due. `None` when nothing is registered.
    pub fn until_next(&self) -> Option<Duration> {
        let now = self.clock.now();
        self.tasks
            .iter()
            .map(|t| t.next_run.saturating_duration_since(now))
            .min()
    }

    /// Run due tasks and sleep in between until `shutdown` resolves.
    ///
    /// A task already running is allowed to finish before the loop exits.
    pub async fn run_until<R, S>(&mut self, runner: &R, shutdown: S)
    where
        R: TaskRunner + ?Sized,
        S: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        loop {
            self.run_pending(runner).await;
            let wait = self.until_next().unwrap_or(IDLE_WAIT);
            tokio::select! {
                biased;
                _ = &mut shutdown => {
                    log::info!("Shutdown requested, leaving scheduler loop");
                    break;
                }
                _ = tokio::time::sleep(wait) => {}
            }
        }
    }
}

/// Long-running service: startup message, both periodic checks, stop message.
pub async fn serve<S>(monitor: &Monitor, intervals: (Duration, Duration), shutdown: S)
where
    S: Future<Output = ()>,
{
    monitor.notify_startup(Utc::now()).await;

    let (tweet_interval, stats_interval) = intervals;
    let mut scheduler = Scheduler::new();
    scheduler.register(TaskKind::Tweets, tweet_interval);
    if monitor.stats_enabled() {
        scheduler.register(TaskKind::Stats, stats_interval);
    }

    scheduler.run_until(monitor, shutdown).await;

    monitor.notify_shutdown(Utc::now()).await;
    log::info!("Monitor stopped");
}

/// Resolves on Ctrl-C, or SIGTERM on Unix.
///
/// The signal handlers are installed when this is called, not when the
/// returned future is first polled. A signal that lands while a check is
/// running is held until the scheduler loop looks at it. Must be called from
/// inside a Tokio runtime.
#[cfg(unix)]
pub fn shutdown_signal() -> impl Future<Output = ()> + Send + 'static {
    use tokio::signal::unix::{SignalKind, signal};

    let listen = |kind: SignalKind, name: &str| {
        signal(kind)
            .map_err(|e| log::error!("Failed to listen for {name}: {e}"))
            .ok()
    };
    let interrupt = listen(SignalKind::interrupt(), "Ctrl-C");
    let terminate = listen(SignalKind::terminate(), "SIGTERM");

    async move {
        tokio::select! {
            _ = recv_or_pending(interrupt) => log::info!("Received Ctrl-C"),
            _ = recv_or_pending(terminate) => log::info!("Received SIGTERM"),
        }
    }
}

#[cfg(unix)]
async fn recv_or_pending(signal: Option<tokio::signal::unix::Signal>) {
    match signal {
        Some(mut signal) => {
            signal.recv().await;
        }
        None => std::future::pending::<()>().await,
    }
}

/// Resolves on Ctrl-C. The handler is installed when this is called.
#[cfg(windows)]
pub fn shutdown_signal() -> impl Future<Output = ()> + Send + 'static {
    let ctrl_c = tokio::signal::windows::ctrl_c()
        .map_err(|e| log::error!("Failed to listen for Ctrl-C: {e}"))
        .ok();

    async move {
        match ctrl_c {
            Some(mut ctrl_c) => {
                ctrl_c.recv().await;
                log::info!("Received Ctrl-C");
            }
            None => std::future::pending::<()>().await,
        }
    }
}
