//! Daily scheduler.
//!
//! `start` runs one cycle straight away, then checks the local clock on every
//! tick and fires a cycle when the scheduled minute comes round. The minute
//! that last fired is remembered, so a fast tick never fires twice inside the
//! same minute. Cycles run on the scheduler thread, one after another.
//!
//! Stopping is cooperative. The loop selects on the tick and the stop token,
//! so a stop is seen within one tick once the current cycle has finished.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{Local, NaiveDate, NaiveDateTime, Timelike};
use coin_common::config::ScheduleSpec;
use coin_common::stop::StopSignal;
use crossbeam_channel::{select, tick};
use log::{debug, info};

use crate::runner::ReportRunner;

/// Default polling period.
pub const TICK_PERIOD: Duration = Duration::from_secs(60);

/// Source of local wall-clock time.
pub trait Clock: Send + Sync {
    /// Current local date and time.
    fn now(&self) -> NaiveDateTime;
}

/// The system clock in the local time zone.
pub struct LocalClock;

impl Clock for LocalClock {
    fn now(&self) -> NaiveDateTime {
        Local::now().naive_local()
    }
}

/// Work performed by each scheduled run.
pub trait Cycle: Send + Sync {
    /// Run one cycle; failures are handled inside.
    fn run(&self);
}

impl Cycle for ReportRunner {
    fn run(&self) {
        let outcome = self.run_cycle();
        debug!("Cycle {} with {} quotes", outcome.status, outcome.quotes.len());
        for report in &outcome.channels {
            match report.error() {
                Some(err) => debug!("  {}: failed: {}", report.kind, err),
                None if report.attempted() => debug!("  {}: delivered", report.kind),
                None => debug!("  {}: skipped", report.kind),
            }
        }
    }
}

/// Lifecycle of a [`Scheduler`]. `Stopped` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    /// Created, not started.
    Idle,
    /// Inside `start`.
    Running,
    /// Stopped; `start` does nothing.
    Stopped,
}

type MinuteKey = (NaiveDate, u32, u32);

/// Runs a [`Cycle`] once at start and then daily at the scheduled minute.
pub struct Scheduler {
    schedule: ScheduleSpec,
    cycle: Arc<dyn Cycle>,
    stop: Arc<StopSignal>,
    clock: Arc<dyn Clock>,
    period: Duration,
    state: Mutex<SchedulerState>,
    last_fired: Mutex<Option<MinuteKey>>,
}

impl Scheduler {
    /// Scheduler on the local clock with the default tick.
    pub fn new(schedule: ScheduleSpec, cycle: Arc<dyn Cycle>, stop: Arc<StopSignal>) -> Self {
        Self {
            schedule,
            cycle,
            stop,
            clock: Arc::new(LocalClock),
            period: TICK_PERIOD,
            state: Mutex::new(SchedulerState::Idle),
            last_fired: Mutex::new(None),
        }
    }

    /// Replace the wall clock.
    #[cfg(test)]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Replace the polling period.
    #[cfg(test)]
    pub fn with_tick(mut self, period: Duration) -> Self {
        self.period = period;
        self
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SchedulerState {
        *lock(&self.state)
    }

    /// Run now, then run daily at the scheduled minute until stopped.
    /// Blocks the calling thread. Returns at once unless the scheduler is idle.
    pub fn start(&self) {
        {
            let mut state = lock(&self.state);
            if *state != SchedulerState::Idle || self.stop.is_stopped() {
                debug!("Scheduler start ignored in state {:?}", *state);
                return;
            }
            *state = SchedulerState::Running;
        }

        info!(
            "Scheduler started, daily report at {:02}:{:02} local time",
            self.schedule.hour, self.schedule.minute
        );
        self.cycle.run();

        let ticker = tick(self.period);
        let token = self.stop.token();
        loop {
            select! {
                recv(token.receiver()) -> _ => break,
                recv(ticker) -> _ => {
                    self.on_tick();
                }
            }
        }

        *lock(&self.state) = SchedulerState::Stopped;
        info!("Scheduler stopped");
    }

    /// Check the clock and run a cycle if the scheduled minute has come and
    /// has not fired yet. Returns whether a cycle ran.
    pub fn on_tick(&self) -> bool {
        let now = self.clock.now();
        if !self.schedule.matches(&now) {
            return false;
        }
        let key = (now.date(), now.hour(), now.minute());
        {
            let mut last = lock(&self.last_fired);
            if *last == Some(key) {
                return false;
            }
            *last = Some(key);
        }
        info!("Scheduled time {} reached", now.format("%Y-%m-%d %H:%M"));
        self.cycle.run();
        true
    }

    /// Run exactly one cycle without scheduling.
    pub fn run_once(&self) {
        info!("Running a single report cycle");
        self.cycle.run();
    }

    /// Ask the loop to exit after the current cycle.
    pub fn stop(&self) {
        self.stop.stop();
        let mut state = lock(&self.state);
        if *state == SchedulerState::Idle {
            *state = SchedulerState::Stopped;
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
