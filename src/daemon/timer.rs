//! Timer engine for the stopwatch.
//!
//! This module provides the core timing functionality:
//! - State transitions (Idle → Running ⇄ Paused → Idle)
//! - Drift-free ticking against a fixed anchor instant
//! - Status and tick publication on the notification bus
//! - Host self-advertisement while running unattended

use std::sync::Arc;

use tokio::time::{Duration, Instant};

use crate::types::{
    Command, CommandOutcome, CommandReply, Notification, StatusMessage, TickMessage, TimerState,
    Visibility,
};

use super::bus::NotificationBus;
use super::host::{HostRegistrar, LogRegistrar};

/// Time between two ticks.
pub const TICK_INTERVAL: Duration = Duration::from_secs(1);

// ============================================================================
// EngineError
// ============================================================================

/// Commands the engine refuses in its current state.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EngineError {
    /// Reset requested while the counter is advancing
    #[error("cannot reset a running stopwatch, pause it first")]
    ResetWhileRunning,
}

// ============================================================================
// TickSchedule
// ============================================================================

/// Tick `k` is due at `anchor + k * TICK_INTERVAL`.
///
/// Deadlines are derived from the anchor rather than from the previous tick,
/// so a late wake-up never shifts later ticks.
#[derive(Debug, Clone, Copy)]
struct TickSchedule {
    anchor: Instant,
    fired: u32,
}

impl TickSchedule {
    fn new(anchor: Instant) -> Self {
        Self { anchor, fired: 0 }
    }

    fn next_deadline(&self) -> Instant {
        self.anchor + TICK_INTERVAL * self.fired.saturating_add(1)
    }

    /// Time spent in the interval currently in progress.
    fn partial(&self, now: Instant) -> Duration {
        let last = self.anchor + TICK_INTERVAL * self.fired;
        now.saturating_duration_since(last).min(TICK_INTERVAL)
    }
}

// ============================================================================
// TimerEngine
// ============================================================================

/// Owns the authoritative stopwatch state and publishes its changes.
pub struct TimerEngine {
    /// Current timer state
    state: TimerState,
    /// Where status and tick messages go
    bus: Arc<NotificationBus>,
    /// Host self-advertisement
    registrar: Box<dyn HostRegistrar>,
    /// Present only while running
    schedule: Option<TickSchedule>,
    /// Progress into an interval that a pause interrupted
    carried: Duration,
    /// Whether the registrar currently holds a registration
    advertised: bool,
}

impl TimerEngine {
    /// Creates an idle engine that logs its host registration.
    pub fn new(bus: Arc<NotificationBus>) -> Self {
        Self::with_registrar(bus, Box::new(LogRegistrar))
    }

    /// Creates an idle engine with a custom host registrar.
    pub fn with_registrar(bus: Arc<NotificationBus>, registrar: Box<dyn HostRegistrar>) -> Self {
        Self {
            state: TimerState::new(),
            bus,
            registrar,
            schedule: None,
            carried: Duration::ZERO,
            advertised: false,
        }
    }

    /// Applies a command and reports how it was treated.
    ///
    /// Ticks that fell due before the command are fired first, so the
    /// command always acts on an up-to-date count.
    pub fn handle(&mut self, command: Command) -> CommandReply {
        self.advance(Instant::now());

        let outcome = match command {
            Command::Start => self.start(),
            Command::Pause => self.pause(),
            Command::Reset => match self.reset() {
                Ok(()) => CommandOutcome::Accepted,
                Err(e) => {
                    tracing::warn!(command = %command, "{}", e);
                    CommandOutcome::Rejected {
                        reason: e.to_string(),
                    }
                }
            },
            Command::GetStatus => {
                self.query_status();
                CommandOutcome::Accepted
            }
            Command::MoveToForeground => applied(self.enter_foreground()),
            Command::MoveToBackground => applied(self.enter_background()),
        };

        CommandReply {
            outcome,
            status: self.state.status(),
        }
    }

    /// Starts or resumes counting.
    ///
    /// A status message is published for every call, including duplicates.
    pub fn start(&mut self) -> CommandOutcome {
        let outcome = if self.state.start() {
            let now = Instant::now();
            let anchor = now.checked_sub(self.carried).unwrap_or(now);
            self.schedule = Some(TickSchedule::new(anchor));
            self.carried = Duration::ZERO;
            tracing::info!(elapsed = self.state.elapsed_seconds, "Stopwatch started");
            CommandOutcome::Accepted
        } else {
            tracing::debug!("Start ignored, already running");
            CommandOutcome::Ignored
        };

        self.publish_status();
        self.sync_advertisement();
        outcome
    }

    /// Freezes the counter. No-op unless running.
    pub fn pause(&mut self) -> CommandOutcome {
        let now = Instant::now();
        self.advance(now);

        if !self.state.pause() {
            tracing::debug!(state = self.state.run_state.as_str(), "Pause ignored");
            return CommandOutcome::Ignored;
        }

        if let Some(schedule) = self.schedule.take() {
            self.carried = schedule.partial(now);
        }
        tracing::info!(elapsed = self.state.elapsed_seconds, "Stopwatch paused");

        self.publish_status();
        self.sync_advertisement();
        CommandOutcome::Accepted
    }

    /// Zeroes the counter and returns to idle.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::ResetWhileRunning`] if the stopwatch is running;
    /// the state is left untouched and nothing is published.
    pub fn reset(&mut self) -> Result<(), EngineError> {
        if !self.state.reset() {
            return Err(EngineError::ResetWhileRunning);
        }

        self.carried = Duration::ZERO;
        tracing::info!("Stopwatch reset");
        self.publish_status();
        Ok(())
    }

    /// Publishes the current status without changing anything.
    pub fn query_status(&self) -> StatusMessage {
        let status = self.state.status();
        self.bus.publish(Notification::Status(status));
        status
    }

    /// No interface renders the stopwatch any more.
    ///
    /// Returns false if that was already the case.
    pub fn enter_foreground(&mut self) -> bool {
        self.set_visibility(Visibility::InterfaceBackground)
    }

    /// An interface renders the stopwatch again.
    ///
    /// Returns false if that was already the case.
    pub fn enter_background(&mut self) -> bool {
        self.set_visibility(Visibility::InterfaceForeground)
    }

    /// Deadline of the next tick, or `None` while not running.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.schedule.map(|s| s.next_deadline())
    }

    /// Fires every tick due at or before `now`, in order.
    ///
    /// Returns how many ticks fired.
    pub fn advance(&mut self, now: Instant) -> u32 {
        let mut fired = 0;
        while let Some(deadline) = self.next_deadline() {
            if deadline > now {
                break;
            }
            self.fire_tick();
            fired += 1;
        }

        if fired > 1 {
            tracing::debug!(fired, "Caught up on late ticks");
        }
        fired
    }

    /// Releases the host registration before the engine goes away.
    pub fn shutdown(&mut self) {
        if self.advertised {
            self.registrar.release();
            self.advertised = false;
        }
        tracing::info!(elapsed = self.state.elapsed_seconds, "Timer engine stopped");
    }

    /// Returns a reference to the current timer state.
    pub fn get_state(&self) -> &TimerState {
        &self.state
    }

    /// Returns true while a persistent host notice is registered.
    pub fn is_advertised(&self) -> bool {
        self.advertised
    }

    /// Returns the bus this engine publishes on.
    pub fn bus(&self) -> &Arc<NotificationBus> {
        &self.bus
    }

    fn fire_tick(&mut self) {
        let Some(schedule) = self.schedule.as_mut() else {
            return;
        };
        schedule.fired = schedule.fired.saturating_add(1);

        if let Some(elapsed_seconds) = self.state.tick() {
            tracing::debug!(elapsed = elapsed_seconds, "Tick");
            self.bus
                .publish(Notification::Tick(TickMessage { elapsed_seconds }));
            if self.advertised {
                self.registrar.update(elapsed_seconds);
            }
        }
    }

    fn set_visibility(&mut self, visibility: Visibility) -> bool {
        if !self.state.set_visibility(visibility) {
            return false;
        }
        tracing::info!(visibility = visibility.as_str(), "Visibility changed");
        self.sync_advertisement();
        true
    }

    fn publish_status(&self) {
        self.bus.publish(Notification::Status(self.state.status()));
    }

    /// Registered exactly while running with no interface attached.
    fn sync_advertisement(&mut self) {
        let wanted = self.state.is_running() && self.state.is_unattended();
        if wanted && !self.advertised {
            self.registrar.register(self.state.status());
            self.advertised = true;
        } else if !wanted && self.advertised {
            self.registrar.release();
            self.advertised = false;
        }
    }
}

impl std::fmt::Debug for TimerEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TimerEngine")
            .field("state", &self.state)
            .field("schedule", &self.schedule)
            .field("carried", &self.carried)
            .field("advertised", &self.advertised)
            .finish()
    }
}

fn applied(changed: bool) -> CommandOutcome {
    if changed {
        CommandOutcome::Accepted
    } else {
        CommandOutcome::Ignored
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use crate::daemon::host::{HostEvent, MockHostRegistrar};
    use crate::types::{RunState, Topic};

    type Recorded = Arc<Mutex<Vec<Notification>>>;

    fn create_engine() -> (TimerEngine, Recorded, Recorded) {
        let bus = Arc::new(NotificationBus::new("test"));
        let ticks = record(&bus, Topic::Tick);
        let statuses = record(&bus, Topic::Status);
        (TimerEngine::new(bus), ticks, statuses)
    }

    fn create_engine_with_mock() -> (TimerEngine, Arc<MockHostRegistrar>) {
        let bus = Arc::new(NotificationBus::new("test"));
        let mock = Arc::new(MockHostRegistrar::new());
        let engine = TimerEngine::with_registrar(bus, Box::new(Arc::clone(&mock)));
        (engine, mock)
    }

    fn record(bus: &NotificationBus, topic: Topic) -> Recorded {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        bus.subscribe(topic, move |n| sink.lock().unwrap().push(*n));
        seen
    }

    fn drain(recorded: &Recorded) -> Vec<Notification> {
        std::mem::take(&mut *recorded.lock().unwrap())
    }

    fn status(running: bool, elapsed_seconds: u64) -> Notification {
        Notification::Status(StatusMessage {
            running,
            elapsed_seconds,
        })
    }

    fn tick_values(recorded: &Recorded) -> Vec<u64> {
        drain(recorded).iter().map(|n| n.elapsed_seconds()).collect()
    }

    /// Moves the paused clock forward and fires whatever fell due.
    async fn wait(engine: &mut TimerEngine, millis: u64) -> u32 {
        tokio::time::advance(Duration::from_millis(millis)).await;
        engine.advance(Instant::now())
    }

    // ------------------------------------------------------------------------
    // Command Tests
    // ------------------------------------------------------------------------

    mod command_tests {
        use super::*;

        #[tokio::test(start_paused = true)]
        async fn test_new_engine() {
            let (engine, _ticks, _statuses) = create_engine();
            let state = engine.get_state();

            assert_eq!(state.run_state, RunState::Idle);
            assert_eq!(state.elapsed_seconds, 0);
            assert!(engine.next_deadline().is_none());
        }

        #[tokio::test(start_paused = true)]
        async fn test_start_emits_status() {
            let (mut engine, _ticks, statuses) = create_engine();

            assert_eq!(engine.start(), CommandOutcome::Accepted);

            assert_eq!(engine.get_state().run_state, RunState::Running);
            assert_eq!(drain(&statuses), vec![status(true, 0)]);
            assert_eq!(
                engine.next_deadline(),
                Some(Instant::now() + TICK_INTERVAL)
            );
        }

        #[tokio::test(start_paused = true)]
        async fn test_start_twice_is_idempotent() {
            let (mut engine, ticks, statuses) = create_engine();

            engine.start();
            wait(&mut engine, 500).await;
            assert_eq!(engine.start(), CommandOutcome::Ignored);

            // One status per call, schedule untouched
            assert_eq!(drain(&statuses), vec![status(true, 0), status(true, 0)]);
            wait(&mut engine, 500).await;
            assert_eq!(tick_values(&ticks), vec![1]);
            assert_eq!(engine.get_state().elapsed_seconds, 1);
        }

        #[tokio::test(start_paused = true)]
        async fn test_pause_when_idle_is_noop() {
            let (mut engine, _ticks, statuses) = create_engine();

            assert_eq!(engine.pause(), CommandOutcome::Ignored);

            assert_eq!(engine.get_state().run_state, RunState::Idle);
            assert!(drain(&statuses).is_empty());
        }

        #[tokio::test(start_paused = true)]
        async fn test_pause_twice() {
            let (mut engine, _ticks, statuses) = create_engine();
            engine.start();
            wait(&mut engine, 2000).await;

            assert_eq!(engine.pause(), CommandOutcome::Accepted);
            assert_eq!(engine.pause(), CommandOutcome::Ignored);

            assert_eq!(
                drain(&statuses),
                vec![status(true, 0), status(false, 2)]
            );
            assert!(engine.next_deadline().is_none());
        }

        #[tokio::test(start_paused = true)]
        async fn test_reset_while_running_rejected() {
            let (mut engine, _ticks, statuses) = create_engine();
            engine.start();
            wait(&mut engine, 4000).await;
            drain(&statuses);

            assert_eq!(engine.reset(), Err(EngineError::ResetWhileRunning));

            let state = engine.get_state();
            assert_eq!(state.run_state, RunState::Running);
            assert_eq!(state.elapsed_seconds, 4);
            assert!(drain(&statuses).is_empty());
        }

        #[tokio::test(start_paused = true)]
        async fn test_reset_when_paused() {
            let (mut engine, _ticks, statuses) = create_engine();
            engine.start();
            wait(&mut engine, 4000).await;
            engine.pause();
            drain(&statuses);

            assert_eq!(engine.reset(), Ok(()));

            let state = engine.get_state();
            assert_eq!(state.run_state, RunState::Idle);
            assert_eq!(state.elapsed_seconds, 0);
            assert_eq!(drain(&statuses), vec![status(false, 0)]);
        }

        #[tokio::test(start_paused = true)]
        async fn test_reset_when_idle() {
            let (mut engine, _ticks, statuses) = create_engine();

            assert_eq!(engine.reset(), Ok(()));
            assert_eq!(drain(&statuses), vec![status(false, 0)]);
        }

        #[tokio::test(start_paused = true)]
        async fn test_query_status_does_not_mutate() {
            let (mut engine, _ticks, statuses) = create_engine();
            engine.start();
            wait(&mut engine, 3000).await;
            let before = engine.get_state().clone();
            drain(&statuses);

            let reported = engine.query_status();

            assert_eq!(reported.elapsed_seconds, 3);
            assert!(reported.running);
            assert_eq!(engine.get_state(), &before);
            assert_eq!(drain(&statuses), vec![status(true, 3)]);
        }

        #[tokio::test(start_paused = true)]
        async fn test_handle_maps_rejection() {
            let (mut engine, _ticks, _statuses) = create_engine();
            engine.handle(Command::Start);

            let reply = engine.handle(Command::Reset);

            assert!(matches!(reply.outcome, CommandOutcome::Rejected { .. }));
            assert!(reply.status.running);
        }

        #[tokio::test(start_paused = true)]
        async fn test_handle_fires_due_ticks_first() {
            let (mut engine, ticks, _statuses) = create_engine();
            engine.handle(Command::Start);

            tokio::time::advance(Duration::from_millis(3000)).await;
            let reply = engine.handle(Command::Pause);

            assert_eq!(reply.outcome, CommandOutcome::Accepted);
            assert_eq!(reply.status.elapsed_seconds, 3);
            assert_eq!(tick_values(&ticks), vec![1, 2, 3]);
        }

        #[tokio::test(start_paused = true)]
        async fn test_handle_visibility_outcomes() {
            let (mut engine, _ticks, _statuses) = create_engine();

            assert_eq!(
                engine.handle(Command::MoveToBackground).outcome,
                CommandOutcome::Ignored
            );
            assert_eq!(
                engine.handle(Command::MoveToForeground).outcome,
                CommandOutcome::Accepted
            );
            assert_eq!(
                engine.handle(Command::MoveToForeground).outcome,
                CommandOutcome::Ignored
            );
            assert_eq!(
                engine.get_state().visibility,
                Visibility::InterfaceBackground
            );
        }
    }

    // ------------------------------------------------------------------------
    // Tick Tests
    // ------------------------------------------------------------------------

    mod tick_tests {
        use super::*;

        #[tokio::test(start_paused = true)]
        async fn test_no_ticks_when_idle() {
            let (mut engine, ticks, _statuses) = create_engine();

            assert_eq!(wait(&mut engine, 5000).await, 0);
            assert!(drain(&ticks).is_empty());
        }

        #[tokio::test(start_paused = true)]
        async fn test_tick_once_per_second() {
            let (mut engine, ticks, _statuses) = create_engine();
            engine.start();

            assert_eq!(wait(&mut engine, 999).await, 0);
            assert_eq!(wait(&mut engine, 1).await, 1);
            assert_eq!(wait(&mut engine, 1000).await, 1);
            assert_eq!(tick_values(&ticks), vec![1, 2]);
        }

        #[tokio::test(start_paused = true)]
        async fn test_late_wakeup_catches_up_without_drift() {
            let (mut engine, ticks, _statuses) = create_engine();
            let started = Instant::now();
            engine.start();

            // One very late wake-up
            assert_eq!(wait(&mut engine, 3700).await, 3);
            assert_eq!(tick_values(&ticks), vec![1, 2, 3]);

            // The next deadline is still on the first grid
            assert_eq!(
                engine.next_deadline(),
                Some(started + Duration::from_secs(4))
            );
        }

        #[tokio::test(start_paused = true)]
        async fn test_long_run_exact() {
            let (mut engine, _ticks, _statuses) = create_engine();
            engine.start();

            // Two hours in irregular wake-ups
            let total: u64 = 7200 * 1000 + 500;
            let mut waited: u64 = 0;
            while waited < total {
                let step = (700 + waited % 900).min(total - waited);
                wait(&mut engine, step).await;
                waited += step;
            }

            assert_eq!(engine.get_state().elapsed_seconds, 7200);
        }

        #[tokio::test(start_paused = true)]
        async fn test_interleaved_partial_seconds_accumulate() {
            let (mut engine, _ticks, _statuses) = create_engine();

            // 2.5s + 1.5s + 0.4s + 0.6s of running time
            for millis in [2500, 1500, 400, 600] {
                engine.start();
                wait(&mut engine, millis).await;
                engine.pause();
                wait(&mut engine, 10_000).await;
            }

            assert_eq!(engine.get_state().elapsed_seconds, 5);
        }

        #[tokio::test(start_paused = true)]
        async fn test_reset_discards_partial_interval() {
            let (mut engine, _ticks, _statuses) = create_engine();
            engine.start();
            wait(&mut engine, 900).await;
            engine.pause();
            engine.reset().unwrap();

            engine.start();
            assert_eq!(wait(&mut engine, 999).await, 0);
            assert_eq!(wait(&mut engine, 1).await, 1);
        }

        #[tokio::test(start_paused = true)]
        async fn test_start_pause_scenario() {
            let (mut engine, ticks, statuses) = create_engine();

            engine.start();
            wait(&mut engine, 3000).await;
            engine.pause();
            assert_eq!(drain(&statuses).last(), Some(&status(false, 3)));
            drain(&ticks);

            engine.start();
            wait(&mut engine, 2000).await;
            assert_eq!(tick_values(&ticks), vec![4, 5]);

            engine.pause();
            engine.reset().unwrap();
            assert_eq!(drain(&statuses).last(), Some(&status(false, 0)));
        }
    }

    // ------------------------------------------------------------------------
    // Host Registration Tests
    // ------------------------------------------------------------------------

    mod host_tests {
        use super::*;

        #[tokio::test(start_paused = true)]
        async fn test_no_registration_while_attended() {
            let (mut engine, mock) = create_engine_with_mock();
            engine.start();
            wait(&mut engine, 2000).await;

            assert!(mock.events().is_empty());
            assert!(!engine.is_advertised());
        }

        #[tokio::test(start_paused = true)]
        async fn test_hidden_while_running_registers() {
            let (mut engine, mock) = create_engine_with_mock();
            engine.start();
            wait(&mut engine, 1000).await;

            assert!(engine.enter_foreground());
            wait(&mut engine, 2000).await;

            assert_eq!(
                mock.events(),
                vec![
                    HostEvent::Registered(1),
                    HostEvent::Updated(2),
                    HostEvent::Updated(3)
                ]
            );
        }

        #[tokio::test(start_paused = true)]
        async fn test_visibility_does_not_touch_counter() {
            let (mut engine, _mock) = create_engine_with_mock();
            engine.start();
            wait(&mut engine, 2000).await;

            engine.enter_foreground();
            engine.enter_background();
            engine.enter_foreground();

            let state = engine.get_state();
            assert_eq!(state.elapsed_seconds, 2);
            assert_eq!(state.run_state, RunState::Running);
        }

        #[tokio::test(start_paused = true)]
        async fn test_hidden_while_idle_does_not_register() {
            let (mut engine, mock) = create_engine_with_mock();

            engine.enter_foreground();
            assert!(mock.events().is_empty());

            // Starting while unattended registers
            engine.start();
            assert_eq!(mock.events(), vec![HostEvent::Registered(0)]);
        }

        #[tokio::test(start_paused = true)]
        async fn test_interface_returning_releases() {
            let (mut engine, mock) = create_engine_with_mock();
            engine.enter_foreground();
            engine.start();

            assert!(engine.enter_background());
            assert!(!engine.enter_background());

            assert_eq!(
                mock.events(),
                vec![HostEvent::Registered(0), HostEvent::Released]
            );
            assert!(!engine.is_advertised());
        }

        #[tokio::test(start_paused = true)]
        async fn test_pause_releases_and_resume_registers_again() {
            let (mut engine, mock) = create_engine_with_mock();
            engine.enter_foreground();
            engine.start();
            engine.pause();
            engine.start();

            assert_eq!(
                mock.events(),
                vec![
                    HostEvent::Registered(0),
                    HostEvent::Released,
                    HostEvent::Registered(0)
                ]
            );
        }

        #[tokio::test(start_paused = true)]
        async fn test_repeated_foreground_is_noop() {
            let (mut engine, mock) = create_engine_with_mock();
            engine.start();

            assert!(engine.enter_foreground());
            assert!(!engine.enter_foreground());

            assert_eq!(mock.events(), vec![HostEvent::Registered(0)]);
        }

        #[tokio::test(start_paused = true)]
        async fn test_shutdown_releases() {
            let (mut engine, mock) = create_engine_with_mock();
            engine.enter_foreground();
            engine.start();

            engine.shutdown();

            assert!(!mock.is_registered());
        }
    }
}
