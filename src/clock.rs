//! Drift-resistant countdown toward a session's end time.
//!
//! The countdown never decrements a counter: every tick recomputes
//! `remaining = max(0, end_time - now)` from absolute time, so throttled,
//! delayed, or skewed clients converge on the same zero instead of
//! accumulating drift. Clamping at zero is applied uniformly: here, in the
//! join decision, and at submission.
//!
//! Two interchangeable implementations sit behind the [`Countdown`] trait:
//!
//! - [`WorkerCountdown`] is preferred: a dedicated background thread that
//!   keeps ticking while the host's foreground is throttled.
//! - [`PollCountdown`] is the fallback when the host cannot spawn a thread; the
//!   host drives it from its own interval timer via [`Countdown::poll`] and
//!   calls [`Countdown::on_visibility_regained`] to recompute immediately
//!   after a throttled gap.
//!
//! [`spawn_countdown`] probes for the thread capability at construction time
//! and picks the implementation, so callers never branch on it.
//!
//! Contract: `TimeUp` fires at most once per countdown instance, across both
//! implementations; stopping after it fired is a no-op, not an error.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use parking_lot::Mutex;
use web_time::Duration;

use crate::telemetry::{ViolationKind, ViolationSeverity};
use crate::{report_violation, Timestamp};

/// Source of wall-clock time, in epoch milliseconds.
///
/// Production code uses [`SystemTimeSource`]; tests drive a shared
/// [`ManualTimeSource`] to make every timing scenario deterministic.
pub trait TimeSource: Send + Sync {
    /// The current wall-clock time.
    fn now(&self) -> Timestamp;
}

/// Wall-clock time from the host system.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemTimeSource;

impl TimeSource for SystemTimeSource {
    fn now(&self) -> Timestamp {
        use web_time::{SystemTime, UNIX_EPOCH};
        // A clock before the epoch yields 0; coordination math clamps anyway.
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_millis() as i64)
            .unwrap_or(0);
        Timestamp::from_millis(millis)
    }
}

/// Test-controlled time source. Clones share the same underlying instant.
#[derive(Debug, Clone, Default)]
pub struct ManualTimeSource {
    now: Arc<Mutex<Timestamp>>,
}

impl ManualTimeSource {
    /// Creates a manual source starting at `now`.
    #[must_use]
    pub fn starting_at(now: Timestamp) -> Self {
        Self {
            now: Arc::new(Mutex::new(now)),
        }
    }

    /// Sets the current time. Moving backwards is allowed; consumers clamp.
    pub fn set(&self, now: Timestamp) {
        *self.now.lock() = now;
    }

    /// Advances the current time by `millis`.
    pub fn advance_millis(&self, millis: i64) {
        let mut now = self.now.lock();
        *now = now.saturating_add_millis(millis);
    }
}

impl TimeSource for ManualTimeSource {
    fn now(&self) -> Timestamp {
        *self.now.lock()
    }
}

/// Events a countdown delivers to its callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CountdownEvent {
    /// Periodic progress report; `remaining_ms` is never negative.
    Tick {
        /// Milliseconds until the end time, clamped at zero.
        remaining_ms: i64,
    },
    /// The end time has passed. Delivered at most once per countdown.
    TimeUp,
}

/// Callback receiving countdown events. Invoked from the worker thread or
/// from whatever thread drives [`Countdown::poll`].
pub type CountdownCallback = Box<dyn FnMut(CountdownEvent) + Send>;

/// Configuration for countdown ticking.
///
/// # Example
///
/// ```
/// use livequiz::CountdownConfig;
///
/// // Smoother progress display at the cost of more wakeups.
/// let fine = CountdownConfig::fine();
/// assert!(fine.tick_interval < CountdownConfig::default().tick_interval);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CountdownConfig {
    /// How often the worker recomputes and reports remaining time.
    ///
    /// Default: 250 ms, four updates per displayed second.
    pub tick_interval: Duration,
}

impl Default for CountdownConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_millis(250),
        }
    }
}

impl CountdownConfig {
    /// Preset for smooth sub-second progress displays.
    #[must_use]
    pub fn fine() -> Self {
        Self {
            tick_interval: Duration::from_millis(100),
        }
    }

    /// Preset for coarse, battery-friendly ticking.
    #[must_use]
    pub fn coarse() -> Self {
        Self {
            tick_interval: Duration::from_millis(1_000),
        }
    }
}

/// State shared by both countdown implementations: the target, the time
/// source, the callback, and the once-only `TimeUp` latch.
struct CountdownCore {
    end_time: Timestamp,
    time: Arc<dyn TimeSource>,
    callback: Mutex<CountdownCallback>,
    fired: AtomicBool,
    stopped: AtomicBool,
}

impl CountdownCore {
    fn new(end_time: Timestamp, time: Arc<dyn TimeSource>, callback: CountdownCallback) -> Self {
        Self {
            end_time,
            time,
            callback: Mutex::new(callback),
            fired: AtomicBool::new(false),
            stopped: AtomicBool::new(false),
        }
    }

    /// Recomputes remaining time and delivers one event. Returns the
    /// remaining milliseconds, or `None` once the countdown is finished
    /// (fired or stopped).
    fn step(&self) -> Option<i64> {
        if self.stopped.load(Ordering::SeqCst) {
            return None;
        }
        let remaining = self.end_time.saturating_since(self.time.now());
        if remaining == 0 {
            // The latch makes TimeUp at-most-once even if both the worker
            // and a host-driven poll observe expiry concurrently.
            if !self.fired.swap(true, Ordering::SeqCst) {
                (self.callback.lock())(CountdownEvent::TimeUp);
            }
            return None;
        }
        (self.callback.lock())(CountdownEvent::Tick {
            remaining_ms: remaining,
        });
        Some(remaining)
    }

    fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
    }
}

/// One countdown toward a fixed end time.
///
/// Obtained from [`spawn_countdown`]; the concrete implementation depends on
/// whether a background thread could be spawned.
pub trait Countdown: Send + Sync {
    /// Host-driven recomputation. The worker implementation ticks itself and
    /// treats this as a no-op; the fallback implementation depends on it.
    fn poll(&self);

    /// Recomputes immediately after the host regained foreground focus, to
    /// correct for ticks lost while throttled.
    fn on_visibility_regained(&self) {
        self.poll();
    }

    /// Stops ticking. Stopping after `TimeUp` fired is a no-op.
    fn stop(&self);

    /// Returns `true` once `TimeUp` has been delivered.
    fn has_fired(&self) -> bool;
}

/// Background-thread countdown, immune to foreground throttling.
pub struct WorkerCountdown {
    core: Arc<CountdownCore>,
}

impl WorkerCountdown {
    /// Spawns the ticking thread. Fails only if the host refuses to spawn
    /// threads, in which case the caller falls back to [`PollCountdown`].
    fn spawn(config: CountdownConfig, core: Arc<CountdownCore>) -> std::io::Result<Self> {
        let thread_core = core.clone();
        thread::Builder::new()
            .name("livequiz-countdown".to_owned())
            .spawn(move || loop {
                match thread_core.step() {
                    None => break,
                    Some(remaining) => {
                        let nap = config
                            .tick_interval
                            .min(Duration::from_millis(remaining.max(1) as u64));
                        thread::sleep(nap);
                    }
                }
            })?;
        Ok(Self { core })
    }
}

impl Countdown for WorkerCountdown {
    fn poll(&self) {
        // The worker thread drives itself.
    }

    fn stop(&self) {
        self.core.stop();
    }

    fn has_fired(&self) -> bool {
        self.core.fired.load(Ordering::SeqCst)
    }
}

impl Drop for WorkerCountdown {
    fn drop(&mut self) {
        // The thread observes the flag on its next wakeup and exits; it is
        // deliberately not joined so a countdown may be dropped from within
        // its own callback.
        self.core.stop();
    }
}

impl std::fmt::Debug for WorkerCountdown {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerCountdown")
            .field("end_time", &self.core.end_time)
            .field("fired", &self.has_fired())
            .finish()
    }
}

/// Host-driven fallback countdown.
pub struct PollCountdown {
    core: Arc<CountdownCore>,
}

impl PollCountdown {
    /// Creates a countdown the host must drive via [`Countdown::poll`].
    #[must_use]
    pub fn new(
        end_time: Timestamp,
        time: Arc<dyn TimeSource>,
        callback: CountdownCallback,
    ) -> Self {
        Self {
            core: Arc::new(CountdownCore::new(end_time, time, callback)),
        }
    }

    fn from_core(core: Arc<CountdownCore>) -> Self {
        Self { core }
    }
}

impl Countdown for PollCountdown {
    fn poll(&self) {
        let _ = self.core.step();
    }

    fn stop(&self) {
        self.core.stop();
    }

    fn has_fired(&self) -> bool {
        self.core.fired.load(Ordering::SeqCst)
    }
}

impl std::fmt::Debug for PollCountdown {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PollCountdown")
            .field("end_time", &self.core.end_time)
            .field("fired", &self.has_fired())
            .finish()
    }
}

/// Creates a countdown toward `end_time`, probing for the background-thread
/// capability and falling back to host-driven polling when it is missing.
#[must_use]
pub fn spawn_countdown(
    config: CountdownConfig,
    time: Arc<dyn TimeSource>,
    end_time: Timestamp,
    callback: CountdownCallback,
) -> Box<dyn Countdown> {
    let core = Arc::new(CountdownCore::new(end_time, time, callback));
    match WorkerCountdown::spawn(config, core.clone()) {
        Ok(worker) => Box::new(worker),
        Err(err) => {
            report_violation!(
                ViolationSeverity::Warning,
                ViolationKind::Timing,
                "background countdown thread unavailable ({}); falling back to host-driven polling",
                err
            );
            Box::new(PollCountdown::from_core(core))
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    fn manual(start_ms: i64) -> (ManualTimeSource, Arc<dyn TimeSource>) {
        let source = ManualTimeSource::starting_at(Timestamp::from_millis(start_ms));
        let shared: Arc<dyn TimeSource> = Arc::new(source.clone());
        (source, shared)
    }

    #[test]
    fn poll_countdown_ticks_and_fires_once() {
        let (clock, shared) = manual(0);
        let (tx, rx) = mpsc::channel();
        let countdown = PollCountdown::new(
            Timestamp::from_millis(10_000),
            shared,
            Box::new(move |event| tx.send(event).unwrap()),
        );

        countdown.poll();
        assert_eq!(rx.try_recv().unwrap(), CountdownEvent::Tick { remaining_ms: 10_000 });

        clock.set(Timestamp::from_millis(4_000));
        countdown.poll();
        assert_eq!(rx.try_recv().unwrap(), CountdownEvent::Tick { remaining_ms: 6_000 });

        clock.set(Timestamp::from_millis(10_000));
        countdown.poll();
        assert_eq!(rx.try_recv().unwrap(), CountdownEvent::TimeUp);
        assert!(countdown.has_fired());

        // Further polls deliver nothing: TimeUp is at-most-once.
        clock.set(Timestamp::from_millis(99_000));
        countdown.poll();
        countdown.poll();
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn remaining_is_never_negative() {
        let (clock, shared) = manual(50_000);
        let seen: Arc<Mutex<Vec<CountdownEvent>>> = Arc::default();
        let sink = seen.clone();
        let countdown = PollCountdown::new(
            Timestamp::from_millis(10_000), // already long past
            shared,
            Box::new(move |event| sink.lock().push(event)),
        );

        clock.advance_millis(1);
        countdown.poll();
        assert_eq!(seen.lock().as_slice(), &[CountdownEvent::TimeUp]);
    }

    #[test]
    fn visibility_regain_recomputes_immediately() {
        let (clock, shared) = manual(0);
        let (tx, rx) = mpsc::channel();
        let countdown = PollCountdown::new(
            Timestamp::from_millis(60_000),
            shared,
            Box::new(move |event| tx.send(event).unwrap()),
        );

        // Tab hidden, no polls for a long stretch; on regain the countdown
        // jumps straight to the true remaining value.
        clock.set(Timestamp::from_millis(59_000));
        countdown.on_visibility_regained();
        assert_eq!(rx.try_recv().unwrap(), CountdownEvent::Tick { remaining_ms: 1_000 });
    }

    #[test]
    fn stop_suppresses_further_events() {
        let (clock, shared) = manual(0);
        let (tx, rx) = mpsc::channel();
        let countdown = PollCountdown::new(
            Timestamp::from_millis(5_000),
            shared,
            Box::new(move |event| tx.send(event).unwrap()),
        );

        countdown.stop();
        clock.set(Timestamp::from_millis(9_000));
        countdown.poll();
        assert!(rx.try_recv().is_err());
        assert!(!countdown.has_fired());

        // Stopping again (and after expiry) is a no-op, not an error.
        countdown.stop();
    }

    #[test]
    fn worker_countdown_fires_in_real_time() {
        let (tx, rx) = mpsc::channel();
        let time: Arc<dyn TimeSource> = Arc::new(SystemTimeSource);
        let end = time.now().saturating_add_millis(60);
        let countdown = spawn_countdown(
            CountdownConfig {
                tick_interval: Duration::from_millis(5),
            },
            time,
            end,
            Box::new(move |event| {
                let _ = tx.send(event);
            }),
        );

        // Generous deadline: CI schedulers can stall the worker briefly.
        let fired = rx
            .iter()
            .take_while(|event| !matches!(event, CountdownEvent::TimeUp))
            .count();
        assert!(countdown.has_fired());
        // At least a few ticks happened before expiry.
        assert!(fired >= 1, "expected ticks before TimeUp, saw {}", fired);
    }

    #[test]
    fn worker_stop_ends_ticking() {
        let seen: Arc<Mutex<u32>> = Arc::default();
        let sink = seen.clone();
        let time: Arc<dyn TimeSource> = Arc::new(SystemTimeSource);
        let end = time.now().saturating_add_millis(10_000);
        let countdown = spawn_countdown(
            CountdownConfig {
                tick_interval: Duration::from_millis(5),
            },
            time,
            end,
            Box::new(move |_| {
                *sink.lock() += 1;
            }),
        );

        countdown.stop();
        thread::sleep(Duration::from_millis(30));
        let after_stop = *seen.lock();
        thread::sleep(Duration::from_millis(30));
        assert_eq!(*seen.lock(), after_stop, "ticks continued after stop");
        assert!(!countdown.has_fired());
    }

    #[test]
    fn manual_time_source_is_shared_across_clones() {
        let source = ManualTimeSource::starting_at(Timestamp::from_millis(5));
        let clone = source.clone();
        source.advance_millis(10);
        assert_eq!(clone.now(), Timestamp::from_millis(15));
        clone.set(Timestamp::from_millis(1));
        assert_eq!(source.now(), Timestamp::from_millis(1));
    }
}
