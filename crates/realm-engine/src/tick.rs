//! Fixed-timestep loop.
//!
//! The [`TickLoop`] turns irregular frame times into a whole number of
//! fixed-size ticks. Each frame:
//!
//! 1. The elapsed wall time is clamped to `max_catch_up_ticks × fixed_dt`,
//!    so a long stall cannot trigger an unbounded burst of ticks.
//! 2. The clamped time is added to an accumulator.
//! 3. While the accumulator holds at least one `fixed_dt`, one tick is
//!    subtracted and the tick callback runs.
//!
//! All arithmetic is on [`Duration`] (integer nanoseconds), so after any
//! sequence of frames the tick count is exactly
//! `floor(Σ clamp(delta) / fixed_dt)` and simulated time is exactly
//! `tick_count × fixed_dt`. Simulated time is computed, not accumulated.
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use realm_engine::tick::{TickConfig, TickLoop};
//!
//! let mut tick_loop = TickLoop::new(TickConfig {
//!     fixed_dt: Duration::from_millis(10),
//!     ..Default::default()
//! });
//!
//! let mut seen = Vec::new();
//! let ticks = tick_loop.advance(Duration::from_millis(35), |tick| seen.push(tick.tick_count));
//!
//! assert_eq!(ticks, 3);
//! assert_eq!(seen, vec![0, 1, 2]);
//! assert_eq!(tick_loop.accumulated(), Duration::from_millis(5));
//! assert_eq!(tick_loop.total_time(), Duration::from_millis(30));
//! ```

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::system::TickContext;
use crate::EngineError;

// ---------------------------------------------------------------------------
// TickConfig
// ---------------------------------------------------------------------------

/// Configuration for the fixed-timestep loop.
///
/// Durations are expressed in microseconds on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TickConfig {
    /// Length of one tick. Must be positive.
    #[serde(
        rename = "fixed_dt_us",
        serialize_with = "duration_micros::serialize",
        deserialize_with = "duration_micros::deserialize_positive"
    )]
    pub fixed_dt: Duration,
    /// Most ticks a single frame may produce.
    pub max_catch_up_ticks: u32,
    /// Trailing window over which [`TickLoop::fps`] counts frames.
    #[serde(rename = "fps_window_us", with = "duration_micros")]
    pub fps_window: Duration,
}

impl Default for TickConfig {
    /// 60 Hz, at most 10 catch-up ticks per frame, one-second FPS window.
    fn default() -> Self {
        Self {
            fixed_dt: Duration::from_micros(16_667),
            max_catch_up_ticks: 10,
            fps_window: Duration::from_secs(1),
        }
    }
}

impl TickConfig {
    /// A config ticking `hz` times per second, other fields default.
    ///
    /// # Panics
    ///
    /// Panics if `hz` is zero.
    pub fn from_hz(hz: u32) -> Self {
        assert!(hz > 0, "tick rate must be positive, got {hz}");
        Self {
            fixed_dt: Duration::from_secs(1) / hz,
            ..Self::default()
        }
    }

    /// Check the invariants [`TickLoop::new`] relies on.
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.fixed_dt.is_zero() {
            return Err(EngineError::InvalidConfig {
                reason: "tick.fixed_dt must be positive".into(),
            });
        }
        if self.max_catch_up_ticks == 0 {
            return Err(EngineError::InvalidConfig {
                reason: "tick.max_catch_up_ticks must be at least 1".into(),
            });
        }
        Ok(())
    }

    /// Largest elapsed time a single frame may feed into the accumulator.
    pub fn max_frame_time(&self) -> Duration {
        self.fixed_dt
            .checked_mul(self.max_catch_up_ticks)
            .unwrap_or(Duration::MAX)
    }
}

mod duration_micros {
    use std::time::Duration;

    use serde::de::Error as _;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_micros().min(u64::MAX as u128) as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_micros)
    }

    pub fn deserialize_positive<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        match u64::deserialize(d)? {
            0 => Err(D::Error::custom("duration must be positive")),
            us => Ok(Duration::from_micros(us)),
        }
    }
}

// ---------------------------------------------------------------------------
// TickLoop
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LoopState {
    Stopped,
    Running,
}

/// The fixed-timestep accumulator loop.
///
/// [`frame`](Self::frame) is the wall-clock entry point and only ticks while
/// running. [`advance`](Self::advance) takes an explicit elapsed time and
/// ticks regardless of state, for headless and deterministic stepping.
#[derive(Debug, Clone)]
pub struct TickLoop {
    config: TickConfig,
    state: LoopState,
    accumulator: Duration,
    tick_count: u64,
    last_frame: Option<Instant>,
    frame_times: VecDeque<Instant>,
}

impl TickLoop {
    /// Create a stopped loop at tick zero.
    ///
    /// # Panics
    ///
    /// Panics if `config.fixed_dt` is zero.
    pub fn new(config: TickConfig) -> Self {
        assert!(
            !config.fixed_dt.is_zero(),
            "fixed_dt must be positive, got {:?}",
            config.fixed_dt
        );
        Self {
            config,
            state: LoopState::Stopped,
            accumulator: Duration::ZERO,
            tick_count: 0,
            last_frame: None,
            frame_times: VecDeque::new(),
        }
    }

    /// Begin running from `now`. Returns `false` (and warns) if already
    /// running.
    pub fn start(&mut self, now: Instant) -> bool {
        if self.state == LoopState::Running {
            warn!("tick loop already running; start ignored");
            return false;
        }
        self.state = LoopState::Running;
        self.last_frame = Some(now);
        self.frame_times.clear();
        info!(fixed_dt = ?self.config.fixed_dt, "tick loop started");
        true
    }

    /// Stop running. Any pending frame is cancelled: later `frame` calls do
    /// nothing until the next `start`. Returns `false` (and warns) if
    /// already stopped.
    pub fn stop(&mut self) -> bool {
        if self.state == LoopState::Stopped {
            warn!("tick loop already stopped; stop ignored");
            return false;
        }
        self.state = LoopState::Stopped;
        self.last_frame = None;
        self.accumulator = Duration::ZERO;
        info!(tick_count = self.tick_count, "tick loop stopped");
        true
    }

    /// Process one frame at wall time `now`. Returns the number of ticks run.
    pub fn frame(&mut self, now: Instant, on_tick: impl FnMut(&TickContext)) -> u32 {
        let Some(last) = self.last_frame else {
            return 0;
        };
        let elapsed = now.saturating_duration_since(last);
        self.last_frame = Some(now);
        self.record_frame(now);
        self.advance(elapsed, on_tick)
    }

    /// Feed `elapsed` time into the accumulator and run every whole tick it
    /// now holds. Returns the number of ticks run.
    pub fn advance(&mut self, elapsed: Duration, mut on_tick: impl FnMut(&TickContext)) -> u32 {
        let max = self.config.max_frame_time();
        if elapsed > max {
            debug!(?elapsed, ?max, "frame time clamped");
        }
        self.accumulator += elapsed.min(max);

        let dt = self.config.fixed_dt;
        let mut ticks = 0;
        while self.accumulator >= dt {
            self.accumulator -= dt;
            let tick = TickContext {
                delta_time: dt,
                total_time: scaled(dt, self.tick_count + 1),
                tick_count: self.tick_count,
            };
            on_tick(&tick);
            self.tick_count += 1;
            ticks += 1;
        }
        ticks
    }

    /// Set the tick counter, e.g. after loading a save. Clears the
    /// accumulator.
    pub fn restore_counters(&mut self, tick_count: u64) {
        self.tick_count = tick_count;
        self.accumulator = Duration::ZERO;
    }

    // -- accessors ----------------------------------------------------------

    pub fn is_active(&self) -> bool {
        self.state == LoopState::Running
    }

    /// Frames per second over the trailing window. Independent of the tick
    /// rate.
    pub fn fps(&self) -> f64 {
        let window = self.config.fps_window.as_secs_f64();
        if window == 0.0 {
            return 0.0;
        }
        self.frame_times.len() as f64 / window
    }

    /// Ticks run so far.
    pub fn tick_count(&self) -> u64 {
        self.tick_count
    }

    /// Simulated time: `tick_count × fixed_dt`.
    pub fn total_time(&self) -> Duration {
        scaled(self.config.fixed_dt, self.tick_count)
    }

    pub fn fixed_dt(&self) -> Duration {
        self.config.fixed_dt
    }

    /// Time carried over toward the next tick. Always below `fixed_dt`.
    pub fn accumulated(&self) -> Duration {
        self.accumulator
    }

    pub fn config(&self) -> &TickConfig {
        &self.config
    }

    fn record_frame(&mut self, now: Instant) {
        self.frame_times.push_back(now);
        while let Some(&oldest) = self.frame_times.front() {
            if now.saturating_duration_since(oldest) > self.config.fps_window {
                self.frame_times.pop_front();
            } else {
                break;
            }
        }
    }
}

/// `dt × n` without the `u32` limit of `Duration`'s `Mul`.
fn scaled(dt: Duration, n: u64) -> Duration {
    let nanos = dt.as_nanos().saturating_mul(n as u128);
    match u64::try_from(nanos) {
        Ok(nanos) => Duration::from_nanos(nanos),
        Err(_) => Duration::MAX,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
