//! The System contract and the phase-ordered scheduler.
//!
//! A [`System`] is a unit of per-tick game logic. The [`SystemScheduler`]
//! owns every registered system and runs them once per tick:
//!
//! 1. Phases run in [`Phase::ALL`] order.
//! 2. Within a phase, enabled systems run in registration order.
//! 3. A system with update frequency `n` runs on ticks where
//!    `tick_count % n == 0`.
//!
//! A failing hook is logged and counted against that system only. Siblings,
//! later phases, and the tick loop itself keep running.
//!
//! Systems never hold references into the store across ticks: the store is
//! lent through [`SystemContext`] for the duration of one hook call, so
//! entities must be re-fetched by id every tick.

use std::fmt;
use std::time::{Duration, Instant};

use realm_ecs::event::EventBus;
use realm_ecs::store::EntityStore;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, warn};

use crate::EngineError;

// ---------------------------------------------------------------------------
// Phase
// ---------------------------------------------------------------------------

/// Execution phase within a tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Phase {
    PreUpdate,
    EarlyUpdate,
    Update,
    LateUpdate,
    PostUpdate,
}

impl Phase {
    /// Every phase, in run order.
    pub const ALL: [Phase; 5] = [
        Phase::PreUpdate,
        Phase::EarlyUpdate,
        Phase::Update,
        Phase::LateUpdate,
        Phase::PostUpdate,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Phase::PreUpdate => "pre_update",
            Phase::EarlyUpdate => "early_update",
            Phase::Update => "update",
            Phase::LateUpdate => "late_update",
            Phase::PostUpdate => "post_update",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// TickContext / SystemContext
// ---------------------------------------------------------------------------

/// Timing for one fixed tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TickContext {
    /// The fixed step. Identical for every tick of a loop.
    pub delta_time: Duration,
    /// Simulated time at the end of this tick.
    pub total_time: Duration,
    /// Zero-based index of this tick.
    pub tick_count: u64,
}

impl TickContext {
    pub fn delta_ms(&self) -> f64 {
        self.delta_time.as_secs_f64() * 1000.0
    }

    pub fn total_ms(&self) -> f64 {
        self.total_time.as_secs_f64() * 1000.0
    }
}

/// What a system hook may touch.
pub struct SystemContext<'a> {
    pub store: &'a mut EntityStore,
    pub events: &'a EventBus,
}

// ---------------------------------------------------------------------------
// System
// ---------------------------------------------------------------------------

/// Per-tick game logic.
///
/// Only [`name`](System::name) and [`update`](System::update) are required.
pub trait System {
    /// Unique name within a scheduler.
    fn name(&self) -> &str;

    /// Called once before the first update.
    fn initialize(&mut self, _ctx: &mut SystemContext<'_>) -> anyhow::Result<()> {
        Ok(())
    }

    /// Called on every tick the system is due.
    fn update(&mut self, ctx: &mut SystemContext<'_>, tick: &TickContext) -> anyhow::Result<()>;

    /// Called when the system is unregistered or the scheduler is cleared.
    fn cleanup(&mut self, _ctx: &mut SystemContext<'_>) -> anyhow::Result<()> {
        Ok(())
    }

    /// Run every `n` ticks. Zero is treated as one. Read again before every
    /// tick, so a system may change its own rate.
    fn update_frequency(&self) -> u64 {
        1
    }
}

// ---------------------------------------------------------------------------
// SystemStats
// ---------------------------------------------------------------------------

/// Registration state and counters for one system.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SystemStats {
    pub name: String,
    pub phase: Phase,
    pub enabled: bool,
    pub initialized: bool,
    pub update_frequency: u64,
    /// Completed update calls, successful or not.
    pub update_count: u64,
    /// Update calls that returned an error.
    pub error_count: u64,
    /// Wall-clock time spent in update calls.
    pub total_time: Duration,
    /// Tick of the most recent update call.
    pub last_update_tick: Option<u64>,
}

/// Outcome of one [`SystemScheduler::run_tick`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunReport {
    /// Systems whose update ran.
    pub ran: usize,
    /// Of those, how many returned an error.
    pub failed: usize,
}

struct Registration {
    system: Box<dyn System>,
    stats: SystemStats,
}

impl Registration {
    fn initialize(&mut self, ctx: &mut SystemContext<'_>) {
        match self.system.initialize(ctx) {
            Ok(()) => {
                self.stats.initialized = true;
                debug!(system = %self.stats.name, "system initialized");
            }
            Err(err) => {
                self.stats.enabled = false;
                self.stats.error_count += 1;
                error!(
                    system = %self.stats.name,
                    error = %err,
                    "system initialize failed; system disabled"
                );
            }
        }
    }

    fn cleanup(&mut self, ctx: &mut SystemContext<'_>) {
        if !self.stats.initialized {
            return;
        }
        if let Err(err) = self.system.cleanup(ctx) {
            error!(system = %self.stats.name, error = %err, "system cleanup failed");
        }
        self.stats.initialized = false;
    }
}

// ---------------------------------------------------------------------------
// SystemScheduler
// ---------------------------------------------------------------------------

/// Owns registered systems and runs them phase by phase.
#[derive(Default)]
pub struct SystemScheduler {
    systems: Vec<Registration>,
}

impl fmt::Debug for SystemScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SystemScheduler")
            .field("systems", &self.names())
            .finish()
    }
}

impl SystemScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a system in a phase. Names must be unique.
    pub fn register(&mut self, system: impl System + 'static, phase: Phase) -> Result<(), EngineError> {
        self.register_boxed(Box::new(system), phase)
    }

    /// Register an already boxed system.
    pub fn register_boxed(&mut self, system: Box<dyn System>, phase: Phase) -> Result<(), EngineError> {
        let name = system.name().to_owned();
        if self.position(&name).is_some() {
            return Err(EngineError::DuplicateSystem { name });
        }
        let stats = SystemStats {
            name: name.clone(),
            phase,
            enabled: true,
            initialized: false,
            update_frequency: system.update_frequency().max(1),
            update_count: 0,
            error_count: 0,
            total_time: Duration::ZERO,
            last_update_tick: None,
        };
        self.systems.push(Registration { system, stats });
        debug!(system = %name, %phase, "system registered");
        Ok(())
    }

    /// Remove a system, running its cleanup hook if it was initialized.
    pub fn unregister(&mut self, name: &str, ctx: &mut SystemContext<'_>) -> bool {
        let Some(index) = self.position(name) else {
            return false;
        };
        let mut registration = self.systems.remove(index);
        registration.cleanup(ctx);
        debug!(system = name, "system unregistered");
        true
    }

    /// Enable a system. Takes effect from the next tick.
    pub fn enable(&mut self, name: &str) -> bool {
        self.set_enabled(name, true)
    }

    /// Disable a system. Takes effect from the next tick.
    pub fn disable(&mut self, name: &str) -> bool {
        self.set_enabled(name, false)
    }

    /// Whether `name` is registered and enabled.
    pub fn is_enabled(&self, name: &str) -> bool {
        self.get(name).is_some_and(|r| r.stats.enabled)
    }

    /// Initialize every enabled system that is not yet initialized. A
    /// system whose initialize fails is disabled.
    pub fn initialize(&mut self, ctx: &mut SystemContext<'_>) {
        for registration in &mut self.systems {
            if registration.stats.enabled && !registration.stats.initialized {
                registration.initialize(ctx);
            }
        }
    }

    /// Run one tick across every phase.
    pub fn run_tick(&mut self, ctx: &mut SystemContext<'_>, tick: &TickContext) -> RunReport {
        let mut report = RunReport::default();
        for phase in Phase::ALL {
            for registration in self.systems.iter_mut().filter(|r| r.stats.phase == phase) {
                registration.stats.update_frequency = registration.system.update_frequency().max(1);
                if !registration.stats.enabled
                    || tick.tick_count % registration.stats.update_frequency != 0
                {
                    continue;
                }
                if !registration.stats.initialized {
                    registration.initialize(ctx);
                    if !registration.stats.initialized {
                        continue;
                    }
                }

                let started = Instant::now();
                let result = registration.system.update(ctx, tick);
                let stats = &mut registration.stats;
                stats.total_time += started.elapsed();
                stats.update_count += 1;
                stats.last_update_tick = Some(tick.tick_count);
                report.ran += 1;

                if let Err(err) = result {
                    stats.error_count += 1;
                    report.failed += 1;
                    error!(
                        system = %stats.name,
                        %phase,
                        tick = tick.tick_count,
                        error = %err,
                        "system update failed"
                    );
                }
            }
        }
        report
    }

    /// Clean up and drop every system.
    pub fn clear(&mut self, ctx: &mut SystemContext<'_>) {
        for mut registration in self.systems.drain(..) {
            registration.cleanup(ctx);
        }
    }

    /// Counters for every system, in registration order.
    pub fn stats(&self) -> Vec<SystemStats> {
        self.systems.iter().map(|r| r.stats.clone()).collect()
    }

    /// Counters for one system.
    pub fn system_stats(&self, name: &str) -> Option<&SystemStats> {
        self.get(name).map(|r| &r.stats)
    }

    pub fn len(&self) -> usize {
        self.systems.len()
    }

    pub fn is_empty(&self) -> bool {
        self.systems.is_empty()
    }

    /// Registered names, in registration order.
    pub fn names(&self) -> Vec<&str> {
        self.systems.iter().map(|r| r.stats.name.as_str()).collect()
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.systems.iter().position(|r| r.stats.name == name)
    }

    fn get(&self, name: &str) -> Option<&Registration> {
        self.systems.iter().find(|r| r.stats.name == name)
    }

    fn set_enabled(&mut self, name: &str, enabled: bool) -> bool {
        match self.systems.iter_mut().find(|r| r.stats.name == name) {
            Some(registration) => {
                registration.stats.enabled = enabled;
                true
            }
            None => {
                warn!(system = name, "enable/disable on unknown system ignored");
                false
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
