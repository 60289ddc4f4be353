//! The world orchestrator.
//!
//! [`GameWorld`] exclusively owns one entity store, one event bus, one
//! entity factory (with its optional type registry), one system scheduler,
//! one tick loop, and the persistence handle. There are no globals: every
//! host or test builds its own world.
//!
//! # Lifecycle
//!
//! ```text
//! new / headless ─▶ initialize ─▶ start ─▶ frame* ─▶ stop ─▶ shutdown
//!                        │                  ▲
//!                        └─▶ advance / step ┘   (headless, no wall clock)
//! ```
//!
//! Lifecycle misuse (initializing twice, starting a running loop, pausing
//! while paused, shutting down twice) logs a warning and does nothing.
//!
//! # Events
//!
//! The world emits `world:initialized`, `world:saved`, `world:loaded`,
//! `entity:created`, `entity:removed`, and `command:executed`, each with
//! source `"world"` (or `"command"` for commands).

use std::cell::RefCell;
use std::rc::Rc;
use std::thread;
use std::time::{Duration, Instant};

use realm_ecs::entity::{unix_millis, Components, Entity, EntityId, IdGenerator, TimestampIdGenerator};
use realm_ecs::event::{EventBus, GameEvent};
use realm_ecs::store::{EntityStore, IndexStats};
use realm_ecs::EcsError;
use realm_schema::factory::EntityFactory;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info, warn};

use crate::command::{CommandOutcome, CommandRequest};
use crate::persistence::{MemoryPersistence, Persistence};
use crate::snapshot::{SaveRecord, SaveSummary};
use crate::system::{Phase, System, SystemContext, SystemScheduler, SystemStats, TickContext};
use crate::tick::{TickConfig, TickLoop};
use crate::EngineError;

const WORLD_SOURCE: &str = "world";

// ---------------------------------------------------------------------------
// WorldConfig
// ---------------------------------------------------------------------------

/// Configuration for a [`GameWorld`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorldConfig {
    pub tick: TickConfig,
    /// Capacity of the event bus history ring.
    pub event_history_capacity: usize,
    /// No presentation attached; the host drives the world with
    /// `advance`/`step` or `run_for`.
    pub headless: bool,
    /// Validate factory-built entities when a type registry is attached.
    pub validate_on_create: bool,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            tick: TickConfig::default(),
            event_history_capacity: realm_ecs::event::DEFAULT_HISTORY_CAPACITY,
            headless: false,
            validate_on_create: true,
        }
    }
}

impl WorldConfig {
    /// Parse and validate a config from JSON. Missing fields take their
    /// defaults.
    pub fn from_json_str(json: &str) -> Result<Self, EngineError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), EngineError> {
        self.tick.validate()
    }
}

// ---------------------------------------------------------------------------
// WorldStats
// ---------------------------------------------------------------------------

/// Point-in-time summary of a world.
#[derive(Debug, Clone, Serialize)]
pub struct WorldStats {
    pub entity_count: usize,
    pub indices: IndexStats,
    pub systems: Vec<SystemStats>,
    pub tick_count: u64,
    pub total_time: Duration,
    pub fps: f64,
    pub initialized: bool,
    pub running: bool,
    pub paused: bool,
    pub event_history_len: usize,
}

// ---------------------------------------------------------------------------
// GameWorld
// ---------------------------------------------------------------------------

/// Owns and drives every runtime component.
pub struct GameWorld {
    config: WorldConfig,
    store: EntityStore,
    events: EventBus,
    factory: EntityFactory,
    scheduler: SystemScheduler,
    tick_loop: TickLoop,
    persistence: Box<dyn Persistence>,
    save_ids: TimestampIdGenerator,
    initialized: bool,
    paused: bool,
    shut_down: bool,
}

impl GameWorld {
    /// Build a world over `persistence`, rejecting a config that fails
    /// [`WorldConfig::validate`].
    pub fn try_new(config: WorldConfig, persistence: Box<dyn Persistence>) -> Result<Self, EngineError> {
        config.validate()?;
        Ok(Self::new(config, persistence))
    }

    /// Build a world over `persistence`. Nothing is loaded until
    /// [`initialize`](Self::initialize).
    ///
    /// # Panics
    ///
    /// Panics if `config.tick.fixed_dt` is zero. Use
    /// [`try_new`](Self::try_new) for configs from outside the program.
    pub fn new(config: WorldConfig, persistence: Box<dyn Persistence>) -> Self {
        let mut factory = EntityFactory::new();
        factory.set_validate_on_create(config.validate_on_create);
        Self {
            store: EntityStore::new(),
            events: EventBus::with_history_capacity(config.event_history_capacity),
            factory,
            scheduler: SystemScheduler::new(),
            tick_loop: TickLoop::new(config.tick),
            persistence,
            save_ids: TimestampIdGenerator::new(),
            initialized: false,
            paused: false,
            shut_down: false,
            config,
        }
    }

    /// A headless world over fresh in-memory persistence.
    pub fn headless() -> Self {
        let config = WorldConfig {
            headless: true,
            ..WorldConfig::default()
        };
        Self::new(config, Box::new(MemoryPersistence::new()))
    }

    // -- lifecycle ----------------------------------------------------------

    /// Load persisted entities, initialize registered systems, and emit
    /// `world:initialized`. A second call warns and does nothing.
    pub fn initialize(&mut self) -> Result<(), EngineError> {
        if self.initialized {
            warn!("world already initialized; initialize ignored");
            return Ok(());
        }

        let entities = self.persistence.load_entities()?;
        let mut loaded = 0usize;
        for entity in entities {
            match self.store.add(entity) {
                Ok(()) => loaded += 1,
                Err(EcsError::DuplicateEntity { id }) => {
                    warn!(entity_id = %id, "duplicate persisted entity skipped");
                }
            }
        }

        let mut ctx = SystemContext {
            store: &mut self.store,
            events: &self.events,
        };
        self.scheduler.initialize(&mut ctx);
        self.initialized = true;

        info!(entities = loaded, systems = self.scheduler.len(), "world initialized");
        self.events.emit(
            "world:initialized",
            json!({ "entities": loaded, "systems": self.scheduler.len() }),
            Some(WORLD_SOURCE),
        );
        Ok(())
    }

    /// Start the wall-clock loop. Returns `false` if already running or
    /// shut down.
    pub fn start(&mut self, now: Instant) -> bool {
        if self.shut_down {
            warn!("world is shut down; start ignored");
            return false;
        }
        if !self.initialized {
            warn!("starting a world that was never initialized");
        }
        self.tick_loop.start(now)
    }

    /// Stop the wall-clock loop after the in-flight tick.
    pub fn stop(&mut self) -> bool {
        self.tick_loop.stop()
    }

    /// Keep ticking but skip system dispatch.
    pub fn pause(&mut self) -> bool {
        if self.paused {
            warn!("world already paused; pause ignored");
            return false;
        }
        self.paused = true;
        info!(tick_count = self.tick_loop.tick_count(), "world paused");
        true
    }

    pub fn resume(&mut self) -> bool {
        if !self.paused {
            warn!("world is not paused; resume ignored");
            return false;
        }
        self.paused = false;
        info!(tick_count = self.tick_loop.tick_count(), "world resumed");
        true
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn is_running(&self) -> bool {
        self.tick_loop.is_active()
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    // -- driving ------------------------------------------------------------

    /// Process one wall-clock frame. Ticks only while the loop is running.
    pub fn frame(&mut self, now: Instant) -> u32 {
        let Self {
            tick_loop,
            scheduler,
            store,
            events,
            paused,
            ..
        } = self;
        tick_loop.frame(now, |tick| dispatch(scheduler, store, events, *paused, tick))
    }

    /// Advance simulated time by `elapsed` without consulting the wall
    /// clock. Ticks whether or not the loop is running.
    pub fn advance(&mut self, elapsed: Duration) -> u32 {
        let Self {
            tick_loop,
            scheduler,
            store,
            events,
            paused,
            ..
        } = self;
        tick_loop.advance(elapsed, |tick| dispatch(scheduler, store, events, *paused, tick))
    }

    /// Run exactly one tick.
    pub fn step(&mut self) -> u32 {
        self.advance(self.tick_loop.fixed_dt())
    }

    /// Block for `duration`, running frames at the tick rate. Starts the
    /// loop if needed and stops it again afterwards if it was started here.
    /// Returns the number of ticks run.
    pub fn run_for(&mut self, duration: Duration) -> u64 {
        let started_here = !self.tick_loop.is_active();
        let begin = Instant::now();
        if started_here && !self.start(begin) {
            return 0;
        }

        let deadline = begin + duration;
        let mut ticks = 0u64;
        loop {
            let now = Instant::now();
            if now >= deadline || !self.tick_loop.is_active() {
                break;
            }
            ticks += u64::from(self.frame(now));
            thread::sleep(self.tick_loop.fixed_dt().min(deadline - now));
        }
        ticks += u64::from(self.frame(deadline.max(Instant::now())));

        if started_here && self.tick_loop.is_active() {
            self.tick_loop.stop();
        }
        ticks
    }

    // -- commands -----------------------------------------------------------

    /// Dispatch a parsed command through the event bus.
    ///
    /// Emits `command:executed` with `{command, args}` and collects every
    /// event emitted while handlers run, nested emits included, in the
    /// order they were delivered. Fails for an empty command name or when
    /// any handler returned an error.
    pub fn execute_command(&mut self, request: CommandRequest) -> CommandOutcome {
        let command = request.command.trim().to_owned();
        if command.is_empty() {
            return CommandOutcome {
                success: false,
                message: "empty command".to_owned(),
                events: Vec::new(),
            };
        }

        let collected: Rc<RefCell<Vec<GameEvent>>> = Rc::default();
        let sink = Rc::clone(&collected);
        let tap = self.events.subscribe_all(i32::MIN, move |_, event| {
            sink.borrow_mut().push(event.clone());
            Ok(())
        });

        let report = self.events.emit(
            "command:executed",
            json!({ "command": command, "args": request.args }),
            Some("command"),
        );
        self.events.unsubscribe(&tap);

        // The tap itself counts as one delivery.
        let handlers = report.delivered.saturating_sub(1);
        let events = collected.take();
        debug!(%command, handlers, failed = report.failed, events = events.len(), "command executed");

        let (success, message) = if report.failed > 0 {
            (
                false,
                format!("'{command}': {} of {handlers} handler(s) failed", report.failed),
            )
        } else if handlers == 0 {
            (true, format!("'{command}' executed with no handlers"))
        } else {
            (true, format!("'{command}' executed by {handlers} handler(s)"))
        };

        CommandOutcome {
            success,
            message,
            events,
        }
    }

    // -- entities -----------------------------------------------------------

    /// Create an entity from a template, insert it, and emit
    /// `entity:created`.
    pub fn spawn_from_template(
        &mut self,
        template_id: &str,
        overrides: Option<&Components>,
    ) -> Result<EntityId, EngineError> {
        let entity = self.factory.create_from_template(template_id, overrides)?;
        self.insert_spawned(entity)
    }

    /// Create an entity from raw type data, insert it, and emit
    /// `entity:created`.
    pub fn spawn_from_type(
        &mut self,
        entity_type: &str,
        components: Components,
    ) -> Result<EntityId, EngineError> {
        let entity = self.factory.create_from_type(entity_type, components)?;
        self.insert_spawned(entity)
    }

    /// Remove an entity and emit `entity:removed`. Unknown ids return
    /// `None` and emit nothing.
    pub fn despawn(&mut self, id: &str) -> Option<Entity> {
        let entity = self.store.remove(id)?;
        self.events.emit(
            "entity:removed",
            json!({ "id": entity.id, "type": entity.entity_type }),
            Some(WORLD_SOURCE),
        );
        Some(entity)
    }

    fn insert_spawned(&mut self, entity: Entity) -> Result<EntityId, EngineError> {
        let id = entity.id.clone();
        let payload = json!({ "id": id, "type": entity.entity_type });
        self.store.add(entity)?;
        self.events.emit("entity:created", payload, Some(WORLD_SOURCE));
        Ok(id)
    }

    // -- save / load --------------------------------------------------------

    /// Snapshot every entity and the loop counters. Returns the save id.
    ///
    /// The record is written first; only then is the persisted entity set
    /// replaced by the store's current contents.
    pub fn save(&mut self, name: &str) -> Result<String, EngineError> {
        let id = self.save_ids.next_id("save").to_string();
        let record = SaveRecord::new(
            id.clone(),
            name,
            unix_millis(),
            self.tick_loop.tick_count(),
            self.tick_loop.total_time().as_millis() as u64,
            self.store.iter().cloned().collect(),
        )?;
        let entity_count = record.entities.len();

        self.persistence.put_save(record.clone())?;
        self.persistence.clear_entities()?;
        self.persistence.bulk_put_entities(&record.entities)?;

        info!(save_id = %id, name, entities = entity_count, "world saved");
        self.events.emit(
            "world:saved",
            json!({ "id": id, "name": name, "entities": entity_count }),
            Some(WORLD_SOURCE),
        );
        Ok(id)
    }

    /// Replace the store's contents and loop counters with a save.
    ///
    /// Unknown ids fail with [`EngineError::SaveNotFound`]; a record whose
    /// hash does not match fails with [`EngineError::CorruptSave`]. Neither
    /// failure touches the store.
    pub fn load(&mut self, save_id: &str) -> Result<(), EngineError> {
        let record = self
            .persistence
            .get_save(save_id)?
            .ok_or_else(|| EngineError::SaveNotFound {
                id: save_id.to_owned(),
            })?;
        if !record.verify() {
            return Err(EngineError::CorruptSave {
                id: save_id.to_owned(),
            });
        }

        self.store.clear();
        let entity_count = record.entities.len();
        for entity in record.entities {
            if let Err(EcsError::DuplicateEntity { id }) = self.store.add(entity) {
                warn!(entity_id = %id, save_id, "duplicate entity in save skipped");
            }
        }
        self.tick_loop.restore_counters(record.tick_count);

        info!(save_id, entities = entity_count, tick_count = record.tick_count, "world loaded");
        self.events.emit(
            "world:loaded",
            json!({ "id": save_id, "entities": entity_count, "tick_count": record.tick_count }),
            Some(WORLD_SOURCE),
        );
        Ok(())
    }

    /// Every save known to persistence, oldest first.
    pub fn saves(&self) -> Result<Vec<SaveSummary>, EngineError> {
        Ok(self.persistence.all_saves()?)
    }

    // -- teardown -----------------------------------------------------------

    /// Stop the loop, clean up every system, clear the bus, and close
    /// persistence. A second call warns and does nothing.
    pub fn shutdown(&mut self) -> Result<(), EngineError> {
        if self.shut_down {
            warn!("world already shut down; shutdown ignored");
            return Ok(());
        }
        self.shut_down = true;

        if self.tick_loop.is_active() {
            self.tick_loop.stop();
        }
        let mut ctx = SystemContext {
            store: &mut self.store,
            events: &self.events,
        };
        self.scheduler.clear(&mut ctx);
        self.events.clear();
        self.persistence.close()?;
        info!(tick_count = self.tick_loop.tick_count(), "world shut down");
        Ok(())
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down
    }

    // -- introspection ------------------------------------------------------

    pub fn stats(&self) -> WorldStats {
        WorldStats {
            entity_count: self.store.count(),
            indices: self.store.index_stats(),
            systems: self.scheduler.stats(),
            tick_count: self.tick_loop.tick_count(),
            total_time: self.tick_loop.total_time(),
            fps: self.tick_loop.fps(),
            initialized: self.initialized,
            running: self.tick_loop.is_active(),
            paused: self.paused,
            event_history_len: self.events.history_len(),
        }
    }

    // -- accessors ----------------------------------------------------------

    pub fn config(&self) -> &WorldConfig {
        &self.config
    }

    pub fn store(&self) -> &EntityStore {
        &self.store
    }

    /// Direct store access for setup and tests. Entities inserted here
    /// bypass factory validation.
    pub fn store_mut(&mut self) -> &mut EntityStore {
        &mut self.store
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn factory(&self) -> &EntityFactory {
        &self.factory
    }

    pub fn factory_mut(&mut self) -> &mut EntityFactory {
        &mut self.factory
    }

    pub fn scheduler(&self) -> &SystemScheduler {
        &self.scheduler
    }

    pub fn tick_loop(&self) -> &TickLoop {
        &self.tick_loop
    }

    /// Register a system. If the world is already initialized the system
    /// is initialized lazily before its first update.
    pub fn register_system(&mut self, system: impl System + 'static, phase: Phase) -> Result<(), EngineError> {
        self.scheduler.register(system, phase)
    }

    /// Unregister a system, running its cleanup hook.
    pub fn unregister_system(&mut self, name: &str) -> bool {
        let mut ctx = SystemContext {
            store: &mut self.store,
            events: &self.events,
        };
        self.scheduler.unregister(name, &mut ctx)
    }

    pub fn enable_system(&mut self, name: &str) -> bool {
        self.scheduler.enable(name)
    }

    pub fn disable_system(&mut self, name: &str) -> bool {
        self.scheduler.disable(name)
    }
}

/// Run one tick through the scheduler unless paused. Paused ticks still
/// advance the loop's counters.
fn dispatch(
    scheduler: &mut SystemScheduler,
    store: &mut EntityStore,
    events: &EventBus,
    paused: bool,
    tick: &TickContext,
) {
    if paused {
        return;
    }
    let mut ctx = SystemContext { store, events };
    scheduler.run_tick(&mut ctx, tick);
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use realm_ecs::entity::SequentialIdGenerator;
    use realm_schema::prelude::*;

    /// Adds 1 to `stats.ticks` on every entity carrying stats.
    struct Ager;

    impl System for Ager {
        fn name(&self) -> &str {
            "ager"
        }

        fn update(&mut self, ctx: &mut SystemContext<'_>, _tick: &TickContext) -> anyhow::Result<()> {
            let ids: Vec<EntityId> = ctx.store.by_component("stats").iter().map(|e| e.id.clone()).collect();
            for id in ids {
                ctx.store.update_with(id.as_str(), |e| {
                    if let Some(stats) = e.component_mut("stats") {
                        let ticks = stats["ticks"].as_u64().unwrap_or(0);
                        stats["ticks"] = json!(ticks + 1);
                    }
                });
            }
            Ok(())
        }
    }

    fn world() -> GameWorld {
        let mut world = GameWorld::headless();
        world
            .factory_mut()
            .set_id_generator(SequentialIdGenerator::new("w"));
        world
    }

    // -- 1. Lifecycle --

    #[test]
    fn initialize_loads_persisted_entities_once() {
        let db = MemoryPersistence::with_entities([Entity::new("old", "npc")]);
        let mut world = GameWorld::new(WorldConfig::default(), Box::new(db));
        world.initialize().unwrap();
        world.initialize().unwrap();

        assert_eq!(world.store().count(), 1);
        assert_eq!(world.events().history(Some("world:initialized"), None).len(), 1);
    }

    #[test]
    fn lifecycle_misuse_is_a_noop() {
        let mut world = world();
        let now = Instant::now();
        assert!(world.start(now));
        assert!(!world.start(now));
        assert!(world.pause());
        assert!(!world.pause());
        assert!(world.resume());
        assert!(!world.resume());
        assert!(world.stop());
        assert!(!world.stop());
    }

    #[test]
    fn shutdown_is_idempotent_and_blocks_start() {
        let mut world = world();
        world.initialize().unwrap();
        world.shutdown().unwrap();
        world.shutdown().unwrap();
        assert!(world.is_shut_down());
        assert!(!world.start(Instant::now()));
    }

    // -- 2. Ticking --

    #[test]
    fn step_dispatches_to_systems() {
        let mut world = world();
        world
            .store_mut()
            .add(Entity::new("cat", "npc").with_component("stats", json!({})))
            .unwrap();
        world.register_system(Ager, Phase::Update).unwrap();
        world.initialize().unwrap();

        for _ in 0..3 {
            assert_eq!(world.step(), 1);
        }
        assert_eq!(world.store().get("cat").unwrap().components["stats"]["ticks"], json!(3));
        assert_eq!(world.stats().tick_count, 3);
    }

    #[test]
    fn paused_ticks_advance_counters_without_dispatch() {
        let mut world = world();
        world
            .store_mut()
            .add(Entity::new("cat", "npc").with_component("stats", json!({})))
            .unwrap();
        world.register_system(Ager, Phase::Update).unwrap();
        world.initialize().unwrap();

        world.pause();
        world.step();
        world.step();
        assert_eq!(world.stats().tick_count, 2);
        assert!(world.store().get("cat").unwrap().components["stats"].get("ticks").is_none());

        world.resume();
        world.step();
        assert_eq!(world.store().get("cat").unwrap().components["stats"]["ticks"], json!(1));
    }

    #[test]
    fn frames_need_a_running_loop() {
        let mut world = world();
        world.initialize().unwrap();
        let t0 = Instant::now();
        assert_eq!(world.frame(t0 + Duration::from_millis(100)), 0);

        world.start(t0);
        let dt = world.tick_loop().fixed_dt();
        assert_eq!(world.frame(t0 + dt * 3), 3);
    }

    // -- 3. Commands --

    #[test]
    fn empty_command_fails_without_emitting() {
        let mut world = world();
        let outcome = world.execute_command(CommandRequest::new("   "));
        assert!(!outcome.success);
        assert!(outcome.events.is_empty());
        assert!(world.events().history(Some("command:executed"), None).is_empty());
    }

    #[test]
    fn command_collects_nested_events_and_removes_tap() {
        let mut world = world();
        world.events().subscribe("command:executed", 0, |bus, event| {
            if event.data["command"] == "shout" {
                bus.emit("chat:said", json!({"text": event.data["args"][0]}), Some("chat"));
            }
            Ok(())
        });

        let outcome = world.execute_command(CommandRequest::new("shout").with_arg("hi"));
        assert!(outcome.success, "{}", outcome.message);
        let types: Vec<_> = outcome.events.iter().map(|e| e.event_type.as_str()).collect();
        assert_eq!(types, vec!["chat:said", "command:executed"]);
        assert_eq!(world.events().tap_count(), 0);
    }

    #[test]
    fn failing_handler_fails_the_command() {
        let mut world = world();
        world
            .events()
            .subscribe("command:executed", 0, |_, _| anyhow::bail!("not today"));
        let outcome = world.execute_command(CommandRequest::new("dance"));
        assert!(!outcome.success);
        assert!(outcome.message.contains("1 of 1"));
    }

    // -- 4. Spawning --

    #[test]
    fn spawn_and_despawn_emit_events() {
        let mut world = world();
        world
            .factory_mut()
            .register_template(EntityTemplate::new("rat", "monster").with_component("stats", json!({"health": 2})))
            .unwrap();

        let id = world.spawn_from_template("rat", None).unwrap();
        assert_eq!(id.as_str(), "w-1");
        assert!(world.store().contains(id.as_str()));
        assert!(world.despawn(id.as_str()).is_some());
        assert!(world.despawn(id.as_str()).is_none());

        assert_eq!(world.events().history(Some("entity:created"), None).len(), 1);
        let removed = world.events().history(Some("entity:removed"), None);
        assert_eq!(removed.len(), 1);
        assert_eq!(removed[0].data["id"], json!("w-1"));
    }

    #[test]
    fn spawn_validation_failure_inserts_nothing() {
        let mut world = world();
        let mut registry = TypeRegistry::new();
        registry
            .register(EntityTypeDefinition::new("npc").require("stats"))
            .unwrap();
        world.factory_mut().attach_registry(registry);

        let err = world.spawn_from_type("npc", Components::new()).unwrap_err();
        assert!(matches!(err, EngineError::Schema(SchemaError::ValidationFailed { .. })));
        assert!(world.store().is_empty());
        assert!(world.events().history(Some("entity:created"), None).is_empty());
    }

    // -- 5. Config --

    #[test]
    fn config_from_partial_json() {
        let config = WorldConfig::from_json_str(r#"{"headless": true, "tick": {"fixed_dt_us": 50000}}"#).unwrap();
        assert!(config.headless);
        assert_eq!(config.tick.fixed_dt, Duration::from_millis(50));
        assert_eq!(config.event_history_capacity, 1000);
        assert!(config.validate_on_create);
    }

    #[test]
    fn unusable_config_is_an_error_not_a_panic() {
        let err = WorldConfig::from_json_str(r#"{"tick": {"fixed_dt_us": 0}}"#).unwrap_err();
        assert!(matches!(err, EngineError::Json(_)), "{err}");

        let err = WorldConfig::from_json_str(r#"{"tick": {"max_catch_up_ticks": 0}}"#).unwrap_err();
        assert!(matches!(err, EngineError::InvalidConfig { .. }), "{err}");

        let mut config = WorldConfig::default();
        config.tick.fixed_dt = Duration::ZERO;
        let result = GameWorld::try_new(config, Box::new(MemoryPersistence::new()));
        assert!(matches!(result, Err(EngineError::InvalidConfig { .. })));
    }

    #[test]
    fn validate_on_create_false_skips_validation() {
        let config = WorldConfig {
            validate_on_create: false,
            ..WorldConfig::default()
        };
        let mut world = GameWorld::new(config, Box::new(MemoryPersistence::new()));
        let mut registry = TypeRegistry::new();
        registry
            .register(EntityTypeDefinition::new("npc").require("stats"))
            .unwrap();
        world.factory_mut().attach_registry(registry);
        assert!(world.spawn_from_type("npc", Components::new()).is_ok());
    }
}
