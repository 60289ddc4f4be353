//! A short headless session: register types and templates, spawn a few
//! citizens, run a regen system for a while, issue commands, save, tamper
//! with the world, and load the save back.
//!
//! Run with `RUST_LOG=debug` for per-tick detail.

use std::time::Duration;

use anyhow::Context;
use realm_engine::logging::init_tracing;
use realm_engine::prelude::*;
use serde_json::json;
use tracing::info;

/// Restores one point of health per second to anything with `stats`.
struct Regen;

impl System for Regen {
    fn name(&self) -> &str {
        "regen"
    }

    fn update(&mut self, ctx: &mut SystemContext<'_>, _tick: &TickContext) -> anyhow::Result<()> {
        let ids: Vec<EntityId> = ctx.store.by_component("stats").iter().map(|e| e.id.clone()).collect();
        for id in ids {
            ctx.store.update_with(id.as_str(), |entity| {
                if let Some(stats) = entity.component_mut("stats") {
                    let health = stats["health"].as_i64().unwrap_or(0);
                    let max = stats["maxHealth"].as_i64().unwrap_or(health);
                    if health < max {
                        stats["health"] = json!(health + 1);
                    }
                }
            });
        }
        Ok(())
    }

    fn update_frequency(&self) -> u64 {
        60
    }
}

fn main() -> anyhow::Result<()> {
    init_tracing("info");

    let mut world = GameWorld::headless();

    let mut registry = TypeRegistry::new();
    registry.register(
        EntityTypeDefinition::new("npc").require("stats").require("position").with_schema(
            "stats",
            Schema::object()
                .with_property("health", Schema::integer(Some(0), None), true)
                .with_property("maxHealth", Schema::integer(Some(1), None), true),
        ),
    )?;
    world.factory_mut().attach_registry(registry);

    world.factory_mut().register_templates_from_json(&json!([
        {
            "id": "citizen",
            "type": "npc",
            "components": {
                "stats": { "health": 10, "maxHealth": 10 },
                "position": { "realm": "north", "city": "Karth" }
            }
        },
        {
            "id": "guard",
            "extends": "citizen",
            "components": { "stats": { "health": 20, "maxHealth": 20 }, "duty": "gate" }
        }
    ]))?;

    world.register_system(Regen, Phase::Update)?;
    world.initialize()?;

    world.events().subscribe("command:executed", 0, |bus, event| {
        if event.data["command"] == "shout" {
            bus.emit("chat:said", json!({ "text": event.data["args"][0] }), Some("chat"));
        }
        Ok(())
    });

    let guard = world.spawn_from_template("guard", None)?;
    let mut wounded = Components::new();
    wounded.insert("stats".into(), json!({ "health": 3 }));
    let citizen = world.spawn_from_template("citizen", Some(&wounded))?;
    info!(%guard, %citizen, "spawned");

    let ticks = world.advance(Duration::from_secs(3));
    info!(ticks, "advanced three seconds");

    let outcome = world.execute_command(CommandRequest::new("shout").with_arg("Open the gate!"));
    info!(success = outcome.success, events = outcome.events.len(), "{}", outcome.message);

    let save_id = world.save("after the shout")?;
    world.despawn(guard.as_str());
    world.load(&save_id).context("reloading the session save")?;

    let stats = world.stats();
    println!("{}", serde_json::to_string_pretty(&stats)?);
    for save in world.saves()? {
        println!("save {} '{}': {} entities at tick {}", save.id, save.name, save.entity_count, save.tick_count);
    }

    world.shutdown()?;
    Ok(())
}
