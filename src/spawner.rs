use crate::agent::{AgentBundle, AgentKind, Food, Position};
use crate::settings::Settings;
use crate::{ArenaBounds, SimRng, SimTime};
use bevy::ecs::prelude::*;
use parry2d::na::Point2;
use rand::rngs::StdRng;
use rand::Rng;
use tracing::{debug, info};

/// One reproduction spawn scheduled by a successful consume, decoupled
/// from the eater's own Eating timer.
#[derive(Debug, Clone, Copy)]
pub struct Birth {
    pub kind: AgentKind,
    pub position: Point2<f32>,
    /// Simulation instant at which the newborn appears.
    pub due: f32,
}

#[derive(Resource, Default)]
pub struct BirthQueue(pub Vec<Birth>);

/// Countdown to the next passive food spawn attempt. Re-armed with a
/// fresh random interval after every firing, capped or not.
#[derive(Resource, Default)]
pub struct FoodSpawnTimer {
    pub remaining: f32,
}

/// Spawn one animal with the given hunger range, starting out Walking
/// toward a random in-bounds destination.
pub fn spawn_animal(
    commands: &mut Commands,
    settings: &Settings,
    bounds: &ArenaBounds,
    rng: &mut StdRng,
    kind: AgentKind,
    position: Point2<f32>,
    hunger_range: (i32, i32),
) -> Entity {
    let hunger = rng.random_range(hunger_range.0..=hunger_range.1);
    let (lo, hi) = settings.spawn_idle_range;
    let idle_timer = rng.random_range(lo..hi);
    let target = bounds.random_point(rng);
    commands
        .spawn(AgentBundle::new(kind, position, hunger, idle_timer, target))
        .id()
}

/// Place the starting populations and the initial food, and arm the
/// food spawner.
pub fn initial_spawn_system(
    mut commands: Commands,
    settings: Res<Settings>,
    bounds: Res<ArenaBounds>,
    mut rng: ResMut<SimRng>,
    mut food_timer: ResMut<FoodSpawnTimer>,
) {
    let rng = &mut rng.0;
    for kind in [AgentKind::Prey, AgentKind::Predator, AgentKind::ApexPredator] {
        let params = settings.params(kind);
        for _ in 0..params.initial_count {
            let r = params.spawn_radius;
            let position = Point2::new(
                params.spawn_anchor.x + rng.random_range(-r..r),
                params.spawn_anchor.y + rng.random_range(-r..r),
            );
            spawn_animal(
                &mut commands,
                &settings,
                &bounds,
                rng,
                kind,
                position,
                params.initial_hunger,
            );
        }
        info!(?kind, count = params.initial_count, "initial population placed");
    }
    for _ in 0..settings.food.initial_count {
        let position = bounds.random_point(rng);
        commands.spawn((Food, Position(position)));
    }
    food_timer.remaining = rng.random_range(settings.food.min_spawn_time..settings.food.max_spawn_time);
}

/// Deliver reproduction spawns whose delay has elapsed. Animal births
/// are never suppressed on population count.
pub fn birth_system(
    mut commands: Commands,
    time: Res<SimTime>,
    settings: Res<Settings>,
    bounds: Res<ArenaBounds>,
    mut births: ResMut<BirthQueue>,
    mut rng: ResMut<SimRng>,
) {
    let now = time.elapsed;
    let pending = std::mem::take(&mut births.0);
    let (ready, pending): (Vec<Birth>, Vec<Birth>) =
        pending.into_iter().partition(|birth| birth.due <= now);
    births.0 = pending;

    for birth in ready {
        let params = settings.params(birth.kind);
        spawn_animal(
            &mut commands,
            &settings,
            &bounds,
            &mut rng.0,
            birth.kind,
            birth.position,
            params.reproduction_hunger,
        );
        info!(
            kind = ?birth.kind,
            x = birth.position.x,
            y = birth.position.y,
            "reproduction spawn"
        );
    }
}

/// Passive food spawner: when the countdown elapses, spawn one food item
/// at a random in-bounds position unless the cap is reached, then re-arm
/// with a fresh random interval either way.
pub fn food_spawn_system(
    mut commands: Commands,
    time: Res<SimTime>,
    settings: Res<Settings>,
    bounds: Res<ArenaBounds>,
    mut timer: ResMut<FoodSpawnTimer>,
    mut rng: ResMut<SimRng>,
    food: Query<(), With<Food>>,
) {
    timer.remaining -= time.delta;
    if timer.remaining > 0.0 {
        return;
    }

    if food.iter().count() < settings.food.max_count {
        let position = bounds.random_point(&mut rng.0);
        commands.spawn((Food, Position(position)));
        debug!(x = position.x, y = position.y, "food spawned");
    }
    timer.remaining = rng
        .0
        .random_range(settings.food.min_spawn_time..settings.food.max_spawn_time);
}
