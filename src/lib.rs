mod agent;
mod behavior;
mod settings;
mod spatial;
mod spawner;

pub use agent::*;
pub use behavior::{
    move_towards, step_agent, try_consume, ConsumedThisTick, StepCtx, StepOutcome,
    HUNGER_DECAY_STEP,
};
pub use settings::{FoodParams, KindParams, Settings};
pub use spatial::SpatialMap;
pub use spawner::{
    birth_system, food_spawn_system, initial_spawn_system, spawn_animal, Birth, BirthQueue,
    FoodSpawnTimer,
};

use bevy::app::{App, Plugin, Startup, Update};
use bevy::ecs::prelude::*;
use parry2d::na::Point2;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::time::Duration;
use tracing::{debug, info};

/// Caller-supplied tick timing. `delta` is set by [`step`] before every
/// update; `elapsed` is accumulated simulated time.
#[derive(Resource, Clone, Copy, Debug, Default)]
pub struct SimTime {
    pub delta: f32,
    pub elapsed: f32,
}

/// The simulation RNG. Seeded from [`Settings::seed`] at startup so runs
/// are reproducible; tests may insert their own.
#[derive(Resource)]
pub struct SimRng(pub StdRng);

impl Default for SimRng {
    fn default() -> Self {
        SimRng(StdRng::seed_from_u64(0))
    }
}

/// Rectangular arena used for random destinations, food placement and
/// prey clamping.
#[derive(Resource, Clone, Copy, Debug)]
pub struct ArenaBounds {
    pub min: Point2<f32>,
    pub max: Point2<f32>,
}

impl Default for ArenaBounds {
    fn default() -> Self {
        ArenaBounds {
            min: Point2::new(-10.0, -10.0),
            max: Point2::new(10.0, 10.0),
        }
    }
}

impl ArenaBounds {
    pub fn clamp(&self, point: Point2<f32>) -> Point2<f32> {
        Point2::new(
            point.x.clamp(self.min.x, self.max.x),
            point.y.clamp(self.min.y, self.max.y),
        )
    }

    pub fn random_point(&self, rng: &mut StdRng) -> Point2<f32> {
        Point2::new(
            rng.random_range(self.min.x..self.max.x),
            rng.random_range(self.min.y..self.max.y),
        )
    }
}

/// External overlap notification, the second trigger of the consume edge
/// next to the Seeking proximity check. The driver may send these from
/// whatever collision detection it runs.
#[derive(Event, Debug, Clone, Copy)]
pub struct ContactEvent {
    pub agent: Entity,
    pub target: Entity,
}

#[derive(Resource, Default)]
struct CensusTimer {
    last_report: f32,
}

/// Advance simulated time and forget last tick's consumed set.
pub fn clock_system(mut time: ResMut<SimTime>, mut consumed: ResMut<ConsumedThisTick>) {
    time.elapsed += time.delta;
    consumed.0.clear();
}

/// Rebuild the per-kind spatial index from the live registry. Everything
/// after this system targets against this snapshot for the rest of the
/// tick.
pub fn update_spatial_map(
    mut spatial: ResMut<SpatialMap>,
    food: Query<(Entity, &Position), With<Food>>,
    animals: Query<(Entity, &AgentKind, &Position), With<Alive>>,
) {
    spatial.clear();
    for (entity, position) in food.iter() {
        spatial.insert(entity, Quarry::Food, position.0);
    }
    for (entity, kind, position) in animals.iter() {
        if let Some(class) = kind.hunted_as() {
            spatial.insert(entity, class, position.0);
        }
    }
}

/// Run one state-machine step for every live agent, in registry order,
/// and commit the outcomes (eaten targets despawn immediately, deaths
/// start the corpse grace period).
pub fn agent_update_system(
    mut commands: Commands,
    time: Res<SimTime>,
    settings: Res<Settings>,
    bounds: Res<ArenaBounds>,
    spatial: Res<SpatialMap>,
    mut consumed: ResMut<ConsumedThisTick>,
    mut births: ResMut<BirthQueue>,
    mut rng: ResMut<SimRng>,
    mut query: Query<
        (Entity, &AgentKind, &mut Agent, &mut Position, &mut Hunger, &mut Age),
        With<Alive>,
    >,
) {
    for (entity, &kind, mut agent, mut position, mut hunger, mut age) in query.iter_mut() {
        // An agent eaten earlier this tick no longer acts.
        if consumed.0.contains(&entity) {
            continue;
        }
        let mut ctx = StepCtx {
            params: settings.params(kind),
            settings: &settings,
            bounds: &bounds,
            spatial: &spatial,
            consumed: &mut consumed,
            births: &mut births,
            rng: &mut rng.0,
            now: time.elapsed,
            dt: time.delta,
        };
        let outcome = step_agent(kind, &mut agent, &mut position, &mut hunger, &mut age, &mut ctx);
        if let Some(target) = outcome.ate {
            debug!(?kind, ?target, "target consumed");
            commands.entity(target).despawn();
        }
        if outcome.died {
            debug!(?kind, age = age.0, hunger = hunger.0, "agent died");
            commands.entity(entity).remove::<Alive>().insert(DiedAt(time.elapsed));
        }
    }
}

/// Route external overlap notifications into the shared consume edge.
/// Stale events (dead toucher, wrong class, already-consumed target) are
/// dropped.
pub fn contact_system(
    mut commands: Commands,
    mut events: EventReader<ContactEvent>,
    time: Res<SimTime>,
    settings: Res<Settings>,
    bounds: Res<ArenaBounds>,
    spatial: Res<SpatialMap>,
    mut consumed: ResMut<ConsumedThisTick>,
    mut births: ResMut<BirthQueue>,
    mut rng: ResMut<SimRng>,
    mut query: Query<(&AgentKind, &mut Agent, &Position, &mut Hunger), With<Alive>>,
) {
    for event in events.read() {
        let Ok((&kind, mut agent, position, mut hunger)) = query.get_mut(event.agent) else {
            continue;
        };
        if consumed.0.contains(&event.agent) {
            continue;
        }
        // Contacts only consume what the toucher actually hunts.
        if spatial.class_of(event.target) != Some(kind.hunts()) {
            continue;
        }
        let mut ctx = StepCtx {
            params: settings.params(kind),
            settings: &settings,
            bounds: &bounds,
            spatial: &spatial,
            consumed: &mut consumed,
            births: &mut births,
            rng: &mut rng.0,
            now: time.elapsed,
            dt: time.delta,
        };
        if let Some(target) =
            try_consume(kind, &mut agent, position.0, &mut hunger, event.target, &mut ctx)
        {
            debug!(?kind, ?target, "target consumed on contact");
            commands.entity(target).despawn();
        }
    }
}

/// Sweep dead agents once their grace delay has elapsed.
pub fn corpse_despawn_system(
    mut commands: Commands,
    time: Res<SimTime>,
    settings: Res<Settings>,
    query: Query<(Entity, &DiedAt), Without<Alive>>,
) {
    for (entity, died_at) in query.iter() {
        if time.elapsed - died_at.0 >= settings.corpse_delay {
            commands.entity(entity).despawn();
        }
    }
}

/// Periodic population log line.
fn census_system(
    time: Res<SimTime>,
    settings: Res<Settings>,
    mut timer: ResMut<CensusTimer>,
    animals: Query<&AgentKind, With<Alive>>,
    food: Query<(), With<Food>>,
) {
    if time.elapsed - timer.last_report < settings.census_interval {
        return;
    }
    timer.last_report = time.elapsed;
    let mut prey = 0;
    let mut predators = 0;
    let mut apex = 0;
    for kind in animals.iter() {
        match kind {
            AgentKind::Prey => prey += 1,
            AgentKind::Predator => predators += 1,
            AgentKind::ApexPredator => apex += 1,
        }
    }
    info!(
        t = time.elapsed,
        prey,
        predators,
        apex,
        food = food.iter().count(),
        "census"
    );
}

fn seed_rng_system(mut commands: Commands, settings: Res<Settings>) {
    commands.insert_resource(SimRng(StdRng::seed_from_u64(settings.seed)));
}

/// Headless simulation wiring: resources, startup placement, and the
/// fixed per-tick system chain.
pub struct SimulationPlugin;

impl Plugin for SimulationPlugin {
    fn build(&self, app: &mut App) {
        app.init_resource::<Settings>()
            .init_resource::<SimTime>()
            .init_resource::<SimRng>()
            .init_resource::<ArenaBounds>()
            .init_resource::<SpatialMap>()
            .init_resource::<ConsumedThisTick>()
            .init_resource::<BirthQueue>()
            .init_resource::<FoodSpawnTimer>()
            .init_resource::<CensusTimer>()
            .add_event::<ContactEvent>()
            .add_systems(Startup, (seed_rng_system, initial_spawn_system).chain())
            .add_systems(
                Update,
                (
                    clock_system,
                    update_spatial_map,
                    agent_update_system,
                    contact_system,
                    birth_system,
                    food_spawn_system,
                    corpse_despawn_system,
                    census_system,
                )
                    .chain(),
            );
    }
}

/// The single external entry point: advance the whole simulation by one
/// tick of `delta` seconds.
pub fn step(app: &mut App, delta: f32) {
    app.world_mut().resource_mut::<SimTime>().delta = delta;
    app.update();
}

/// Run the simulation indefinitely at a fixed cadence.
pub fn run_app() {
    let mut app = App::new();
    app.add_plugins(SimulationPlugin);

    let dt = 1.0 / 30.0;
    loop {
        step(&mut app, dt);
        std::thread::sleep(Duration::from_secs_f32(dt));
    }
}
