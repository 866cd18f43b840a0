use crate::agent::AgentKind;
use bevy::ecs::prelude::*;
use parry2d::na::Point2;

/// Behavior tunables for one animal kind.
///
/// Out-of-range values (negative speeds, inverted ranges) are a caller
/// contract violation and are not validated at runtime.
#[derive(Clone, Copy, Debug)]
pub struct KindParams {
    /// Movement speed in world units per second.
    pub speed: f32,
    /// Seconds of walking before a new random destination is picked.
    pub change_direction_time: f32,
    /// Duration of the Eating state; also the reproduction delay.
    pub eating_time: f32,
    /// Seconds between hunger decay steps.
    pub hunger_decrease_interval: f32,
    /// Hunger level at or below which Prey starts foraging, or strictly
    /// below which a predator both hunts and is allowed to consume.
    pub hunger_threshold: i32,
    /// Whether consumption is gated on `hunger < hunger_threshold`.
    /// Prey eats on any contact; predators only eat while hungry.
    pub gated_consume: bool,
    /// Hard age cutoff in seconds.
    pub max_lifetime: f32,
    /// Idle duration range re-armed when leaving Idle for Walking.
    pub idle_after_walk: (f32, f32),
    /// Idle duration range entered when Eating completes.
    pub idle_after_eating: (f32, f32),
    /// Population placed at startup.
    pub initial_count: usize,
    /// Center of the square spawn area used for initial placement.
    pub spawn_anchor: Point2<f32>,
    /// Half-extent of the square spawn area around the spawner anchor.
    pub spawn_radius: f32,
    /// Inclusive hunger range for initial spawns.
    pub initial_hunger: (i32, i32),
    /// Inclusive hunger range for reproduction spawns.
    pub reproduction_hunger: (i32, i32),
}

/// Tunables for the passive food spawner.
#[derive(Clone, Copy, Debug)]
pub struct FoodParams {
    pub min_spawn_time: f32,
    pub max_spawn_time: f32,
    pub max_count: usize,
    pub initial_count: usize,
}

#[derive(Resource, Clone, Debug)]
pub struct Settings {
    /// Seed for the simulation RNG; identical seeds replay identical runs.
    pub seed: u64,
    pub prey: KindParams,
    pub predator: KindParams,
    pub apex: KindParams,
    pub food: FoodParams,
    /// Distance below which a seeking agent attempts to consume its target.
    pub eat_distance: f32,
    /// Hunger restored by one consumed target, clamped to 100.
    pub hunger_restore: i32,
    /// Seconds a dead agent lingers before its entity is removed.
    pub corpse_delay: f32,
    /// Initial idle countdown range shared by all kinds at spawn.
    pub spawn_idle_range: (f32, f32),
    /// Seconds of simulated time between population census log lines.
    pub census_interval: f32,
}

impl Settings {
    pub fn params(&self, kind: AgentKind) -> &KindParams {
        match kind {
            AgentKind::Prey => &self.prey,
            AgentKind::Predator => &self.predator,
            AgentKind::ApexPredator => &self.apex,
        }
    }
}

impl Default for Settings {
    fn default() -> Settings {
        Settings {
            seed: 0,
            prey: KindParams {
                speed: 2.0,
                change_direction_time: 5.0,
                eating_time: 3.0,
                hunger_decrease_interval: 2.0,
                hunger_threshold: 60,
                gated_consume: false,
                max_lifetime: 30.0,
                idle_after_walk: (3.0, 8.0),
                idle_after_eating: (1.0, 3.0),
                initial_count: 3,
                spawn_anchor: Point2::new(0.0, 0.0),
                spawn_radius: 10.0,
                initial_hunger: (80, 100),
                reproduction_hunger: (80, 100),
            },
            predator: KindParams {
                speed: 3.0,
                change_direction_time: 5.0,
                eating_time: 3.0,
                hunger_decrease_interval: 4.0,
                hunger_threshold: 45,
                gated_consume: true,
                max_lifetime: 5.0,
                idle_after_walk: (5.0, 10.0),
                idle_after_eating: (1.0, 3.0),
                initial_count: 2,
                spawn_anchor: Point2::new(0.0, 0.0),
                spawn_radius: 10.0,
                initial_hunger: (90, 100),
                reproduction_hunger: (90, 100),
            },
            apex: KindParams {
                speed: 4.0,
                change_direction_time: 5.0,
                eating_time: 3.0,
                hunger_decrease_interval: 5.0,
                hunger_threshold: 30,
                gated_consume: true,
                max_lifetime: 25.0,
                idle_after_walk: (5.0, 10.0),
                idle_after_eating: (1.0, 5.0),
                initial_count: 1,
                spawn_anchor: Point2::new(0.0, 0.0),
                spawn_radius: 10.0,
                initial_hunger: (80, 100),
                reproduction_hunger: (90, 100),
            },
            food: FoodParams {
                min_spawn_time: 3.0,
                max_spawn_time: 8.0,
                max_count: 10,
                initial_count: 3,
            },
            eat_distance: 0.5,
            hunger_restore: 50,
            corpse_delay: 5.0,
            spawn_idle_range: (5.0, 10.0),
            census_interval: 5.0,
        }
    }
}
