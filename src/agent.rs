use bevy::ecs::prelude::*;
use parry2d::na::Point2;

/// Species of a live animal. Food is not an agent; it is a bare
/// [`Food`] marker with a [`Position`].
#[derive(Component, Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum AgentKind {
    Prey,
    Predator,
    ApexPredator,
}

/// What a seeking agent looks for in the registry.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Quarry {
    Food,
    Prey,
    Predator,
}

impl AgentKind {
    /// The class of target this kind forages or hunts for.
    pub fn hunts(self) -> Quarry {
        match self {
            AgentKind::Prey => Quarry::Food,
            AgentKind::Predator => Quarry::Prey,
            AgentKind::ApexPredator => Quarry::Predator,
        }
    }

    /// The class this kind is indexed under when something else hunts it.
    /// Nothing preys on the apex predator.
    pub fn hunted_as(self) -> Option<Quarry> {
        match self {
            AgentKind::Prey => Some(Quarry::Prey),
            AgentKind::Predator => Some(Quarry::Predator),
            AgentKind::ApexPredator => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AgentState {
    Idle,
    Walking,
    Eating,
    Seeking,
    Dead,
}

/// Per-agent state machine record. The timers are private bookkeeping:
/// nothing outside the behavior step should write them.
#[derive(Component, Clone, Debug)]
pub struct Agent {
    pub state: AgentState,
    /// Countdown until Idle gives way to Walking.
    pub idle_timer: f32,
    /// Time accumulated walking toward the current random destination.
    pub move_timer: f32,
    /// Time accumulated in the Eating state.
    pub eat_timer: f32,
    /// Shared hunger-decay accumulator.
    pub hunger_timer: f32,
    /// Random-walk destination while Walking.
    pub target: Point2<f32>,
}

#[derive(Component, Clone, Copy, Debug, PartialEq)]
pub struct Position(pub Point2<f32>);

/// Hunger in [0, 100]; the agent starves at 0.
#[derive(Component, Clone, Copy, Debug, PartialEq, Eq)]
pub struct Hunger(pub i32);

/// Seconds since spawn.
#[derive(Component, Clone, Copy, Debug, PartialEq)]
pub struct Age(pub f32);

/// Marker removed when the agent dies; dead agents take no further part
/// in the simulation.
#[derive(Component, Clone, Copy, Debug)]
pub struct Alive;

/// Simulation instant at which the agent died. The corpse is swept a
/// fixed delay after this.
#[derive(Component, Clone, Copy, Debug)]
pub struct DiedAt(pub f32);

/// Marker for passive food items.
#[derive(Component, Clone, Copy, Debug)]
pub struct Food;

#[derive(Bundle)]
pub struct AgentBundle {
    pub kind: AgentKind,
    pub agent: Agent,
    pub position: Position,
    pub hunger: Hunger,
    pub age: Age,
    pub alive: Alive,
}

impl AgentBundle {
    /// A freshly spawned animal starts out Walking toward `target`, with
    /// its first idle countdown already armed.
    pub fn new(
        kind: AgentKind,
        position: Point2<f32>,
        hunger: i32,
        idle_timer: f32,
        target: Point2<f32>,
    ) -> Self {
        AgentBundle {
            kind,
            agent: Agent {
                state: AgentState::Walking,
                idle_timer,
                move_timer: 0.0,
                eat_timer: 0.0,
                hunger_timer: 0.0,
                target,
            },
            position: Position(position),
            hunger: Hunger(hunger),
            age: Age(0.0),
            alive: Alive,
        }
    }
}
