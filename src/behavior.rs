use crate::agent::{Age, Agent, AgentKind, AgentState, Hunger, Position};
use crate::settings::{KindParams, Settings};
use crate::spatial::SpatialMap;
use crate::spawner::{Birth, BirthQueue};
use crate::ArenaBounds;
use bevy::ecs::prelude::*;
use parry2d::na::{distance, Point2};
use rand::rngs::StdRng;
use rand::Rng;
use std::collections::HashSet;

/// Hunger lost per decay step.
pub const HUNGER_DECAY_STEP: i32 = 10;

/// Targets consumed earlier in the current tick. A consumed entity is
/// despawned through deferred commands, so later agents in the same tick
/// must check this set before acting on it.
#[derive(Resource, Default)]
pub struct ConsumedThisTick(pub HashSet<Entity>);

/// Everything one agent step is allowed to see and touch besides its own
/// components. Targeting reads the start-of-tick spatial snapshot only.
pub struct StepCtx<'a> {
    pub params: &'a KindParams,
    pub settings: &'a Settings,
    pub bounds: &'a ArenaBounds,
    pub spatial: &'a SpatialMap,
    pub consumed: &'a mut ConsumedThisTick,
    pub births: &'a mut BirthQueue,
    pub rng: &'a mut StdRng,
    pub now: f32,
    pub dt: f32,
}

/// Side effects of one agent step that the caller must commit to the
/// registry: a consumed target to despawn, and whether the agent died.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct StepOutcome {
    pub ate: Option<Entity>,
    pub died: bool,
}

/// Straight-line movement with overshoot clamped to the target.
pub fn move_towards(position: &mut Point2<f32>, target: Point2<f32>, max_step: f32) {
    let delta = target - *position;
    let dist = delta.norm();
    if dist <= max_step {
        *position = target;
    } else {
        *position += delta * (max_step / dist);
    }
}

/// Advance the shared hunger accumulator; returns true when a decay step
/// fired this tick. Hunger never drops below zero.
fn decay_step(agent: &mut Agent, hunger: &mut Hunger, interval: f32, dt: f32) -> bool {
    agent.hunger_timer += dt;
    if agent.hunger_timer >= interval && hunger.0 > 0 {
        hunger.0 = (hunger.0 - HUNGER_DECAY_STEP).max(0);
        agent.hunger_timer = 0.0;
        return true;
    }
    false
}

fn die(agent: &mut Agent, outcome: &mut StepOutcome) {
    agent.state = AgentState::Dead;
    outcome.died = true;
}

/// One full state-machine step for a live agent.
///
/// Per-tick order: state handler, then unconditional hunger decay for
/// predators, then the age cutoff, then the hunger-triggered Seeking
/// override for predators. Death is sticky; once the agent dies nothing
/// later in the same step can transition it again.
pub fn step_agent(
    kind: AgentKind,
    agent: &mut Agent,
    position: &mut Position,
    hunger: &mut Hunger,
    age: &mut Age,
    ctx: &mut StepCtx,
) -> StepOutcome {
    let mut outcome = StepOutcome::default();
    let params = ctx.params;

    match agent.state {
        AgentState::Idle => {
            agent.idle_timer -= ctx.dt;
            if agent.idle_timer <= 0.0 {
                agent.state = AgentState::Walking;
                let (lo, hi) = params.idle_after_walk;
                agent.idle_timer = ctx.rng.random_range(lo..hi);
            }
        }
        AgentState::Walking => {
            move_towards(&mut position.0, agent.target, params.speed * ctx.dt);
            agent.move_timer += ctx.dt;
            if agent.move_timer > params.change_direction_time {
                agent.target = ctx.bounds.random_point(ctx.rng);
                agent.move_timer = 0.0;
            }
            // Prey hunger only drains while foraging or walking, and prey is
            // the only kind confined to the arena.
            if kind == AgentKind::Prey {
                if decay_step(agent, hunger, params.hunger_decrease_interval, ctx.dt) {
                    if hunger.0 <= params.hunger_threshold {
                        agent.state = AgentState::Seeking;
                    }
                    if hunger.0 == 0 {
                        die(agent, &mut outcome);
                    }
                }
                position.0 = ctx.bounds.clamp(position.0);
            }
        }
        AgentState::Seeking => {
            // Re-query every tick; a target consumed by someone else earlier
            // this tick is invisible here.
            match ctx.spatial.nearest(kind.hunts(), position.0, &ctx.consumed.0) {
                None => {
                    // Prey gives up and wanders; predators keep hunting.
                    if kind == AgentKind::Prey {
                        agent.state = AgentState::Walking;
                    }
                }
                Some((target, target_pos)) => {
                    agent.target = target_pos;
                    move_towards(&mut position.0, target_pos, params.speed * ctx.dt);
                    if kind == AgentKind::Prey
                        && decay_step(agent, hunger, params.hunger_decrease_interval, ctx.dt)
                        && hunger.0 == 0
                    {
                        die(agent, &mut outcome);
                    }
                    if agent.state != AgentState::Dead
                        && distance(&position.0, &target_pos) < ctx.settings.eat_distance
                    {
                        outcome.ate = try_consume(kind, agent, position.0, hunger, target, ctx);
                    }
                }
            }
        }
        AgentState::Eating => {
            agent.eat_timer += ctx.dt;
            if agent.eat_timer >= params.eating_time {
                agent.eat_timer = 0.0;
                agent.state = AgentState::Idle;
                let (lo, hi) = params.idle_after_eating;
                agent.idle_timer = ctx.rng.random_range(lo..hi);
            }
        }
        AgentState::Dead => return outcome,
    }

    // Predators starve at the same rate no matter what they are doing,
    // including while Eating.
    if kind != AgentKind::Prey
        && agent.state != AgentState::Dead
        && decay_step(agent, hunger, params.hunger_decrease_interval, ctx.dt)
        && hunger.0 == 0
    {
        die(agent, &mut outcome);
    }

    if agent.state != AgentState::Dead {
        age.0 += ctx.dt;
        if age.0 >= params.max_lifetime {
            die(agent, &mut outcome);
        }
    }

    // A hungry predator drops whatever it was doing and hunts. Death above
    // takes precedence; a meal in progress is finished first.
    if kind != AgentKind::Prey
        && agent.state != AgentState::Dead
        && agent.state != AgentState::Eating
        && hunger.0 < params.hunger_threshold
    {
        agent.state = AgentState::Seeking;
    }

    outcome
}

/// The single consume edge, shared by the Seeking proximity check and
/// external contact events.
///
/// Re-validates that the target has not already been consumed this tick
/// and still exists in the registry snapshot; stale references are a
/// no-op. Predators additionally refuse the meal unless hungry, so a
/// sated predator can stand on its prey indefinitely.
pub fn try_consume(
    kind: AgentKind,
    agent: &mut Agent,
    position: Point2<f32>,
    hunger: &mut Hunger,
    target: Entity,
    ctx: &mut StepCtx,
) -> Option<Entity> {
    if agent.state == AgentState::Dead {
        return None;
    }
    if ctx.params.gated_consume && hunger.0 >= ctx.params.hunger_threshold {
        return None;
    }
    if ctx.consumed.0.contains(&target) || !ctx.spatial.contains(target) {
        return None;
    }

    ctx.consumed.0.insert(target);
    hunger.0 = (hunger.0 + ctx.settings.hunger_restore).min(100);
    agent.state = AgentState::Eating;
    agent.eat_timer = 0.0;
    // The birth is scheduled independently of eat_timer and fires even if
    // the eater dies before the meal finishes.
    ctx.births.0.push(Birth {
        kind,
        position,
        due: ctx.now + ctx.params.eating_time,
    });
    Some(target)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::Quarry;
    use rand::SeedableRng;

    struct Fixture {
        settings: Settings,
        bounds: ArenaBounds,
        spatial: SpatialMap,
        consumed: ConsumedThisTick,
        births: BirthQueue,
        rng: StdRng,
        now: f32,
    }

    impl Fixture {
        fn new() -> Self {
            Fixture {
                settings: Settings::default(),
                bounds: ArenaBounds::default(),
                spatial: SpatialMap::default(),
                consumed: ConsumedThisTick::default(),
                births: BirthQueue::default(),
                rng: StdRng::seed_from_u64(7),
                now: 0.0,
            }
        }

        fn ctx(&mut self, kind: AgentKind, dt: f32) -> StepCtx<'_> {
            StepCtx {
                params: match kind {
                    AgentKind::Prey => &self.settings.prey,
                    AgentKind::Predator => &self.settings.predator,
                    AgentKind::ApexPredator => &self.settings.apex,
                },
                settings: &self.settings,
                bounds: &self.bounds,
                spatial: &self.spatial,
                consumed: &mut self.consumed,
                births: &mut self.births,
                rng: &mut self.rng,
                now: self.now,
                dt,
            }
        }
    }

    fn agent_in(state: AgentState) -> (Agent, Position, Hunger, Age) {
        (
            Agent {
                state,
                idle_timer: 5.0,
                move_timer: 0.0,
                eat_timer: 0.0,
                hunger_timer: 0.0,
                target: Point2::new(5.0, 0.0),
            },
            Position(Point2::new(0.0, 0.0)),
            Hunger(100),
            Age(0.0),
        )
    }

    #[test]
    fn idle_counts_down_then_walks() {
        let mut fx = Fixture::new();
        let (mut agent, mut pos, mut hunger, mut age) = agent_in(AgentState::Idle);
        agent.idle_timer = 1.0;

        let mut ctx = fx.ctx(AgentKind::Prey, 0.5);
        step_agent(AgentKind::Prey, &mut agent, &mut pos, &mut hunger, &mut age, &mut ctx);
        assert_eq!(agent.state, AgentState::Idle);

        let mut ctx = fx.ctx(AgentKind::Prey, 0.5);
        step_agent(AgentKind::Prey, &mut agent, &mut pos, &mut hunger, &mut age, &mut ctx);
        assert_eq!(agent.state, AgentState::Walking);
        let (lo, hi) = fx.settings.prey.idle_after_walk;
        assert!(agent.idle_timer >= lo && agent.idle_timer < hi);
    }

    #[test]
    fn walking_moves_toward_target_and_clamps_overshoot() {
        let mut fx = Fixture::new();
        let (mut agent, mut pos, mut hunger, mut age) = agent_in(AgentState::Walking);
        agent.target = Point2::new(1.0, 0.0);

        let mut ctx = fx.ctx(AgentKind::Prey, 0.25);
        step_agent(AgentKind::Prey, &mut agent, &mut pos, &mut hunger, &mut age, &mut ctx);
        assert!((pos.0.x - 0.5).abs() < 1e-5);

        // A step longer than the remaining distance lands exactly on target.
        let mut ctx = fx.ctx(AgentKind::Prey, 4.0);
        step_agent(AgentKind::Prey, &mut agent, &mut pos, &mut hunger, &mut age, &mut ctx);
        assert_eq!(pos.0, Point2::new(1.0, 0.0));
    }

    #[test]
    fn walking_retargets_after_change_direction_time() {
        let mut fx = Fixture::new();
        let (mut agent, mut pos, mut hunger, mut age) = agent_in(AgentState::Walking);
        agent.move_timer = 5.0;
        let old_target = agent.target;

        // Strictly greater than change_direction_time is required.
        let mut ctx = fx.ctx(AgentKind::Predator, 0.5);
        step_agent(AgentKind::Predator, &mut agent, &mut pos, &mut hunger, &mut age, &mut ctx);
        assert_ne!(agent.target, old_target);
        assert_eq!(agent.move_timer, 0.0);
    }

    #[test]
    fn prey_hunger_frozen_while_idle() {
        let mut fx = Fixture::new();
        let (mut agent, mut pos, mut hunger, mut age) = agent_in(AgentState::Idle);
        agent.idle_timer = 100.0;
        hunger.0 = 80;

        for _ in 0..10 {
            let mut ctx = fx.ctx(AgentKind::Prey, 1.0);
            step_agent(AgentKind::Prey, &mut agent, &mut pos, &mut hunger, &mut age, &mut ctx);
        }
        assert_eq!(hunger.0, 80);
    }

    #[test]
    fn predator_starves_even_while_eating() {
        let mut fx = Fixture::new();
        let (mut agent, mut pos, mut hunger, mut age) = agent_in(AgentState::Eating);
        hunger.0 = 10;
        agent.eat_timer = 0.0;

        // 4s interval; the decay step fires on the fourth second, after
        // the 3s meal has already ended.
        let mut died = false;
        for _ in 0..4 {
            let mut ctx = fx.ctx(AgentKind::Predator, 1.0);
            let out = step_agent(AgentKind::Predator, &mut agent, &mut pos, &mut hunger, &mut age, &mut ctx);
            died |= out.died;
        }
        assert_eq!(hunger.0, 0);
        assert!(died);
        assert_eq!(agent.state, AgentState::Dead);
    }

    #[test]
    fn prey_walking_decay_triggers_seeking() {
        let mut fx = Fixture::new();
        let (mut agent, mut pos, mut hunger, mut age) = agent_in(AgentState::Walking);
        hunger.0 = 70;

        let mut ctx = fx.ctx(AgentKind::Prey, 2.0);
        step_agent(AgentKind::Prey, &mut agent, &mut pos, &mut hunger, &mut age, &mut ctx);
        assert_eq!(hunger.0, 60);
        assert_eq!(agent.state, AgentState::Seeking);
    }

    #[test]
    fn prey_starvation_overrides_seeking() {
        let mut fx = Fixture::new();
        let (mut agent, mut pos, mut hunger, mut age) = agent_in(AgentState::Walking);
        hunger.0 = 10;

        let mut ctx = fx.ctx(AgentKind::Prey, 2.0);
        let out = step_agent(AgentKind::Prey, &mut agent, &mut pos, &mut hunger, &mut age, &mut ctx);
        assert_eq!(hunger.0, 0);
        assert!(out.died);
        assert_eq!(agent.state, AgentState::Dead);
    }

    #[test]
    fn seeking_prey_falls_back_to_walking_without_food() {
        let mut fx = Fixture::new();
        let (mut agent, mut pos, mut hunger, mut age) = agent_in(AgentState::Seeking);

        let mut ctx = fx.ctx(AgentKind::Prey, 0.5);
        step_agent(AgentKind::Prey, &mut agent, &mut pos, &mut hunger, &mut age, &mut ctx);
        assert_eq!(agent.state, AgentState::Walking);
    }

    #[test]
    fn seeking_predator_persists_without_prey() {
        let mut fx = Fixture::new();
        let (mut agent, mut pos, mut hunger, mut age) = agent_in(AgentState::Seeking);
        hunger.0 = 40;

        for _ in 0..5 {
            let mut ctx = fx.ctx(AgentKind::Predator, 0.5);
            step_agent(AgentKind::Predator, &mut agent, &mut pos, &mut hunger, &mut age, &mut ctx);
        }
        assert_eq!(agent.state, AgentState::Seeking);
    }

    #[test]
    fn seeking_tracks_nearest_target() {
        let mut fx = Fixture::new();
        let near = Entity::from_raw(1);
        let far = Entity::from_raw(2);
        fx.spatial.insert(far, Quarry::Food, Point2::new(8.0, 0.0));
        fx.spatial.insert(near, Quarry::Food, Point2::new(3.0, 0.0));

        let (mut agent, mut pos, mut hunger, mut age) = agent_in(AgentState::Seeking);
        let mut ctx = fx.ctx(AgentKind::Prey, 0.5);
        step_agent(AgentKind::Prey, &mut agent, &mut pos, &mut hunger, &mut age, &mut ctx);
        assert_eq!(agent.target, Point2::new(3.0, 0.0));
        assert!(pos.0.x > 0.0);
    }

    #[test]
    fn hungry_predator_consumes_adjacent_prey() {
        let mut fx = Fixture::new();
        let sheep = Entity::from_raw(9);
        fx.spatial.insert(sheep, Quarry::Prey, Point2::new(0.2, 0.0));

        let (mut agent, mut pos, mut hunger, mut age) = agent_in(AgentState::Seeking);
        hunger.0 = 20;
        let mut ctx = fx.ctx(AgentKind::Predator, 0.01);
        let out = step_agent(AgentKind::Predator, &mut agent, &mut pos, &mut hunger, &mut age, &mut ctx);

        assert_eq!(out.ate, Some(sheep));
        assert_eq!(hunger.0, 70);
        assert_eq!(agent.state, AgentState::Eating);
        assert_eq!(fx.births.0.len(), 1);
        assert_eq!(fx.births.0[0].kind, AgentKind::Predator);
    }

    #[test]
    fn sated_predator_refuses_adjacent_prey() {
        let mut fx = Fixture::new();
        let sheep = Entity::from_raw(9);
        fx.spatial.insert(sheep, Quarry::Prey, Point2::new(0.2, 0.0));

        let (mut agent, mut pos, mut hunger, mut age) = agent_in(AgentState::Seeking);
        hunger.0 = 60;
        let mut ctx = fx.ctx(AgentKind::Predator, 0.01);
        let out = step_agent(AgentKind::Predator, &mut agent, &mut pos, &mut hunger, &mut age, &mut ctx);

        assert_eq!(out.ate, None);
        assert_eq!(hunger.0, 60);
        assert_eq!(agent.state, AgentState::Seeking);
        assert!(fx.births.0.is_empty());
    }

    #[test]
    fn prey_consume_is_ungated_and_clamped_to_100() {
        let mut fx = Fixture::new();
        let fruit = Entity::from_raw(3);
        fx.spatial.insert(fruit, Quarry::Food, Point2::new(0.1, 0.0));

        let (mut agent, mut pos, mut hunger, mut age) = agent_in(AgentState::Seeking);
        hunger.0 = 90;
        let mut ctx = fx.ctx(AgentKind::Prey, 0.01);
        let out = step_agent(AgentKind::Prey, &mut agent, &mut pos, &mut hunger, &mut age, &mut ctx);

        assert_eq!(out.ate, Some(fruit));
        assert_eq!(hunger.0, 100);
    }

    #[test]
    fn consume_is_noop_for_already_consumed_target() {
        let mut fx = Fixture::new();
        let fruit = Entity::from_raw(3);
        fx.spatial.insert(fruit, Quarry::Food, Point2::new(0.1, 0.0));
        fx.consumed.0.insert(fruit);

        let (mut agent, _pos, mut hunger, _age) = agent_in(AgentState::Seeking);
        hunger.0 = 50;
        let mut ctx = fx.ctx(AgentKind::Prey, 0.01);
        let result = try_consume(
            AgentKind::Prey,
            &mut agent,
            Point2::new(0.0, 0.0),
            &mut hunger,
            fruit,
            &mut ctx,
        );

        assert_eq!(result, None);
        assert_eq!(hunger.0, 50);
        assert_eq!(agent.state, AgentState::Seeking);
    }

    #[test]
    fn consume_is_noop_for_unknown_target() {
        let mut fx = Fixture::new();
        let (mut agent, _pos, mut hunger, _age) = agent_in(AgentState::Seeking);
        let mut ctx = fx.ctx(AgentKind::Prey, 0.01);
        let result = try_consume(
            AgentKind::Prey,
            &mut agent,
            Point2::new(0.0, 0.0),
            &mut hunger,
            Entity::from_raw(42),
            &mut ctx,
        );
        assert_eq!(result, None);
    }

    #[test]
    fn eating_finishes_into_idle() {
        let mut fx = Fixture::new();
        let (mut agent, mut pos, mut hunger, mut age) = agent_in(AgentState::Eating);

        for _ in 0..3 {
            let mut ctx = fx.ctx(AgentKind::Prey, 1.0);
            step_agent(AgentKind::Prey, &mut agent, &mut pos, &mut hunger, &mut age, &mut ctx);
        }
        assert_eq!(agent.state, AgentState::Idle);
        let (lo, hi) = fx.settings.prey.idle_after_eating;
        assert!(agent.idle_timer >= lo && agent.idle_timer < hi);
    }

    #[test]
    fn age_cutoff_kills_regardless_of_hunger() {
        let mut fx = Fixture::new();
        let (mut agent, mut pos, mut hunger, mut age) = agent_in(AgentState::Idle);
        hunger.0 = 100;
        age.0 = 24.9;

        let mut ctx = fx.ctx(AgentKind::ApexPredator, 0.2);
        let out = step_agent(AgentKind::ApexPredator, &mut agent, &mut pos, &mut hunger, &mut age, &mut ctx);
        assert!(out.died);
        assert_eq!(agent.state, AgentState::Dead);
    }

    #[test]
    fn dead_state_is_terminal() {
        let mut fx = Fixture::new();
        let (mut agent, mut pos, mut hunger, mut age) = agent_in(AgentState::Dead);
        let before = pos;

        let mut ctx = fx.ctx(AgentKind::Predator, 10.0);
        let out = step_agent(AgentKind::Predator, &mut agent, &mut pos, &mut hunger, &mut age, &mut ctx);
        assert_eq!(out, StepOutcome::default());
        assert_eq!(agent.state, AgentState::Dead);
        assert_eq!(pos, before);
        assert_eq!(age.0, 0.0);
    }

    #[test]
    fn hungry_predator_override_enters_seeking() {
        let mut fx = Fixture::new();
        let (mut agent, mut pos, mut hunger, mut age) = agent_in(AgentState::Idle);
        agent.idle_timer = 100.0;
        hunger.0 = 44;

        let mut ctx = fx.ctx(AgentKind::Predator, 0.1);
        step_agent(AgentKind::Predator, &mut agent, &mut pos, &mut hunger, &mut age, &mut ctx);
        assert_eq!(agent.state, AgentState::Seeking);
    }

    #[test]
    fn predator_death_takes_precedence_over_seek_override() {
        let mut fx = Fixture::new();
        let (mut agent, mut pos, mut hunger, mut age) = agent_in(AgentState::Walking);
        hunger.0 = 10;
        agent.hunger_timer = 3.9;

        let mut ctx = fx.ctx(AgentKind::Predator, 0.2);
        let out = step_agent(AgentKind::Predator, &mut agent, &mut pos, &mut hunger, &mut age, &mut ctx);
        assert!(out.died);
        assert_eq!(agent.state, AgentState::Dead);
    }
}
