use crate::agent::Quarry;
use bevy::ecs::prelude::*;
use kiddo::float::kdtree::KdTree;
use kiddo::SquaredEuclidean;
use parry2d::na::Point2;
use std::collections::{HashMap, HashSet};

type Tree = KdTree<f32, u64, 2, 128, u32>;

/// Per-kind nearest-neighbor index over the live registry, rebuilt from
/// registry iteration order at the start of every tick. Agents target
/// against this snapshot for the whole tick, so a mid-tick spawn is not
/// visible until the next rebuild.
#[derive(Resource)]
pub struct SpatialMap {
    food_tree: Tree,
    prey_tree: Tree,
    predator_tree: Tree,
    index: HashMap<Entity, (Point2<f32>, Quarry)>,
}

impl Default for SpatialMap {
    fn default() -> Self {
        SpatialMap {
            food_tree: KdTree::new(),
            prey_tree: KdTree::new(),
            predator_tree: KdTree::new(),
            index: HashMap::new(),
        }
    }
}

impl SpatialMap {
    fn tree(&self, quarry: Quarry) -> &Tree {
        match quarry {
            Quarry::Food => &self.food_tree,
            Quarry::Prey => &self.prey_tree,
            Quarry::Predator => &self.predator_tree,
        }
    }

    pub fn clear(&mut self) {
        self.food_tree = KdTree::new();
        self.prey_tree = KdTree::new();
        self.predator_tree = KdTree::new();
        self.index.clear();
    }

    pub fn insert(&mut self, entity: Entity, quarry: Quarry, position: Point2<f32>) {
        let point = [position.x, position.y];
        match quarry {
            Quarry::Food => self.food_tree.add(&point, entity.to_bits()),
            Quarry::Prey => self.prey_tree.add(&point, entity.to_bits()),
            Quarry::Predator => self.predator_tree.add(&point, entity.to_bits()),
        }
        self.index.insert(entity, (position, quarry));
    }

    /// Whether the entity was alive in the registry at the tick snapshot.
    pub fn contains(&self, entity: Entity) -> bool {
        self.index.contains_key(&entity)
    }

    pub fn position_of(&self, entity: Entity) -> Option<Point2<f32>> {
        self.index.get(&entity).map(|(position, _)| *position)
    }

    pub fn class_of(&self, entity: Entity) -> Option<Quarry> {
        self.index.get(&entity).map(|(_, quarry)| *quarry)
    }

    pub fn count(&self, quarry: Quarry) -> usize {
        self.index.values().filter(|(_, q)| *q == quarry).count()
    }

    /// Nearest entity of the given class, skipping entities already
    /// consumed this tick. Deterministic for a given insertion order.
    pub fn nearest(
        &self,
        quarry: Quarry,
        from: Point2<f32>,
        skip: &HashSet<Entity>,
    ) -> Option<(Entity, Point2<f32>)> {
        let query = [from.x, from.y];
        // Asking for one more candidate than there are skipped entities
        // guarantees an unconsumed hit when any exists.
        let neighbors = self
            .tree(quarry)
            .nearest_n::<SquaredEuclidean>(&query, skip.len() + 1);
        for neighbor in neighbors {
            let entity = Entity::from_bits(neighbor.item);
            if skip.contains(&entity) {
                continue;
            }
            if let Some(position) = self.position_of(entity) {
                return Some((entity, position));
            }
        }
        None
    }
}
