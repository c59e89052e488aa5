//! Per-system transforms applied to a filtered entity list.
//!
//! Conditions drop entities whose component value fails a predicate; an
//! optional ordering sorts the survivors by a component value. Transforms
//! run every tick on a copy of the cached filter result, never on the
//! cache itself.

use std::{cmp::Ordering, fmt};

use crate::{
    component::Component,
    entity::Entity,
    registry::ComponentRegistry,
    sort::{SortOptions, merge_sort_by},
    stage::StageRange,
};

type ConditionFn = Box<dyn Fn(&ComponentRegistry, &mut Vec<Entity>) + Send + Sync>;
type OrderFn = Box<dyn Fn(&ComponentRegistry, &mut Vec<Entity>, SortOptions) + Send + Sync>;

/// Conditions plus at most one ordering.
#[derive(Default)]
pub struct TransformGroup {
    conditions: Vec<(&'static str, ConditionFn)>,
    order: Option<(&'static str, OrderFn)>,
}

impl TransformGroup {
    /// No conditions, no ordering.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Keep only entities whose `T` satisfies `predicate`.
    pub fn push_condition<T, P>(&mut self, predicate: P)
    where
        T: Component,
        P: Fn(&T) -> bool + Send + Sync + 'static,
    {
        let condition: ConditionFn = Box::new(move |registry, entities| {
            entities.retain(|&entity| {
                registry
                    .read::<T>(entity, StageRange::ALL)
                    .is_some_and(|value| predicate(&value))
            });
        });
        self.conditions.push((T::NAME, condition));
    }

    /// Sort entities by their `T`. Replaces any previous ordering.
    ///
    /// Applying the ordering panics if an entity holds no `T`; queries make
    /// `T` a filter so every matched entity has one.
    pub fn set_order<T, C>(&mut self, cmp: C)
    where
        T: Component,
        C: Fn(&T, &T) -> Ordering + Send + Sync + 'static,
    {
        let order: OrderFn = Box::new(move |registry, entities, options| {
            let mut keyed: Vec<(T, Entity)> = entities
                .iter()
                .filter_map(|&entity| Some((registry.read::<T>(entity, StageRange::ALL)?, entity)))
                .collect();
            assert_eq!(keyed.len(), entities.len(), "ordered entity lacks {}", T::NAME);

            merge_sort_by(&mut keyed, options, &|a: &(T, Entity), b: &(T, Entity)| cmp(&a.0, &b.0));

            entities.clear();
            entities.extend(keyed.into_iter().map(|(_, entity)| entity));
        });
        self.order = Some((T::NAME, order));
    }

    /// Whether neither conditions nor an ordering are set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty() && self.order.is_none()
    }

    /// Whether an ordering is set.
    #[must_use]
    pub const fn is_ordered(&self) -> bool {
        self.order.is_some()
    }

    /// Apply every condition in order, then the ordering.
    ///
    /// # Panics
    ///
    /// Panics if an ordering is set and an entity lacks its component.
    pub fn apply(&self, registry: &ComponentRegistry, entities: &mut Vec<Entity>, options: SortOptions) {
        for (_, condition) in &self.conditions {
            condition(registry, entities);
        }
        if let Some((_, order)) = &self.order {
            order(registry, entities, options);
        }
    }
}

impl fmt::Debug for TransformGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransformGroup")
            .field(
                "conditions",
                &self.conditions.iter().map(|(name, _)| *name).collect::<Vec<_>>(),
            )
            .field("order", &self.order.as_ref().map(|(name, _)| *name))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Component;

    #[derive(Component, Clone, Copy, Debug)]
    struct Score(i32);

    fn setup() -> (ComponentRegistry, Vec<Entity>) {
        let mut registry = ComponentRegistry::new();
        let scores = [5, -2, 9, 5, 0];
        let entities: Vec<Entity> = (1..=5).map(Entity::new).collect();
        for (&entity, &score) in entities.iter().zip(&scores) {
            registry.typed_mut::<Score>().insert(entity, Score(score));
        }
        (registry, entities)
    }

    #[test]
    fn test_condition_filters_by_value() {
        let (registry, mut entities) = setup();
        let mut group = TransformGroup::new();
        group.push_condition::<Score, _>(|s| s.0 > 0);
        group.apply(&registry, &mut entities, SortOptions::default());

        let ids: Vec<u32> = entities.iter().map(|e| e.index()).collect();
        assert_eq!(ids, vec![1, 3, 4]);
    }

    #[test]
    fn test_order_is_stable() {
        let (registry, mut entities) = setup();
        let mut group = TransformGroup::new();
        group.set_order::<Score, _>(|a, b| b.0.cmp(&a.0));
        assert!(group.is_ordered());
        group.apply(&registry, &mut entities, SortOptions::default());

        let ids: Vec<u32> = entities.iter().map(|e| e.index()).collect();
        // Entities 1 and 4 tie on 5 and keep their original order.
        assert_eq!(ids, vec![3, 1, 4, 5, 2]);
    }

    #[test]
    fn test_conditions_run_before_order() {
        let (registry, mut entities) = setup();
        let mut group = TransformGroup::new();
        group.set_order::<Score, _>(|a, b| a.0.cmp(&b.0));
        group.push_condition::<Score, _>(|s| s.0 != 9);
        group.apply(&registry, &mut entities, SortOptions::default());

        let ids: Vec<u32> = entities.iter().map(|e| e.index()).collect();
        assert_eq!(ids, vec![2, 5, 1, 4]);
    }

    #[test]
    #[should_panic(expected = "ordered entity lacks")]
    fn test_order_rejects_entities_without_key() {
        let (registry, mut entities) = setup();
        entities.push(Entity::new(6));
        let mut group = TransformGroup::new();
        group.set_order::<Score, _>(|a, b| a.0.cmp(&b.0));
        group.apply(&registry, &mut entities, SortOptions::default());
    }
}
