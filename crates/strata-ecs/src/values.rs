//! Value sources for bulk component operations.

use crate::entity::Entity;

/// Where the values for a batch of entities come from.
pub enum Values<'a, T> {
    /// The same value for every entity.
    Broadcast(T),
    /// One value per entity, in order.
    Each(&'a [T]),
    /// Computed from each entity.
    Generate(&'a mut dyn FnMut(Entity) -> T),
    /// A prototype copied per entity, then adjusted by the callback.
    Initialize(T, &'a mut dyn FnMut(&mut T, Entity)),
}

impl<T: Copy> Values<'_, T> {
    /// Pair every entity with its value.
    ///
    /// # Panics
    ///
    /// Panics if an [`Values::Each`] slice does not match `entities` in length.
    pub fn for_each(self, entities: &[Entity], mut f: impl FnMut(Entity, T)) {
        match self {
            Self::Broadcast(value) => entities.iter().for_each(|&e| f(e, value)),
            Self::Each(values) => {
                assert_eq!(
                    values.len(),
                    entities.len(),
                    "expected one value per entity"
                );
                for (&e, &value) in entities.iter().zip(values) {
                    f(e, value);
                }
            }
            Self::Generate(generate) => entities.iter().for_each(|&e| f(e, generate(e))),
            Self::Initialize(prototype, init) => {
                for &e in entities {
                    let mut value = prototype;
                    init(&mut value, e);
                    f(e, value);
                }
            }
        }
    }
}

impl<T> From<T> for Values<'_, T> {
    fn from(value: T) -> Self {
        Self::Broadcast(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn collect(values: Values<'_, u32>, entities: &[Entity]) -> Vec<(u32, u32)> {
        let mut out = Vec::new();
        values.for_each(entities, |e, v| out.push((e.index(), v)));
        out
    }

    #[test]
    fn test_value_sources() {
        let entities = [Entity::new(1), Entity::new(2)];
        assert_eq!(collect(Values::Broadcast(7), &entities), vec![(1, 7), (2, 7)]);
        assert_eq!(collect(Values::Each(&[3, 4]), &entities), vec![(1, 3), (2, 4)]);
        assert_eq!(
            collect(Values::Generate(&mut |e| e.index() * 10), &entities),
            vec![(1, 10), (2, 20)]
        );
        assert_eq!(
            collect(Values::Initialize(100, &mut |v, e| *v += e.index()), &entities),
            vec![(1, 101), (2, 102)]
        );
    }

    #[test]
    #[should_panic(expected = "one value per entity")]
    fn test_each_length_mismatch() {
        let _ = collect(Values::Each(&[1]), &[Entity::new(1), Entity::new(2)]);
    }
}
