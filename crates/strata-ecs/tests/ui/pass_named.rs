//! An explicit name replaces the module path.

use strata_ecs::{Component, ComponentKey};

#[derive(Component, Clone, Copy)]
#[component(name = "physics::Velocity")]
struct Velocity {
    x: f32,
    y: f32,
}

fn main() {
    assert_eq!(<Velocity as Component>::NAME, "physics::Velocity");
    assert_eq!(<Velocity as Component>::KEY, ComponentKey::from_name("physics::Velocity"));
}
