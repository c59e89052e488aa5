//! Enums, unit tags and optional fields are allowed.

use strata_ecs::{Component, Entity};

#[derive(Component, Clone, Copy)]
enum GameMode {
    Survival,
    Creative,
}

#[derive(Component, Clone, Copy)]
struct Frozen;

#[derive(Component, Clone, Copy)]
struct Target {
    entity: Option<Entity>,
}

fn main() {
    let _ = (GameMode::Survival, GameMode::Creative);
    assert_eq!(std::mem::size_of::<Frozen>(), 0);
    assert!(<Target as Component>::NAME.ends_with("::Target"));
}
