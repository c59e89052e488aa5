//! Primitive fields, tuples and arrays are allowed.

use strata_ecs::Component;

#[derive(Component, Clone, Copy)]
struct AllPrimitives {
    a: i8,
    b: i16,
    c: i32,
    d: i64,
    e: i128,
    f: isize,
    g: u8,
    h: u16,
    i: u32,
    j: u64,
    k: u128,
    l: usize,
    m: f32,
    n: f64,
    o: bool,
    p: char,
}

#[derive(Component, Clone, Copy)]
struct Point2D(f32, f32);

#[derive(Component, Clone, Copy)]
struct Matrix3x3 {
    values: [[f32; 3]; 3],
    pivot: (i32, i32),
}

fn main() {
    assert!(<AllPrimitives as Component>::NAME.ends_with("::AllPrimitives"));
    assert_ne!(<Point2D as Component>::KEY, <Matrix3x3 as Component>::KEY);
}
