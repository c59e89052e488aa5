//! Compile tests for the Component derive macro.
//!
//! Valid components must compile and run. Rejections are covered by the
//! derive crate's own unit tests, which inspect the expansion directly.

#[test]
fn test_valid_components() {
    let t = trybuild::TestCases::new();
    t.pass("tests/ui/pass_*.rs");
}
