//! trybuild compile-time tests for closure_macros

#[test]
fn ui_blueprint_pass() {
    let t = trybuild::TestCases::new();
    t.pass("tests/ui/pass/*.rs");
}
