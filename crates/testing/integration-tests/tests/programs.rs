//! Runs every program in `test-programs/` and checks its expected globals

use integration_tests::{programs_in, test_programs_dir};

#[test]
fn test_all_programs() {
    let programs = programs_in(&test_programs_dir()).unwrap();
    assert!(!programs.is_empty(), "no programs in {:?}", test_programs_dir());

    let mut failures = Vec::new();
    for program in &programs {
        assert!(
            !program.expectations.is_empty(),
            "{} has no expectations",
            program.path.display()
        );
        if let Err(error) = program.check() {
            failures.push(format!("{error:#}"));
        }
    }
    assert!(failures.is_empty(), "failing programs:\n{}", failures.join("\n"));
}

#[test]
fn test_expectation_headers() {
    let program = integration_tests::Program::new(
        "inline.sr",
        "# expect: x = 1\n# expect: s = \"a = b\"\nx = 1\n",
    )
    .unwrap();
    assert_eq!(
        program.expectations,
        vec![
            ("x".to_string(), "1".to_string()),
            ("s".to_string(), "\"a = b\"".to_string()),
        ]
    );
    assert!(integration_tests::Program::new("bad.sr", "# expect: nothing\n").is_err());
}

#[test]
fn test_mismatch_is_reported() {
    let program = integration_tests::Program::new("wrong.sr", "# expect: x = 2\nx = 1\n").unwrap();
    let error = program.check().unwrap_err();
    assert!(error.to_string().contains("`x` is 1, expected 2"));
}
