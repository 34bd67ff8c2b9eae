//! Unit tests for activation error formatting.

use rstest::rstest;

use super::*;

#[rstest]
fn cycle_message_lists_the_chain() {
    let err = ActivationError::DependencyCycle {
        chain: vec!["a".into(), "b".into(), "a".into()],
    };
    assert_eq!(err.to_string(), "dependency cycle: a -> b -> a");
}

#[rstest]
fn cycle_is_found_through_dependency_failures() {
    let root = ActivationError::DependencyCycle {
        chain: vec!["b".into(), "c".into(), "b".into()],
    };
    let wrapped = ActivationError::Dependency {
        name: "a".into(),
        dependency: "b".into(),
        source: Arc::new(root),
    };
    assert_eq!(
        wrapped.cycle().map(<[String]>::len),
        Some(3),
        "the root cycle should surface"
    );
    assert!(
        ActivationError::Unknown { name: "x".into() }
            .cycle()
            .is_none()
    );
}

#[rstest]
fn provision_error_exposes_installer_source() {
    let err = ActivationError::Provision {
        name: "zig".into(),
        source: InstallError::NotInstalled { name: "zig".into() },
    };
    let source = std::error::Error::source(&err).expect("source");
    assert!(source.to_string().contains("not installed"));
}
