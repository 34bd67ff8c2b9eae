//! Unit tests for the activation engine.

use std::sync::atomic::{AtomicBool, Ordering};

use camino::Utf8Path;
use mockall::mock;
use rstest::{fixture, rstest};
use trellis_installer::{InstallError, Installer, StaticFetcher};

use super::*;
use crate::runtime::SetupError;
use crate::spec::ExtensionSpecBuilder;
use crate::tests::{FakeProvisioner, RecordingRuntime};

mock! {
    Runtime {}
    impl ExtensionRuntime for Runtime {
        fn setup(&mut self, context: &ActivationContext) -> Result<(), SetupError>;
    }
}

mock! {
    Provisioner {}
    impl ExtensionProvisioner for Provisioner {
        fn provision(&mut self, spec: &ExtensionSpec) -> Result<Utf8PathBuf, InstallError>;
    }
}

type Engine = ActivationEngine<FakeProvisioner, RecordingRuntime>;

struct Harness {
    engine: Engine,
    runtime: RecordingRuntime,
}

#[fixture]
fn harness() -> Harness {
    let runtime = RecordingRuntime::default();
    Harness {
        engine: ActivationEngine::new(FakeProvisioner::default(), runtime.clone()),
        runtime,
    }
}

fn lazy(name: &str) -> ExtensionSpecBuilder {
    ExtensionSpec::builder(name, "1.0.0").lazy(true)
}

// ---------------------------------------------------------------------------
// Dependency ordering
// ---------------------------------------------------------------------------

#[rstest]
fn dependencies_load_before_dependents(mut harness: Harness) {
    harness
        .engine
        .register(lazy("a").depends_on("b").build())
        .expect("register a");
    harness
        .engine
        .register(lazy("b").depends_on("c").build())
        .expect("register b");
    harness.engine.register(lazy("c").build()).expect("register c");

    harness.engine.activate("a").expect("activate a");

    assert_eq!(harness.engine.loaded(), ["c", "b", "a"]);
    assert_eq!(harness.runtime.setup_names(), vec!["c", "b", "a"]);
}

#[rstest]
fn cycle_fails_fast_with_the_chain(mut harness: Harness) {
    harness
        .engine
        .register(lazy("a").depends_on("b").build())
        .expect("register a");
    harness
        .engine
        .register(lazy("b").depends_on("a").build())
        .expect("register b");

    let err = harness.engine.activate("a").expect_err("cycle must fail");

    assert!(matches!(err, ActivationError::DependencyCycle { .. }));
    assert_eq!(
        err.cycle().map(<[String]>::to_vec),
        Some(vec![String::from("a"), String::from("b"), String::from("a")])
    );
    assert!(matches!(
        harness.engine.state("a"),
        ExtensionState::Failed { .. }
    ));
    assert!(matches!(
        harness.engine.state("b"),
        ExtensionState::Failed { .. }
    ));
    assert!(harness.runtime.setup_names().is_empty());
}

#[rstest]
fn self_dependency_is_a_cycle(mut harness: Harness) {
    harness
        .engine
        .register(lazy("loop").depends_on("loop").build())
        .expect("register");

    let err = harness.engine.activate("loop").expect_err("cycle");

    assert_eq!(
        err.cycle().map(<[String]>::len),
        Some(2),
        "chain should be [loop, loop]"
    );
}

#[rstest]
fn diamond_dependencies_load_once(mut harness: Harness) {
    for spec in [
        lazy("top").depends_on("left").depends_on("right").build(),
        lazy("left").depends_on("base").build(),
        lazy("right").depends_on("base").build(),
        lazy("base").build(),
    ] {
        harness.engine.register(spec).expect("register");
    }

    harness.engine.activate("top").expect("activate");
    harness.engine.activate("top").expect("second activation is a no-op");
    harness.engine.activate("left").expect("loaded dependency is a no-op");

    assert_eq!(harness.engine.loaded(), ["base", "left", "right", "top"]);
    assert_eq!(harness.runtime.setup_names().len(), 4);
}

#[rstest]
fn unknown_dependency_fails_the_dependent(mut harness: Harness) {
    harness
        .engine
        .register(lazy("a").depends_on("ghost").build())
        .expect("register");

    let err = harness.engine.activate("a").expect_err("missing dependency");

    let ActivationError::Dependency {
        dependency, source, ..
    } = err
    else {
        panic!("expected a dependency error");
    };
    assert_eq!(dependency, "ghost");
    assert!(matches!(*source, ActivationError::Unknown { .. }));
}

#[rstest]
fn context_carries_dependency_paths(mut harness: Harness) {
    harness
        .engine
        .register(lazy("app").depends_on("lib").build())
        .expect("register app");
    harness.engine.register(lazy("lib").build()).expect("register lib");

    harness.engine.activate("app").expect("activate");

    let context = harness.runtime.context("app").expect("app was set up");
    assert_eq!(context.install_path(), Utf8Path::new("/ext/app"));
    assert_eq!(context.dependency_path("lib"), Some(Utf8Path::new("/ext/lib")));
    assert_eq!(
        harness.engine.install_path("lib"),
        Some(Utf8Path::new("/ext/lib"))
    );
}

// ---------------------------------------------------------------------------
// Trigger dispatch
// ---------------------------------------------------------------------------

#[rstest]
fn filetype_trigger_activates_and_disarms(mut harness: Harness) {
    harness
        .engine
        .register(lazy("zig-tools").on_filetype("zig").build())
        .expect("register");

    let first = harness.engine.on_filetype("zig");
    let second = harness.engine.on_filetype("zig");

    assert_eq!(first.activated, vec!["zig-tools"]);
    assert!(second.is_empty());
    assert!(harness.engine.triggers_for("zig-tools").is_empty());
}

#[rstest]
fn persistent_triggers_stay_armed(mut harness: Harness) {
    harness
        .engine
        .register(
            lazy("fmt")
                .on_command("Format")
                .persistent_triggers(true)
                .build(),
        )
        .expect("register");

    harness.engine.on_command("Format");
    let again = harness.engine.on_command("Format");

    assert!(again.is_empty(), "loaded extensions are not reported again");
    assert_eq!(
        harness.engine.triggers_for("fmt"),
        vec![Trigger::Command(String::from("Format"))]
    );
    assert_eq!(harness.runtime.setup_names(), vec!["fmt"]);
}

#[rstest]
fn event_patterns_are_globs(mut harness: Harness) {
    harness
        .engine
        .register(lazy("zig-tools").on_event("BufReadPre *.zig").build())
        .expect("register");

    assert!(harness.engine.on_event("BufReadPre", "main.rs").is_empty());
    let report = harness.engine.on_event("BufReadPre", "src/main.zig");

    assert_eq!(report.activated, vec!["zig-tools"]);
}

#[rstest]
fn key_trigger_matches_mode(mut harness: Harness) {
    harness
        .engine
        .register(lazy("telescope").on_key("n", "<leader>f").build())
        .expect("register");

    assert!(harness.engine.on_key("i", "<leader>f").is_empty());
    assert_eq!(
        harness.engine.on_key("n", "<leader>f").activated,
        vec!["telescope"]
    );
}

#[rstest]
fn declining_predicate_skips_silently(mut harness: Harness) {
    let allow = Arc::new(AtomicBool::new(false));
    let gate = Arc::clone(&allow);
    harness
        .engine
        .register(
            lazy("gated")
                .on_command("Gate")
                .predicate(move || gate.load(Ordering::SeqCst))
                .build(),
        )
        .expect("register");

    let declined = harness.engine.on_command("Gate");
    assert_eq!(declined.skipped, vec!["gated"]);
    assert_eq!(harness.engine.state("gated"), ExtensionState::Registered);

    allow.store(true, Ordering::SeqCst);
    let accepted = harness.engine.on_command("Gate");
    assert_eq!(accepted.activated, vec!["gated"]);
}

#[rstest]
fn one_failure_does_not_block_siblings(mut harness: Harness) {
    harness.runtime.fail("broken", 1);
    harness
        .engine
        .register(lazy("broken").on_filetype("zig").build())
        .expect("register broken");
    harness
        .engine
        .register(lazy("healthy").on_filetype("zig").build())
        .expect("register healthy");

    let report = harness.engine.on_filetype("zig");

    assert_eq!(report.activated, vec!["healthy"]);
    assert_eq!(report.failed.len(), 1);
    assert!(matches!(
        report.failed.first(),
        Some((name, ActivationError::Runtime { .. })) if name == "broken"
    ));
    assert!(!report.is_success());
}

#[rstest]
fn failed_extension_is_retried(mut harness: Harness) {
    harness.runtime.fail("flaky", 1);
    harness
        .engine
        .register(lazy("flaky").on_command("Flaky").build())
        .expect("register");

    let first = harness.engine.on_command("Flaky");
    assert_eq!(first.failed.len(), 1);
    assert!(matches!(
        harness.engine.state("flaky"),
        ExtensionState::Failed { ref message } if message.contains("exploded")
    ));

    let second = harness.engine.on_command("Flaky");
    assert_eq!(second.activated, vec!["flaky"]);
    assert!(harness.engine.is_loaded("flaky"));
}

#[rstest]
fn disabled_extensions_never_activate(mut harness: Harness) {
    harness
        .engine
        .register(lazy("off").on_command("Off").enabled(false).build())
        .expect("register");

    let report = harness.engine.on_command("Off");
    let err = harness.engine.activate("off").expect_err("disabled");

    assert_eq!(report.skipped, vec!["off"]);
    assert!(matches!(err, ActivationError::Disabled { .. }));
    assert_eq!(harness.engine.state("off"), ExtensionState::Disabled);
    assert!(harness.runtime.setup_names().is_empty());
}

// ---------------------------------------------------------------------------
// Registration and bulk loading
// ---------------------------------------------------------------------------

#[rstest]
fn duplicate_names_are_rejected(mut harness: Harness) {
    harness.engine.register(lazy("a").build()).expect("first");

    let err = harness
        .engine
        .register(lazy("a").build())
        .expect_err("duplicate");

    assert!(matches!(err, ActivationError::Duplicate { .. }));
}

#[rstest]
#[case(ExtensionSpec::builder("", "1.0").build())]
#[case(ExtensionSpec::builder("a", " ").build())]
fn malformed_specs_are_rejected(mut harness: Harness, #[case] spec: ExtensionSpec) {
    let err = harness.engine.register(spec).expect_err("invalid spec");
    assert!(matches!(err, ActivationError::InvalidSpec { .. }));
}

#[rstest]
fn invalid_pattern_is_rejected_without_registering(mut harness: Harness) {
    let err = harness
        .engine
        .register(lazy("bad").on_event("BufReadPre [*.zig").build())
        .expect_err("bad glob");

    assert!(matches!(err, ActivationError::InvalidTrigger { .. }));
    assert_eq!(harness.engine.state("bad"), ExtensionState::Unregistered);
}

#[rstest]
fn eager_registration_activates_immediately(mut harness: Harness) {
    harness
        .engine
        .register(ExtensionSpec::builder("core", "1.0").build())
        .expect("register");

    assert!(harness.engine.is_loaded("core"));
}

#[rstest]
fn failed_eager_activation_still_registers(mut harness: Harness) {
    harness.runtime.fail("core", 1);

    harness
        .engine
        .register(ExtensionSpec::builder("core", "1.0").build())
        .expect("registration succeeds");

    assert!(matches!(
        harness.engine.state("core"),
        ExtensionState::Failed { .. }
    ));
    let report = harness.engine.load_all();
    assert_eq!(report.activated, vec!["core"]);
}

#[rstest]
fn register_all_loads_by_priority_then_registration(mut harness: Harness) {
    let report = harness
        .engine
        .register_all([
            ExtensionSpec::builder("late", "1").priority(1).build(),
            ExtensionSpec::builder("first", "1").priority(100).build(),
            ExtensionSpec::builder("also-late", "1").priority(1).build(),
            lazy("lazy").build(),
            ExtensionSpec::builder("off", "1").enabled(false).build(),
        ])
        .expect("register all");

    assert_eq!(report.activated, vec!["first", "late", "also-late"]);
    assert_eq!(harness.engine.loaded(), ["first", "late", "also-late"]);
    assert!(!harness.engine.is_loaded("lazy"));
}

#[rstest]
fn register_all_resolves_forward_dependencies(mut harness: Harness) {
    harness
        .engine
        .register_all([
            ExtensionSpec::builder("app", "1").depends_on("lib").build(),
            lazy("lib").build(),
        ])
        .expect("register all");

    assert_eq!(harness.engine.loaded(), ["lib", "app"]);
}

#[rstest]
fn stats_count_states_and_load_times(mut harness: Harness) {
    harness.runtime.fail("broken", 1);
    harness
        .engine
        .register_all([
            ExtensionSpec::builder("ok", "1").build(),
            ExtensionSpec::builder("broken", "1").build(),
            ExtensionSpec::builder("off", "1").enabled(false).build(),
            lazy("idle").build(),
        ])
        .expect("register all");

    let stats = harness.engine.stats();

    assert_eq!(stats.registered, 4);
    assert_eq!(stats.loaded, 1);
    assert_eq!(stats.failed, 1);
    assert_eq!(stats.disabled, 1);
    assert_eq!(stats.load_times.len(), 1);
    assert_eq!(
        stats.total_load_time,
        stats.load_times.iter().map(|(_, time)| *time).sum::<Duration>()
    );
}

// ---------------------------------------------------------------------------
// Collaborator seams
// ---------------------------------------------------------------------------

#[rstest]
fn local_source_bypasses_the_provisioner() {
    let mut provisioner = MockProvisioner::new();
    provisioner.expect_provision().never();
    let mut runtime = MockRuntime::new();
    runtime
        .expect_setup()
        .withf(|context| context.install_path() == Utf8Path::new("/home/dev/zig-tools"))
        .once()
        .returning(|_| Ok(()));
    let mut engine = ActivationEngine::new(provisioner, runtime);

    engine
        .register(
            lazy("zig-tools")
                .local_source("/home/dev/zig-tools")
                .build(),
        )
        .expect("register");
    engine.activate("zig-tools").expect("activate");
}

#[rstest]
fn repeated_activation_sets_up_once() {
    let mut provisioner = MockProvisioner::new();
    provisioner
        .expect_provision()
        .once()
        .returning(|spec| Ok(Utf8PathBuf::from(format!("/ext/{}", spec.name()))));
    let mut runtime = MockRuntime::new();
    runtime.expect_setup().once().returning(|_| Ok(()));
    let mut engine = ActivationEngine::new(provisioner, runtime);
    engine
        .register(lazy("once").on_command("Once").persistent_triggers(true).build())
        .expect("register");

    engine.activate("once").expect("first");
    engine.activate("once").expect("second");
    engine.on_command("Once");
}

#[rstest]
fn provisioning_failure_is_reported_and_retryable(mut harness: Harness) {
    let runtime = RecordingRuntime::default();
    let mut engine = ActivationEngine::new(FakeProvisioner::broken(&["remote"]), runtime.clone());
    engine
        .register(lazy("remote").build())
        .expect("register remote");
    engine
        .register(lazy("user").depends_on("remote").build())
        .expect("register user");

    let err = engine.activate("user").expect_err("provisioning fails");

    let ActivationError::Dependency { source, .. } = err else {
        panic!("expected a dependency failure");
    };
    assert!(matches!(
        source.as_ref(),
        ActivationError::Provision { source, .. } if source.is_retryable()
    ));
    assert!(runtime.setup_names().is_empty());

    harness.engine.register(lazy("fine").build()).expect("register");
    harness.engine.activate("fine").expect("unrelated extensions still load");
}

#[rstest]
fn installer_is_a_provisioner() {
    let root = tempfile::TempDir::new().expect("temp dir");
    let base = Utf8PathBuf::from_path_buf(root.path().to_path_buf()).expect("utf8 temp dir");
    let installer = Installer::new(
        base.join("extensions"),
        base.join("lock.json"),
        "https://registry.test",
        StaticFetcher::new(),
    )
    .expect("installer");
    let mut engine = ActivationEngine::new(installer, RecordingRuntime::default());
    engine.register(lazy("missing").build()).expect("register");

    let err = engine.activate("missing").expect_err("404");

    assert!(matches!(
        err,
        ActivationError::Provision {
            source: InstallError::Registry { status: 404, .. },
            ..
        }
    ));
    assert_eq!(engine.provisioner().fetcher().fetch_count(), 1);
}
