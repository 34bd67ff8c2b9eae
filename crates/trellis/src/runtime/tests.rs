use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};
use rstest::{fixture, rstest};
use tempfile::TempDir;
use trellis_activation::{ActivationEngine, ActivationError, ExtensionProvisioner, ExtensionSpec};
use trellis_config::Config;
use trellis_installer::InstallError;
use trellis_lsp_host::fake::{FakeLauncher, FakeScript};

use super::*;

/// Provisioner for engines whose specs all carry a local source.
struct NoRegistry;

impl ExtensionProvisioner for NoRegistry {
    fn provision(&mut self, spec: &ExtensionSpec) -> Result<Utf8PathBuf, InstallError> {
        Err(InstallError::NotInstalled {
            name: spec.name().to_owned(),
        })
    }
}

type Engine = ActivationEngine<NoRegistry, LanguageServerRuntime>;

struct Fixture {
    _dir: TempDir,
    root: Utf8PathBuf,
}

impl Fixture {
    fn engine(&self, script: FakeScript) -> (Engine, FakeLauncher) {
        let launcher = FakeLauncher::new(script);
        let config = Config::default()
            .with_workspace_root(self.root.clone())
            .with_initialization_timeout(Duration::from_millis(200));
        let orchestrator = Arc::new(LanguageOrchestrator::new(&config, launcher.clone()));
        let runtime = LanguageServerRuntime::new(orchestrator)
            .with_server("zig-tools", "zig", ServerCommand::new("zls"));
        (ActivationEngine::new(NoRegistry, runtime), launcher)
    }

    fn local(&self, name: &str) -> ExtensionSpec {
        ExtensionSpec::builder(name, "1.0.0")
            .on_filetype("zig")
            .local_source(self.root.join(name))
            .build()
    }
}

#[fixture]
fn fixture() -> Fixture {
    let dir = TempDir::new().expect("temp dir");
    let root = Utf8PathBuf::try_from(dir.path().to_path_buf()).expect("utf-8 temp dir");
    Fixture { _dir: dir, root }
}

#[rstest]
fn setup_starts_the_declared_server(fixture: Fixture) {
    let (mut engine, launcher) = fixture.engine(FakeScript::new());
    engine.register(fixture.local("zig-tools")).expect("register");

    let report = engine.on_filetype("zig");

    assert_eq!(report.activated, ["zig-tools"]);
    assert_eq!(launcher.launches(), 1);
    assert_eq!(engine.runtime().orchestrator().languages(), ["zig"]);
}

#[rstest]
fn extensions_without_servers_load_quietly(fixture: Fixture) {
    let (mut engine, launcher) = fixture.engine(FakeScript::new());
    engine.register(fixture.local("zig-snippets")).expect("register");

    let report = engine.on_filetype("zig");

    assert_eq!(report.activated, ["zig-snippets"]);
    assert_eq!(launcher.launches(), 0);
    assert_eq!(engine.runtime().language_of("zig-snippets"), None);
}

#[rstest]
fn server_start_failure_fails_the_activation(fixture: Fixture) {
    let (mut engine, _launcher) = fixture.engine(FakeScript::new().ignore_initialize(1));
    engine.register(fixture.local("zig-tools")).expect("register");

    let report = engine.on_filetype("zig");

    let [(name, error)] = report.failed.as_slice() else {
        panic!("expected exactly one failure, got {:?}", report.failed);
    };
    assert_eq!(name, "zig-tools");
    assert!(matches!(error, ActivationError::Runtime { .. }));
    assert!(!engine.is_loaded("zig-tools"));
}

#[rstest]
#[case::nested("bin/zls", "/ext/zig-tools/bin/zls")]
#[case::bare("zls", "zls")]
#[case::absolute("/usr/bin/zls", "/usr/bin/zls")]
fn resolves_programs_against_the_install_path(#[case] program: &str, #[case] expected: &str) {
    let command = ServerCommand::new(program).arg("--stdio");

    let resolved = resolve_command(&command, Utf8Path::new("/ext/zig-tools"));

    assert_eq!(resolved.program(), expected);
    assert_eq!(resolved.arguments(), ["--stdio"]);
}

#[rstest]
fn resolved_commands_keep_their_working_directory() {
    let command = ServerCommand::new("bin/zls")
        .arg("--stdio")
        .working_dir("/work/project");

    let resolved = resolve_command(&command, Utf8Path::new("/ext/zig-tools"));

    assert_eq!(resolved.program(), "/ext/zig-tools/bin/zls");
    assert_eq!(
        resolved.working_directory(),
        Some(Utf8Path::new("/work/project"))
    );
}
