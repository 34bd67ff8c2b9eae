use std::time::Duration;

use camino::Utf8PathBuf;
use rstest::{fixture, rstest};
use tempfile::TempDir;
use trellis_config::{Config, ConfigError};
use trellis_installer::StaticFetcher;
use trellis_lsp_host::ServerCommand;
use trellis_lsp_host::fake::{FakeLauncher, FakeScript};

use super::*;

struct Sandbox {
    _dir: TempDir,
    root: Utf8PathBuf,
}

impl Sandbox {
    fn config(&self) -> Config {
        Config::default()
            .with_install_dir(self.root.join("extensions"))
            .with_lock_file(self.root.join("trellis.lock"))
            .with_workspace_root(self.root.join("workspace"))
            .with_registry_url("https://registry.test")
            .with_initialization_timeout(Duration::from_millis(300))
    }

    fn host(&self, script: FakeScript) -> (Trellis<StaticFetcher>, FakeLauncher) {
        let launcher = FakeLauncher::new(script);
        let mut host = Trellis::new(self.config(), StaticFetcher::offline(), launcher.clone())
            .expect("host should build");
        host.engine_mut()
            .runtime_mut()
            .register_server("zig-tools", "zig", ServerCommand::new("zls"));
        (host, launcher)
    }

    fn zig_tools(&self) -> ExtensionSpec {
        ExtensionSpec::builder("zig-tools", "1.0.0")
            .on_filetype("zig")
            .on_command("ZigFmt")
            .local_source(self.root.join("local/zig-tools"))
            .build()
    }
}

#[fixture]
fn sandbox() -> Sandbox {
    let dir = TempDir::new().expect("temp dir");
    let root = Utf8PathBuf::try_from(dir.path().to_path_buf())
        .expect("utf-8 temp dir")
        .canonicalize_utf8()
        .expect("canonical temp dir");
    Sandbox { _dir: dir, root }
}

#[rstest]
fn invalid_configuration_is_rejected(sandbox: Sandbox) {
    let config = sandbox.config().with_registry_url("ftp://registry.test");

    let result = Trellis::new(config, StaticFetcher::offline(), FakeLauncher::default());

    assert!(matches!(
        result,
        Err(HostError::Config(ConfigError::UnsupportedScheme { .. }))
    ));
}

#[rstest]
fn opening_a_document_activates_and_opens_it(sandbox: Sandbox) {
    let (mut host, launcher) = sandbox.host(FakeScript::new());
    host.register(sandbox.zig_tools()).expect("register");

    let opened = host
        .open_document("src/main.zig", "zig", "const x = 1;")
        .expect("open document");

    assert_eq!(opened.activation.activated, ["zig-tools"]);
    let document = opened.document.expect("zig server should be running");
    assert_eq!(document.version(), 1);
    assert_eq!(document.path(), sandbox.root.join("workspace/src/main.zig"));
    assert_eq!(launcher.count("textDocument/didOpen"), 1);
}

#[rstest]
fn reopening_a_document_only_changes_it(sandbox: Sandbox) {
    let (mut host, launcher) = sandbox.host(FakeScript::new());
    host.register(sandbox.zig_tools()).expect("register");
    host.open_document("main.zig", "zig", "a").expect("first open");

    let opened = host.open_document("main.zig", "zig", "b").expect("second open");

    assert!(opened.activation.is_empty());
    assert_eq!(opened.document.map(|document| document.version()), Some(2));
    assert_eq!(launcher.launches(), 1);
    assert_eq!(launcher.count("textDocument/didChange"), 1);
}

#[rstest]
fn filetypes_without_servers_open_nothing(sandbox: Sandbox) {
    let (mut host, launcher) = sandbox.host(FakeScript::new());
    host.register(sandbox.zig_tools()).expect("register");

    let opened = host.open_document("notes.md", "markdown", "# hi").expect("open");

    assert!(opened.activation.is_empty());
    assert!(opened.document.is_none());
    assert_eq!(launcher.launches(), 0);
}

#[rstest]
fn activation_failures_are_reported_not_raised(sandbox: Sandbox) {
    let (mut host, _launcher) = sandbox.host(FakeScript::new().ignore_initialize(1));
    host.register(sandbox.zig_tools()).expect("register");

    let opened = host.open_document("main.zig", "zig", "a").expect("open");

    assert!(!opened.activation.is_success());
    assert!(opened.document.is_none());
    assert!(!host.engine().is_loaded("zig-tools"));
}

#[rstest]
fn commands_activate_and_shutdown_stops_servers(sandbox: Sandbox) {
    let (mut host, launcher) = sandbox.host(FakeScript::new());
    host.register(sandbox.zig_tools()).expect("register");

    let report = host.on_command("ZigFmt");
    assert_eq!(report.activated, ["zig-tools"]);
    assert_eq!(host.orchestrator().languages(), ["zig"]);

    host.shutdown();

    assert!(host.orchestrator().languages().is_empty());
    assert_eq!(launcher.count("shutdown"), 1);
}
