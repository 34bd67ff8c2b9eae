use rstest::rstest;
use trellis_config::{Config, LogComponent, LogFormat, LogLevel};

use super::*;

const QUIET_HTTP: &str = "reqwest=warn,hyper=warn,h2=warn,rustls=warn";

#[rstest]
fn base_filter_comes_first_and_quiets_the_http_stack() {
    let config = Config::default().with_log_filter("debug");

    assert_eq!(directives(&config), format!("debug,{QUIET_HTTP}"));
}

#[rstest]
fn component_levels_follow_the_base_filter() {
    let config = Config::default()
        .with_log_filter("info")
        .with_log_level(LogComponent::Host, LogLevel::Warn)
        .with_log_level(LogComponent::LanguageServers, LogLevel::Trace);

    assert_eq!(
        directives(&config),
        format!("info,{QUIET_HTTP},trellis_lsp_host=trace,trellis=warn")
    );
}

#[rstest]
#[case::exact("info,hyper=trace", "info,hyper=trace,reqwest=warn,h2=warn,rustls=warn")]
#[case::module("info,hyper::proto=debug", "info,hyper::proto=debug,reqwest=warn,h2=warn,rustls=warn")]
#[case::span("reqwest[fetch]=debug", "reqwest[fetch]=debug,hyper=warn,h2=warn,rustls=warn")]
#[case::prefix_only("hyperion=debug", "hyperion=debug,reqwest=warn,hyper=warn,h2=warn,rustls=warn")]
fn named_http_crates_keep_their_configured_level(#[case] filter: &str, #[case] expected: &str) {
    let config = Config::default().with_log_filter(filter);

    assert_eq!(directives(&config), expected);
}

#[rstest]
fn empty_base_filter_leaves_only_overrides() {
    let config = Config::default()
        .with_log_filter("  ")
        .with_log_level(LogComponent::Installer, LogLevel::Off);

    assert_eq!(
        directives(&config),
        format!("{QUIET_HTTP},trellis_installer=off")
    );
}

#[rstest]
#[case::plain("info")]
#[case::per_target("warn,trellis_lsp_host::session=trace")]
fn combined_directives_parse(#[case] filter: &str) {
    let config = Config::default()
        .with_log_filter(filter)
        .with_log_level(LogComponent::Activation, LogLevel::Debug);

    assert!(parse_filter(&directives(&config)).is_ok());
}

#[rstest]
fn malformed_filters_report_the_combined_directives() {
    let config = Config::default().with_log_filter("trellis=notalevel");

    let err = parse_filter(&directives(&config)).expect_err("level should not parse");

    assert!(matches!(
        err,
        TelemetryError::Filter { directives: combined, .. }
            if combined.starts_with("trellis=notalevel,")
    ));
}

#[rstest]
fn initialise_keeps_the_first_filter() {
    let first = Config::default()
        .with_log_format(LogFormat::Json)
        .with_log_level(LogComponent::Host, LogLevel::Debug);
    let second = Config::default().with_log_filter("trace");

    let installed = initialise(&first).expect("first initialisation");
    let again = initialise(&second).expect("second initialisation reuses the subscriber");

    assert_eq!(installed.filter(), again.filter());
    assert!(!again.filter().starts_with("trace"));
}
