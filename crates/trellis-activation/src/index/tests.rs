//! Unit tests for the trigger index.

use rstest::{fixture, rstest};

use super::*;
use crate::spec::FILETYPE_EVENT;

#[fixture]
fn index() -> TriggerIndex {
    let mut index = TriggerIndex::new();
    index
        .insert_all(
            "zig-tools",
            &[
                Trigger::parse_event("BufReadPre *.zig"),
                Trigger::FileType(String::from("zig")),
                Trigger::Command(String::from("ZigFmt")),
                Trigger::Key {
                    mode: String::from("n"),
                    keys: String::from("<leader>z"),
                },
            ],
        )
        .expect("valid triggers");
    index
        .insert_all("startup", &[Trigger::parse_event("VimEnter")])
        .expect("valid triggers");
    index
}

#[rstest]
#[case("BufReadPre", "main.zig", vec!["zig-tools"])]
#[case("BufReadPre", "src/deep/main.zig", vec!["zig-tools"])]
#[case("BufReadPre", "main.rs", vec![])]
#[case("VimEnter", "anything", vec!["startup"])]
#[case(FILETYPE_EVENT, "zig", vec!["zig-tools"])]
#[case(FILETYPE_EVENT, "rust", vec![])]
#[case("BufWritePost", "main.zig", vec![])]
fn matches_events_against_subject(
    index: TriggerIndex,
    #[case] event: &str,
    #[case] subject: &str,
    #[case] expected: Vec<&str>,
) {
    assert_eq!(index.match_event(event, subject), expected);
}

#[rstest]
fn matches_commands_and_keys_exactly(index: TriggerIndex) {
    assert_eq!(index.match_command("ZigFmt"), vec!["zig-tools"]);
    assert!(index.match_command("zigfmt").is_empty());
    assert_eq!(index.match_key("n", "<leader>z"), vec!["zig-tools"]);
    assert!(index.match_key("i", "<leader>z").is_empty());
}

#[rstest]
fn removal_disarms_only_that_extension(mut index: TriggerIndex) {
    index.remove_extension("zig-tools");

    assert!(index.match_event(FILETYPE_EVENT, "zig").is_empty());
    assert!(index.match_command("ZigFmt").is_empty());
    assert_eq!(index.match_event("VimEnter", "x"), vec!["startup"]);
    assert_eq!(index.len(), 1);
    assert!(index.armed("zig-tools").is_empty());
}

#[rstest]
fn invalid_glob_inserts_nothing() {
    let mut index = TriggerIndex::new();
    let result = index.insert_all(
        "broken",
        &[
            Trigger::Command(String::from("Broken")),
            Trigger::parse_event("BufReadPre [*.zig"),
        ],
    );

    let (pattern, _) = result.expect_err("unclosed class must fail");
    assert_eq!(pattern, "[*.zig");
    assert!(index.is_empty());
}

#[rstest]
fn shared_triggers_list_every_extension_once(mut index: TriggerIndex) {
    index
        .insert_all(
            "zig-extras",
            &[
                Trigger::FileType(String::from("zig")),
                Trigger::parse_event("FileType z*"),
            ],
        )
        .expect("valid triggers");

    assert_eq!(
        index.match_event(FILETYPE_EVENT, "zig"),
        vec!["zig-tools", "zig-extras"]
    );
}

#[rstest]
fn armed_reports_remaining_triggers(index: TriggerIndex) {
    assert_eq!(index.armed("zig-tools").len(), 4);
    assert_eq!(index.armed("startup"), vec![Trigger::parse_event("VimEnter")]);
}
