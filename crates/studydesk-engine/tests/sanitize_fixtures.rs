use pretty_assertions::assert_eq;
use studydesk_engine::markup::{parse_fragment, tags};
use studydesk_engine::sanitize::{is_allowed_tag, sanitize};

#[test]
fn fixture_pasted_word() {
    assert_fixture("pasted_word");
}

#[test]
fn fixture_scripts_and_comments() {
    assert_fixture("scripts_and_comments");
}

#[test]
fn fixture_malformed() {
    assert_fixture("malformed");
}

#[test]
fn fixture_entities() {
    assert_fixture("entities");
}

fn read_fixture(file: &str) -> String {
    std::fs::read_to_string(format!(
        "{}/tests/fixtures/{file}",
        env!("CARGO_MANIFEST_DIR")
    ))
    .unwrap()
    .trim_end()
    .to_string()
}

fn assert_fixture(name: &str) {
    let input = read_fixture(&format!("{name}.html"));
    let expected = read_fixture(&format!("{name}.expected.html"));

    let sanitized = sanitize(&input);
    assert_eq!(sanitized, expected);

    // Sanitized output is a fixed point and only holds allowed tags
    assert_eq!(sanitize(&sanitized), sanitized);
    for tag in tags(&parse_fragment(&sanitized)) {
        assert!(is_allowed_tag(tag), "{tag} survived sanitizing {name}");
    }
}
