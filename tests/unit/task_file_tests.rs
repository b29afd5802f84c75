use agent_vault::store::{Header, TaskFile};

const EMAIL: &str = "---\ntype: email\nfrom: \"Jane Doe <jane@example.com>\"\nsubject: Re: quarterly numbers\npriority: high\n---\n\n# Email\n\nPlease send the figures.\n";

#[test]
fn parses_header_and_body() {
    let task = TaskFile::parse(EMAIL);
    assert_eq!(task.kind_label(), Some("email"));
    assert_eq!(task.header.get("from"), Some("Jane Doe <jane@example.com>"));
    assert_eq!(task.header.get("subject"), Some("Re: quarterly numbers"));
    assert_eq!(task.header.get("priority"), Some("high"));
    assert_eq!(task.body, "\n# Email\n\nPlease send the figures.\n");
}

#[test]
fn render_reproduces_canonical_text() {
    let text = "---\ntype: email\nsubject: hello\n---\n\nbody\n";
    assert_eq!(TaskFile::parse(text).render(), text);
}

#[test]
fn text_without_header_is_all_body() {
    let task = TaskFile::parse("just a note\n");
    assert!(task.header.is_empty());
    assert_eq!(task.body, "just a note\n");
}

#[test]
fn unclosed_header_is_treated_as_body() {
    let text = "---\ntype: email\nno closing line\n";
    let task = TaskFile::parse(text);
    assert!(task.header.is_empty());
    assert_eq!(task.body, text);
}

#[test]
fn indented_continuation_lines_are_ignored() {
    let task = TaskFile::parse("---\ntags:\n  - one\n  - two\naction: send_email\n---\n");
    assert_eq!(task.header.get("tags"), Some(""));
    assert_eq!(task.action(), Some("send_email"));
    assert_eq!(task.header.iter().count(), 2);
}

#[test]
fn set_replaces_in_place_and_strips_newlines() {
    let mut header = Header::new().with("type", "email").with("status", "pending");
    header.set("type", "whatsapp");
    header.set("status", "error: line one\nline two");
    let keys: Vec<&str> = header.iter().map(|(k, _)| k).collect();
    assert_eq!(keys, ["type", "status"]);
    assert_eq!(header.get("type"), Some("whatsapp"));
    assert_eq!(header.get("status"), Some("error: line one line two"));
}

#[test]
fn get_any_skips_empty_values() {
    let header = Header::new().with("to", "").with("email", "a@b.c");
    assert_eq!(header.get_any(&["to", "email"]), Some("a@b.c"));
    assert_eq!(header.get_any(&["recipient"]), None);
}

#[test]
fn section_returns_trimmed_contents_up_to_next_heading() {
    let task = TaskFile::parse(
        "---\ntype: x\n---\n# Title\n\n## Reply\n\nSee you Monday.\n\n## Notes\n\ninternal\n",
    );
    assert_eq!(task.section(&["Reply"]).as_deref(), Some("See you Monday."));
    assert_eq!(task.section(&["Drafted Reply", "Notes"]).as_deref(), Some("internal"));
    assert_eq!(task.section(&["Missing"]), None);
}

#[test]
fn empty_section_is_none() {
    let task = TaskFile::parse("---\ntype: x\n---\n## Reply\n\n## Notes\ntext\n");
    assert_eq!(task.section(&["Reply"]), None);
}
