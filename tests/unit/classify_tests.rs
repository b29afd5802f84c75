use agent_vault::router::kind::is_manual_notice;
use agent_vault::router::{classify, plan, Handling, Phase, Platform, SocialIntent, TaskKind};
use agent_vault::store::TaskFile;
use agent_vault::AgentMode;

fn blank() -> TaskFile {
    TaskFile::default()
}

fn declared(action: &str) -> TaskFile {
    TaskFile::parse(&format!("---\naction: {action}\n---\n"))
}

#[test]
fn filename_prefix_decides_the_kind() {
    let cases = [
        ("EMAIL_20260101_090000_ab12cd34.md", TaskKind::Email),
        ("GMAIL_x.md", TaskKind::Email),
        ("WHATSAPP_x.md", TaskKind::WhatsApp),
        ("PAYMENT_x.md", TaskKind::Payment),
        ("BANKING_x.md", TaskKind::Payment),
        ("ODOO_INVOICE_x.md", TaskKind::Invoice { quotation: false }),
        ("QUOTATION_x.md", TaskKind::Invoice { quotation: true }),
        ("FILE_x.md", TaskKind::FileDrop),
        ("NEEDS_MANUAL_ACTION_x.md", TaskKind::ManualNotice),
    ];
    for (name, expected) in cases {
        assert_eq!(classify(name, &blank()), expected, "{name}");
    }
}

#[test]
fn social_prefixes_carry_platform_and_intent() {
    assert_eq!(
        classify("LINKEDIN_POST_x.md", &blank()),
        TaskKind::Social { platform: Platform::LinkedIn, intent: SocialIntent::Post }
    );
    assert_eq!(
        classify("SOCIAL_TWITTER_REPLY_x.md", &blank()),
        TaskKind::Social { platform: Platform::Twitter, intent: SocialIntent::Reply }
    );
    assert_eq!(
        classify("FACEBOOK_MESSAGE_x.md", &blank()),
        TaskKind::Social { platform: Platform::Facebook, intent: SocialIntent::Reply }
    );
    assert_eq!(
        classify("INSTAGRAM_NOTIFICATION_x.md", &blank()),
        TaskKind::Social { platform: Platform::Instagram, intent: SocialIntent::Acknowledge }
    );
}

#[test]
fn draft_names_classify_by_their_subject() {
    assert_eq!(classify("LOCAL_DRAFT_EMAIL_x.md", &blank()), TaskKind::Email);
    assert_eq!(
        classify("CLOUD_DRAFT_SOCIAL_LINKEDIN_x.md", &blank()),
        TaskKind::Social { platform: Platform::LinkedIn, intent: SocialIntent::Post }
    );
    assert_eq!(classify("APPROVAL_INVOICE_x.md", &blank()), TaskKind::Invoice { quotation: false });
}

#[test]
fn generic_names_fall_back_to_declared_action_then_type() {
    assert_eq!(classify("TASK_1.md", &declared("send_email")), TaskKind::Email);
    assert_eq!(
        classify("TASK_2.md", &declared("create_client_and_quotation")),
        TaskKind::Invoice { quotation: true }
    );
    assert_eq!(
        classify("TASK_3.md", &declared("post_to_linkedin")),
        TaskKind::Social { platform: Platform::LinkedIn, intent: SocialIntent::Post }
    );
    assert_eq!(
        classify("TASK_4.md", &declared("tweet_reply")),
        TaskKind::Social { platform: Platform::Twitter, intent: SocialIntent::Reply }
    );
    let typed = TaskFile::parse("---\ntype: whatsapp_message\n---\n");
    assert_eq!(classify("TASK_5.md", &typed), TaskKind::WhatsApp);
}

#[test]
fn unrecognized_tasks_keep_their_label() {
    assert_eq!(
        classify("TASK_1.md", &declared("unknown_widget")),
        TaskKind::Unknown { label: "unknown_widget".into() }
    );
    assert_eq!(classify("TASK_2.md", &blank()), TaskKind::Unknown { label: "unspecified".into() });
}

#[test]
fn manual_notice_detection_ignores_case() {
    assert!(is_manual_notice("needs_manual_action_1.md"));
    assert!(!is_manual_notice("EMAIL_needs_manual_action.md"));
}

#[test]
fn kind_display_is_stable() {
    assert_eq!(TaskKind::Email.to_string(), "email");
    assert_eq!(
        TaskKind::Social { platform: Platform::Twitter, intent: SocialIntent::Reply }.to_string(),
        "twitter_reply"
    );
    assert_eq!(TaskKind::Invoice { quotation: true }.to_string(), "quotation");
    assert_eq!(TaskKind::Unknown { label: "x".into() }.to_string(), "unknown:x");
}

#[test]
fn claimed_tasks_are_never_executed() {
    let kinds = [
        TaskKind::Email,
        TaskKind::WhatsApp,
        TaskKind::Payment,
        TaskKind::FileDrop,
        TaskKind::ManualNotice,
        TaskKind::Invoice { quotation: false },
        TaskKind::Social { platform: Platform::LinkedIn, intent: SocialIntent::Post },
        TaskKind::Unknown { label: "x".into() },
    ];
    for kind in &kinds {
        for mode in [AgentMode::Local, AgentMode::Cloud] {
            assert_ne!(plan(kind, Phase::Claimed, mode), Handling::Execute, "{kind} {mode:?}");
        }
    }
}

#[test]
fn claimed_plan_depends_on_mode() {
    let reply = TaskKind::Social { platform: Platform::Facebook, intent: SocialIntent::Reply };
    assert_eq!(plan(&TaskKind::Email, Phase::Claimed, AgentMode::Cloud), Handling::Draft);
    assert_eq!(plan(&reply, Phase::Claimed, AgentMode::Local), Handling::Draft);
    assert_eq!(plan(&reply, Phase::Claimed, AgentMode::Cloud), Handling::Release);
    assert_eq!(plan(&TaskKind::Payment, Phase::Claimed, AgentMode::Local), Handling::ManualNotice);
    assert_eq!(plan(&TaskKind::Payment, Phase::Claimed, AgentMode::Cloud), Handling::Release);
    assert_eq!(
        plan(&TaskKind::Unknown { label: "x".into() }, Phase::Claimed, AgentMode::Local),
        Handling::ManualNotice
    );
    assert_eq!(plan(&TaskKind::FileDrop, Phase::Claimed, AgentMode::Local), Handling::Release);
}

#[test]
fn approved_plan_executes_only_in_local_mode() {
    assert_eq!(plan(&TaskKind::Email, Phase::Approved, AgentMode::Local), Handling::Execute);
    assert_eq!(plan(&TaskKind::Email, Phase::Approved, AgentMode::Cloud), Handling::Leave);
    assert_eq!(
        plan(&TaskKind::WhatsApp, Phase::Approved, AgentMode::Local),
        Handling::ManualNotice
    );
    assert_eq!(
        plan(&TaskKind::ManualNotice, Phase::Approved, AgentMode::Local),
        Handling::Acknowledge
    );
    assert_eq!(plan(&TaskKind::Email, Phase::Rejected, AgentMode::Local), Handling::Acknowledge);
    assert_eq!(plan(&TaskKind::Email, Phase::Rejected, AgentMode::Cloud), Handling::Leave);
}
