use std::time::Duration;

use agent_vault::config::GlobalConfig;
use agent_vault::{AgentMode, AppError};

fn root_line(dir: &std::path::Path) -> String {
    format!("vault_root = '{}'\n", dir.display())
}

fn full_toml(root: &std::path::Path) -> String {
    format!(
        r#"
vault_root = '{root}'
dry_run = true

[agent]
name = "cloud-1"
mode = "cloud"
poll_interval_seconds = 15
status_interval_seconds = 120

[scheduler]
tick_seconds = 2
ai_command = "echo"
ai_args = []
approved_sweep_seconds = 30

[sync]
remote = "vault-remote"
branch = "vault"
interval_seconds = 45
exclude_patterns = ["**/.env"]

[watchdog]
health_interval_seconds = 30

[[watchdog.workers]]
name = "agent"
program = "agent-vault"
args = ["agent"]
max_restarts = 2

[resilience]
max_attempts = 4
failure_threshold = 2

[adapters.mail]
program = "send-mail"
args = ["--smtp"]

[watchers]
seen_ids_limit = 50
"#,
        root = root.display()
    )
}

#[test]
fn minimal_file_gets_defaults() {
    let dir = tempfile::tempdir().expect("tempdir");
    let config = GlobalConfig::from_toml_str(&root_line(dir.path())).expect("valid config");

    assert_eq!(config.vault_root(), dir.path().canonicalize().unwrap());
    assert_eq!(config.mode(), AgentMode::Local);
    assert_eq!(config.agent_name(), "local");
    assert!(!config.dry_run);
    assert_eq!(config.poll_interval(), Duration::from_secs(30));
    assert_eq!(config.agent.status_interval_seconds, 900);
    assert_eq!(config.scheduler.tick_seconds, 5);
    assert_eq!(config.scheduler.ai_command, "claude");
    assert_eq!(config.sync.remote, "origin");
    assert_eq!(config.sync.branch, "main");
    assert_eq!(config.sync_interval(), Duration::from_secs(300));
    assert!(config.sync.exclude_patterns.iter().any(|p| p == "**/.env"));
    assert_eq!(config.resilience.max_attempts, 3);
    assert_eq!(config.resilience.failure_threshold, 5);
    assert_eq!(config.resilience.max_calls_per_interval, 10);
    assert!(config.watchdog.workers.is_empty());
    assert!(config.adapters.is_empty());
    assert_eq!(config.watchers.seen_ids_limit, 1000);
}

#[test]
fn full_file_is_parsed() {
    let dir = tempfile::tempdir().expect("tempdir");
    let config = GlobalConfig::from_toml_str(&full_toml(dir.path())).expect("valid config");

    assert!(config.dry_run);
    assert_eq!(config.mode(), AgentMode::Cloud);
    assert_eq!(config.agent_name(), "cloud-1");
    assert_eq!(config.poll_interval(), Duration::from_secs(15));
    assert_eq!(config.scheduler.ai_command, "echo");
    assert!(config.scheduler.ai_args.is_empty());
    assert_eq!(config.scheduler.approved_sweep_seconds, 30);
    assert_eq!(config.sync.remote, "vault-remote");
    assert_eq!(config.sync.branch, "vault");
    assert_eq!(config.sync.exclude_patterns, vec!["**/.env".to_owned()]);
    assert_eq!(config.watchdog.workers.len(), 1);
    assert_eq!(config.watchdog.workers[0].max_restarts, 2);
    assert_eq!(config.watchdog.workers[0].restart_delay_seconds, 10);
    assert_eq!(config.resilience.max_attempts, 4);
    assert_eq!(config.resilience.failure_threshold, 2);
    assert_eq!(config.adapters["mail"].program, "send-mail");
    assert_eq!(config.adapters["mail"].timeout_seconds, 60);
    assert_eq!(config.watchers.seen_ids_limit, 50);
}

#[test]
fn cloud_mode_defaults_agent_name_to_cloud() {
    let dir = tempfile::tempdir().expect("tempdir");
    let raw = format!("{}[agent]\nmode = \"cloud\"\n", root_line(dir.path()));
    let config = GlobalConfig::from_toml_str(&raw).expect("valid config");
    assert_eq!(config.agent_name(), "cloud");
}

#[test]
fn missing_vault_root_is_rejected() {
    let dir = tempfile::tempdir().expect("tempdir");
    let missing = dir.path().join("nope");
    let err = GlobalConfig::from_toml_str(&root_line(&missing)).unwrap_err();
    assert!(matches!(err, AppError::Config(msg) if msg.contains("vault root")));
}

#[test]
fn vault_root_must_be_a_directory() {
    let dir = tempfile::tempdir().expect("tempdir");
    let file = dir.path().join("file.txt");
    std::fs::write(&file, "x").unwrap();
    let err = GlobalConfig::from_toml_str(&root_line(&file)).unwrap_err();
    assert!(matches!(err, AppError::Config(msg) if msg.contains("not a directory")));
}

#[test]
fn zero_interval_is_rejected() {
    let dir = tempfile::tempdir().expect("tempdir");
    let raw = format!("{}[agent]\npoll_interval_seconds = 0\n", root_line(dir.path()));
    let err = GlobalConfig::from_toml_str(&raw).unwrap_err();
    assert!(matches!(err, AppError::Config(msg) if msg.contains("agent.poll_interval_seconds")));
}

#[test]
fn agent_name_with_separator_is_rejected() {
    let dir = tempfile::tempdir().expect("tempdir");
    let raw = format!("{}[agent]\nname = \"a/b\"\n", root_line(dir.path()));
    let err = GlobalConfig::from_toml_str(&raw).unwrap_err();
    assert!(matches!(err, AppError::Config(msg) if msg.contains("invalid agent name")));
}

#[test]
fn duplicate_worker_names_are_rejected() {
    let dir = tempfile::tempdir().expect("tempdir");
    let raw = format!(
        "{}[[watchdog.workers]]\nname = \"w\"\nprogram = \"true\"\n\n[[watchdog.workers]]\nname = \"w\"\nprogram = \"true\"\n",
        root_line(dir.path())
    );
    let err = GlobalConfig::from_toml_str(&raw).unwrap_err();
    assert!(matches!(err, AppError::Config(msg) if msg.contains("duplicate watchdog worker")));
}

#[test]
fn unknown_mode_is_a_config_error() {
    let dir = tempfile::tempdir().expect("tempdir");
    let raw = format!("{}[agent]\nmode = \"edge\"\n", root_line(dir.path()));
    let err = GlobalConfig::from_toml_str(&raw).unwrap_err();
    assert!(matches!(err, AppError::Config(_)));
}

#[test]
fn load_from_missing_path_fails() {
    let dir = tempfile::tempdir().expect("tempdir");
    let err = GlobalConfig::load_from_path(dir.path().join("absent.toml")).unwrap_err();
    assert!(matches!(err, AppError::Config(msg) if msg.contains("failed to read config")));
}

#[test]
fn environment_overrides_file_values() {
    let dir = tempfile::tempdir().expect("tempdir");
    let other = tempfile::tempdir().expect("tempdir");
    let mut config = GlobalConfig::parse_toml(&full_toml(dir.path())).expect("parses");
    let other_root = other.path().display().to_string();

    config.apply_env_with(|key| match key {
        "VAULT_PATH" => Some(other_root.clone()),
        "DRY_RUN" => Some("false".into()),
        "AGENT_MODE" => Some("LOCAL".into()),
        "AGENT_NAME" => Some("desk".into()),
        "VAULT_SYNC_INTERVAL" => Some("60".into()),
        "GIT_VAULT_BRANCH" => Some("main".into()),
        "AI_AGENT_COMMAND" => Some("true".into()),
        _ => None,
    });
    config.validate().expect("valid after overrides");

    assert_eq!(config.vault_root(), other.path().canonicalize().unwrap());
    assert!(!config.dry_run);
    assert_eq!(config.mode(), AgentMode::Local);
    assert_eq!(config.agent_name(), "desk");
    assert_eq!(config.sync_interval(), Duration::from_secs(60));
    assert_eq!(config.sync.branch, "main");
    assert_eq!(config.scheduler.ai_command, "true");
}

#[test]
fn invalid_environment_values_are_ignored() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut config = GlobalConfig::parse_toml(&full_toml(dir.path())).expect("parses");

    config.apply_env_with(|key| match key {
        "VAULT_PATH" | "AGENT_NAME" => Some(String::new()),
        "AGENT_MODE" => Some("edge".into()),
        "AGENT_POLL_INTERVAL" => Some("0".into()),
        "VAULT_SYNC_INTERVAL" => Some("soon".into()),
        _ => None,
    });

    assert_eq!(config.mode(), AgentMode::Cloud);
    assert_eq!(config.agent_name(), "cloud-1");
    assert_eq!(config.agent.poll_interval_seconds, 15);
    assert_eq!(config.sync.interval_seconds, 45);
    assert_eq!(config.vault_root, dir.path());
}

#[test]
fn dry_run_flag_accepts_common_spellings() {
    for (raw, expected) in [("1", true), ("yes", true), ("ON", true), ("0", false), ("no", false)] {
        let mut config = GlobalConfig::default();
        config.apply_env_with(|key| (key == "DRY_RUN").then(|| raw.to_owned()));
        assert_eq!(config.dry_run, expected, "DRY_RUN={raw}");
    }
}
