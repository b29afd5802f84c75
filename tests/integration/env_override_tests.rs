//! Environment overrides. These tests mutate process-global variables
//! and run serially.

use agent_vault::{AgentMode, GlobalConfig};
use serial_test::serial;

const KEYS: &[&str] = &[
    "VAULT_PATH",
    "DRY_RUN",
    "AGENT_MODE",
    "AGENT_NAME",
    "AGENT_POLL_INTERVAL",
    "VAULT_SYNC_INTERVAL",
    "GIT_VAULT_BRANCH",
    "GIT_REMOTE",
    "AI_AGENT_COMMAND",
];

fn clear_env() {
    for key in KEYS {
        std::env::remove_var(key);
    }
}

#[test]
#[serial]
fn environment_overrides_file_values() {
    clear_env();
    let vault = tempfile::tempdir().expect("tempdir");
    let mut config = GlobalConfig::parse_toml(
        "vault_root = \"/does/not/exist\"\n\n[agent]\nmode = \"local\"\npoll_interval_seconds = 30\n",
    )
    .unwrap();

    std::env::set_var("VAULT_PATH", vault.path());
    std::env::set_var("DRY_RUN", "yes");
    std::env::set_var("AGENT_MODE", "cloud");
    std::env::set_var("AGENT_NAME", "cloud-east");
    std::env::set_var("AGENT_POLL_INTERVAL", "7");
    std::env::set_var("VAULT_SYNC_INTERVAL", "45");
    std::env::set_var("GIT_VAULT_BRANCH", "vault");
    std::env::set_var("GIT_REMOTE", "upstream");
    std::env::set_var("AI_AGENT_COMMAND", "my-agent");
    config.apply_env();
    clear_env();

    config.validate().unwrap();
    assert_eq!(config.vault_root(), vault.path().canonicalize().unwrap());
    assert!(config.dry_run);
    assert_eq!(config.mode(), AgentMode::Cloud);
    assert_eq!(config.agent_name(), "cloud-east");
    assert_eq!(config.agent.poll_interval_seconds, 7);
    assert_eq!(config.sync.interval_seconds, 45);
    assert_eq!(config.sync.branch, "vault");
    assert_eq!(config.sync.remote, "upstream");
    assert_eq!(config.scheduler.ai_command, "my-agent");
}

#[test]
#[serial]
fn invalid_values_are_ignored() {
    clear_env();
    let mut config = GlobalConfig::default();
    let poll = config.agent.poll_interval_seconds;
    let sync = config.sync.interval_seconds;

    std::env::set_var("AGENT_MODE", "orbital");
    std::env::set_var("AGENT_POLL_INTERVAL", "soon");
    std::env::set_var("VAULT_SYNC_INTERVAL", "0");
    std::env::set_var("AGENT_NAME", "");
    config.apply_env();
    clear_env();

    assert_eq!(config.mode(), AgentMode::Local);
    assert_eq!(config.agent.poll_interval_seconds, poll);
    assert_eq!(config.sync.interval_seconds, sync);
    assert_eq!(config.agent_name(), "local");
}

#[test]
#[serial]
fn unset_environment_changes_nothing() {
    clear_env();
    let mut config = GlobalConfig::default();
    let before = config.clone();
    config.apply_env();
    assert_eq!(config, before);
}
