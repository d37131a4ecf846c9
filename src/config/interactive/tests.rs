use super::*;
use tempfile::TempDir;

#[test]
fn load_existing_config_falls_back_to_defaults() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    std::fs::write(temp_dir.path().join("config.toml"), "not = [valid")
        .expect("should write config");

    let config = load_existing_config(temp_dir.path());
    assert_eq!(config.get_base_dir(), temp_dir.path());
    assert_eq!(config.llm, LlmConfig::default());
}

#[test]
fn mask_secret_hides_all_but_tail() {
    assert_eq!(mask_secret(None), "(not set)");
    assert_eq!(mask_secret(Some("abc")), "****");
    assert_eq!(mask_secret(Some("AIzaSyExample1234")), "****1234");
}

#[test]
#[serial_test::serial]
fn wizard_starts_from_the_file_without_env_overrides() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let mut saved = Config::with_base_dir(temp_dir.path());
    saved.server.port = 8123;
    saved.save().expect("should save config");

    // SAFETY: serialized with #[serial]
    unsafe {
        std::env::set_var("UNI_SCOUT_LLM_BASE_URL", "http://env-only:11434");
        std::env::set_var("UNI_SCOUT_PORT", "9100");
    }
    let config = load_existing_config(temp_dir.path());
    // SAFETY: serialized with #[serial]
    unsafe {
        std::env::remove_var("UNI_SCOUT_LLM_BASE_URL");
        std::env::remove_var("UNI_SCOUT_PORT");
    }

    assert_eq!(config.server.port, 8123);
    assert_eq!(config.llm.base_url, saved.llm.base_url);
}
