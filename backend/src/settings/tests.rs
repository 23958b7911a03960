//! Unit tests for gateway settings and secret loading.

use super::*;
use env_lock::lock_env;
use mockable::MockEnv;
use rstest::rstest;
use std::collections::HashMap;
use std::ffi::OsString;
use std::io::Write;
use tempfile::NamedTempFile;
use uuid::Uuid;

const SETTINGS_VARS: [&str; 8] = [
    "GATEWAY_BIND_ADDR",
    "GATEWAY_REDIS_URL",
    "GATEWAY_DATABASE_URL",
    "GATEWAY_ALLOWED_ORIGINS",
    "GATEWAY_RATE_LIMIT",
    "GATEWAY_TYPING_EXPIRY_SECS",
    "GATEWAY_HEARTBEAT_SECS",
    "GATEWAY_DISABLE_PUSH",
];

fn cleared_env() -> Vec<(&'static str, Option<String>)> {
    SETTINGS_VARS.iter().map(|name| (*name, None)).collect()
}

fn load_from_empty_args() -> GatewaySettings {
    GatewaySettings::load_from_iter([OsString::from("messaging-gateway")])
        .expect("settings should load")
}

fn secret_file(len: usize) -> NamedTempFile {
    let mut file = NamedTempFile::new().expect("temporary secret file");
    file.write_all(&vec![b's'; len]).expect("write secret");
    file
}

fn secret_path(file: &NamedTempFile) -> String {
    file.path().to_string_lossy().into_owned()
}

fn mock_env(vars: HashMap<String, String>) -> MockEnv {
    let mut env = MockEnv::new();
    env.expect_string()
        .times(0..)
        .returning(move |key| vars.get(key).cloned());
    env
}

fn missing_secret_vars() -> HashMap<String, String> {
    HashMap::from([(
        JWT_SECRET_FILE_ENV.to_owned(),
        std::env::temp_dir()
            .join(format!("absent-{}", Uuid::new_v4()))
            .to_string_lossy()
            .into_owned(),
    )])
}

#[rstest]
fn defaults_are_used_when_missing() {
    let _guard = lock_env(cleared_env());

    let settings = load_from_empty_args();
    assert_eq!(
        settings.bind_addr().expect("default address"),
        "0.0.0.0:8080".parse::<SocketAddr>().expect("valid")
    );
    assert!(settings.redis_url.is_none());
    assert!(settings.database_url.is_none());
    assert_eq!(settings.gateway_config(), GatewayConfig::default());
}

#[rstest]
fn environment_overrides_are_respected() {
    let mut vars = cleared_env();
    vars.extend([
        ("GATEWAY_BIND_ADDR", Some("127.0.0.1:9000".to_owned())),
        ("GATEWAY_REDIS_URL", Some("redis://cache:6379".to_owned())),
        ("GATEWAY_RATE_LIMIT", Some("5".to_owned())),
        ("GATEWAY_DISABLE_PUSH", Some("true".to_owned())),
    ]);
    let _guard = lock_env(vars);

    let settings = load_from_empty_args();
    assert_eq!(
        settings.bind_addr().expect("address"),
        "127.0.0.1:9000".parse::<SocketAddr>().expect("valid")
    );
    assert_eq!(settings.redis_url.as_deref(), Some("redis://cache:6379"));
    let config = settings.gateway_config();
    assert_eq!(config.rate_limit, 5);
    assert!(!config.push_fallback_enabled);
}

#[rstest]
fn out_of_range_durations_are_clamped() {
    let mut vars = cleared_env();
    vars.extend([
        ("GATEWAY_TYPING_EXPIRY_SECS", Some("0".to_owned())),
        ("GATEWAY_HEARTBEAT_SECS", Some("100000".to_owned())),
        ("GATEWAY_RATE_LIMIT", Some("0".to_owned())),
    ]);
    let _guard = lock_env(vars);

    let config = load_from_empty_args().gateway_config();
    assert_eq!(config.typing_expiry, Duration::from_secs(1));
    assert_eq!(config.heartbeat_interval, Duration::from_secs(120));
    assert_eq!(config.rate_limit, 1);
}

#[rstest]
fn invalid_bind_address_is_reported() {
    let mut vars = cleared_env();
    vars.push(("GATEWAY_BIND_ADDR", Some("not-an-address".to_owned())));
    let _guard = lock_env(vars);

    let err = load_from_empty_args().bind_addr().expect_err("rejected");
    assert!(matches!(
        err,
        SettingsError::Invalid {
            name: "GATEWAY_BIND_ADDR",
            ..
        }
    ));
}

#[rstest]
#[case(None, BuildMode::Debug, true)]
#[case(None, BuildMode::Release, false)]
#[case(Some("http://localhost:3000, https://*.chat.example"), BuildMode::Release, true)]
#[case(Some("https://*."), BuildMode::Debug, false)]
fn origins_follow_build_mode(
    #[case] raw: Option<&str>,
    #[case] mode: BuildMode,
    #[case] ok: bool,
) {
    let mut vars = cleared_env();
    vars.push(("GATEWAY_ALLOWED_ORIGINS", raw.map(str::to_owned)));
    let _guard = lock_env(vars);

    let result = load_from_empty_args().allowed_origins(mode);
    assert_eq!(result.is_ok(), ok);
}

#[rstest]
fn release_reads_secret_file() {
    let secret = secret_file(JWT_SECRET_MIN_LEN);
    let env = mock_env(HashMap::from([(
        JWT_SECRET_FILE_ENV.to_owned(),
        secret_path(&secret),
    )]));

    let bytes = jwt_secret_from_env(&env, BuildMode::Release).expect("secret loads");
    assert_eq!(bytes.len(), JWT_SECRET_MIN_LEN);
}

#[rstest]
fn release_rejects_short_secret() {
    let secret = secret_file(JWT_SECRET_MIN_LEN - 1);
    let env = mock_env(HashMap::from([(
        JWT_SECRET_FILE_ENV.to_owned(),
        secret_path(&secret),
    )]));

    let err = jwt_secret_from_env(&env, BuildMode::Release).expect_err("too short");
    assert!(matches!(err, SettingsError::SecretTooShort { .. }));
}

#[rstest]
fn release_requires_secret_file() {
    let env = mock_env(missing_secret_vars());
    let err = jwt_secret_from_env(&env, BuildMode::Release).expect_err("missing file");
    assert!(matches!(err, SettingsError::SecretRead { .. }));
}

#[rstest]
fn release_rejects_ephemeral_secret() {
    let mut vars = missing_secret_vars();
    vars.insert(JWT_ALLOW_EPHEMERAL_ENV.to_owned(), "1".to_owned());
    let env = mock_env(vars);

    let err = jwt_secret_from_env(&env, BuildMode::Release).expect_err("ephemeral refused");
    assert!(matches!(err, SettingsError::EphemeralNotAllowed));
}

#[rstest]
fn debug_falls_back_to_ephemeral_secret() {
    let env = mock_env(missing_secret_vars());
    let first = jwt_secret_from_env(&env, BuildMode::Debug).expect("ephemeral secret");
    let second = jwt_secret_from_env(&env, BuildMode::Debug).expect("ephemeral secret");
    assert_eq!(first.len(), JWT_SECRET_MIN_LEN);
    assert_ne!(*first, *second);
}

#[rstest]
#[case("1", Some(true))]
#[case("No", Some(false))]
#[case("maybe", None)]
fn parses_boolean_toggles(#[case] raw: &str, #[case] expected: Option<bool>) {
    assert_eq!(parse_bool(raw), expected);
}
