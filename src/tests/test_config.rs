use std::io::Write;

use crate::{
    DispatcherError, GlobalWindowMode, Precedence,
    config::{DispatcherConfig, RedisStoreConfig},
};

#[test]
fn full_config_parses_into_options() {
    let config = DispatcherConfig::from_yaml_str(
        r#"
global_limit: 100
global_window_seconds: 30
key_prefix: api
window_mode: shared
precedence: route_first
redis:
  url: redis://127.0.0.1:6379/
  connection_count: 4
"#,
    )
    .unwrap();

    assert_eq!(
        config.redis,
        Some(RedisStoreConfig {
            url: "redis://127.0.0.1:6379/".to_string(),
            connection_count: 4,
        })
    );

    let options = config.to_options().unwrap();
    assert_eq!(*options.global_limit, 100);
    assert_eq!(*options.global_window, 30);
    assert_eq!(options.prefix.as_deref(), Some("api"));
    assert_eq!(options.window_mode, GlobalWindowMode::Shared);
    assert_eq!(options.precedence, Precedence::RouteFirst);
}

#[test]
fn defaults_apply_to_omitted_fields() {
    let config = DispatcherConfig::from_yaml_str("global_limit: 5\n").unwrap();

    assert_eq!(config.global_window_seconds, 60);
    assert_eq!(config.window_mode, GlobalWindowMode::PerClient);
    assert_eq!(config.precedence, Precedence::GlobalFirst);
    assert_eq!(config.redis, None);

    let options = config.to_options().unwrap();
    assert!(options.prefix.is_none());
}

#[test]
fn invalid_values_are_configuration_errors() {
    let zero_limit = DispatcherConfig::from_yaml_str("global_limit: 0\n").unwrap();
    assert!(matches!(
        zero_limit.to_options(),
        Err(DispatcherError::Configuration(_))
    ));

    let bad_prefix = DispatcherConfig::from_yaml_str("global_limit: 1\nkey_prefix: \"a:b\"\n")
        .unwrap();
    assert!(matches!(
        bad_prefix.to_options(),
        Err(DispatcherError::InvalidKey(_))
    ));

    assert!(matches!(
        DispatcherConfig::from_yaml_str("window_mode: sideways\n"),
        Err(DispatcherError::Configuration(_))
    ));
}

#[test]
fn from_file_reads_yaml() {
    let path = std::env::temp_dir().join(format!(
        "limit_dispatcher_config_{}.yaml",
        rand::random::<u64>()
    ));
    let mut file = std::fs::File::create(&path).unwrap();
    writeln!(file, "global_limit: 7").unwrap();
    drop(file);

    let config = DispatcherConfig::from_file(&path).unwrap();
    assert_eq!(config.global_limit, 7);
    std::fs::remove_file(&path).unwrap();

    assert!(matches!(
        DispatcherConfig::from_file(&path),
        Err(DispatcherError::Configuration(_))
    ));
}
