//! 配置加载集成测试
//!
//! 验证配置文件分层覆盖和环境变量覆盖。

use rules_shared::config::AppConfig;
use std::fs;
use std::path::PathBuf;

fn write_config_dir() -> PathBuf {
    let dir = std::env::temp_dir().join(format!("rules-config-{}", std::process::id()));
    fs::create_dir_all(&dir).unwrap();

    fs::write(
        dir.join("default.toml"),
        r#"
        [logging]
        level = "warn"
        format = "json"

        [rules]
        directory = "/srv/rules"
        default_key = "SIH-OBSMER"
        "#,
    )
    .unwrap();

    fs::write(
        dir.join("rule-check.toml"),
        r#"
        [rules]
        debug = true
        "#,
    )
    .unwrap();

    dir
}

// 环境变量为进程级状态，所有断言放在同一个测试中
#[test]
fn test_layered_config() {
    let dir = write_config_dir();

    // SAFETY: 本测试文件只有这一个测试会修改环境变量
    unsafe {
        std::env::set_var("CONFIG_DIR", &dir);
        std::env::set_var("RULES_ENV", "test");
    }

    // ==================== 文件分层 ====================
    let config = AppConfig::load("rule-check").unwrap();
    assert_eq!(config.service_name, "rule-check");
    assert_eq!(config.environment, "test");
    assert!(!config.is_production());
    assert_eq!(config.logging.level, "warn");
    assert!(config.logging.is_json());
    assert_eq!(config.rules.default_key, "SIH-OBSMER");
    assert!(config.rules.debug);
    assert_eq!(
        config.rules.resolve("batch.json"),
        PathBuf::from("/srv/rules/batch.json")
    );

    // 未提供服务配置文件时使用默认值
    let other = AppConfig::load("other-service").unwrap();
    assert!(!other.rules.debug);

    // ==================== 环境变量覆盖 ====================
    unsafe {
        std::env::set_var("RULES_LOGGING__LEVEL", "debug");
        std::env::set_var("RULES_RULES__DEBUG", "false");
    }

    let config = AppConfig::load("rule-check").unwrap();
    assert_eq!(config.logging.level, "debug");
    assert!(!config.rules.debug);
    assert_eq!(config.rules.default_key, "SIH-OBSMER");

    unsafe {
        std::env::remove_var("RULES_LOGGING__LEVEL");
        std::env::remove_var("RULES_RULES__DEBUG");
        std::env::remove_var("RULES_ENV");
        std::env::remove_var("CONFIG_DIR");
    }
    let _ = fs::remove_dir_all(&dir);
}
