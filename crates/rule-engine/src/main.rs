//! 规则校验命令行
//!
//! 用法：`rule-check <rules.json> <candidate.json>...`
//!
//! 加载规则文件后逐个校验候选对象，输出错误映射（JSON）。
//! 任一对象校验失败或规则定义有误时以非零状态退出。

use anyhow::{Context, Result, bail};
use rule_engine::RuleStore;
use rules_shared::config::AppConfig;
use rules_shared::observability;
use serde_json::Value;
use std::process::ExitCode;
use tracing::{info, warn};

const SERVICE_NAME: &str = "rule-check";

fn main() -> Result<ExitCode> {
    // 统一加载配置：从 config/{service_name}.toml 加载
    let config = AppConfig::load(SERVICE_NAME).unwrap_or_else(|e| {
        eprintln!("Failed to load config, using defaults: {}", e);
        AppConfig::default()
    });

    observability::init(&config.logging)?;

    let mut args = std::env::args().skip(1);
    let Some(rules_file) = args.next() else {
        bail!("用法: {} <rules.json> <candidate.json>...", SERVICE_NAME);
    };
    let candidates: Vec<String> = args.collect();

    let key = config.rules.default_key.as_str();
    let rules_path = config.rules.resolve(&rules_file);

    let store = RuleStore::new();
    let count = store
        .load_file(key, &rules_path)
        .with_context(|| format!("加载规则文件失败: {}", rules_path.display()))?;
    info!("已加载 {} 条规则: {}", count, rules_path.display());

    let mut invalid = 0;
    for path in &candidates {
        let content =
            std::fs::read_to_string(path).with_context(|| format!("读取候选对象失败: {}", path))?;
        let candidate: Value =
            serde_json::from_str(&content).with_context(|| format!("解析候选对象失败: {}", path))?;

        match store.control(key, &candidate, config.rules.debug)? {
            None => println!("{}: valid", path),
            Some(errors) => {
                invalid += 1;
                warn!(candidate = %path, fields = errors.len(), "校验未通过");
                println!("{}: {}", path, serde_json::to_string_pretty(&errors)?);
            }
        }
    }

    info!(checked = candidates.len(), invalid, "校验完成");

    Ok(if invalid > 0 {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    })
}
