use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use dealdesk_core::config::{AppConfig, LoadOptions};
use toml::Value;

use crate::commands::{load_config, CommandResult};

/// Config keys in display order with the environment variables that can set
/// them, highest precedence first.
const FIELDS: &[(&str, &[&str])] = &[
    ("database.url", &["DEALDESK_DATABASE_URL"]),
    ("database.max_connections", &["DEALDESK_DATABASE_MAX_CONNECTIONS"]),
    ("database.timeout_secs", &["DEALDESK_DATABASE_TIMEOUT_SECS"]),
    ("api.base_url", &["DEALDESK_API_BASE_URL"]),
    ("api.token", &["DEALDESK_API_TOKEN"]),
    ("api.timeout_secs", &["DEALDESK_API_TIMEOUT_SECS"]),
    ("drafts.staleness_days", &["DEALDESK_DRAFTS_STALENESS_DAYS"]),
    ("drafts.autosave_interval_secs", &["DEALDESK_DRAFTS_AUTOSAVE_INTERVAL_SECS"]),
    ("logging.level", &["DEALDESK_LOGGING_LEVEL", "DEALDESK_LOG_LEVEL"]),
    ("logging.format", &["DEALDESK_LOGGING_FORMAT", "DEALDESK_LOG_FORMAT"]),
];

pub fn run(options: &LoadOptions, json_output: bool) -> CommandResult {
    let config = match load_config("config", options) {
        Ok(config) => config,
        Err(result) => return result,
    };

    if json_output {
        return CommandResult::success_with_data(
            "config",
            "effective configuration (secrets redacted)",
            Some(config.redacted()),
        );
    }

    let config_file_path = detect_config_path(options.config_path.as_deref());
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());

    let mut lines =
        vec!["effective config (source precedence: override > env > file > default):".to_string()];
    for (key_path, env_keys) in FIELDS {
        let source =
            field_source(key_path, env_keys, config_file_doc.as_ref(), config_file_path.as_deref());
        lines.push(render_line(key_path, &display_value(&config, key_path), source));
    }

    CommandResult { exit_code: 0, output: lines.join("\n") }
}

fn display_value(config: &AppConfig, key_path: &str) -> String {
    match key_path {
        "database.url" => config.database.url.clone(),
        "database.max_connections" => config.database.max_connections.to_string(),
        "database.timeout_secs" => config.database.timeout_secs.to_string(),
        "api.base_url" => config.api.base_url.clone(),
        "api.token" => {
            if config.api.token.is_some() { "<redacted>" } else { "<unset>" }.to_string()
        }
        "api.timeout_secs" => config.api.timeout_secs.to_string(),
        "drafts.staleness_days" => config.drafts.staleness_days.to_string(),
        "drafts.autosave_interval_secs" => config.drafts.autosave_interval_secs.to_string(),
        "logging.level" => config.logging.level.clone(),
        "logging.format" => config.logging.format.as_str().to_string(),
        _ => "<unknown>".to_string(),
    }
}

fn detect_config_path(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return path.exists().then(|| path.to_path_buf());
    }

    ["dealdesk.toml", "config/dealdesk.toml"].into_iter().map(PathBuf::from).find(|p| p.exists())
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key_path: &str,
    env_keys: &[&str],
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if let Some(env_key) = env_keys.iter().find(|key| env::var_os(key).is_some()) {
        return format!("env ({env_key})");
    }

    if let Some(doc) = config_file_doc {
        if contains_path(doc, key_path) {
            let file_path = config_file_path
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "config file".to_string());
            return format!("file ({file_path})");
        }
    }

    "default".to_string()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}

fn render_line(key: &str, value: &str, source: String) -> String {
    format!("- {key} = {value} (source: {source})")
}
