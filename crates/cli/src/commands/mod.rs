pub mod config;
pub mod doctor;
pub mod drafts;
pub mod migrate;

use dealdesk_core::config::{AppConfig, LoadOptions};
use serde::Serialize;
use serde_json::Value;
use tokio::runtime::Runtime;

#[derive(Debug, Clone)]
pub struct CommandResult {
    pub exit_code: u8,
    pub output: String,
}

#[derive(Debug, Serialize)]
struct CommandOutcome {
    command: String,
    status: String,
    error_class: Option<String>,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<Value>,
}

impl CommandResult {
    pub fn success(command: &str, message: impl Into<String>) -> Self {
        Self::success_with_data(command, message, None)
    }

    pub fn success_with_data(
        command: &str,
        message: impl Into<String>,
        data: Option<Value>,
    ) -> Self {
        let payload = CommandOutcome {
            command: command.to_string(),
            status: "ok".to_string(),
            error_class: None,
            message: message.into(),
            data,
        };
        Self { exit_code: 0, output: serialize_payload(payload) }
    }

    pub fn failure(
        command: &str,
        error_class: &str,
        message: impl Into<String>,
        exit_code: u8,
    ) -> Self {
        let payload = CommandOutcome {
            command: command.to_string(),
            status: "error".to_string(),
            error_class: Some(error_class.to_string()),
            message: message.into(),
            data: None,
        };
        Self { exit_code, output: serialize_payload(payload) }
    }
}

/// A failed step inside a command, classified for the JSON outcome.
#[derive(Debug)]
pub struct CommandFailure {
    pub error_class: &'static str,
    pub exit_code: u8,
    pub error: anyhow::Error,
}

impl CommandFailure {
    pub fn into_result(self, command: &str) -> CommandResult {
        let message = format!("{:#}", self.error);
        CommandResult::failure(command, self.error_class, message, self.exit_code)
    }
}

pub trait FailWith<T> {
    fn fail_with(self, error_class: &'static str, exit_code: u8) -> Result<T, CommandFailure>;
}

impl<T, E> FailWith<T> for Result<T, E>
where
    E: Into<anyhow::Error>,
{
    fn fail_with(self, error_class: &'static str, exit_code: u8) -> Result<T, CommandFailure> {
        self.map_err(|error| CommandFailure { error_class, exit_code, error: error.into() })
    }
}

pub(crate) fn load_config(
    command: &str,
    options: &LoadOptions,
) -> Result<AppConfig, CommandResult> {
    AppConfig::load(options.clone()).map_err(|error| {
        CommandResult::failure(
            command,
            "config_validation",
            format!("configuration issue: {error}"),
            2,
        )
    })
}

pub(crate) fn current_thread_runtime(command: &str) -> Result<Runtime, CommandResult> {
    tokio::runtime::Builder::new_current_thread().enable_all().build().map_err(|error| {
        CommandResult::failure(
            command,
            "runtime_init",
            format!("failed to initialize async runtime: {error}"),
            3,
        )
    })
}

fn serialize_payload(payload: CommandOutcome) -> String {
    serde_json::to_string(&payload).unwrap_or_else(|error| {
        format!(
            "{{\"command\":\"unknown\",\"status\":\"error\",\"error_class\":\"serialization\",\"message\":\"{}\"}}",
            error.to_string().replace('\\', "\\\\").replace('"', "\\\"")
        )
    })
}

#[cfg(test)]
mod tests {
    use anyhow::Context;
    use serde_json::{json, Value};

    use super::{CommandResult, FailWith};

    #[test]
    fn data_is_omitted_when_absent() {
        let plain: Value =
            serde_json::from_str(&CommandResult::success("migrate", "done").output).expect("json");
        let with_data: Value = serde_json::from_str(
            &CommandResult::success_with_data("drafts list", "1 draft", Some(json!([1]))).output,
        )
        .expect("json");

        assert!(plain.get("data").is_none());
        assert_eq!(with_data["data"], json!([1]));
    }

    #[test]
    fn failure_message_keeps_context_chain() {
        let failed: Result<(), std::io::Error> =
            Err(std::io::Error::new(std::io::ErrorKind::NotFound, "no such table"));
        let failure = failed
            .context("listing drafts")
            .fail_with("draft_store", 6)
            .expect_err("should fail");

        let result = failure.into_result("drafts list");
        let payload: Value = serde_json::from_str(&result.output).expect("json");

        assert_eq!(result.exit_code, 6);
        assert_eq!(payload["error_class"], "draft_store");
        assert_eq!(payload["message"], "listing drafts: no such table");
    }
}
