//! One-shot execution of the binary's subcommands.
//!
//! Each command talks straight to the analysis backend with the credentials
//! from [`Config`] and returns the JSON the caller should print. Interactive
//! flows (accounts, quotas, saved templates) live on [`crate::Session`];
//! this module covers the operator-facing surface only.

use std::path::Path;

use anyhow::Context;
use serde_json::Value;

use crate::analysis::{AnalysisClient, FilePart};
use crate::config::{Command, Config};
use crate::errors::{Error, Result};

/// Run one subcommand to completion and return its printable output.
pub async fn execute(command: &Command, config: &Config) -> Result<Value> {
    let analysis = AnalysisClient::new(&config.backend);

    match command {
        Command::Extract {
            path,
            template_id,
            detach,
        } => {
            let file = read_file_part(path).await?;
            let token = require_token(config)?;
            if *detach {
                let task_id = analysis.async_extract(file, template_id.as_deref(), token).await?;
                Ok(Value::String(task_id))
            } else {
                let extraction = match template_id.as_deref() {
                    Some(id) => analysis.extract_with_template(file, id, token).await?,
                    None => analysis.extract(file, token).await?,
                };
                Ok(serde_json::to_value(extraction)?)
            }
        }
        Command::Status { task_id } => {
            let token = require_token(config)?;
            let finished = analysis.task_status(task_id, token).await?;
            Ok(Value::Bool(finished))
        }
        Command::Result { task_id } => {
            let token = require_token(config)?;
            let extraction = analysis.task_result(task_id, token).await?;
            Ok(serde_json::to_value(extraction)?)
        }
        Command::Harmonize { path } => {
            let bytes = tokio::fs::read(path)
                .await
                .with_context(|| format!("Failed to read {}", path.display()))?;
            let summaries: Vec<Value> = serde_json::from_slice(&bytes)?;
            analysis.harmonize_templates(&summaries).await
        }
        Command::RegisterClient => {
            let token = require_token(config)?;
            let credentials = analysis.register_client(token).await?;
            Ok(serde_json::to_value(credentials)?)
        }
        Command::RegenerateSecret => {
            let uid = config.backend.user_uid.as_deref().ok_or_else(|| Error::BadRequest {
                message: "backend.user_uid is not configured".to_string(),
            })?;
            let credentials = analysis.regenerate_client_secret(uid).await?;
            Ok(serde_json::to_value(credentials)?)
        }
    }
}

fn require_token(config: &Config) -> Result<&str> {
    config.backend.token.as_deref().ok_or_else(|| Error::BadRequest {
        message: "backend.token is not configured".to_string(),
    })
}

async fn read_file_part(path: &Path) -> Result<FilePart> {
    let name = path
        .file_name()
        .and_then(|name| name.to_str())
        .ok_or_else(|| Error::BadRequest {
            message: format!("{} has no file name", path.display()),
        })?;
    let content = tokio::fs::read(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;
    Ok(FilePart::new(name, content))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BackendConfig;
    use serde_json::json;
    use std::time::Duration;
    use url::Url;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config_for(url: &str, token: Option<&str>, user_uid: Option<&str>) -> Config {
        crate::install_test_crypto_provider();
        Config {
            backend: BackendConfig {
                url: Url::parse(url).unwrap(),
                timeout: Duration::from_secs(5),
                token: token.map(String::from),
                user_uid: user_uid.map(String::from),
            },
        }
    }

    #[tokio::test]
    async fn test_extract_uploads_the_named_file() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/extract"))
            .and(header("authorization", "Bearer tok-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "nb_pages": 2,
                "summary": {"total": "12.00"}
            })))
            .expect(1)
            .mount(&mock_server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let file_path = dir.path().join("invoice.pdf");
        std::fs::write(&file_path, b"%PDF").unwrap();

        let config = config_for(&mock_server.uri(), Some("tok-1"), None);
        let command = Command::Extract {
            path: file_path,
            template_id: None,
            detach: false,
        };

        let output = execute(&command, &config).await.unwrap();
        assert_eq!(output["nb_pages"], 2);
        assert_eq!(output["summary"]["total"], "12.00");
    }

    #[tokio::test]
    async fn test_extract_detached_returns_the_task_id() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/async-extract"))
            .respond_with(ResponseTemplate::new(200).set_body_json("task-42"))
            .expect(1)
            .mount(&mock_server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let file_path = dir.path().join("slow.pdf");
        std::fs::write(&file_path, b"%PDF").unwrap();

        let config = config_for(&mock_server.uri(), Some("tok-1"), None);
        let command = Command::Extract {
            path: file_path,
            template_id: None,
            detach: true,
        };

        let output = execute(&command, &config).await.unwrap();
        assert_eq!(output, Value::String("task-42".to_string()));
    }

    #[tokio::test]
    async fn test_status_returns_the_flag() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/status/task-42"))
            .respond_with(ResponseTemplate::new(200).set_body_json(true))
            .mount(&mock_server)
            .await;

        let config = config_for(&mock_server.uri(), Some("tok-1"), None);
        let command = Command::Status {
            task_id: "task-42".to_string(),
        };

        assert_eq!(execute(&command, &config).await.unwrap(), Value::Bool(true));
    }

    #[tokio::test]
    async fn test_harmonize_posts_the_file_contents() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/harmonize-templates"))
            .and(body_json(json!([{"a": 1}, {"b": 2}])))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"result": {"a": 1, "b": 2}})))
            .expect(1)
            .mount(&mock_server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let file_path = dir.path().join("summaries.json");
        std::fs::write(&file_path, r#"[{"a": 1}, {"b": 2}]"#).unwrap();

        let config = config_for(&mock_server.uri(), None, None);
        let command = Command::Harmonize { path: file_path };

        let output = execute(&command, &config).await.unwrap();
        assert_eq!(output, json!({"a": 1, "b": 2}));
    }

    #[tokio::test]
    async fn test_extract_without_a_token_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let file_path = dir.path().join("invoice.pdf");
        std::fs::write(&file_path, b"%PDF").unwrap();

        let config = config_for("http://127.0.0.1:1", None, None);
        let command = Command::Extract {
            path: file_path,
            template_id: None,
            detach: false,
        };

        let err = execute(&command, &config).await.unwrap_err();
        assert_eq!(err.user_message(), "backend.token is not configured");
    }

    #[tokio::test]
    async fn test_regenerate_secret_without_a_uid_is_rejected() {
        let config = config_for("http://127.0.0.1:1", None, None);

        let err = execute(&Command::RegenerateSecret, &config).await.unwrap_err();
        assert_eq!(err.user_message(), "backend.user_uid is not configured");
    }

    #[tokio::test]
    async fn test_regenerate_secret_sends_the_uid_header() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/regenerate-client-secret"))
            .and(header("X-User-UID", "uid-7"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "client_id": "cid-7",
                "client_secret": "cs-7"
            })))
            .expect(1)
            .mount(&mock_server)
            .await;

        let config = config_for(&mock_server.uri(), None, Some("uid-7"));

        let output = execute(&Command::RegenerateSecret, &config).await.unwrap();
        assert_eq!(output["client_secret"], "cs-7");
    }
}
