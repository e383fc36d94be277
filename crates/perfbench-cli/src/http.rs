//! JSON-over-HTTP clients for the agent that fronts the database under test.
//!
//! Admin primitives are `POST {endpoint}/admin/{primitive}`, measurements are
//! `POST {endpoint}/benchrun`. A reply is a JSON object; `"ok": false` (or 0)
//! marks a failure described by `errmsg` and `code`.

use std::time::Duration;

use async_trait::async_trait;
use perfbench_core::settings::AgentConfig;
use perfbench_core::{
    AdminClient, AdminError, BenchRequest, BenchResponse, BuildInfo, CollectionHandle,
    GeneratorError, LoadGenerator,
};
use reqwest::StatusCode;
use serde_json::{json, Value};
use tracing::debug;

/// Server error code for "namespace exists".
const NAMESPACE_EXISTS: i64 = 48;

/// Why an agent call failed.
#[derive(Debug, Clone, PartialEq)]
enum AgentFailure {
    Transport(String),
    Rejected { code: Option<i64>, message: String },
}

/// Shared HTTP transport.
#[derive(Debug, Clone)]
struct AgentTransport {
    client: reqwest::Client,
    endpoint: String,
    timeout: Duration,
}

impl AgentTransport {
    fn new(config: &AgentConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            timeout: config.timeout(),
        }
    }

    async fn post(&self, path: &str, body: &Value, timeout: Duration) -> Result<Value, AgentFailure> {
        let url = format!("{}/{path}", self.endpoint);
        debug!(%url, "agent request");

        let response = self
            .client
            .post(&url)
            .json(body)
            .timeout(timeout)
            .send()
            .await
            .map_err(|error| AgentFailure::Transport(error.to_string()))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|error| AgentFailure::Transport(error.to_string()))?;
        interpret(status, &text)
    }
}

/// Turns an agent reply into its JSON body or a failure.
fn interpret(status: StatusCode, text: &str) -> Result<Value, AgentFailure> {
    let parsed = serde_json::from_str::<Value>(text);

    if !status.is_success() {
        let reply = parsed.unwrap_or(Value::Null);
        return Err(rejection(&reply).unwrap_or_else(|| AgentFailure::Rejected {
            code: None,
            message: format!("HTTP {status}: {text}"),
        }));
    }
    let reply = parsed
        .map_err(|error| AgentFailure::Transport(format!("reply is not JSON: {error}")))?;
    match rejection(&reply) {
        Some(failure) => Err(failure),
        None => Ok(reply),
    }
}

/// Extracts a failure from a reply with a false `ok` field.
fn rejection(reply: &Value) -> Option<AgentFailure> {
    let ok = match reply.get("ok")? {
        Value::Bool(flag) => *flag,
        Value::Number(number) => number.as_f64().is_some_and(|n| n != 0.0),
        _ => true,
    };
    if ok {
        return None;
    }
    Some(AgentFailure::Rejected {
        code: reply.get("code").and_then(Value::as_i64),
        message: reply
            .get("errmsg")
            .and_then(Value::as_str)
            .unwrap_or("unknown error")
            .to_string(),
    })
}

fn admin_error(primitive: &'static str, failure: AgentFailure) -> AdminError {
    match failure {
        AgentFailure::Transport(message) => AdminError::Transport { primitive, message },
        AgentFailure::Rejected { message, .. } => AdminError::Failed { primitive, message },
    }
}

/// Admin primitives executed by the agent.
#[derive(Debug, Clone)]
pub struct HttpAdminClient {
    transport: AgentTransport,
}

impl HttpAdminClient {
    pub fn new(config: &AgentConfig) -> Self {
        Self {
            transport: AgentTransport::new(config),
        }
    }

    async fn call(&self, primitive: &'static str, body: Value) -> Result<Value, AdminError> {
        self.transport
            .post(&format!("admin/{primitive}"), &body, self.transport.timeout)
            .await
            .map_err(|failure| admin_error(primitive, failure))
    }
}

#[async_trait]
impl AdminClient for HttpAdminClient {
    async fn drop_collection(&self, collection: &CollectionHandle) -> Result<(), AdminError> {
        self.call(
            "drop_collection",
            json!({ "db": collection.database_name(), "collection": collection.name() }),
        )
        .await?;
        Ok(())
    }

    async fn create_collection(
        &self,
        collection: &CollectionHandle,
        options: &Value,
    ) -> Result<(), AdminError> {
        let body = json!({
            "db": collection.database_name(),
            "collection": collection.name(),
            "options": options,
        });
        match self
            .transport
            .post("admin/create_collection", &body, self.transport.timeout)
            .await
        {
            Ok(_) => Ok(()),
            Err(AgentFailure::Rejected {
                code: Some(NAMESPACE_EXISTS),
                ..
            }) => Err(AdminError::AlreadyExists {
                namespace: collection.full_namespace(),
            }),
            Err(failure) => Err(admin_error("create_collection", failure)),
        }
    }

    async fn create_index(
        &self,
        collection: &CollectionHandle,
        keys: &Value,
        options: &Value,
    ) -> Result<(), AdminError> {
        self.call(
            "create_index",
            json!({
                "db": collection.database_name(),
                "collection": collection.name(),
                "keys": keys,
                "options": options,
            }),
        )
        .await?;
        Ok(())
    }

    async fn insert_documents(
        &self,
        collection: &CollectionHandle,
        documents: Vec<Value>,
    ) -> Result<(), AdminError> {
        self.call(
            "insert_documents",
            json!({
                "db": collection.database_name(),
                "collection": collection.name(),
                "documents": documents,
            }),
        )
        .await?;
        Ok(())
    }

    async fn run_command(&self, database: &str, command: &Value) -> Result<Value, AdminError> {
        self.call("run_command", json!({ "db": database, "command": command }))
            .await
    }

    async fn pending_drops(&self, databases: &[String]) -> Result<Vec<String>, AdminError> {
        let reply = self
            .call("pending_drops", json!({ "databases": databases }))
            .await?;
        match reply.get("pending") {
            None | Some(Value::Null) => Ok(Vec::new()),
            Some(pending) => serde_json::from_value(pending.clone())
                .map_err(|err| AdminError::failed("pending_drops", err.to_string())),
        }
    }

    async fn enable_sharding(&self, database: &str) -> Result<(), AdminError> {
        self.call("enable_sharding", json!({ "db": database })).await?;
        Ok(())
    }

    async fn shard_collection(&self, namespace: &str, key: &Value) -> Result<(), AdminError> {
        self.call("shard_collection", json!({ "ns": namespace, "key": key }))
            .await?;
        Ok(())
    }

    async fn fsync(&self) -> Result<(), AdminError> {
        self.call("fsync", json!({})).await?;
        Ok(())
    }

    async fn build_info(&self) -> Result<BuildInfo, AdminError> {
        let reply = self.call("build_info", json!({})).await?;
        serde_json::from_value(reply).map_err(|err| AdminError::failed("build_info", err.to_string()))
    }
}

/// Load generator run by the agent.
#[derive(Debug, Clone)]
pub struct HttpLoadGenerator {
    transport: AgentTransport,
}

impl HttpLoadGenerator {
    pub fn new(config: &AgentConfig) -> Self {
        Self {
            transport: AgentTransport::new(config),
        }
    }
}

#[async_trait]
impl LoadGenerator for HttpLoadGenerator {
    async fn run(&self, request: &BenchRequest) -> Result<BenchResponse, GeneratorError> {
        let body = serde_json::to_value(request)?;
        // The call blocks for the whole measurement window.
        let timeout = Duration::from_secs(request.seconds) + self.transport.timeout;
        let reply = self
            .transport
            .post("benchrun", &body, timeout)
            .await
            .map_err(|failure| match failure {
                AgentFailure::Transport(message) => GeneratorError::Transport(message),
                AgentFailure::Rejected { message, .. } => GeneratorError::Failed(message),
            })?;
        Ok(serde_json::from_value(reply)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ok_replies_pass() {
        assert_eq!(rejection(&json!({"ok": 1, "pending": []})), None);
        assert_eq!(rejection(&json!({"ok": true})), None);
        assert_eq!(rejection(&json!({"insert": 10.0})), None);
    }

    #[test]
    fn false_ok_is_a_rejection() {
        assert_eq!(
            rejection(&json!({"ok": 0, "code": 48, "errmsg": "collection already exists"})),
            Some(AgentFailure::Rejected {
                code: Some(NAMESPACE_EXISTS),
                message: "collection already exists".into(),
            })
        );
        assert_eq!(
            rejection(&json!({"ok": false})),
            Some(AgentFailure::Rejected {
                code: None,
                message: "unknown error".into(),
            })
        );
    }

    #[test]
    fn non_json_success_is_a_transport_failure() {
        let failure = interpret(StatusCode::OK, "<html>gateway</html>").unwrap_err();
        assert!(matches!(failure, AgentFailure::Transport(message) if message.contains("not JSON")));

        assert_eq!(
            interpret(StatusCode::OK, r#"{"ok": 1}"#).unwrap(),
            json!({"ok": 1})
        );
    }

    #[test]
    fn error_status_keeps_the_body() {
        let failure = interpret(StatusCode::BAD_GATEWAY, "upstream down").unwrap_err();
        assert_eq!(
            failure,
            AgentFailure::Rejected {
                code: None,
                message: "HTTP 502 Bad Gateway: upstream down".into(),
            }
        );

        let failure = interpret(
            StatusCode::BAD_REQUEST,
            r#"{"ok": 0, "code": 48, "errmsg": "exists"}"#,
        )
        .unwrap_err();
        assert!(matches!(failure, AgentFailure::Rejected { code: Some(48), .. }));
    }

    #[test]
    fn failures_map_to_admin_errors() {
        let err = admin_error("fsync", AgentFailure::Transport("refused".into()));
        assert!(matches!(err, AdminError::Transport { primitive: "fsync", .. }));

        let err = admin_error(
            "fsync",
            AgentFailure::Rejected {
                code: Some(1),
                message: "no".into(),
            },
        );
        assert!(matches!(err, AdminError::Failed { primitive: "fsync", .. }));
    }

    #[test]
    fn endpoint_is_normalized() {
        let transport = AgentTransport::new(&AgentConfig {
            endpoint: "http://agent:8642/".into(),
            timeout_secs: 5,
        });
        assert_eq!(transport.endpoint, "http://agent:8642");
        assert_eq!(transport.timeout, Duration::from_secs(5));
    }
}
