//! Tool invoker - executes one tool call against its backing endpoint
//!
//! The logical wire contract is the same for every transport:
//! request `{tool, args}`, response `{ok, result?, error?}`.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::core::{ToolErrorKind, ToolFailure};
use crate::tools::registry::{EndpointRef, ToolDescriptor};
use crate::tools::schema;

/// Wire request sent to a tool endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolRequest {
    pub tool: String,
    pub args: Value,
}

/// Error half of a wire response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireError {
    /// One of `invalid_args`, `unreachable`, `timeout`, `remote_error`
    pub kind: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

/// Wire response returned by a tool endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResponse {
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<WireError>,
}

impl ToolResponse {
    pub fn success(result: Value) -> Self {
        Self {
            ok: true,
            result: Some(result),
            error: None,
        }
    }

    pub fn failure(failure: &ToolFailure) -> Self {
        let (kind, code) = match &failure.kind {
            ToolErrorKind::InvalidArgs => ("invalid_args", None),
            ToolErrorKind::Unreachable => ("unreachable", None),
            ToolErrorKind::Timeout => ("timeout", None),
            ToolErrorKind::RemoteError { code } => ("remote_error", Some(code.clone())),
        };
        Self {
            ok: false,
            result: None,
            error: Some(WireError {
                kind: kind.to_string(),
                message: failure.message.clone(),
                code,
            }),
        }
    }

    /// Map the wire shape onto a result
    pub fn into_result(self) -> Result<Value, ToolFailure> {
        if self.ok {
            return Ok(self.result.unwrap_or(Value::Null));
        }

        let Some(error) = self.error else {
            return Err(ToolFailure::remote("unknown", "tool reported failure without details"));
        };

        let failure = match error.kind.as_str() {
            "invalid_args" => ToolFailure::invalid_args(error.message),
            "unreachable" => ToolFailure::unreachable(error.message),
            "timeout" => ToolFailure::timeout(error.message),
            _ => ToolFailure::remote(
                error.code.unwrap_or_else(|| error.kind.clone()),
                error.message,
            ),
        };
        Err(failure)
    }
}

/// A tool implemented as an in-process function
#[async_trait]
pub trait LocalTool: Send + Sync {
    async fn call(&self, args: Value) -> Result<Value, ToolFailure>;
}

/// A generated client that speaks the wire contract for one or more tools
#[async_trait]
pub trait ToolClient: Send + Sync {
    async fn invoke(&self, request: ToolRequest) -> ToolResponse;
}

/// Executes tool calls; stateless apart from its handler tables
#[derive(Clone, Default)]
pub struct ToolInvoker {
    http: Client,
    locals: HashMap<String, Arc<dyn LocalTool>>,
    clients: HashMap<String, Arc<dyn ToolClient>>,
}

impl ToolInvoker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an in-process handler under a name referenced by `EndpointRef::Local`
    pub fn register_local(&mut self, handler: impl Into<String>, tool: Arc<dyn LocalTool>) {
        self.locals.insert(handler.into(), tool);
    }

    /// Register a client under a name referenced by `EndpointRef::Client`
    pub fn register_client(&mut self, name: impl Into<String>, client: Arc<dyn ToolClient>) {
        self.clients.insert(name.into(), client);
    }

    pub fn has_local(&self, handler: &str) -> bool {
        self.locals.contains_key(handler)
    }

    pub fn has_client(&self, name: &str) -> bool {
        self.clients.contains_key(name)
    }

    /// Invoke a tool once. Never retries.
    pub async fn invoke(
        &self,
        tool: &ToolDescriptor,
        args: Value,
        timeout: Duration,
    ) -> Result<Value, ToolFailure> {
        schema::validate(&tool.input_schema, &args)?;

        debug!(tool = %tool.name, endpoint = %tool.endpoint, "Invoking tool");

        match tokio::time::timeout(timeout, self.dispatch(tool, args)).await {
            Ok(result) => result,
            Err(_) => Err(ToolFailure::timeout(format!(
                "'{}' did not answer within {}ms",
                tool.name,
                timeout.as_millis()
            ))),
        }
    }

    async fn dispatch(&self, tool: &ToolDescriptor, args: Value) -> Result<Value, ToolFailure> {
        match &tool.endpoint {
            EndpointRef::Local { handler } => {
                let local = self.locals.get(handler).ok_or_else(|| {
                    ToolFailure::unreachable(format!("no local handler '{}'", handler))
                })?;
                local.call(args).await
            }
            EndpointRef::Client { client } => {
                let client = self.clients.get(client).ok_or_else(|| {
                    ToolFailure::unreachable(format!("no tool client '{}'", client))
                })?;
                let request = ToolRequest {
                    tool: tool.name.clone(),
                    args,
                };
                client.invoke(request).await.into_result()
            }
            EndpointRef::Http { url } => self.call_http(url, &tool.name, args).await,
        }
    }

    async fn call_http(&self, url: &str, name: &str, args: Value) -> Result<Value, ToolFailure> {
        let request = ToolRequest {
            tool: name.to_string(),
            args,
        };

        let response = self
            .http
            .post(url)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ToolFailure::timeout(e.to_string())
                } else {
                    ToolFailure::unreachable(format!("cannot reach {}: {}", url, e))
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ToolFailure::remote(status.as_u16().to_string(), body));
        }

        let body: ToolResponse = response.json().await.map_err(|e| {
            ToolFailure::remote("malformed_response", format!("bad response from {}: {}", url, e))
        })?;

        body.into_result()
    }
}
