//! JSON-RPC 2.0 envelope and dispatch

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use axum::http::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{ErrorCodes, RpcError};
use crate::log_event;
use crate::methods::{self, Handler, Services};

/// Request message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcRequest {
    /// Must be "2.0" when present
    #[serde(default)]
    pub jsonrpc: Option<String>,
    #[serde(default)]
    pub method: Option<String>,
    #[serde(default)]
    pub params: Option<Value>,
    #[serde(default)]
    pub id: Option<Value>,
}

/// Response message; exactly one of `result` and `error` is set
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcResponse {
    pub jsonrpc: String,
    pub id: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorObject>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorObject {
    pub code: i32,
    pub message: String,
}

impl RpcResponse {
    pub fn success(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: Some(result),
            error: None,
        }
    }

    pub fn error(id: Value, code: i32, message: impl Into<String>) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: None,
            error: Some(ErrorObject {
                code,
                message: message.into(),
            }),
        }
    }
}

pub struct Dispatcher {
    services: Arc<Services>,
    methods: HashMap<&'static str, Handler>,
}

impl Dispatcher {
    pub fn new(services: Arc<Services>) -> Self {
        Self {
            services,
            methods: methods::table(),
        }
    }

    pub fn services(&self) -> &Arc<Services> {
        &self.services
    }

    /// Handle one raw request body
    pub async fn handle(&self, body: &[u8]) -> (StatusCode, RpcResponse) {
        let body: Value = match serde_json::from_slice(body) {
            Ok(body) => body,
            Err(e) => {
                tracing::warn!(error = %e, "unparseable rpc body");
                return (
                    StatusCode::BAD_REQUEST,
                    RpcResponse::error(Value::Null, ErrorCodes::PARSE_ERROR, "Parse error"),
                );
            }
        };

        // Valid JSON from here on; a bad shape is an invalid request and
        // still gets its id back when it has one
        let id = body.get("id").cloned().unwrap_or(Value::Null);
        let request: RpcRequest = match serde_json::from_value(body) {
            Ok(request) => request,
            Err(e) => {
                return (
                    StatusCode::BAD_REQUEST,
                    RpcResponse::error(
                        id,
                        ErrorCodes::INVALID_REQUEST,
                        format!("Invalid request: {e}"),
                    ),
                );
            }
        };

        if request.jsonrpc.as_deref().is_some_and(|v| v != "2.0") {
            return (
                StatusCode::BAD_REQUEST,
                RpcResponse::error(id, ErrorCodes::INVALID_REQUEST, "Invalid request: jsonrpc must be \"2.0\""),
            );
        }
        let Some(method) = request.method else {
            return (
                StatusCode::BAD_REQUEST,
                RpcResponse::error(id, ErrorCodes::INVALID_REQUEST, "Invalid request: missing method"),
            );
        };

        match self.call(&method, request.params).await {
            Ok(result) => (StatusCode::OK, RpcResponse::success(id, result)),
            Err(e) => (e.status(), RpcResponse::error(id, e.code(), e.message)),
        }
    }

    /// Run a method on the blocking pool
    pub async fn call(&self, method: &str, params: Option<Value>) -> Result<Value, RpcError> {
        let started = Instant::now();
        let result = self.invoke(method, params).await;
        let elapsed = started.elapsed();

        let outcome = match &result {
            Ok(_) => "ok",
            Err(e) => {
                e.log(method);
                e.kind.as_str()
            }
        };

        let metrics = &self.services.metrics;
        // Unknown names would blow up label cardinality
        let label = if self.methods.contains_key(method) {
            method
        } else {
            "unknown"
        };
        metrics.observe(label, outcome, elapsed);
        metrics.set_open_transactions(self.services.transactions.open_count());

        log_event!(
            level: tracing::Level::INFO,
            event: "rpc_completed",
            method: method,
            outcome: outcome,
            duration_ms: elapsed.as_millis(),
        );
        result
    }

    async fn invoke(&self, method: &str, params: Option<Value>) -> Result<Value, RpcError> {
        let handler = *self
            .methods
            .get(method)
            .ok_or_else(|| RpcError::method_not_found(method))?;

        let params = match params {
            None | Some(Value::Null) => Map::new(),
            Some(Value::Object(map)) => map,
            Some(_) => return Err(RpcError::invalid_params("params must be an object")),
        };
        tracing::info!(method, params = %summarize_params(&params), "rpc");

        let services = Arc::clone(&self.services);
        tokio::task::spawn_blocking(move || handler(&services, params))
            .await
            .unwrap_or_else(|e| Err(RpcError::internal(format!("{method} handler failed: {e}"))))
    }
}

/// Params for logging, with large lists and objects replaced by `<N items>`
pub fn summarize_params(params: &Map<String, Value>) -> Value {
    let summary = params
        .iter()
        .map(|(k, v)| {
            let size = match v {
                Value::Array(items) => Some(items.len()),
                Value::Object(map) => Some(map.len()),
                _ => None,
            };
            let value = match size {
                Some(n) if v.to_string().len() > 100 => Value::String(format!("<{n} items>")),
                _ => v.clone(),
            };
            (k.clone(), value)
        })
        .collect();
    Value::Object(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::methods::tests::services;
    use crate::methods::Params;
    use serde_json::json;

    fn dispatcher() -> Dispatcher {
        Dispatcher::new(Arc::new(services()))
    }

    async fn send(dispatcher: &Dispatcher, body: Value) -> (StatusCode, RpcResponse) {
        dispatcher.handle(body.to_string().as_bytes()).await
    }

    #[tokio::test]
    async fn test_success_echoes_id() {
        let d = dispatcher();
        let (status, response) =
            send(&d, json!({"jsonrpc": "2.0", "method": "ping", "id": 7})).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(response.id, json!(7));
        assert_eq!(response.result.unwrap()["status"], "ok");
        assert!(response.error.is_none());
    }

    #[tokio::test]
    async fn test_unknown_method() {
        let d = dispatcher();
        let (status, response) =
            send(&d, json!({"jsonrpc": "2.0", "method": "drop_everything", "id": "x"})).await;

        assert_eq!(status, StatusCode::NOT_FOUND);
        let error = response.error.unwrap();
        assert_eq!(error.code, -32601);
        assert!(error.message.contains("drop_everything"));
        assert_eq!(response.id, json!("x"));
    }

    #[tokio::test]
    async fn test_parse_error() {
        let d = dispatcher();
        let (status, response) = d.handle(b"{not json").await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(response.error.unwrap().code, -32700);
        assert_eq!(response.id, Value::Null);
    }

    #[tokio::test]
    async fn test_invalid_request() {
        let d = dispatcher();
        let (_, response) = send(&d, json!({"jsonrpc": "1.0", "method": "ping"})).await;
        assert_eq!(response.error.unwrap().code, -32600);

        let (_, response) = send(&d, json!({"jsonrpc": "2.0", "id": 1})).await;
        assert_eq!(response.error.unwrap().code, -32600);
    }

    #[tokio::test]
    async fn test_wrong_field_types_are_invalid_requests() {
        let d = dispatcher();
        let (status, response) = send(&d, json!({"jsonrpc": "2.0", "method": 5, "id": 9})).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(response.error.unwrap().code, -32600);
        assert_eq!(response.id, json!(9));

        let (_, response) = send(&d, json!({"jsonrpc": 2, "method": "ping", "id": "a"})).await;
        assert_eq!(response.error.unwrap().code, -32600);
        assert_eq!(response.id, json!("a"));

        let (_, response) = send(&d, json!(["ping"])).await;
        assert_eq!(response.error.unwrap().code, -32600);
        assert_eq!(response.id, Value::Null);
    }

    #[tokio::test]
    async fn test_panicking_handler_fails_only_its_request() {
        fn explode(_: &Services, _: Params) -> Result<Value, RpcError> {
            panic!("handler blew up");
        }

        let mut d = dispatcher();
        d.methods.insert("explode", explode);

        let (status, response) =
            send(&d, json!({"jsonrpc": "2.0", "method": "explode", "id": 1})).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        let error = response.error.unwrap();
        assert_eq!(error.code, -32603);
        assert_eq!(error.message, "Internal error");

        let (status, response) =
            send(&d, json!({"jsonrpc": "2.0", "method": "ping", "id": 2})).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(response.result.unwrap()["status"], "ok");
    }

    #[tokio::test]
    async fn test_params_must_be_object() {
        let d = dispatcher();
        let (status, response) = send(
            &d,
            json!({"jsonrpc": "2.0", "method": "execute_query", "params": ["SELECT 1"], "id": 1}),
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(response.error.unwrap().code, -32602);
    }

    #[tokio::test]
    async fn test_query_errors_map_to_codes() {
        let d = dispatcher();
        let (status, response) = send(
            &d,
            json!({"jsonrpc": "2.0", "method": "execute_query",
                   "params": {"sql": "SELECT * WHERE status = 'ready'"}, "id": 1}),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let error = response.error.unwrap();
        assert_eq!(error.code, -32001);
        assert!(error.message.contains("missing FROM"));

        let (status, response) = send(
            &d,
            json!({"jsonrpc": "2.0", "method": "execute_query",
                   "params": {"sql": "SELECT * FROM nowhere"}, "id": 2}),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(response.error.unwrap().code, -32004);
    }

    #[tokio::test]
    async fn test_media_assets_scenario() {
        let d = dispatcher();
        let (status, response) = send(
            &d,
            json!({"jsonrpc": "2.0", "method": "execute_query",
                   "params": {"sql": "SELECT * FROM media_assets WHERE status = 'ready' LIMIT 2"},
                   "id": 1}),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        let rows = response.result.unwrap();
        let rows = rows.as_array().unwrap();
        assert_eq!(rows.len(), 2);
        assert!(rows.iter().all(|r| r["status"] == "ready"));
    }

    #[tokio::test]
    async fn test_concurrent_calls() {
        let d = Arc::new(dispatcher());
        let calls: Vec<_> = (0..16)
            .map(|i| {
                let d = Arc::clone(&d);
                tokio::spawn(async move {
                    let method = if i % 2 == 0 { "begin_transaction" } else { "ping" };
                    d.call(method, None).await
                })
            })
            .collect();

        for call in calls {
            assert!(call.await.unwrap().is_ok());
        }
        assert_eq!(d.services().transactions.open_count(), 8);
    }

    #[tokio::test]
    async fn test_metrics_recorded() {
        let d = dispatcher();
        d.call("ping", None).await.unwrap();
        d.call("nope", None).await.unwrap_err();

        let text = d.services().metrics.render().unwrap();
        assert!(text.contains(r#"method="ping",outcome="ok""#));
        assert!(text.contains(r#"method="unknown",outcome="method_not_found""#));
    }

    #[test]
    fn test_summarize_params() {
        let big: Vec<i32> = (0..100).collect();
        let summary = summarize_params(
            json!({"table_name": "t", "data": {"id": big}, "key_columns": ["id"]})
                .as_object()
                .unwrap(),
        );

        assert_eq!(summary["table_name"], "t");
        assert_eq!(summary["data"], "<1 items>");
        assert_eq!(summary["key_columns"], json!(["id"]));
    }
}
