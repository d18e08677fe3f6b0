use astraflow_engine::{
    tools::{
        AuthScheme, HttpMethod, ParamType, RemoteEndpoint, Tool, ToolParameter, ToolRegistry,
        ToolSchema,
    },
    workflow::{RetryPolicy, Workflow, WorkflowEngine, WorkflowStep},
    Error,
};
use serde_json::{json, Map, Value};
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn args(value: Value) -> Map<String, Value> {
    value.as_object().cloned().unwrap()
}

fn register(registry: &mut ToolRegistry, name: &str, endpoint: RemoteEndpoint) {
    let schema = ToolSchema::new(name, "remote tool")
        .required("receptor", ToolParameter::new(ParamType::String));
    registry.register(schema, Tool::Remote(endpoint)).unwrap();
}

#[tokio::test]
async fn test_post_sends_json_body_with_bearer_auth() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/dock"))
        .and(header("authorization", "Bearer s3cr3t"))
        .and(body_json(json!({"receptor": "1abc.pdb", "exhaustiveness": 8})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"score": -7.2})))
        .expect(1)
        .mount(&server)
        .await;

    let mut registry = ToolRegistry::new();
    let endpoint = RemoteEndpoint::new(&format!("{}/dock", server.uri()))
        .unwrap()
        .with_auth(AuthScheme::bearer("s3cr3t"));
    register(&mut registry, "dock", endpoint);

    let out = registry
        .invoke("dock", args(json!({"receptor": "1abc.pdb", "exhaustiveness": 8})))
        .await
        .unwrap();
    assert_eq!(out, json!({"score": -7.2}));
}

#[tokio::test]
async fn test_get_flattens_arguments_into_query() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/search"))
        .and(query_param("receptor", "1abc"))
        .and(query_param("limit", "5"))
        .and(header("X-API-Key", "k-123"))
        .respond_with(ResponseTemplate::new(200).set_body_string("three hits"))
        .expect(1)
        .mount(&server)
        .await;

    let mut registry = ToolRegistry::new();
    let endpoint = RemoteEndpoint::new(&format!("{}/search", server.uri()))
        .unwrap()
        .with_method(HttpMethod::Get)
        .with_auth(AuthScheme::api_key("k-123"));
    register(&mut registry, "search", endpoint);

    let out = registry
        .invoke("search", args(json!({"receptor": "1abc", "limit": 5})))
        .await
        .unwrap();
    assert_eq!(out, json!("three hits"));
}

#[tokio::test]
async fn test_error_status_is_an_execution_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(503).set_body_string("queue full"))
        .mount(&server)
        .await;

    let mut registry = ToolRegistry::new();
    register(&mut registry, "dock", RemoteEndpoint::new(&server.uri()).unwrap());

    let err = registry
        .invoke("dock", args(json!({"receptor": "x"})))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::ToolExecution { .. }));
    let message = err.to_string();
    assert!(message.contains("503"), "{}", message);
    assert!(message.contains("queue full"), "{}", message);
}

#[tokio::test]
async fn test_timeout_is_an_execution_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"ok": true}))
                .set_delay(Duration::from_secs(2)),
        )
        .mount(&server)
        .await;

    let mut registry = ToolRegistry::new();
    let endpoint = RemoteEndpoint::new(&server.uri())
        .unwrap()
        .with_timeout(Duration::from_millis(100));
    register(&mut registry, "slow", endpoint);

    let err = registry
        .invoke("slow", args(json!({"receptor": "x"})))
        .await
        .unwrap_err();
    assert!(err.is_retryable());
    assert!(err.to_string().contains("timed out"), "{}", err);
}

#[tokio::test]
async fn test_validation_failure_sends_no_request() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let mut registry = ToolRegistry::new();
    register(&mut registry, "dock", RemoteEndpoint::new(&server.uri()).unwrap());

    let err = registry.invoke("dock", Map::new()).await.unwrap_err();
    assert!(matches!(err, Error::ParameterValidation { .. }));
}

#[tokio::test]
async fn test_engine_retries_failed_remote_calls() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"job": "done"})))
        .expect(1)
        .mount(&server)
        .await;

    let mut registry = ToolRegistry::new();
    register(&mut registry, "dock", RemoteEndpoint::new(&server.uri()).unwrap());
    let workflow = Workflow::new(
        "dock once",
        vec![WorkflowStep::new(1, "dock")
            .with_param("receptor", "1abc.pdb")
            .with_output("job")],
    );

    let outcome = WorkflowEngine::new(Arc::new(registry))
        .with_retry_policy(RetryPolicy::fixed(2, Duration::from_millis(10)))
        .execute(&workflow)
        .await
        .unwrap();

    assert!(outcome.is_completed());
    assert_eq!(outcome.logs[0].attempts, 2);
    assert_eq!(outcome.context.get("job"), Some(&json!({"job": "done"})));
    assert!(outcome.logs[0].error_kind.is_none());
}
