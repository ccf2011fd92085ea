//! Scripted fakes for driving the orchestrator and session in tests.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use futures::stream;
use futures::StreamExt;
use serde_json::{json, Value};

use crate::config::ModelVariant;
use crate::inference::client::{FragmentStream, GenerativeModel};
use crate::inference::errors::InferenceError;
use crate::inference::types::{GenerateContentRequest, GenerateContentResponse};
use crate::tools::errors::ToolError;
use crate::tools::registry::ToolRegistry;
use crate::tools::rest_executor::{RestBackend, RestCall, RestResponse};

pub(crate) const MANIFEST: &str = r#"[
    {"name":"searchBooks","description":"Поиск книг по названию. Использует API эндпоинт GET /api/Books","parameters":{"type":"object","properties":{"title":{"type":"string"}}}},
    {"name":"getBook","description":"Карточка книги. Использует API эндпоинт GET /api/Books/{id}","parameters":{"type":"object","required":["id"]}},
    {"name":"deleteBook","description":"Удаляет книгу. Использует API эндпоинт DELETE /api/Books/{id}","parameters":{"type":"object","required":["id"]}},
    {"name":"updateInstance","description":"Меняет статус экземпляра. Использует API эндпоинт PUT /api/BookInstance/{id}","parameters":{"type":"object","required":["id","status"]}},
    {"name":"navigateToPage","description":"Открывает страницу приложения","parameters":{"type":"object","required":["path"]}},
    {"name":"stopAgent","description":"Останавливает агента","parameters":{"type":"object"}}
]"#;

pub(crate) fn registry() -> ToolRegistry {
    ToolRegistry::from_json("test", MANIFEST).unwrap()
}

pub(crate) fn variant(streaming: bool, supports_tool_calls: bool) -> ModelVariant {
    ModelVariant {
        key: if streaming { "flash-stream" } else { "pro" }.to_string(),
        display_name: "Test model".to_string(),
        model_name: None,
        streaming,
        supports_tool_calls,
        temperature: None,
    }
}

pub(crate) fn text_response(text: &str) -> GenerateContentResponse {
    serde_json::from_value(json!({
        "candidates": [{"content": {"role": "model", "parts": [{"text": text}]}}]
    }))
    .unwrap()
}

pub(crate) fn calls_response(calls: &[(&str, Value)]) -> GenerateContentResponse {
    let parts: Vec<Value> = calls
        .iter()
        .map(|(name, args)| json!({"functionCall": {"name": name, "args": args}}))
        .collect();
    serde_json::from_value(json!({
        "candidates": [{"content": {"role": "model", "parts": parts}}]
    }))
    .unwrap()
}

// ─── Model ──────────────────────────────────────────────────────────────────

pub(crate) enum Scripted {
    Reply(GenerateContentResponse),
    Stream(Vec<GenerateContentResponse>),
    /// Yields the fragments, then never finishes.
    StreamThenHang(Vec<GenerateContentResponse>),
    Fail(u16),
    /// The request never completes.
    Hang,
}

/// Plays back scripted replies and records every request.
#[derive(Default)]
pub(crate) struct ScriptedModel {
    script: Mutex<VecDeque<Scripted>>,
    repeat: Option<GenerateContentResponse>,
    requests: Mutex<Vec<GenerateContentRequest>>,
}

impl ScriptedModel {
    pub(crate) fn new(script: Vec<Scripted>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            ..Self::default()
        }
    }

    /// Answers every request with the same response.
    pub(crate) fn repeating(response: GenerateContentResponse) -> Self {
        Self {
            repeat: Some(response),
            ..Self::default()
        }
    }

    pub(crate) fn requests(&self) -> Vec<GenerateContentRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub(crate) fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    fn next(&self, request: &GenerateContentRequest) -> Scripted {
        self.requests.lock().unwrap().push(request.clone());
        if let Some(step) = self.script.lock().unwrap().pop_front() {
            return step;
        }
        match &self.repeat {
            Some(response) => Scripted::Reply(response.clone()),
            None => Scripted::Fail(599),
        }
    }
}

fn scripted_failure(status: u16) -> InferenceError {
    InferenceError::HttpError {
        status,
        body: "scripted failure".to_string(),
    }
}

impl GenerativeModel for ScriptedModel {
    async fn generate_content(
        &self,
        _model: &ModelVariant,
        request: &GenerateContentRequest,
    ) -> Result<GenerateContentResponse, InferenceError> {
        match self.next(request) {
            Scripted::Reply(response) => Ok(response),
            Scripted::Fail(status) => Err(scripted_failure(status)),
            Scripted::Hang => futures::future::pending().await,
            Scripted::Stream(_) | Scripted::StreamThenHang(_) => {
                panic!("streaming script step used with a batch variant")
            }
        }
    }

    async fn stream_generate_content(
        &self,
        _model: &ModelVariant,
        request: &GenerateContentRequest,
    ) -> Result<FragmentStream, InferenceError> {
        match self.next(request) {
            Scripted::Reply(response) => Ok(stream::iter(vec![Ok(response)]).boxed()),
            Scripted::Stream(fragments) => Ok(stream::iter(fragments.into_iter().map(Ok)).boxed()),
            Scripted::StreamThenHang(fragments) => Ok(stream::iter(fragments.into_iter().map(Ok))
                .chain(stream::pending())
                .boxed()),
            Scripted::Fail(status) => Err(scripted_failure(status)),
            Scripted::Hang => futures::future::pending().await,
        }
    }
}

// ─── Backend ────────────────────────────────────────────────────────────────

/// Records every call; answers with JSON unless the endpoint is set to fail.
#[derive(Default)]
pub(crate) struct RecordingBackend {
    calls: Mutex<Vec<RestCall>>,
    failures: HashMap<String, u16>,
}

impl RecordingBackend {
    pub(crate) fn failing(endpoint: &str, status: u16) -> Self {
        Self {
            failures: HashMap::from([(endpoint.to_string(), status)]),
            ..Self::default()
        }
    }

    pub(crate) fn calls(&self) -> Vec<RestCall> {
        self.calls.lock().unwrap().clone()
    }
}

impl RestBackend for RecordingBackend {
    async fn execute(&self, call: &RestCall) -> Result<RestResponse, ToolError> {
        self.calls.lock().unwrap().push(call.clone());
        if let Some(&status) = self.failures.get(&call.endpoint) {
            return Err(ToolError::RequestFailed {
                endpoint: call.endpoint.clone(),
                status,
                body: "Not Found".to_string(),
            });
        }
        Ok(RestResponse::Json(json!({"endpoint": call.endpoint, "ok": true})))
    }
}
