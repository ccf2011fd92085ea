//! Orchestrator: the assistant's tool-calling loop.
//!
//! One run takes the model-facing history and repeats:
//!
//! 1. Send the history, the mode-filtered tool declarations and the system
//!    instruction to the model (batch or streaming, per variant).
//! 2. Function calls in the reply: show one placeholder per call, execute the
//!    whole batch concurrently, append the model's call turn and one result
//!    turn, and go again.
//! 3. Text only: that is the answer.
//!
//! The loop ends on a text answer, an empty reply (fallback notice), an
//! exhausted iteration budget, a `stopAgent` call, cancellation, or a model
//! error. Tool failures never end the loop; each call's outcome goes back to
//! the model on its own.

use chrono::Utc;
use futures::future::join_all;
use futures::StreamExt;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

use crate::config::{AgentConfig, ModelVariant};
use crate::inference::client::GenerativeModel;
use crate::inference::types::{
    Content, ContentRole, FunctionCall, FunctionDeclaration, FunctionResponse,
    GenerateContentRequest, GenerationConfig, ModelReply, Part, SystemInstruction, Tool,
};
use crate::tools::errors::ToolError;
use crate::tools::front::{FrontAction, FrontToolDispatcher, NavigationTarget, NAVIGATE_TO_PAGE};
use crate::tools::registry::ToolRegistry;
use crate::tools::rest_executor::{substitute_path_params, RestBackend, RestCall};

use super::errors::AgentError;
use super::prompts::{system_instruction, FALLBACK_TEXT, MAX_ITERATIONS_TEXT};
use super::types::{AiMode, ApiCallIndicator, RunEvent, RunOutcome, RunReport, Turn, TurnKind};

/// Method tag of indicators for tools handled locally.
const FRONT_METHOD_TAG: &str = "FRONT";

// ─── Run Input ──────────────────────────────────────────────────────────────

/// Everything one run needs besides the orchestrator itself.
pub struct RunRequest<'a> {
    /// Model-facing history, ending with the new user turn.
    pub history: Vec<Content>,
    pub registry: &'a ToolRegistry,
    pub mode: AiMode,
    pub variant: &'a ModelVariant,
    pub cancel: CancellationToken,
}

// ─── Call Planning ──────────────────────────────────────────────────────────

/// How one function call of a batch will be executed.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum PlannedCall {
    Front { force_new_tab: bool },
    Rest(RestCall),
    /// Refused before execution; reported to the model as an error.
    Refused(String),
}

/// Resolve every call of a batch, in order.
///
/// Calls not offered in `mode` are refused. At most one `navigateToPage` of
/// the batch uses the current tab: the first valid one that does not ask for
/// a new tab. Every other navigation opens a new tab.
pub(crate) fn plan_calls(
    calls: &[FunctionCall],
    registry: &ToolRegistry,
    mode: AiMode,
) -> Vec<PlannedCall> {
    let mut current_tab_taken = false;
    calls
        .iter()
        .map(|call| {
            if !registry.is_allowed(&call.name, mode) {
                return PlannedCall::Refused(
                    ToolError::NotAllowedInMode {
                        name: call.name.clone(),
                        mode: mode.to_string(),
                    }
                    .to_string(),
                );
            }
            match registry.binding(&call.name) {
                Some(binding) => {
                    match substitute_path_params(&call.name, &binding.endpoint, &call.args) {
                        Ok((endpoint, params)) => PlannedCall::Rest(RestCall {
                            method: binding.method,
                            endpoint,
                            params,
                        }),
                        Err(e) => PlannedCall::Refused(e.to_string()),
                    }
                }
                None if call.name == NAVIGATE_TO_PAGE => {
                    // Only a valid navigation that stays in the current tab
                    // takes the slot.
                    let wants_current = NavigationTarget::from_args(&call.args)
                        .is_some_and(|t| t.wants_current_tab());
                    let force_new_tab = current_tab_taken;
                    if wants_current {
                        current_tab_taken = true;
                    }
                    PlannedCall::Front { force_new_tab }
                }
                None => PlannedCall::Front {
                    force_new_tab: false,
                },
            }
        })
        .collect()
}

fn indicator(call: &FunctionCall, registry: &ToolRegistry) -> ApiCallIndicator {
    let binding = registry.binding(&call.name);
    ApiCallIndicator {
        method: binding
            .map(|b| b.method.as_str())
            .unwrap_or(FRONT_METHOD_TAG)
            .to_string(),
        tool: call.name.clone(),
        endpoint: binding.map(|b| b.endpoint.clone()),
        params: call.args.clone(),
    }
}

/// Outcome of one executed call.
struct CallOutcome {
    response: Value,
    ok: bool,
    stop_requested: bool,
}

impl CallOutcome {
    fn failed(name: &str, error: String) -> Self {
        Self {
            response: json!({ "name": name, "content": Value::Null, "error": error }),
            ok: false,
            stop_requested: false,
        }
    }
}

// ─── Orchestrator ───────────────────────────────────────────────────────────

/// Drives the model and the tools for one user message at a time.
pub struct Orchestrator<M, B> {
    model: M,
    backend: B,
    front: FrontToolDispatcher,
    max_iterations: u32,
    max_tool_result_chars: usize,
}

impl<M: GenerativeModel, B: RestBackend> Orchestrator<M, B> {
    pub fn new(model: M, backend: B, front: FrontToolDispatcher, agent: &AgentConfig) -> Self {
        Self {
            model,
            backend,
            front,
            max_iterations: agent.max_iterations,
            max_tool_result_chars: agent.max_tool_result_chars,
        }
    }

    pub fn model(&self) -> &M {
        &self.model
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn max_iterations(&self) -> u32 {
        self.max_iterations
    }

    /// Run the loop until the model answers or the run otherwise ends.
    ///
    /// `on_event` receives placeholders, streamed text and stream resets as
    /// they happen. The returned report carries the turns to append to the
    /// conversation log, including those of rounds completed before a
    /// cancellation.
    pub async fn run<F>(&self, request: RunRequest<'_>, mut on_event: F) -> Result<RunReport, AgentError>
    where
        F: FnMut(RunEvent),
    {
        let RunRequest {
            mut history,
            registry,
            mode,
            variant,
            cancel,
        } = request;

        let declarations = if variant.supports_tool_calls {
            registry.declarations(mode)
        } else {
            Vec::new()
        };

        let mut turns = Vec::new();
        let mut remaining = self.max_iterations;
        let mut rounds = 0u32;

        tracing::info!(
            model = %variant.key,
            mode = %mode,
            streaming = variant.streaming,
            tools = declarations.len(),
            "assistant run started"
        );

        while remaining > 0 {
            if cancel.is_cancelled() {
                return Ok(cancelled(turns, rounds));
            }

            let request = self.build_request(&history, &declarations, variant, mode);
            let Some(reply) = self
                .request_reply(variant, &request, &cancel, &mut on_event)
                .await?
            else {
                return Ok(cancelled(turns, rounds));
            };

            if reply.has_function_calls() && !variant.supports_tool_calls {
                tracing::warn!(
                    model = %variant.key,
                    calls = reply.function_calls.len(),
                    "model without tool support returned function calls, ignoring them"
                );
            }

            if reply.has_function_calls() && variant.supports_tool_calls {
                rounds += 1;
                remaining -= 1;
                tracing::info!(
                    round = rounds,
                    remaining,
                    calls = reply.function_calls.len(),
                    "executing tool calls"
                );

                let indicators: Vec<ApiCallIndicator> = reply
                    .function_calls
                    .iter()
                    .map(|c| indicator(c, registry))
                    .collect();
                on_event(RunEvent::ToolCallsStarted(indicators.clone()));

                let outcomes = self
                    .execute_batch(&reply.function_calls, registry, mode, &mut on_event)
                    .await;

                // Calls already issued have finished; their results are dropped.
                if cancel.is_cancelled() {
                    return Ok(cancelled(turns, rounds - 1));
                }

                let stop_requested = outcomes.iter().any(|o| o.stop_requested);
                let call_content = reply.function_call_content();
                let results_content = results_content(&reply.function_calls, outcomes);

                history.push(call_content.clone());
                history.push(results_content.clone());
                turns.push(Turn::new(TurnKind::ModelFunctionCalls {
                    content: call_content,
                    indicators,
                }));
                turns.push(Turn::new(TurnKind::FunctionResults {
                    content: results_content,
                }));

                if stop_requested {
                    tracing::info!(round = rounds, "stop requested by the model");
                    return Ok(RunReport {
                        outcome: RunOutcome::Stopped,
                        turns,
                        rounds,
                    });
                }
                continue;
            }

            if reply.has_text() {
                tracing::info!(rounds, chars = reply.text.len(), "assistant answered");
                turns.push(Turn::model_text(reply.text.clone()));
                return Ok(RunReport {
                    outcome: RunOutcome::Answered(reply.text),
                    turns,
                    rounds,
                });
            }

            tracing::warn!(
                rounds,
                finish_reason = ?reply.finish_reason,
                "model returned neither text nor function calls"
            );
            turns.push(Turn::notice(FALLBACK_TEXT));
            return Ok(RunReport {
                outcome: RunOutcome::Fallback,
                turns,
                rounds,
            });
        }

        tracing::warn!(rounds, "iteration budget exhausted");
        turns.push(Turn::notice(MAX_ITERATIONS_TEXT));
        Ok(RunReport {
            outcome: RunOutcome::IterationsExhausted,
            turns,
            rounds,
        })
    }

    fn build_request(
        &self,
        history: &[Content],
        declarations: &[FunctionDeclaration],
        variant: &ModelVariant,
        mode: AiMode,
    ) -> GenerateContentRequest {
        let tools = if declarations.is_empty() {
            Vec::new()
        } else {
            vec![Tool {
                function_declarations: declarations.to_vec(),
            }]
        };
        GenerateContentRequest {
            contents: history.to_vec(),
            tools,
            system_instruction: SystemInstruction::text(system_instruction(
                Utc::now(),
                mode,
                self.max_iterations,
            )),
            generation_config: variant.temperature.map(|t| GenerationConfig {
                temperature: Some(t),
            }),
        }
    }

    /// One model exchange. `None` means the run was cancelled.
    async fn request_reply<F>(
        &self,
        variant: &ModelVariant,
        request: &GenerateContentRequest,
        cancel: &CancellationToken,
        on_event: &mut F,
    ) -> Result<Option<ModelReply>, AgentError>
    where
        F: FnMut(RunEvent),
    {
        if !variant.streaming {
            let response = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Ok(None),
                response = self.model.generate_content(variant, request) => response?,
            };
            return Ok(Some(ModelReply::from_response(&response)));
        }

        let mut stream = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Ok(None),
            stream = self.model.stream_generate_content(variant, request) => stream?,
        };

        let mut reply = ModelReply::default();
        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    on_event(RunEvent::StreamReset);
                    return Ok(None);
                }
                next = stream.next() => next,
            };
            match next {
                Some(Ok(fragment)) => {
                    let before = reply.text.len();
                    reply.absorb_response(&fragment);
                    if reply.text.len() != before {
                        on_event(RunEvent::StreamText(reply.text.clone()));
                    }
                }
                Some(Err(e)) => {
                    on_event(RunEvent::StreamReset);
                    return Err(e.into());
                }
                None => break,
            }
        }
        Ok(Some(reply))
    }

    /// Execute every call of a batch concurrently; outcomes keep call order.
    async fn execute_batch<F>(
        &self,
        calls: &[FunctionCall],
        registry: &ToolRegistry,
        mode: AiMode,
        on_event: &mut F,
    ) -> Vec<CallOutcome>
    where
        F: FnMut(RunEvent),
    {
        let plans = plan_calls(calls, registry, mode);
        let outcomes = join_all(
            calls
                .iter()
                .zip(plans)
                .map(|(call, plan)| self.execute_call(call, plan)),
        )
        .await;

        for (call, outcome) in calls.iter().zip(&outcomes) {
            on_event(RunEvent::ToolCallFinished {
                tool: call.name.clone(),
                ok: outcome.ok,
            });
        }
        outcomes
    }

    async fn execute_call(&self, call: &FunctionCall, plan: PlannedCall) -> CallOutcome {
        match plan {
            PlannedCall::Front { force_new_tab } => {
                let result = self.front.dispatch(&call.name, &call.args, force_new_tab);
                CallOutcome {
                    response: result.to_response(&call.name),
                    ok: !matches!(result.action, FrontAction::Unknown | FrontAction::Rejected),
                    stop_requested: result.action == FrontAction::StopRequested,
                }
            }
            PlannedCall::Rest(rest) => match self.backend.execute(&rest).await {
                Ok(response) => CallOutcome {
                    response: json!({
                        "name": call.name,
                        "content": response.into_model_value(self.max_tool_result_chars),
                    }),
                    ok: true,
                    stop_requested: false,
                },
                Err(e) => {
                    tracing::warn!(tool = %call.name, endpoint = %rest.endpoint, error = %e, "tool call failed");
                    CallOutcome::failed(&call.name, e.to_string())
                }
            },
            PlannedCall::Refused(reason) => {
                tracing::warn!(tool = %call.name, reason = %reason, "tool call refused");
                CallOutcome::failed(&call.name, reason)
            }
        }
    }
}

/// The function-result turn bundling every outcome of a batch.
fn results_content(calls: &[FunctionCall], outcomes: Vec<CallOutcome>) -> Content {
    Content {
        role: ContentRole::User,
        parts: calls
            .iter()
            .zip(outcomes)
            .map(|(call, outcome)| {
                Part::function_response(FunctionResponse {
                    name: call.name.clone(),
                    response: outcome.response,
                    id: call.id.clone(),
                })
            })
            .collect(),
    }
}

fn cancelled(turns: Vec<Turn>, rounds: u32) -> RunReport {
    tracing::info!(rounds, "assistant run cancelled");
    RunReport {
        outcome: RunOutcome::Cancelled,
        turns,
        rounds,
    }
}

// ─── Tests ──────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent_core::test_support::{
        calls_response, registry, text_response, variant, RecordingBackend, Scripted,
        ScriptedModel,
    };
    use crate::events::{AppEvent, EventBus};
    use crate::tools::types::HttpMethod;
    use std::time::Duration;

    fn orchestrator(
        model: ScriptedModel,
        backend: RecordingBackend,
        bus: &EventBus,
    ) -> Orchestrator<ScriptedModel, RecordingBackend> {
        Orchestrator::new(
            model,
            backend,
            FrontToolDispatcher::new(bus.clone()),
            &AgentConfig::default(),
        )
    }

    fn request<'a>(
        reg: &'a ToolRegistry,
        mode: AiMode,
        variant: &'a ModelVariant,
    ) -> RunRequest<'a> {
        RunRequest {
            history: vec![Content::user_text("Привет")],
            registry: reg,
            mode,
            variant,
            cancel: CancellationToken::new(),
        }
    }

    fn function_responses(content: &Content) -> Vec<&FunctionResponse> {
        content
            .parts
            .iter()
            .filter_map(|p| p.function_response.as_ref())
            .collect()
    }

    #[tokio::test]
    async fn test_text_only_reply_makes_no_rest_calls() {
        let bus = EventBus::new();
        let orch = orchestrator(
            ScriptedModel::new(vec![Scripted::Reply(text_response("Здравствуйте!"))]),
            RecordingBackend::default(),
            &bus,
        );
        let reg = registry();
        let v = variant(false, true);

        let report = orch.run(request(&reg, AiMode::Action, &v), |_| {}).await.unwrap();
        assert_eq!(report.outcome, RunOutcome::Answered("Здравствуйте!".into()));
        assert_eq!(report.rounds, 0);
        assert!(orch.backend().calls().is_empty());
        assert_eq!(orch.model().request_count(), 1);
        assert_eq!(report.turns.len(), 1);
    }

    #[tokio::test]
    async fn test_rest_call_substitutes_path_params() {
        let bus = EventBus::new();
        let orch = orchestrator(
            ScriptedModel::new(vec![
                Scripted::Reply(calls_response(&[(
                    "getBook",
                    json!({"id": 7, "include": "instances"}),
                )])),
                Scripted::Reply(text_response("Книга найдена.")),
            ]),
            RecordingBackend::default(),
            &bus,
        );
        let reg = registry();
        let v = variant(false, true);

        let report = orch.run(request(&reg, AiMode::Question, &v), |_| {}).await.unwrap();
        assert_eq!(report.outcome, RunOutcome::Answered("Книга найдена.".into()));

        let calls = orch.backend().calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].method, HttpMethod::Get);
        assert_eq!(calls[0].endpoint, "/api/Books/7");
        assert!(!calls[0].params.contains_key("id"));
        assert_eq!(calls[0].params["include"], "instances");

        // Second request carries the call turn and the result turn.
        let second = &orch.model().requests()[1];
        assert_eq!(second.contents.len(), 3);
        assert_eq!(second.contents[1].role, ContentRole::Model);
        let results = function_responses(&second.contents[2]);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].response["content"]["endpoint"], "/api/Books/7");
    }

    #[tokio::test]
    async fn test_two_navigations_one_current_tab() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();
        let orch = orchestrator(
            ScriptedModel::new(vec![
                Scripted::Reply(calls_response(&[
                    ("navigateToPage", json!({"path": "/admin/books"})),
                    ("navigateToPage", json!({"path": "/admin/users"})),
                ])),
                Scripted::Reply(text_response("Открыл обе страницы.")),
            ]),
            RecordingBackend::default(),
            &bus,
        );
        let reg = registry();
        let v = variant(false, true);

        orch.run(request(&reg, AiMode::Question, &v), |_| {}).await.unwrap();

        let mut tabs = Vec::new();
        while let Ok(event) = rx.try_recv() {
            if let AppEvent::Navigate { new_tab, .. } = event {
                tabs.push(new_tab);
            }
        }
        assert_eq!(tabs.len(), 2);
        assert_eq!(tabs.iter().filter(|t| !**t).count(), 1);
        assert!(orch.backend().calls().is_empty());
    }

    /// Runs one batch of navigations and returns the `new_tab` flag of every
    /// published navigation, in order.
    async fn navigation_tabs(args: Vec<Value>) -> Vec<bool> {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();
        let calls: Vec<(&str, Value)> = args.into_iter().map(|a| (NAVIGATE_TO_PAGE, a)).collect();
        let orch = orchestrator(
            ScriptedModel::new(vec![
                Scripted::Reply(calls_response(&calls)),
                Scripted::Reply(text_response("Готово.")),
            ]),
            RecordingBackend::default(),
            &bus,
        );
        let reg = registry();
        let v = variant(false, true);
        orch.run(request(&reg, AiMode::Question, &v), |_| {}).await.unwrap();

        let mut tabs = Vec::new();
        while let Ok(event) = rx.try_recv() {
            if let AppEvent::Navigate { new_tab, .. } = event {
                tabs.push(new_tab);
            }
        }
        tabs
    }

    #[tokio::test]
    async fn test_explicit_new_tab_leaves_current_tab_free() {
        let tabs = navigation_tabs(vec![
            json!({"path": "/a", "newTab": true}),
            json!({"path": "/b"}),
        ])
        .await;
        assert_eq!(tabs, vec![true, false]);
    }

    #[tokio::test]
    async fn test_rejected_navigation_leaves_current_tab_free() {
        let tabs = navigation_tabs(vec![json!({}), json!({"path": "/b"})]).await;
        assert_eq!(tabs, vec![false]);
    }

    #[tokio::test]
    async fn test_iteration_budget_exhausted() {
        let bus = EventBus::new();
        let orch = orchestrator(
            ScriptedModel::repeating(calls_response(&[("searchBooks", json!({"title": "X"}))])),
            RecordingBackend::default(),
            &bus,
        );
        let reg = registry();
        let v = variant(false, true);

        let report = orch.run(request(&reg, AiMode::Action, &v), |_| {}).await.unwrap();
        assert_eq!(report.outcome, RunOutcome::IterationsExhausted);
        assert_eq!(report.rounds, 10);
        assert_eq!(orch.model().request_count(), 10);
        assert_eq!(orch.backend().calls().len(), 10);
        match &report.turns.last().unwrap().kind {
            TurnKind::Notice { text } => assert_eq!(text, MAX_ITERATIONS_TEXT),
            other => panic!("expected notice, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_history_grows_each_round() {
        let bus = EventBus::new();
        let orch = orchestrator(
            ScriptedModel::new(vec![
                Scripted::Reply(calls_response(&[("searchBooks", json!({}))])),
                Scripted::Reply(calls_response(&[("searchBooks", json!({}))])),
                Scripted::Reply(text_response("Готово.")),
            ]),
            RecordingBackend::default(),
            &bus,
        );
        let reg = registry();
        let v = variant(false, true);

        let report = orch.run(request(&reg, AiMode::Action, &v), |_| {}).await.unwrap();
        assert_eq!(report.rounds, 2);
        let lengths: Vec<usize> = orch
            .model()
            .requests()
            .iter()
            .map(|r| r.contents.len())
            .collect();
        assert_eq!(lengths, vec![1, 3, 5]);
    }

    #[tokio::test]
    async fn test_question_mode_declarations_and_refusal() {
        let bus = EventBus::new();
        let orch = orchestrator(
            ScriptedModel::new(vec![
                Scripted::Reply(calls_response(&[("deleteBook", json!({"id": 3}))])),
                Scripted::Reply(text_response("Удаление недоступно в режиме вопросов.")),
            ]),
            RecordingBackend::default(),
            &bus,
        );
        let reg = registry();
        let v = variant(false, true);

        let report = orch.run(request(&reg, AiMode::Question, &v), |_| {}).await.unwrap();
        assert!(matches!(report.outcome, RunOutcome::Answered(_)));
        assert!(orch.backend().calls().is_empty());

        let requests = orch.model().requests();
        let declared = requests[0].declared_function_names();
        assert!(!declared.contains(&"deleteBook"));
        assert!(!declared.contains(&"updateInstance"));
        assert!(declared.contains(&"getBook"));
        assert!(declared.contains(&"navigateToPage"));

        let results = function_responses(&requests[1].contents[2]);
        assert!(results[0].response["error"]
            .as_str()
            .unwrap()
            .contains("question mode"));
    }

    #[tokio::test]
    async fn test_navigate_scenario_reports_result_and_continues() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();
        let orch = orchestrator(
            ScriptedModel::new(vec![
                Scripted::Reply(calls_response(&[(
                    "navigateToPage",
                    json!({"path": "/admin/books"}),
                )])),
                Scripted::Reply(text_response("Открыл список книг.")),
            ]),
            RecordingBackend::default(),
            &bus,
        );
        let reg = registry();
        let v = variant(false, true);

        let report = orch.run(request(&reg, AiMode::Question, &v), |_| {}).await.unwrap();
        assert_eq!(report.rounds, 1);
        assert_eq!(
            rx.try_recv().unwrap(),
            AppEvent::Navigate {
                path: "/admin/books".into(),
                new_tab: false
            }
        );

        let second = &orch.model().requests()[1];
        let results = function_responses(&second.contents[2]);
        assert_eq!(
            results[0].response,
            json!({"name": "navigateToPage", "content": "Переход на страницу /admin/books"})
        );
    }

    #[tokio::test]
    async fn test_failing_call_does_not_abort_batch() {
        let bus = EventBus::new();
        let orch = orchestrator(
            ScriptedModel::new(vec![
                Scripted::Reply(calls_response(&[
                    ("getBook", json!({"id": 404})),
                    ("searchBooks", json!({"title": "Dune"})),
                ])),
                Scripted::Reply(text_response("Одна книга не найдена.")),
            ]),
            RecordingBackend::failing("/api/Books/404", 404),
            &bus,
        );
        let reg = registry();
        let v = variant(false, true);
        let mut finished = Vec::new();

        let report = orch
            .run(request(&reg, AiMode::Action, &v), |event| {
                if let RunEvent::ToolCallFinished { tool, ok } = event {
                    finished.push((tool, ok));
                }
            })
            .await
            .unwrap();
        assert!(matches!(report.outcome, RunOutcome::Answered(_)));
        assert_eq!(orch.backend().calls().len(), 2);
        assert_eq!(
            finished,
            vec![("getBook".to_string(), false), ("searchBooks".to_string(), true)]
        );

        let second = &orch.model().requests()[1];
        let results = function_responses(&second.contents[2]);
        assert_eq!(results.len(), 2);
        assert!(results[0].response["error"].as_str().unwrap().contains("404"));
        assert_eq!(results[1].response["content"]["ok"], true);
    }

    #[tokio::test]
    async fn test_missing_path_param_refused_per_call() {
        let bus = EventBus::new();
        let orch = orchestrator(
            ScriptedModel::new(vec![
                Scripted::Reply(calls_response(&[("getBook", json!({}))])),
                Scripted::Reply(text_response("Нужен идентификатор.")),
            ]),
            RecordingBackend::default(),
            &bus,
        );
        let reg = registry();
        let v = variant(false, true);

        orch.run(request(&reg, AiMode::Action, &v), |_| {}).await.unwrap();
        assert!(orch.backend().calls().is_empty());
        let second = &orch.model().requests()[1];
        let results = function_responses(&second.contents[2]);
        assert!(results[0].response["error"].as_str().unwrap().contains("'id'"));
    }

    #[tokio::test]
    async fn test_empty_reply_falls_back() {
        let bus = EventBus::new();
        let orch = orchestrator(
            ScriptedModel::new(vec![Scripted::Reply(Default::default())]),
            RecordingBackend::default(),
            &bus,
        );
        let reg = registry();
        let v = variant(false, true);

        let report = orch.run(request(&reg, AiMode::Action, &v), |_| {}).await.unwrap();
        assert_eq!(report.outcome, RunOutcome::Fallback);
        assert!(matches!(&report.turns[0].kind, TurnKind::Notice { text } if text == FALLBACK_TEXT));
    }

    #[tokio::test]
    async fn test_model_error_ends_run() {
        let bus = EventBus::new();
        let orch = orchestrator(
            ScriptedModel::new(vec![Scripted::Fail(500)]),
            RecordingBackend::default(),
            &bus,
        );
        let reg = registry();
        let v = variant(false, true);

        let err = orch
            .run(request(&reg, AiMode::Action, &v), |_| {})
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::Inference(_)));
        assert!(err.to_string().contains("500"));
    }

    #[tokio::test]
    async fn test_stop_agent_ends_after_batch() {
        let bus = EventBus::new();
        let orch = orchestrator(
            ScriptedModel::new(vec![Scripted::Reply(calls_response(&[
                ("searchBooks", json!({})),
                ("stopAgent", json!({})),
            ]))]),
            RecordingBackend::default(),
            &bus,
        );
        let reg = registry();
        let v = variant(false, true);

        let report = orch.run(request(&reg, AiMode::Action, &v), |_| {}).await.unwrap();
        assert_eq!(report.outcome, RunOutcome::Stopped);
        assert_eq!(orch.model().request_count(), 1);
        assert_eq!(orch.backend().calls().len(), 1);
        assert_eq!(report.turns.len(), 2);
    }

    #[tokio::test]
    async fn test_streaming_reports_running_text() {
        let bus = EventBus::new();
        let orch = orchestrator(
            ScriptedModel::new(vec![Scripted::Stream(vec![
                text_response("Добрый "),
                text_response("день"),
                text_response("!"),
            ])]),
            RecordingBackend::default(),
            &bus,
        );
        let reg = registry();
        let v = variant(true, false);
        let mut seen = Vec::new();

        let report = orch
            .run(request(&reg, AiMode::Action, &v), |event| {
                if let RunEvent::StreamText(text) = event {
                    seen.push(text);
                }
            })
            .await
            .unwrap();
        assert_eq!(report.outcome, RunOutcome::Answered("Добрый день!".into()));
        assert_eq!(seen, vec!["Добрый ", "Добрый день", "Добрый день!"]);
        assert!(orch.model().requests()[0].tools.is_empty());
    }

    #[tokio::test]
    async fn test_streaming_variant_with_tools_executes_calls() {
        let bus = EventBus::new();
        let orch = orchestrator(
            ScriptedModel::new(vec![
                Scripted::Stream(vec![calls_response(&[("searchBooks", json!({"title": "Мы"}))])]),
                Scripted::Stream(vec![text_response("Найдено.")]),
            ]),
            RecordingBackend::default(),
            &bus,
        );
        let reg = registry();
        let v = variant(true, true);

        let report = orch.run(request(&reg, AiMode::Action, &v), |_| {}).await.unwrap();
        assert_eq!(report.rounds, 1);
        assert_eq!(orch.backend().calls().len(), 1);
        assert!(!orch.model().requests()[0].tools.is_empty());
    }

    #[tokio::test]
    async fn test_tool_calls_ignored_without_tool_support() {
        let bus = EventBus::new();
        let orch = orchestrator(
            ScriptedModel::new(vec![Scripted::Reply(calls_response(&[(
                "deleteBook",
                json!({"id": 1}),
            )]))]),
            RecordingBackend::default(),
            &bus,
        );
        let reg = registry();
        let v = variant(false, false);

        let report = orch.run(request(&reg, AiMode::Action, &v), |_| {}).await.unwrap();
        assert_eq!(report.outcome, RunOutcome::Fallback);
        assert!(orch.backend().calls().is_empty());
    }

    #[tokio::test]
    async fn test_cancel_during_batch_request() {
        let bus = EventBus::new();
        let orch = orchestrator(
            ScriptedModel::new(vec![Scripted::Hang]),
            RecordingBackend::default(),
            &bus,
        );
        let reg = registry();
        let v = variant(false, true);
        let req = request(&reg, AiMode::Action, &v);
        let cancel = req.cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            cancel.cancel();
        });

        let report = orch.run(req, |_| {}).await.unwrap();
        assert_eq!(report.outcome, RunOutcome::Cancelled);
        assert!(report.turns.is_empty());
    }

    #[tokio::test]
    async fn test_cancel_mid_stream_resets_text() {
        let bus = EventBus::new();
        let orch = orchestrator(
            ScriptedModel::new(vec![Scripted::StreamThenHang(vec![text_response("Част")])]),
            RecordingBackend::default(),
            &bus,
        );
        let reg = registry();
        let v = variant(true, true);
        let req = request(&reg, AiMode::Action, &v);
        let cancel = req.cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            cancel.cancel();
        });

        let mut events = Vec::new();
        let report = orch.run(req, |e| events.push(e)).await.unwrap();
        assert_eq!(report.outcome, RunOutcome::Cancelled);
        assert_eq!(
            events,
            vec![RunEvent::StreamText("Част".into()), RunEvent::StreamReset]
        );
    }

    #[tokio::test]
    async fn test_cancelled_before_start_makes_no_requests() {
        let bus = EventBus::new();
        let orch = orchestrator(ScriptedModel::default(), RecordingBackend::default(), &bus);
        let reg = registry();
        let v = variant(false, true);
        let req = request(&reg, AiMode::Action, &v);
        req.cancel.cancel();

        let report = orch.run(req, |_| {}).await.unwrap();
        assert_eq!(report.outcome, RunOutcome::Cancelled);
        assert_eq!(orch.model().request_count(), 0);
    }

    #[test]
    fn test_plan_calls_navigation_tie_break() {
        let reg = registry();
        let calls: Vec<FunctionCall> = ["/a", "/b", "/c"]
            .iter()
            .map(|p| FunctionCall {
                name: NAVIGATE_TO_PAGE.into(),
                args: json!({"path": p}),
                id: None,
            })
            .collect();
        let plans = plan_calls(&calls, &reg, AiMode::Question);
        assert_eq!(
            plans,
            vec![
                PlannedCall::Front { force_new_tab: false },
                PlannedCall::Front { force_new_tab: true },
                PlannedCall::Front { force_new_tab: true },
            ]
        );
    }

    #[test]
    fn test_plan_calls_tie_break_skips_new_tab_and_invalid() {
        let reg = registry();
        let calls: Vec<FunctionCall> = [
            json!({"path": "/a", "newTab": true}),
            json!({"path": ""}),
            json!({"path": "/b"}),
            json!({"path": "/c"}),
        ]
        .into_iter()
        .map(|args| FunctionCall {
            name: NAVIGATE_TO_PAGE.into(),
            args,
            id: None,
        })
        .collect();
        let plans = plan_calls(&calls, &reg, AiMode::Question);
        assert_eq!(
            plans,
            vec![
                PlannedCall::Front { force_new_tab: false },
                PlannedCall::Front { force_new_tab: false },
                PlannedCall::Front { force_new_tab: false },
                PlannedCall::Front { force_new_tab: true },
            ]
        );
    }

    #[test]
    fn test_indicator_tags() {
        let reg = registry();
        let rest = indicator(
            &FunctionCall {
                name: "getBook".into(),
                args: json!({"id": 1}),
                id: None,
            },
            &reg,
        );
        assert_eq!(rest.method, "GET");
        assert_eq!(rest.endpoint.as_deref(), Some("/api/Books/{id}"));

        let front = indicator(
            &FunctionCall {
                name: "navigateToPage".into(),
                args: json!({}),
                id: None,
            },
            &reg,
        );
        assert_eq!(front.method, FRONT_METHOD_TAG);
        assert!(front.endpoint.is_none());
    }
}
