//! Front tools: actions handled locally, without a backend call.

use serde_json::{json, Value};

use crate::events::{AppEvent, EventBus};

pub const NAVIGATE_TO_PAGE: &str = "navigateToPage";
pub const STOP_AGENT: &str = "stopAgent";
pub const CANCEL_CURRENT_ACTION: &str = "cancelCurrentAction";

/// Every name the dispatcher knows how to handle.
pub const FRONT_TOOL_NAMES: [&str; 3] = [NAVIGATE_TO_PAGE, STOP_AGENT, CANCEL_CURRENT_ACTION];

/// What a front tool did, for the orchestrator's control flow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrontAction {
    Navigated { path: String, new_tab: bool },
    StopRequested,
    ActionCancelled,
    Unknown,
    /// The call was recognised but its arguments were unusable.
    Rejected,
}

/// Result of a front tool call: the text reported to the model plus the action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrontToolResult {
    pub content: String,
    pub action: FrontAction,
}

impl FrontToolResult {
    /// The `response` payload of the function result.
    pub fn to_response(&self, name: &str) -> Value {
        json!({ "name": name, "content": self.content })
    }
}

/// Dispatches front tools and publishes their side effects on the event bus.
#[derive(Debug, Clone)]
pub struct FrontToolDispatcher {
    events: EventBus,
}

impl FrontToolDispatcher {
    pub fn new(events: EventBus) -> Self {
        Self { events }
    }

    /// Handle one front tool call.
    ///
    /// `force_new_tab` is set by the orchestrator once another navigation of
    /// the same batch has taken the current tab.
    pub fn dispatch(&self, name: &str, args: &Value, force_new_tab: bool) -> FrontToolResult {
        match name {
            NAVIGATE_TO_PAGE => self.navigate(args, force_new_tab),
            STOP_AGENT => {
                self.events.publish(AppEvent::AgentStopped);
                FrontToolResult {
                    content: "Агент остановлен".to_string(),
                    action: FrontAction::StopRequested,
                }
            }
            CANCEL_CURRENT_ACTION => {
                self.events.publish(AppEvent::ActionCancelled);
                FrontToolResult {
                    content: "Текущее действие отменено".to_string(),
                    action: FrontAction::ActionCancelled,
                }
            }
            other => {
                tracing::warn!(tool = %other, "unknown front tool");
                FrontToolResult {
                    content: format!("Неизвестный инструмент: {other}"),
                    action: FrontAction::Unknown,
                }
            }
        }
    }

    fn navigate(&self, args: &Value, force_new_tab: bool) -> FrontToolResult {
        let Some(target) = NavigationTarget::from_args(args) else {
            return FrontToolResult {
                content: "Не указан путь для перехода".to_string(),
                action: FrontAction::Rejected,
            };
        };
        let path = target.path;
        let new_tab = force_new_tab || target.new_tab;

        self.events.publish(AppEvent::Navigate {
            path: path.clone(),
            new_tab,
        });
        tracing::info!(path = %path, new_tab, "navigation requested by assistant");

        let content = if new_tab {
            format!("Открыта новая вкладка со страницей {path}")
        } else {
            format!("Переход на страницу {path}")
        };

        FrontToolResult {
            content,
            action: FrontAction::Navigated { path, new_tab },
        }
    }
}

/// Validated arguments of a `navigateToPage` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NavigationTarget {
    pub path: String,
    /// The model asked for a new tab itself.
    pub new_tab: bool,
}

impl NavigationTarget {
    /// `None` when the path is missing or blank.
    pub fn from_args(args: &Value) -> Option<Self> {
        let path = args
            .get("path")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|p| !p.is_empty())?;
        let new_tab = args
            .get("newTab")
            .or_else(|| args.get("new_tab"))
            .and_then(Value::as_bool)
            .unwrap_or(false);
        Some(Self {
            path: normalize_path(path),
            new_tab,
        })
    }

    /// Whether this navigation would replace the current view.
    pub fn wants_current_tab(&self) -> bool {
        !self.new_tab
    }
}

/// In-app routes are absolute.
fn normalize_path(path: &str) -> String {
    if path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{path}")
    }
}
