use std::fmt;

use async_trait::async_trait;
use serde_json::{json, Map, Value};
use tracing::info;

use crate::agent::{FunctionCall, ToolDeclaration};

pub const SAVE_ANALYSIS_TOOL: &str = "save_analysis_to_vault";
pub const SCHEDULE_EVENT_TOOL: &str = "schedule_follow_up_event";

#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error("{tool}: missing required argument `{argument}`")]
    MissingArgument {
        tool: &'static str,
        argument: &'static str,
    },
    #[error("analysis payload is not valid JSON: {0}")]
    InvalidPayload(#[from] serde_json::Error),
    #[error("could not save the analysis: {0}")]
    Storage(String),
    #[error("could not schedule the event: {0}")]
    Calendar(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordId(pub String);

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventId(pub String);

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Per-user store of analyses.
#[async_trait]
pub trait Vault: Send + Sync {
    async fn save_analysis(&self, user_id: &str, analysis: &Value) -> Result<RecordId, ToolError>;
}

/// Calendar provider used by the follow-up tool.
#[async_trait]
pub trait Calendar: Send + Sync {
    async fn create_event(
        &self,
        summary: &str,
        description: &str,
        date: &str,
    ) -> Result<EventId, ToolError>;
}

/// Accepts every event without contacting a provider. Delegated calendar
/// credentials need a frontend OAuth flow, which this service does not have.
#[derive(Debug, Default, Clone, Copy)]
pub struct PlaceholderCalendar;

#[async_trait]
impl Calendar for PlaceholderCalendar {
    async fn create_event(
        &self,
        summary: &str,
        description: &str,
        date: &str,
    ) -> Result<EventId, ToolError> {
        info!(
            summary = %summary,
            date = %date,
            description_len = description.len(),
            "calendar placeholder accepted event"
        );
        Ok(EventId(format!("placeholder:{date}")))
    }
}

// ── Tool table ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ToolKind {
    SaveAnalysis,
    ScheduleFollowUp,
}

impl ToolKind {
    pub const ALL: [ToolKind; 2] = [ToolKind::SaveAnalysis, ToolKind::ScheduleFollowUp];

    pub fn name(self) -> &'static str {
        match self {
            Self::SaveAnalysis => SAVE_ANALYSIS_TOOL,
            Self::ScheduleFollowUp => SCHEDULE_EVENT_TOOL,
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.name() == name)
    }

    pub fn declaration(self) -> ToolDeclaration {
        match self {
            Self::SaveAnalysis => ToolDeclaration {
                name: self.name().into(),
                description: "Saves the analysis JSON string to the document vault for a \
                    specific user. Use this tool to permanently store the results of an \
                    analysis."
                    .into(),
                parameters: string_params(&["user_id", "analysis_data"]),
            },
            Self::ScheduleFollowUp => ToolDeclaration {
                name: self.name().into(),
                description: "Schedules a follow-up event in the user's calendar. Use this \
                    tool if the analysis contains important dates or requires a future \
                    action."
                    .into(),
                parameters: string_params(&["summary", "description", "date"]),
            },
        }
    }
}

fn string_params(names: &[&str]) -> Value {
    let properties: Map<String, Value> = names
        .iter()
        .map(|n| (n.to_string(), json!({ "type": "string" })))
        .collect();
    json!({
        "type": "object",
        "properties": properties,
        "required": names,
    })
}

/// Declarations for every tool in the table, in table order.
pub fn declarations() -> Vec<ToolDeclaration> {
    ToolKind::ALL.into_iter().map(ToolKind::declaration).collect()
}

/// A validated tool invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolCall {
    SaveAnalysis {
        user_id: String,
        analysis_data: String,
    },
    ScheduleFollowUp {
        summary: String,
        description: String,
        date: String,
    },
}

impl ToolCall {
    /// Resolve a model-proposed call against the tool table.
    /// Returns `Ok(None)` when the name is not a known tool.
    pub fn from_function_call(call: &FunctionCall) -> Result<Option<Self>, ToolError> {
        let Some(kind) = ToolKind::from_name(&call.name) else {
            return Ok(None);
        };
        let tool = kind.name();
        let call = match kind {
            ToolKind::SaveAnalysis => Self::SaveAnalysis {
                user_id: arg_text(&call.args, tool, "user_id")?,
                analysis_data: arg_text(&call.args, tool, "analysis_data")?,
            },
            ToolKind::ScheduleFollowUp => Self::ScheduleFollowUp {
                summary: arg_text(&call.args, tool, "summary")?,
                description: arg_text(&call.args, tool, "description")?,
                date: arg_text(&call.args, tool, "date")?,
            },
        };
        Ok(Some(call))
    }

    pub fn kind(&self) -> ToolKind {
        match self {
            Self::SaveAnalysis { .. } => ToolKind::SaveAnalysis,
            Self::ScheduleFollowUp { .. } => ToolKind::ScheduleFollowUp,
        }
    }

    /// Run the tool and return its confirmation string.
    pub async fn execute(
        &self,
        vault: &dyn Vault,
        calendar: &dyn Calendar,
    ) -> Result<String, ToolError> {
        match self {
            Self::SaveAnalysis {
                user_id,
                analysis_data,
            } => {
                let payload: Value = serde_json::from_str(analysis_data)?;
                let id = vault.save_analysis(user_id, &payload).await?;
                info!(user_id = %user_id, record_id = %id, "analysis saved to vault");
                Ok(format!("Successfully saved analysis with document ID: {id}"))
            },
            Self::ScheduleFollowUp {
                summary,
                description,
                date,
            } => {
                calendar.create_event(summary, description, date).await?;
                Ok(format!(
                    "Confirmation: An event named '{summary}' was scheduled for {date}."
                ))
            },
        }
    }
}

/// Arguments are text. Models sometimes send structured values (an object for
/// `analysis_data`, a number for a date); those are kept as their JSON text.
fn arg_text(
    args: &Map<String, Value>,
    tool: &'static str,
    argument: &'static str,
) -> Result<String, ToolError> {
    match args.get(argument) {
        None | Some(Value::Null) => Err(ToolError::MissingArgument { tool, argument }),
        Some(Value::String(s)) => Ok(s.clone()),
        Some(other) => Ok(other.to_string()),
    }
}
