use std::sync::Arc;

use certify_core::{
    agent::{FunctionCall, ModelBackend},
    tools::{self, Calendar, ToolCall, ToolKind, Vault},
    types::{AgentResult, FailedAction, RiskLevel},
};
use tracing::{info, warn};

use crate::{instruction, reply};

#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    #[error("model request failed: {0:#}")]
    Model(anyhow::Error),
    #[error("model reply is not a valid analysis: {source}")]
    InvalidAnalysis {
        #[source]
        source: serde_json::Error,
        /// Start of the offending reply.
        excerpt: String,
    },
}

/// Runs the two-round analysis agent for one document.
///
/// Round one asks the model for a structured [`Analysis`](certify_core::Analysis).
/// Round two hands the analysis back with the tool declarations and executes
/// whichever calls the model returns, in its order. Tool failures are recorded
/// on the result; model and parse failures abort the run.
pub struct Orchestrator {
    backend: Arc<dyn ModelBackend>,
    vault: Arc<dyn Vault>,
    calendar: Arc<dyn Calendar>,
}

impl Orchestrator {
    pub fn new(
        backend: Arc<dyn ModelBackend>,
        vault: Arc<dyn Vault>,
        calendar: Arc<dyn Calendar>,
    ) -> Self {
        Self {
            backend,
            vault,
            calendar,
        }
    }

    pub async fn run(&self, user_id: &str, document_text: &str) -> Result<AgentResult, AgentError> {
        info!(
            user_id = %user_id,
            model = %self.backend.model(),
            doc_len = document_text.len(),
            "agent step 1: analysing document"
        );
        let raw = self
            .backend
            .generate(&instruction::analysis_prompt(document_text))
            .await
            .map_err(AgentError::Model)?;
        let analysis_json = reply::strip_code_fence(&raw);
        let analysis = reply::parse_analysis(analysis_json).map_err(|source| {
            warn!(user_id = %user_id, "analysis reply did not parse: {source}");
            AgentError::InvalidAnalysis {
                source,
                excerpt: reply::excerpt(analysis_json, 200),
            }
        })?;
        info!(
            user_id = %user_id,
            clauses = analysis.risk_analysis.len(),
            red = analysis.count(RiskLevel::Red),
            amber = analysis.count(RiskLevel::Amber),
            "agent step 1 complete"
        );

        info!(user_id = %user_id, "agent step 2: asking model which tools to use");
        // Hand the model the normalised analysis rather than its raw reply.
        let analysis_json = serde_json::to_string_pretty(&analysis)
            .unwrap_or_else(|_| analysis_json.to_string());
        let turn = self
            .backend
            .generate_with_tools(
                &instruction::tool_selection_prompt(&analysis_json, user_id),
                &tools::declarations(),
            )
            .await
            .map_err(AgentError::Model)?;

        info!(
            user_id = %user_id,
            calls = turn.function_calls.len(),
            "agent step 3: executing tools chosen by the model"
        );
        let mut result = AgentResult::new(analysis);
        let mut scheduled = false;
        for call in &turn.function_calls {
            if let Some(kind) = self.dispatch(user_id, call, &mut result).await {
                scheduled |= kind == ToolKind::ScheduleFollowUp;
            }
        }
        if result.analysis.has_red_flags() && !scheduled {
            warn!(user_id = %user_id, "red-flag analysis finished without a follow-up event");
        }

        info!(
            user_id = %user_id,
            actions = result.actions_taken.len(),
            failed = result.failed_actions.len(),
            ignored = result.ignored_tools.len(),
            "agent run complete"
        );
        Ok(result)
    }

    /// Returns the kind of tool that ran successfully, if any.
    async fn dispatch(
        &self,
        user_id: &str,
        call: &FunctionCall,
        result: &mut AgentResult,
    ) -> Option<ToolKind> {
        let arg_names: Vec<&str> = call.args.keys().map(String::as_str).collect();
        info!(tool = %call.name, args = ?arg_names, "model chose tool");

        let tool = match ToolCall::from_function_call(call) {
            Ok(Some(tool)) => tool,
            Ok(None) => {
                warn!(tool = %call.name, "ignoring unknown tool requested by model");
                result.ignored_tools.push(call.name.clone());
                return None;
            },
            Err(e) => {
                warn!(tool = %call.name, "rejected tool call: {e}");
                result.failed_actions.push(FailedAction {
                    tool: call.name.clone(),
                    error: e.to_string(),
                });
                return None;
            },
        };

        if let ToolCall::SaveAnalysis { user_id: target, .. } = &tool {
            if target != user_id {
                // Honoured as sent; only flagged.
                warn!(
                    requested_by = %user_id,
                    target = %target,
                    "model addressed the vault of a different user"
                );
            }
        }

        let kind = tool.kind();
        match tool.execute(self.vault.as_ref(), self.calendar.as_ref()).await {
            Ok(confirmation) => {
                result.actions_taken.push(confirmation);
                Some(kind)
            },
            Err(e) => {
                warn!(tool = %call.name, "tool execution failed: {e}");
                result.failed_actions.push(FailedAction {
                    tool: call.name.clone(),
                    error: e.to_string(),
                });
                None
            },
        }
    }
}
