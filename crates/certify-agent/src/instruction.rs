use certify_core::tools::{SAVE_ANALYSIS_TOOL, SCHEDULE_EVENT_TOOL};

const ANALYSIS_INSTRUCTION: &str = r#"You are an expert legal AI assistant. Your purpose is to demystify complex legal documents for the average person.
Carefully review the legal document provided below.

Your task is to return a valid JSON object.
Do NOT return any other text, just the JSON. Do not wrap it in markdown code fences.
The JSON object must follow this exact structure:
{
  "summary": "A concise, 2-3 sentence summary of the document's main purpose and who it is between.",
  "risk_analysis": [
    {
      "clause_summary": "A brief, simple title for the clause. For example: 'Lease Term and Duration'.",
      "risk_level": "Red, Amber, or Green",
      "explanation": "In simple terms, what this clause means and why it has the assigned risk level. 'Red' = highly unfavorable or predatory. 'Amber' = caution or unusual clauses. 'Green' = standard, fair clauses.",
      "action_suggestion": "A clear, actionable suggestion for the user. For example: 'Confirm the termination notice period in writing' or 'Set a calendar reminder 60 days before this date.'"
    }
  ]
}"#;

/// Build the first-round prompt asking for the structured analysis.
pub fn analysis_prompt(document_text: &str) -> String {
    format!("{ANALYSIS_INSTRUCTION}\n\nLegal Document Text:\n---\n{document_text}\n---\n")
}

/// Build the second-round prompt that asks the model to pick tools.
///
/// The policy here is advice to the model; the orchestrator executes whatever
/// calls come back.
pub fn tool_selection_prompt(analysis_json: &str, user_id: &str) -> String {
    format!(
        "You are an action-oriented agent. Based on the following legal analysis, \
         decide which tools to use.\n\n\
         You MUST ALWAYS use the '{SAVE_ANALYSIS_TOOL}' tool to store the result. \
         Pass the analysis JSON below, unchanged, as `analysis_data`.\n\n\
         If the analysis contains any clauses with a 'Red' risk level or mentions \
         specific dates, ALSO use the '{SCHEDULE_EVENT_TOOL}' tool.\n\n\
         Analysis Results:\n---\n{analysis_json}\n---\n\
         User ID to use for all tools: {user_id}\n"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn analysis_prompt_embeds_document_between_rules() {
        let p = analysis_prompt("The tenant shall pay rent monthly.");
        assert!(p.contains("---\nThe tenant shall pay rent monthly.\n---"));
        assert!(p.contains("\"risk_analysis\""));
        assert!(p.contains("Do NOT return any other text"));
    }

    #[test]
    fn tool_prompt_names_both_tools_and_user() {
        let p = tool_selection_prompt("{\"summary\":\"s\"}", "user-42");
        assert!(p.contains(SAVE_ANALYSIS_TOOL));
        assert!(p.contains(SCHEDULE_EVENT_TOOL));
        assert!(p.contains("User ID to use for all tools: user-42"));
        assert!(p.contains("{\"summary\":\"s\"}"));
    }
}
