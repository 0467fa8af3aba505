use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ── Analysis ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String")]
pub enum RiskLevel {
    /// Highly unfavorable or predatory.
    Red,
    /// Caution or unusual terms.
    Amber,
    /// Standard, fair terms.
    Green,
}

impl RiskLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Red => "Red",
            Self::Amber => "Amber",
            Self::Green => "Green",
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RiskLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "red" => Ok(Self::Red),
            "amber" => Ok(Self::Amber),
            "green" => Ok(Self::Green),
            other => Err(format!(
                "unknown risk level {other:?} (expected Red, Amber or Green)"
            )),
        }
    }
}

impl TryFrom<String> for RiskLevel {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

/// One risk-annotated clause. Identity is its position in the analysis.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClauseFinding {
    pub clause_summary: String,
    pub risk_level: RiskLevel,
    pub explanation: String,
    pub action_suggestion: String,
}

/// Structured reply to the analysis prompt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Analysis {
    pub summary: String,
    pub risk_analysis: Vec<ClauseFinding>,
}

impl Analysis {
    pub fn has_red_flags(&self) -> bool {
        self.risk_analysis
            .iter()
            .any(|c| c.risk_level == RiskLevel::Red)
    }

    pub fn count(&self, level: RiskLevel) -> usize {
        self.risk_analysis
            .iter()
            .filter(|c| c.risk_level == level)
            .count()
    }
}

// ── Agent result ─────────────────────────────────────────────────────────

/// A tool call the model requested that did not complete.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedAction {
    pub tool: String,
    pub error: String,
}

/// Outcome of one orchestrator run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentResult {
    pub analysis: Analysis,
    /// Confirmation strings, in execution order.
    pub actions_taken: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub failed_actions: Vec<FailedAction>,
    /// Tool names the model asked for that are not in the tool table.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ignored_tools: Vec<String>,
}

impl AgentResult {
    pub fn new(analysis: Analysis) -> Self {
        Self {
            analysis,
            actions_taken: Vec::new(),
            failed_actions: Vec::new(),
            ignored_tools: Vec::new(),
        }
    }

    pub fn is_partial(&self) -> bool {
        !self.failed_actions.is_empty()
    }
}

// ── Vault ────────────────────────────────────────────────────────────────

/// A persisted analysis as stored in the database.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VaultRecord {
    pub id: i64,
    pub user_id: String,
    pub analysis: serde_json::Value,
    pub created_at: DateTime<Utc>,
}
