use certify_core::types::{AgentResult, Analysis, ClauseFinding, FailedAction, RiskLevel};
use serde_json::json;

fn finding(level: RiskLevel) -> ClauseFinding {
    ClauseFinding {
        clause_summary: "Security deposit".into(),
        risk_level: level,
        explanation: "Deposit is non-refundable.".into(),
        action_suggestion: "Negotiate a refundable deposit.".into(),
    }
}

#[test]
fn risk_level_accepts_any_case() {
    assert_eq!("red".parse::<RiskLevel>().unwrap(), RiskLevel::Red);
    assert_eq!(" AMBER ".parse::<RiskLevel>().unwrap(), RiskLevel::Amber);
    assert_eq!("Green".parse::<RiskLevel>().unwrap(), RiskLevel::Green);
    assert!("yellow".parse::<RiskLevel>().is_err());
}

#[test]
fn risk_level_serializes_capitalized() {
    assert_eq!(serde_json::to_value(RiskLevel::Amber).unwrap(), json!("Amber"));
    let parsed: RiskLevel = serde_json::from_value(json!("green")).unwrap();
    assert_eq!(parsed, RiskLevel::Green);
}

#[test]
fn analysis_requires_both_fields() {
    assert!(serde_json::from_value::<Analysis>(json!({ "summary": "x" })).is_err());
    assert!(serde_json::from_value::<Analysis>(json!({ "risk_analysis": [] })).is_err());
}

#[test]
fn analysis_json_round_trip_is_exact() {
    let analysis = Analysis {
        summary: "Residential lease, 12 months.".into(),
        risk_analysis: vec![finding(RiskLevel::Red), finding(RiskLevel::Green)],
    };
    let encoded = serde_json::to_string(&analysis).unwrap();
    let decoded: Analysis = serde_json::from_str(&encoded).unwrap();
    assert_eq!(decoded, analysis);
}

#[test]
fn red_flag_detection() {
    let calm = Analysis {
        summary: String::new(),
        risk_analysis: vec![finding(RiskLevel::Green), finding(RiskLevel::Amber)],
    };
    assert!(!calm.has_red_flags());
    assert_eq!(calm.count(RiskLevel::Amber), 1);

    let alarming = Analysis {
        summary: String::new(),
        risk_analysis: vec![finding(RiskLevel::Red)],
    };
    assert!(alarming.has_red_flags());
}

#[test]
fn agent_result_omits_empty_supplements() {
    let result = AgentResult::new(Analysis {
        summary: "s".into(),
        risk_analysis: vec![],
    });
    let v = serde_json::to_value(&result).unwrap();
    let keys: Vec<&String> = v.as_object().unwrap().keys().collect();
    assert_eq!(keys.len(), 2);
    assert!(v.get("failed_actions").is_none());
    assert!(v.get("ignored_tools").is_none());
}

#[test]
fn agent_result_reports_failures() {
    let mut result = AgentResult::new(Analysis {
        summary: "s".into(),
        risk_analysis: vec![],
    });
    result.failed_actions.push(FailedAction {
        tool: "save_analysis_to_vault".into(),
        error: "disk full".into(),
    });
    assert!(result.is_partial());
    let v = serde_json::to_value(&result).unwrap();
    assert_eq!(v["failed_actions"][0]["tool"], "save_analysis_to_vault");
}
