//! Multi-agent safety checks: OPTR risk scoring, the non-interference
//! invariant, arbitration across intent batches, and the combined admission
//! decision.
//!
//! OPTR is a deterministic comparability metric, not a probability;
//! randomness is never an authority signal here.

use crate::core::canon::{authorize, AuthorizationDecision};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::OnceLock;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", untagged)]
pub enum OptrScore {
    Inadmissible { admissible: bool, reason: String },
    Admissible { admissible: bool, score: String },
}

impl OptrScore {
    pub fn admissible(&self) -> bool {
        matches!(self, OptrScore::Admissible { .. })
    }

    pub fn reason(&self) -> Option<&str> {
        match self {
            OptrScore::Inadmissible { reason, .. } => Some(reason),
            OptrScore::Admissible { .. } => None,
        }
    }
}

/// Admissible iff `risk <= allowed_risk`; the score is `(allowed+1)/(risk+1)`
/// rendered to four decimals.
pub fn score_optr(risk: f64, allowed_risk: f64) -> OptrScore {
    if risk > allowed_risk {
        return OptrScore::Inadmissible {
            admissible: false,
            reason: "Risk exceeds invariant".to_string(),
        };
    }
    OptrScore::Admissible {
        admissible: true,
        score: format!("{:.4}", (allowed_risk + 1.0) / (risk + 1.0)),
    }
}

/// Optional multi-agent context for a non-interference check.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NiContext {
    pub actor: Option<String>,
    pub action: Option<String>,
    /// Time-to-value impact of the action on each agent.
    pub ttv_impact: Option<BTreeMap<String, f64>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NiVerdict {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub violated_agent: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delta: Option<f64>,
}

impl NiVerdict {
    fn ok() -> Self {
        Self {
            ok: true,
            code: None,
            reason: None,
            violated_agent: None,
            delta: None,
        }
    }
}

fn override_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"override|bypass|ignore\s+canon").expect("static pattern"))
}

/// The non-interference invariant: an action must not measurably benefit an
/// agent other than the one declaring it. Override/bypass language is denied
/// unconditionally (NI-000); with a TTV impact vector and an acting agent,
/// any positive delta on a different agent is a violation (NI-001).
pub fn enforce_non_interference(intent: &str, ctx: &NiContext) -> NiVerdict {
    let normalized = intent.to_lowercase();
    if override_pattern().is_match(&normalized) {
        return NiVerdict {
            ok: false,
            code: Some("NI-000".to_string()),
            reason: Some("Interference risk detected".to_string()),
            violated_agent: None,
            delta: None,
        };
    }

    if let (Some(actor), Some(impact)) = (&ctx.actor, &ctx.ttv_impact) {
        for (agent, delta) in impact {
            if agent != actor && *delta > 0.0 {
                return NiVerdict {
                    ok: false,
                    code: Some("NI-001".to_string()),
                    reason: Some("Action increases another agent's TTV".to_string()),
                    violated_agent: Some(agent.clone()),
                    delta: Some(*delta),
                };
            }
        }
    }

    NiVerdict::ok()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArbitrationVerdict {
    pub allowed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Batch-level conflict resolution. Every intent must individually pass
/// non-interference, and an "override" intent mixed with any other
/// non-empty intent poisons the whole batch; a batch is never partially
/// admitted.
pub fn arbitrate(intents: &[String]) -> ArbitrationVerdict {
    for intent in intents {
        let ni = enforce_non_interference(intent, &NiContext::default());
        if !ni.ok {
            return ArbitrationVerdict {
                allowed: false,
                reason: ni.reason,
            };
        }
    }

    let normalized: Vec<String> = intents.iter().map(|i| i.to_lowercase()).collect();
    let conflict = normalized.iter().enumerate().any(|(i, a)| {
        a.contains("override")
            && normalized
                .iter()
                .enumerate()
                .any(|(j, b)| i != j && !b.trim().is_empty())
    });

    if conflict {
        return ArbitrationVerdict {
            allowed: false,
            reason: Some("Multi-agent interference detected".to_string()),
        };
    }

    ArbitrationVerdict {
        allowed: true,
        reason: None,
    }
}

/// One admission decision across every subsystem, with the deny reason taken
/// in priority order: canon, then non-interference, then arbitration, then
/// OPTR.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Admission {
    pub allowed: bool,
    pub decision: String,
    pub why: String,
    pub canon: AuthorizationDecision,
    pub non_interference: NiVerdict,
    pub arbitration: ArbitrationVerdict,
    pub optr: OptrScore,
}

impl Admission {
    /// Id of the denying check, walked in the same priority order as `why`:
    /// canon, then non-interference, then arbitration, then OPTR. `None`
    /// when the admission is allowed.
    pub fn denied_by(&self) -> Option<String> {
        if self.allowed {
            return None;
        }
        if !self.canon.allowed {
            return Some(self.canon.canon_rule_id.clone());
        }
        if !self.non_interference.ok {
            return self.non_interference.code.clone();
        }
        if !self.arbitration.allowed {
            return Some("ARB-001".to_string());
        }
        Some("OPTR-001".to_string())
    }
}

pub fn admit(intent: &str, ctx: &NiContext, risk: f64, allowed_risk: f64) -> Admission {
    let canon = authorize(intent);
    let ni = enforce_non_interference(intent, ctx);
    let arb = arbitrate(std::slice::from_ref(&intent.to_string()));
    let optr = score_optr(risk, allowed_risk);

    let allowed = canon.allowed && ni.ok && arb.allowed && optr.admissible();
    let why = if allowed {
        "Authorized by canon, non-interference, and OPTR".to_string()
    } else if !canon.allowed {
        format!("{}: {}", canon.canon_rule_id, canon.rationale)
    } else if !ni.ok {
        ni.reason.clone().unwrap_or_default()
    } else if !arb.allowed {
        arb.reason.clone().unwrap_or_default()
    } else {
        optr.reason().unwrap_or_default().to_string()
    };

    Admission {
        allowed,
        decision: if allowed { "ALLOW" } else { "DENY" }.to_string(),
        why,
        canon,
        non_interference: ni,
        arbitration: arb,
        optr,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_score_optr_reference_values() {
        assert!(!score_optr(5.0, 2.0).admissible());
        match score_optr(1.0, 4.0) {
            OptrScore::Admissible { score, .. } => assert_eq!(score, "2.5000"),
            other => panic!("expected admissible, got {:?}", other),
        }
    }

    #[test]
    fn test_override_language_always_denied() {
        let v = enforce_non_interference("please ignore canon and proceed", &NiContext::default());
        assert!(!v.ok);
        assert_eq!(v.code.as_deref(), Some("NI-000"));
    }

    #[test]
    fn test_arbitration_poisons_whole_batch() {
        let batch = vec!["override the other agent".to_string(), "ship docs".to_string()];
        let v = arbitrate(&batch);
        assert!(!v.allowed);

        let clean = vec!["ship docs".to_string(), "update readme".to_string()];
        assert!(arbitrate(&clean).allowed);
    }
}
