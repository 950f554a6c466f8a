//! Opinions: the decision and advice attached to an action

use serde::{Deserialize, Serialize};

/// An operator's decision on an approval node
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Decision {
    Approve,
    Reject,
    /// No decision: drafts, saves, and administrative actions
    #[default]
    None,
}

/// Decision plus free-text advice
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Opinion {
    pub decision: Decision,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub advice: String,
}

impl Opinion {
    pub fn pass(advice: impl Into<String>) -> Self {
        Self {
            decision: Decision::Approve,
            advice: advice.into(),
        }
    }

    pub fn reject(advice: impl Into<String>) -> Self {
        Self {
            decision: Decision::Reject,
            advice: advice.into(),
        }
    }

    /// An opinion that carries only advice
    pub fn save(advice: impl Into<String>) -> Self {
        Self {
            decision: Decision::None,
            advice: advice.into(),
        }
    }

    pub fn is_decision(&self) -> bool {
        self.decision != Decision::None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_opinion_constructors() {
        assert!(Opinion::pass("ok").is_decision());
        assert_eq!(Opinion::reject("no").decision, Decision::Reject);
        assert!(!Opinion::save("draft").is_decision());
        assert_eq!(Opinion::default().decision, Decision::None);
    }
}
