//! Guard evaluator: decides whether a relation's guard holds
//!
//! Guards are evaluated against the bound business data, flattened into
//! dotted keys (`applicant.level`, `items.0.price`). The evaluator is pure:
//! it never has side effects and never fails, an unevaluable guard simply
//! does not hold.
//!
//! Supported forms, combined with `&&` and `||` (`&&` binds tighter, no
//! parentheses):
//!
//! - `key == value`, `key != value` (string comparison, quotes optional)
//! - `key >= n`, `key <= n`, `key > n`, `key < n` (numeric)
//! - `key`, `!key` (boolean: `true` or `1`)

use flow_types::BindData;
use std::collections::HashMap;

/// Evaluates relation guards against bound data
#[derive(Clone, Debug, Default)]
pub struct GuardEvaluator;

impl GuardEvaluator {
    pub fn new() -> Self {
        Self
    }

    /// Evaluate an optional guard; `None` (or a blank guard) always holds
    pub fn evaluate(&self, guard: Option<&str>, context: &EvaluationContext) -> GuardResult {
        match guard.map(str::trim) {
            None | Some("") => GuardResult::Satisfied,
            Some(expression) => self.evaluate_expression(expression, context),
        }
    }

    fn evaluate_expression(&self, expression: &str, context: &EvaluationContext) -> GuardResult {
        let mut last_failure = None;
        for alternative in expression.split("||") {
            let mut failure = None;
            for term in alternative.split("&&") {
                if let GuardResult::NotSatisfied { reason } = self.evaluate_term(term.trim(), context)
                {
                    failure = Some(reason);
                    break;
                }
            }
            match failure {
                None => return GuardResult::Satisfied,
                Some(reason) => last_failure = Some(reason),
            }
        }
        GuardResult::NotSatisfied {
            reason: last_failure.unwrap_or_else(|| format!("Empty guard: {}", expression)),
        }
    }

    fn evaluate_term(&self, term: &str, context: &EvaluationContext) -> GuardResult {
        if let Some((key, value)) = term.split_once("==") {
            return self.compare_str(term, key, value, context, |a, b| a == b);
        }
        if let Some((key, value)) = term.split_once("!=") {
            let key = key.trim();
            if context.get(key).is_none() {
                // A missing variable differs from every value
                return GuardResult::Satisfied;
            }
            return self.compare_str(term, key, value, context, |a, b| a != b);
        }
        if let Some((key, value)) = term.split_once(">=") {
            return self.compare_num(term, key, value, context, |a, b| a >= b);
        }
        if let Some((key, value)) = term.split_once("<=") {
            return self.compare_num(term, key, value, context, |a, b| a <= b);
        }
        if let Some((key, value)) = term.split_once('>') {
            return self.compare_num(term, key, value, context, |a, b| a > b);
        }
        if let Some((key, value)) = term.split_once('<') {
            return self.compare_num(term, key, value, context, |a, b| a < b);
        }

        let (negated, key) = match term.strip_prefix('!') {
            Some(rest) => (true, rest.trim()),
            None => (false, term),
        };
        match context.get(key) {
            Some(val) => {
                let truthy = val == "true" || val == "1";
                if truthy != negated {
                    GuardResult::Satisfied
                } else {
                    GuardResult::NotSatisfied {
                        reason: format!("Boolean term '{}' is false (value: '{}')", term, val),
                    }
                }
            }
            None if negated => GuardResult::Satisfied,
            None => GuardResult::NotSatisfied {
                reason: format!("Cannot evaluate term: {}", term),
            },
        }
    }

    fn compare_str(
        &self,
        term: &str,
        key: &str,
        value: &str,
        context: &EvaluationContext,
        op: impl Fn(&str, &str) -> bool,
    ) -> GuardResult {
        let key = key.trim();
        let expected = value.trim().trim_matches('"').trim_matches('\'');
        match context.get(key) {
            Some(actual) if op(actual, expected) => GuardResult::Satisfied,
            Some(actual) => GuardResult::NotSatisfied {
                reason: format!("Condition '{}' not met (value: '{}')", term, actual),
            },
            None => GuardResult::NotSatisfied {
                reason: format!("Variable '{}' not found in bound data", key),
            },
        }
    }

    fn compare_num(
        &self,
        term: &str,
        key: &str,
        value: &str,
        context: &EvaluationContext,
        op: impl Fn(f64, f64) -> bool,
    ) -> GuardResult {
        let key = key.trim();
        let actual = context.get(key).and_then(|v| v.parse::<f64>().ok());
        let threshold = value.trim().parse::<f64>().ok();
        match (actual, threshold) {
            (Some(a), Some(t)) if op(a, t) => GuardResult::Satisfied,
            (Some(a), Some(t)) => GuardResult::NotSatisfied {
                reason: format!("Condition '{}' not met: {} vs {}", term, a, t),
            },
            _ => GuardResult::NotSatisfied {
                reason: format!("Cannot evaluate numeric condition: {}", term),
            },
        }
    }
}

/// Result of evaluating a guard
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GuardResult {
    /// The guard holds; the relation may be followed
    Satisfied,
    /// The guard does not hold
    NotSatisfied { reason: String },
}

impl GuardResult {
    pub fn is_satisfied(&self) -> bool {
        matches!(self, Self::Satisfied)
    }
}

/// Flattened view of the bound data used for guard evaluation
#[derive(Clone, Debug, Default)]
pub struct EvaluationContext {
    variables: HashMap<String, String>,
}

impl EvaluationContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Flatten a bind data snapshot into dotted keys
    pub fn from_bind_data(data: &BindData) -> Self {
        let mut ctx = Self::new();
        flatten("", &data.snapshot, &mut ctx.variables);
        ctx.variables
            .insert("entity_id".into(), data.entity_id.to_string());
        ctx
    }

    pub fn with_variable(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.variables.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.variables.get(key).map(String::as_str)
    }
}

fn flatten(prefix: &str, value: &serde_json::Value, out: &mut HashMap<String, String>) {
    let join = |segment: &str| {
        if prefix.is_empty() {
            segment.to_string()
        } else {
            format!("{}.{}", prefix, segment)
        }
    };
    match value {
        serde_json::Value::Object(map) => {
            for (k, v) in map {
                flatten(&join(k), v, out);
            }
        }
        serde_json::Value::Array(items) => {
            for (i, v) in items.iter().enumerate() {
                flatten(&join(&i.to_string()), v, out);
            }
        }
        serde_json::Value::String(s) => {
            out.insert(prefix.to_string(), s.clone());
        }
        other => {
            if !prefix.is_empty() {
                out.insert(prefix.to_string(), other.to_string());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ctx() -> EvaluationContext {
        EvaluationContext::from_bind_data(&BindData::new(
            42,
            json!({
                "amount": 1500,
                "currency": "EUR",
                "urgent": true,
                "applicant": {"level": 3, "department": "finance"},
                "items": [{"price": 9.5}]
            }),
        ))
    }

    #[test]
    fn test_no_guard_always_holds() {
        let evaluator = GuardEvaluator::new();
        assert!(evaluator.evaluate(None, &ctx()).is_satisfied());
        assert!(evaluator.evaluate(Some("  "), &ctx()).is_satisfied());
    }

    #[test]
    fn test_flattened_lookup() {
        let c = ctx();
        assert_eq!(c.get("amount"), Some("1500"));
        assert_eq!(c.get("applicant.department"), Some("finance"));
        assert_eq!(c.get("items.0.price"), Some("9.5"));
        assert_eq!(c.get("entity_id"), Some("42"));
    }

    #[test]
    fn test_string_comparisons() {
        let evaluator = GuardEvaluator::new();
        let c = ctx();
        assert!(evaluator.evaluate(Some("currency == EUR"), &c).is_satisfied());
        assert!(evaluator.evaluate(Some("currency == \"EUR\""), &c).is_satisfied());
        assert!(!evaluator.evaluate(Some("currency == USD"), &c).is_satisfied());
        assert!(evaluator.evaluate(Some("currency != USD"), &c).is_satisfied());
        assert!(evaluator.evaluate(Some("missing != x"), &c).is_satisfied());
        assert!(!evaluator.evaluate(Some("missing == x"), &c).is_satisfied());
    }

    #[test]
    fn test_numeric_comparisons() {
        let evaluator = GuardEvaluator::new();
        let c = ctx();
        assert!(evaluator.evaluate(Some("amount > 1000"), &c).is_satisfied());
        assert!(evaluator.evaluate(Some("amount >= 1500"), &c).is_satisfied());
        assert!(!evaluator.evaluate(Some("amount < 1500"), &c).is_satisfied());
        assert!(evaluator.evaluate(Some("amount <= 1500"), &c).is_satisfied());
        assert!(evaluator.evaluate(Some("applicant.level >= 3"), &c).is_satisfied());
        assert!(!evaluator.evaluate(Some("currency > 3"), &c).is_satisfied());
    }

    #[test]
    fn test_boolean_terms() {
        let evaluator = GuardEvaluator::new();
        let c = ctx();
        assert!(evaluator.evaluate(Some("urgent"), &c).is_satisfied());
        assert!(!evaluator.evaluate(Some("!urgent"), &c).is_satisfied());
        assert!(evaluator.evaluate(Some("!archived"), &c).is_satisfied());
        assert!(!evaluator.evaluate(Some("archived"), &c).is_satisfied());
    }

    #[test]
    fn test_combinators() {
        let evaluator = GuardEvaluator::new();
        let c = ctx();
        assert!(evaluator
            .evaluate(Some("amount > 1000 && currency == EUR"), &c)
            .is_satisfied());
        assert!(!evaluator
            .evaluate(Some("amount > 1000 && currency == USD"), &c)
            .is_satisfied());
        assert!(evaluator
            .evaluate(Some("currency == USD || applicant.department == finance"), &c)
            .is_satisfied());

        let result = evaluator.evaluate(Some("amount < 10 || urgent == false"), &c);
        assert!(matches!(result, GuardResult::NotSatisfied { .. }));
    }
}
