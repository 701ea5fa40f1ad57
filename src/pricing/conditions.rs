//! Condition evaluator: boolean predicates over the evaluation context.

use rust_decimal::Decimal;

use crate::models::{CompareOp, Condition};

use super::EvaluationContext;

/// Evaluate one condition tree against the context.
///
/// The condition holds only when the base comparison passes, every `all`
/// child passes, and (when `any` is non-empty) at least one `any` child
/// passes. A metric with no value in the context fails the base comparison.
pub fn evaluate_condition(condition: &Condition, ctx: &EvaluationContext) -> bool {
    let base = match ctx.metric(condition.metric) {
        Some(actual) => compare(actual, condition.op, condition.value, &condition.values),
        None => false,
    };
    if !base {
        return false;
    }

    if !condition.all.iter().all(|c| evaluate_condition(c, ctx)) {
        return false;
    }

    if !condition.any.is_empty() && !condition.any.iter().any(|c| evaluate_condition(c, ctx)) {
        return false;
    }

    true
}

fn compare(actual: Decimal, op: CompareOp, expected: Decimal, expected_set: &[Decimal]) -> bool {
    match op {
        CompareOp::Eq => actual == expected,
        CompareOp::Neq => actual != expected,
        CompareOp::Gt => actual > expected,
        CompareOp::Gte => actual >= expected,
        CompareOp::Lt => actual < expected,
        CompareOp::Lte => actual <= expected,
        CompareOp::In => expected_set.contains(&actual),
        CompareOp::NotIn => !expected_set.contains(&actual),
    }
}
