//! Reducers applied to the values of a parent's children
//!
//! Every function receives only the values that take part in the reduction:
//! nulls have already been dropped or replaced by zero according to the
//! column's missing-value policy. An empty input yields [`Value::Null`].

use std::cmp::Ordering;

use crate::table::{FillPolicy, Value};

// ============================================================================
// Dispatch
// ============================================================================

/// Apply the reducer of an aggregating fill policy
///
/// `weights` is only read by [`FillPolicy::MeanPopWeighted`] and must be
/// aligned with `values`. Non-aggregating policies yield null.
pub fn reduce(policy: FillPolicy, values: &[Value], weights: &[Value]) -> Value {
    match policy {
        FillPolicy::SumChildren => sum(values),
        FillPolicy::MaxChildren => max(values),
        FillPolicy::MinChildren => min(values),
        FillPolicy::MeanChildren => mean(values),
        FillPolicy::MedianChildren => median(values),
        FillPolicy::MeanPopWeighted => weighted_mean(values, weights),
        FillPolicy::None | FillPolicy::Inherit => Value::Null,
    }
}

// ============================================================================
// Sum and extremes
// ============================================================================

/// Sum of values
///
/// Integers stay integers unless the sum overflows or a float is present.
pub fn sum(values: &[Value]) -> Value {
    if values.is_empty() {
        return Value::Null;
    }

    let mut int_total: Option<i64> = Some(0);
    let mut float_total = 0.0;
    for value in values {
        match value {
            Value::Int(i) => {
                int_total = int_total.and_then(|t| t.checked_add(*i));
                float_total += *i as f64;
            },
            Value::Float(f) => {
                int_total = None;
                float_total += f;
            },
            _ => {},
        }
    }

    match int_total {
        Some(total) => Value::Int(total),
        None => Value::Float(float_total),
    }
}

/// Largest value
pub fn max(values: &[Value]) -> Value {
    values
        .iter()
        .filter(|v| v.is_numeric())
        .max_by(|a, b| a.numeric_cmp(b))
        .cloned()
        .unwrap_or(Value::Null)
}

/// Smallest value
pub fn min(values: &[Value]) -> Value {
    values
        .iter()
        .filter(|v| v.is_numeric())
        .min_by(|a, b| a.numeric_cmp(b))
        .cloned()
        .unwrap_or(Value::Null)
}

// ============================================================================
// Statistics
// ============================================================================

/// Arithmetic mean
pub fn mean(values: &[Value]) -> Value {
    let numbers: Vec<f64> = values.iter().filter_map(Value::as_f64).collect();
    if numbers.is_empty() {
        return Value::Null;
    }
    Value::Float(numbers.iter().sum::<f64>() / numbers.len() as f64)
}

/// Median; the mean of the two middle values for even counts
pub fn median(values: &[Value]) -> Value {
    let mut numbers: Vec<f64> = values.iter().filter_map(Value::as_f64).collect();
    if numbers.is_empty() {
        return Value::Null;
    }
    numbers.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));

    let mid = numbers.len() / 2;
    if numbers.len() % 2 == 0 {
        Value::Float((numbers[mid - 1] + numbers[mid]) / 2.0)
    } else {
        Value::Float(numbers[mid])
    }
}

/// `Σ(value × weight) / Σ(weight)`
///
/// Pairs with a missing value or weight are ignored. A zero total weight
/// yields null.
pub fn weighted_mean(values: &[Value], weights: &[Value]) -> Value {
    let mut weighted = 0.0;
    let mut total = 0.0;
    for (value, weight) in values.iter().zip(weights) {
        if let (Some(v), Some(w)) = (value.as_f64(), weight.as_f64()) {
            weighted += v * w;
            total += w;
        }
    }
    if total == 0.0 {
        Value::Null
    } else {
        Value::Float(weighted / total)
    }
}
