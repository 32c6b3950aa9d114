//! Exploration tables and the cartesian product combinator.

use std::collections::BTreeMap;

use traj_core::{ErrorInfo, TrajError, Value};

/// Parameter path to its per-run candidate values.
pub type Exploration = BTreeMap<String, Vec<Value>>;

/// Flattens independent axes into equal-length sequences.
///
/// The last name in `order` varies fastest. Every key of `axes` must appear
/// in `order` exactly once.
pub fn cartesian_product(axes: &Exploration, order: &[&str]) -> Result<Exploration, TrajError> {
    let mut seen = Vec::with_capacity(order.len());
    for name in order {
        if !axes.contains_key(*name) {
            return Err(TrajError::Exploration(
                ErrorInfo::new("order-unknown", "axis named in order is not being explored")
                    .with_context("axis", *name),
            ));
        }
        if seen.contains(name) {
            return Err(TrajError::Exploration(
                ErrorInfo::new("order-duplicate", "axis appears twice in order")
                    .with_context("axis", *name),
            ));
        }
        seen.push(*name);
    }
    if let Some(missing) = axes.keys().find(|name| !seen.contains(&name.as_str())) {
        return Err(TrajError::Exploration(
            ErrorInfo::new("order-missing", "axis missing from order").with_context("axis", missing.clone()),
        ));
    }
    if let Some((name, _)) = axes.iter().find(|(_, values)| values.is_empty()) {
        return Err(TrajError::Exploration(
            ErrorInfo::new("axis-empty", "axis has no values").with_context("axis", name.clone()),
        ));
    }

    let mut combos = Vec::new();
    expand_grid(axes, order, 0, Vec::new(), &mut combos);

    let mut output: Exploration = order
        .iter()
        .map(|name| (name.to_string(), Vec::with_capacity(combos.len())))
        .collect();
    for combo in combos {
        for (name, value) in order.iter().zip(combo) {
            if let Some(column) = output.get_mut(*name) {
                column.push(value);
            }
        }
    }
    Ok(output)
}

fn expand_grid(
    axes: &Exploration,
    order: &[&str],
    idx: usize,
    current: Vec<Value>,
    outputs: &mut Vec<Vec<Value>>,
) {
    if idx == order.len() {
        outputs.push(current);
        return;
    }
    let Some(values) = axes.get(order[idx]) else {
        return;
    };
    for value in values {
        let mut next = current.clone();
        next.push(value.clone());
        expand_grid(axes, order, idx + 1, next, outputs);
    }
}

/// Common length of every sequence, which becomes the run count.
pub fn run_count(exploration: &Exploration) -> Result<usize, TrajError> {
    let mut lengths = exploration.iter().map(|(name, values)| (name, values.len()));
    let Some((first_name, expected)) = lengths.next() else {
        return Err(TrajError::Exploration(ErrorInfo::new(
            "exploration-empty",
            "nothing to explore",
        )));
    };
    if expected == 0 {
        return Err(TrajError::Exploration(
            ErrorInfo::new("range-empty", "exploration range must not be empty")
                .with_context("parameter", first_name.clone()),
        ));
    }
    for (name, len) in lengths {
        if len != expected {
            return Err(TrajError::Exploration(
                ErrorInfo::new("length-mismatch", "explored sequences differ in length")
                    .with_context("parameter", name.clone())
                    .with_context("expected", expected.to_string())
                    .with_context("actual", len.to_string()),
            ));
        }
    }
    Ok(expected)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ints(values: &[i64]) -> Vec<Value> {
        values.iter().copied().map(Value::Int).collect()
    }

    #[test]
    fn rightmost_axis_varies_fastest() {
        let axes = Exploration::from([("a".to_string(), ints(&[1, 2])), ("b".to_string(), ints(&[10, 20, 30]))]);
        let product = cartesian_product(&axes, &["a", "b"]).unwrap();
        assert_eq!(product["a"], ints(&[1, 1, 1, 2, 2, 2]));
        assert_eq!(product["b"], ints(&[10, 20, 30, 10, 20, 30]));

        let flipped = cartesian_product(&axes, &["b", "a"]).unwrap();
        assert_eq!(flipped["a"], ints(&[1, 2, 1, 2, 1, 2]));
    }

    #[test]
    fn order_must_cover_every_axis() {
        let axes = Exploration::from([("a".to_string(), ints(&[1])), ("b".to_string(), ints(&[2]))]);
        assert_eq!(cartesian_product(&axes, &["a"]).unwrap_err().info().code, "order-missing");
        assert_eq!(
            cartesian_product(&axes, &["a", "b", "c"]).unwrap_err().info().code,
            "order-unknown"
        );
    }

    #[test]
    fn unequal_lengths_are_rejected() {
        let table = Exploration::from([("a".to_string(), ints(&[1, 2])), ("b".to_string(), ints(&[2]))]);
        assert_eq!(run_count(&table).unwrap_err().info().code, "length-mismatch");
    }
}
