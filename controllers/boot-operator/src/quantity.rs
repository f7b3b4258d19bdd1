//! Kubernetes resource quantities.
//!
//! Only what the operator needs: parse a quantity string into a number so
//! `1` and `1000m`, or `1Gi` and `1024Mi`, compare equal.

use std::cmp::Ordering;
use std::collections::BTreeMap;

/// Parses a quantity (`500m`, `2`, `1.5Gi`, `1e3`) into its value in base units.
#[must_use]
pub fn parse(quantity: &str) -> Option<f64> {
    let q = quantity.trim();
    if q.is_empty() {
        return None;
    }

    let split = q
        .find(|c: char| !(c.is_ascii_digit() || c == '.' || c == '+' || c == '-'))
        .unwrap_or(q.len());
    let (number, suffix) = q.split_at(split);
    let base: f64 = number.parse().ok()?;

    let multiplier = match suffix {
        "" => 1.0,
        "n" => return Some(base / 1e9),
        "u" => return Some(base / 1e6),
        "m" => return Some(base / 1e3),
        "k" => 1e3,
        "M" => 1e6,
        "G" => 1e9,
        "T" => 1e12,
        "P" => 1e15,
        "E" => 1e18,
        "Ki" => 1024.0,
        "Mi" => 1024.0_f64.powi(2),
        "Gi" => 1024.0_f64.powi(3),
        "Ti" => 1024.0_f64.powi(4),
        "Pi" => 1024.0_f64.powi(5),
        "Ei" => 1024.0_f64.powi(6),
        exp if exp.starts_with('e') || exp.starts_with('E') => {
            let power: i32 = exp[1..].parse().ok()?;
            10.0_f64.powi(power)
        }
        _ => return None,
    };

    Some(base * multiplier)
}

/// True when a quantity is absent or parses to zero.
#[must_use]
pub fn is_zero(quantity: Option<&String>) -> bool {
    quantity.and_then(|q| parse(q)).is_none_or(|v| v == 0.0)
}

/// Compares two quantities; unparsable values compare as strings.
#[must_use]
pub fn compare(a: &str, b: &str) -> Ordering {
    match (parse(a), parse(b)) {
        (Some(x), Some(y)) => x.partial_cmp(&y).unwrap_or(Ordering::Equal),
        _ => a.cmp(b),
    }
}

/// Order-independent equality of two resource lists (`cpu -> 500m`, ...).
#[must_use]
pub fn lists_equal(a: &BTreeMap<String, String>, b: &BTreeMap<String, String>) -> bool {
    a.len() == b.len()
        && a.iter().all(|(name, qa)| {
            b.get(name)
                .is_some_and(|qb| compare(qa, qb) == Ordering::Equal)
        })
}
