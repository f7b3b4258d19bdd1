//! Data types exchanged with the cluster client

use std::collections::BTreeMap;

/// Event severity as shown by `kubectl describe`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventSeverity {
    Normal,
    Warning,
}

/// An Event posted on a Boot
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootEvent {
    pub severity: EventSeverity,
    /// Machine-readable reason (`CreatedDeployment`, ...)
    pub reason: String,
    /// Human-readable message
    pub note: String,
    /// What the operator was doing (`Reconcile`, ...)
    pub action: String,
}

/// Label selector in `k=v,k2=v2` form.
#[must_use]
pub fn label_selector(labels: &BTreeMap<String, String>) -> String {
    labels
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join(",")
}

/// True when every selector pair is present in `labels`.
#[must_use]
pub fn labels_match(
    labels: Option<&BTreeMap<String, String>>,
    selector: &BTreeMap<String, String>,
) -> bool {
    selector.iter().all(|(k, v)| {
        labels
            .and_then(|l| l.get(k))
            .is_some_and(|actual| actual == v)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_label_selector_is_sorted() {
        let labels = BTreeMap::from([
            ("bootType".to_string(), "java".to_string()),
            ("app".to_string(), "havok".to_string()),
        ]);
        assert_eq!(label_selector(&labels), "app=havok,bootType=java");
    }

    #[test]
    fn test_labels_match_requires_every_pair() {
        let selector = BTreeMap::from([("app".to_string(), "havok".to_string())]);
        let labels = BTreeMap::from([
            ("app".to_string(), "havok".to_string()),
            ("extra".to_string(), "x".to_string()),
        ]);
        assert!(labels_match(Some(&labels), &selector));
        assert!(!labels_match(None, &selector));
        assert!(labels_match(None, &BTreeMap::new()));
    }
}
