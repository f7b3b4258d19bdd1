//! Events posted on Boots.

use crate::keys::reason;
use boot_client::{BootClientTrait, BootEvent, ClientError, EventSeverity};
use crds::Boot;
use tracing::warn;

const ACTION: &str = "Reconcile";

/// Failure reasons that heal on a later tick and are reported as Normal.
const SELF_HEALING: [&str; 4] = [
    reason::FAILED_UPDATE_BOOT_DEFAULTERS,
    reason::FAILED_UPDATE_BOOT_META,
    reason::FAILED_GET_DEPLOYMENT,
    reason::FAILED_GET_SERVICE,
];

/// Event type for `reason`, given the error that caused it (if any).
#[must_use]
pub fn event_severity(event_reason: &str, err: Option<&ClientError>) -> EventSeverity {
    let healing = SELF_HEALING.contains(&event_reason)
        || err.is_some_and(ClientError::is_retryable);
    if (err.is_none() && !event_reason.contains("Failed")) || healing {
        EventSeverity::Normal
    } else {
        EventSeverity::Warning
    }
}

/// Builds an Event; errors are appended to the message.
#[must_use]
pub fn boot_event(event_reason: &str, message: &str, err: Option<&ClientError>) -> BootEvent {
    let note = match err {
        Some(e) => format!("{message}, error: {e}"),
        None => message.to_string(),
    };
    BootEvent {
        severity: event_severity(event_reason, err),
        reason: event_reason.to_string(),
        note,
        action: ACTION.to_string(),
    }
}

/// Publishes an Event. Failures are logged only.
pub async fn record(
    client: &dyn BootClientTrait,
    boot: &Boot,
    event_reason: &str,
    message: &str,
    err: Option<&ClientError>,
) {
    let event = boot_event(event_reason, message, err);
    if let Err(e) = client.publish_event(boot, &event).await {
        warn!("Failed to publish event {} for {}: {}", event_reason, boot.key(), e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_is_normal() {
        let event = boot_event(reason::CREATED_DEPLOYMENT, "Created Deployment orders", None);
        assert_eq!(event.severity, EventSeverity::Normal);
        assert_eq!(event.note, "Created Deployment orders");
    }

    #[test]
    fn test_failure_is_warning_with_error_text() {
        let err = ClientError::InvalidObject("bad".to_string());
        let event = boot_event(reason::FAILED_CREATE_DEPLOYMENT, "Failed to create Deployment", Some(&err));
        assert_eq!(event.severity, EventSeverity::Warning);
        assert_eq!(event.note, "Failed to create Deployment, error: Invalid object: bad");
    }

    #[test]
    fn test_self_healing_and_retryable_failures_are_normal() {
        let err = ClientError::InvalidObject("bad".to_string());
        assert_eq!(
            event_severity(reason::FAILED_UPDATE_BOOT_META, Some(&err)),
            EventSeverity::Normal
        );
        let conflict = ClientError::Conflict("stale".to_string());
        assert_eq!(
            event_severity(reason::FAILED_UPDATE_DEPLOYMENT, Some(&conflict)),
            EventSeverity::Normal
        );
    }
}
