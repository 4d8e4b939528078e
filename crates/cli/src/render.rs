#![forbid(unsafe_code)]

use enroll_core::LeaseStatus;
use enroll_lease::LeaseError;

pub(crate) fn status_line(status: &LeaseStatus) -> String {
    match status {
        LeaseStatus::Free => "free: no registration in progress".to_string(),
        LeaseStatus::Pending {
            registrant,
            remaining_secs,
        } => format!(
            "pending: {} <{}>, {} remaining",
            registrant.name(),
            registrant.email(),
            countdown(*remaining_secs)
        ),
        LeaseStatus::Expiring {
            registrant: Some(registrant),
        } => format!("expiring: clearing registration for {}", registrant.name()),
        LeaseStatus::Expiring { registrant: None } => {
            "expiring: clearing unreadable registration".to_string()
        }
        LeaseStatus::Unknown => "unknown: status unknown, please restart".to_string(),
    }
}

pub(crate) fn error_line(err: &LeaseError) -> String {
    match err {
        LeaseError::Busy {
            remaining_secs: Some(secs),
        } => format!(
            "an enrollment is already in progress, try again in {}",
            countdown(*secs)
        ),
        LeaseError::Busy {
            remaining_secs: None,
        } => "an enrollment is already in progress, try again later".to_string(),
        LeaseError::Store(err) if err.is_retryable() => {
            format!("could not reach the store, try again ({err})")
        }
        LeaseError::SubscriptionLost => "status unknown, please restart".to_string(),
        other => other.to_string(),
    }
}

pub(crate) fn countdown(secs: u64) -> String {
    format!("{}:{:02}", secs / 60, secs % 60)
}
