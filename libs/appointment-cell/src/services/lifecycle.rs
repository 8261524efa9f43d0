use tracing::{debug, warn};

use crate::models::{AppointmentStatus, SchedulingError};

/// Guards status transitions. Booking creates SCHEDULED rows; this service
/// owns every move after that.
pub struct AppointmentLifecycleService;

impl AppointmentLifecycleService {
    pub fn new() -> Self {
        Self
    }

    pub fn validate_status_transition(
        &self,
        current: &AppointmentStatus,
        next: &AppointmentStatus,
    ) -> Result<(), SchedulingError> {
        debug!("Validating status transition {:?} -> {:?}", current, next);

        if !self.valid_transitions(current).contains(next) {
            warn!("Invalid status transition attempted: {:?} -> {:?}", current, next);
            return Err(SchedulingError::InvalidStatusTransition(*current));
        }

        Ok(())
    }

    pub fn valid_transitions(&self, current: &AppointmentStatus) -> Vec<AppointmentStatus> {
        match current {
            AppointmentStatus::Scheduled => vec![
                AppointmentStatus::Confirmed,
                AppointmentStatus::Cancelled,
                AppointmentStatus::NoShow,
                AppointmentStatus::Error,
            ],
            AppointmentStatus::Confirmed => vec![
                AppointmentStatus::InProgress,
                AppointmentStatus::Cancelled,
                AppointmentStatus::NoShow,
                AppointmentStatus::Error,
            ],
            AppointmentStatus::InProgress => vec![
                AppointmentStatus::Completed,
                AppointmentStatus::Error,
            ],
            // Operators can re-queue a failed row.
            AppointmentStatus::Error => vec![AppointmentStatus::Scheduled],
            // Terminal states.
            AppointmentStatus::Completed
            | AppointmentStatus::Cancelled
            | AppointmentStatus::NoShow => vec![],
        }
    }
}

impl Default for AppointmentLifecycleService {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn scheduled_can_be_confirmed() {
        let lifecycle = AppointmentLifecycleService::new();
        assert!(lifecycle
            .validate_status_transition(&AppointmentStatus::Scheduled, &AppointmentStatus::Confirmed)
            .is_ok());
    }

    #[test]
    fn completed_is_terminal() {
        let lifecycle = AppointmentLifecycleService::new();
        for next in [
            AppointmentStatus::Scheduled,
            AppointmentStatus::Confirmed,
            AppointmentStatus::Cancelled,
        ] {
            assert_matches!(
                lifecycle.validate_status_transition(&AppointmentStatus::Completed, &next),
                Err(SchedulingError::InvalidStatusTransition(AppointmentStatus::Completed))
            );
        }
    }

    #[test]
    fn confirm_cannot_skip_from_in_progress() {
        let lifecycle = AppointmentLifecycleService::new();
        assert_matches!(
            lifecycle.validate_status_transition(
                &AppointmentStatus::InProgress,
                &AppointmentStatus::Confirmed
            ),
            Err(SchedulingError::InvalidStatusTransition(_))
        );
    }

    #[test]
    fn error_rows_can_be_requeued() {
        let lifecycle = AppointmentLifecycleService::new();
        assert!(lifecycle
            .validate_status_transition(&AppointmentStatus::Error, &AppointmentStatus::Scheduled)
            .is_ok());
    }
}
