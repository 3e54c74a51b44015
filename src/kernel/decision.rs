//! Central decision engine - recovery policy.
//!
//! Pure function of its inputs: the same (type, report, history) always
//! yields the same action, so the policy is independently testable.

use super::types::{HealthReport, ModuleType, RecoveryAction};

/// Decide the recovery action for a failed module.
///
/// Policy ladder by consecutive failed recoveries: a first failure gets a
/// plain restart, a repeat gets fresh resources before the restart, and a
/// third strike hands off to the backup collaborator.
pub fn decide_recovery(
    _module_type: ModuleType,
    _report: &HealthReport,
    consecutive_failures: u32,
) -> RecoveryAction {
    match consecutive_failures {
        0 => RecoveryAction::Restart,
        1 => RecoveryAction::ReallocateResources,
        _ => RecoveryAction::ActivateBackup,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::types::{ModuleState, ResourceUtilization};
    use crate::types::ModuleId;
    use chrono::Utc;

    fn report(score: u32) -> HealthReport {
        HealthReport {
            module_id: ModuleId::new(),
            module_type: ModuleType::NetworkManager,
            state: ModuleState::Failed,
            score,
            utilization: ResourceUtilization::default(),
            observed_at: Utc::now(),
        }
    }

    #[test]
    fn test_policy_ladder() {
        let r = report(5);
        assert_eq!(
            decide_recovery(ModuleType::NetworkManager, &r, 0),
            RecoveryAction::Restart
        );
        assert_eq!(
            decide_recovery(ModuleType::NetworkManager, &r, 1),
            RecoveryAction::ReallocateResources
        );
        assert_eq!(
            decide_recovery(ModuleType::NetworkManager, &r, 2),
            RecoveryAction::ActivateBackup
        );
        assert_eq!(
            decide_recovery(ModuleType::NetworkManager, &r, 7),
            RecoveryAction::ActivateBackup
        );
    }

    #[test]
    fn test_pure_across_repeated_calls() {
        let r = report(3);
        let first = decide_recovery(ModuleType::DatabaseEngine, &r, 1);
        for _ in 0..10 {
            assert_eq!(decide_recovery(ModuleType::DatabaseEngine, &r, 1), first);
        }
    }
}
