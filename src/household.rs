use crate::clock::Clock;
use crate::error::{AppError, Result};
use crate::models::{Household, Invitation, InvitationResponse, InvitationStatus, PatientId};
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use tracing::info;

#[derive(Debug, Default)]
struct Membership {
    households: BTreeMap<u64, Household>,
    invitations: BTreeMap<u64, Invitation>,
    next_invitation_id: u64,
}

/// Households and the invitations that grow them
pub struct HouseholdRegistry {
    membership: RwLock<Membership>,
    patients: HashSet<PatientId>,
    clock: Arc<dyn Clock>,
}

impl HouseholdRegistry {
    pub fn new(
        households: impl IntoIterator<Item = Household>,
        patients: impl IntoIterator<Item = PatientId>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            membership: RwLock::new(Membership {
                households: households.into_iter().map(|h| (h.id, h)).collect(),
                ..Membership::default()
            }),
            patients: patients.into_iter().collect(),
            clock,
        }
    }

    /// Invite `patient_id` into the household `admin` administers
    pub fn create_invitation(&self, admin: &str, patient_id: PatientId) -> Result<Invitation> {
        if !self.patients.contains(&patient_id) {
            return Err(AppError::UnknownPatient(patient_id));
        }

        let mut membership = self.membership.write();
        let household_id = membership
            .households
            .values()
            .find(|h| h.admin == admin)
            .map(|h| h.id)
            .ok_or_else(|| AppError::HouseholdNotFound(admin.to_string()))?;

        membership.next_invitation_id += 1;
        let invitation = Invitation {
            id: membership.next_invitation_id,
            admin: admin.to_string(),
            patient_id,
            household_id,
            status: InvitationStatus::Pending,
            created_at: self.clock.now(),
        };
        membership.invitations.insert(invitation.id, invitation.clone());

        info!(
            invitation_id = invitation.id,
            admin, patient_id, household_id, "Invitation created"
        );
        Ok(invitation)
    }

    /// Accepting adds the patient to the household; rejecting only records
    /// the answer. Either way the invitation stops being pending.
    pub fn respond(&self, invitation_id: u64, response: InvitationResponse) -> Result<Invitation> {
        let mut membership = self.membership.write();
        let Membership {
            households,
            invitations,
            ..
        } = &mut *membership;

        let invitation = invitations
            .get_mut(&invitation_id)
            .ok_or(AppError::InvitationNotFound(invitation_id))?;
        if !invitation.is_pending() {
            return Err(AppError::InvitationProcessed {
                id: invitation_id,
                status: invitation.status,
            });
        }

        match response {
            InvitationResponse::Accept => {
                let household = households
                    .get_mut(&invitation.household_id)
                    .ok_or_else(|| AppError::HouseholdNotFound(invitation.admin.clone()))?;
                if household.patient_ids.contains(&invitation.patient_id) {
                    return Err(AppError::AlreadyMember {
                        patient_id: invitation.patient_id,
                        household_id: household.id,
                    });
                }
                household.patient_ids.push(invitation.patient_id);
                invitation.status = InvitationStatus::Accepted;
            }
            InvitationResponse::Reject => invitation.status = InvitationStatus::Rejected,
        }

        info!(
            invitation_id,
            patient_id = invitation.patient_id,
            status = %invitation.status,
            "Invitation answered"
        );
        Ok(invitation.clone())
    }

    /// Invitations addressed to `patient_id`, oldest first
    pub fn invitations_for(&self, patient_id: PatientId) -> Vec<Invitation> {
        self.membership
            .read()
            .invitations
            .values()
            .filter(|i| i.patient_id == patient_id)
            .cloned()
            .collect()
    }

    /// Snapshot of every household, by id
    pub fn households(&self) -> Vec<Household> {
        self.membership.read().households.values().cloned().collect()
    }

    /// Usernames of every household admin, sorted and deduplicated
    pub fn admins(&self) -> Vec<String> {
        let mut admins: Vec<String> = self
            .membership
            .read()
            .households
            .values()
            .map(|h| h.admin.clone())
            .collect();
        admins.sort();
        admins.dedup();
        admins
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use chrono::{TimeZone, Utc};

    fn registry() -> HouseholdRegistry {
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2025, 2, 14, 10, 0, 0).unwrap(),
        ));
        HouseholdRegistry::new(
            vec![Household {
                id: 4,
                admin: "kostas".to_string(),
                patient_ids: vec![1],
            }],
            [1, 2, 3],
            clock,
        )
    }

    #[test]
    fn test_accept_adds_patient_to_household() {
        let registry = registry();
        let invitation = registry.create_invitation("kostas", 2).unwrap();
        assert_eq!(invitation.status, InvitationStatus::Pending);
        assert_eq!(invitation.household_id, 4);

        let answered = registry.respond(invitation.id, InvitationResponse::Accept).unwrap();

        assert_eq!(answered.status, InvitationStatus::Accepted);
        assert_eq!(registry.households()[0].patient_ids, vec![1, 2]);
        assert_eq!(registry.invitations_for(2), vec![answered]);
    }

    #[test]
    fn test_reject_leaves_household_unchanged() {
        let registry = registry();
        let invitation = registry.create_invitation("kostas", 3).unwrap();

        let answered = registry.respond(invitation.id, InvitationResponse::Reject).unwrap();

        assert_eq!(answered.status, InvitationStatus::Rejected);
        assert_eq!(registry.households()[0].patient_ids, vec![1]);
    }

    #[test]
    fn test_invitation_answers_only_once() {
        let registry = registry();
        let invitation = registry.create_invitation("kostas", 3).unwrap();
        registry.respond(invitation.id, InvitationResponse::Reject).unwrap();

        let err = registry
            .respond(invitation.id, InvitationResponse::Accept)
            .unwrap_err();
        assert!(matches!(
            err,
            AppError::InvitationProcessed {
                status: InvitationStatus::Rejected,
                ..
            }
        ));
        assert_eq!(registry.households()[0].patient_ids, vec![1]);
    }

    #[test]
    fn test_unknown_household_admin() {
        let registry = registry();
        let err = registry.create_invitation("nobody", 2).unwrap_err();
        assert!(matches!(err, AppError::HouseholdNotFound(ref admin) if admin == "nobody"));
        assert!(registry.invitations_for(2).is_empty());
    }

    #[test]
    fn test_unknown_patient_and_invitation() {
        let registry = registry();
        assert!(matches!(
            registry.create_invitation("kostas", 99),
            Err(AppError::UnknownPatient(99))
        ));
        assert!(matches!(
            registry.respond(42, InvitationResponse::Accept),
            Err(AppError::InvitationNotFound(42))
        ));
    }

    #[test]
    fn test_existing_member_cannot_be_added_again() {
        let registry = registry();
        let invitation = registry.create_invitation("kostas", 1).unwrap();

        let err = registry
            .respond(invitation.id, InvitationResponse::Accept)
            .unwrap_err();
        assert!(matches!(
            err,
            AppError::AlreadyMember {
                patient_id: 1,
                household_id: 4
            }
        ));
        assert!(registry.invitations_for(1)[0].is_pending());
    }
}
