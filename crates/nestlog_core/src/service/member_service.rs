//! Membership management: role changes, ownership transfer, removal.
//!
//! # Invariants
//! - Each write is guarded on the roles the permission check observed, so a
//!   concurrent change on another device fails the write instead of being
//!   overwritten.
//! - Ownership transfer swaps both roles in one transaction; readers never
//!   see zero or two owners.
//! - Removal deletes the member entry; absence means no access.

use crate::access::permissions::{
    can_change_role, can_remove_member, can_transfer_ownership, get_role, invitable_roles,
};
use crate::model::baby::BabyId;
use crate::model::principal::PrincipalId;
use crate::model::role::Role;
use crate::service::{authorize, load_baby, ServiceError, ServiceResult};
use crate::store::{DocumentStore, Mutation};
use log::info;

pub struct MemberService<'a, S: DocumentStore + ?Sized> {
    store: &'a S,
}

impl<'a, S: DocumentStore + ?Sized> MemberService<'a, S> {
    pub fn new(store: &'a S) -> Self {
        Self { store }
    }

    /// Sets `target`'s role to `new_role`.
    ///
    /// Owner is never assignable here; `transfer_ownership` is the only way
    /// to hand the owner role over.
    pub fn change_member_role(
        &self,
        baby_id: BabyId,
        actor: &PrincipalId,
        target: &PrincipalId,
        new_role: Role,
    ) -> ServiceResult<()> {
        let baby = load_baby(self.store, baby_id)?;
        authorize(
            can_change_role(&baby, actor, target),
            "change member role",
            baby_id,
            actor,
        )?;
        authorize(
            invitable_roles(&baby, actor).contains(&new_role),
            "grant this role",
            baby_id,
            actor,
        )?;

        let previous = get_role(&baby, target);
        self.store.transaction(vec![
            Mutation::ExpectMemberRole {
                baby_id,
                principal_id: actor.clone(),
                role: get_role(&baby, actor),
            },
            Mutation::ExpectMemberRole {
                baby_id,
                principal_id: target.clone(),
                role: previous,
            },
            Mutation::SetMemberRole {
                baby_id,
                principal_id: target.clone(),
                role: new_role,
            },
        ])?;
        info!(
            "event=member_role_change module=member status=ok baby_id={baby_id} principal={actor} target={target} role={new_role}"
        );
        Ok(())
    }

    /// Makes `new_owner` the owner and demotes `actor` to admin.
    ///
    /// # Errors
    /// - `PermissionDenied` unless `actor` is the owner.
    /// - `InvalidState` when `new_owner` is `actor`.
    /// - `NotFound` when `new_owner` is not a member.
    pub fn transfer_ownership(
        &self,
        baby_id: BabyId,
        actor: &PrincipalId,
        new_owner: &PrincipalId,
    ) -> ServiceResult<()> {
        let baby = load_baby(self.store, baby_id)?;
        authorize(
            can_transfer_ownership(&baby, actor),
            "transfer ownership",
            baby_id,
            actor,
        )?;
        if actor == new_owner {
            return Err(ServiceError::InvalidState(
                "ownership is already held by this principal".to_string(),
            ));
        }
        if get_role(&baby, new_owner).is_none() {
            return Err(ServiceError::NotFound(format!(
                "member {new_owner} of baby {baby_id}"
            )));
        }

        self.store.transaction(vec![
            Mutation::ExpectMemberRole {
                baby_id,
                principal_id: actor.clone(),
                role: Some(Role::Owner),
            },
            Mutation::ExpectMember {
                baby_id,
                principal_id: new_owner.clone(),
            },
            Mutation::SetMemberRole {
                baby_id,
                principal_id: new_owner.clone(),
                role: Role::Owner,
            },
            Mutation::SetMemberRole {
                baby_id,
                principal_id: actor.clone(),
                role: Role::Admin,
            },
        ])?;
        info!(
            "event=ownership_transfer module=member status=ok baby_id={baby_id} principal={actor} new_owner={new_owner}"
        );
        Ok(())
    }

    /// Deletes `target`'s member entry.
    pub fn remove_member(
        &self,
        baby_id: BabyId,
        actor: &PrincipalId,
        target: &PrincipalId,
    ) -> ServiceResult<()> {
        let baby = load_baby(self.store, baby_id)?;
        authorize(
            can_remove_member(&baby, actor, target),
            "remove member",
            baby_id,
            actor,
        )?;

        self.store.transaction(vec![
            Mutation::ExpectMemberRole {
                baby_id,
                principal_id: actor.clone(),
                role: get_role(&baby, actor),
            },
            Mutation::ExpectMemberRole {
                baby_id,
                principal_id: target.clone(),
                role: get_role(&baby, target),
            },
            Mutation::RemoveMember {
                baby_id,
                principal_id: target.clone(),
            },
        ])?;
        info!(
            "event=member_remove module=member status=ok baby_id={baby_id} principal={actor} target={target}"
        );
        Ok(())
    }
}
