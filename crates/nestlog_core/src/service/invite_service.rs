//! Invite workflow service.
//!
//! # Responsibility
//! - Issue invites for roles the sender may grant.
//! - Resolve invites (accept/decline) and cancel pending ones.
//! - Serve the recipient inbox and the sender's outgoing list.
//!
//! # Invariants
//! - An invite leaves `pending` at most once; terminal invites never change.
//! - Accepting grants the membership and resolves the invite in one
//!   transaction.
//! - At most one pending invite per `(baby, email)`. The duplicate check is a
//!   read before the write, so two senders racing can both succeed.

use crate::access::permissions::{can_manage_members, get_role, invitable_roles};
use crate::model::baby::BabyId;
use crate::model::invite::{Invite, InviteId, InviteStatus};
use crate::model::principal::{normalize_email, redact_email, Principal, PrincipalId};
use crate::model::role::Role;
use crate::model::EpochMs;
use crate::service::{authorize, load_baby, ServiceError, ServiceResult};
use crate::store::{
    DocumentStore, InviteQuery, Mutation, Snapshot, SnapshotData, StoreError, Subscription,
    WatchTarget,
};
use log::info;

/// Result of `send_invite`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendInviteOutcome {
    /// A new pending invite was written.
    Sent(Invite),
    /// A pending invite for the same baby and address already existed;
    /// nothing was written.
    AlreadyPending(Invite),
}

impl SendInviteOutcome {
    pub fn invite(&self) -> &Invite {
        match self {
            Self::Sent(invite) | Self::AlreadyPending(invite) => invite,
        }
    }
}

pub struct InviteService<'a, S: DocumentStore + ?Sized> {
    store: &'a S,
}

impl<'a, S: DocumentStore + ?Sized> InviteService<'a, S> {
    pub fn new(store: &'a S) -> Self {
        Self { store }
    }

    /// Invites `to_email` to join `baby_id` with `role`.
    ///
    /// # Errors
    /// - `PermissionDenied` when the sender cannot manage members or cannot
    ///   grant `role`.
    /// - `Validation` for a malformed address.
    /// - `InvalidState` when the sender invites their own address.
    pub fn send_invite(
        &self,
        baby_id: BabyId,
        sender: &Principal,
        to_email: &str,
        role: Role,
    ) -> ServiceResult<SendInviteOutcome> {
        let baby = load_baby(self.store, baby_id)?;
        authorize(
            can_manage_members(&baby, &sender.uid),
            "invite members",
            baby_id,
            &sender.uid,
        )?;
        authorize(
            invitable_roles(&baby, &sender.uid).contains(&role),
            "grant this role",
            baby_id,
            &sender.uid,
        )?;

        let to_email = normalize_email(to_email)?;
        if sender.owns_email(&to_email) {
            return Err(ServiceError::InvalidState(
                "cannot invite your own address".to_string(),
            ));
        }

        let existing = self
            .store
            .query_invites(&InviteQuery::pending_for(baby_id, to_email.clone()))?;
        if let Some(invite) = existing.into_iter().next() {
            info!(
                "event=invite_send module=invite status=already_pending baby_id={baby_id} invite_id={} to={}",
                invite.id,
                redact_email(&to_email)
            );
            return Ok(SendInviteOutcome::AlreadyPending(invite));
        }

        let now = self.store.server_time()?;
        let invite = Invite::pending(
            baby_id,
            baby.name.clone(),
            sender.uid.clone(),
            sender.display_name.clone(),
            to_email,
            role,
            now,
        );
        self.store.write(Mutation::InsertInvite(invite.clone()))?;
        info!(
            "event=invite_send module=invite status=ok baby_id={baby_id} invite_id={} role={role} to={}",
            invite.id,
            redact_email(&invite.to_email)
        );
        Ok(SendInviteOutcome::Sent(invite))
    }

    /// Accepts an invite addressed to `recipient`, granting the invited role.
    ///
    /// # Errors
    /// - `NotFound` for a missing invite or baby.
    /// - `PermissionDenied` when the invite is addressed to someone else.
    /// - `InvalidState` when the invite is already resolved, the recipient is
    ///   already a member, or another device resolved it first.
    pub fn accept_invite(
        &self,
        invite_id: InviteId,
        recipient: &Principal,
    ) -> ServiceResult<Invite> {
        let invite = self.load_pending_for(invite_id, recipient, "accept invite")?;
        let baby = load_baby(self.store, invite.baby_id)?;
        if let Some(role) = get_role(&baby, &recipient.uid) {
            return Err(ServiceError::InvalidState(format!(
                "{} is already a member of baby {} as {role}",
                recipient.uid, invite.baby_id
            )));
        }

        let now = self.store.server_time()?;
        self.store.transaction(vec![
            Mutation::ExpectInviteStatus {
                invite_id,
                status: InviteStatus::Pending,
            },
            Mutation::ExpectMemberRole {
                baby_id: invite.baby_id,
                principal_id: recipient.uid.clone(),
                role: None,
            },
            Mutation::SetMemberRole {
                baby_id: invite.baby_id,
                principal_id: recipient.uid.clone(),
                role: invite.role,
            },
            Mutation::ResolveInvite {
                invite_id,
                status: InviteStatus::Accepted,
                resolved_at: now,
                resolved_by: Some(recipient.uid.clone()),
            },
        ])?;
        info!(
            "event=invite_accept module=invite status=ok invite_id={invite_id} baby_id={} principal={} role={}",
            invite.baby_id, recipient.uid, invite.role
        );
        Ok(resolved(invite, InviteStatus::Accepted, now, &recipient.uid))
    }

    /// Declines an invite addressed to `recipient`. Membership is untouched.
    pub fn decline_invite(
        &self,
        invite_id: InviteId,
        recipient: &Principal,
    ) -> ServiceResult<Invite> {
        let invite = self.load_pending_for(invite_id, recipient, "decline invite")?;
        let now = self.store.server_time()?;
        self.store.transaction(vec![
            Mutation::ExpectInviteStatus {
                invite_id,
                status: InviteStatus::Pending,
            },
            Mutation::ResolveInvite {
                invite_id,
                status: InviteStatus::Declined,
                resolved_at: now,
                resolved_by: Some(recipient.uid.clone()),
            },
        ])?;
        info!(
            "event=invite_decline module=invite status=ok invite_id={invite_id} baby_id={} principal={}",
            invite.baby_id, recipient.uid
        );
        Ok(resolved(invite, InviteStatus::Declined, now, &recipient.uid))
    }

    /// Deletes a still-pending invite.
    pub fn cancel_invite(&self, invite_id: InviteId, actor: &PrincipalId) -> ServiceResult<()> {
        let invite = self.load_invite(invite_id)?;
        let baby = load_baby(self.store, invite.baby_id)?;
        authorize(
            can_manage_members(&baby, actor),
            "cancel invite",
            invite.baby_id,
            actor,
        )?;
        if !invite.is_pending() {
            return Err(ServiceError::InvalidState(format!(
                "invite {invite_id} is already {}",
                invite.status.as_str()
            )));
        }

        self.store.transaction(vec![
            Mutation::ExpectInviteStatus {
                invite_id,
                status: InviteStatus::Pending,
            },
            Mutation::DeleteInvite(invite_id),
        ])?;
        info!(
            "event=invite_cancel module=invite status=ok invite_id={invite_id} baby_id={} principal={actor}",
            invite.baby_id
        );
        Ok(())
    }

    /// Pending invites addressed to `recipient`, newest first.
    pub fn pending_invites_for(&self, recipient: &Principal) -> ServiceResult<Vec<Invite>> {
        let email = normalize_email(&recipient.email)?;
        Ok(self.store.query_invites(&InviteQuery::inbox(email))?)
    }

    /// Every invite `actor` issued for `baby_id`, in any status.
    pub fn outgoing_invites(
        &self,
        baby_id: BabyId,
        actor: &PrincipalId,
    ) -> ServiceResult<Vec<Invite>> {
        let baby = load_baby(self.store, baby_id)?;
        authorize(
            can_manage_members(&baby, actor),
            "list outgoing invites",
            baby_id,
            actor,
        )?;
        Ok(self.store.query_invites(&InviteQuery {
            baby_id: Some(baby_id),
            from_uid: Some(actor.clone()),
            ..InviteQuery::default()
        })?)
    }

    /// Live inbox of pending invites for `recipient`.
    pub fn watch_pending_invites<F, E>(
        &self,
        recipient: &Principal,
        mut on_change: F,
        on_error: E,
    ) -> ServiceResult<Subscription>
    where
        F: FnMut(Vec<Invite>) + Send + 'static,
        E: FnMut(&StoreError) + Send + 'static,
    {
        let email = normalize_email(&recipient.email)?;
        let subscription = self.store.watch(
            WatchTarget::PendingInvites(email),
            Box::new(move |snapshot: Snapshot| {
                if let SnapshotData::Invites(invites) = snapshot.data {
                    on_change(invites);
                }
            }),
            Box::new(on_error),
        )?;
        Ok(subscription)
    }

    fn load_invite(&self, invite_id: InviteId) -> ServiceResult<Invite> {
        self.store
            .get_invite(invite_id)?
            .ok_or_else(|| ServiceError::NotFound(format!("invite {invite_id}")))
    }

    fn load_pending_for(
        &self,
        invite_id: InviteId,
        recipient: &Principal,
        action: &'static str,
    ) -> ServiceResult<Invite> {
        let invite = self.load_invite(invite_id)?;
        if !invite.is_pending() {
            return Err(ServiceError::InvalidState(format!(
                "invite {invite_id} is already {}",
                invite.status.as_str()
            )));
        }
        authorize(
            recipient.owns_email(&invite.to_email),
            action,
            invite.baby_id,
            &recipient.uid,
        )?;
        Ok(invite)
    }
}

fn resolved(
    mut invite: Invite,
    status: InviteStatus,
    at: EpochMs,
    by: &PrincipalId,
) -> Invite {
    invite.status = status;
    invite.resolved_at = Some(at);
    invite.resolved_by = Some(by.clone());
    invite
}
