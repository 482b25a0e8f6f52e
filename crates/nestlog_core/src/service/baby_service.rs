//! Baby profile use-case service.
//!
//! # Responsibility
//! - Create babies with their creator as sole owner.
//! - Serve member-only reads and live profile feeds.
//! - Edit and delete profiles for permitted roles.
//!
//! # Invariants
//! - A new baby has exactly one member: its creator, as owner.
//! - Deleting a baby removes its members, events and invites in the same
//!   transaction.

use crate::access::permissions::{can_delete_baby, can_edit_baby, can_read_events};
use crate::model::baby::{validate_baby_name, Baby, BabyId};
use crate::model::principal::PrincipalId;
use crate::model::role::Role;
use crate::model::EpochMs;
use crate::service::{authorize, load_baby, ServiceResult};
use crate::store::{
    DocumentStore, Mutation, Snapshot, SnapshotData, StoreError, Subscription, WatchTarget,
};
use log::info;

pub struct BabyService<'a, S: DocumentStore + ?Sized> {
    store: &'a S,
}

impl<'a, S: DocumentStore + ?Sized> BabyService<'a, S> {
    pub fn new(store: &'a S) -> Self {
        Self { store }
    }

    /// Creates a baby owned by `creator`.
    pub fn create_baby(
        &self,
        creator: &PrincipalId,
        name: &str,
        birth_date: Option<EpochMs>,
    ) -> ServiceResult<Baby> {
        validate_baby_name(name)?;
        let now = self.store.server_time()?;
        let baby = Baby::new(creator.clone(), name, birth_date, now);
        self.store.write(Mutation::InsertBaby(baby.clone()))?;
        info!(
            "event=baby_create module=baby status=ok baby_id={} principal={creator}",
            baby.id
        );
        Ok(baby)
    }

    pub fn get_baby(&self, baby_id: BabyId, viewer: &PrincipalId) -> ServiceResult<Baby> {
        let baby = load_baby(self.store, baby_id)?;
        authorize(can_read_events(&baby, viewer), "view baby", baby_id, viewer)?;
        Ok(baby)
    }

    /// Every baby where `principal` holds a role, oldest first.
    pub fn babies_for(&self, principal: &PrincipalId) -> ServiceResult<Vec<Baby>> {
        Ok(self.store.babies_for_member(principal)?)
    }

    pub fn update_profile(
        &self,
        baby_id: BabyId,
        actor: &PrincipalId,
        name: &str,
        birth_date: Option<EpochMs>,
    ) -> ServiceResult<Baby> {
        let baby = load_baby(self.store, baby_id)?;
        authorize(can_edit_baby(&baby, actor), "edit baby profile", baby_id, actor)?;
        validate_baby_name(name)?;

        self.store.transaction(vec![
            Mutation::ExpectMemberRole {
                baby_id,
                principal_id: actor.clone(),
                role: baby.members.get(actor).copied(),
            },
            Mutation::UpdateBabyProfile {
                baby_id,
                name: name.to_string(),
                birth_date,
            },
        ])?;
        info!("event=baby_update module=baby status=ok baby_id={baby_id} principal={actor}");
        load_baby(self.store, baby_id)
    }

    /// Sets or clears the profile photo; a blank URL clears it.
    pub fn set_photo(
        &self,
        baby_id: BabyId,
        actor: &PrincipalId,
        photo_url: Option<&str>,
    ) -> ServiceResult<Baby> {
        let baby = load_baby(self.store, baby_id)?;
        authorize(can_edit_baby(&baby, actor), "edit baby profile", baby_id, actor)?;
        let photo_url = photo_url
            .map(str::trim)
            .filter(|url| !url.is_empty())
            .map(str::to_string);

        self.store.transaction(vec![
            Mutation::ExpectMemberRole {
                baby_id,
                principal_id: actor.clone(),
                role: baby.members.get(actor).copied(),
            },
            Mutation::SetBabyPhoto { baby_id, photo_url },
        ])?;
        info!("event=baby_photo module=baby status=ok baby_id={baby_id} principal={actor}");
        load_baby(self.store, baby_id)
    }

    /// Deletes the baby together with everything that hangs off it.
    pub fn delete_baby(&self, baby_id: BabyId, actor: &PrincipalId) -> ServiceResult<()> {
        let baby = load_baby(self.store, baby_id)?;
        authorize(can_delete_baby(&baby, actor), "delete baby", baby_id, actor)?;

        self.store.transaction(vec![
            Mutation::ExpectMemberRole {
                baby_id,
                principal_id: actor.clone(),
                role: Some(Role::Owner),
            },
            Mutation::DeleteBaby(baby_id),
        ])?;
        info!("event=baby_delete module=baby status=ok baby_id={baby_id} principal={actor}");
        Ok(())
    }

    /// Live baby document feed. `on_change` receives `None` once the baby is
    /// deleted.
    pub fn watch_baby<F, E>(
        &self,
        baby_id: BabyId,
        viewer: &PrincipalId,
        mut on_change: F,
        on_error: E,
    ) -> ServiceResult<Subscription>
    where
        F: FnMut(Option<Baby>) + Send + 'static,
        E: FnMut(&StoreError) + Send + 'static,
    {
        self.get_baby(baby_id, viewer)?;
        let subscription = self.store.watch(
            WatchTarget::Baby(baby_id),
            Box::new(move |snapshot: Snapshot| {
                if let SnapshotData::Baby(baby) = snapshot.data {
                    on_change(baby);
                }
            }),
            Box::new(on_error),
        )?;
        Ok(subscription)
    }
}
