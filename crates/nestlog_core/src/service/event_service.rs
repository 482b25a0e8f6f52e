//! Care event ledger service.
//!
//! # Responsibility
//! - Log, amend and delete feeding/sleep/diaper events.
//! - Serve the live newest-first feed and bounded analytics windows.
//!
//! # Invariants
//! - `time`, `created_at` and `updated_at` always come from server time.
//! - Updates only touch `amount_ml`/`duration_min` and `updated_at`.

use crate::access::permissions::{can_read_events, can_write_events, get_role};
use crate::model::baby::BabyId;
use crate::model::event::{CareEvent, EventFields, EventId, EventKind, EventPatch};
use crate::model::principal::PrincipalId;
use crate::model::EpochMs;
use crate::service::{authorize, load_baby, ServiceError, ServiceResult};
use crate::store::{
    DocumentStore, EventQuery, Mutation, Snapshot, SnapshotData, StoreError, Subscription,
    TimeOrder, WatchTarget,
};
use log::info;

pub struct EventService<'a, S: DocumentStore + ?Sized> {
    store: &'a S,
}

impl<'a, S: DocumentStore + ?Sized> EventService<'a, S> {
    pub fn new(store: &'a S) -> Self {
        Self { store }
    }

    /// Logs an event at server time.
    pub fn add_event(
        &self,
        baby_id: BabyId,
        actor: &PrincipalId,
        kind: EventKind,
        fields: EventFields,
    ) -> ServiceResult<CareEvent> {
        let baby = load_baby(self.store, baby_id)?;
        authorize(can_write_events(&baby, actor), "log events", baby_id, actor)?;

        fields.check_manual_bounds()?;
        let now = self.store.server_time()?;
        let event = CareEvent::new(baby_id, kind, actor.clone(), fields, now);
        event.validate()?;
        self.store.transaction(vec![
            Mutation::ExpectMemberRole {
                baby_id,
                principal_id: actor.clone(),
                role: get_role(&baby, actor),
            },
            Mutation::InsertEvent(event.clone()),
        ])?;
        info!(
            "event=care_event_add module=events status=ok baby_id={baby_id} event_id={} type={} principal={actor}",
            event.id,
            kind.as_str()
        );
        Ok(event)
    }

    /// Merges `patch` into the stored event and returns the result.
    pub fn update_event(
        &self,
        baby_id: BabyId,
        actor: &PrincipalId,
        event_id: EventId,
        patch: EventPatch,
    ) -> ServiceResult<CareEvent> {
        let baby = load_baby(self.store, baby_id)?;
        authorize(can_write_events(&baby, actor), "edit events", baby_id, actor)?;

        let mut event = self.load_event(baby_id, event_id)?;
        if patch.is_empty() {
            return Ok(event);
        }
        patch.check_manual_bounds()?;
        patch.apply_to(&mut event.fields);
        event.validate()?;

        let now = self.store.server_time()?;
        self.store.transaction(vec![
            Mutation::ExpectMemberRole {
                baby_id,
                principal_id: actor.clone(),
                role: get_role(&baby, actor),
            },
            Mutation::PatchEvent {
                baby_id,
                event_id,
                patch,
                updated_at: now,
            },
        ])?;
        event.updated_at = now;
        info!(
            "event=care_event_update module=events status=ok baby_id={baby_id} event_id={event_id} principal={actor}"
        );
        Ok(event)
    }

    pub fn delete_event(
        &self,
        baby_id: BabyId,
        actor: &PrincipalId,
        event_id: EventId,
    ) -> ServiceResult<()> {
        let baby = load_baby(self.store, baby_id)?;
        authorize(can_write_events(&baby, actor), "delete events", baby_id, actor)?;
        self.store.transaction(vec![
            Mutation::ExpectMemberRole {
                baby_id,
                principal_id: actor.clone(),
                role: get_role(&baby, actor),
            },
            Mutation::DeleteEvent { baby_id, event_id },
        ])?;
        info!(
            "event=care_event_delete module=events status=ok baby_id={baby_id} event_id={event_id} principal={actor}"
        );
        Ok(())
    }

    /// Newest-first snapshot of the feed.
    pub fn list_events(
        &self,
        baby_id: BabyId,
        viewer: &PrincipalId,
        limit: Option<u32>,
    ) -> ServiceResult<Vec<CareEvent>> {
        self.authorize_read(baby_id, viewer)?;
        Ok(self.store.query_events(&EventQuery {
            limit,
            ..EventQuery::feed(baby_id)
        })?)
    }

    /// Events with `since <= time < until`, oldest first.
    pub fn events_in_window(
        &self,
        baby_id: BabyId,
        viewer: &PrincipalId,
        since: EpochMs,
        until: EpochMs,
    ) -> ServiceResult<Vec<CareEvent>> {
        self.authorize_read(baby_id, viewer)?;
        if until < since {
            return Err(ServiceError::InvalidState(format!(
                "window ends ({until}) before it starts ({since})"
            )));
        }
        Ok(self.store.query_events(&EventQuery {
            baby_id,
            since: Some(since),
            until: Some(until),
            order: TimeOrder::OldestFirst,
            limit: None,
        })?)
    }

    /// Live newest-first feed reflecting writes from every member.
    pub fn watch_events<F, E>(
        &self,
        baby_id: BabyId,
        viewer: &PrincipalId,
        mut on_change: F,
        on_error: E,
    ) -> ServiceResult<Subscription>
    where
        F: FnMut(Vec<CareEvent>) + Send + 'static,
        E: FnMut(&StoreError) + Send + 'static,
    {
        self.authorize_read(baby_id, viewer)?;
        let subscription = self.store.watch(
            WatchTarget::Events(baby_id),
            Box::new(move |snapshot: Snapshot| {
                if let SnapshotData::Events(events) = snapshot.data {
                    on_change(events);
                }
            }),
            Box::new(on_error),
        )?;
        Ok(subscription)
    }

    fn authorize_read(&self, baby_id: BabyId, viewer: &PrincipalId) -> ServiceResult<()> {
        let baby = load_baby(self.store, baby_id)?;
        authorize(can_read_events(&baby, viewer), "read events", baby_id, viewer)
    }

    fn load_event(&self, baby_id: BabyId, event_id: EventId) -> ServiceResult<CareEvent> {
        self.store
            .get_event(baby_id, event_id)?
            .ok_or_else(|| ServiceError::NotFound(format!("event {event_id}")))
    }
}
