use nestlog_core::store::{
    ErrorCallback, EventQuery, InviteQuery, Mutation, SnapshotCallback, Subscription, WatchTarget,
};
use nestlog_core::{
    Baby, BabyId, BabyService, CareEvent, DocumentStore, EpochMs, EventFields, EventId, EventKind,
    EventPatch, EventService, Invite, InviteId, ManualClock, ModelValidationError, PrincipalId,
    Role, ServiceError, SleepService, SqliteStore, StoreError, StoreResult,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

fn pid(value: &str) -> PrincipalId {
    PrincipalId::from(value)
}

fn ledger() -> (SqliteStore, Arc<ManualClock>, BabyId) {
    let clock = Arc::new(ManualClock::new(10_000));
    let store = SqliteStore::open_in_memory(clock.clone()).unwrap();
    let baby = BabyService::new(&store)
        .create_baby(&pid("mom"), "Mia", None)
        .unwrap();
    for (who, role) in [
        ("dad", Role::Parent),
        ("nanny", Role::Admin),
        ("grandma", Role::Viewer),
        ("doc", Role::Pediatrician),
    ] {
        store
            .write(Mutation::SetMemberRole {
                baby_id: baby.id,
                principal_id: pid(who),
                role,
            })
            .unwrap();
    }
    (store, clock, baby.id)
}

#[test]
fn events_are_stamped_with_server_time() {
    let (store, clock, baby_id) = ledger();
    clock.advance_secs(5);

    let event = EventService::new(&store)
        .add_event(baby_id, &pid("dad"), EventKind::Feeding, EventFields::feeding(120))
        .unwrap();
    assert_eq!(event.time, 15_000);
    assert_eq!(event.created_at, 15_000);
    assert_eq!(event.updated_at, 15_000);
    assert_eq!(event.logged_by, pid("dad"));
    assert_eq!(store.get_event(baby_id, event.id).unwrap(), Some(event));
}

#[test]
fn feed_is_newest_first_across_writers() {
    let (store, clock, baby_id) = ledger();
    let events = EventService::new(&store);
    let writers = [
        ("mom", EventKind::Pee, EventFields::default()),
        ("dad", EventKind::Feeding, EventFields::feeding(90)),
        ("nanny", EventKind::Poop, EventFields::default()),
    ];
    for (who, kind, fields) in writers {
        clock.advance_secs(60);
        events.add_event(baby_id, &pid(who), kind, fields).unwrap();
    }

    let feed = events.list_events(baby_id, &pid("doc"), None).unwrap();
    let kinds: Vec<EventKind> = feed.iter().map(|event| event.kind).collect();
    assert_eq!(kinds, vec![EventKind::Poop, EventKind::Feeding, EventKind::Pee]);

    let latest = events.list_events(baby_id, &pid("grandma"), Some(1)).unwrap();
    assert_eq!(latest.len(), 1);
    assert_eq!(latest[0].kind, EventKind::Poop);
}

#[test]
fn invalid_fields_are_rejected_before_writing() {
    let (store, _clock, baby_id) = ledger();
    let events = EventService::new(&store);

    let err = events
        .add_event(baby_id, &pid("mom"), EventKind::Feeding, EventFields::default())
        .unwrap_err();
    assert!(
        matches!(
            err,
            ServiceError::Validation(ModelValidationError::MissingField {
                kind: "feeding",
                field: "amount_ml"
            })
        ),
        "{err}"
    );
    let err = events
        .add_event(baby_id, &pid("mom"), EventKind::Pee, EventFields::feeding(10))
        .unwrap_err();
    assert!(matches!(err, ServiceError::Validation(_)), "{err}");

    assert!(events
        .list_events(baby_id, &pid("mom"), None)
        .unwrap()
        .is_empty());
}

#[test]
fn read_only_roles_cannot_write() {
    let (store, _clock, baby_id) = ledger();
    let events = EventService::new(&store);
    for who in ["grandma", "doc", "stranger"] {
        let err = events
            .add_event(baby_id, &pid(who), EventKind::Pee, EventFields::default())
            .unwrap_err();
        assert!(matches!(err, ServiceError::PermissionDenied { .. }), "{who}: {err}");
    }
    let err = events.list_events(baby_id, &pid("stranger"), None).unwrap_err();
    assert!(matches!(err, ServiceError::PermissionDenied { .. }), "{err}");
}

#[test]
fn update_merges_measurements_and_keeps_identity() {
    let (store, clock, baby_id) = ledger();
    let events = EventService::new(&store);
    let original = events
        .add_event(baby_id, &pid("dad"), EventKind::Feeding, EventFields::feeding(90))
        .unwrap();

    clock.advance_secs(120);
    let updated = events
        .update_event(
            baby_id,
            &pid("mom"),
            original.id,
            EventPatch {
                amount_ml: Some(150),
                duration_min: None,
            },
        )
        .unwrap();

    let stored = store.get_event(baby_id, original.id).unwrap().unwrap();
    assert_eq!(stored, updated);
    assert_eq!(stored.fields.amount_ml, Some(150));
    assert_eq!(stored.kind, EventKind::Feeding);
    assert_eq!(stored.time, original.time);
    assert_eq!(stored.created_at, original.created_at);
    assert_eq!(stored.logged_by, pid("dad"));
    assert_eq!(stored.updated_at, 130_000);
}

#[test]
fn update_that_breaks_kind_rules_is_rejected() {
    let (store, _clock, baby_id) = ledger();
    let events = EventService::new(&store);
    let feeding = events
        .add_event(baby_id, &pid("dad"), EventKind::Feeding, EventFields::feeding(90))
        .unwrap();

    let err = events
        .update_event(
            baby_id,
            &pid("dad"),
            feeding.id,
            EventPatch {
                amount_ml: None,
                duration_min: Some(30),
            },
        )
        .unwrap_err();
    assert!(matches!(err, ServiceError::Validation(_)), "{err}");
    assert_eq!(store.get_event(baby_id, feeding.id).unwrap(), Some(feeding));
}

#[test]
fn delete_removes_and_reports_missing_events() {
    let (store, _clock, baby_id) = ledger();
    let events = EventService::new(&store);
    let event = events
        .add_event(baby_id, &pid("dad"), EventKind::Poop, EventFields::default())
        .unwrap();

    let err = events
        .delete_event(baby_id, &pid("grandma"), event.id)
        .unwrap_err();
    assert!(matches!(err, ServiceError::PermissionDenied { .. }), "{err}");

    events.delete_event(baby_id, &pid("nanny"), event.id).unwrap();
    assert_eq!(store.get_event(baby_id, event.id).unwrap(), None);

    let err = events.delete_event(baby_id, &pid("nanny"), event.id).unwrap_err();
    assert!(matches!(err, ServiceError::NotFound(_)), "{err}");
}

#[test]
fn window_is_half_open_and_ascending() {
    let (store, clock, baby_id) = ledger();
    let events = EventService::new(&store);
    let mut times = Vec::new();
    for _ in 0..4 {
        clock.advance_secs(60);
        times.push(
            events
                .add_event(baby_id, &pid("mom"), EventKind::Pee, EventFields::default())
                .unwrap()
                .time,
        );
    }

    let window = events
        .events_in_window(baby_id, &pid("doc"), times[1], times[3])
        .unwrap();
    let got: Vec<i64> = window.iter().map(|event| event.time).collect();
    assert_eq!(got, vec![times[1], times[2]]);

    let err = events
        .events_in_window(baby_id, &pid("doc"), times[3], times[1])
        .unwrap_err();
    assert!(matches!(err, ServiceError::InvalidState(_)), "{err}");
}

#[test]
fn live_feed_reflects_other_members_writes() {
    let (store, clock, baby_id) = ledger();
    let events = EventService::new(&store);

    let feeds: Arc<Mutex<Vec<Vec<CareEvent>>>> = Arc::new(Mutex::new(Vec::new()));
    let feeds_in_cb = Arc::clone(&feeds);
    let subscription = events
        .watch_events(
            baby_id,
            &pid("grandma"),
            move |feed| feeds_in_cb.lock().unwrap().push(feed),
            |err: &StoreError| panic!("unexpected watch error: {err}"),
        )
        .unwrap();

    let first = events
        .add_event(baby_id, &pid("dad"), EventKind::Feeding, EventFields::feeding(60))
        .unwrap();
    clock.advance_secs(30);
    let second = events
        .add_event(baby_id, &pid("mom"), EventKind::Pee, EventFields::default())
        .unwrap();
    events.delete_event(baby_id, &pid("mom"), first.id).unwrap();
    subscription.unsubscribe();
    events
        .add_event(baby_id, &pid("mom"), EventKind::Poop, EventFields::default())
        .unwrap();

    let feeds = feeds.lock().unwrap();
    let ids: Vec<Vec<_>> = feeds
        .iter()
        .map(|feed| feed.iter().map(|event| event.id).collect())
        .collect();
    assert_eq!(
        ids,
        vec![
            vec![],
            vec![first.id],
            vec![second.id, first.id],
            vec![second.id],
        ]
    );
}

#[test]
fn manual_entries_above_plausible_limits_are_rejected() {
    let (store, _clock, baby_id) = ledger();
    let events = EventService::new(&store);

    let err = events
        .add_event(baby_id, &pid("dad"), EventKind::Feeding, EventFields::feeding(4_000_000))
        .unwrap_err();
    assert!(
        matches!(
            err,
            ServiceError::Validation(ModelValidationError::ExceedsMaximum {
                field: "amount_ml",
                max: 2_000
            })
        ),
        "{err}"
    );
    let err = events
        .add_event(baby_id, &pid("dad"), EventKind::Sleep, EventFields::sleep(1_000_000))
        .unwrap_err();
    assert!(
        matches!(
            err,
            ServiceError::Validation(ModelValidationError::ExceedsMaximum {
                field: "duration_min",
                max: 1_440
            })
        ),
        "{err}"
    );

    let at_limit = events
        .add_event(baby_id, &pid("dad"), EventKind::Feeding, EventFields::feeding(2_000))
        .unwrap();
    let err = events
        .update_event(
            baby_id,
            &pid("dad"),
            at_limit.id,
            EventPatch {
                amount_ml: Some(99_999),
                duration_min: None,
            },
        )
        .unwrap_err();
    assert!(matches!(err, ServiceError::Validation(_)), "{err}");
    assert_eq!(
        store.get_event(baby_id, at_limit.id).unwrap().unwrap().fields.amount_ml,
        Some(2_000)
    );
}

#[test]
fn timer_sessions_longer_than_a_day_are_still_logged() {
    let (store, clock, baby_id) = ledger();
    let sleep = SleepService::new(&store);
    let session = sleep.start_sleep(baby_id, &pid("mom")).unwrap();
    clock.advance_secs(30 * 60 * 60);

    let event = sleep
        .stop_sleep(baby_id, &pid("mom"), Some(session.started_at))
        .unwrap();
    assert_eq!(event.fields.duration_min, Some(1_800));
}

/// Store that demotes one member to viewer right before the next commit.
struct DemotedMidway {
    inner: SqliteStore,
    baby_id: BabyId,
    member: PrincipalId,
    fired: AtomicBool,
}

impl DocumentStore for DemotedMidway {
    fn server_time(&self) -> StoreResult<EpochMs> {
        self.inner.server_time()
    }

    fn get_baby(&self, baby_id: BabyId) -> StoreResult<Option<Baby>> {
        self.inner.get_baby(baby_id)
    }

    fn babies_for_member(&self, principal: &PrincipalId) -> StoreResult<Vec<Baby>> {
        self.inner.babies_for_member(principal)
    }

    fn get_invite(&self, invite_id: InviteId) -> StoreResult<Option<Invite>> {
        self.inner.get_invite(invite_id)
    }

    fn query_invites(&self, query: &InviteQuery) -> StoreResult<Vec<Invite>> {
        self.inner.query_invites(query)
    }

    fn get_event(&self, baby_id: BabyId, event_id: EventId) -> StoreResult<Option<CareEvent>> {
        self.inner.get_event(baby_id, event_id)
    }

    fn query_events(&self, query: &EventQuery) -> StoreResult<Vec<CareEvent>> {
        self.inner.query_events(query)
    }

    fn transaction(&self, mutations: Vec<Mutation>) -> StoreResult<()> {
        if !self.fired.swap(true, Ordering::SeqCst) {
            self.inner.write(Mutation::SetMemberRole {
                baby_id: self.baby_id,
                principal_id: self.member.clone(),
                role: Role::Viewer,
            })?;
        }
        self.inner.transaction(mutations)
    }

    fn watch(
        &self,
        target: WatchTarget,
        on_snapshot: SnapshotCallback,
        on_error: ErrorCallback,
    ) -> StoreResult<Subscription> {
        self.inner.watch(target, on_snapshot, on_error)
    }
}

fn demote_dad_on_next_commit(store: SqliteStore, baby_id: BabyId) -> DemotedMidway {
    DemotedMidway {
        inner: store,
        baby_id,
        member: pid("dad"),
        fired: AtomicBool::new(false),
    }
}

#[test]
fn writes_fail_when_the_author_is_demoted_before_commit() {
    let (store, clock, baby_id) = ledger();
    let feeding = EventService::new(&store)
        .add_event(baby_id, &pid("dad"), EventKind::Feeding, EventFields::feeding(90))
        .unwrap();
    let session = SleepService::new(&store)
        .start_sleep(baby_id, &pid("mom"))
        .unwrap();
    clock.advance_secs(600);

    let racing = demote_dad_on_next_commit(store, baby_id);
    let err = EventService::new(&racing)
        .update_event(
            baby_id,
            &pid("dad"),
            feeding.id,
            EventPatch {
                amount_ml: Some(120),
                duration_min: None,
            },
        )
        .unwrap_err();
    assert!(matches!(err, ServiceError::InvalidState(_)), "{err}");
    let store = racing.inner;
    assert_eq!(store.get_event(baby_id, feeding.id).unwrap(), Some(feeding.clone()));

    store
        .write(Mutation::SetMemberRole {
            baby_id,
            principal_id: pid("dad"),
            role: Role::Parent,
        })
        .unwrap();
    let racing = demote_dad_on_next_commit(store, baby_id);
    let err = EventService::new(&racing)
        .delete_event(baby_id, &pid("dad"), feeding.id)
        .unwrap_err();
    assert!(matches!(err, ServiceError::InvalidState(_)), "{err}");
    let store = racing.inner;
    assert!(store.get_event(baby_id, feeding.id).unwrap().is_some());

    store
        .write(Mutation::SetMemberRole {
            baby_id,
            principal_id: pid("dad"),
            role: Role::Parent,
        })
        .unwrap();
    let racing = demote_dad_on_next_commit(store, baby_id);
    let err = SleepService::new(&racing)
        .stop_sleep(baby_id, &pid("dad"), Some(session.started_at))
        .unwrap_err();
    assert!(matches!(err, ServiceError::InvalidState(_)), "{err}");
    let store = racing.inner;
    assert_eq!(
        store.get_baby(baby_id).unwrap().unwrap().active_sleep,
        Some(session)
    );
}
