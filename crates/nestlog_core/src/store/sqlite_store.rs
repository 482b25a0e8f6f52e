//! SQLite implementation of `DocumentStore`.
//!
//! # Responsibility
//! - Persist babies, memberships, invites and care events.
//! - Run guarded multi-document transactions atomically.
//! - Publish committed changes to live watchers.
//!
//! # Invariants
//! - One connection behind a mutex; every transaction sees a consistent view.
//! - Store revision increases by one per committed transaction and is read
//!   under the same lock as snapshot data.
//! - A commit that would leave a baby with anything but exactly one owner is
//!   rolled back.
//! - Read paths reject invalid persisted state instead of masking it.

use crate::db::{open_db, open_db_in_memory};
use crate::model::baby::{validate_baby_name, ActiveSleep, Baby, BabyId};
use crate::model::event::{CareEvent, EventFields, EventId, EventKind};
use crate::model::invite::{Invite, InviteId, InviteStatus};
use crate::model::principal::PrincipalId;
use crate::model::role::Role;
use crate::model::EpochMs;
use crate::store::clock::Clock;
use crate::store::watch::{
    Change, ErrorCallback, Snapshot, SnapshotCallback, SnapshotData, Subscription, WatchHub,
    WatchTarget,
};
use crate::store::{
    DocumentStore, EventQuery, InviteQuery, Mutation, StoreError, StoreResult, TimeOrder,
};
use log::{debug, error, warn};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;
use uuid::Uuid;

const BABY_SELECT_SQL: &str = "SELECT
    id,
    name,
    birth_date,
    photo_url,
    created_by,
    created_at,
    active_sleep_start,
    active_sleep_started_by
FROM babies";

const INVITE_SELECT_SQL: &str = "SELECT
    id,
    baby_id,
    baby_name,
    from_uid,
    from_name,
    to_email,
    role,
    status,
    created_at,
    resolved_at,
    resolved_by
FROM invites";

const EVENT_SELECT_SQL: &str = "SELECT
    id,
    baby_id,
    type,
    time,
    logged_by,
    amount_ml,
    duration_min,
    start_time,
    end_time,
    created_at,
    updated_at
FROM care_events";

struct Inner {
    conn: Connection,
    revision: u64,
}

/// SQLite-backed document store with in-process live watches.
pub struct SqliteStore {
    inner: Mutex<Inner>,
    clock: Arc<dyn Clock>,
    hub: Arc<WatchHub>,
}

impl SqliteStore {
    /// Opens (or creates) a database file.
    pub fn open(path: impl AsRef<Path>, clock: Arc<dyn Clock>) -> StoreResult<Self> {
        Ok(Self::from_connection(open_db(path)?, clock))
    }

    /// Opens a private in-memory database.
    pub fn open_in_memory(clock: Arc<dyn Clock>) -> StoreResult<Self> {
        Ok(Self::from_connection(open_db_in_memory()?, clock))
    }

    fn from_connection(conn: Connection, clock: Arc<dyn Clock>) -> Self {
        Self {
            inner: Mutex::new(Inner { conn, revision: 0 }),
            clock,
            hub: WatchHub::new(),
        }
    }

    /// Number of committed transactions since open.
    pub fn revision(&self) -> StoreResult<u64> {
        Ok(self.lock()?.revision)
    }

    /// Live subscriptions currently registered.
    pub fn subscriber_count(&self) -> usize {
        self.hub.subscriber_count()
    }

    fn lock(&self) -> StoreResult<MutexGuard<'_, Inner>> {
        self.inner
            .lock()
            .map_err(|_| StoreError::Unavailable("connection lock poisoned".to_string()))
    }

    fn load_snapshot(&self, target: &WatchTarget) -> StoreResult<Snapshot> {
        let inner = self.lock()?;
        let data = match target {
            WatchTarget::Baby(baby_id) => SnapshotData::Baby(read_baby(&inner.conn, *baby_id)?),
            WatchTarget::Events(baby_id) => {
                SnapshotData::Events(read_events(&inner.conn, &EventQuery::feed(*baby_id))?)
            }
            WatchTarget::PendingInvites(email) => SnapshotData::Invites(read_invites(
                &inner.conn,
                &InviteQuery::inbox(email.clone()),
            )?),
        };
        Ok(Snapshot {
            revision: inner.revision,
            data,
        })
    }

    fn commit(&self, mutations: &[Mutation]) -> StoreResult<Vec<Change>> {
        let mut inner = self.lock()?;
        let tx = inner.conn.transaction()?;
        let mut changes = Vec::new();
        let mut membership_touched = BTreeSet::new();

        for mutation in mutations {
            apply_mutation(&tx, mutation, &mut changes)?;
            match mutation {
                Mutation::InsertBaby(baby) => {
                    membership_touched.insert(baby.id);
                }
                Mutation::SetMemberRole { baby_id, .. } | Mutation::RemoveMember { baby_id, .. } => {
                    membership_touched.insert(*baby_id);
                }
                _ => {}
            }
        }
        for baby_id in membership_touched {
            ensure_single_owner(&tx, baby_id)?;
        }

        tx.commit()?;
        inner.revision += 1;
        Ok(changes)
    }
}

impl DocumentStore for SqliteStore {
    fn server_time(&self) -> StoreResult<EpochMs> {
        Ok(self.clock.now_ms())
    }

    fn get_baby(&self, baby_id: BabyId) -> StoreResult<Option<Baby>> {
        read_baby(&self.lock()?.conn, baby_id)
    }

    fn babies_for_member(&self, principal: &PrincipalId) -> StoreResult<Vec<Baby>> {
        let inner = self.lock()?;
        let mut stmt = inner.conn.prepare(
            "SELECT b.id
             FROM babies b
             JOIN baby_members m ON m.baby_id = b.id
             WHERE m.principal_id = ?1
             ORDER BY b.created_at ASC, b.id ASC;",
        )?;
        let ids = stmt
            .query_map([principal.as_str()], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;

        let mut babies = Vec::with_capacity(ids.len());
        for id_text in ids {
            let baby_id = parse_uuid(&id_text, "babies.id")?;
            if let Some(baby) = read_baby(&inner.conn, baby_id)? {
                babies.push(baby);
            }
        }
        Ok(babies)
    }

    fn get_invite(&self, invite_id: InviteId) -> StoreResult<Option<Invite>> {
        read_invite(&self.lock()?.conn, invite_id)
    }

    fn query_invites(&self, query: &InviteQuery) -> StoreResult<Vec<Invite>> {
        read_invites(&self.lock()?.conn, query)
    }

    fn get_event(&self, baby_id: BabyId, event_id: EventId) -> StoreResult<Option<CareEvent>> {
        read_event(&self.lock()?.conn, baby_id, event_id)
    }

    fn query_events(&self, query: &EventQuery) -> StoreResult<Vec<CareEvent>> {
        read_events(&self.lock()?.conn, query)
    }

    fn transaction(&self, mutations: Vec<Mutation>) -> StoreResult<()> {
        let started_at = Instant::now();
        match self.commit(&mutations) {
            Ok(changes) => {
                debug!(
                    "event=store_commit module=store status=ok mutations={} changes={} duration_ms={}",
                    mutations.len(),
                    changes.len(),
                    started_at.elapsed().as_millis()
                );
                self.hub
                    .publish(&changes, &|target| self.load_snapshot(target));
                Ok(())
            }
            Err(err @ (StoreError::PreconditionFailed(_) | StoreError::NotFound(_))) => {
                warn!(
                    "event=store_commit module=store status=rejected mutations={} error={err}",
                    mutations.len()
                );
                Err(err)
            }
            Err(err) => {
                error!(
                    "event=store_commit module=store status=error mutations={} duration_ms={} error={err}",
                    mutations.len(),
                    started_at.elapsed().as_millis()
                );
                Err(err)
            }
        }
    }

    fn watch(
        &self,
        target: WatchTarget,
        on_snapshot: SnapshotCallback,
        on_error: ErrorCallback,
    ) -> StoreResult<Subscription> {
        let (subscription, subscriber) = self.hub.register(target, on_snapshot, on_error);
        subscriber.deliver(&|target| self.load_snapshot(target));
        Ok(subscription)
    }
}

fn apply_mutation(
    conn: &Connection,
    mutation: &Mutation,
    changes: &mut Vec<Change>,
) -> StoreResult<()> {
    match mutation {
        Mutation::ExpectInviteStatus { invite_id, status } => {
            let current = invite_status(conn, *invite_id)?
                .ok_or_else(|| StoreError::NotFound(format!("invite {invite_id}")))?;
            if current != *status {
                return Err(StoreError::PreconditionFailed(format!(
                    "invite {invite_id} is {}, expected {}",
                    current.as_str(),
                    status.as_str()
                )));
            }
        }
        Mutation::ExpectMemberRole {
            baby_id,
            principal_id,
            role,
        } => {
            require_baby(conn, *baby_id)?;
            let current = member_role(conn, *baby_id, principal_id)?;
            if current != *role {
                return Err(StoreError::PreconditionFailed(format!(
                    "{principal_id} holds {} on baby {baby_id}, expected {}",
                    describe_role(current),
                    describe_role(*role)
                )));
            }
        }
        Mutation::ExpectMember {
            baby_id,
            principal_id,
        } => {
            require_baby(conn, *baby_id)?;
            if member_role(conn, *baby_id, principal_id)?.is_none() {
                return Err(StoreError::PreconditionFailed(format!(
                    "{principal_id} is not a member of baby {baby_id}"
                )));
            }
        }
        Mutation::ExpectActiveSleep {
            baby_id,
            started_at,
        } => {
            let current = conn
                .query_row(
                    "SELECT active_sleep_start FROM babies WHERE id = ?1;",
                    [baby_id.to_string()],
                    |row| row.get::<_, Option<i64>>(0),
                )
                .optional()?
                .ok_or_else(|| StoreError::NotFound(format!("baby {baby_id}")))?;
            if current != *started_at {
                return Err(StoreError::PreconditionFailed(format!(
                    "active sleep on baby {baby_id} started at {current:?}, expected {started_at:?}"
                )));
            }
        }
        Mutation::InsertBaby(baby) => {
            baby.validate()?;
            let (sleep_start, sleep_by) = split_active_sleep(baby.active_sleep.as_ref());
            conn.execute(
                "INSERT INTO babies (
                    id,
                    name,
                    birth_date,
                    photo_url,
                    created_by,
                    created_at,
                    active_sleep_start,
                    active_sleep_started_by
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8);",
                params![
                    baby.id.to_string(),
                    baby.name.as_str(),
                    baby.birth_date,
                    baby.photo_url.as_deref(),
                    baby.created_by.as_str(),
                    baby.created_at,
                    sleep_start,
                    sleep_by,
                ],
            )?;
            for (principal, role) in &baby.members {
                upsert_member(conn, baby.id, principal, *role)?;
            }
            changes.push(Change::Baby(baby.id));
        }
        Mutation::UpdateBabyProfile {
            baby_id,
            name,
            birth_date,
        } => {
            validate_baby_name(name)?;
            let changed = conn.execute(
                "UPDATE babies SET name = ?1, birth_date = ?2 WHERE id = ?3;",
                params![name.trim(), birth_date, baby_id.to_string()],
            )?;
            if changed == 0 {
                return Err(StoreError::NotFound(format!("baby {baby_id}")));
            }
            changes.push(Change::Baby(*baby_id));
        }
        Mutation::SetBabyPhoto { baby_id, photo_url } => {
            let changed = conn.execute(
                "UPDATE babies SET photo_url = ?1 WHERE id = ?2;",
                params![photo_url.as_deref(), baby_id.to_string()],
            )?;
            if changed == 0 {
                return Err(StoreError::NotFound(format!("baby {baby_id}")));
            }
            changes.push(Change::Baby(*baby_id));
        }
        Mutation::DeleteBaby(baby_id) => {
            let changed =
                conn.execute("DELETE FROM babies WHERE id = ?1;", [baby_id.to_string()])?;
            if changed == 0 {
                return Err(StoreError::NotFound(format!("baby {baby_id}")));
            }
            changes.push(Change::Baby(*baby_id));
            changes.push(Change::Events(*baby_id));
            changes.push(Change::Invites(None));
        }
        Mutation::SetMemberRole {
            baby_id,
            principal_id,
            role,
        } => {
            require_baby(conn, *baby_id)?;
            upsert_member(conn, *baby_id, principal_id, *role)?;
            changes.push(Change::Baby(*baby_id));
        }
        Mutation::RemoveMember {
            baby_id,
            principal_id,
        } => {
            let changed = conn.execute(
                "DELETE FROM baby_members WHERE baby_id = ?1 AND principal_id = ?2;",
                params![baby_id.to_string(), principal_id.as_str()],
            )?;
            if changed == 0 {
                return Err(StoreError::NotFound(format!(
                    "member {principal_id} of baby {baby_id}"
                )));
            }
            changes.push(Change::Baby(*baby_id));
        }
        Mutation::SetActiveSleep { baby_id, active } => {
            let (sleep_start, sleep_by) = split_active_sleep(active.as_ref());
            let changed = conn.execute(
                "UPDATE babies
                 SET active_sleep_start = ?1, active_sleep_started_by = ?2
                 WHERE id = ?3;",
                params![sleep_start, sleep_by, baby_id.to_string()],
            )?;
            if changed == 0 {
                return Err(StoreError::NotFound(format!("baby {baby_id}")));
            }
            changes.push(Change::Baby(*baby_id));
        }
        Mutation::InsertInvite(invite) => {
            require_baby(conn, invite.baby_id)?;
            conn.execute(
                "INSERT INTO invites (
                    id,
                    baby_id,
                    baby_name,
                    from_uid,
                    from_name,
                    to_email,
                    role,
                    status,
                    created_at,
                    resolved_at,
                    resolved_by
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11);",
                params![
                    invite.id.to_string(),
                    invite.baby_id.to_string(),
                    invite.baby_name.as_str(),
                    invite.from_uid.as_str(),
                    invite.from_name.as_str(),
                    invite.to_email.as_str(),
                    invite.role.as_str(),
                    invite.status.as_str(),
                    invite.created_at,
                    invite.resolved_at,
                    invite.resolved_by.as_ref().map(PrincipalId::as_str),
                ],
            )?;
            changes.push(Change::Invites(Some(invite.to_email.clone())));
        }
        Mutation::ResolveInvite {
            invite_id,
            status,
            resolved_at,
            resolved_by,
        } => {
            let email = invite_email(conn, *invite_id)?;
            // Terminal invites are immutable regardless of caller guards.
            let changed = conn.execute(
                "UPDATE invites
                 SET status = ?1, resolved_at = ?2, resolved_by = ?3
                 WHERE id = ?4 AND status = 'pending';",
                params![
                    status.as_str(),
                    resolved_at,
                    resolved_by.as_ref().map(PrincipalId::as_str),
                    invite_id.to_string(),
                ],
            )?;
            if changed == 0 {
                return Err(StoreError::PreconditionFailed(format!(
                    "invite {invite_id} is no longer pending"
                )));
            }
            changes.push(Change::Invites(Some(email)));
        }
        Mutation::DeleteInvite(invite_id) => {
            let email = invite_email(conn, *invite_id)?;
            conn.execute("DELETE FROM invites WHERE id = ?1;", [invite_id.to_string()])?;
            changes.push(Change::Invites(Some(email)));
        }
        Mutation::InsertEvent(event) => {
            event.validate()?;
            require_baby(conn, event.baby_id)?;
            conn.execute(
                "INSERT INTO care_events (
                    id,
                    baby_id,
                    type,
                    time,
                    logged_by,
                    amount_ml,
                    duration_min,
                    start_time,
                    end_time,
                    created_at,
                    updated_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11);",
                params![
                    event.id.to_string(),
                    event.baby_id.to_string(),
                    event.kind.as_str(),
                    event.time,
                    event.logged_by.as_str(),
                    event.fields.amount_ml,
                    event.fields.duration_min,
                    event.fields.start,
                    event.fields.end,
                    event.created_at,
                    event.updated_at,
                ],
            )?;
            changes.push(Change::Events(event.baby_id));
        }
        Mutation::PatchEvent {
            baby_id,
            event_id,
            patch,
            updated_at,
        } => {
            let mut event = read_event(conn, *baby_id, *event_id)?
                .ok_or_else(|| StoreError::NotFound(format!("event {event_id}")))?;
            patch.apply_to(&mut event.fields);
            event.validate()?;
            conn.execute(
                "UPDATE care_events
                 SET amount_ml = ?1, duration_min = ?2, updated_at = ?3
                 WHERE id = ?4 AND baby_id = ?5;",
                params![
                    event.fields.amount_ml,
                    event.fields.duration_min,
                    updated_at,
                    event_id.to_string(),
                    baby_id.to_string(),
                ],
            )?;
            changes.push(Change::Events(*baby_id));
        }
        Mutation::DeleteEvent { baby_id, event_id } => {
            let changed = conn.execute(
                "DELETE FROM care_events WHERE id = ?1 AND baby_id = ?2;",
                params![event_id.to_string(), baby_id.to_string()],
            )?;
            if changed == 0 {
                return Err(StoreError::NotFound(format!("event {event_id}")));
            }
            changes.push(Change::Events(*baby_id));
        }
    }
    Ok(())
}

fn ensure_single_owner(conn: &Connection, baby_id: BabyId) -> StoreResult<()> {
    if !baby_exists(conn, baby_id)? {
        return Ok(());
    }
    let owners: i64 = conn.query_row(
        "SELECT COUNT(*) FROM baby_members WHERE baby_id = ?1 AND role = 'owner';",
        [baby_id.to_string()],
        |row| row.get(0),
    )?;
    if owners != 1 {
        return Err(StoreError::PreconditionFailed(format!(
            "baby {baby_id} must have exactly one owner, found {owners}"
        )));
    }
    Ok(())
}

fn upsert_member(
    conn: &Connection,
    baby_id: BabyId,
    principal: &PrincipalId,
    role: Role,
) -> StoreResult<()> {
    conn.execute(
        "INSERT INTO baby_members (baby_id, principal_id, role)
         VALUES (?1, ?2, ?3)
         ON CONFLICT (baby_id, principal_id) DO UPDATE SET role = excluded.role;",
        params![baby_id.to_string(), principal.as_str(), role.as_str()],
    )?;
    Ok(())
}

fn baby_exists(conn: &Connection, baby_id: BabyId) -> StoreResult<bool> {
    let exists: i64 = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM babies WHERE id = ?1);",
        [baby_id.to_string()],
        |row| row.get(0),
    )?;
    Ok(exists == 1)
}

fn require_baby(conn: &Connection, baby_id: BabyId) -> StoreResult<()> {
    if baby_exists(conn, baby_id)? {
        Ok(())
    } else {
        Err(StoreError::NotFound(format!("baby {baby_id}")))
    }
}

fn member_role(
    conn: &Connection,
    baby_id: BabyId,
    principal: &PrincipalId,
) -> StoreResult<Option<Role>> {
    let role_text = conn
        .query_row(
            "SELECT role FROM baby_members WHERE baby_id = ?1 AND principal_id = ?2;",
            params![baby_id.to_string(), principal.as_str()],
            |row| row.get::<_, String>(0),
        )
        .optional()?;
    role_text
        .map(|text| parse_role(&text, "baby_members.role"))
        .transpose()
}

fn invite_status(conn: &Connection, invite_id: InviteId) -> StoreResult<Option<InviteStatus>> {
    let status_text = conn
        .query_row(
            "SELECT status FROM invites WHERE id = ?1;",
            [invite_id.to_string()],
            |row| row.get::<_, String>(0),
        )
        .optional()?;
    status_text.map(|text| parse_invite_status(&text)).transpose()
}

fn invite_email(conn: &Connection, invite_id: InviteId) -> StoreResult<String> {
    conn.query_row(
        "SELECT to_email FROM invites WHERE id = ?1;",
        [invite_id.to_string()],
        |row| row.get::<_, String>(0),
    )
    .optional()?
    .ok_or_else(|| StoreError::NotFound(format!("invite {invite_id}")))
}

fn read_baby(conn: &Connection, baby_id: BabyId) -> StoreResult<Option<Baby>> {
    let mut stmt = conn.prepare(&format!("{BABY_SELECT_SQL} WHERE id = ?1;"))?;
    let mut rows = stmt.query([baby_id.to_string()])?;
    let Some(row) = rows.next()? else {
        return Ok(None);
    };
    let mut baby = parse_baby_row(row)?;
    baby.members = read_members(conn, baby.id)?;
    Ok(Some(baby))
}

fn read_members(conn: &Connection, baby_id: BabyId) -> StoreResult<BTreeMap<PrincipalId, Role>> {
    let mut stmt = conn.prepare(
        "SELECT principal_id, role FROM baby_members WHERE baby_id = ?1 ORDER BY principal_id;",
    )?;
    let mut rows = stmt.query([baby_id.to_string()])?;
    let mut members = BTreeMap::new();
    while let Some(row) = rows.next()? {
        let principal: String = row.get("principal_id")?;
        let role_text: String = row.get("role")?;
        members.insert(
            PrincipalId::new(principal),
            parse_role(&role_text, "baby_members.role")?,
        );
    }
    Ok(members)
}

fn read_invite(conn: &Connection, invite_id: InviteId) -> StoreResult<Option<Invite>> {
    let mut stmt = conn.prepare(&format!("{INVITE_SELECT_SQL} WHERE id = ?1;"))?;
    let mut rows = stmt.query([invite_id.to_string()])?;
    match rows.next()? {
        Some(row) => Ok(Some(parse_invite_row(row)?)),
        None => Ok(None),
    }
}

fn read_invites(conn: &Connection, query: &InviteQuery) -> StoreResult<Vec<Invite>> {
    let mut sql = format!("{INVITE_SELECT_SQL} WHERE 1 = 1");
    let mut bind_values: Vec<Value> = Vec::new();

    if let Some(baby_id) = query.baby_id {
        sql.push_str(" AND baby_id = ?");
        bind_values.push(Value::Text(baby_id.to_string()));
    }
    if let Some(email) = &query.to_email {
        sql.push_str(" AND to_email = ?");
        bind_values.push(Value::Text(email.clone()));
    }
    if let Some(from_uid) = &query.from_uid {
        sql.push_str(" AND from_uid = ?");
        bind_values.push(Value::Text(from_uid.as_str().to_string()));
    }
    if let Some(status) = query.status {
        sql.push_str(" AND status = ?");
        bind_values.push(Value::Text(status.as_str().to_string()));
    }
    sql.push_str(" ORDER BY created_at DESC, id ASC;");

    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query(params_from_iter(bind_values))?;
    let mut invites = Vec::new();
    while let Some(row) = rows.next()? {
        invites.push(parse_invite_row(row)?);
    }
    Ok(invites)
}

fn read_event(
    conn: &Connection,
    baby_id: BabyId,
    event_id: EventId,
) -> StoreResult<Option<CareEvent>> {
    let mut stmt = conn.prepare(&format!(
        "{EVENT_SELECT_SQL} WHERE id = ?1 AND baby_id = ?2;"
    ))?;
    let mut rows = stmt.query(params![event_id.to_string(), baby_id.to_string()])?;
    match rows.next()? {
        Some(row) => Ok(Some(parse_event_row(row)?)),
        None => Ok(None),
    }
}

fn read_events(conn: &Connection, query: &EventQuery) -> StoreResult<Vec<CareEvent>> {
    let mut sql = format!("{EVENT_SELECT_SQL} WHERE baby_id = ?");
    let mut bind_values: Vec<Value> = vec![Value::Text(query.baby_id.to_string())];

    if let Some(since) = query.since {
        sql.push_str(" AND time >= ?");
        bind_values.push(Value::Integer(since));
    }
    if let Some(until) = query.until {
        sql.push_str(" AND time < ?");
        bind_values.push(Value::Integer(until));
    }
    match query.order {
        TimeOrder::NewestFirst => sql.push_str(" ORDER BY time DESC, created_at DESC, id ASC"),
        TimeOrder::OldestFirst => sql.push_str(" ORDER BY time ASC, created_at ASC, id ASC"),
    }
    if let Some(limit) = query.limit {
        sql.push_str(" LIMIT ?");
        bind_values.push(Value::Integer(i64::from(limit)));
    }

    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query(params_from_iter(bind_values))?;
    let mut events = Vec::new();
    while let Some(row) = rows.next()? {
        events.push(parse_event_row(row)?);
    }
    Ok(events)
}

fn parse_baby_row(row: &Row<'_>) -> StoreResult<Baby> {
    let id_text: String = row.get("id")?;
    let created_by: String = row.get("created_by")?;
    let sleep_start: Option<i64> = row.get("active_sleep_start")?;
    let sleep_by: Option<String> = row.get("active_sleep_started_by")?;

    let active_sleep = match (sleep_start, sleep_by) {
        (Some(started_at), Some(started_by)) => Some(ActiveSleep {
            started_at,
            started_by: PrincipalId::new(started_by),
        }),
        (None, None) => None,
        _ => {
            return Err(StoreError::InvalidData(format!(
                "half-written active sleep on baby `{id_text}`"
            )));
        }
    };

    Ok(Baby {
        id: parse_uuid(&id_text, "babies.id")?,
        name: row.get("name")?,
        birth_date: row.get("birth_date")?,
        photo_url: row.get("photo_url")?,
        created_by: PrincipalId::new(created_by),
        created_at: row.get("created_at")?,
        members: BTreeMap::new(),
        active_sleep,
    })
}

fn parse_invite_row(row: &Row<'_>) -> StoreResult<Invite> {
    let id_text: String = row.get("id")?;
    let baby_text: String = row.get("baby_id")?;
    let from_uid: String = row.get("from_uid")?;
    let role_text: String = row.get("role")?;
    let status_text: String = row.get("status")?;
    let resolved_by: Option<String> = row.get("resolved_by")?;

    Ok(Invite {
        id: parse_uuid(&id_text, "invites.id")?,
        baby_id: parse_uuid(&baby_text, "invites.baby_id")?,
        baby_name: row.get("baby_name")?,
        from_uid: PrincipalId::new(from_uid),
        from_name: row.get("from_name")?,
        to_email: row.get("to_email")?,
        role: parse_role(&role_text, "invites.role")?,
        status: parse_invite_status(&status_text)?,
        created_at: row.get("created_at")?,
        resolved_at: row.get("resolved_at")?,
        resolved_by: resolved_by.map(PrincipalId::new),
    })
}

fn parse_event_row(row: &Row<'_>) -> StoreResult<CareEvent> {
    let id_text: String = row.get("id")?;
    let baby_text: String = row.get("baby_id")?;
    let type_text: String = row.get("type")?;
    let logged_by: String = row.get("logged_by")?;

    let kind = EventKind::parse(&type_text).ok_or_else(|| {
        StoreError::InvalidData(format!("invalid event type `{type_text}` in care_events.type"))
    })?;

    let event = CareEvent {
        id: parse_uuid(&id_text, "care_events.id")?,
        baby_id: parse_uuid(&baby_text, "care_events.baby_id")?,
        kind,
        time: row.get("time")?,
        logged_by: PrincipalId::new(logged_by),
        fields: EventFields {
            amount_ml: row.get("amount_ml")?,
            duration_min: row.get("duration_min")?,
            start: row.get("start_time")?,
            end: row.get("end_time")?,
        },
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    };
    event.validate()?;
    Ok(event)
}

fn parse_uuid(value: &str, column: &str) -> StoreResult<Uuid> {
    Uuid::parse_str(value)
        .map_err(|_| StoreError::InvalidData(format!("invalid uuid value `{value}` in {column}")))
}

fn parse_role(value: &str, column: &str) -> StoreResult<Role> {
    Role::parse(value)
        .ok_or_else(|| StoreError::InvalidData(format!("invalid role `{value}` in {column}")))
}

fn parse_invite_status(value: &str) -> StoreResult<InviteStatus> {
    InviteStatus::parse(value).ok_or_else(|| {
        StoreError::InvalidData(format!("invalid invite status `{value}` in invites.status"))
    })
}

fn split_active_sleep(active: Option<&ActiveSleep>) -> (Option<EpochMs>, Option<&str>) {
    match active {
        Some(session) => (Some(session.started_at), Some(session.started_by.as_str())),
        None => (None, None),
    }
}

fn describe_role(role: Option<Role>) -> &'static str {
    role.map_or("no role", Role::as_str)
}
