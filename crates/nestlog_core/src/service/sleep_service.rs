//! Active sleep session register and timer derivation.
//!
//! # Responsibility
//! - Start and stop the single shared sleep session of a baby.
//! - Derive elapsed time from `(server_now, started_at)` for any observer.
//!
//! # Invariants
//! - Start is last-writer-wins: a second start replaces the session.
//! - Stop only succeeds against the session the caller observed; the losing
//!   device of a concurrent stop gets `InvalidState` and no event is written.
//! - Elapsed time is never accumulated; every tick recomputes it.

use crate::access::permissions::{can_read_events, can_write_events, get_role};
use crate::model::baby::{ActiveSleep, Baby, BabyId};
use crate::model::event::{CareEvent, EventFields, EventKind};
use crate::model::principal::PrincipalId;
use crate::model::EpochMs;
use crate::service::{authorize, load_baby, ServiceError, ServiceResult};
use crate::store::{
    DocumentStore, Mutation, Snapshot, SnapshotData, StoreError, Subscription, WatchTarget,
};
use log::info;

const MS_PER_MINUTE: EpochMs = 60_000;

pub struct SleepService<'a, S: DocumentStore + ?Sized> {
    store: &'a S,
}

impl<'a, S: DocumentStore + ?Sized> SleepService<'a, S> {
    pub fn new(store: &'a S) -> Self {
        Self { store }
    }

    /// Starts (or restarts) the session at server time.
    pub fn start_sleep(&self, baby_id: BabyId, actor: &PrincipalId) -> ServiceResult<ActiveSleep> {
        let baby = load_baby(self.store, baby_id)?;
        authorize(can_write_events(&baby, actor), "start sleep", baby_id, actor)?;

        let session = ActiveSleep {
            started_at: self.store.server_time()?,
            started_by: actor.clone(),
        };
        self.store.transaction(vec![
            Mutation::ExpectMemberRole {
                baby_id,
                principal_id: actor.clone(),
                role: get_role(&baby, actor),
            },
            Mutation::SetActiveSleep {
                baby_id,
                active: Some(session.clone()),
            },
        ])?;
        info!(
            "event=sleep_start module=sleep status=ok baby_id={baby_id} principal={actor} started_at={}",
            session.started_at
        );
        Ok(session)
    }

    /// Stops the session that started at `known_started_at` and logs it as a
    /// completed sleep event.
    ///
    /// # Errors
    /// - `InvalidState` when no start is known, no session is running, or
    ///   the running session is not the one the caller observed.
    pub fn stop_sleep(
        &self,
        baby_id: BabyId,
        actor: &PrincipalId,
        known_started_at: Option<EpochMs>,
    ) -> ServiceResult<CareEvent> {
        let baby = load_baby(self.store, baby_id)?;
        authorize(can_write_events(&baby, actor), "stop sleep", baby_id, actor)?;

        let Some(started_at) = known_started_at else {
            return Err(ServiceError::InvalidState(
                "no sleep session to stop".to_string(),
            ));
        };
        match &baby.active_sleep {
            None => {
                return Err(ServiceError::InvalidState(format!(
                    "no sleep session is running for baby {baby_id}"
                )));
            }
            Some(active) if active.started_at != started_at => {
                return Err(ServiceError::InvalidState(format!(
                    "sleep session for baby {baby_id} changed since it was observed"
                )));
            }
            Some(_) => {}
        }

        let now = self.store.server_time()?;
        let ended_at = now.max(started_at);
        let fields = EventFields {
            duration_min: Some(sleep_duration_minutes(started_at, ended_at)),
            start: Some(started_at),
            end: Some(ended_at),
            ..EventFields::default()
        };
        let mut event = CareEvent::new(baby_id, EventKind::Sleep, actor.clone(), fields, now);
        event.time = started_at;

        self.store.transaction(vec![
            Mutation::ExpectMemberRole {
                baby_id,
                principal_id: actor.clone(),
                role: get_role(&baby, actor),
            },
            Mutation::ExpectActiveSleep {
                baby_id,
                started_at: Some(started_at),
            },
            Mutation::InsertEvent(event.clone()),
            Mutation::SetActiveSleep {
                baby_id,
                active: None,
            },
        ])?;
        info!(
            "event=sleep_stop module=sleep status=ok baby_id={baby_id} principal={actor} event_id={} duration_min={}",
            event.id,
            event.fields.duration_min.unwrap_or_default()
        );
        Ok(event)
    }

    /// Live view of the running session; `None` while idle.
    pub fn watch_active_sleep<F, E>(
        &self,
        baby_id: BabyId,
        viewer: &PrincipalId,
        mut on_change: F,
        on_error: E,
    ) -> ServiceResult<Subscription>
    where
        F: FnMut(Option<ActiveSleep>) + Send + 'static,
        E: FnMut(&StoreError) + Send + 'static,
    {
        let baby = load_baby(self.store, baby_id)?;
        authorize(can_read_events(&baby, viewer), "watch sleep", baby_id, viewer)?;
        let subscription = self.store.watch(
            WatchTarget::Baby(baby_id),
            Box::new(move |snapshot: Snapshot| {
                if let SnapshotData::Baby(baby) = snapshot.data {
                    on_change(baby.and_then(|baby| baby.active_sleep));
                }
            }),
            Box::new(on_error),
        )?;
        Ok(subscription)
    }
}

/// Milliseconds the session has been running; 0 when idle or when the
/// observer's clock is behind the start.
pub fn elapsed_ms(server_now: EpochMs, active: Option<&ActiveSleep>) -> EpochMs {
    active.map_or(0, |session| (server_now - session.started_at).max(0))
}

pub fn elapsed_seconds(server_now: EpochMs, active: Option<&ActiveSleep>) -> u64 {
    u64::try_from(elapsed_ms(server_now, active) / 1_000).unwrap_or(0)
}

/// Whole minutes between start and end, rounded half up, at least 1.
pub fn sleep_duration_minutes(started_at: EpochMs, ended_at: EpochMs) -> u32 {
    let elapsed = ended_at - started_at;
    if elapsed <= 0 {
        return 1;
    }
    let minutes = (elapsed + MS_PER_MINUTE / 2) / MS_PER_MINUTE;
    u32::try_from(minutes.max(1)).unwrap_or(u32::MAX)
}

/// `MM:SS` below an hour, `H:MM:SS` from there on.
pub fn format_elapsed(total_seconds: u64) -> String {
    let hours = total_seconds / 3_600;
    let minutes = (total_seconds % 3_600) / 60;
    let seconds = total_seconds % 60;
    if hours > 0 {
        format!("{hours}:{minutes:02}:{seconds:02}")
    } else {
        format!("{minutes:02}:{seconds:02}")
    }
}

/// What a timer widget shows at one tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TimerView {
    Idle,
    Running {
        started_at: EpochMs,
        started_by: PrincipalId,
        elapsed_secs: u64,
    },
}

impl TimerView {
    pub fn label(&self) -> String {
        match self {
            Self::Idle => "--:--".to_string(),
            Self::Running { elapsed_secs, .. } => format_elapsed(*elapsed_secs),
        }
    }
}

/// Per-observer timer state folded from baby snapshots.
///
/// Holds only the last observed session; each `view` call derives elapsed
/// time from scratch, so two devices fed the same snapshots agree.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SleepTimer {
    session: Option<ActiveSleep>,
}

impl SleepTimer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Folds the latest baby snapshot; `None` means the baby is gone.
    pub fn observe(&mut self, baby: Option<&Baby>) {
        self.session = baby.and_then(|baby| baby.active_sleep.clone());
    }

    pub fn observe_session(&mut self, session: Option<ActiveSleep>) {
        self.session = session;
    }

    /// Start time to pass to `stop_sleep`.
    pub fn known_started_at(&self) -> Option<EpochMs> {
        self.session.as_ref().map(|session| session.started_at)
    }

    pub fn view(&self, server_now: EpochMs) -> TimerView {
        match &self.session {
            None => TimerView::Idle,
            Some(session) => TimerView::Running {
                started_at: session.started_at,
                started_by: session.started_by.clone(),
                elapsed_secs: elapsed_seconds(server_now, Some(session)),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{
        elapsed_ms, elapsed_seconds, format_elapsed, sleep_duration_minutes, SleepTimer,
        TimerView,
    };
    use crate::model::baby::{ActiveSleep, Baby};
    use crate::model::principal::PrincipalId;

    fn session(started_at: i64) -> ActiveSleep {
        ActiveSleep {
            started_at,
            started_by: PrincipalId::from("u1"),
        }
    }

    #[test]
    fn elapsed_is_zero_when_idle_or_clock_behind() {
        assert_eq!(elapsed_ms(10_000, None), 0);
        assert_eq!(elapsed_ms(1_000, Some(&session(5_000))), 0);
        assert_eq!(elapsed_seconds(65_500, Some(&session(0))), 65);
    }

    #[test]
    fn duration_rounds_half_up_with_one_minute_floor() {
        assert_eq!(sleep_duration_minutes(0, 0), 1);
        assert_eq!(sleep_duration_minutes(0, 20_000), 1);
        assert_eq!(sleep_duration_minutes(0, 29_999), 1);
        assert_eq!(sleep_duration_minutes(0, 89_999), 1);
        assert_eq!(sleep_duration_minutes(0, 90_000), 2);
        assert_eq!(sleep_duration_minutes(0, 45 * 60_000 + 10_000), 45);
        assert_eq!(sleep_duration_minutes(5_000, 1_000), 1);
    }

    #[test]
    fn format_switches_to_hours() {
        assert_eq!(format_elapsed(0), "00:00");
        assert_eq!(format_elapsed(65), "01:05");
        assert_eq!(format_elapsed(3_599), "59:59");
        assert_eq!(format_elapsed(3_600), "1:00:00");
        assert_eq!(format_elapsed(2 * 3_600 + 3 * 60 + 4), "2:03:04");
    }

    #[test]
    fn timer_follows_snapshots_and_recomputes_each_tick() {
        let mut baby = Baby::new(PrincipalId::from("u1"), "Mia", None, 0);
        let mut timer = SleepTimer::new();
        timer.observe(Some(&baby));
        assert_eq!(timer.view(1_000), TimerView::Idle);
        assert_eq!(timer.view(1_000).label(), "--:--");

        baby.active_sleep = Some(session(10_000));
        timer.observe(Some(&baby));
        assert_eq!(timer.known_started_at(), Some(10_000));
        assert_eq!(timer.view(75_000).label(), "01:05");
        assert_eq!(timer.view(70_000).label(), "01:00");

        timer.observe(None);
        assert_eq!(timer.view(80_000), TimerView::Idle);
    }

    #[test]
    fn observers_with_same_session_agree() {
        let mut phone = SleepTimer::new();
        let mut tablet = SleepTimer::new();
        phone.observe_session(Some(session(1_000)));
        tablet.observe_session(Some(session(1_000)));
        assert_eq!(phone.view(601_000), tablet.view(601_000));
    }
}
