//! CLI smoke entry point.
//!
//! # Responsibility
//! - Verify `nestlog_core` linkage (`nestlog_cli`).
//! - Walk one household through the core workflow (`nestlog_cli demo`)
//!   against an in-memory store with a hand-driven clock.

use nestlog_core::{
    format_elapsed, BabyService, Clock, EventFields, EventKind, EventService, InviteService,
    ManualClock, MemberService, Principal, Role, SendInviteOutcome, ServiceError,
    SleepService, SleepTimer, SqliteStore, StoreError,
};
use std::process::ExitCode;
use std::sync::Arc;

const DEMO_START_MS: i64 = 1_700_000_000_000;

fn main() -> ExitCode {
    println!("nestlog_core ping={}", nestlog_core::ping());
    println!("nestlog_core version={}", nestlog_core::core_version());

    if std::env::args().nth(1).as_deref() != Some("demo") {
        return ExitCode::SUCCESS;
    }
    match run_demo() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("demo failed: {err}");
            ExitCode::FAILURE
        }
    }
}

fn run_demo() -> Result<(), ServiceError> {
    let clock = Arc::new(ManualClock::new(DEMO_START_MS));
    let store = SqliteStore::open_in_memory(clock.clone())?;

    let alex = Principal::new("alex", "alex@example.com", "Alex");
    let sam = Principal::new("sam", "sam@example.com", "Sam");

    let baby = BabyService::new(&store).create_baby(&alex.uid, "Mia", None)?;
    println!("created baby={} owner={}", baby.name, alex.display_name);

    let invites = InviteService::new(&store);
    let outcome = invites.send_invite(baby.id, &alex, "Sam@Example.com", Role::Parent)?;
    if let SendInviteOutcome::Sent(invite) = &outcome {
        println!("invite sent role={} status={}", invite.role, invite.status.as_str());
    }
    let accepted = invites.accept_invite(outcome.invite().id, &sam)?;
    println!("invite {} by {}", accepted.status.as_str(), sam.display_name);

    let (timer_tx, timer_rx) = std::sync::mpsc::channel();
    let sleep = SleepService::new(&store);
    let _watch = sleep.watch_active_sleep(
        baby.id,
        &alex.uid,
        move |session| {
            let _ = timer_tx.send(session);
        },
        |err: &StoreError| eprintln!("watch error: {err}"),
    )?;

    sleep.start_sleep(baby.id, &sam.uid)?;
    clock.advance_secs(47 * 60 + 20);

    let mut timer = SleepTimer::new();
    for session in timer_rx.try_iter() {
        timer.observe_session(session);
    }
    println!("timer on alex's device: {}", timer.view(clock.now_ms()).label());

    let stopped = sleep.stop_sleep(baby.id, &alex.uid, timer.known_started_at())?;
    println!(
        "sleep logged duration_min={} ({})",
        stopped.fields.duration_min.unwrap_or_default(),
        format_elapsed(47 * 60 + 20)
    );

    let events = EventService::new(&store);
    clock.advance_secs(90);
    events.add_event(baby.id, &sam.uid, EventKind::Feeding, EventFields::feeding(120))?;
    clock.advance_secs(30);
    events.add_event(baby.id, &sam.uid, EventKind::Pee, EventFields::default())?;
    for event in events.list_events(baby.id, &alex.uid, None)? {
        println!(
            "feed type={} by={} time={}",
            event.kind.as_str(),
            event.logged_by,
            event.time
        );
    }

    MemberService::new(&store).transfer_ownership(baby.id, &alex.uid, &sam.uid)?;
    let baby = BabyService::new(&store).get_baby(baby.id, &alex.uid)?;
    for (member, role) in &baby.members {
        println!("member {member} role={} ({})", role.label(), role.description());
    }
    Ok(())
}
