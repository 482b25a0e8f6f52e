use nestlog_core::db::migrations::{latest_version, schema_version};
use nestlog_core::db::{open_db, open_db_in_memory, DbError};
use nestlog_core::{BabyService, DocumentStore, ManualClock, PrincipalId, SqliteStore};
use rusqlite::Connection;
use std::sync::Arc;

#[test]
fn open_db_in_memory_applies_all_migrations() {
    let conn = open_db_in_memory().unwrap();

    assert_eq!(schema_version(&conn).unwrap(), latest_version());
    assert_table_exists(&conn, "babies");
    assert_table_exists(&conn, "baby_members");
    assert_table_exists(&conn, "care_events");
    assert_table_exists(&conn, "invites");
}

#[test]
fn opening_same_database_twice_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nestlog.db");

    let conn_first = open_db(&path).unwrap();
    assert_eq!(schema_version(&conn_first).unwrap(), latest_version());
    drop(conn_first);

    let conn_second = open_db(&path).unwrap();
    assert_eq!(schema_version(&conn_second).unwrap(), latest_version());
    assert_table_exists(&conn_second, "invites");
}

#[test]
fn opening_database_with_newer_schema_version_returns_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("future.db");

    let conn = Connection::open(&path).unwrap();
    conn.execute_batch("PRAGMA user_version = 999;").unwrap();
    drop(conn);

    let err = open_db(&path).unwrap_err();
    match err {
        DbError::SchemaTooNew { found, supported } => {
            assert_eq!(found, 999);
            assert_eq!(supported, latest_version());
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn failed_migration_names_the_step_and_rolls_back() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("half.db");

    let conn = Connection::open(&path).unwrap();
    conn.execute_batch("CREATE TABLE invites (legacy TEXT);").unwrap();
    drop(conn);

    let err = open_db(&path).unwrap_err();
    match &err {
        DbError::Migration { version, name, .. } => {
            assert_eq!(*version, 2);
            assert_eq!(*name, "invites");
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(err.to_string().starts_with("migration 2 (invites) failed"), "{err}");
    assert!(!err.is_transient());

    let conn = Connection::open(&path).unwrap();
    assert_eq!(schema_version(&conn).unwrap(), 0);
    let babies: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = 'babies';",
            [],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(babies, 0);
}

#[test]
fn schema_rejects_owner_invites_and_unknown_roles() {
    let conn = open_db_in_memory().unwrap();
    conn.execute(
        "INSERT INTO babies (id, name, created_by, created_at) VALUES ('b1', 'Mia', 'u1', 0);",
        [],
    )
    .unwrap();

    let bad_member = conn.execute(
        "INSERT INTO baby_members (baby_id, principal_id, role) VALUES ('b1', 'u2', 'grandma');",
        [],
    );
    assert!(bad_member.is_err());

    let owner_invite = conn.execute(
        "INSERT INTO invites (id, baby_id, baby_name, from_uid, from_name, to_email, role, status, created_at)
         VALUES ('i1', 'b1', 'Mia', 'u1', 'Alex', 'a@x.com', 'owner', 'pending', 0);",
        [],
    );
    assert!(owner_invite.is_err());
}

#[test]
fn deleting_a_baby_row_cascades_to_children() {
    let conn = open_db_in_memory().unwrap();
    conn.execute_batch(
        "INSERT INTO babies (id, name, created_by, created_at) VALUES ('b1', 'Mia', 'u1', 0);
         INSERT INTO baby_members (baby_id, principal_id, role) VALUES ('b1', 'u1', 'owner');
         INSERT INTO care_events (id, baby_id, type, time, logged_by, created_at, updated_at)
         VALUES ('e1', 'b1', 'pee', 1, 'u1', 1, 1);",
    )
    .unwrap();

    conn.execute("DELETE FROM babies WHERE id = 'b1';", []).unwrap();

    assert_eq!(count_rows(&conn, "baby_members"), 0);
    assert_eq!(count_rows(&conn, "care_events"), 0);
}

#[test]
fn file_backed_store_keeps_babies_across_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("household.db");
    let owner = PrincipalId::from("alex");

    let baby_id = {
        let store = SqliteStore::open(&path, Arc::new(ManualClock::new(5_000))).unwrap();
        BabyService::new(&store)
            .create_baby(&owner, "Mia", Some(1_000))
            .unwrap()
            .id
    };

    let store = SqliteStore::open(&path, Arc::new(ManualClock::new(9_000))).unwrap();
    let baby = store.get_baby(baby_id).unwrap().expect("baby should persist");
    assert_eq!(baby.name, "Mia");
    assert_eq!(baby.birth_date, Some(1_000));
    assert_eq!(baby.created_at, 5_000);
    assert_eq!(baby.owner(), Some(&owner));
}

fn count_rows(conn: &Connection, table_name: &str) -> i64 {
    conn.query_row(&format!("SELECT COUNT(*) FROM {table_name};"), [], |row| {
        row.get(0)
    })
    .unwrap()
}

fn assert_table_exists(conn: &Connection, table_name: &str) {
    let exists: i64 = conn
        .query_row(
            "SELECT EXISTS(
                SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1
            );",
            [table_name],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(exists, 1, "table `{table_name}` should exist");
}
