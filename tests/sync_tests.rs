// Copyright (c) AlphaVelocity.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use std::collections::HashMap;
use std::sync::{Barrier, Mutex};

use budgetbuddy::models::{EntityKind, Session};
use budgetbuddy::sync::engine::{reconcile, SyncError};
use budgetbuddy::sync::gateway::{GatewayError, RemoteRow, RemoteTableGateway};
use budgetbuddy::sync::{
    load_cursor, on_scheduled_tick, pending_set, store_cursor, store_session, sync_now,
    SyncOutcome,
};
use budgetbuddy::{db, ledger, utils};
use rusqlite::Connection;
use rust_decimal::Decimal;

// ---------------------------------------------------------------------------
// In-memory gateway standing in for the remote tabular service
// ---------------------------------------------------------------------------

#[derive(Default)]
struct MockState {
    tables: HashMap<String, HashMap<String, Vec<RemoteRow>>>,
    next_id: usize,
    calls: Vec<String>,
    fail_op: Option<&'static str>,
    fail_sheet: Option<&'static str>,
    exists_unreachable: bool,
    read_delay_ms: u64,
    panic_on_read: bool,
}

#[derive(Default)]
struct MockGateway {
    state: Mutex<MockState>,
}

fn parse_range(range: &str) -> (String, usize, Option<usize>) {
    let (sheet, cells) = range.split_once('!').unwrap();
    let (start_s, end_s) = cells.split_once(':').unwrap();
    let start: usize = start_s[1..].parse().unwrap();
    let end_digits: String = end_s.chars().filter(|c| c.is_ascii_digit()).collect();
    (sheet.to_string(), start, end_digits.parse().ok())
}

impl MockGateway {
    fn new() -> Self {
        Self::default()
    }

    fn calls(&self) -> Vec<String> {
        self.state.lock().unwrap().calls.clone()
    }

    fn count_calls(&self, prefix: &str) -> usize {
        self.calls().iter().filter(|c| c.starts_with(prefix)).count()
    }

    fn sheet_rows(&self, table_id: &str, sheet: &str) -> Vec<RemoteRow> {
        self.state.lock().unwrap().tables[table_id]
            .get(sheet)
            .cloned()
            .unwrap_or_default()
    }

    fn drop_table(&self, table_id: &str) {
        self.state.lock().unwrap().tables.remove(table_id);
    }

    fn push_row(&self, table_id: &str, sheet: &str, row: RemoteRow) {
        let mut st = self.state.lock().unwrap();
        st.tables
            .get_mut(table_id)
            .unwrap()
            .get_mut(sheet)
            .unwrap()
            .push(row);
    }

    fn fail_on(&self, op: &'static str, sheet: Option<&'static str>) {
        let mut st = self.state.lock().unwrap();
        st.fail_op = Some(op);
        st.fail_sheet = sheet;
    }

    fn clear_failures(&self) {
        let mut st = self.state.lock().unwrap();
        st.fail_op = None;
        st.fail_sheet = None;
        st.exists_unreachable = false;
    }

    fn set_exists_unreachable(&self) {
        self.state.lock().unwrap().exists_unreachable = true;
    }

    fn set_read_delay(&self, ms: u64) {
        self.state.lock().unwrap().read_delay_ms = ms;
    }

    fn set_panic_on_read(&self) {
        self.state.lock().unwrap().panic_on_read = true;
    }
}

fn check_fail(st: &MockState, op: &str, range: &str) -> Result<(), GatewayError> {
    if st.fail_op == Some(op) && st.fail_sheet.is_none_or(|s| range.contains(s)) {
        return Err(GatewayError::api(500, "induced failure"));
    }
    Ok(())
}

impl RemoteTableGateway for MockGateway {
    fn table_exists(&self, table_id: &str) -> Result<bool, GatewayError> {
        let mut st = self.state.lock().unwrap();
        st.calls.push(format!("table_exists:{}", table_id));
        if st.exists_unreachable {
            return Err(GatewayError::api(503, "service unavailable"));
        }
        Ok(st.tables.contains_key(table_id))
    }

    fn create_table(&self, _title: &str) -> Result<String, GatewayError> {
        let mut st = self.state.lock().unwrap();
        st.calls.push("create_table".to_string());
        check_fail(&st, "create_table", "")?;
        st.next_id += 1;
        let id = format!("table-{}", st.next_id);
        st.tables.insert(id.clone(), HashMap::new());
        Ok(id)
    }

    fn ensure_named_sheets(&self, table_id: &str, names: &[&str]) -> Result<(), GatewayError> {
        let mut st = self.state.lock().unwrap();
        st.calls.push("ensure_named_sheets".to_string());
        let table = st
            .tables
            .get_mut(table_id)
            .ok_or_else(|| GatewayError::api(404, "spreadsheet not found"))?;
        for name in names {
            table.entry(name.to_string()).or_default();
        }
        Ok(())
    }

    fn read_range(&self, table_id: &str, range: &str) -> Result<Vec<RemoteRow>, GatewayError> {
        let mut st = self.state.lock().unwrap();
        st.calls.push(format!("read_range:{}", range));
        if st.panic_on_read {
            panic!("injected gateway fault");
        }
        if st.read_delay_ms > 0 {
            std::thread::sleep(std::time::Duration::from_millis(st.read_delay_ms));
        }
        check_fail(&st, "read_range", range)?;
        let table = st
            .tables
            .get(table_id)
            .ok_or_else(|| GatewayError::api(404, "spreadsheet not found"))?;
        let (sheet, _, _) = parse_range(range);
        Ok(table.get(&sheet).cloned().unwrap_or_default())
    }

    fn write_range(
        &self,
        table_id: &str,
        range: &str,
        rows: &[RemoteRow],
    ) -> Result<(), GatewayError> {
        let mut st = self.state.lock().unwrap();
        st.calls.push(format!("write_range:{}", range));
        check_fail(&st, "write_range", range)?;
        let table = st
            .tables
            .get_mut(table_id)
            .ok_or_else(|| GatewayError::api(404, "spreadsheet not found"))?;
        let (sheet, start, end) = parse_range(range);
        let sheet_rows = table.entry(sheet).or_default();
        match end {
            // Whole-region overwrite starting at A1.
            None => *sheet_rows = rows.to_vec(),
            // Single-row overwrite at a 1-based position.
            Some(e) if e == start => {
                if sheet_rows.len() < start {
                    sheet_rows.resize(start, Vec::new());
                }
                sheet_rows[start - 1] = rows[0].clone();
            }
            _ => panic!("unexpected range {}", range),
        }
        Ok(())
    }

    fn append_rows(
        &self,
        table_id: &str,
        range: &str,
        rows: &[RemoteRow],
    ) -> Result<(), GatewayError> {
        let mut st = self.state.lock().unwrap();
        st.calls.push(format!("append_rows:{}", range));
        check_fail(&st, "append_rows", range)?;
        let table = st
            .tables
            .get_mut(table_id)
            .ok_or_else(|| GatewayError::api(404, "spreadsheet not found"))?;
        let (sheet, _, _) = parse_range(range);
        table.entry(sheet).or_default().extend(rows.iter().cloned());
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn setup() -> Connection {
    let mut conn = Connection::open_in_memory().unwrap();
    db::init_schema(&mut conn).unwrap();
    conn
}

fn dec(s: &str) -> Decimal {
    s.parse().unwrap()
}

fn connect(conn: &Connection) {
    store_session(
        conn,
        &Session {
            access_token: "tok".into(),
            user_name: "Test User".into(),
            email: "test@example.com".into(),
        },
    )
    .unwrap();
}

/// One engine pass the way the trigger layer drives it, minus the
/// single-flight lock (kept out of engine tests so they can run in parallel).
fn run_reconcile(conn: &Connection, gw: &MockGateway) -> Result<(usize, usize), SyncError> {
    let cursor = load_cursor(conn).unwrap();
    let pending = pending_set(conn, cursor.last_sync_at_millis).unwrap();
    let report = reconcile(conn, gw, &pending, utils::now_millis())?;
    store_cursor(conn, &report.cursor).unwrap();
    settle();
    Ok((report.appended, report.updated))
}

/// Stamps are millisecond-granular and the cursor boundary is exclusive, so
/// mutations made after a pass must land strictly later than its cursor.
fn settle() {
    std::thread::sleep(std::time::Duration::from_millis(2));
}

// ---------------------------------------------------------------------------
// Engine behavior
// ---------------------------------------------------------------------------

#[test]
fn first_sync_seeds_header_and_rows_in_one_write() {
    let conn = setup();
    let gw = MockGateway::new();
    ledger::add_expense(&conn, "2025-06-01", "Food", dec("12.50"), "lunch").unwrap();
    ledger::add_expense(&conn, "2025-06-02", "Travel", dec("40"), "").unwrap();

    let (appended, updated) = run_reconcile(&conn, &gw).unwrap();
    assert_eq!((appended, updated), (2, 0));

    let cursor = load_cursor(&conn).unwrap();
    let table_id = cursor.remote_table_id.clone().unwrap();
    let rows = gw.sheet_rows(&table_id, "Expenses");
    assert_eq!(rows.len(), 3);
    assert_eq!(rows[0][0], "Id");
    assert_eq!(rows[1][0], "1");
    assert_eq!(rows[2][0], "2");
    // Header and data land in a single write call.
    assert_eq!(gw.count_calls("write_range:Expenses"), 1);
    assert!(cursor.last_sync_at_millis > 0);

    // Sync is complete: nothing pending against the returned cursor.
    for kind in EntityKind::all() {
        assert_eq!(
            ledger::pending_count(&conn, kind, cursor.last_sync_at_millis).unwrap(),
            0
        );
    }
}

#[test]
fn edits_update_in_place_and_new_rows_append_in_one_batch() {
    let conn = setup();
    let gw = MockGateway::new();
    let first = ledger::add_expense(&conn, "2025-06-01", "Food", dec("12.50"), "").unwrap();
    ledger::add_expense(&conn, "2025-06-02", "Travel", dec("40"), "").unwrap();
    run_reconcile(&conn, &gw).unwrap();

    ledger::update_expense(&conn, first, "2025-06-01", "Food", dec("15"), "corrected").unwrap();
    ledger::add_expense(&conn, "2025-06-03", "Books", dec("22"), "").unwrap();

    let before = gw.calls().len();
    let (appended, updated) = run_reconcile(&conn, &gw).unwrap();
    assert_eq!((appended, updated), (1, 1));

    let table_id = load_cursor(&conn).unwrap().remote_table_id.unwrap();
    let rows = gw.sheet_rows(&table_id, "Expenses");
    assert_eq!(rows.len(), 4);
    assert_eq!(rows[1][3], "15"); // amount updated in place at its old position
    assert_eq!(rows[3][0], "3");

    let new_calls = &gw.calls()[before..];
    assert_eq!(
        new_calls
            .iter()
            .filter(|c| c.starts_with("write_range:Expenses!A2"))
            .count(),
        1
    );
    assert_eq!(
        new_calls
            .iter()
            .filter(|c| c.starts_with("append_rows:"))
            .count(),
        1
    );
}

#[test]
fn rerun_without_mutation_is_a_noop() {
    let conn = setup();
    let gw = MockGateway::new();
    ledger::add_expense(&conn, "2025-06-01", "Food", dec("9"), "").unwrap();
    run_reconcile(&conn, &gw).unwrap();

    let table_id = load_cursor(&conn).unwrap().remote_table_id.unwrap();
    let rows_before = gw.sheet_rows(&table_id, "Expenses");
    let calls_before = gw.calls().len();

    let (appended, updated) = run_reconcile(&conn, &gw).unwrap();
    assert_eq!((appended, updated), (0, 0));
    assert_eq!(gw.sheet_rows(&table_id, "Expenses"), rows_before);
    // Only the table existence check happened.
    let new_calls = &gw.calls()[calls_before..];
    assert_eq!(new_calls.len(), 1);
    assert!(new_calls[0].starts_with("table_exists:"));
}

#[test]
fn failure_in_one_kind_aborts_pass_without_cursor_advance() {
    let mut conn = setup();
    let gw = MockGateway::new();
    ledger::add_expense(&conn, "2025-06-01", "Food", dec("9"), "").unwrap();
    ledger::set_budget(&conn, "2025-06", "Food", dec("100")).unwrap();
    ledger::add_wallet_entry(&mut conn, dec("500"), "", None).unwrap();

    gw.fail_on("read_range", Some("Budgets"));
    let err = run_reconcile(&conn, &gw).unwrap_err();
    assert!(err.to_string().contains("Budgets"));

    // Cursor untouched, wallet never reached.
    assert_eq!(load_cursor(&conn).unwrap().last_sync_at_millis, 0);
    assert_eq!(gw.count_calls("read_range:Wallet"), 0);

    // A retry reprocesses the same pending set; the rows already written
    // become in-place updates, never duplicates.
    gw.clear_failures();
    let (appended, updated) = run_reconcile(&conn, &gw).unwrap();
    assert_eq!((appended, updated), (2, 1));
    let table_id = load_cursor(&conn).unwrap().remote_table_id.unwrap();
    assert_eq!(gw.sheet_rows(&table_id, "Expenses").len(), 2);
    assert_eq!(gw.sheet_rows(&table_id, "Budgets").len(), 2);
    assert_eq!(gw.sheet_rows(&table_id, "Wallet").len(), 2);
}

#[test]
fn table_deleted_out_of_band_is_recreated_and_old_id_forgotten() {
    let conn = setup();
    let gw = MockGateway::new();
    ledger::add_expense(&conn, "2025-06-01", "Food", dec("9"), "").unwrap();
    run_reconcile(&conn, &gw).unwrap();
    let old_id = load_cursor(&conn).unwrap().remote_table_id.unwrap();

    gw.drop_table(&old_id);
    ledger::add_expense(&conn, "2025-06-02", "Travel", dec("30"), "").unwrap();
    run_reconcile(&conn, &gw).unwrap();

    let new_id = load_cursor(&conn).unwrap().remote_table_id.unwrap();
    assert_ne!(new_id, old_id);
    // Only the still-pending record lands in the fresh table.
    let rows = gw.sheet_rows(&new_id, "Expenses");
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[1][0], "2");
}

#[test]
fn zero_pending_bootstraps_table_and_nothing_else() {
    let conn = setup();
    let gw = MockGateway::new();

    let (appended, updated) = run_reconcile(&conn, &gw).unwrap();
    assert_eq!((appended, updated), (0, 0));

    let cursor = load_cursor(&conn).unwrap();
    assert!(cursor.remote_table_id.is_some());
    assert!(cursor.last_sync_at_millis > 0);

    let calls = gw.calls();
    assert_eq!(calls, vec!["create_table".to_string(), "ensure_named_sheets".to_string()]);
}

#[test]
fn unreachable_existence_check_proceeds_with_stored_id() {
    let conn = setup();
    let gw = MockGateway::new();
    ledger::add_expense(&conn, "2025-06-01", "Food", dec("9"), "").unwrap();
    run_reconcile(&conn, &gw).unwrap();
    let table_id = load_cursor(&conn).unwrap().remote_table_id.unwrap();

    gw.set_exists_unreachable();
    ledger::add_expense(&conn, "2025-06-02", "Travel", dec("30"), "").unwrap();
    let (appended, updated) = run_reconcile(&conn, &gw).unwrap();
    assert_eq!((appended, updated), (1, 0));
    assert_eq!(
        load_cursor(&conn).unwrap().remote_table_id.unwrap(),
        table_id
    );
}

#[test]
fn duplicate_remote_ids_are_integrity_failures_not_silent_winners() {
    let conn = setup();
    let gw = MockGateway::new();
    let first = ledger::add_expense(&conn, "2025-06-01", "Food", dec("9"), "").unwrap();
    run_reconcile(&conn, &gw).unwrap();
    let table_id = load_cursor(&conn).unwrap().remote_table_id.unwrap();
    let cursor_after_first = load_cursor(&conn).unwrap().last_sync_at_millis;

    // Someone hand-edited the spreadsheet and cloned a row.
    let cloned = gw.sheet_rows(&table_id, "Expenses")[1].clone();
    gw.push_row(&table_id, "Expenses", cloned);

    ledger::update_expense(&conn, first, "2025-06-01", "Food", dec("11"), "").unwrap();
    ledger::set_budget(&conn, "2025-06", "Food", dec("100")).unwrap();

    let err = run_reconcile(&conn, &gw).unwrap_err();
    assert!(matches!(err, SyncError::Integrity(ref kinds) if kinds == &[EntityKind::Expense]));

    // The healthy kind still made progress, but the cursor did not move.
    assert_eq!(gw.sheet_rows(&table_id, "Budgets").len(), 2);
    assert_eq!(
        load_cursor(&conn).unwrap().last_sync_at_millis,
        cursor_after_first
    );
}

#[test]
fn reminders_are_mirrored_alongside_the_other_kinds() {
    let conn = setup();
    let gw = MockGateway::new();
    ledger::add_expense(&conn, "2025-06-01", "Food", dec("9"), "").unwrap();
    let id = ledger::add_reminder(&conn, "pay rent", "2025-07-01 09:00").unwrap();

    let (appended, updated) = run_reconcile(&conn, &gw).unwrap();
    assert_eq!((appended, updated), (2, 0));

    let table_id = load_cursor(&conn).unwrap().remote_table_id.unwrap();
    let rows = gw.sheet_rows(&table_id, "Reminders");
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0], vec!["Id", "Notes", "DueAt", "CreatedAt", "UpdatedAt"]);
    assert_eq!(rows[1][0], id.to_string());
    assert_eq!(rows[1][1], "pay rent");
    assert_eq!(rows[1][2], "2025-07-01 09:00");
    assert_eq!(
        ledger::pending_count(
            &conn,
            EntityKind::Reminder,
            load_cursor(&conn).unwrap().last_sync_at_millis
        )
        .unwrap(),
        0
    );
}

// ---------------------------------------------------------------------------
// Trigger layer (kept in one test: the single-flight guard is process-wide)
// ---------------------------------------------------------------------------

#[test]
fn triggers_share_one_engine_and_one_flight_at_a_time() {
    // Interactive trigger without a session: start the auth flow, do not sync.
    let conn = setup();
    let gw = MockGateway::new();
    assert_eq!(sync_now(&conn, &gw).unwrap(), SyncOutcome::AuthRequired);
    // Headless trigger without a session: nothing to do, not an error.
    assert_eq!(on_scheduled_tick(&conn, &gw), SyncOutcome::Skipped);
    assert!(gw.calls().is_empty());

    // Connected interactive sync succeeds and advances the cursor.
    connect(&conn);
    ledger::add_expense(&conn, "2025-06-01", "Food", dec("9"), "").unwrap();
    assert_eq!(
        sync_now(&conn, &gw).unwrap(),
        SyncOutcome::Completed {
            appended: 1,
            updated: 0
        }
    );
    let cursor_after = load_cursor(&conn).unwrap().last_sync_at_millis;
    assert!(cursor_after > 0);

    // Repeat with no mutations: still success, still no duplicates.
    assert_eq!(
        sync_now(&conn, &gw).unwrap(),
        SyncOutcome::Completed {
            appended: 0,
            updated: 0
        }
    );

    // Failures: interactive surfaces the error, headless asks for a retry;
    // neither advances the cursor.
    settle();
    ledger::add_expense(&conn, "2025-06-02", "Travel", dec("30"), "").unwrap();
    gw.fail_on("read_range", Some("Expenses"));
    assert!(sync_now(&conn, &gw).is_err());
    assert_eq!(on_scheduled_tick(&conn, &gw), SyncOutcome::RetryRequested);
    assert_eq!(load_cursor(&conn).unwrap().last_sync_at_millis, cursor_after);

    gw.clear_failures();
    assert_eq!(
        on_scheduled_tick(&conn, &gw),
        SyncOutcome::Completed {
            appended: 1,
            updated: 0
        }
    );
    assert!(load_cursor(&conn).unwrap().last_sync_at_millis > cursor_after);

    // Two triggers racing: exactly one runs, the other reports AlreadyRunning.
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("race.sqlite");
    {
        let race_conn = db::open_at(&path).unwrap();
        connect(&race_conn);
        ledger::add_expense(&race_conn, "2025-06-03", "Books", dec("5"), "").unwrap();
    }
    let race_gw = MockGateway::new();
    race_gw.set_read_delay(300);
    let barrier = Barrier::new(2);
    let outcomes = std::thread::scope(|s| {
        let a = s.spawn(|| {
            let conn = db::open_at(&path).unwrap();
            barrier.wait();
            sync_now(&conn, &race_gw).unwrap()
        });
        let b = s.spawn(|| {
            let conn = db::open_at(&path).unwrap();
            barrier.wait();
            sync_now(&conn, &race_gw).unwrap()
        });
        vec![a.join().unwrap(), b.join().unwrap()]
    });
    assert!(outcomes.contains(&SyncOutcome::AlreadyRunning));
    assert!(outcomes
        .iter()
        .any(|o| matches!(o, SyncOutcome::Completed { .. })));

    // A panic while a pass holds the guard must not wedge later triggers.
    let panic_conn = setup();
    connect(&panic_conn);
    ledger::add_expense(&panic_conn, "2025-06-04", "Misc", dec("1"), "").unwrap();
    let faulty = MockGateway::new();
    faulty.set_panic_on_read();
    let panicked = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
        let _ = sync_now(&panic_conn, &faulty);
    }));
    assert!(panicked.is_err());

    let healthy = MockGateway::new();
    assert_eq!(
        sync_now(&panic_conn, &healthy).unwrap(),
        SyncOutcome::Completed {
            appended: 1,
            updated: 0
        }
    );
}
