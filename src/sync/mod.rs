// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

pub mod engine;
pub mod gateway;

use anyhow::{Context, Result};
use log::{error, info};
use once_cell::sync::Lazy;
use rusqlite::{params, Connection, OptionalExtension};
use std::sync::{Mutex, MutexGuard, TryLockError};

use crate::ledger;
use crate::models::{Session, SyncCursor, Timestamped};
use crate::sync::engine::PendingSet;
use crate::sync::gateway::RemoteTableGateway;
use crate::utils::now_millis;

const KEY_LAST_SYNC_ON: &str = "last_sync_on";
const KEY_SPREADSHEET_ID: &str = "spreadsheet_id";
const KEY_SPREADSHEET_URL: &str = "spreadsheet_url";
const KEY_ACCESS_TOKEN: &str = "access_token";
const KEY_USER_NAME: &str = "user_name";
const KEY_EMAIL_ID: &str = "email_id";

// -------------------------------------------------------------------------
// Settings-backed sync state
// -------------------------------------------------------------------------

fn get_setting(conn: &Connection, key: &str) -> rusqlite::Result<Option<String>> {
    conn.query_row(
        "SELECT value FROM settings WHERE key=?1",
        params![key],
        |r| r.get(0),
    )
    .optional()
}

fn put_setting(conn: &Connection, key: &str, value: &str) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO settings(key, value) VALUES(?1, ?2)
         ON CONFLICT(key) DO UPDATE SET value=excluded.value",
        params![key, value],
    )?;
    Ok(())
}

fn delete_setting(conn: &Connection, key: &str) -> rusqlite::Result<()> {
    conn.execute("DELETE FROM settings WHERE key=?1", params![key])?;
    Ok(())
}

/// Cursor starts at zero with no table id on first run.
pub fn load_cursor(conn: &Connection) -> rusqlite::Result<SyncCursor> {
    let last = get_setting(conn, KEY_LAST_SYNC_ON)?
        .and_then(|v| v.parse::<i64>().ok())
        .unwrap_or(0);
    let table_id = get_setting(conn, KEY_SPREADSHEET_ID)?;
    Ok(SyncCursor {
        last_sync_at_millis: last,
        remote_table_id: table_id,
    })
}

pub fn store_cursor(conn: &Connection, cursor: &SyncCursor) -> rusqlite::Result<()> {
    put_setting(
        conn,
        KEY_LAST_SYNC_ON,
        &cursor.last_sync_at_millis.to_string(),
    )?;
    if let Some(id) = &cursor.remote_table_id {
        store_table_id(conn, id)?;
    }
    Ok(())
}

pub(crate) fn store_table_id(conn: &Connection, table_id: &str) -> rusqlite::Result<()> {
    put_setting(conn, KEY_SPREADSHEET_ID, table_id)?;
    put_setting(conn, KEY_SPREADSHEET_URL, &spreadsheet_url(table_id))
}

pub(crate) fn clear_table_id(conn: &Connection) -> rusqlite::Result<()> {
    delete_setting(conn, KEY_SPREADSHEET_ID)?;
    delete_setting(conn, KEY_SPREADSHEET_URL)
}

pub fn spreadsheet_url(table_id: &str) -> String {
    format!("https://docs.google.com/spreadsheets/d/{}", table_id)
}

pub fn load_session(conn: &Connection) -> rusqlite::Result<Option<Session>> {
    let Some(token) = get_setting(conn, KEY_ACCESS_TOKEN)? else {
        return Ok(None);
    };
    Ok(Some(Session {
        access_token: token,
        user_name: get_setting(conn, KEY_USER_NAME)?.unwrap_or_default(),
        email: get_setting(conn, KEY_EMAIL_ID)?.unwrap_or_default(),
    }))
}

pub fn store_session(conn: &Connection, session: &Session) -> rusqlite::Result<()> {
    put_setting(conn, KEY_ACCESS_TOKEN, &session.access_token)?;
    put_setting(conn, KEY_USER_NAME, &session.user_name)?;
    put_setting(conn, KEY_EMAIL_ID, &session.email)
}

// -------------------------------------------------------------------------
// Change set selector
// -------------------------------------------------------------------------

/// Entries created or touched after the cursor. The OR on both stamps is what
/// lets an edit to an already-synced record be re-propagated.
pub fn select_pending<T: Timestamped + Clone>(cursor_millis: i64, entries: &[T]) -> Vec<T> {
    entries
        .iter()
        .filter(|e| e.created_at() > cursor_millis || e.updated_at() > cursor_millis)
        .cloned()
        .collect()
}

/// Snapshot all three collections and select against the cursor.
pub fn pending_set(conn: &Connection, cursor_millis: i64) -> Result<PendingSet> {
    Ok(PendingSet {
        expenses: select_pending(cursor_millis, &ledger::list_expenses(conn)?),
        budgets: select_pending(cursor_millis, &ledger::list_budgets(conn)?),
        wallet: select_pending(cursor_millis, &ledger::list_wallet_entries(conn)?),
        reminders: select_pending(cursor_millis, &ledger::list_reminders(conn)?),
    })
}

// -------------------------------------------------------------------------
// Trigger layer
// -------------------------------------------------------------------------

/// Outcome of one trigger invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    Completed { appended: usize, updated: usize },
    /// No session yet; the interactive caller should start the connect flow.
    AuthRequired,
    /// Headless run with nothing to do (no session). Success, not an error.
    Skipped,
    /// Another sync pass holds the single-flight guard.
    AlreadyRunning,
    /// Headless run failed; the external scheduler should retry with backoff.
    RetryRequested,
}

// Interactive and scheduled triggers must never reconcile concurrently: two
// racing passes could create duplicate remote tables or double-append the
// same pending rows.
static SYNC_IN_FLIGHT: Lazy<Mutex<()>> = Lazy::new(|| Mutex::new(()));

/// The guard carries no data, so a panic while it was held leaves nothing to
/// repair; treating poison as "in flight" would wedge every later trigger.
fn try_acquire_sync_guard() -> Option<MutexGuard<'static, ()>> {
    match SYNC_IN_FLIGHT.try_lock() {
        Ok(guard) => Some(guard),
        Err(TryLockError::Poisoned(p)) => Some(p.into_inner()),
        Err(TryLockError::WouldBlock) => None,
    }
}

fn run_pass(conn: &Connection, gateway: &dyn RemoteTableGateway) -> Result<SyncOutcome> {
    let cursor = load_cursor(conn)?;
    let now = now_millis();
    let pending = pending_set(conn, cursor.last_sync_at_millis)?;
    info!("sync pass starting with {} pending records", pending.total());
    let report =
        engine::reconcile(conn, gateway, &pending, now).context("reconciliation failed")?;
    store_cursor(conn, &report.cursor)?;
    Ok(SyncOutcome::Completed {
        appended: report.appended,
        updated: report.updated,
    })
}

/// Interactive trigger ("sync now"). Surfaces failure to the caller; the
/// cursor is untouched on error so a retry reprocesses the same pending set.
pub fn sync_now(conn: &Connection, gateway: &dyn RemoteTableGateway) -> Result<SyncOutcome> {
    let Some(_guard) = try_acquire_sync_guard() else {
        return Ok(SyncOutcome::AlreadyRunning);
    };
    if load_session(conn)?.is_none() {
        return Ok(SyncOutcome::AuthRequired);
    }
    run_pass(conn, gateway)
}

/// Unattended periodic trigger. Never prompts and never panics: failures are
/// logged and reported as `RetryRequested` for the scheduler's backoff.
pub fn on_scheduled_tick(conn: &Connection, gateway: &dyn RemoteTableGateway) -> SyncOutcome {
    let Some(_guard) = try_acquire_sync_guard() else {
        return SyncOutcome::AlreadyRunning;
    };
    match load_session(conn) {
        Ok(Some(_)) => {}
        Ok(None) => return SyncOutcome::Skipped,
        Err(e) => {
            error!("could not read session state: {}", e);
            return SyncOutcome::RetryRequested;
        }
    }
    match run_pass(conn, gateway) {
        Ok(outcome) => outcome,
        Err(e) => {
            error!("scheduled sync failed: {:#}", e);
            SyncOutcome::RetryRequested
        }
    }
}
