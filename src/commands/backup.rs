// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use crate::ledger;
use crate::models::{EntityKind, Session};
use crate::sync;
use crate::sync::gateway::SheetsGateway;
use crate::sync::SyncOutcome;
use crate::utils::{now_millis, relative_time};
use anyhow::Result;
use rusqlite::Connection;

pub fn handle(conn: &Connection, m: &clap::ArgMatches) -> Result<()> {
    match m.subcommand() {
        Some(("connect", sub)) => connect(conn, sub)?,
        Some(("status", _)) => status(conn)?,
        Some(("sync", _)) => sync_interactive(conn)?,
        Some(("tick", _)) => tick(conn)?,
        _ => {}
    }
    Ok(())
}

/// Store the session handle produced by the external auth flow. The token is
/// opaque to us; all we do is hand it to the gateway.
fn connect(conn: &Connection, sub: &clap::ArgMatches) -> Result<()> {
    let session = Session {
        access_token: sub.get_one::<String>("token").unwrap().clone(),
        user_name: sub.get_one::<String>("name").cloned().unwrap_or_default(),
        email: sub.get_one::<String>("email").cloned().unwrap_or_default(),
    };
    sync::store_session(conn, &session)?;
    println!("Connected as {} <{}>", session.user_name, session.email);
    Ok(())
}

fn status(conn: &Connection) -> Result<()> {
    let cursor = sync::load_cursor(conn)?;
    match sync::load_session(conn)? {
        Some(s) => println!("Account:     {} <{}>", s.user_name, s.email),
        None => println!("Account:     not connected (run `budgetbuddy backup connect`)"),
    }
    if cursor.last_sync_at_millis > 0 {
        println!(
            "Last sync:   {}",
            relative_time(cursor.last_sync_at_millis, now_millis())
        );
    } else {
        println!("Last sync:   never");
    }
    match &cursor.remote_table_id {
        Some(id) => println!("Spreadsheet: {}", sync::spreadsheet_url(id)),
        None => println!("Spreadsheet: none yet"),
    }

    let mut total_pending = 0;
    for kind in EntityKind::all() {
        let n = ledger::pending_count(conn, kind, cursor.last_sync_at_millis)?;
        total_pending += n;
        println!("Pending {}: {}", kind, n);
    }
    println!(
        "Sync available: {}",
        if total_pending > 0 { "yes" } else { "nothing to sync" }
    );
    Ok(())
}

fn sync_interactive(conn: &Connection) -> Result<()> {
    let Some(session) = sync::load_session(conn)? else {
        println!("Not connected. Run `budgetbuddy backup connect` first.");
        return Ok(());
    };
    let gateway = SheetsGateway::new(&session.access_token)?;
    match sync::sync_now(conn, &gateway)? {
        SyncOutcome::Completed { appended, updated } => {
            let cursor = sync::load_cursor(conn)?;
            println!("Sync complete: {} appended, {} updated", appended, updated);
            if let Some(id) = &cursor.remote_table_id {
                println!("Spreadsheet: {}", sync::spreadsheet_url(id));
            }
        }
        SyncOutcome::AuthRequired => {
            println!("Not connected. Run `budgetbuddy backup connect` first.");
        }
        SyncOutcome::AlreadyRunning => {
            println!("A sync is already in progress.");
        }
        SyncOutcome::Skipped | SyncOutcome::RetryRequested => {}
    }
    Ok(())
}

/// Headless entry point for an external scheduler (cron or similar). Prints
/// nothing on its own; a nonzero exit asks the scheduler to retry later.
fn tick(conn: &Connection) -> Result<()> {
    let Some(session) = sync::load_session(conn)? else {
        // No session is "nothing to do", not an error.
        return Ok(());
    };
    let gateway = SheetsGateway::new(&session.access_token)?;
    match sync::on_scheduled_tick(conn, &gateway) {
        SyncOutcome::RetryRequested => {
            anyhow::bail!("scheduled sync failed; retry requested")
        }
        _ => Ok(()),
    }
}
