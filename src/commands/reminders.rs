// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use crate::ledger;
use crate::utils::{maybe_print_json, parse_datetime, pretty_table};
use anyhow::Result;
use rusqlite::Connection;
use serde::Serialize;

pub fn handle(conn: &Connection, m: &clap::ArgMatches) -> Result<()> {
    match m.subcommand() {
        Some(("add", sub)) => add(conn, sub)?,
        Some(("list", sub)) => list(conn, sub)?,
        Some(("rm", sub)) => rm(conn, sub)?,
        _ => {}
    }
    Ok(())
}

fn add(conn: &Connection, sub: &clap::ArgMatches) -> Result<()> {
    let notes = sub.get_one::<String>("notes").unwrap();
    let due = sub.get_one::<String>("due").unwrap();
    parse_datetime(due)?;

    let id = ledger::add_reminder(conn, notes, due)?;
    println!("Added reminder #{}: '{}' due {}", id, notes, due);
    Ok(())
}

#[derive(Serialize)]
pub struct ReminderRow {
    pub id: i64,
    pub notes: String,
    pub due_at: String,
}

fn list(conn: &Connection, sub: &clap::ArgMatches) -> Result<()> {
    let json_flag = sub.get_flag("json");
    let jsonl_flag = sub.get_flag("jsonl");

    let data: Vec<ReminderRow> = ledger::list_reminders(conn)?
        .into_iter()
        .map(|r| ReminderRow {
            id: r.id,
            notes: r.notes,
            due_at: r.due_at,
        })
        .collect();

    if !maybe_print_json(json_flag, jsonl_flag, &data)? {
        let rows: Vec<Vec<String>> = data
            .iter()
            .map(|r| vec![r.id.to_string(), r.due_at.clone(), r.notes.clone()])
            .collect();
        println!("{}", pretty_table(&["Id", "Due", "Notes"], rows));
    }
    Ok(())
}

fn rm(conn: &Connection, sub: &clap::ArgMatches) -> Result<()> {
    let id = *sub.get_one::<i64>("id").unwrap();
    ledger::delete_reminder(conn, id)?;
    println!("Deleted reminder #{}", id);
    Ok(())
}
