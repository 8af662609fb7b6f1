// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use crate::ledger;
use crate::utils::{maybe_print_json, parse_date, parse_decimal, pretty_table};
use anyhow::Result;
use rusqlite::Connection;
use serde::Serialize;

pub fn handle(conn: &Connection, m: &clap::ArgMatches) -> Result<()> {
    match m.subcommand() {
        Some(("add", sub)) => add(conn, sub)?,
        Some(("list", sub)) => list(conn, sub)?,
        Some(("edit", sub)) => edit(conn, sub)?,
        Some(("rm", sub)) => rm(conn, sub)?,
        _ => {}
    }
    Ok(())
}

fn add(conn: &Connection, sub: &clap::ArgMatches) -> Result<()> {
    let date = parse_date(sub.get_one::<String>("date").unwrap())?;
    let kind = sub.get_one::<String>("type").unwrap();
    let amount = parse_decimal(sub.get_one::<String>("amount").unwrap())?;
    let notes = sub
        .get_one::<String>("notes")
        .map(|s| s.as_str())
        .unwrap_or("");

    let id = ledger::add_expense(conn, &date.to_string(), kind, amount, notes)?;
    println!("Recorded expense #{}: {} '{}' on {}", id, amount, kind, date);
    Ok(())
}

#[derive(Serialize)]
pub struct ExpenseRow {
    pub id: i64,
    pub date: String,
    pub r#type: String,
    pub amount: String,
    pub notes: String,
}

fn list(conn: &Connection, sub: &clap::ArgMatches) -> Result<()> {
    let json_flag = sub.get_flag("json");
    let jsonl_flag = sub.get_flag("jsonl");
    let month = sub.get_one::<String>("month");
    let kind = sub.get_one::<String>("type");

    let data: Vec<ExpenseRow> = ledger::list_expenses(conn)?
        .into_iter()
        .filter(|e| month.is_none_or(|m| e.date.starts_with(m.as_str())))
        .filter(|e| kind.is_none_or(|k| &e.r#type == k))
        .map(|e| ExpenseRow {
            id: e.id,
            date: e.date,
            r#type: e.r#type,
            amount: e.amount.to_string(),
            notes: e.notes,
        })
        .collect();

    if !maybe_print_json(json_flag, jsonl_flag, &data)? {
        let rows: Vec<Vec<String>> = data
            .iter()
            .map(|r| {
                vec![
                    r.id.to_string(),
                    r.date.clone(),
                    r.r#type.clone(),
                    r.amount.clone(),
                    r.notes.clone(),
                ]
            })
            .collect();
        println!(
            "{}",
            pretty_table(&["Id", "Date", "Type", "Amount", "Notes"], rows)
        );
    }
    Ok(())
}

fn edit(conn: &Connection, sub: &clap::ArgMatches) -> Result<()> {
    let id = *sub.get_one::<i64>("id").unwrap();
    let existing = ledger::list_expenses(conn)?
        .into_iter()
        .find(|e| e.id == id)
        .ok_or_else(|| anyhow::anyhow!("Expense {} not found", id))?;

    let date = match sub.get_one::<String>("date") {
        Some(d) => parse_date(d)?.to_string(),
        None => existing.date,
    };
    let kind = sub
        .get_one::<String>("type")
        .cloned()
        .unwrap_or(existing.r#type);
    let amount = match sub.get_one::<String>("amount") {
        Some(a) => parse_decimal(a)?,
        None => existing.amount,
    };
    let notes = sub.get_one::<String>("notes").cloned().unwrap_or(existing.notes);

    ledger::update_expense(conn, id, &date, &kind, amount, &notes)?;
    println!("Updated expense #{}", id);
    Ok(())
}

fn rm(conn: &Connection, sub: &clap::ArgMatches) -> Result<()> {
    let id = *sub.get_one::<i64>("id").unwrap();
    ledger::delete_expense(conn, id)?;
    println!("Deleted expense #{}", id);
    Ok(())
}
