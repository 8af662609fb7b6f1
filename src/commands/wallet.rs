// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use crate::ledger;
use crate::utils::{
    fmt_money, maybe_print_json, now_millis, parse_date, parse_decimal, pretty_table,
    start_of_month_millis,
};
use anyhow::Result;
use chrono::DateTime;
use rusqlite::Connection;
use serde::Serialize;

pub fn handle(conn: &mut Connection, m: &clap::ArgMatches) -> Result<()> {
    match m.subcommand() {
        Some(("add", sub)) => add(conn, sub)?,
        Some(("list", sub)) => list(conn, sub)?,
        Some(("edit", sub)) => edit(conn, sub)?,
        Some(("rm", sub)) => rm(conn, sub)?,
        Some(("balance", sub)) => balance(conn, sub)?,
        _ => {}
    }
    Ok(())
}

fn fmt_stamp(millis: i64) -> String {
    DateTime::from_timestamp_millis(millis)
        .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| millis.to_string())
}

fn add(conn: &mut Connection, sub: &clap::ArgMatches) -> Result<()> {
    let amount = parse_decimal(sub.get_one::<String>("amount").unwrap())?;
    let notes = sub
        .get_one::<String>("notes")
        .map(|s| s.as_str())
        .unwrap_or("");
    // Backdated entries land out of chronological order and trigger a full
    // recompute of the cached balances.
    let at = match sub.get_one::<String>("date") {
        Some(d) => {
            let date = parse_date(d)?;
            let stamp = date
                .and_hms_opt(0, 0, 0)
                .ok_or_else(|| anyhow::anyhow!("Invalid date '{}'", d))?;
            Some(stamp.and_utc().timestamp_millis())
        }
        None => None,
    };

    let id = ledger::add_wallet_entry(conn, amount, notes, at)?;
    let balance = ledger::current_balance(conn)?;
    println!(
        "Recorded wallet entry #{}: {} (balance now {})",
        id,
        amount,
        fmt_money(&balance)
    );
    Ok(())
}

#[derive(Serialize)]
pub struct WalletRow {
    pub id: i64,
    pub added_amount: String,
    pub balance: String,
    pub notes: String,
    pub created_at: i64,
}

fn list(conn: &Connection, sub: &clap::ArgMatches) -> Result<()> {
    let json_flag = sub.get_flag("json");
    let jsonl_flag = sub.get_flag("jsonl");

    let data: Vec<WalletRow> = ledger::list_wallet_entries(conn)?
        .into_iter()
        .map(|w| WalletRow {
            id: w.id,
            added_amount: w.added_amount.to_string(),
            balance: w.balance.to_string(),
            notes: w.notes,
            created_at: w.created_at,
        })
        .collect();

    if !maybe_print_json(json_flag, jsonl_flag, &data)? {
        let rows: Vec<Vec<String>> = data
            .iter()
            .map(|r| {
                vec![
                    r.id.to_string(),
                    r.added_amount.clone(),
                    r.balance.clone(),
                    r.notes.clone(),
                    fmt_stamp(r.created_at),
                ]
            })
            .collect();
        println!(
            "{}",
            pretty_table(&["Id", "Added", "Balance", "Notes", "Created"], rows)
        );
    }
    Ok(())
}

fn edit(conn: &mut Connection, sub: &clap::ArgMatches) -> Result<()> {
    let id = *sub.get_one::<i64>("id").unwrap();
    let existing = ledger::list_wallet_entries(conn)?
        .into_iter()
        .find(|w| w.id == id)
        .ok_or_else(|| anyhow::anyhow!("Wallet entry {} not found", id))?;

    let amount = match sub.get_one::<String>("amount") {
        Some(a) => parse_decimal(a)?,
        None => existing.added_amount,
    };
    let notes = sub
        .get_one::<String>("notes")
        .cloned()
        .unwrap_or(existing.notes);

    ledger::update_wallet_entry(conn, id, amount, &notes)?;
    let balance = ledger::current_balance(conn)?;
    println!(
        "Updated wallet entry #{} (balance now {})",
        id,
        fmt_money(&balance)
    );
    Ok(())
}

fn rm(conn: &mut Connection, sub: &clap::ArgMatches) -> Result<()> {
    let id = *sub.get_one::<i64>("id").unwrap();
    ledger::delete_wallet_entry(conn, id)?;
    let balance = ledger::current_balance(conn)?;
    println!(
        "Deleted wallet entry #{} (balance now {})",
        id,
        fmt_money(&balance)
    );
    Ok(())
}

#[derive(Serialize)]
struct BalanceReport {
    total: String,
    added_this_month: String,
    available: String,
}

fn balance(conn: &Connection, sub: &clap::ArgMatches) -> Result<()> {
    let json_flag = sub.get_flag("json");
    let jsonl_flag = sub.get_flag("jsonl");

    if let Some(d) = sub.get_one::<String>("as-of") {
        let date = parse_date(d)?;
        let cutoff = date
            .and_hms_opt(23, 59, 59)
            .ok_or_else(|| anyhow::anyhow!("Invalid date '{}'", d))?
            .and_utc()
            .timestamp_millis();
        let as_of = ledger::balance_as_of(conn, cutoff)?;
        println!("Balance as of {}: {}", date, fmt_money(&as_of));
        return Ok(());
    }

    let total = ledger::current_balance(conn)?;
    let month_start = start_of_month_millis();
    let added_this_month =
        ledger::balance_as_of(conn, now_millis())? - ledger::balance_as_of(conn, month_start - 1)?;
    let available = total - added_this_month;

    let report = BalanceReport {
        total: fmt_money(&total),
        added_this_month: fmt_money(&added_this_month),
        available: fmt_money(&available),
    };
    if !maybe_print_json(json_flag, jsonl_flag, &report)? {
        println!("Total balance:    {}", report.total);
        println!("Added this month: {}", report.added_this_month);
        println!("Available:        {}", report.available);
    }
    Ok(())
}
