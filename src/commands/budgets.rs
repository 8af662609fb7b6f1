// Copyright (c) AlphaVelocity.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use crate::ledger;
use crate::utils::{maybe_print_json, parse_decimal, parse_month, pretty_table};
use anyhow::Result;
use rusqlite::Connection;
use serde::Serialize;

pub fn handle(conn: &Connection, m: &clap::ArgMatches) -> Result<()> {
    match m.subcommand() {
        Some(("set", sub)) => set(conn, sub)?,
        Some(("list", sub)) => list(conn, sub)?,
        Some(("rm", sub)) => rm(conn, sub)?,
        _ => {}
    }
    Ok(())
}

fn set(conn: &Connection, sub: &clap::ArgMatches) -> Result<()> {
    let month = parse_month(sub.get_one::<String>("month").unwrap())?;
    let kind = sub.get_one::<String>("type").unwrap();
    let amount = parse_decimal(sub.get_one::<String>("amount").unwrap())?;
    let id = ledger::set_budget(conn, &month, kind, amount)?;
    println!("Budget #{} set for {} / {} = {}", id, month, kind, amount);
    Ok(())
}

#[derive(Serialize)]
pub struct BudgetRow {
    pub id: i64,
    pub month: String,
    pub r#type: String,
    pub amount: String,
}

fn list(conn: &Connection, sub: &clap::ArgMatches) -> Result<()> {
    let json_flag = sub.get_flag("json");
    let jsonl_flag = sub.get_flag("jsonl");
    let month = sub.get_one::<String>("month");

    let data: Vec<BudgetRow> = ledger::list_budgets(conn)?
        .into_iter()
        .filter(|b| month.is_none_or(|m| &b.month == m))
        .map(|b| BudgetRow {
            id: b.id,
            month: b.month,
            r#type: b.r#type,
            amount: b.amount.to_string(),
        })
        .collect();

    if !maybe_print_json(json_flag, jsonl_flag, &data)? {
        let rows: Vec<Vec<String>> = data
            .iter()
            .map(|r| {
                vec![
                    r.id.to_string(),
                    r.month.clone(),
                    r.r#type.clone(),
                    r.amount.clone(),
                ]
            })
            .collect();
        println!("{}", pretty_table(&["Id", "Month", "Type", "Amount"], rows));
    }
    Ok(())
}

fn rm(conn: &Connection, sub: &clap::ArgMatches) -> Result<()> {
    let id = *sub.get_one::<i64>("id").unwrap();
    ledger::delete_budget(conn, id)?;
    println!("Deleted budget #{}", id);
    Ok(())
}
