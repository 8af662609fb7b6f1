// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use anyhow::{Context, Result};
use rusqlite::{params, Connection, OptionalExtension};
use rust_decimal::Decimal;

use crate::models::{Budget, EntityKind, Expense, Reminder, WalletEntry};
use crate::utils::now_millis;

// ---------------------------------------------------------------------------
// Expenses
// ---------------------------------------------------------------------------

pub fn add_expense(
    conn: &Connection,
    date: &str,
    kind: &str,
    amount: Decimal,
    notes: &str,
) -> Result<i64> {
    let now = now_millis();
    conn.execute(
        "INSERT INTO expenses(date, type, amount, notes, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?5)",
        params![date, kind, amount.to_string(), notes, now],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn update_expense(
    conn: &Connection,
    id: i64,
    date: &str,
    kind: &str,
    amount: Decimal,
    notes: &str,
) -> Result<()> {
    let changed = conn.execute(
        "UPDATE expenses SET date=?1, type=?2, amount=?3, notes=?4, updated_at=?5 WHERE id=?6",
        params![date, kind, amount.to_string(), notes, now_millis(), id],
    )?;
    if changed == 0 {
        anyhow::bail!("Expense {} not found", id);
    }
    Ok(())
}

pub fn delete_expense(conn: &Connection, id: i64) -> Result<()> {
    let changed = conn.execute("DELETE FROM expenses WHERE id=?1", params![id])?;
    if changed == 0 {
        anyhow::bail!("Expense {} not found", id);
    }
    Ok(())
}

pub fn list_expenses(conn: &Connection) -> Result<Vec<Expense>> {
    let mut stmt = conn.prepare(
        "SELECT id, date, type, amount, notes, created_at, updated_at
         FROM expenses ORDER BY date DESC, id DESC",
    )?;
    let mut rows = stmt.query([])?;
    let mut out = Vec::new();
    while let Some(r) = rows.next()? {
        let amount_s: String = r.get(3)?;
        out.push(Expense {
            id: r.get(0)?,
            date: r.get(1)?,
            r#type: r.get(2)?,
            amount: amount_s
                .parse::<Decimal>()
                .with_context(|| format!("Invalid amount '{}' in expenses", amount_s))?,
            notes: r.get(4)?,
            created_at: r.get(5)?,
            updated_at: r.get(6)?,
        });
    }
    Ok(out)
}

// ---------------------------------------------------------------------------
// Budgets
// ---------------------------------------------------------------------------

/// Insert or overwrite the budget for (month, type). An overwrite refreshes
/// `updated_at` but keeps the original `created_at`.
pub fn set_budget(conn: &Connection, month: &str, kind: &str, amount: Decimal) -> Result<i64> {
    let now = now_millis();
    conn.execute(
        "INSERT INTO budgets(month, type, amount, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?4)
         ON CONFLICT(month, type) DO UPDATE SET amount=excluded.amount, updated_at=excluded.updated_at",
        params![month, kind, amount.to_string(), now],
    )?;
    let id: i64 = conn.query_row(
        "SELECT id FROM budgets WHERE month=?1 AND type=?2",
        params![month, kind],
        |r| r.get(0),
    )?;
    Ok(id)
}

pub fn delete_budget(conn: &Connection, id: i64) -> Result<()> {
    let changed = conn.execute("DELETE FROM budgets WHERE id=?1", params![id])?;
    if changed == 0 {
        anyhow::bail!("Budget {} not found", id);
    }
    Ok(())
}

pub fn list_budgets(conn: &Connection) -> Result<Vec<Budget>> {
    let mut stmt = conn.prepare(
        "SELECT id, month, type, amount, created_at, updated_at
         FROM budgets ORDER BY month DESC, type",
    )?;
    let mut rows = stmt.query([])?;
    let mut out = Vec::new();
    while let Some(r) = rows.next()? {
        let amount_s: String = r.get(3)?;
        out.push(Budget {
            id: r.get(0)?,
            month: r.get(1)?,
            r#type: r.get(2)?,
            amount: amount_s
                .parse::<Decimal>()
                .with_context(|| format!("Invalid amount '{}' in budgets", amount_s))?,
            created_at: r.get(4)?,
            updated_at: r.get(5)?,
        });
    }
    Ok(out)
}

// ---------------------------------------------------------------------------
// Reminders
// ---------------------------------------------------------------------------

pub fn add_reminder(conn: &Connection, notes: &str, due_at: &str) -> Result<i64> {
    let now = now_millis();
    conn.execute(
        "INSERT INTO reminders(notes, due_at, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?3)",
        params![notes, due_at, now],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn delete_reminder(conn: &Connection, id: i64) -> Result<()> {
    let changed = conn.execute("DELETE FROM reminders WHERE id=?1", params![id])?;
    if changed == 0 {
        anyhow::bail!("Reminder {} not found", id);
    }
    Ok(())
}

pub fn list_reminders(conn: &Connection) -> Result<Vec<Reminder>> {
    let mut stmt = conn.prepare(
        "SELECT id, notes, due_at, created_at, updated_at
         FROM reminders ORDER BY due_at, id",
    )?;
    let mut rows = stmt.query([])?;
    let mut out = Vec::new();
    while let Some(r) = rows.next()? {
        out.push(Reminder {
            id: r.get(0)?,
            notes: r.get(1)?,
            due_at: r.get(2)?,
            created_at: r.get(3)?,
            updated_at: r.get(4)?,
        });
    }
    Ok(out)
}

// ---------------------------------------------------------------------------
// Wallet ledger
// ---------------------------------------------------------------------------

/// Canonical running-balance fold: `out[i] = out[i-1] + amounts[i]`, starting
/// from zero. Everything else in this module is a cache of this.
pub fn project(amounts: &[Decimal]) -> Vec<Decimal> {
    let mut out = Vec::with_capacity(amounts.len());
    let mut acc = Decimal::ZERO;
    for a in amounts {
        acc += a;
        out.push(acc);
    }
    out
}

/// Wallet entries in chronological `(created_at, id)` order.
pub fn list_wallet_entries(conn: &Connection) -> Result<Vec<WalletEntry>> {
    let mut stmt = conn.prepare(
        "SELECT id, added_amount, balance, notes, created_at, updated_at
         FROM wallet_entries ORDER BY created_at, id",
    )?;
    let mut rows = stmt.query([])?;
    let mut out = Vec::new();
    while let Some(r) = rows.next()? {
        let added_s: String = r.get(1)?;
        let balance_s: String = r.get(2)?;
        out.push(WalletEntry {
            id: r.get(0)?,
            added_amount: added_s
                .parse::<Decimal>()
                .with_context(|| format!("Invalid amount '{}' in wallet_entries", added_s))?,
            balance: balance_s
                .parse::<Decimal>()
                .with_context(|| format!("Invalid balance '{}' in wallet_entries", balance_s))?,
            notes: r.get(3)?,
            created_at: r.get(4)?,
            updated_at: r.get(5)?,
        });
    }
    Ok(out)
}

/// Record a wallet movement. `at` overrides `created_at` for backdated
/// entries; a backdated insert lands out of chronological order and forces a
/// full recompute of every later cached balance.
pub fn add_wallet_entry(
    conn: &mut Connection,
    added_amount: Decimal,
    notes: &str,
    at: Option<i64>,
) -> Result<i64> {
    let now = now_millis();
    let created_at = at.unwrap_or(now);

    let tx = conn.transaction()?;
    let latest: Option<(i64, String)> = tx
        .query_row(
            "SELECT created_at, balance FROM wallet_entries
             ORDER BY created_at DESC, id DESC LIMIT 1",
            [],
            |r| Ok((r.get(0)?, r.get(1)?)),
        )
        .optional()?;

    let appended_at_tail = match latest {
        Some((latest_created, _)) => created_at >= latest_created,
        None => true,
    };

    let balance = if appended_at_tail {
        let prev = match &latest {
            Some((_, b)) => b
                .parse::<Decimal>()
                .with_context(|| format!("Invalid balance '{}' in wallet_entries", b))?,
            None => Decimal::ZERO,
        };
        prev + added_amount
    } else {
        Decimal::ZERO // placeholder, fixed by the recompute below
    };

    tx.execute(
        "INSERT INTO wallet_entries(added_amount, balance, notes, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![added_amount.to_string(), balance.to_string(), notes, created_at, now],
    )?;
    let id = tx.last_insert_rowid();

    if !appended_at_tail {
        recompute_balances(&tx)?;
    }
    tx.commit()?;
    Ok(id)
}

/// Edit an entry's amount/notes. The cached balance chain from this entry
/// onward is stale afterwards, so the whole chain is rewritten in the same
/// transaction.
pub fn update_wallet_entry(
    conn: &mut Connection,
    id: i64,
    added_amount: Decimal,
    notes: &str,
) -> Result<()> {
    let tx = conn.transaction()?;
    let changed = tx.execute(
        "UPDATE wallet_entries SET added_amount=?1, notes=?2, updated_at=?3 WHERE id=?4",
        params![added_amount.to_string(), notes, now_millis(), id],
    )?;
    if changed == 0 {
        anyhow::bail!("Wallet entry {} not found", id);
    }
    recompute_balances(&tx)?;
    tx.commit()?;
    Ok(())
}

pub fn delete_wallet_entry(conn: &mut Connection, id: i64) -> Result<()> {
    let tx = conn.transaction()?;
    let changed = tx.execute("DELETE FROM wallet_entries WHERE id=?1", params![id])?;
    if changed == 0 {
        anyhow::bail!("Wallet entry {} not found", id);
    }
    recompute_balances(&tx)?;
    tx.commit()?;
    Ok(())
}

/// Rewrite every cached `balance` snapshot from the canonical fold. O(n), run
/// inside the mutating transaction so readers never observe a broken chain.
fn recompute_balances(conn: &Connection) -> Result<()> {
    let mut stmt = conn.prepare(
        "SELECT id, added_amount FROM wallet_entries ORDER BY created_at, id",
    )?;
    let mut rows = stmt.query([])?;
    let mut ids = Vec::new();
    let mut amounts = Vec::new();
    while let Some(r) = rows.next()? {
        let id: i64 = r.get(0)?;
        let amount_s: String = r.get(1)?;
        ids.push(id);
        amounts.push(
            amount_s
                .parse::<Decimal>()
                .with_context(|| format!("Invalid amount '{}' in wallet_entries", amount_s))?,
        );
    }
    let balances = project(&amounts);
    let mut update = conn.prepare("UPDATE wallet_entries SET balance=?1 WHERE id=?2")?;
    for (id, balance) in ids.iter().zip(balances.iter()) {
        update.execute(params![balance.to_string(), id])?;
    }
    Ok(())
}

/// Cached balance of the chronologically last entry; zero when empty.
pub fn current_balance(conn: &Connection) -> Result<Decimal> {
    let latest: Option<String> = conn
        .query_row(
            "SELECT balance FROM wallet_entries ORDER BY created_at DESC, id DESC LIMIT 1",
            [],
            |r| r.get(0),
        )
        .optional()?;
    match latest {
        Some(b) => b
            .parse::<Decimal>()
            .with_context(|| format!("Invalid balance '{}' in wallet_entries", b)),
        None => Ok(Decimal::ZERO),
    }
}

/// Balance as of `cutoff_millis`: the fold over entries created on or before
/// the cutoff. Reads amounts only, never the cached snapshots.
pub fn balance_as_of(conn: &Connection, cutoff_millis: i64) -> Result<Decimal> {
    let mut stmt =
        conn.prepare("SELECT added_amount FROM wallet_entries WHERE created_at <= ?1")?;
    let mut rows = stmt.query(params![cutoff_millis])?;
    let mut total = Decimal::ZERO;
    while let Some(r) = rows.next()? {
        let amount_s: String = r.get(0)?;
        total += amount_s
            .parse::<Decimal>()
            .with_context(|| format!("Invalid amount '{}' in wallet_entries", amount_s))?;
    }
    Ok(total)
}

/// How many records of `kind` were created or touched after the cursor.
/// Drives the "anything to sync" affordance.
pub fn pending_count(conn: &Connection, kind: EntityKind, cursor_millis: i64) -> Result<i64> {
    let table = match kind {
        EntityKind::Expense => "expenses",
        EntityKind::Budget => "budgets",
        EntityKind::Wallet => "wallet_entries",
        EntityKind::Reminder => "reminders",
    };
    let sql = format!(
        "SELECT COUNT(*) FROM {} WHERE created_at > ?1 OR updated_at > ?1",
        table
    );
    let n: i64 = conn.query_row(&sql, params![cursor_millis], |r| r.get(0))?;
    Ok(n)
}
