// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use std::collections::HashMap;

use log::{error, info, warn};
use rusqlite::Connection;
use thiserror::Error;

use crate::models::{Budget, EntityKind, Expense, Reminder, SyncCursor, WalletEntry};
use crate::sync::gateway::{GatewayError, RemoteRow, RemoteTableGateway, RetryClass};
use crate::sync::{clear_table_id, load_cursor, store_table_id};
use crate::utils::current_year;

// Column contracts, one per entity kind. Column order is part of the remote
// format: the first column is always the source record's id (the
// reconciliation key). Extend only by appending columns.
pub const EXPENSE_HEADER: [&str; 7] = [
    "Id", "Date", "Type", "Amount", "Notes", "CreatedAt", "UpdatedAt",
];
pub const BUDGET_HEADER: [&str; 6] = ["Id", "Month", "Type", "Amount", "CreatedAt", "UpdatedAt"];
pub const WALLET_HEADER: [&str; 6] = [
    "Id", "AddedAmount", "Balance", "Notes", "CreatedAt", "UpdatedAt",
];
pub const REMINDER_HEADER: [&str; 5] = ["Id", "Notes", "DueAt", "CreatedAt", "UpdatedAt"];

fn expense_row(e: &Expense) -> RemoteRow {
    vec![
        e.id.to_string(),
        e.date.clone(),
        e.r#type.clone(),
        e.amount.to_string(),
        e.notes.clone(),
        e.created_at.to_string(),
        e.updated_at.to_string(),
    ]
}

fn budget_row(b: &Budget) -> RemoteRow {
    vec![
        b.id.to_string(),
        b.month.clone(),
        b.r#type.clone(),
        b.amount.to_string(),
        b.created_at.to_string(),
        b.updated_at.to_string(),
    ]
}

fn wallet_row(w: &WalletEntry) -> RemoteRow {
    vec![
        w.id.to_string(),
        w.added_amount.to_string(),
        w.balance.to_string(),
        w.notes.clone(),
        w.created_at.to_string(),
        w.updated_at.to_string(),
    ]
}

fn reminder_row(r: &Reminder) -> RemoteRow {
    vec![
        r.id.to_string(),
        r.notes.clone(),
        r.due_at.clone(),
        r.created_at.to_string(),
        r.updated_at.to_string(),
    ]
}

fn header_row(kind: EntityKind) -> RemoteRow {
    match kind {
        EntityKind::Expense => EXPENSE_HEADER.iter().map(|s| s.to_string()).collect(),
        EntityKind::Budget => BUDGET_HEADER.iter().map(|s| s.to_string()).collect(),
        EntityKind::Wallet => WALLET_HEADER.iter().map(|s| s.to_string()).collect(),
        EntityKind::Reminder => REMINDER_HEADER.iter().map(|s| s.to_string()).collect(),
    }
}

fn last_column(kind: EntityKind) -> char {
    match kind {
        EntityKind::Expense => 'G',
        EntityKind::Budget => 'F',
        EntityKind::Wallet => 'F',
        EntityKind::Reminder => 'E',
    }
}

/// Full addressed region of a kind's sub-table.
fn full_range(kind: EntityKind) -> String {
    format!("{}!A1:{}", kind.sheet_name(), last_column(kind))
}

/// Exactly one data row, addressed by 1-based sheet row position.
fn row_range(kind: EntityKind, row_pos: usize) -> String {
    let col = last_column(kind);
    format!("{}!A{}:{}{}", kind.sheet_name(), row_pos, col, row_pos)
}

/// Pending local records per collection, as selected against the cursor.
#[derive(Debug, Default)]
pub struct PendingSet {
    pub expenses: Vec<Expense>,
    pub budgets: Vec<Budget>,
    pub wallet: Vec<WalletEntry>,
    pub reminders: Vec<Reminder>,
}

impl PendingSet {
    pub fn total(&self) -> usize {
        self.expenses.len() + self.budgets.len() + self.wallet.len() + self.reminders.len()
    }

    fn rows_for(&self, kind: EntityKind) -> Vec<(i64, RemoteRow)> {
        match kind {
            EntityKind::Expense => self
                .expenses
                .iter()
                .map(|e| (e.id, expense_row(e)))
                .collect(),
            EntityKind::Budget => self.budgets.iter().map(|b| (b.id, budget_row(b))).collect(),
            EntityKind::Wallet => self.wallet.iter().map(|w| (w.id, wallet_row(w))).collect(),
            EntityKind::Reminder => self
                .reminders
                .iter()
                .map(|r| (r.id, reminder_row(r)))
                .collect(),
        }
    }
}

#[derive(Debug, Error)]
pub enum SyncError {
    /// A gateway call failed while processing one entity kind.
    #[error("{op} failed for {kind}: {source}")]
    Gateway {
        kind: EntityKind,
        op: &'static str,
        #[source]
        source: GatewayError,
    },

    /// A gateway call failed during table bootstrap, before any kind was
    /// touched.
    #[error("{op} failed: {source}")]
    Table {
        op: &'static str,
        #[source]
        source: GatewayError,
    },

    /// Remote rows for these kinds could not be reconciled (duplicate or
    /// unparsable id column). Other kinds were still processed; the cursor
    /// was not advanced.
    #[error("data integrity failure in {0:?}")]
    Integrity(Vec<EntityKind>),

    #[error("sync state store error: {0}")]
    State(#[from] rusqlite::Error),
}

/// Outcome of a fully successful pass. The caller persists the cursor.
#[derive(Debug)]
pub struct ReconcileReport {
    pub cursor: SyncCursor,
    pub appended: usize,
    pub updated: usize,
}

/// Reconcile all pending records against the remote table.
///
/// Per invocation: make sure a destination table exists (recreating it if the
/// remote reports the stored one gone), then for each entity kind diff the
/// pending rows against the remote region by id column, updating matches in
/// place and appending the rest in one batch. The returned cursor is valid
/// only because every kind succeeded; any I/O failure aborts the whole pass.
pub fn reconcile(
    conn: &Connection,
    gateway: &dyn RemoteTableGateway,
    pending: &PendingSet,
    now_millis: i64,
) -> Result<ReconcileReport, SyncError> {
    let table_id = ensure_table(conn, gateway)?;

    let mut appended = 0;
    let mut updated = 0;
    let mut bad_kinds = Vec::new();

    for kind in EntityKind::all() {
        let rows = pending.rows_for(kind);
        if rows.is_empty() {
            continue;
        }
        match reconcile_kind(gateway, &table_id, kind, &rows) {
            Ok((a, u)) => {
                info!("{}: {} appended, {} updated", kind, a, u);
                appended += a;
                updated += u;
            }
            Err(SyncError::Integrity(_)) => {
                error!("{}: skipped this pass (remote data integrity)", kind);
                bad_kinds.push(kind);
            }
            Err(e) => return Err(e),
        }
    }

    if !bad_kinds.is_empty() {
        return Err(SyncError::Integrity(bad_kinds));
    }

    Ok(ReconcileReport {
        cursor: SyncCursor {
            last_sync_at_millis: now_millis,
            remote_table_id: Some(table_id),
        },
        appended,
        updated,
    })
}

/// Steps 1-2: validate or (re)create the destination table. The new id is
/// persisted before any row writes so a crash mid-pass does not orphan it.
fn ensure_table(
    conn: &Connection,
    gateway: &dyn RemoteTableGateway,
) -> Result<String, SyncError> {
    let cursor = load_cursor(conn)?;
    let mut table_id = cursor.remote_table_id;

    if let Some(id) = table_id.clone() {
        match gateway.table_exists(&id) {
            Ok(true) => {}
            Ok(false) => {
                warn!("remote table {} was deleted out-of-band; recreating", id);
                clear_table_id(conn)?;
                table_id = None;
            }
            Err(e) if e.retry_class() == RetryClass::ReauthRequired => {
                return Err(SyncError::Table {
                    op: "table_exists",
                    source: e,
                });
            }
            Err(e) => {
                // Could not perform the check at all: proceed optimistically
                // with the stored id; a later write will surface the real
                // problem.
                warn!("table existence check failed ({}), keeping stored id", e);
            }
        }
    }

    match table_id {
        Some(id) => Ok(id),
        None => {
            let title = format!("BUDGETBUDDY_BACKUP_{}", current_year());
            let id = gateway.create_table(&title).map_err(|e| SyncError::Table {
                op: "create_table",
                source: e,
            })?;
            store_table_id(conn, &id)?;
            let names: Vec<&str> = EntityKind::all().iter().map(|k| k.sheet_name()).collect();
            gateway
                .ensure_named_sheets(&id, &names)
                .map_err(|e| SyncError::Table {
                    op: "ensure_named_sheets",
                    source: e,
                })?;
            info!("created remote table {} ({})", id, title);
            Ok(id)
        }
    }
}

/// Step 3 for one kind: read the remote region, then either seed it with a
/// header plus all rows, or split pending rows into in-place updates and one
/// batched append keyed on the id column.
fn reconcile_kind(
    gateway: &dyn RemoteTableGateway,
    table_id: &str,
    kind: EntityKind,
    rows: &[(i64, RemoteRow)],
) -> Result<(usize, usize), SyncError> {
    let region = full_range(kind);
    let remote = gateway
        .read_range(table_id, &region)
        .map_err(|e| SyncError::Gateway {
            kind,
            op: "read_range",
            source: e,
        })?;

    if remote.is_empty() {
        let mut payload = vec![header_row(kind)];
        payload.extend(dedupe_last(rows));
        gateway
            .write_range(table_id, &region, &payload)
            .map_err(|e| SyncError::Gateway {
                kind,
                op: "write_range",
                source: e,
            })?;
        return Ok((payload.len() - 1, 0));
    }

    // Remote row 1 is the header; data rows map to 1-based sheet positions.
    let mut index: HashMap<i64, usize> = HashMap::new();
    for (i, row) in remote.iter().enumerate().skip(1) {
        let Some(cell) = row.first() else {
            continue; // blank padding row
        };
        match cell.trim().parse::<i64>() {
            Ok(id) => {
                if index.insert(id, i + 1).is_some() {
                    error!("duplicate id {} in remote {} rows", id, kind);
                    return Err(SyncError::Integrity(vec![kind]));
                }
            }
            Err(_) => {
                error!(
                    "unparsable id column '{}' at remote {} row {}",
                    cell,
                    kind,
                    i + 1
                );
                return Err(SyncError::Integrity(vec![kind]));
            }
        }
    }

    let mut updated = 0;
    let mut appends: Vec<(i64, RemoteRow)> = Vec::new();
    for (id, row) in rows {
        if let Some(pos) = index.get(id) {
            // Update targets are scattered positions: one write per row.
            gateway
                .write_range(table_id, &row_range(kind, *pos), std::slice::from_ref(row))
                .map_err(|e| SyncError::Gateway {
                    kind,
                    op: "write_range",
                    source: e,
                })?;
            updated += 1;
        } else if let Some(existing) = appends.iter_mut().find(|(aid, _)| aid == id) {
            existing.1 = row.clone(); // same id pending twice: last wins
        } else {
            appends.push((*id, row.clone()));
        }
    }

    let mut appended = 0;
    if !appends.is_empty() {
        let payload: Vec<RemoteRow> = appends.into_iter().map(|(_, r)| r).collect();
        appended = payload.len();
        gateway
            .append_rows(table_id, &region, &payload)
            .map_err(|e| SyncError::Gateway {
                kind,
                op: "append_rows",
                source: e,
            })?;
    }

    Ok((appended, updated))
}

/// Keep one row per id, the last occurrence winning.
fn dedupe_last(rows: &[(i64, RemoteRow)]) -> Vec<RemoteRow> {
    let mut kept: Vec<(i64, RemoteRow)> = Vec::with_capacity(rows.len());
    for (id, row) in rows {
        if let Some(existing) = kept.iter_mut().find(|(kid, _)| kid == id) {
            existing.1 = row.clone();
        } else {
            kept.push((*id, row.clone()));
        }
    }
    kept.into_iter().map(|(_, r)| r).collect()
}
