// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A single recorded expense. `date` is the user-facing calendar date and is
/// independent of `created_at` (entries can be recorded after the fact).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Expense {
    pub id: i64,
    pub date: String, // YYYY-MM-DD
    pub r#type: String,
    pub amount: Decimal,
    pub notes: String,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Budget {
    pub id: i64,
    pub month: String, // YYYY-MM
    pub r#type: String,
    pub amount: Decimal,
    pub created_at: i64,
    pub updated_at: i64,
}

/// A signed wallet movement. `balance` is a denormalized snapshot of the
/// running balance right after this entry; the source of truth is the fold
/// over `added_amount` in `(created_at, id)` order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalletEntry {
    pub id: i64,
    pub added_amount: Decimal,
    pub balance: Decimal,
    pub notes: String,
    pub created_at: i64,
    pub updated_at: i64,
}

/// A dated note the user wants to be nagged about. Alarm delivery is an
/// external concern; we only store and mirror the record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reminder {
    pub id: i64,
    pub notes: String,
    pub due_at: String, // YYYY-MM-DD HH:MM
    pub created_at: i64,
    pub updated_at: i64,
}

/// The four collections mirrored to the remote spreadsheet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Expense,
    Budget,
    Wallet,
    Reminder,
}

impl EntityKind {
    pub fn all() -> [EntityKind; 4] {
        [
            EntityKind::Expense,
            EntityKind::Budget,
            EntityKind::Wallet,
            EntityKind::Reminder,
        ]
    }

    /// Name of the sub-table (sheet) holding this kind's rows.
    pub fn sheet_name(&self) -> &'static str {
        match self {
            EntityKind::Expense => "Expenses",
            EntityKind::Budget => "Budgets",
            EntityKind::Wallet => "Wallet",
            EntityKind::Reminder => "Reminders",
        }
    }
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.sheet_name())
    }
}

/// Boundary between already-synced and pending records, plus the identity of
/// the remote table in use. Persisted in the settings store; advanced only
/// after a fully successful reconciliation pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncCursor {
    pub last_sync_at_millis: i64,
    pub remote_table_id: Option<String>,
}

/// Opaque remote session handle supplied by the external auth flow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub access_token: String,
    pub user_name: String,
    pub email: String,
}

/// Creation/update stamps shared by every ledger collection; input to the
/// change set selector.
pub trait Timestamped {
    fn created_at(&self) -> i64;
    fn updated_at(&self) -> i64;
}

impl Timestamped for Expense {
    fn created_at(&self) -> i64 {
        self.created_at
    }
    fn updated_at(&self) -> i64 {
        self.updated_at
    }
}

impl Timestamped for Budget {
    fn created_at(&self) -> i64 {
        self.created_at
    }
    fn updated_at(&self) -> i64 {
        self.updated_at
    }
}

impl Timestamped for WalletEntry {
    fn created_at(&self) -> i64 {
        self.created_at
    }
    fn updated_at(&self) -> i64 {
        self.updated_at
    }
}

impl Timestamped for Reminder {
    fn created_at(&self) -> i64 {
        self.created_at
    }
    fn updated_at(&self) -> i64 {
        self.updated_at
    }
}
