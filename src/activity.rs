//! Machine Activity Monitor
//!
//! Computes which machines of a store had no reportable movement inside the
//! trailing 12-hour window. Fully recomputed on every call; nothing is cached
//! across store selections. Machines whose name starts with "poltrona"
//! (trimmed, case-insensitive) are excluded from the check — that category is
//! not tracked for movement.

use std::collections::BTreeSet;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Trailing window judged as "recent".
pub const INACTIVITY_WINDOW_HOURS: i64 = 12;

/// Name prefix of the untracked machine category.
const EXCLUDED_PREFIX: &str = "poltrona";

/// Machine record as served by `GET /maquinas`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Machine {
    pub id: String,
    pub nome: String,
    pub loja_id: String,
    #[serde(default = "default_ativo")]
    pub ativo: bool,
}

fn default_ativo() -> bool {
    true
}

/// Movement event as served by `GET /movimentacoes`. The backend has shipped
/// the timestamp under three different field names over time; the first one
/// that parses wins.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MovementEvent {
    pub maquina_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_movimentacao: Option<String>,
}

impl MovementEvent {
    /// Instant this movement happened, if any candidate field parses as
    /// RFC 3339. Unparseable records are discarded, never treated as recent.
    pub fn occurred_at(&self) -> Option<DateTime<Utc>> {
        [&self.created_at, &self.data, &self.data_movimentacao]
            .into_iter()
            .flatten()
            .find_map(|raw| {
                DateTime::parse_from_rfc3339(raw)
                    .ok()
                    .map(|dt| dt.with_timezone(&Utc))
            })
    }
}

/// Outcome of one freshness check, derived and never stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActivityReport {
    pub loja_id: String,
    pub window_start: DateTime<Utc>,
    pub window_end: DateTime<Utc>,
    /// Machines with at least one valid movement inside the window.
    pub active: BTreeSet<String>,
    /// Non-excluded machines with no valid movement inside the window.
    pub inactive: BTreeSet<String>,
    machine_count: usize,
}

/// Three-way status so an empty store is never mistaken for a compliant one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportStatus {
    /// The store has no machines at all.
    NoMachines,
    /// Every tracked machine moved inside the window.
    AllActive,
    /// At least one tracked machine had no recent movement.
    HasInactive,
}

impl ActivityReport {
    pub fn status(&self) -> ReportStatus {
        if self.machine_count == 0 {
            ReportStatus::NoMachines
        } else if self.inactive.is_empty() {
            ReportStatus::AllActive
        } else {
            ReportStatus::HasInactive
        }
    }

    pub fn machine_count(&self) -> usize {
        self.machine_count
    }
}

fn is_excluded(nome: &str) -> bool {
    nome.trim().to_lowercase().starts_with(EXCLUDED_PREFIX)
}

/// Compute the machines of `loja_id` without a recent movement.
///
/// `machines` is the store's full machine list, `events` the movements
/// fetched for the trailing window. Timestamps are re-validated here: only
/// events that parse and fall inside `[now - 12h, now]` count.
pub fn report(
    loja_id: &str,
    machines: &[Machine],
    events: &[MovementEvent],
    now: DateTime<Utc>,
) -> ActivityReport {
    let window_start = now - Duration::hours(INACTIVITY_WINDOW_HOURS);

    let mut active: BTreeSet<String> = BTreeSet::new();
    for event in events {
        if let Some(at) = event.occurred_at() {
            if at >= window_start && at <= now {
                active.insert(event.maquina_id.clone());
            }
        }
    }

    let inactive: BTreeSet<String> = machines
        .iter()
        .filter(|m| !active.contains(&m.id) && !is_excluded(&m.nome))
        .map(|m| m.id.clone())
        .collect();

    debug!(
        "activity report loja={}: {} machines, {} active, {} inactive",
        loja_id,
        machines.len(),
        active.len(),
        inactive.len()
    );

    ActivityReport {
        loja_id: loja_id.to_string(),
        window_start,
        window_end: now,
        active,
        inactive,
        machine_count: machines.len(),
    }
}
