//! Rotation cycles and the swap window state machine.

use chrono::{DateTime, Utc};
use common::CycleId;
use serde::{Deserialize, Serialize};

/// Lifecycle status of a rotation cycle.
///
/// ```text
/// Upcoming ──► Active ──► Archived
/// ```
///
/// At most one cycle is `Active` at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CycleStatus {
    #[default]
    Upcoming,
    Active,
    Archived,
}

impl CycleStatus {
    /// Returns the status as stored in the relational store.
    pub fn as_str(&self) -> &'static str {
        match self {
            CycleStatus::Upcoming => "upcoming",
            CycleStatus::Active => "active",
            CycleStatus::Archived => "archived",
        }
    }

    /// Parses a stored status string.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "upcoming" => Some(CycleStatus::Upcoming),
            "active" => Some(CycleStatus::Active),
            "archived" => Some(CycleStatus::Archived),
            _ => None,
        }
    }
}

impl std::fmt::Display for CycleStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A period's curated product catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RotationCycle {
    pub id: CycleId,
    pub status: CycleStatus,
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
    /// Start of the swap-eligible interval (inclusive).
    pub swap_opens_at: DateTime<Utc>,
    /// End of the swap-eligible interval (exclusive).
    pub swap_closes_at: DateTime<Utc>,
}

impl RotationCycle {
    /// Returns the cycle's swap window boundaries.
    pub fn swap_window(&self) -> SwapWindow {
        SwapWindow {
            opens_at: self.swap_opens_at,
            closes_at: self.swap_closes_at,
        }
    }

    /// Evaluates the swap window for this cycle at `now`.
    ///
    /// A cycle that is not `Active` never has an open window.
    pub fn swap_window_state(&self, now: DateTime<Utc>) -> SwapWindowState {
        if self.status != CycleStatus::Active {
            return SwapWindowState::Closed;
        }
        self.swap_window().state_at(now)
    }
}

/// The state of the swap window.
///
/// ```text
/// Closed ──(now >= opens_at)──► Open ──(now >= closes_at)──► Closed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum SwapWindowState {
    #[default]
    Closed,
    Open,
}

impl SwapWindowState {
    /// Evaluates the window for an optional active cycle. No active cycle means closed.
    pub fn for_cycle(cycle: Option<&RotationCycle>, now: DateTime<Utc>) -> Self {
        cycle.map_or(SwapWindowState::Closed, |c| c.swap_window_state(now))
    }

    /// Returns true if swap-pool mutations are permitted.
    pub fn is_open(&self) -> bool {
        matches!(self, SwapWindowState::Open)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SwapWindowState::Open => "OPEN",
            SwapWindowState::Closed => "CLOSED",
        }
    }
}

impl std::fmt::Display for SwapWindowState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Half-open interval `[opens_at, closes_at)` during which swaps are allowed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwapWindow {
    pub opens_at: DateTime<Utc>,
    pub closes_at: DateTime<Utc>,
}

impl SwapWindow {
    /// Pure transition function: boundaries + clock reading → state.
    pub fn state_at(&self, now: DateTime<Utc>) -> SwapWindowState {
        if self.opens_at <= now && now < self.closes_at {
            SwapWindowState::Open
        } else {
            SwapWindowState::Closed
        }
    }
}

/// Cached view of the swap window stored on subscription metadata.
///
/// This is informational only; the window is always re-derived from the
/// active cycle before any ledger decision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SwapWindowSnapshot {
    pub cycle_id: CycleId,
    pub state: SwapWindowState,
    pub opens_at: DateTime<Utc>,
    pub closes_at: DateTime<Utc>,
    pub taken_at: DateTime<Utc>,
}

impl SwapWindowSnapshot {
    /// Captures the window of `cycle` as observed at `now`.
    pub fn capture(cycle: &RotationCycle, now: DateTime<Utc>) -> Self {
        Self {
            cycle_id: cycle.id.clone(),
            state: cycle.swap_window_state(now),
            opens_at: cycle.swap_opens_at,
            closes_at: cycle.swap_closes_at,
            taken_at: now,
        }
    }
}
