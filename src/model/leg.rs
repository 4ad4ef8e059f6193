//! Delivery / pickup legs of a booking and their read-time projection.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LegDirection {
    Delivery,
    PickUp,
}

impl LegDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            LegDirection::Delivery => "delivery",
            LegDirection::PickUp => "pick_up",
        }
    }
}

impl FromStr for LegDirection {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "delivery" => Ok(LegDirection::Delivery),
            "pick_up" => Ok(LegDirection::PickUp),
            other => Err(format!("unknown leg direction: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LegStatus {
    Pending,
    OnProgress,
    Done,
}

impl LegStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LegStatus::Pending => "pending",
            LegStatus::OnProgress => "on_progress",
            LegStatus::Done => "done",
        }
    }
}

impl FromStr for LegStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(LegStatus::Pending),
            "on_progress" => Ok(LegStatus::OnProgress),
            "done" => Ok(LegStatus::Done),
            other => Err(format!("unknown leg status: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LegRequest {
    pub id: i64,
    pub booking_id: i64,
    #[serde(rename = "type")]
    pub direction: LegDirection,
    pub is_self_pickup: bool,
    pub address: Option<String>,
    pub distance: Option<f64>,
    pub driver_id: Option<i64>,
    pub status: LegStatus,
}

// Data leg dari request create/update
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LegInput {
    #[serde(default)]
    pub is_self_pickup: bool,
    pub address: Option<String>,
    pub distance: Option<f64>,
    pub driver_id: Option<i64>,
}

impl LegInput {
    pub fn validate(&self) -> AppResult<()> {
        let has_address = self
            .address
            .as_deref()
            .map(|a| !a.trim().is_empty())
            .unwrap_or(false);

        if self.is_self_pickup && has_address {
            return Err(AppError::invalid("Address must be empty if self pickup."));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LegLogKind {
    Start,
    Progress,
    End,
}

impl FromStr for LegLogKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "start" => Ok(LegLogKind::Start),
            "progress" => Ok(LegLogKind::Progress),
            "end" => Ok(LegLogKind::End),
            other => Err(format!("unknown leg log type: {}", other)),
        }
    }
}

/// Field-activity event written by the driver app.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LegLog {
    #[serde(rename = "type")]
    pub kind: LegLogKind,
    pub created_at: DateTime<Utc>,
}

/// A leg as shown to API callers, with derived fields filled in.
#[derive(Debug, Clone, Serialize)]
pub struct LegView {
    #[serde(flatten)]
    pub leg: LegRequest,
    pub logs: Vec<LegLog>,
    pub is_end_process: bool,
    pub progress_duration_second: Option<i64>,
}

impl LegView {
    /// Computes the derived fields from the persisted leg and its logs.
    ///
    /// The elapsed time runs from the first START log to the first END log,
    /// or to `now` while the leg has not ended. Pending legs have no elapsed time.
    pub fn project(leg: LegRequest, logs: Vec<LegLog>, now: DateTime<Utc>) -> Self {
        let is_end_process = leg.status == LegStatus::OnProgress || leg.is_self_pickup;

        let progress_duration_second = if leg.status == LegStatus::Pending {
            None
        } else {
            let start = logs.iter().find(|l| l.kind == LegLogKind::Start);
            let end = logs.iter().find(|l| l.kind == LegLogKind::End);
            start.map(|s| {
                let until = end.map(|e| e.created_at).unwrap_or(now);
                (until - s.created_at).num_seconds()
            })
        };

        Self {
            leg,
            logs,
            is_end_process,
            progress_duration_second,
        }
    }
}
