use crate::remote::{ActivitySink, RemoteActivity};
use anyhow::{Result, bail};
use chrono::{Duration, Months, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use tracing::debug;

pub const ANONYMOUS_NAME: &str = "Anonymous";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LeaderboardRow {
    pub name: String,
    pub points: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LeaderboardRange {
    #[default]
    Week,
    Month,
}

impl LeaderboardRange {
    pub fn start_date(self, today: NaiveDate) -> NaiveDate {
        match self {
            Self::Week => today - Duration::days(7),
            Self::Month => today
                .checked_sub_months(Months::new(1))
                .unwrap_or(today - Duration::days(30)),
        }
    }
}

impl FromStr for LeaderboardRange {
    type Err = anyhow::Error;

    fn from_str(raw: &str) -> Result<Self> {
        match raw.trim().to_lowercase().as_str() {
            "week" | "7d" => Ok(Self::Week),
            "month" | "30d" => Ok(Self::Month),
            other => bail!("Unsupported leaderboard range: {other}. Use week or month"),
        }
    }
}

impl fmt::Display for LeaderboardRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Week => write!(f, "week"),
            Self::Month => write!(f, "month"),
        }
    }
}

/// Sums points per name for records dated on or after `start`, highest
/// first, ties by name.
pub fn aggregate(records: &[RemoteActivity], start: NaiveDate) -> Vec<LeaderboardRow> {
    let start = start.format("%Y-%m-%d").to_string();

    let totals = records
        .iter()
        .filter(|record| record.date.as_str() >= start.as_str())
        .fold(HashMap::new(), |mut acc, record| {
            let name = match record.name.trim() {
                "" => ANONYMOUS_NAME,
                trimmed => trimmed,
            };
            *acc.entry(name.to_string()).or_insert(0_u64) += record.points;
            acc
        });

    let mut rows = totals
        .into_iter()
        .map(|(name, points)| LeaderboardRow { name, points })
        .collect::<Vec<_>>();
    rows.sort_by(|left, right| {
        right
            .points
            .cmp(&left.points)
            .then_with(|| left.name.cmp(&right.name))
    });
    rows
}

pub fn leaderboard_since(sink: &dyn ActivitySink, start: NaiveDate) -> Vec<LeaderboardRow> {
    let records = sink.query_since(start);
    debug!(records = records.len(), start = %start, backend = %sink.describe(), "leaderboard records fetched");
    aggregate(&records, start)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueryTicket {
    pub sequence: u64,
    pub range: LeaderboardRange,
}

#[derive(Debug, Clone, Serialize)]
pub struct LeaderboardSnapshot {
    pub range: LeaderboardRange,
    pub pending: bool,
    pub rows: Vec<LeaderboardRow>,
}

/// Current leaderboard selection. Only the most recently issued ticket may
/// publish rows, so a slow query for an older selection is discarded.
#[derive(Debug, Default)]
pub struct LeaderboardFeed {
    issued: u64,
    applied: u64,
    range: LeaderboardRange,
    rows: Vec<LeaderboardRow>,
}

impl LeaderboardFeed {
    pub fn select(&mut self, range: LeaderboardRange) -> QueryTicket {
        self.issued += 1;
        self.range = range;
        QueryTicket {
            sequence: self.issued,
            range,
        }
    }

    pub fn resolve(&mut self, ticket: QueryTicket, rows: Vec<LeaderboardRow>) -> bool {
        if ticket.sequence != self.issued {
            debug!(
                ticket = ticket.sequence,
                latest = self.issued,
                "discarding stale leaderboard result"
            );
            return false;
        }

        self.rows = rows;
        self.applied = ticket.sequence;
        true
    }

    pub fn range(&self) -> LeaderboardRange {
        self.range
    }

    pub fn snapshot(&self) -> LeaderboardSnapshot {
        LeaderboardSnapshot {
            range: self.range,
            pending: self.applied < self.issued,
            rows: self.rows.clone(),
        }
    }
}
