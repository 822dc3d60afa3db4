use chrono::{Local, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// ItemId
// ---------------------------------------------------------------------------

/// Identifier of a pool item. Assigned once, strictly increasing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemId(pub u64);

impl ItemId {
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for ItemId {
    fn from(v: u64) -> Self {
        ItemId(v)
    }
}

impl std::str::FromStr for ItemId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse::<u64>().map(ItemId)
    }
}

// ---------------------------------------------------------------------------
// RequesterId
// ---------------------------------------------------------------------------

/// Whoever asks for a daily item (a chat user in the bot front-end).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequesterId(pub i64);

impl fmt::Display for RequesterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for RequesterId {
    fn from(v: i64) -> Self {
        RequesterId(v)
    }
}

// ---------------------------------------------------------------------------
// DayKey
// ---------------------------------------------------------------------------

/// Calendar day in ISO-8601 form (`YYYY-MM-DD`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DayKey(String);

impl DayKey {
    pub fn from_date(date: NaiveDate) -> Self {
        DayKey(date.format("%Y-%m-%d").to_string())
    }

    /// Today's key in the local timezone.
    pub fn today() -> Self {
        Self::from_date(Local::now().date_naive())
    }

    pub fn parse(s: &str) -> crate::Result<Self> {
        NaiveDate::parse_from_str(s, "%Y-%m-%d")
            .map(Self::from_date)
            .map_err(|_| crate::DeckError::InvalidDayKey(s.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DayKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for DayKey {
    type Err = crate::DeckError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DayKey::parse(s)
    }
}

// ---------------------------------------------------------------------------
// ReshuffleMode
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReshuffleMode {
    /// Shuffle every live item and restart the cycle.
    Full,
    /// Keep the visited head (up to and including the cursor) and shuffle
    /// only the unvisited tail.
    PartialTail,
}

impl ReshuffleMode {
    pub fn as_str(self) -> &'static str {
        match self {
            ReshuffleMode::Full => "full",
            ReshuffleMode::PartialTail => "partial_tail",
        }
    }
}

impl fmt::Display for ReshuffleMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
