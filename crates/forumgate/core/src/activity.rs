// Forumgate
// Copyright (C) 2025 Synerthink

// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.

// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU Affero General Public License for more details.

// You should have received a copy of the GNU Affero General Public License
// along with this program.  If not, see <http://www.gnu.org/licenses/>.

//! Last-activity filtering for forum topics
//!
//! A topic's last activity is the greater of its creation time and its last
//! comment time. Filters compare that value in-process against absolute
//! timestamps or offsets from a supplied "now".

use crate::error::{GatewayError, GatewayResult};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Timestamps of a topic as fetched from storage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopicActivity {
    pub created: DateTime<Utc>,
    pub last_comment: Option<DateTime<Utc>>,
}

impl TopicActivity {
    pub fn last_activity(&self) -> DateTime<Utc> {
        last_activity(self.created, self.last_comment)
    }
}

/// The greater of the two timestamps; a topic without comments uses its creation time
pub fn last_activity(created: DateTime<Utc>, last_comment: Option<DateTime<Utc>>) -> DateTime<Utc> {
    last_comment.map_or(created, |comment| comment.max(created))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operator {
    Lt,
    Le,
    Eq,
    Ne,
    Ge,
    Gt,
    Between,
    NotBetween,
}

impl FromStr for Operator {
    type Err = GatewayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "<" => Ok(Operator::Lt),
            "<=" => Ok(Operator::Le),
            "=" => Ok(Operator::Eq),
            "!=" => Ok(Operator::Ne),
            ">=" => Ok(Operator::Ge),
            ">" => Ok(Operator::Gt),
            "between" => Ok(Operator::Between),
            "not between" => Ok(Operator::NotBetween),
            other => Err(GatewayError::validation(format!("unknown operator: {other:?}"))),
        }
    }
}

/// A point in time, absolute or relative to "now"
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FilterValue {
    Absolute(DateTime<Utc>),
    /// Seconds from now; negative is in the past
    Offset(i64),
}

impl FilterValue {
    /// The instant this value names relative to `now`; offsets leaving the representable range are rejected
    pub fn at(&self, now: DateTime<Utc>) -> GatewayResult<DateTime<Utc>> {
        match self {
            FilterValue::Absolute(at) => Ok(*at),
            FilterValue::Offset(seconds) => offset_delta(*seconds)
                .and_then(|delta| now.checked_add_signed(delta))
                .ok_or_else(|| GatewayError::validation(format!("time offset of {seconds}s is out of range"))),
        }
    }
}

impl FromStr for FilterValue {
    type Err = GatewayError;

    /// RFC 3339 timestamps, or offsets such as `-1 day` and `+3 hours`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if let Ok(at) = DateTime::parse_from_rfc3339(s) {
            return Ok(FilterValue::Absolute(at.with_timezone(&Utc)));
        }

        let malformed = || GatewayError::validation(format!("malformed time value: {s:?}"));
        let (amount, unit) = s.split_once(' ').ok_or_else(malformed)?;
        let amount: i64 = amount.trim_start_matches('+').parse().map_err(|_| malformed())?;
        let unit_seconds = match unit.trim().trim_end_matches('s') {
            "second" | "sec" => 1,
            "minute" | "min" => 60,
            "hour" => 3_600,
            "day" => 86_400,
            "week" => 604_800,
            _ => return Err(malformed()),
        };
        let seconds = amount
            .checked_mul(unit_seconds)
            .filter(|seconds| offset_delta(*seconds).is_some())
            .ok_or_else(|| GatewayError::validation(format!("time offset out of range: {s:?}")))?;
        Ok(FilterValue::Offset(seconds))
    }
}

fn offset_delta(seconds: i64) -> Option<Duration> {
    Duration::try_seconds(seconds)
}

/// Comparison of a topic's last activity against one value or a range
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityFilter {
    pub operator: Operator,
    pub value: Option<FilterValue>,
    pub min: Option<FilterValue>,
    pub max: Option<FilterValue>,
}

impl ActivityFilter {
    pub fn compare(operator: Operator, value: FilterValue) -> Self {
        Self {
            operator,
            value: Some(value),
            min: None,
            max: None,
        }
    }

    pub fn range(operator: Operator, min: FilterValue, max: FilterValue) -> Self {
        Self {
            operator,
            value: None,
            min: Some(min),
            max: Some(max),
        }
    }

    pub fn matches(&self, topic: &TopicActivity, now: DateTime<Utc>) -> GatewayResult<bool> {
        let activity = topic.last_activity();
        match self.operator {
            Operator::Between | Operator::NotBetween => {
                let (min, max) = match (self.min, self.max) {
                    (Some(min), Some(max)) => (min.at(now)?, max.at(now)?),
                    _ => return Err(GatewayError::validation("range filter needs both min and max")),
                };
                let inside = activity >= min && activity <= max;
                Ok(if self.operator == Operator::Between { inside } else { !inside })
            }
            operator => {
                let value = self.value.ok_or_else(|| GatewayError::validation("comparison filter needs a value"))?.at(now)?;
                Ok(match operator {
                    Operator::Lt => activity < value,
                    Operator::Le => activity <= value,
                    Operator::Eq => activity == value,
                    Operator::Ne => activity != value,
                    Operator::Ge => activity >= value,
                    _ => activity > value,
                })
            }
        }
    }

    /// Topics passing the filter, in input order
    pub fn apply<'a>(&self, topics: &'a [TopicActivity], now: DateTime<Utc>) -> GatewayResult<Vec<&'a TopicActivity>> {
        let mut kept = Vec::new();
        for topic in topics {
            if self.matches(topic, now)? {
                kept.push(topic);
            }
        }
        Ok(kept)
    }
}
