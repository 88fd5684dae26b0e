// Copyright 2025 Fernando Borretti
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use rusqlite::ToSql;
use rusqlite::types::FromSql;
use rusqlite::types::FromSqlError;
use rusqlite::types::FromSqlResult;
use rusqlite::types::ToSqlOutput;
use rusqlite::types::ValueRef;

use crate::error::ErrorReport;
use crate::error::fail;
use crate::types::ids::CardId;

/// What kind of answer a log entry records.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum ReviewKind {
    /// An answer to a card in its initial learning steps.
    Learn,
    Review,
    /// An answer to a lapsed card in its relearning steps.
    Relearn,
    /// A failed review.
    Lapse,
}

impl ReviewKind {
    pub fn as_i64(self) -> i64 {
        match self {
            ReviewKind::Learn => 0,
            ReviewKind::Review => 1,
            ReviewKind::Relearn => 2,
            ReviewKind::Lapse => 3,
        }
    }
}

impl TryFrom<i64> for ReviewKind {
    type Error = ErrorReport;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(ReviewKind::Learn),
            1 => Ok(ReviewKind::Review),
            2 => Ok(ReviewKind::Relearn),
            3 => Ok(ReviewKind::Lapse),
            _ => fail(format!("Invalid review kind: {}", value)),
        }
    }
}

impl ToSql for ReviewKind {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_i64()))
    }
}

impl FromSql for ReviewKind {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let value: i64 = FromSql::column_result(value)?;
        ReviewKind::try_from(value).map_err(|e| FromSqlError::Other(Box::new(e)))
    }
}

/// One row of the append-only review log.
///
/// Intervals follow the sign convention of the log: positive values are days,
/// negative values are seconds (for learning steps).
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct ReviewLogEntry {
    /// Millisecond timestamp of the answer. Unique across the log.
    pub id: i64,
    pub card_id: CardId,
    pub usn: i64,
    pub ease: i64,
    pub interval: i64,
    pub last_interval: i64,
    pub factor: i64,
    /// Milliseconds spent on the answer, capped by the deck's `maxTaken`.
    pub time_taken: i64,
    pub kind: ReviewKind,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_values() {
        assert_eq!(ReviewKind::Lapse.as_i64(), 3);
        assert_eq!(ReviewKind::try_from(2).ok(), Some(ReviewKind::Relearn));
        assert!(ReviewKind::try_from(4).is_err());
    }
}
