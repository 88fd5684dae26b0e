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
use crate::types::card_type::CardType;

/// The queue a card sits in. The meaning of a card's `due` depends on it.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Queue {
    /// `due` is an insertion position.
    New,
    /// `due` is a Unix timestamp in seconds.
    Learning,
    /// `due` is a day index.
    Review,
    Suspended,
    /// Buried by the user for the rest of the session.
    BuriedByUser,
    /// Temporarily suspended by the scheduler for the rest of the session.
    BuriedBySchedule,
}

impl Queue {
    pub fn as_i64(self) -> i64 {
        match self {
            Queue::New => 0,
            Queue::Learning => 1,
            Queue::Review => 2,
            Queue::Suspended => -1,
            Queue::BuriedByUser => -2,
            Queue::BuriedBySchedule => -3,
        }
    }

    /// The queue a card returns to when it is unsuspended or unburied.
    pub fn restored(card_type: CardType) -> Self {
        match card_type {
            CardType::New => Queue::New,
            CardType::Learning => Queue::Learning,
            CardType::Review => Queue::Review,
        }
    }

    pub fn is_answerable(self) -> bool {
        matches!(self, Queue::New | Queue::Learning | Queue::Review)
    }
}

impl TryFrom<i64> for Queue {
    type Error = ErrorReport;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Queue::New),
            1 => Ok(Queue::Learning),
            2 => Ok(Queue::Review),
            -1 => Ok(Queue::Suspended),
            -2 => Ok(Queue::BuriedByUser),
            -3 => Ok(Queue::BuriedBySchedule),
            _ => fail(format!("Invalid queue: {}", value)),
        }
    }
}

impl ToSql for Queue {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_i64()))
    }
}

impl FromSql for Queue {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let value: i64 = FromSql::column_result(value)?;
        Queue::try_from(value).map_err(|e| FromSqlError::Other(Box::new(e)))
    }
}
