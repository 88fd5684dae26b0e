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

use thiserror::Error;

use crate::types::ids::DeckId;

#[derive(Debug, Error)]
pub enum ErrorReport {
    /// A deck configuration field is missing or out of range.
    #[error("error: deck {deck}: invalid configuration field `{field}`: {reason}")]
    Config {
        deck: DeckId,
        field: String,
        reason: String,
    },
    /// The caller asked for a transition the card's state does not allow.
    #[error("error: invalid state: {0}")]
    InvalidState(String),
    /// A review log entry with this id already exists.
    #[error("error: review log id {id} is already taken")]
    LogIdConflict { id: i64 },
    /// The review log append kept conflicting until the retry budget ran out.
    #[error("error: could not append to the review log after {attempts} attempts")]
    StorageConflict { attempts: u32 },
    #[error("error: storage: {0}")]
    Storage(#[from] rusqlite::Error),
    #[error("error: {0}")]
    Io(#[from] std::io::Error),
    #[error("error: invalid settings: {0}")]
    Settings(#[from] toml::de::Error),
    #[error("error: {0}")]
    Message(String),
}

impl ErrorReport {
    pub fn new(message: impl Into<String>) -> Self {
        Self::Message(message.into())
    }

    pub fn config(deck: DeckId, field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Config {
            deck,
            field: field.into(),
            reason: reason.into(),
        }
    }

    pub fn invalid_state(message: impl Into<String>) -> Self {
        Self::InvalidState(message.into())
    }
}

pub type Fallible<T> = Result<T, ErrorReport>;

pub fn fail<T>(message: impl Into<String>) -> Fallible<T> {
    Err(ErrorReport::new(message))
}
