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

use crate::types::card_type::CardType;
use crate::types::ids::CardId;
use crate::types::ids::DeckId;
use crate::types::ids::NoteId;
use crate::types::queue::Queue;

/// Initial ease factor of a card that has never graduated, in permille.
pub const DEFAULT_FACTOR: i64 = 2500;

/// A card's scheduling state.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Card {
    pub id: CardId,
    pub note_id: NoteId,
    pub deck_id: DeckId,
    pub queue: Queue,
    pub card_type: CardType,
    /// Position, timestamp or day index, depending on `queue`.
    pub due: i64,
    /// The current interval in days.
    pub interval: i64,
    /// The ease factor in permille.
    pub factor: i64,
    pub lapses: u32,
    /// Learning or relearning steps remaining.
    pub left: u32,
    pub last_interval: i64,
    /// The review day index saved while the card is relearning.
    pub stashed_due: i64,
    /// How many times the card has been answered.
    pub reps: u32,
    /// Unix timestamp of the last modification.
    pub modified: i64,
    /// Sync sequence number of the last modification.
    pub usn: i64,
}

impl Card {
    /// A card that has never been studied, at the given insertion position.
    pub fn new(id: CardId, note_id: NoteId, deck_id: DeckId, position: i64) -> Self {
        Self {
            id,
            note_id,
            deck_id,
            queue: Queue::New,
            card_type: CardType::New,
            due: position,
            interval: 0,
            factor: DEFAULT_FACTOR,
            lapses: 0,
            left: 0,
            last_interval: 0,
            stashed_due: 0,
            reps: 0,
            modified: 0,
            usn: 0,
        }
    }

    /// Whether the card lapsed and is going through its relearning steps.
    pub fn is_relearning(&self) -> bool {
        self.queue == Queue::Learning && self.card_type == CardType::Review
    }
}
