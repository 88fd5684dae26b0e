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

//! The persistence contracts the scheduler depends on.

use crate::error::Fallible;
use crate::types::card::Card;
use crate::types::deck::Deck;
use crate::types::ids::CardId;
use crate::types::ids::ConfigId;
use crate::types::ids::DeckId;
use crate::types::ids::NoteId;
use crate::types::queue::Queue;
use crate::types::review_log::ReviewLogEntry;

/// A card as it sits in an in-memory queue.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct QueuedCard {
    pub id: CardId,
    pub note_id: NoteId,
    pub due: i64,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum CardOrder {
    /// Storage order.
    Unordered,
    DueAscending,
    IntervalDescending,
    IntervalAscending,
}

/// A filter over the cards of a set of decks.
#[derive(Clone, Copy, Debug)]
pub struct CardQuery<'a> {
    pub decks: &'a [DeckId],
    pub queue: Queue,
    /// Only cards whose `due` is strictly below this bound.
    pub due_before: Option<i64>,
    pub order: CardOrder,
    pub limit: i64,
}

pub trait CardStore {
    fn card(&self, id: CardId) -> Fallible<Card>;

    fn queued_cards(&self, query: &CardQuery) -> Fallible<Vec<QueuedCard>>;

    /// How many cards match, counting no further than the query's limit.
    fn count_cards(&self, query: &CardQuery) -> Fallible<i64>;

    /// The total learning steps left across the learning cards of the given
    /// decks that are due before `cutoff`, over at most `limit` cards.
    fn learning_steps_left(&self, decks: &[DeckId], cutoff: i64, limit: i64) -> Fallible<i64>;

    /// The due days of the review cards sharing a note with `card`, other
    /// than `card` itself.
    fn sibling_review_dues(&self, card: &Card) -> Fallible<Vec<i64>>;

    /// Every card of a note.
    fn note_cards(&self, note: NoteId) -> Fallible<Vec<CardId>>;

    fn update_card(&self, card: &Card) -> Fallible<()>;

    /// Return relearning cards among `ids` to the review queue at their
    /// stashed due.
    fn cancel_relearning(&self, ids: &[CardId], modified: i64, usn: i64) -> Fallible<()>;

    fn suspend_cards(&self, ids: &[CardId], modified: i64, usn: i64) -> Fallible<()>;

    /// Move suspended cards among `ids` back to the queue matching their type.
    fn unsuspend_cards(&self, ids: &[CardId], modified: i64, usn: i64) -> Fallible<()>;

    /// Bury every answerable card of `note` until the session closes.
    fn bury_note(&self, note: NoteId, modified: i64, usn: i64) -> Fallible<()>;

    /// Set the answerable cards among `ids` aside until the session closes.
    fn bury_cards(&self, ids: &[CardId], modified: i64, usn: i64) -> Fallible<()>;

    /// Move every buried card back to the queue matching its type.
    fn unbury_all(&self, modified: i64, usn: i64) -> Fallible<()>;
}

pub trait DeckStore {
    fn deck(&self, id: DeckId) -> Fallible<Deck>;

    /// The existing ancestors of `deck`, root first.
    fn parents(&self, deck: &Deck) -> Fallible<Vec<Deck>>;

    /// Every deck beneath `deck`, ordered by name.
    fn children(&self, deck: &Deck) -> Fallible<Vec<Deck>>;

    /// Every deck, ordered by name.
    fn all_decks(&self) -> Fallible<Vec<Deck>>;

    fn selected_deck(&self) -> Fallible<DeckId>;

    /// The selected deck followed by its descendants.
    fn active_decks(&self) -> Fallible<Vec<Deck>> {
        let selected = self.deck(self.selected_deck()?)?;
        let mut decks = self.children(&selected)?;
        decks.insert(0, selected);
        Ok(decks)
    }

    /// The stored configuration document with the given id.
    fn deck_config(&self, id: ConfigId) -> Fallible<String>;

    /// Persist the deck's counters.
    fn save_deck(&self, deck: &Deck) -> Fallible<()>;
}

pub trait NoteStore {
    fn add_tag(&self, note: NoteId, tag: &str, modified: i64, usn: i64) -> Fallible<()>;
}

pub trait ReviewLogStore {
    /// Append an entry. Fails with `ErrorReport::LogIdConflict` if the id is
    /// already taken.
    fn append_review(&self, entry: &ReviewLogEntry) -> Fallible<()>;
}

pub trait Store: CardStore + DeckStore + NoteStore + ReviewLogStore {
    /// Unix timestamp of the collection's creation, which anchors day indices.
    fn collection_created(&self) -> Fallible<i64>;

    /// The sync sequence number stamped on modifications.
    fn usn(&self) -> Fallible<i64>;

    /// Run `f` as one unit of work: either everything it writes is kept, or,
    /// if it fails, nothing is.
    fn atomically<T>(&self, f: impl FnOnce() -> Fallible<T>) -> Fallible<T>;
}
