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

use std::collections::VecDeque;

use rand::SeedableRng;
use rand::rngs::StdRng;
use serde::Serialize;

use crate::store::QueuedCard;
use crate::types::ids::CardId;
use crate::types::ids::DeckId;
use crate::types::timestamp::Timestamp;

/// Cards left to study in the current session.
#[derive(Clone, Copy, PartialEq, Eq, Default, Debug, Serialize)]
pub struct Counts {
    pub new: i64,
    /// Learning steps rather than cards: a card with two steps left counts
    /// twice.
    pub learning: i64,
    pub review: i64,
}

/// The state of one study session. It belongs to the caller and is passed to
/// every scheduler operation; nothing in it is shared between sessions.
pub struct SessionState {
    pub(crate) today: i64,
    /// Unix timestamp at which `today` ends.
    pub(crate) day_cutoff: i64,
    pub(crate) active: Vec<DeckId>,
    pub(crate) new_queue: VecDeque<QueuedCard>,
    /// `(due, card)` pairs, sorted by due.
    pub(crate) learning_queue: VecDeque<(i64, CardId)>,
    pub(crate) review_queue: VecDeque<CardId>,
    /// Decks still to be drawn from, current deck first.
    pub(crate) new_decks: VecDeque<DeckId>,
    pub(crate) review_decks: VecDeque<DeckId>,
    pub(crate) counts: Counts,
    /// A new card is shown every this many answers. Zero when new cards are
    /// not being interleaved.
    pub(crate) new_card_modulus: i64,
    /// Answers given this session.
    pub(crate) reps: i64,
    pub(crate) rng: StdRng,
    /// The card last handed out, and when.
    pub(crate) timer: Option<(CardId, Timestamp)>,
}

impl SessionState {
    pub fn new() -> Self {
        Self::with_rng(StdRng::from_entropy())
    }

    /// A session whose learning-step jitter is reproducible.
    pub fn seeded(seed: u64) -> Self {
        Self::with_rng(StdRng::seed_from_u64(seed))
    }

    fn with_rng(rng: StdRng) -> Self {
        Self {
            today: 0,
            // Zero forces a rollover, and hence a full reset, on first use.
            day_cutoff: 0,
            active: Vec::new(),
            new_queue: VecDeque::new(),
            learning_queue: VecDeque::new(),
            review_queue: VecDeque::new(),
            new_decks: VecDeque::new(),
            review_decks: VecDeque::new(),
            counts: Counts::default(),
            new_card_modulus: 0,
            reps: 0,
            rng,
            timer: None,
        }
    }

    pub fn today(&self) -> i64 {
        self.today
    }

    pub fn day_cutoff(&self) -> i64 {
        self.day_cutoff
    }

    pub fn reps(&self) -> i64 {
        self.reps
    }

    pub fn active_decks(&self) -> &[DeckId] {
        &self.active
    }

    /// Drop every queued card. The queues refill lazily.
    pub(crate) fn clear_queues(&mut self) {
        self.new_queue.clear();
        self.learning_queue.clear();
        self.review_queue.clear();
    }

    /// Insert into the learning queue, after any card with the same due.
    pub(crate) fn sort_into_learning(&mut self, due: i64, id: CardId) {
        let index = self.learning_queue.partition_point(|(d, _)| *d <= due);
        self.learning_queue.insert(index, (due, id));
    }
}

impl Default for SessionState {
    fn default() -> Self {
        Self::new()
    }
}
