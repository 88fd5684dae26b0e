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

//! The new, learning and review queues, and the order they are drawn from.

use std::collections::VecDeque;

use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;

use crate::error::Fallible;
use crate::sched::Scheduler;
use crate::sched::clock::Clock;
use crate::sched::limits::LimitKind;
use crate::sched::state::SessionState;
use crate::settings::NewSpread;
use crate::store::CardOrder;
use crate::store::CardQuery;
use crate::store::QueuedCard;
use crate::store::Store;
use crate::types::card::Card;
use crate::types::deck::Deck;
use crate::types::deck_config::ReviewOrder;
use crate::types::ids::CardId;
use crate::types::queue::Queue;

impl<S: Store, C: Clock> Scheduler<'_, S, C> {
    /// The next card to study, or `None` if the session is done.
    pub(crate) fn next_card(&self, state: &mut SessionState) -> Fallible<Option<Card>> {
        if let Some(card) = self.pop_learning(state, false)? {
            return Ok(Some(card));
        }
        if self.time_for_new_card(state) {
            if let Some(id) = self.pop_new(state)? {
                return Ok(Some(self.store.card(id)?));
            }
        }
        if let Some(id) = self.pop_review(state)? {
            return Ok(Some(self.store.card(id)?));
        }
        if let Some(id) = self.pop_new(state)? {
            return Ok(Some(self.store.card(id)?));
        }
        // Rather than end the session, show a learning card that is almost due.
        self.pop_learning(state, true)
    }

    fn active(&self, state: &SessionState) -> Fallible<Vec<Deck>> {
        state
            .active
            .iter()
            .map(|id| self.store.deck(*id))
            .collect()
    }

    pub(crate) fn reset_learning(&self, state: &mut SessionState) -> Fallible<()> {
        state.counts.learning = self.store.learning_steps_left(
            &state.active,
            state.day_cutoff,
            self.settings.report_limit,
        )?;
        state.learning_queue.clear();
        Ok(())
    }

    pub(crate) fn reset_review(&self, state: &mut SessionState) -> Fallible<()> {
        let decks = self.active(state)?;
        state.counts.review = self.count_within_limits(&decks, LimitKind::Review, state.today)?;
        state.review_queue.clear();
        state.review_decks = state.active.iter().copied().collect();
        Ok(())
    }

    pub(crate) fn reset_new(&self, state: &mut SessionState) -> Fallible<()> {
        let decks = self.active(state)?;
        state.counts.new = self.count_within_limits(&decks, LimitKind::New, state.today)?;
        state.new_queue.clear();
        state.new_decks = state.active.iter().copied().collect();
        self.update_new_card_ratio(state);
        Ok(())
    }

    fn fill_learning(&self, state: &mut SessionState) -> Fallible<bool> {
        if state.counts.learning <= 0 {
            return Ok(false);
        }
        if !state.learning_queue.is_empty() {
            return Ok(true);
        }
        let query = CardQuery {
            decks: &state.active,
            queue: Queue::Learning,
            due_before: Some(state.day_cutoff),
            order: CardOrder::DueAscending,
            limit: self.settings.report_limit,
        };
        let cards = self.store.queued_cards(&query)?;
        log::debug!("Filled the learning queue with {} cards.", cards.len());
        state.learning_queue = cards.iter().map(|card| (card.due, card.id)).collect();
        Ok(!state.learning_queue.is_empty())
    }

    /// Take the head of the learning queue if it is due. In collapse mode a
    /// card due within the collapse window also counts as due.
    fn pop_learning(&self, state: &mut SessionState, collapse: bool) -> Fallible<Option<Card>> {
        if !self.fill_learning(state)? {
            return Ok(None);
        }
        let mut cutoff = self.clock.now().as_secs();
        if collapse {
            cutoff += self.settings.collapse_secs;
        }
        match state.learning_queue.front().copied() {
            Some((due, id)) if due <= cutoff => {
                state.learning_queue.pop_front();
                let card = self.store.card(id)?;
                state.counts.learning = (state.counts.learning - i64::from(card.left)).max(0);
                Ok(Some(card))
            }
            _ => Ok(None),
        }
    }

    fn fill_new(&self, state: &mut SessionState) -> Fallible<bool> {
        if !state.new_queue.is_empty() {
            return Ok(true);
        }
        if state.counts.new <= 0 {
            return Ok(false);
        }
        while let Some(&deck_id) = state.new_decks.front() {
            let deck = self.store.deck(deck_id)?;
            let limit = self
                .settings
                .queue_limit
                .min(self.path_limit(&deck, LimitKind::New, state.today)?);
            if limit > 0 {
                let decks = [deck_id];
                let query = CardQuery {
                    decks: &decks,
                    queue: Queue::New,
                    due_before: None,
                    order: CardOrder::DueAscending,
                    limit,
                };
                let cards = self.store.queued_cards(&query)?;
                if !cards.is_empty() {
                    log::debug!(
                        "Filled the new queue with {} cards from {}.",
                        cards.len(),
                        deck.name
                    );
                    state.new_queue = cards.into();
                    return Ok(true);
                }
            }
            state.new_decks.pop_front();
        }
        Ok(false)
    }

    fn pop_new(&self, state: &mut SessionState) -> Fallible<Option<CardId>> {
        if !self.fill_new(state)? {
            return Ok(None);
        }
        let Some(head) = state.new_queue.pop_front() else {
            return Ok(None);
        };
        if let Some(&deck_id) = state.new_decks.front() {
            let conf = self.config_for(&self.store.deck(deck_id)?)?;
            if conf.new.separate {
                separate_siblings(&mut state.new_queue, head);
            }
        }
        state.counts.new = (state.counts.new - 1).max(0);
        Ok(Some(head.id))
    }

    fn fill_review(&self, state: &mut SessionState) -> Fallible<bool> {
        if !state.review_queue.is_empty() {
            return Ok(true);
        }
        if state.counts.review <= 0 {
            return Ok(false);
        }
        while let Some(&deck_id) = state.review_decks.front() {
            let deck = self.store.deck(deck_id)?;
            let limit = self
                .settings
                .queue_limit
                .min(self.path_limit(&deck, LimitKind::Review, state.today)?);
            if limit > 0 {
                let conf = self.config_for(&deck)?;
                let order = match conf.rev.order {
                    ReviewOrder::Due => CardOrder::DueAscending,
                    ReviewOrder::OldFirst => CardOrder::IntervalDescending,
                    ReviewOrder::NewFirst => CardOrder::IntervalAscending,
                };
                let decks = [deck_id];
                let query = CardQuery {
                    decks: &decks,
                    queue: Queue::Review,
                    due_before: Some(state.today + 1),
                    order,
                    limit,
                };
                let mut ids: Vec<CardId> = self
                    .store
                    .queued_cards(&query)?
                    .iter()
                    .map(|card| card.id)
                    .collect();
                if !ids.is_empty() {
                    if conf.rev.order == ReviewOrder::Due {
                        // Same order all day, a different one tomorrow.
                        let mut rng = StdRng::seed_from_u64(state.today as u64);
                        ids.shuffle(&mut rng);
                    }
                    log::debug!(
                        "Filled the review queue with {} cards from {}.",
                        ids.len(),
                        deck.name
                    );
                    state.review_queue = ids.into();
                    return Ok(true);
                }
            }
            state.review_decks.pop_front();
        }
        Ok(false)
    }

    fn pop_review(&self, state: &mut SessionState) -> Fallible<Option<CardId>> {
        if !self.fill_review(state)? {
            return Ok(None);
        }
        let id = state.review_queue.pop_front();
        if id.is_some() {
            state.counts.review = (state.counts.review - 1).max(0);
        }
        Ok(id)
    }

    /// Whether the next card should be a new one, given how new cards are
    /// spread through the session.
    fn time_for_new_card(&self, state: &SessionState) -> bool {
        if state.counts.new <= 0 {
            return false;
        }
        match self.settings.new_spread {
            NewSpread::Last => false,
            NewSpread::First => true,
            NewSpread::Distribute => {
                let modulus = state.new_card_modulus;
                modulus != 0 && state.reps != 0 && state.reps % modulus == 0
            }
        }
    }

    /// Recompute how often a new card is shown. Called whenever the counts
    /// change: on reset, on every card handed out, and after every answer.
    pub(crate) fn update_new_card_ratio(&self, state: &mut SessionState) {
        let counts = state.counts;
        state.new_card_modulus = match self.settings.new_spread {
            NewSpread::Distribute if counts.new > 0 => {
                let modulus = (counts.new + counts.review) / counts.new;
                if counts.review > 0 { modulus.max(2) } else { modulus }
            }
            _ => 0,
        };
    }
}

/// After `head` is taken, move the cards of the same note to the back of the
/// queue, unless the queue holds nothing else.
fn separate_siblings(queue: &mut VecDeque<QueuedCard>, head: QueuedCard) {
    let mut remaining = queue.len();
    while queue
        .front()
        .is_some_and(|next| next.note_id == head.note_id)
    {
        if let Some(sibling) = queue.pop_front() {
            queue.push_back(sibling);
        }
        remaining -= 1;
        if remaining == 0 {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::helper::CREATED_AT;
    use crate::helper::config_json;
    use crate::helper::create_test_collection;
    use crate::sched::clock::ManualClock;
    use crate::settings::Settings;
    use crate::types::grade::Grade;
    use crate::types::ids::NoteId;
    use crate::types::timestamp::Timestamp;

    fn queued(id: i64, note: i64) -> QueuedCard {
        QueuedCard {
            id: CardId::new(id),
            note_id: NoteId::new(note),
            due: id,
        }
    }

    fn ids(queue: &VecDeque<QueuedCard>) -> Vec<i64> {
        queue.iter().map(|card| card.id.get()).collect()
    }

    #[test]
    fn test_siblings_rotate_to_the_back() {
        let mut queue: VecDeque<QueuedCard> =
            [queued(2, 1), queued(3, 1), queued(4, 2), queued(5, 3)].into();
        separate_siblings(&mut queue, queued(1, 1));
        assert_eq!(ids(&queue), vec![4, 5, 2, 3]);
    }

    #[test]
    fn test_single_note_is_not_rotated_forever() {
        let mut queue: VecDeque<QueuedCard> = [queued(2, 1), queued(3, 1)].into();
        separate_siblings(&mut queue, queued(1, 1));
        assert_eq!(ids(&queue), vec![2, 3]);
    }

    #[test]
    fn test_unrelated_head_leaves_queue_alone() {
        let mut queue: VecDeque<QueuedCard> = [queued(2, 2), queued(3, 1)].into();
        separate_siblings(&mut queue, queued(1, 1));
        assert_eq!(ids(&queue), vec![2, 3]);
    }

    /// Hand out cards until the session is done, without answering them.
    fn drain<S: Store, C: Clock>(
        sched: &Scheduler<'_, S, C>,
        state: &mut SessionState,
    ) -> Fallible<Vec<Card>> {
        let mut cards = Vec::new();
        while let Some(card) = sched.get_card(state)? {
            cards.push(card);
        }
        Ok(cards)
    }

    #[test]
    fn test_new_cards_are_distributed_among_reviews() -> Fallible<()> {
        let col = create_test_collection()?;
        let deck = col.deck_with_config("Spanish", 2, &config_json())?;
        for position in 1..=2 {
            col.new_card(deck, position)?;
        }
        for _ in 0..4 {
            col.review_card(deck, 0, 10)?;
        }
        let clock = ManualClock::new(Timestamp::from_secs(CREATED_AT + 60)?);
        let sched = Scheduler::new(&col.db, &clock, Settings::default());
        let mut state = SessionState::seeded(5);
        sched.reset(&mut state)?;
        // (2 new + 4 review) / 2 new.
        assert_eq!(state.new_card_modulus, 3);

        let mut shown = Vec::new();
        let mut moduli = Vec::new();
        for _ in 0..6 {
            let mut card = sched.get_card(&mut state)?.expect("a card is due");
            shown.push(card.queue);
            moduli.push(state.new_card_modulus);
            let grade = if card.queue == Queue::New {
                Grade::Pass
            } else {
                Grade::Good
            };
            sched.answer(&mut state, &mut card, grade)?;
            clock.advance_secs(1);
        }
        assert_eq!(
            shown,
            vec![
                Queue::Review,
                Queue::Review,
                Queue::New,
                Queue::New,
                Queue::Review,
                Queue::Review,
            ]
        );
        // Floored at 2 while reviews remain, zero once new cards run out.
        assert_eq!(moduli, vec![2, 2, 3, 0, 0, 0]);
        Ok(())
    }

    #[test]
    fn test_review_order_by_interval() -> Fallible<()> {
        for (order, expected) in [(1, vec![50, 20, 5]), (2, vec![5, 20, 50])] {
            let col = create_test_collection()?;
            let mut config = config_json();
            config["rev"]["order"] = json!(order);
            let deck = col.deck_with_config("Spanish", 2, &config)?;
            for interval in [5, 50, 20] {
                col.review_card(deck, 0, interval)?;
            }
            let clock = ManualClock::new(Timestamp::from_secs(CREATED_AT + 60)?);
            let sched = Scheduler::new(&col.db, &clock, Settings::default());
            let mut state = SessionState::seeded(5);
            sched.reset(&mut state)?;

            let intervals: Vec<i64> = drain(&sched, &mut state)?
                .iter()
                .map(|card| card.interval)
                .collect();
            assert_eq!(intervals, expected);
        }
        Ok(())
    }

    #[test]
    fn test_due_order_is_stable_within_a_day() -> Fallible<()> {
        let col = create_test_collection()?;
        let deck = col.deck_with_config("Spanish", 2, &config_json())?;
        let mut ids = Vec::new();
        for _ in 0..6 {
            ids.push(col.review_card(deck, 0, 10)?.id);
        }
        let clock = ManualClock::new(Timestamp::from_secs(CREATED_AT + 60)?);
        let sched = Scheduler::new(&col.db, &clock, Settings::default());
        let mut state = SessionState::seeded(5);
        sched.reset(&mut state)?;

        let first: Vec<CardId> = drain(&sched, &mut state)?.iter().map(|c| c.id).collect();
        clock.advance_secs(3600);
        sched.reset(&mut state)?;
        let second: Vec<CardId> = drain(&sched, &mut state)?.iter().map(|c| c.id).collect();
        assert_eq!(first, second);

        let mut sorted = first.clone();
        sorted.sort();
        assert_eq!(sorted, ids);
        Ok(())
    }
}
