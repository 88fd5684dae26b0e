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

//! The scheduler: which card to study next, and what answering it does.

pub mod answer;
pub mod clock;
pub mod interval;
pub mod leech;
pub mod limits;
pub mod queues;
pub mod state;

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use serde::Serialize;

use crate::error::ErrorReport;
use crate::error::Fallible;
use crate::sched::clock::Clock;
use crate::sched::interval::lapse_interval;
use crate::sched::interval::next_review_interval;
use crate::sched::interval::step_delay_secs;
use crate::sched::limits::LimitKind;
use crate::sched::state::Counts;
use crate::sched::state::SessionState;
use crate::settings::Settings;
use crate::store::CardOrder;
use crate::store::CardQuery;
use crate::store::Store;
use crate::types::card::Card;
use crate::types::card_type::CardType;
use crate::types::deck::Deck;
use crate::types::deck_config::DeckConfig;
use crate::types::grade::Grade;
use crate::types::grade::LEARNING_GRADES;
use crate::types::grade::REVIEW_GRADES;
use crate::types::ids::CardId;
use crate::types::ids::ConfigId;
use crate::types::ids::DeckId;
use crate::types::ids::NoteId;
use crate::types::queue::Queue;
use crate::types::timestamp::SECONDS_PER_DAY;

pub struct Scheduler<'a, S: Store, C: Clock> {
    store: &'a S,
    clock: &'a C,
    settings: Settings,
    /// Parsed deck configurations, dropped on every reset.
    configs: RefCell<HashMap<ConfigId, Rc<DeckConfig>>>,
}

/// Remaining counts for a deck and everything beneath it.
#[derive(Clone, PartialEq, Eq, Debug, Serialize)]
pub struct DeckDue {
    pub deck_id: DeckId,
    pub name: String,
    pub new: i64,
    pub learning: i64,
    pub review: i64,
}

impl<'a, S: Store, C: Clock> Scheduler<'a, S, C> {
    pub fn new(store: &'a S, clock: &'a C, settings: Settings) -> Self {
        Self {
            store,
            clock,
            settings,
            configs: RefCell::new(HashMap::new()),
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Begin a study session on the selected deck.
    pub fn start_session(&self) -> Fallible<SessionState> {
        let mut state = SessionState::new();
        self.reset(&mut state)?;
        Ok(state)
    }

    /// Rebuild the session from the store: day, counts and queues.
    pub fn reset(&self, state: &mut SessionState) -> Fallible<()> {
        self.configs.borrow_mut().clear();
        state.clear_queues();
        self.update_cutoff(state)?;
        self.reset_learning(state)?;
        self.reset_review(state)?;
        self.reset_new(state)?;
        log::debug!(
            "Session reset: {} new, {} learning, {} review.",
            state.counts.new,
            state.counts.learning,
            state.counts.review
        );
        Ok(())
    }

    /// The next card to study, or `None` when the session is done. Starts
    /// the answer timer for the card.
    pub fn get_card(&self, state: &mut SessionState) -> Fallible<Option<Card>> {
        self.check_rollover(state)?;
        let card = self.next_card(state)?;
        self.update_new_card_ratio(state);
        state.timer = card.as_ref().map(|card| (card.id, self.clock.now()));
        Ok(card)
    }

    /// What is left to study. If `card` is the card being shown, it counts
    /// as not yet studied.
    pub fn counts(&self, state: &SessionState, card: Option<&Card>) -> Counts {
        let mut counts = state.counts;
        if let Some(card) = card {
            match card.queue {
                Queue::New => counts.new += 1,
                Queue::Learning => counts.learning += i64::from(card.left),
                Queue::Review => counts.review += 1,
                _ => {}
            }
        }
        counts
    }

    /// The answers a card accepts.
    pub fn grades_for(&self, card: &Card) -> &'static [Grade] {
        if card.queue == Queue::Review {
            &REVIEW_GRADES
        } else {
            &LEARNING_GRADES
        }
    }

    /// How long until the card would come back if answered with `grade`, in
    /// seconds. Nothing is changed. Graduation is previewed without the
    /// sibling adjustment.
    pub fn next_interval_secs(
        &self,
        state: &SessionState,
        card: &Card,
        grade: Grade,
    ) -> Fallible<i64> {
        let conf = self.config_for(&self.store.deck(card.deck_id)?)?;
        match card.queue {
            Queue::New | Queue::Learning => {
                if !grade.is_learning_grade() {
                    return Err(ErrorReport::invalid_state(format!(
                        "`{grade}` is not a valid answer for a learning card"
                    )));
                }
                let mut card = card.clone();
                if card.queue == Queue::New {
                    card.card_type = CardType::Learning;
                    card.left = conf.new.delays.len() as u32;
                }
                let steps = conf.steps_for(&card);
                let secs = match grade {
                    Grade::Fail => step_delay_secs(steps, steps.len() as u32),
                    Grade::Remove => graduating_interval(&card, &conf, true) * SECONDS_PER_DAY,
                    _ if card.left <= 1 => {
                        graduating_interval(&card, &conf, false) * SECONDS_PER_DAY
                    }
                    _ => step_delay_secs(steps, card.left - 1),
                };
                Ok(secs)
            }
            Queue::Review => {
                let delays = &conf.lapse.delays;
                let days = match grade {
                    Grade::Fail if !delays.is_empty() => {
                        return Ok(step_delay_secs(delays, delays.len() as u32));
                    }
                    Grade::Fail => lapse_interval(card.interval, conf.lapse.mult),
                    _ => next_review_interval(card, grade, state.today, &conf.rev)?,
                };
                Ok(days * SECONDS_PER_DAY)
            }
            other => Err(ErrorReport::invalid_state(format!(
                "card {} is in the {:?} queue and has no next interval",
                card.id, other
            ))),
        }
    }

    /// Drop a card from whichever in-memory queue holds it. Returns whether
    /// one did.
    pub fn remove_from_queues(&self, state: &mut SessionState, card: &Card) -> bool {
        let removed = remove_queued(state, card);
        if removed {
            self.update_new_card_ratio(state);
        }
        removed
    }

    /// Suspend cards until they are unsuspended. Relearning cards go back to
    /// their review due first.
    pub fn suspend_cards(&self, state: &mut SessionState, ids: &[CardId]) -> Fallible<()> {
        let (modified, usn) = self.stamp()?;
        self.store.atomically(|| {
            self.store.cancel_relearning(ids, modified, usn)?;
            self.store.suspend_cards(ids, modified, usn)
        })?;
        log::info!("Suspended {} cards.", ids.len());
        self.reset(state)
    }

    pub fn unsuspend_cards(&self, state: &mut SessionState, ids: &[CardId]) -> Fallible<()> {
        let (modified, usn) = self.stamp()?;
        self.store.unsuspend_cards(ids, modified, usn)?;
        self.reset(state)
    }

    /// Bury every card of a note until the session is closed.
    pub fn bury_note(&self, state: &mut SessionState, note: NoteId) -> Fallible<()> {
        let ids = self.store.note_cards(note)?;
        let (modified, usn) = self.stamp()?;
        self.store.atomically(|| {
            self.store.cancel_relearning(&ids, modified, usn)?;
            self.store.bury_note(note, modified, usn)
        })?;
        self.reset(state)
    }

    /// Set cards aside until the session is closed.
    pub fn bury_cards(&self, state: &mut SessionState, ids: &[CardId]) -> Fallible<()> {
        let (modified, usn) = self.stamp()?;
        self.store.atomically(|| {
            self.store.cancel_relearning(ids, modified, usn)?;
            self.store.bury_cards(ids, modified, usn)
        })?;
        self.reset(state)
    }

    /// End the session: buried cards return to their queues.
    pub fn on_close(&self) -> Fallible<()> {
        let (modified, usn) = self.stamp()?;
        self.store.unbury_all(modified, usn)
    }

    /// For every deck, the counts left for it and its descendants.
    pub fn deck_due_list(&self, state: &SessionState) -> Fallible<Vec<DeckDue>> {
        let mut list = Vec::new();
        for deck in self.store.all_decks()? {
            let mut tree = self.store.children(&deck)?;
            tree.insert(0, deck.clone());
            let ids: Vec<DeckId> = tree.iter().map(|d| d.id).collect();
            list.push(DeckDue {
                deck_id: deck.id,
                name: deck.name,
                new: self.count_within_limits(&tree, LimitKind::New, state.today)?,
                learning: self.store.learning_steps_left(
                    &ids,
                    state.day_cutoff,
                    self.settings.report_limit,
                )?,
                review: self.count_within_limits(&tree, LimitKind::Review, state.today)?,
            });
        }
        Ok(list)
    }

    /// Whether any review is due in the active decks, limits aside.
    pub fn reviews_waiting(&self, state: &SessionState) -> Fallible<bool> {
        let query = CardQuery {
            decks: &state.active,
            queue: Queue::Review,
            due_before: Some(state.today + 1),
            order: CardOrder::Unordered,
            limit: 1,
        };
        Ok(self.store.count_cards(&query)? > 0)
    }

    /// Whether any new card is left in the active decks, limits aside.
    pub fn new_waiting(&self, state: &SessionState) -> Fallible<bool> {
        let query = CardQuery {
            decks: &state.active,
            queue: Queue::New,
            due_before: None,
            order: CardOrder::Unordered,
            limit: 1,
        };
        Ok(self.store.count_cards(&query)? > 0)
    }

    /// The deck's configuration, parsed once per reset.
    pub(crate) fn config_for(&self, deck: &Deck) -> Fallible<Rc<DeckConfig>> {
        if let Some(conf) = self.configs.borrow().get(&deck.config_id) {
            return Ok(Rc::clone(conf));
        }
        let body = self.store.deck_config(deck.config_id)?;
        let conf = Rc::new(DeckConfig::parse(deck.config_id, deck.id, &body)?);
        self.configs
            .borrow_mut()
            .insert(deck.config_id, Rc::clone(&conf));
        Ok(conf)
    }

    fn stamp(&self) -> Fallible<(i64, i64)> {
        Ok((self.clock.now().as_secs(), self.store.usn()?))
    }
}

fn remove_queued(state: &mut SessionState, card: &Card) -> bool {
    if let Some(index) = state.new_queue.iter().position(|c| c.id == card.id) {
        state.new_queue.remove(index);
        state.counts.new = (state.counts.new - 1).max(0);
        return true;
    }
    if let Some(index) = state.learning_queue.iter().position(|(_, id)| *id == card.id) {
        state.learning_queue.remove(index);
        state.counts.learning = (state.counts.learning - i64::from(card.left)).max(0);
        return true;
    }
    if let Some(index) = state.review_queue.iter().position(|id| *id == card.id) {
        state.review_queue.remove(index);
        state.counts.review = (state.counts.review - 1).max(0);
        return true;
    }
    false
}

/// The interval a learning card would graduate with, before sibling
/// adjustment.
fn graduating_interval(card: &Card, conf: &DeckConfig, early: bool) -> i64 {
    if card.card_type == CardType::Review {
        card.interval
    } else if early {
        conf.new.early_interval
    } else {
        conf.new.graduating_interval
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
    use crate::settings::NewSpread;
    use crate::store::CardStore;
    use crate::store::DeckStore;
    use crate::types::timestamp::Timestamp;

    fn clock_at(offset: i64) -> Fallible<ManualClock> {
        Ok(ManualClock::new(Timestamp::from_secs(CREATED_AT + offset)?))
    }

    fn session<S: Store, C: Clock>(sched: &Scheduler<'_, S, C>) -> Fallible<SessionState> {
        let mut state = SessionState::seeded(3);
        sched.reset(&mut state)?;
        Ok(state)
    }

    fn due(list: &[DeckDue], name: &str) -> (i64, i64, i64) {
        list.iter()
            .find(|entry| entry.name == name)
            .map(|entry| (entry.new, entry.learning, entry.review))
            .unwrap_or((-1, -1, -1))
    }

    #[test]
    fn test_parent_limit_caps_child_reviews() -> Fallible<()> {
        let col = create_test_collection()?;
        let mut parent_config = config_json();
        parent_config["rev"]["perDay"] = json!(2);
        let parent_config = col.put_config(2, &parent_config)?;
        let child_config = col.put_config(3, &config_json())?;
        let lang = col.db.add_deck("Lang", parent_config)?;
        let french = col.db.add_deck("Lang::French", child_config)?;
        let german = col.db.add_deck("Lang::German", child_config)?;
        col.db.select_deck(lang)?;
        for deck in [french, french, german, german] {
            col.review_card(deck, 0, 10)?;
        }

        let clock = clock_at(60)?;
        let sched = Scheduler::new(&col.db, &clock, Settings::default());
        let mut state = session(&sched)?;
        assert_eq!(state.active_decks(), &[lang, french, german]);
        assert_eq!(state.counts.review, 2);

        let list = sched.deck_due_list(&state)?;
        assert_eq!(list.len(), 4);
        assert_eq!(due(&list, "Default"), (0, 0, 0));
        assert_eq!(due(&list, "Lang"), (0, 0, 2));
        assert_eq!(due(&list, "Lang::French"), (0, 0, 2));
        assert_eq!(due(&list, "Lang::German"), (0, 0, 2));

        for _ in 0..2 {
            let mut card = sched.get_card(&mut state)?.expect("a review is due");
            assert_eq!(card.deck_id, french);
            sched.answer(&mut state, &mut card, Grade::Good)?;
            clock.advance_secs(1);
        }
        assert!(sched.get_card(&mut state)?.is_none());
        assert_eq!(col.db.deck(lang)?.counters.review.on(0), 2);
        assert_eq!(col.db.deck(french)?.counters.review.on(0), 2);
        assert_eq!(col.db.deck(german)?.counters.review.on(0), 0);

        let list = sched.deck_due_list(&state)?;
        assert_eq!(due(&list, "Lang"), (0, 0, 0));
        assert_eq!(due(&list, "Lang::German"), (0, 0, 0));
        assert!(sched.reviews_waiting(&state)?);
        Ok(())
    }

    #[test]
    fn test_counts_include_shown_card() -> Fallible<()> {
        let col = create_test_collection()?;
        let deck = col.deck_with_config("Spanish", 2, &config_json())?;
        col.new_card(deck, 1)?;
        col.review_card(deck, 0, 10)?;
        let clock = clock_at(60)?;
        let sched = Scheduler::new(&col.db, &clock, Settings::default());
        let mut state = session(&sched)?;

        let card = sched.get_card(&mut state)?.expect("a card is due");
        assert_eq!(card.queue, Queue::Review);
        assert_eq!(sched.grades_for(&card), &REVIEW_GRADES);
        let expected = Counts {
            new: 1,
            learning: 0,
            review: 1,
        };
        assert_eq!(sched.counts(&state, Some(&card)), expected);
        assert_eq!(sched.counts(&state, None).review, 0);
        Ok(())
    }

    #[test]
    fn test_next_interval_preview() -> Fallible<()> {
        let col = create_test_collection()?;
        let deck = col.deck_with_config("Spanish", 2, &config_json())?;
        let new = col.new_card(deck, 1)?;
        let review = col.review_card(deck, 0, 10)?;
        let clock = clock_at(60)?;
        let sched = Scheduler::new(&col.db, &clock, Settings::default());
        let state = session(&sched)?;

        assert_eq!(sched.grades_for(&new), &LEARNING_GRADES);
        assert_eq!(sched.next_interval_secs(&state, &new, Grade::Fail)?, 60);
        assert_eq!(sched.next_interval_secs(&state, &new, Grade::Pass)?, 600);
        assert_eq!(
            sched.next_interval_secs(&state, &new, Grade::Remove)?,
            4 * SECONDS_PER_DAY
        );
        assert_eq!(
            sched.next_interval_secs(&state, &review, Grade::Good)?,
            25 * SECONDS_PER_DAY
        );
        assert_eq!(sched.next_interval_secs(&state, &review, Grade::Fail)?, 600);
        assert!(matches!(
            sched.next_interval_secs(&state, &new, Grade::Good),
            Err(ErrorReport::InvalidState(_))
        ));

        let mut last_step = new.clone();
        last_step.queue = Queue::Learning;
        last_step.card_type = CardType::Learning;
        last_step.left = 1;
        assert_eq!(
            sched.next_interval_secs(&state, &last_step, Grade::Pass)?,
            SECONDS_PER_DAY
        );

        assert_eq!(col.db.card(new.id)?, new);
        assert_eq!(col.db.card(review.id)?, review);
        Ok(())
    }

    #[test]
    fn test_remove_from_queues() -> Fallible<()> {
        let col = create_test_collection()?;
        let deck = col.deck_with_config("Spanish", 2, &config_json())?;
        let a = col.review_card(deck, 0, 10)?;
        let b = col.review_card(deck, 0, 10)?;
        let clock = clock_at(60)?;
        let sched = Scheduler::new(&col.db, &clock, Settings::default());
        let mut state = session(&sched)?;

        let shown = sched.get_card(&mut state)?.expect("a review is due");
        let other = if shown.id == a.id { b } else { a };
        assert_eq!(state.counts.review, 1);
        assert!(sched.remove_from_queues(&mut state, &other));
        assert_eq!(state.counts.review, 0);
        assert!(!sched.remove_from_queues(&mut state, &other));
        assert!(sched.get_card(&mut state)?.is_none());
        Ok(())
    }

    #[test]
    fn test_suspend_cancels_relearning() -> Fallible<()> {
        let col = create_test_collection()?;
        let deck = col.deck_with_config("Spanish", 2, &config_json())?;
        let mut card = col.review_card(deck, 0, 10)?;
        let clock = clock_at(60)?;
        let sched = Scheduler::new(&col.db, &clock, Settings::default());
        let mut state = session(&sched)?;

        sched.answer(&mut state, &mut card, Grade::Fail)?;
        assert!(card.is_relearning());
        assert_eq!(state.counts.learning, 1);

        sched.suspend_cards(&mut state, &[card.id])?;
        let stored = col.db.card(card.id)?;
        assert_eq!(stored.queue, Queue::Suspended);
        assert_eq!(stored.due, 6);
        assert_eq!(stored.stashed_due, 0);
        assert_eq!(stored.left, 0);
        assert_eq!(state.counts.learning, 0);

        sched.unsuspend_cards(&mut state, &[card.id])?;
        assert_eq!(col.db.card(card.id)?.queue, Queue::Review);
        assert!(sched.get_card(&mut state)?.is_none());
        Ok(())
    }

    #[test]
    fn test_buried_cards_return_on_close() -> Fallible<()> {
        let col = create_test_collection()?;
        let deck = col.deck_with_config("Spanish", 2, &config_json())?;
        let front = col.new_card(deck, 1)?;
        let back = col.card_of_note(front.note_id, deck, 2)?;
        let other = col.new_card(deck, 3)?;
        let clock = clock_at(60)?;
        let sched = Scheduler::new(&col.db, &clock, Settings::default());
        let mut state = session(&sched)?;
        assert_eq!(state.counts.new, 3);

        sched.bury_note(&mut state, front.note_id)?;
        assert_eq!(state.counts.new, 1);
        assert_eq!(col.db.card(back.id)?.queue, Queue::BuriedByUser);
        sched.bury_cards(&mut state, &[other.id])?;
        assert_eq!(state.counts.new, 0);
        assert_eq!(col.db.card(other.id)?.queue, Queue::BuriedBySchedule);
        assert!(!sched.new_waiting(&state)?);
        assert!(sched.get_card(&mut state)?.is_none());

        sched.on_close()?;
        for id in [front.id, back.id, other.id] {
            assert_eq!(col.db.card(id)?.queue, Queue::New);
        }
        assert!(sched.new_waiting(&state)?);
        Ok(())
    }

    #[test]
    fn test_waiting_probes_ignore_limits() -> Fallible<()> {
        let col = create_test_collection()?;
        let mut config = config_json();
        config["new"]["perDay"] = json!(0);
        config["rev"]["perDay"] = json!(0);
        let deck = col.deck_with_config("Spanish", 2, &config)?;
        col.new_card(deck, 1)?;
        col.review_card(deck, 0, 10)?;
        let clock = clock_at(60)?;
        let sched = Scheduler::new(&col.db, &clock, Settings::default());
        let mut state = session(&sched)?;

        assert_eq!(sched.counts(&state, None), Counts::default());
        assert!(sched.get_card(&mut state)?.is_none());
        assert!(sched.reviews_waiting(&state)?);
        assert!(sched.new_waiting(&state)?);
        Ok(())
    }

    #[test]
    fn test_reset_rereads_deck_config() -> Fallible<()> {
        let col = create_test_collection()?;
        let deck = col.deck_with_config("Spanish", 2, &config_json())?;
        col.new_card(deck, 1)?;
        let clock = clock_at(60)?;
        let sched = Scheduler::new(&col.db, &clock, Settings::default());
        let mut state = session(&sched)?;
        assert_eq!(state.counts.new, 1);

        let mut config = config_json();
        config["new"]["perDay"] = json!(0);
        col.put_config(2, &config)?;
        sched.reset(&mut state)?;
        assert_eq!(state.counts.new, 0);
        Ok(())
    }

    #[test]
    fn test_new_spread() -> Fallible<()> {
        let cases = [(NewSpread::First, Queue::New), (NewSpread::Last, Queue::Review)];
        for (spread, first_queue) in cases {
            let col = create_test_collection()?;
            let deck = col.deck_with_config("Spanish", 2, &config_json())?;
            col.new_card(deck, 1)?;
            col.review_card(deck, 0, 10)?;
            col.review_card(deck, 0, 10)?;
            let clock = clock_at(60)?;
            let settings = Settings {
                new_spread: spread,
                ..Settings::default()
            };
            let sched = Scheduler::new(&col.db, &clock, settings);
            let mut state = session(&sched)?;
            let card = sched.get_card(&mut state)?.expect("a card is due");
            assert_eq!(card.queue, first_queue);
        }
        Ok(())
    }

    #[test]
    fn test_due_learning_card_comes_first() -> Fallible<()> {
        let col = create_test_collection()?;
        let deck = col.deck_with_config("Spanish", 2, &config_json())?;
        let new = col.new_card(deck, 1)?;
        for _ in 0..3 {
            col.review_card(deck, 0, 10)?;
        }
        let clock = clock_at(60)?;
        let settings = Settings {
            new_spread: NewSpread::First,
            ..Settings::default()
        };
        let sched = Scheduler::new(&col.db, &clock, settings);
        let mut state = session(&sched)?;

        let mut card = sched.get_card(&mut state)?.expect("a card is due");
        assert_eq!(card.id, new.id);
        sched.answer(&mut state, &mut card, Grade::Pass)?;
        assert_eq!(card.queue, Queue::Learning);

        let mut card = sched.get_card(&mut state)?.expect("a review is due");
        assert_eq!(card.queue, Queue::Review);
        sched.answer(&mut state, &mut card, Grade::Good)?;

        clock.advance_secs(800);
        let card = sched.get_card(&mut state)?.expect("the learning card is due");
        assert_eq!(card.id, new.id);
        assert_eq!(sched.counts(&state, Some(&card)).learning, 1);
        Ok(())
    }

    #[test]
    fn test_new_siblings_are_separated() -> Fallible<()> {
        let col = create_test_collection()?;
        let deck = col.deck_with_config("Spanish", 2, &config_json())?;
        let front = col.new_card(deck, 1)?;
        let back = col.card_of_note(front.note_id, deck, 2)?;
        let other = col.new_card(deck, 3)?;
        let clock = clock_at(60)?;
        let settings = Settings {
            new_spread: NewSpread::First,
            ..Settings::default()
        };
        let sched = Scheduler::new(&col.db, &clock, settings);
        let mut state = session(&sched)?;

        let mut shown = Vec::new();
        for _ in 0..3 {
            let card = sched.get_card(&mut state)?.expect("a new card is left");
            shown.push(card.id);
        }
        assert_eq!(shown, vec![front.id, other.id, back.id]);
        Ok(())
    }
}
