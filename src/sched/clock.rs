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

//! Wall-clock time, day indices, and the daily rollover.

use std::cell::Cell;
use std::collections::HashSet;
use std::thread::sleep;
use std::time::Duration;

use crate::error::Fallible;
use crate::sched::Scheduler;
use crate::sched::state::SessionState;
use crate::store::Store;
use crate::types::timestamp::SECONDS_PER_DAY;
use crate::types::timestamp::Timestamp;

pub trait Clock {
    fn now(&self) -> Timestamp;

    /// Wait before retrying a write.
    fn pause(&self, duration: Duration);
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        Timestamp::now()
    }

    fn pause(&self, duration: Duration) {
        sleep(duration);
    }
}

/// A clock that only moves when told to. Pausing does not advance it.
pub struct ManualClock {
    now: Cell<Timestamp>,
}

impl ManualClock {
    pub fn new(now: Timestamp) -> Self {
        Self {
            now: Cell::new(now),
        }
    }

    pub fn set(&self, now: Timestamp) {
        self.now.set(now);
    }

    pub fn advance_secs(&self, secs: i64) {
        self.now.set(self.now.get().plus_millis(secs * 1000));
    }

    pub fn advance_millis(&self, millis: i64) {
        self.now.set(self.now.get().plus_millis(millis));
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        self.now.get()
    }

    fn pause(&self, _duration: Duration) {}
}

/// Whole days elapsed between the collection's creation and `now`.
pub fn day_index(created: i64, now: i64) -> i64 {
    (now - created).div_euclid(SECONDS_PER_DAY)
}

/// The Unix timestamp at which day `today` ends.
pub fn day_cutoff(created: i64, today: i64) -> i64 {
    created + (today + 1) * SECONDS_PER_DAY
}

impl<S: Store, C: Clock> Scheduler<'_, S, C> {
    /// Reset the session if the day has ended since it was last reset.
    /// Returns whether it had.
    pub fn check_rollover(&self, state: &mut SessionState) -> Fallible<bool> {
        if self.clock.now().as_secs() > state.day_cutoff {
            self.reset(state)?;
            return Ok(true);
        }
        Ok(false)
    }

    /// Recompute the day index and cutoff, and zero yesterday's counters on
    /// the active decks and on the ancestors of the selected deck.
    pub(crate) fn update_cutoff(&self, state: &mut SessionState) -> Fallible<()> {
        let created = self.store.collection_created()?;
        let today = day_index(created, self.clock.now().as_secs());
        if today != state.today {
            log::info!("Day {} began.", today);
        }
        state.today = today;
        state.day_cutoff = day_cutoff(created, today);

        let active = self.store.active_decks()?;
        let parents = match active.first() {
            Some(selected) => self.store.parents(selected)?,
            None => Vec::new(),
        };
        state.active = active.iter().map(|deck| deck.id).collect();

        let mut seen = HashSet::new();
        for mut deck in active.into_iter().chain(parents) {
            if seen.insert(deck.id) && deck.counters.roll(today) {
                log::debug!("Zeroed the counters of deck {}.", deck.name);
                self.store.save_deck(&deck)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::helper::CREATED_AT;
    use crate::helper::config_json;
    use crate::helper::create_test_collection;
    use crate::settings::Settings;
    use crate::store::DeckStore;
    use crate::types::deck::CounterKind;
    use crate::types::ids::ConfigId;
    use crate::types::ids::DeckId;

    #[test]
    fn test_day_index() {
        assert_eq!(day_index(1000, 1000), 0);
        assert_eq!(day_index(1000, 1000 + SECONDS_PER_DAY - 1), 0);
        assert_eq!(day_index(1000, 1000 + SECONDS_PER_DAY), 1);
        assert_eq!(day_cutoff(1000, 2), 1000 + 3 * SECONDS_PER_DAY);
    }

    #[test]
    fn test_manual_clock() -> Fallible<()> {
        let clock = ManualClock::new(Timestamp::from_secs(100)?);
        clock.advance_secs(5);
        clock.pause(Duration::from_secs(60));
        assert_eq!(clock.now().as_secs(), 105);
        clock.advance_millis(250);
        assert_eq!(clock.now().as_millis(), 105_250);
        Ok(())
    }

    #[test]
    fn test_counters_reset_once_per_day() -> Fallible<()> {
        let col = create_test_collection()?;
        let clock = ManualClock::new(Timestamp::from_secs(CREATED_AT + 3600)?);
        let sched = Scheduler::new(&col.db, &clock, Settings::default());
        let deck_id = DeckId::new(1);

        let mut deck = col.db.deck(deck_id)?;
        deck.counters.add(CounterKind::New, 7, 3);
        col.db.save_deck(&deck)?;

        let mut state = SessionState::seeded(1);
        assert!(sched.check_rollover(&mut state)?);
        assert_eq!(state.today(), 0);
        assert_eq!(col.db.deck(deck_id)?.counters.new.on(0), 0);

        // Work done today survives further polling within the day.
        let mut deck = col.db.deck(deck_id)?;
        deck.counters.add(CounterKind::New, 0, 2);
        col.db.save_deck(&deck)?;
        clock.advance_secs(3600);
        assert!(!sched.check_rollover(&mut state)?);
        assert!(!sched.check_rollover(&mut state)?);
        assert_eq!(col.db.deck(deck_id)?.counters.new.on(0), 2);

        clock.set(Timestamp::from_secs(state.day_cutoff() + 1)?);
        assert!(sched.check_rollover(&mut state)?);
        assert_eq!(state.today(), 1);
        let counters = col.db.deck(deck_id)?.counters;
        assert_eq!(counters.new.day, 1);
        assert_eq!(counters.new.count, 0);
        assert!(!sched.check_rollover(&mut state)?);
        Ok(())
    }

    #[test]
    fn test_rollover_resets_ancestors_of_selected_deck() -> Fallible<()> {
        let col = create_test_collection()?;
        let config = ConfigId::new(1);
        let parent = col.db.add_deck("Lang", config)?;
        let child = col.db.add_deck("Lang::French", config)?;
        col.db.select_deck(child)?;
        let mut deck = col.db.deck(parent)?;
        deck.counters.add(CounterKind::Review, -1, 9);
        col.db.save_deck(&deck)?;

        let clock = ManualClock::new(Timestamp::from_secs(CREATED_AT + 60)?);
        let sched = Scheduler::new(&col.db, &clock, Settings::default());
        let mut state = SessionState::seeded(1);
        sched.reset(&mut state)?;
        assert_eq!(state.active_decks(), &[child]);
        assert_eq!(col.db.deck(parent)?.counters.review.day, 0);
        Ok(())
    }

    #[test]
    fn test_rollover_rebuilds_queues() -> Fallible<()> {
        let col = create_test_collection()?;
        let mut config = config_json();
        config["rev"]["order"] = json!(1);
        let deck = col.deck_with_config("Spanish", 2, &config)?;
        let a = col.review_card(deck, 0, 30)?;
        col.review_card(deck, 0, 20)?;
        let c = col.review_card(deck, 1, 50)?;

        let clock = ManualClock::new(Timestamp::from_secs(CREATED_AT + 60)?);
        let sched = Scheduler::new(&col.db, &clock, Settings::default());
        let mut state = SessionState::seeded(1);
        sched.reset(&mut state)?;
        assert_eq!(sched.counts(&state, None).review, 2);

        let card = sched.get_card(&mut state)?.expect("a review is due");
        assert_eq!(card.id, a.id);
        assert_eq!(state.review_queue.len(), 1);

        // The leftover of yesterday's batch is dropped and refetched.
        clock.set(Timestamp::from_secs(state.day_cutoff() + 1)?);
        let card = sched.get_card(&mut state)?.expect("a review is due");
        assert_eq!(state.today(), 1);
        assert_eq!(card.id, c.id);
        assert_eq!(sched.counts(&state, None).review, 2);
        let card = sched.get_card(&mut state)?.expect("a review is due");
        assert_eq!(card.id, a.id);
        Ok(())
    }
}
