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

//! Answering a card: the state transition, the review log, and the daily
//! counters, committed together.

use std::time::Duration;

use crate::error::ErrorReport;
use crate::error::Fallible;
use crate::sched::Scheduler;
use crate::sched::clock::Clock;
use crate::sched::interval::jitter;
use crate::sched::interval::lapse_factor;
use crate::sched::interval::lapse_interval;
use crate::sched::interval::minimum_interval;
use crate::sched::interval::next_factor;
use crate::sched::interval::next_review_interval;
use crate::sched::interval::step_delay_secs;
use crate::sched::leech::LEECH_TAG;
use crate::sched::leech::is_leech;
use crate::sched::leech::suspend_leech;
use crate::sched::state::SessionState;
use crate::store::Store;
use crate::types::card::Card;
use crate::types::card_type::CardType;
use crate::types::deck::CounterKind;
use crate::types::deck_config::DeckConfig;
use crate::types::deck_config::LeechAction;
use crate::types::grade::Grade;
use crate::types::queue::Queue;
use crate::types::review_log::ReviewKind;
use crate::types::review_log::ReviewLogEntry;
use crate::types::timestamp::Timestamp;

/// Backoff step between attempts to append to the review log.
const LOG_RETRY_PAUSE_MS: u64 = 10;

/// What an answer did, beyond the changes to the card itself.
struct Transition {
    kind: ReviewKind,
    /// The interval to log: days, or negative seconds for a learning step.
    interval: i64,
    last_interval: i64,
    /// Whether the card goes (back) into the learning queue.
    requeue: bool,
    leech: bool,
}

impl<S: Store, C: Clock> Scheduler<'_, S, C> {
    /// Answer a card with the given grade. On success `card` is updated to its
    /// new state, and the result says whether the answer made it a leech. On
    /// failure nothing is written and `card` is left alone.
    pub fn answer(
        &self,
        state: &mut SessionState,
        card: &mut Card,
        grade: Grade,
    ) -> Fallible<bool> {
        if !card.queue.is_answerable() {
            return Err(ErrorReport::invalid_state(format!(
                "card {} is in the {:?} queue and can't be answered",
                card.id, card.queue
            )));
        }
        let conf = self.config_for(&self.store.deck(card.deck_id)?)?;
        let now = self.clock.now();
        let today = state.today;

        let mut next = card.clone();
        let was_new = next.queue == Queue::New;
        if was_new {
            next.queue = Queue::Learning;
            next.card_type = CardType::Learning;
            next.left = conf.new.delays.len() as u32;
        }
        let learning = next.queue == Queue::Learning;
        let accepted = if learning {
            grade.is_learning_grade()
        } else {
            grade.is_review_grade()
        };
        if !accepted {
            return Err(ErrorReport::invalid_state(format!(
                "`{grade}` is not a valid answer for card {} in the {:?} queue",
                next.id, next.queue
            )));
        }

        let mut counters = Vec::new();
        if was_new {
            counters.push((CounterKind::New, 1));
        }
        let transition = if learning {
            if !was_new {
                counters.push((CounterKind::Learning, 1));
            }
            self.answer_learning(state, &mut next, grade, &conf, now)?
        } else {
            counters.push((CounterKind::Review, 1));
            self.answer_review(&mut next, grade, &conf, now, today)?
        };
        let time_taken = time_taken(state, &next, &conf, now);
        counters.push((CounterKind::Time, time_taken));

        next.reps += 1;
        next.modified = now.as_secs();
        next.usn = self.store.usn()?;
        let entry = ReviewLogEntry {
            id: 0,
            card_id: next.id,
            usn: next.usn,
            ease: grade.ease(),
            interval: transition.interval,
            last_interval: transition.last_interval,
            factor: next.factor,
            time_taken,
            kind: transition.kind,
        };
        self.commit(&next, entry, &counters, transition.leech, today)?;

        if state.timer.is_some_and(|(id, _)| id == next.id) {
            state.timer = None;
        }
        state.reps += 1;
        if transition.requeue {
            state.counts.learning += i64::from(next.left);
            state.sort_into_learning(next.due, next.id);
        }
        self.update_new_card_ratio(state);
        *card = next;
        Ok(transition.leech)
    }

    fn answer_learning(
        &self,
        state: &mut SessionState,
        card: &mut Card,
        grade: Grade,
        conf: &DeckConfig,
        now: Timestamp,
    ) -> Fallible<Transition> {
        let kind = if card.card_type == CardType::Review {
            ReviewKind::Relearn
        } else {
            ReviewKind::Learn
        };
        let steps = conf.steps_for(card);
        if steps.is_empty() {
            return Err(ErrorReport::config(
                card.deck_id,
                DeckConfig::steps_field_for(card),
                "a card is in the learning queue but there are no steps",
            ));
        }
        let last_interval = -step_delay_secs(steps, card.left);

        let graduate = match grade {
            Grade::Remove => Some(true),
            Grade::Pass if card.left <= 1 => Some(false),
            _ => None,
        };
        if let Some(early) = graduate {
            self.graduate(card, conf, early, state.today)?;
            return Ok(Transition {
                kind,
                interval: card.interval,
                last_interval,
                requeue: false,
                leech: false,
            });
        }

        card.left = if grade == Grade::Pass {
            card.left - 1
        } else {
            steps.len() as u32
        };
        let step = step_delay_secs(steps, card.left);
        let mut delay = step;
        if card.due < now.as_secs() {
            delay = jitter(delay, &mut state.rng);
        }
        card.due = now.as_secs() + delay;
        // With nothing else to study, don't show the same card twice in a row.
        if state.counts.new == 0 && state.counts.review == 0 {
            if let Some(&(head, _)) = state.learning_queue.front() {
                card.due = card.due.max(head + 1);
            }
        }
        Ok(Transition {
            kind,
            interval: -step,
            last_interval,
            requeue: true,
            leech: false,
        })
    }

    /// Move a card out of learning into the review queue.
    fn graduate(
        &self,
        card: &mut Card,
        conf: &DeckConfig,
        early: bool,
        today: i64,
    ) -> Fallible<()> {
        if card.card_type == CardType::Review {
            // Relearning keeps the interval set on lapsing.
            card.due = card.stashed_due;
            card.stashed_due = 0;
        } else {
            let ideal = if early {
                conf.new.early_interval
            } else {
                conf.new.graduating_interval
            };
            card.interval = self.away_from_siblings(card, ideal, 1, today, &conf.rev)?;
            card.due = today + card.interval;
            card.factor = conf.new.initial_factor;
        }
        card.queue = Queue::Review;
        card.card_type = CardType::Review;
        card.left = 0;
        log::debug!("Card {} graduated with an interval of {} days.", card.id, card.interval);
        Ok(())
    }

    fn answer_review(
        &self,
        card: &mut Card,
        grade: Grade,
        conf: &DeckConfig,
        now: Timestamp,
        today: i64,
    ) -> Fallible<Transition> {
        if grade != Grade::Fail {
            card.last_interval = card.interval;
            let ideal = next_review_interval(card, grade, today, &conf.rev)?;
            let floor = minimum_interval(card.interval, grade);
            card.interval = self.away_from_siblings(card, ideal, floor, today, &conf.rev)?;
            card.factor = next_factor(card.factor, grade);
            card.due = today + card.interval;
            return Ok(Transition {
                kind: ReviewKind::Review,
                interval: card.interval,
                last_interval: card.last_interval,
                requeue: false,
                leech: false,
            });
        }

        card.lapses += 1;
        card.last_interval = card.interval;
        card.interval = lapse_interval(card.interval, conf.lapse.mult);
        card.factor = lapse_factor(card.factor);
        card.due = today + card.interval;
        let relearn = !conf.lapse.delays.is_empty();
        if relearn {
            card.stashed_due = card.due;
            card.left = conf.lapse.delays.len() as u32;
            card.due = now.as_secs() + step_delay_secs(&conf.lapse.delays, card.left);
            card.queue = Queue::Learning;
        }
        log::debug!(
            "Card {} lapsed ({} lapses), next interval {} days.",
            card.id,
            card.lapses,
            card.interval
        );

        let leech = is_leech(card.lapses, conf.lapse.leech_fails);
        let mut suspended = false;
        if leech {
            log::info!("Card {} is a leech.", card.id);
            if conf.lapse.leech_action == LeechAction::Suspend {
                suspend_leech(card);
                suspended = true;
            }
        }
        Ok(Transition {
            kind: ReviewKind::Lapse,
            interval: card.interval,
            last_interval: card.last_interval,
            requeue: relearn && !suspended,
            leech,
        })
    }

    /// Write the card, its log entry and the counter bumps in one unit of
    /// work. The log id is the current time in milliseconds; if it is taken,
    /// the whole unit is retried after a pause, a bounded number of times.
    fn commit(
        &self,
        card: &Card,
        mut entry: ReviewLogEntry,
        counters: &[(CounterKind, i64)],
        leech: bool,
        today: i64,
    ) -> Fallible<()> {
        let deck = self.store.deck(card.deck_id)?;
        let mut chain = self.store.parents(&deck)?;
        chain.push(deck);
        let attempts = self.settings.log_retry_limit;
        for attempt in 1..=attempts {
            entry.id = self.clock.now().as_millis();
            let result = self.store.atomically(|| {
                self.store.update_card(card)?;
                self.store.append_review(&entry)?;
                for deck in &chain {
                    let mut deck = deck.clone();
                    for (kind, amount) in counters {
                        deck.counters.add(*kind, today, *amount);
                    }
                    self.store.save_deck(&deck)?;
                }
                if leech {
                    self.store
                        .add_tag(card.note_id, LEECH_TAG, card.modified, card.usn)?;
                }
                Ok(())
            });
            match result {
                Err(ErrorReport::LogIdConflict { id }) => {
                    log::warn!("Review log id {id} is taken (attempt {attempt} of {attempts}).");
                    self.clock
                        .pause(Duration::from_millis(LOG_RETRY_PAUSE_MS * u64::from(attempt)));
                }
                other => return other,
            }
        }
        Err(ErrorReport::StorageConflict { attempts })
    }
}

/// Milliseconds spent on the card since it was handed out, capped at the
/// deck's limit. Zero if the card wasn't handed out by this session.
fn time_taken(state: &SessionState, card: &Card, conf: &DeckConfig, now: Timestamp) -> i64 {
    match state.timer {
        Some((id, started)) if id == card.id => {
            now.millis_since(started).min(conf.max_taken_secs * 1000)
        }
        _ => 0,
    }
}
