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

//! Interval, ease and step arithmetic.

use rand::Rng;

use crate::error::ErrorReport;
use crate::error::Fallible;
use crate::sched::Scheduler;
use crate::sched::clock::Clock;
use crate::store::Store;
use crate::types::card::Card;
use crate::types::deck_config::MIN_FACTOR;
use crate::types::deck_config::ReviewConfig;
use crate::types::grade::Grade;

/// Ease factor lost on a lapse, in permille.
const LAPSE_FACTOR_PENALTY: i64 = 200;

/// Multiplier for a `hard` review.
const HARD_MULTIPLIER: f64 = 1.2;

/// Seconds until a learning card with `left` steps remaining comes back.
/// Steps are counted from the end, so the first step is `delays[len - left]`;
/// out of range, the first delay is used.
pub fn step_delay_secs(delays: &[f64], left: u32) -> i64 {
    let index = delays.len().checked_sub(left as usize);
    let minutes = index
        .and_then(|i| delays.get(i))
        .or_else(|| delays.first())
        .copied()
        .unwrap_or(0.0);
    minutes_to_secs(minutes)
}

fn minutes_to_secs(minutes: f64) -> i64 {
    (minutes * 60.0) as i64
}

/// Stretch a step delay by a random 0 to 25 percent, so that cards failed
/// together drift apart.
pub fn jitter(delay: i64, rng: &mut impl Rng) -> i64 {
    let percent: i64 = rng.gen_range(0..=25);
    (delay as f64 * (1.0 + percent as f64 / 100.0)) as i64
}

pub fn days_late(today: i64, due: i64) -> i64 {
    (today - due).max(0)
}

/// The smallest interval a successful review may produce.
pub fn minimum_interval(interval: i64, grade: Grade) -> i64 {
    let growth = if grade == Grade::Easy { 2 } else { 1 };
    interval + growth
}

/// Rescale an interval tuned for the base forgetting index to the target one.
pub fn forgetting_index_scale(interval: f64, conf: &ReviewConfig) -> f64 {
    let target = (1.0 - conf.target_forgetting / 100.0).ln();
    let base = (1.0 - conf.base_forgetting / 100.0).ln();
    interval * (target / base)
}

/// The ideal next interval in days for a successful review, before sibling
/// adjustment. Uses the card's current interval and factor.
pub fn next_review_interval(
    card: &Card,
    grade: Grade,
    today: i64,
    conf: &ReviewConfig,
) -> Fallible<i64> {
    let late = days_late(today, card.due);
    let factor = card.factor as f64 / 1000.0;
    let raw = match grade {
        Grade::Hard => (card.interval + late / 4) as f64 * HARD_MULTIPLIER,
        Grade::Good => (card.interval + late / 2) as f64 * factor,
        Grade::Easy => (card.interval + late) as f64 * factor * conf.easy_bonus,
        other => {
            return Err(ErrorReport::invalid_state(format!(
                "`{other}` is not a successful review grade"
            )));
        }
    };
    let scaled = forgetting_index_scale(raw, conf) as i64;
    Ok(scaled.max(minimum_interval(card.interval, grade)))
}

/// The factor after a successful review.
pub fn next_factor(factor: i64, grade: Grade) -> i64 {
    let delta = match grade {
        Grade::Hard => -150,
        Grade::Easy => 150,
        _ => 0,
    };
    (factor + delta).max(MIN_FACTOR)
}

/// The interval in days after a lapse.
pub fn lapse_interval(interval: i64, mult: f64) -> i64 {
    (interval as f64 * mult) as i64 + 1
}

pub fn lapse_factor(factor: i64) -> i64 {
    (factor - LAPSE_FACTOR_PENALTY).max(MIN_FACTOR)
}

/// Move an interval off the days already taken by the card's siblings.
///
/// If `today + ideal` is free, `ideal` is returned. Otherwise the nearest
/// free day within the leeway is taken, preferring the earlier one as long as
/// the interval stays at or above `floor`. If there is no free day the
/// collision is accepted.
pub fn adjust_for_siblings(
    ideal: i64,
    floor: i64,
    today: i64,
    sibling_dues: &[i64],
    conf: &ReviewConfig,
) -> i64 {
    let ideal_due = today + ideal;
    let taken = |due: i64| sibling_dues.contains(&due);
    if !taken(ideal_due) {
        return ideal;
    }
    let leeway = conf.min_space.max((ideal as f64 * conf.fuzz) as i64);
    if leeway == 0 {
        return ideal;
    }
    let floor = floor.max(1);
    for diff in 1..=leeway + 1 {
        if ideal - diff >= floor && !taken(ideal_due - diff) {
            return ideal - diff;
        } else if !taken(ideal_due + diff) {
            return ideal + diff;
        }
    }
    ideal
}

impl<S: Store, C: Clock> Scheduler<'_, S, C> {
    /// `adjust_for_siblings` against the card's siblings in the store.
    pub(crate) fn away_from_siblings(
        &self,
        card: &Card,
        ideal: i64,
        floor: i64,
        today: i64,
        conf: &ReviewConfig,
    ) -> Fallible<i64> {
        let dues = self.store.sibling_review_dues(card)?;
        let interval = adjust_for_siblings(ideal, floor, today, &dues, conf);
        if interval != ideal {
            log::debug!(
                "Moved card {} from {} to {} days to avoid a sibling.",
                card.id,
                ideal,
                interval
            );
        }
        Ok(interval)
    }
}
