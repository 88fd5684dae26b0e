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

use serde::Deserialize;

use crate::error::ErrorReport;
use crate::error::Fallible;
use crate::types::card::Card;
use crate::types::card_type::CardType;
use crate::types::ids::ConfigId;
use crate::types::ids::DeckId;

/// The lowest ease factor a card can have, in permille.
pub const MIN_FACTOR: i64 = 1300;

/// Scheduling policy shared by a group of decks.
#[derive(Clone, PartialEq, Debug)]
pub struct DeckConfig {
    pub id: ConfigId,
    pub new: NewConfig,
    pub lapse: LapseConfig,
    pub rev: ReviewConfig,
    /// Answers slower than this are recorded as taking this long.
    pub max_taken_secs: i64,
}

#[derive(Clone, PartialEq, Debug)]
pub struct NewConfig {
    /// Learning step delays, in minutes.
    pub delays: Vec<f64>,
    /// Interval given on graduation.
    pub graduating_interval: i64,
    /// Interval given when the card is removed from learning early.
    pub early_interval: i64,
    pub initial_factor: i64,
    pub per_day: i64,
    /// Keep cards of the same note apart in the new queue.
    pub separate: bool,
}

#[derive(Clone, PartialEq, Debug)]
pub struct LapseConfig {
    /// Relearning step delays, in minutes. May be empty.
    pub delays: Vec<f64>,
    /// Multiplier applied to the interval of a lapsed card.
    pub mult: f64,
    /// Number of lapses that makes a card a leech. Zero disables detection.
    pub leech_fails: u32,
    pub leech_action: LeechAction,
}

#[derive(Clone, PartialEq, Debug)]
pub struct ReviewConfig {
    pub per_day: i64,
    /// Extra multiplier for the `easy` grade.
    pub easy_bonus: f64,
    /// Target forgetting index, in percent.
    pub target_forgetting: f64,
    /// Forgetting index the multipliers were tuned for, in percent.
    pub base_forgetting: f64,
    /// Minimum distance in days kept between sibling reviews.
    pub min_space: i64,
    /// Fraction of the interval that may be shifted to avoid a sibling.
    pub fuzz: f64,
    pub order: ReviewOrder,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum LeechAction {
    Suspend,
    TagOnly,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum ReviewOrder {
    /// Due order, shuffled within each fetched batch.
    Due,
    /// Largest interval first.
    OldFirst,
    /// Smallest interval first.
    NewFirst,
}

impl DeckConfig {
    /// Parse and validate a stored configuration document. `deck` is the deck
    /// the configuration was requested for, and is named in every error.
    pub fn parse(id: ConfigId, deck: DeckId, body: &str) -> Fallible<Self> {
        let raw: RawDeckConfig = serde_json::from_str(body)
            .map_err(|e| ErrorReport::config(deck, "(document)", e.to_string()))?;
        Self::from_raw(id, deck, raw)
    }

    fn from_raw(id: ConfigId, deck: DeckId, raw: RawDeckConfig) -> Fallible<Self> {
        let v = Validator { deck };
        let new = v.require(raw.new, "new")?;
        let lapse = v.require(raw.lapse, "lapse")?;
        let rev = v.require(raw.rev, "rev")?;

        let new_delays = v.require(new.delays, "new.delays")?;
        if new_delays.is_empty() {
            return Err(v.invalid("new.delays", "must have at least one step"));
        }
        v.check_delays(&new_delays, "new.delays")?;
        let ints = v.require(new.ints, "new.ints")?;
        let [graduating_interval, early_interval] = match ints.as_slice() {
            [normal, early] => [*normal, *early],
            _ => return Err(v.invalid("new.ints", "expected exactly two intervals")),
        };
        if graduating_interval < 1 || early_interval < 1 {
            return Err(v.invalid("new.ints", "intervals must be at least one day"));
        }
        let initial_factor = v.require(new.initial_factor, "new.initialFactor")?;
        if initial_factor < MIN_FACTOR {
            return Err(v.invalid(
                "new.initialFactor",
                format!("must be at least {MIN_FACTOR}"),
            ));
        }
        let new_per_day = v.non_negative(new.per_day, "new.perDay")?;
        let separate = v.require(new.separate, "new.separate")?;

        let lapse_delays = v.require(lapse.delays, "lapse.delays")?;
        v.check_delays(&lapse_delays, "lapse.delays")?;
        let mult = v.require(lapse.mult, "lapse.mult")?;
        if mult.is_nan() || mult < 0.0 {
            return Err(v.invalid("lapse.mult", "must not be negative"));
        }
        let leech_fails = v.require(lapse.leech_fails, "lapse.leechFails")?;
        let leech_action = match v.require(lapse.leech_action, "lapse.leechAction")? {
            0 => LeechAction::Suspend,
            1 => LeechAction::TagOnly,
            other => {
                return Err(v.invalid(
                    "lapse.leechAction",
                    format!("unknown action {other}"),
                ));
            }
        };

        let rev_per_day = v.non_negative(rev.per_day, "rev.perDay")?;
        let easy_bonus = v.require(rev.ease4, "rev.ease4")?;
        if easy_bonus.is_nan() || easy_bonus <= 0.0 {
            return Err(v.invalid("rev.ease4", "must be positive"));
        }
        let fi = v.require(rev.fi, "rev.fi")?;
        let [target_forgetting, base_forgetting] = match fi.as_slice() {
            [target, base] => [*target, *base],
            _ => return Err(v.invalid("rev.fi", "expected exactly two percentages")),
        };
        for percent in [target_forgetting, base_forgetting] {
            if percent.is_nan() || percent <= 0.0 || percent >= 100.0 {
                return Err(v.invalid(
                    "rev.fi",
                    "percentages must lie strictly between 0 and 100",
                ));
            }
        }
        let min_space = v.non_negative(rev.min_space, "rev.minSpace")?;
        let fuzz = v.require(rev.fuzz, "rev.fuzz")?;
        if fuzz.is_nan() || fuzz < 0.0 {
            return Err(v.invalid("rev.fuzz", "must not be negative"));
        }
        let order = match v.require(rev.order, "rev.order")? {
            0 => ReviewOrder::Due,
            1 => ReviewOrder::OldFirst,
            2 => ReviewOrder::NewFirst,
            other => return Err(v.invalid("rev.order", format!("unknown order {other}"))),
        };

        let max_taken_secs = v.require(raw.max_taken, "maxTaken")?;
        if max_taken_secs <= 0 {
            return Err(v.invalid("maxTaken", "must be positive"));
        }

        Ok(Self {
            id,
            new: NewConfig {
                delays: new_delays,
                graduating_interval,
                early_interval,
                initial_factor,
                per_day: new_per_day,
                separate,
            },
            lapse: LapseConfig {
                delays: lapse_delays,
                mult,
                leech_fails,
                leech_action,
            },
            rev: ReviewConfig {
                per_day: rev_per_day,
                easy_bonus,
                target_forgetting,
                base_forgetting,
                min_space,
                fuzz,
                order,
            },
            max_taken_secs,
        })
    }

    /// The step delays that apply to a card in the learning queue: the
    /// relearning steps for a lapsed card, the learning steps otherwise.
    pub fn steps_for(&self, card: &Card) -> &[f64] {
        if card.card_type == CardType::Review {
            &self.lapse.delays
        } else {
            &self.new.delays
        }
    }

    /// The dotted field name of `steps_for`, for error reporting.
    pub fn steps_field_for(card: &Card) -> &'static str {
        if card.card_type == CardType::Review {
            "lapse.delays"
        } else {
            "new.delays"
        }
    }
}

struct Validator {
    deck: DeckId,
}

impl Validator {
    fn require<T>(&self, value: Option<T>, field: &str) -> Fallible<T> {
        value.ok_or_else(|| ErrorReport::config(self.deck, field, "missing"))
    }

    fn non_negative(&self, value: Option<i64>, field: &str) -> Fallible<i64> {
        let value = self.require(value, field)?;
        if value < 0 {
            return Err(self.invalid(field, "must not be negative"));
        }
        Ok(value)
    }

    fn check_delays(&self, delays: &[f64], field: &str) -> Fallible<()> {
        if delays.iter().any(|delay| delay.is_nan() || *delay <= 0.0) {
            return Err(self.invalid(field, "delays must be positive"));
        }
        Ok(())
    }

    fn invalid(&self, field: &str, reason: impl Into<String>) -> ErrorReport {
        ErrorReport::config(self.deck, field, reason)
    }
}

/// The stored form. Every field is optional so that a missing field can be
/// reported by name instead of being defaulted.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawDeckConfig {
    new: Option<RawNewConfig>,
    lapse: Option<RawLapseConfig>,
    rev: Option<RawReviewConfig>,
    max_taken: Option<i64>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawNewConfig {
    delays: Option<Vec<f64>>,
    ints: Option<Vec<i64>>,
    initial_factor: Option<i64>,
    per_day: Option<i64>,
    separate: Option<bool>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawLapseConfig {
    delays: Option<Vec<f64>>,
    mult: Option<f64>,
    leech_fails: Option<u32>,
    leech_action: Option<i64>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawReviewConfig {
    per_day: Option<i64>,
    ease4: Option<f64>,
    fi: Option<Vec<f64>>,
    min_space: Option<i64>,
    fuzz: Option<f64>,
    order: Option<i64>,
}
