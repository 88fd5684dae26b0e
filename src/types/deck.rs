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

use crate::types::ids::ConfigId;
use crate::types::ids::DeckId;

/// Separator between the components of a deck's path.
pub const DECK_SEPARATOR: &str = "::";

#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Deck {
    pub id: DeckId,
    /// The full path, e.g. `Languages::French::Verbs`.
    pub name: String,
    pub config_id: ConfigId,
    pub counters: DeckCounters,
}

impl Deck {
    /// The paths of every ancestor of this deck, root first.
    pub fn ancestor_names(&self) -> Vec<String> {
        let components: Vec<&str> = self.name.split(DECK_SEPARATOR).collect();
        (1..components.len())
            .map(|n| components[..n].join(DECK_SEPARATOR))
            .collect()
    }

    /// Whether `other` lies somewhere beneath this deck.
    pub fn is_ancestor_of(&self, other: &Deck) -> bool {
        other
            .name
            .strip_prefix(self.name.as_str())
            .is_some_and(|rest| rest.starts_with(DECK_SEPARATOR))
    }
}

/// Which of a deck's daily counters to touch.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum CounterKind {
    New,
    Review,
    Learning,
    /// Milliseconds spent answering.
    Time,
}

/// A count tagged with the day index it belongs to.
#[derive(Clone, Copy, PartialEq, Eq, Default, Debug)]
pub struct DayCount {
    pub day: i64,
    pub count: i64,
}

impl DayCount {
    /// The count as of `today`. A count from another day reads as zero.
    pub fn on(self, today: i64) -> i64 {
        if self.day == today { self.count } else { 0 }
    }

    /// Zero the count if it belongs to another day. Returns whether it
    /// changed.
    pub fn roll(&mut self, today: i64) -> bool {
        if self.day != today {
            *self = DayCount {
                day: today,
                count: 0,
            };
            true
        } else {
            false
        }
    }

    pub fn add(&mut self, today: i64, amount: i64) {
        self.roll(today);
        self.count += amount;
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Default, Debug)]
pub struct DeckCounters {
    pub new: DayCount,
    pub review: DayCount,
    pub learning: DayCount,
    pub time: DayCount,
}

impl DeckCounters {
    pub fn get(&self, kind: CounterKind) -> DayCount {
        match kind {
            CounterKind::New => self.new,
            CounterKind::Review => self.review,
            CounterKind::Learning => self.learning,
            CounterKind::Time => self.time,
        }
    }

    pub fn add(&mut self, kind: CounterKind, today: i64, amount: i64) {
        let counter = match kind {
            CounterKind::New => &mut self.new,
            CounterKind::Review => &mut self.review,
            CounterKind::Learning => &mut self.learning,
            CounterKind::Time => &mut self.time,
        };
        counter.add(today, amount);
    }

    /// Zero every counter that doesn't belong to `today`. Returns whether
    /// any of them changed.
    pub fn roll(&mut self, today: i64) -> bool {
        let mut changed = false;
        for counter in [
            &mut self.new,
            &mut self.review,
            &mut self.learning,
            &mut self.time,
        ] {
            changed |= counter.roll(today);
        }
        changed
    }
}
