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

use std::fmt::Display;
use std::fmt::Formatter;
use std::str::FromStr;

use crate::error::ErrorReport;
use crate::error::fail;

/// An answer to a card. Learning cards are graded with `Fail`, `Pass` or
/// `Remove`; review cards with `Fail`, `Hard`, `Good` or `Easy`.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Grade {
    Fail,
    /// Advance one learning step.
    Pass,
    /// Graduate immediately, skipping the remaining learning steps.
    Remove,
    Hard,
    Good,
    Easy,
}

pub const LEARNING_GRADES: [Grade; 3] = [Grade::Fail, Grade::Pass, Grade::Remove];
pub const REVIEW_GRADES: [Grade; 4] = [Grade::Fail, Grade::Hard, Grade::Good, Grade::Easy];

impl Grade {
    /// The button number recorded in the review log.
    pub fn ease(self) -> i64 {
        match self {
            Grade::Fail => 1,
            Grade::Pass | Grade::Hard => 2,
            Grade::Remove | Grade::Good => 3,
            Grade::Easy => 4,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Grade::Fail => "fail",
            Grade::Pass => "pass",
            Grade::Remove => "remove",
            Grade::Hard => "hard",
            Grade::Good => "good",
            Grade::Easy => "easy",
        }
    }

    pub fn is_learning_grade(self) -> bool {
        LEARNING_GRADES.contains(&self)
    }

    pub fn is_review_grade(self) -> bool {
        REVIEW_GRADES.contains(&self)
    }
}

impl Display for Grade {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Grade {
    type Err = ErrorReport;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "fail" => Ok(Grade::Fail),
            "pass" => Ok(Grade::Pass),
            "remove" => Ok(Grade::Remove),
            "hard" => Ok(Grade::Hard),
            "good" => Ok(Grade::Good),
            "easy" => Ok(Grade::Easy),
            _ => fail(format!("Invalid grade: {}", s)),
        }
    }
}
