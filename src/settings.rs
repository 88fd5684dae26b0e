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

use std::fs::read_to_string;
use std::path::Path;

use serde::Deserialize;

use crate::error::Fallible;
use crate::error::fail;

/// The name of the settings file in a collection directory.
pub const SETTINGS_FILE: &str = "cardsched.toml";

/// Where new cards go in a session.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NewSpread {
    /// Mixed in among the reviews.
    #[default]
    Distribute,
    /// After all reviews.
    Last,
    /// Before any review.
    First,
}

/// Collection-wide scheduling settings.
#[derive(Clone, PartialEq, Eq, Debug, Deserialize)]
#[serde(rename_all = "kebab-case", default, deny_unknown_fields)]
pub struct Settings {
    pub new_spread: NewSpread,
    /// How far ahead, in seconds, a learning card may be shown when there is
    /// nothing else left to study.
    pub collapse_secs: i64,
    /// Maximum cards fetched into the new or review queue at a time.
    pub queue_limit: i64,
    /// Maximum learning cards fetched or counted at a time.
    pub report_limit: i64,
    /// Attempts at appending to the review log before giving up.
    pub log_retry_limit: u32,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            new_spread: NewSpread::Distribute,
            collapse_secs: 1200,
            queue_limit: 50,
            report_limit: 1000,
            log_retry_limit: 5,
        }
    }
}

impl Settings {
    /// Load settings from a TOML file. A missing file means the defaults.
    pub fn load(path: &Path) -> Fallible<Self> {
        if !path.exists() {
            log::debug!("No settings file at {}, using defaults.", path.display());
            return Ok(Self::default());
        }
        let content = read_to_string(path)?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Fallible<Self> {
        let settings: Settings = toml::from_str(content)?;
        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Fallible<()> {
        if self.collapse_secs < 0 {
            return fail("collapse-secs must not be negative.");
        }
        if self.queue_limit < 1 {
            return fail("queue-limit must be at least 1.");
        }
        if self.report_limit < 1 {
            return fail("report-limit must be at least 1.");
        }
        if self.log_retry_limit < 1 {
            return fail("log-retry-limit must be at least 1.");
        }
        Ok(())
    }
}
