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

use std::io::BufRead;
use std::io::Write;
use std::io::stdin;
use std::io::stdout;

use clap::Parser;
use serde::Serialize;

use crate::collection::Collection;
use crate::error::ErrorReport;
use crate::error::Fallible;
use crate::sched::DeckDue;
use crate::sched::Scheduler;
use crate::sched::clock::SystemClock;
use crate::sched::state::Counts;
use crate::types::grade::Grade;

#[derive(Parser)]
#[command(version, about, long_about = None)]
enum Command {
    /// Study the selected deck.
    Study {
        /// Path to the collection directory. Defaults to the current directory.
        directory: Option<String>,
        /// Select this deck before studying.
        #[arg(long)]
        deck: Option<String>,
    },
    /// Print what is left to study today, as JSON.
    Counts {
        /// Path to the collection directory. Defaults to the current directory.
        directory: Option<String>,
        /// Select this deck first.
        #[arg(long)]
        deck: Option<String>,
    },
    /// Check that every deck's configuration is valid.
    Check {
        /// Path to the collection directory. Defaults to the current directory.
        directory: Option<String>,
    },
    /// Return buried cards to their queues.
    Close {
        /// Path to the collection directory. Defaults to the current directory.
        directory: Option<String>,
    },
}

#[derive(Serialize)]
struct CountsReport {
    session: Counts,
    decks: Vec<DeckDue>,
}

pub fn entrypoint() -> Fallible<()> {
    let cli: Command = Command::parse();
    match cli {
        Command::Study { directory, deck } => {
            let col = open(directory, deck)?;
            study(&col)
        }
        Command::Counts { directory, deck } => {
            let col = open(directory, deck)?;
            let clock = SystemClock;
            let sched = Scheduler::new(&col.db, &clock, col.settings.clone());
            let state = sched.start_session()?;
            let report = CountsReport {
                session: sched.counts(&state, None),
                decks: sched.deck_due_list(&state)?,
            };
            let json = serde_json::to_string_pretty(&report)
                .map_err(|e| ErrorReport::new(e.to_string()))?;
            println!("{json}");
            Ok(())
        }
        Command::Check { directory } => {
            let col = Collection::open(directory)?;
            let count = col.check_configs()?;
            log::debug!("Checked {count} decks.");
            println!("ok");
            Ok(())
        }
        Command::Close { directory } => {
            let col = Collection::open(directory)?;
            let clock = SystemClock;
            let sched = Scheduler::new(&col.db, &clock, col.settings.clone());
            sched.on_close()
        }
    }
}

fn open(directory: Option<String>, deck: Option<String>) -> Fallible<Collection> {
    let col = Collection::open(directory)?;
    if let Some(name) = deck {
        col.select(&name)?;
    }
    Ok(col)
}

fn study(col: &Collection) -> Fallible<()> {
    let clock = SystemClock;
    let sched = Scheduler::new(&col.db, &clock, col.settings.clone());
    let mut state = sched.start_session()?;
    while let Some(mut card) = sched.get_card(&mut state)? {
        let counts = sched.counts(&state, Some(&card));
        println!(
            "[{} new, {} learning, {} review] card {} ({:?})",
            counts.new, counts.learning, counts.review, card.id, card.queue
        );
        let Some(grade) = read_grade(sched.grades_for(&card))? else {
            break;
        };
        if sched.answer(&mut state, &mut card, grade)? {
            println!("Card {} is a leech.", card.id);
        }
    }
    println!("Studied {} cards.", state.reps());
    sched.on_close()
}

/// Ask for one of `grades` by number. `None` if the user quits.
fn read_grade(grades: &[Grade]) -> Fallible<Option<Grade>> {
    let menu: Vec<String> = grades
        .iter()
        .enumerate()
        .map(|(i, grade)| format!("{} = {}", i + 1, grade))
        .collect();
    loop {
        print!("Grade: ({}, q = quit) ", menu.join(", "));
        stdout().flush()?;
        let mut input = String::new();
        if stdin().lock().read_line(&mut input)? == 0 {
            return Ok(None);
        }
        let input = input.trim();
        if input == "q" {
            return Ok(None);
        }
        match parse_choice(input, grades) {
            Some(grade) => return Ok(Some(grade)),
            None => println!(
                "Invalid input. Please enter a number between 1 and {}.",
                grades.len()
            ),
        }
    }
}

/// A one-based menu choice, or a grade by name.
fn parse_choice(input: &str, grades: &[Grade]) -> Option<Grade> {
    match input.parse::<usize>() {
        Ok(n) if n >= 1 => grades.get(n - 1).copied(),
        Ok(_) => None,
        Err(_) => input
            .parse::<Grade>()
            .ok()
            .filter(|grade| grades.contains(grade)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::grade::LEARNING_GRADES;
    use crate::types::grade::REVIEW_GRADES;

    #[test]
    fn test_parse_choice_by_number() {
        assert_eq!(parse_choice("1", &REVIEW_GRADES), Some(Grade::Fail));
        assert_eq!(parse_choice("4", &REVIEW_GRADES), Some(Grade::Easy));
        assert_eq!(parse_choice("4", &LEARNING_GRADES), None);
        assert_eq!(parse_choice("0", &LEARNING_GRADES), None);
    }

    #[test]
    fn test_parse_choice_by_name() {
        assert_eq!(parse_choice("pass", &LEARNING_GRADES), Some(Grade::Pass));
        assert_eq!(parse_choice("pass", &REVIEW_GRADES), None);
        assert_eq!(parse_choice("meh", &REVIEW_GRADES), None);
    }
}
