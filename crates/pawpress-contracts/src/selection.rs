use indexmap::IndexSet;
use serde::{Deserialize, Serialize};

use crate::themes::{
    parse_category_randomizer, Category, CUSTOM_FOOD_MODE, HALLOWEEN_MODE, HALLOWEEN_RANDOM_MODE,
    MOVIE_POSTER_FLYER, MOVIE_POSTER_PREMIERE, RANDOMIZE_ALL, SPORTSCARD_MODE,
};

/// Which eviction rule an identifier falls under when it enters the
/// selection. The rule is data, not scattered branching: activating an
/// `Exclusive` id clears everything else, and activating anything else
/// clears any active `Exclusive` id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExclusivityClass {
    /// Fully exclusive modes: sports card, movie posters, halloween modes,
    /// custom food, the all-theme randomizer, and the cannabis randomizer.
    Exclusive,
    /// Randomizer sentinels that coexist with ordinary picks.
    Randomizer,
    Ordinary,
}

pub fn exclusivity_class(id: &str) -> ExclusivityClass {
    match id {
        SPORTSCARD_MODE | MOVIE_POSTER_FLYER | MOVIE_POSTER_PREMIERE | HALLOWEEN_MODE
        | HALLOWEEN_RANDOM_MODE | CUSTOM_FOOD_MODE | RANDOMIZE_ALL => ExclusivityClass::Exclusive,
        _ => match parse_category_randomizer(id) {
            Some(Category::Cannabis) => ExclusivityClass::Exclusive,
            Some(_) => ExclusivityClass::Randomizer,
            None => ExclusivityClass::Ordinary,
        },
    }
}

/// The user's current picks plus the free-text and per-mode fields. Mutated
/// only through [`SelectionState::toggle`]; the resolver reads it once per
/// generation trigger.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SelectionState {
    #[serde(default)]
    pub selected: IndexSet<String>,
    #[serde(default)]
    pub custom_theme: String,
    #[serde(default)]
    pub custom_food: String,
    #[serde(default)]
    pub costume: String,
    #[serde(default)]
    pub sport: String,
    #[serde(default)]
    pub team: String,
    #[serde(default)]
    pub poster_style: String,
}

impl SelectionState {
    /// Flips one identifier. Returns whether the id is selected afterwards.
    pub fn toggle(&mut self, id: &str) -> bool {
        if self.selected.shift_remove(id) {
            return false;
        }
        match exclusivity_class(id) {
            ExclusivityClass::Exclusive => self.selected.clear(),
            _ => {
                self.selected
                    .retain(|existing| exclusivity_class(existing) != ExclusivityClass::Exclusive);
            }
        }
        self.selected.insert(id.to_string());
        true
    }

    pub fn active_exclusive(&self) -> Option<&str> {
        self.selected
            .iter()
            .map(String::as_str)
            .find(|id| exclusivity_class(id) == ExclusivityClass::Exclusive)
    }

    /// Ordered list the resolver cycles over: every non-exclusive selection
    /// (ordinary themes and randomizer sentinels) plus the trimmed
    /// custom-theme text when present.
    pub fn combined_themes(&self) -> Vec<String> {
        let mut combined: Vec<String> = self
            .selected
            .iter()
            .filter(|id| exclusivity_class(id) != ExclusivityClass::Exclusive)
            .cloned()
            .collect();
        let custom = self.custom_theme.trim();
        if !custom.is_empty() {
            combined.push(custom.to_string());
        }
        combined
    }
}
