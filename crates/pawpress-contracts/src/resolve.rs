use rand::seq::SliceRandom;
use rand::Rng;

use crate::pool::Pool;
use crate::selection::SelectionState;
use crate::themes::{
    parse_category_randomizer, Category, ThemeCatalog, COSTUME_SUGGESTIONS, HALLOWEEN_RANDOM_MODE,
    RANDOMIZE_ALL,
};

/// One slot of the resolved job list. Sentinel-free: every `Theme` entry is
/// either a concrete catalog template, an exclusive mode id the compiler
/// expands from mode fields, or raw custom-theme text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolvedJob {
    Theme(String),
    HalloweenCostume(String),
}

impl ResolvedJob {
    pub fn label(&self) -> &str {
        match self {
            ResolvedJob::Theme(id) => id.as_str(),
            ResolvedJob::HalloweenCostume(costume) => costume.as_str(),
        }
    }
}

/// Validation failures surfaced verbatim to the user. Detected before any
/// network call; no partial job list is ever returned.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SelectionError {
    #[error("Select at least one theme before creating pages.")]
    NothingSelected,
    #[error("Requested page count must be at least 1.")]
    ZeroCount,
    #[error("Only {available} unique themes are available; request {available} pages or fewer.")]
    InsufficientThemes { available: usize },
    #[error("Only {available} costume ideas are available; request {available} pages or fewer.")]
    InsufficientCostumes { available: usize },
}

/// Turns the current selection into a concrete ordered job list of exactly
/// `count` entries.
///
/// Evaluation order: exclusive modes first, then modulo cycling over the
/// combined selection, then category-randomizer expansion, then
/// logo-randomizer expansion.
pub fn resolve_selection<R: Rng + ?Sized>(
    state: &SelectionState,
    catalog: &ThemeCatalog,
    count: usize,
    rng: &mut R,
) -> Result<Vec<ResolvedJob>, SelectionError> {
    if count == 0 {
        return Err(SelectionError::ZeroCount);
    }

    if let Some(exclusive) = state.active_exclusive() {
        return resolve_exclusive(exclusive, catalog, count, rng);
    }

    let combined = state.combined_themes();
    if combined.is_empty() {
        return Err(SelectionError::NothingSelected);
    }

    // Every explicitly selected entry appears once before anything repeats.
    let mut slots: Vec<String> = (0..count)
        .map(|index| combined[index % combined.len()].clone())
        .collect();

    expand_category_randomizers(&mut slots, &combined, catalog, rng)?;

    Ok(slots.into_iter().map(ResolvedJob::Theme).collect())
}

fn resolve_exclusive<R: Rng + ?Sized>(
    exclusive: &str,
    catalog: &ThemeCatalog,
    count: usize,
    rng: &mut R,
) -> Result<Vec<ResolvedJob>, SelectionError> {
    if exclusive == HALLOWEEN_RANDOM_MODE {
        if count > COSTUME_SUGGESTIONS.len() {
            return Err(SelectionError::InsufficientCostumes {
                available: COSTUME_SUGGESTIONS.len(),
            });
        }
        let mut costumes: Vec<&str> = COSTUME_SUGGESTIONS.to_vec();
        costumes.shuffle(rng);
        return Ok(costumes
            .into_iter()
            .take(count)
            .map(|costume| ResolvedJob::HalloweenCostume(costume.to_string()))
            .collect());
    }

    let unique_pool: Option<Vec<String>> = if exclusive == RANDOMIZE_ALL {
        Some(
            catalog
                .randomizer_pool()
                .into_iter()
                .map(|theme| theme.template.clone())
                .collect(),
        )
    } else if parse_category_randomizer(exclusive) == Some(Category::Cannabis) {
        Some(
            catalog
                .by_category(Category::Cannabis)
                .into_iter()
                .map(|theme| theme.template.clone())
                .collect(),
        )
    } else {
        None
    };

    // Draw-without-repeat modes: single shuffle, then slice.
    if let Some(mut pool) = unique_pool {
        if count > pool.len() {
            return Err(SelectionError::InsufficientThemes {
                available: pool.len(),
            });
        }
        pool.shuffle(rng);
        return Ok(pool
            .into_iter()
            .take(count)
            .map(ResolvedJob::Theme)
            .collect());
    }

    Ok(vec![ResolvedJob::Theme(exclusive.to_string()); count])
}

/// Replaces every category-randomizer slot by drawing from a per-category
/// rotate-and-requeue pool. Logo slots resolve last so category pools never
/// see logo exclusions and vice versa.
fn expand_category_randomizers<R: Rng + ?Sized>(
    slots: &mut [String],
    combined: &[String],
    catalog: &ThemeCatalog,
    rng: &mut R,
) -> Result<(), SelectionError> {
    let mut categories: Vec<Category> = Vec::new();
    for slot in slots.iter() {
        if let Some(category) = parse_category_randomizer(slot) {
            if !categories.contains(&category) {
                categories.push(category);
            }
        }
    }
    categories.sort_by_key(|category| *category == Category::Logo);

    for category in categories {
        let sentinel = crate::themes::category_randomizer(category);
        let candidates: Vec<String> = catalog
            .by_category(category)
            .into_iter()
            .map(|theme| theme.template.clone())
            .collect();
        // A sentinel must never survive resolution, so a category with no
        // catalog themes at all is a validation error.
        if candidates.is_empty() {
            return Err(SelectionError::InsufficientThemes { available: 0 });
        }
        // Skip themes the user already picked explicitly, unless that would
        // leave nothing to draw from.
        let filtered: Vec<String> = candidates
            .iter()
            .filter(|template| !combined.contains(template))
            .cloned()
            .collect();
        let mut pool = if filtered.is_empty() {
            Pool::new(candidates, rng)
        } else {
            Pool::new(filtered, rng)
        };
        for slot in slots.iter_mut() {
            if *slot == sentinel {
                if let Some(drawn) = pool.take() {
                    *slot = drawn;
                }
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use indexmap::IndexMap;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    use crate::themes::{
        category_randomizer, randomize_cannabis, randomize_logo, Theme, CUSTOM_FOOD_MODE,
        SPORTSCARD_MODE,
    };

    use super::*;

    fn test_theme(title: &str, category: Category, special: bool) -> (String, Theme) {
        let template = format!("{} template", title.to_ascii_lowercase());
        (
            template.clone(),
            Theme {
                title: title.to_string(),
                template,
                category,
                special,
                badge: None,
            },
        )
    }

    fn small_catalog() -> ThemeCatalog {
        ThemeCatalog::new(Some(IndexMap::from_iter([
            test_theme("Alpha", Category::Standard, false),
            test_theme("Bravo", Category::Standard, false),
            test_theme("Charlie", Category::Standard, false),
            test_theme("LogoOne", Category::Logo, false),
            test_theme("LogoTwo", Category::Logo, false),
            test_theme("GreenOne", Category::Cannabis, true),
            test_theme("GreenTwo", Category::Cannabis, true),
            test_theme("JobOne", Category::Jobs, false),
            test_theme("JobTwo", Category::Jobs, false),
            test_theme("JobThree", Category::Jobs, false),
        ])))
    }

    fn state_with(ids: &[&str]) -> SelectionState {
        let mut state = SelectionState::default();
        for id in ids {
            state.toggle(id);
        }
        state
    }

    fn rng() -> StdRng {
        StdRng::seed_from_u64(42)
    }

    #[test]
    fn modulo_cycling_matches_combined_order() {
        let catalog = small_catalog();
        let state = state_with(&["alpha template", "bravo template"]);
        let jobs = resolve_selection(&state, &catalog, 5, &mut rng()).expect("resolve");
        let labels: Vec<&str> = jobs.iter().map(ResolvedJob::label).collect();
        assert_eq!(
            labels,
            vec![
                "alpha template",
                "bravo template",
                "alpha template",
                "bravo template",
                "alpha template"
            ]
        );
    }

    #[test]
    fn scenario_two_themes_three_pages() {
        let catalog = small_catalog();
        let state = state_with(&["alpha template", "bravo template"]);
        let jobs = resolve_selection(&state, &catalog, 3, &mut rng()).expect("resolve");
        let labels: Vec<&str> = jobs.iter().map(ResolvedJob::label).collect();
        assert_eq!(
            labels,
            vec!["alpha template", "bravo template", "alpha template"]
        );
    }

    #[test]
    fn custom_theme_text_joins_the_cycle() {
        let catalog = small_catalog();
        let mut state = state_with(&["alpha template"]);
        state.custom_theme = " space circus ".to_string();
        let jobs = resolve_selection(&state, &catalog, 4, &mut rng()).expect("resolve");
        let labels: Vec<&str> = jobs.iter().map(ResolvedJob::label).collect();
        assert_eq!(
            labels,
            vec![
                "alpha template",
                "space circus",
                "alpha template",
                "space circus"
            ]
        );
    }

    #[test]
    fn empty_selection_is_a_validation_error() {
        let catalog = small_catalog();
        let state = SelectionState::default();
        assert_eq!(
            resolve_selection(&state, &catalog, 2, &mut rng()),
            Err(SelectionError::NothingSelected)
        );
    }

    #[test]
    fn zero_count_is_rejected() {
        let catalog = small_catalog();
        let state = state_with(&["alpha template"]);
        assert_eq!(
            resolve_selection(&state, &catalog, 0, &mut rng()),
            Err(SelectionError::ZeroCount)
        );
    }

    #[test]
    fn exclusive_mode_fills_every_slot() {
        let catalog = small_catalog();
        let mut state = state_with(&["alpha template", "bravo template"]);
        state.toggle(SPORTSCARD_MODE);
        let jobs = resolve_selection(&state, &catalog, 4, &mut rng()).expect("resolve");
        assert_eq!(jobs.len(), 4);
        assert!(jobs
            .iter()
            .all(|job| job == &ResolvedJob::Theme(SPORTSCARD_MODE.to_string())));
    }

    #[test]
    fn custom_food_mode_fills_every_slot() {
        let catalog = small_catalog();
        let state = state_with(&[CUSTOM_FOOD_MODE]);
        let jobs = resolve_selection(&state, &catalog, 3, &mut rng()).expect("resolve");
        assert!(jobs
            .iter()
            .all(|job| job == &ResolvedJob::Theme(CUSTOM_FOOD_MODE.to_string())));
    }

    #[test]
    fn halloween_random_draws_distinct_costumes() {
        let catalog = small_catalog();
        let state = state_with(&[crate::themes::HALLOWEEN_RANDOM_MODE]);
        let jobs = resolve_selection(&state, &catalog, 6, &mut rng()).expect("resolve");
        assert_eq!(jobs.len(), 6);
        let mut costumes: Vec<&str> = jobs.iter().map(ResolvedJob::label).collect();
        assert!(costumes
            .iter()
            .all(|costume| COSTUME_SUGGESTIONS.contains(costume)));
        costumes.sort();
        costumes.dedup();
        assert_eq!(costumes.len(), 6);
    }

    #[test]
    fn halloween_random_rejects_count_beyond_suggestions() {
        let catalog = small_catalog();
        let state = state_with(&[crate::themes::HALLOWEEN_RANDOM_MODE]);
        let err = resolve_selection(&state, &catalog, COSTUME_SUGGESTIONS.len() + 1, &mut rng())
            .expect_err("too many costumes");
        assert_eq!(
            err,
            SelectionError::InsufficientCostumes {
                available: COSTUME_SUGGESTIONS.len()
            }
        );
    }

    #[test]
    fn scenario_all_randomizer_names_maximum_in_error() {
        // Eligible pool: the 8 non-special themes of the small catalog.
        let catalog = small_catalog();
        let state = state_with(&[RANDOMIZE_ALL]);
        let err = resolve_selection(&state, &catalog, 10, &mut rng()).expect_err("too many pages");
        assert_eq!(err, SelectionError::InsufficientThemes { available: 8 });
        assert!(err.to_string().contains("Only 8 unique themes"));
    }

    #[test]
    fn all_randomizer_draws_distinct_non_special_themes() {
        let catalog = small_catalog();
        let state = state_with(&[RANDOMIZE_ALL]);
        let jobs = resolve_selection(&state, &catalog, 8, &mut rng()).expect("resolve");
        let mut labels: Vec<&str> = jobs.iter().map(ResolvedJob::label).collect();
        assert!(labels
            .iter()
            .all(|label| catalog.get(label).map(|theme| !theme.special) == Some(true)));
        labels.sort();
        labels.dedup();
        assert_eq!(labels.len(), 8);
    }

    #[test]
    fn cannabis_randomizer_is_exclusive_and_unique() {
        let catalog = small_catalog();
        let mut state = state_with(&["alpha template"]);
        state.toggle(&randomize_cannabis());
        assert_eq!(state.selected.len(), 1);

        let jobs = resolve_selection(&state, &catalog, 2, &mut rng()).expect("resolve");
        let mut labels: Vec<&str> = jobs.iter().map(ResolvedJob::label).collect();
        labels.sort();
        assert_eq!(labels, vec!["greenone template", "greentwo template"]);

        let err = resolve_selection(&state, &catalog, 3, &mut rng()).expect_err("pool of 2");
        assert_eq!(err, SelectionError::InsufficientThemes { available: 2 });
    }

    #[test]
    fn category_randomizer_slots_resolve_from_the_category_pool() {
        let catalog = small_catalog();
        let state = state_with(&[&category_randomizer(Category::Jobs)]);
        let jobs = resolve_selection(&state, &catalog, 6, &mut rng()).expect("resolve");
        let labels: Vec<&str> = jobs.iter().map(ResolvedJob::label).collect();
        assert!(labels
            .iter()
            .all(|label| catalog.get(label).map(|theme| theme.category) == Some(Category::Jobs)));
        // Pool of 3, rotate-and-requeue: no repeat inside any 3-wide window.
        for window in labels.windows(3) {
            let mut seen = window.to_vec();
            seen.sort();
            seen.dedup();
            assert_eq!(seen.len(), 3);
        }
    }

    #[test]
    fn randomizer_pool_excludes_explicit_picks() {
        let catalog = small_catalog();
        let state = state_with(&["jobone template", &category_randomizer(Category::Jobs)]);
        let jobs = resolve_selection(&state, &catalog, 4, &mut rng()).expect("resolve");
        let labels: Vec<&str> = jobs.iter().map(ResolvedJob::label).collect();
        // Slots 1 and 3 came from the randomizer; the explicit pick is
        // excluded from its pool.
        assert_eq!(labels[0], "jobone template");
        assert_eq!(labels[2], "jobone template");
        for drawn in [labels[1], labels[3]] {
            assert_ne!(drawn, "jobone template");
            assert!(matches!(drawn, "jobtwo template" | "jobthree template"));
        }
    }

    #[test]
    fn randomizer_for_an_empty_category_is_a_validation_error() {
        // The small catalog has no Sportscard themes, so there is nothing
        // for this randomizer to draw and no sentinel may reach the output.
        let catalog = small_catalog();
        let state = state_with(&[&category_randomizer(Category::Sportscard)]);
        let err = resolve_selection(&state, &catalog, 2, &mut rng()).expect_err("empty category");
        assert_eq!(err, SelectionError::InsufficientThemes { available: 0 });
    }

    #[test]
    fn exclusion_is_skipped_when_it_would_empty_the_pool() {
        let catalog = small_catalog();
        let state = state_with(&[
            "logoone template",
            "logotwo template",
            &randomize_logo(),
        ]);
        let jobs = resolve_selection(&state, &catalog, 3, &mut rng()).expect("resolve");
        let drawn = jobs[2].label();
        assert!(matches!(drawn, "logoone template" | "logotwo template"));
    }

    #[test]
    fn logo_randomizer_resolves_after_category_randomizers() {
        let catalog = small_catalog();
        let state = state_with(&[
            &category_randomizer(Category::Jobs),
            &randomize_logo(),
        ]);
        let jobs = resolve_selection(&state, &catalog, 4, &mut rng()).expect("resolve");
        let labels: Vec<&str> = jobs.iter().map(ResolvedJob::label).collect();
        for (index, label) in labels.iter().enumerate() {
            let expected = if index % 2 == 0 {
                Category::Jobs
            } else {
                Category::Logo
            };
            assert_eq!(
                catalog.get(label).map(|theme| theme.category),
                Some(expected),
                "slot {index} was {label}"
            );
        }
    }

    #[test]
    fn resolution_is_deterministic_for_a_fixed_seed() {
        let catalog = small_catalog();
        let state = state_with(&[&category_randomizer(Category::Jobs)]);
        let first = resolve_selection(&state, &catalog, 5, &mut StdRng::seed_from_u64(9));
        let second = resolve_selection(&state, &catalog, 5, &mut StdRng::seed_from_u64(9));
        assert_eq!(first, second);
    }

    #[test]
    fn list_length_always_equals_requested_count() {
        let catalog = small_catalog();
        let state = state_with(&["alpha template", &randomize_logo()]);
        for count in 1..=12 {
            let jobs = resolve_selection(&state, &catalog, count, &mut rng()).expect("resolve");
            assert_eq!(jobs.len(), count);
            assert!(jobs
                .iter()
                .all(|job| parse_category_randomizer(job.label()).is_none()));
        }
    }
}
