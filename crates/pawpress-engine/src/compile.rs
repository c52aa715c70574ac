use pawpress_contracts::context::SessionContext;
use pawpress_contracts::resolve::ResolvedJob;
use pawpress_contracts::selection::SelectionState;
use pawpress_contracts::themes::{
    Category, ThemeCatalog, CUSTOM_FOOD_MODE, HALLOWEEN_MODE, HALLOWEEN_RANDOM_MODE,
    MOVIE_POSTER_FLYER, MOVIE_POSTER_PREMIERE, SPORTSCARD_MODE,
};
use rand::seq::IndexedRandom;

use crate::providers::PromptOptimizer;

/// Shared style and aspect-ratio footer for page-style instructions.
pub const STYLE_FOOTER: &str = "Render as a clean black-and-white coloring-book line \
    illustration with bold outlines, no shading, and generous white space, composed for a \
    3:4 portrait print page.";

/// Prefix added to a degraded page's caption so the user learns in-band that
/// the original theme could not be produced.
pub const DISCLOSURE_PREFIX: &str =
    "We couldn't make your original theme this time, so here's a special page instead! ";

pub const HALLOWEEN_VIGNETTES: &[&str] = &[
    "trick-or-treating down a lantern-lit street of crooked houses",
    "posing in a pumpkin patch under a grinning full moon",
    "standing before a friendly haunted mansion with bats circling the towers",
    "stirring a bubbling cauldron in a cobwebbed cellar",
    "wandering a misty graveyard of mossy, tilted headstones",
    "greeting costumed friends on a porch piled with jack-o-lanterns",
];

const DEFAULT_BASE_THEME: &str = "a sunny neighborhood park";

/// One job's final instruction text, tagged with the category the pipeline
/// needs for fallback selection.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledInstruction {
    pub text: String,
    pub category: Category,
}

/// Mode preconditions surfaced verbatim to the user before any network call.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CompileError {
    #[error("Enter a food item to create custom food pages.")]
    MissingCustomFood,
    #[error("Enter your pet's name to create these pages.")]
    MissingPetName,
    #[error("Pick a sport and enter a team name for sports card pages.")]
    MissingSportOrTeam,
    #[error("Enter a costume to create halloween pages.")]
    MissingCostume,
}

/// Category a job slot compiles under. Sentinels carry their own category;
/// unknown identifiers are custom-theme text and take the default path.
pub fn job_category(id: &str, catalog: &ThemeCatalog) -> Category {
    match id {
        SPORTSCARD_MODE => Category::Sportscard,
        MOVIE_POSTER_FLYER | MOVIE_POSTER_PREMIERE => Category::Movieposter,
        HALLOWEEN_MODE | HALLOWEEN_RANDOM_MODE => Category::Halloween,
        CUSTOM_FOOD_MODE => Category::Food,
        _ => catalog
            .get(id)
            .map(|theme| theme.category)
            .unwrap_or(Category::Standard),
    }
}

/// Checks every mode precondition the compiler and templates rely on, before
/// any job is attempted.
pub fn validate_preconditions(
    jobs: &[ResolvedJob],
    state: &SelectionState,
    context: &SessionContext,
    catalog: &ThemeCatalog,
) -> Result<(), CompileError> {
    for job in jobs {
        let ResolvedJob::Theme(id) = job else {
            continue;
        };
        if id == CUSTOM_FOOD_MODE && state.custom_food.trim().is_empty() {
            return Err(CompileError::MissingCustomFood);
        }
        if id == SPORTSCARD_MODE
            && (state.sport.trim().is_empty() || state.team.trim().is_empty())
        {
            return Err(CompileError::MissingSportOrTeam);
        }
        if id == HALLOWEEN_MODE && state.costume.trim().is_empty() {
            return Err(CompileError::MissingCostume);
        }
        // Poster titles and logo brand names substitute the pet name verbatim.
        let category = job_category(id, catalog);
        let needs_name = category == Category::Movieposter || category == Category::Logo;
        if needs_name && !context.has_name() {
            return Err(CompileError::MissingPetName);
        }
    }
    Ok(())
}

/// Compiles one resolved job into the final instruction string.
///
/// Dispatch priority: halloween > food > movie flyer > movie premiere >
/// sports card > logo > activity > default. The optimizer call on the
/// default path is best-effort; its failure falls back to the raw template.
pub fn compile_instruction(
    job: &ResolvedJob,
    state: &SelectionState,
    context: &SessionContext,
    catalog: &ThemeCatalog,
    optimizer: &dyn PromptOptimizer,
) -> Result<CompiledInstruction, CompileError> {
    match job {
        ResolvedJob::HalloweenCostume(costume) => {
            Ok(halloween_instruction(costume, context))
        }
        ResolvedJob::Theme(id) => compile_theme(id, state, context, catalog, optimizer),
    }
}

fn compile_theme(
    id: &str,
    state: &SelectionState,
    context: &SessionContext,
    catalog: &ThemeCatalog,
    optimizer: &dyn PromptOptimizer,
) -> Result<CompiledInstruction, CompileError> {
    let category = job_category(id, catalog);
    match category {
        Category::Halloween => {
            let costume = state.costume.trim();
            if costume.is_empty() {
                return Err(CompileError::MissingCostume);
            }
            Ok(halloween_instruction(costume, context))
        }
        Category::Food => {
            let body = if id == CUSTOM_FOOD_MODE {
                let food = state.custom_food.trim();
                if food.is_empty() {
                    return Err(CompileError::MissingCustomFood);
                }
                format!("the pet delighted by a generous spread of {food}")
            } else {
                catalog
                    .get(id)
                    .map(|theme| theme.template.clone())
                    .unwrap_or_else(|| id.to_string())
            };
            Ok(CompiledInstruction {
                text: format!("{body}. {STYLE_FOOTER}"),
                category,
            })
        }
        Category::Movieposter => Ok(movie_poster_instruction(id, state, context)),
        Category::Sportscard => Ok(CompiledInstruction {
            text: format!(
                "A collectible sports trading card of {name} playing {sport} for the team \
                 \"{team}\", with team colors, a card-frame border, and a bold nameplate \
                 reading \"{name}\". Use the sport and team names exactly as written.",
                name = context.display_name(),
                sport = state.sport.trim(),
                team = state.team.trim(),
            ),
            category,
        }),
        Category::Logo => {
            let body = catalog
                .get(id)
                .map(|theme| theme.template.clone())
                .unwrap_or_else(|| {
                    "a circular badge-style pet brand emblem with the pet's face at the center"
                        .to_string()
                });
            Ok(CompiledInstruction {
                text: format!(
                    "{body}. Feature the brand name \"{name}\" rendered exactly as written, \
                     letter for letter, with no alternate spellings and no other text.",
                    name = context.display_name(),
                ),
                category,
            })
        }
        Category::Activity => Ok(activity_instruction(id, state, context, catalog)),
        _ => Ok(default_instruction(id, context, catalog, optimizer, category)),
    }
}

fn halloween_instruction(costume: &str, context: &SessionContext) -> CompiledInstruction {
    let vignette = HALLOWEEN_VIGNETTES
        .choose(&mut rand::rng())
        .copied()
        .unwrap_or(HALLOWEEN_VIGNETTES[0]);
    let mut text = format!("The pet dressed as {costume}, {vignette}. ");
    if context.has_name() {
        text.push_str(&name_clause(context));
    }
    if context.has_logo() {
        text.push_str(LOGO_CLAUSE);
    }
    if context.has_products() {
        text.push_str(PRODUCT_CLAUSE);
    }
    text.push_str(STYLE_FOOTER);
    CompiledInstruction {
        text,
        category: Category::Halloween,
    }
}

fn movie_poster_instruction(
    id: &str,
    state: &SelectionState,
    context: &SessionContext,
) -> CompiledInstruction {
    let name = context.display_name();
    let style = state.poster_style.trim();
    let mut text = if id == MOVIE_POSTER_FLYER {
        format!(
            "A vintage movie flyer poster for a film titled \"The Adventures of {name}\" \
             starring {name}, with a tagline, billing block text along the bottom, and \
             distressed print texture."
        )
    } else {
        format!(
            "A glamorous red-carpet premiere one-sheet poster starring {name}, with \
             spotlights, a marquee title reading \"{name}\", and an opening-night date line."
        )
    };
    if !style.is_empty() {
        text.push_str(&format!(" Poster style: {style}."));
    }
    CompiledInstruction {
        text,
        category: Category::Movieposter,
    }
}

fn activity_instruction(
    id: &str,
    state: &SelectionState,
    context: &SessionContext,
    catalog: &ThemeCatalog,
) -> CompiledInstruction {
    let template = catalog
        .get(id)
        .map(|theme| theme.template.clone())
        .unwrap_or_else(|| id.to_string());

    // Prefer a scene from another explicit pick; otherwise draw one from the
    // plain catalog; otherwise the stock phrase.
    let base_theme = state
        .selected
        .iter()
        .filter_map(|selected| catalog.get(selected))
        .find(|theme| theme.category != Category::Activity)
        .map(|theme| theme.title.clone())
        .or_else(|| {
            let pool: Vec<&str> = catalog
                .all()
                .filter(|theme| {
                    !theme.special
                        && theme.category != Category::Activity
                        && theme.category != Category::Logo
                })
                .map(|theme| theme.title.as_str())
                .collect();
            pool.choose(&mut rand::rng()).map(|title| title.to_string())
        })
        .unwrap_or_else(|| DEFAULT_BASE_THEME.to_string());

    let text = format!(
        "{}. {STYLE_FOOTER}",
        template
            .replace("{baseTheme}", &base_theme)
            .replace("{petName}", context.display_name())
    );
    CompiledInstruction {
        text,
        category: Category::Activity,
    }
}

fn default_instruction(
    id: &str,
    context: &SessionContext,
    catalog: &ThemeCatalog,
    optimizer: &dyn PromptOptimizer,
    category: Category,
) -> CompiledInstruction {
    let template = catalog
        .get(id)
        .map(|theme| theme.template.clone())
        .unwrap_or_else(|| id.to_string());
    let elaborated = optimizer
        .optimize(&template)
        .unwrap_or_else(|_| template.clone());

    let mut text = String::new();
    if context.has_name() {
        text.push_str(&name_clause(context));
    }
    text.push_str(&format!("Illustrate this scene: {elaborated}. "));
    if category == Category::Cannabis && context.has_products() {
        text.push_str(PRODUCT_CLAUSE);
    }
    if context.has_logo() {
        text.push_str(LOGO_CLAUSE);
    }
    text.push_str(STYLE_FOOTER);
    CompiledInstruction { text, category }
}

fn name_clause(context: &SessionContext) -> String {
    format!(
        "Incorporate the name \"{}\" naturally into the artwork. ",
        context.trimmed_name()
    )
}

const LOGO_CLAUSE: &str =
    "Include the brand logo from the attached logo image somewhere tasteful in the scene. ";
const PRODUCT_CLAUSE: &str =
    "Feature the products from the attached product photos within the scene. ";

/// Simplified, near-guaranteed instruction for the fallback tier. Logo jobs
/// fall back to a text-free mark; everything else to a likeness portrait.
pub fn fallback_instruction(category: Category, context: &SessionContext) -> String {
    if category == Category::Logo {
        "Design a simple iconographic pet brand mark using clean geometric shapes, \
         inspired by the attached photos. Do not include any text, letters, or numbers \
         anywhere in the design."
            .to_string()
    } else {
        format!(
            "A warm portrait of {} that stays true to the pet's real markings, build, and \
             expression. {STYLE_FOOTER}",
            context.display_name()
        )
    }
}

/// Deterministic caption used when the caption collaborator fails; a page
/// never ships without one.
pub fn fallback_caption(context: &SessionContext) -> String {
    format!("A special page starring {}!", context.display_name())
}
