use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Closed set of theme categories. The compiler dispatches on these and the
/// resolver scopes randomizer pools by them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Standard,
    Logo,
    Cannabis,
    Food,
    Sportscard,
    Movieposter,
    Halloween,
    Activity,
    Jobs,
    Sports,
}

impl Category {
    pub fn as_str(self) -> &'static str {
        match self {
            Category::Standard => "standard",
            Category::Logo => "logo",
            Category::Cannabis => "cannabis",
            Category::Food => "food",
            Category::Sportscard => "sportscard",
            Category::Movieposter => "movieposter",
            Category::Halloween => "halloween",
            Category::Activity => "activity",
            Category::Jobs => "jobs",
            Category::Sports => "sports",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "standard" => Some(Category::Standard),
            "logo" => Some(Category::Logo),
            "cannabis" => Some(Category::Cannabis),
            "food" => Some(Category::Food),
            "sportscard" => Some(Category::Sportscard),
            "movieposter" => Some(Category::Movieposter),
            "halloween" => Some(Category::Halloween),
            "activity" => Some(Category::Activity),
            "jobs" => Some(Category::Jobs),
            "sports" => Some(Category::Sports),
            _ => None,
        }
    }

    pub fn all() -> &'static [Category] {
        &[
            Category::Standard,
            Category::Logo,
            Category::Cannabis,
            Category::Food,
            Category::Sportscard,
            Category::Movieposter,
            Category::Halloween,
            Category::Activity,
            Category::Jobs,
            Category::Sports,
        ]
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Sentinel identifiers. These occupy selection slots like theme keys but are
/// never sent to the generation service directly; the resolver and compiler
/// expand them.
pub const RANDOMIZE_ALL: &str = "__randomize_all__";
pub const SPORTSCARD_MODE: &str = "__sportscard__";
pub const MOVIE_POSTER_FLYER: &str = "__movie_poster_flyer__";
pub const MOVIE_POSTER_PREMIERE: &str = "__movie_poster_premiere__";
pub const HALLOWEEN_MODE: &str = "__halloween__";
pub const HALLOWEEN_RANDOM_MODE: &str = "__halloween_random__";
pub const CUSTOM_FOOD_MODE: &str = "__custom_food__";

/// Per-category randomizer sentinel, e.g. `__randomize_logo__`.
pub fn category_randomizer(category: Category) -> String {
    format!("__randomize_{}__", category.as_str())
}

pub fn parse_category_randomizer(id: &str) -> Option<Category> {
    let inner = id.strip_prefix("__randomize_")?.strip_suffix("__")?;
    Category::parse(inner)
}

pub fn randomize_logo() -> String {
    category_randomizer(Category::Logo)
}

pub fn randomize_cannabis() -> String {
    category_randomizer(Category::Cannabis)
}

/// One catalog entry. The template doubles as the identity key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Theme {
    pub title: String,
    pub template: String,
    pub category: Category,
    #[serde(default)]
    pub special: bool,
    #[serde(default)]
    pub badge: Option<String>,
}

/// Immutable theme catalog keyed by template text. Built once at startup;
/// tests inject their own entries the same way.
#[derive(Debug, Clone)]
pub struct ThemeCatalog {
    themes: IndexMap<String, Theme>,
}

impl ThemeCatalog {
    pub fn new(themes: Option<IndexMap<String, Theme>>) -> Self {
        Self {
            themes: themes.unwrap_or_else(default_themes),
        }
    }

    pub fn get(&self, template: &str) -> Option<&Theme> {
        self.themes.get(template)
    }

    pub fn len(&self) -> usize {
        self.themes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.themes.is_empty()
    }

    pub fn all(&self) -> impl Iterator<Item = &Theme> {
        self.themes.values()
    }

    pub fn by_category(&self, category: Category) -> Vec<&Theme> {
        self.themes
            .values()
            .filter(|theme| theme.category == category)
            .collect()
    }

    /// Eligible pool for the all-theme randomizer: every non-special theme.
    pub fn randomizer_pool(&self) -> Vec<&Theme> {
        self.themes.values().filter(|theme| !theme.special).collect()
    }
}

impl Default for ThemeCatalog {
    fn default() -> Self {
        Self::new(None)
    }
}

/// Costume ideas backing halloween random-costume mode. Drawn without
/// repeats, so the list length is the maximum page count for that mode.
pub const COSTUME_SUGGESTIONS: &[&str] = &[
    "a tiny wizard with a star-covered hat",
    "a pumpkin with a leafy stem cap",
    "a pirate captain with a feathered tricorn",
    "a friendly ghost draped in a sheet",
    "a bat with wide felt wings",
    "a mad scientist in a little lab coat",
    "a vampire with a high-collared cape",
    "a mummy wrapped in loose bandages",
    "a skeleton onesie with glowing bones",
    "a witch with a crooked broomstick",
    "a spider with four extra plush legs",
    "a dragon with soft fabric spikes",
];

fn theme(
    title: &str,
    template: &str,
    category: Category,
    special: bool,
    badge: Option<&str>,
) -> (String, Theme) {
    (
        template.to_string(),
        Theme {
            title: title.to_string(),
            template: template.to_string(),
            category,
            special,
            badge: badge.map(str::to_string),
        },
    )
}

fn default_themes() -> IndexMap<String, Theme> {
    IndexMap::from_iter([
        theme(
            "Superhero",
            "the pet as a caped superhero soaring over a city skyline at sunset",
            Category::Standard,
            false,
            None,
        ),
        theme(
            "Astronaut",
            "the pet in a bubble-helmet spacesuit floating past planets and stars",
            Category::Standard,
            false,
            None,
        ),
        theme(
            "Pirate",
            "the pet as a pirate captain at the wheel of a galleon on rolling waves",
            Category::Standard,
            false,
            None,
        ),
        theme(
            "Royal Portrait",
            "the pet in a jeweled crown and velvet robe posed for a royal portrait",
            Category::Standard,
            false,
            None,
        ),
        theme(
            "Wizard",
            "the pet as a wizard casting sparkling spells in a tower library",
            Category::Standard,
            false,
            None,
        ),
        theme(
            "Under the Sea",
            "the pet swimming through a coral reef with curious fish and a treasure chest",
            Category::Standard,
            false,
            None,
        ),
        theme(
            "Dinosaur Pal",
            "the pet riding a friendly long-necked dinosaur through a fern valley",
            Category::Standard,
            false,
            None,
        ),
        theme(
            "Rock Star",
            "the pet on stage with a guitar, stage lights, and a cheering crowd",
            Category::Standard,
            false,
            Some("Popular"),
        ),
        theme(
            "Cowpoke",
            "the pet in a cowboy hat and bandana out on the open range at dusk",
            Category::Standard,
            false,
            None,
        ),
        theme(
            "Fairy Garden",
            "the pet with tiny wings resting on a mushroom in a glowing fairy garden",
            Category::Standard,
            false,
            None,
        ),
        theme(
            "Classic Badge Logo",
            "a circular badge-style pet brand emblem with the pet's face at the center",
            Category::Logo,
            false,
            None,
        ),
        theme(
            "Varsity Crest",
            "a varsity crest pet brand mark with banners and laurel leaves",
            Category::Logo,
            false,
            None,
        ),
        theme(
            "Neon Sign",
            "a retro neon-sign style pet brand mark glowing against a brick wall",
            Category::Logo,
            false,
            None,
        ),
        theme(
            "Minimal Line Mark",
            "a minimal single-line pet brand mark drawn in one continuous stroke",
            Category::Logo,
            false,
            None,
        ),
        theme(
            "Chill Garden",
            "the pet lounging in a lush cannabis garden under string lights",
            Category::Cannabis,
            true,
            Some("21+"),
        ),
        theme(
            "Budtender",
            "the pet as a friendly budtender behind a tidy dispensary counter",
            Category::Cannabis,
            true,
            Some("21+"),
        ),
        theme(
            "Hazy Daydream",
            "the pet daydreaming on a cloud over rolling cannabis fields",
            Category::Cannabis,
            true,
            Some("21+"),
        ),
        theme(
            "Tie-Dye Vibes",
            "the pet in a tie-dye bandana surrounded by swirling leaf patterns",
            Category::Cannabis,
            true,
            Some("21+"),
        ),
        theme(
            "Pizza Chef",
            "the pet as a chef tossing pizza dough in a cozy pizzeria kitchen",
            Category::Food,
            false,
            None,
        ),
        theme(
            "Sushi Snack",
            "the pet seated before a parade of playful sushi rolls and chopsticks",
            Category::Food,
            false,
            None,
        ),
        theme(
            "Taco Fiesta",
            "the pet at a festive taco stand with papel picado banners overhead",
            Category::Food,
            false,
            None,
        ),
        theme(
            "Ice Cream Day",
            "the pet balancing a towering triple-scoop ice cream cone in the park",
            Category::Food,
            false,
            None,
        ),
        theme(
            "Fetch at the Park",
            "{petName} leaping to catch a frisbee at {baseTheme}",
            Category::Activity,
            false,
            None,
        ),
        theme(
            "Skateboard Cruise",
            "{petName} cruising on a skateboard through {baseTheme}",
            Category::Activity,
            false,
            None,
        ),
        theme(
            "Camping Trip",
            "{petName} toasting a marshmallow beside a tent at {baseTheme}",
            Category::Activity,
            false,
            None,
        ),
        theme(
            "Firefighter",
            "the pet as a firefighter in a helmet beside a shiny fire engine",
            Category::Jobs,
            false,
            None,
        ),
        theme(
            "Veterinarian",
            "the pet as a veterinarian in a white coat examining a teddy bear patient",
            Category::Jobs,
            false,
            None,
        ),
        theme(
            "Mail Carrier",
            "the pet as a mail carrier delivering letters from a little satchel",
            Category::Jobs,
            false,
            None,
        ),
        theme(
            "Astronomer",
            "the pet as an astronomer peering through a big telescope on a rooftop",
            Category::Jobs,
            false,
            None,
        ),
        theme(
            "Soccer Star",
            "the pet mid-kick with a soccer ball in a packed stadium",
            Category::Sports,
            false,
            None,
        ),
        theme(
            "Hoops Hero",
            "the pet dunking a basketball with the net swishing around its paws",
            Category::Sports,
            false,
            None,
        ),
        theme(
            "Surf's Up",
            "the pet riding a curling wave on a striped surfboard",
            Category::Sports,
            false,
            None,
        ),
        theme(
            "Home Run",
            "the pet swinging a baseball bat as the ball rockets over the fence",
            Category::Sports,
            false,
            None,
        ),
    ])
}
