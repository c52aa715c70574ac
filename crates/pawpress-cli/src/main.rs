use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use pawpress_contracts::context::{Gender, ImageRef, SessionContext};
use pawpress_contracts::resolve::{resolve_selection, ResolvedJob, SelectionError};
use pawpress_contracts::selection::SelectionState;
use pawpress_contracts::themes::{Category, ThemeCatalog};
use pawpress_engine::{CollaboratorSet, CompileError, PageRun};
use rand::rngs::StdRng;
use rand::SeedableRng;

#[derive(Debug, Parser)]
#[command(name = "pawpress", version, about = "Themed pet coloring-page generator")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// List the theme catalog.
    Themes(ThemesArgs),
    /// Resolve a selection into its per-page job list without generating.
    Resolve(ResolveArgs),
    /// Generate a batch of pages into a run directory.
    Run(RunArgs),
}

#[derive(Debug, Parser)]
struct ThemesArgs {
    /// Only list themes in one category.
    #[arg(long)]
    category: Option<String>,
}

#[derive(Debug, Parser)]
struct SelectArgs {
    /// JSON file holding a saved selection state; flags apply on top.
    #[arg(long)]
    selection: Option<PathBuf>,
    /// Theme identifier or mode sentinel; repeat to select several.
    #[arg(long = "theme")]
    themes: Vec<String>,
    /// Free-text theme added alongside the picked ones.
    #[arg(long)]
    custom_theme: Option<String>,
    /// Food item for the custom food mode.
    #[arg(long)]
    custom_food: Option<String>,
    /// Costume for halloween mode.
    #[arg(long)]
    costume: Option<String>,
    /// Sport for sports card mode.
    #[arg(long)]
    sport: Option<String>,
    /// Team name for sports card mode.
    #[arg(long)]
    team: Option<String>,
    /// Poster style for movie poster modes.
    #[arg(long)]
    poster_style: Option<String>,
}

#[derive(Debug, Parser)]
struct ResolveArgs {
    #[command(flatten)]
    select: SelectArgs,
    /// Number of pages to plan.
    #[arg(long, default_value_t = 1)]
    count: usize,
    /// Seed for deterministic randomizer picks.
    #[arg(long)]
    seed: Option<u64>,
}

#[derive(Debug, Parser)]
struct RunArgs {
    #[command(flatten)]
    select: SelectArgs,
    /// Run directory for pages, events, and the summary.
    #[arg(long)]
    out: PathBuf,
    #[arg(long, default_value_t = 1)]
    count: usize,
    #[arg(long)]
    seed: Option<u64>,
    /// Generation backend: dryrun or studio.
    #[arg(long, default_value = "dryrun")]
    provider: String,
    /// JSON file holding a saved session context; flags apply on top.
    #[arg(long)]
    context: Option<PathBuf>,
    #[arg(long)]
    pet_name: Option<String>,
    /// Social handle printed into captions.
    #[arg(long)]
    handle: Option<String>,
    /// boy, girl, or unspecified.
    #[arg(long)]
    gender: Option<String>,
    /// Product photo attached to every generation call; repeatable.
    #[arg(long = "product-image")]
    product_images: Vec<PathBuf>,
    /// Brand logo attached to every generation call; repeatable.
    #[arg(long = "logo-image")]
    logo_images: Vec<PathBuf>,
}

fn main() {
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("pawpress error: {err:#}");
            std::process::exit(1);
        }
    }
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    match cli.command {
        Command::Themes(args) => run_themes(args),
        Command::Resolve(args) => run_resolve(args),
        Command::Run(args) => run_generate(args),
    }
}

fn run_themes(args: ThemesArgs) -> Result<i32> {
    let catalog = ThemeCatalog::default();
    let filter = match args.category.as_deref().map(str::trim) {
        Some(raw) => match Category::parse(raw) {
            Some(category) => Some(category),
            None => bail!(
                "unknown category '{raw}' (expected one of: {})",
                Category::all()
                    .iter()
                    .map(|category| category.as_str())
                    .collect::<Vec<_>>()
                    .join(", ")
            ),
        },
        None => None,
    };

    for theme in catalog.all() {
        if filter.is_some_and(|category| theme.category != category) {
            continue;
        }
        let badge = theme
            .badge
            .as_deref()
            .map(|badge| format!("  [{badge}]"))
            .unwrap_or_default();
        println!(
            "{:<12} {:<24} {}{badge}",
            theme.category, theme.title, theme.template
        );
    }
    Ok(0)
}

fn run_resolve(args: ResolveArgs) -> Result<i32> {
    let state = selection_from(&args.select)?;
    let catalog = ThemeCatalog::default();
    let mut rng = seeded_rng(args.seed);
    let jobs = match resolve_selection(&state, &catalog, args.count, &mut rng) {
        Ok(jobs) => jobs,
        Err(err) => {
            eprintln!("{err}");
            return Ok(2);
        }
    };
    for (index, job) in jobs.iter().enumerate() {
        println!("{:>2}. {}", index + 1, describe_job(job, &catalog));
    }
    Ok(0)
}

fn run_generate(args: RunArgs) -> Result<i32> {
    let state = selection_from(&args.select)?;
    let context = session_context_from(&args)?;
    let collaborators = CollaboratorSet::for_provider(&args.provider)?;
    let run = PageRun::new(&args.out, collaborators)?;

    // Status lines stream from a poller thread while generate() blocks.
    let progress = run.progress();
    let (stop_tx, stop_rx) = mpsc::channel::<()>();
    let poller = thread::spawn(move || {
        let mut last = String::new();
        loop {
            match stop_rx.recv_timeout(Duration::from_millis(200)) {
                Err(mpsc::RecvTimeoutError::Timeout) => {
                    let snapshot = progress.snapshot();
                    if !snapshot.status.is_empty() && snapshot.status != last {
                        println!("{}", snapshot.status);
                        last = snapshot.status;
                    }
                }
                Ok(()) | Err(mpsc::RecvTimeoutError::Disconnected) => break,
            }
        }
    });

    let outcome = run.generate(&state, &context, args.count, args.seed);
    let _ = stop_tx.send(());
    let _ = poller.join();

    let report = match outcome {
        Ok(report) => report,
        Err(err) if is_validation_error(&err) => {
            eprintln!("{err}");
            return Ok(2);
        }
        Err(err) => return Err(err),
    };

    for page in &report.pages {
        println!("{}", page.path.display());
        println!("    {}", page.caption);
    }
    if let Some(warning) = &report.warning {
        eprintln!("warning: {warning}");
    }
    println!(
        "{} of {} pages created in {}",
        report.pages.len(),
        report.requested,
        report.run_dir.display()
    );
    Ok(0)
}

fn is_validation_error(err: &anyhow::Error) -> bool {
    err.downcast_ref::<SelectionError>().is_some() || err.downcast_ref::<CompileError>().is_some()
}

fn seeded_rng(seed: Option<u64>) -> StdRng {
    match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_os_rng(),
    }
}

fn selection_from(args: &SelectArgs) -> Result<SelectionState> {
    let mut state = match &args.selection {
        Some(path) => load_json(path).context("failed loading selection state")?,
        None => SelectionState::default(),
    };
    for id in &args.themes {
        state.toggle(id.trim());
    }
    if let Some(value) = trimmed(&args.custom_theme) {
        state.custom_theme = value;
    }
    if let Some(value) = trimmed(&args.custom_food) {
        state.custom_food = value;
    }
    if let Some(value) = trimmed(&args.costume) {
        state.costume = value;
    }
    if let Some(value) = trimmed(&args.sport) {
        state.sport = value;
    }
    if let Some(value) = trimmed(&args.team) {
        state.team = value;
    }
    if let Some(value) = trimmed(&args.poster_style) {
        state.poster_style = value;
    }
    Ok(state)
}

fn session_context_from(args: &RunArgs) -> Result<SessionContext> {
    let mut context: SessionContext = match &args.context {
        Some(path) => load_json(path).context("failed loading session context")?,
        None => SessionContext::default(),
    };
    if let Some(name) = &args.pet_name {
        context.pet_name = name.clone();
    }
    if let Some(handle) = trimmed(&args.handle) {
        context.handle = Some(handle);
    }
    if args.gender.is_some() {
        context.gender = parse_gender(args.gender.as_deref());
    }
    context
        .product_images
        .extend(args.product_images.iter().map(|path| image_ref(path)));
    context
        .logo_images
        .extend(args.logo_images.iter().map(|path| image_ref(path)));
    Ok(context)
}

fn load_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let content =
        std::fs::read_to_string(path).with_context(|| format!("failed reading {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("invalid JSON in {}", path.display()))
}

fn parse_gender(raw: Option<&str>) -> Gender {
    match raw.map(str::trim).map(str::to_ascii_lowercase).as_deref() {
        Some("boy") | Some("male") => Gender::Boy,
        Some("girl") | Some("female") => Gender::Girl,
        _ => Gender::Unspecified,
    }
}

fn image_ref(path: &Path) -> ImageRef {
    let mime_type = match path
        .extension()
        .and_then(|value| value.to_str())
        .map(str::to_ascii_lowercase)
        .as_deref()
    {
        Some("png") => Some("image/png".to_string()),
        Some("jpg") | Some("jpeg") => Some("image/jpeg".to_string()),
        Some("webp") => Some("image/webp".to_string()),
        _ => None,
    };
    ImageRef {
        path: path.to_string_lossy().to_string(),
        mime_type,
    }
}

fn trimmed(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

fn describe_job(job: &ResolvedJob, catalog: &ThemeCatalog) -> String {
    match job {
        ResolvedJob::Theme(id) => match catalog.get(id) {
            Some(theme) => format!("{}  ({})", theme.title, theme.category),
            None => id.clone(),
        },
        ResolvedJob::HalloweenCostume(costume) => format!("halloween costume: {costume}"),
    }
}
