//! Filterboxd CLI
//!
//! Offline tools for a Filterboxd settings export: lint the film list,
//! print the generated stylesheet, preview a filter pass over a saved page,
//! and remove duplicate film entries.

use std::collections::HashMap;
use std::fs;

use clap::{Parser, Subcommand};

use fbx_core::dom::memory::MemoryDom;
use fbx_core::markers::{FILM_MARKERS, FILTERED_FILM, FILTERED_REVIEW};
use fbx_core::selector::Compound;
use fbx_core::{apply_filters, stylesheet, AppContext, Dom, FilmFilter, FilterStore, Selector};

mod store;

use store::JsonFileStore;

#[derive(Parser)]
#[command(name = "fbx-cli")]
#[command(about = "Filterboxd settings export tools")]
struct Cli {
    /// Log engine diagnostics to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Lint the film list for broken and duplicate entries
    Check {
        /// Settings export (JSON)
        #[arg(short, long)]
        settings: String,
    },

    /// Print the stylesheet generated from the stored behaviors
    Stylesheet {
        /// Settings export (JSON)
        #[arg(short, long)]
        settings: String,
    },

    /// Run one filter pass over a saved HTML page and report what it touched
    Preview {
        /// Settings export (JSON)
        #[arg(short, long)]
        settings: String,

        /// Saved page (HTML)
        #[arg(short, long)]
        page: String,
    },

    /// Rewrite the film list without duplicate ids
    Dedupe {
        /// Settings export (JSON)
        #[arg(short, long)]
        settings: String,

        /// Report only, do not write the file
        #[arg(long)]
        dry_run: bool,
    },
}

fn main() {
    let cli = Cli::parse();

    let default_filter = if cli.verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter)).init();

    let result = match cli.command {
        Commands::Check { settings } => cmd_check(&settings),
        Commands::Stylesheet { settings } => cmd_stylesheet(&settings),
        Commands::Preview { settings, page } => cmd_preview(&settings, &page),
        Commands::Dedupe { settings, dry_run } => cmd_dedupe(&settings, dry_run),
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

fn open_store(path: &str) -> Result<FilterStore<JsonFileStore>, String> {
    JsonFileStore::open(path)
        .map(FilterStore::new)
        .map_err(|e| format!("Failed to open '{}': {}", path, e))
}

/// Problems in a film list, as printable lines.
fn lint_films(films: &FilmFilter) -> Vec<String> {
    let mut problems = Vec::new();
    let mut first_seen: HashMap<u64, usize> = HashMap::new();

    for (index, entry) in films.iter().enumerate() {
        if entry.is_broken() {
            problems.push(format!("[{}] {}: missing id or name ({:?})", index, entry.label(), entry.slug));
        }
        if let Some(id) = entry.id {
            if let Some(first) = first_seen.get(&id) {
                problems.push(format!("[{}] {}: duplicate of entry {} (id {})", index, entry.label(), first, id));
            } else {
                first_seen.insert(id, index);
            }
        }
    }
    problems
}

fn cmd_check(settings: &str) -> Result<(), String> {
    let store = open_store(settings)?;
    let films = store.film_filter();
    let problems = lint_films(&films);

    println!("Film list: {} entries", films.len());
    println!("  Behaviors: film {:?}, review {:?}", store.behaviors().film, store.behaviors().review);
    println!("  Log level: {:?}", store.log_level());

    if problems.is_empty() {
        println!("  No problems found");
        return Ok(());
    }
    for problem in &problems {
        println!("  {}", problem);
    }
    Err(format!("{} problem(s) found", problems.len()))
}

fn cmd_stylesheet(settings: &str) -> Result<(), String> {
    let store = open_store(settings)?;
    print!("{}", stylesheet::generate(&store.behaviors()));
    Ok(())
}

fn cmd_preview(settings: &str, page: &str) -> Result<(), String> {
    let store = open_store(settings)?;
    let html = fs::read_to_string(page).map_err(|e| format!("Failed to read '{}': {}", page, e))?;

    let ctx = AppContext::new(MemoryDom::from_html(&html), store);
    let report = apply_filters(&ctx);

    println!("Preview of '{}'", page);
    println!("  Films:    {} fragment(s)", report.films);
    println!("  Reviews:  {} element(s)", report.reviews);
    println!("  Sections: {} element(s)", report.sections);

    let listings = [
        ("Matched film fragments", FILM_MARKERS.applied),
        ("Filtered film containers", FILTERED_FILM),
        ("Filtered reviews", FILTERED_REVIEW),
    ];
    for (title, class) in listings {
        let nodes = ctx.dom.query_all(&Selector::from(Compound::class(class)));
        if nodes.is_empty() {
            continue;
        }
        println!("{}:", title);
        for node in nodes {
            println!("  {}", ctx.dom.describe(node));
        }
    }
    Ok(())
}

fn cmd_dedupe(settings: &str, dry_run: bool) -> Result<(), String> {
    let mut store = open_store(settings)?;
    let mut films = store
        .try_film_filter()
        .map_err(|e| format!("Failed to read the film list: {}", e))?;
    let removed = films.dedupe();

    if removed == 0 {
        println!("No duplicate films in '{}'", settings);
        return Ok(());
    }
    println!("Removed {} duplicate film(s), {} remain", removed, films.len());
    if dry_run {
        return Ok(());
    }

    if !store.set_film_filter(&films) || !store.save() {
        return Err(format!("Failed to write '{}'", store.backend().path().display()));
    }
    println!("Wrote '{}'", settings);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use fbx_core::FilmFilterEntry;

    #[test]
    fn lint_reports_broken_and_duplicate_entries() {
        let films: FilmFilter = serde_json::from_value(serde_json::json!([
            { "id": 42, "slug": "up", "name": "Up" },
            { "slug": "mystery" },
            { "id": "42", "slug": "up", "name": "Up" },
        ]))
        .unwrap();

        let problems = lint_films(&films);

        assert_eq!(problems.len(), 2);
        assert!(problems[0].starts_with("[1] Broken, please remove"));
        assert!(problems[1].contains("duplicate of entry 0"));
    }

    #[test]
    fn clean_list_has_no_problems() {
        let films = FilmFilter::new(vec![
            FilmFilterEntry::new(1, "a", Some("A"), None),
            FilmFilterEntry::new(2, "b", Some("B"), Some("1999")),
        ]);
        assert!(lint_films(&films).is_empty());
    }
}
