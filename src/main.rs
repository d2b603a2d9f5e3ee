use std::{path::PathBuf, sync::Arc};

use anyhow::{Context, Result, bail};
use clap::{ArgAction, Parser, Subcommand};
use dialoguer::{FuzzySelect, Select};
use tracing::warn;
use tracing_subscriber::EnvFilter;

use anidesk::{
    Error,
    cache::{self, EnrichmentCache, ImageCache},
    history::{HistoryEntry, theme},
    player::{Action, LaunchRequest, PlaybackLauncher},
    poller,
    providers::{AnimeProvider, allanime::AllAnimeClient, jikan::JikanClient},
    ratelimit::RateLimiter,
    session::Session,
    settings::{Settings, default_config_path},
    store::LibraryStore,
    types::{QUALITY_PRESETS, ResultRecord, SortKey, Translation, next_episode_label},
};

#[derive(Debug, Parser)]
#[command(
    name = "anidesk",
    about = "Search AllAnime, keep a library and hand episodes to ani-cli.",
    version
)]
struct Cli {
    #[arg(long, global = true)]
    dub: bool,

    #[arg(short = 'q', long, global = true, value_name = "QUALITY")]
    quality: Option<String>,

    /// Player ani-cli should use (exported as ANI_CLI_PLAYER).
    #[arg(long, global = true, value_name = "PLAYER")]
    player: Option<String>,

    #[arg(long, global = true, value_name = "DIR")]
    cache_dir: Option<PathBuf>,

    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Search by title and pick an episode.
    Search {
        #[arg(required = true, value_name = "QUERY")]
        query: Vec<String>,
    },
    /// Page through the catalogue.
    Browse {
        #[arg(long, value_enum, default_value_t = SortKey::Recent)]
        sort: SortKey,
        #[arg(long, default_value_t = 1)]
        page: u32,
    },
    /// Replay something from the watch history.
    History,
    Library {
        #[command(subcommand)]
        action: LibraryCommand,
    },
    /// Check tracked titles for new episodes.
    Update,
    /// Launch ani-cli directly.
    Play {
        #[arg(long)]
        query: String,
        #[arg(long)]
        index: usize,
        #[arg(short = 'e', long)]
        episode: String,
        #[arg(short = 'd', long)]
        download: bool,
    },
    Config {
        #[command(subcommand)]
        action: ConfigCommand,
    },
}

#[derive(Debug, Subcommand)]
enum LibraryCommand {
    List,
    /// Search and track a title.
    Add {
        #[arg(required = true, value_name = "QUERY")]
        query: Vec<String>,
    },
    Remove {
        id: String,
    },
    /// Pick a tracked title and watch it.
    Open,
}

#[derive(Debug, Subcommand)]
enum ConfigCommand {
    /// Write the default settings file.
    Init {
        #[arg(long)]
        force: bool,
    },
    Show,
}

enum PagePick {
    Record(ResultRecord),
    Next,
    Previous,
    Cancel,
}

struct App {
    settings: Settings,
    translation: Translation,
    allanime: AllAnimeClient,
    enrichment: EnrichmentCache<JikanClient>,
    launcher: PlaybackLauncher,
    session: Session,
    store: LibraryStore,
}

#[tokio::main]
async fn main() -> Result<()> {
    let result = run().await;
    if let Err(err) = &result {
        eprintln!("error: {err:?}");
    }
    result
}

async fn run() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if let Command::Config { action } = &cli.command {
        return run_config(action, cli.config.clone());
    }

    let mut settings = Settings::load(cli.config.as_deref()).context("failed to load settings")?;
    if cli.dub {
        settings.mode = Translation::Dub;
    }
    if let Some(quality) = cli.quality {
        settings.quality = quality;
    }
    if let Some(player) = cli.player {
        settings.player = player;
    }
    if let Some(dir) = cli.cache_dir {
        settings.cache_dir = Some(dir);
    }
    if !QUALITY_PRESETS.contains(&settings.quality.as_str()) {
        warn!(quality = %settings.quality, "unknown quality preset, passing it to ani-cli as is");
    }

    let mut app = App::new(settings)?;
    let outcome = app.dispatch(cli.command).await;
    app.shutdown();
    outcome
}

fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "anidesk=warn",
        1 => "anidesk=info",
        _ => "anidesk=debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn run_config(action: &ConfigCommand, file: Option<PathBuf>) -> Result<()> {
    match action {
        ConfigCommand::Init { force } => {
            let path = file
                .or_else(default_config_path)
                .context("could not determine config directory")?;
            if path.exists() && !force {
                bail!("{} already exists (use --force to overwrite)", path.display());
            }
            Settings::write_defaults(&path)?;
            println!("Wrote default settings to {}", path.display());
        }
        ConfigCommand::Show => {
            let settings = Settings::load(file.as_deref())?;
            print!("{}", toml::to_string_pretty(&settings)?);
        }
    }
    Ok(())
}

impl App {
    fn new(settings: Settings) -> Result<Self> {
        let images = Arc::new(ImageCache::default());
        let limiter = Arc::new(RateLimiter::default());
        let allanime = AllAnimeClient::new(settings.api_timeout())?;
        let jikan = JikanClient::new(settings.jikan_timeout())?;
        let thumbnails = settings.thumbnail_dir().unwrap_or_else(|err| {
            warn!(%err, "using a temporary thumbnail directory");
            std::env::temp_dir().join("anidesk-thumbnails")
        });
        let enrichment = EnrichmentCache::new(thumbnails, jikan, limiter, Arc::clone(&images));
        let launcher = PlaybackLauncher::new(&settings.ani_cli, Some(&settings.player))?;
        let store = LibraryStore::load(settings.store_file()?);
        Ok(Self {
            translation: settings.mode,
            settings,
            allanime,
            enrichment,
            launcher,
            session: Session::new(images),
            store,
        })
    }

    async fn dispatch(&mut self, command: Command) -> Result<()> {
        match command {
            Command::Search { query } => match search_text(&query) {
                Some(query) => self.search_flow(&query).await,
                None => {
                    println!("Search query cannot be empty.");
                    Ok(())
                }
            },
            Command::Browse { sort, page } => self.browse_flow(sort, page).await,
            Command::History => self.history_flow(),
            Command::Library { action } => match action {
                LibraryCommand::List => {
                    self.print_library();
                    Ok(())
                }
                LibraryCommand::Add { query } => match search_text(&query) {
                    Some(query) => self.library_add(&query).await,
                    None => {
                        println!("Search query cannot be empty.");
                        Ok(())
                    }
                },
                LibraryCommand::Remove { id } => {
                    match self.store.untrack(&id) {
                        Some(entry) => println!("Removed '{}' from the library.", entry.title),
                        None => println!("No library entry with id {id}."),
                    }
                    Ok(())
                }
                LibraryCommand::Open => self.library_open().await,
            },
            Command::Update => self.update_flow().await,
            Command::Play {
                query,
                index,
                episode,
                download,
            } => {
                let action = if download { Action::Download } else { Action::Play };
                let entry = HistoryEntry::new(&query, &episode, &query, index);
                self.session.select_history(&entry);
                self.launch(action)
            }
            Command::Config { .. } => Ok(()),
        }
    }

    fn shutdown(&self) {
        if let Err(err) = self.store.save() {
            warn!(%err, "library not saved");
            eprintln!("Could not save library: {err}");
        }
    }

    async fn search_flow(&mut self, query: &str) -> Result<()> {
        let Some(record) = self.load_search(query).await? else {
            return Ok(());
        };
        self.session.select_anime(&record);
        self.detail_flow(record).await
    }

    /// Runs a search, enriches the page and lets the user pick one record.
    async fn load_search(&mut self, query: &str) -> Result<Option<ResultRecord>> {
        let ticket = self.session.begin(query);
        println!("Searching for '{query}'...");
        let mut results = self
            .allanime
            .search_shows(query, self.translation)
            .await
            .with_context(|| format!("search for '{query}' failed"))?;
        if results.is_empty() {
            println!("No results found for '{query}'.");
            return Ok(None);
        }
        println!("Found {} results. Fetching details...", results.len());
        self.enrichment.enrich_all(&mut results).await;
        self.session.apply(ticket, results);

        match self.pick_from_page(None)? {
            PagePick::Record(record) => Ok(Some(record)),
            _ => Ok(None),
        }
    }

    async fn browse_flow(&mut self, sort: SortKey, first_page: u32) -> Result<()> {
        let mut page = first_page.max(1);
        loop {
            let ticket = self.session.begin("");
            println!("Loading page {page}...");
            let mut results = self
                .allanime
                .browse_shows(self.translation, sort, page)
                .await;
            if results.is_empty() {
                println!("Nothing to show on page {page}.");
                if page == 1 {
                    return Ok(());
                }
                page -= 1;
                continue;
            }
            self.enrichment.enrich_all(&mut results).await;
            self.session.apply(ticket, results);

            match self.pick_from_page(Some(page))? {
                PagePick::Record(record) => {
                    self.session.select_anime(&record);
                    return self.detail_flow(record).await;
                }
                PagePick::Next => page += 1,
                PagePick::Previous => page = page.saturating_sub(1).max(1),
                PagePick::Cancel => return Ok(()),
            }
        }
    }

    fn pick_from_page(&self, page: Option<u32>) -> Result<PagePick> {
        let results = self.session.results();
        let images = self.session.images();
        let mut items: Vec<String> = results
            .iter()
            .map(|r| {
                let art = if images.get_or_placeholder(&r.id).is_placeholder() {
                    ""
                } else {
                    " \u{25a3}"
                };
                format!("{:>2}. {}{}", r.index, r.label(), art)
            })
            .collect();
        let mut has_prev = false;
        if let Some(page) = page {
            items.push(String::from("Next page \u{203a}"));
            if page > 1 {
                items.push(String::from("\u{2039} Previous page"));
                has_prev = true;
            }
        }

        let selection = Select::with_theme(&theme())
            .with_prompt("Select an anime (Esc to cancel)")
            .items(&items)
            .default(0)
            .interact_opt()?;
        Ok(match selection {
            None => PagePick::Cancel,
            Some(idx) if idx < results.len() => PagePick::Record(results[idx].clone()),
            Some(idx) if idx == results.len() => PagePick::Next,
            Some(_) if has_prev => PagePick::Previous,
            Some(_) => PagePick::Cancel,
        })
    }

    async fn detail_flow(&mut self, record: ResultRecord) -> Result<()> {
        println!();
        println!("{}", record.label());
        if let Some(thumb) = self.session.images().get(&record.id) {
            if !thumb.is_placeholder() {
                println!(
                    "Artwork cached ({}x{}) in {}",
                    thumb.image().width(),
                    thumb.image().height(),
                    self.enrichment.dir().display()
                );
            }
        }
        println!(
            "{}",
            record
                .synopsis
                .as_deref()
                .unwrap_or(cache::DEFAULT_SYNOPSIS)
        );
        println!();

        println!("Fetching episodes for '{}'...", record.title);
        let episodes = match self
            .allanime
            .fetch_episodes(&record.id, self.translation)
            .await
        {
            Ok(episodes) => episodes,
            Err(err) => {
                println!("Could not fetch episodes: {err}");
                return Ok(());
            }
        };
        if episodes.is_empty() {
            println!(
                "No {} episodes available for {}.",
                self.translation.label(),
                record.title
            );
            return Ok(());
        }

        let last_watched = self
            .store
            .history()
            .latest_first()
            .find(|e| e.title == record.title)
            .map(|e| e.episode.clone());
        if let Some(prev) = &last_watched {
            println!("Last watched episode: {prev}.");
        }
        let default_idx = last_watched
            .and_then(|prev| next_episode_label(&prev, &episodes))
            .and_then(|next| episodes.iter().position(|ep| *ep == next))
            .unwrap_or(0);

        let labels: Vec<String> = episodes.iter().map(|ep| format!("Episode {ep}")).collect();
        let selection = FuzzySelect::with_theme(&theme())
            .with_prompt(format!("Select an episode of '{}'", record.title))
            .items(&labels)
            .default(default_idx)
            .interact_opt()?;
        let Some(idx) = selection else {
            println!("Cancelled.");
            return Ok(());
        };
        self.session.select_episode(&episodes[idx]);
        println!("Selected Episode {}. Ready to play or download.", episodes[idx]);

        let tracked = self.store.is_tracked(&record.id);
        let library_label = if tracked {
            "Remove from library"
        } else {
            "Add to library"
        };
        let choices = ["Play", "Download", library_label];
        let choice = Select::with_theme(&theme())
            .with_prompt("What next?")
            .items(&choices)
            .default(0)
            .interact_opt()?;
        match choice {
            Some(0) => self.launch_resolved(Action::Play).await,
            Some(1) => self.launch_resolved(Action::Download).await,
            Some(2) if tracked => {
                self.store.untrack(&record.id);
                println!("Removed '{}' from the library.", record.title);
                Ok(())
            }
            Some(2) => {
                let title = record.title.clone();
                self.store.track(record);
                println!("Added '{title}' to the library.");
                Ok(())
            }
            _ => Ok(()),
        }
    }

    async fn launch_resolved(&mut self, action: Action) -> Result<()> {
        match self
            .session
            .resolve_for_playback(&self.allanime, self.translation)
            .await
        {
            Ok(true) => {}
            Ok(false) => {
                println!("Could not find this title in a search to hand to ani-cli.");
                return Ok(());
            }
            Err(err) => {
                println!("Could not resolve title for ani-cli: {err}");
                return Ok(());
            }
        }
        self.launch(action)
    }

    fn launch(&mut self, action: Action) -> Result<()> {
        let request = match LaunchRequest::from_selection(
            self.session.selection(),
            &self.settings.quality,
            self.translation,
            action,
        ) {
            Ok(request) => request,
            Err(err @ Error::SelectionIncomplete { .. }) => {
                println!("Error: {err}.");
                return Ok(());
            }
            Err(err) => return Err(err.into()),
        };
        println!(
            "{} Ep {} of '{}'...",
            action.verb(),
            request.episode,
            request.title
        );
        if let Err(err) = self.launcher.launch(&request, &mut self.store) {
            println!("Failed to execute command: {err}");
        }
        Ok(())
    }

    fn history_flow(&mut self) -> Result<()> {
        let Some(entry) = self.store.history().select_entry()? else {
            return Ok(());
        };
        self.session.select_history(&entry);
        self.launch(Action::Play)
    }

    fn print_library(&self) {
        let library = self.store.library();
        if library.is_empty() {
            println!("Library is empty. Add titles with `anidesk library add <query>`.");
            return;
        }
        for entry in library.values() {
            println!("{:<28} {}", entry.id, entry.label());
        }
    }

    async fn library_add(&mut self, query: &str) -> Result<()> {
        let Some(record) = self.load_search(query).await? else {
            return Ok(());
        };
        let title = record.title.clone();
        if self.store.track(record) {
            println!("Added '{title}' to the library.");
        } else {
            println!("'{title}' was already tracked; refreshed its entry.");
        }
        Ok(())
    }

    async fn library_open(&mut self) -> Result<()> {
        let entries: Vec<ResultRecord> = self.store.library().values().cloned().collect();
        if entries.is_empty() {
            self.print_library();
            return Ok(());
        }
        let labels: Vec<String> = entries.iter().map(ResultRecord::label).collect();
        let selection = Select::with_theme(&theme())
            .with_prompt("Select a tracked title (Esc to cancel)")
            .items(&labels)
            .default(0)
            .interact_opt()?;
        let Some(idx) = selection else {
            return Ok(());
        };
        let record = entries[idx].clone();
        self.session.begin("");
        self.session.select_detached(&record);
        self.detail_flow(record).await
    }

    async fn update_flow(&mut self) -> Result<()> {
        if self.store.library().is_empty() {
            println!("Library is empty; nothing to check.");
            return Ok(());
        }
        println!(
            "Checking {} tracked titles for new episodes...",
            self.store.library().len()
        );
        let mut report = poller::check_updates(
            &self.allanime,
            &mut self.store,
            self.translation,
            poller::TITLE_PAUSE,
        )
        .await;
        if let Err(err) = self.store.save() {
            warn!(%err, "library not saved after update");
        }

        if report.failed > 0 {
            println!("{} of {} titles could not be checked.", report.failed, report.checked);
        }
        if report.updated.is_empty() {
            println!("No new episodes.");
            return Ok(());
        }

        let ticket = self.session.begin("");
        self.enrichment.enrich_all(&mut report.updated).await;
        for record in &report.updated {
            println!("New episodes: {}", record.label());
            if let Some(synopsis) = &record.synopsis {
                println!("    {}", excerpt(synopsis, 160));
            }
        }
        self.session.apply(ticket, report.updated);
        Ok(())
    }
}

fn excerpt(text: &str, max_chars: usize) -> String {
    let mut out: String = text.chars().take(max_chars).collect();
    if text.chars().count() > max_chars {
        out.push('\u{2026}');
    }
    out
}

/// Joins the words of a query; `None` when nothing but whitespace was given.
fn search_text(words: &[String]) -> Option<String> {
    let joined = words.join(" ");
    let trimmed = joined.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn words(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn blank_queries_are_rejected() {
        assert_eq!(search_text(&words(&[" "])), None);
        assert_eq!(search_text(&words(&["", "\t"])), None);
        assert_eq!(search_text(&[]), None);
    }

    #[test]
    fn query_words_are_joined_and_trimmed() {
        assert_eq!(
            search_text(&words(&[" solo", "leveling "])).as_deref(),
            Some("solo leveling")
        );
    }

    #[test]
    fn cli_parses_search_words() {
        let cli = Cli::try_parse_from(["anidesk", "--dub", "search", "solo", "leveling"]).unwrap();
        assert!(cli.dub);
        match cli.command {
            Command::Search { query } => assert_eq!(search_text(&query).as_deref(), Some("solo leveling")),
            other => panic!("unexpected command {other:?}"),
        }
    }
}
