pub mod config;
pub mod feed;
pub mod likes;
pub mod model;
pub mod session;

use std::path::PathBuf;

use chrono::{Days, Local};
use clap::{Parser, Subcommand, error::ErrorKind};
use colored::Colorize;
use serde_json::{Value, json};
use tracing::debug;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::{ConfigError, FeedConfig};
use crate::feed::{FailureClass, FetchError, NoticeKind, PageOutcome};
use crate::likes::{LikedSet, LikesError};
use crate::model::{ApodRecord, DateInterval, DayKey, LikeFilter, SortDirection, format_day};
use crate::session::{BrowseSession, SessionError};

/// Days shown when no start date is given, counting the end date.
const DEFAULT_WINDOW_DAYS: u64 = 7;

#[derive(Parser, Debug, Clone)]
#[command(
    name = "apod",
    version,
    about = "Browse the astronomy picture of the day over any date range"
)]
pub struct Cli {
    /// Emit machine-readable JSON
    #[arg(long, global = true)]
    pub json: bool,

    /// Log data-layer activity to stderr
    #[arg(long, short, global = true)]
    pub verbose: bool,

    /// Config file (defaults to the XDG config dir)
    #[arg(long, global = true, env = "APOD_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// List pictures in a date range, loading pages incrementally
    Browse {
        /// First day (YYYY-MM-DD); defaults to a week before --end
        #[arg(long, value_parser = parse_day_arg)]
        start: Option<DayKey>,

        /// Last day (YYYY-MM-DD); defaults to today
        #[arg(long, value_parser = parse_day_arg)]
        end: Option<DayKey>,

        /// Case-insensitive text to match in titles
        #[arg(long, short, default_value = "")]
        query: String,

        #[arg(long, value_enum, default_value_t = LikeFilter::All)]
        filter: LikeFilter,

        #[arg(long, value_enum, default_value_t = SortDirection::Newest)]
        sort: SortDirection,

        /// Number of pages to load
        #[arg(long, default_value_t = 1, value_parser = clap::value_parser!(u64).range(1..))]
        pages: u64,

        /// Load pages until the range is exhausted
        #[arg(long, conflicts_with = "pages")]
        all: bool,

        /// Days per page
        #[arg(long)]
        page_days: Option<u32>,

        #[arg(long, env = "APOD_API_KEY", hide_env_values = true)]
        api_key: Option<String>,

        /// Include cache and request statistics
        #[arg(long)]
        stats: bool,
    },
    /// Mark a day as liked
    Like {
        #[arg(value_parser = parse_day_arg)]
        day: DayKey,
    },
    /// Remove a day from the liked set
    Unlike {
        #[arg(value_parser = parse_day_arg)]
        day: DayKey,
    },
    /// List liked days
    Likes,
}

fn parse_day_arg(raw: &str) -> Result<DayKey, String> {
    model::parse_day(raw).map_err(|e| format!("expected YYYY-MM-DD: {e}"))
}

#[derive(Debug, Clone)]
pub struct ParsedCli {
    pub cli: Cli,
}

/// Error surfaced to the user, with the exit code the process should use.
#[derive(Debug, Clone)]
pub struct CliError {
    pub code: i32,
    pub kind: &'static str,
    pub message: String,
    pub hint: Option<String>,
    pub retryable: bool,
}

impl CliError {
    fn usage(message: impl Into<String>) -> Self {
        Self {
            code: 2,
            kind: "usage",
            message: message.into(),
            hint: Some("Run `apod --help` for usage.".into()),
            retryable: false,
        }
    }

    /// Structured form used for `--json` error output.
    pub fn to_json(&self) -> Value {
        json!({
            "error": {
                "code": self.code,
                "kind": self.kind,
                "message": self.message,
                "hint": self.hint,
                "retryable": self.retryable,
            }
        })
    }
}

impl std::fmt::Display for CliError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)?;
        if let Some(hint) = &self.hint {
            write!(f, "\n{hint}")?;
        }
        Ok(())
    }
}

impl std::error::Error for CliError {}

impl From<ConfigError> for CliError {
    fn from(err: ConfigError) -> Self {
        Self {
            code: 3,
            kind: "config",
            message: err.to_string(),
            hint: Some("Check the config file and APOD_* environment variables.".into()),
            retryable: false,
        }
    }
}

impl From<LikesError> for CliError {
    fn from(err: LikesError) -> Self {
        Self {
            code: 6,
            kind: "likes",
            message: err.to_string(),
            hint: Some("Fix or remove the likes file, or set APOD_LIKES_PATH.".into()),
            retryable: false,
        }
    }
}

impl From<&FetchError> for CliError {
    fn from(err: &FetchError) -> Self {
        let class = err.class();
        Self {
            code: match class {
                FailureClass::UpstreamClientError => 4,
                FailureClass::UpstreamServerError | FailureClass::UpstreamUnknownError => 5,
            },
            kind: class.code(),
            message: format!("{} ({err})", class.message()),
            hint: Some(class.suggestion().to_string()),
            retryable: class.is_retryable(),
        }
    }
}

impl From<SessionError> for CliError {
    fn from(err: SessionError) -> Self {
        match err {
            SessionError::Client(fetch) => Self::from(&fetch),
            SessionError::Cache(cache) => Self {
                code: 3,
                kind: "config",
                message: cache.to_string(),
                hint: Some("Set cache_capacity to at least 1.".into()),
                retryable: false,
            },
            SessionError::Likes(likes) => Self::from(likes),
        }
    }
}

/// Parse command-line arguments. Help and version requests come back as an
/// error with exit code 0 so the caller can print them and stop.
pub fn parse_cli(args: Vec<String>) -> Result<ParsedCli, CliError> {
    match Cli::try_parse_from(args) {
        Ok(cli) => Ok(ParsedCli { cli }),
        Err(err) => match err.kind() {
            ErrorKind::DisplayHelp
            | ErrorKind::DisplayVersion
            | ErrorKind::DisplayHelpOnMissingArgumentOrSubcommand => Err(CliError {
                code: 0,
                kind: "help",
                message: err.to_string(),
                hint: None,
                retryable: false,
            }),
            _ => Err(CliError::usage(err.to_string().trim_end())),
        },
    }
}

/// Install the stderr log subscriber. `RUST_LOG` wins over `verbose`.
pub fn init_tracing(verbose: bool) {
    let default = if verbose { "apod_browse=debug" } else { "warn" };
    let _ = tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)))
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false),
        )
        .try_init();
}

pub async fn run_with_parsed(parsed: ParsedCli) -> Result<(), CliError> {
    let cli = parsed.cli;
    init_tracing(cli.verbose);

    let config = match &cli.config {
        Some(path) => FeedConfig::load_from(path)?,
        None => FeedConfig::load()?,
    };
    debug!(base_url = %config.base_url, cache_capacity = config.cache_capacity, "config loaded");

    let command = cli.command.clone().unwrap_or(Commands::Browse {
        start: None,
        end: None,
        query: String::new(),
        filter: LikeFilter::All,
        sort: SortDirection::Newest,
        pages: 1,
        all: false,
        page_days: None,
        api_key: None,
        stats: false,
    });

    match command {
        Commands::Browse {
            start,
            end,
            query,
            filter,
            sort,
            pages,
            all,
            page_days,
            api_key,
            stats,
        } => {
            let mut config = config;
            if let Some(key) = api_key {
                config.api_key = key;
            }
            if let Some(days) = page_days {
                config.page_days = days;
            }
            config.validate()?;

            let interval = default_interval(start, end, Local::now().date_naive());
            let request = BrowseRequest {
                interval,
                query,
                filter,
                sort,
                max_pages: if all {
                    None
                } else {
                    Some(usize::try_from(pages).unwrap_or(usize::MAX))
                },
                stats,
                json: cli.json,
            };
            run_browse(&config, request).await
        }
        Commands::Like { day } => {
            let mut liked = LikedSet::try_load(&config.likes_path())?;
            let changed = liked.like(day);
            liked.save()?;
            print_like_change(cli.json, day, true, changed);
            Ok(())
        }
        Commands::Unlike { day } => {
            let mut liked = LikedSet::try_load(&config.likes_path())?;
            let changed = liked.unlike(day);
            liked.save()?;
            print_like_change(cli.json, day, false, changed);
            Ok(())
        }
        Commands::Likes => {
            let liked = LikedSet::try_load(&config.likes_path())?;
            if cli.json {
                let days: Vec<String> = liked.iter().map(format_day).collect();
                println!("{}", json!({ "liked": days, "count": days.len() }));
            } else if liked.is_empty() {
                println!("No liked days yet.");
            } else {
                for day in liked.iter() {
                    println!("{}", format_day(day));
                }
            }
            Ok(())
        }
    }
}

/// Resolve optional CLI endpoints into an interval. Reversed endpoints are swapped.
pub fn default_interval(start: Option<DayKey>, end: Option<DayKey>, today: DayKey) -> DateInterval {
    let end = end.unwrap_or(today);
    let start = start.unwrap_or_else(|| {
        end.checked_sub_days(Days::new(DEFAULT_WINDOW_DAYS - 1))
            .unwrap_or(end)
    });
    DateInterval::new(start, end)
}

struct BrowseRequest {
    interval: DateInterval,
    query: String,
    filter: LikeFilter,
    sort: SortDirection,
    max_pages: Option<usize>,
    stats: bool,
    json: bool,
}

async fn run_browse(config: &FeedConfig, request: BrowseRequest) -> Result<(), CliError> {
    let mut session = BrowseSession::from_config(config, request.interval, request.sort)?;
    session.set_query(request.query.clone());
    session.set_like_filter(request.filter);

    let outcomes = session.load_pages(request.max_pages).await;
    let failure = session.controller().last_error().map(CliError::from);

    let (mut cache_hits, mut requests, mut fetched) = (0usize, Vec::new(), 0usize);
    for outcome in &outcomes {
        if let PageOutcome::Delivered { report, .. } = outcome {
            cache_hits += report.cache_hits;
            fetched += report.fetched;
            requests.extend(report.requested.iter().map(ToString::to_string));
        }
    }

    let notices: Vec<Value> = session
        .notices()
        .iter()
        .map(|n| json!({ "kind": n.kind.code(), "message": n.message }))
        .collect();

    if request.json {
        let visible: Vec<Value> = session
            .visible()
            .into_iter()
            .map(|record| record_json(record, session.is_liked(record.date)))
            .collect();
        let mut payload = json!({
            "interval": {
                "start": format_day(request.interval.start()),
                "end": format_day(request.interval.end()),
            },
            "sort": request.sort,
            "filter": request.filter,
            "query": request.query,
            "state": session.state(),
            "has_more": session.has_more(),
            "pages_loaded": session.controller().cursor().page,
            "loaded": session.records().len(),
            "records": visible,
            "notices": notices,
        });
        if request.stats {
            let (hits, misses, evictions) = session.controller().coalescer().cache_stats();
            payload["stats"] = json!({
                "cache_hits": cache_hits,
                "fetched": fetched,
                "requests": requests,
                "cache": {
                    "hits": hits,
                    "misses": misses,
                    "evictions": evictions,
                    "entries": session.controller().coalescer().cache_len(),
                },
            });
        }
        println!("{payload}");
    } else {
        let visible = session.visible();
        if visible.is_empty() {
            println!("No pictures match.");
        }
        for record in &visible {
            print_record(record, session.is_liked(record.date));
        }
        println!(
            "\n{} of {} loaded, {} ({})",
            visible.len(),
            session.records().len(),
            request.interval,
            session.state()
        );
        if session.has_more() {
            println!("More days available: raise --pages or pass --all.");
        }
        if request.stats {
            let (hits, misses, evictions) = session.controller().coalescer().cache_stats();
            println!(
                "cache: {cache_hits} days reused, {fetched} fetched in {} request(s) [{}]; \
                 lookups {hits} hit / {misses} miss, {evictions} evicted",
                requests.len(),
                requests.join(", ")
            );
        }
        for notice in session.notices() {
            let line = match notice.kind {
                NoticeKind::Stall => notice.message.yellow(),
                NoticeKind::Failure(_) => notice.message.red(),
            };
            eprintln!("{line}");
        }
    }

    match failure {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

fn record_json(record: &ApodRecord, liked: bool) -> Value {
    let mut value = serde_json::to_value(record).unwrap_or_else(|_| json!({}));
    value["liked"] = json!(liked);
    value["display_date"] = json!(record.display_date());
    value
}

fn print_record(record: &ApodRecord, liked: bool) {
    let heart = if liked {
        "♥".red().to_string()
    } else {
        " ".to_string()
    };
    println!(
        "{} {} {} [{}]",
        record.display_date().dimmed(),
        heart,
        record.title.bold(),
        record.media_type
    );
    let link = match record.media_type {
        crate::model::MediaKind::Video => record.url.as_str(),
        _ => record.hdurl.as_deref().unwrap_or(record.url.as_str()),
    };
    if !link.is_empty() {
        println!("    {link}");
    }
    if let Some(attribution) = &record.attribution {
        println!("    © {}", attribution.trim());
    }
}

fn print_like_change(json_mode: bool, day: DayKey, liked: bool, changed: bool) {
    if json_mode {
        println!(
            "{}",
            json!({ "day": format_day(day), "liked": liked, "changed": changed })
        );
    } else {
        let verb = if liked { "Liked" } else { "Unliked" };
        if changed {
            println!("{verb} {}", format_day(day));
        } else {
            println!("{} was already {}", format_day(day), verb.to_lowercase());
        }
    }
}
