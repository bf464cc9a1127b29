//! lmdash - school learning-model enrollment explorer
//!
//! A CLI that loads enrollment-by-learning-model records, drives the
//! dashboard filter and highlight state, and writes every chart view as a
//! Markdown or JSON report.
//!
//! Exit codes:
//!   0 - Success
//!   1 - Runtime error (unreadable data, bad config, invalid filter, etc.)
//!   2 - Working set is empty and --fail-on-empty was set

use anyhow::{Context, Result};
use chrono::Utc;
use lmdash::cli::{Args, OutputFormat};
use lmdash::config::{Config, CONFIG_FILE};
use lmdash::dashboard::{Dashboard, DashboardEvent, DashboardSnapshot};
use lmdash::models::{Report, ReportMetadata};
use lmdash::store::{self, IngestStats, RecordStore};
use lmdash::{geo, report};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, error, info, warn};
use tracing_subscriber::FmtSubscriber;

const SESSION_HELP: &str = "\
Commands:
  slider N              move the time slider to index N
  month YYYY-MM         select a month
  district NAME|All     filter by district
  school-type TYPE|All  filter by school type
  model MODEL|All       filter by learning model
  enrollment MIN-MAX|All
  click MODEL           highlight a learning model
  click                 clear the highlight
  reset                 restore the initial selection
  show                  print the current views
  help                  show this help
  quit                  finish and write the report";

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command-line arguments
    let args = Args::parse_args();

    // Validate arguments
    if let Err(e) = args.validate() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    // Handle --init-config early (no logging needed)
    if args.init_config {
        return handle_init_config();
    }

    // Config is read before logging starts so general.verbose applies
    let (mut config, origin) = match load_config(&args) {
        Ok(loaded) => loaded,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            std::process::exit(1);
        }
    };
    config.merge_with_args(&args);

    init_logging(&args, config.general.verbose);

    info!("lmdash v{}", env!("CARGO_PKG_VERSION"));
    debug!("Arguments: {:?}", args);
    origin.log();

    match run(args, config).await {
        Ok(exit_code) => {
            std::process::exit(exit_code);
        }
        Err(e) => {
            error!("Run failed: {:#}", e);
            eprintln!("\n❌ Error: {:#}", e);
            std::process::exit(1);
        }
    }
}

/// Handle --init-config: generate a default .lmdash.toml.
fn handle_init_config() -> Result<()> {
    let path = Path::new(CONFIG_FILE);

    if path.exists() {
        eprintln!("⚠️  {} already exists. Remove it first or edit it manually.", CONFIG_FILE);
        std::process::exit(1);
    }

    let content = Config::default_toml();
    std::fs::write(path, &content).with_context(|| format!("Failed to write {}", CONFIG_FILE))?;

    println!("✅ Created {} with default settings.", CONFIG_FILE);
    println!("   Edit it to set the dataset path, initial filters and report options.");
    Ok(())
}

/// Initialize logging based on verbosity settings.
fn init_logging(args: &Args, config_verbose: bool) {
    let level = args.log_level(config_verbose);

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
    }
}

/// Run the load / replay / report workflow. Returns the exit code (0 or 2).
async fn run(args: Args, config: Config) -> Result<i32> {
    let start_time = Instant::now();

    // Step 1: load the dataset and the geography together
    let dataset = config.data.dataset.clone();
    let geography_path = config.data.geography.clone();
    println!("📥 Loading dataset: {}", dataset.display());

    let ((store, stats), geography) = futures::try_join!(
        store::load_csv(&dataset, !args.quiet),
        load_geography(geography_path.as_deref()),
    )?;

    if store.is_empty() {
        warn!("Dataset has no valid records; every view will be empty");
    }

    if args.list {
        print_listing(&store, &stats);
        return Ok(0);
    }

    // Step 2: initialize the dashboard and apply the configured selection
    let mut dashboard = Dashboard::new(store, config.highlight.dimmed_opacity);
    dashboard
        .apply_initial(initial_events(&config, args.highlight.as_deref())?)
        .context("Invalid initial selection")?;

    // Step 3: replay scripted or interactive events
    if let Some(ref script) = args.script {
        replay_script(&mut dashboard, script).await?;
    } else if args.interactive {
        run_session(&mut dashboard).await?;
    }

    let snapshot = dashboard.snapshot();

    // Step 4: annotate the geography for the map view
    if let (Some(mut collection), Some(input)) = (geography, geography_path.as_deref()) {
        match snapshot.selection.year_month {
            Some(month) => {
                let stats =
                    geo::annotate_features(&mut collection, dashboard.virtual_share(), month);
                let output = args
                    .geo_output
                    .clone()
                    .unwrap_or_else(|| annotated_path(input));
                geo::write_geojson(&output, &collection).await?;
                println!(
                    "🗺️  Annotated {} districts ({} with data) -> {}",
                    stats.annotated,
                    stats.matched,
                    output.display()
                );
            }
            None => warn!("No month selected; skipping geography annotation"),
        }
    }

    // Step 5: build and save the report
    let metadata = ReportMetadata {
        dataset: dataset.display().to_string(),
        generated_at: Utc::now(),
        records_loaded: stats.accepted,
        rows_dropped: stats.dropped,
        events_applied: dashboard.events_applied(),
        duration_seconds: start_time.elapsed().as_secs_f64(),
    };
    let working_set_size = snapshot.working_set_size;
    let report = Report { metadata, snapshot };

    let output = match config.general.format {
        OutputFormat::Json => report::generate_json_report(&report)?,
        OutputFormat::Markdown => report::generate_markdown_report(&report, &config.report),
    };
    let output_path = PathBuf::from(&config.general.output);
    report::write_report(&output_path, &output).await?;

    if !args.quiet {
        print_summary(&report.snapshot);
    }
    println!(
        "\n✅ Report saved to: {} ({:.1}s)",
        output_path.display(),
        report.metadata.duration_seconds
    );

    if args.fail_on_empty && working_set_size == 0 {
        eprintln!("\n⛔ Working set is empty. Failing (exit code 2).");
        return Ok(2);
    }

    Ok(0)
}

/// Where the configuration came from, logged once logging is up.
enum ConfigOrigin {
    File(PathBuf),
    Defaults,
    Unreadable(String),
}

impl ConfigOrigin {
    fn log(&self) {
        match self {
            ConfigOrigin::File(path) => info!("Loaded config from {}", path.display()),
            ConfigOrigin::Defaults => debug!("No config file found, using defaults"),
            ConfigOrigin::Unreadable(e) => warn!("Failed to load config: {}", e),
        }
    }
}

/// Load configuration from file or use defaults.
fn load_config(args: &Args) -> Result<(Config, ConfigOrigin)> {
    // Try explicit config path
    if let Some(ref config_path) = args.config {
        let config = Config::load(config_path)?;
        return Ok((config, ConfigOrigin::File(config_path.clone())));
    }

    match Config::load_default() {
        Ok(Some(config)) => Ok((config, ConfigOrigin::File(PathBuf::from(CONFIG_FILE)))),
        Ok(None) => Ok((Config::default(), ConfigOrigin::Defaults)),
        Err(e) => Ok((
            Config::default(),
            ConfigOrigin::Unreadable(format!("{:#}", e)),
        )),
    }
}

async fn load_geography(path: Option<&Path>) -> Result<Option<Value>> {
    match path {
        Some(path) => geo::load_geojson(path).await.map(Some),
        None => Ok(None),
    }
}

/// `districts.geojson` -> `districts.annotated.geojson`
fn annotated_path(input: &Path) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "districts".to_string());
    input.with_file_name(format!("{}.annotated.geojson", stem))
}

/// Turn the configured filters and highlight into dashboard events.
///
/// Values go through the same command parser the session uses, so "All"
/// and range syntax behave identically everywhere.
fn initial_events(config: &Config, highlight: Option<&str>) -> Result<Vec<DashboardEvent>> {
    let filters = &config.filters;
    let mut commands = Vec::new();

    if let Some(ref month) = filters.month {
        commands.push(format!("month {}", month));
    }
    commands.push(format!("district {}", filters.district));
    commands.push(format!("school-type {}", filters.school_type));
    commands.push(format!("model {}", filters.learning_model));
    commands.push(format!("enrollment {}", filters.enrollment_range));
    if let Some(model) = highlight {
        commands.push(format!("click {}", model));
    }

    commands
        .iter()
        .map(|command| {
            command
                .parse::<DashboardEvent>()
                .with_context(|| format!("Invalid filter setting: {}", command))
        })
        .collect()
}

/// Replay a command file. Bad lines are reported and skipped.
async fn replay_script(dashboard: &mut Dashboard, path: &Path) -> Result<()> {
    let content = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read script: {}", path.display()))?;

    let mut applied = 0;
    let mut rejected = 0;

    for (number, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let result = line
            .parse::<DashboardEvent>()
            .and_then(|event| dashboard.apply(event));
        match result {
            Ok(changed) => {
                applied += 1;
                debug!("{}:{} '{}' (changed: {})", path.display(), number + 1, line, changed);
            }
            Err(e) => {
                rejected += 1;
                warn!("{}:{} '{}' rejected: {}", path.display(), number + 1, line, e);
            }
        }
    }

    info!(
        "Replayed {}: {} events applied, {} rejected",
        path.display(),
        applied,
        rejected
    );
    Ok(())
}

/// Read commands from stdin until EOF or `quit`.
async fn run_session(dashboard: &mut Dashboard) -> Result<()> {
    println!("{}\n", SESSION_HELP);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    while let Some(line) = lines.next_line().await.context("Failed to read stdin")? {
        let line = line.trim();
        match line {
            "" => continue,
            "quit" | "exit" => break,
            "help" => println!("{}", SESSION_HELP),
            "show" => print_summary(&dashboard.snapshot()),
            command => {
                let result = command.parse::<DashboardEvent>().and_then(|event| {
                    let filters_changed = event.is_filter_change();
                    dashboard.apply(event).map(|changed| (changed, filters_changed))
                });
                match result {
                    Ok((false, _)) => println!("   (no change)"),
                    Ok((true, true)) => print_summary(&dashboard.snapshot()),
                    Ok((true, false)) => println!("   Highlight: {}", dashboard.highlight()),
                    Err(e) => println!("   ⚠️  {}", e),
                }
            }
        }
    }

    Ok(())
}

/// Handle --list: print every filter domain, exit.
fn print_listing(store: &RecordStore, stats: &IngestStats) {
    println!(
        "\n📋 {} rows read: {} records, {} dropped\n",
        stats.total(),
        stats.accepted,
        stats.dropped
    );

    println!("Months (slider):");
    for (index, month) in store.year_months().iter().enumerate() {
        println!("  {:>3}  {}  {}", index, month, month.label());
    }

    println!("\nDistricts:");
    for district in store.districts() {
        println!("  {}", district);
    }

    println!("\nSchool types:");
    for school_type in store.school_types() {
        println!("  {}", school_type);
    }

    println!("\nLearning models:");
    for model in store.learning_models() {
        println!("  {}", model);
    }
}

/// Print a short text rendition of the current views.
fn print_summary(snapshot: &DashboardSnapshot) {
    println!("\n📊 Dashboard:");
    println!(
        "   Month: {}",
        snapshot.month_label.as_deref().unwrap_or("No data")
    );
    println!(
        "   Filters: district={} | school type={} | model={} | enrollment={}",
        snapshot.selection.district,
        snapshot.selection.school_type,
        snapshot.selection.learning_model,
        snapshot.selection.enrollment
    );
    println!("   Highlight: {}", snapshot.highlight);
    println!(
        "   Working set: {} schools, {} students",
        snapshot.working_set_size, snapshot.total_enrollment
    );
    for share in &snapshot.model_shares {
        println!(
            "   - {}: {} ({:.2}%)",
            share.row.learning_model, share.row.enrollment, share.row.percent
        );
    }
}
