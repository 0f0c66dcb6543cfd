use anyhow::{Context, Result};
use ceurws_core::text_status;
use ceurws_storage::{HomepageProbe, HttpFetcher, HttpProbe};
use ceurws_sync::{CheckerOptions, HomepageChecker, Table, TableFormat, WorkflowConfig};
use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, prelude::*, EnvFilter, Registry};

#[derive(Debug, Parser)]
#[command(name = "ceurws-cli")]
#[command(about = "CEUR-WS volume homepage checks and Wikidata reconciliation")]
struct Cli {
    /// Log at debug level unless RUST_LOG says otherwise.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Probe a sample of volume homepages and print availability per set.
    CheckHomepages {
        #[arg(long, default_value_t = 10)]
        sets: usize,
        #[arg(long)]
        sample_size: Option<usize>,
        /// Write the homepage cache back when done.
        #[arg(long)]
        save: bool,
        /// Re-probe homepages that are already cached.
        #[arg(long)]
        force: bool,
        /// List every sampled volume instead of per-set totals.
        #[arg(long)]
        debug: bool,
        #[arg(long, default_value = "grid")]
        format: TableFormat,
    },
    /// Fetch page text for cached homepages that are reachable and have none yet.
    EnrichTexts {
        #[arg(long, default_value_t = 50_000)]
        max_content_length: u64,
    },
    /// Print the visible text of one homepage.
    HomepageText { url: String },
    /// Pick cached homepages with short texts at random.
    RandomHomepages {
        #[arg(long, default_value_t = 5)]
        count: usize,
        #[arg(long, default_value_t = 2_000)]
        max_text_len: usize,
    },
    /// Reconcile the local volume list with Wikidata and write reports.
    SyncVolumes,
}

fn init_logging(verbose: bool) -> Result<()> {
    let default_level = if verbose { "debug" } else { "info" };
    let env_filter =
        EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(default_level))?;
    let subscriber = Registry::default()
        .with(env_filter)
        .with(fmt::layer().with_writer(std::io::stderr));
    tracing::subscriber::set_global_default(subscriber)
        .context("installing tracing subscriber")?;
    Ok(())
}

async fn homepage_checker(
    config: &WorkflowConfig,
    options: CheckerOptions,
) -> Result<HomepageChecker<HttpProbe>> {
    let http = HttpFetcher::new(config.http_config())?;
    let volumes = config
        .local_volume_source(http)
        .fetch_records()
        .await
        .context("loading volume list")?;
    let probe = HttpProbe::new(&config.probe_config())?;
    let checker = HomepageChecker::new(&volumes, probe, &config.homepage_cache, options)
        .with_context(|| format!("loading {}", config.homepage_cache.display()))?;
    Ok(checker)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose)?;
    let config = WorkflowConfig::from_env();

    match cli.command.unwrap_or(Commands::SyncVolumes) {
        Commands::CheckHomepages {
            sets,
            sample_size,
            save,
            force,
            debug,
            format,
        } => {
            let options = CheckerOptions {
                force_recheck: force,
                debug,
                ..config.checker_options()
            };
            let mut checker = homepage_checker(&config, options).await?;
            checker.process_samples(sets, sample_size, save).await?;
            println!("{}", checker.generate_summary_table(format));
        }
        Commands::EnrichTexts { max_content_length } => {
            let mut checker = homepage_checker(&config, config.checker_options()).await?;
            let enriched = checker.enrich_texts(max_content_length).await;
            checker.save_cache()?;
            println!(
                "enriched {enriched} homepages; cache={}",
                checker.cache_path().display()
            );
        }
        Commands::HomepageText { url } => {
            let probe = HttpProbe::new(&config.probe_config())?;
            let text = probe.extract_text(&url, config.read_timeout).await;
            if let Some(text) = &text {
                println!("{text}");
            }
            println!("{}", text_status(text.as_deref()));
        }
        Commands::RandomHomepages {
            count,
            max_text_len,
        } => {
            let checker = homepage_checker(&config, config.checker_options()).await?;
            let mut rng = rand::rng();
            let mut table = Table::new(["Volume", "Homepage", "Text"]);
            for homepage in checker.get_random_homepages(count, max_text_len, &mut rng) {
                table.push_row([
                    homepage.volume.to_string(),
                    homepage.url.clone().unwrap_or_default(),
                    text_status(homepage.text.as_deref()),
                ]);
            }
            println!("{}", table.render(TableFormat::Grid));
        }
        Commands::SyncVolumes => {
            let summary = ceurws_sync::run_volume_sync_from_env().await?;
            println!("{}", summary.status_table);
            for update in &summary.suggested_updates {
                println!("{update}");
            }
            println!(
                "sync complete: run_id={} updates={} reports={}",
                summary.run_id,
                summary.suggested_updates.len(),
                summary.reports_dir
            );
        }
    }

    Ok(())
}
