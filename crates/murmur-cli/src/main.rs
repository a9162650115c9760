mod analyze;
mod harvest;
mod query;

use clap::{Parser, Subcommand};
use murmur_core::Source;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "murmur")]
#[command(about = "Harvest social media publications by topic and analyze their sentiment")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Database maintenance
    Db {
        #[command(subcommand)]
        command: DbCommands,
    },
    /// Harvest publications for a topic until sources are exhausted, the
    /// duration elapses, or Ctrl-C
    Harvest {
        #[arg(long)]
        topic: String,

        /// Items per source (defaults to MURMUR_HARVEST_MAX_ITEMS)
        #[arg(long)]
        max_items: Option<usize>,

        /// Restrict to a source; repeatable. Defaults to every registered source
        #[arg(long = "source")]
        sources: Vec<Source>,

        /// Stop after this many seconds
        #[arg(long)]
        duration_secs: Option<u64>,
    },
    /// Classify stored publications and write one report per source
    Analyze {
        #[arg(long)]
        topic: String,

        /// Restrict to a source; repeatable. Defaults to every source with
        /// publications under the topic
        #[arg(long = "source")]
        sources: Vec<Source>,

        /// Maximum in-flight classification calls (defaults to
        /// MURMUR_ANALYSIS_CONCURRENCY)
        #[arg(long)]
        concurrency: Option<usize>,
    },
    /// Print the latest report for a source
    Report {
        #[arg(long)]
        source: Source,

        #[arg(long)]
        topic: Option<String>,
    },
    /// Roll up the latest analysis of every source for a topic
    Summary {
        #[arg(long)]
        topic: String,
    },
    /// List recent harvest and analysis runs
    Runs {
        #[arg(long, default_value_t = 20)]
        limit: i64,

        /// Show a single run by id
        #[arg(long)]
        id: Option<uuid::Uuid>,
    },
}

#[derive(Debug, Subcommand)]
enum DbCommands {
    /// Check database connectivity
    Ping,
    /// Apply pending migrations
    Migrate,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let Some(command) = cli.command else {
        println!("murmur: no command given; see --help");
        return Ok(());
    };

    let config = murmur_core::load_app_config()?;
    let env_filter =
        EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(&config.log_level))?;
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let pool_config = murmur_db::PoolConfig::from_app_config(&config);
    let pool = murmur_db::connect_pool(&config.database_url, pool_config).await?;

    if !matches!(command, Commands::Db { .. }) {
        murmur_db::run_migrations(&pool).await?;
    }

    match command {
        Commands::Db {
            command: DbCommands::Ping,
        } => {
            murmur_db::ping(&pool).await?;
            println!("database ok");
        }
        Commands::Db {
            command: DbCommands::Migrate,
        } => {
            let applied = murmur_db::run_migrations(&pool).await?;
            println!("migrations applied: {applied}");
        }
        Commands::Harvest {
            topic,
            max_items,
            sources,
            duration_secs,
        } => {
            let args = harvest::HarvestArgs {
                topic,
                max_items,
                sources,
                duration_secs,
            };
            harvest::run_harvest(&pool, &config, args).await?;
        }
        Commands::Analyze {
            topic,
            sources,
            concurrency,
        } => analyze::run_analyze(&pool, &config, &topic, sources, concurrency).await?,
        Commands::Report { source, topic } => {
            query::run_report(&pool, source, topic.as_deref()).await?;
        }
        Commands::Summary { topic } => query::run_summary(&pool, &topic).await?,
        Commands::Runs { limit, id } => query::run_runs(&pool, limit, id).await?,
    }

    Ok(())
}
