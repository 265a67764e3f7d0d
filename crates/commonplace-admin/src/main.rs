//! commonplace-admin: maintenance entry point.
//!
//! ```text
//! commonplace-admin [--bootstrap | --make-test-data [--count N] [--seed S] | --drop-test-data]
//! ```
//!
//! Runs exactly one maintenance operation (bootstrap when none is given) and
//! streams its progress lines to stdout. Logs go to stderr or `LOG_FILE`.
//! Exits non-zero when the operation fails.

use std::future::Future;

use anyhow::Context as _;
use clap::error::ErrorKind;
use clap::{ArgGroup, CommandFactory, Parser};
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use commonplace_core::Progress;
use commonplace_db::{
    bootstrap, drop_all_content_types, generate_test_data, load_dot_env, Database, DbConfig,
    GeneratorConfig, PgBootstrap,
};

#[derive(Parser, Debug)]
#[command(author, version, about = "Commonplace maintenance tool")]
#[command(group(
    ArgGroup::new("operation")
        .args(["bootstrap", "make_test_data", "drop_test_data"])
        .multiple(false)
))]
struct Cli {
    /// Create role and database if needed and migrate the schema (default).
    #[arg(long)]
    bootstrap: bool,

    /// Create seed users and random content.
    #[arg(long)]
    make_test_data: bool,

    /// Delete all rows from every application table.
    #[arg(long)]
    drop_test_data: bool,

    /// Number of content items to generate [default: 100].
    #[arg(long)]
    count: Option<usize>,

    /// Seed for reproducible test data.
    #[arg(long)]
    seed: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Operation {
    Bootstrap,
    MakeTestData,
    DropTestData,
}

impl Cli {
    fn operation(&self) -> Operation {
        if self.make_test_data {
            Operation::MakeTestData
        } else if self.drop_test_data {
            Operation::DropTestData
        } else {
            Operation::Bootstrap
        }
    }

    /// Reject generator options given without `--make-test-data`.
    fn validate(&self) -> Result<(), String> {
        if self.make_test_data {
            return Ok(());
        }
        if self.count.is_some() {
            return Err("--count can only be used with --make-test-data".to_string());
        }
        if self.seed.is_some() {
            return Err("--seed can only be used with --make-test-data".to_string());
        }
        Ok(())
    }

    fn content_count(&self) -> usize {
        self.count
            .unwrap_or(commonplace_db::generator::DEFAULT_CONTENT_COUNT)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let dot_env = load_dot_env();
    let cli = Cli::parse();
    if let Err(message) = cli.validate() {
        Cli::command()
            .error(ErrorKind::ArgumentConflict, message)
            .exit();
    }
    let _log_guard = init_logging(DbConfig::debug_from_env());
    let config = DbConfig::from_env().context("failed to read configuration")?;

    info!(
        subsystem = "admin",
        dot_env = dot_env.as_deref().map(|p| p.display().to_string()).unwrap_or_default(),
        operation = ?cli.operation(),
        "Starting commonplace-admin"
    );

    let result = match cli.operation() {
        Operation::Bootstrap => run_streaming(|progress| run_bootstrap(config, progress)).await,
        Operation::MakeTestData => {
            let count = cli.content_count();
            let seed = cli.seed;
            run_streaming(move |progress| run_make_test_data(config, count, seed, progress)).await
        }
        Operation::DropTestData => {
            run_streaming(|progress| run_drop_test_data(config, progress)).await
        }
    };

    if let Err(ref e) = result {
        error!(subsystem = "admin", error = %e, "Operation failed");
    }
    result
}

/// Initialize tracing.
///
/// Environment variables:
///   LOG_FORMAT  - "json" or "text" (default: "text")
///   LOG_FILE    - path to log file (optional, enables file logging)
///   LOG_ANSI    - "true"/"false" override ANSI colors
///   RUST_LOG    - standard env filter (default: "commonplace=info",
///                 "commonplace=debug" with COMMONPLACE_DEBUG)
fn init_logging(debug: bool) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let log_format = std::env::var("LOG_FORMAT").unwrap_or_else(|_| "text".to_string());
    let log_file = std::env::var("LOG_FILE").ok();
    let log_ansi = std::env::var("LOG_ANSI")
        .ok()
        .map(|v| v == "true" || v == "1");

    let default_filter = if debug {
        "commonplace=debug"
    } else {
        "commonplace=info"
    };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| default_filter.into());

    let registry = tracing_subscriber::registry().with(env_filter);

    if let Some(ref path) = log_file {
        let path = std::path::Path::new(path);
        let file_dir = path.parent().unwrap_or(std::path::Path::new("."));
        let file_name = path
            .file_name()
            .and_then(|f| f.to_str())
            .unwrap_or("commonplace-admin.log");
        let file_appender = tracing_appender::rolling::daily(file_dir, file_name);
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

        if log_format == "json" {
            registry
                .with(
                    tracing_subscriber::fmt::layer()
                        .json()
                        .with_writer(non_blocking),
                )
                .init();
        } else {
            let layer = tracing_subscriber::fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(log_ansi.unwrap_or(false));
            registry.with(layer).init();
        }
        Some(guard)
    } else {
        // Stdout carries the progress stream.
        if log_format == "json" {
            registry
                .with(
                    tracing_subscriber::fmt::layer()
                        .json()
                        .with_writer(std::io::stderr),
                )
                .init();
        } else {
            let mut layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);
            if let Some(ansi) = log_ansi {
                layer = layer.with_ansi(ansi);
            }
            registry.with(layer).init();
        }
        None
    }
}

/// Run an operation as its own task and print its progress lines as they
/// arrive.
async fn run_streaming<F, Fut>(op: F) -> anyhow::Result<()>
where
    F: FnOnce(Progress) -> Fut,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    let (progress, mut rx) = Progress::channel();
    let task = tokio::spawn(op(progress));

    // The stream ends when the task drops its sender.
    while let Some(line) = rx.recv().await {
        print!("{}", line);
    }

    task.await.context("maintenance task panicked")?
}

async fn run_bootstrap(config: DbConfig, progress: Progress) -> anyhow::Result<()> {
    let backend = PgBootstrap::new(config)?;
    bootstrap(&backend, &backend.schema_path(), &progress).await?;
    Ok(())
}

async fn run_make_test_data(
    config: DbConfig,
    count: usize,
    seed: Option<u64>,
    progress: Progress,
) -> anyhow::Result<()> {
    let db = Database::connect(&config).await?;
    let mut rng = match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };
    let result = generate_test_data(
        &db.content,
        &mut rng,
        &GeneratorConfig {
            content_count: count,
        },
        &progress,
    )
    .await;
    db.close().await;

    let report = result?;
    info!(
        subsystem = "admin",
        result_count = report.inserted(),
        failed = report.failed(),
        "Test data ready"
    );
    Ok(())
}

async fn run_drop_test_data(config: DbConfig, progress: Progress) -> anyhow::Result<()> {
    let db = Database::connect(&config).await?;
    let result = drop_all_content_types(&db.maintenance, &progress).await;
    db.close().await;

    let report = result?;
    info!(
        subsystem = "admin",
        pass = report.passes,
        rows_affected = report.total_deleted(),
        "Test data dropped"
    );
    Ok(())
}
