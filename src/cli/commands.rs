use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use clap_complete::{generate, Shell};
use clap::CommandFactory;
use tracing::{debug, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};

use crate::article::ArticleRecord;
use crate::cli::Cli;
use crate::config::{Config, LoggingConfig};
use crate::listing::HttpFetcher;
use crate::storage::{CsvStore, RecordStore};
use crate::sync::{SyncEngine, SyncMode, SyncReport, TracingObserver};
use crate::error::{Error, Result};

const LOG_FILE_PREFIX: &str = "crawler";
const LOG_FILES_KEPT: usize = 7;

/// Run one synchronization against the configured store.
pub async fn run_sync(config: &Config) -> Result<SyncReport> {
    info!(
        "Syncing {} into {}",
        config.crawler.base_url,
        config.store.path.display()
    );

    let store = Arc::new(CsvStore::new(&config.store.path).with_bom(config.store.write_bom));
    let fetcher = Arc::new(HttpFetcher::new(&config.crawler)?);
    let engine = SyncEngine::new(store, fetcher.clone(), fetcher, Arc::new(TracingObserver));

    let report = engine
        .run(config.crawler.initial_n, config.crawler.max_pages)
        .await?;

    match report.mode {
        SyncMode::Initialize => println!(
            "✅ Seeded {} with {} articles",
            config.store.path.display(),
            report.added
        ),
        SyncMode::Incremental => println!(
            "✅ Incremental sync added {} new articles to {} ({} pages scanned)",
            report.added,
            config.store.path.display(),
            report.pages_scanned
        ),
    }
    if report.skipped > 0 {
        println!("   Skipped {} listing entries without a title", report.skipped);
    }

    Ok(report)
}

/// Show the record count and the latest articles in the store
pub async fn status(store_path: &Path, limit: usize, json: bool) -> Result<()> {
    let records = CsvStore::new(store_path).load().await?;
    let latest = latest_records(&records, limit);

    if json {
        let output = serde_json::json!({
            "store": store_path.display().to_string(),
            "records": records.len(),
            "latest": latest,
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    println!("📋 Store: {}", store_path.display());
    println!("   Records: {}", records.len());

    if records.is_empty() {
        println!("   The store is empty; the next run will seed it.");
        return Ok(());
    }

    println!("\nLatest articles:");
    for record in latest {
        let date = if record.publish_date.is_empty() {
            "----/--/--"
        } else {
            record.publish_date.as_str()
        };
        println!("   {}  {}", date, record.title);
    }

    Ok(())
}

/// Up to `limit` records, newest publish date first. Undated records sort
/// last; ties keep store order.
pub fn latest_records(records: &[ArticleRecord], limit: usize) -> Vec<&ArticleRecord> {
    let mut sorted: Vec<&ArticleRecord> = records.iter().collect();
    sorted.sort_by(|a, b| match (a.publish_date.is_empty(), b.publish_date.is_empty()) {
        (false, true) => std::cmp::Ordering::Less,
        (true, false) => std::cmp::Ordering::Greater,
        _ => b.publish_date.cmp(&a.publish_date),
    });
    sorted.truncate(limit);
    sorted
}

/// Write the default configuration file. Returns the path written, or
/// `None` when a file exists and `force` is not set.
pub async fn init(config_path: Option<PathBuf>, force: bool) -> Result<Option<PathBuf>> {
    let config_file = match config_path {
        Some(path) => path,
        None => Config::default_path()?,
    };

    if config_file.exists() && !force {
        warn!("Configuration file already exists: {}", config_file.display());
        println!("Configuration already exists at {}", config_file.display());
        println!("   Use --force to replace it.");
        return Ok(None);
    }

    if let Some(parent) = config_file.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent)?;
            info!("Created configuration directory: {}", parent.display());
        }
    }

    fs::write(&config_file, default_config_template())?;
    info!("Created default configuration: {}", config_file.display());

    println!("✅ Configuration written to {}", config_file.display());
    println!("");
    println!("Next steps:");
    println!("   1. Review the settings in the file");
    println!("   2. Run a sync: hpa-myths run");

    Ok(Some(config_file))
}

/// Generate shell completions
pub fn generate_completions(shell: Shell) {
    let mut cmd = Cli::command();
    let cmd_name = cmd.get_name().to_string();
    generate(shell, &mut cmd, cmd_name, &mut std::io::stdout());
}

/// Install the global subscriber. The returned guard flushes the log file
/// and must be held until the process exits.
pub fn init_logging(logging: &LoggingConfig, debug: bool, verbose: bool) -> Result<Option<WorkerGuard>> {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = if debug {
        EnvFilter::new("debug")
    } else if verbose {
        EnvFilter::new("info")
    } else {
        match EnvFilter::try_from_default_env() {
            Ok(filter) => filter,
            Err(_) => EnvFilter::try_new(&logging.level)
                .map_err(|e| Error::Logging(format!("Invalid log level '{}': {}", logging.level, e)))?,
        }
    };

    let (file_layer, guard) = if logging.log_to_file {
        let appender = RollingFileAppender::builder()
            .rotation(Rotation::DAILY)
            .filename_prefix(LOG_FILE_PREFIX)
            .filename_suffix("log")
            .max_log_files(LOG_FILES_KEPT)
            .build(&logging.log_dir)
            .map_err(|e| Error::Logging(format!("Cannot log to {}: {}", logging.log_dir.display(), e)))?;
        let (writer, guard) = tracing_appender::non_blocking(appender);
        let layer = fmt::layer().with_writer(writer).with_ansi(false);
        (Some(layer), Some(guard))
    } else {
        (None, None)
    };

    let json_layer = logging
        .json_format
        .then(|| fmt::layer().json().with_writer(std::io::stderr));
    let plain_layer = (!logging.json_format).then(|| {
        fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(false)
            .with_file(debug)
            .with_line_number(debug)
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(json_layer)
        .with(plain_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| Error::Logging(e.to_string()))?;

    debug!("Logging initialized");
    Ok(guard)
}

/// Default configuration file content
fn default_config_template() -> String {
    format!(r#"# hpa-myths configuration
# Generated on {}

[crawler]
# Site root; listing and article URLs are resolved against it
base_url = "https://www.hpa.gov.tw"

# Listing node of the myth-busting section
node_id = 127

# Articles taken from the first listing page when the store is empty
initial_n = 10

# Ceiling on listing pages scanned by an incremental run
max_pages = 5

# Pause after every request, in milliseconds
request_delay_ms = 800

# Request timeout in seconds
timeout = 10

# Retries for timeouts, connection failures and 5xx responses
retry_attempts = 2

user_agent = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0 Safari/537.36"

[store]
# CSV file holding every captured article
path = "hpa_health_myths.csv"

# Start new files with a UTF-8 byte-order mark (helps spreadsheet tools)
write_bom = true

[logging]
# Log level: error, warn, info, debug, trace
level = "info"

# Also write daily-rotated log files, keeping the last {}
log_to_file = false
log_dir = "logs"

# Emit JSON log lines
json_format = false
"#,
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
        LOG_FILES_KEPT
    )
}
