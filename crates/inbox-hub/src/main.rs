use clap::Parser;
use inbox_engine::{InboxService, IngestError, IngestionConfig};
use std::{fs::OpenOptions, io, net::SocketAddr, path::Path, sync::Arc};
use tracing::{error, info};
use tracing_subscriber::{
    fmt::writer::{BoxMakeWriter, MakeWriterExt},
    EnvFilter,
};

mod api;

const DEFAULT_ADDR: &str = "127.0.0.1:8080";
const LOG_FILE_NAME: &str = "inbox-hub.log";

#[derive(Clone, Debug)]
struct Config {
    addr: String,
    debug: bool,
    idle_timeout_secs: i64,
    max_items_per_request: usize,
    max_expected_count: u32,
    log_dir: Option<String>,
}

impl Config {
    fn ingestion(&self) -> Result<IngestionConfig, IngestError> {
        let idle_timeout = chrono::Duration::try_seconds(self.idle_timeout_secs).ok_or_else(|| {
            IngestError::Config(format!(
                "idle timeout of {}s is out of range",
                self.idle_timeout_secs
            ))
        })?;
        let config = IngestionConfig {
            idle_timeout,
            max_items_per_request: self.max_items_per_request,
            max_expected_count: self.max_expected_count,
        };
        config.validate()?;
        Ok(config)
    }
}

#[derive(Parser, Debug)]
#[command(name = "inbox-hub")]
struct Args {
    #[arg(long)]
    addr: Option<String>,
    #[arg(long, default_value_t = false)]
    debug: bool,
    #[arg(long)]
    idle_timeout_secs: Option<i64>,
    #[arg(long)]
    max_items_per_request: Option<usize>,
    #[arg(long)]
    max_expected_count: Option<u32>,
    #[arg(long)]
    log_dir: Option<String>,
}

#[tokio::main]
async fn main() {
    let config = load_config(Args::parse());
    init_logging(&config);
    let addr: SocketAddr = match config.addr.parse() {
        Ok(value) => value,
        Err(err) => {
            error!(event = "invalid_addr", error = %err, addr = %config.addr);
            return;
        }
    };

    let service = match config.ingestion().and_then(InboxService::in_memory) {
        Ok(service) => Arc::new(service),
        Err(err) => {
            error!(event = "invalid_config", error = %err);
            return;
        }
    };

    let app = api::router(service);

    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(value) => value,
        Err(err) => {
            error!(event = "hub_error", error = %err);
            return;
        }
    };

    info!(
        event = "hub_start",
        addr = %config.addr,
        idle_timeout_secs = config.idle_timeout_secs,
        max_items_per_request = config.max_items_per_request,
        max_expected_count = config.max_expected_count,
    );

    let shutdown = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    if let Err(err) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
    {
        error!(event = "hub_error", error = %err);
    }
}

/// Flags win over `INBOX_*` environment variables, which win over the
/// engine defaults.
fn load_config(args: Args) -> Config {
    let defaults = IngestionConfig::default();
    Config {
        addr: flag_or_env(args.addr, "INBOX_HUB_ADDR").unwrap_or_else(|| DEFAULT_ADDR.to_string()),
        debug: args.debug || env_true("INBOX_HUB_DEBUG"),
        idle_timeout_secs: args
            .idle_timeout_secs
            .or_else(|| env_parse("INBOX_IDLE_TIMEOUT_SECS"))
            .unwrap_or_else(|| defaults.idle_timeout.num_seconds()),
        max_items_per_request: args
            .max_items_per_request
            .or_else(|| env_parse("INBOX_MAX_ITEMS_PER_REQUEST"))
            .unwrap_or(defaults.max_items_per_request),
        max_expected_count: args
            .max_expected_count
            .or_else(|| env_parse("INBOX_MAX_EXPECTED_COUNT"))
            .unwrap_or(defaults.max_expected_count),
        log_dir: flag_or_env(args.log_dir, "INBOX_LOG_DIR"),
    }
}

fn init_logging(config: &Config) {
    let level = if config.debug {
        "debug".to_string()
    } else {
        std::env::var("INBOX_LOG_LEVEL").unwrap_or_else(|_| "info".to_string())
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let writer = match config.log_dir.as_deref().map(open_log_file) {
        Some(Ok(file)) => BoxMakeWriter::new(io::stdout.and(Arc::new(file))),
        Some(Err(err)) => {
            eprintln!("log_file_error: {err}");
            BoxMakeWriter::new(io::stdout)
        }
        None => BoxMakeWriter::new(io::stdout),
    };

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .finish();
    let _ = tracing::subscriber::set_global_default(subscriber);
}

fn open_log_file(log_dir: &str) -> io::Result<std::fs::File> {
    let dir = Path::new(log_dir);
    std::fs::create_dir_all(dir)?;
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(dir.join(LOG_FILE_NAME))
}

fn flag_or_env(flag: Option<String>, key: &str) -> Option<String> {
    flag.or_else(|| std::env::var(key).ok())
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn env_true(key: &str) -> bool {
    std::env::var(key).is_ok_and(|value| {
        matches!(
            value.trim().to_lowercase().as_str(),
            "1" | "true" | "yes" | "on"
        )
    })
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key)
        .ok()
        .and_then(|value| value.trim().parse().ok())
}
