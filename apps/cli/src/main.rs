//! Scribe command-line runner for audited change scripts.

#![forbid(unsafe_code)]

mod runner;
mod script;

use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

use scribe_application::{AuditSink, CancellationToken};
use scribe_core::{AppError, AppResult};
use scribe_infrastructure::{
    InMemoryAuditSink, InMemoryEntityStore, InMemoryUnitOfWork, PostgresAuditSink,
    PostgresUnitOfWork, run_migrations,
};
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::runner::{ScriptRunner, Staging};
use crate::script::ChangeScript;

const USAGE: &str = "usage: scribe migrate | scribe apply <script.json>";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StorageKind {
    Memory,
    Postgres,
}

impl FromStr for StorageKind {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim() {
            "memory" => Ok(Self::Memory),
            "postgres" => Ok(Self::Postgres),
            _ => Err(AppError::Validation(format!(
                "invalid SCRIBE_STORAGE value '{value}'; expected 'memory' or 'postgres'"
            ))),
        }
    }
}

#[derive(Debug, Clone)]
struct CliConfig {
    storage: StorageKind,
    database_url: Option<String>,
    max_connections: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Command {
    Migrate,
    Apply { script_path: PathBuf },
}

#[tokio::main]
async fn main() -> Result<(), AppError> {
    dotenvy::dotenv().ok();
    init_tracing();

    let command = parse_command(env::args().skip(1))?;
    let config = CliConfig::load()?;

    match command {
        Command::Migrate => {
            let pool = connect_pool(&config).await?;
            run_migrations(&pool).await?;
            info!("migrations applied");
        }
        Command::Apply { script_path } => {
            let text = std::fs::read_to_string(&script_path).map_err(|error| {
                AppError::Validation(format!(
                    "failed to read change script '{}': {error}",
                    script_path.display()
                ))
            })?;
            let script = ChangeScript::parse(text.as_str())?;
            apply(&config, script).await?;
        }
    }

    Ok(())
}

async fn apply(config: &CliConfig, script: ChangeScript) -> AppResult<()> {
    let schemas = script.entity_schemas()?;
    let cancellation = CancellationToken::new();

    match config.storage {
        StorageKind::Memory => {
            let unit_of_work = Arc::new(InMemoryUnitOfWork::new(
                Arc::new(InMemoryEntityStore::new()),
                schemas,
            ));
            let sink = Arc::new(InMemoryAuditSink::new());
            let runner = ScriptRunner::new(Staging::Memory(unit_of_work), sink.clone());
            let summary = runner.run(script.steps, &cancellation).await?;

            for record in sink.records().await {
                let line = serde_json::to_string(&record).map_err(|error| {
                    AppError::Serialization(format!("failed to render audit record: {error}"))
                })?;
                println!("{line}");
            }
            println!(
                "saves={} affected_rows={} audit_records={}",
                summary.saves, summary.affected_rows, summary.audit_records
            );
        }
        StorageKind::Postgres => {
            let pool = connect_pool(config).await?;
            let unit_of_work = Arc::new(PostgresUnitOfWork::new(pool.clone(), schemas));
            let sink: Arc<dyn AuditSink> = Arc::new(PostgresAuditSink::new(pool));
            let runner = ScriptRunner::new(Staging::Postgres(unit_of_work), sink);
            let summary = runner.run(script.steps, &cancellation).await?;

            println!(
                "saves={} affected_rows={} audit_records={}",
                summary.saves, summary.affected_rows, summary.audit_records
            );
        }
    }

    Ok(())
}

fn parse_command(args: impl IntoIterator<Item = String>) -> AppResult<Command> {
    let mut args = args.into_iter();
    let command = match (args.next().as_deref(), args.next()) {
        (Some("migrate"), None) => Command::Migrate,
        (Some("apply"), Some(script_path)) => Command::Apply {
            script_path: PathBuf::from(script_path),
        },
        _ => return Err(AppError::Validation(USAGE.to_owned())),
    };

    if args.next().is_some() {
        return Err(AppError::Validation(USAGE.to_owned()));
    }

    Ok(command)
}

async fn connect_pool(config: &CliConfig) -> AppResult<PgPool> {
    let database_url = config.database_url.as_deref().ok_or_else(|| {
        AppError::Validation("DATABASE_URL is required for postgres storage".to_owned())
    })?;

    PgPoolOptions::new()
        .max_connections(config.max_connections)
        .connect(database_url)
        .await
        .map_err(|error| AppError::Internal(format!("failed to connect to database: {error}")))
}

impl CliConfig {
    fn load() -> AppResult<Self> {
        let storage = env::var("SCRIBE_STORAGE")
            .map(|value| value.parse::<StorageKind>())
            .unwrap_or(Ok(StorageKind::Memory))?;
        let database_url = env::var("DATABASE_URL")
            .ok()
            .map(|value| value.trim().to_owned())
            .filter(|value| !value.is_empty());
        let max_connections = parse_env_u32("SCRIBE_DB_MAX_CONNECTIONS", 5)?;

        if max_connections == 0 {
            return Err(AppError::Validation(
                "SCRIBE_DB_MAX_CONNECTIONS must be greater than zero".to_owned(),
            ));
        }

        if storage == StorageKind::Postgres && database_url.is_none() {
            return Err(AppError::Validation(
                "DATABASE_URL is required when SCRIBE_STORAGE=postgres".to_owned(),
            ));
        }

        Ok(Self {
            storage,
            database_url,
            max_connections,
        })
    }
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .init();
}

fn parse_env_u32(name: &str, default: u32) -> AppResult<u32> {
    match env::var(name) {
        Ok(value) => value.parse::<u32>().map_err(|error| {
            AppError::Validation(format!("invalid {name} value '{value}': {error}"))
        }),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use scribe_core::AppError;

    use super::{Command, StorageKind, parse_command};

    fn args(values: &[&str]) -> Vec<String> {
        values.iter().map(|value| (*value).to_owned()).collect()
    }

    #[test]
    fn parses_known_commands() {
        assert_eq!(parse_command(args(&["migrate"])).ok(), Some(Command::Migrate));
        assert_eq!(
            parse_command(args(&["apply", "changes.json"])).ok(),
            Some(Command::Apply {
                script_path: PathBuf::from("changes.json"),
            })
        );
    }

    #[test]
    fn rejects_missing_or_extra_arguments() {
        assert!(matches!(parse_command(args(&[])), Err(AppError::Validation(_))));
        assert!(matches!(
            parse_command(args(&["apply"])),
            Err(AppError::Validation(_))
        ));
        assert!(matches!(
            parse_command(args(&["migrate", "now"])),
            Err(AppError::Validation(_))
        ));
    }

    #[test]
    fn storage_kind_parses_known_engines() {
        assert_eq!("memory".parse::<StorageKind>().ok(), Some(StorageKind::Memory));
        assert_eq!(
            " postgres ".parse::<StorageKind>().ok(),
            Some(StorageKind::Postgres)
        );
        assert!("sqlite".parse::<StorageKind>().is_err());
    }
}
