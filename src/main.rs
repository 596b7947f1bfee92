use clap::{Parser, Subcommand};
use consent_mgt::model::ConsentSearchFilter;
use consent_mgt::purpose_types::PurposeTypeRegistry;
use consent_mgt::settings::Settings;
use consent_mgt::status::StatusEngine;
use consent_mgt::{storage, ConsentService, PurposeService};
use miette::{IntoDiagnostic, Result};
use sea_orm_migration::MigratorTrait;
use serde::Serialize;
use std::sync::Arc;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser, Debug)]
#[command(
    name = "consent-mgt",
    version,
    about = "Consent lifecycle and purpose management"
)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml")]
    config: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Apply pending schema migrations
    Migrate,
    /// List the registered purpose types
    PurposeTypes,
    /// Inspect consent purposes
    Purposes {
        #[command(subcommand)]
        command: PurposeCommand,
    },
    /// Inspect and manage consents
    Consent {
        #[command(subcommand)]
        command: ConsentCommand,
    },
}

#[derive(Subcommand, Debug)]
enum PurposeCommand {
    List {
        #[arg(long)]
        org: String,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        limit: Option<u64>,
        #[arg(long)]
        offset: Option<u64>,
    },
}

#[derive(Subcommand, Debug)]
enum ConsentCommand {
    Show {
        #[arg(long)]
        org: String,
        #[arg(long)]
        id: String,
    },
    History {
        #[arg(long)]
        org: String,
        #[arg(long)]
        id: String,
    },
    Revoke {
        #[arg(long)]
        org: String,
        #[arg(long)]
        id: String,
        #[arg(long)]
        reason: Option<String>,
        #[arg(long)]
        actor: Option<String>,
    },
    Expire {
        #[arg(long)]
        org: String,
        #[arg(long)]
        id: String,
        #[arg(long)]
        actor: Option<String>,
    },
    /// Find consents by attribute, or list them when no key is given
    Search {
        #[arg(long)]
        org: String,
        #[arg(long)]
        key: Option<String>,
        #[arg(long)]
        value: Option<String>,
        #[arg(long)]
        limit: Option<u64>,
        #[arg(long)]
        offset: Option<u64>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // logging
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(env_filter).init();

    let cli = Cli::parse();

    // load settings
    let settings = Settings::load(&cli.config)?;
    tracing::debug!(?settings, "Loaded configuration");

    // init storage (database)
    let db = storage::init(&settings.database).await.into_diagnostic()?;

    if settings.extension.enabled {
        tracing::warn!(
            url = ?settings.extension.url,
            "Status extension enabled but no decision client is linked; custom authorization states keep the prior consent status"
        );
    }

    let registry = Arc::new(PurposeTypeRegistry::with_builtin_types());
    let consents = ConsentService::new(db.clone())
        .with_engine(StatusEngine::new())
        .with_pagination(settings.pagination);
    let purposes = PurposeService::new(db.clone(), registry).with_pagination(settings.pagination);

    match cli.command {
        Command::Migrate => {
            migration::Migrator::up(&db, None).await.into_diagnostic()?;
            tracing::info!("Migrations applied");
        }
        Command::PurposeTypes => print_json(&purposes.list_types())?,
        Command::Purposes {
            command:
                PurposeCommand::List {
                    org,
                    name,
                    limit,
                    offset,
                },
        } => print_json(&purposes.list(&org, name.as_deref(), limit, offset).await?)?,
        Command::Consent { command } => match command {
            ConsentCommand::Show { org, id } => print_json(&consents.get(&id, &org).await?)?,
            ConsentCommand::History { org, id } => {
                print_json(&consents.status_history(&id, &org).await?)?
            }
            ConsentCommand::Revoke {
                org,
                id,
                reason,
                actor,
            } => print_json(
                &consents
                    .revoke(&id, &org, reason.as_deref(), actor.as_deref())
                    .await?,
            )?,
            ConsentCommand::Expire { org, id, actor } => {
                print_json(&consents.expire(&id, &org, actor.as_deref()).await?)?
            }
            ConsentCommand::Search {
                org,
                key: Some(key),
                value,
                ..
            } => print_json(
                &consents
                    .search_by_attribute(&key, value.as_deref(), &org)
                    .await?,
            )?,
            ConsentCommand::Search {
                org,
                key: None,
                limit,
                offset,
                ..
            } => {
                let filter = ConsentSearchFilter {
                    limit,
                    offset,
                    ..Default::default()
                };
                print_json(&consents.search(&filter, &org).await?)?
            }
        },
    }
    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value).into_diagnostic()?);
    Ok(())
}
