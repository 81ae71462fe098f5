//! Command handlers for CLI operations

use anyhow::{Context as _, Result, anyhow, bail};
use courier_providers::MockTransportFactory;
use courier_routing::{
    DispatchRequest, Dispatcher, LoggingConfig, RoutingConfig, StorageKind, Target,
    new_session_id,
};
use serde_json::json;
use std::io;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{EnvFilter, fmt};

use crate::cli::{Cli, Command, SendArgs};
use crate::output;

/// Runs one CLI invocation.
///
/// # Errors
/// Returns an error if configuration cannot be loaded, the dispatcher cannot
/// be built, or the command itself fails
pub async fn run(cli: Cli) -> Result<()> {
    if let Command::InitConfig { force } = &cli.command {
        return init_config(cli.config.as_deref(), *force);
    }

    let config = load_config(&cli)?;
    init_logging(&config.logging)?;

    let mut builder = Dispatcher::builder(config.clone());
    if cli.mock {
        builder = builder.transport_factory(Arc::new(MockTransportFactory::new()));
    }
    let dispatcher = builder.build().await.context("failed to start dispatcher")?;
    tracing::debug!(
        backends = dispatcher.registry().len(),
        mock = cli.mock,
        "dispatcher started"
    );

    match cli.command {
        Command::Send(args) => send(&dispatcher, args, cli.json).await,
        Command::Classify { text } => {
            let result = dispatcher.classify(&text)?;
            if cli.json {
                output::print_json(&result)
            } else {
                output::print_classification(&result);
                Ok(())
            }
        }
        Command::Health => {
            let states = dispatcher.health_snapshot();
            if cli.json {
                output::print_json(&states)
            } else {
                output::print_health(&states);
                Ok(())
            }
        }
        Command::History { session } => {
            let messages = dispatcher.history(&session).await;
            if cli.json {
                output::print_json(&messages)
            } else {
                output::print_history(&session, &messages);
                Ok(())
            }
        }
        Command::Cleanup { max_age_seconds } => {
            let max_age = max_age_seconds.map_or_else(|| config.sessions.max_age(), Duration::from_secs);
            let removed = dispatcher.cleanup_sessions(max_age).await;
            if cli.json {
                output::print_json(&removed)
            } else {
                output::print_removed(&removed);
                Ok(())
            }
        }
        Command::InitConfig { .. } => Ok(()),
    }
}

async fn send(dispatcher: &Dispatcher, args: SendArgs, as_json: bool) -> Result<()> {
    let session_id = args.session.unwrap_or_else(new_session_id);
    let target = match (args.tier, args.backend) {
        (Some(tier), _) => Target::Tier(tier),
        (None, Some(backend)) => Target::Backend(backend),
        (None, None) => Target::Auto,
    };

    let mut request = DispatchRequest::new(session_id.clone(), args.text).with_target(target);
    if let Some(deadline_ms) = args.deadline_ms {
        request = request.with_deadline(Duration::from_millis(deadline_ms));
    }

    let reply = dispatcher.send(request).await?;
    if as_json {
        output::print_json(&json!({ "session_id": session_id, "reply": reply }))
    } else {
        output::print_reply(&session_id, &reply);
        Ok(())
    }
}

fn load_config(cli: &Cli) -> Result<RoutingConfig> {
    let mut config = match &cli.config {
        Some(path) if path.exists() => RoutingConfig::load_from_file(path)?,
        Some(path) => bail!(
            "config file {} does not exist (run `courier init-config --config {}`)",
            path.display(),
            path.display()
        ),
        None => RoutingConfig::load_or_create()?,
    };

    if let Some(directory) = &cli.state_dir {
        config.storage.kind = StorageKind::JsonDir;
        config.storage.directory = Some(directory.clone());
    }
    Ok(config)
}

fn init_config(path: Option<&Path>, force: bool) -> Result<()> {
    let path = match path {
        Some(path) => path.to_path_buf(),
        None => RoutingConfig::config_path()?,
    };
    if path.exists() && !force {
        bail!("{} already exists (pass --force to overwrite)", path.display());
    }
    RoutingConfig::default().save_to_file(&path)?;
    output::print_written(&path);
    Ok(())
}

/// Logs to stderr; `RUST_LOG` overrides the configured filter.
fn init_logging(config: &LoggingConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.filter));
    fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .try_init()
        .map_err(|error| anyhow!("failed to initialize logging: {error}"))
}
