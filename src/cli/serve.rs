use crate::client::BeanstalkdClient;
use crate::config::Config;
use crate::exporter::Exporter;
use crate::fields::StatFilter;
use crate::mapper::TubeMapper;
use anyhow::{Context, Result};
use clap::Args;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};

#[derive(Args)]
pub struct ServeArgs {
    /// Path to the exporter settings file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Beanstalkd server address
    #[arg(long)]
    pub address: Option<String>,

    /// Timeout in milliseconds for beanstalkd connects and requests (0 = none)
    #[arg(long)]
    pub connection_timeout_ms: Option<u64>,

    /// Number of concurrent workers fetching tube stats
    #[arg(long)]
    pub tube_stat_workers: Option<usize>,

    /// File describing the tube name mapping (hot-reloaded)
    #[arg(long)]
    pub mapping_config: Option<PathBuf>,

    /// File listing the stat fields to collect
    #[arg(long)]
    pub field_config: Option<PathBuf>,

    /// Address to listen on for the web interface and telemetry
    #[arg(long)]
    pub listen_address: Option<String>,

    /// Path under which to expose metrics
    #[arg(long)]
    pub telemetry_path: Option<String>,

    /// Log level
    #[arg(long)]
    pub log_level: Option<String>,

    /// Log format (text, json, pretty)
    #[arg(long)]
    pub log_format: Option<String>,
}

impl ServeArgs {
    /// Settings file first, then CLI flags override individual values.
    pub fn resolve_config(&self) -> Result<Config> {
        let mut config = match &self.config {
            Some(path) => Config::from_file(path)?,
            None => Config::default(),
        };

        if let Some(address) = &self.address {
            config.beanstalkd.address = address.clone();
        }
        if let Some(ms) = self.connection_timeout_ms {
            config.beanstalkd.connection_timeout_ms = ms;
        }
        if let Some(workers) = self.tube_stat_workers {
            config.beanstalkd.tube_stat_workers = workers;
        }
        if let Some(path) = &self.mapping_config {
            config.mapping.mapping_file = Some(path.clone());
        }
        if let Some(path) = &self.field_config {
            config.mapping.field_file = Some(path.clone());
        }
        if let Some(listen) = &self.listen_address {
            config.web.listen_address = listen.clone();
        }
        if let Some(path) = &self.telemetry_path {
            config.web.telemetry_path = path.clone();
        }
        if let Some(level) = &self.log_level {
            config.logging.level = level.clone();
        }
        if let Some(format) = &self.log_format {
            config.logging.format = format.clone();
        }

        Ok(config)
    }
}

pub async fn run(args: ServeArgs) -> Result<()> {
    let config = args.resolve_config()?;

    crate::logging::init_logging(&config.logging.level, &config.logging.format)?;

    info!("Starting beanstalkd-exporter v{}", crate::VERSION);

    let warnings = config.validate()?;
    for warning in &warnings {
        warn!("{}", warning);
    }

    // A mapping file given at startup must load; reloads after this point
    // never fail the process.
    let mapper = match &config.mapping.mapping_file {
        Some(path) => {
            let mapper = TubeMapper::from_file(path)
                .with_context(|| format!("Error loading mapping config {}", path.display()))?;
            info!(
                "Loaded mapping config {} ({} rules)",
                path.display(),
                mapper.rule_count()
            );
            Arc::new(mapper)
        }
        None => Arc::new(TubeMapper::new()),
    };

    let filter = StatFilter::from_file(config.mapping.field_file.as_deref());
    info!("Collecting {} stat fields", filter.len());

    let client = Arc::new(BeanstalkdClient::new(
        config.beanstalkd.address.clone(),
        config.connection_timeout(),
    ));
    let exporter = Arc::new(Exporter::new(
        client,
        Arc::clone(&mapper),
        filter,
        config.beanstalkd.tube_stat_workers,
    )?);

    if let Some(path) = config.mapping.mapping_file.clone() {
        let watcher_mapper = Arc::clone(&mapper);
        tokio::spawn(async move {
            if let Err(e) = crate::watcher::watch_mapping_config(path, watcher_mapper).await {
                error!("Mapping config watcher stopped: {:#}", e);
            }
        });
    }

    let shutdown =
        crate::signals::spawn_signal_handler(Arc::clone(&mapper), config.mapping.mapping_file.clone())?;

    crate::server::serve(
        &config.web.listen_address,
        &config.web.telemetry_path,
        exporter,
        shutdown,
    )
    .await
}
