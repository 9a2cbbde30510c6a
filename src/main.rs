// BluOS to Last.fm scrobbling bridge

mod alert;
mod config;
mod coordinator;
mod player;
mod queue;
mod scrobbler;
mod text_cleanup;
mod tracker;

use alert::gotify::GotifyAlerts;
use alert::webhook::WebhookAlerts;
use alert::{Alert, AlertFanout, AlertPort, Severity};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use config::{Config, NotifyConfig};
use coordinator::DeliveryCoordinator;
use player::BluOsClient;
use queue::{JsonFileStore, ScrobbleQueue};
use scrobbler::LastFmScrobbler;
use std::path::PathBuf;
use std::thread;
use std::time::Duration;
use text_cleanup::TextCleaner;
use tracker::PlaybackTracker;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the config file
    #[arg(short, long, env = "BLUOS_SCROBBLER_CONFIG")]
    config: Option<PathBuf>,

    /// Log level (overrides RUST_LOG)
    #[arg(short, long, env = "LOG_LEVEL")]
    log_level: Option<log::LevelFilter>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Poll the player and scrobble (default)
    Run,
    /// Exchange Last.fm username and password for a session key
    Auth,
    /// List scrobbles waiting for delivery
    Queue,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut logger =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));
    if let Some(level) = cli.log_level {
        logger.filter_level(level);
    }
    logger.format_timestamp_secs().init();

    match cli.command.unwrap_or(Command::Run) {
        Command::Run => run(Config::load(cli.config.as_deref())?),
        Command::Auth => auth(Config::read(cli.config.as_deref())?),
        Command::Queue => show_queue(Config::read(cli.config.as_deref())?),
    }
}

fn run(config: Config) -> Result<()> {
    let alerts = build_alerts(&config.notify);
    if alerts.is_empty() {
        log::info!("No alert backends configured");
    }

    let player = BluOsClient::new(
        &config.bluos.host,
        config.bluos.port,
        Duration::from_secs(config.bluos.timeout_secs),
    );

    let service = match LastFmScrobbler::from_config(&config.lastfm) {
        Ok(service) => service,
        Err(e) => {
            alerts.notify(&Alert::new(
                Severity::Error,
                "Last.fm authentication failed",
                format!("{:#}", e),
            ));
            return Err(e);
        }
    };

    let store = JsonFileStore::new(&config.queue.path);
    log::info!(
        "Starting BluOS → Last.fm bridge. Poll interval: {}s",
        config.poll_interval
    );
    log::info!("BluOS device: {}:{}", config.bluos.host, config.bluos.port);
    let queue = ScrobbleQueue::open(store, config.queue.capacity);
    log::info!(
        "Cache: {:?} (limit={}, size={})",
        config.queue.path,
        queue.capacity(),
        queue.size()
    );

    alerts.notify(&Alert::new(
        Severity::Info,
        "Bridge started",
        format!(
            "Polling {}:{}; cache path {}.",
            config.bluos.host,
            config.bluos.port,
            config.queue.path.display()
        ),
    ));

    let mut coordinator = DeliveryCoordinator::new(
        PlaybackTracker::new(config.scrobble_threshold),
        queue,
        service,
        alerts,
    )
    .with_cleaner(TextCleaner::new(&config.cleanup))
    .with_high_water_mark(config.queue.high_water_mark);

    let interval = Duration::from_secs(config.poll_interval);
    loop {
        coordinator.tick(&player, Utc::now());
        thread::sleep(interval);
    }
}

fn build_alerts(notify: &NotifyConfig) -> AlertFanout {
    let mut ports: Vec<Box<dyn AlertPort>> = Vec::new();

    if let Some(webhook) = &notify.webhook {
        log::info!("Webhook alerts enabled (min level {})", webhook.min_level);
        ports.push(Box::new(WebhookAlerts::new(
            &webhook.url,
            Severity::parse_or_warning(&webhook.min_level),
            &notify.app_tag,
        )));
    }

    if let Some(gotify) = &notify.gotify {
        log::info!("Gotify alerts enabled (min level {})", gotify.min_level);
        ports.push(Box::new(GotifyAlerts::new(
            &gotify.url,
            &gotify.token,
            gotify.priority,
            Severity::parse_or_warning(&gotify.min_level),
            &notify.app_tag,
        )));
    }

    AlertFanout::new(ports)
}

fn auth(config: Config) -> Result<()> {
    if config.lastfm.api_key.is_empty() || config.lastfm.api_secret.is_empty() {
        anyhow::bail!("Set lastfm.api_key and lastfm.api_secret before authenticating");
    }

    let session_key =
        scrobbler::lastfm_auth::obtain_session_key(&config.lastfm.api_key, &config.lastfm.api_secret)?;

    println!("Session key obtained. Add it to your config:\n");
    println!("[lastfm]");
    println!("session_key = \"{}\"", session_key);
    println!("\nor export LASTFM_SESSION_KEY={}", session_key);
    Ok(())
}

fn show_queue(config: Config) -> Result<()> {
    let store = JsonFileStore::new(&config.queue.path);
    let queue = ScrobbleQueue::open(store, config.queue.capacity);

    println!(
        "{} of {} pending scrobbles in {}",
        queue.size(),
        queue.capacity(),
        config.queue.path.display()
    );
    if queue.is_empty() {
        return Ok(());
    }

    for record in queue.peek_all() {
        let started = DateTime::<Utc>::from_timestamp(record.started_at, 0)
            .with_context(|| format!("Invalid timestamp {}", record.started_at))?;
        println!(
            "{}  {} - {}{} ({}s)",
            started.format("%Y-%m-%d %H:%M:%S"),
            record.artist,
            record.title,
            if record.album.is_empty() {
                String::new()
            } else {
                format!(" [{}]", record.album)
            },
            record.duration_seconds
        );
    }
    Ok(())
}
