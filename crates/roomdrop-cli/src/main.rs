//! Roomdrop CLI
//!
//! Two-person rooms for direct file exchange

mod config;
mod notify;
mod progress;

use clap::{Parser, Subcommand};
use indicatif::MultiProgress;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::oneshot;
use tracing_subscriber::EnvFilter;

use config::Config;
use notify::{Notifier, catalog_table};
use progress::{TransferProgress, format_bytes};
use roomdrop_core::{
    FileDescriptor, JoinOutcome, LocalFile, MemoryChannel, MemoryHub, Room, RoomError,
    RoomEvent, RoomId, Severity,
};

/// How long the demo waits for the peer's catalog
const CATALOG_WAIT: Duration = Duration::from_secs(10);

/// Roomdrop - share files with exactly one other person
#[derive(Parser)]
#[command(name = "roomdrop")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Configuration file path (defaults to the user config directory)
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run two in-process peers: one shares files, the other downloads them
    Demo {
        /// Room name (a random one is made up if omitted)
        #[arg(short, long)]
        room: Option<String>,

        /// Files the first peer shares
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Directory to write downloaded files to
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Have a third participant try to join
        #[arg(long)]
        intruder: bool,
    },

    /// Show the catalog a peer would see for these files
    Catalog {
        /// Files to list
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },

    /// Show the effective configuration
    Config {
        /// Write it to the config path
        #[arg(long)]
        init: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config_path = cli.config.clone().unwrap_or_else(Config::default_path);
    let config = match &cli.config {
        Some(path) => Config::load(path)?,
        None => Config::load_or_default()?,
    };
    config.validate()?;

    let level = if cli.verbose {
        "debug".to_string()
    } else {
        config.logging.level.to_lowercase()
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&level)),
        )
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Demo {
            room,
            files,
            output,
            intruder,
        } => {
            let room = match room.as_deref().map(str::trim) {
                Some(name) if !name.is_empty() => RoomId::new(name)?,
                _ => RoomId::generate()?,
            };
            run_demo(room, files, output, intruder, &config).await?;
        }
        Commands::Catalog { files } => {
            show_catalog(files, &config).await?;
        }
        Commands::Config { init } => {
            show_config(&config, &config_path, init)?;
        }
    }

    Ok(())
}

/// Two peers in one process: A shares, B downloads everything A offers
async fn run_demo(
    room_id: RoomId,
    files: Vec<PathBuf>,
    output: Option<PathBuf>,
    intruder: bool,
    config: &Config,
) -> anyhow::Result<()> {
    let hub = MemoryHub::with_config(config.channel_config())?;
    let multi = MultiProgress::new();
    let notifier = Notifier::new(multi.clone());

    let mut sharer = join(&hub, &room_id, config, &notifier, "A").await?;
    let mut receiver = join(&hub, &room_id, config, &notifier, "B").await?;

    let mut shared = 0;
    for path in &files {
        let file = LocalFile::from_path(path).await?;
        match sharer.add_file(file).await {
            Ok(_) => shared += 1,
            Err(e @ RoomError::FileTooLarge { .. }) => {
                notifier.notify(Severity::Warning, "A", &e.to_string());
            }
            Err(e) => return Err(e.into()),
        }
    }

    let (stop_tx, mut stop_rx) = oneshot::channel::<()>();
    let sharer_notifier = notifier.clone();
    let sharer_task = tokio::spawn(async move {
        loop {
            tokio::select! {
                event = sharer.next_event() => match event {
                    Some(event) => sharer_notifier.event("A", &event),
                    None => break,
                },
                _ = &mut stop_rx => break,
            }
        }
        sharer.leave();
    });

    if intruder {
        match Room::join(&hub, room_id.clone(), config.room_config()).await? {
            JoinOutcome::RoomFull { room, participants } => {
                let err = RoomError::RoomFull {
                    room: room.to_string(),
                    participants,
                };
                notifier.notify(Severity::Error, "C", &err.to_string());
            }
            JoinOutcome::Joined(room) => {
                notifier.notify(Severity::Warning, "C", "joined a full room");
                room.leave();
            }
        }
    }

    let remote = tokio::time::timeout(
        CATALOG_WAIT,
        wait_for_catalog(&mut receiver, shared, &notifier),
    )
    .await
    .map_err(|_| anyhow::anyhow!("Timed out waiting for the peer's catalog"))??;
    println!("{}", catalog_table(&remote));

    download_all(&mut receiver, &remote, output.as_deref(), &multi, &notifier).await?;

    receiver.leave();
    let _ = stop_tx.send(());
    sharer_task.await?;
    Ok(())
}

async fn join(
    hub: &MemoryHub,
    room: &RoomId,
    config: &Config,
    notifier: &Notifier,
    who: &str,
) -> anyhow::Result<Room<MemoryChannel>> {
    let room = Room::join(hub, room.clone(), config.room_config())
        .await?
        .into_room()?;
    notifier.notify(
        Severity::Info,
        who,
        &format!("joined '{}' as {}", room.room(), room.local_peer().short()),
    );
    Ok(room)
}

/// Handle B's events until the peer's catalog lists `expected` files
async fn wait_for_catalog(
    receiver: &mut Room<MemoryChannel>,
    expected: usize,
    notifier: &Notifier,
) -> anyhow::Result<Vec<FileDescriptor>> {
    while let Some(event) = receiver.next_event().await {
        notifier.event("B", &event);
        if let RoomEvent::RemoteCatalogUpdated(files) = event {
            if files.len() == expected {
                return Ok(files);
            }
        }
    }
    anyhow::bail!("Room closed before the peer's catalog arrived")
}

/// Request every remote file and wait for each to finish
async fn download_all(
    receiver: &mut Room<MemoryChannel>,
    remote: &[FileDescriptor],
    output: Option<&Path>,
    multi: &MultiProgress,
    notifier: &Notifier,
) -> anyhow::Result<()> {
    if let Some(dir) = output {
        tokio::fs::create_dir_all(dir).await?;
    }

    let mut bars = HashMap::new();
    for (index, file) in remote.iter().enumerate() {
        receiver.request_download(index).await?;
        bars.insert(index, TransferProgress::new(multi, file.size, &file.name));
    }

    let mut total = 0u64;
    while !bars.is_empty() {
        let Some(event) = receiver.next_event().await else {
            anyhow::bail!(
                "Room closed with download(s) {:?} outstanding",
                receiver.outstanding_downloads()
            );
        };
        notifier.event("B", &event);

        match event {
            RoomEvent::DownloadProgress { index, percent } => {
                if let Some(bar) = bars.get(&index) {
                    bar.set_percent(percent);
                }
            }
            RoomEvent::DownloadComplete { index, size, .. } => {
                let Some(bar) = bars.remove(&index) else {
                    continue;
                };
                let blob = receiver.retrieve(index)?;
                let name = &remote[index].name;
                if let Some(dir) = output {
                    let target = dir.join(safe_file_name(name));
                    tokio::fs::write(&target, blob.as_bytes()).await?;
                    tracing::debug!("Wrote {} ({})", target.display(), blob.media_type());
                }
                total += size as u64;
                bar.finish_with_message(name.clone());
            }
            RoomEvent::TransferFailed { index, reason } => {
                if let Some(bar) = bars.remove(&index) {
                    bar.abandon_with_message(format!("{}: {reason}", remote[index].name));
                }
            }
            _ => {}
        }
    }

    notifier.notify(
        Severity::Success,
        "B",
        &format!("received {} in total", format_bytes(total)),
    );
    Ok(())
}

/// Strip any directory components a peer-supplied name carries
fn safe_file_name(name: &str) -> String {
    Path::new(name)
        .file_name()
        .and_then(|n| n.to_str())
        .filter(|n| !n.is_empty())
        .unwrap_or("download.bin")
        .to_string()
}

/// Print the table a peer would see
async fn show_catalog(files: Vec<PathBuf>, config: &Config) -> anyhow::Result<()> {
    let mut descriptors = Vec::with_capacity(files.len());
    for path in &files {
        let file = LocalFile::from_path(path).await?;
        let descriptor = file.descriptor().clone();
        if descriptor.size > config.room.max_file_size {
            println!(
                "{} is {}, over the {} limit; it would be rejected",
                descriptor.name,
                format_bytes(descriptor.size),
                format_bytes(config.room.max_file_size)
            );
            continue;
        }
        descriptors.push(descriptor);
    }

    print!("{}", catalog_table(&descriptors));
    Ok(())
}

/// Print or write the effective configuration
fn show_config(config: &Config, path: &Path, init: bool) -> anyhow::Result<()> {
    if init {
        config.save(path)?;
        println!("Configuration written to {}", path.display());
        return Ok(());
    }

    println!("# {}", path.display());
    print!("{}", toml::to_string_pretty(config)?);
    Ok(())
}
