mod mpv;
mod session;

use std::io::Write;
use std::path::PathBuf;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use futures_util::StreamExt;
use iptv_proto::catalog::CatalogClient;
use iptv_proto::config::Config;
use iptv_proto::favorites::{Favorites, FileStore};
use iptv_proto::filter::{filter_channels, popular_channels, FilterOptions};
use iptv_proto::model::ChannelWithStream;
use rand::seq::SliceRandom;
use tracing::info;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[derive(Parser, Debug)]
#[command(name = "iptv", version, about = "Browse and play the iptv-org channel catalog")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List channels that have at least one stream
    List {
        #[command(flatten)]
        filters: FilterArgs,
        /// Only favorite channels
        #[arg(long)]
        favorites: bool,
        #[arg(long, default_value_t = 50)]
        limit: usize,
    },
    /// Channels with the most streams and feeds
    Popular {
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
    Categories,
    Countries,
    Languages,
    /// Play a channel; without an id, the first match once the preview is loaded
    Play {
        id: Option<String>,
        /// Start from this stream (1-based) instead of the first
        #[arg(long)]
        stream: Option<usize>,
        /// Pick a random matching channel
        #[arg(long, conflicts_with = "id")]
        random: bool,
        #[command(flatten)]
        filters: FilterArgs,
    },
    /// Add or remove a favorite channel
    Favorite { id: String },
}

#[derive(Args, Debug, Default, Clone)]
struct FilterArgs {
    /// Case-insensitive match on name, alt names, categories and network
    #[arg(long)]
    search: Option<String>,
    #[arg(long)]
    category: Option<String>,
    /// Country code, e.g. UK
    #[arg(long)]
    country: Option<String>,
    /// Feed language code, e.g. eng
    #[arg(long)]
    language: Option<String>,
}

impl From<FilterArgs> for FilterOptions {
    fn from(args: FilterArgs) -> Self {
        FilterOptions {
            search: args.search,
            category: args.category,
            country: args.country,
            language: args.language,
        }
    }
}

fn init_logging() -> anyhow::Result<PathBuf> {
    let data_dir = iptv_proto::platform::data_dir();
    std::fs::create_dir_all(&data_dir)?;
    let log_path = data_dir.join("iptv.log");

    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)?;

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_writer(log_file)
        .with_ansi(false);

    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                tracing_subscriber::EnvFilter::new("info,iptv=debug,iptv_proto=debug")
            }),
        )
        .init();

    Ok(log_path)
}

fn print_progress(percent: u8) {
    eprint!("\rloading catalog... {:>3}%", percent);
    let _ = std::io::stderr().flush();
    if percent >= 100 {
        eprintln!();
    }
}

/// Load the catalog batch by batch until `done` accepts the accumulation or
/// the catalog is complete. Returns the last accumulation.
async fn load_until(
    client: &CatalogClient,
    config: &Config,
    mut done: impl FnMut(&[ChannelWithStream], u8) -> bool,
) -> anyhow::Result<Vec<ChannelWithStream>> {
    let progress = client
        .load_progressively(config.loader.batch_size())
        .await
        .context("failed to load channel catalog")?;
    let mut progress = Box::pin(progress);

    let mut channels = Vec::new();
    while let Some(step) = progress.next().await {
        print_progress(step.percent);
        channels.extend(step.channels.iter().skip(channels.len()).cloned());
        if done(&channels, step.percent) {
            if step.percent < 100 {
                eprintln!();
            }
            info!("catalog: stopped loading at {}%", step.percent);
            break;
        }
    }
    Ok(channels)
}

async fn load_all(client: &CatalogClient, config: &Config) -> anyhow::Result<Vec<ChannelWithStream>> {
    load_until(client, config, |_, _| false).await
}

fn print_channels(channels: &[ChannelWithStream], favorites: &Favorites<FileStore>) {
    for c in channels {
        let star = if favorites.contains(c.id()) { "*" } else { " " };
        println!(
            "{} {:<28} {:<32} {:<3} {:<14} {} stream(s)",
            star,
            c.id(),
            c.name(),
            c.channel.country,
            c.channel.categories.first().map(String::as_str).unwrap_or("-"),
            c.streams.len()
        );
    }
}

async fn play_command(
    client: &CatalogClient,
    config: &Config,
    id: Option<String>,
    stream: Option<usize>,
    random: bool,
    filters: FilterOptions,
) -> anyhow::Result<()> {
    let channel = match (id, random) {
        (Some(id), _) => {
            let channels =
                load_until(client, config, |acc, _| acc.iter().any(|c| c.id() == id)).await?;
            channels
                .into_iter()
                .find(|c| c.id() == id)
                .with_context(|| format!("no playable channel with id {}", id))?
        }
        (None, true) => {
            let channels = filter_channels(&load_all(client, config).await?, &filters);
            channels
                .choose(&mut rand::thread_rng())
                .cloned()
                .context("no channel matches the filters")?
        }
        (None, false) => {
            let threshold = config.loader.preview_threshold;
            let channels = load_until(client, config, |acc, percent| {
                percent >= threshold && !filter_channels(acc, &filters).is_empty()
            })
            .await?;
            filter_channels(&channels, &filters)
                .into_iter()
                .next()
                .context("no channel matches the filters")?
        }
    };

    let first = stream.map(|n| n.saturating_sub(1)).unwrap_or(0);
    info!("play: {} from stream {}", channel.id(), first + 1);
    session::play(config, &channel, first).await
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let log_path = init_logging()?;
    info!("Log file: {:?}", log_path);

    let config = Config::load()?;
    info!("Config loaded from: {:?}", Config::config_path());

    let client = CatalogClient::new(&config.catalog)?;
    let mut favorites = Favorites::load(FileStore::new(config.paths.store_file.clone()));

    match cli.command {
        Command::List {
            filters,
            favorites: only_favorites,
            limit,
        } => {
            let channels = load_all(&client, &config).await?;
            let mut matched = filter_channels(&channels, &filters.into());
            if only_favorites {
                matched.retain(|c| favorites.contains(c.id()));
            }
            print_channels(&matched[..matched.len().min(limit)], &favorites);
            println!("{} of {} channels", matched.len().min(limit), matched.len());
        }
        Command::Popular { limit } => {
            let channels = load_all(&client, &config).await?;
            print_channels(&popular_channels(&channels, limit), &favorites);
        }
        Command::Categories => {
            for c in client.fetch_categories().await? {
                println!("{:<16} {}", c.id, c.name);
            }
        }
        Command::Countries => {
            for c in client.fetch_countries().await? {
                println!("{} {:<3} {}", c.flag, c.code, c.name);
            }
        }
        Command::Languages => {
            for l in client.fetch_languages().await? {
                println!("{:<4} {}", l.code, l.name);
            }
        }
        Command::Play {
            id,
            stream,
            random,
            filters,
        } => {
            play_command(&client, &config, id, stream, random, filters.into()).await?;
        }
        Command::Favorite { id } => {
            let added = favorites.toggle(&id)?;
            if added {
                println!("{} added to favorites ({} total)", id, favorites.len());
            } else {
                println!("{} removed from favorites ({} total)", id, favorites.len());
            }
        }
    }

    Ok(())
}
