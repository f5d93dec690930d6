#[cfg(not(target_arch = "wasm32"))]
use std::path::PathBuf;

#[cfg(not(target_arch = "wasm32"))]
use anyhow::Context;
#[cfg(not(target_arch = "wasm32"))]
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[cfg(not(target_arch = "wasm32"))]
use streamgenius_lib::{
    activation, backup, catalog,
    model::CustomerStatus,
    player,
    state::LocalState,
    storage::FileStore,
    sync::CloudSync,
};

#[cfg(not(target_arch = "wasm32"))]
#[derive(clap::Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Storage file to use instead of the per-user data directory
    #[arg(long, global = true)]
    store: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[cfg(not(target_arch = "wasm32"))]
#[derive(clap::Subcommand, Debug)]
enum Command {
    /// Import channels from an #EXTINF playlist file
    Import { file: PathBuf },
    /// List stored channels, optionally fuzzy-filtered
    Channels {
        #[arg(short, long)]
        search: Option<String>,
    },
    /// Generate an activation code for a device
    GenCode {
        device: String,
        #[arg(value_parser = clap::value_parser!(u32).range(1..))]
        months: u32,
    },
    /// Redeem an activation code on this profile
    Activate { code: String },
    /// Show device id, subscription and sync settings
    Status,
    /// Write a JSON backup into a directory (default: current directory)
    Export { dir: Option<PathBuf> },
    /// Pull config, channels and movies from a URL (default: the configured one)
    SyncUrl { url: Option<String> },
    /// Save config, channels and movies to the cloud backup
    CloudPush,
    /// Restore config, channels and movies from the cloud backup
    CloudPull,
    /// Activate a device for a number of days
    Grant { device: String, days: u32 },
    /// Ban a device
    Ban { device: String },
    /// List registered devices
    Customers,
    /// Show how a URL would be played
    Strategy {
        url: String,
        /// Assume no adaptive streaming library is loaded
        #[arg(long)]
        no_library: bool,
        /// Assume the platform plays HLS manifests natively
        #[arg(long)]
        native_hls: bool,
    },
}

#[cfg(not(target_arch = "wasm32"))]
#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    use clap::Parser;
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "streamgenius=info,streamgenius_lib=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let store = match &args.store {
        Some(path) => FileStore::open(path.clone()),
        None => FileStore::open_default(),
    }
    .map_err(|e| anyhow::anyhow!(e.diagnostics()))?;
    tracing::debug!(path = %store.path().display(), "Opened store");
    let state = LocalState::new(store);

    run(args.command, state).await
}

#[cfg(not(target_arch = "wasm32"))]
async fn run(command: Command, state: LocalState<FileStore>) -> anyhow::Result<()> {
    match command {
        Command::Import { file } => {
            let text = std::fs::read_to_string(&file)
                .with_context(|| format!("Failed to read playlist {}", file.display()))?;
            let count = catalog::import_playlist(&state, &text)?;
            println!("Imported {} channels.", count);
        }
        Command::Channels { search } => {
            let channels = state.channels();
            let shown: Vec<_> = match search.as_deref() {
                Some(query) => catalog::search_channels(&channels, query),
                None => channels.iter().collect(),
            };
            for channel in &shown {
                println!("{:<16} {:<24} {:<20} {}", channel.id, channel.name, channel.group, channel.url);
            }
            println!("{} of {} channels.", shown.len(), channels.len());
        }
        Command::GenCode { device, months } => {
            if !activation::PLAN_MONTHS.contains(&months) {
                tracing::warn!(months, "Not a standard plan length");
            }
            let code = activation::generate(device.trim(), months).context("Months must be at least 1")?;
            println!("{}", code);
        }
        Command::Activate { code } => match state.redeem_code(&code)? {
            Some(expiry) => println!("Activated until {}.", expiry.format("%Y-%m-%d")),
            None => anyhow::bail!("Invalid code for device {}", state.device_id()),
        },
        Command::Status => {
            let config = state.load_config();
            let status = state.subscription_status();
            println!("App:          {}", config.app_name);
            println!("Theme:        {}", config.theme.theme().name);
            println!("Language:     {}", config.language.display_name());
            println!("Device:       {}", state.device_id());
            match (status.active, status.expiry) {
                (true, Some(expiry)) => println!("Subscription: active until {}", expiry.format("%Y-%m-%d")),
                (false, Some(expiry)) => println!("Subscription: expired {}", expiry.format("%Y-%m-%d")),
                _ => println!("Subscription: none"),
            }
            println!("Sync URL:     {}", config.remote_url().unwrap_or("-"));
            println!("Cloud:        {}", CloudSync::from_config(state.clone()).mode().display_name());
            println!("Catalog:      {} channels, {} movies", state.channels().len(), state.movies().len());
        }
        Command::Export { dir } => {
            let dir = dir.unwrap_or_else(|| PathBuf::from("."));
            let path = backup::export_to_file(&state, &dir).map_err(|e| anyhow::anyhow!(e.diagnostics()))?;
            println!("Exported to {}", path.display());
        }
        Command::SyncUrl { url } => {
            let url = match url {
                Some(url) => url,
                None => state
                    .load_config()
                    .remote_url()
                    .map(str::to_string)
                    .context("No sync URL given or configured")?,
            };
            if !backup::fetch_remote_database(&state, &url).await {
                anyhow::bail!("Sync from {} failed", url);
            }
            println!("Synced from {}.", url);
        }
        Command::CloudPush => {
            let sync = CloudSync::from_config(state);
            if !sync.push_backup().await {
                anyhow::bail!("Cloud save failed");
            }
            println!("Saved ({}).", sync.mode().display_name());
        }
        Command::CloudPull => {
            let sync = CloudSync::from_config(state);
            if !sync.pull_backup().await {
                anyhow::bail!("No backup restored");
            }
            println!("Restored ({}).", sync.mode().display_name());
        }
        Command::Grant { device, days } => {
            let sync = CloudSync::from_config(state);
            if !sync.grant_subscription(&device, days).await {
                anyhow::bail!("Granting subscription to {} failed", device);
            }
            println!("{} active for {} days.", device, days);
        }
        Command::Ban { device } => {
            let sync = CloudSync::from_config(state);
            if !sync.set_status(&device, CustomerStatus::Banned).await {
                anyhow::bail!("No record for {}", device);
            }
            println!("{} banned.", device);
        }
        Command::Customers => {
            let sync = CloudSync::from_config(state);
            let now = chrono::Utc::now();
            let customers = sync.list_customers().await;
            for c in &customers {
                let end = c
                    .subscription_end
                    .map(|d| d.format("%Y-%m-%d").to_string())
                    .unwrap_or_else(|| "-".to_string());
                println!(
                    "{:<10} {:<8} {:<11} {}",
                    c.device_id,
                    c.effective_status(now).display_name(),
                    end,
                    c.last_active.format("%Y-%m-%d %H:%M")
                );
            }
            println!("{} devices ({}).", customers.len(), sync.mode().display_name());
        }
        Command::Strategy { url, no_library, native_hls } => {
            let strategy = player::select_strategy(&url, !no_library, native_hls);
            println!("{}", strategy.display_name());
        }
    }
    Ok(())
}

#[cfg(target_arch = "wasm32")]
fn main() {}

#[cfg(all(test, not(target_arch = "wasm32")))]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn test_gen_code_requires_positive_months() {
        assert!(Args::try_parse_from(["streamgenius", "gen-code", "ABCD1234", "0"]).is_err());
        let args = Args::try_parse_from(["streamgenius", "gen-code", "ABCD1234", "6"]).unwrap();
        assert!(matches!(args.command, Command::GenCode { months: 6, .. }));
    }
}
