mod app;
mod history;
mod scan;
mod video;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "signlens", about = "Turn shop signboard photos into business listings")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Analyze a signboard photo
    Scan {
        /// Photo of the signboard
        #[arg(short, long)]
        image: PathBuf,

        /// Latitude of the shop (overrides config and IP lookup)
        #[arg(long, requires = "lng", allow_hyphen_values = true)]
        lat: Option<f64>,

        /// Longitude of the shop
        #[arg(long, requires = "lat", allow_hyphen_values = true)]
        lng: Option<f64>,

        /// Also generate a promotional video
        #[arg(long)]
        video: bool,

        /// Where to write the video (defaults to <record id>.mp4)
        #[arg(short, long)]
        out: Option<PathBuf>,

        /// Print the result as JSON
        #[arg(long)]
        json: bool,
    },
    /// Resolve coordinates (or this host's IP location) to a place name
    Locate {
        #[arg(long, requires = "lng", allow_hyphen_values = true)]
        lat: Option<f64>,

        #[arg(long, requires = "lat", allow_hyphen_values = true)]
        lng: Option<f64>,
    },
    /// Generate a promotional video for a saved or exported record
    Video {
        /// Stored record id, or path to a record JSON file
        #[arg(short, long)]
        record: String,

        /// Reference photo of the signboard
        #[arg(short, long)]
        image: PathBuf,

        /// Where to write the video
        #[arg(short, long)]
        out: Option<PathBuf>,
    },
    /// List saved records
    History {
        /// Maximum number of records to show
        #[arg(short, long, default_value_t = 20)]
        limit: usize,

        /// Print records as JSON
        #[arg(long)]
        json: bool,
    },
    /// Check configuration and credentials
    Health,
}

fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    // One logical thread: the simulator and the analysis call share it.
    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    match cli.command {
        Commands::Scan {
            image,
            lat,
            lng,
            video,
            out,
            json,
        } => {
            let coordinates = lat.zip(lng);
            rt.block_on(scan::run_scan(image, coordinates, video, out, json))?;
        }
        Commands::Locate { lat, lng } => {
            rt.block_on(scan::run_locate(lat.zip(lng)))?;
        }
        Commands::Video { record, image, out } => {
            rt.block_on(video::run_video(record, image, out))?;
        }
        Commands::History { limit, json } => {
            rt.block_on(history::run_history(limit, json))?;
        }
        Commands::Health => {
            let app = app::App::load()?;
            println!("signlens is healthy");
            match signlens_config::config_file_path() {
                Ok(path) if path.exists() => println!("  config: {}", path.display()),
                _ => println!("  config: defaults"),
            }
            println!("  provider: {}", app.config.provider.base_url);
            println!("  analysis model: {}", app.config.provider.analysis_model);
            println!("  video model: {}", app.config.provider.video_model);
            println!(
                "  api key ({}): {}",
                app.config.provider.api_key_env,
                if app.has_api_key() { "set" } else { "missing" }
            );
            println!("  default region: {}", app.config.locality.default_region);
            match app.config.db_path() {
                Ok(path) => println!("  database: {}", path.display()),
                Err(e) => println!("  database: unavailable ({e})"),
            }
        }
    }

    Ok(())
}
