/// So-On Deck - headless sleep sound player
use clap::{Parser, Subcommand};
use soon_audio_desktop::{probe_drivers, CpalBackend, Driver};
use soon_deck::{run_session, DeckConfig};
use soon_playback::{DurationDial, PlaybackSequencer};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "soon-deck", version)]
#[command(about = "So-On sleep sound player", long_about = None)]
struct Cli {
    /// Configuration file path (defaults to ./deck.toml when present)
    #[arg(short, long, global = true, env = "SOON_DECK_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Play one session: intro, loop until near the end, outro
    Play {
        /// Session length in minutes (must be one of the dial positions)
        #[arg(short, long)]
        minutes: Option<u32>,
        /// Directory holding the intro, loop and outro clips
        #[arg(short, long)]
        assets: Option<PathBuf>,
        /// Log the VU needle while playing
        #[arg(long)]
        meter: bool,
        /// Audio driver (default, asio, jack)
        #[arg(long)]
        driver: Option<Driver>,
    },
    /// List the session lengths in dial order
    Durations {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
    /// Decode the clips and report their format
    Inspect {
        /// Directory holding the intro, loop and outro clips
        #[arg(short, long)]
        assets: Option<PathBuf>,
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
}

fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "soon_deck=info,soon_playback=info,soon_audio_desktop=info".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let mut config = DeckConfig::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Play {
            minutes,
            assets,
            meter,
            driver,
        } => {
            if let Some(assets) = assets {
                config.assets.dir = assets;
            }
            if let Some(driver) = driver {
                config.host.driver = driver;
            }
            config.host.meter |= meter;
            config.validate()?;
            play(&config, minutes)?;
        }
        Commands::Durations { json } => {
            config.validate()?;
            durations(&config, json)?;
        }
        Commands::Inspect { assets, json } => {
            if let Some(assets) = assets {
                config.assets.dir = assets;
            }
            config.validate()?;
            inspect(&config, json)?;
        }
    }

    Ok(())
}

fn play(config: &DeckConfig, minutes: Option<u32>) -> anyhow::Result<()> {
    let clips = config.assets.check_present()?;

    let backend = CpalBackend::with_driver(config.host.driver)
        .with_analysis_bins(config.sequencer.analysis_bins);
    let mut sequencer = PlaybackSequencer::new(backend, clips, config.sequencer.clone())?;
    if let Some(minutes) = minutes {
        sequencer.configure(minutes)?;
    }

    tracing::info!("Driver: {}", config.host.driver);
    tracing::info!("Assets: {}", config.assets.dir.display());

    let report = run_session(sequencer, &config.host, std::thread::sleep)?;

    if let Some(error) = report.errors.last() {
        anyhow::bail!("session aborted: {error}");
    }
    tracing::info!(
        elapsed_secs = report.elapsed.as_secs(),
        peak_level = report.peak_level,
        completed = report.completed,
        "Session finished"
    );
    Ok(())
}

fn durations(config: &DeckConfig, json: bool) -> anyhow::Result<()> {
    let mut dial = DurationDial::new(
        config.sequencer.allowed_durations.clone(),
        config.sequencer.default_duration,
    );

    if json {
        println!("{}", serde_json::to_string(dial.options())?);
        return Ok(());
    }

    // Walk one full turn starting from the default
    for _ in 0..dial.options().len() {
        let marker = if dial.current() == config.sequencer.default_duration {
            " (default)"
        } else {
            ""
        };
        println!("{:>3} min  {:>5.1}°{}", dial.current(), dial.rotation(), marker);
        dial.advance();
    }
    Ok(())
}

fn inspect(config: &DeckConfig, json: bool) -> anyhow::Result<()> {
    let infos = config.assets.inspect()?;

    if json {
        println!("{}", serde_json::to_string_pretty(&infos)?);
        return Ok(());
    }

    for (label, info) in ["intro", "loop", "outro"].iter().zip(&infos) {
        let duration = info.duration();
        println!(
            "{:<6} {:>4}:{:06.3}  {:>6} Hz  {} ch  {}",
            label,
            duration.as_secs() / 60,
            duration.as_secs_f64() % 60.0,
            info.sample_rate,
            info.channels,
            info.path.display()
        );
    }

    println!();
    for driver in probe_drivers() {
        match (driver.sample_rate, driver.channels) {
            (Some(rate), Some(channels)) => {
                println!("{:<10} {:>6} Hz  {} ch", driver.name, rate, channels);
            }
            _ if driver.available => println!("{:<10} no output device", driver.name),
            _ => println!("{:<10} unavailable", driver.name),
        }
    }
    Ok(())
}
