use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use inquire::{CustomType, InquireError, Select, Text};
use std::{path::PathBuf, sync::Arc};
use tokio::task::JoinHandle;
use weather_core::{
    Config, Coordinates, HttpIconLoader, LocationAcquirer, LocationSource, PermissionGate,
    PermissionMode, Presenter, Session, SessionDeps, SessionPermission, StaticPermission,
    WeatherFetcher, WeatherQuery,
    fetcher::http_client,
    location::{
        DisabledLocationProvider, FixedLocationProvider, IpLocationProvider, LocationProvider,
    },
};

use crate::{prompt::PromptPermission, view::TerminalView};

/// Top-level CLI struct.
#[derive(Debug, Parser)]
#[command(name = "weather", version, about = "Current weather for your location or any city")]
pub struct Cli {
    /// Log debug output to stderr.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Set the API key, fallback city and location source.
    Configure,

    /// Show current weather once.
    Show {
        /// City to look up; if absent, your location is used.
        city: Option<String>,

        /// Latitude, used together with --lon instead of a location lookup.
        #[arg(long, requires = "lon", allow_negative_numbers = true, conflicts_with = "city")]
        lat: Option<f64>,

        /// Longitude, used together with --lat.
        #[arg(long, requires = "lat", allow_negative_numbers = true)]
        lon: Option<f64>,

        /// Save the condition icon (PNG) to this path.
        #[arg(long)]
        icon: Option<PathBuf>,
    },

    /// Show weather for your location, then search cities until you quit.
    Interactive {
        /// Save the latest condition icon (PNG) to this path.
        #[arg(long)]
        icon: Option<PathBuf>,
    },
}

impl Cli {
    pub async fn run(self) -> Result<()> {
        match self.command {
            Command::Configure => configure(),
            Command::Show { city, lat, lon, icon } => {
                let config = Config::load()?;
                let (session, screen) = build_session(&config, icon)?;

                let cycle = match (city, lat, lon) {
                    (Some(city), _, _) => session.search(&city),
                    (None, Some(lat), Some(lon)) => {
                        let coordinates = Coordinates::new(lat, lon);
                        if !coordinates.is_valid() {
                            bail!("Coordinates out of range: {coordinates}");
                        }
                        session.submit(WeatherQuery::Coordinates(coordinates))
                    }
                    _ => start_or_pause(&session).await,
                };

                finish_cycle(cycle).await;
                session.close();
                screen.await.context("Screen task failed")?;
                Ok(())
            }
            Command::Interactive { icon } => {
                let config = Config::load()?;
                let (session, screen) = build_session(&config, icon)?;

                finish_cycle(start_or_pause(&session).await).await;

                while let Some(city) = ask_city().await? {
                    finish_cycle(session.search(&city)).await;
                }

                session.close();
                screen.await.context("Screen task failed")?;
                Ok(())
            }
        }
    }
}

fn build_session(
    config: &Config,
    icon: Option<PathBuf>,
) -> Result<(Session, JoinHandle<TerminalView>)> {
    let http = http_client(config.http_timeout())?;
    let fetcher = WeatherFetcher::from_config(config, http.clone())?;

    let provider: Arc<dyn LocationProvider> = match config.location.source {
        LocationSource::Ip => Arc::new(IpLocationProvider::new(http.clone())),
        LocationSource::Fixed => {
            let (Some(lat), Some(lon)) = (config.location.latitude, config.location.longitude)
            else {
                bail!(
                    "Location source is 'fixed' but no coordinates are configured.\n\
                     Hint: run `weather configure` and enter latitude and longitude."
                );
            };
            Arc::new(FixedLocationProvider::new(Coordinates::new(lat, lon)))
        }
        LocationSource::None => Arc::new(DisabledLocationProvider),
    };

    let permission: Arc<dyn PermissionGate> =
        match StaticPermission::from_mode(config.location.permission) {
            Some(fixed) => Arc::new(fixed),
            None => Arc::new(SessionPermission::new(PromptPermission)),
        };

    let deps = SessionDeps::from_config(
        config,
        permission,
        Arc::new(LocationAcquirer::new(provider)),
        Arc::new(fetcher),
        Arc::new(HttpIconLoader::new(http)),
    );

    let presenter = Presenter::new(TerminalView::new(icon)).icon_base_url(&config.icon_base_url);
    let (session, screen) = Session::new(deps, presenter);
    Ok((session, tokio::spawn(screen.run())))
}

/// Location-based cycle; Ctrl-C while waiting for a fix removes the subscription.
async fn start_or_pause(session: &Session) -> Option<JoinHandle<()>> {
    tokio::select! {
        cycle = session.start() => cycle,
        _ = tokio::signal::ctrl_c() => {
            session.pause();
            None
        }
    }
}

async fn finish_cycle(cycle: Option<JoinHandle<()>>) {
    if let Some(cycle) = cycle {
        if let Err(e) = cycle.await {
            tracing::error!(error = %e, "fetch cycle panicked");
        }
    }
}

/// `None` on empty input, Esc or Ctrl-C.
async fn ask_city() -> Result<Option<String>> {
    let answer = tokio::task::spawn_blocking(|| {
        Text::new("Search city:")
            .with_help_message("Enter to search, empty or Esc to quit")
            .prompt()
    })
    .await
    .context("Prompt task failed")?;

    match answer {
        Ok(city) if city.trim().is_empty() => Ok(None),
        Ok(city) => Ok(Some(city)),
        Err(InquireError::OperationCanceled | InquireError::OperationInterrupted) => Ok(None),
        Err(e) => Err(e).context("Failed to read city"),
    }
}

fn configure() -> Result<()> {
    let mut config = Config::load()?;

    let api_key = Text::new("OpenWeather API key:")
        .with_initial_value(config.api_key.as_deref().unwrap_or_default())
        .prompt()
        .context("Failed to read API key")?;
    config.api_key = Some(api_key.trim().to_string()).filter(|k| !k.is_empty());

    let current_city = config.fallback.city.clone();
    config.fallback.city = Text::new("Fallback city:")
        .with_initial_value(&current_city)
        .with_help_message("Shown when your location cannot be used")
        .prompt()
        .context("Failed to read fallback city")?;

    let sources = vec!["ip", "fixed", "none"];
    let source = Select::new("Location source:", sources)
        .prompt()
        .context("Failed to read location source")?;
    config.location.source = match source {
        "fixed" => LocationSource::Fixed,
        "none" => LocationSource::None,
        _ => LocationSource::Ip,
    };

    if config.location.source == LocationSource::Fixed {
        let lat = CustomType::<f64>::new("Latitude:").prompt().context("Failed to read latitude")?;
        let lon =
            CustomType::<f64>::new("Longitude:").prompt().context("Failed to read longitude")?;
        if !Coordinates::new(lat, lon).is_valid() {
            bail!("Coordinates out of range: {lat}, {lon}");
        }
        config.location.latitude = Some(lat);
        config.location.longitude = Some(lon);
    }

    let modes = vec!["ask", "granted", "denied"];
    let mode = Select::new("Location permission:", modes)
        .prompt()
        .context("Failed to read permission mode")?;
    config.location.permission = match mode {
        "granted" => PermissionMode::Granted,
        "denied" => PermissionMode::Denied,
        _ => PermissionMode::Ask,
    };

    config.save()?;
    println!("Configuration saved to {}", Config::config_file_path()?.display());
    Ok(())
}
