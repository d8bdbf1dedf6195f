use clap::{Parser, Subcommand};
use janus_client::config::{self, Config};
use janus_client::gateway::{Gateway, ProtocolVariant};
use janus_client::videoroom::{JoinPublisher, RoomEvent, VideoRoom};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "janus-cli")]
#[command(about = "Janus gateway client", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Show version
    Version,

    /// Print the server's name, version and plugins.
    Info {
        /// Config file path (default: JANUS_CLIENT_CONFIG or ~/.janus-client/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<PathBuf>,

        /// Janus WebSocket URL (default from JANUS_URL or config)
        #[arg(long)]
        url: Option<String>,
    },

    /// Print server status through the admin API. Needs an admin secret.
    Status {
        /// Config file path (default: JANUS_CLIENT_CONFIG or ~/.janus-client/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<PathBuf>,
    },

    /// List video rooms.
    Rooms {
        /// Config file path (default: JANUS_CLIENT_CONFIG or ~/.janus-client/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<PathBuf>,
    },

    /// Join a video room without publishing and print room events until interrupted.
    Watch {
        /// Config file path (default: JANUS_CLIENT_CONFIG or ~/.janus-client/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<PathBuf>,

        /// Room id.
        #[arg(long, short)]
        room: u64,

        /// Display name in the room.
        #[arg(long, default_value = "janus-cli")]
        display: String,
    },
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();

    let result = match cli.command {
        Some(Commands::Version) => {
            println!("janus-cli {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        Some(Commands::Info { config, url }) => run_info(config, url).await,
        Some(Commands::Status { config }) => run_status(config).await,
        Some(Commands::Rooms { config }) => run_rooms(config).await,
        Some(Commands::Watch {
            config,
            room,
            display,
        }) => run_watch(config, room, display).await,
        None => {
            println!("Run with --help for usage");
            Ok(())
        }
    };
    if let Err(e) = result {
        log::error!("{:#}", e);
        std::process::exit(1);
    }
}

async fn connect(config: &Config, url: &str, variant: ProtocolVariant) -> anyhow::Result<Gateway> {
    log::info!("connecting to {}", url);
    Ok(Gateway::connect_with(url, variant, config.gateway_options()).await?)
}

async fn run_info(config_path: Option<PathBuf>, url: Option<String>) -> anyhow::Result<()> {
    let (config, _) = config::load_config(config_path)?;
    let url = url.unwrap_or_else(|| config::resolve_gateway_url(&config));
    let gateway = connect(&config, &url, ProtocolVariant::Standard).await?;
    let info = gateway.info().await?;
    println!("{} {} ({})", info.name, info.version_string, info.author);
    if let Some(plugins) = info.extra.get("plugins").and_then(|p| p.as_object()) {
        for name in plugins.keys() {
            println!("  {}", name);
        }
    }
    gateway.close().await;
    Ok(())
}

async fn run_status(config_path: Option<PathBuf>) -> anyhow::Result<()> {
    let (config, path) = config::load_config(config_path)?;
    let variant = config.admin_variant().ok_or_else(|| {
        anyhow::anyhow!(
            "no admin secret: set JANUS_ADMIN_SECRET or gateway.adminSecret in {}",
            path.display()
        )
    })?;
    let gateway = connect(&config, &config::resolve_admin_url(&config), variant).await?;
    let status = gateway.get_status().await?;
    println!("{}", serde_json::to_string_pretty(&status)?);
    gateway.close().await;
    Ok(())
}

async fn run_rooms(config_path: Option<PathBuf>) -> anyhow::Result<()> {
    let (config, _) = config::load_config(config_path)?;
    let url = config::resolve_gateway_url(&config);
    let gateway = connect(&config, &url, ProtocolVariant::Standard).await?;
    let session = gateway.create().await?;
    let rooms = VideoRoom::attach(&session).await?;
    for room in rooms.list_rooms().await? {
        println!(
            "{}\t{}\t{} participant(s){}",
            room.room,
            room.description.as_deref().unwrap_or(""),
            room.num_participants,
            if room.pin_required { "\tpin" } else { "" }
        );
    }
    rooms.detach().await?;
    session.destroy().await?;
    gateway.close().await;
    Ok(())
}

async fn run_watch(config_path: Option<PathBuf>, room: u64, display: String) -> anyhow::Result<()> {
    let (config, _) = config::load_config(config_path)?;
    let url = config::resolve_gateway_url(&config);
    let gateway = connect(&config, &url, ProtocolVariant::Standard).await?;
    let mut errors = gateway
        .take_errors()
        .ok_or_else(|| anyhow::anyhow!("error channel already taken"))?;
    let session = gateway.create().await?;
    let keep_alive = session.spawn_keep_alive(config.keep_alive_interval());

    let videoroom = VideoRoom::attach(&session).await?;
    let joined = videoroom
        .join_publisher(&JoinPublisher {
            room,
            display: Some(display),
            ..Default::default()
        })
        .await?;
    println!("joined room {} as {}", joined.room, joined.id);
    for p in &joined.publishers {
        println!("publisher {} {}", p.id, p.display.as_deref().unwrap_or(""));
    }

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            err = errors.recv() => {
                keep_alive.abort();
                return match err {
                    Some(e) => Err(e.into()),
                    None => Ok(()),
                };
            }
            ev = videoroom.next_room_event() => match ev {
                Some(RoomEvent::Publishers(list)) => {
                    for p in list {
                        println!("publisher {} {}", p.id, p.display.as_deref().unwrap_or(""));
                    }
                }
                Some(RoomEvent::Unpublished(id)) => println!("unpublished {}", id),
                Some(RoomEvent::Leaving(id)) => println!("leaving {}", id),
                Some(RoomEvent::Destroyed(id)) => {
                    println!("room {} destroyed", id);
                    break;
                }
                Some(RoomEvent::Other(data)) => log::debug!("room event: {}", data),
                None => break,
            },
        }
    }

    keep_alive.abort();
    if let Err(e) = videoroom.leave().await {
        log::warn!("leave failed: {}", e);
    }
    videoroom.detach().await?;
    session.destroy().await?;
    gateway.close().await;
    Ok(())
}
