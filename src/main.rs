use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use env_logger::{Builder, Env, Target};
use jip_client::{AppConfig, HttpTransport, JipClient};
use log::{error, info};
use serde::Serialize;
use std::io::Write;

#[derive(Parser, Debug)]
#[command(version, about = "Query and control a JenNet-IP mesh network")]
struct Cli {
    /// JIP endpoint, overrides JIP_URL
    #[arg(long, global = true)]
    url: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the JIP CGI version
    Version,
    /// Discover the available border routers
    DiscoverBrs,
    /// Discover the network behind a border router
    Discover {
        /// IPv6 address of the border router
        border_router: String,
    },
    /// Read a variable of a MIB on a node
    GetVar {
        #[arg(long)]
        border_router: String,
        node: String,
        mib: String,
        var: String,
    },
    /// Write a variable of a MIB on a node
    SetVar {
        #[arg(long)]
        border_router: String,
        node: String,
        mib: String,
        var: String,
        value: String,
    },
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("application error: {e:#}");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();
    initialize();

    let mut config = AppConfig::get().jip.clone();
    if let Some(url) = cli.url {
        config.url = url;
    }

    let client = JipClient::new(&config).context("failed to create JIP client")?;
    client.start();

    let result = execute(&client, cli.command).await;
    client.stop();

    result
}

fn initialize() {
    log_panics::init();

    let mut builder = if cfg!(debug_assertions) {
        Builder::from_env(Env::default().default_filter_or("debug"))
    } else {
        Builder::from_env(Env::default().default_filter_or("info"))
    };

    builder.format(|f, record| match record.level() {
        log::Level::Error => {
            eprintln!("{}", record.args());
            Ok(())
        }
        _ => {
            writeln!(f, "{}", record.args())
        }
    });

    builder.target(Target::Stdout).init();

    info!("jip-client version: {}", env!("CARGO_PKG_VERSION"));
}

async fn execute(client: &JipClient<HttpTransport>, command: Command) -> Result<()> {
    match command {
        Command::Version => print(&client.get_version().await?),
        Command::DiscoverBrs => {
            let status = client.discover_border_routers().await?;
            print(&client.border_routers())?;
            info!("discoverBRs status: {status}");
            Ok(())
        }
        Command::Discover { border_router } => {
            let status = client.discover(&border_router).await?;
            print(&client.network())?;
            info!("discover status: {status}");
            Ok(())
        }
        Command::GetVar {
            border_router,
            node,
            mib,
            var,
        } => {
            client.select_border_router(&border_router);
            print(&client.get_variable(&node, mib, var).await?)
        }
        Command::SetVar {
            border_router,
            node,
            mib,
            var,
            value,
        } => {
            client.select_border_router(&border_router);
            let status = client.set_variable(&node, mib, var, value).await?;
            println!("{status}");
            Ok(())
        }
    }
}

fn print(value: &impl Serialize) -> Result<()> {
    let json = serde_json::to_string_pretty(value).context("failed to serialize result")?;
    println!("{json}");
    Ok(())
}
