use std::time::Duration;

use ato_client::commands::{self, ManufactureOptions};
use ato_client::settings::{self, SettingsManager, SettingsUpdate};
use clap::{Parser, Subcommand};
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

#[derive(Parser)]
#[command(author, version, about)]
struct Cli {
    #[arg(short, long, global = true)]
    verbose: bool,
    /// Backend address, overriding the saved settings
    #[arg(long, global = true, env = "ATO_BACKEND_ADDR")]
    addr: Option<String>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage saved client settings
    Settings {
        #[command(subcommand)]
        command: SettingsCommands,
    },
    /// Load every slice once and print a summary
    State,
    /// Follow backend events and slice changes until Ctrl-C
    Watch,
    /// Send one raw request and print the response
    Request {
        action: String,
        #[arg(short, long, help = "Request params as a JSON object")]
        params: Option<String>,
    },
    /// Build targets and wait for them to finish
    Build {
        project_root: String,
        #[arg(required = true)]
        targets: Vec<String>,
        #[arg(long, default_value_t = 600)]
        timeout_secs: u64,
    },
    /// Build, review and export manufacturing files
    Manufacture {
        project_root: String,
        #[arg(short, long = "target", required = true)]
        targets: Vec<String>,
        #[arg(short, long)]
        output: Option<String>,
        #[arg(long, value_delimiter = ',')]
        file_types: Option<Vec<String>>,
        #[arg(short, long, default_value_t = ato_config::DEFAULT_MANUFACTURING_QUANTITY)]
        quantity: u32,
        #[arg(long, help = "Export even with uncommitted changes")]
        allow_dirty: bool,
        #[arg(long, default_value_t = 600)]
        timeout_secs: u64,
    },
}

#[derive(Subcommand)]
enum SettingsCommands {
    Show,
    Set {
        #[arg(long)]
        backend_addr: Option<String>,
        #[arg(long)]
        request_timeout_ms: Option<u64>,
        #[arg(long)]
        developer_mode: Option<bool>,
        #[arg(long)]
        export_directory: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::WARN
    };
    let subscriber = FmtSubscriber::builder().with_max_level(level).finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let manager = SettingsManager::new();
    if let Commands::Settings { command } = cli.command {
        return match command {
            SettingsCommands::Show => settings::handle_show(&manager),
            SettingsCommands::Set {
                backend_addr,
                request_timeout_ms,
                developer_mode,
                export_directory,
            } => settings::handle_set(
                &manager,
                SettingsUpdate {
                    backend_addr,
                    request_timeout_ms,
                    developer_mode,
                    export_directory,
                },
            ),
        };
    }

    let mut client_settings = manager.load()?;
    if let Some(addr) = cli.addr {
        client_settings.backend_addr = addr;
    }
    let kernel = ato_client::connect(&client_settings);

    let result = match cli.command {
        Commands::Settings { .. } => Ok(()),
        Commands::State => commands::cmd_state(&kernel).await,
        Commands::Watch => commands::cmd_watch(&kernel).await,
        Commands::Request { action, params } => {
            match commands::cmd_request(&kernel, &action, params.as_deref()).await {
                Ok(value) => serde_json::to_string_pretty(&value)
                    .map(|json| println!("{json}"))
                    .map_err(Into::into),
                Err(e) => Err(e),
            }
        }
        Commands::Build {
            project_root,
            targets,
            timeout_secs,
        } => commands::cmd_build(
            &kernel,
            &project_root,
            &targets,
            Duration::from_secs(timeout_secs),
        )
        .await
        .map(|_| ()),
        Commands::Manufacture {
            project_root,
            targets,
            output,
            file_types,
            quantity,
            allow_dirty,
            timeout_secs,
        } => {
            let opts = ManufactureOptions {
                project_root,
                targets,
                directory: output,
                file_types,
                quantity,
                allow_dirty,
                timeout: Duration::from_secs(timeout_secs),
            };
            commands::cmd_manufacture(&kernel, opts).await.map(|files| {
                println!(":: Exported {} file(s)", files.len());
                for f in files {
                    println!("   {f}");
                }
            })
        }
    };

    kernel.shutdown().await;
    result
}
