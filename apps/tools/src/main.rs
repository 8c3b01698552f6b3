use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use remote_control::{connect, EndpointAddress};

#[derive(Parser, Debug)]
#[command(name = "visualiser-remote")]
struct Cli {
    /// Endpoint of a running visualiser, `tcp://host:port` or `unix:///path`.
    #[arg(long, default_value = "tcp://127.0.0.1:9413")]
    endpoint: String,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    Alive,
    Title,
    Plugins {
        /// Print the summaries as JSON.
        #[arg(long)]
        json: bool,
    },
    Help,
    Depth,
    State {
        plugin: String,
    },
    Toggle {
        plugin: String,
    },
    /// Presses each key in order.
    Press {
        #[arg(required = true)]
        keys: Vec<String>,
    },
    Close,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let address: EndpointAddress = cli.endpoint.parse()?;
    let mut client =
        connect(&address).with_context(|| format!("failed to connect to {address}"))?;

    match cli.command {
        Command::Alive => println!("{}", client.alive()?),
        Command::Title => println!("{}", client.title()?),
        Command::Plugins { json } => {
            let plugins = client.plugins()?;
            if json {
                println!("{}", serde_json::to_string_pretty(&plugins)?);
            } else {
                for summary in plugins {
                    println!(
                        "{:<24} {:<5} toggleable={} triggerable={}",
                        summary.name.to_string(),
                        summary.state.to_string(),
                        summary.toggleable,
                        summary.triggerable
                    );
                }
            }
        }
        Command::Help => println!("{}", client.current_help()?),
        Command::Depth => println!("{}", client.modal_depth()?),
        Command::State { plugin } => println!("{plugin}: {}", client.plugin_state(&plugin)?),
        Command::Toggle { plugin } => println!("{plugin}: {}", client.toggle_plugin(&plugin)?),
        Command::Press { keys } => {
            for key in keys {
                let outcome = if client.press_key(&key)? {
                    "matched"
                } else {
                    "no binding"
                };
                println!("{key}: {outcome}");
            }
        }
        Command::Close => {
            client.close()?;
            println!("close requested");
        }
    }
    Ok(())
}
