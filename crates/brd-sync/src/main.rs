use anyhow::Context;
use brd_sync::{Scenario, SyncConfig};
use clap::{value_parser, Arg, Command};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

fn config_arg(name: &'static str) -> Arg {
    Arg::new(name)
        .long(name)
        .value_parser(value_parser!(PathBuf))
        .help("TOML configuration file")
}

fn cli() -> Command {
    Command::new("flow-sync")
        .version(brd_sync::VERSION)
        .about("Solution Flow sync engine tools")
        .subcommand_required(true)
        .subcommand(
            Command::new("replay")
                .about("Replay a scenario and print emitted events as JSON lines")
                .arg(
                    Arg::new("scenario")
                        .required(true)
                        .value_parser(value_parser!(PathBuf))
                        .help("Scenario JSON file"),
                )
                .arg(config_arg("config")),
        )
        .subcommand(
            Command::new("config")
                .about("Print the effective configuration as TOML")
                .arg(config_arg("file")),
        )
}

fn load_config(path: Option<&PathBuf>) -> anyhow::Result<SyncConfig> {
    match path {
        Some(path) => SyncConfig::load(path)
            .with_context(|| format!("loading configuration from {}", path.display())),
        None => Ok(SyncConfig::default()),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let matches = cli().get_matches();
    match matches.subcommand() {
        Some(("replay", args)) => {
            let config = load_config(args.get_one::<PathBuf>("config"))?;
            let path = args
                .get_one::<PathBuf>("scenario")
                .context("missing scenario path")?;
            let scenario = Scenario::load(path)?;
            tracing::info!(steps = scenario.steps.len(), "replaying scenario");

            for event in scenario.run(config).await? {
                println!("{}", serde_json::to_string(&event)?);
            }
        }
        Some(("config", args)) => {
            let config = load_config(args.get_one::<PathBuf>("file"))?;
            print!("{}", config.to_toml_string()?);
        }
        Some((other, _)) => anyhow::bail!("unknown subcommand {other}"),
        None => anyhow::bail!("no subcommand given"),
    }
    Ok(())
}
