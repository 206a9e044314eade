//! A GraphQL API server: requests are authenticated via bearer tokens,
//! resolvers call methods of a store and report failures as data.

use clap::Parser;
use std::{env, fs, path::PathBuf};

use crate::{
    api::Schema,
    args::{Args, Command},
    config::Config,
    prelude::*,
};

mod api;
mod app;
mod args;
mod auth;
mod config;
mod err;
mod http;
mod logger;
mod prelude;
mod store;


#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        // The log file might be the only place the operator looks at.
        error!("{:?}", e);

        eprintln!();
        eprintln!();
        bunt::eprintln!("{$red}▶▶▶ {$bold}Error:{/$}{/$} {[yellow+intense]}", e);
        eprintln!();
        if e.chain().len() > 1 {
            bunt::eprintln!("{$red+italic}Caused by:{/$}");
        }

        for (i, cause) in e.chain().skip(1).enumerate() {
            eprint!(" {: >1$}", "", i * 2);
            eprintln!("‣ {cause}");
        }

        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    // If `RUST_BACKTRACE` wasn't already set, we default to `1`. Internal
    // errors are logged with backtrace, which is only captured if this is set.
    if env::var("RUST_BACKTRACE") == Err(env::VarError::NotPresent) {
        env::set_var("RUST_BACKTRACE", "1");
    }

    let args = Args::parse();

    bunt::set_stdout_color_choice(args.stdout_color());
    bunt::set_stderr_color_choice(args.stderr_color());


    match &args.cmd {
        Command::Serve { shared } => {
            let config = load_config_and_init_logger(shared, &args, "serve")?;
            start_server(config).await?;
        }
        Command::WriteConfig { target } => config::write_template(target.as_ref())?,
        Command::ExportSchema { target } => export_schema(target.as_ref())?,
    }

    Ok(())
}

async fn start_server(config: Config) -> Result<()> {
    info!("Starting GraphQL server ...");
    trace!("Configuration: {:#?}", config);

    let store = app::store(&config.store).context("failed to build store")?;
    http::serve(&config, app::root_node(), store).await
        .context("failed to start HTTP server")?;

    Ok(())
}

/// Writes the schema of the API in GraphQL schema language.
fn export_schema(target: Option<&PathBuf>) -> Result<()> {
    let schema = app::root_node().sdl();
    match target {
        Some(path) => fs::write(path, schema)
            .with_context(|| format!("failed to write schema to '{}'", path.display()))?,
        None => print!("{schema}"),
    }

    Ok(())
}

fn load_config_and_init_logger(shared: &args::Shared, args: &Args, cmd: &str) -> Result<Config> {
    let (config, path) = match &shared.config {
        Some(path) => {
            let config = Config::load_from(path)
                .with_context(|| format!("failed to load config from '{}'", path.display()))?;
            (config, path.clone())
        }
        None => Config::from_env_or_default_locations()?,
    };

    // The logger is configured in the config file, so it can only be set up now.
    logger::init(&config.log, args, cmd)?;
    info!("Loaded config from '{}'", path.display());

    Ok(config)
}
