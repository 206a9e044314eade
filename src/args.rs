//! This module defines the command line arguments the server accepts.

use std::path::PathBuf;

use termcolor::ColorChoice;


#[derive(Debug, clap::Parser)]
#[command(about = "GraphQL API server backed by a method store.")]
pub(crate) struct Args {
    #[command(subcommand)]
    pub(crate) cmd: Command,

    /// Whether to use colors in the output.
    #[arg(long, global = true, value_enum, default_value_t = Color::Auto)]
    pub(crate) color: Color,
}

#[derive(Debug, clap::Subcommand)]
pub(crate) enum Command {
    /// Starts the HTTP server.
    Serve {
        #[command(flatten)]
        shared: Shared,
    },

    /// Outputs a template for the configuration file (which includes
    /// descriptions of all options).
    WriteConfig {
        /// Target file. If not specified, the template is written to stdout.
        target: Option<PathBuf>,
    },

    /// Exports the API as GraphQL schema.
    ExportSchema {
        /// Target file. If not specified, the schema is written to stdout.
        target: Option<PathBuf>,
    },
}

#[derive(Debug, clap::Args)]
pub(crate) struct Shared {
    /// Path to the configuration file. If this is not specified, the path in
    /// `STORE_GRAPHQL_CONFIG_PATH` is used or `config.toml` and
    /// `/etc/store-graphql/config.toml` are tried.
    #[arg(short, long)]
    pub(crate) config: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub(crate) enum Color {
    Auto,
    Always,
    Never,
}

impl From<Color> for ColorChoice {
    fn from(src: Color) -> Self {
        match src {
            Color::Auto => ColorChoice::Auto,
            Color::Always => ColorChoice::Always,
            Color::Never => ColorChoice::Never,
        }
    }
}

impl Args {
    /// Color choice for `bunt` output to stdout. `Auto` only uses colors if
    /// stdout is a terminal.
    pub(crate) fn stdout_color(&self) -> ColorChoice {
        self.resolve_color(std::io::stdout())
    }

    pub(crate) fn stderr_color(&self) -> ColorChoice {
        self.resolve_color(std::io::stderr())
    }

    fn resolve_color(&self, stream: impl std::io::IsTerminal) -> ColorChoice {
        match self.color {
            Color::Auto if !stream.is_terminal() => ColorChoice::Never,
            other => other.into(),
        }
    }
}
