use std::{
    collections::HashMap,
    fmt::Write as _,
    fs::OpenOptions,
    path::PathBuf,
};
use nu_ansi_term::{Color, Style};
use serde::Deserialize;
use termcolor::ColorChoice;
use tracing::{field::{Field, Visit}, Level, Metadata};
use tracing_log::NormalizeEvent;
use tracing_subscriber::{
    filter::{FilterFn, LevelFilter},
    fmt::FormatEvent,
    prelude::*,
};

use crate::{prelude::*, args::Args};


#[derive(Debug, confique::Config)]
pub(crate) struct LogConfig {
    /// Minimum log level per module path prefix. A message is emitted if the
    /// entry with the longest prefix of its target allows its level. Messages
    /// whose target matches no entry are dropped.
    ///
    /// Example: only ≥"info" logs from this server generally, but ≥"trace"
    /// messages from the store. Request logs are disabled completely and
    /// ≥"debug" messages of the HTTP library `hyper` are enabled.
    ///
    ///    [log]
    ///    filters.store_graphql = "info"
    ///    filters."store_graphql::store" = "trace"
    ///    filters."store_graphql::http::log::req" = "off"
    ///    filters.hyper = "debug"
    #[config(default = { "store_graphql": "debug" })]
    pub(crate) filters: Filters,

    /// If this is set, log messages are also written to this file. The string
    /// `${cmd}` in this value is replaced by the subcommand name of the
    /// process, e.g. `serve`. Example: "/var/log/store-graphql-${cmd}.log".
    pub(crate) file: Option<PathBuf>,

    /// If this is set to `false`, log messages are not written to stdout.
    #[config(default = true)]
    pub(crate) stdout: bool,

    /// Log the headers of every incoming request at trace level.
    #[config(default = false)]
    pub(crate) log_http_headers: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(try_from = "HashMap<String, String>")]
pub(crate) struct Filters(HashMap<String, LevelFilter>);

impl TryFrom<HashMap<String, String>> for Filters {
    type Error = String;
    fn try_from(value: HashMap<String, String>) -> Result<Self, Self::Error> {
        value.into_iter()
            .map(|(target_prefix, level)| Ok((target_prefix, parse_level_filter(&level)?)))
            .collect::<Result<_, _>>()
            .map(Self)
    }
}

impl Filters {
    /// Whether an event with the given metadata passes. See the config
    /// documentation above for the logic.
    fn enabled(&self, target: &str, level: &Level) -> bool {
        // We only expect very few entries, so a linear search is fine.
        self.0.iter()
            .filter(|(target_prefix, _)| target.starts_with(target_prefix.as_str()))
            .max_by_key(|(target_prefix, _)| target_prefix.len())
            .is_some_and(|(_, level_filter)| level <= level_filter)
    }

    fn max_level(&self) -> LevelFilter {
        self.0.values().max().copied().unwrap_or(LevelFilter::OFF)
    }
}

fn parse_level_filter(s: &str) -> Result<LevelFilter, String> {
    match s {
        "off" => Ok(LevelFilter::OFF),
        "trace" => Ok(LevelFilter::TRACE),
        "debug" => Ok(LevelFilter::DEBUG),
        "info" => Ok(LevelFilter::INFO),
        "warn" => Ok(LevelFilter::WARN),
        "error" => Ok(LevelFilter::ERROR),
        other => Err(format!("invalid log level '{other}'")),
    }
}

/// Installs our own logger globally. Must only be called once!
pub(crate) fn init(config: &LogConfig, args: &Args, cmd: &str) -> Result<()> {
    let filter = {
        let filters = config.filters.clone();
        let max_level = filters.max_level();
        FilterFn::new(move |metadata: &Metadata<'_>| {
            filters.enabled(metadata.target(), metadata.level())
        }).with_max_level_hint(max_level)
    };

    let color = args.color.into();
    let stdout_output = config.stdout.then(|| {
        tracing_subscriber::fmt::layer()
            .event_format(EventFormatter(color))
            .with_writer(std::io::stdout)
    });

    let file_output = config.file.as_ref()
        .map(|path| -> Result<std::fs::File> {
            use std::io::Write;

            let new_path = path.to_str()
                .ok_or_else(|| anyhow!("log file path is not valid UTF-8"))?
                .replace("${cmd}", cmd);

            let mut file = OpenOptions::new()
                .append(true)
                .create(true)
                .open(&new_path)
                .with_context(|| format!("failed to open/create log file '{new_path}'"))?;

            // Separates runs of the process.
            file.write_all(b"\n").context("could not write to log file")?;

            Ok(file)
        })
        .transpose()?
        .map(|file| {
            tracing_subscriber::fmt::layer()
                .event_format(EventFormatter(color))
                .with_writer(file)
                .with_ansi(color == ColorChoice::Always)
        });

    tracing_subscriber::registry()
        .with(filter)
        .with(file_output)
        .with(stdout_output)
        .try_init()
        .context("failed to install logger")?;

    Ok(())
}


type TracingWriter<'a> = tracing_subscriber::fmt::format::Writer<'a>;

/// Prints events as `<time> <level> <target> >  <message> ~~ <fields>`.
/// Continuation lines of multi-line messages are aligned with the first one.
#[derive(Clone, Copy)]
struct EventFormatter(ColorChoice);

impl<S, N> FormatEvent<S, N> for EventFormatter
where
    S: tracing::Subscriber + for<'a> tracing_subscriber::registry::LookupSpan<'a>,
    N: for<'a> tracing_subscriber::fmt::FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        _ctx: &tracing_subscriber::fmt::FmtContext<'_, S, N>,
        mut writer: TracingWriter<'_>,
        event: &tracing::Event<'_>,
    ) -> std::fmt::Result {
        let use_ansi = self.0 == ColorChoice::Always
            || (writer.has_ansi_escapes() && self.0 != ColorChoice::Never);
        let style = |s: Style| if use_ansi { s } else { Style::new() };

        // Events from `log` based crates carry their real metadata in fields.
        let normalized_metadata = event.normalized_metadata();
        let metadata = normalized_metadata.as_ref().unwrap_or(event.metadata());

        let dim = style(Style::new().dimmed());
        let (level_style, body_style) = match *metadata.level() {
            Level::ERROR => (Color::Red.bold(), Color::Red.normal()),
            Level::WARN => (Color::Yellow.bold(), Color::Yellow.normal()),
            Level::INFO => (Color::Green.normal(), Style::new()),
            Level::DEBUG => (Color::Blue.normal(), Style::new().dimmed()),
            Level::TRACE => (Color::Magenta.normal(), Color::DarkGray.normal()),
        };
        let (level_style, body_style) = (style(level_style), style(body_style));

        let mut fields = FieldCollector::default();
        event.record(&mut fields);

        let time = chrono::Local::now().format("%Y-%m-%d %H:%M:%S%.3f");
        write!(writer, "{} ", dim.paint(time.to_string()))?;
        write!(writer, "{}", level_style.paint(format!("{:5}", metadata.level())))?;
        write!(writer, "{}", dim.paint(format!(" {} >  ", metadata.target())))?;

        // The padded prefix for continuation lines. Only correct for ASCII
        // targets, which is a fair assumption.
        let padding = "2021-05-04 19:40:18.270 DEBUG ".len() + 1 + metadata.target().len();
        let prefix = format!("\n{:padding$}{}", "", dim.paint(">  "));

        let mut lines = fields.message.lines();
        write!(writer, "{}", body_style.paint(lines.next().unwrap_or("")))?;
        for line in lines {
            write!(writer, "{prefix}{}", body_style.paint(line))?;
        }

        if !fields.others.is_empty() {
            if !fields.message.is_empty() {
                write!(writer, "{}", level_style.paint(" ~~"))?;
            }
            for (name, value) in &fields.others {
                write!(writer, " {}{}", body_style.italic().paint(*name), body_style.paint(format!("={value}")))?;
            }
        }

        writeln!(writer)
    }
}

/// Collects the message and all other fields of an event.
#[derive(Default)]
struct FieldCollector {
    message: String,
    others: Vec<(&'static str, String)>,
}

impl Visit for FieldCollector {
    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        match field.name() {
            "message" => {
                let _ = write!(self.message, "{value:?}");
            }
            // Metadata added by `tracing-log`.
            name if name.starts_with("log.") => {}
            name => self.others.push((name, format!("{value:?}"))),
        }
    }
}
