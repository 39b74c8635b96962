//! Logging setup: tracing subscriber with a compact console formatter.
//!
//! All engine output goes through [`tracing`] macros. Stage headers use the
//! `converge::stage` target and render with a `==>` prefix; everything else
//! renders as plain lines with a coloured level tag for warnings and errors.

use tracing_subscriber::EnvFilter;

/// Extracts the `message` field from a [`tracing::Event`].
#[derive(Default)]
struct MessageExtractor {
    message: String,
}

impl tracing::field::Visit for MessageExtractor {
    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            self.message = format!("{value:?}");
        }
    }

    fn record_str(&mut self, field: &tracing::field::Field, value: &str) {
        if field.name() == "message" {
            self.message = value.to_string();
        }
    }
}

/// A [`tracing_subscriber::fmt::FormatEvent`] that emits converge-style
/// console output.
struct ConvergeFormatter;

impl<S, N> tracing_subscriber::fmt::FormatEvent<S, N> for ConvergeFormatter
where
    S: tracing::Subscriber + for<'a> tracing_subscriber::registry::LookupSpan<'a>,
    N: for<'a> tracing_subscriber::fmt::FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        _ctx: &tracing_subscriber::fmt::FmtContext<'_, S, N>,
        mut writer: tracing_subscriber::fmt::format::Writer<'_>,
        event: &tracing::Event<'_>,
    ) -> std::fmt::Result {
        let metadata = event.metadata();
        let level = *metadata.level();
        let target = metadata.target();

        let mut extractor = MessageExtractor::default();
        event.record(&mut extractor);
        let msg = &extractor.message;

        match level {
            tracing::Level::ERROR => writeln!(writer, "\x1b[31mERROR\x1b[0m {msg}"),
            tracing::Level::WARN => writeln!(writer, "\x1b[33mWARN\x1b[0m  {msg}"),
            tracing::Level::INFO if target == "converge::stage" => {
                writeln!(writer, "\x1b[1;34m==>\x1b[0m \x1b[1m{msg}\x1b[0m")
            }
            tracing::Level::INFO => writeln!(writer, "    {msg}"),
            _ => writeln!(writer, "    \x1b[2m{msg}\x1b[0m"),
        }
    }
}

/// Install the global tracing subscriber.
///
/// Console verbosity defaults to `info`; `verbose` lowers it to `debug`.
/// `RUST_LOG` overrides both. Safe to call more than once — later calls are
/// no-ops (relevant in tests, where the subscriber may already be set).
pub fn init(verbose: bool) {
    let default_directive = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive));

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .event_format(ConvergeFormatter)
        .with_writer(std::io::stderr)
        .finish();

    // Ignore the error when a subscriber is already installed.
    let _ = tracing::subscriber::set_global_default(subscriber);
}

/// Log a stage header (major section) with the `==>` prefix.
pub fn stage(msg: &str) {
    tracing::info!(target: "converge::stage", "{msg}");
}
