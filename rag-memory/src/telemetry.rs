use std::io::{self, IsTerminal};
use std::str::FromStr;

use tracing::Level;
use tracing_subscriber::filter::Directive;
use tracing_subscriber::fmt::format::Writer;
use tracing_subscriber::fmt::time::FormatTime;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::{EnvFilter, Layer, filter, fmt};

/// Target prefixes of this workspace: the engine, the model host client and the binary.
pub const TARGET_PREFIXES: [&str; 3] = ["rag_memory", "model_host", "chat_memory_backend"];

/// RFC3339 UTC timer via `chrono`, e.g. `2025-09-12T10:20:30Z`.
#[derive(Clone, Debug, Default)]
struct ChronoRfc3339Utc;

impl FormatTime for ChronoRfc3339Utc {
    fn format_time(&self, w: &mut Writer<'_>) -> std::fmt::Result {
        let s = chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true);
        w.write_str(&s)
    }
}

fn is_workspace_target(target: &str) -> bool {
    TARGET_PREFIXES.iter().any(|p| target.starts_with(p))
}

/// Formatting layer that renders only events emitted by this workspace.
///
/// Compact single-line output with RFC3339 UTC timestamps, target and
/// `file:line`, plus span-close events so instrumented calls report their
/// duration. ANSI colors only when stdout is a terminal. The per-event
/// filter leaves logs of other crates to other layers.
pub fn layer<S>() -> impl Layer<S> + Send + Sync
where
    S: tracing::Subscriber + for<'a> LookupSpan<'a>,
{
    let use_ansi = io::stdout().is_terminal();
    let only_ours = filter::filter_fn(|meta| is_workspace_target(meta.target()));

    fmt::layer()
        .with_timer(ChronoRfc3339Utc)
        .with_level(true)
        .with_target(true)
        .with_file(true)
        .with_line_number(true)
        .with_ansi(use_ansi)
        .with_span_events(fmt::format::FmtSpan::CLOSE)
        .event_format(fmt::format().compact().with_source_location(true))
        .with_filter(only_ours)
}

/// Level directives (`rag_memory=debug`, ...) for every workspace target.
pub fn level_directives(level: Level) -> Vec<Directive> {
    let level = level.as_str().to_lowercase();
    TARGET_PREFIXES
        .iter()
        .filter_map(|p| Directive::from_str(&format!("{p}={level}")).ok())
        .collect()
}

/// `EnvFilter` from `RUST_LOG` (or `default`), with workspace targets at `level`.
pub fn env_filter_with_level(default: &str, level: Level) -> EnvFilter {
    let base = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    level_directives(level)
        .into_iter()
        .fold(base, |f, d| f.add_directive(d))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn directives_cover_every_prefix() {
        let ds: Vec<String> = level_directives(Level::DEBUG)
            .iter()
            .map(|d| d.to_string())
            .collect();
        assert_eq!(
            ds,
            vec!["rag_memory=debug", "model_host=debug", "chat_memory_backend=debug"]
        );
    }

    #[test]
    fn target_filter_matches_submodules() {
        assert!(is_workspace_target("rag_memory::fusion"));
        assert!(is_workspace_target("model_host::http"));
        assert!(!is_workspace_target("qdrant_client::channel_pool"));
    }
}
