use clap::Parser;

use crate::run::RunOptions;

/// Pulls cargo from the configured sources and regenerates their RSS feeds.
#[derive(Debug, Clone, Parser, PartialEq, Eq)]
#[command(name = "freightfeed", version, args_override_self = true)]
pub struct Cli {
    /// Only process a single source (by class identity). Skips the index.
    #[arg(long, value_name = "SOURCE NAME")]
    pub source: Option<String>,

    /// Regenerate every feed, even for sources with nothing new.
    #[arg(long = "force-rss")]
    pub force_rss: bool,
}

impl Cli {
    /// Parse, silently dropping arguments this binary doesn't know.
    pub fn parse_lenient<I, T>(args: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        Self::parse_from(known_args(args))
    }

    pub fn run_options(&self) -> RunOptions {
        RunOptions {
            only_source: self.source.clone().filter(|s| !s.trim().is_empty()),
            force_all: self.force_rss,
        }
    }
}

/// Keep the program name and recognized flags; `--source` must be given
/// in its `--source=NAME` form.
fn known_args<I, T>(args: I) -> Vec<String>
where
    I: IntoIterator<Item = T>,
    T: Into<String>,
{
    let mut it = args.into_iter().map(Into::into);
    let mut out: Vec<String> = it.next().into_iter().collect();
    out.extend(it.filter(|a| {
        a.starts_with("--source=")
            || matches!(a.as_str(), "--force-rss" | "-h" | "--help" | "-V" | "--version")
    }));
    out
}
