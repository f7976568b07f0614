//! CLI argument parsing using Clap.
//!
//! The binary replays saved page snapshots through a live agent, which is how
//! adapters are exercised outside a browser.

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, ValueEnum};
use log::LevelFilter;
use whisper_engine::{AdapterRegistry, ReqwestAnalysisClient, SnapshotPage};
use whisper_logging::agent_info;

use crate::debug::IntrospectionReport;
use crate::platform::agent::{Agent, AgentHandle};
use crate::platform::logging::{self, LogDestination, DEFAULT_LOG_FILE};
use crate::platform::settings::{load_settings, AgentSettings};

/// Poll step while waiting for outstanding requests.
const SETTLE_POLL: Duration = Duration::from_millis(50);

/// Whisper agent - replay chat page snapshots through the suggestion agent
#[derive(Parser, Debug)]
#[command(name = "whisper-agent")]
#[command(version, about, long_about = None)]
#[command(after_help = "Examples:
  whisper-agent --host web.whatsapp.com before.html after.html
  whisper-agent --host app.slack.com --force \"can we talk?\" page.html
  whisper-agent --settings agent.ron --print-settings
")]
pub struct Cli {
    /// Hostname the snapshots were taken from
    #[arg(long, default_value = "localhost")]
    pub host: String,

    /// Location path of the page, used when the adapter cannot name the conversation
    #[arg(long, default_value = "/")]
    pub path: String,

    /// Adapter registry JSON (defaults to the built-in adapters)
    #[arg(long)]
    pub adapters: Option<PathBuf>,

    /// Settings file (RON)
    #[arg(long)]
    pub settings: Option<PathBuf>,

    /// Override the analysis endpoint
    #[arg(long)]
    pub endpoint: Option<String>,

    /// Where log output goes
    #[arg(long, value_enum, default_value_t = LogTarget::Terminal)]
    pub log: LogTarget,

    /// Log file used by `--log file` and `--log both`
    #[arg(long, default_value = DEFAULT_LOG_FILE)]
    pub log_file: PathBuf,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, default_value = "info")]
    pub log_level: LevelFilter,

    /// Inject a synthetic incoming message after the snapshots (repeatable)
    #[arg(long = "force")]
    pub force: Vec<String>,

    /// Print the effective settings as RON and exit
    #[arg(long)]
    pub print_settings: bool,

    /// HTML snapshots of the page, applied in order
    pub snapshots: Vec<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogTarget {
    File,
    Terminal,
    Both,
}

impl LogTarget {
    fn destination(self, file: PathBuf) -> LogDestination {
        match self {
            LogTarget::File => LogDestination::File(file),
            LogTarget::Terminal => LogDestination::Terminal,
            LogTarget::Both => LogDestination::Both(file),
        }
    }
}

pub async fn run(cli: Cli) -> anyhow::Result<()> {
    logging::initialize(&cli.log.destination(cli.log_file.clone()), cli.log_level);

    let mut settings = match &cli.settings {
        Some(path) => load_settings(path),
        None => AgentSettings::default(),
    };
    if let Some(endpoint) = &cli.endpoint {
        settings.endpoint = endpoint.clone();
    }
    if cli.print_settings {
        println!("{}", settings.to_ron()?);
        return Ok(());
    }

    let registry = match &cli.adapters {
        Some(path) => AdapterRegistry::from_path(path)
            .with_context(|| format!("loading adapters from {}", path.display()))?,
        None => AdapterRegistry::builtin(),
    };

    let snapshots = cli
        .snapshots
        .iter()
        .map(|path| {
            fs::read_to_string(path)
                .with_context(|| format!("reading snapshot {}", path.display()))
        })
        .collect::<anyhow::Result<Vec<_>>>()?;
    let mut snapshots = snapshots.into_iter();

    let page = Arc::new(SnapshotPage::new(
        cli.host.as_str(),
        cli.path.as_str(),
        snapshots.next().unwrap_or_default(),
    ));
    let analysis = Arc::new(ReqwestAnalysisClient::new(settings.analysis())?);
    agent_info!("analysis endpoint {}", analysis.endpoint());
    let settle_limit = Duration::from_millis(settings.trigger.request_timeout_ms)
        + settings.debounce() * 4;

    let Some((agent, handle)) =
        Agent::attach(page.clone(), page.clone(), &registry, settings, analysis)
    else {
        println!(
            "{}",
            serde_json::json!({ "supported": false, "host": cli.host })
        );
        return Ok(());
    };

    let forced = cli.force;
    let replay = async move {
        for html in snapshots {
            page.set_html(html);
            handle.notify_mutations();
            // Two passes: the first sees new items, the second confirms them.
            handle.flush().await;
            handle.flush().await;
        }
        let debug = handle.debug();
        for text in forced {
            debug.force_suggestion(text).await;
        }
        let report = settle(&handle, settle_limit).await;
        handle.page_unloaded();
        report
    };

    let ((), report) = tokio::join!(agent.run(), replay);
    let report = report.context("agent stopped before reporting")?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

/// Waits until no request is pending or `limit` has passed, then reports.
async fn settle(handle: &AgentHandle, limit: Duration) -> Option<IntrospectionReport> {
    let debug = handle.debug();
    let deadline = tokio::time::Instant::now() + limit;
    loop {
        let report = debug.report().await?;
        let pending = report
            .agent
            .conversations
            .iter()
            .any(|c| c.pending_request.is_some());
        if !pending || tokio::time::Instant::now() >= deadline {
            return Some(report);
        }
        tokio::time::sleep(SETTLE_POLL).await;
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use clap::{CommandFactory, Parser};

    use super::{Cli, LogTarget};
    use crate::platform::logging::{LogDestination, DEFAULT_LOG_FILE};

    #[test]
    fn command_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_snapshots_and_forced_messages() {
        let cli = Cli::try_parse_from([
            "whisper-agent",
            "--host",
            "app.slack.com",
            "--force",
            "are you ok?",
            "--force",
            "call me",
            "--log",
            "both",
            "a.html",
            "b.html",
        ])
        .unwrap();

        assert_eq!(cli.host, "app.slack.com");
        assert_eq!(cli.path, "/");
        assert_eq!(cli.force, vec!["are you ok?", "call me"]);
        assert_eq!(cli.log, LogTarget::Both);
        assert_eq!(
            cli.log.destination(cli.log_file.clone()),
            LogDestination::Both(PathBuf::from(DEFAULT_LOG_FILE))
        );
        assert_eq!(cli.snapshots.len(), 2);
        assert_eq!(cli.log_level, log::LevelFilter::Info);
    }
}
