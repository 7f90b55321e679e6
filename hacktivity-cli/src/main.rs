mod cli;

use std::sync::Arc;

use anyhow::{bail, Context};
use chrono::Utc;
use clap::Parser;
use clap_verbosity_flag::{InfoLevel, Verbosity};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use hacktivity::{HackerOneClient, Notifier, Scheduler, SlackWebhook, StdoutNotifier};

use cli::{Cli, LogFormat};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Cli::parse();
    init_tracing(&args.verbosity, args.log_format);

    let settings = args.settings();
    settings.validate().context("invalid configuration")?;

    let store = Arc::new(HackerOneClient::new(&args.hackerone_url, settings.call_timeout)?);
    let notifier: Arc<dyn Notifier> = if args.dry_run {
        Arc::new(StdoutNotifier)
    } else {
        let url = args
            .webhook_url
            .as_deref()
            .context("--webhook-url is required unless --dry-run is set")?;
        Arc::new(SlackWebhook::new(url, settings.call_timeout)?)
    };

    info!(
        hackerone = %args.hackerone_url,
        notifier = notifier.name(),
        interval_secs = settings.interval.as_secs(),
        window_secs = settings.window.as_secs(),
        cache_capacity = settings.cache_capacity,
        cache_ttl_secs = settings.cache_ttl.as_secs(),
        order = %settings.order,
        detail = settings.fetch_detail,
        "starting hacktivity"
    );

    let mut scheduler = Scheduler::from_settings(&settings, store, notifier)?;

    if args.skip_backlog {
        if let Err(e) = scheduler.prime(Utc::now()).await {
            warn!(error = %e, "could not skip backlog, existing reports may be announced");
        }
    }

    if args.once {
        let report = scheduler.run_cycle(Utc::now()).await;
        if let Some(e) = report.error {
            return Err(e.context("poll cycle failed"));
        }
        if report.dispatch.failed() > 0 {
            bail!("{} of {} reports could not be delivered", report.dispatch.failed(), report.listed);
        }
        return Ok(());
    }

    scheduler.run(shutdown_signal()).await;
    Ok(())
}

fn init_tracing(verbosity: &Verbosity<InfoLevel>, format: LogFormat) {
    let filter = EnvFilter::builder()
        .with_default_directive(verbosity.tracing_level_filter().into())
        .from_env_lossy();

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false);

    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
