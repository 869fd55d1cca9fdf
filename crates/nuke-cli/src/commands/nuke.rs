//! Project teardown command.

use anyhow::{Context, Result};
use nuke_config::Settings;
use nuke_core::TeardownConfig;
use nuke_gcp::{AccessToken, GcpClient, discover_regions, discover_zones};
use nuke_scheduler::{Completion, KindState, Teardown, TeardownEvent, TeardownReport};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::build_registry;

/// Tear down every supported resource of the configured project.
pub async fn run(settings: Settings, access_token: Option<String>, json: bool) -> Result<()> {
    settings.validate().context("Invalid settings")?;
    let project = settings
        .project
        .clone()
        .context("No project given: use --project, GCP_PROJECT_ID or the settings file")?;

    let token = AccessToken::resolve(access_token)
        .await
        .context("Failed to obtain a Google Cloud access token")?;
    let client = GcpClient::new(token);

    let zones = if settings.zones.is_empty() {
        discover_zones(&client, &project)
            .await
            .context("Failed to list zones")?
    } else {
        settings.zones.clone()
    };
    let regions = if settings.regions.is_empty() {
        discover_regions(&client, &project)
            .await
            .context("Failed to list regions")?
    } else {
        settings.regions.clone()
    };

    let config = teardown_config(&settings, project, zones, regions)?;
    let registry = build_registry(client, &settings.exclude)?;

    println!("Nuking project: {}", config.project);
    println!(
        "Zones: {}, regions: {}, resource kinds: {}",
        config.zones.len(),
        config.regions.len(),
        registry.len()
    );
    if config.dry_run {
        println!("Dry run: nothing will be deleted");
    }

    let cancel = config.cancel.clone();
    tokio::spawn(cancel_on_interrupt(cancel));

    let teardown = Teardown::new(registry, config)
        .await
        .context("Failed to set up resource kinds")?;
    info!(run_id = %teardown.run_id(), "Starting teardown");

    println!("\n--- Starting teardown ---\n");

    let (mut rx, report_handle) = teardown.execute();
    while let Some(event) = rx.recv().await {
        if let Some(line) = render_event(&event) {
            println!("{}", line);
        }
    }

    let report = report_handle.await.context("Teardown task failed")?;

    println!("\n--- Resource Summary ---");
    for (kind, state) in &report.kinds {
        println!("  {} - {}", kind, describe(state));
    }

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&report).context("Failed to serialize report")?
        );
    }

    finish(report)
}

fn teardown_config(
    settings: &Settings,
    project: String,
    zones: Vec<String>,
    regions: Vec<String>,
) -> Result<TeardownConfig> {
    let timeout = settings.timeout.unwrap_or(TeardownConfig::DEFAULT_TIMEOUT);
    let poll_interval = settings
        .poll_interval
        .unwrap_or(TeardownConfig::DEFAULT_POLL_INTERVAL);
    if poll_interval > timeout {
        anyhow::bail!(
            "Poll interval of {}s is longer than the timeout of {}s",
            poll_interval.as_secs(),
            timeout.as_secs()
        );
    }

    Ok(TeardownConfig::new(project)
        .with_zones(zones)
        .with_regions(regions)
        .with_timeout(timeout)
        .with_poll_interval(poll_interval)
        .with_dry_run(settings.dry_run.unwrap_or(false)))
}

async fn cancel_on_interrupt(cancel: CancellationToken) {
    if tokio::signal::ctrl_c().await.is_ok() {
        warn!("Interrupt received, stopping teardown");
        cancel.cancel();
    }
}

fn render_event(event: &TeardownEvent) -> Option<String> {
    match event {
        TeardownEvent::KindState { kind, state } => match state {
            KindState::Listed { items } if !items.is_empty() => {
                Some(format!("▶ {} listed {} item(s)", kind, items.len()))
            }
            KindState::WaitingDependencies { dependencies } => Some(format!(
                "⋯ {} waiting for {}",
                kind,
                dependencies.join(", ")
            )),
            KindState::Removing { items, attempt } if *attempt == 1 => {
                Some(format!("▶ {} removing {} item(s)", kind, items.len()))
            }
            state if state.is_terminal() => Some(format!("{} {}", kind, describe(state))),
            _ => None,
        },
        TeardownEvent::Waiting {
            kind,
            dependency,
            waited,
        } => Some(format!(
            "  [{}] waiting on {} ({}s)",
            kind,
            dependency,
            waited.as_secs()
        )),
        TeardownEvent::Retrying {
            kind,
            attempt,
            reason,
            items,
            waited,
        } => Some(format!(
            "  [{}] retry {} ({:?}, {}s): {}",
            kind,
            attempt,
            reason,
            waited.as_secs(),
            items.join(", ")
        )),
        TeardownEvent::TeardownCompleted { success } => Some(if *success {
            "\n--- Teardown completed successfully ---".to_string()
        } else {
            "\n--- Teardown failed ---".to_string()
        }),
    }
}

fn describe(state: &KindState) -> String {
    match state {
        KindState::Done(Completion::Empty) => "✓ nothing to delete".to_string(),
        KindState::Done(Completion::DryRun { items }) => {
            format!("⊘ would delete: {}", items.join(", "))
        }
        KindState::Done(Completion::Removed { items, attempts }) => format!(
            "✓ deleted {} item(s) in {} attempt(s)",
            items.len(),
            attempts
        ),
        KindState::TimedOut { message } => format!("✗ timed out: {}", message),
        KindState::Failed { message } => format!("✗ failed: {}", message),
        KindState::Cancelled => "⊘ cancelled".to_string(),
        KindState::Pending => "○ pending".to_string(),
        KindState::Listed { .. }
        | KindState::WaitingDependencies { .. }
        | KindState::Removing { .. }
        | KindState::Retrying { .. } => "▶ running".to_string(),
    }
}

fn finish(report: TeardownReport) -> Result<()> {
    let dry_run = report.dry_run;
    let elapsed = report.duration().num_seconds();
    let report = report.into_result()?;

    if dry_run {
        let total: usize = report.would_delete().values().map(|items| items.len()).sum();
        println!("\n✓ Dry run finished in {}s, {} item(s) would be deleted", elapsed, total);
    } else {
        println!("\n✓ Project {} nuked in {}s", report.project, elapsed);
    }
    Ok(())
}
