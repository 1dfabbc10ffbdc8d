use std::sync::Arc;

use anyhow::{Result, bail};
use colored::Colorize;
use whisperer_client::{RefreshKind, Route, UsageMeter, UsageState, UsageStatus};

use crate::cli::{OutputFormat, UsageArgs};
use crate::client::AppContext;
use crate::output::{print_field, print_json, print_warning, status_label, usage_bar};

pub async fn usage(ctx: &AppContext, args: &UsageArgs) -> Result<()> {
    let (token, _) = ctx.require(Route::Chat).await?;
    let meter = Arc::new(UsageMeter::new(ctx.api.clone(), ctx.config.usage.clone()));

    if !args.watch {
        meter.refresh(&token, RefreshKind::Initial).await;
        return render(ctx.format, &meter.state());
    }

    let mut updates = meter.subscribe();
    let poller = {
        let meter = meter.clone();
        let session = ctx.session.subscribe();
        tokio::spawn(async move { meter.run(session).await })
    };
    println!(
        "Watching token usage every {}s (Ctrl-C to stop)",
        ctx.config.usage.poll_interval.as_secs()
    );

    loop {
        tokio::select! {
            changed = updates.changed() => {
                if changed.is_err() {
                    break;
                }
                let state = updates.borrow_and_update().clone();
                if !state.loading {
                    render(ctx.format, &state)?;
                }
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }
    poller.abort();
    Ok(())
}

fn render(format: OutputFormat, state: &UsageState) -> Result<()> {
    if format == OutputFormat::Json {
        return print_json(&state.snapshot);
    }
    let (Some(snapshot), Some(status)) = (state.snapshot, state.status) else {
        bail!("No usage data available");
    };
    if let Some(error) = &state.error {
        print_warning(&format!("Could not refresh usage: {error}"));
    }
    print_field(
        "Tokens",
        format!(
            "{} / {} {} {:.1}%",
            snapshot.usage,
            snapshot.limit,
            usage_bar(snapshot.percentage_used, 30),
            snapshot.percentage_used
        ),
    );
    print_field("Remaining", snapshot.remaining());
    print_field("Status", status_label(status));
    match status {
        UsageStatus::Ok => {}
        UsageStatus::Low => println!("  {}", "You are approaching your monthly limit.".yellow()),
        UsageStatus::Exhausted => println!(
            "  {}",
            "You have reached your monthly limit. Chat is unavailable until next month.".red()
        ),
    }
    Ok(())
}
