use anyhow::{Context, Result};
use colored::Colorize;
use time::OffsetDateTime;
use whisperer_client::{AdminTokenUsage, ReportMonth, Route, TokenLimit};

use crate::cli::{AdminUsageArgs, LimitArgs, OutputFormat};
use crate::client::AppContext;
use crate::output::{print_field, print_json, print_success, print_table};

fn current_month() -> Result<ReportMonth> {
    let now = OffsetDateTime::now_utc();
    Ok(ReportMonth::new(now.year(), u8::from(now.month()))?)
}

/// Month requested on the command line, never later than `current`.
fn requested_month(args: &AdminUsageArgs, current: ReportMonth) -> Result<ReportMonth> {
    let month = ReportMonth::new(
        args.year.unwrap_or(current.year),
        args.month.unwrap_or(current.month),
    )?;
    if month > current {
        anyhow::bail!("Cannot show usage for a future month");
    }
    Ok(month)
}

pub async fn usage(ctx: &AppContext, args: &AdminUsageArgs) -> Result<()> {
    let (token, _) = ctx.require(Route::Admin).await?;
    let current = current_month()?;
    let month = requested_month(args, current)?;

    let report = ctx
        .api
        .admin_token_usage(&token, month)
        .await
        .context("Failed to load token usage")?;

    if ctx.format == OutputFormat::Json {
        return print_json(&report);
    }
    print_report(&report, month);

    let previous = month.previous();
    print!("  older: whisperer admin usage --year {} --month {}", previous.year, previous.month);
    if let Some(next) = month.next(current) {
        print!("  newer: --year {} --month {}", next.year, next.month);
    }
    println!();
    Ok(())
}

fn print_report(report: &AdminTokenUsage, month: ReportMonth) {
    println!("{}", format!("Token usage for {}-{:02}", month.year, month.month).bold());
    print_field("Global limit", report.global_limit);
    print_field("Active users", report.active_users);
    print_field("Per-user limit", report.per_user_limit());

    if report.usage_data.is_empty() {
        println!("No usage recorded for this month.");
        return;
    }
    print_table(
        &["Student ID", "Name", "Email", "Tokens", "% of limit"],
        report.usage_data.iter().map(|row| {
            let pct = report.percentage_for(row);
            let pct_text = format!("{pct:.1}%");
            let pct_text = if pct >= 100.0 {
                pct_text.red().to_string()
            } else if pct >= 80.0 {
                pct_text.yellow().to_string()
            } else {
                pct_text
            };
            vec![
                row.student_id.to_string(),
                row.name.clone(),
                row.email.clone(),
                row.tokens_used.to_string(),
                pct_text,
            ]
        }),
    );
}

pub async fn limit(ctx: &AppContext, args: &LimitArgs) -> Result<()> {
    let (token, _) = ctx.require(Route::Admin).await?;

    let limit = match args.value {
        Some(value) => {
            let limit = ctx.api.set_token_limit(&token, value).await?;
            print_success(&format!("Global token limit set to {}", limit.global_limit));
            limit
        }
        None => ctx.api.token_limit(&token).await?,
    };

    if ctx.format == OutputFormat::Json {
        return print_json(&limit);
    }
    print_limit(&limit);
    Ok(())
}

fn print_limit(limit: &TokenLimit) {
    print_field("Global limit", limit.global_limit);
    print_field("Active users", limit.active_users);
    print_field("Per-user limit", limit.per_user_limit);
}
