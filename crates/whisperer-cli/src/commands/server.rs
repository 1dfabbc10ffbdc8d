use anyhow::Result;
use colored::Colorize;

use crate::cli::OutputFormat;
use crate::client::AppContext;
use crate::output::print_json;

pub async fn status(ctx: &AppContext) -> Result<()> {
    match ctx.api.health().await {
        Ok(body) => {
            if ctx.format == OutputFormat::Json {
                return print_json(&body);
            }
            println!("{} {} is {}", "✓".green(), ctx.server.cyan(), "healthy".green());
            if let Some(status) = body.get("status").and_then(|v| v.as_str()) {
                println!("  status: {status}");
            }
        }
        Err(err) => {
            println!(
                "{} {} is {}: {}",
                "✗".red(),
                ctx.server.cyan(),
                "unreachable".red(),
                err.user_message()
            );
        }
    }
    Ok(())
}
