use std::sync::Arc;

use anyhow::{Context, Result, bail};
use colored::Colorize;
use whisperer_client::{
    ExchangeOutcome, IdentityEvent, IdentityListener, LoginForm, RegisterForm, Role, SkipReason,
    failure_message,
};

use crate::cli::{LoginArgs, OutputFormat, RegisterArgs};
use crate::client::AppContext;
use crate::output::{print_error, print_field, print_json, print_success};

pub async fn login(ctx: &AppContext, args: &LoginArgs) -> Result<()> {
    if args.sso {
        return login_sso(ctx, args).await;
    }

    let email = args.email.as_deref().context("--email is required")?;
    let password = args.password.as_deref().context("--password is required")?;

    let flow = ctx.auth_flow()?;
    match flow
        .login_with_credentials(&LoginForm::new(email, password), None)
        .await
    {
        Ok(target) => {
            ctx.remember_server();
            print_success(&format!("Logged in to {} as {}", ctx.server.cyan(), email.cyan()));
            println!("  Next: {}", target.to_string().cyan());
            Ok(())
        }
        Err(err) => bail!("{}", failure_message(&err)),
    }
}

async fn login_sso(ctx: &AppContext, args: &LoginArgs) -> Result<()> {
    ctx.reconcile().await;
    let identity = Arc::new(ctx.identity(args.id_token.clone())?);
    let listener = IdentityListener::new(identity, ctx.api.clone(), ctx.session.clone());

    let event = IdentityEvent::LoginSuccess {
        account: ctx.profile.clone(),
    };
    match listener.handle(event).await {
        Some(ExchangeOutcome::Authenticated { user, redirect }) => {
            ctx.remember_server();
            print_success(&format!(
                "Logged in to {} as {} via identity provider",
                ctx.server.cyan(),
                user.email.cyan()
            ));
            println!("  Next: {}", redirect.to_string().cyan());
            Ok(())
        }
        Some(ExchangeOutcome::Skipped(SkipReason::AlreadyAuthenticated)) => {
            println!("Already logged in. Run `whisperer logout` first to switch accounts.");
            Ok(())
        }
        Some(ExchangeOutcome::Skipped(reason)) => bail!("{}", skip_message(reason)),
        Some(ExchangeOutcome::Superseded) => bail!("Session changed during sign-in; try again"),
        Some(ExchangeOutcome::Failed(message)) => bail!("{message}"),
        None => bail!("Identity provider did not complete sign-in"),
    }
}

fn skip_message(reason: SkipReason) -> &'static str {
    match reason {
        SkipReason::AlreadyAuthenticated => "Already logged in",
        SkipReason::LoggingOut => "A logout is still in progress. Try again in a moment.",
        SkipReason::ExchangeInProgress => {
            "Another sign-in for this profile is in progress. Try again in a moment."
        }
    }
}

pub async fn register(ctx: &AppContext, args: &RegisterArgs) -> Result<()> {
    let form = RegisterForm::new(&args.name, &args.email, &args.password);
    match ctx.auth_flow()?.register(&form).await {
        Ok(_) => {
            print_success("Registration successful! Please log in with your new account.");
            println!("  whisperer login --email {}", form.email);
            Ok(())
        }
        Err(err) => bail!("{}", failure_message(&err)),
    }
}

pub async fn logout(ctx: &AppContext) -> Result<()> {
    let was_signed_in = ctx.reconcile().await.is_authenticated();
    ctx.auth_flow()?.logout().await?;
    if was_signed_in {
        print_success("Logged out (session removed)");
    } else {
        println!("No session found for profile \"{}\"", ctx.profile);
    }
    Ok(())
}

pub async fn whoami(ctx: &AppContext) -> Result<()> {
    let session = ctx.reconcile().await;
    let Some(user) = session.user() else {
        print_error(&format!("Not logged in (profile: \"{}\")", ctx.profile));
        return Ok(());
    };

    if ctx.format == OutputFormat::Json {
        return print_json(user);
    }
    print_field("Profile", &ctx.profile);
    print_field("Server", ctx.server.cyan());
    print_field("Name", &user.name);
    print_field("Email", &user.email);
    print_field("Student ID", user.student_id);
    let role = match user.role {
        Role::Admin => "admin".magenta(),
        Role::Student => "student".normal(),
    };
    print_field("Role", role);
    if let Some(source) = session.source() {
        print_field("Signed in via", source.as_str());
    }
    Ok(())
}
