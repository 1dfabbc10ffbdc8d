use clap::{Parser, Subcommand, ValueEnum};

#[derive(Parser)]
#[command(name = "whisperer")]
#[command(about = "Student Whisperer CLI: chat with your academic records")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Server base URL (overrides config and WHISPERER_URL env var)
    #[arg(short, long, global = true, env = "WHISPERER_URL")]
    pub server: Option<String>,

    /// Config profile name
    #[arg(short, long, global = true, env = "WHISPERER_PROFILE", default_value = "default")]
    pub profile: String,

    /// Output format
    #[arg(short, long, global = true)]
    pub format: Option<OutputFormat>,

    /// Print debug logs (RUST_LOG takes precedence)
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Clone, Copy, ValueEnum, Default, PartialEq, Eq)]
pub enum OutputFormat {
    #[default]
    Table,
    Json,
}

impl OutputFormat {
    pub fn parse(s: &str) -> Option<Self> {
        <Self as ValueEnum>::from_str(s, true).ok()
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// Sign in with email and password, or through the identity provider
    Login(LoginArgs),
    /// Create a new account
    Register(RegisterArgs),
    /// Sign out and forget the stored session
    Logout,
    /// Show the signed-in user
    Whoami,
    /// Check server health
    Status,
    /// Ask the assistant a question (interactive when no message is given)
    Chat(ChatArgs),
    /// Show your program progress and grades
    Courses,
    /// Show your token usage for this month
    Usage(UsageArgs),
    /// Administrator tools
    Admin(AdminArgs),
    /// Manage CLI configuration
    Config(ConfigArgs),
}

#[derive(clap::Args)]
pub struct LoginArgs {
    /// Email address
    #[arg(short, long)]
    pub email: Option<String>,
    /// Password
    #[arg(long)]
    pub password: Option<String>,
    /// Sign in through the external identity provider
    #[arg(long, conflicts_with_all = ["email", "password"])]
    pub sso: bool,
    /// ID token issued by the identity provider (prompted for when missing)
    #[arg(long, env = "WHISPERER_ID_TOKEN")]
    pub id_token: Option<String>,
}

#[derive(clap::Args)]
pub struct RegisterArgs {
    /// Full name
    #[arg(short, long)]
    pub name: String,
    /// Email address
    #[arg(short, long)]
    pub email: String,
    /// Password (at least 8 characters)
    #[arg(long)]
    pub password: String,
}

#[derive(clap::Args)]
pub struct ChatArgs {
    /// Message to send; starts an interactive session when omitted
    pub message: Option<String>,
}

#[derive(clap::Args)]
pub struct UsageArgs {
    /// Keep polling and print every update
    #[arg(short, long)]
    pub watch: bool,
}

#[derive(clap::Args)]
pub struct AdminArgs {
    #[command(subcommand)]
    pub command: AdminCommands,
}

#[derive(Subcommand)]
pub enum AdminCommands {
    /// Per-user token usage for a month (defaults to the current month)
    Usage(AdminUsageArgs),
    /// Show or change the global monthly token budget
    Limit(LimitArgs),
}

#[derive(clap::Args)]
pub struct AdminUsageArgs {
    #[arg(long)]
    pub year: Option<i32>,
    #[arg(long, value_parser = clap::value_parser!(u8).range(1..=12))]
    pub month: Option<u8>,
}

#[derive(clap::Args)]
pub struct LimitArgs {
    /// New global limit; shows the current one when omitted
    #[arg(allow_negative_numbers = true)]
    pub value: Option<i64>,
}

#[derive(clap::Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommands,
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Show current config
    Show,
    /// Set config value
    Set(ConfigSetArgs),
}

#[derive(clap::Args)]
pub struct ConfigSetArgs {
    /// Key to set (server, format)
    pub key: String,
    /// Value
    pub value: String,
}
