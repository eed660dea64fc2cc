use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, ValueEnum, PartialEq, Eq)]
pub enum StoreKind {
    Memory,
    Json,
    Sqlite,
}

#[derive(Debug, Parser, Clone)]
#[command(name = "kioku", version, about = "Kioku review scheduler CLI/API")]
pub struct Cli {
    /// Card store backend
    #[arg(long, value_enum, env = "KIOKU_STORE", default_value_t = StoreKind::Json)]
    pub store: StoreKind,

    /// Store file (JSON file or SQLite DB; defaults to app data dir)
    #[arg(long, env = "KIOKU_DB_PATH")]
    pub db_path: Option<PathBuf>,

    /// Interval multiplier for a "good" rating
    #[arg(long, env = "KIOKU_GOOD_MULTIPLIER", default_value_t = kioku_core::GOOD_MULTIPLIER)]
    pub good_multiplier: u32,

    /// Interval multiplier for an "easy" rating
    #[arg(long, env = "KIOKU_EASY_MULTIPLIER", default_value_t = kioku_core::EASY_MULTIPLIER)]
    pub easy_multiplier: u32,

    /// Clear the learned flag when a card is rated "again"
    #[arg(long, env = "KIOKU_NON_STICKY_LEARNED")]
    pub non_sticky_learned: bool,

    /// Log filter (tracing EnvFilter syntax)
    #[arg(long, env = "KIOKU_LOG", default_value = "info")]
    pub log_level: String,

    #[command(subcommand)]
    pub cmd: Command,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Card operations
    #[command(subcommand)]
    Card(CardCmd),
    /// Print the due queue
    Due(QueueArgs),
    /// Record one rating for a card
    Rate(RateCmd),
    /// Interactive review loop
    Review(QueueArgs),
    /// Print review statistics
    Stats(KindArg),
    /// Export cards with review state to a JSON bundle
    Export { path: PathBuf },
    /// Import cards with review state from a JSON bundle
    Import { path: PathBuf },
    /// Launch Axum HTTP API
    Api(ApiCmd),
}

#[derive(Debug, Subcommand, Clone)]
pub enum CardCmd {
    Add(CardAdd),
    List(KindArg),
    Rm { card_id: String },
}

#[derive(Debug, Args, Clone)]
pub struct CardAdd {
    /// vocabulary, kanji or grammar
    #[arg(long)]
    pub kind: String,
    #[arg(long)]
    pub front: String,
    #[arg(long)]
    pub back: String,
}

#[derive(Debug, Args, Clone)]
pub struct KindArg {
    #[arg(long)]
    pub kind: Option<String>,
}

#[derive(Debug, Args, Clone)]
pub struct QueueArgs {
    #[arg(long)]
    pub kind: Option<String>,
    #[arg(long, default_value_t = 50)]
    pub max: usize,
}

#[derive(Debug, Args, Clone)]
pub struct RateCmd {
    pub card_id: String,
    /// again, good or easy (1/2/3 and a/g/e also work)
    pub rating: String,
}

#[derive(Debug, Args, Clone)]
pub struct ApiCmd {
    /// Bind address (host:port)
    #[arg(long, env = "KIOKU_ADDR", default_value = "127.0.0.1:8080")]
    pub addr: String,
}
