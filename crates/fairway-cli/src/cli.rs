use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use clap_complete::Shell;

#[derive(Parser)]
#[command(name = "fairway")]
#[command(about = "Track golf course visits from the command line")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Optional path to local database file
    #[arg(long, global = true, value_name = "PATH")]
    pub db_path: Option<PathBuf>,

    /// Remote API base URL (overrides config file and FAIRWAY_API_URL)
    #[arg(long, global = true, value_name = "URL")]
    pub api_url: Option<String>,

    /// Keep changes local; do not sync after a write
    #[arg(long, global = true)]
    pub offline: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Search and inspect the course catalog
    Courses {
        #[command(subcommand)]
        command: CourseCommands,
    },
    /// Record and review course visits
    Visits {
        #[command(subcommand)]
        command: VisitCommands,
    },
    /// Courses you want to play
    Wishlist {
        #[command(subcommand)]
        command: WishlistCommands,
    },
    /// Visit statistics computed by the server
    Stats {
        #[command(subcommand)]
        command: StatsCommands,
    },
    /// Suggest a course missing from the catalog
    Suggest {
        /// Course name
        #[arg(long)]
        name: String,
        /// Street address
        #[arg(long)]
        address: String,
        #[arg(long)]
        city: String,
        /// State, county or region
        #[arg(long)]
        region: Option<String>,
        /// ISO country code
        #[arg(long)]
        country: String,
        #[arg(long)]
        postal_code: Option<String>,
        #[arg(long)]
        phone: Option<String>,
        #[arg(long)]
        website: Option<String>,
    },
    /// Push local changes and pull server updates
    Sync {
        #[command(subcommand)]
        command: Option<SyncCommands>,
    },
    /// Sign in to the Fairway service
    Auth {
        #[command(subcommand)]
        command: AuthCommands,
    },
    /// Show or write the client configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
    /// Generate shell completion scripts
    Completions {
        /// Target shell
        #[arg(value_enum)]
        shell: Shell,
        /// Optional output path (stdout when omitted)
        #[arg(short, long, value_name = "PATH")]
        output: Option<PathBuf>,
    },
}

#[derive(Subcommand)]
pub enum CourseCommands {
    /// Search courses by name or city
    Search {
        /// Text to match against course name and city
        query: Option<String>,
        #[arg(long)]
        country: Option<String>,
        #[arg(long)]
        region: Option<String>,
        /// Number of courses to show
        #[arg(short, long, default_value = "20")]
        limit: u32,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show a course with its tee boxes
    Show {
        /// Course ID
        id: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
pub enum VisitCommands {
    /// List your visits, newest first
    List {
        /// Only visits to this course
        #[arg(long, value_name = "COURSE_ID")]
        course: Option<String>,
        #[arg(long)]
        year: Option<i32>,
        #[arg(long)]
        country: Option<String>,
        /// Number of visits to show
        #[arg(short, long, default_value = "20")]
        limit: u32,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Record a visit
    #[command(alias = "new")]
    Add {
        /// Course ID
        course: String,
        /// Visit date (YYYY-MM-DD, defaults to today)
        #[arg(long)]
        date: Option<String>,
        /// Holes played (9 or 18)
        #[arg(long, default_value = "18")]
        holes: u8,
        /// Gross score
        #[arg(long)]
        score: Option<i32>,
        /// Tee box ID
        #[arg(long, value_name = "TEE_BOX_ID")]
        tee: Option<String>,
    },
    /// Change a recorded visit
    Edit {
        /// Visit ID
        id: String,
        #[arg(long)]
        date: Option<String>,
        #[arg(long)]
        holes: Option<u8>,
        #[arg(long)]
        score: Option<i32>,
        #[arg(long, value_name = "TEE_BOX_ID")]
        tee: Option<String>,
    },
    /// Delete a recorded visit
    Delete {
        /// Visit ID
        id: String,
    },
    /// Courses you have played with visit counts
    Courses {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
pub enum WishlistCommands {
    /// List wishlisted courses
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Add a course to the wishlist
    Add {
        /// Course ID
        course: String,
    },
    /// Remove a course from the wishlist
    Remove {
        /// Course ID
        course: String,
    },
}

#[derive(Subcommand)]
pub enum StatsCommands {
    /// Totals, most recent visit and streaks
    Overview {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Visits grouped by year or month
    Timeline {
        #[arg(long, value_enum, default_value_t = TimelineGroup::Year)]
        by: TimelineGroup,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Public statistics for a profile slug
    Profile {
        slug: String,
        /// List visited courses instead of totals
        #[arg(long)]
        visits: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum TimelineGroup {
    Year,
    Month,
}

#[derive(Subcommand)]
pub enum SyncCommands {
    /// Show pending changes and the last sync result
    Status {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// List recently recorded sync conflicts
    Conflicts {
        /// Number of conflicts to show
        #[arg(short, long, default_value = "10")]
        limit: usize,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
pub enum AuthCommands {
    /// Sign in and store the session in the keychain
    Login {
        #[arg(long, value_name = "EMAIL")]
        email: String,
        #[arg(long, value_name = "PASSWORD")]
        password: String,
    },
    /// Create an account and sign in
    Register {
        #[arg(long, value_name = "EMAIL")]
        email: String,
        #[arg(long, value_name = "PASSWORD")]
        password: String,
        #[arg(long, value_name = "NAME")]
        display_name: String,
    },
    /// Show who is signed in
    Status {
        /// Re-read the profile from the server
        #[arg(long)]
        refresh: bool,
    },
    /// Sign out and clear the stored session
    Logout,
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Print the effective configuration
    Show,
    /// Write the config file
    Init {
        /// Remote API base URL
        #[arg(long, value_name = "URL")]
        api_url: Option<String>,
        /// Per-request timeout in milliseconds
        #[arg(long, value_name = "MS")]
        timeout_ms: Option<u64>,
    },
}
