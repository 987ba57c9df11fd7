//! CLI argument definitions for cardwright.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::commands::EvidenceTarget;
use crate::models::ExecutionStatus;

/// Long version string with build metadata.
pub const LONG_VERSION: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    " (",
    env!("CW_GIT_COMMIT"),
    ", built ",
    env!("CW_BUILD_TIMESTAMP"),
    ")"
);

/// cardwright - spreadsheet test cases to tracker tickets.
///
/// Start with `cw config show` to check the tracker settings, then `cw create`
/// to file one card per test case.
#[derive(Parser, Debug)]
#[command(name = "cw")]
#[command(author, version, long_version = LONG_VERSION)]
#[command(about = "Turn spreadsheet test cases into tracker tickets and file execution evidence", long_about = None)]
pub struct Cli {
    /// Output in human-readable format instead of JSON
    #[arg(short = 'H', long = "human", global = true)]
    pub human_readable: bool,

    /// Config file to read instead of the default lookup.
    /// Can also be set via CW_CONFIG environment variable.
    #[arg(long = "config", global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create a card for every test case in a sheet that has none yet
    Create {
        /// Workbook (.xlsx, .xls or .ods)
        file: PathBuf,

        /// Sheet to read
        #[arg(short, long)]
        sheet: String,

        /// Module code used in the running-number tag (e.g., NPL)
        #[arg(short, long)]
        module: String,
    },

    /// Refresh the description of every card a sheet already has
    Update {
        /// Workbook (.xlsx, .xls or .ods)
        file: PathBuf,

        /// Sheet to read
        #[arg(short, long)]
        sheet: String,
    },

    /// Record a manual execution result
    ///
    /// Screenshots in the staging folder are moved next to the result and
    /// attached. A failure also files a defect card linked to ISSUE_KEY.
    Execute {
        /// Test case id (e.g., TC_NPL01008)
        test_case_id: String,

        /// Card of the test case (e.g., BTV-3100)
        issue_key: String,

        /// Test result
        #[arg(long, value_enum, ignore_case = true)]
        status: ExecutionStatus,

        /// Test date (defaults to today, YYYY-MM-DD)
        #[arg(long)]
        date: Option<String>,

        /// Free-text remark; for failures the text before the first ':' titles the defect
        #[arg(long, default_value = "")]
        remark: String,
    },

    /// Set the TBN date, TBN status and BAM version fields of a card
    Fields {
        /// Card to update
        issue_key: String,

        /// TBN test date
        #[arg(long)]
        tbn_date: Option<String>,

        /// TBN test status (select option value)
        #[arg(long)]
        tbn_status: Option<String>,

        /// BAM version tested
        #[arg(long)]
        bam_version: Option<String>,
    },

    /// Delete one issue, or a numbered range of issues
    Delete {
        /// Issue to delete
        #[arg(required_unless_present = "prefix", conflicts_with = "prefix")]
        key: Option<String>,

        /// Project prefix of the range (e.g., BTV)
        #[arg(long, requires_all = ["start", "end"])]
        prefix: Option<String>,

        /// First issue number of the range (inclusive)
        #[arg(long, requires = "prefix")]
        start: Option<u32>,

        /// Last issue number of the range (inclusive)
        #[arg(long, requires = "prefix")]
        end: Option<u32>,
    },

    /// Move result folders older than N days into the archive folder
    Archive {
        /// Age threshold in days
        #[arg(long, default_value_t = crate::execution::DEFAULT_ARCHIVE_DAYS)]
        days: u64,
    },

    /// Move staged screenshots into an evidence folder (local only)
    Relocate {
        /// Test case id used to name the files
        test_case_id: String,

        /// Evidence folder to move into
        #[arg(long, value_enum)]
        to: EvidenceTarget,

        /// Subfolder name under the bugs folder (defaults to the test case id)
        #[arg(long)]
        bug_folder: Option<String>,
    },

    /// Configuration commands
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

/// Configuration subcommands
#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Show the resolved configuration and where each value came from
    Show,
}
