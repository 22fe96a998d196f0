mod commands;
mod generator;

use anyhow::Result;
use clap::{Parser, Subcommand};
use generator::JobSpec;
use judge_common::types::{JobKind, NORMAL_MODE};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "judge-cli")]
#[command(about = "Judge CLI - Submit jobs and read results", long_about = None)]
struct Cli {
    /// Redis connection URL
    #[arg(long, env = "REDIS_URL", default_value = "redis://127.0.0.1:6379", global = true)]
    redis_url: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Queue a source file for execution
    Submit {
        /// Job kind (run, single-test, suite-test)
        #[arg(short, long, default_value = "run")]
        kind: JobKind,

        /// Language tag (e.g., python, go, java)
        #[arg(short, long)]
        language: String,

        /// Source file to submit
        #[arg(short, long)]
        file: PathBuf,

        /// Expected output (required for graded kinds)
        #[arg(short, long)]
        expected: Option<String>,

        /// Test input, passed through to the result
        #[arg(short, long, default_value = "")]
        input: String,

        /// Job mode; anything but "normal" is a re-run
        #[arg(short, long, default_value = NORMAL_MODE)]
        mode: String,

        #[arg(long, default_value = "")]
        user: String,

        #[arg(long, default_value = "")]
        problem: String,

        /// Ordinal of this test case (suite-test only)
        #[arg(long, default_value = "1")]
        test_case: u32,

        /// Size of the suite (suite-test only)
        #[arg(long, default_value = "1")]
        total: u32,
    },

    /// Pop published results
    Results {
        /// Job kind whose result list to read
        #[arg(short, long, default_value = "run")]
        kind: JobKind,

        /// Read the shared re-run list instead
        #[arg(long, default_value = "false")]
        rerun: bool,

        /// Maximum number of results to print
        #[arg(short, long, default_value = "1")]
        count: usize,

        /// Seconds to wait for each result
        #[arg(short, long, default_value = "5")]
        wait: f64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Submit {
            kind,
            language,
            file,
            expected,
            input,
            mode,
            user,
            problem,
            test_case,
            total,
        } => {
            let spec = JobSpec {
                expected,
                input,
                mode,
                user_id: user,
                problem_id: problem,
                test_case_number: test_case,
                total_test_cases: total,
                ..JobSpec::new(kind, &language, "")
            };
            commands::submit(&cli.redis_url, &file, spec).await?;
        }
        Commands::Results {
            kind,
            rerun,
            count,
            wait,
        } => {
            commands::results(&cli.redis_url, kind, rerun, count, wait).await?;
        }
    }

    Ok(())
}
