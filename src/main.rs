//! cardwright CLI - spreadsheet test cases to tracker tickets.

use std::process::ExitCode;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use cardwright::cli::{Cli, Commands, ConfigCommands};
use cardwright::commands::{self, CommandResult};
use cardwright::config::{self, Settings};
use cardwright::execution::CustomFieldValues;
use cardwright::models::ExecutionOutcome;
use cardwright::{Error, logging};
use clap::Parser;

fn main() -> ExitCode {
    let cli = Cli::parse();
    let human = cli.human_readable;

    let settings = match config::resolve_settings(cli.config.as_deref()) {
        Ok(settings) => settings,
        Err(e) => return fail(&e, human),
    };

    // Dropped when main returns, which flushes the file writer
    let _log_guard = logging::init(settings.log_dir.as_deref());

    let cancel = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&cancel);
    if let Err(e) = ctrlc::set_handler(move || {
        flag.store(true, Ordering::SeqCst);
        eprintln!("Interrupt received, stopping after the current test case...");
    }) {
        tracing::warn!(error = %e, "could not install interrupt handler");
    }

    match run_command(cli.command, &settings, &cancel, human) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => fail(&e, human),
    }
}

fn run_command(
    command: Commands,
    settings: &Settings,
    cancel: &AtomicBool,
    human: bool,
) -> Result<(), Error> {
    match command {
        Commands::Create { file, sheet, module } => {
            let result = commands::create(settings, &file, &sheet, &module, cancel)?;
            output(&result, human);
        }

        Commands::Update { file, sheet } => {
            let result = commands::update(settings, &file, &sheet, cancel)?;
            output(&result, human);
        }

        Commands::Execute {
            test_case_id,
            issue_key,
            status,
            date,
            remark,
        } => {
            let date = date.unwrap_or_else(|| chrono::Local::now().format("%Y-%m-%d").to_string());
            let outcome = ExecutionOutcome::new(status, date, remark);
            let result = commands::execute(settings, &test_case_id, &issue_key, &outcome)?;
            output(&result, human);
        }

        Commands::Fields {
            issue_key,
            tbn_date,
            tbn_status,
            bam_version,
        } => {
            let values = CustomFieldValues {
                tbn_test_date: tbn_date,
                tbn_test_status: tbn_status,
                bam_version,
            };
            let result = commands::fields(settings, &issue_key, &values)?;
            output(&result, human);
        }

        Commands::Delete {
            key,
            prefix,
            start,
            end,
        } => {
            let result = match (key, prefix, start, end) {
                (Some(key), None, _, _) => commands::delete_one(settings, &key, cancel)?,
                (None, Some(prefix), Some(start), Some(end)) => {
                    commands::delete_range(settings, &prefix, start, end, cancel)?
                }
                _ => {
                    return Err(Error::InvalidInput(
                        "pass either an issue key or --prefix with --start and --end".to_string(),
                    ));
                }
            };
            output(&result, human);
        }

        Commands::Archive { days } => {
            let result = commands::archive(settings, days)?;
            output(&result, human);
        }

        Commands::Relocate {
            test_case_id,
            to,
            bug_folder,
        } => {
            let result = commands::relocate(settings, &test_case_id, to, bug_folder.as_deref())?;
            output(&result, human);
        }

        Commands::Config { command } => match command {
            ConfigCommands::Show => {
                let result = commands::config_show(settings)?;
                output(&result, human);
            }
        },
    }
    Ok(())
}

fn output<T: CommandResult>(result: &T, human: bool) {
    if human {
        println!("{}", result.to_human());
    } else {
        println!("{}", result.to_json());
    }
}

fn fail(error: &Error, human: bool) -> ExitCode {
    if human {
        eprintln!("Error: {}", error);
    } else {
        eprintln!("{}", serde_json::json!({ "error": error.to_string() }));
    }
    ExitCode::FAILURE
}
