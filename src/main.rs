//! cachepatch - entry point for the command-line tool.

use cachepatch::{
    cli::Cli,
    config::ConfigError,
    error::{ExitCode, StructuredError},
};
use clap::Parser;

fn main() {
    // Parse command-line arguments
    let cli = Cli::parse();
    let json_errors = cli.json_errors;

    match cachepatch::run_app(cli) {
        Ok(code) => std::process::exit(code.as_i32()),
        Err(err) => {
            // Configuration problems usually mean the host is not installed
            // where we looked.
            let exit_code = if err.downcast_ref::<ConfigError>().is_some() {
                ExitCode::EnvironmentNotReady
            } else {
                ExitCode::GeneralError
            };

            if json_errors {
                let structured = StructuredError::new(&err, exit_code);
                if let Ok(json) = serde_json::to_string_pretty(&structured) {
                    eprintln!("{}", json);
                } else {
                    eprintln!("[{}] Error: {:#}", exit_code.code_prefix(), err);
                }
            } else {
                eprintln!("[{}] Error: {:#}", exit_code.code_prefix(), err);
            }

            std::process::exit(exit_code.as_i32());
        }
    }
}
