mod cli;
mod toolexec;

use anyhow::Result;
use clap::Parser;
use cli::{Cli, Commands, GoCommand};
use garble_core::logger::init_logging;
use garble_core::GarbleError;
use std::path::PathBuf;
use std::process::ExitCode;

#[tokio::main]
async fn main() -> ExitCode {
    let args: Vec<_> = std::env::args_os().collect();

    // Invoked by the go command as `garble /abs/path/to/tool args...`
    if toolexec::is_toolexec_invocation(&args) {
        init_logging(false, false);
        let tool = PathBuf::from(&args[1]);
        let tool_args = args[2..]
            .iter()
            .map(|arg| arg.to_string_lossy().into_owned())
            .collect();
        return exit(toolexec::run(&tool, tool_args));
    }

    let cli = Cli::parse();
    init_logging(cli.verbose, cli.json_logs);

    let result = match cli.command {
        Commands::Build(args) => cli::build_command(GoCommand::Build, args),
        Commands::Test(args) => cli::build_command(GoCommand::Test, args),
        Commands::Ungarble(args) => cli::ungarble_command(args).await,
    };
    exit(result)
}

fn exit(result: Result<i32>) -> ExitCode {
    match result {
        Ok(code) => ExitCode::from(u8::try_from(code).unwrap_or(1)),
        Err(err) => {
            eprintln!("garble: {:#}", err);
            match err.downcast_ref::<GarbleError>() {
                Some(GarbleError::Configuration(_)) => ExitCode::from(2),
                _ => ExitCode::from(1),
            }
        }
    }
}
