use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use garble_core::deobfuscator::DEFAULT_OUTPUT;
use garble_core::{salt, ungarble_file, GarbleError, GoToolchain, Settings};
use std::env;
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::info;

#[derive(Parser)]
#[command(name = "garble")]
#[command(about = "Obfuscate Go builds and restore the names in their stack traces")]
pub struct Cli {
    /// Log at debug level
    #[arg(short, long, global = true)]
    pub verbose: bool,
    /// Emit logs as JSON
    #[arg(long, global = true)]
    pub json_logs: bool,
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Build packages with obfuscated identifiers
    Build(BuildArgs),
    /// Test packages with obfuscated identifiers
    Test(BuildArgs),
    /// Restore original names in a log captured from an obfuscated binary
    Ungarble(UngarbleArgs),
}

#[derive(Args, Debug)]
pub struct BuildArgs {
    /// Only obfuscate packages under this import path prefix
    #[arg(long)]
    pub only: Option<String>,
    /// Import path prefixes to obfuscate even when they look like the standard library
    #[arg(long, value_delimiter = ',')]
    pub include: Vec<String>,
    /// Import path prefixes to leave untouched
    #[arg(long, value_delimiter = ',')]
    pub exclude: Vec<String>,
    /// Keep the rewritten sources in this directory
    #[arg(long)]
    pub code_out_dir: Option<PathBuf>,
    /// Leave string literals as they are
    #[arg(long)]
    pub skip_strings: bool,
    /// Flags and packages handed to the go command
    #[arg(last = true)]
    pub go_args: Vec<String>,
}

#[derive(Args, Debug)]
pub struct UngarbleArgs {
    /// Log to rewrite
    #[arg(long)]
    pub log_path: Option<PathBuf>,
    /// Root of the original source tree
    #[arg(long)]
    pub source_path: Option<PathBuf>,
    /// Salt of the build, or the salt record it wrote
    #[arg(long)]
    pub salt: Option<String>,
    /// Output file, or a directory to place ungarbled_log.txt in
    #[arg(long)]
    pub output_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GoCommand {
    Build,
    Test,
}

impl GoCommand {
    fn name(self) -> &'static str {
        match self {
            GoCommand::Build => "build",
            GoCommand::Test => "test",
        }
    }
}

pub fn build_command(go: GoCommand, args: BuildArgs) -> Result<i32> {
    let dir = env::current_dir()?;
    let salt = match env::var("GARBLE_SALT") {
        Ok(salt) if !salt.is_empty() => salt,
        _ => salt::generate(),
    };
    salt::write_record(&dir, &salt)?;

    // The scratch directory is removed on drop, after the go command has finished.
    let (code_out_dir, _scratch) = match args.code_out_dir {
        Some(dir) => (dir, None),
        None => {
            let scratch = tempfile::Builder::new()
                .prefix("garble-")
                .tempdir()
                .context("failed to create a scratch output directory")?;
            (scratch.path().to_path_buf(), Some(scratch))
        }
    };

    let settings = Settings {
        only: args.only,
        include: args.include,
        exclude: args.exclude,
        code_out_dir: Some(code_out_dir),
        skip_strings: args.skip_strings,
        salt: Some(salt),
        dir: Some(dir),
    };
    settings.to_env();

    let exe = env::current_exe().context("cannot locate the garble executable")?;
    let mut command = Command::new("go");
    command
        .arg(go.name())
        .arg("-a")
        .arg("-trimpath")
        .arg(format!("-toolexec={}", exe.display()));
    if go == GoCommand::Test {
        command.arg("-vet=off");
    }
    command.args(&args.go_args);

    info!("running go {}", go.name());
    let status = command.status().context("failed to run the go command")?;
    Ok(status.code().unwrap_or(1))
}

pub async fn ungarble_command(args: UngarbleArgs) -> Result<i32> {
    let log_path = args
        .log_path
        .ok_or_else(|| GarbleError::Configuration("--log-path is required".into()))?;
    let source_path = args
        .source_path
        .ok_or_else(|| GarbleError::Configuration("--source-path is required".into()))?;
    let salt = match args.salt {
        Some(salt) => resolve_salt(salt)?,
        None => Settings::from_env()?
            .salt
            .ok_or_else(|| GarbleError::Configuration("--salt is required".into()))?,
    };
    let output = output_path(args.output_path);

    let toolchain = GoToolchain::default();
    let stats = ungarble_file(&log_path, &source_path, &salt, &output, Some(&toolchain)).await?;
    println!(
        "Wrote {} ({} file names, {} identifiers restored)",
        output.display(),
        stats.files,
        stats.identifiers
    );
    Ok(0)
}

fn resolve_salt(value: String) -> Result<String> {
    let path = Path::new(&value);
    if path.is_file() {
        return Ok(salt::read_record(path)?);
    }
    Ok(value)
}

fn output_path(requested: Option<PathBuf>) -> PathBuf {
    match requested {
        Some(path) if path.is_dir() => path.join(DEFAULT_OUTPUT),
        Some(path) => path,
        None => PathBuf::from(DEFAULT_OUTPUT),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_path_defaults() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(output_path(None), PathBuf::from(DEFAULT_OUTPUT));
        assert_eq!(
            output_path(Some(dir.path().to_path_buf())),
            dir.path().join(DEFAULT_OUTPUT)
        );
        let file = dir.path().join("restored.log");
        assert_eq!(output_path(Some(file.clone())), file);
    }

    #[test]
    fn test_salt_from_record() {
        let dir = tempfile::tempdir().unwrap();
        let record = salt::write_record(dir.path(), "abc123").unwrap();
        assert_eq!(
            resolve_salt(record.display().to_string()).unwrap(),
            "abc123"
        );
        assert_eq!(resolve_salt("abc123".into()).unwrap(), "abc123");
    }

    #[test]
    fn test_build_args_split_lists() {
        let cli = Cli::try_parse_from([
            "garble",
            "build",
            "--include",
            "example.com/a,example.com/b",
            "--exclude",
            "example.com/a/gen",
            "--",
            "-o",
            "app",
            "./cmd/app",
        ])
        .unwrap();
        let Commands::Build(args) = cli.command else {
            panic!("expected build");
        };
        assert_eq!(args.include, vec!["example.com/a", "example.com/b"]);
        assert_eq!(args.exclude, vec!["example.com/a/gen"]);
        assert_eq!(args.go_args, vec!["-o", "app", "./cmd/app"]);
    }
}
