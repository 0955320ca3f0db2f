//! `-toolexec` entry point: the Go build driver runs `garble /abs/path/to/tool args...`
//! for every tool invocation of a build.

use anyhow::{bail, Context, Result};
use garble_core::toolchain::trim_build_id;
use garble_core::{
    Classifier, GarbleError, GoToolchain, ImportTable, LiteralObfuscator, ManifestImporter,
    Rewriter, Settings, SourceUnit, SyntacticChecker, XorLiteralObfuscator,
};
use std::ffi::OsString;
use std::path::Path;
use std::process::Command;
use tracing::{debug, info};

/// Tools that run unchanged.
const PASSTHROUGH_TOOLS: &[&str] = &[
    "addr2line",
    "asm",
    "buildid",
    "cgo",
    "cover",
    "dist",
    "doc",
    "fix",
    "nm",
    "objdump",
    "pack",
    "pprof",
    "test2json",
    "trace",
    "vet",
];

/// Whether the process was started by the build driver rather than by a user.
pub fn is_toolexec_invocation(args: &[OsString]) -> bool {
    args.get(1).is_some_and(|arg| Path::new(arg).is_absolute())
}

/// Run `tool` with transformed arguments and return its exit code.
pub fn run(tool: &Path, args: Vec<String>) -> Result<i32> {
    let name = tool
        .file_stem()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    let args = match name.as_str() {
        "compile" => transform_compile(&Settings::from_env()?, args)?,
        "link" => transform_link(args),
        known if PASSTHROUGH_TOOLS.contains(&known) => args,
        other => bail!("unknown tool {:?}", other),
    };

    debug!("{} {}", tool.display(), args.join(" "));
    let status = Command::new(tool)
        .args(&args)
        .status()
        .with_context(|| format!("failed to run {}", tool.display()))?;
    Ok(status.code().unwrap_or(1))
}

/// Rewrite the package a compile invocation builds and point the compiler at the
/// rewritten files.
pub fn transform_compile(settings: &Settings, args: Vec<String>) -> Result<Vec<String>> {
    let (flags, mut paths) = split_flags_from_files(&args, ".go");
    paths.retain(|p| file_name(p) != "_gomod_.go");

    if paths.is_empty() || has_flag(&flags, "-std") {
        return Ok(args);
    }
    if paths.len() == 1 && file_name(&paths[0]) == "_testmain.go" {
        return Ok(args);
    }
    let package_path = flag_value(&flags, "-p").unwrap_or("main").to_string();
    if !settings.is_our_code(&package_path) {
        return Ok(args);
    }

    let trimpath = flag_value(&flags, "-trimpath")
        .filter(|t| t.contains(';'))
        .ok_or(GarbleError::MissingBuildFlag("-trimpath"))?
        .to_string();
    let build_id = flag_value(&flags, "-buildid").ok_or(GarbleError::MissingBuildFlag("-buildid"))?;
    let importcfg = flag_value(&flags, "-importcfg")
        .ok_or(GarbleError::MissingBuildFlag("-importcfg"))?;
    let salt = settings
        .salt
        .as_deref()
        .ok_or_else(|| GarbleError::Configuration("GARBLE_SALT is not set".into()))?;
    let code_out_dir = settings
        .code_out_dir
        .as_deref()
        .ok_or_else(|| GarbleError::Configuration("GARBLE_CODE_OUT_DIR is not set".into()))?;
    let action_id = trim_build_id(build_id);
    debug!("compiling {} (action {})", package_path, action_id);

    let rewriter = Rewriter::new(salt, code_out_dir).with_action_id(action_id);
    let mut imports = ImportTable::from_importcfg(
        Path::new(importcfg),
        Box::new(GoToolchain::default()),
        Box::new(ManifestImporter::new(rewriter.output_root())),
    )?;

    let units = paths
        .iter()
        .map(|p| SourceUnit::parse_file(Path::new(p)))
        .collect::<garble_core::Result<Vec<_>>>()?;
    let mut classifier = Classifier::with_imports(settings, &mut imports);
    let written =
        rewriter.rewrite_package(&package_path, &units, &SyntacticChecker, &mut classifier)?;

    let package_dir = rewriter.package_dir(&package_path);
    if !settings.skip_strings {
        let changed = XorLiteralObfuscator
            .obfuscate_files(&written)
            .context("literal obfuscation failed")?;
        info!("obfuscated literals in {} files of {}", changed, package_path);
    }

    let mut flags: Vec<String> = flags.to_vec();
    flag_set_value(
        &mut flags,
        "-trimpath",
        format!("{}=>;{}", package_dir.display(), trimpath),
    );
    flags.extend(written.iter().map(|p| p.display().to_string()));
    Ok(flags)
}

/// Strip symbol tables and DWARF from the final binary.
pub fn transform_link(args: Vec<String>) -> Vec<String> {
    let (flags, paths) = split_flags_from_files(&args, ".a");
    if paths.is_empty() {
        return args;
    }
    let mut out: Vec<String> = flags.to_vec();
    out.push("-w".into());
    out.push("-s".into());
    out.extend(paths);
    out
}

/// Split at the first argument naming a file with extension `ext`.
pub fn split_flags_from_files<'a>(args: &'a [String], ext: &str) -> (&'a [String], Vec<String>) {
    let index = args
        .iter()
        .position(|arg| !arg.starts_with('-') && arg.ends_with(ext))
        .unwrap_or(args.len());
    (&args[..index], args[index..].to_vec())
}

/// Value of `name`, given as `name=value` or `name value`.
pub fn flag_value<'a>(flags: &'a [String], name: &str) -> Option<&'a str> {
    let prefix = format!("{}=", name);
    for (i, flag) in flags.iter().enumerate() {
        if let Some(value) = flag.strip_prefix(&prefix) {
            return Some(value);
        }
        if flag == name {
            return flags.get(i + 1).map(String::as_str);
        }
    }
    None
}

/// Replace the value of `name` in place, appending the flag when absent.
pub fn flag_set_value(flags: &mut Vec<String>, name: &str, value: String) {
    let prefix = format!("{}=", name);
    for i in 0..flags.len() {
        if flags[i].starts_with(&prefix) {
            flags[i] = format!("{}{}", prefix, value);
            return;
        }
        if flags[i] == name && i + 1 < flags.len() {
            flags[i + 1] = value;
            return;
        }
    }
    flags.push(format!("{}{}", prefix, value));
}

fn has_flag(flags: &[String], name: &str) -> bool {
    flags.iter().any(|f| f == name)
}

fn file_name(path: &str) -> &str {
    Path::new(path)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or(path)
}
