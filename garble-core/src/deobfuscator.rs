//! Reverses hashed names in captured logs
//!
//! A Go stack frame spans two lines: the call (`pkg.Func(...)`) followed by its
//! location (`\tfile.go:42 +0x1d`). The engine keeps the previous line back until it
//! has seen the location line, so the unit named there can resolve the call.

use crate::hashing::{hash_with, looks_hashed};
use crate::registry::{RegisteredUnit, SourceRegistry};
use crate::semantic::SyntacticChecker;
use crate::toolchain::Toolchain;
use crate::Result;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader, BufWriter};
use tracing::{debug, info, warn};

/// Default name of the rewritten log.
pub const DEFAULT_OUTPUT: &str = "ungarbled_log.txt";

static FILE_TOKEN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?:^|[\s/])([A-Za-z0-9_]+)\.go:\d").expect("file token pattern is valid")
});

static METHOD_TOKEN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"[A-Za-z0-9)\]]\.([A-Za-z0-9_]+)[(\s]").expect("method token pattern is valid")
});

/// Hashed name -> original function or method name.
///
/// Filled one unit at a time and never invalidated during a run.
#[derive(Debug, Default)]
pub struct ReverseIdentifierCache {
    names: HashMap<String, String>,
    walked: HashSet<String>,
}

impl ReverseIdentifierCache {
    pub fn get(&self, hashed: &str) -> Option<&str> {
        self.names.get(hashed).map(String::as_str)
    }

    /// Hash every function declared in `unit`, once per unit key.
    pub fn populate(&mut self, key: &str, unit: &RegisteredUnit, salt: &str) {
        if !self.walked.insert(key.to_string()) {
            return;
        }
        for name in unit.function_names() {
            self.names
                .entry(hash_with(salt, name))
                .or_insert_with(|| name.to_string());
        }
        debug!(
            "walked {} ({} names cached)",
            unit.unit.path.display(),
            self.names.len()
        );
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

/// Counters of one run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct UngarbleStats {
    pub lines: usize,
    pub files: usize,
    pub identifiers: usize,
    pub misses: usize,
}

/// Line-by-line log rewriter.
pub struct Deobfuscator<'r> {
    registry: &'r SourceRegistry,
    salt: String,
    cache: ReverseIdentifierCache,
    previous: Option<String>,
    stats: UngarbleStats,
}

impl<'r> Deobfuscator<'r> {
    pub fn new(registry: &'r SourceRegistry, salt: impl Into<String>) -> Self {
        Self {
            registry,
            salt: salt.into(),
            cache: ReverseIdentifierCache::default(),
            previous: None,
            stats: UngarbleStats::default(),
        }
    }

    pub fn stats(&self) -> UngarbleStats {
        self.stats
    }

    pub fn cache(&self) -> &ReverseIdentifierCache {
        &self.cache
    }

    /// Feed one line; returns the previous line once it is final.
    pub fn process_line(&mut self, line: &str) -> Option<String> {
        self.stats.lines += 1;
        let (current, matched) = self.substitute_files(line);
        let emitted = self
            .previous
            .take()
            .map(|previous| self.substitute_identifiers(&previous, matched.as_deref()));
        self.previous = Some(current);
        emitted
    }

    /// Flush the line still held back.
    pub fn finish(&mut self) -> Option<String> {
        self.previous
            .take()
            .map(|previous| self.substitute_identifiers(&previous, None))
    }

    /// Rewrite a whole log held in memory. Every output line ends with `\n`.
    pub fn ungarble_str(&mut self, log: &str) -> String {
        let mut out = String::with_capacity(log.len());
        for line in log.lines() {
            if let Some(done) = self.process_line(line) {
                out.push_str(&done);
                out.push('\n');
            }
        }
        if let Some(done) = self.finish() {
            out.push_str(&done);
            out.push('\n');
        }
        out
    }

    pub async fn ungarble<R, W>(&mut self, reader: R, mut writer: W) -> Result<UngarbleStats>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut lines = reader.lines();
        while let Some(line) = lines.next_line().await? {
            if let Some(done) = self.process_line(&line) {
                writer.write_all(done.as_bytes()).await?;
                writer.write_all(b"\n").await?;
            }
        }
        if let Some(done) = self.finish() {
            writer.write_all(done.as_bytes()).await?;
            writer.write_all(b"\n").await?;
        }
        writer.flush().await?;
        Ok(self.stats)
    }

    /// Replace hashed file names; also returns the key of the last unit found.
    fn substitute_files(&mut self, line: &str) -> (String, Option<String>) {
        let mut out = String::with_capacity(line.len());
        let mut cursor = 0;
        let mut matched = None;
        for caps in FILE_TOKEN.captures_iter(line) {
            let Some(token) = caps.get(1) else {
                continue;
            };
            match self.registry.lookup(token.as_str()) {
                Some(unit) => {
                    out.push_str(&line[cursor..token.start()]);
                    out.push_str(&unit.unit.name);
                    // the original name already carries the extension
                    cursor = token.end() + ".go".len();
                    matched = Some(token.as_str().to_string());
                    self.stats.files += 1;
                }
                None if looks_hashed(token.as_str()) => {
                    warn!("no source file hashes to {}", token.as_str());
                    self.stats.misses += 1;
                }
                None => {}
            }
        }
        out.push_str(&line[cursor..]);
        (out, matched)
    }

    fn substitute_identifiers(&mut self, line: &str, matched: Option<&str>) -> String {
        let mut out = String::with_capacity(line.len());
        let mut cursor = 0;
        for caps in METHOD_TOKEN.captures_iter(line) {
            let Some(token) = caps.get(1) else {
                continue;
            };
            if let Some(original) = self.resolve_identifier(token.as_str(), matched) {
                out.push_str(&line[cursor..token.start()]);
                out.push_str(&original);
                cursor = token.end();
                self.stats.identifiers += 1;
            }
        }
        out.push_str(&line[cursor..]);
        out
    }

    fn resolve_identifier(&mut self, hashed: &str, matched: Option<&str>) -> Option<String> {
        if let Some(name) = self.cache.get(hashed) {
            return Some(name.to_string());
        }
        if let Some(key) = matched {
            if let Some(unit) = self.registry.lookup(key) {
                self.cache.populate(key, unit, &self.salt);
                if let Some(name) = self.cache.get(hashed) {
                    return Some(name.to_string());
                }
            }
        }
        if looks_hashed(hashed) {
            debug!("no function hashes to {}", hashed);
            self.stats.misses += 1;
        }
        None
    }
}

/// Rewrite the log at `log_path` against the sources under `source_root`.
pub async fn ungarble_file(
    log_path: &Path,
    source_root: &Path,
    salt: &str,
    output_path: &Path,
    toolchain: Option<&dyn Toolchain>,
) -> Result<UngarbleStats> {
    let registry = SourceRegistry::build_with(source_root, salt, &SyntacticChecker, toolchain)?;

    let reader = BufReader::new(tokio::fs::File::open(log_path).await?);
    let writer = BufWriter::new(tokio::fs::File::create(output_path).await?);

    let mut deobfuscator = Deobfuscator::new(&registry, salt);
    let stats = deobfuscator.ungarble(reader, writer).await?;
    info!(
        "ungarbled {} lines into {} ({} files, {} identifiers, {} unresolved)",
        stats.lines,
        output_path.display(),
        stats.files,
        stats.identifiers,
        stats.misses
    );
    Ok(stats)
}
