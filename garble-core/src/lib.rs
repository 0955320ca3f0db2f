//! garble: Go identifier obfuscation and stack-trace recovery
//!
//! The build side parses each package with [`SourceUnit`], resolves identifiers with a
//! [`TypeChecker`], lets the [`Classifier`] decide what may be renamed and writes the
//! result through the [`Rewriter`]. The log side indexes the original tree in a
//! [`SourceRegistry`] and runs the [`Deobfuscator`] over captured output.

pub mod classifier;
pub mod config;
pub mod coordinator;
pub mod deobfuscator;
pub mod errors;
pub mod hashing;
pub mod literals;
pub mod logger;
pub mod registry;
pub mod rewriter;
pub mod salt;
pub mod semantic;
pub mod syntax;
pub mod toolchain;

// Re-exports
pub use classifier::{Classifier, PreserveReason, Verdict};
pub use config::Settings;
pub use coordinator::{
    ExportImporter, ExportManifest, ImportRecord, ImportTable, ManifestImporter, PackageScope,
};
pub use deobfuscator::{ungarble_file, Deobfuscator, ReverseIdentifierCache, UngarbleStats};
pub use errors::{GarbleError, Result};
pub use hashing::{hash_file_name, hash_with};
pub use literals::{LiteralObfuscator, XorLiteralObfuscator};
pub use registry::{RegisteredUnit, SourceRegistry};
pub use rewriter::Rewriter;
pub use semantic::{DeclKind, Declaration, SemanticInfo, SyntacticChecker, TypeChecker};
pub use syntax::SourceUnit;
pub use toolchain::{GoToolchain, Toolchain};
