//! Decides which declarations may be renamed

use crate::config::Settings;
use crate::coordinator::ImportTable;
use crate::semantic::{DeclId, DeclKind, Declaration, SemanticInfo};
use crate::Result;
use std::fmt;

/// Entry points the Go runtime and test harness call by name.
pub const RESERVED_NAMES: &[&str] = &["main", "init", "TestMain"];

/// Outcome of classifying one declaration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Rename,
    Preserve(PreserveReason),
}

impl Verdict {
    pub fn is_rename(self) -> bool {
        self == Verdict::Rename
    }
}

/// Why a declaration keeps its name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PreserveReason {
    Blank,
    CgoGlue,
    ExportedField,
    ExportedMethod,
    NoBody,
    Reserved,
    TestEntry,
    Universe,
    StandardLibrary,
    KeptByDependency,
    ImportName,
    UnknownMember,
    AmbiguousMember,
}

impl fmt::Display for PreserveReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reason = match self {
            PreserveReason::Blank => "blank identifier",
            PreserveReason::CgoGlue => "cgo glue",
            PreserveReason::ExportedField => "exported field",
            PreserveReason::ExportedMethod => "exported method",
            PreserveReason::NoBody => "function without body",
            PreserveReason::Reserved => "reserved name",
            PreserveReason::TestEntry => "test entry point",
            PreserveReason::Universe => "universe scope",
            PreserveReason::StandardLibrary => "standard library",
            PreserveReason::KeptByDependency => "kept by its package",
            PreserveReason::ImportName => "import name",
            PreserveReason::UnknownMember => "unknown member",
            PreserveReason::AmbiguousMember => "selected on an operand of unknown type",
        };
        f.write_str(reason)
    }
}

/// Whether `name` belongs to code generated for cgo.
pub fn is_cgo_name(name: &str) -> bool {
    name.starts_with("_C") || name.contains("_cgo")
}

/// Applies the preserve rules to declarations of one package.
pub struct Classifier<'a> {
    settings: &'a Settings,
    imports: Option<&'a mut ImportTable>,
}

impl<'a> Classifier<'a> {
    /// Without an import table every imported non-standard name is preserved.
    pub fn new(settings: &'a Settings) -> Self {
        Self {
            settings,
            imports: None,
        }
    }

    pub fn with_imports(settings: &'a Settings, imports: &'a mut ImportTable) -> Self {
        Self {
            settings,
            imports: Some(imports),
        }
    }

    pub fn classify(&mut self, info: &SemanticInfo, id: DeclId) -> Result<Verdict> {
        let decl = info.declaration(id);
        let name = decl.name.as_str();

        if name == "_" {
            return Ok(Verdict::Preserve(PreserveReason::Blank));
        }
        if is_cgo_name(name) {
            return Ok(Verdict::Preserve(PreserveReason::CgoGlue));
        }
        if info.is_pinned(id) {
            return Ok(Verdict::Preserve(PreserveReason::AmbiguousMember));
        }

        match decl.kind {
            DeclKind::Field {
                embedded: Some(target),
            } => return self.classify(info, target),
            DeclKind::Field { embedded: None } if decl.exported() => {
                return Ok(Verdict::Preserve(PreserveReason::ExportedField));
            }
            DeclKind::Function { receiver: true, .. } if decl.exported() => {
                return Ok(Verdict::Preserve(PreserveReason::ExportedMethod));
            }
            DeclKind::Function { body: false, .. } => {
                return Ok(Verdict::Preserve(PreserveReason::NoBody));
            }
            DeclKind::Function {
                test_entry: true, ..
            } => return Ok(Verdict::Preserve(PreserveReason::TestEntry)),
            DeclKind::Function {
                receiver: false, ..
            } if decl.top_level && RESERVED_NAMES.contains(&name) => {
                return Ok(Verdict::Preserve(PreserveReason::Reserved));
            }
            DeclKind::Package => return Ok(Verdict::Preserve(PreserveReason::ImportName)),
            DeclKind::Unresolved if decl.package.is_some() => {
                return Ok(Verdict::Preserve(PreserveReason::UnknownMember));
            }
            _ => {}
        }

        let Some(package) = decl.package.as_deref() else {
            return Ok(Verdict::Preserve(PreserveReason::Universe));
        };
        if self.settings.is_standard_library(package) {
            return Ok(Verdict::Preserve(PreserveReason::StandardLibrary));
        }

        if decl.kind == DeclKind::Imported && !self.renamed_by_dependency(decl)? {
            return Ok(Verdict::Preserve(PreserveReason::KeptByDependency));
        }

        Ok(Verdict::Rename)
    }

    fn renamed_by_dependency(&mut self, decl: &Declaration) -> Result<bool> {
        let (Some(imports), Some(package)) = (self.imports.as_deref_mut(), &decl.package) else {
            return Ok(false);
        };
        imports.was_renamed(package, &decl.name)
    }
}
