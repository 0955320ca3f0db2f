//! Go source units parsed with tree-sitter

use crate::{GarbleError, Result};
use std::fs;
use std::path::{Path, PathBuf};
use tree_sitter::{Node, Parser, Tree};

/// Prefix the Go toolchain gives to cgo-generated units.
pub const CGO_PREFIX: &str = "_cgo_";

/// One parsed source file.
///
/// Created when the file is first parsed and never mutated afterwards; rewriting
/// produces new text instead of editing the tree.
#[derive(Debug, Clone)]
pub struct SourceUnit {
    /// Original file name, e.g. `greet.go`.
    pub name: String,
    /// Original path on disk.
    pub path: PathBuf,
    source: String,
    tree: Tree,
}

/// An import spec of a unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportSpec {
    /// Name the import is bound to in the file scope, `None` for `.` and `_` imports.
    pub binding: Option<String>,
    /// Import path without quotes.
    pub path: String,
}

fn new_parser() -> Result<Parser> {
    let mut parser = Parser::new();
    parser
        .set_language(&tree_sitter_go::LANGUAGE.into())
        .map_err(|e| GarbleError::TypeCheck(format!("failed to load Go grammar: {}", e)))?;
    Ok(parser)
}

impl SourceUnit {
    /// Read and parse a file.
    pub fn parse_file(path: &Path) -> Result<Self> {
        let source = fs::read_to_string(path)?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self::parse(name, path.to_path_buf(), source)
    }

    /// Parse already loaded source text.
    pub fn parse(name: impl Into<String>, path: PathBuf, source: String) -> Result<Self> {
        let mut parser = new_parser()?;
        let tree = parser
            .parse(&source, None)
            .ok_or_else(|| GarbleError::parse(&path, "parser produced no tree"))?;

        let root = tree.root_node();
        if root.has_error() {
            let position = first_error(root)
                .map(|n| {
                    let p = n.start_position();
                    format!("{}:{}", p.row + 1, p.column + 1)
                })
                .unwrap_or_else(|| "unknown position".to_string());
            return Err(GarbleError::parse(
                &path,
                format!("syntax error at {}", position),
            ));
        }

        Ok(Self {
            name: name.into(),
            path,
            source,
            tree,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn root(&self) -> Node<'_> {
        self.tree.root_node()
    }

    /// Source text covered by `node`.
    pub fn text(&self, node: Node<'_>) -> &str {
        &self.source[node.byte_range()]
    }

    /// Whether the unit is cgo glue generated by the toolchain.
    pub fn is_cgo_generated(&self) -> bool {
        self.name.starts_with(CGO_PREFIX)
    }

    /// Name from the package clause.
    pub fn package_name(&self) -> Option<&str> {
        let root = self.root();
        let mut cursor = root.walk();
        let clause = root
            .named_children(&mut cursor)
            .find(|n| n.kind() == "package_clause")?;
        let mut cursor = clause.walk();
        let ident = clause
            .named_children(&mut cursor)
            .find(|n| n.kind() == "package_identifier" || n.kind() == "identifier")?;
        Some(self.text(ident))
    }

    /// All import specs of the unit, in source order.
    pub fn imports(&self) -> Vec<ImportSpec> {
        let mut imports = Vec::new();
        let root = self.root();
        let mut cursor = root.walk();
        for decl in root.named_children(&mut cursor) {
            if decl.kind() != "import_declaration" {
                continue;
            }
            for spec in descendants_of_kind(decl, "import_spec") {
                let Some(path_node) = spec.child_by_field_name("path") else {
                    continue;
                };
                let path = unquote(self.text(path_node)).to_string();
                let binding = match spec.child_by_field_name("name") {
                    Some(name) => match self.text(name) {
                        "." | "_" => None,
                        alias => Some(alias.to_string()),
                    },
                    None => Some(default_binding(&path).to_string()),
                };
                imports.push(ImportSpec { binding, path });
            }
        }
        imports
    }
}

fn first_error(node: Node<'_>) -> Option<Node<'_>> {
    if node.is_error() || node.is_missing() {
        return Some(node);
    }
    let mut cursor = node.walk();
    let children: Vec<_> = node.children(&mut cursor).collect();
    children
        .into_iter()
        .filter(|c| c.has_error())
        .find_map(first_error)
}

/// All descendants of `node` (including itself) with the given kind, in source order.
pub fn descendants_of_kind<'t>(node: Node<'t>, kind: &str) -> Vec<Node<'t>> {
    let mut found = Vec::new();
    let mut stack = vec![node];
    while let Some(current) = stack.pop() {
        if current.kind() == kind {
            found.push(current);
        }
        let mut cursor = current.walk();
        let children: Vec<_> = current.children(&mut cursor).collect();
        stack.extend(children.into_iter().rev());
    }
    found
}

/// Strip the quotes of an interpreted or raw string literal.
pub fn unquote(literal: &str) -> &str {
    literal
        .strip_prefix(['"', '`'])
        .and_then(|s| s.strip_suffix(['"', '`']))
        .unwrap_or(literal)
}

/// The package name an import path is bound to when the import has no explicit name.
///
/// This is the last path element, skipping a trailing major-version element such as
/// `v2` and dropping a `.vN` suffix (`gopkg.in/yaml.v3` binds `yaml`).
pub fn default_binding(path: &str) -> &str {
    let mut elements = path.rsplit('/');
    let mut last = elements.next().unwrap_or(path);
    if is_major_version(last) {
        if let Some(previous) = elements.next() {
            last = previous;
        }
    }
    if let Some((base, suffix)) = last.rsplit_once('.') {
        if is_major_version(suffix) {
            return base;
        }
    }
    last
}

fn is_major_version(element: &str) -> bool {
    element
        .strip_prefix('v')
        .is_some_and(|n| !n.is_empty() && n.chars().all(|c| c.is_ascii_digit()))
}
