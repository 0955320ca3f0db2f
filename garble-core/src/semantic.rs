//! Declaration identities for identifier occurrences
//!
//! The obfuscation decisions depend on what an identifier *is*, not on how it is
//! spelled. [`TypeChecker`] is the seam for whatever produces that information;
//! [`SyntacticChecker`] resolves it from the syntax trees of one package: lexical scoping
//! for names, and for members the declared type of the operand where it can be inferred.

use crate::hashing::is_exported;
use crate::syntax::SourceUnit;
use crate::Result;
use std::collections::{HashMap, HashSet};
use tracing::debug;
use tree_sitter::Node;

/// Index of a [`Declaration`] inside its [`SemanticInfo`].
pub type DeclId = usize;

/// What kind of object a declaration introduces, with the facts the classifier needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeclKind {
    /// Package-level or local variable, including parameters and results.
    Variable,
    /// Struct field. Embedded fields point at the declaration of their type.
    Field { embedded: Option<DeclId> },
    Constant,
    TypeName,
    /// Function, method or interface method.
    Function {
        receiver: bool,
        body: bool,
        test_entry: bool,
    },
    /// The name an import is bound to.
    Package,
    /// Package-level object of another package, reached through an import.
    Imported,
    /// Nothing to resolve against: universe names, unknown members.
    Unresolved,
}

/// The unique semantic entity an occurrence resolves to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Declaration {
    pub name: String,
    /// Import path of the declaring package; `None` for universe scope.
    pub package: Option<String>,
    pub kind: DeclKind,
    /// Declared in package scope (as opposed to local or member scope).
    pub top_level: bool,
}

impl Declaration {
    pub fn exported(&self) -> bool {
        is_exported(&self.name)
    }
}

/// Semantic information for one package.
#[derive(Debug, Default)]
pub struct SemanticInfo {
    pub package_path: String,
    pub package_name: String,
    decls: Vec<Declaration>,
    /// Per unit: occurrence start byte -> declaration.
    occurrences: Vec<HashMap<usize, DeclId>>,
    /// Declarations whose name must not change because a use could not be attributed.
    pinned: HashSet<DeclId>,
}

impl SemanticInfo {
    pub fn declaration(&self, id: DeclId) -> &Declaration {
        &self.decls[id]
    }

    /// Declaration of the identifier starting at byte `start` of unit `unit`.
    pub fn object_of(&self, unit: usize, start: usize) -> Option<&Declaration> {
        self.occurrences
            .get(unit)?
            .get(&start)
            .map(|id| &self.decls[*id])
    }

    /// Identity of the identifier starting at byte `start` of unit `unit`.
    pub fn id_at(&self, unit: usize, start: usize) -> Option<DeclId> {
        self.occurrences.get(unit)?.get(&start).copied()
    }

    /// Resolved occurrences of `unit` as (start byte, declaration), in source order.
    pub fn occurrences(&self, unit: usize) -> Vec<(usize, DeclId)> {
        let mut occurrences: Vec<_> = self
            .occurrences
            .get(unit)
            .map(|m| m.iter().map(|(start, id)| (*start, *id)).collect())
            .unwrap_or_default();
        occurrences.sort_unstable();
        occurrences
    }

    /// All declarations with their identities.
    pub fn declarations_with_ids(&self) -> impl Iterator<Item = (DeclId, &Declaration)> {
        self.decls.iter().enumerate()
    }

    pub fn declarations(&self) -> impl Iterator<Item = &Declaration> {
        self.decls.iter()
    }

    /// Whether some member selection may refer to `id` without being resolved to it.
    pub fn is_pinned(&self, id: DeclId) -> bool {
        self.pinned.contains(&id)
    }

    /// Number of resolved occurrences in `unit`.
    pub fn occurrence_count(&self, unit: usize) -> usize {
        self.occurrences.get(unit).map_or(0, HashMap::len)
    }
}

/// Produces [`SemanticInfo`] for the units of one package.
pub trait TypeChecker {
    fn check(&self, package_path: &str, units: &[SourceUnit]) -> Result<SemanticInfo>;
}

/// Resolves declarations from syntax alone.
#[derive(Debug, Default, Clone, Copy)]
pub struct SyntacticChecker;

impl TypeChecker for SyntacticChecker {
    fn check(&self, package_path: &str, units: &[SourceUnit]) -> Result<SemanticInfo> {
        let mut resolver = Resolver::new(package_path, units);
        resolver.collect_package_scope();
        resolver.collect_signatures();
        for unit in 0..units.len() {
            resolver.resolve_unit(unit);
        }
        let pinned = resolver.pinned_types();

        let package_name = units
            .iter()
            .find_map(|u| u.package_name())
            .unwrap_or_default()
            .to_string();

        debug!(
            "resolved {} declarations in {} ({} units)",
            resolver.decls.len(),
            package_path,
            units.len()
        );

        Ok(SemanticInfo {
            package_path: package_path.to_string(),
            package_name,
            decls: resolver.decls,
            occurrences: resolver.occurrences,
            pinned,
        })
    }
}

/// Kinds whose children live in a fresh lexical scope.
const SCOPE_KINDS: &[&str] = &[
    "block",
    "if_statement",
    "for_statement",
    "expression_switch_statement",
    "select_statement",
    "expression_case",
    "type_case",
    "default_case",
    "communication_case",
    "function_type",
    "func_literal",
    "method_elem",
];

/// Builtin types; selecting on them never reaches a declaration of this package.
const PREDECLARED_TYPES: &[&str] = &[
    "any",
    "bool",
    "byte",
    "comparable",
    "complex64",
    "complex128",
    "error",
    "float32",
    "float64",
    "int",
    "int8",
    "int16",
    "int32",
    "int64",
    "rune",
    "string",
    "uint",
    "uint8",
    "uint16",
    "uint32",
    "uint64",
    "uintptr",
];

/// Bound on chains of named types and embeddings followed during member lookup.
const MAX_TYPE_DEPTH: usize = 8;

/// What is known about the type of an expression.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Shape {
    /// A type declared in this package, or a pointer to one.
    Local(DeclId),
    /// Struct or interface type literal.
    Anonymous,
    /// Slice or array.
    Elements(Box<Shape>),
    /// Map with key and value shapes.
    Map(Box<Shape>, Box<Shape>),
    /// Declared by another package, or a builtin.
    Foreign,
    Unknown,
}

/// Element type of a container shape.
fn element_of(shape: Shape) -> Shape {
    match shape {
        Shape::Elements(element) => *element,
        Shape::Map(_, value) => *value,
        _ => Shape::Unknown,
    }
}

/// Outcome of looking a member up on a local type.
enum Member {
    Found(DeclId),
    /// Promoted from a type this package does not declare.
    Foreign,
    Missing,
}

struct Resolver<'a> {
    package_path: &'a str,
    units: &'a [SourceUnit],
    decls: Vec<Declaration>,
    occurrences: Vec<HashMap<usize, DeclId>>,
    package_scope: HashMap<String, DeclId>,
    members: HashMap<String, Vec<DeclId>>,
    universe: HashMap<String, DeclId>,
    imported: HashMap<(String, String), DeclId>,
    unknown_members: HashMap<String, DeclId>,
    /// Embedded field declarations keyed by (unit, field_declaration start byte).
    embedded: HashMap<(usize, usize), DeclId>,
    /// Type declaration -> (unit, type expression it names).
    type_bodies: HashMap<DeclId, (usize, Node<'a>)>,
    /// Receiver type -> method name -> method.
    methods: HashMap<DeclId, HashMap<String, DeclId>>,
    /// Function or method -> (unit, its single result type).
    results: HashMap<DeclId, (usize, Node<'a>)>,
    field_types: HashMap<DeclId, (usize, Node<'a>)>,
    shapes: HashMap<DeclId, Shape>,
    /// Exported member names selected on operands of unknown type.
    ambiguous: HashSet<String>,
    // per-unit state
    unit: usize,
    file_scope: HashMap<String, (DeclId, String)>,
    scopes: Vec<HashMap<String, DeclId>>,
}

impl<'a> Resolver<'a> {
    fn new(package_path: &'a str, units: &'a [SourceUnit]) -> Self {
        Self {
            package_path,
            units,
            decls: Vec::new(),
            occurrences: vec![HashMap::new(); units.len()],
            package_scope: HashMap::new(),
            members: HashMap::new(),
            universe: HashMap::new(),
            imported: HashMap::new(),
            unknown_members: HashMap::new(),
            embedded: HashMap::new(),
            type_bodies: HashMap::new(),
            methods: HashMap::new(),
            results: HashMap::new(),
            field_types: HashMap::new(),
            shapes: HashMap::new(),
            ambiguous: HashSet::new(),
            unit: 0,
            file_scope: HashMap::new(),
            scopes: Vec::new(),
        }
    }

    fn source(&self) -> &'a SourceUnit {
        &self.units[self.unit]
    }

    fn text(&self, node: Node<'a>) -> &'a str {
        let unit: &'a SourceUnit = self.source();
        unit.text(node)
    }

    fn declare(&mut self, name: &str, kind: DeclKind, top_level: bool) -> DeclId {
        self.decls.push(Declaration {
            name: name.to_string(),
            package: Some(self.package_path.to_string()),
            kind,
            top_level,
        });
        self.decls.len() - 1
    }

    fn record(&mut self, node: Node<'a>, id: DeclId) {
        self.occurrences[self.unit]
            .entry(node.start_byte())
            .or_insert(id);
    }

    fn id_of(&self, unit: usize, node: Node<'a>) -> Option<DeclId> {
        self.occurrences[unit].get(&node.start_byte()).copied()
    }

    // ----- phase 1: package scope and members -----

    fn collect_package_scope(&mut self) {
        for unit in 0..self.units.len() {
            self.unit = unit;
            self.file_scope = self.import_bindings(false);
            let root = self.source().root();
            let mut cursor = root.walk();
            let top: Vec<_> = root.named_children(&mut cursor).collect();
            for node in top {
                self.collect_top_level(node);
            }
            for node in crate::syntax::descendants_of_kind(root, "field_declaration") {
                self.collect_field(node);
            }
            for node in crate::syntax::descendants_of_kind(root, "method_elem") {
                self.collect_member_function(node, true);
            }
        }
        self.file_scope.clear();
    }

    fn collect_top_level(&mut self, node: Node<'a>) {
        match node.kind() {
            "function_declaration" => {
                let Some(name) = node.child_by_field_name("name") else {
                    return;
                };
                let kind = DeclKind::Function {
                    receiver: false,
                    body: node.child_by_field_name("body").is_some(),
                    test_entry: self.is_test_entry(node),
                };
                let id = self.declare(self.text(name), kind, true);
                self.package_scope.insert(self.text(name).to_string(), id);
                self.record(name, id);
            }
            "method_declaration" => self.collect_member_function(node, false),
            "type_declaration" => {
                for spec in named_children(node) {
                    if spec.kind() != "type_spec" && spec.kind() != "type_alias" {
                        continue;
                    }
                    if let Some(name) = spec.child_by_field_name("name") {
                        let id = self.declare(self.text(name), DeclKind::TypeName, true);
                        self.package_scope.insert(self.text(name).to_string(), id);
                        self.record(name, id);
                        if let Some(ty) = spec.child_by_field_name("type") {
                            self.type_bodies.insert(id, (self.unit, ty));
                        }
                    }
                }
            }
            "const_declaration" | "var_declaration" => {
                let kind = if node.kind() == "const_declaration" {
                    DeclKind::Constant
                } else {
                    DeclKind::Variable
                };
                for spec in value_specs(node) {
                    for name in field_identifiers(spec, "name") {
                        if self.text(name) == "_" {
                            continue;
                        }
                        let id = self.declare(self.text(name), kind.clone(), true);
                        self.package_scope.insert(self.text(name).to_string(), id);
                        self.record(name, id);
                    }
                }
            }
            _ => {}
        }
    }

    fn collect_member_function(&mut self, node: Node<'a>, interface: bool) {
        let Some(name) = node.child_by_field_name("name") else {
            return;
        };
        let kind = DeclKind::Function {
            receiver: true,
            body: interface || node.child_by_field_name("body").is_some(),
            test_entry: false,
        };
        let id = self.declare(self.text(name), kind, false);
        self.members
            .entry(self.text(name).to_string())
            .or_default()
            .push(id);
        self.record(name, id);
    }

    fn collect_field(&mut self, node: Node<'a>) {
        let names = field_identifiers(node, "name");
        if names.is_empty() {
            // Embedded field: its name is the type name. The target is resolved with the
            // scopes in effect at the declaration, during the unit walk.
            let Some(type_name) = node.child_by_field_name("type").and_then(embedded_name) else {
                return;
            };
            let id = self.declare(
                self.text(type_name),
                DeclKind::Field { embedded: None },
                false,
            );
            self.members
                .entry(self.text(type_name).to_string())
                .or_default()
                .push(id);
            self.embedded.insert((self.unit, node.start_byte()), id);
            return;
        }
        let ty = node.child_by_field_name("type");
        for name in names {
            let id = self.declare(
                self.text(name),
                DeclKind::Field { embedded: None },
                false,
            );
            self.members
                .entry(self.text(name).to_string())
                .or_default()
                .push(id);
            self.record(name, id);
            if let Some(ty) = ty {
                self.field_types.insert(id, (self.unit, ty));
            }
        }
    }

    /// Result types, methods per receiver type and declared types of package variables.
    fn collect_signatures(&mut self) {
        for unit in 0..self.units.len() {
            self.unit = unit;
            for node in named_children(self.source().root()) {
                match node.kind() {
                    "function_declaration" => self.collect_result(node),
                    "method_declaration" => {
                        self.collect_result(node);
                        self.bind_method(node);
                    }
                    "var_declaration" => {
                        for spec in value_specs(node) {
                            let Some(ty) = spec.child_by_field_name("type") else {
                                continue;
                            };
                            let shape = self.shape_of_type(unit, ty);
                            for name in field_identifiers(spec, "name") {
                                if let Some(id) = self.id_of(unit, name) {
                                    self.shapes.insert(id, shape.clone());
                                }
                            }
                        }
                    }
                    _ => {}
                }
            }
        }
    }

    fn collect_result(&mut self, node: Node<'a>) {
        let (Some(name), Some(result)) = (node.child_by_field_name("name"), single_result(node))
        else {
            return;
        };
        if let Some(id) = self.id_of(self.unit, name) {
            self.results.insert(id, (self.unit, result));
        }
    }

    fn bind_method(&mut self, node: Node<'a>) {
        let Some(name) = node.child_by_field_name("name") else {
            return;
        };
        let Some(method) = self.id_of(self.unit, name) else {
            return;
        };
        let receiver_type = node
            .child_by_field_name("receiver")
            .and_then(|r| {
                named_children(r)
                    .into_iter()
                    .find(|p| p.kind() == "parameter_declaration")
            })
            .and_then(|p| p.child_by_field_name("type"))
            .and_then(embedded_target)
            .filter(|t| t.kind() == "type_identifier");
        let Some(owner) =
            receiver_type.and_then(|t| self.package_scope.get(self.text(t)).copied())
        else {
            return;
        };
        let name = self.text(name).to_string();
        self.methods.entry(owner).or_default().insert(name, method);
    }

    /// `TestXxx(*testing.T)`, `BenchmarkXxx(*testing.B)`, `FuzzXxx(*testing.F)` or
    /// `ExampleXxx()`.
    fn is_test_entry(&self, node: Node<'a>) -> bool {
        let Some(name) = node.child_by_field_name("name").map(|n| self.text(n)) else {
            return false;
        };
        if node.child_by_field_name("type_parameters").is_some() {
            return false;
        }
        let params: Vec<_> = node
            .child_by_field_name("parameters")
            .map(named_children)
            .unwrap_or_default();

        if name.starts_with("Example") {
            return params.is_empty();
        }
        let expected = if name.starts_with("Test") {
            "T"
        } else if name.starts_with("Benchmark") {
            "B"
        } else if name.starts_with("Fuzz") {
            "F"
        } else {
            return false;
        };

        let [param] = params.as_slice() else {
            return false;
        };
        if param.kind() != "parameter_declaration" || field_identifiers(*param, "name").len() > 1
        {
            return false;
        }
        let Some(mut ty) = param.child_by_field_name("type") else {
            return false;
        };
        if ty.kind() == "pointer_type" {
            match ty.named_child(0) {
                Some(inner) => ty = inner,
                None => return false,
            }
        }
        if ty.kind() != "qualified_type" {
            return false;
        }
        let (Some(pkg), Some(type_name)) = (
            ty.child_by_field_name("package"),
            ty.child_by_field_name("name"),
        ) else {
            return false;
        };
        let bound_to_testing = self
            .file_scope
            .get(self.text(pkg))
            .is_some_and(|(_, path)| path == "testing");
        bound_to_testing && self.text(type_name) == expected
    }

    fn import_bindings(&mut self, record: bool) -> HashMap<String, (DeclId, String)> {
        let mut bindings = HashMap::new();
        let unit = self.source();
        for import in unit.imports() {
            match import.binding {
                Some(binding) => {
                    self.decls.push(Declaration {
                        name: binding.clone(),
                        package: Some(self.package_path.to_string()),
                        kind: DeclKind::Package,
                        top_level: false,
                    });
                    bindings.insert(binding, (self.decls.len() - 1, import.path));
                }
                None if record => {
                    debug!(
                        "{}: import of {:?} has no binding; its names resolve to universe",
                        unit.name, import.path
                    );
                }
                None => {}
            }
        }
        if record {
            for spec in crate::syntax::descendants_of_kind(unit.root(), "import_spec") {
                if let Some(name) = spec.child_by_field_name("name") {
                    if let Some((id, _)) = bindings.get(self.text(name)) {
                        let id = *id;
                        self.record(name, id);
                    }
                }
            }
        }
        bindings
    }

    // ----- phase 2: occurrences -----

    fn resolve_unit(&mut self, unit: usize) {
        self.unit = unit;
        self.scopes.clear();
        self.file_scope = self.import_bindings(true);
        let root = self.source().root();
        for child in children(root) {
            match child.kind() {
                "package_clause" | "import_declaration" | "comment" => {}
                _ => self.walk(child),
            }
        }
    }

    fn lookup(&mut self, name: &str) -> DeclId {
        for scope in self.scopes.iter().rev() {
            if let Some(id) = scope.get(name) {
                return *id;
            }
        }
        if let Some((id, _)) = self.file_scope.get(name) {
            return *id;
        }
        if let Some(id) = self.package_scope.get(name) {
            return *id;
        }
        self.universe_decl(name)
    }

    fn universe_decl(&mut self, name: &str) -> DeclId {
        if let Some(id) = self.universe.get(name) {
            return *id;
        }
        self.decls.push(Declaration {
            name: name.to_string(),
            package: None,
            kind: DeclKind::Unresolved,
            top_level: false,
        });
        let id = self.decls.len() - 1;
        self.universe.insert(name.to_string(), id);
        id
    }

    fn imported_decl(&mut self, path: &str, name: &str) -> DeclId {
        let key = (path.to_string(), name.to_string());
        if let Some(id) = self.imported.get(&key) {
            return *id;
        }
        self.decls.push(Declaration {
            name: name.to_string(),
            package: Some(path.to_string()),
            kind: DeclKind::Imported,
            top_level: true,
        });
        let id = self.decls.len() - 1;
        self.imported.insert(key, id);
        id
    }

    /// A field or method by name; all candidates of one name hash alike.
    fn member_decl(&mut self, name: &str) -> DeclId {
        if let Some(id) = self.members.get(name).and_then(|ids| ids.first()) {
            return *id;
        }
        self.unknown_member(name)
    }

    /// Member selected on an operand of unknown type. Exported names may belong to a
    /// type of another package, so embedded fields that share them are pinned.
    fn guess_member(&mut self, name: &str) -> DeclId {
        if is_exported(name) && self.members.contains_key(name) {
            self.ambiguous.insert(name.to_string());
        }
        self.member_decl(name)
    }

    /// A member no declaration of this package provides.
    fn unknown_member(&mut self, name: &str) -> DeclId {
        if let Some(id) = self.unknown_members.get(name) {
            return *id;
        }
        self.decls.push(Declaration {
            name: name.to_string(),
            package: Some(self.package_path.to_string()),
            kind: DeclKind::Unresolved,
            top_level: false,
        });
        let id = self.decls.len() - 1;
        self.unknown_members.insert(name.to_string(), id);
        id
    }

    fn declare_local(&mut self, node: Node<'a>, kind: DeclKind) -> Option<DeclId> {
        let name = self.text(node);
        if name == "_" {
            return None;
        }
        let id = self.declare(name, kind, false);
        if let Some(scope) = self.scopes.last_mut() {
            scope.insert(name.to_string(), id);
        }
        self.record(node, id);
        Some(id)
    }

    fn declare_typed(&mut self, node: Node<'a>, kind: DeclKind, shape: Shape) {
        if let Some(id) = self.declare_local(node, kind) {
            if shape != Shape::Unknown {
                self.shapes.insert(id, shape);
            }
        }
    }

    /// Local types whose embedded fields were selected by name on operands of unknown
    /// type. Their names stay, and with them the field names.
    fn pinned_types(&self) -> HashSet<DeclId> {
        let mut pinned = HashSet::new();
        for name in &self.ambiguous {
            for id in self.members.get(name).into_iter().flatten() {
                let DeclKind::Field {
                    embedded: Some(target),
                } = self.decls[*id].kind
                else {
                    continue;
                };
                let decl = &self.decls[target];
                if decl.kind == DeclKind::TypeName
                    && decl.package.as_deref() == Some(self.package_path)
                {
                    debug!("{}: embedded under an ambiguous selector, keeping", decl.name);
                    pinned.insert(target);
                }
            }
        }
        pinned
    }

    // ----- shapes -----

    fn shape_of_type(&self, unit: usize, node: Node<'a>) -> Shape {
        match node.kind() {
            "type_identifier" | "identifier" => self.named_shape(unit, node),
            "pointer_type" | "parenthesized_type" => node
                .named_child(0)
                .map_or(Shape::Unknown, |inner| self.shape_of_type(unit, inner)),
            "generic_type" => node
                .child_by_field_name("type")
                .map_or(Shape::Unknown, |inner| self.shape_of_type(unit, inner)),
            "qualified_type" | "selector_expression" => Shape::Foreign,
            "struct_type" | "interface_type" => Shape::Anonymous,
            "slice_type" | "array_type" | "implicit_length_array_type" => {
                let element = node
                    .child_by_field_name("element")
                    .map_or(Shape::Unknown, |e| self.shape_of_type(unit, e));
                Shape::Elements(Box::new(element))
            }
            "map_type" => {
                let key = node
                    .child_by_field_name("key")
                    .map_or(Shape::Unknown, |k| self.shape_of_type(unit, k));
                let value = node
                    .child_by_field_name("value")
                    .map_or(Shape::Unknown, |v| self.shape_of_type(unit, v));
                Shape::Map(Box::new(key), Box::new(value))
            }
            "channel_type" | "function_type" => Shape::Foreign,
            _ => Shape::Unknown,
        }
    }

    /// A type name, resolved through its recorded occurrence or the package scope.
    fn named_shape(&self, unit: usize, node: Node<'a>) -> Shape {
        let name = self.units[unit].text(node);
        let id = self
            .id_of(unit, node)
            .or_else(|| self.package_scope.get(name).copied());
        match id {
            Some(id) => self.shape_of_decl(id),
            None if PREDECLARED_TYPES.contains(&name) => Shape::Foreign,
            None => Shape::Unknown,
        }
    }

    fn shape_of_decl(&self, id: DeclId) -> Shape {
        if self.type_bodies.contains_key(&id) {
            return Shape::Local(id);
        }
        let decl = &self.decls[id];
        match decl.kind {
            DeclKind::Imported => Shape::Foreign,
            DeclKind::Unresolved
                if decl.package.is_none() && PREDECLARED_TYPES.contains(&decl.name.as_str()) =>
            {
                Shape::Foreign
            }
            // type parameters and anything else without a body
            _ => Shape::Unknown,
        }
    }

    /// Container or struct shape behind a named type.
    fn underlying(&self, shape: Shape) -> Shape {
        let mut shape = shape;
        for _ in 0..MAX_TYPE_DEPTH {
            let id = match shape {
                Shape::Local(id) => id,
                other => return other,
            };
            let Some(&(unit, body)) = self.type_bodies.get(&id) else {
                return Shape::Unknown;
            };
            if matches!(body.kind(), "struct_type" | "interface_type") {
                return Shape::Local(id);
            }
            shape = self.shape_of_type(unit, body);
        }
        Shape::Unknown
    }

    /// Shape of an expression of the current unit that has already been walked.
    fn shape_of_expr(&self, node: Node<'a>) -> Shape {
        let unit = self.unit;
        match node.kind() {
            "identifier" => match self.id_of(unit, node) {
                Some(id) => match self.shapes.get(&id) {
                    Some(shape) => shape.clone(),
                    None if self.decls[id].kind == DeclKind::TypeName => self.shape_of_decl(id),
                    None => Shape::Unknown,
                },
                None => Shape::Unknown,
            },
            "parenthesized_expression" => node
                .named_child(0)
                .map_or(Shape::Unknown, |inner| self.shape_of_expr(inner)),
            "unary_expression" => {
                let operator = node.child_by_field_name("operator").map(|o| self.text(o));
                match (operator, node.child_by_field_name("operand")) {
                    (Some("&" | "*"), Some(operand)) => self.shape_of_expr(operand),
                    _ => Shape::Unknown,
                }
            }
            "composite_literal" | "type_assertion_expression" | "type_conversion_expression" => {
                node.child_by_field_name("type")
                    .map_or(Shape::Unknown, |ty| self.shape_of_type(unit, ty))
            }
            "index_expression" => node
                .child_by_field_name("operand")
                .map_or(Shape::Unknown, |operand| {
                    element_of(self.underlying(self.shape_of_expr(operand)))
                }),
            "selector_expression" => node
                .child_by_field_name("field")
                .and_then(|field| self.id_of(unit, field))
                .and_then(|id| self.field_types.get(&id).copied())
                .map_or(Shape::Unknown, |(u, ty)| self.shape_of_type(u, ty)),
            "call_expression" => self.shape_of_call(node),
            _ => Shape::Unknown,
        }
    }

    fn shape_of_call(&self, node: Node<'a>) -> Shape {
        let Some(function) = node.child_by_field_name("function") else {
            return Shape::Unknown;
        };
        let callee = match function.kind() {
            "identifier" => function,
            "selector_expression" => match function.child_by_field_name("field") {
                Some(field) => field,
                None => return Shape::Unknown,
            },
            // conversions such as (*T)(x)
            "parenthesized_expression" => return self.shape_of_expr(function),
            _ => return Shape::Unknown,
        };
        let Some(id) = self.id_of(self.unit, callee) else {
            return Shape::Unknown;
        };
        let decl = &self.decls[id];
        match decl.kind {
            DeclKind::TypeName => self.shape_of_decl(id),
            DeclKind::Function { .. } => self
                .results
                .get(&id)
                .map_or(Shape::Unknown, |&(u, ty)| self.shape_of_type(u, ty)),
            DeclKind::Unresolved
                if decl.package.is_none() && matches!(decl.name.as_str(), "new" | "make") =>
            {
                node.child_by_field_name("arguments")
                    .and_then(|args| args.named_child(0))
                    .map_or(Shape::Unknown, |ty| self.shape_of_type(self.unit, ty))
            }
            _ => Shape::Unknown,
        }
    }

    fn expression_shapes(&self, node: Node<'a>) -> Vec<Shape> {
        if node.kind() != "expression_list" {
            return vec![self.shape_of_expr(node)];
        }
        named_children(node)
            .into_iter()
            .filter(|n| n.kind() != "comment")
            .map(|n| self.shape_of_expr(n))
            .collect()
    }

    /// Shapes of the names a `var_spec`/`const_spec` declares, by position.
    fn spec_shapes(&self, spec: Node<'a>) -> Vec<Shape> {
        let count = field_identifiers(spec, "name").len();
        if let Some(ty) = spec.child_by_field_name("type") {
            return vec![self.shape_of_type(self.unit, ty); count];
        }
        match spec.child_by_field_name("value") {
            Some(values) => self.expression_shapes(values),
            None => Vec::new(),
        }
    }

    // ----- members -----

    fn find_member(&self, ty: DeclId, name: &str, depth: usize) -> Member {
        if depth > MAX_TYPE_DEPTH {
            return Member::Missing;
        }
        if let Some(id) = self.methods.get(&ty).and_then(|m| m.get(name)) {
            return Member::Found(*id);
        }
        let Some(&(unit, body)) = self.type_bodies.get(&ty) else {
            return Member::Missing;
        };
        match body.kind() {
            "struct_type" => self.find_in_struct(unit, body, name, depth),
            "interface_type" => self.find_in_interface(unit, body, name, depth),
            _ => match self.shape_of_type(unit, body) {
                Shape::Local(next) => self.find_member(next, name, depth + 1),
                Shape::Foreign => Member::Foreign,
                _ => Member::Missing,
            },
        }
    }

    fn find_in_struct(&self, unit: usize, body: Node<'a>, name: &str, depth: usize) -> Member {
        let source = &self.units[unit];
        let mut promoted = Vec::new();
        for list in named_children(body) {
            for field in named_children(list) {
                if field.kind() != "field_declaration" {
                    continue;
                }
                if let Some(&id) = self.embedded.get(&(unit, field.start_byte())) {
                    let ty = field.child_by_field_name("type");
                    if ty
                        .and_then(embedded_name)
                        .is_some_and(|n| source.text(n) == name)
                    {
                        return Member::Found(id);
                    }
                    promoted.push((id, ty));
                    continue;
                }
                for ident in field_identifiers(field, "name") {
                    if source.text(ident) == name {
                        if let Some(id) = self.id_of(unit, ident) {
                            return Member::Found(id);
                        }
                    }
                }
            }
        }

        let mut foreign = false;
        for (field, ty) in promoted {
            match self.embedded_shape(unit, field, ty) {
                Shape::Local(next) => match self.find_member(next, name, depth + 1) {
                    Member::Found(id) => return Member::Found(id),
                    Member::Foreign => foreign = true,
                    Member::Missing => {}
                },
                _ => foreign = true,
            }
        }
        if foreign {
            Member::Foreign
        } else {
            Member::Missing
        }
    }

    /// Type an embedded field stands for. The type name itself is recorded as the field.
    fn embedded_shape(&self, unit: usize, field: DeclId, ty: Option<Node<'a>>) -> Shape {
        if let DeclKind::Field {
            embedded: Some(target),
        } = self.decls[field].kind
        {
            return self.shape_of_decl(target);
        }
        match ty.and_then(embedded_target) {
            Some(t) if t.kind() == "qualified_type" => Shape::Foreign,
            Some(t) => {
                let name = self.units[unit].text(t);
                match self.package_scope.get(name) {
                    Some(id) => self.shape_of_decl(*id),
                    None if PREDECLARED_TYPES.contains(&name) => Shape::Foreign,
                    None => Shape::Unknown,
                }
            }
            None => Shape::Unknown,
        }
    }

    fn find_in_interface(&self, unit: usize, body: Node<'a>, name: &str, depth: usize) -> Member {
        let source = &self.units[unit];
        let mut embedded = Vec::new();
        for child in named_children(body) {
            match child.kind() {
                "method_elem" => {
                    let Some(method) = child.child_by_field_name("name") else {
                        continue;
                    };
                    if source.text(method) == name {
                        if let Some(id) = self.id_of(unit, method) {
                            return Member::Found(id);
                        }
                    }
                }
                "type_elem" => embedded.extend(named_children(child)),
                _ => {}
            }
        }

        let mut foreign = false;
        for ty in embedded {
            match self.shape_of_type(unit, ty) {
                Shape::Local(next) => match self.find_member(next, name, depth + 1) {
                    Member::Found(id) => return Member::Found(id),
                    Member::Foreign => foreign = true,
                    Member::Missing => {}
                },
                Shape::Foreign => foreign = true,
                _ => {}
            }
        }
        if foreign {
            Member::Foreign
        } else {
            Member::Missing
        }
    }

    /// Member `name` of an operand with the given shape.
    fn select(&mut self, shape: Shape, name: &str) -> DeclId {
        match shape {
            Shape::Local(ty) => match self.find_member(ty, name, 0) {
                Member::Found(id) => id,
                Member::Foreign => self.unknown_member(name),
                Member::Missing => self.guess_member(name),
            },
            Shape::Foreign | Shape::Elements(_) | Shape::Map(..) => self.unknown_member(name),
            Shape::Anonymous | Shape::Unknown => self.guess_member(name),
        }
    }

    fn with_scope(&mut self, f: impl FnOnce(&mut Self)) {
        self.scopes.push(HashMap::new());
        f(self);
        self.scopes.pop();
    }

    fn walk_children(&mut self, node: Node<'a>) {
        for child in children(node) {
            self.walk(child);
        }
    }

    fn walk_field(&mut self, node: Node<'a>, field: &str) {
        if let Some(child) = node.child_by_field_name(field) {
            self.walk(child);
        }
    }

    fn walk(&mut self, node: Node<'a>) {
        match node.kind() {
            "comment" | "label_name" | "blank_identifier" | "dot" => {}
            "interpreted_string_literal" | "raw_string_literal" | "rune_literal" => {}
            "identifier" | "type_identifier" => {
                let id = self.lookup(self.text(node));
                self.record(node, id);
            }
            "package_identifier" => {
                if let Some((id, _)) = self.file_scope.get(self.text(node)) {
                    let id = *id;
                    self.record(node, id);
                }
            }
            "field_identifier" => {
                let id = self.member_decl(self.text(node));
                self.record(node, id);
            }
            "function_declaration" => self.with_scope(|r| {
                r.walk_field(node, "type_parameters");
                r.walk_field(node, "parameters");
                r.walk_field(node, "result");
                r.walk_field(node, "body");
            }),
            "method_declaration" => self.with_scope(|r| {
                if let Some(receiver) = node.child_by_field_name("receiver") {
                    r.walk_receiver(receiver);
                }
                r.walk_field(node, "parameters");
                r.walk_field(node, "result");
                r.walk_field(node, "body");
            }),
            "method_elem" => self.with_scope(|r| {
                r.walk_field(node, "parameters");
                r.walk_field(node, "result");
            }),
            "parameter_declaration" | "variadic_parameter_declaration" => {
                let shape = match node.child_by_field_name("type") {
                    Some(ty) => {
                        self.walk(ty);
                        let shape = self.shape_of_type(self.unit, ty);
                        if node.kind() == "variadic_parameter_declaration" {
                            Shape::Elements(Box::new(shape))
                        } else {
                            shape
                        }
                    }
                    None => Shape::Unknown,
                };
                for name in field_identifiers(node, "name") {
                    self.declare_typed(name, DeclKind::Variable, shape.clone());
                }
            }
            "type_parameter_declaration" => {
                for name in field_identifiers(node, "name") {
                    self.declare_local(name, DeclKind::TypeName);
                }
                self.walk_field(node, "type");
            }
            "short_var_declaration" => {
                self.walk_field(node, "right");
                let (Some(left), Some(right)) = (
                    node.child_by_field_name("left"),
                    node.child_by_field_name("right"),
                ) else {
                    return;
                };
                let mut shapes = self.expression_shapes(right);
                if shapes.len() != named_children(left).len() {
                    shapes.clear();
                }
                self.redeclare(left, &shapes);
            }
            "range_clause" | "receive_statement" if has_token(node, ":=") => {
                self.walk_field(node, "right");
                let shapes = match (node.kind(), node.child_by_field_name("right")) {
                    ("range_clause", Some(right)) => {
                        match self.underlying(self.shape_of_expr(right)) {
                            Shape::Elements(element) => vec![Shape::Unknown, *element],
                            Shape::Map(key, value) => vec![*key, *value],
                            _ => Vec::new(),
                        }
                    }
                    _ => Vec::new(),
                };
                if let Some(left) = node.child_by_field_name("left") {
                    self.redeclare(left, &shapes);
                }
            }
            "type_switch_statement" => self.with_scope(|r| {
                r.walk_field(node, "initializer");
                r.walk_field(node, "value");
                if let Some(alias) = node.child_by_field_name("alias") {
                    for name in named_children(alias) {
                        if name.kind() == "identifier" {
                            r.declare_local(name, DeclKind::Variable);
                        }
                    }
                }
                for case in named_children(node) {
                    if matches!(case.kind(), "type_case" | "default_case") {
                        r.walk(case);
                    }
                }
            }),
            "const_declaration" | "var_declaration" => {
                let kind = if node.kind() == "const_declaration" {
                    DeclKind::Constant
                } else {
                    DeclKind::Variable
                };
                for spec in value_specs(node) {
                    self.walk_field(spec, "type");
                    self.walk_field(spec, "value");
                    let shapes = self.spec_shapes(spec);
                    for (i, name) in field_identifiers(spec, "name").into_iter().enumerate() {
                        let shape = shapes.get(i).cloned().unwrap_or(Shape::Unknown);
                        if !self.scopes.is_empty() {
                            self.declare_typed(name, kind.clone(), shape);
                        } else if shape != Shape::Unknown {
                            // package variables declared with a type are known already
                            if let Some(id) = self.id_of(self.unit, name) {
                                self.shapes.entry(id).or_insert(shape);
                            }
                        }
                    }
                }
            }
            "type_declaration" => {
                for spec in named_children(node) {
                    if spec.kind() != "type_spec" && spec.kind() != "type_alias" {
                        continue;
                    }
                    if !self.scopes.is_empty() {
                        let declared = spec
                            .child_by_field_name("name")
                            .and_then(|name| self.declare_local(name, DeclKind::TypeName));
                        if let (Some(id), Some(ty)) = (declared, spec.child_by_field_name("type"))
                        {
                            self.type_bodies.insert(id, (self.unit, ty));
                        }
                    }
                    self.with_scope(|r| {
                        r.walk_field(spec, "type_parameters");
                        r.walk_field(spec, "type");
                    });
                }
            }
            "field_declaration" => {
                if let Some(id) = self.embedded.get(&(self.unit, node.start_byte())).copied() {
                    self.walk_embedded(node, id);
                } else {
                    self.walk_field(node, "type");
                }
            }
            "selector_expression" => {
                let Some(operand) = node.child_by_field_name("operand") else {
                    return;
                };
                self.walk(operand);
                let Some(field) = node.child_by_field_name("field") else {
                    return;
                };
                let id = match self.import_path_of(operand) {
                    Some(path) => self.imported_decl(&path, self.text(field)),
                    None => {
                        let shape = self.shape_of_expr(operand);
                        self.select(shape, self.text(field))
                    }
                };
                self.record(field, id);
            }
            "qualified_type" => self.walk_qualified(node),
            "composite_literal" => self.walk_composite(node),
            "literal_value" => self.walk_literal_value(node, Shape::Unknown),
            "labeled_statement" => {
                for child in named_children(node) {
                    if child.kind() != "label_name" {
                        self.walk(child);
                    }
                }
            }
            kind if SCOPE_KINDS.contains(&kind) => self.with_scope(|r| r.walk_children(node)),
            _ => self.walk_children(node),
        }
    }

    /// Short variable declarations reuse names already declared in the innermost scope.
    /// `shapes` holds what is known about the new names by position.
    fn redeclare(&mut self, left: Node<'a>, shapes: &[Shape]) {
        for (i, name) in named_children(left).into_iter().enumerate() {
            if name.kind() != "identifier" {
                self.walk(name);
                continue;
            }
            let existing = self
                .scopes
                .last()
                .and_then(|scope| scope.get(self.text(name)))
                .copied();
            match existing {
                Some(id) => self.record(name, id),
                None => {
                    let shape = shapes.get(i).cloned().unwrap_or(Shape::Unknown);
                    self.declare_typed(name, DeclKind::Variable, shape);
                }
            }
        }
    }

    fn walk_receiver(&mut self, receiver: Node<'a>) {
        for param in named_children(receiver) {
            if param.kind() != "parameter_declaration" {
                continue;
            }
            let mut shape = Shape::Unknown;
            if let Some(ty) = param.child_by_field_name("type") {
                // Type parameters named in the receiver are declared there.
                for generic in crate::syntax::descendants_of_kind(ty, "generic_type") {
                    if let Some(args) = generic.child_by_field_name("type_arguments") {
                        for arg in crate::syntax::descendants_of_kind(args, "type_identifier") {
                            self.declare_local(arg, DeclKind::TypeName);
                        }
                    }
                }
                self.walk(ty);
                shape = self.shape_of_type(self.unit, ty);
            }
            for name in field_identifiers(param, "name") {
                self.declare_typed(name, DeclKind::Variable, shape.clone());
            }
        }
    }

    fn walk_embedded(&mut self, node: Node<'a>, field: DeclId) {
        let Some(ty) = node.child_by_field_name("type") else {
            return;
        };
        if ty.kind() == "generic_type" {
            self.walk_field(ty, "type_arguments");
        }
        let target = match embedded_target(ty) {
            Some(t) if t.kind() == "qualified_type" => {
                let pkg = t.child_by_field_name("package");
                let name = t.child_by_field_name("name");
                if let Some(pkg) = pkg {
                    self.walk(pkg);
                }
                match (pkg.and_then(|p| self.import_path_of(p)), name) {
                    (Some(path), Some(name)) => {
                        let target = self.imported_decl(&path, self.text(name));
                        self.record(name, field);
                        Some(target)
                    }
                    _ => None,
                }
            }
            Some(t) => {
                let target = self.lookup(self.text(t));
                self.record(t, field);
                Some(target)
            }
            None => None,
        };
        self.decls[field].kind = DeclKind::Field { embedded: target };
    }

    fn walk_qualified(&mut self, node: Node<'a>) {
        let Some(pkg) = node.child_by_field_name("package") else {
            return;
        };
        self.walk(pkg);
        let Some(name) = node.child_by_field_name("name") else {
            return;
        };
        let id = match self.import_path_of(pkg) {
            Some(path) => self.imported_decl(&path, self.text(name)),
            None => self.universe_decl(self.text(name)),
        };
        self.record(name, id);
    }

    fn walk_composite(&mut self, node: Node<'a>) {
        let shape = match node.child_by_field_name("type") {
            Some(ty) => {
                self.walk(ty);
                self.shape_of_type(self.unit, ty)
            }
            None => Shape::Unknown,
        };
        if let Some(body) = node.child_by_field_name("body") {
            self.walk_literal_value(body, shape);
        }
    }

    fn walk_literal_value(&mut self, body: Node<'a>, shape: Shape) {
        let shape = self.underlying(shape);
        for element in named_children(body) {
            match element.kind() {
                "keyed_element" => self.walk_keyed_element(element, &shape),
                "literal_element" => self.walk_element(element, element_of(shape.clone())),
                _ => self.walk(element),
            }
        }
    }

    /// An expression, or a nested literal whose type is elided.
    fn walk_element(&mut self, node: Node<'a>, shape: Shape) {
        let inner = if node.kind() == "literal_element" {
            node.named_child(0)
        } else {
            Some(node)
        };
        match inner {
            Some(value) if value.kind() == "literal_value" => self.walk_literal_value(value, shape),
            Some(value) => self.walk(value),
            None => {}
        }
    }

    /// Struct keys are members of the literal's type; map and slice keys are expressions.
    fn walk_keyed_element(&mut self, node: Node<'a>, shape: &Shape) {
        let elements = named_children(node);
        let Some((key, rest)) = elements.split_first() else {
            return;
        };
        let value_shape = match shape {
            Shape::Map(key_shape, value) => {
                self.walk_element(*key, (**key_shape).clone());
                (**value).clone()
            }
            Shape::Elements(element) => {
                self.walk_element(*key, Shape::Unknown);
                (**element).clone()
            }
            Shape::Local(_) | Shape::Anonymous | Shape::Foreign => {
                match key_name(*key) {
                    Some(name) => {
                        let id = self.select(shape.clone(), self.text(name));
                        self.record(name, id);
                    }
                    None => self.walk_element(*key, Shape::Unknown),
                }
                Shape::Unknown
            }
            Shape::Unknown => {
                match key_name(*key) {
                    Some(name) if self.members.contains_key(self.text(name)) => {
                        let id = self.guess_member(self.text(name));
                        self.record(name, id);
                    }
                    _ => self.walk_element(*key, Shape::Unknown),
                }
                Shape::Unknown
            }
        };
        for value in rest {
            self.walk_element(*value, value_shape.clone());
        }
    }

    /// Import path when `node` is a name bound to an import in the file scope.
    fn import_path_of(&self, node: Node<'a>) -> Option<String> {
        if node.kind() != "identifier" && node.kind() != "package_identifier" {
            return None;
        }
        let id = *self.occurrences[self.unit].get(&node.start_byte())?;
        if self.decls[id].kind != DeclKind::Package {
            return None;
        }
        self.file_scope
            .values()
            .find(|(binding, _)| *binding == id)
            .map(|(_, path)| path.clone())
    }
}

fn is_name(kind: &str) -> bool {
    kind == "identifier" || kind == "field_identifier"
}

/// The name a keyed element's key consists of, bare or wrapped in a literal_element.
fn key_name(key: Node<'_>) -> Option<Node<'_>> {
    match key.kind() {
        "literal_element" => key.named_child(0).filter(|k| is_name(k.kind())),
        kind if is_name(kind) => Some(key),
        _ => None,
    }
}

/// Result type of a function with exactly one result.
fn single_result(node: Node<'_>) -> Option<Node<'_>> {
    let result = node.child_by_field_name("result")?;
    if result.kind() != "parameter_list" {
        return Some(result);
    }
    match named_children(result).as_slice() {
        [param] if field_identifiers(*param, "name").len() <= 1 => {
            param.child_by_field_name("type")
        }
        _ => None,
    }
}

fn has_token(node: Node<'_>, token: &str) -> bool {
    children(node)
        .into_iter()
        .any(|c| !c.is_named() && c.kind() == token)
}

fn children(node: Node<'_>) -> Vec<Node<'_>> {
    let mut cursor = node.walk();
    let nodes = node.children(&mut cursor).collect();
    nodes
}

fn named_children(node: Node<'_>) -> Vec<Node<'_>> {
    let mut cursor = node.walk();
    let nodes = node.named_children(&mut cursor).collect();
    nodes
}

/// Name nodes stored under `field`, skipping separators.
fn field_identifiers<'t>(node: Node<'t>, field: &str) -> Vec<Node<'t>> {
    let mut cursor = node.walk();
    let nodes = node
        .children_by_field_name(field, &mut cursor)
        .filter(|n| is_name(n.kind()) || n.kind() == "type_identifier")
        .collect();
    nodes
}

/// `var_spec`/`const_spec` nodes of a declaration, also inside spec lists.
fn value_specs(node: Node<'_>) -> Vec<Node<'_>> {
    let mut specs = Vec::new();
    for child in named_children(node) {
        match child.kind() {
            "var_spec" | "const_spec" => specs.push(child),
            "var_spec_list" | "const_spec_list" => specs.extend(
                named_children(child)
                    .into_iter()
                    .filter(|c| matches!(c.kind(), "var_spec" | "const_spec")),
            ),
            _ => {}
        }
    }
    specs
}

/// The node naming the type an embedded field aliases.
fn embedded_target(ty: Node<'_>) -> Option<Node<'_>> {
    match ty.kind() {
        "type_identifier" | "qualified_type" => Some(ty),
        "pointer_type" => ty.named_child(0).and_then(embedded_target),
        "generic_type" => ty.child_by_field_name("type").and_then(embedded_target),
        _ => None,
    }
}

/// The identifier an embedded field is named by.
fn embedded_name(ty: Node<'_>) -> Option<Node<'_>> {
    let target = embedded_target(ty)?;
    if target.kind() == "qualified_type" {
        target.child_by_field_name("name")
    } else {
        Some(target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn unit(name: &str, source: &str) -> SourceUnit {
        SourceUnit::parse(name, PathBuf::from(name), source.to_string()).unwrap()
    }

    /// Declaration of the `nth` occurrence of `needle` in unit `u`.
    fn decl_at<'i>(
        info: &'i SemanticInfo,
        units: &[SourceUnit],
        u: usize,
        needle: &str,
        nth: usize,
    ) -> &'i Declaration {
        let source = units[u].source();
        let start = source
            .match_indices(needle)
            .nth(nth)
            .map(|(i, _)| i)
            .unwrap_or_else(|| panic!("{} #{} not in source", needle, nth));
        info.object_of(u, start)
            .unwrap_or_else(|| panic!("{} #{} unresolved", needle, nth))
    }

    const APP: &str = r#"package app

import (
	"fmt"
	"testing"
	"example.com/lib"
)

type server struct {
	Name  string
	count int
	lib.Base
	*helper
}

type helper struct{}

func (s *server) Start() error { return nil }

func (s *server) bump(delta int) { s.count += delta }

func Greet(name string) string {
	s := &server{Name: name, count: 1}
	s.bump(2)
	total := lib.Sum(1, 2)
	fmt.Println(total, len(name))
	return name
}

func TestGreet(t *testing.T) {}

func linked(x int) int
"#;

    #[test]
    fn test_package_scope_kinds() {
        let units = vec![unit("app.go", APP)];
        let info = SyntacticChecker.check("example.com/app", &units).unwrap();
        assert_eq!(info.package_name, "app");

        let greet = decl_at(&info, &units, 0, "Greet", 0);
        assert!(greet.top_level);
        assert_eq!(
            greet.kind,
            DeclKind::Function {
                receiver: false,
                body: true,
                test_entry: false
            }
        );

        let test = decl_at(&info, &units, 0, "TestGreet", 0);
        assert!(matches!(
            test.kind,
            DeclKind::Function {
                test_entry: true,
                ..
            }
        ));

        let linked = decl_at(&info, &units, 0, "linked", 0);
        assert!(matches!(linked.kind, DeclKind::Function { body: false, .. }));

        let start = decl_at(&info, &units, 0, "Start", 0);
        assert!(matches!(start.kind, DeclKind::Function { receiver: true, .. }));
    }

    #[test]
    fn test_fields_and_selectors() {
        let units = vec![unit("app.go", APP)];
        let info = SyntacticChecker.check("example.com/app", &units).unwrap();

        let field = decl_at(&info, &units, 0, "count", 0);
        assert_eq!(field.kind, DeclKind::Field { embedded: None });
        // `s.count` and the composite literal key resolve to the same field
        assert_eq!(decl_at(&info, &units, 0, "count", 1), field);
        assert_eq!(decl_at(&info, &units, 0, "count", 2), field);

        let bump_use = decl_at(&info, &units, 0, "bump", 1);
        assert!(matches!(bump_use.kind, DeclKind::Function { receiver: true, .. }));
    }

    #[test]
    fn test_imports_and_universe() {
        let units = vec![unit("app.go", APP)];
        let info = SyntacticChecker.check("example.com/app", &units).unwrap();

        let sum = decl_at(&info, &units, 0, "Sum", 0);
        assert_eq!(sum.kind, DeclKind::Imported);
        assert_eq!(sum.package.as_deref(), Some("example.com/lib"));

        let println = decl_at(&info, &units, 0, "Println", 0);
        assert_eq!(println.package.as_deref(), Some("fmt"));

        let fmt = decl_at(&info, &units, 0, "fmt.", 0);
        assert_eq!(fmt.kind, DeclKind::Package);

        let len = decl_at(&info, &units, 0, "len(", 0);
        assert_eq!(len.package, None);
    }

    #[test]
    fn test_embedded_fields_point_at_types() {
        let units = vec![unit("app.go", APP)];
        let info = SyntacticChecker.check("example.com/app", &units).unwrap();

        let base = decl_at(&info, &units, 0, "Base", 0);
        let DeclKind::Field {
            embedded: Some(target),
        } = base.kind
        else {
            panic!("Base should be an embedded field: {:?}", base);
        };
        assert_eq!(info.declaration(target).package.as_deref(), Some("example.com/lib"));

        let helper = decl_at(&info, &units, 0, "helper", 0);
        let DeclKind::Field {
            embedded: Some(target),
        } = helper.kind
        else {
            panic!("helper should be an embedded field: {:?}", helper);
        };
        assert_eq!(info.declaration(target).kind, DeclKind::TypeName);
    }

    #[test]
    fn test_locals_and_shadowing() {
        let source = r#"package p

import "strings"

func f(strings int) int {
	x := strings
	x, y := x+1, 2
	for i := range 10 {
		x += i
	}
	return x + y
}

func g() string { return strings.ToUpper("a") }
"#;
        let units = vec![unit("p.go", source)];
        let info = SyntacticChecker.check("example.com/p", &units).unwrap();

        // parameter shadows the import inside f
        let shadow = decl_at(&info, &units, 0, "strings", 2);
        assert_eq!(shadow.kind, DeclKind::Variable);
        assert!(!shadow.top_level);

        let upper = decl_at(&info, &units, 0, "ToUpper", 0);
        assert_eq!(upper.kind, DeclKind::Imported);
        assert_eq!(upper.package.as_deref(), Some("strings"));

        let x_first = decl_at(&info, &units, 0, "x", 0);
        let x_redeclared = decl_at(&info, &units, 0, "x", 1);
        assert_eq!(x_first, x_redeclared);
        assert_eq!(decl_at(&info, &units, 0, "i :=", 0).kind, DeclKind::Variable);
    }

    #[test]
    fn test_package_scope_spans_units() {
        let a = unit("a.go", "package p\n\nfunc helper() int { return limit }\n");
        let b = unit("b.go", "package p\n\nconst limit = 3\n");
        let units = vec![a, b];
        let info = SyntacticChecker.check("example.com/p", &units).unwrap();

        let limit = decl_at(&info, &units, 0, "limit", 0);
        assert_eq!(limit.kind, DeclKind::Constant);
        assert!(limit.top_level);
    }

    #[test]
    fn test_literal_keys_follow_literal_type() {
        let source = r#"package app

import (
	"net/http"
	"time"
)

const Timeout = 5 * time.Second

const Name = "n"

type Row struct {
	Name string
	id   int
}

func client() *http.Client { return &http.Client{Timeout: Timeout} }

var counts = map[string]int{Name: 1}

var rows = []Row{{Name: "a", id: 1}}
"#;
        let units = vec![unit("app.go", source)];
        let info = SyntacticChecker.check("example.com/app", &units).unwrap();

        // key of a struct declared elsewhere
        let key = decl_at(&info, &units, 0, "Timeout: ", 0);
        assert_eq!(key.kind, DeclKind::Unresolved);
        assert_eq!(decl_at(&info, &units, 0, "Timeout}", 0).kind, DeclKind::Constant);

        // map keys are expressions
        let map_key = decl_at(&info, &units, 0, "Name: 1", 0);
        assert_eq!(map_key.kind, DeclKind::Constant);

        // elided element types still resolve to the fields
        let field = decl_at(&info, &units, 0, "Name string", 0);
        assert_eq!(decl_at(&info, &units, 0, "Name: \"a\"", 0), field);
        assert_eq!(
            decl_at(&info, &units, 0, "id: 1", 0),
            decl_at(&info, &units, 0, "id   int", 0)
        );
    }

    #[test]
    fn test_selectors_follow_operand_type() {
        let source = r#"package app

import "net/http"

type Handler struct{}

type wrapper struct {
	*Handler
	name string
}

func set(s *http.Server, h http.Handler) { s.Handler = h }

func unwrap(w wrapper) *Handler { return w.Handler }

func newWrapper() *wrapper { return &wrapper{} }

func label() string { return newWrapper().name }

func first(ws []wrapper) string {
	for _, w := range ws {
		return w.name
	}
	return ws[0].name
}
"#;
        let units = vec![unit("app.go", source)];
        let info = SyntacticChecker.check("example.com/app", &units).unwrap();

        let foreign = decl_at(&info, &units, 0, "Handler = h", 0);
        assert_eq!(foreign.kind, DeclKind::Unresolved);

        let embedded = decl_at(&info, &units, 0, "Handler }", 0);
        let DeclKind::Field {
            embedded: Some(target),
        } = embedded.kind
        else {
            panic!("w.Handler should be the embedded field: {:?}", embedded);
        };
        assert_eq!(info.declaration(target).kind, DeclKind::TypeName);
        assert!(!info.is_pinned(target));

        let name = decl_at(&info, &units, 0, "name string", 0);
        assert_eq!(decl_at(&info, &units, 0, "name }", 0), name);
        assert_eq!(decl_at(&info, &units, 0, "name\n", 0), name);
        assert_eq!(decl_at(&info, &units, 0, "name\n", 1), name);
    }

    #[test]
    fn test_unknown_operand_pins_embedded_type() {
        let source = r#"package app

import "example.com/lib"

type Handler struct{}

type wrapper struct {
	*Handler
}

func find() *Handler { return lib.Lookup().Handler }
"#;
        let units = vec![unit("app.go", source)];
        let info = SyntacticChecker.check("example.com/app", &units).unwrap();

        let start = source.find("Handler struct").unwrap();
        let handler = info.id_at(0, start).unwrap();
        assert!(info.is_pinned(handler));
        let wrapper = info.id_at(0, source.find("wrapper").unwrap()).unwrap();
        assert!(!info.is_pinned(wrapper));
    }
}
