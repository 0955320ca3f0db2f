//! Literal obfuscation over already rewritten output

use crate::syntax::{descendants_of_kind, SourceUnit, CGO_PREFIX};
use crate::Result;
use rand::Rng;
use std::fs;
use std::path::PathBuf;
use tracing::debug;

/// Import paths whose call arguments always accept a plain `string` expression.
const STRING_SINKS: &[&str] = &["fmt", "log", "errors"];

/// Rewrites the string literals of Go files in place.
pub trait LiteralObfuscator {
    /// Returns the number of files changed.
    fn obfuscate_files(&self, paths: &[PathBuf]) -> Result<usize>;
}

/// Replaces literals with closures that XOR them back together at run time.
#[derive(Debug, Default, Clone, Copy)]
pub struct XorLiteralObfuscator;

impl XorLiteralObfuscator {
    /// New text for `unit`, or `None` when nothing qualified.
    pub fn obfuscate_unit(&self, unit: &SourceUnit) -> Option<String> {
        let sinks: Vec<String> = unit
            .imports()
            .into_iter()
            .filter(|i| STRING_SINKS.contains(&i.path.as_str()))
            .filter_map(|i| i.binding)
            .collect();
        if sinks.is_empty() {
            return None;
        }

        let mut literals = Vec::new();
        for call in descendants_of_kind(unit.root(), "call_expression") {
            let Some(function) = call.child_by_field_name("function") else {
                continue;
            };
            let operand = function
                .child_by_field_name("operand")
                .filter(|_| function.kind() == "selector_expression");
            if !operand.is_some_and(|o| sinks.iter().any(|s| s == unit.text(o))) {
                continue;
            }
            let Some(arguments) = call.child_by_field_name("arguments") else {
                continue;
            };
            let mut cursor = arguments.walk();
            for argument in arguments.named_children(&mut cursor) {
                if argument.kind() != "interpreted_string_literal" {
                    continue;
                }
                let text = unit.text(argument);
                let value = &text[1..text.len() - 1];
                if value.is_empty() || value.contains('\\') {
                    continue;
                }
                literals.push((argument.byte_range(), value));
            }
        }
        if literals.is_empty() {
            return None;
        }

        let mut rng = rand::rng();
        let source = unit.source();
        let mut out = String::with_capacity(source.len() * 2);
        let mut cursor = 0;
        for (range, value) in &literals {
            out.push_str(&source[cursor..range.start]);
            out.push_str(&xor_closure(value.as_bytes(), &mut rng));
            cursor = range.end;
        }
        out.push_str(&source[cursor..]);
        debug!("{}: obfuscated {} literals", unit.name, literals.len());
        Some(out)
    }
}

impl LiteralObfuscator for XorLiteralObfuscator {
    fn obfuscate_files(&self, paths: &[PathBuf]) -> Result<usize> {
        let mut changed = 0;
        for path in paths {
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if !name.ends_with(".go") || name.starts_with(CGO_PREFIX) {
                continue;
            }
            let unit = SourceUnit::parse_file(path)?;
            if let Some(text) = self.obfuscate_unit(&unit) {
                fs::write(path, text)?;
                changed += 1;
            }
        }
        Ok(changed)
    }
}

fn byte_list(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(u8::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// A single-line expression that evaluates to the string `plain`.
fn xor_closure(plain: &[u8], rng: &mut impl Rng) -> String {
    let key: Vec<u8> = (0..plain.len()).map(|_| rng.random()).collect();
    let data: Vec<u8> = plain.iter().zip(&key).map(|(p, k)| p ^ k).collect();
    format!(
        "func() string {{ key := []byte{{{}}}; data := []byte{{{}}}; for i := range data {{ data[i] ^= key[i] }}; return string(data) }}()",
        byte_list(&key),
        byte_list(&data)
    )
}
