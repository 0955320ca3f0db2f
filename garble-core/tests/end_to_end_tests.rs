use garble_core::{
    hash_with, ungarble_file, Classifier, Deobfuscator, ImportTable, ManifestImporter, Rewriter,
    Settings, SourceRegistry, SourceUnit, SyntacticChecker,
};
use std::fs;
use std::path::{Path, PathBuf};

const SALT: &str = "abc123";

const GREET: &str = r#"package app

import "fmt"

// Greet builds the greeting.
func Greet(name string) string {
	return fmt.Sprintf("hello %s", name)
}
"#;

const HELLO: &str = r#"package app

func hello() string {
	return Greet("world")
}
"#;

fn write(root: &Path, relative: &str, contents: &str) -> PathBuf {
    let path = root.join(relative);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(&path, contents).unwrap();
    path
}

fn parse_all(paths: &[PathBuf]) -> Vec<SourceUnit> {
    paths
        .iter()
        .map(|p| SourceUnit::parse_file(p).unwrap())
        .collect()
}

#[test]
fn test_greet_round_trip() {
    let src = tempfile::tempdir().unwrap();
    let out = tempfile::tempdir().unwrap();
    let units = parse_all(&[
        write(src.path(), "app/greet.go", GREET),
        write(src.path(), "app/hello.go", HELLO),
    ]);

    let settings = Settings::default();
    let mut classifier = Classifier::new(&settings);
    let rewriter = Rewriter::new(SALT, out.path());
    let written = rewriter
        .rewrite_package("example.com/app", &units, &SyntacticChecker, &mut classifier)
        .unwrap();

    let hashed_greet = hash_with(SALT, "Greet");
    let greet = fs::read_to_string(&written[0]).unwrap();
    let hello = fs::read_to_string(&written[1]).unwrap();
    assert!(greet.contains(&format!("func {}(", hashed_greet)));
    assert!(hello.contains(&format!("return {}(\"world\")", hashed_greet)));
    assert!(!greet.contains("Greet"));
    assert!(greet.contains("fmt.Sprintf"));

    // A trace from the obfuscated binary
    let hashed_file = written[0].file_stem().unwrap().to_string_lossy().into_owned();
    let log = format!(
        "panic: boom\n\ngoroutine 1 [running]:\napp.{}(...)\n\t{}.go:42 +0x1d\nexit status 2\n",
        hashed_greet, hashed_file
    );

    let registry = SourceRegistry::build(src.path(), SALT, &SyntacticChecker).unwrap();
    let restored = Deobfuscator::new(&registry, SALT).ungarble_str(&log);
    assert_eq!(
        restored,
        "panic: boom\n\ngoroutine 1 [running]:\napp.Greet(...)\n\tgreet.go:42 +0x1d\nexit status 2\n"
    );
}

#[test]
fn test_preserved_names_survive() {
    let src = tempfile::tempdir().unwrap();
    let out = tempfile::tempdir().unwrap();
    let units = parse_all(&[
        write(
            src.path(),
            "app/types.go",
            r#"package app

import "testing"

type Record struct {
	Visible string
	hidden  int
}

func (r Record) Describe() string { return r.Visible }

func _Cfunc_free() {}

func asmAdd(a, b int) int

func TestRecord(t *testing.T) {
	_ = Record{Visible: "x", hidden: 1}.Describe()
}

func init() {}
"#,
        ),
    ]);

    let settings = Settings::default();
    let mut classifier = Classifier::new(&settings);
    let written = Rewriter::new(SALT, out.path())
        .rewrite_package("example.com/app", &units, &SyntacticChecker, &mut classifier)
        .unwrap();
    let text = fs::read_to_string(&written[0]).unwrap();

    for kept in [
        "Visible string",
        ".Visible }",
        "Describe()",
        "_Cfunc_free",
        "func asmAdd(",
        "func TestRecord(",
        "*testing.T)",
        "_ = ",
        "func init()",
    ] {
        assert!(text.contains(kept), "{:?} should survive in:\n{}", kept, text);
    }
    assert!(!text.contains("hidden"));
    assert!(!text.contains("Record{"));
    assert!(text.contains(&format!("{}{{", hash_with(SALT, "Record"))));
}

#[test]
fn test_importers_follow_dependency_names() {
    let out = tempfile::tempdir().unwrap();
    let rewriter = Rewriter::new(SALT, out.path());
    let settings = Settings::default();

    let lib = vec![SourceUnit::parse(
        "lib.go",
        PathBuf::from("lib/lib.go"),
        "package lib\n\nfunc Sum(a, b int) int { return a + b }\n\nfunc Asm(x int) int\n"
            .to_string(),
    )
    .unwrap()];
    let mut classifier = Classifier::new(&settings);
    rewriter
        .clone()
        .with_action_id("libaction")
        .rewrite_package("example.com/lib", &lib, &SyntacticChecker, &mut classifier)
        .unwrap();

    let app = vec![SourceUnit::parse(
        "main.go",
        PathBuf::from("app/main.go"),
        "package main\n\nimport \"example.com/lib\"\n\nfunc main() { _ = lib.Sum(1, lib.Asm(2)) }\n"
            .to_string(),
    )
    .unwrap()];
    let mut imports = ImportTable::new(Box::new(ManifestImporter::new(rewriter.output_root())));
    imports.record_import("example.com/lib", PathBuf::from("lib.a"), "libaction".into());
    let mut classifier = Classifier::with_imports(&settings, &mut imports);
    let written = rewriter
        .rewrite_package("main", &app, &SyntacticChecker, &mut classifier)
        .unwrap();

    let text = fs::read_to_string(&written[0]).unwrap();
    assert!(text.contains(&format!("lib.{}(1, lib.Asm(2))", hash_with(SALT, "Sum"))));
    assert!(text.contains("func main()"));
}

#[test]
fn test_members_of_other_packages_keep_their_names() {
    let out = tempfile::tempdir().unwrap();
    let units = vec![SourceUnit::parse(
        "client.go",
        PathBuf::from("app/client.go"),
        r#"package app

import (
	"net/http"
	"time"
)

const Timeout = 5 * time.Second

const Name = "n"

type Row struct {
	Name string
}

type Handler struct{}

type wrapper struct {
	*Handler
}

func client() *http.Client { return &http.Client{Timeout: Timeout} }

var counts = map[string]int{Name: 1}

func set(s *http.Server, h http.Handler) { s.Handler = h }

func unwrap(w wrapper) *Handler { return w.Handler }
"#
        .to_string(),
    )
    .unwrap()];

    let settings = Settings::default();
    let mut classifier = Classifier::new(&settings);
    let written = Rewriter::new(SALT, out.path())
        .rewrite_package("example.com/app", &units, &SyntacticChecker, &mut classifier)
        .unwrap();
    let text = fs::read_to_string(&written[0]).unwrap();

    let timeout = hash_with(SALT, "Timeout");
    let name = hash_with(SALT, "Name");
    let handler = hash_with(SALT, "Handler");
    assert!(text.contains(&format!("const {} = 5 * time.Second", timeout)));
    assert!(text.contains(&format!("&http.Client{{Timeout: {}}}", timeout)));
    assert!(text.contains(&format!("const {} = \"n\"", name)));
    assert!(text.contains(&format!("map[string]int{{{}: 1}}", name)));
    assert!(text.contains("Name string"));
    assert!(text.contains(".Handler = "));
    assert!(text.contains(&format!("type {} struct{{}}", handler)));
    assert!(text.contains(&format!(".{} }}", handler)));
}

#[test]
fn test_unregistered_file_passes_through() {
    let src = tempfile::tempdir().unwrap();
    write(src.path(), "app/greet.go", GREET);
    let registry = SourceRegistry::build(src.path(), SALT, &SyntacticChecker).unwrap();

    let log = "app.Zq1w2e3r4(...)\n\tzNotKnown.go:42 +0x1d\n";
    let mut engine = Deobfuscator::new(&registry, SALT);
    assert_eq!(engine.ungarble_str(log), log);
}

#[tokio::test]
async fn test_ungarble_file_writes_output() {
    let src = tempfile::tempdir().unwrap();
    write(src.path(), "app/greet.go", GREET);
    let work = tempfile::tempdir().unwrap();

    let hashed_file = garble_core::hashing::hash_file_name_in(SALT, "app", "greet.go");
    let log = write(
        work.path(),
        "crash.log",
        &format!("app.{}(...)\n\t{}.go:7\n", hash_with(SALT, "Greet"), hashed_file),
    );
    let output = work.path().join("ungarbled_log.txt");

    let stats = ungarble_file(&log, src.path(), SALT, &output, None)
        .await
        .unwrap();
    assert_eq!(stats.files, 1);
    assert_eq!(stats.identifiers, 1);
    assert_eq!(
        fs::read_to_string(&output).unwrap(),
        "app.Greet(...)\n\tgreet.go:7\n"
    );
}
