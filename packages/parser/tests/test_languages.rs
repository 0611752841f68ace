use duplex_common::{DiagnosticCode, Language};
use duplex_parser::{kind, parse, Formatter, FormattingStyle, SyntaxTree};

fn kinds(tree: &SyntaxTree) -> Vec<&str> {
    tree.blocks.iter().map(|b| b.kind.as_str()).collect()
}

fn slice<'a>(source: &'a str, tree: &SyntaxTree, index: usize) -> &'a str {
    &source[tree.blocks[index].range.as_range()]
}

#[test]
fn test_rust_module() {
    let source = r#"use std::fmt;

// @META {"id":"point","x":0,"y":0}
#[derive(Debug)]
pub struct Point {
    x: i32,
}

impl fmt::Display for Point {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({})", self.x)
    }
}

pub(crate) async fn run(points: &[Point]) -> usize {
    let mut n = 0;
    for p in points {
        if p.x > 0 { n += 1; }
    }
    n
}
"#;

    let tree = parse(source, Language::Rust);
    assert!(tree.is_complete(), "{:?}", tree.errors);
    assert_eq!(
        kinds(&tree),
        vec![
            kind::TYPE,
            kind::IMPL,
            kind::FUNCTION,
            kind::FUNCTION,
            kind::LOOP,
            kind::CONDITION
        ]
    );
    assert_eq!(slice(source, &tree, 0), "pub struct Point {\n    x: i32,\n}");
    assert!(slice(source, &tree, 3).starts_with("pub(crate) async fn run"));
    assert_eq!(tree.comments.len(), 1);
}

#[test]
fn test_python_module() {
    let source = r#"import os

# @META {"id":"loader","x":0,"y":0}
class Loader:
    def __init__(self, root):
        self.root = root

    def load(self, name):
        try:
            with open(os.path.join(self.root, name)) as f:
                return f.read()
        except OSError:
            return None
        finally:
            pass

for name in ["a", "b"]:
    print(Loader(".").load(name))
"#;

    let tree = parse(source, Language::Python);
    assert!(tree.is_complete(), "{:?}", tree.errors);
    assert_eq!(
        kinds(&tree),
        vec![
            kind::CLASS,
            kind::FUNCTION,
            kind::FUNCTION,
            kind::TRY,
            kind::CONTEXT,
            kind::LOOP
        ]
    );
    assert!(slice(source, &tree, 3).ends_with("finally:\n            pass"));
    assert_eq!(
        slice(source, &tree, 5),
        "for name in [\"a\", \"b\"]:\n    print(Loader(\".\").load(name))"
    );
}

#[test]
fn test_go_module() {
    let source = "package main\n\nimport \"fmt\"\n\nfunc main() {\n\tfor i := 0; i < 3; i++ {\n\t\tif i%2 == 0 {\n\t\t\tfmt.Println(i)\n\t\t} else {\n\t\t\tcontinue\n\t\t}\n\t}\n}\n";

    let tree = parse(source, Language::Go);
    assert!(tree.is_complete());
    assert_eq!(kinds(&tree), vec![kind::FUNCTION, kind::LOOP, kind::CONDITION]);
    assert!(slice(source, &tree, 2).ends_with("continue\n\t\t}"));
}

#[test]
fn test_typescript_module() {
    let source = r#"import { Shape } from "./shape";

export interface Circle extends Shape {
    radius: number;
}

export default class Renderer {
    draw(c: Circle): void {
        switch (c.kind) {
            case "circle":
                break;
        }
    }
}

export const area = (c: Circle): number => {
    return Math.PI * c.radius ** 2;
};
"#;

    let tree = parse(source, Language::TypeScript);
    assert!(tree.is_complete());
    assert_eq!(
        kinds(&tree),
        vec![kind::INTERFACE, kind::CLASS, kind::SWITCH, kind::FUNCTION]
    );
    assert!(slice(source, &tree, 1).starts_with("export default class Renderer"));
    assert!(slice(source, &tree, 3).starts_with("export const area"));
}

#[test]
fn test_broken_source_yields_partial_tree_and_diagnostics() {
    let source = "fn ok() {}\n\nfn broken() {\n    if x {\n";

    let tree = parse(source, Language::Rust);
    assert_eq!(kinds(&tree), vec![kind::FUNCTION, kind::FUNCTION, kind::CONDITION]);
    assert_eq!(tree.blocks[1].range.end, source.len());

    let diagnostics = tree.diagnostics();
    assert_eq!(diagnostics.len(), 2);
    assert!(diagnostics.iter().all(|d| d.code == DiagnosticCode::ParseError));
}

#[test]
fn test_block_at_returns_innermost() {
    let source = "fn outer() {\n    loop {\n        break;\n    }\n}\n";
    let tree = parse(source, Language::Rust);

    let inside_loop = source.find("break").unwrap();
    assert_eq!(tree.block_at(inside_loop).map(|b| b.kind.as_str()), Some(kind::LOOP));
    assert_eq!(tree.block_at(1).map(|b| b.kind.as_str()), Some(kind::FUNCTION));
    assert_eq!(tree.block_at(source.len()), None);
}

#[test]
fn test_python_escape_before_wide_char() {
    let source = "def f():\n    s = '''C:\\Élodie'''\n    return s\n\nx = \"\"\"\\é\"\"\"\n";

    let tree = parse(source, Language::Python);
    assert!(tree.is_complete(), "{:?}", tree.errors);
    assert_eq!(kinds(&tree), vec![kind::FUNCTION]);
    assert_eq!(slice(source, &tree, 0), "def f():\n    s = '''C:\\Élodie'''\n    return s");

    let formatter = Formatter::new(Language::Python, FormattingStyle::default());
    assert_eq!(formatter.format(source), source);
}

#[test]
fn test_javascript_regex_literals_are_opaque() {
    let source = "const re = /\\{/;\nconst cls = /[/}]+/g;\nfunction f() {\n    return /}/.test(x) ? a / b : (c) / 2;\n}\nfunction g() {}\n";

    let tree = parse(source, Language::JavaScript);
    assert!(tree.is_complete(), "{:?}", tree.errors);
    assert!(tree.diagnostics().is_empty());
    assert_eq!(kinds(&tree), vec![kind::FUNCTION, kind::FUNCTION]);
    assert!(slice(source, &tree, 0).ends_with("(c) / 2;\n}"));
}
