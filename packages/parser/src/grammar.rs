//! Per-language tables: which keywords open blocks, which words may prefix
//! them, and how to render an empty element of each kind.

use crate::ast::kind;
use duplex_common::Language;

/// How a block keyword's body is delimited
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyForm {
    /// Needs a `{ ... }` body
    Braced,
    /// `{ ... }` body, or a declaration ending at `;` (or newline in Go)
    BracedOrStatement,
    /// `const f = (...) => { ... }`: binding whose value is a braced arrow function
    ArrowBinding,
    /// Python header ending in `:` followed by an indented suite
    Suite,
}

/// A keyword that opens a block
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockRule {
    pub keyword: &'static str,
    pub kind: &'static str,
    pub form: BodyForm,
    /// Keyword must be followed by an identifier (`fn name`, not `fn(u8)`)
    pub needs_name: bool,
    /// Keywords that continue this block at the same level (`else`, `elif`, ...)
    pub continuations: &'static [&'static str],
    /// Soft keywords only open a block when the header is well-formed
    pub soft: bool,
}

const fn rule(keyword: &'static str, kind: &'static str, form: BodyForm) -> BlockRule {
    BlockRule {
        keyword,
        kind,
        form,
        needs_name: false,
        continuations: &[],
        soft: false,
    }
}

const fn named(keyword: &'static str, kind: &'static str, form: BodyForm) -> BlockRule {
    BlockRule {
        needs_name: true,
        ..rule(keyword, kind, form)
    }
}

const fn chained(
    keyword: &'static str,
    kind: &'static str,
    form: BodyForm,
    continuations: &'static [&'static str],
) -> BlockRule {
    BlockRule {
        continuations,
        ..rule(keyword, kind, form)
    }
}

const fn soft(keyword: &'static str, kind: &'static str, form: BodyForm) -> BlockRule {
    BlockRule {
        soft: true,
        ..rule(keyword, kind, form)
    }
}

use BodyForm::*;

const RUST_RULES: &[BlockRule] = &[
    named("fn", kind::FUNCTION, BracedOrStatement),
    chained("if", kind::CONDITION, Braced, &["else"]),
    rule("while", kind::LOOP, Braced),
    rule("for", kind::LOOP, Braced),
    rule("loop", kind::LOOP, Braced),
    rule("match", kind::MATCH, Braced),
    named("struct", kind::TYPE, BracedOrStatement),
    named("enum", kind::TYPE, Braced),
    named("union", kind::TYPE, Braced),
    named("trait", kind::TRAIT, Braced),
    rule("impl", kind::IMPL, Braced),
    named("mod", kind::MODULE, Braced),
];

const GO_RULES: &[BlockRule] = &[
    rule("func", kind::FUNCTION, Braced),
    chained("if", kind::CONDITION, Braced, &["else"]),
    rule("for", kind::LOOP, Braced),
    rule("switch", kind::SWITCH, Braced),
    rule("select", kind::SWITCH, Braced),
    rule("type", kind::TYPE, BracedOrStatement),
];

const JS_RULES: &[BlockRule] = &[
    rule("function", kind::FUNCTION, Braced),
    rule("class", kind::CLASS, Braced),
    chained("if", kind::CONDITION, Braced, &["else"]),
    rule("for", kind::LOOP, Braced),
    rule("while", kind::LOOP, Braced),
    rule("do", kind::LOOP, Braced),
    rule("switch", kind::SWITCH, Braced),
    rule("const", kind::FUNCTION, ArrowBinding),
    rule("let", kind::FUNCTION, ArrowBinding),
    rule("var", kind::FUNCTION, ArrowBinding),
];

const TS_RULES: &[BlockRule] = &[
    rule("function", kind::FUNCTION, BracedOrStatement),
    rule("class", kind::CLASS, Braced),
    chained("if", kind::CONDITION, Braced, &["else"]),
    rule("for", kind::LOOP, Braced),
    rule("while", kind::LOOP, Braced),
    rule("do", kind::LOOP, Braced),
    rule("switch", kind::SWITCH, Braced),
    rule("const", kind::FUNCTION, ArrowBinding),
    rule("let", kind::FUNCTION, ArrowBinding),
    rule("var", kind::FUNCTION, ArrowBinding),
    named("interface", kind::INTERFACE, Braced),
    named("enum", kind::TYPE, Braced),
    named("namespace", kind::MODULE, Braced),
];

const PYTHON_RULES: &[BlockRule] = &[
    rule("def", kind::FUNCTION, Suite),
    rule("class", kind::CLASS, Suite),
    chained("if", kind::CONDITION, Suite, &["elif", "else"]),
    chained("for", kind::LOOP, Suite, &["else"]),
    chained("while", kind::LOOP, Suite, &["else"]),
    rule("with", kind::CONTEXT, Suite),
    chained("try", kind::TRY, Suite, &["except", "else", "finally"]),
    soft("match", kind::MATCH, Suite),
];

/// Stub rendered for an element that has no source text yet
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Template {
    pub kind: &'static str,
    /// Source with a `{name}` placeholder
    pub stub: &'static str,
}

const fn template(kind: &'static str, stub: &'static str) -> Template {
    Template { kind, stub }
}

const RUST_TEMPLATES: &[Template] = &[
    template(kind::FUNCTION, "fn {name}() {\n}"),
    template(kind::CONDITION, "if true {\n}"),
    template(kind::LOOP, "loop {\n    break;\n}"),
    template(kind::MATCH, "match () {\n    _ => {}\n}"),
    template(kind::TYPE, "struct {name} {\n}"),
    template(kind::TRAIT, "trait {name} {\n}"),
    template(kind::IMPL, "impl {name} {\n}"),
    template(kind::MODULE, "mod {name} {\n}"),
];

const GO_TEMPLATES: &[Template] = &[
    template(kind::FUNCTION, "func {name}() {\n}"),
    template(kind::CONDITION, "if true {\n}"),
    template(kind::LOOP, "for {\n\tbreak\n}"),
    template(kind::SWITCH, "switch {\n}"),
    template(kind::TYPE, "type {name} struct {\n}"),
];

const JS_TEMPLATES: &[Template] = &[
    template(kind::FUNCTION, "function {name}() {\n}"),
    template(kind::CLASS, "class {name} {\n}"),
    template(kind::CONDITION, "if (true) {\n}"),
    template(kind::LOOP, "while (false) {\n}"),
    template(kind::SWITCH, "switch (undefined) {\n}"),
];

const TS_TEMPLATES: &[Template] = &[
    template(kind::FUNCTION, "function {name}(): void {\n}"),
    template(kind::CLASS, "class {name} {\n}"),
    template(kind::CONDITION, "if (true) {\n}"),
    template(kind::LOOP, "while (false) {\n}"),
    template(kind::SWITCH, "switch (undefined) {\n}"),
    template(kind::INTERFACE, "interface {name} {\n}"),
    template(kind::TYPE, "enum {name} {\n}"),
    template(kind::MODULE, "namespace {name} {\n}"),
];

const PYTHON_TEMPLATES: &[Template] = &[
    template(kind::FUNCTION, "def {name}():\n    pass"),
    template(kind::CLASS, "class {name}:\n    pass"),
    template(kind::CONDITION, "if True:\n    pass"),
    template(kind::LOOP, "while False:\n    pass"),
    template(kind::CONTEXT, "with open(__file__):\n    pass"),
    template(kind::TRY, "try:\n    pass\nexcept Exception:\n    pass"),
    template(kind::MATCH, "match None:\n    case _:\n        pass"),
];

/// Lexical and block-level rules for one language
#[derive(Debug, Clone, Copy)]
pub struct Grammar {
    pub language: Language,
    pub rules: &'static [BlockRule],
    /// Words that may precede a block keyword and belong to the block
    pub modifiers: &'static [&'static str],
    /// Newlines end declarations (Go's automatic semicolons)
    pub newline_terminates: bool,
    pub templates: &'static [Template],
}

impl Grammar {
    pub fn for_language(language: Language) -> Self {
        match language {
            Language::Rust => Grammar {
                language,
                rules: RUST_RULES,
                modifiers: &["pub", "async", "const", "unsafe", "extern", "default"],
                newline_terminates: false,
                templates: RUST_TEMPLATES,
            },
            Language::Go => Grammar {
                language,
                rules: GO_RULES,
                modifiers: &[],
                newline_terminates: true,
                templates: GO_TEMPLATES,
            },
            Language::JavaScript => Grammar {
                language,
                rules: JS_RULES,
                modifiers: &["export", "default", "async"],
                newline_terminates: false,
                templates: JS_TEMPLATES,
            },
            Language::TypeScript => Grammar {
                language,
                rules: TS_RULES,
                modifiers: &["export", "default", "async", "declare", "abstract"],
                newline_terminates: false,
                templates: TS_TEMPLATES,
            },
            Language::Python => Grammar {
                language,
                rules: PYTHON_RULES,
                modifiers: &["async"],
                newline_terminates: false,
                templates: PYTHON_TEMPLATES,
            },
        }
    }

    pub fn rule(&self, keyword: &str) -> Option<&'static BlockRule> {
        self.rules.iter().find(|r| r.keyword == keyword)
    }

    pub fn is_modifier(&self, word: &str) -> bool {
        self.modifiers.contains(&word)
    }

    pub fn template(&self, kind: &str) -> Option<&'static Template> {
        self.templates.iter().find(|t| t.kind == kind)
    }
}

impl Template {
    /// Render the stub with `name`
    pub fn render(&self, name: &str) -> String {
        self.stub.replace("{name}", name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_rule_kind_has_a_template() {
        for language in Language::ALL {
            let grammar = Grammar::for_language(language);
            for rule in grammar.rules {
                assert!(
                    grammar.template(rule.kind).is_some(),
                    "{} has no template for {}",
                    language,
                    rule.kind
                );
            }
        }
    }

    #[test]
    fn test_template_render() {
        let grammar = Grammar::for_language(Language::Rust);
        let stub = grammar.template(kind::FUNCTION).unwrap().render("node_a");
        assert_eq!(stub, "fn node_a() {\n}");
    }

    #[test]
    fn test_rule_lookup() {
        let grammar = Grammar::for_language(Language::Python);
        assert_eq!(grammar.rule("def").map(|r| r.kind), Some(kind::FUNCTION));
        assert_eq!(grammar.rule("elif"), None);
        assert!(grammar.rule("if").unwrap().continuations.contains(&"elif"));
    }
}
