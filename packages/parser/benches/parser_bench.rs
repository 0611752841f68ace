use criterion::{black_box, criterion_group, criterion_main, Criterion};
use duplex_common::Language;
use duplex_parser::{parse, FormattingStyle, Formatter};

fn parse_small_rust(c: &mut Criterion) {
    let source = r#"
        // @META {"id":"main","x":0,"y":0}
        pub fn main() {
            let items = vec![1, 2, 3];
            for item in items {
                if item % 2 == 0 {
                    println!("{}", item);
                } else {
                    continue;
                }
            }
        }
    "#;

    c.bench_function("parse_small_rust", |b| {
        b.iter(|| parse(black_box(source), Language::Rust))
    });
}

fn parse_large_rust(c: &mut Criterion) {
    let mut source = String::new();
    for i in 0..200 {
        source.push_str(&format!(
            r#"
// @META {{"id":"node_{}","x":{},"y":{}}}
fn handler_{}(input: &str) -> Option<usize> {{
    match input.len() {{
        0 => None,
        n => {{
            let mut total = 0;
            while total < n {{
                total += 1;
            }}
            Some(total)
        }}
    }}
}}
"#,
            i,
            i * 10,
            i * 20,
            i
        ));
    }

    c.bench_function("parse_large_rust_200_fns", |b| {
        b.iter(|| parse(black_box(&source), Language::Rust))
    });
}

fn parse_python(c: &mut Criterion) {
    let mut source = String::new();
    for i in 0..200 {
        source.push_str(&format!(
            "# @META {{\"id\":\"py_{}\",\"x\":0,\"y\":{}}}\ndef handler_{}(items):\n    for item in items:\n        if item:\n            yield item\n        else:\n            continue\n\n",
            i, i, i
        ));
    }

    c.bench_function("parse_python_200_defs", |b| {
        b.iter(|| parse(black_box(&source), Language::Python))
    });
}

fn format_only(c: &mut Criterion) {
    let source = "fn a() {\nif b {\nc(\nd,\n);\n}\n}\n".repeat(100);
    let formatter = Formatter::new(Language::Rust, FormattingStyle::default());

    c.bench_function("format_only", |b| {
        b.iter(|| formatter.format(black_box(&source)))
    });
}

criterion_group!(
    benches,
    parse_small_rust,
    parse_large_rust,
    parse_python,
    format_only
);
criterion_main!(benches);
