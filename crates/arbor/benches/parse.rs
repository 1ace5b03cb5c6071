//! Parser and pipeline benchmarks.

use arbor::{parse, Codegen, CodegenOptions, Lexer, ParserOptions, ScopeIndex};
use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};

const SAMPLE_SOURCE: &str = r#"
// Sample JavaScript code for benchmarking
function fibonacci(n) {
    if (n <= 1) return n;
    return fibonacci(n - 1) + fibonacci(n - 2);
}

class Calculator {
    constructor() {
        this.result = 0;
    }

    add(x, y) {
        return x + y;
    }

    async fetchData(url) {
        const response = await fetch(url);
        return response.json();
    }
}

const calc = new Calculator();
const numbers = [1, 2, 3, 4, 5].map(n => n * 2);
const { a, b, ...rest } = { a: 1, b: 2, c: 3, d: 4 };
const template = `Hello ${name}, you have ${count} messages`;
for (const n of numbers) {
    calc.result += n;
}
"#;

fn bench_lexer(c: &mut Criterion) {
    let mut group = c.benchmark_group("lexer");
    group.throughput(Throughput::Bytes(SAMPLE_SOURCE.len() as u64));

    group.bench_function("sample", |b| {
        b.iter(|| {
            let mut lexer = Lexer::new(black_box(SAMPLE_SOURCE));
            loop {
                let token = lexer.next_token();
                if matches!(token.kind, arbor::TokenKind::Eof) {
                    break;
                }
            }
        });
    });

    group.finish();
}

fn bench_parse(c: &mut Criterion) {
    let mut group = c.benchmark_group("parse");
    group.throughput(Throughput::Bytes(SAMPLE_SOURCE.len() as u64));

    group.bench_function("sample", |b| {
        b.iter(|| {
            parse(black_box(SAMPLE_SOURCE), ParserOptions::default()).unwrap();
        });
    });

    group.finish();
}

fn bench_pipeline(c: &mut Criterion) {
    let mut group = c.benchmark_group("pipeline");
    group.throughput(Throughput::Bytes(SAMPLE_SOURCE.len() as u64));

    group.bench_function("parse-crawl-generate", |b| {
        b.iter(|| {
            let result = parse(black_box(SAMPLE_SOURCE), ParserOptions::default()).unwrap();
            let mut scopes = ScopeIndex::new();
            scopes.crawl(&result.ast, result.ast.root).unwrap();
            Codegen::new(&result.ast, CodegenOptions::default()).generate()
        });
    });

    group.finish();
}

criterion_group!(benches, bench_lexer, bench_parse, bench_pipeline);
criterion_main!(benches);
