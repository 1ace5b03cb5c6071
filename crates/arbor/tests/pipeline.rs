//! End-to-end pipeline tests: parse → traverse/transform → generate.

use arbor::{
    parse, transform, Ast, Capabilities, Codegen, CodegenOptions, NodeId, NodeKind, ParserOptions,
    Pass, PassRunner, Plugin, ScopeIndex, SourceType, Visitor,
};
use std::cell::RefCell;
use std::rc::Rc;

fn parse_ok(source: &str) -> Ast {
    let result = parse(source, ParserOptions::default()).expect("parse succeeds");
    assert!(result.errors.is_empty(), "unexpected errors: {:?}", result.errors);
    result.ast
}

/// Structural equivalence: same node kinds, same child shapes, same
/// names/values — ignoring spans and raw side data.
fn structurally_equal(a: &Ast, a_id: NodeId, b: &Ast, b_id: NodeId) -> bool {
    if a.node_type(a_id) != b.node_type(b_id) {
        return false;
    }
    match (a.kind(a_id), b.kind(b_id)) {
        (NodeKind::Identifier { name: n1 }, NodeKind::Identifier { name: n2 }) if n1 != n2 => {
            return false;
        }
        (NodeKind::StringLiteral { value: v1 }, NodeKind::StringLiteral { value: v2 })
            if v1 != v2 =>
        {
            return false;
        }
        (NodeKind::NumericLiteral { value: v1 }, NodeKind::NumericLiteral { value: v2 })
            if v1 != v2 =>
        {
            return false;
        }
        _ => {}
    }
    let a_children = a.children(a_id);
    let b_children = b.children(b_id);
    if a_children.len() != b_children.len() {
        return false;
    }
    a_children
        .iter()
        .zip(&b_children)
        .all(|(ca, cb)| ca.key == cb.key && structurally_equal(a, ca.id, b, cb.id))
}

#[test]
fn round_trip_reparse_is_structurally_equivalent() {
    let sources = [
        "let x = 1; var y = x + 2;",
        "function outer(a, {b, c = 3}) { return () => a + b + c; }",
        "class Point { constructor(x, y) { this.x = x; this.y = y; } norm() { return Math.sqrt(this.x ** 2 + this.y ** 2); } }",
        "const re = /a+b/gi; const t = `sum: ${1 + 2}`;",
        "switch (v) { case 1: f(); break; default: g(); }",
        "try { risky(); } catch { recover(); } finally { cleanup(); }",
        "a?.b?.[c]?.(d); x ||= y; z &&= w;",
    ];
    for source in sources {
        let first = parse_ok(source);
        let output = Codegen::new(&first, CodegenOptions::default()).generate();
        let second = parse_ok(&output.code);
        assert!(
            structurally_equal(&first, first.root, &second, second.root),
            "round trip changed structure for {source:?}\ngenerated: {}",
            output.code
        );
    }
}

#[test]
fn round_trip_preserves_raw_literals() {
    let ast = parse_ok("const a = 0o17; const b = 'quoted'; const c = 1_000;");
    let code = Codegen::new(&ast, CodegenOptions::default()).generate().code;
    assert!(code.contains("0o17"));
    assert!(code.contains("'quoted'"));
    assert!(code.contains("1_000"));
}

#[test]
fn reentrant_dispatch_runs_new_type_visitors_before_children() {
    // Plugin A turns `a + b` into `combine(a, b)`; plugin B's
    // CallExpression visitor must observe the replacement before the
    // identifiers are visited.
    let result = parse(
        "a + b;",
        ParserOptions::default(),
    )
    .expect("parse succeeds");
    let mut ast = result.ast;

    let log: Rc<RefCell<Vec<String>>> = Rc::new(RefCell::new(Vec::new()));

    let mut va = Visitor::new();
    let alog = Rc::clone(&log);
    va.on_enter("BinaryExpression", move |cursor, _| {
        alog.borrow_mut().push("A:binary".into());
        let NodeKind::BinaryExpression { left, right, .. } = cursor.kind().clone() else {
            return Ok(());
        };
        let callee = cursor.ast.synth(NodeKind::Identifier { name: "combine".into() });
        cursor.replace_with(NodeKind::CallExpression {
            callee,
            arguments: vec![left, right],
            optional: false,
        });
        Ok(())
    });

    let mut vb = Visitor::new();
    let blog = Rc::clone(&log);
    vb.on_enter("CallExpression", move |_, _| {
        blog.borrow_mut().push("B:call".into());
        Ok(())
    });
    let ilog = Rc::clone(&log);
    vb.on_enter("Identifier", move |cursor, _| {
        let name = cursor.ast.ident_name(cursor.node()).unwrap_or_default().to_string();
        ilog.borrow_mut().push(format!("B:ident:{name}"));
        Ok(())
    });

    let mut runner = PassRunner::new();
    runner.add_pass(Pass::new(vec![
        Plugin::new("a").with_visitor(va),
        Plugin::new("b").with_visitor(vb),
    ]));
    runner.run(&mut ast, None).expect("pass runs");

    assert_eq!(
        log.borrow().clone(),
        vec!["A:binary", "B:call", "B:ident:combine", "B:ident:a", "B:ident:b"]
    );
}

#[test]
fn full_transform_pipeline_with_scope_based_rewrites() {
    // Remove debugger statements and hygienically rename `counter`.
    let mut strip = Visitor::new();
    strip.on_enter("DebuggerStatement", |cursor, _| {
        cursor.remove()?;
        Ok(())
    });

    let mut renamer = Visitor::new();
    renamer.on_enter("Program", |cursor, _| {
        let fresh = cursor.generate_uid("counter").expect("scope available");
        cursor.rename_binding("counter", &fresh);
        Ok(())
    });

    let mut runner = PassRunner::new().with_filename("input.js");
    runner.add_pass(Pass::new(vec![
        Plugin::new("strip-debugger").with_visitor(strip),
        Plugin::new("rename-counter").with_visitor(renamer),
    ]));

    let output = transform(
        "let counter = 0; debugger; counter = counter + 1; use(counter);",
        ParserOptions::default(),
        &runner,
        CodegenOptions { minify: true, ..Default::default() },
    )
    .expect("pipeline succeeds");

    assert!(!output.code.contains("debugger"));
    // All four occurrences renamed consistently.
    assert_eq!(output.code.matches("_counter").count(), 4);
    assert_eq!(output.code.matches("counter").count(), 4);
}

#[test]
fn binding_reference_invariant_through_public_api() {
    let ast = parse_ok("var a; a(); a();");
    let mut scopes = ScopeIndex::new();
    let root = scopes.crawl(&ast, ast.root).expect("crawl succeeds");
    let (_, binding) = scopes.get_binding(root, "a").expect("a is bound");
    assert_eq!(binding.references(), 2);
}

#[test]
fn ambiguous_arrow_resolutions() {
    // Arrow with two identifier params.
    let ast = parse_ok("(a, b) => a + b;");
    let NodeKind::Program { body, .. } = ast.kind(ast.root).clone() else { panic!() };
    let NodeKind::ExpressionStatement { expression } = ast.kind(body[0]).clone() else { panic!() };
    let NodeKind::ArrowFunctionExpression { params, .. } = ast.kind(expression).clone() else {
        panic!("expected arrow, got {:?}", ast.kind(expression));
    };
    assert_eq!(params.len(), 2);

    // Same token prefix without the arrow: parenthesized sequence.
    let ast = parse_ok("(a, b);");
    let NodeKind::Program { body, .. } = ast.kind(ast.root).clone() else { panic!() };
    let NodeKind::ExpressionStatement { expression } = ast.kind(body[0]).clone() else { panic!() };
    assert!(matches!(ast.kind(expression), NodeKind::SequenceExpression { .. }));

    // Object literal retyped into a pattern by the arrow conversion.
    let ast = parse_ok("({a, b}) => a;");
    let NodeKind::Program { body, .. } = ast.kind(ast.root).clone() else { panic!() };
    let NodeKind::ExpressionStatement { expression } = ast.kind(body[0]).clone() else { panic!() };
    let NodeKind::ArrowFunctionExpression { params, .. } = ast.kind(expression).clone() else {
        panic!()
    };
    assert!(matches!(ast.kind(params[0]), NodeKind::ObjectPattern { .. }));
}

#[test]
fn strict_mode_retroactive_duplicate_parameter() {
    let err = parse("function f(a, a) { \"use strict\"; }", ParserOptions::default())
        .expect_err("duplicate params become an error once strict");
    assert_eq!(err.code, arbor::ErrorCode::ParamDupe);
}

#[test]
fn error_recovery_produces_tree_and_errors() {
    let mut options = ParserOptions::default();
    options.error_recovery = true;
    let result = parse("const a = 1; const; let b = 2; b(;", options).expect("recovery mode");
    assert!(result.errors.len() >= 2);
    // The tree still contains the statements that parsed.
    let code = Codegen::new(&result.ast, CodegenOptions { minify: true, ..Default::default() })
        .generate()
        .code;
    assert!(code.contains("const a=1;"));
}

#[test]
fn placeholders_survive_the_pipeline() {
    let mut options = ParserOptions::default();
    options.capabilities = Capabilities { placeholders: true, ..Default::default() };
    let result = parse("const target = %%value%%;", options).expect("parse succeeds");
    let code = Codegen::new(&result.ast, CodegenOptions { minify: true, ..Default::default() })
        .generate()
        .code;
    assert_eq!(code, "const target=%%value%%;");
}

#[test]
fn module_source_type_detection() {
    let mut options = ParserOptions::default();
    options.source_type = SourceType::Unambiguous;
    let result = parse("export const a = 1;", options).expect("parse succeeds");
    let NodeKind::Program { source_type, .. } = result.ast.kind(result.ast.root) else { panic!() };
    assert_eq!(*source_type, SourceType::Module);
}

#[test]
fn transform_error_carries_plugin_and_file() {
    let mut visitor = Visitor::new();
    visitor.on_enter("Identifier", |_, _| Err("deliberate failure".into()));
    let mut runner = PassRunner::new().with_filename("lib/util.js");
    runner.add_pass(Pass::new(vec![Plugin::new("failing-plugin").with_visitor(visitor)]));

    let err = transform(
        "id;",
        ParserOptions::default(),
        &runner,
        CodegenOptions::default(),
    )
    .expect_err("plugin failure propagates");
    let message = err.to_string();
    assert!(message.contains("failing-plugin"));
    assert!(message.contains("lib/util.js"));
}
