//! Scope/binding index invariants exercised through the public API.

use arbor::{parse, Ast, NodeKind, ParserOptions, ScopeId, ScopeIndex};

fn crawl(source: &str) -> (Ast, ScopeIndex, ScopeId) {
    let result = parse(source, ParserOptions::default()).expect("parse succeeds");
    let mut index = ScopeIndex::new();
    let root = index.crawl(&result.ast, result.ast.root).expect("crawl succeeds");
    (result.ast, index, root)
}

fn nth_stmt(ast: &Ast, n: usize) -> arbor::NodeId {
    match ast.kind(ast.root) {
        NodeKind::Program { body, .. } => body[n],
        _ => panic!("expected program"),
    }
}

#[test]
fn constant_violation_add_and_remove_are_symmetric() {
    let (ast, mut index, root) = crawl("var a = 1; a = 2;");
    {
        let (_, binding) = index.get_binding(root, "a").unwrap();
        assert!(!binding.constant());
        assert_eq!(binding.violations.len(), 1);
    }

    index.remove_subtree(&ast, nth_stmt(&ast, 1));

    let (_, binding) = index.get_binding(root, "a").unwrap();
    assert!(binding.constant());
    assert_eq!(binding.violations.len(), 0);
}

#[test]
fn removed_binding_usages_become_globals() {
    let (_ast, mut index, root) = crawl("var lib; lib.init(); lib.run();");
    {
        let (_, binding) = index.get_binding(root, "lib").unwrap();
        assert_eq!(binding.references(), 2);
    }

    index.remove_binding(root, "lib");

    assert!(index.get_binding(root, "lib").is_none());
    assert!(index.has_global(root, "lib"));
    let implicit = index.get_implicit_binding("lib").unwrap();
    assert_eq!(implicit.usages.len(), 2);
}

#[test]
fn removed_shadow_reattaches_to_outer_binding() {
    let (ast, mut index, root) = crawl("let v = 0; function f() { let v = 1; v += 2; }");
    let f = nth_stmt(&ast, 1);
    // `let` is block-scoped: the inner binding lives on f's body block.
    let NodeKind::FunctionDeclaration { body: f_body, .. } = ast.kind(f).clone() else {
        panic!("expected function");
    };
    let body_scope = index.scope_of_node(f_body).expect("body scope exists");

    {
        let (_, outer) = index.get_binding(root, "v").unwrap();
        assert_eq!(outer.references(), 0);
    }

    index.remove_binding(body_scope, "v");

    // The inner `v += 2` write now resolves to the outer binding and
    // taints its constness.
    let (owner, outer) = index.get_binding(body_scope, "v").unwrap();
    assert_eq!(owner, root);
    assert_eq!(outer.references(), 1);
    assert!(!outer.constant());
}

#[test]
fn generate_uid_candidate_sequence() {
    let (_ast, mut index, root) = crawl("var _foo; var _foo1;");
    // `_foo` collides, `_foo2` is the first free candidate in the
    // `_name`, `_name2`, `_name3`... order. `_foo1` never blocks it.
    assert_eq!(index.generate_uid(root, "foo"), "_foo2");
}

#[test]
fn generate_uid_considers_enclosing_chain() {
    let (ast, mut index, _root) = crawl("var _id; function f() { function g() { leaf(); } }");
    let f = nth_stmt(&ast, 1);
    let f_scope = index.scope_of_node(f).expect("function scope");
    // From inside f, the program-level `_id` and the global `leaf`
    // reference are both visible collisions.
    assert_eq!(index.generate_uid(f_scope, "id"), "_id2");
    assert_eq!(index.generate_uid(f_scope, "leaf"), "_leaf");
    assert!(index.has_global(f_scope, "leaf"));
}

#[test]
fn is_pure_is_conservative() {
    let (ast, index, root) = crawl("const k = 1; k; unknown; f();");
    // Expression statements: k (bound, pure), unknown (free, impure),
    // f() (call, impure).
    let exprs: Vec<_> = (1..4)
        .map(|i| match ast.kind(nth_stmt(&ast, i)) {
            NodeKind::ExpressionStatement { expression } => *expression,
            other => panic!("unexpected {other:?}"),
        })
        .collect();
    assert!(index.is_pure(&ast, root, exprs[0], true));
    assert!(!index.is_pure(&ast, root, exprs[1], false));
    assert!(!index.is_pure(&ast, root, exprs[2], false));
}

#[test]
fn rename_is_hygienic() {
    let (mut ast, mut index, root) = crawl("let value = 1; report(value); value = 2;");
    index.rename(&mut ast, root, "value", "_v");

    let (_, binding) = index.get_binding(root, "_v").unwrap();
    assert_eq!(binding.references(), 2);
    assert!(!binding.constant());
    // Untouched names stay: `report` still resolves as a global.
    assert!(index.has_global(root, "report"));
}
