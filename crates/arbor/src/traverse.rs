//! Tree traversal with live mutation.
//!
//! A `Visitor` maps node-type keys (including `"A|B"` unions and type
//! aliases like `"Function"`) to enter/exit hooks. Before any traversal
//! the visitor is exploded once into a table indexed by the closed
//! `NodeType` enum, so per-node dispatch is a hash lookup.
//!
//! Traversal is depth-first, enter then children then exit, with
//! children visited in grammar key order. Hooks may mutate the tree
//! while it is being walked: replace the current node in place, remove
//! it, or insert siblings. After a replacement that changes the node's
//! type, the full merged enter set re-runs on the new content before any
//! descent — a plugin that rewrites an `A` into a `B` is guaranteed that
//! `B`'s visitors observe the result.

use crate::ast::{alias_members, Ast, NodeId, NodeKind, NodeType};
use crate::error::HookError;
use crate::scope::{Binding, ScopeId, ScopeIndex};
use rustc_hash::{FxHashMap, FxHashSet};
use std::any::Any;
use std::rc::Rc;
use thiserror::Error;

/// A visitor hook. The second argument is the per-plugin state supplied
/// when the traversal was started.
pub type VisitFn = Rc<dyn Fn(&mut Cursor<'_>, &mut dyn Any) -> Result<(), HookError>>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown visitor key \"{0}\"")]
pub struct VisitorKeyError(pub String);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Enter,
    Exit,
}

/// A visitor under construction: string-keyed, alias-friendly.
#[derive(Default, Clone)]
pub struct Visitor {
    entries: Vec<(String, Phase, VisitFn)>,
    /// Node types that must never be entered at all.
    pub denylist: Vec<String>,
}

impl Visitor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an enter hook for `key` (a node-type name, alias, or
    /// `"A|B"` union).
    pub fn on_enter<F>(&mut self, key: &str, f: F) -> &mut Self
    where
        F: Fn(&mut Cursor<'_>, &mut dyn Any) -> Result<(), HookError> + 'static,
    {
        self.entries.push((key.to_string(), Phase::Enter, Rc::new(f)));
        self
    }

    /// Register an exit hook for `key`.
    pub fn on_exit<F>(&mut self, key: &str, f: F) -> &mut Self
    where
        F: Fn(&mut Cursor<'_>, &mut dyn Any) -> Result<(), HookError> + 'static,
    {
        self.entries.push((key.to_string(), Phase::Exit, Rc::new(f)));
        self
    }

    pub fn deny(&mut self, key: &str) -> &mut Self {
        self.denylist.push(key.to_string());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty() && self.denylist.is_empty()
    }

    /// Clone this visitor with every hook passed through `wrap` (the
    /// pass runner uses this to tag hook failures with the plugin name).
    pub(crate) fn map_hooks<F>(&self, mut wrap: F) -> Visitor
    where
        F: FnMut(VisitFn) -> VisitFn,
    {
        Visitor {
            entries: self
                .entries
                .iter()
                .map(|(key, phase, f)| (key.clone(), *phase, wrap(Rc::clone(f))))
                .collect(),
            denylist: self.denylist.clone(),
        }
    }
}

#[derive(Clone)]
struct Hook {
    plugin: usize,
    f: VisitFn,
}

#[derive(Default, Clone)]
struct TypeHooks {
    enter: Vec<Hook>,
    exit: Vec<Hook>,
}

/// A normalized dispatch table: every alias and `|` union expanded to
/// concrete node types, hook order preserved.
#[derive(Default, Clone)]
pub struct ExplodedVisitor {
    table: FxHashMap<NodeType, TypeHooks>,
    denylist: FxHashSet<NodeType>,
}

impl ExplodedVisitor {
    /// Explode and merge visitors. Each visitor's hooks carry the index
    /// of the plugin (and therefore state slot) they belong to; hooks
    /// for the same node type keep declaration order across plugins, for
    /// enter and exit alike.
    pub fn build(visitors: &[(usize, &Visitor)]) -> Result<Self, VisitorKeyError> {
        let mut exploded = ExplodedVisitor::default();
        for (plugin, visitor) in visitors {
            for (key, phase, f) in &visitor.entries {
                for ty in resolve_key(key)? {
                    let hooks = exploded.table.entry(ty).or_default();
                    let hook = Hook { plugin: *plugin, f: Rc::clone(f) };
                    match phase {
                        Phase::Enter => hooks.enter.push(hook),
                        Phase::Exit => hooks.exit.push(hook),
                    }
                }
            }
            for key in &visitor.denylist {
                for ty in resolve_key(key)? {
                    exploded.denylist.insert(ty);
                }
            }
        }
        Ok(exploded)
    }
}

/// Resolve one visitor key to concrete node types.
fn resolve_key(key: &str) -> Result<Vec<NodeType>, VisitorKeyError> {
    let mut out = Vec::new();
    for part in key.split('|') {
        let part = part.trim();
        if let Some(ty) = NodeType::from_name(part) {
            out.push(ty);
        } else if let Some(members) = alias_members(part) {
            out.extend(members);
        } else {
            return Err(VisitorKeyError(part.to_string()));
        }
    }
    Ok(out)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Normal,
    Skip,
    Removed,
    Stop,
}

#[derive(Debug, Clone, Copy)]
struct PathEntry {
    node: NodeId,
    key: &'static str,
    index: Option<usize>,
}

/// The traversal cursor handed to hooks: the current node, its path to
/// the root, and the mutation and scope query surface.
pub struct Cursor<'a> {
    pub ast: &'a mut Ast,
    scopes: Option<&'a mut ScopeIndex>,
    visitor: &'a ExplodedVisitor,
    states: Vec<Box<dyn Any>>,
    path: Vec<PathEntry>,
    flow: Flow,
}

impl<'a> Cursor<'a> {
    // =========================================================================
    // Introspection
    // =========================================================================

    /// The node currently being visited.
    pub fn node(&self) -> NodeId {
        self.path.last().expect("cursor is positioned on a node").node
    }

    pub fn node_type(&self) -> NodeType {
        self.ast.node_type(self.node())
    }

    pub fn kind(&self) -> &NodeKind {
        self.ast.kind(self.node())
    }

    /// The parent node, if the cursor is not at the traversal root.
    pub fn parent(&self) -> Option<NodeId> {
        let len = self.path.len();
        (len >= 2).then(|| self.path[len - 2].node)
    }

    /// The key this node is reached by from its parent.
    pub fn parent_key(&self) -> &'static str {
        self.path.last().expect("cursor is positioned on a node").key
    }

    /// Get a child of the current node by key (first entry for list
    /// keys).
    pub fn child(&self, key: &str) -> Option<NodeId> {
        self.ast
            .children(self.node())
            .into_iter()
            .find(|c| c.key == key)
            .map(|c| c.id)
    }

    // =========================================================================
    // Mutation
    // =========================================================================

    /// Replace the current node's content in place. The node keeps its
    /// identity: every external `NodeId` referring to it observes the
    /// new content. If the replacement changes the node's type, the
    /// merged enter hooks re-run on it before any children are visited.
    pub fn replace_with(&mut self, kind: NodeKind) {
        let node = self.node();
        self.ast.replace_kind(node, kind);
        if let Some(scopes) = self.scopes.as_deref_mut() {
            scopes.invalidate(node);
        }
    }

    /// Detach the current node from its parent and skip its subtree.
    /// Fails when the node occupies a required child slot (replace it
    /// instead).
    pub fn remove(&mut self) -> Result<(), HookError> {
        let node = self.node();
        let Some(parent) = self.parent() else {
            return Err("cannot remove the traversal root".into());
        };
        let slot = self
            .ast
            .children(parent)
            .into_iter()
            .find(|c| c.id == node)
            .ok_or("node is already detached")?;
        if !self.ast.detach_child(parent, slot.key, slot.index) {
            return Err(format!(
                "cannot remove required child \"{}\" of {}; replace it instead",
                slot.key,
                self.ast.node_type(parent).name()
            )
            .into());
        }
        if let Some(scopes) = self.scopes.as_deref_mut() {
            scopes.remove_subtree(self.ast, node);
        }
        self.flow = Flow::Removed;
        Ok(())
    }

    /// Insert a synthesized sibling before the current node. Only valid
    /// while the current node sits in a list child slot. The walk has
    /// already passed the insertion point, so the new node is not
    /// visited in this traversal.
    pub fn insert_before(&mut self, kind: NodeKind) -> Result<NodeId, HookError> {
        self.insert_sibling(kind, 0)
    }

    /// Insert a synthesized sibling after the current node. The walk
    /// reaches it after the current subtree completes.
    pub fn insert_after(&mut self, kind: NodeKind) -> Result<NodeId, HookError> {
        self.insert_sibling(kind, 1)
    }

    fn insert_sibling(&mut self, kind: NodeKind, offset: usize) -> Result<NodeId, HookError> {
        let node = self.node();
        let Some(parent) = self.parent() else {
            return Err("cannot insert a sibling of the traversal root".into());
        };
        let slot = self
            .ast
            .children(parent)
            .into_iter()
            .find(|c| c.id == node)
            .ok_or("node is already detached")?;
        let Some(index) = slot.index else {
            return Err(format!(
                "cannot insert a sibling into non-list child \"{}\" of {}",
                slot.key,
                self.ast.node_type(parent).name()
            )
            .into());
        };
        let new_id = self.ast.synth(kind);
        if !self.ast.insert_child(parent, slot.key, index + offset, new_id) {
            return Err("sibling insertion failed".into());
        }
        Ok(new_id)
    }

    /// Skip the current subtree: children are not visited, sibling
    /// traversal continues.
    pub fn skip(&mut self) {
        if self.flow == Flow::Normal {
            self.flow = Flow::Skip;
        }
    }

    /// Stop the whole traversal; unwinds immediately.
    pub fn stop(&mut self) {
        self.flow = Flow::Stop;
    }

    // =========================================================================
    // Scope queries
    // =========================================================================

    /// The scope enclosing the current node: the nearest ancestor (or
    /// the node itself) that introduces a scope. Memoized per node in
    /// the scope index's cache.
    pub fn scope(&mut self) -> Option<ScopeId> {
        let node = self.node();
        let scopes = self.scopes.as_deref()?;
        let mut found = None;
        for entry in self.path.iter().rev() {
            if let Some(scope) = scopes.scope_of_node(entry.node) {
                found = Some(scope);
                break;
            }
        }
        let found = found.or_else(|| scopes.root())?;
        if let Some(scopes) = self.scopes.as_deref_mut() {
            scopes.cache_node_scope(node, found);
        }
        Some(found)
    }

    /// Resolve a name against the enclosing scope chain.
    pub fn get_binding(&mut self, name: &str) -> Option<(ScopeId, &Binding)> {
        let scope = self.scope()?;
        self.scopes.as_deref()?.get_binding(scope, name)
    }

    /// Generate an identifier unique across the enclosing scope chain.
    pub fn generate_uid(&mut self, base: &str) -> Option<String> {
        let scope = self.scope()?;
        let scopes = self.scopes.as_deref_mut()?;
        Some(scopes.generate_uid(scope, base))
    }

    /// Conservative purity check for a node, resolved against the
    /// current scope.
    pub fn is_pure(&mut self, node: NodeId, constants_only: bool) -> bool {
        let Some(scope) = self.scope() else { return false };
        let Some(scopes) = self.scopes.as_deref() else { return false };
        scopes.is_pure(self.ast, scope, node, constants_only)
    }

    /// Whether a node is a consequenceless reference.
    pub fn is_static(&mut self, node: NodeId) -> bool {
        let Some(scope) = self.scope() else { return false };
        let Some(scopes) = self.scopes.as_deref() else { return false };
        scopes.is_static(self.ast, scope, node)
    }

    pub fn scope_index(&mut self) -> Option<&mut ScopeIndex> {
        self.scopes.as_deref_mut()
    }

    /// Hygienically rename the binding `old` (resolved from the current
    /// scope) and all of its usages.
    pub fn rename_binding(&mut self, old: &str, new_name: &str) {
        let Some(scope) = self.scope() else { return };
        if let Some(scopes) = self.scopes.as_deref_mut() {
            scopes.rename(self.ast, scope, old, new_name);
        }
    }

    // =========================================================================
    // Walk
    // =========================================================================

    fn visit_node(
        &mut self,
        node: NodeId,
        key: &'static str,
        index: Option<usize>,
    ) -> Result<(), HookError> {
        let mut ty = self.ast.node_type(node);
        if self.visitor.denylist.contains(&ty) {
            return Ok(());
        }

        self.path.push(PathEntry { node, key, index });

        // Enter hooks, re-dispatching from the top whenever a hook
        // replaces the node with a different type.
        'dispatch: loop {
            let enter: Vec<Hook> = self
                .visitor
                .table
                .get(&ty)
                .map(|h| h.enter.clone())
                .unwrap_or_default();
            for hook in &enter {
                self.run_hook(hook)?;
                match self.flow {
                    Flow::Stop => {
                        self.path.pop();
                        return Ok(());
                    }
                    Flow::Removed => {
                        self.path.pop();
                        return Ok(());
                    }
                    _ => {}
                }
                let new_ty = self.ast.node_type(node);
                if new_ty != ty {
                    ty = new_ty;
                    if self.visitor.denylist.contains(&ty) {
                        self.path.pop();
                        return Ok(());
                    }
                    continue 'dispatch;
                }
            }
            break;
        }

        if self.flow == Flow::Skip {
            self.flow = Flow::Normal;
            self.path.pop();
            return Ok(());
        }

        // Children, re-reading the child list around every visit so
        // sibling mutations are honored.
        let mut i = 0;
        loop {
            let children = self.ast.children(node);
            let Some(child) = children.get(i).copied() else { break };
            self.visit_node(child.id, child.key, child.index)?;
            match self.flow {
                Flow::Stop => {
                    self.path.pop();
                    return Ok(());
                }
                Flow::Removed => {
                    // The slot at `i` now holds the next child.
                    self.flow = Flow::Normal;
                }
                _ => {
                    let children_now = self.ast.children(node);
                    match children_now.iter().position(|c| c.id == child.id) {
                        Some(pos) => i = pos + 1,
                        None => {} // replaced away; revisit the slot
                    }
                }
            }
        }

        // Exit hooks run in the same declared order as enter.
        let exit: Vec<Hook> = self
            .visitor
            .table
            .get(&ty)
            .map(|h| h.exit.clone())
            .unwrap_or_default();
        for hook in &exit {
            self.run_hook(hook)?;
            if self.flow == Flow::Stop {
                break;
            }
        }

        self.path.pop();
        Ok(())
    }

    fn run_hook(&mut self, hook: &Hook) -> Result<(), HookError> {
        let mut state = std::mem::replace(&mut self.states[hook.plugin], Box::new(()));
        let result = (hook.f)(self, state.as_mut());
        self.states[hook.plugin] = state;
        result
    }
}

/// Traverse the subtree rooted at `root` with a single visitor and
/// state. Returns the state when the walk finishes (or stops).
///
/// Hook errors propagate unmodified; nothing is caught or retried here.
pub fn traverse(
    ast: &mut Ast,
    root: NodeId,
    visitor: &Visitor,
    scopes: Option<&mut ScopeIndex>,
    state: Box<dyn Any>,
) -> Result<Box<dyn Any>, HookError> {
    let exploded = ExplodedVisitor::build(&[(0, visitor)]).map_err(|e| Box::new(e) as HookError)?;
    let states = run_exploded(ast, root, &exploded, scopes, vec![state])?;
    Ok(states.into_iter().next().expect("one state in, one state out"))
}

/// Traverse with an already-merged visitor table and one state slot per
/// plugin. Used by the pass runner.
pub(crate) fn run_exploded(
    ast: &mut Ast,
    root: NodeId,
    visitor: &ExplodedVisitor,
    scopes: Option<&mut ScopeIndex>,
    states: Vec<Box<dyn Any>>,
) -> Result<Vec<Box<dyn Any>>, HookError> {
    let mut cursor = Cursor {
        ast,
        scopes,
        visitor,
        states,
        path: Vec::new(),
        flow: Flow::Normal,
    };
    cursor.visit_node(root, "root", None)?;
    Ok(cursor.states)
}

/// Whether a node of type `ty` occurs inside `root`, without descending
/// into denylisted subtrees.
pub fn has_type(ast: &mut Ast, root: NodeId, ty: NodeType, denylist: &[NodeType]) -> bool {
    if denylist.contains(&ast.node_type(root)) {
        return false;
    }
    if ast.node_type(root) == ty {
        return true;
    }

    let mut visitor = Visitor::new();
    let name = ty.name();
    visitor.on_enter(name, |cursor, state| {
        *state.downcast_mut::<bool>().expect("bool state") = true;
        cursor.stop();
        Ok(())
    });
    for denied in denylist {
        visitor.deny(denied.name());
    }

    match traverse(ast, root, &visitor, None, Box::new(false)) {
        Ok(state) => *state.downcast_ref::<bool>().expect("bool state"),
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::{Parser, ParserOptions};

    fn parse(source: &str) -> Ast {
        Parser::new(source, ParserOptions::default())
            .expect("valid options")
            .parse()
            .expect("parse succeeds")
            .ast
    }

    fn log_of(state: Box<dyn Any>) -> Vec<String> {
        *state.downcast::<Vec<String>>().expect("log state")
    }

    #[test]
    fn test_enter_exit_order() {
        let mut ast = parse("f(x);");
        let mut visitor = Visitor::new();
        visitor.on_enter("CallExpression", |_, state| {
            state.downcast_mut::<Vec<String>>().unwrap().push("enter call".into());
            Ok(())
        });
        visitor.on_exit("CallExpression", |_, state| {
            state.downcast_mut::<Vec<String>>().unwrap().push("exit call".into());
            Ok(())
        });
        visitor.on_enter("Identifier", |cursor, state| {
            let name = cursor.ast.ident_name(cursor.node()).unwrap_or_default().to_string();
            state.downcast_mut::<Vec<String>>().unwrap().push(format!("ident {name}"));
            Ok(())
        });
        let root = ast.root;
        let state = traverse(&mut ast, root, &visitor, None, Box::new(Vec::<String>::new())).unwrap();
        assert_eq!(
            log_of(state),
            vec!["enter call", "ident f", "ident x", "exit call"]
        );
    }

    #[test]
    fn test_reentrant_dispatch_after_replace() {
        // A hook turns a numeric literal into a string literal; the
        // string hook must observe the replaced node before descent.
        let mut ast = parse("1;");
        let mut visitor = Visitor::new();
        visitor.on_enter("NumericLiteral", |cursor, state| {
            state.downcast_mut::<Vec<String>>().unwrap().push("number".into());
            cursor.replace_with(NodeKind::StringLiteral { value: "one".into() });
            Ok(())
        });
        visitor.on_enter("StringLiteral", |_, state| {
            state.downcast_mut::<Vec<String>>().unwrap().push("string".into());
            Ok(())
        });
        let root = ast.root;
        let state = traverse(&mut ast, root, &visitor, None, Box::new(Vec::<String>::new())).unwrap();
        assert_eq!(log_of(state), vec!["number", "string"]);
    }

    #[test]
    fn test_skip_subtree() {
        let mut ast = parse("function f() { inner; } outer;");
        let mut visitor = Visitor::new();
        visitor.on_enter("FunctionDeclaration", |cursor, _| {
            cursor.skip();
            Ok(())
        });
        visitor.on_enter("Identifier", |cursor, state| {
            let name = cursor.ast.ident_name(cursor.node()).unwrap_or_default().to_string();
            state.downcast_mut::<Vec<String>>().unwrap().push(name);
            Ok(())
        });
        let root = ast.root;
        let state = traverse(&mut ast, root, &visitor, None, Box::new(Vec::<String>::new())).unwrap();
        assert_eq!(log_of(state), vec!["outer"]);
    }

    #[test]
    fn test_stop_unwinds_everything() {
        let mut ast = parse("a; b; c;");
        let mut visitor = Visitor::new();
        visitor.on_enter("Identifier", |cursor, state| {
            state.downcast_mut::<Vec<String>>().unwrap().push("seen".into());
            cursor.stop();
            Ok(())
        });
        let root = ast.root;
        let state = traverse(&mut ast, root, &visitor, None, Box::new(Vec::<String>::new())).unwrap();
        assert_eq!(log_of(state).len(), 1);
    }

    #[test]
    fn test_denylist() {
        let mut ast = parse("function f() { hidden; } visible;");
        let mut visitor = Visitor::new();
        visitor.deny("FunctionDeclaration");
        visitor.on_enter("Identifier", |cursor, state| {
            let name = cursor.ast.ident_name(cursor.node()).unwrap_or_default().to_string();
            state.downcast_mut::<Vec<String>>().unwrap().push(name);
            Ok(())
        });
        let root = ast.root;
        let state = traverse(&mut ast, root, &visitor, None, Box::new(Vec::<String>::new())).unwrap();
        assert_eq!(log_of(state), vec!["visible"]);
    }

    #[test]
    fn test_alias_and_union_keys() {
        let mut ast = parse("function f() {} const g = () => 1; 2;");
        let mut visitor = Visitor::new();
        visitor.on_enter("Function", |_, state| {
            state.downcast_mut::<Vec<String>>().unwrap().push("fn".into());
            Ok(())
        });
        visitor.on_enter("NumericLiteral|BooleanLiteral", |_, state| {
            state.downcast_mut::<Vec<String>>().unwrap().push("lit".into());
            Ok(())
        });
        let root = ast.root;
        let state = traverse(&mut ast, root, &visitor, None, Box::new(Vec::<String>::new())).unwrap();
        let log = log_of(state);
        assert_eq!(log.iter().filter(|s| *s == "fn").count(), 2);
        assert_eq!(log.iter().filter(|s| *s == "lit").count(), 2);
    }

    #[test]
    fn test_unknown_key_rejected() {
        let mut ast = parse(";");
        let mut visitor = Visitor::new();
        visitor.on_enter("NotANode", |_, _| Ok(()));
        let root = ast.root;
        let err = traverse(&mut ast, root, &visitor, None, Box::new(())).unwrap_err();
        assert!(err.to_string().contains("NotANode"));
    }

    #[test]
    fn test_remove_statement_continues_with_siblings() {
        let mut ast = parse("drop; keep;");
        let mut visitor = Visitor::new();
        visitor.on_enter("ExpressionStatement", |cursor, _| {
            let expr = cursor.child("expression").unwrap();
            if cursor.ast.ident_name(expr) == Some("drop") {
                cursor.remove()?;
            }
            Ok(())
        });
        visitor.on_enter("Identifier", |cursor, state| {
            let name = cursor.ast.ident_name(cursor.node()).unwrap_or_default().to_string();
            state.downcast_mut::<Vec<String>>().unwrap().push(name);
            Ok(())
        });
        let root = ast.root;
        let state = traverse(&mut ast, root, &visitor, None, Box::new(Vec::<String>::new())).unwrap();
        assert_eq!(log_of(state), vec!["keep"]);
        let NodeKind::Program { body, .. } = ast.kind(ast.root) else { panic!() };
        assert_eq!(body.len(), 1);
    }

    #[test]
    fn test_remove_required_child_fails() {
        let mut ast = parse("throw x;");
        let mut visitor = Visitor::new();
        visitor.on_enter("Identifier", |cursor, _| cursor.remove());
        let root = ast.root;
        let err = traverse(&mut ast, root, &visitor, None, Box::new(())).unwrap_err();
        assert!(err.to_string().contains("required child"));
    }

    #[test]
    fn test_insert_after_is_visited() {
        let mut ast = parse("first;");
        let mut visitor = Visitor::new();
        visitor.on_enter("ExpressionStatement", |cursor, state| {
            let log = state.downcast_mut::<Vec<String>>().unwrap();
            log.push("stmt".into());
            if log.iter().filter(|s| *s == "stmt").count() == 1 {
                let expr = cursor.ast.synth(NodeKind::Identifier { name: "second".into() });
                cursor.insert_after(NodeKind::ExpressionStatement { expression: expr })?;
            }
            Ok(())
        });
        let root = ast.root;
        let state = traverse(&mut ast, root, &visitor, None, Box::new(Vec::<String>::new())).unwrap();
        assert_eq!(log_of(state), vec!["stmt", "stmt"]);
    }

    #[test]
    fn test_hook_error_propagates() {
        let mut ast = parse("x;");
        let mut visitor = Visitor::new();
        visitor.on_enter("Identifier", |_, _| Err("boom".into()));
        let root = ast.root;
        let err = traverse(&mut ast, root, &visitor, None, Box::new(())).unwrap_err();
        assert_eq!(err.to_string(), "boom");
    }

    #[test]
    fn test_scope_queries_through_cursor() {
        let mut ast = parse("const a = 1; function f() { a; }");
        let mut scopes = ScopeIndex::new();
        scopes.crawl(&ast, ast.root).unwrap();
        let mut visitor = Visitor::new();
        visitor.on_enter("Identifier", |cursor, state| {
            if cursor.ast.ident_name(cursor.node()) == Some("a") && cursor.parent_key() != "id" {
                let found = cursor.get_binding("a").is_some();
                state.downcast_mut::<Vec<String>>().unwrap().push(format!("binding:{found}"));
            }
            Ok(())
        });
        let root = ast.root;
        let state = traverse(
            &mut ast,
            root,
            &visitor,
            Some(&mut scopes),
            Box::new(Vec::<String>::new()),
        )
        .unwrap();
        let log = log_of(state);
        assert!(log.contains(&"binding:true".to_string()));
    }

    #[test]
    fn test_has_type_with_denylist() {
        let mut ast = parse("function f() { await; }");
        // `await` here parses as an identifier (sloppy script), so look
        // for something structural instead.
        let root = ast.root;
        assert!(has_type(&mut ast, root, NodeType::FunctionDeclaration, &[]));
        assert!(!has_type(
            &mut ast,
            root,
            NodeType::Identifier,
            &[NodeType::FunctionDeclaration]
        ));
    }

    #[test]
    fn test_removal_updates_scope_index() {
        let mut ast = parse("var a = 1; a = 2;");
        let mut scopes = ScopeIndex::new();
        let root_scope = scopes.crawl(&ast, ast.root).unwrap();
        {
            let (_, binding) = scopes.get_binding(root_scope, "a").unwrap();
            assert!(!binding.constant());
        }

        let mut visitor = Visitor::new();
        visitor.on_enter("ExpressionStatement", |cursor, _| {
            cursor.remove()?;
            Ok(())
        });
        let root = ast.root;
        traverse(&mut ast, root, &visitor, Some(&mut scopes), Box::new(())).unwrap();

        let (_, binding) = scopes.get_binding(root_scope, "a").unwrap();
        assert!(binding.constant());
        assert_eq!(binding.violations.len(), 0);
    }
}
