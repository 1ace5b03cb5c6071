//! Scope and binding analysis.
//!
//! The scope tree is arena-allocated (`Vec<Scope>` + `ScopeId`) and
//! indexes the node tree it was crawled from: declarations become
//! `Binding`s, identifier references become usages attached to the
//! binding they resolve to, and writes are tracked as constant
//! violations. Names that resolve to no binding anywhere up the chain
//! become implicit bindings owned by the program scope.
//!
//! The index is maintained incrementally: tree mutations call
//! `register_*`/`remove_*` so small edits never require a full
//! re-crawl. Removing a binding re-attaches its surviving usages to
//! whatever the name resolves to afterwards; usages are never orphaned
//! or double-counted.

use crate::ast::{Ast, BinaryOp, MethodKind, NodeId, NodeKind, VarKind};
use crate::error::ScopeError;
use rustc_hash::{FxHashMap, FxHashSet};
use tracing::debug;

/// Index of a scope in the arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ScopeId(pub u32);

impl ScopeId {
    #[inline]
    fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeKind {
    Program,
    Function,
    Block,
    Loop,
    Switch,
    Catch,
    Class,
    StaticBlock,
}

impl ScopeKind {
    /// Scopes that `var` and hoisted functions attach to.
    pub fn is_var_target(self) -> bool {
        matches!(self, ScopeKind::Program | ScopeKind::Function | ScopeKind::StaticBlock)
    }
}

/// How a name was declared.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindingKind {
    Var,
    Let,
    Const,
    Param,
    /// Import specifier.
    Module,
    /// Hoisted function declaration.
    Hoisted,
    /// Self-reference name of a function or class expression.
    Local,
    Unknown,
}

/// One recorded reference to a binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Usage {
    pub read: bool,
    pub write: bool,
    /// The scope the reference site sits in; reattachment re-resolves
    /// from here.
    pub scope: ScopeId,
}

/// A named declaration's metadata within a scope.
#[derive(Debug, Clone)]
pub struct Binding {
    /// The declared identifier node.
    pub identifier: NodeId,
    /// The declaring construct (declarator, function, specifier, ...).
    pub path: NodeId,
    pub kind: BindingKind,
    /// Reference-site identifier node -> usage info.
    pub usages: FxHashMap<NodeId, Usage>,
    /// Subset of usages that write; maps the reference site to the
    /// violating construct (assignment, update, ...).
    pub violations: FxHashMap<NodeId, NodeId>,
    /// Set when the binding is exported.
    pub export_path: Option<NodeId>,
}

impl Binding {
    fn new(identifier: NodeId, path: NodeId, kind: BindingKind) -> Self {
        Self {
            identifier,
            path,
            kind,
            usages: FxHashMap::default(),
            violations: FxHashMap::default(),
            export_path: None,
        }
    }

    /// A binding is constant while nothing reassigns it.
    pub fn constant(&self) -> bool {
        self.violations.is_empty()
    }

    /// Number of reference sites, plus one if exported.
    pub fn references(&self) -> usize {
        self.usages.len() + usize::from(self.export_path.is_some())
    }

    pub fn referenced(&self) -> bool {
        !self.usages.is_empty() || self.export_path.is_some()
    }

    fn register_usage(&mut self, id: NodeId, usage: Usage, violation: Option<NodeId>) {
        self.usages.insert(id, usage);
        if usage.write {
            if let Some(site) = violation {
                self.violations.insert(id, site);
            }
        }
    }

    fn remove_usage(&mut self, id: NodeId) -> bool {
        let removed = self.usages.remove(&id).is_some();
        self.violations.remove(&id);
        removed
    }
}

/// Usages of a name that resolved to no declaration; owned by the
/// program scope and dropped once its usage set empties.
#[derive(Debug, Clone, Default)]
pub struct ImplicitBinding {
    pub usages: FxHashMap<NodeId, Usage>,
    pub violations: FxHashMap<NodeId, NodeId>,
}

impl ImplicitBinding {
    pub fn referenced(&self) -> bool {
        !self.usages.is_empty()
    }

    pub fn constant(&self) -> bool {
        self.violations.is_empty()
    }
}

/// The lexical binding context attached to one scope-introducing node.
#[derive(Debug)]
pub struct Scope {
    pub node: NodeId,
    pub parent: Option<ScopeId>,
    pub kind: ScopeKind,
    /// Own declarations only.
    pub bindings: FxHashMap<String, Binding>,
    pub labels: FxHashMap<String, NodeId>,
    /// Free names first seen here (program scope only in practice).
    pub globals: FxHashMap<String, NodeId>,
    /// Names known to be used somewhere at or below this scope; consulted
    /// by unique-name generation.
    pub references: FxHashSet<String>,
    /// Names produced by `generate_uid`.
    pub uids: FxHashSet<String>,
    pub implicit: FxHashMap<String, ImplicitBinding>,
    /// Usages that passed through this scope unresolved, kept so a
    /// later-registered binding can capture them.
    seen_usages: FxHashMap<String, FxHashMap<NodeId, (Usage, Option<NodeId>)>>,
}

impl Scope {
    fn new(node: NodeId, kind: ScopeKind, parent: Option<ScopeId>) -> Self {
        Self {
            node,
            parent,
            kind,
            bindings: FxHashMap::default(),
            labels: FxHashMap::default(),
            globals: FxHashMap::default(),
            references: FxHashSet::default(),
            uids: FxHashSet::default(),
            implicit: FxHashMap::default(),
            seen_usages: FxHashMap::default(),
        }
    }
}

/// Names always visible in a JavaScript environment; unique-name
/// generation refuses to collide with them.
const CONTEXT_VARIABLES: &[&str] = &["arguments", "undefined", "Infinity", "NaN"];

const WELL_KNOWN_GLOBALS: &[&str] = &[
    "Array", "ArrayBuffer", "BigInt", "Boolean", "DataView", "Date", "Error", "EvalError",
    "Function", "JSON", "Map", "Math", "Number", "Object", "Promise", "Proxy", "RangeError",
    "ReferenceError", "Reflect", "RegExp", "Set", "String", "Symbol", "SyntaxError", "TypeError",
    "URIError", "WeakMap", "WeakSet", "console", "decodeURI", "decodeURIComponent", "encodeURI",
    "encodeURIComponent", "eval", "globalThis", "isFinite", "isNaN", "parseFloat", "parseInt",
];

/// Walk context: the scopes relevant to registration decisions.
#[derive(Clone, Copy)]
struct Ctx {
    program: ScopeId,
    function: ScopeId,
    block: ScopeId,
}

/// The scope tree for one node tree.
#[derive(Debug, Default)]
pub struct ScopeIndex {
    scopes: Vec<Scope>,
    /// Scope cache keyed by node identity.
    by_node: FxHashMap<NodeId, ScopeId>,
    root: Option<ScopeId>,
}

impl ScopeIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn root(&self) -> Option<ScopeId> {
        self.root
    }

    pub fn scope(&self, id: ScopeId) -> &Scope {
        &self.scopes[id.index()]
    }

    fn scope_mut(&mut self, id: ScopeId) -> &mut Scope {
        &mut self.scopes[id.index()]
    }

    /// The scope introduced by `node`, if it is a scope-introducing node
    /// that has been crawled (or the memoized scope of a visited node).
    pub fn scope_of_node(&self, node: NodeId) -> Option<ScopeId> {
        self.by_node.get(&node).copied()
    }

    /// Memoize the scope a node was visited under.
    pub fn cache_node_scope(&mut self, node: NodeId, scope: ScopeId) {
        self.by_node.insert(node, scope);
    }

    /// Drop the cached scope association for a node (after it moved).
    pub fn invalidate(&mut self, node: NodeId) {
        self.by_node.remove(&node);
    }

    fn new_scope(&mut self, node: NodeId, kind: ScopeKind, parent: Option<ScopeId>) -> ScopeId {
        let id = ScopeId(self.scopes.len() as u32);
        self.scopes.push(Scope::new(node, kind, parent));
        self.by_node.insert(node, id);
        id
    }

    // =========================================================================
    // Crawl
    // =========================================================================

    /// Build the whole scope tree for the subtree rooted at `root` in one
    /// pass, replacing any previous index contents.
    pub fn crawl(&mut self, ast: &Ast, root: NodeId) -> Result<ScopeId, ScopeError> {
        self.scopes.clear();
        self.by_node.clear();
        let program = self.new_scope(root, ScopeKind::Program, None);
        self.root = Some(program);
        let ctx = Ctx { program, function: program, block: program };
        for child in ast.children(root) {
            self.collect(ast, child.id, ctx)?;
        }
        debug!(scopes = self.scopes.len(), "scope crawl complete");
        Ok(program)
    }

    fn collect(&mut self, ast: &Ast, node: NodeId, ctx: Ctx) -> Result<(), ScopeError> {
        match ast.kind(node) {
            // === Referenced identifier ===
            NodeKind::Identifier { .. } => {
                self.register_usage(
                    ast,
                    ctx.block,
                    node,
                    Usage { read: true, write: false, scope: ctx.block },
                    None,
                );
                Ok(())
            }

            // === Declarations ===
            NodeKind::VariableDeclaration { kind, declarations } => {
                let (target, bkind) = match kind {
                    VarKind::Var => (ctx.function, BindingKind::Var),
                    VarKind::Let => (ctx.block, BindingKind::Let),
                    VarKind::Const => (ctx.block, BindingKind::Const),
                };
                for decl in declarations {
                    if let NodeKind::VariableDeclarator { id, init } = ast.kind(*decl) {
                        self.register_pattern_bindings(ast, target, ctx, bkind, *id, *decl)?;
                        self.collect_pattern_extras(ast, *id, ctx)?;
                        if let Some(init) = init {
                            self.collect(ast, *init, ctx)?;
                        }
                    }
                }
                Ok(())
            }

            NodeKind::FunctionDeclaration { id, params, body, .. } => {
                if let Some(id) = id {
                    self.register_binding_ident(ast, ctx.function, ctx, BindingKind::Hoisted, *id, node)?;
                }
                self.collect_function(ast, node, None, params, *body, ctx)
            }

            NodeKind::FunctionExpression { id, params, body, .. } => {
                self.collect_function(ast, node, *id, params, *body, ctx)
            }

            NodeKind::ArrowFunctionExpression { params, body, .. } => {
                self.collect_function(ast, node, None, params, *body, ctx)
            }

            NodeKind::ClassDeclaration { id, super_class, body, decorators } => {
                if let Some(id) = id {
                    self.register_binding_ident(ast, ctx.block, ctx, BindingKind::Let, *id, node)?;
                }
                self.collect_class(ast, node, None, *super_class, body, decorators, ctx)
            }

            NodeKind::ClassExpression { id, super_class, body, decorators } => {
                self.collect_class(ast, node, *id, *super_class, body, decorators, ctx)
            }

            NodeKind::ObjectMethod { key, params, body, computed, .. }
            | NodeKind::ClassMethod { key, params, body, computed, .. } => {
                if *computed {
                    self.collect(ast, *key, ctx)?;
                }
                self.collect_function(ast, node, None, params, *body, ctx)
            }

            NodeKind::StaticBlock { body } => {
                let scope = self.new_scope(node, ScopeKind::StaticBlock, Some(ctx.block));
                let inner = Ctx { program: ctx.program, function: scope, block: scope };
                for stmt in body {
                    self.collect(ast, *stmt, inner)?;
                }
                Ok(())
            }

            // === Scope-introducing statements ===
            NodeKind::BlockStatement { body } => {
                let scope = self.new_scope(node, ScopeKind::Block, Some(ctx.block));
                let inner = Ctx { block: scope, ..ctx };
                for stmt in body {
                    self.collect(ast, *stmt, inner)?;
                }
                Ok(())
            }

            NodeKind::SwitchStatement { discriminant, cases } => {
                self.collect(ast, *discriminant, ctx)?;
                let scope = self.new_scope(node, ScopeKind::Switch, Some(ctx.block));
                let inner = Ctx { block: scope, ..ctx };
                for case in cases {
                    self.collect(ast, *case, inner)?;
                }
                Ok(())
            }

            NodeKind::ForStatement { .. }
            | NodeKind::ForInStatement { .. }
            | NodeKind::ForOfStatement { .. }
            | NodeKind::WhileStatement { .. }
            | NodeKind::DoWhileStatement { .. } => self.collect_loop(ast, node, ctx),

            NodeKind::CatchClause { param, body } => {
                let scope = self.new_scope(node, ScopeKind::Catch, Some(ctx.block));
                let inner = Ctx { block: scope, ..ctx };
                if let Some(param) = param {
                    self.register_pattern_bindings(ast, scope, inner, BindingKind::Let, *param, node)?;
                    self.collect_pattern_extras(ast, *param, inner)?;
                }
                self.collect(ast, *body, inner)
            }

            // === Writes ===
            NodeKind::AssignmentExpression { op, left, right } => {
                let compound = *op != crate::ast::AssignOp::Assign;
                self.collect_assignment_target(ast, *left, node, compound, ctx)?;
                self.collect(ast, *right, ctx)
            }

            NodeKind::UpdateExpression { argument, .. } => {
                if matches!(ast.kind(*argument), NodeKind::Identifier { .. }) {
                    self.register_usage(
                        ast,
                        ctx.block,
                        *argument,
                        Usage { read: true, write: true, scope: ctx.block },
                        Some(node),
                    );
                    Ok(())
                } else {
                    self.collect(ast, *argument, ctx)
                }
            }

            NodeKind::UnaryExpression { op: crate::ast::UnaryOp::Delete, argument } => {
                if matches!(ast.kind(*argument), NodeKind::Identifier { .. }) {
                    self.register_usage(
                        ast,
                        ctx.block,
                        *argument,
                        Usage { read: true, write: true, scope: ctx.block },
                        Some(node),
                    );
                    Ok(())
                } else {
                    self.collect(ast, *argument, ctx)
                }
            }

            // === Non-referenced identifier positions ===
            NodeKind::MemberExpression { object, property, computed, .. } => {
                self.collect(ast, *object, ctx)?;
                if *computed {
                    self.collect(ast, *property, ctx)?;
                }
                Ok(())
            }

            NodeKind::ObjectProperty { key, value, computed, .. } => {
                if *computed {
                    self.collect(ast, *key, ctx)?;
                }
                self.collect(ast, *value, ctx)
            }

            NodeKind::ClassProperty { key, value, computed, decorators, .. } => {
                for dec in decorators {
                    self.collect(ast, *dec, ctx)?;
                }
                if *computed {
                    self.collect(ast, *key, ctx)?;
                }
                if let Some(value) = value {
                    self.collect(ast, *value, ctx)?;
                }
                Ok(())
            }

            NodeKind::LabeledStatement { label, body } => {
                if let Some(name) = ast.ident_name(*label) {
                    let name = name.to_string();
                    self.scope_mut(ctx.block).labels.insert(name, *label);
                }
                self.collect(ast, *body, ctx)
            }

            NodeKind::BreakStatement { .. } | NodeKind::ContinueStatement { .. } => Ok(()),

            NodeKind::MetaProperty { .. } | NodeKind::Placeholder { .. } => Ok(()),

            // === Modules ===
            NodeKind::ImportDeclaration { specifiers, .. } => {
                for spec in specifiers {
                    for local in ast.binding_identifiers(*spec) {
                        self.register_binding_ident(ast, ctx.program, ctx, BindingKind::Module, local, *spec)?;
                    }
                }
                Ok(())
            }

            NodeKind::ExportNamedDeclaration { declaration, specifiers, source } => {
                if let Some(decl) = declaration {
                    self.collect(ast, *decl, ctx)?;
                    for ident in ast.binding_identifiers(*decl) {
                        if let Some(name) = ast.ident_name(ident) {
                            let name = name.to_string();
                            self.register_export(ctx.program, &name, node);
                        }
                    }
                }
                // Re-exports (`export {a} from "m"`) reference the other
                // module, not local bindings.
                if source.is_none() {
                    for spec in specifiers {
                        if let NodeKind::ExportSpecifier { local, .. } = ast.kind(*spec) {
                            if let Some(name) = ast.ident_name(*local) {
                                let name = name.to_string();
                                self.register_export(ctx.program, &name, node);
                            }
                        }
                    }
                }
                Ok(())
            }

            NodeKind::ExportDefaultDeclaration { declaration } => {
                self.collect(ast, *declaration, ctx)?;
                for ident in ast.binding_identifiers(*declaration) {
                    if let Some(name) = ast.ident_name(ident) {
                        let name = name.to_string();
                        self.register_export(ctx.program, &name, node);
                    }
                }
                Ok(())
            }

            NodeKind::ExportAllDeclaration { .. } => Ok(()),
            NodeKind::ImportSpecifier { .. }
            | NodeKind::ImportDefaultSpecifier { .. }
            | NodeKind::ImportNamespaceSpecifier { .. }
            | NodeKind::ExportSpecifier { .. } => Ok(()),

            // === Everything else: structural recursion ===
            _ => {
                for child in ast.children(node) {
                    self.collect(ast, child.id, ctx)?;
                }
                Ok(())
            }
        }
    }

    fn collect_loop(&mut self, ast: &Ast, node: NodeId, ctx: Ctx) -> Result<(), ScopeError> {
        let scope = self.new_scope(node, ScopeKind::Loop, Some(ctx.block));
        let inner = Ctx { block: scope, ..ctx };
        match ast.kind(node) {
            NodeKind::ForStatement { init, test, update, body } => {
                if let Some(init) = init {
                    self.collect(ast, *init, inner)?;
                }
                if let Some(test) = test {
                    self.collect(ast, *test, inner)?;
                }
                if let Some(update) = update {
                    self.collect(ast, *update, inner)?;
                }
                self.collect(ast, *body, inner)
            }
            NodeKind::ForInStatement { left, right, body }
            | NodeKind::ForOfStatement { left, right, body, .. } => {
                if matches!(ast.kind(*left), NodeKind::VariableDeclaration { .. }) {
                    self.collect(ast, *left, inner)?;
                } else {
                    // Assigning loop head: every iteration writes the
                    // target.
                    self.collect_assignment_target(ast, *left, node, false, inner)?;
                }
                self.collect(ast, *right, inner)?;
                self.collect(ast, *body, inner)
            }
            NodeKind::WhileStatement { test, body } => {
                self.collect(ast, *test, inner)?;
                self.collect(ast, *body, inner)
            }
            NodeKind::DoWhileStatement { body, test } => {
                self.collect(ast, *body, inner)?;
                self.collect(ast, *test, inner)
            }
            _ => Ok(()),
        }
    }

    fn collect_function(
        &mut self,
        ast: &Ast,
        node: NodeId,
        expr_name: Option<NodeId>,
        params: &[NodeId],
        body: NodeId,
        ctx: Ctx,
    ) -> Result<(), ScopeError> {
        let scope = self.new_scope(node, ScopeKind::Function, Some(ctx.block));
        let inner = Ctx { program: ctx.program, function: scope, block: scope };
        // A function expression's name is visible inside its own body
        // only.
        if let Some(name_id) = expr_name {
            self.register_binding_ident(ast, scope, inner, BindingKind::Local, name_id, node)?;
        }
        for param in params {
            self.register_pattern_bindings(ast, scope, inner, BindingKind::Param, *param, node)?;
            self.collect_pattern_extras(ast, *param, inner)?;
        }
        self.collect(ast, body, inner)
    }

    #[allow(clippy::too_many_arguments)]
    fn collect_class(
        &mut self,
        ast: &Ast,
        node: NodeId,
        expr_name: Option<NodeId>,
        super_class: Option<NodeId>,
        body: &[NodeId],
        decorators: &[NodeId],
        ctx: Ctx,
    ) -> Result<(), ScopeError> {
        for dec in decorators {
            self.collect(ast, *dec, ctx)?;
        }
        if let Some(sc) = super_class {
            self.collect(ast, sc, ctx)?;
        }
        let scope = self.new_scope(node, ScopeKind::Class, Some(ctx.block));
        let inner = Ctx { block: scope, ..ctx };
        if let Some(name_id) = expr_name {
            self.register_binding_ident(ast, scope, inner, BindingKind::Local, name_id, node)?;
        }
        for member in body {
            self.collect(ast, *member, inner)?;
        }
        Ok(())
    }

    /// Default values and computed keys inside a binding pattern are
    /// ordinary expressions and their identifiers are references.
    fn collect_pattern_extras(&mut self, ast: &Ast, pattern: NodeId, ctx: Ctx) -> Result<(), ScopeError> {
        match ast.kind(pattern) {
            NodeKind::Identifier { .. } | NodeKind::Placeholder { .. } => Ok(()),
            NodeKind::AssignmentPattern { left, right } => {
                self.collect_pattern_extras(ast, *left, ctx)?;
                self.collect(ast, *right, ctx)
            }
            NodeKind::ObjectPattern { properties } => {
                for prop in properties {
                    match ast.kind(*prop) {
                        NodeKind::ObjectProperty { key, value, computed, .. } => {
                            if *computed {
                                self.collect(ast, *key, ctx)?;
                            }
                            self.collect_pattern_extras(ast, *value, ctx)?;
                        }
                        NodeKind::RestElement { argument } => {
                            self.collect_pattern_extras(ast, *argument, ctx)?;
                        }
                        _ => {}
                    }
                }
                Ok(())
            }
            NodeKind::ArrayPattern { elements } => {
                for elem in elements.iter().flatten() {
                    self.collect_pattern_extras(ast, *elem, ctx)?;
                }
                Ok(())
            }
            NodeKind::RestElement { argument } => self.collect_pattern_extras(ast, *argument, ctx),
            // Destructuring assignment targets may contain member
            // expressions.
            _ => self.collect(ast, pattern, ctx),
        }
    }

    /// Register every write implied by an assignment target, then collect
    /// the non-binding parts (member expressions, defaults) as reads.
    fn collect_assignment_target(
        &mut self,
        ast: &Ast,
        target: NodeId,
        violation_site: NodeId,
        compound: bool,
        ctx: Ctx,
    ) -> Result<(), ScopeError> {
        for ident in ast.binding_identifiers(target) {
            self.register_usage(
                ast,
                ctx.block,
                ident,
                Usage { read: compound, write: true, scope: ctx.block },
                Some(violation_site),
            );
        }
        match ast.kind(target) {
            NodeKind::Identifier { .. } => Ok(()),
            NodeKind::MemberExpression { .. } => self.collect(ast, target, ctx),
            _ => self.collect_pattern_extras_skipping_idents(ast, target, ctx),
        }
    }

    /// Like `collect_pattern_extras`, for targets whose identifiers were
    /// already registered as writes.
    fn collect_pattern_extras_skipping_idents(
        &mut self,
        ast: &Ast,
        pattern: NodeId,
        ctx: Ctx,
    ) -> Result<(), ScopeError> {
        match ast.kind(pattern) {
            NodeKind::Identifier { .. } | NodeKind::Placeholder { .. } => Ok(()),
            NodeKind::MemberExpression { .. } => self.collect(ast, pattern, ctx),
            NodeKind::AssignmentPattern { left, right } => {
                self.collect_pattern_extras_skipping_idents(ast, *left, ctx)?;
                self.collect(ast, *right, ctx)
            }
            NodeKind::ObjectPattern { properties } => {
                for prop in properties {
                    match ast.kind(*prop) {
                        NodeKind::ObjectProperty { key, value, computed, .. } => {
                            if *computed {
                                self.collect(ast, *key, ctx)?;
                            }
                            self.collect_pattern_extras_skipping_idents(ast, *value, ctx)?;
                        }
                        NodeKind::RestElement { argument } => {
                            self.collect_pattern_extras_skipping_idents(ast, *argument, ctx)?;
                        }
                        _ => {}
                    }
                }
                Ok(())
            }
            NodeKind::ArrayPattern { elements } => {
                for elem in elements.iter().flatten() {
                    self.collect_pattern_extras_skipping_idents(ast, *elem, ctx)?;
                }
                Ok(())
            }
            NodeKind::RestElement { argument } => {
                self.collect_pattern_extras_skipping_idents(ast, *argument, ctx)
            }
            _ => self.collect(ast, pattern, ctx),
        }
    }

    // =========================================================================
    // Registration
    // =========================================================================

    fn register_pattern_bindings(
        &mut self,
        ast: &Ast,
        target_scope: ScopeId,
        ctx: Ctx,
        kind: BindingKind,
        pattern: NodeId,
        path: NodeId,
    ) -> Result<(), ScopeError> {
        for ident in ast.binding_identifiers(pattern) {
            self.register_binding_ident(ast, target_scope, ctx, kind, ident, path)?;
        }
        Ok(())
    }

    fn register_binding_ident(
        &mut self,
        ast: &Ast,
        scope: ScopeId,
        ctx: Ctx,
        kind: BindingKind,
        ident: NodeId,
        path: NodeId,
    ) -> Result<(), ScopeError> {
        let Some(name) = ast.ident_name(ident) else { return Ok(()) };
        let name = name.to_string();
        self.register_binding_named(ctx.block, scope, kind, &name, ident, path)
    }

    /// Register a binding for `name` in `scope`. `decl_scope` is the
    /// scope the declaration site physically sits in (for `var` it can be
    /// a block below the hoisting target); pending usages recorded
    /// between the two are captured by the new binding.
    pub fn register_binding_named(
        &mut self,
        decl_scope: ScopeId,
        scope: ScopeId,
        kind: BindingKind,
        name: &str,
        ident: NodeId,
        path: NodeId,
    ) -> Result<(), ScopeError> {
        if let Some(local) = self.scope(scope).bindings.get(name) {
            if local.identifier == ident {
                // Same identifier registered again; nothing to do.
                return Ok(());
            }
            let local_kind = local.kind;
            self.check_block_scoped_collisions(local_kind, kind, name, ident, ast_span_placeholder())?;

            // A redeclaration of an existing variable is a modification.
            let usage = Usage { read: false, write: true, scope: decl_scope };
            self.register_usage_named(decl_scope, name, ident, usage, Some(path));
            return Ok(());
        }

        let program = self.root.expect("crawl established a root scope");
        self.scope_mut(program).references.insert(name.to_string());

        let mut binding = Binding::new(ident, path, kind);

        // Capture usages that passed unresolved through the scopes
        // between the declaration site and the binding scope, detaching
        // them from whatever they previously resolved to.
        let mut cursor = Some(decl_scope);
        while let Some(id) = cursor {
            if let Some(pending) = self.scope_mut(id).seen_usages.remove(name) {
                for (uid, (usage, violation)) in pending {
                    self.detach_usage_above(id, name, uid);
                    binding.register_usage(uid, usage, violation);
                }
            }
            if id == scope {
                break;
            }
            cursor = self.scope(id).parent;
        }

        // A new top-level binding shadows an implicit global of the same
        // name.
        if self.scope(scope).parent.is_none() {
            self.scope_mut(scope).globals.remove(name);
            if let Some(implicit) = self.scope_mut(scope).implicit.remove(name) {
                for (uid, usage) in implicit.usages {
                    let violation = implicit.violations.get(&uid).copied();
                    binding.register_usage(uid, usage, violation);
                }
            }
        }

        self.scope_mut(scope).bindings.insert(name.to_string(), binding);
        Ok(())
    }

    /// Remove `uid` from whatever `name` resolves to above `from`
    /// (exclusive).
    fn detach_usage_above(&mut self, from: ScopeId, name: &str, uid: NodeId) {
        let mut cursor = self.scope(from).parent;
        while let Some(id) = cursor {
            if let Some(pending) = self.scope_mut(id).seen_usages.get_mut(name) {
                pending.remove(&uid);
            }
            if let Some(binding) = self.scope_mut(id).bindings.get_mut(name) {
                binding.remove_usage(uid);
                return;
            }
            if self.scope(id).parent.is_none() {
                let scope = self.scope_mut(id);
                let mut emptied = false;
                if let Some(implicit) = scope.implicit.get_mut(name) {
                    implicit.usages.remove(&uid);
                    implicit.violations.remove(&uid);
                    emptied = implicit.usages.is_empty();
                }
                if emptied {
                    scope.implicit.remove(name);
                    scope.globals.remove(name);
                }
            }
            cursor = self.scope(id).parent;
        }
    }

    fn check_block_scoped_collisions(
        &self,
        local: BindingKind,
        kind: BindingKind,
        name: &str,
        _ident: NodeId,
        span: crate::span::Span,
    ) -> Result<(), ScopeError> {
        // Parameters may be shadowed, and an expression's self-name never
        // collides.
        if kind == BindingKind::Param || local == BindingKind::Local {
            return Ok(());
        }
        // A hoisted function tolerates an existing `let` of the same
        // name (the let wins).
        if kind == BindingKind::Hoisted && local == BindingKind::Let {
            return Ok(());
        }
        let duplicate = matches!(kind, BindingKind::Let | BindingKind::Const | BindingKind::Module)
            || matches!(local, BindingKind::Let | BindingKind::Const | BindingKind::Module)
            || (local == BindingKind::Param && matches!(kind, BindingKind::Let | BindingKind::Const));
        if duplicate {
            return Err(ScopeError::DuplicateDeclaration { name: name.to_string(), span });
        }
        Ok(())
    }

    /// Register a reference at `scope`. Walks outward to the binding the
    /// name resolves to, or records an implicit global on the program
    /// scope.
    pub fn register_usage(
        &mut self,
        ast: &Ast,
        scope: ScopeId,
        ident: NodeId,
        usage: Usage,
        violation: Option<NodeId>,
    ) {
        let Some(name) = ast.ident_name(ident) else { return };
        let name = name.to_string();
        self.register_usage_named(scope, &name, ident, usage, violation);
    }

    fn register_usage_named(
        &mut self,
        scope: ScopeId,
        name: &str,
        ident: NodeId,
        usage: Usage,
        violation: Option<NodeId>,
    ) {
        let mut cursor = scope;
        loop {
            if let Some(binding) = self.scope_mut(cursor).bindings.get_mut(name) {
                binding.register_usage(ident, usage, violation);
                return;
            }
            self.scope_mut(cursor)
                .seen_usages
                .entry(name.to_string())
                .or_default()
                .insert(ident, (usage, violation));
            match self.scope(cursor).parent {
                Some(parent) => cursor = parent,
                None => break,
            }
        }

        // Unresolved: the name is a free reference.
        let program = cursor;
        let scope = self.scope_mut(program);
        scope.globals.entry(name.to_string()).or_insert(ident);
        scope.references.insert(name.to_string());
        let implicit = scope.implicit.entry(name.to_string()).or_default();
        implicit.usages.insert(ident, usage);
        if usage.write {
            if let Some(site) = violation {
                implicit.violations.insert(ident, site);
            }
        }
    }

    /// Remove a reference previously registered at `scope`.
    pub fn remove_usage(&mut self, ast: &Ast, scope: ScopeId, ident: NodeId) {
        let Some(name) = ast.ident_name(ident) else { return };
        let name = name.to_string();
        let mut cursor = Some(scope);
        while let Some(id) = cursor {
            if let Some(pending) = self.scope_mut(id).seen_usages.get_mut(&name) {
                pending.remove(&ident);
            }
            let mut found = false;
            if let Some(binding) = self.scope_mut(id).bindings.get_mut(&name) {
                found = binding.remove_usage(ident);
            }
            if found {
                return;
            }
            if self.scope(id).parent.is_none() {
                let scope = self.scope_mut(id);
                let mut emptied = false;
                if let Some(implicit) = scope.implicit.get_mut(&name) {
                    implicit.usages.remove(&ident);
                    implicit.violations.remove(&ident);
                    emptied = implicit.usages.is_empty();
                }
                if emptied {
                    scope.implicit.remove(&name);
                    scope.globals.remove(&name);
                }
            }
            cursor = self.scope(id).parent;
        }
    }

    /// Record a write to every name bound by `target`.
    pub fn register_constant_violation(
        &mut self,
        ast: &Ast,
        scope: ScopeId,
        target: NodeId,
        violation_site: NodeId,
    ) {
        for ident in ast.binding_identifiers(target) {
            self.register_usage(
                ast,
                scope,
                ident,
                Usage { read: false, write: true, scope },
                Some(violation_site),
            );
        }
    }

    pub fn register_export(&mut self, scope: ScopeId, name: &str, export_node: NodeId) {
        if let Some((owner, _)) = self.get_binding(scope, name) {
            if let Some(binding) = self.scope_mut(owner).bindings.get_mut(name) {
                binding.export_path = Some(export_node);
            }
        }
    }

    /// Remove the binding for `name` owned by `scope`, re-attaching its
    /// surviving usages to whatever the name now resolves to from each
    /// usage's own scope.
    pub fn remove_binding(&mut self, scope: ScopeId, name: &str) {
        let Some(binding) = self.scope_mut(scope).bindings.remove(name) else { return };
        for (uid, usage) in binding.usages {
            let violation = binding.violations.get(&uid).copied();
            self.register_usage_named(usage.scope, name, uid, usage, violation);
        }
    }

    // =========================================================================
    // Queries
    // =========================================================================

    pub fn get_binding(&self, scope: ScopeId, name: &str) -> Option<(ScopeId, &Binding)> {
        let mut cursor = Some(scope);
        while let Some(id) = cursor {
            if let Some(binding) = self.scope(id).bindings.get(name) {
                return Some((id, binding));
            }
            cursor = self.scope(id).parent;
        }
        None
    }

    pub fn get_own_binding(&self, scope: ScopeId, name: &str) -> Option<&Binding> {
        self.scope(scope).bindings.get(name)
    }

    pub fn get_implicit_binding(&self, name: &str) -> Option<&ImplicitBinding> {
        let root = self.root?;
        self.scope(root).implicit.get(name)
    }

    pub fn has_own_binding(&self, scope: ScopeId, name: &str) -> bool {
        self.scope(scope).bindings.contains_key(name)
    }

    pub fn has_binding(&self, scope: ScopeId, name: &str, no_globals: bool) -> bool {
        if name.is_empty() {
            return false;
        }
        if self.get_binding(scope, name).is_some() || self.has_uid(scope, name) {
            return true;
        }
        if !no_globals
            && (WELL_KNOWN_GLOBALS.contains(&name) || CONTEXT_VARIABLES.contains(&name))
        {
            return true;
        }
        false
    }

    fn has_uid(&self, scope: ScopeId, name: &str) -> bool {
        let mut cursor = Some(scope);
        while let Some(id) = cursor {
            if self.scope(id).uids.contains(name) {
                return true;
            }
            cursor = self.scope(id).parent;
        }
        false
    }

    pub fn has_label(&self, scope: ScopeId, name: &str) -> bool {
        let mut cursor = Some(scope);
        while let Some(id) = cursor {
            if self.scope(id).labels.contains_key(name) {
                return true;
            }
            cursor = self.scope(id).parent;
        }
        false
    }

    pub fn has_global(&self, scope: ScopeId, name: &str) -> bool {
        let mut cursor = Some(scope);
        while let Some(id) = cursor {
            if let Some(implicit) = self.scope(id).implicit.get(name) {
                return implicit.referenced();
            }
            if self.scope(id).globals.contains_key(name) {
                return true;
            }
            cursor = self.scope(id).parent;
        }
        false
    }

    pub fn has_reference(&self, scope: ScopeId, name: &str) -> bool {
        let mut cursor = Some(scope);
        while let Some(id) = cursor {
            if self.scope(id).references.contains(name) {
                return true;
            }
            cursor = self.scope(id).parent;
        }
        false
    }

    /// The nearest scope at or above `scope` that `var` declarations
    /// attach to.
    pub fn function_parent(&self, scope: ScopeId) -> ScopeId {
        let mut cursor = scope;
        loop {
            if self.scope(cursor).kind.is_var_target() {
                return cursor;
            }
            match self.scope(cursor).parent {
                Some(parent) => cursor = parent,
                None => return cursor,
            }
        }
    }

    // =========================================================================
    // Unique-name generation
    // =========================================================================

    /// Generate an identifier guaranteed not to collide with any label,
    /// binding, global, or reference anywhere on the enclosing scope
    /// chain. Candidates are `_name`, `_name2`, `_name3`, ...
    pub fn generate_uid(&mut self, scope: ScopeId, base: &str) -> String {
        let name = sanitize_uid_base(base);

        let mut i = 0usize;
        let uid = loop {
            let candidate = generate_uid_candidate(&name, i);
            i += 1;
            let collides = self.has_label(scope, &candidate)
                || self.has_binding(scope, &candidate, false)
                || self.has_global(scope, &candidate)
                || self.has_reference(scope, &candidate);
            if !collides {
                break candidate;
            }
        };

        let program = self.root.unwrap_or(scope);
        let program_scope = self.scope_mut(program);
        program_scope.references.insert(uid.clone());
        program_scope.uids.insert(uid.clone());
        uid
    }

    /// Generate a uid derived from the identifying parts of a node
    /// (`a.b()` suggests `_a$b`).
    pub fn generate_uid_based_on_node(
        &mut self,
        ast: &Ast,
        scope: ScopeId,
        node: NodeId,
        default_name: &str,
    ) -> String {
        let mut parts = Vec::new();
        gather_node_parts(ast, node, &mut parts);
        let mut id = parts.join("$");
        if id.is_empty() {
            id = default_name.to_string();
        }
        id.truncate(20);
        self.generate_uid(scope, &id)
    }

    /// A memoised identifier for `node`, or None when evaluating it
    /// again is consequenceless and no temporary is needed.
    pub fn maybe_generate_memoised(
        &mut self,
        ast: &Ast,
        scope: ScopeId,
        node: NodeId,
    ) -> Option<String> {
        if self.is_static(ast, scope, node) {
            None
        } else {
            Some(self.generate_uid_based_on_node(ast, scope, node, "ref"))
        }
    }

    // =========================================================================
    // Purity analysis
    // =========================================================================

    /// Conservative check that evaluating `node` has no observable side
    /// effects. With `constants_only`, identifiers must also never be
    /// reassigned. False negatives are fine; false positives are bugs.
    pub fn is_pure(&self, ast: &Ast, scope: ScopeId, node: NodeId, constants_only: bool) -> bool {
        match ast.kind(node) {
            NodeKind::Identifier { name } => match self.get_binding(scope, name) {
                Some((_, binding)) => !constants_only || binding.constant(),
                None => false,
            },
            NodeKind::NullLiteral
            | NodeKind::BooleanLiteral { .. }
            | NodeKind::NumericLiteral { .. }
            | NodeKind::BigIntLiteral { .. }
            | NodeKind::StringLiteral { .. } => true,
            NodeKind::TemplateLiteral { expressions, .. } => expressions
                .iter()
                .all(|e| self.is_pure(ast, scope, *e, constants_only)),
            NodeKind::TaggedTemplateExpression { tag, quasi } => {
                matches_string_raw(ast, *tag)
                    && self.get_binding(scope, "String").is_none()
                    && self.is_pure(ast, scope, *quasi, constants_only)
            }
            NodeKind::UnaryExpression { argument, .. } => {
                self.is_pure(ast, scope, *argument, constants_only)
            }
            NodeKind::BinaryExpression { op, left, right } => {
                // `in`/`instanceof` can invoke user traps.
                !matches!(op, BinaryOp::In | BinaryOp::Instanceof)
                    && self.is_pure(ast, scope, *left, constants_only)
                    && self.is_pure(ast, scope, *right, constants_only)
            }
            NodeKind::ArrayExpression { elements } => elements
                .iter()
                .flatten()
                .all(|e| self.is_pure(ast, scope, *e, constants_only)),
            NodeKind::ObjectExpression { properties } => properties
                .iter()
                .all(|p| self.is_pure(ast, scope, *p, constants_only)),
            NodeKind::ObjectProperty { key, value, computed, .. } => {
                (!*computed || self.is_pure(ast, scope, *key, constants_only))
                    && self.is_pure(ast, scope, *value, constants_only)
            }
            NodeKind::ObjectMethod { key, kind, computed, .. }
            | NodeKind::ClassMethod { key, kind, computed, .. } => {
                if matches!(kind, MethodKind::Get | MethodKind::Set) {
                    return false;
                }
                !*computed || self.is_pure(ast, scope, *key, constants_only)
            }
            NodeKind::ClassProperty { key, value, computed, .. } => {
                if *computed && !self.is_pure(ast, scope, *key, constants_only) {
                    return false;
                }
                match value {
                    Some(v) => self.is_pure(ast, scope, *v, constants_only),
                    None => true,
                }
            }
            NodeKind::ClassExpression { super_class, body, .. }
            | NodeKind::ClassDeclaration { super_class, body, .. } => {
                if let Some(sc) = super_class {
                    if !self.is_pure(ast, scope, *sc, constants_only) {
                        return false;
                    }
                }
                body.iter().all(|m| self.is_pure(ast, scope, *m, constants_only))
            }
            _ => false,
        }
    }

    /// Whether a node is a consequenceless reference: `this`, `super`,
    /// or an identifier with a known binding.
    pub fn is_static(&self, ast: &Ast, scope: ScopeId, node: NodeId) -> bool {
        match ast.kind(node) {
            NodeKind::ThisExpression | NodeKind::Super => true,
            NodeKind::Identifier { name } => match self.get_binding(scope, name) {
                Some((_, binding)) => binding.constant(),
                None => self.has_binding(scope, name, true),
            },
            _ => false,
        }
    }

    // =========================================================================
    // Rename
    // =========================================================================

    /// Hygienically rename the binding `old` (resolved from `scope`) and
    /// every usage of it to `new_name`.
    pub fn rename(&mut self, ast: &mut Ast, scope: ScopeId, old: &str, new_name: &str) {
        let Some((owner, _)) = self.get_binding(scope, old) else { return };
        let binding = self
            .scope_mut(owner)
            .bindings
            .remove(old)
            .expect("binding was just resolved");

        for uid in binding.usages.keys() {
            if let NodeKind::Identifier { name } = ast.kind_mut(*uid) {
                *name = new_name.to_string();
            }
        }
        if let NodeKind::Identifier { name } = ast.kind_mut(binding.identifier) {
            *name = new_name.to_string();
        }

        // Pending-usage records keyed by the old name move with it.
        for scope in &mut self.scopes {
            let moved: Vec<_> = match scope.seen_usages.get_mut(old) {
                Some(pending) => binding
                    .usages
                    .keys()
                    .filter_map(|uid| pending.remove_entry(uid).map(|(k, v)| (k, v)))
                    .collect(),
                None => Vec::new(),
            };
            if !moved.is_empty() {
                let entry = scope.seen_usages.entry(new_name.to_string()).or_default();
                for (k, v) in moved {
                    entry.insert(k, v);
                }
            }
        }

        self.scope_mut(owner).bindings.insert(new_name.to_string(), binding);
        if let Some(program) = self.root {
            self.scope_mut(program).references.insert(new_name.to_string());
        }
    }

    // =========================================================================
    // Subtree removal
    // =========================================================================

    /// Update the index for the removal of the subtree rooted at `node`:
    /// usages inside it disappear, bindings declared inside it are
    /// removed (re-attaching their outside usages), and cached scope
    /// associations are dropped.
    pub fn remove_subtree(&mut self, ast: &Ast, node: NodeId) {
        let mut removed = FxHashSet::default();
        collect_subtree_ids(ast, node, &mut removed);

        // Usages located inside the removed subtree disappear everywhere.
        for scope in &mut self.scopes {
            for binding in scope.bindings.values_mut() {
                binding.usages.retain(|uid, _| !removed.contains(uid));
                binding.violations.retain(|uid, _| !removed.contains(uid));
                if let Some(export) = binding.export_path {
                    if removed.contains(&export) {
                        binding.export_path = None;
                    }
                }
            }
            let mut dead_implicit = Vec::new();
            for (name, implicit) in scope.implicit.iter_mut() {
                implicit.usages.retain(|uid, _| !removed.contains(uid));
                implicit.violations.retain(|uid, _| !removed.contains(uid));
                if implicit.usages.is_empty() {
                    dead_implicit.push(name.clone());
                }
            }
            for name in dead_implicit {
                scope.implicit.remove(&name);
                scope.globals.remove(&name);
            }
            for pending in scope.seen_usages.values_mut() {
                pending.retain(|uid, _| !removed.contains(uid));
            }
            scope.labels.retain(|_, id| !removed.contains(id));
        }

        // Bindings declared inside the subtree are gone; their surviving
        // usages re-resolve outward.
        let mut dead_bindings = Vec::new();
        for (idx, scope) in self.scopes.iter().enumerate() {
            for (name, binding) in &scope.bindings {
                if removed.contains(&binding.identifier) {
                    dead_bindings.push((ScopeId(idx as u32), name.clone()));
                }
            }
        }
        for (scope, name) in dead_bindings {
            self.remove_binding(scope, &name);
        }

        self.by_node.retain(|id, _| !removed.contains(id));
    }
}

/// Placeholder span for collision errors raised outside the parser
/// (incremental registration has no token positions).
fn ast_span_placeholder() -> crate::span::Span {
    crate::span::Span::default()
}

fn collect_subtree_ids(ast: &Ast, node: NodeId, out: &mut FxHashSet<NodeId>) {
    out.insert(node);
    for child in ast.children(node) {
        collect_subtree_ids(ast, child.id, out);
    }
}

/// `tag` is exactly `String.raw`.
fn matches_string_raw(ast: &Ast, tag: NodeId) -> bool {
    if let NodeKind::MemberExpression { object, property, computed: false, .. } = ast.kind(tag) {
        return ast.ident_name(*object) == Some("String") && ast.ident_name(*property) == Some("raw");
    }
    false
}

/// Strip leading underscores and trailing digits, keep identifier
/// characters.
fn sanitize_uid_base(base: &str) -> String {
    let cleaned: String = base
        .chars()
        .map(|c| if c.is_alphanumeric() || c == '_' || c == '$' { c } else { '_' })
        .collect();
    let cleaned = cleaned.trim_start_matches('_');
    let cleaned = cleaned.trim_end_matches(|c: char| c.is_ascii_digit());
    if cleaned.is_empty() {
        "temp".to_string()
    } else {
        cleaned.to_string()
    }
}

fn generate_uid_candidate(name: &str, i: usize) -> String {
    if i > 1 {
        format!("_{name}{i}")
    } else {
        format!("_{name}")
    }
}

/// Recursively gather the identifying names of a node, for derived uid
/// generation.
fn gather_node_parts(ast: &Ast, node: NodeId, parts: &mut Vec<String>) {
    match ast.kind(node) {
        NodeKind::Identifier { name } => parts.push(name.clone()),
        NodeKind::StringLiteral { value } => parts.push(value.clone()),
        NodeKind::MemberExpression { object, property, .. } => {
            gather_node_parts(ast, *object, parts);
            gather_node_parts(ast, *property, parts);
        }
        NodeKind::CallExpression { callee, .. } => gather_node_parts(ast, *callee, parts),
        NodeKind::AssignmentExpression { left, .. } => gather_node_parts(ast, *left, parts),
        NodeKind::VariableDeclarator { id, .. } => gather_node_parts(ast, *id, parts),
        NodeKind::ObjectExpression { properties } | NodeKind::ObjectPattern { properties } => {
            for prop in properties {
                if let NodeKind::ObjectProperty { key, .. } = ast.kind(*prop) {
                    gather_node_parts(ast, *key, parts);
                }
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::{Parser, ParserOptions};

    fn crawl(source: &str) -> (Ast, ScopeIndex, ScopeId) {
        let result = Parser::new(source, ParserOptions::default())
            .expect("valid options")
            .parse()
            .expect("parse succeeds");
        let mut index = ScopeIndex::new();
        let root = index.crawl(&result.ast, result.ast.root).expect("crawl succeeds");
        (result.ast, index, root)
    }

    fn crawl_module(source: &str) -> (Ast, ScopeIndex, ScopeId) {
        let mut options = ParserOptions::default();
        options.source_type = crate::ast::SourceType::Module;
        let result = Parser::new(source, options)
            .expect("valid options")
            .parse()
            .expect("parse succeeds");
        let mut index = ScopeIndex::new();
        let root = index.crawl(&result.ast, result.ast.root).expect("crawl succeeds");
        (result.ast, index, root)
    }

    #[test]
    fn test_binding_reference_count() {
        let (_ast, index, root) = crawl("var a; a(); a();");
        let (_, binding) = index.get_binding(root, "a").unwrap();
        assert_eq!(binding.references(), 2);
        assert!(binding.constant());
    }

    #[test]
    fn test_constant_violation() {
        let (_ast, index, root) = crawl("var a = 1; a = 2;");
        let (_, binding) = index.get_binding(root, "a").unwrap();
        assert!(!binding.constant());
        assert_eq!(binding.violations.len(), 1);
    }

    #[test]
    fn test_violation_removed_with_statement() {
        let (ast, mut index, root) = crawl("var a = 1; a = 2;");
        // Remove the `a = 2;` statement and update the index.
        let NodeKind::Program { body, .. } = ast.kind(ast.root).clone() else { panic!() };
        index.remove_subtree(&ast, body[1]);
        let (_, binding) = index.get_binding(root, "a").unwrap();
        assert!(binding.constant());
        assert_eq!(binding.violations.len(), 0);
        assert_eq!(binding.references(), 0);
    }

    #[test]
    fn test_hoisting_var_to_function_scope() {
        let (ast, index, root) = crawl("function f() { { var x = 1; } }");
        // x is bound on f's scope, not the inner block.
        assert!(index.get_binding(root, "x").is_none());
        let NodeKind::Program { body, .. } = ast.kind(ast.root).clone() else { panic!() };
        let f_scope = index.scope_of_node(body[0]).unwrap();
        assert!(index.has_own_binding(f_scope, "x"));
    }

    #[test]
    fn test_let_is_block_scoped() {
        let (_ast, index, root) = crawl("{ let y = 1; }");
        assert!(index.get_binding(root, "y").is_none());
    }

    #[test]
    fn test_usage_before_declaration_attaches() {
        let (_ast, index, root) = crawl("f(); function f() {}");
        let (_, binding) = index.get_binding(root, "f").unwrap();
        assert_eq!(binding.kind, BindingKind::Hoisted);
        assert_eq!(binding.references(), 1);
        // Not recorded as a global anymore.
        assert!(!index.has_global(root, "f"));
    }

    #[test]
    fn test_unresolved_reference_is_global() {
        let (_ast, index, root) = crawl("missing(1);");
        assert!(index.has_global(root, "missing"));
        let implicit = index.get_implicit_binding("missing").unwrap();
        assert_eq!(implicit.usages.len(), 1);
    }

    #[test]
    fn test_remove_binding_reattaches_usages_to_global() {
        let (ast, mut index, root) = crawl("var a; a();");
        index.remove_binding(root, "a");
        assert!(index.get_binding(root, "a").is_none());
        assert!(index.has_global(root, "a"));
        let implicit = index.get_implicit_binding("a").unwrap();
        assert_eq!(implicit.usages.len(), 1);
        drop(ast);
    }

    #[test]
    fn test_remove_shadow_binding_reattaches_to_outer() {
        let (ast, mut index, _root) = crawl("var a; function g() { var a; a(); }");
        let NodeKind::Program { body, .. } = ast.kind(ast.root).clone() else { panic!() };
        let g_scope = index.scope_of_node(body[1]).unwrap();
        {
            let inner = index.get_own_binding(g_scope, "a").unwrap();
            assert_eq!(inner.references(), 1);
        }
        index.remove_binding(g_scope, "a");
        let (owner, outer) = index.get_binding(g_scope, "a").unwrap();
        assert_ne!(owner, g_scope);
        assert_eq!(outer.references(), 1);
    }

    #[test]
    fn test_shadowing_capture_during_crawl() {
        // The usage inside g resolves to g's own `let x`, not the outer
        // var, even though the outer binding is registered first.
        let (ast, index, root) = crawl("var x; function g() { x(); var x; }");
        let (_, outer) = index.get_binding(root, "x").unwrap();
        assert_eq!(outer.references(), 0);
        let NodeKind::Program { body, .. } = ast.kind(ast.root).clone() else { panic!() };
        let g_scope = index.scope_of_node(body[1]).unwrap();
        let inner = index.get_own_binding(g_scope, "x").unwrap();
        assert_eq!(inner.references(), 1);
    }

    #[test]
    fn test_import_bindings_are_module_kind() {
        let (_ast, index, root) = crawl_module("import def, { a as b } from \"m\"; b();");
        let (_, binding) = index.get_binding(root, "b").unwrap();
        assert_eq!(binding.kind, BindingKind::Module);
        assert_eq!(binding.references(), 1);
        assert!(index.get_binding(root, "a").is_none());
        assert!(index.get_binding(root, "def").is_some());
    }

    #[test]
    fn test_export_counts_as_reference() {
        let (_ast, index, root) = crawl_module("export const a = 1;");
        let (_, binding) = index.get_binding(root, "a").unwrap();
        assert_eq!(binding.references(), 1);
        assert!(binding.export_path.is_some());
    }

    #[test]
    fn test_generate_uid_sequence() {
        let (_ast, mut index, root) = crawl("var _foo, _foo1;");
        assert_eq!(index.generate_uid(root, "foo"), "_foo2");
        // The generated uid is reserved afterwards.
        assert_eq!(index.generate_uid(root, "foo"), "_foo3");
    }

    #[test]
    fn test_generate_uid_checks_whole_chain() {
        let (ast, mut index, _root) = crawl("var _tmp; function f() { function g() {} }");
        // From the innermost scope, the outer `_tmp` still collides.
        let NodeKind::Program { body, .. } = ast.kind(ast.root).clone() else { panic!() };
        let f_scope = index.scope_of_node(body[1]).unwrap();
        assert_eq!(index.generate_uid(f_scope, "tmp"), "_tmp2");
    }

    #[test]
    fn test_generate_uid_avoids_labels_and_globals() {
        let (_ast, mut index, root) = crawl("_lbl: while (true) { break _lbl; } _free();");
        assert_eq!(index.generate_uid(root, "lbl"), "_lbl2");
        assert_eq!(index.generate_uid(root, "free"), "_free2");
    }

    #[test]
    fn test_strips_underscores_and_digits() {
        let (_ast, mut index, root) = crawl(";");
        assert_eq!(index.generate_uid(root, "__value42"), "_value");
    }

    #[test]
    fn test_is_pure() {
        let (ast, index, root) = crawl("const a = 1; let b = 2; b = 3; const arr = [a, 1, \"s\"];");
        let NodeKind::Program { body, .. } = ast.kind(ast.root).clone() else { panic!() };
        // `[a, 1, "s"]` is pure; with constants_only it still is (a is
        // never reassigned).
        let NodeKind::VariableDeclaration { declarations, .. } = ast.kind(body[3]).clone() else {
            panic!()
        };
        let NodeKind::VariableDeclarator { init: Some(arr), .. } = ast.kind(declarations[0]).clone()
        else {
            panic!()
        };
        assert!(index.is_pure(&ast, root, arr, false));
        assert!(index.is_pure(&ast, root, arr, true));

        // `b` is reassigned: pure, but not with constants_only.
        let NodeKind::ArrayExpression { elements } = ast.kind(arr).clone() else { panic!() };
        let a_ref = elements[0].unwrap();
        assert!(index.is_pure(&ast, root, a_ref, true));
        let (_, b) = index.get_binding(root, "b").unwrap();
        assert!(!b.constant());
    }

    #[test]
    fn test_call_is_not_pure() {
        let (ast, index, root) = crawl("const x = f();");
        let NodeKind::Program { body, .. } = ast.kind(ast.root).clone() else { panic!() };
        let NodeKind::VariableDeclaration { declarations, .. } = ast.kind(body[0]).clone() else {
            panic!()
        };
        let NodeKind::VariableDeclarator { init: Some(call), .. } =
            ast.kind(declarations[0]).clone()
        else {
            panic!()
        };
        assert!(!index.is_pure(&ast, root, call, false));
    }

    #[test]
    fn test_maybe_generate_memoised() {
        let (ast, mut index, root) = crawl("const obj = {}; obj.prop.method();");
        let NodeKind::Program { body, .. } = ast.kind(ast.root).clone() else { panic!() };
        let NodeKind::ExpressionStatement { expression: call } = ast.kind(body[1]).clone() else {
            panic!()
        };
        let NodeKind::CallExpression { callee, .. } = ast.kind(call).clone() else { panic!() };

        // A member chain has consequences; the derived name reflects it.
        let memo = index.maybe_generate_memoised(&ast, root, callee).unwrap();
        assert_eq!(memo, "_obj$prop$method");

        // A constant bound identifier needs no temporary.
        let NodeKind::MemberExpression { object: inner, .. } = ast.kind(callee).clone() else {
            panic!()
        };
        let NodeKind::MemberExpression { object: obj_ref, .. } = ast.kind(inner).clone() else {
            panic!()
        };
        assert!(index.maybe_generate_memoised(&ast, root, obj_ref).is_none());
    }

    #[test]
    fn test_rename_updates_all_usages() {
        let (mut ast, mut index, root) = crawl("var a = 1; a(); a = 2;");
        index.rename(&mut ast, root, "a", "_renamed");
        assert!(index.get_binding(root, "a").is_none());
        let (_, binding) = index.get_binding(root, "_renamed").unwrap();
        assert_eq!(binding.references(), 2);
        for uid in binding.usages.keys() {
            assert_eq!(ast.ident_name(*uid), Some("_renamed"));
        }
        assert_eq!(ast.ident_name(binding.identifier), Some("_renamed"));
    }

    #[test]
    fn test_function_expression_name_is_local() {
        let (ast, index, root) = crawl("var f = function self() { return self; };");
        assert!(index.get_binding(root, "self").is_none());
        let NodeKind::Program { body, .. } = ast.kind(ast.root).clone() else { panic!() };
        let NodeKind::VariableDeclaration { declarations, .. } = ast.kind(body[0]).clone() else {
            panic!()
        };
        let NodeKind::VariableDeclarator { init: Some(func), .. } =
            ast.kind(declarations[0]).clone()
        else {
            panic!()
        };
        let f_scope = index.scope_of_node(func).unwrap();
        let local = index.get_own_binding(f_scope, "self").unwrap();
        assert_eq!(local.kind, BindingKind::Local);
        assert_eq!(local.references(), 1);
    }

    #[test]
    fn test_catch_param_is_block_scoped() {
        let (ast, index, root) = crawl("try { f(); } catch (e) { g(e); }");
        assert!(index.get_binding(root, "e").is_none());
        let NodeKind::Program { body, .. } = ast.kind(ast.root).clone() else { panic!() };
        let NodeKind::TryStatement { handler: Some(handler), .. } = ast.kind(body[0]).clone()
        else {
            panic!()
        };
        let catch_scope = index.scope_of_node(handler).unwrap();
        let binding = index.get_own_binding(catch_scope, "e").unwrap();
        assert_eq!(binding.references(), 1);
    }

    #[test]
    fn test_for_of_left_violation() {
        let (_ast, index, root) = crawl("var v; for (v of list) {}");
        let (_, binding) = index.get_binding(root, "v").unwrap();
        assert!(!binding.constant());
    }

    #[test]
    fn test_param_default_is_reference() {
        let (ast, index, _root) = crawl("var d; function f(x = d) {}");
        let (_, binding) = {
            let NodeKind::Program { body, .. } = ast.kind(ast.root).clone() else { panic!() };
            let f_scope = index.scope_of_node(body[1]).unwrap();
            index.get_binding(f_scope, "d").unwrap()
        };
        assert_eq!(binding.references(), 1);
    }
}
