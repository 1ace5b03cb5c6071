//! Code generator.
//!
//! Serializes a (possibly mutated) tree back to source text. Untouched
//! literals are reproduced verbatim from their recorded raw text;
//! synthesized or retyped nodes, which carry no raw data, fall back to
//! canonical serialization. Re-parsing the output yields a structurally
//! equivalent tree.

use crate::ast::*;
use crate::span::Span;
use serde::Serialize;

/// Code generation options.
#[derive(Debug, Clone)]
pub struct CodegenOptions {
    /// Remove whitespace and newlines.
    pub minify: bool,
    /// Emit leading comments.
    pub comments: bool,
    /// Indent string (default two spaces).
    pub indent: Option<String>,
    /// Quote style for strings without recorded raw text.
    pub quotes: QuoteStyle,
    /// Record generated-position to original-offset mappings.
    pub source_map: bool,
}

impl Default for CodegenOptions {
    fn default() -> Self {
        Self {
            minify: false,
            comments: true,
            indent: None,
            quotes: QuoteStyle::Double,
            source_map: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QuoteStyle {
    #[default]
    Double,
    Single,
}

/// One generated-position to original-offset mapping.
#[derive(Debug, Clone, Serialize)]
pub struct Mapping {
    pub generated_line: u32,
    pub generated_column: u32,
    pub original_offset: u32,
}

/// The position mapping table produced alongside the code.
#[derive(Debug, Clone, Serialize)]
pub struct SourceMap {
    pub version: u8,
    pub file: Option<String>,
    pub mappings: Vec<Mapping>,
}

impl SourceMap {
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).expect("source map serializes")
    }
}

/// Generator output.
#[derive(Debug)]
pub struct Output {
    pub code: String,
    pub map: Option<SourceMap>,
}

// Expression precedence levels for parenthesization, higher binds
// tighter. Binary operators sit at their parser precedence plus an
// offset above the assignment tier.
const PREC_SEQUENCE: u8 = 1;
const PREC_ASSIGN: u8 = 2;
const PREC_BINARY_BASE: u8 = 3;
const PREC_UNARY: u8 = 16;
const PREC_POSTFIX: u8 = 17;
const PREC_CALL: u8 = 18;
const PREC_PRIMARY: u8 = 20;

fn binary_prec(op: BinaryOp) -> u8 {
    let base = match op {
        BinaryOp::Pipeline => 0,
        BinaryOp::NullishCoalesce => 1,
        BinaryOp::Or => 2,
        BinaryOp::And => 3,
        BinaryOp::BitOr => 4,
        BinaryOp::BitXor => 5,
        BinaryOp::BitAnd => 6,
        BinaryOp::Eq | BinaryOp::NotEq | BinaryOp::StrictEq | BinaryOp::StrictNotEq => 7,
        BinaryOp::Lt
        | BinaryOp::LtEq
        | BinaryOp::Gt
        | BinaryOp::GtEq
        | BinaryOp::In
        | BinaryOp::Instanceof => 8,
        BinaryOp::Shl | BinaryOp::Shr | BinaryOp::UShr => 9,
        BinaryOp::Add | BinaryOp::Sub => 10,
        BinaryOp::Mul | BinaryOp::Div | BinaryOp::Mod => 11,
        BinaryOp::Pow => 12,
    };
    PREC_BINARY_BASE + base
}

/// The code generator.
pub struct Codegen<'a> {
    ast: &'a Ast,
    options: CodegenOptions,
    out: String,
    indent_level: usize,
    indent_str: String,
    line: u32,
    col: u32,
    mappings: Vec<Mapping>,
}

impl<'a> Codegen<'a> {
    pub fn new(ast: &'a Ast, options: CodegenOptions) -> Self {
        let indent_str = options.indent.clone().unwrap_or_else(|| "  ".to_string());
        Self {
            ast,
            options,
            out: String::new(),
            indent_level: 0,
            indent_str,
            line: 0,
            col: 0,
            mappings: Vec::new(),
        }
    }

    /// Generate output for the whole tree.
    pub fn generate(mut self) -> Output {
        let body = match self.ast.kind(self.ast.root) {
            NodeKind::Program { body, .. } => body.clone(),
            _ => vec![self.ast.root],
        };
        for (i, stmt) in body.iter().enumerate() {
            if i > 0 {
                self.nl();
            }
            self.emit_stmt(*stmt);
        }
        if !self.out.is_empty() && !self.options.minify {
            self.push("\n");
        }
        let map = if self.options.source_map {
            Some(SourceMap { version: 3, file: None, mappings: self.mappings })
        } else {
            None
        };
        Output { code: self.out, map }
    }

    // =========================================================================
    // Output helpers
    // =========================================================================

    fn push(&mut self, s: &str) {
        for c in s.chars() {
            if c == '\n' {
                self.line += 1;
                self.col = 0;
            } else {
                self.col += 1;
            }
        }
        self.out.push_str(s);
    }

    /// Record a mapping from the current output position to the original
    /// span, when the node still has one.
    fn map(&mut self, span: Span) {
        if self.options.source_map && !span.is_empty() {
            self.mappings.push(Mapping {
                generated_line: self.line,
                generated_column: self.col,
                original_offset: span.start,
            });
        }
    }

    /// Optional cosmetic space.
    fn sp(&mut self) {
        if !self.options.minify {
            self.push(" ");
        }
    }

    fn nl(&mut self) {
        if !self.options.minify {
            self.push("\n");
            let indent = self.indent_str.repeat(self.indent_level);
            self.push(&indent);
        }
    }

    fn raw_of(&self, id: NodeId) -> Option<&str> {
        self.ast.node(id).extra.raw.as_deref()
    }

    fn emit_comments(&mut self, id: NodeId) {
        if !self.options.comments {
            return;
        }
        let Some(comments) = self.ast.comments.get(&id) else { return };
        let rendered: Vec<String> = comments
            .iter()
            .map(|c| {
                if c.block {
                    format!("/*{}*/", c.text)
                } else {
                    format!("//{}", c.text)
                }
            })
            .collect();
        for text in rendered {
            self.push(&text);
            self.nl();
        }
    }

    // =========================================================================
    // Statements
    // =========================================================================

    fn emit_stmt(&mut self, id: NodeId) {
        self.emit_comments(id);
        let span = self.ast.span(id);
        self.map(span);
        match self.ast.kind(id) {
            NodeKind::ExpressionStatement { expression } => {
                let expression = *expression;
                if self.stmt_expr_needs_parens(expression) {
                    self.push("(");
                    self.emit_expr(expression, PREC_SEQUENCE);
                    self.push(")");
                } else {
                    self.emit_expr(expression, PREC_SEQUENCE);
                }
                self.push(";");
            }
            NodeKind::BlockStatement { body } => {
                let body = body.clone();
                self.emit_block(&body);
            }
            NodeKind::EmptyStatement => self.push(";"),
            NodeKind::DebuggerStatement => self.push("debugger;"),
            NodeKind::WithStatement { object, body } => {
                let (object, body) = (*object, *body);
                self.push("with");
                self.sp();
                self.push("(");
                self.emit_expr(object, PREC_SEQUENCE);
                self.push(")");
                self.sp();
                self.emit_stmt(body);
            }
            NodeKind::ReturnStatement { argument } => {
                let argument = *argument;
                self.push("return");
                if let Some(argument) = argument {
                    self.push(" ");
                    self.emit_expr(argument, PREC_SEQUENCE);
                }
                self.push(";");
            }
            NodeKind::LabeledStatement { label, body } => {
                let (label, body) = (*label, *body);
                self.emit_expr(label, PREC_PRIMARY);
                self.push(":");
                self.sp();
                self.emit_stmt(body);
            }
            NodeKind::BreakStatement { label } => {
                let label = *label;
                self.push("break");
                if let Some(label) = label {
                    self.push(" ");
                    self.emit_expr(label, PREC_PRIMARY);
                }
                self.push(";");
            }
            NodeKind::ContinueStatement { label } => {
                let label = *label;
                self.push("continue");
                if let Some(label) = label {
                    self.push(" ");
                    self.emit_expr(label, PREC_PRIMARY);
                }
                self.push(";");
            }
            NodeKind::IfStatement { test, consequent, alternate } => {
                let (test, consequent, alternate) = (*test, *consequent, *alternate);
                self.push("if");
                self.sp();
                self.push("(");
                self.emit_expr(test, PREC_SEQUENCE);
                self.push(")");
                self.sp();
                self.emit_stmt(consequent);
                if let Some(alternate) = alternate {
                    self.sp();
                    self.push("else");
                    if matches!(self.ast.kind(alternate), NodeKind::BlockStatement { .. })
                        && self.options.minify
                    {
                        self.emit_stmt(alternate);
                    } else {
                        self.push(" ");
                        self.emit_stmt(alternate);
                    }
                }
            }
            NodeKind::SwitchStatement { discriminant, cases } => {
                let (discriminant, cases) = (*discriminant, cases.clone());
                self.push("switch");
                self.sp();
                self.push("(");
                self.emit_expr(discriminant, PREC_SEQUENCE);
                self.push(")");
                self.sp();
                self.push("{");
                self.indent_level += 1;
                for case in &cases {
                    self.nl();
                    self.emit_switch_case(*case);
                }
                self.indent_level -= 1;
                self.nl();
                self.push("}");
            }
            NodeKind::ThrowStatement { argument } => {
                let argument = *argument;
                self.push("throw ");
                self.emit_expr(argument, PREC_SEQUENCE);
                self.push(";");
            }
            NodeKind::TryStatement { block, handler, finalizer } => {
                let (block, handler, finalizer) = (*block, *handler, *finalizer);
                self.push("try");
                self.sp();
                self.emit_stmt(block);
                if let Some(handler) = handler {
                    self.sp();
                    self.emit_catch(handler);
                }
                if let Some(finalizer) = finalizer {
                    self.sp();
                    self.push("finally");
                    self.sp();
                    self.emit_stmt(finalizer);
                }
            }
            NodeKind::WhileStatement { test, body } => {
                let (test, body) = (*test, *body);
                self.push("while");
                self.sp();
                self.push("(");
                self.emit_expr(test, PREC_SEQUENCE);
                self.push(")");
                self.sp();
                self.emit_stmt(body);
            }
            NodeKind::DoWhileStatement { body, test } => {
                let (body, test) = (*body, *test);
                self.push("do ");
                self.emit_stmt(body);
                self.sp();
                self.push("while");
                self.sp();
                self.push("(");
                self.emit_expr(test, PREC_SEQUENCE);
                self.push(");");
            }
            NodeKind::ForStatement { init, test, update, body } => {
                let (init, test, update, body) = (*init, *test, *update, *body);
                self.push("for");
                self.sp();
                self.push("(");
                if let Some(init) = init {
                    if matches!(self.ast.kind(init), NodeKind::VariableDeclaration { .. }) {
                        self.emit_var_decl(init, false);
                    } else {
                        self.emit_expr(init, PREC_SEQUENCE);
                    }
                }
                self.push(";");
                if let Some(test) = test {
                    self.sp();
                    self.emit_expr(test, PREC_SEQUENCE);
                }
                self.push(";");
                if let Some(update) = update {
                    self.sp();
                    self.emit_expr(update, PREC_SEQUENCE);
                }
                self.push(")");
                self.sp();
                self.emit_stmt(body);
            }
            NodeKind::ForInStatement { left, right, body } => {
                let (left, right, body) = (*left, *right, *body);
                self.emit_for_head(left, right, body, "in", false);
            }
            NodeKind::ForOfStatement { left, right, body, is_await } => {
                let (left, right, body, is_await) = (*left, *right, *body, *is_await);
                self.emit_for_head(left, right, body, "of", is_await);
            }
            NodeKind::VariableDeclaration { .. } => {
                self.emit_var_decl(id, true);
            }
            NodeKind::FunctionDeclaration { .. } => self.emit_function(id),
            NodeKind::ClassDeclaration { .. } => self.emit_class(id),
            NodeKind::ImportDeclaration { .. } => self.emit_import(id),
            NodeKind::ExportNamedDeclaration { .. }
            | NodeKind::ExportDefaultDeclaration { .. }
            | NodeKind::ExportAllDeclaration { .. } => self.emit_export(id),
            // A statement slot holding something else (e.g. a
            // placeholder) serializes as an expression statement.
            _ => {
                self.emit_expr(id, PREC_SEQUENCE);
                self.push(";");
            }
        }
    }

    fn emit_block(&mut self, body: &[NodeId]) {
        self.push("{");
        if body.is_empty() {
            self.push("}");
            return;
        }
        self.indent_level += 1;
        for stmt in body {
            self.nl();
            self.emit_stmt(*stmt);
        }
        self.indent_level -= 1;
        self.nl();
        self.push("}");
    }

    fn emit_switch_case(&mut self, id: NodeId) {
        let NodeKind::SwitchCase { test, consequent } = self.ast.kind(id) else { return };
        let (test, consequent) = (*test, consequent.clone());
        match test {
            Some(test) => {
                self.push("case ");
                self.emit_expr(test, PREC_SEQUENCE);
                self.push(":");
            }
            None => self.push("default:"),
        }
        self.indent_level += 1;
        for stmt in &consequent {
            self.nl();
            self.emit_stmt(*stmt);
        }
        self.indent_level -= 1;
    }

    fn emit_catch(&mut self, id: NodeId) {
        let NodeKind::CatchClause { param, body } = self.ast.kind(id) else { return };
        let (param, body) = (*param, *body);
        self.push("catch");
        if let Some(param) = param {
            self.sp();
            self.push("(");
            self.emit_expr(param, PREC_SEQUENCE);
            self.push(")");
        }
        self.sp();
        self.emit_stmt(body);
    }

    fn emit_for_head(&mut self, left: NodeId, right: NodeId, body: NodeId, kw: &str, is_await: bool) {
        self.push("for");
        if is_await {
            self.push(" await");
        }
        self.sp();
        self.push("(");
        if matches!(self.ast.kind(left), NodeKind::VariableDeclaration { .. }) {
            self.emit_var_decl(left, false);
        } else {
            self.emit_expr(left, PREC_ASSIGN);
        }
        self.push(" ");
        self.push(kw);
        self.push(" ");
        self.emit_expr(right, PREC_ASSIGN);
        self.push(")");
        self.sp();
        self.emit_stmt(body);
    }

    fn emit_var_decl(&mut self, id: NodeId, semicolon: bool) {
        let NodeKind::VariableDeclaration { kind, declarations } = self.ast.kind(id) else {
            return;
        };
        let (kind, declarations) = (*kind, declarations.clone());
        self.push(kind.as_str());
        self.push(" ");
        for (i, decl) in declarations.iter().enumerate() {
            if i > 0 {
                self.push(",");
                self.sp();
            }
            if let NodeKind::VariableDeclarator { id: pat, init } = self.ast.kind(*decl) {
                let (pat, init) = (*pat, *init);
                self.emit_expr(pat, PREC_ASSIGN);
                if let Some(init) = init {
                    self.sp();
                    self.push("=");
                    self.sp();
                    self.emit_expr(init, PREC_ASSIGN);
                }
            }
        }
        if semicolon {
            self.push(";");
        }
    }

    fn emit_function(&mut self, id: NodeId) {
        let (fid, params, body, is_async, is_generator) = match self.ast.kind(id) {
            NodeKind::FunctionDeclaration { id, params, body, is_async, is_generator }
            | NodeKind::FunctionExpression { id, params, body, is_async, is_generator } => {
                (*id, params.clone(), *body, *is_async, *is_generator)
            }
            _ => return,
        };
        if is_async {
            self.push("async ");
        }
        self.push("function");
        if is_generator {
            self.push("*");
        }
        if let Some(fid) = fid {
            self.push(" ");
            self.emit_expr(fid, PREC_PRIMARY);
        }
        self.emit_params(&params);
        self.sp();
        self.emit_stmt(body);
    }

    fn emit_params(&mut self, params: &[NodeId]) {
        self.push("(");
        for (i, param) in params.iter().enumerate() {
            if i > 0 {
                self.push(",");
                self.sp();
            }
            self.emit_expr(*param, PREC_ASSIGN);
        }
        self.push(")");
    }

    fn emit_class(&mut self, id: NodeId) {
        let (cid, super_class, body, decorators) = match self.ast.kind(id) {
            NodeKind::ClassDeclaration { id, super_class, body, decorators }
            | NodeKind::ClassExpression { id, super_class, body, decorators } => {
                (*id, *super_class, body.clone(), decorators.clone())
            }
            _ => return,
        };
        for dec in &decorators {
            self.emit_expr(*dec, PREC_PRIMARY);
            self.nl();
        }
        self.push("class");
        if let Some(cid) = cid {
            self.push(" ");
            self.emit_expr(cid, PREC_PRIMARY);
        }
        if let Some(sc) = super_class {
            self.push(" extends ");
            self.emit_expr(sc, PREC_CALL);
        }
        self.sp();
        self.push("{");
        self.indent_level += 1;
        for member in &body {
            self.nl();
            self.emit_class_member(*member);
        }
        self.indent_level -= 1;
        self.nl();
        self.push("}");
    }

    fn emit_class_member(&mut self, id: NodeId) {
        match self.ast.kind(id) {
            NodeKind::ClassMethod {
                key,
                params,
                body,
                kind,
                computed,
                is_static,
                is_async,
                is_generator,
                decorators,
            } => {
                let (key, params, body, kind, computed, is_static, is_async, is_generator, decorators) = (
                    *key,
                    params.clone(),
                    *body,
                    *kind,
                    *computed,
                    *is_static,
                    *is_async,
                    *is_generator,
                    decorators.clone(),
                );
                for dec in &decorators {
                    self.emit_expr(*dec, PREC_PRIMARY);
                    self.nl();
                }
                if is_static {
                    self.push("static ");
                }
                match kind {
                    MethodKind::Get => self.push("get "),
                    MethodKind::Set => self.push("set "),
                    _ => {}
                }
                if is_async {
                    self.push("async ");
                }
                if is_generator {
                    self.push("*");
                }
                self.emit_key(key, computed);
                self.emit_params(&params);
                self.sp();
                self.emit_stmt(body);
            }
            NodeKind::ClassProperty { key, value, computed, is_static, decorators } => {
                let (key, value, computed, is_static, decorators) =
                    (*key, *value, *computed, *is_static, decorators.clone());
                for dec in &decorators {
                    self.emit_expr(*dec, PREC_PRIMARY);
                    self.nl();
                }
                if is_static {
                    self.push("static ");
                }
                self.emit_key(key, computed);
                if let Some(value) = value {
                    self.sp();
                    self.push("=");
                    self.sp();
                    self.emit_expr(value, PREC_ASSIGN);
                }
                self.push(";");
            }
            NodeKind::StaticBlock { body } => {
                let body = body.clone();
                self.push("static");
                self.sp();
                self.emit_block(&body);
            }
            _ => {}
        }
    }

    fn emit_key(&mut self, key: NodeId, computed: bool) {
        if computed {
            self.push("[");
            self.emit_expr(key, PREC_SEQUENCE);
            self.push("]");
        } else {
            self.emit_expr(key, PREC_PRIMARY);
        }
    }

    fn emit_import(&mut self, id: NodeId) {
        let NodeKind::ImportDeclaration { specifiers, source } = self.ast.kind(id) else { return };
        let (specifiers, source) = (specifiers.clone(), *source);
        self.push("import");
        if specifiers.is_empty() {
            self.push(" ");
            self.emit_expr(source, PREC_PRIMARY);
            self.push(";");
            return;
        }
        let mut first = true;
        let mut brace_open = false;
        for spec in &specifiers {
            match self.ast.kind(*spec) {
                NodeKind::ImportDefaultSpecifier { local } => {
                    let local = *local;
                    self.push(" ");
                    self.emit_expr(local, PREC_PRIMARY);
                    first = false;
                }
                NodeKind::ImportNamespaceSpecifier { local } => {
                    let local = *local;
                    if !first {
                        self.push(",");
                    }
                    self.push(" * as ");
                    self.emit_expr(local, PREC_PRIMARY);
                    first = false;
                }
                NodeKind::ImportSpecifier { local, imported } => {
                    let (local, imported) = (*local, *imported);
                    if !brace_open {
                        if !first {
                            self.push(",");
                        }
                        self.push(" {");
                        self.sp();
                        brace_open = true;
                    } else {
                        self.push(",");
                        self.sp();
                    }
                    self.emit_expr(imported, PREC_PRIMARY);
                    if self.ast.ident_name(local) != self.ast.ident_name(imported) {
                        self.push(" as ");
                        self.emit_expr(local, PREC_PRIMARY);
                    }
                    first = false;
                }
                _ => {}
            }
        }
        if brace_open {
            self.sp();
            self.push("}");
        }
        self.push(" from ");
        self.emit_expr(source, PREC_PRIMARY);
        self.push(";");
    }

    fn emit_export(&mut self, id: NodeId) {
        match self.ast.kind(id) {
            NodeKind::ExportNamedDeclaration { declaration, specifiers, source } => {
                let (declaration, specifiers, source) =
                    (*declaration, specifiers.clone(), *source);
                self.push("export");
                if let Some(declaration) = declaration {
                    self.push(" ");
                    self.emit_stmt(declaration);
                    return;
                }
                self.push(" {");
                self.sp();
                for (i, spec) in specifiers.iter().enumerate() {
                    if i > 0 {
                        self.push(",");
                        self.sp();
                    }
                    if let NodeKind::ExportSpecifier { local, exported } = self.ast.kind(*spec) {
                        let (local, exported) = (*local, *exported);
                        self.emit_expr(local, PREC_PRIMARY);
                        if self.ast.ident_name(local) != self.ast.ident_name(exported) {
                            self.push(" as ");
                            self.emit_expr(exported, PREC_PRIMARY);
                        }
                    }
                }
                self.sp();
                self.push("}");
                if let Some(source) = source {
                    self.push(" from ");
                    self.emit_expr(source, PREC_PRIMARY);
                }
                self.push(";");
            }
            NodeKind::ExportDefaultDeclaration { declaration } => {
                let declaration = *declaration;
                self.push("export default ");
                match self.ast.kind(declaration) {
                    NodeKind::FunctionDeclaration { .. }
                    | NodeKind::FunctionExpression { .. } => self.emit_function(declaration),
                    NodeKind::ClassDeclaration { .. } | NodeKind::ClassExpression { .. } => {
                        self.emit_class(declaration)
                    }
                    _ => {
                        self.emit_expr(declaration, PREC_ASSIGN);
                        self.push(";");
                    }
                }
            }
            NodeKind::ExportAllDeclaration { source, exported } => {
                let (source, exported) = (*source, *exported);
                self.push("export *");
                if let Some(exported) = exported {
                    self.push(" as ");
                    self.emit_expr(exported, PREC_PRIMARY);
                }
                self.push(" from ");
                self.emit_expr(source, PREC_PRIMARY);
                self.push(";");
            }
            _ => {}
        }
    }

    // =========================================================================
    // Expressions
    // =========================================================================

    /// True when an expression statement would begin with `{`,
    /// `function`, or `class` and must be parenthesized.
    fn stmt_expr_needs_parens(&self, id: NodeId) -> bool {
        match self.ast.kind(id) {
            NodeKind::ObjectExpression { .. }
            | NodeKind::ObjectPattern { .. }
            | NodeKind::FunctionExpression { .. }
            | NodeKind::ClassExpression { .. } => true,
            NodeKind::BinaryExpression { left, .. }
            | NodeKind::AssignmentExpression { left, .. } => self.stmt_expr_needs_parens(*left),
            NodeKind::ConditionalExpression { test, .. } => self.stmt_expr_needs_parens(*test),
            NodeKind::SequenceExpression { expressions } => expressions
                .first()
                .map(|e| self.stmt_expr_needs_parens(*e))
                .unwrap_or(false),
            NodeKind::MemberExpression { object, .. } => self.stmt_expr_needs_parens(*object),
            NodeKind::CallExpression { callee, .. } => self.stmt_expr_needs_parens(*callee),
            NodeKind::TaggedTemplateExpression { tag, .. } => self.stmt_expr_needs_parens(*tag),
            NodeKind::UpdateExpression { prefix: false, argument, .. } => {
                self.stmt_expr_needs_parens(*argument)
            }
            _ => false,
        }
    }

    fn expr_prec(&self, id: NodeId) -> u8 {
        match self.ast.kind(id) {
            NodeKind::SequenceExpression { .. } => PREC_SEQUENCE,
            NodeKind::AssignmentExpression { .. }
            | NodeKind::AssignmentPattern { .. }
            | NodeKind::ArrowFunctionExpression { .. }
            | NodeKind::YieldExpression { .. }
            | NodeKind::ConditionalExpression { .. } => PREC_ASSIGN,
            NodeKind::BinaryExpression { op, .. } => binary_prec(*op),
            NodeKind::UnaryExpression { .. } | NodeKind::AwaitExpression { .. } => PREC_UNARY,
            NodeKind::UpdateExpression { .. } => PREC_POSTFIX,
            NodeKind::CallExpression { .. }
            | NodeKind::NewExpression { .. }
            | NodeKind::MemberExpression { .. }
            | NodeKind::TaggedTemplateExpression { .. }
            | NodeKind::ImportExpression { .. } => PREC_CALL,
            _ => PREC_PRIMARY,
        }
    }

    fn emit_expr(&mut self, id: NodeId, min_prec: u8) {
        let prec = self.expr_prec(id);
        let parens = prec < min_prec;
        if parens {
            self.push("(");
        }
        self.emit_expr_inner(id);
        if parens {
            self.push(")");
        }
    }

    fn emit_expr_inner(&mut self, id: NodeId) {
        let span = self.ast.span(id);
        self.map(span);
        match self.ast.kind(id) {
            NodeKind::Identifier { name } => {
                let name = name.clone();
                self.push(&name);
            }
            NodeKind::NullLiteral => self.push("null"),
            NodeKind::BooleanLiteral { value } => {
                let text = if *value { "true" } else { "false" };
                self.push(text);
            }
            NodeKind::NumericLiteral { value } => {
                let value = *value;
                match self.raw_of(id) {
                    Some(raw) => {
                        let raw = raw.to_string();
                        self.push(&raw);
                    }
                    None => {
                        let text = format_number(value);
                        self.push(&text);
                    }
                }
            }
            NodeKind::BigIntLiteral { value } => {
                let text = match self.raw_of(id) {
                    Some(raw) => raw.to_string(),
                    None => format!("{value}n"),
                };
                self.push(&text);
            }
            NodeKind::StringLiteral { value } => {
                let text = match self.raw_of(id) {
                    Some(raw) => raw.to_string(),
                    None => quote_string(value, self.options.quotes),
                };
                self.push(&text);
            }
            NodeKind::RegExpLiteral { pattern, flags } => {
                let text = format!("/{pattern}/{flags}");
                self.push(&text);
            }
            NodeKind::TemplateLiteral { quasis, expressions } => {
                let (quasis, expressions) = (quasis.clone(), expressions.clone());
                self.push("`");
                for (i, quasi) in quasis.iter().enumerate() {
                    self.push(&quasi.raw.clone());
                    if let Some(expr) = expressions.get(i) {
                        self.push("${");
                        self.emit_expr(*expr, PREC_SEQUENCE);
                        self.push("}");
                    }
                }
                self.push("`");
            }
            NodeKind::TaggedTemplateExpression { tag, quasi } => {
                let (tag, quasi) = (*tag, *quasi);
                self.emit_expr(tag, PREC_CALL);
                self.emit_expr(quasi, PREC_PRIMARY);
            }
            NodeKind::ThisExpression => self.push("this"),
            NodeKind::Super => self.push("super"),
            NodeKind::ArrayExpression { elements } | NodeKind::ArrayPattern { elements } => {
                let elements = elements.clone();
                self.push("[");
                for (i, elem) in elements.iter().enumerate() {
                    if i > 0 {
                        self.push(",");
                        self.sp();
                    }
                    if let Some(elem) = elem {
                        self.emit_expr(*elem, PREC_ASSIGN);
                    }
                }
                self.push("]");
            }
            NodeKind::ObjectExpression { properties } | NodeKind::ObjectPattern { properties } => {
                let properties = properties.clone();
                self.push("{");
                for (i, prop) in properties.iter().enumerate() {
                    if i > 0 {
                        self.push(",");
                    }
                    self.sp();
                    self.emit_object_member(*prop);
                }
                if !properties.is_empty() {
                    self.sp();
                }
                self.push("}");
            }
            NodeKind::ObjectProperty { .. } | NodeKind::ObjectMethod { .. } => {
                self.emit_object_member(id);
            }
            NodeKind::SpreadElement { argument } | NodeKind::RestElement { argument } => {
                let argument = *argument;
                self.push("...");
                self.emit_expr(argument, PREC_ASSIGN);
            }
            NodeKind::FunctionExpression { .. } => self.emit_function(id),
            NodeKind::ArrowFunctionExpression { params, body, is_async } => {
                let (params, body, is_async) = (params.clone(), *body, *is_async);
                if is_async {
                    self.push("async ");
                }
                self.emit_params(&params);
                self.sp();
                self.push("=>");
                self.sp();
                if matches!(self.ast.kind(body), NodeKind::BlockStatement { .. }) {
                    self.emit_stmt(body);
                } else if matches!(self.ast.kind(body), NodeKind::ObjectExpression { .. }) {
                    self.push("(");
                    self.emit_expr(body, PREC_ASSIGN);
                    self.push(")");
                } else {
                    self.emit_expr(body, PREC_ASSIGN);
                }
            }
            NodeKind::ClassExpression { .. } => self.emit_class(id),
            NodeKind::UnaryExpression { op, argument } => {
                let (op, argument) = (*op, *argument);
                self.push(op.as_str());
                if matches!(op, UnaryOp::Typeof | UnaryOp::Void | UnaryOp::Delete) {
                    self.push(" ");
                }
                self.emit_expr(argument, PREC_UNARY);
            }
            NodeKind::UpdateExpression { op, prefix, argument } => {
                let (op, prefix, argument) = (*op, *prefix, *argument);
                if prefix {
                    self.push(op.as_str());
                    self.emit_expr(argument, PREC_UNARY);
                } else {
                    self.emit_expr(argument, PREC_POSTFIX);
                    self.push(op.as_str());
                }
            }
            NodeKind::BinaryExpression { op, left, right } => {
                let (op, left, right) = (*op, *left, *right);
                let prec = binary_prec(op);
                let word = matches!(op, BinaryOp::In | BinaryOp::Instanceof);
                // `**` is right associative; everything else here is
                // left associative.
                let (left_min, right_min) = if op == BinaryOp::Pow {
                    (prec + 1, prec)
                } else {
                    (prec, prec + 1)
                };
                self.emit_expr(left, left_min);
                if word {
                    self.push(" ");
                    self.push(op.as_str());
                    self.push(" ");
                } else {
                    self.sp();
                    self.push(op.as_str());
                    self.sp();
                }
                self.emit_expr(right, right_min);
            }
            NodeKind::AssignmentExpression { op, left, right } => {
                let (op, left, right) = (*op, *left, *right);
                self.emit_expr(left, PREC_POSTFIX);
                self.sp();
                self.push(op.as_str());
                self.sp();
                self.emit_expr(right, PREC_ASSIGN);
            }
            NodeKind::AssignmentPattern { left, right } => {
                let (left, right) = (*left, *right);
                self.emit_expr(left, PREC_POSTFIX);
                self.sp();
                self.push("=");
                self.sp();
                self.emit_expr(right, PREC_ASSIGN);
            }
            NodeKind::ConditionalExpression { test, consequent, alternate } => {
                let (test, consequent, alternate) = (*test, *consequent, *alternate);
                self.emit_expr(test, PREC_ASSIGN + 1);
                self.sp();
                self.push("?");
                self.sp();
                self.emit_expr(consequent, PREC_ASSIGN);
                self.sp();
                self.push(":");
                self.sp();
                self.emit_expr(alternate, PREC_ASSIGN);
            }
            NodeKind::CallExpression { callee, arguments, optional } => {
                let (callee, arguments, optional) = (*callee, arguments.clone(), *optional);
                self.emit_expr(callee, PREC_CALL);
                if optional {
                    self.push("?.");
                }
                self.emit_args(&arguments);
            }
            NodeKind::NewExpression { callee, arguments } => {
                let (callee, arguments) = (*callee, arguments.clone());
                self.push("new ");
                // Parenthesize a callee containing a call so the
                // arguments bind to `new`.
                let min = if contains_call(self.ast, callee) { PREC_CALL + 1 } else { PREC_CALL };
                self.emit_expr(callee, min);
                self.emit_args(&arguments);
            }
            NodeKind::MemberExpression { object, property, computed, optional } => {
                let (object, property, computed, optional) =
                    (*object, *property, *computed, *optional);
                // `1.x` is a lexing hazard; parenthesize literal number
                // objects.
                let needs_wrap = matches!(self.ast.kind(object), NodeKind::NumericLiteral { .. });
                if needs_wrap {
                    self.push("(");
                    self.emit_expr(object, PREC_SEQUENCE);
                    self.push(")");
                } else {
                    self.emit_expr(object, PREC_CALL);
                }
                if computed {
                    if optional {
                        self.push("?.");
                    }
                    self.push("[");
                    self.emit_expr(property, PREC_SEQUENCE);
                    self.push("]");
                } else {
                    self.push(if optional { "?." } else { "." });
                    self.emit_expr(property, PREC_PRIMARY);
                }
            }
            NodeKind::SequenceExpression { expressions } => {
                let expressions = expressions.clone();
                for (i, expr) in expressions.iter().enumerate() {
                    if i > 0 {
                        self.push(",");
                        self.sp();
                    }
                    self.emit_expr(*expr, PREC_ASSIGN);
                }
            }
            NodeKind::YieldExpression { argument, delegate } => {
                let (argument, delegate) = (*argument, *delegate);
                self.push("yield");
                if delegate {
                    self.push("*");
                }
                if let Some(argument) = argument {
                    self.push(" ");
                    self.emit_expr(argument, PREC_ASSIGN);
                }
            }
            NodeKind::AwaitExpression { argument } => {
                let argument = *argument;
                self.push("await ");
                self.emit_expr(argument, PREC_UNARY);
            }
            NodeKind::ImportExpression { source } => {
                let source = *source;
                self.push("import(");
                self.emit_expr(source, PREC_ASSIGN);
                self.push(")");
            }
            NodeKind::MetaProperty { meta, property } => {
                let text = format!("{meta}.{property}");
                self.push(&text);
            }
            NodeKind::Decorator { expression } => {
                let expression = *expression;
                self.push("@");
                self.emit_expr(expression, PREC_CALL);
            }
            NodeKind::Placeholder { name, .. } => {
                let text = format!("%%{name}%%");
                self.push(&text);
            }
            // Statement-like kinds reached through expression slots.
            _ => self.emit_stmt(id),
        }
    }

    fn emit_args(&mut self, arguments: &[NodeId]) {
        self.push("(");
        for (i, arg) in arguments.iter().enumerate() {
            if i > 0 {
                self.push(",");
                self.sp();
            }
            self.emit_expr(*arg, PREC_ASSIGN);
        }
        self.push(")");
    }

    fn emit_object_member(&mut self, id: NodeId) {
        match self.ast.kind(id) {
            NodeKind::ObjectProperty { key, value, computed, shorthand } => {
                let (key, value, computed, shorthand) = (*key, *value, *computed, *shorthand);
                if shorthand && !computed {
                    // `{a}` or `{a = 1}` (pattern default).
                    self.emit_expr(value, PREC_ASSIGN);
                    return;
                }
                self.emit_key(key, computed);
                self.push(":");
                self.sp();
                self.emit_expr(value, PREC_ASSIGN);
            }
            NodeKind::ObjectMethod { key, params, body, kind, computed, is_async, is_generator } => {
                let (key, params, body, kind, computed, is_async, is_generator) = (
                    *key,
                    params.clone(),
                    *body,
                    *kind,
                    *computed,
                    *is_async,
                    *is_generator,
                );
                match kind {
                    MethodKind::Get => self.push("get "),
                    MethodKind::Set => self.push("set "),
                    _ => {}
                }
                if is_async {
                    self.push("async ");
                }
                if is_generator {
                    self.push("*");
                }
                self.emit_key(key, computed);
                self.emit_params(&params);
                self.sp();
                self.emit_stmt(body);
            }
            NodeKind::SpreadElement { argument } | NodeKind::RestElement { argument } => {
                let argument = *argument;
                self.push("...");
                self.emit_expr(argument, PREC_ASSIGN);
            }
            _ => self.emit_expr(id, PREC_ASSIGN),
        }
    }
}

/// Whether a new-expression callee contains a call that would capture
/// the argument list.
fn contains_call(ast: &Ast, id: NodeId) -> bool {
    match ast.kind(id) {
        NodeKind::CallExpression { .. } => true,
        NodeKind::MemberExpression { object, .. } => contains_call(ast, *object),
        NodeKind::TaggedTemplateExpression { tag, .. } => contains_call(ast, *tag),
        _ => false,
    }
}

fn format_number(value: f64) -> String {
    if value.is_nan() {
        return "NaN".to_string();
    }
    if value.is_infinite() {
        return if value > 0.0 { "Infinity" } else { "-Infinity" }.to_string();
    }
    format!("{value}")
}

fn quote_string(value: &str, quotes: QuoteStyle) -> String {
    let quote = match quotes {
        QuoteStyle::Double => '"',
        QuoteStyle::Single => '\'',
    };
    let mut out = String::with_capacity(value.len() + 2);
    out.push(quote);
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            '\0' => out.push_str("\\0"),
            c if c == quote => {
                out.push('\\');
                out.push(c);
            }
            c => out.push(c),
        }
    }
    out.push(quote);
    out
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

    fn gen(source: &str) -> String {
        let ast = parse(source);
        Codegen::new(&ast, CodegenOptions::default()).generate().code
    }

    fn gen_minified(source: &str) -> String {
        let ast = parse(source);
        let options = CodegenOptions { minify: true, ..Default::default() };
        Codegen::new(&ast, options).generate().code
    }

    #[test]
    fn test_simple_output() {
        assert_eq!(gen("let x = 1;"), "let x = 1;\n");
        assert_eq!(gen_minified("let x = 1;"), "let x=1;");
    }

    #[test]
    fn test_raw_literals_preserved() {
        assert_eq!(gen("const n = 0xFF;"), "const n = 0xFF;\n");
        assert_eq!(gen("const s = 'single';"), "const s = 'single';\n");
        assert_eq!(gen("const big = 1_000_000;"), "const big = 1_000_000;\n");
    }

    #[test]
    fn test_precedence_parens() {
        assert_eq!(gen_minified("(1 + 2) * 3;"), "(1+2)*3;");
        assert_eq!(gen_minified("1 + 2 * 3;"), "1+2*3;");
        assert_eq!(gen_minified("a = b = c;"), "a=b=c;");
    }

    #[test]
    fn test_object_statement_parenthesized() {
        assert_eq!(gen_minified("({a: 1});"), "({a:1});");
    }

    #[test]
    fn test_arrow_and_object_body() {
        assert_eq!(gen_minified("const f = () => ({a: 1});"), "const f=()=>({a:1});");
    }

    #[test]
    fn test_new_callee_with_call() {
        assert_eq!(gen_minified("new (getCtor())();"), "new (getCtor())();");
    }

    #[test]
    fn test_template_roundtrip() {
        assert_eq!(gen_minified("`a${x}b`;"), "`a${x}b`;");
    }

    #[test]
    fn test_fixpoint_roundtrip() {
        let sources = [
            "let x = 1; function f(a, b) { return a + b; }",
            "const {a, b: [c]} = obj; for (const k of list) { use(k); }",
            "class A extends B { constructor() { super(); } get x() { return 1; } }",
            "try { f(); } catch (e) { g(e); } finally { h(); }",
            "x?.y?.(z); a ??= b; label: while (true) break label;",
        ];
        for source in sources {
            let once = gen(source);
            let twice = gen(&once);
            assert_eq!(once, twice, "not a fixpoint for {source:?}");
        }
    }

    #[test]
    fn test_source_map_records_mappings() {
        let ast = parse("let x = longName;");
        let options = CodegenOptions { source_map: true, ..Default::default() };
        let output = Codegen::new(&ast, options).generate();
        let map = output.map.expect("map requested");
        assert_eq!(map.version, 3);
        assert!(!map.mappings.is_empty());
        let json = map.to_json();
        assert!(json.contains("\"version\":3"));
    }

    #[test]
    fn test_comments_emitted_and_stripped() {
        let source = "// leading\nlet x = 1;";
        let ast = parse(source);
        let with = Codegen::new(&ast, CodegenOptions::default()).generate().code;
        assert!(with.contains("// leading"));
        let without = Codegen::new(
            &ast,
            CodegenOptions { comments: false, ..Default::default() },
        )
        .generate()
        .code;
        assert!(!without.contains("leading"));
    }
}
