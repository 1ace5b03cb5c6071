//! JavaScript parser.
//!
//! A single-pass recursive descent parser with precedence climbing for
//! expressions. Ambiguous constructs (arrow parameter lists vs
//! parenthesized expressions, patterns vs expressions) are resolved by
//! parsing the expression grammar first and retyping nodes in place via
//! the assignable conversion in `lval.rs`; the few spots that need real
//! lookahead snapshot the clonable lexer and roll back.

use crate::ast::*;
use crate::capability::ExtensionSet;
use crate::error::{ErrorCode, SyntaxError};
use crate::lexer::Lexer;
use crate::lval::BindKind;
use crate::span::{LineIndex, Span};
use crate::token::{Token, TokenKind};
use crate::Capabilities;
use rustc_hash::{FxHashMap, FxHashSet};

/// Parser configuration options.
#[derive(Debug, Clone, Default)]
pub struct ParserOptions {
    /// Script, module, or auto-detect from import/export.
    pub source_type: SourceType,
    /// Enabled syntax extensions.
    pub capabilities: Capabilities,
    /// Tolerate `return` at the top level.
    pub allow_return_outside_function: bool,
    /// Collect recoverable errors instead of aborting on the first one.
    pub error_recovery: bool,
    /// Seed strict mode regardless of directives (modules are always
    /// strict).
    pub strict: bool,
}

/// A parse outcome: the tree plus any errors collected in recovery mode.
#[derive(Debug)]
pub struct ParseResult {
    pub ast: Ast,
    pub errors: Vec<SyntaxError>,
}

/// The parser.
pub struct Parser<'a> {
    pub(crate) lexer: Lexer<'a>,
    pub(crate) current: Token,
    pub(crate) options: ParserOptions,
    pub(crate) source: &'a str,
    pub(crate) ast: Ast,
    pub(crate) errors: Vec<SyntaxError>,
    line_index: LineIndex,
    /// End offset of the previously consumed token.
    prev_end: u32,

    // Context flags
    pub(crate) strict: bool,
    pub(crate) in_module: bool,
    pub(crate) allow_in: bool,
    in_function: bool,
    in_async: bool,
    in_generator: bool,
    loop_depth: u32,
    switch_depth: u32,
    labels: Vec<(String, bool)>,

    /// Scopes under construction, for redeclaration checking.
    pub(crate) scope_stack: Vec<ParseScope>,
    /// Span of an `{a = 1}` shorthand initializer that is only legal if
    /// the object is later converted to a pattern.
    pub(crate) pending_cover_init: Option<Span>,
    pub(crate) exts: ExtensionSet,
}

/// A scope being built during parsing; only carries what redeclaration
/// checking needs. The full scope/binding index is built after parsing.
#[derive(Debug)]
pub struct ParseScope {
    kind: ParseScopeKind,
    lexical: FxHashMap<String, Span>,
    vars: FxHashSet<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ParseScopeKind {
    Program,
    Function,
    Block,
}

impl ParseScope {
    fn new(kind: ParseScopeKind) -> Self {
        Self { kind, lexical: FxHashMap::default(), vars: FxHashSet::default() }
    }
}

/// Saved function context, restored when a function body ends.
struct FnCtx {
    in_function: bool,
    in_async: bool,
    in_generator: bool,
    strict: bool,
    loop_depth: u32,
    switch_depth: u32,
    labels_len: usize,
}

impl<'a> Parser<'a> {
    /// Create a new parser. Fails only on an invalid capability set.
    pub fn new(source: &'a str, options: ParserOptions) -> Result<Self, SyntaxError> {
        let exts = ExtensionSet::from_capabilities(&options.capabilities).map_err(|e| {
            SyntaxError::new(ErrorCode::UnsupportedSyntax, e.to_string(), Span::default())
        })?;
        let mut lexer = Lexer::new(source);
        lexer.set_placeholders(exts.placeholders());
        let current = lexer.next_token();
        let in_module = match options.source_type {
            SourceType::Module => true,
            SourceType::Script => false,
            SourceType::Unambiguous => detect_module(source),
        };
        let strict = options.strict || in_module;
        Ok(Self {
            lexer,
            current,
            strict,
            in_module,
            options,
            source,
            ast: Ast::new(source.to_string()),
            errors: Vec::new(),
            line_index: LineIndex::new(source),
            prev_end: 0,
            allow_in: true,
            in_function: false,
            in_async: false,
            in_generator: false,
            loop_depth: 0,
            switch_depth: 0,
            labels: Vec::new(),
            scope_stack: Vec::new(),
            pending_cover_init: None,
            exts,
        })
    }

    /// Parse the entire source into a tree.
    pub fn parse(mut self) -> Result<ParseResult, SyntaxError> {
        let start = self.current.span.start;
        self.scope_stack.push(ParseScope::new(ParseScopeKind::Program));

        let mut body = Vec::new();
        let use_strict = self.parse_directive_prologue(&mut body).map_err(|e| self.positioned(e))?;
        if use_strict.is_some() {
            self.strict = true;
        }

        while !self.is_eof() {
            match self.parse_stmt() {
                Ok(stmt) => body.push(stmt),
                Err(e) if self.options.error_recovery => {
                    let e = self.positioned(e);
                    self.errors.push(e);
                    self.synchronize();
                }
                Err(e) => return Err(self.positioned(e)),
            }
        }

        let source_type = if self.in_module { SourceType::Module } else { SourceType::Script };
        let span = Span::new(start, self.prev_end);
        let root = self.ast.alloc(NodeKind::Program { body, source_type }, span);
        self.ast.root = root;

        let mut errors = std::mem::take(&mut self.errors);
        for e in &mut errors {
            let (line, column) = self.line_index.line_col(e.span.start);
            e.line = line;
            e.column = column;
        }
        Ok(ParseResult { ast: self.ast, errors })
    }

    // =========================================================================
    // Token handling
    // =========================================================================

    pub(crate) fn peek(&self) -> &TokenKind {
        &self.current.kind
    }

    pub(crate) fn advance(&mut self) -> Token {
        self.prev_end = self.current.span.end;
        std::mem::replace(&mut self.current, self.lexer.next_token())
    }

    pub(crate) fn check(&self, kind: &TokenKind) -> bool {
        std::mem::discriminant(self.peek()) == std::mem::discriminant(kind)
    }

    pub(crate) fn is_eof(&self) -> bool {
        matches!(self.peek(), TokenKind::Eof)
    }

    pub(crate) fn eat(&mut self, kind: &TokenKind) -> bool {
        if self.check(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    pub(crate) fn expect(&mut self, kind: &TokenKind) -> Result<Token, SyntaxError> {
        if self.check(kind) {
            Ok(self.advance())
        } else {
            Err(self.unexpected())
        }
    }

    /// Hard error for the current token. Surfaces a pending lexer error
    /// when the token is `Invalid`.
    pub(crate) fn unexpected(&mut self) -> SyntaxError {
        if matches!(self.peek(), TokenKind::Invalid) {
            if let Some(err) = self.lexer.take_error() {
                return err;
            }
        }
        let code = if self.is_eof() { ErrorCode::UnexpectedEof } else { ErrorCode::UnexpectedToken };
        self.error(code, format!("Unexpected token {:?}", self.peek()), self.current.span)
    }

    pub(crate) fn error(
        &self,
        code: ErrorCode,
        message: impl Into<String>,
        span: Span,
    ) -> SyntaxError {
        SyntaxError::new(code, message, span)
    }

    fn positioned(&self, mut e: SyntaxError) -> SyntaxError {
        let (line, column) = self.line_index.line_col(e.span.start);
        e.line = line;
        e.column = column;
        e
    }

    /// Report a grammar violation. In recovery mode recoverable codes are
    /// collected and parsing continues; otherwise the error is returned
    /// for propagation with `?`.
    pub(crate) fn raise(
        &mut self,
        code: ErrorCode,
        message: impl Into<String>,
        span: Span,
    ) -> Result<(), SyntaxError> {
        let err = self.error(code, message, span);
        if self.options.error_recovery && code.recoverable() {
            let err = self.positioned(err);
            self.errors.push(err);
            Ok(())
        } else {
            Err(err)
        }
    }

    /// Consume a semicolon, applying automatic semicolon insertion.
    pub(crate) fn expect_semicolon(&mut self) -> Result<(), SyntaxError> {
        // 1. Explicit semicolon
        if self.eat(&TokenKind::Semicolon) {
            return Ok(());
        }
        // 2. Before closing brace
        if self.check(&TokenKind::RBrace) {
            return Ok(());
        }
        // 3. At end of file
        if self.is_eof() {
            return Ok(());
        }
        // 4. The current token was preceded by a line terminator
        if self.current.newline_before {
            return Ok(());
        }
        self.raise(ErrorCode::ExpectedSemicolon, "Expected semicolon", self.current.span)
    }

    /// Skip to a statement boundary after a hard error (recovery mode).
    fn synchronize(&mut self) {
        // If the failure happened at a boundary, consuming it is enough.
        if self.eat(&TokenKind::Semicolon) {
            return;
        }
        if !self.is_eof() {
            self.advance();
        }
        loop {
            match self.peek() {
                TokenKind::Eof | TokenKind::RBrace => break,
                TokenKind::Semicolon => {
                    self.advance();
                    break;
                }
                _ if self.current.newline_before => break,
                _ => {
                    self.advance();
                }
            }
        }
    }

    pub(crate) fn snapshot(&self) -> (Lexer<'a>, Token, u32) {
        (self.lexer.clone(), self.current.clone(), self.prev_end)
    }

    pub(crate) fn restore(&mut self, snap: (Lexer<'a>, Token, u32)) {
        self.lexer = snap.0;
        self.current = snap.1;
        self.prev_end = snap.2;
    }

    fn finish(&mut self, kind: NodeKind, start: u32) -> NodeId {
        self.ast.alloc(kind, Span::new(start, self.prev_end))
    }

    pub(crate) fn raw(&self, span: Span) -> &'a str {
        &self.source[span.start as usize..span.end as usize]
    }

    // =========================================================================
    // Scope-in-construction bookkeeping
    // =========================================================================

    pub(crate) fn declare_name(
        &mut self,
        name: &str,
        bind: BindKind,
        span: Span,
    ) -> Result<(), SyntaxError> {
        match bind {
            BindKind::None => Ok(()),
            BindKind::Param => {
                if let Some(scope) = self.scope_stack.last_mut() {
                    scope.vars.insert(name.to_string());
                }
                Ok(())
            }
            BindKind::Lexical | BindKind::Class | BindKind::CatchParam => {
                let scope = self.scope_stack.last_mut().expect("scope stack is never empty");
                if scope.lexical.contains_key(name) || scope.vars.contains(name) {
                    let msg = format!("Duplicate declaration \"{name}\"");
                    return self.raise(ErrorCode::DuplicateDeclaration, msg, span);
                }
                scope.lexical.insert(name.to_string(), span);
                Ok(())
            }
            BindKind::Var => {
                let mut conflict = false;
                for scope in self.scope_stack.iter_mut().rev() {
                    if scope.lexical.contains_key(name) {
                        conflict = true;
                    }
                    if scope.kind != ParseScopeKind::Block {
                        scope.vars.insert(name.to_string());
                        break;
                    }
                }
                if conflict {
                    let msg = format!("Duplicate declaration \"{name}\"");
                    return self.raise(ErrorCode::DuplicateDeclaration, msg, span);
                }
                Ok(())
            }
            BindKind::Function => {
                if self.strict {
                    self.declare_name(name, BindKind::Lexical, span)
                } else {
                    if let Some(scope) = self.scope_stack.last_mut() {
                        scope.vars.insert(name.to_string());
                    }
                    Ok(())
                }
            }
        }
    }

    fn push_scope(&mut self, kind: ParseScopeKind) {
        self.scope_stack.push(ParseScope::new(kind));
    }

    fn pop_scope(&mut self) {
        self.scope_stack.pop();
    }

    // =========================================================================
    // Directives
    // =========================================================================

    /// Parse the directive prologue of a program or function body into
    /// `stmts`. Returns the span of a `"use strict"` directive if one was
    /// found.
    fn parse_directive_prologue(
        &mut self,
        stmts: &mut Vec<NodeId>,
    ) -> Result<Option<Span>, SyntaxError> {
        let mut use_strict = None;
        while matches!(self.peek(), TokenKind::String(_)) {
            let snap = self.snapshot();
            let start = self.current.span.start;
            let token = self.advance();
            // A directive is a lone string expression statement.
            let is_directive = matches!(
                self.peek(),
                TokenKind::Semicolon | TokenKind::RBrace | TokenKind::Eof
            ) || self.current.newline_before;
            if !is_directive {
                self.restore(snap);
                break;
            }
            let raw = self.raw(token.span).to_string();
            if use_strict.is_none() && (raw == "\"use strict\"" || raw == "'use strict'") {
                use_strict = Some(token.span);
            }
            let value = match token.kind {
                TokenKind::String(value) => value,
                _ => unreachable!(),
            };
            let lit = self.finish(NodeKind::StringLiteral { value }, start);
            self.ast.node_mut(lit).extra.raw = Some(raw);
            self.expect_semicolon()?;
            let stmt = self.finish(NodeKind::ExpressionStatement { expression: lit }, start);
            stmts.push(stmt);
        }
        Ok(use_strict)
    }

    // =========================================================================
    // Statements
    // =========================================================================

    pub(crate) fn parse_stmt(&mut self) -> Result<NodeId, SyntaxError> {
        // Comments scanned since the previous statement lead this one.
        let pending_comments = self.lexer.take_comments();
        let stmt = self.parse_stmt_inner()?;
        if !pending_comments.is_empty() {
            self.ast.comments.insert(stmt, pending_comments);
        }
        Ok(stmt)
    }

    fn parse_stmt_inner(&mut self) -> Result<NodeId, SyntaxError> {
        let start = self.current.span.start;

        match self.peek() {
            // Declarations
            TokenKind::Var | TokenKind::Const => self.parse_var_decl(),
            TokenKind::Let => {
                // `let` is contextual: only a declaration when a binding
                // follows.
                if matches!(
                    self.lexer.peek().kind,
                    TokenKind::Identifier(_)
                        | TokenKind::LBracket
                        | TokenKind::LBrace
                        | TokenKind::Yield
                        | TokenKind::Await
                        | TokenKind::Async
                        | TokenKind::Of
                        | TokenKind::From
                        | TokenKind::As
                        | TokenKind::Get
                        | TokenKind::Set
                        | TokenKind::Static
                ) {
                    self.parse_var_decl()
                } else {
                    self.parse_expr_stmt()
                }
            }
            TokenKind::Function => {
                self.advance();
                self.parse_function(true, false, start)
            }
            TokenKind::Class => self.parse_class(true, Vec::new(), start),
            TokenKind::At => {
                let decorators = self.parse_decorators()?;
                let start = self.current.span.start;
                match self.peek() {
                    TokenKind::Class => self.parse_class(true, decorators, start),
                    TokenKind::Export => self.parse_export_decl(decorators),
                    _ => Err(self.error(
                        ErrorCode::InvalidDecoratorPosition,
                        "Decorators must precede a class",
                        self.current.span,
                    )),
                }
            }

            // Control flow
            TokenKind::If => self.parse_if_stmt(),
            TokenKind::Switch => self.parse_switch_stmt(),
            TokenKind::For => self.parse_for_stmt(),
            TokenKind::While => self.parse_while_stmt(),
            TokenKind::Do => self.parse_do_while_stmt(),
            TokenKind::Break => self.parse_break_continue(true),
            TokenKind::Continue => self.parse_break_continue(false),
            TokenKind::Return => self.parse_return_stmt(),
            TokenKind::Throw => self.parse_throw_stmt(),
            TokenKind::Try => self.parse_try_stmt(),
            TokenKind::With => self.parse_with_stmt(),
            TokenKind::Debugger => {
                self.advance();
                self.expect_semicolon()?;
                Ok(self.finish(NodeKind::DebuggerStatement, start))
            }

            // Block
            TokenKind::LBrace => self.parse_block_stmt(),

            // Empty statement
            TokenKind::Semicolon => {
                self.advance();
                Ok(self.finish(NodeKind::EmptyStatement, start))
            }

            // Modules
            TokenKind::Import => {
                let next = self.lexer.peek();
                if matches!(next.kind, TokenKind::LParen | TokenKind::Dot) {
                    self.parse_expr_stmt()
                } else {
                    self.parse_import_decl()
                }
            }
            TokenKind::Export => self.parse_export_decl(Vec::new()),

            // Async function (lookahead: no newline between `async` and
            // `function`)
            TokenKind::Async => {
                let next = self.lexer.peek();
                if matches!(next.kind, TokenKind::Function) && !next.newline_before {
                    self.advance(); // async
                    self.advance(); // function
                    self.parse_function(true, true, start)
                } else {
                    self.parse_expr_stmt()
                }
            }

            // Statement-position placeholder, or expression starting with
            // one.
            TokenKind::Placeholder => {
                let snap = self.snapshot();
                let placeholder = self.parse_placeholder(PlaceholderKind::Statement)?;
                if self.eat(&TokenKind::Colon) {
                    // `%%label%%: stmt`
                    self.retype_placeholder(placeholder, PlaceholderKind::Identifier);
                    let body = self.parse_stmt()?;
                    return Ok(self.finish(
                        NodeKind::LabeledStatement { label: placeholder, body },
                        start,
                    ));
                }
                let ends_statement = matches!(
                    self.peek(),
                    TokenKind::Semicolon | TokenKind::RBrace | TokenKind::Eof
                ) || self.current.newline_before;
                if ends_statement {
                    self.expect_semicolon()?;
                    return Ok(placeholder);
                }
                // Part of a larger expression; reparse as one.
                self.restore(snap);
                self.parse_expr_stmt()
            }

            // Labeled statement or expression statement
            TokenKind::Identifier(name) => {
                let name = name.clone();
                if matches!(self.lexer.peek().kind, TokenKind::Colon) {
                    self.parse_labeled_stmt(name)
                } else {
                    self.parse_expr_stmt()
                }
            }

            _ => self.parse_expr_stmt(),
        }
    }

    fn parse_labeled_stmt(&mut self, label: String) -> Result<NodeId, SyntaxError> {
        let start = self.current.span.start;
        let label_span = self.current.span;
        if self.labels.iter().any(|(l, _)| l == &label) {
            self.raise(
                ErrorCode::DuplicateLabel,
                format!("Label \"{label}\" is already declared"),
                label_span,
            )?;
        }
        self.advance(); // label
        self.advance(); // :

        // `continue label` is only valid when the label names a loop.
        let is_iteration = matches!(
            self.peek(),
            TokenKind::For | TokenKind::While | TokenKind::Do
        );
        self.labels.push((label.clone(), is_iteration));
        let body = self.parse_stmt();
        self.labels.pop();
        let body = body?;

        let label_node = self.ast.alloc(NodeKind::Identifier { name: label }, label_span);
        Ok(self.finish(NodeKind::LabeledStatement { label: label_node, body }, start))
    }

    fn parse_block_stmt(&mut self) -> Result<NodeId, SyntaxError> {
        let start = self.current.span.start;
        self.expect(&TokenKind::LBrace)?;
        self.push_scope(ParseScopeKind::Block);

        let mut body = Vec::new();
        let result = self.parse_stmt_list(&mut body, &TokenKind::RBrace);
        self.pop_scope();
        result?;

        self.expect(&TokenKind::RBrace)?;
        Ok(self.finish(NodeKind::BlockStatement { body }, start))
    }

    fn parse_stmt_list(
        &mut self,
        body: &mut Vec<NodeId>,
        close: &TokenKind,
    ) -> Result<(), SyntaxError> {
        while !self.check(close) && !self.is_eof() {
            match self.parse_stmt() {
                Ok(stmt) => body.push(stmt),
                Err(e) if self.options.error_recovery => {
                    let e = self.positioned(e);
                    self.errors.push(e);
                    self.synchronize();
                }
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    pub(crate) fn parse_var_decl(&mut self) -> Result<NodeId, SyntaxError> {
        let start = self.current.span.start;
        let kind = match self.peek() {
            TokenKind::Var => VarKind::Var,
            TokenKind::Let => VarKind::Let,
            TokenKind::Const => VarKind::Const,
            _ => return Err(self.unexpected()),
        };
        self.advance();

        let mut declarations = Vec::new();
        loop {
            declarations.push(self.parse_var_declarator(kind, false)?);
            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }
        self.expect_semicolon()?;
        Ok(self.finish(NodeKind::VariableDeclaration { kind, declarations }, start))
    }

    fn parse_var_declarator(
        &mut self,
        kind: VarKind,
        in_for_head: bool,
    ) -> Result<NodeId, SyntaxError> {
        let start = self.current.span.start;
        let id = self.parse_binding_atom()?;
        let bind = if kind == VarKind::Var { BindKind::Var } else { BindKind::Lexical };
        let disallow_let = kind != VarKind::Var;
        self.check_lval(id, bind, None, disallow_let, false)?;

        let init = if self.eat(&TokenKind::Eq) {
            Some(self.parse_assign_expr()?)
        } else {
            if kind == VarKind::Const && !in_for_head {
                self.raise(
                    ErrorCode::MissingInitializerInConst,
                    "Missing initializer in const declaration",
                    self.ast.span(id),
                )?;
            }
            None
        };
        Ok(self.finish(NodeKind::VariableDeclarator { id, init }, start))
    }

    fn parse_if_stmt(&mut self) -> Result<NodeId, SyntaxError> {
        let start = self.current.span.start;
        self.advance(); // if
        self.expect(&TokenKind::LParen)?;
        let test = self.parse_expression()?;
        self.expect(&TokenKind::RParen)?;
        let consequent = self.parse_stmt()?;
        let alternate = if self.eat(&TokenKind::Else) {
            Some(self.parse_stmt()?)
        } else {
            None
        };
        Ok(self.finish(NodeKind::IfStatement { test, consequent, alternate }, start))
    }

    fn parse_switch_stmt(&mut self) -> Result<NodeId, SyntaxError> {
        let start = self.current.span.start;
        self.advance(); // switch
        self.expect(&TokenKind::LParen)?;
        let discriminant = self.parse_expression()?;
        self.expect(&TokenKind::RParen)?;
        self.expect(&TokenKind::LBrace)?;

        self.push_scope(ParseScopeKind::Block);
        self.switch_depth += 1;
        let mut cases = Vec::new();
        let mut seen_default = false;
        let result = (|| -> Result<(), SyntaxError> {
            while !self.check(&TokenKind::RBrace) && !self.is_eof() {
                let case_start = self.current.span.start;
                let test = if self.eat(&TokenKind::Case) {
                    let test = self.parse_expression()?;
                    Some(test)
                } else {
                    let default_span = self.current.span;
                    self.expect(&TokenKind::Default)?;
                    if seen_default {
                        self.raise(
                            ErrorCode::DuplicateDefaultClause,
                            "Multiple default clauses",
                            default_span,
                        )?;
                    }
                    seen_default = true;
                    None
                };
                self.expect(&TokenKind::Colon)?;
                let mut consequent = Vec::new();
                while !matches!(
                    self.peek(),
                    TokenKind::Case | TokenKind::Default | TokenKind::RBrace | TokenKind::Eof
                ) {
                    consequent.push(self.parse_stmt()?);
                }
                cases.push(self.finish(NodeKind::SwitchCase { test, consequent }, case_start));
            }
            Ok(())
        })();
        self.switch_depth -= 1;
        self.pop_scope();
        result?;

        self.expect(&TokenKind::RBrace)?;
        Ok(self.finish(NodeKind::SwitchStatement { discriminant, cases }, start))
    }

    fn parse_for_stmt(&mut self) -> Result<NodeId, SyntaxError> {
        let start = self.current.span.start;
        self.advance(); // for
        let is_await = if self.check(&TokenKind::Await) {
            if !self.in_async {
                self.raise(
                    ErrorCode::AwaitOutsideAsync,
                    "`for await` is only allowed inside async functions",
                    self.current.span,
                )?;
            }
            self.advance();
            true
        } else {
            false
        };
        self.expect(&TokenKind::LParen)?;
        self.push_scope(ParseScopeKind::Block);
        let result = self.parse_for_stmt_inner(start, is_await);
        self.pop_scope();
        result
    }

    fn parse_for_stmt_inner(&mut self, start: u32, is_await: bool) -> Result<NodeId, SyntaxError> {
        // Empty init
        if self.eat(&TokenKind::Semicolon) {
            return self.parse_classic_for(start, None);
        }

        // Declaration head
        let decl_kind = if self.check(&TokenKind::Var) {
            Some(VarKind::Var)
        } else if self.check(&TokenKind::Const) {
            Some(VarKind::Const)
        } else if self.check(&TokenKind::Let)
            && matches!(
                self.lexer.peek().kind,
                TokenKind::Identifier(_) | TokenKind::LBracket | TokenKind::LBrace
            )
        {
            Some(VarKind::Let)
        } else {
            None
        };

        if let Some(kind) = decl_kind {
            let decl_start = self.current.span.start;
            self.advance();
            let saved = self.allow_in;
            self.allow_in = false;
            let mut declarations = vec![self.parse_var_declarator(kind, true)?];
            self.allow_in = saved;

            if matches!(self.peek(), TokenKind::In | TokenKind::Of) {
                let has_init =
                    matches!(self.ast.kind(declarations[0]), NodeKind::VariableDeclarator { init: Some(_), .. });
                if has_init {
                    self.raise(
                        ErrorCode::UnexpectedToken,
                        "for-in/for-of loop variable may not have an initializer",
                        self.ast.span(declarations[0]),
                    )?;
                }
                let left =
                    self.finish(NodeKind::VariableDeclaration { kind, declarations }, decl_start);
                return self.parse_for_in_of(start, left, is_await);
            }

            let saved = self.allow_in;
            self.allow_in = false;
            while self.eat(&TokenKind::Comma) {
                declarations.push(self.parse_var_declarator(kind, true)?);
            }
            self.allow_in = saved;
            let init =
                self.finish(NodeKind::VariableDeclaration { kind, declarations }, decl_start);
            self.expect(&TokenKind::Semicolon)?;
            return self.parse_classic_for(start, Some(init));
        }

        // Expression head
        let saved = self.allow_in;
        self.allow_in = false;
        let init = self.parse_expression();
        self.allow_in = saved;
        let init = init?;

        if matches!(self.peek(), TokenKind::In | TokenKind::Of) {
            self.to_assignable(init, true)?;
            self.check_lval(init, BindKind::None, None, false, false)?;
            return self.parse_for_in_of(start, init, is_await);
        }

        self.expect(&TokenKind::Semicolon)?;
        self.parse_classic_for(start, Some(init))
    }

    fn parse_for_in_of(
        &mut self,
        start: u32,
        left: NodeId,
        is_await: bool,
    ) -> Result<NodeId, SyntaxError> {
        let is_of = matches!(self.peek(), TokenKind::Of);
        if is_await && !is_of {
            self.raise(
                ErrorCode::UnexpectedToken,
                "`for await` must iterate with `of`",
                self.current.span,
            )?;
        }
        self.advance(); // in / of
        let right = if is_of { self.parse_assign_expr()? } else { self.parse_expression()? };
        self.expect(&TokenKind::RParen)?;
        self.loop_depth += 1;
        let body = self.parse_stmt();
        self.loop_depth -= 1;
        let body = body?;
        let kind = if is_of {
            NodeKind::ForOfStatement { left, right, body, is_await }
        } else {
            NodeKind::ForInStatement { left, right, body }
        };
        Ok(self.finish(kind, start))
    }

    fn parse_classic_for(
        &mut self,
        start: u32,
        init: Option<NodeId>,
    ) -> Result<NodeId, SyntaxError> {
        let test = if self.check(&TokenKind::Semicolon) { None } else { Some(self.parse_expression()?) };
        self.expect(&TokenKind::Semicolon)?;
        let update = if self.check(&TokenKind::RParen) { None } else { Some(self.parse_expression()?) };
        self.expect(&TokenKind::RParen)?;
        self.loop_depth += 1;
        let body = self.parse_stmt();
        self.loop_depth -= 1;
        let body = body?;
        Ok(self.finish(NodeKind::ForStatement { init, test, update, body }, start))
    }

    fn parse_while_stmt(&mut self) -> Result<NodeId, SyntaxError> {
        let start = self.current.span.start;
        self.advance(); // while
        self.expect(&TokenKind::LParen)?;
        let test = self.parse_expression()?;
        self.expect(&TokenKind::RParen)?;
        self.loop_depth += 1;
        let body = self.parse_stmt();
        self.loop_depth -= 1;
        let body = body?;
        Ok(self.finish(NodeKind::WhileStatement { test, body }, start))
    }

    fn parse_do_while_stmt(&mut self) -> Result<NodeId, SyntaxError> {
        let start = self.current.span.start;
        self.advance(); // do
        self.loop_depth += 1;
        let body = self.parse_stmt();
        self.loop_depth -= 1;
        let body = body?;
        self.expect(&TokenKind::While)?;
        self.expect(&TokenKind::LParen)?;
        let test = self.parse_expression()?;
        self.expect(&TokenKind::RParen)?;
        // A do-while may omit the semicolon entirely.
        self.eat(&TokenKind::Semicolon);
        Ok(self.finish(NodeKind::DoWhileStatement { body, test }, start))
    }

    fn parse_break_continue(&mut self, is_break: bool) -> Result<NodeId, SyntaxError> {
        let start = self.current.span.start;
        let keyword_span = self.current.span;
        self.advance();

        // Restricted production: a newline ends the statement.
        let label = if !self.current.newline_before {
            if let TokenKind::Identifier(name) = self.peek() {
                let name = name.clone();
                let span = self.current.span;
                self.advance();
                let found = self.labels.iter().find(|(l, _)| l == &name);
                match found {
                    None => {
                        self.raise(
                            ErrorCode::UnknownLabel,
                            format!("Undefined label \"{name}\""),
                            span,
                        )?;
                    }
                    Some((_, is_iteration)) if !is_break && !is_iteration => {
                        self.raise(
                            ErrorCode::UnknownLabel,
                            format!("Label \"{name}\" does not mark a loop"),
                            span,
                        )?;
                    }
                    _ => {}
                }
                Some(self.ast.alloc(NodeKind::Identifier { name }, span))
            } else {
                None
            }
        } else {
            None
        };

        if label.is_none() {
            if is_break && self.loop_depth == 0 && self.switch_depth == 0 {
                self.raise(ErrorCode::IllegalBreak, "Illegal break statement", keyword_span)?;
            }
            if !is_break && self.loop_depth == 0 {
                self.raise(ErrorCode::IllegalContinue, "Illegal continue statement", keyword_span)?;
            }
        }

        self.expect_semicolon()?;
        let kind = if is_break {
            NodeKind::BreakStatement { label }
        } else {
            NodeKind::ContinueStatement { label }
        };
        Ok(self.finish(kind, start))
    }

    fn parse_return_stmt(&mut self) -> Result<NodeId, SyntaxError> {
        let start = self.current.span.start;
        let keyword_span = self.current.span;
        if !self.in_function && !self.options.allow_return_outside_function {
            self.raise(
                ErrorCode::IllegalReturn,
                "`return` outside of function",
                keyword_span,
            )?;
        }
        self.advance();

        // Restricted production: `return` followed by a newline returns
        // undefined.
        let argument = if matches!(
            self.peek(),
            TokenKind::Semicolon | TokenKind::RBrace | TokenKind::Eof
        ) || self.current.newline_before
        {
            None
        } else {
            Some(self.parse_expression()?)
        };
        self.expect_semicolon()?;
        Ok(self.finish(NodeKind::ReturnStatement { argument }, start))
    }

    fn parse_throw_stmt(&mut self) -> Result<NodeId, SyntaxError> {
        let start = self.current.span.start;
        self.advance(); // throw
        if self.current.newline_before {
            self.raise(
                ErrorCode::NewlineAfterThrow,
                "Illegal newline after throw",
                self.current.span,
            )?;
        }
        let argument = self.parse_expression()?;
        self.expect_semicolon()?;
        Ok(self.finish(NodeKind::ThrowStatement { argument }, start))
    }

    fn parse_try_stmt(&mut self) -> Result<NodeId, SyntaxError> {
        let start = self.current.span.start;
        self.advance(); // try
        if !self.check(&TokenKind::LBrace) {
            return Err(self.unexpected());
        }
        let block = self.parse_block_stmt()?;

        let handler = if self.check(&TokenKind::Catch) {
            let catch_start = self.current.span.start;
            self.advance();
            self.push_scope(ParseScopeKind::Block);
            let result = (|| -> Result<NodeId, SyntaxError> {
                // The catch binding is optional.
                let param = if self.eat(&TokenKind::LParen) {
                    let param = self.parse_binding_atom()?;
                    self.check_lval(param, BindKind::CatchParam, None, false, false)?;
                    self.expect(&TokenKind::RParen)?;
                    Some(param)
                } else {
                    None
                };
                if !self.check(&TokenKind::LBrace) {
                    return Err(self.unexpected());
                }
                let body = self.parse_block_stmt()?;
                Ok(self.finish(NodeKind::CatchClause { param, body }, catch_start))
            })();
            self.pop_scope();
            Some(result?)
        } else {
            None
        };

        let finalizer = if self.eat(&TokenKind::Finally) {
            if !self.check(&TokenKind::LBrace) {
                return Err(self.unexpected());
            }
            Some(self.parse_block_stmt()?)
        } else {
            None
        };

        if handler.is_none() && finalizer.is_none() {
            return Err(self.error(
                ErrorCode::UnexpectedToken,
                "Missing catch or finally clause",
                self.current.span,
            ));
        }
        Ok(self.finish(NodeKind::TryStatement { block, handler, finalizer }, start))
    }

    fn parse_with_stmt(&mut self) -> Result<NodeId, SyntaxError> {
        let start = self.current.span.start;
        let keyword_span = self.current.span;
        if self.strict {
            self.raise(ErrorCode::StrictWith, "`with` in strict mode", keyword_span)?;
        }
        self.advance();
        self.expect(&TokenKind::LParen)?;
        let object = self.parse_expression()?;
        self.expect(&TokenKind::RParen)?;
        let body = self.parse_stmt()?;
        Ok(self.finish(NodeKind::WithStatement { object, body }, start))
    }

    fn parse_expr_stmt(&mut self) -> Result<NodeId, SyntaxError> {
        let start = self.current.span.start;
        let expression = self.parse_expression()?;
        if let Some(span) = self.pending_cover_init.take() {
            self.raise(
                ErrorCode::UnexpectedToken,
                "Shorthand property initializers are only valid in destructuring patterns",
                span,
            )?;
        }
        self.expect_semicolon()?;
        Ok(self.finish(NodeKind::ExpressionStatement { expression }, start))
    }

    // =========================================================================
    // Functions
    // =========================================================================

    fn enter_function(&mut self, is_async: bool, is_generator: bool) -> FnCtx {
        let ctx = FnCtx {
            in_function: self.in_function,
            in_async: self.in_async,
            in_generator: self.in_generator,
            strict: self.strict,
            loop_depth: self.loop_depth,
            switch_depth: self.switch_depth,
            labels_len: self.labels.len(),
        };
        self.in_function = true;
        self.in_async = is_async;
        self.in_generator = is_generator;
        self.loop_depth = 0;
        self.switch_depth = 0;
        self.labels.clear();
        ctx
    }

    fn exit_function(&mut self, ctx: FnCtx) {
        self.in_function = ctx.in_function;
        self.in_async = ctx.in_async;
        self.in_generator = ctx.in_generator;
        self.strict = ctx.strict;
        self.loop_depth = ctx.loop_depth;
        self.switch_depth = ctx.switch_depth;
        self.labels.truncate(ctx.labels_len);
    }

    /// Parse a function after `function` (and any `async`) has been
    /// consumed.
    pub(crate) fn parse_function(
        &mut self,
        is_stmt: bool,
        is_async: bool,
        start: u32,
    ) -> Result<NodeId, SyntaxError> {
        let is_generator = self.eat(&TokenKind::Star);

        let id = if matches!(self.peek(), TokenKind::Identifier(_)) || self.peek().contextual_name().is_some() {
            let id = self.parse_identifier(false)?;
            if is_stmt {
                let name = self.ast.ident_name(id).unwrap_or_default().to_string();
                let span = self.ast.span(id);
                self.declare_name(&name, BindKind::Function, span)?;
            }
            Some(id)
        } else if is_stmt {
            return Err(self.error(
                ErrorCode::UnexpectedToken,
                "Function declarations require a name",
                self.current.span,
            ));
        } else {
            None
        };

        let ctx = self.enter_function(is_async, is_generator);
        self.push_scope(ParseScopeKind::Function);
        let result = self.parse_function_rest(id, is_stmt, is_async, is_generator, start);
        self.pop_scope();
        self.exit_function(ctx);
        result
    }

    fn parse_function_rest(
        &mut self,
        id: Option<NodeId>,
        is_stmt: bool,
        is_async: bool,
        is_generator: bool,
        start: u32,
    ) -> Result<NodeId, SyntaxError> {
        let params = self.parse_params()?;
        let body = self.parse_function_body(&params, id)?;
        let kind = if is_stmt {
            NodeKind::FunctionDeclaration { id, params, body, is_async, is_generator }
        } else {
            NodeKind::FunctionExpression { id, params, body, is_async, is_generator }
        };
        Ok(self.finish(kind, start))
    }

    pub(crate) fn parse_params(&mut self) -> Result<Vec<NodeId>, SyntaxError> {
        self.expect(&TokenKind::LParen)?;
        let mut params = Vec::new();
        while !self.check(&TokenKind::RParen) && !self.is_eof() {
            if self.check(&TokenKind::Spread) {
                let rest_start = self.current.span.start;
                self.advance();
                let argument = self.parse_binding_atom()?;
                let rest = self.finish(NodeKind::RestElement { argument }, rest_start);
                params.push(rest);
                if self.check(&TokenKind::Comma) {
                    self.raise(
                        ErrorCode::RestTrailingComma,
                        "A rest parameter must be last",
                        self.current.span,
                    )?;
                    self.advance();
                }
                break;
            }
            let param = self.parse_binding_element()?;
            self.check_lval(param, BindKind::Param, None, false, false)?;
            params.push(param);
            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }
        self.expect(&TokenKind::RParen)?;
        Ok(params)
    }

    /// A binding pattern with an optional default: `x = 1`, `{a} = {}`.
    fn parse_binding_element(&mut self) -> Result<NodeId, SyntaxError> {
        let start = self.current.span.start;
        let left = self.parse_binding_atom()?;
        if self.eat(&TokenKind::Eq) {
            let right = self.parse_assign_expr()?;
            return Ok(self.finish(NodeKind::AssignmentPattern { left, right }, start));
        }
        Ok(left)
    }

    /// Parse a function body block, handling directives and retroactive
    /// strict-mode validation of the already-parsed parameter list.
    fn parse_function_body(
        &mut self,
        params: &[NodeId],
        id: Option<NodeId>,
    ) -> Result<NodeId, SyntaxError> {
        let start = self.current.span.start;
        self.expect(&TokenKind::LBrace)?;

        let mut body = Vec::new();
        let use_strict = self.parse_directive_prologue(&mut body)?;
        let strict_mode_changed = use_strict.is_some() && !self.strict;
        if use_strict.is_some() {
            self.strict = true;
        }

        if strict_mode_changed {
            let directive_span = use_strict.expect("directive span present");
            self.apply_retroactive_strict_checks(params, id, directive_span)?;
        }
        // Parameter duplicates are always an error in strict mode and for
        // non-simple parameter lists.
        let simple = self.params_are_simple(params);
        if self.strict || !simple {
            self.check_param_dupes(params)?;
        }

        self.parse_stmt_list(&mut body, &TokenKind::RBrace)?;
        self.expect(&TokenKind::RBrace)?;
        Ok(self.finish(NodeKind::BlockStatement { body }, start))
    }

    fn params_are_simple(&self, params: &[NodeId]) -> bool {
        params
            .iter()
            .all(|p| matches!(self.ast.kind(*p), NodeKind::Identifier { .. }))
    }

    fn check_param_dupes(&mut self, params: &[NodeId]) -> Result<(), SyntaxError> {
        let mut seen = FxHashSet::default();
        for param in params {
            for id in self.ast.binding_identifiers(*param) {
                let name = self.ast.ident_name(id).unwrap_or_default().to_string();
                if !seen.insert(name.clone()) {
                    self.raise(
                        ErrorCode::ParamDupe,
                        format!("Duplicate parameter name \"{name}\""),
                        self.ast.span(id),
                    )?;
                }
            }
        }
        Ok(())
    }

    /// A `"use strict"` directive was found after the parameter list was
    /// accepted under sloppy rules; re-validate what strictness forbids.
    fn apply_retroactive_strict_checks(
        &mut self,
        params: &[NodeId],
        id: Option<NodeId>,
        directive_span: Span,
    ) -> Result<(), SyntaxError> {
        if !self.params_are_simple(params) {
            self.raise(
                ErrorCode::IllegalUseStrict,
                "Illegal \"use strict\" directive in function with non-simple parameter list",
                directive_span,
            )?;
        }

        for param in params {
            for ident in self.ast.binding_identifiers(*param) {
                let name = self.ast.ident_name(ident).unwrap_or_default().to_string();
                if crate::token::is_strict_bind_reserved_word(&name) {
                    self.raise(
                        ErrorCode::StrictEvalArgumentsBinding,
                        format!("Binding \"{name}\" in strict mode"),
                        self.ast.span(ident),
                    )?;
                }
            }
            self.check_no_octal_in_subtree(*param)?;
        }

        if let Some(id) = id {
            let name = self.ast.ident_name(id).unwrap_or_default().to_string();
            if crate::token::is_strict_bind_reserved_word(&name) {
                self.raise(
                    ErrorCode::StrictFunctionName,
                    format!("Function name \"{name}\" in strict mode"),
                    self.ast.span(id),
                )?;
            }
        }
        Ok(())
    }

    /// Legacy octal literals accepted while sloppy become errors once the
    /// enclosing function turns strict.
    fn check_no_octal_in_subtree(&mut self, id: NodeId) -> Result<(), SyntaxError> {
        if self.ast.node(id).extra.octal {
            let span = self.ast.span(id);
            self.raise(
                ErrorCode::StrictOctalLiteral,
                "Legacy octal literals are not allowed in strict mode",
                span,
            )?;
        }
        for child in self.ast.children(id) {
            self.check_no_octal_in_subtree(child.id)?;
        }
        Ok(())
    }

    // =========================================================================
    // Binding atoms (declaration-position patterns)
    // =========================================================================

    /// An lvalue atom in binding position: identifier, array pattern, or
    /// object pattern.
    pub(crate) fn parse_binding_atom(&mut self) -> Result<NodeId, SyntaxError> {
        match self.peek() {
            TokenKind::LBracket => self.parse_array_pattern(),
            TokenKind::LBrace => self.parse_object_pattern(),
            TokenKind::Placeholder => {
                let node = self.parse_placeholder(PlaceholderKind::Pattern)?;
                Ok(node)
            }
            _ => self.parse_identifier(false),
        }
    }

    fn parse_array_pattern(&mut self) -> Result<NodeId, SyntaxError> {
        let start = self.current.span.start;
        self.expect(&TokenKind::LBracket)?;
        let mut elements = Vec::new();
        while !self.check(&TokenKind::RBracket) && !self.is_eof() {
            if self.eat(&TokenKind::Comma) {
                elements.push(None); // hole
                continue;
            }
            if self.check(&TokenKind::Spread) {
                let rest_start = self.current.span.start;
                self.advance();
                let argument = self.parse_binding_atom()?;
                let rest = self.finish(NodeKind::RestElement { argument }, rest_start);
                elements.push(Some(rest));
                if self.check(&TokenKind::Comma) {
                    self.raise(
                        ErrorCode::ElementAfterRest,
                        "Rest element must be last",
                        self.current.span,
                    )?;
                }
                break;
            }
            elements.push(Some(self.parse_binding_element()?));
            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }
        self.expect(&TokenKind::RBracket)?;
        Ok(self.finish(NodeKind::ArrayPattern { elements }, start))
    }

    fn parse_object_pattern(&mut self) -> Result<NodeId, SyntaxError> {
        let start = self.current.span.start;
        self.expect(&TokenKind::LBrace)?;
        let mut properties = Vec::new();
        while !self.check(&TokenKind::RBrace) && !self.is_eof() {
            if self.check(&TokenKind::Spread) {
                let rest_start = self.current.span.start;
                self.advance();
                let argument = self.parse_identifier(false)?;
                let rest = self.finish(NodeKind::RestElement { argument }, rest_start);
                properties.push(rest);
                if self.check(&TokenKind::Comma) {
                    self.raise(
                        ErrorCode::ElementAfterRest,
                        "Rest element must be last",
                        self.current.span,
                    )?;
                }
                break;
            }

            let prop_start = self.current.span.start;
            let (key, computed) = self.parse_property_key()?;
            if self.eat(&TokenKind::Colon) {
                let value = self.parse_binding_element()?;
                properties.push(self.finish(
                    NodeKind::ObjectProperty { key, value, computed, shorthand: false },
                    prop_start,
                ));
            } else {
                // Shorthand: the key doubles as the bound name.
                let name = match self.ast.ident_name(key) {
                    Some(name) => name.to_string(),
                    None => {
                        return Err(self.error(
                            ErrorCode::UnexpectedToken,
                            "Invalid shorthand property in pattern",
                            self.ast.span(key),
                        ))
                    }
                };
                let value_span = self.ast.span(key);
                let ident = self.ast.alloc(NodeKind::Identifier { name }, value_span);
                let value = if self.eat(&TokenKind::Eq) {
                    let right = self.parse_assign_expr()?;
                    self.finish(NodeKind::AssignmentPattern { left: ident, right }, prop_start)
                } else {
                    ident
                };
                properties.push(self.finish(
                    NodeKind::ObjectProperty { key, value, computed, shorthand: true },
                    prop_start,
                ));
            }
            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }
        self.expect(&TokenKind::RBrace)?;
        Ok(self.finish(NodeKind::ObjectPattern { properties }, start))
    }

    /// Property key: identifier, keyword-as-name, string, number, or
    /// `[computed]`.
    fn parse_property_key(&mut self) -> Result<(NodeId, bool), SyntaxError> {
        let start = self.current.span.start;
        match self.peek().clone() {
            TokenKind::LBracket => {
                self.advance();
                let key = self.parse_assign_expr()?;
                self.expect(&TokenKind::RBracket)?;
                Ok((key, true))
            }
            TokenKind::String(value) => {
                let token = self.advance();
                let key = self.finish(NodeKind::StringLiteral { value }, start);
                self.ast.node_mut(key).extra.raw = Some(self.raw(token.span).to_string());
                Ok((key, false))
            }
            TokenKind::Number(value) => {
                let token = self.advance();
                let key = self.finish(NodeKind::NumericLiteral { value }, start);
                self.ast.node_mut(key).extra.raw = Some(self.raw(token.span).to_string());
                Ok((key, false))
            }
            TokenKind::Identifier(name) => {
                self.advance();
                Ok((self.finish(NodeKind::Identifier { name }, start), false))
            }
            TokenKind::Placeholder if self.exts.placeholders() => {
                let key = self.parse_placeholder(PlaceholderKind::Identifier)?;
                Ok((key, false))
            }
            other => {
                // Keywords are fine as property names.
                if let Some(text) = keyword_text(&other) {
                    self.advance();
                    Ok((self.finish(NodeKind::Identifier { name: text.to_string() }, start), false))
                } else {
                    Err(self.unexpected())
                }
            }
        }
    }

    // =========================================================================
    // Classes
    // =========================================================================

    fn parse_class(
        &mut self,
        is_stmt: bool,
        decorators: Vec<NodeId>,
        start: u32,
    ) -> Result<NodeId, SyntaxError> {
        self.expect(&TokenKind::Class)?;

        let id = if matches!(self.peek(), TokenKind::Identifier(_)) {
            let id = self.parse_identifier(false)?;
            if is_stmt {
                let name = self.ast.ident_name(id).unwrap_or_default().to_string();
                let span = self.ast.span(id);
                self.declare_name(&name, BindKind::Class, span)?;
            }
            Some(id)
        } else if is_stmt {
            return Err(self.error(
                ErrorCode::UnexpectedToken,
                "Class declarations require a name",
                self.current.span,
            ));
        } else {
            None
        };

        // Class bodies are always strict.
        let saved_strict = self.strict;
        self.strict = true;
        let result = self.parse_class_rest(is_stmt, id, decorators, start);
        self.strict = saved_strict;
        result
    }

    fn parse_class_rest(
        &mut self,
        is_stmt: bool,
        id: Option<NodeId>,
        decorators: Vec<NodeId>,
        start: u32,
    ) -> Result<NodeId, SyntaxError> {
        let super_class = if self.eat(&TokenKind::Extends) {
            Some(self.parse_lhs_expr()?)
        } else {
            None
        };
        self.expect(&TokenKind::LBrace)?;

        let mut body = Vec::new();
        let mut seen_constructor = false;
        while !self.check(&TokenKind::RBrace) && !self.is_eof() {
            if self.eat(&TokenKind::Semicolon) {
                continue;
            }
            let member = self.parse_class_member(&mut seen_constructor)?;
            body.push(member);
        }
        self.expect(&TokenKind::RBrace)?;

        let kind = if is_stmt {
            NodeKind::ClassDeclaration { id, super_class, body, decorators }
        } else {
            NodeKind::ClassExpression { id, super_class, body, decorators }
        };
        Ok(self.finish(kind, start))
    }

    fn parse_class_member(&mut self, seen_constructor: &mut bool) -> Result<NodeId, SyntaxError> {
        let start = self.current.span.start;

        let mut decorators = Vec::new();
        if self.check(&TokenKind::At) {
            decorators = self.parse_decorators()?;
        }

        // `static` prefix, unless it is a member named "static".
        let mut is_static = false;
        if self.check(&TokenKind::Static) {
            let next = self.lexer.peek();
            if !matches!(next.kind, TokenKind::LParen | TokenKind::Eq | TokenKind::Semicolon | TokenKind::RBrace) {
                self.advance();
                is_static = true;
            }
        }

        // `static { ... }` initialization block.
        if is_static && self.check(&TokenKind::LBrace) {
            let ctx = self.enter_function(false, false);
            self.push_scope(ParseScopeKind::Function);
            let block = self.parse_block_stmt();
            self.pop_scope();
            self.exit_function(ctx);
            let block = block?;
            let body = match self.ast.kind(block) {
                NodeKind::BlockStatement { body } => body.clone(),
                _ => Vec::new(),
            };
            return Ok(self.finish(NodeKind::StaticBlock { body }, start));
        }

        // Method modifiers: async / generator / get / set.
        let mut is_async = false;
        let mut is_generator = false;
        let mut accessor: Option<MethodKind> = None;

        if self.check(&TokenKind::Async) {
            let next = self.lexer.peek();
            if !matches!(next.kind, TokenKind::LParen | TokenKind::Eq | TokenKind::Semicolon | TokenKind::RBrace)
                && !next.newline_before
            {
                self.advance();
                is_async = true;
            }
        }
        if self.eat(&TokenKind::Star) {
            is_generator = true;
        }
        if !is_async && !is_generator && matches!(self.peek(), TokenKind::Get | TokenKind::Set) {
            let next = self.lexer.peek();
            if !matches!(next.kind, TokenKind::LParen | TokenKind::Eq | TokenKind::Semicolon | TokenKind::RBrace) {
                accessor = Some(if self.check(&TokenKind::Get) { MethodKind::Get } else { MethodKind::Set });
                self.advance();
            }
        }

        let (key, computed) = self.parse_property_key()?;

        // Method
        if self.check(&TokenKind::LParen) {
            let mut kind = accessor.unwrap_or(MethodKind::Method);
            let is_constructor = !is_static
                && !computed
                && self.ast.ident_name(key) == Some("constructor");
            if is_constructor {
                if *seen_constructor {
                    self.raise(
                        ErrorCode::DuplicateConstructor,
                        "Duplicate constructor",
                        self.ast.span(key),
                    )?;
                }
                *seen_constructor = true;
                if accessor.is_some() {
                    self.raise(
                        ErrorCode::ConstructorIsAccessor,
                        "Constructor can't be an accessor",
                        self.ast.span(key),
                    )?;
                }
                if is_generator {
                    self.raise(
                        ErrorCode::ConstructorIsGenerator,
                        "Constructor can't be a generator",
                        self.ast.span(key),
                    )?;
                }
                if is_async {
                    self.raise(
                        ErrorCode::ConstructorIsAsync,
                        "Constructor can't be async",
                        self.ast.span(key),
                    )?;
                }
                kind = MethodKind::Constructor;
            }

            let ctx = self.enter_function(is_async, is_generator);
            self.push_scope(ParseScopeKind::Function);
            let result = (|| -> Result<(Vec<NodeId>, NodeId), SyntaxError> {
                let params = self.parse_params()?;
                let body = self.parse_function_body(&params, None)?;
                Ok((params, body))
            })();
            self.pop_scope();
            self.exit_function(ctx);
            let (params, body) = result?;

            match kind {
                MethodKind::Get if !params.is_empty() => {
                    self.raise(
                        ErrorCode::UnexpectedToken,
                        "Getter must have no parameters",
                        self.ast.span(key),
                    )?;
                }
                MethodKind::Set if params.len() != 1 => {
                    self.raise(
                        ErrorCode::UnexpectedToken,
                        "Setter must have exactly one parameter",
                        self.ast.span(key),
                    )?;
                }
                _ => {}
            }

            return Ok(self.finish(
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
                },
                start,
            ));
        }

        // Property
        let value = if self.eat(&TokenKind::Eq) {
            Some(self.parse_assign_expr()?)
        } else {
            None
        };
        self.expect_semicolon()?;
        Ok(self.finish(
            NodeKind::ClassProperty { key, value, computed, is_static, decorators },
            start,
        ))
    }

    fn parse_decorators(&mut self) -> Result<Vec<NodeId>, SyntaxError> {
        if !self.exts.decorators() {
            return Err(self.error(
                ErrorCode::UnsupportedSyntax,
                "Decorators are not enabled (enable the \"decorators\" capability)",
                self.current.span,
            ));
        }
        let mut decorators = Vec::new();
        while self.check(&TokenKind::At) {
            let start = self.current.span.start;
            self.advance();
            let expression = self.parse_lhs_expr()?;
            decorators.push(self.finish(NodeKind::Decorator { expression }, start));
        }
        Ok(decorators)
    }

    // =========================================================================
    // Modules
    // =========================================================================

    fn require_module(&mut self, code: ErrorCode, span: Span) -> Result<(), SyntaxError> {
        if !self.in_module {
            let what = if code == ErrorCode::ImportOutsideModule { "import" } else { "export" };
            self.raise(code, format!("`{what}` is only allowed in modules"), span)?;
        }
        Ok(())
    }

    fn parse_import_decl(&mut self) -> Result<NodeId, SyntaxError> {
        let start = self.current.span.start;
        let keyword_span = self.current.span;
        self.require_module(ErrorCode::ImportOutsideModule, keyword_span)?;
        self.advance(); // import

        let mut specifiers = Vec::new();

        // Bare import: `import "mod";`
        if let TokenKind::String(_) = self.peek() {
            let source = self.parse_string_literal()?;
            self.expect_semicolon()?;
            return Ok(self.finish(NodeKind::ImportDeclaration { specifiers, source }, start));
        }

        let mut expect_from = false;
        // Default import
        if matches!(self.peek(), TokenKind::Identifier(_) | TokenKind::Placeholder) {
            let local = if self.check(&TokenKind::Placeholder) {
                self.parse_placeholder(PlaceholderKind::Identifier)?
            } else {
                self.parse_identifier(false)?
            };
            self.declare_import_binding(local)?;
            let spec_span = self.ast.span(local);
            let spec = self.ast.alloc(NodeKind::ImportDefaultSpecifier { local }, spec_span);
            specifiers.push(spec);
            expect_from = true;
            if self.eat(&TokenKind::Comma) {
                expect_from = false;
            }
        }

        if !expect_from {
            if self.check(&TokenKind::Star) {
                // Namespace import
                let ns_start = self.current.span.start;
                self.advance();
                self.expect(&TokenKind::As)?;
                let local = self.parse_identifier(false)?;
                self.declare_import_binding(local)?;
                specifiers.push(self.finish(NodeKind::ImportNamespaceSpecifier { local }, ns_start));
            } else if self.eat(&TokenKind::LBrace) {
                // Named imports
                while !self.check(&TokenKind::RBrace) && !self.is_eof() {
                    let spec_start = self.current.span.start;
                    let imported = self.parse_module_export_name()?;
                    let local = if self.eat(&TokenKind::As) {
                        self.parse_identifier(false)?
                    } else {
                        let name = self.ast.ident_name(imported).unwrap_or_default().to_string();
                        let span = self.ast.span(imported);
                        self.ast.alloc(NodeKind::Identifier { name }, span)
                    };
                    self.declare_import_binding(local)?;
                    specifiers
                        .push(self.finish(NodeKind::ImportSpecifier { local, imported }, spec_start));
                    if !self.eat(&TokenKind::Comma) {
                        break;
                    }
                }
                self.expect(&TokenKind::RBrace)?;
            } else if specifiers.is_empty() {
                return Err(self.unexpected());
            }
        }

        self.expect(&TokenKind::From)?;
        let source = self.parse_string_literal()?;
        self.expect_semicolon()?;
        Ok(self.finish(NodeKind::ImportDeclaration { specifiers, source }, start))
    }

    fn declare_import_binding(&mut self, local: NodeId) -> Result<(), SyntaxError> {
        let name = self.ast.ident_name(local).unwrap_or_default().to_string();
        let span = self.ast.span(local);
        self.declare_name(&name, BindKind::Lexical, span)
    }

    /// `a` or `"string name"` in import/export specifier position.
    fn parse_module_export_name(&mut self) -> Result<NodeId, SyntaxError> {
        if let TokenKind::String(_) = self.peek() {
            self.parse_string_literal()
        } else {
            self.parse_identifier(true)
        }
    }

    fn parse_string_literal(&mut self) -> Result<NodeId, SyntaxError> {
        let start = self.current.span.start;
        match self.peek().clone() {
            TokenKind::String(value) => {
                let token = self.advance();
                let lit = self.finish(NodeKind::StringLiteral { value }, start);
                self.ast.node_mut(lit).extra.raw = Some(self.raw(token.span).to_string());
                Ok(lit)
            }
            _ => Err(self.unexpected()),
        }
    }

    fn parse_export_decl(&mut self, decorators: Vec<NodeId>) -> Result<NodeId, SyntaxError> {
        let start = self.current.span.start;
        let keyword_span = self.current.span;
        self.require_module(ErrorCode::ExportOutsideModule, keyword_span)?;
        self.advance(); // export

        // export * [as name] from "mod"
        if self.eat(&TokenKind::Star) {
            let exported = if self.eat(&TokenKind::As) {
                Some(self.parse_module_export_name()?)
            } else {
                None
            };
            self.expect(&TokenKind::From)?;
            let source = self.parse_string_literal()?;
            self.expect_semicolon()?;
            return Ok(self.finish(NodeKind::ExportAllDeclaration { source, exported }, start));
        }

        // export default ...
        if self.eat(&TokenKind::Default) {
            let decl_start = self.current.span.start;
            let declaration = if self.check(&TokenKind::Function) {
                self.advance();
                self.parse_function(false, false, decl_start)?
            } else if self.check(&TokenKind::Async)
                && matches!(self.lexer.peek().kind, TokenKind::Function)
            {
                self.advance();
                self.advance();
                self.parse_function(false, true, decl_start)?
            } else if self.check(&TokenKind::Class) {
                self.parse_class(false, decorators, decl_start)?
            } else {
                let expr = self.parse_assign_expr()?;
                self.expect_semicolon()?;
                expr
            };
            return Ok(self.finish(NodeKind::ExportDefaultDeclaration { declaration }, start));
        }

        // export { a, b as c } [from "mod"]
        if self.eat(&TokenKind::LBrace) {
            let mut specifiers = Vec::new();
            while !self.check(&TokenKind::RBrace) && !self.is_eof() {
                let spec_start = self.current.span.start;
                let local = self.parse_module_export_name()?;
                let exported = if self.eat(&TokenKind::As) {
                    self.parse_module_export_name()?
                } else {
                    let name = self.ast.ident_name(local).unwrap_or_default().to_string();
                    let span = self.ast.span(local);
                    self.ast.alloc(NodeKind::Identifier { name }, span)
                };
                specifiers.push(self.finish(NodeKind::ExportSpecifier { local, exported }, spec_start));
                if !self.eat(&TokenKind::Comma) {
                    break;
                }
            }
            self.expect(&TokenKind::RBrace)?;
            let source = if self.eat(&TokenKind::From) {
                Some(self.parse_string_literal()?)
            } else {
                None
            };
            self.expect_semicolon()?;
            return Ok(self.finish(
                NodeKind::ExportNamedDeclaration { declaration: None, specifiers, source },
                start,
            ));
        }

        // export <declaration>
        let decl_start = self.current.span.start;
        let declaration = if matches!(
            self.peek(),
            TokenKind::Var | TokenKind::Let | TokenKind::Const
        ) {
            self.parse_var_decl()?
        } else if self.check(&TokenKind::Function) {
            self.advance();
            self.parse_function(true, false, decl_start)?
        } else if self.check(&TokenKind::Async)
            && matches!(self.lexer.peek().kind, TokenKind::Function)
        {
            self.advance();
            self.advance();
            self.parse_function(true, true, decl_start)?
        } else if self.check(&TokenKind::Class) {
            self.parse_class(true, decorators, decl_start)?
        } else {
            return Err(self.unexpected());
        };
        Ok(self.finish(
            NodeKind::ExportNamedDeclaration {
                declaration: Some(declaration),
                specifiers: Vec::new(),
                source: None,
            },
            start,
        ))
    }

    // =========================================================================
    // Expressions
    // =========================================================================

    /// Full expression, including comma sequences.
    pub(crate) fn parse_expression(&mut self) -> Result<NodeId, SyntaxError> {
        let start = self.current.span.start;
        let first = self.parse_assign_expr()?;
        if !self.check(&TokenKind::Comma) {
            return Ok(first);
        }
        let mut expressions = vec![first];
        while self.eat(&TokenKind::Comma) {
            expressions.push(self.parse_assign_expr()?);
        }
        Ok(self.finish(NodeKind::SequenceExpression { expressions }, start))
    }

    pub(crate) fn parse_assign_expr(&mut self) -> Result<NodeId, SyntaxError> {
        let start = self.current.span.start;

        // Yield expressions sit at assignment precedence.
        if self.check(&TokenKind::Yield) && self.in_generator {
            return self.parse_yield_expr();
        }

        // Single-identifier arrows: `x => ...`, `async x => ...`.
        if let Some(arrow) = self.try_parse_ident_arrow(start)? {
            return Ok(arrow);
        }

        let left = self.parse_conditional_expr()?;

        if self.peek().is_assignment() {
            let op = assign_op_for(self.peek()).expect("assignment token maps to an operator");
            if op == AssignOp::Assign {
                self.to_assignable(left, true)?;
                self.check_lval(left, BindKind::None, None, false, false)?;
            } else {
                // Compound assignment requires a simple target.
                if !matches!(
                    self.ast.kind(left),
                    NodeKind::Identifier { .. } | NodeKind::MemberExpression { .. }
                ) {
                    self.raise(
                        ErrorCode::InvalidLhs,
                        "Invalid left-hand side in assignment",
                        self.ast.span(left),
                    )?;
                }
                self.check_lval(left, BindKind::None, None, false, false)?;
            }
            self.advance();
            let right = self.parse_assign_expr()?;
            return Ok(self.finish(NodeKind::AssignmentExpression { op, left, right }, start));
        }

        Ok(left)
    }

    /// `x => ...` and `async x => ...` without parentheses.
    fn try_parse_ident_arrow(&mut self, start: u32) -> Result<Option<NodeId>, SyntaxError> {
        let kind = self.peek().clone();
        let ident_like = matches!(kind, TokenKind::Identifier(_))
            || (self.identifier_allowed(&kind) && !matches!(kind, TokenKind::Async));
        if ident_like && matches!(self.lexer.peek().kind, TokenKind::Arrow) {
            let param = self.parse_identifier(false)?;
            return Ok(Some(self.parse_arrow_body(vec![param], false, start)?));
        }
        if self.check(&TokenKind::Async) && !self.lexer.peek().newline_before {
            if let TokenKind::Identifier(_) = self.lexer.peek().kind {
                let snap = self.snapshot();
                self.advance(); // async
                if matches!(self.lexer.peek().kind, TokenKind::Arrow) {
                    let param = self.parse_identifier(false)?;
                    return Ok(Some(self.parse_arrow_body(vec![param], true, start)?));
                }
                self.restore(snap);
            }
        }
        Ok(None)
    }

    fn parse_yield_expr(&mut self) -> Result<NodeId, SyntaxError> {
        let start = self.current.span.start;
        self.advance(); // yield
        let delegate = !self.current.newline_before && self.eat(&TokenKind::Star);
        let argument = if !self.current.newline_before && self.peek().can_start_expr() {
            Some(self.parse_assign_expr()?)
        } else if delegate {
            return Err(self.unexpected());
        } else {
            None
        };
        Ok(self.finish(NodeKind::YieldExpression { argument, delegate }, start))
    }

    fn parse_conditional_expr(&mut self) -> Result<NodeId, SyntaxError> {
        let start = self.current.span.start;
        let test = self.parse_binary_expr(0)?;
        if !self.eat(&TokenKind::Question) {
            return Ok(test);
        }
        let saved = self.allow_in;
        self.allow_in = true;
        let consequent = self.parse_assign_expr();
        self.allow_in = saved;
        let consequent = consequent?;
        self.expect(&TokenKind::Colon)?;
        let alternate = self.parse_assign_expr()?;
        Ok(self.finish(
            NodeKind::ConditionalExpression { test, consequent, alternate },
            start,
        ))
    }

    fn parse_binary_expr(&mut self, min_prec: u8) -> Result<NodeId, SyntaxError> {
        let start = self.current.span.start;
        let mut left = self.parse_unary_expr()?;

        loop {
            let (prec, op) = match self.peek().binary_precedence() {
                Some(prec) => {
                    let op = binary_op_for(self.peek()).expect("precedence implies an operator");
                    (prec, op)
                }
                None => match self.exts.infix(self.peek()) {
                    Some((prec, op)) => (prec, op),
                    None => break,
                },
            };
            if prec < min_prec {
                break;
            }
            if op == BinaryOp::In && !self.allow_in {
                break;
            }

            // `??` cannot mix with `&&`/`||` without parentheses.
            if op == BinaryOp::NullishCoalesce {
                if let NodeKind::BinaryExpression { op: BinaryOp::And | BinaryOp::Or, .. } =
                    self.ast.kind(left)
                {
                    if !self.ast.node(left).extra.parenthesized {
                        self.raise(
                            ErrorCode::UnexpectedToken,
                            "Nullish coalescing cannot be mixed with logical operators without parentheses",
                            self.current.span,
                        )?;
                    }
                }
            }
            // `-a ** b` is ambiguous and rejected.
            if op == BinaryOp::Pow
                && matches!(self.ast.kind(left), NodeKind::UnaryExpression { .. })
                && !self.ast.node(left).extra.parenthesized
            {
                self.raise(
                    ErrorCode::UnexpectedToken,
                    "Unary operand of ** must be parenthesized",
                    self.ast.span(left),
                )?;
            }

            let op_token = self.advance();
            let next_min = if op_token.kind.is_right_associative() { prec } else { prec + 1 };
            let right = self.parse_binary_expr(next_min)?;

            if op == BinaryOp::And || op == BinaryOp::Or {
                if let NodeKind::BinaryExpression { op: BinaryOp::NullishCoalesce, .. } =
                    self.ast.kind(right)
                {
                    if !self.ast.node(right).extra.parenthesized {
                        self.raise(
                            ErrorCode::UnexpectedToken,
                            "Nullish coalescing cannot be mixed with logical operators without parentheses",
                            self.ast.span(right),
                        )?;
                    }
                }
            }

            left = self.finish(NodeKind::BinaryExpression { op, left, right }, start);
        }
        Ok(left)
    }

    fn parse_unary_expr(&mut self) -> Result<NodeId, SyntaxError> {
        let start = self.current.span.start;
        let op = match self.peek() {
            TokenKind::Plus => Some(UnaryOp::Plus),
            TokenKind::Minus => Some(UnaryOp::Minus),
            TokenKind::Bang => Some(UnaryOp::Not),
            TokenKind::Tilde => Some(UnaryOp::BitNot),
            TokenKind::Typeof => Some(UnaryOp::Typeof),
            TokenKind::Void => Some(UnaryOp::Void),
            TokenKind::Delete => Some(UnaryOp::Delete),
            _ => None,
        };
        if let Some(op) = op {
            let op_span = self.current.span;
            self.advance();
            let argument = self.parse_unary_expr()?;
            if op == UnaryOp::Delete
                && self.strict
                && matches!(self.ast.kind(argument), NodeKind::Identifier { .. })
            {
                self.raise(
                    ErrorCode::StrictDelete,
                    "Deleting a plain variable in strict mode",
                    op_span,
                )?;
            }
            return Ok(self.finish(NodeKind::UnaryExpression { op, argument }, start));
        }

        // Await
        if self.check(&TokenKind::Await) && self.in_async {
            self.advance();
            let argument = self.parse_unary_expr()?;
            return Ok(self.finish(NodeKind::AwaitExpression { argument }, start));
        }

        // Prefix update
        if matches!(self.peek(), TokenKind::PlusPlus | TokenKind::MinusMinus) {
            let op = if self.check(&TokenKind::PlusPlus) {
                UpdateOp::Increment
            } else {
                UpdateOp::Decrement
            };
            self.advance();
            let argument = self.parse_unary_expr()?;
            self.check_update_target(argument)?;
            return Ok(self.finish(
                NodeKind::UpdateExpression { op, prefix: true, argument },
                start,
            ));
        }

        self.parse_postfix_expr()
    }

    fn check_update_target(&mut self, argument: NodeId) -> Result<(), SyntaxError> {
        if !matches!(
            self.ast.kind(argument),
            NodeKind::Identifier { .. } | NodeKind::MemberExpression { .. }
        ) {
            self.raise(
                ErrorCode::InvalidLhs,
                "Invalid update expression target",
                self.ast.span(argument),
            )?;
        }
        Ok(())
    }

    fn parse_postfix_expr(&mut self) -> Result<NodeId, SyntaxError> {
        let start = self.current.span.start;
        let argument = self.parse_lhs_expr()?;

        // Restricted production: no newline before postfix ++/--.
        if matches!(self.peek(), TokenKind::PlusPlus | TokenKind::MinusMinus)
            && !self.current.newline_before
        {
            let op = if self.check(&TokenKind::PlusPlus) {
                UpdateOp::Increment
            } else {
                UpdateOp::Decrement
            };
            self.advance();
            self.check_update_target(argument)?;
            return Ok(self.finish(
                NodeKind::UpdateExpression { op, prefix: false, argument },
                start,
            ));
        }
        Ok(argument)
    }

    pub(crate) fn parse_lhs_expr(&mut self) -> Result<NodeId, SyntaxError> {
        let start = self.current.span.start;

        if self.check(&TokenKind::New) {
            return self.parse_new_expr();
        }

        let callee = self.parse_primary_expr()?;
        self.parse_member_chain(callee, start, true)
    }

    fn parse_new_expr(&mut self) -> Result<NodeId, SyntaxError> {
        let start = self.current.span.start;
        self.advance(); // new

        // new.target
        if self.eat(&TokenKind::Dot) {
            let prop_span = self.current.span;
            match self.peek().clone() {
                TokenKind::Identifier(name) if name == "target" => {
                    self.advance();
                    return Ok(self.finish(
                        NodeKind::MetaProperty { meta: "new".into(), property: "target".into() },
                        start,
                    ));
                }
                _ => {
                    return Err(self.error(
                        ErrorCode::UnexpectedToken,
                        "Expected `new.target`",
                        prop_span,
                    ))
                }
            }
        }

        let callee_start = self.current.span.start;
        let callee = if self.check(&TokenKind::New) {
            self.parse_new_expr()?
        } else {
            let primary = self.parse_primary_expr()?;
            self.parse_member_chain(primary, callee_start, false)?
        };

        let arguments = if self.check(&TokenKind::LParen) {
            self.parse_call_args()?
        } else {
            Vec::new()
        };
        let new_expr = self.finish(NodeKind::NewExpression { callee, arguments }, start);
        // `new a().b()` — the chain continues after the construct call.
        self.parse_member_chain(new_expr, start, true)
    }

    fn parse_member_chain(
        &mut self,
        mut object: NodeId,
        start: u32,
        allow_call: bool,
    ) -> Result<NodeId, SyntaxError> {
        loop {
            match self.peek() {
                TokenKind::Dot => {
                    self.advance();
                    let property = self.parse_member_property_name()?;
                    object = self.finish(
                        NodeKind::MemberExpression { object, property, computed: false, optional: false },
                        start,
                    );
                }
                TokenKind::QuestionDot => {
                    self.advance();
                    if self.check(&TokenKind::LParen) {
                        if !allow_call {
                            return Err(self.unexpected());
                        }
                        let arguments = self.parse_call_args()?;
                        object = self.finish(
                            NodeKind::CallExpression { callee: object, arguments, optional: true },
                            start,
                        );
                    } else if self.eat(&TokenKind::LBracket) {
                        let property = self.parse_expression()?;
                        self.expect(&TokenKind::RBracket)?;
                        object = self.finish(
                            NodeKind::MemberExpression { object, property, computed: true, optional: true },
                            start,
                        );
                    } else {
                        let property = self.parse_member_property_name()?;
                        object = self.finish(
                            NodeKind::MemberExpression { object, property, computed: false, optional: true },
                            start,
                        );
                    }
                }
                TokenKind::LBracket => {
                    self.advance();
                    let saved = self.allow_in;
                    self.allow_in = true;
                    let property = self.parse_expression();
                    self.allow_in = saved;
                    let property = property?;
                    self.expect(&TokenKind::RBracket)?;
                    object = self.finish(
                        NodeKind::MemberExpression { object, property, computed: true, optional: false },
                        start,
                    );
                }
                TokenKind::LParen if allow_call => {
                    let arguments = self.parse_call_args()?;
                    object = self.finish(
                        NodeKind::CallExpression { callee: object, arguments, optional: false },
                        start,
                    );
                }
                TokenKind::TemplateNoSub(_) | TokenKind::TemplateHead(_) => {
                    let quasi = self.parse_template_literal()?;
                    object = self.finish(
                        NodeKind::TaggedTemplateExpression { tag: object, quasi },
                        start,
                    );
                }
                _ => break,
            }
        }
        Ok(object)
    }

    fn parse_member_property_name(&mut self) -> Result<NodeId, SyntaxError> {
        let start = self.current.span.start;
        match self.peek().clone() {
            TokenKind::Identifier(name) => {
                self.advance();
                Ok(self.finish(NodeKind::Identifier { name }, start))
            }
            TokenKind::Placeholder if self.exts.placeholders() => {
                self.parse_placeholder(PlaceholderKind::Identifier)
            }
            other => {
                if let Some(text) = keyword_text(&other) {
                    self.advance();
                    Ok(self.finish(NodeKind::Identifier { name: text.to_string() }, start))
                } else {
                    Err(self.unexpected())
                }
            }
        }
    }

    fn parse_call_args(&mut self) -> Result<Vec<NodeId>, SyntaxError> {
        self.expect(&TokenKind::LParen)?;
        let saved = self.allow_in;
        self.allow_in = true;
        let result = (|| -> Result<Vec<NodeId>, SyntaxError> {
            let mut args = Vec::new();
            while !self.check(&TokenKind::RParen) && !self.is_eof() {
                if self.check(&TokenKind::Spread) {
                    let start = self.current.span.start;
                    self.advance();
                    let argument = self.parse_assign_expr()?;
                    args.push(self.finish(NodeKind::SpreadElement { argument }, start));
                } else {
                    args.push(self.parse_assign_expr()?);
                }
                if !self.eat(&TokenKind::Comma) {
                    break;
                }
            }
            self.expect(&TokenKind::RParen)?;
            Ok(args)
        })();
        self.allow_in = saved;
        result
    }

    fn parse_primary_expr(&mut self) -> Result<NodeId, SyntaxError> {
        let start = self.current.span.start;
        match self.peek().clone() {
            TokenKind::Number(value) => {
                let token = self.advance();
                if token.octal && self.strict {
                    self.raise(
                        ErrorCode::StrictOctalLiteral,
                        "Legacy octal literals are not allowed in strict mode",
                        token.span,
                    )?;
                }
                let lit = self.finish(NodeKind::NumericLiteral { value }, start);
                self.ast.node_mut(lit).extra.raw = Some(self.raw(token.span).to_string());
                self.ast.node_mut(lit).extra.octal = token.octal;
                Ok(lit)
            }
            TokenKind::String(_) => self.parse_string_literal(),
            TokenKind::BigInt(value) => {
                let token = self.advance();
                let lit = self.finish(NodeKind::BigIntLiteral { value }, start);
                self.ast.node_mut(lit).extra.raw = Some(self.raw(token.span).to_string());
                Ok(lit)
            }
            TokenKind::Regex { pattern, flags } => {
                self.advance();
                Ok(self.finish(NodeKind::RegExpLiteral { pattern, flags }, start))
            }
            TokenKind::True => {
                self.advance();
                Ok(self.finish(NodeKind::BooleanLiteral { value: true }, start))
            }
            TokenKind::False => {
                self.advance();
                Ok(self.finish(NodeKind::BooleanLiteral { value: false }, start))
            }
            TokenKind::Null => {
                self.advance();
                Ok(self.finish(NodeKind::NullLiteral, start))
            }
            TokenKind::This => {
                self.advance();
                Ok(self.finish(NodeKind::ThisExpression, start))
            }
            TokenKind::Super => {
                self.advance();
                Ok(self.finish(NodeKind::Super, start))
            }
            TokenKind::TemplateNoSub(_) | TokenKind::TemplateHead(_) => {
                self.parse_template_literal()
            }
            TokenKind::LBracket => self.parse_array_expr(),
            TokenKind::LBrace => self.parse_object_expr(),
            TokenKind::LParen => self.parse_paren_or_arrow(false, start),
            TokenKind::Function => {
                self.advance();
                self.parse_function(false, false, start)
            }
            TokenKind::Class => self.parse_class(false, Vec::new(), start),
            TokenKind::At => {
                let decorators = self.parse_decorators()?;
                let class_start = self.current.span.start;
                if !self.check(&TokenKind::Class) {
                    return Err(self.error(
                        ErrorCode::InvalidDecoratorPosition,
                        "Decorators must precede a class",
                        self.current.span,
                    ));
                }
                self.parse_class(false, decorators, class_start)
            }
            TokenKind::Async => {
                let next = self.lexer.peek();
                if matches!(next.kind, TokenKind::Function) && !next.newline_before {
                    self.advance();
                    self.advance();
                    return self.parse_function(false, true, start);
                }
                if matches!(next.kind, TokenKind::LParen) && !next.newline_before {
                    self.advance();
                    return self.parse_paren_or_arrow(true, start);
                }
                // Plain identifier `async`
                self.advance();
                Ok(self.finish(NodeKind::Identifier { name: "async".into() }, start))
            }
            TokenKind::Import => {
                self.advance();
                if self.eat(&TokenKind::Dot) {
                    let prop_span = self.current.span;
                    match self.peek().clone() {
                        TokenKind::Identifier(name) if name == "meta" => {
                            self.advance();
                            Ok(self.finish(
                                NodeKind::MetaProperty { meta: "import".into(), property: "meta".into() },
                                start,
                            ))
                        }
                        _ => Err(self.error(
                            ErrorCode::UnexpectedToken,
                            "Expected `import.meta`",
                            prop_span,
                        )),
                    }
                } else {
                    self.expect(&TokenKind::LParen)?;
                    let source = self.parse_assign_expr()?;
                    self.eat(&TokenKind::Comma);
                    self.expect(&TokenKind::RParen)?;
                    Ok(self.finish(NodeKind::ImportExpression { source }, start))
                }
            }
            TokenKind::Placeholder => self.parse_placeholder(PlaceholderKind::Expression),
            TokenKind::Identifier(_) => self.parse_identifier(false),
            other => {
                // Contextual keywords in identifier position.
                if self.identifier_allowed(&other) {
                    self.parse_identifier(false)
                } else {
                    Err(self.unexpected())
                }
            }
        }
    }

    fn identifier_allowed(&self, kind: &TokenKind) -> bool {
        match kind {
            TokenKind::Identifier(_) => true,
            TokenKind::Await => !self.in_async && !self.in_module,
            TokenKind::Yield => !self.in_generator && !self.strict,
            TokenKind::Let => !self.strict,
            other => other.contextual_name().is_some(),
        }
    }

    /// Parse an identifier (or contextual keyword). `liberal` admits any
    /// keyword, for positions like placeholder names and import names.
    pub(crate) fn parse_identifier(&mut self, liberal: bool) -> Result<NodeId, SyntaxError> {
        let start = self.current.span.start;
        let span = self.current.span;
        let name = match self.peek().clone() {
            TokenKind::Identifier(name) => {
                self.advance();
                name
            }
            other => {
                let allowed = liberal || self.identifier_allowed(&other);
                match keyword_text(&other) {
                    Some(text) if allowed => {
                        self.advance();
                        text.to_string()
                    }
                    _ => return Err(self.unexpected()),
                }
            }
        };
        if self.strict && crate::token::is_strict_reserved_word(&name) && !liberal {
            self.raise(
                ErrorCode::StrictReservedWord,
                format!("\"{name}\" is a reserved word in strict mode"),
                span,
            )?;
        }
        Ok(self.finish(NodeKind::Identifier { name }, start))
    }

    fn parse_template_literal(&mut self) -> Result<NodeId, SyntaxError> {
        let start = self.current.span.start;
        let mut quasis = Vec::new();
        let mut expressions = Vec::new();

        let head = self.advance();
        match head.kind {
            TokenKind::TemplateNoSub(cooked) => {
                quasis.push(TemplateQuasi {
                    cooked,
                    raw: self.raw(Span::new(head.span.start + 1, head.span.end - 1)).to_string(),
                });
                return Ok(self.finish(NodeKind::TemplateLiteral { quasis, expressions }, start));
            }
            TokenKind::TemplateHead(cooked) => {
                quasis.push(TemplateQuasi {
                    cooked,
                    raw: self.raw(Span::new(head.span.start + 1, head.span.end - 2)).to_string(),
                });
            }
            _ => return Err(self.unexpected()),
        }

        loop {
            let saved = self.allow_in;
            self.allow_in = true;
            let expr = self.parse_expression();
            self.allow_in = saved;
            expressions.push(expr?);

            if !self.check(&TokenKind::RBrace) {
                return Err(self.unexpected());
            }
            // Re-enter template lexing after the substitution's `}`.
            self.prev_end = self.current.span.end;
            let continuation = self.lexer.scan_template_continuation();
            self.current = continuation;
            let token = self.advance();
            match token.kind {
                TokenKind::TemplateMiddle(cooked) => {
                    quasis.push(TemplateQuasi {
                        cooked,
                        raw: self.raw(Span::new(token.span.start, token.span.end - 2)).to_string(),
                    });
                }
                TokenKind::TemplateTail(cooked) => {
                    quasis.push(TemplateQuasi {
                        cooked,
                        raw: self.raw(Span::new(token.span.start, token.span.end - 1)).to_string(),
                    });
                    return Ok(self.finish(NodeKind::TemplateLiteral { quasis, expressions }, start));
                }
                TokenKind::Invalid => return Err(self.unexpected()),
                _ => return Err(self.unexpected()),
            }
        }
    }

    fn parse_array_expr(&mut self) -> Result<NodeId, SyntaxError> {
        let start = self.current.span.start;
        self.expect(&TokenKind::LBracket)?;
        let mut elements = Vec::new();
        let mut trailing_comma = None;
        while !self.check(&TokenKind::RBracket) && !self.is_eof() {
            if self.check(&TokenKind::Comma) {
                self.advance();
                elements.push(None); // hole
                continue;
            }
            if self.check(&TokenKind::Spread) {
                let spread_start = self.current.span.start;
                self.advance();
                let argument = self.parse_assign_expr()?;
                elements.push(Some(self.finish(NodeKind::SpreadElement { argument }, spread_start)));
            } else {
                elements.push(Some(self.parse_assign_expr()?));
            }
            if self.check(&TokenKind::Comma) {
                let comma = self.current.span.start;
                self.advance();
                if self.check(&TokenKind::RBracket) {
                    trailing_comma = Some(comma);
                }
            } else {
                break;
            }
        }
        self.expect(&TokenKind::RBracket)?;
        let array = self.finish(NodeKind::ArrayExpression { elements }, start);
        self.ast.node_mut(array).extra.trailing_comma = trailing_comma;
        Ok(array)
    }

    fn parse_object_expr(&mut self) -> Result<NodeId, SyntaxError> {
        let start = self.current.span.start;
        self.expect(&TokenKind::LBrace)?;
        let mut properties = Vec::new();
        let mut trailing_comma = None;
        while !self.check(&TokenKind::RBrace) && !self.is_eof() {
            if self.check(&TokenKind::Spread) {
                let spread_start = self.current.span.start;
                self.advance();
                let argument = self.parse_assign_expr()?;
                properties.push(self.finish(NodeKind::SpreadElement { argument }, spread_start));
            } else {
                properties.push(self.parse_object_member()?);
            }
            if self.check(&TokenKind::Comma) {
                let comma = self.current.span.start;
                self.advance();
                if self.check(&TokenKind::RBrace) {
                    trailing_comma = Some(comma);
                }
            } else {
                break;
            }
        }
        self.expect(&TokenKind::RBrace)?;
        let object = self.finish(NodeKind::ObjectExpression { properties }, start);
        self.ast.node_mut(object).extra.trailing_comma = trailing_comma;
        Ok(object)
    }

    fn parse_object_member(&mut self) -> Result<NodeId, SyntaxError> {
        let start = self.current.span.start;

        // Modifiers: async / generator / get / set, unless used as key.
        let mut is_async = false;
        let mut is_generator = false;
        let mut accessor: Option<MethodKind> = None;

        if self.check(&TokenKind::Async) {
            let next = self.lexer.peek();
            if !matches!(
                next.kind,
                TokenKind::LParen | TokenKind::Colon | TokenKind::Comma | TokenKind::RBrace | TokenKind::Eq
            ) && !next.newline_before
            {
                self.advance();
                is_async = true;
            }
        }
        if self.eat(&TokenKind::Star) {
            is_generator = true;
        }
        if !is_async && !is_generator && matches!(self.peek(), TokenKind::Get | TokenKind::Set) {
            let next = self.lexer.peek();
            if !matches!(
                next.kind,
                TokenKind::LParen | TokenKind::Colon | TokenKind::Comma | TokenKind::RBrace | TokenKind::Eq
            ) {
                accessor = Some(if self.check(&TokenKind::Get) { MethodKind::Get } else { MethodKind::Set });
                self.advance();
            }
        }

        let (key, computed) = self.parse_property_key()?;

        // Method
        if self.check(&TokenKind::LParen) {
            let kind = accessor.unwrap_or(MethodKind::Method);
            let ctx = self.enter_function(is_async, is_generator);
            self.push_scope(ParseScopeKind::Function);
            let result = (|| -> Result<(Vec<NodeId>, NodeId), SyntaxError> {
                let params = self.parse_params()?;
                let body = self.parse_function_body(&params, None)?;
                Ok((params, body))
            })();
            self.pop_scope();
            self.exit_function(ctx);
            let (params, body) = result?;

            match kind {
                MethodKind::Get if !params.is_empty() => {
                    self.raise(
                        ErrorCode::UnexpectedToken,
                        "Getter must have no parameters",
                        self.ast.span(key),
                    )?;
                }
                MethodKind::Set if params.len() != 1 => {
                    self.raise(
                        ErrorCode::UnexpectedToken,
                        "Setter must have exactly one parameter",
                        self.ast.span(key),
                    )?;
                }
                _ => {}
            }

            return Ok(self.finish(
                NodeKind::ObjectMethod { key, params, body, kind, computed, is_async, is_generator },
                start,
            ));
        }

        if accessor.is_some() || is_generator || is_async {
            return Err(self.unexpected());
        }

        // key: value
        if self.eat(&TokenKind::Colon) {
            let value = self.parse_assign_expr()?;
            return Ok(self.finish(
                NodeKind::ObjectProperty { key, value, computed, shorthand: false },
                start,
            ));
        }

        // Shorthand (`{a}`) or cover-initialized name (`{a = 1}`, only
        // valid if this object is later converted to a pattern).
        let name = match self.ast.ident_name(key) {
            Some(name) if !computed => name.to_string(),
            _ => return Err(self.unexpected()),
        };
        let value_span = self.ast.span(key);
        let ident = self.ast.alloc(NodeKind::Identifier { name }, value_span);
        let value = if self.check(&TokenKind::Eq) {
            let eq_span = self.current.span;
            self.advance();
            let right = self.parse_assign_expr()?;
            if self.pending_cover_init.is_none() {
                self.pending_cover_init = Some(eq_span);
            }
            self.finish(NodeKind::AssignmentPattern { left: ident, right }, start)
        } else {
            ident
        };
        Ok(self.finish(NodeKind::ObjectProperty { key, value, computed, shorthand: true }, start))
    }

    // =========================================================================
    // Parenthesized expressions and arrow functions
    // =========================================================================

    /// `(` has not yet been consumed. Resolves the arrow-parameter-list
    /// vs parenthesized-expression ambiguity: the group is parsed as
    /// expressions, and a following `=>` retypes them into patterns.
    fn parse_paren_or_arrow(&mut self, is_async: bool, outer_start: u32) -> Result<NodeId, SyntaxError> {
        let paren_start = self.current.span.start;
        self.expect(&TokenKind::LParen)?;

        // Empty parens: `() => ...` or the call `async()`.
        if self.check(&TokenKind::RParen) {
            self.advance();
            if self.check(&TokenKind::Arrow) {
                return self.parse_arrow_body(Vec::new(), is_async, outer_start);
            }
            if is_async {
                let callee = self
                    .ast
                    .alloc(NodeKind::Identifier { name: "async".into() }, Span::new(outer_start, paren_start));
                return Ok(self.finish(
                    NodeKind::CallExpression { callee, arguments: vec![], optional: false },
                    outer_start,
                ));
            }
            return Err(self.error(ErrorCode::UnexpectedToken, "Expected =>", self.current.span));
        }

        let saved_allow_in = self.allow_in;
        self.allow_in = true;
        let result = self.parse_paren_items(is_async, outer_start, paren_start);
        self.allow_in = saved_allow_in;
        result
    }

    fn parse_paren_items(
        &mut self,
        is_async: bool,
        outer_start: u32,
        paren_start: u32,
    ) -> Result<NodeId, SyntaxError> {
        let mut exprs = Vec::new();
        let mut saw_rest = false;
        let mut trailing_comma: Option<Span> = None;

        loop {
            if self.check(&TokenKind::RParen) || self.is_eof() {
                break;
            }
            if self.check(&TokenKind::Spread) {
                // A rest element commits this group to being an arrow
                // parameter list.
                let rest_start = self.current.span.start;
                self.advance();
                let argument = self.parse_binding_atom()?;
                exprs.push(self.finish(NodeKind::RestElement { argument }, rest_start));
                saw_rest = true;
                if self.check(&TokenKind::Comma) {
                    self.raise(
                        ErrorCode::RestTrailingComma,
                        "A rest parameter must be last",
                        self.current.span,
                    )?;
                    self.advance();
                }
                break;
            }
            exprs.push(self.parse_assign_expr()?);
            if self.check(&TokenKind::Comma) {
                let comma_span = self.current.span;
                self.advance();
                if self.check(&TokenKind::RParen) {
                    trailing_comma = Some(comma_span);
                    break;
                }
            } else {
                break;
            }
        }
        self.expect(&TokenKind::RParen)?;

        let is_arrow = self.check(&TokenKind::Arrow);
        if is_arrow || saw_rest {
            if !is_arrow {
                return Err(self.error(
                    ErrorCode::UnexpectedToken,
                    "Expected => after arrow parameter list",
                    self.current.span,
                ));
            }
            if self.current.newline_before {
                self.raise(
                    ErrorCode::UnexpectedToken,
                    "No line break is allowed before =>",
                    self.current.span,
                )?;
            }
            // Retype the parsed expressions into parameter patterns;
            // validation and binding registration happen once the arrow's
            // own scope is entered.
            for expr in &exprs {
                self.to_assignable(*expr, false)?;
            }
            self.pending_cover_init = None;
            return self.parse_arrow_body(exprs, is_async, outer_start);
        }

        if let Some(comma) = trailing_comma {
            self.raise(
                ErrorCode::UnexpectedToken,
                "Unexpected trailing comma in parenthesized expression",
                comma,
            )?;
        }

        if is_async {
            // `async(...)` is a plain call.
            let callee = self
                .ast
                .alloc(NodeKind::Identifier { name: "async".into() }, Span::new(outer_start, paren_start));
            let call = self.finish(
                NodeKind::CallExpression { callee, arguments: exprs, optional: false },
                outer_start,
            );
            return self.parse_member_chain(call, outer_start, true);
        }

        if exprs.len() == 1 {
            let inner = exprs[0];
            self.ast.node_mut(inner).extra.parenthesized = true;
            Ok(inner)
        } else {
            let seq = self.finish(NodeKind::SequenceExpression { expressions: exprs }, outer_start);
            self.ast.node_mut(seq).extra.parenthesized = true;
            Ok(seq)
        }
    }

    pub(crate) fn parse_arrow_body(
        &mut self,
        params: Vec<NodeId>,
        is_async: bool,
        start: u32,
    ) -> Result<NodeId, SyntaxError> {
        self.expect(&TokenKind::Arrow)?;

        let ctx = self.enter_function(is_async, false);
        self.push_scope(ParseScopeKind::Function);
        let result = (|| -> Result<NodeId, SyntaxError> {
            // Arrow parameters never tolerate duplicates, and their names
            // bind in the arrow's own scope.
            let mut clashes = FxHashSet::default();
            for param in &params {
                self.check_lval(*param, BindKind::Param, Some(&mut clashes), false, false)?;
            }
            if self.check(&TokenKind::LBrace) {
                self.parse_function_body(&params, None)
            } else {
                self.parse_assign_expr()
            }
        })();
        self.pop_scope();
        self.exit_function(ctx);
        let body = result?;

        Ok(self.finish(NodeKind::ArrowFunctionExpression { params, body, is_async }, start))
    }

    // =========================================================================
    // Placeholders
    // =========================================================================

    /// `%%name%%`, carrying the grammatical category expected at this
    /// position so later re-interpretation stays sound.
    pub(crate) fn parse_placeholder(
        &mut self,
        expected: PlaceholderKind,
    ) -> Result<NodeId, SyntaxError> {
        let start = self.current.span.start;
        let open = self.expect(&TokenKind::Placeholder)?;
        if self.current.span.start != open.span.end {
            self.raise(
                ErrorCode::PlaceholderSpace,
                "Unexpected space in placeholder",
                self.current.span,
            )?;
        }
        let name_node = self.parse_identifier(true)?;
        let name = self.ast.ident_name(name_node).unwrap_or_default().to_string();
        let name_end = self.ast.span(name_node).end;
        if self.current.span.start != name_end {
            self.raise(
                ErrorCode::PlaceholderSpace,
                "Unexpected space in placeholder",
                self.current.span,
            )?;
        }
        self.expect(&TokenKind::Placeholder)?;
        Ok(self.finish(NodeKind::Placeholder { name, expected }, start))
    }

    pub(crate) fn retype_placeholder(&mut self, id: NodeId, expected: PlaceholderKind) {
        if let NodeKind::Placeholder { expected: slot, .. } = self.ast.kind_mut(id) {
            *slot = expected;
        }
    }
}

/// Top-level scan for module syntax, for `SourceType::Unambiguous`.
fn detect_module(source: &str) -> bool {
    let mut lexer = Lexer::new(source);
    let mut depth: i32 = 0;
    loop {
        let token = lexer.next_token();
        match token.kind {
            TokenKind::Eof | TokenKind::Invalid => return false,
            TokenKind::LBrace | TokenKind::LParen | TokenKind::LBracket => depth += 1,
            TokenKind::RBrace | TokenKind::RParen | TokenKind::RBracket => depth -= 1,
            TokenKind::Import if depth == 0 => {
                // `import(...)` and `import.meta` are expressions, not
                // module syntax.
                let next = lexer.peek();
                if !matches!(next.kind, TokenKind::LParen | TokenKind::Dot) {
                    return true;
                }
            }
            TokenKind::Export if depth == 0 => return true,
            _ => {}
        }
    }
}

fn binary_op_for(kind: &TokenKind) -> Option<BinaryOp> {
    Some(match kind {
        TokenKind::Plus => BinaryOp::Add,
        TokenKind::Minus => BinaryOp::Sub,
        TokenKind::Star => BinaryOp::Mul,
        TokenKind::Slash => BinaryOp::Div,
        TokenKind::Percent => BinaryOp::Mod,
        TokenKind::StarStar => BinaryOp::Pow,
        TokenKind::EqEq => BinaryOp::Eq,
        TokenKind::BangEq => BinaryOp::NotEq,
        TokenKind::EqEqEq => BinaryOp::StrictEq,
        TokenKind::BangEqEq => BinaryOp::StrictNotEq,
        TokenKind::Lt => BinaryOp::Lt,
        TokenKind::LtEq => BinaryOp::LtEq,
        TokenKind::Gt => BinaryOp::Gt,
        TokenKind::GtEq => BinaryOp::GtEq,
        TokenKind::Pipe => BinaryOp::BitOr,
        TokenKind::Caret => BinaryOp::BitXor,
        TokenKind::Amp => BinaryOp::BitAnd,
        TokenKind::LtLt => BinaryOp::Shl,
        TokenKind::GtGt => BinaryOp::Shr,
        TokenKind::GtGtGt => BinaryOp::UShr,
        TokenKind::AmpAmp => BinaryOp::And,
        TokenKind::PipePipe => BinaryOp::Or,
        TokenKind::QuestionQuestion => BinaryOp::NullishCoalesce,
        TokenKind::In => BinaryOp::In,
        TokenKind::Instanceof => BinaryOp::Instanceof,
        _ => return None,
    })
}

fn assign_op_for(kind: &TokenKind) -> Option<AssignOp> {
    Some(match kind {
        TokenKind::Eq => AssignOp::Assign,
        TokenKind::PlusEq => AssignOp::AddAssign,
        TokenKind::MinusEq => AssignOp::SubAssign,
        TokenKind::StarEq => AssignOp::MulAssign,
        TokenKind::SlashEq => AssignOp::DivAssign,
        TokenKind::PercentEq => AssignOp::ModAssign,
        TokenKind::StarStarEq => AssignOp::PowAssign,
        TokenKind::LtLtEq => AssignOp::ShlAssign,
        TokenKind::GtGtEq => AssignOp::ShrAssign,
        TokenKind::GtGtGtEq => AssignOp::UShrAssign,
        TokenKind::PipeEq => AssignOp::BitOrAssign,
        TokenKind::CaretEq => AssignOp::BitXorAssign,
        TokenKind::AmpEq => AssignOp::BitAndAssign,
        TokenKind::AmpAmpEq => AssignOp::AndAssign,
        TokenKind::PipePipeEq => AssignOp::OrAssign,
        TokenKind::QuestionQuestionEq => AssignOp::NullishAssign,
        _ => return None,
    })
}

/// Keyword token back to its source text (for keywords in name position).
fn keyword_text(kind: &TokenKind) -> Option<&'static str> {
    Some(match kind {
        TokenKind::Var => "var",
        TokenKind::Let => "let",
        TokenKind::Const => "const",
        TokenKind::Function => "function",
        TokenKind::Class => "class",
        TokenKind::If => "if",
        TokenKind::Else => "else",
        TokenKind::Switch => "switch",
        TokenKind::Case => "case",
        TokenKind::Default => "default",
        TokenKind::For => "for",
        TokenKind::While => "while",
        TokenKind::Do => "do",
        TokenKind::Break => "break",
        TokenKind::Continue => "continue",
        TokenKind::Return => "return",
        TokenKind::Try => "try",
        TokenKind::Catch => "catch",
        TokenKind::Finally => "finally",
        TokenKind::Throw => "throw",
        TokenKind::New => "new",
        TokenKind::Delete => "delete",
        TokenKind::Typeof => "typeof",
        TokenKind::Void => "void",
        TokenKind::In => "in",
        TokenKind::Of => "of",
        TokenKind::Instanceof => "instanceof",
        TokenKind::This => "this",
        TokenKind::Super => "super",
        TokenKind::Null => "null",
        TokenKind::True => "true",
        TokenKind::False => "false",
        TokenKind::Import => "import",
        TokenKind::Export => "export",
        TokenKind::From => "from",
        TokenKind::As => "as",
        TokenKind::Async => "async",
        TokenKind::Await => "await",
        TokenKind::Yield => "yield",
        TokenKind::Static => "static",
        TokenKind::Get => "get",
        TokenKind::Set => "set",
        TokenKind::Extends => "extends",
        TokenKind::With => "with",
        TokenKind::Debugger => "debugger",
        _ => return None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(source: &str) -> ParseResult {
        Parser::new(source, ParserOptions::default())
            .expect("options are valid")
            .parse()
            .expect("parse should succeed")
    }

    fn parse_err(source: &str) -> SyntaxError {
        Parser::new(source, ParserOptions::default())
            .expect("options are valid")
            .parse()
            .expect_err("parse should fail")
    }

    fn program_body(result: &ParseResult) -> Vec<NodeId> {
        match result.ast.kind(result.ast.root) {
            NodeKind::Program { body, .. } => body.clone(),
            other => panic!("expected Program, got {other:?}"),
        }
    }

    fn first_expr(result: &ParseResult) -> NodeId {
        let body = program_body(result);
        match result.ast.kind(body[0]) {
            NodeKind::ExpressionStatement { expression } => *expression,
            other => panic!("expected expression statement, got {other:?}"),
        }
    }

    #[test]
    fn test_variable_declaration() {
        let result = parse("let x = 1;");
        assert_eq!(program_body(&result).len(), 1);
    }

    #[test]
    fn test_function_declaration() {
        let result = parse("function foo(a, b) { return a + b; }");
        let body = program_body(&result);
        assert!(matches!(
            result.ast.kind(body[0]),
            NodeKind::FunctionDeclaration { .. }
        ));
    }

    #[test]
    fn test_binary_precedence() {
        let result = parse("1 + 2 * 3;");
        let expr = first_expr(&result);
        match result.ast.kind(expr) {
            NodeKind::BinaryExpression { op: BinaryOp::Add, right, .. } => {
                assert!(matches!(
                    result.ast.kind(*right),
                    NodeKind::BinaryExpression { op: BinaryOp::Mul, .. }
                ));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_arrow_with_two_params() {
        let result = parse("(a, b) => a + b;");
        let expr = first_expr(&result);
        match result.ast.kind(expr) {
            NodeKind::ArrowFunctionExpression { params, .. } => {
                assert_eq!(params.len(), 2);
                assert!(params
                    .iter()
                    .all(|p| matches!(result.ast.kind(*p), NodeKind::Identifier { .. })));
            }
            other => panic!("expected arrow, got {other:?}"),
        }
    }

    #[test]
    fn test_paren_without_arrow_is_sequence() {
        let result = parse("(a, b);");
        let expr = first_expr(&result);
        match result.ast.kind(expr) {
            NodeKind::SequenceExpression { expressions } => assert_eq!(expressions.len(), 2),
            other => panic!("expected sequence, got {other:?}"),
        }
        assert!(result.ast.node(expr).extra.parenthesized);
    }

    #[test]
    fn test_object_param_arrow_retypes_to_pattern() {
        let result = parse("({a, b}) => a;");
        let expr = first_expr(&result);
        match result.ast.kind(expr) {
            NodeKind::ArrowFunctionExpression { params, .. } => {
                assert_eq!(params.len(), 1);
                assert!(matches!(
                    result.ast.kind(params[0]),
                    NodeKind::ObjectPattern { .. }
                ));
            }
            other => panic!("expected arrow, got {other:?}"),
        }
    }

    #[test]
    fn test_single_ident_arrow() {
        let result = parse("x => x;");
        assert!(matches!(
            result.ast.kind(first_expr(&result)),
            NodeKind::ArrowFunctionExpression { .. }
        ));
    }

    #[test]
    fn test_async_arrow_vs_call() {
        let result = parse("async (a) => a;");
        assert!(matches!(
            result.ast.kind(first_expr(&result)),
            NodeKind::ArrowFunctionExpression { is_async: true, .. }
        ));

        let result = parse("async(a);");
        assert!(matches!(
            result.ast.kind(first_expr(&result)),
            NodeKind::CallExpression { .. }
        ));
    }

    #[test]
    fn test_destructuring_assignment_retypes() {
        let result = parse("[a, b] = c;");
        let expr = first_expr(&result);
        match result.ast.kind(expr) {
            NodeKind::AssignmentExpression { left, .. } => {
                assert!(matches!(result.ast.kind(*left), NodeKind::ArrayPattern { .. }));
            }
            other => panic!("expected assignment, got {other:?}"),
        }
    }

    #[test]
    fn test_strict_mode_retroactive_duplicate_param() {
        let err = parse_err("function f(a, a) { \"use strict\"; }");
        assert_eq!(err.code, ErrorCode::ParamDupe);
    }

    #[test]
    fn test_sloppy_duplicate_param_allowed() {
        parse("function f(a, a) { return a; }");
    }

    #[test]
    fn test_strict_octal_rejected_retroactively() {
        let err = parse_err("function f(a = 0644) { \"use strict\"; }");
        // Non-simple parameter list plus directive is itself an error.
        assert_eq!(err.code, ErrorCode::IllegalUseStrict);

        let err = parse_err("\"use strict\"; var x = 0644;");
        assert_eq!(err.code, ErrorCode::StrictOctalLiteral);
    }

    #[test]
    fn test_asi_return() {
        let result = parse("function f() { return\n1; }");
        let body = program_body(&result);
        let NodeKind::FunctionDeclaration { body: fn_body, .. } = result.ast.kind(body[0]) else {
            panic!("expected function");
        };
        let NodeKind::BlockStatement { body: stmts } = result.ast.kind(*fn_body) else {
            panic!("expected block");
        };
        assert!(matches!(
            result.ast.kind(stmts[0]),
            NodeKind::ReturnStatement { argument: None }
        ));
    }

    #[test]
    fn test_newline_after_throw_rejected() {
        let err = parse_err("throw\nnew Error();");
        assert_eq!(err.code, ErrorCode::NewlineAfterThrow);
    }

    #[test]
    fn test_const_without_init_rejected() {
        let err = parse_err("const x;");
        assert_eq!(err.code, ErrorCode::MissingInitializerInConst);
    }

    #[test]
    fn test_duplicate_let_rejected() {
        let err = parse_err("let x; let x;");
        assert_eq!(err.code, ErrorCode::DuplicateDeclaration);
    }

    #[test]
    fn test_var_and_let_conflict() {
        let err = parse_err("let x; { var x; }");
        assert_eq!(err.code, ErrorCode::DuplicateDeclaration);
    }

    #[test]
    fn test_labels() {
        parse("outer: for (;;) { continue outer; }");
        let err = parse_err("continue nowhere;");
        assert!(matches!(err.code, ErrorCode::UnknownLabel | ErrorCode::IllegalContinue));
    }

    #[test]
    fn test_for_of_with_pattern() {
        let result = parse("for (const [a, b] of pairs) {}");
        let body = program_body(&result);
        assert!(matches!(result.ast.kind(body[0]), NodeKind::ForOfStatement { .. }));
    }

    #[test]
    fn test_for_in_expression_left_retypes() {
        let result = parse("for ({a} in obj) {}");
        let body = program_body(&result);
        let NodeKind::ForInStatement { left, .. } = result.ast.kind(body[0]) else {
            panic!("expected for-in");
        };
        assert!(matches!(result.ast.kind(*left), NodeKind::ObjectPattern { .. }));
    }

    #[test]
    fn test_module_detection_unambiguous() {
        let mut options = ParserOptions::default();
        options.source_type = SourceType::Unambiguous;
        let result = Parser::new("import a from \"b\"; a();", options.clone())
            .unwrap()
            .parse()
            .unwrap();
        match result.ast.kind(result.ast.root) {
            NodeKind::Program { source_type, .. } => assert_eq!(*source_type, SourceType::Module),
            _ => panic!(),
        }

        let result = Parser::new("const x = import(\"a\");", options).unwrap().parse().unwrap();
        match result.ast.kind(result.ast.root) {
            NodeKind::Program { source_type, .. } => assert_eq!(*source_type, SourceType::Script),
            _ => panic!(),
        }
    }

    #[test]
    fn test_import_outside_module_rejected() {
        let err = parse_err("import a from \"b\";");
        assert_eq!(err.code, ErrorCode::ImportOutsideModule);
    }

    #[test]
    fn test_error_recovery_collects_and_continues() {
        let mut options = ParserOptions::default();
        options.error_recovery = true;
        let result = Parser::new("let x = ][; let y = 2; const z;", options)
            .unwrap()
            .parse()
            .unwrap();
        assert!(!result.errors.is_empty());
        // The parse still produced statements after the bad one.
        let body = match result.ast.kind(result.ast.root) {
            NodeKind::Program { body, .. } => body.clone(),
            _ => panic!(),
        };
        assert!(body.len() >= 2);
    }

    #[test]
    fn test_template_literal() {
        let result = parse("`a${x}b${y}c`;");
        let expr = first_expr(&result);
        match result.ast.kind(expr) {
            NodeKind::TemplateLiteral { quasis, expressions } => {
                assert_eq!(quasis.len(), 3);
                assert_eq!(expressions.len(), 2);
                assert_eq!(quasis[0].cooked, "a");
                assert_eq!(quasis[2].cooked, "c");
            }
            other => panic!("expected template, got {other:?}"),
        }
    }

    #[test]
    fn test_optional_chaining() {
        let result = parse("a?.b?.(c)?.[d];");
        let expr = first_expr(&result);
        assert!(matches!(
            result.ast.kind(expr),
            NodeKind::MemberExpression { optional: true, computed: true, .. }
        ));
    }

    #[test]
    fn test_regex_primary() {
        let result = parse("const re = /ab+c/gi;");
        assert_eq!(program_body(&result).len(), 1);
    }

    #[test]
    fn test_decorators_capability_gating() {
        let err = parse_err("@dec class Foo {}");
        assert_eq!(err.code, ErrorCode::UnsupportedSyntax);

        let mut options = ParserOptions::default();
        options.capabilities.decorators = true;
        let result = Parser::new("@dec @other.thing() class Foo {}", options)
            .unwrap()
            .parse()
            .unwrap();
        let body = program_body(&result);
        let NodeKind::ClassDeclaration { decorators, .. } = result.ast.kind(body[0]) else {
            panic!("expected class");
        };
        assert_eq!(decorators.len(), 2);
    }

    #[test]
    fn test_pipeline_capability() {
        let mut options = ParserOptions::default();
        options.capabilities.pipeline = true;
        let result = Parser::new("a |> f |> g;", options).unwrap().parse().unwrap();
        let expr = first_expr(&result);
        // Left-associative: (a |> f) |> g
        let NodeKind::BinaryExpression { op: BinaryOp::Pipeline, left, .. } = result.ast.kind(expr)
        else {
            panic!("expected pipeline");
        };
        assert!(matches!(
            result.ast.kind(*left),
            NodeKind::BinaryExpression { op: BinaryOp::Pipeline, .. }
        ));

        // Without the capability `|>` is a syntax error.
        parse_err("a |> f;");
    }

    #[test]
    fn test_placeholder_parsing() {
        let mut options = ParserOptions::default();
        options.capabilities.placeholders = true;
        let result = Parser::new("const x = %%value%%;", options).unwrap().parse().unwrap();
        let body = program_body(&result);
        let NodeKind::VariableDeclaration { declarations, .. } = result.ast.kind(body[0]) else {
            panic!("expected declaration");
        };
        let NodeKind::VariableDeclarator { init: Some(init), .. } =
            result.ast.kind(declarations[0])
        else {
            panic!("expected declarator");
        };
        assert!(matches!(
            result.ast.kind(*init),
            NodeKind::Placeholder { expected: PlaceholderKind::Expression, .. }
        ));
    }

    #[test]
    fn test_placeholder_promoted_to_pattern() {
        let mut options = ParserOptions::default();
        options.capabilities.placeholders = true;
        let result = Parser::new("(%%a%%) => 1;", options).unwrap().parse().unwrap();
        let expr = first_expr(&result);
        let NodeKind::ArrowFunctionExpression { params, .. } = result.ast.kind(expr) else {
            panic!("expected arrow");
        };
        assert!(matches!(
            result.ast.kind(params[0]),
            NodeKind::Placeholder { expected: PlaceholderKind::Pattern, .. }
        ));
    }

    #[test]
    fn test_cover_init_only_valid_in_pattern() {
        // Fine: converted to a pattern.
        parse("({a = 1} = obj);");
        // Error: stays an object expression.
        let err = parse_err("({a = 1});");
        assert_eq!(err.code, ErrorCode::UnexpectedToken);
    }

    #[test]
    fn test_invalid_arrow_param_rejected() {
        let err = parse_err("(a + b) => a;");
        assert!(matches!(err.code, ErrorCode::InvalidLhs | ErrorCode::InvalidLhsBinding));
    }

    #[test]
    fn test_rest_not_last_rejected() {
        let err = parse_err("(...a, b) => a;");
        assert_eq!(err.code, ErrorCode::RestTrailingComma);
    }

    #[test]
    fn test_class_members() {
        let result = parse(
            "class Foo extends Bar { constructor() { super(); } static s() {} get x() { return 1; } async *gen() {} prop = 2; static { init(); } }",
        );
        assert_eq!(program_body(&result).len(), 1);
    }

    #[test]
    fn test_duplicate_constructor_rejected() {
        let err = parse_err("class A { constructor() {} constructor() {} }");
        assert_eq!(err.code, ErrorCode::DuplicateConstructor);
    }

    #[test]
    fn test_exports() {
        let mut options = ParserOptions::default();
        options.source_type = SourceType::Module;
        let source = "export const a = 1; export default f(); export { a as b }; export * from \"m\";";
        let result = Parser::new(source, options).unwrap().parse().unwrap();
        assert_eq!(program_body(&result).len(), 4);
    }

    #[test]
    fn test_getter_arity_checked() {
        let err = parse_err("({ get x(a) { return 1; } });");
        assert_eq!(err.code, ErrorCode::UnexpectedToken);
    }
}
