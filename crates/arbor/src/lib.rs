//! arbor: a source-to-source JavaScript transformer.
//!
//! # Architecture
//!
//! 1. **Single-pass hand-written parser**
//!    - Lexing on demand, which keeps tokenization context-sensitive
//!      (regex vs division, template continuations)
//!    - Ambiguity resolved by parsing the expression grammar and
//!      retyping nodes in place (`(a, b) => ...` parameter lists,
//!      destructuring targets)
//!    - Syntax extensions (decorators, pipeline, placeholders) selected
//!      at construction through a capability set
//!
//! 2. **Index-arena tree**
//!    - Nodes live in one `Vec`, referenced by `NodeId`
//!    - Identity is stable across in-place mutation, so live references
//!      observe rewrites
//!
//! 3. **Mutation-capable traversal**
//!    - String-keyed visitors exploded once into a per-type dispatch
//!      table
//!    - Hooks can replace, remove, and insert while the walk runs;
//!      replacements re-enter dispatch before descent
//!
//! 4. **Incremental scope index**
//!    - Bindings, usages, and constant violations tracked per lexical
//!      scope
//!    - Mutations patch the index instead of forcing re-crawls
//!
//! # Example
//!
//! ```ignore
//! use arbor::{parse, ParserOptions};
//!
//! let result = parse("const x = (a, b) => a + b;", ParserOptions::default())?;
//! assert!(result.errors.is_empty());
//! ```

mod ast;
mod capability;
mod codegen;
mod error;
mod lexer;
mod lval;
mod parser;
mod scope;
mod span;
mod token;
mod transform;
mod traverse;

// Re-exports
pub use ast::{
    alias_members, AssignOp, Ast, BinaryOp, ChildRef, Extra, MethodKind, Node, NodeId, NodeKind,
    NodeType, PlaceholderKind, SourceType, TemplateQuasi, UnaryOp, UpdateOp, VarKind,
};
pub use capability::{Capabilities, ExtensionSet, SyntaxExtension};
pub use codegen::{Codegen, CodegenOptions, Mapping, Output, QuoteStyle, SourceMap};
pub use error::{
    CapabilityError, Error, ErrorCode, HookError, ScopeError, SyntaxError, TransformError,
};
pub use lexer::{Comment, Lexer};
pub use parser::{ParseResult, Parser, ParserOptions};
pub use scope::{Binding, BindingKind, ImplicitBinding, Scope, ScopeId, ScopeIndex, ScopeKind, Usage};
pub use span::{LineIndex, Span};
pub use token::{Token, TokenKind};
pub use transform::{Pass, PassRunner, Plugin};
pub use traverse::{has_type, traverse, Cursor, Visitor, VisitorKeyError};

/// Parse JavaScript source into a tree (plus any errors collected in
/// recovery mode).
pub fn parse(source: &str, options: ParserOptions) -> Result<ParseResult, SyntaxError> {
    Parser::new(source, options)?.parse()
}

/// Parse, run transform passes, and generate output.
pub fn transform(
    source: &str,
    parser_options: ParserOptions,
    runner: &PassRunner,
    codegen_options: CodegenOptions,
) -> Result<Output, Error> {
    let result = parse(source, parser_options)?;
    let mut ast = result.ast;
    let mut scopes = ScopeIndex::new();
    scopes.crawl(&ast, ast.root)?;
    runner.run(&mut ast, Some(&mut scopes))?;
    Ok(Codegen::new(&ast, codegen_options).generate())
}
