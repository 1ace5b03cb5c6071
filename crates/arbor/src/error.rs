//! Error types for the parse/transform/generate pipeline.

use crate::span::Span;
use thiserror::Error;

/// Stable machine-readable codes for syntax errors.
///
/// Codes are part of the public contract: tooling matches on them, so
/// variants are only ever added, never renamed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    // Lexical errors
    UnexpectedCharacter,
    UnterminatedString,
    UnterminatedTemplate,
    UnterminatedRegExp,
    UnterminatedComment,
    InvalidEscapeSequence,
    InvalidNumber,
    InvalidBigInt,

    // Grammar errors
    UnexpectedToken,
    UnexpectedEof,
    ExpectedSemicolon,
    InvalidLhs,
    InvalidLhsBinding,
    InvalidParenthesizedAssignment,
    InvalidRestTarget,
    ElementAfterRest,
    RestTrailingComma,
    MissingEqInAssignment,
    PatternHasMethod,
    PatternHasAccessor,
    InvalidPropertyBindingPattern,
    ParamDupe,
    StrictEvalArguments,
    StrictEvalArgumentsBinding,
    StrictReservedWord,
    StrictOctalLiteral,
    StrictWith,
    StrictDelete,
    StrictFunctionName,
    IllegalUseStrict,
    LetInLexicalBinding,
    DuplicateDeclaration,
    NewlineAfterThrow,
    IllegalReturn,
    IllegalBreak,
    IllegalContinue,
    UnknownLabel,
    DuplicateLabel,
    YieldOutsideGenerator,
    AwaitOutsideAsync,
    AwaitAsIdentifier,
    ImportOutsideModule,
    ExportOutsideModule,
    DuplicateDefaultClause,
    DuplicateConstructor,
    ConstructorIsAccessor,
    ConstructorIsGenerator,
    ConstructorIsAsync,
    MissingInitializerInConst,
    MultipleDeclarationsInForBinding,
    InvalidDecoratorPosition,
    UnexpectedPlaceholder,
    PlaceholderSpace,
    UnsupportedSyntax,
}

impl ErrorCode {
    /// Codes that error-recovery mode may collect instead of aborting.
    /// Purely lexical failures leave the token stream in an unusable
    /// state and stay fatal.
    pub fn recoverable(self) -> bool {
        !matches!(
            self,
            ErrorCode::UnexpectedCharacter
                | ErrorCode::UnterminatedString
                | ErrorCode::UnterminatedTemplate
                | ErrorCode::UnterminatedRegExp
                | ErrorCode::UnterminatedComment
        )
    }
}

/// A positioned syntax (or lexical) error.
#[derive(Error, Debug, Clone)]
#[error("{message} ({line}:{column})")]
pub struct SyntaxError {
    pub code: ErrorCode,
    pub message: String,
    pub span: Span,
    /// 0-indexed line of `span.start`.
    pub line: u32,
    /// 0-indexed column of `span.start`.
    pub column: u32,
}

impl SyntaxError {
    pub fn new(code: ErrorCode, message: impl Into<String>, span: Span) -> Self {
        Self {
            code,
            message: message.into(),
            span,
            line: 0,
            column: 0,
        }
    }

    /// Fill in line/column from a line index. Called once by the parser
    /// before an error is surfaced.
    pub fn with_position(mut self, line: u32, column: u32) -> Self {
        self.line = line;
        self.column = column;
        self
    }
}

/// Error type produced by visitor hooks. Hooks can fail with any error;
/// the pass runner annotates it with plugin context before it reaches the
/// caller.
pub type HookError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// A visitor callback failed during a transform pass.
///
/// The traversal engine propagates hook errors unmodified; the pass runner
/// wraps them with the responsible plugin's name and the file being
/// transformed.
#[derive(Error, Debug)]
#[error("plugin \"{plugin}\" failed on {}: {source}", .file.as_deref().unwrap_or("<input>"))]
pub struct TransformError {
    pub plugin: String,
    pub file: Option<String>,
    #[source]
    pub source: HookError,
}

/// Invalid combination of syntax capabilities requested at parser
/// construction.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CapabilityError {
    #[error("capabilities \"{0}\" and \"{1}\" cannot be enabled together")]
    Conflict(&'static str, &'static str),
}

/// Errors raised by scope-index maintenance.
#[derive(Error, Debug, Clone)]
pub enum ScopeError {
    #[error("duplicate declaration \"{name}\"")]
    DuplicateDeclaration { name: String, span: Span },
}

/// Top-level error for the parse → transform → generate pipeline.
#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Syntax(#[from] SyntaxError),
    #[error(transparent)]
    Transform(#[from] TransformError),
    #[error(transparent)]
    Scope(#[from] ScopeError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_syntax_error_display() {
        let err = SyntaxError::new(ErrorCode::UnexpectedToken, "Unexpected token", Span::new(4, 5))
            .with_position(2, 1);
        assert_eq!(err.to_string(), "Unexpected token (2:1)");
    }

    #[test]
    fn test_lex_errors_not_recoverable() {
        assert!(!ErrorCode::UnterminatedString.recoverable());
        assert!(ErrorCode::ExpectedSemicolon.recoverable());
    }
}
