//! Assignable conversion and lvalue validation.
//!
//! The expression grammar produces object/array literals, spreads, and
//! assignments; when one of those turns out to sit in assignment-target
//! or binding position (destructuring assignment, arrow parameters,
//! for-in/of heads), `to_assignable` retypes the nodes in place into the
//! corresponding pattern kinds, and `check_lval` validates the result
//! against the binding context.

use crate::ast::{AssignOp, NodeId, NodeKind, PlaceholderKind};
use crate::error::{ErrorCode, SyntaxError};
use crate::parser::Parser;
use crate::token::is_strict_bind_reserved_word;
use rustc_hash::FxHashSet;

/// The binding context `check_lval` validates against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindKind {
    /// Plain assignment target, no binding introduced.
    None,
    Var,
    /// `let` / `const` / import bindings.
    Lexical,
    Class,
    Param,
    CatchParam,
    /// Hoisted function declaration name.
    Function,
}

impl<'a> Parser<'a> {
    /// Convert an already-parsed expression into an assignable pattern,
    /// retyping nodes in place. `is_lhs` distinguishes assignment targets
    /// (`[a.b] = c` is fine) from binding patterns (where member
    /// expressions are rejected later by `check_lval`).
    pub(crate) fn to_assignable(&mut self, id: NodeId, is_lhs: bool) -> Result<(), SyntaxError> {
        let span = self.ast.span(id);
        if self.ast.node(id).extra.parenthesized {
            let ok = is_lhs
                && matches!(
                    self.ast.kind(id),
                    NodeKind::Identifier { .. } | NodeKind::MemberExpression { .. }
                );
            if !ok {
                self.raise(
                    ErrorCode::InvalidParenthesizedAssignment,
                    "Invalid parenthesized assignment pattern",
                    span,
                )?;
            }
        }

        match self.ast.kind(id).clone() {
            NodeKind::Identifier { .. }
            | NodeKind::ObjectPattern { .. }
            | NodeKind::ArrayPattern { .. }
            | NodeKind::AssignmentPattern { .. }
            | NodeKind::RestElement { .. }
            | NodeKind::MemberExpression { .. } => {}

            NodeKind::Placeholder { name, expected } => {
                // An Expression placeholder in pattern position becomes a
                // Pattern placeholder; no reparse needed.
                if expected == PlaceholderKind::Expression {
                    self.ast.replace_kind(
                        id,
                        NodeKind::Placeholder { name, expected: PlaceholderKind::Pattern },
                    );
                }
            }

            NodeKind::ObjectExpression { properties } => {
                let trailing_comma = self.ast.node(id).extra.trailing_comma;
                let last = properties.len().saturating_sub(1);
                for (i, prop) in properties.iter().enumerate() {
                    self.to_assignable_object_prop(*prop, i == last, is_lhs)?;
                    if i == last
                        && matches!(self.ast.kind(*prop), NodeKind::RestElement { .. })
                    {
                        if let Some(comma) = trailing_comma {
                            self.raise(
                                ErrorCode::RestTrailingComma,
                                "A trailing comma is not permitted after the rest element",
                                crate::span::Span::new(comma, comma + 1),
                            )?;
                        }
                    }
                }
                self.ast.replace_kind(id, NodeKind::ObjectPattern { properties });
                self.pending_cover_init = None;
            }

            NodeKind::ArrayExpression { elements } => {
                let trailing_comma = self.ast.node(id).extra.trailing_comma;
                self.to_assignable_list(&elements, trailing_comma, is_lhs)?;
                self.ast.replace_kind(id, NodeKind::ArrayPattern { elements });
            }

            NodeKind::AssignmentExpression { op, left, right } => {
                if op != AssignOp::Assign {
                    self.raise(
                        ErrorCode::MissingEqInAssignment,
                        "Only `=` is allowed in a destructuring default",
                        self.ast.span(left),
                    )?;
                }
                self.ast.replace_kind(id, NodeKind::AssignmentPattern { left, right });
                self.to_assignable(left, is_lhs)?;
            }

            NodeKind::SpreadElement { argument } => {
                self.check_rest_conversion(argument)?;
                self.ast.replace_kind(id, NodeKind::RestElement { argument });
                self.to_assignable(argument, is_lhs)?;
            }

            // Anything else is left as-is; `check_lval` reports it with a
            // positioned error.
            _ => {}
        }
        Ok(())
    }

    fn to_assignable_object_prop(
        &mut self,
        prop: NodeId,
        is_last: bool,
        is_lhs: bool,
    ) -> Result<(), SyntaxError> {
        match self.ast.kind(prop).clone() {
            NodeKind::ObjectMethod { kind, key, .. } => {
                let (code, what) = match kind {
                    crate::ast::MethodKind::Get | crate::ast::MethodKind::Set => {
                        (ErrorCode::PatternHasAccessor, "an accessor")
                    }
                    _ => (ErrorCode::PatternHasMethod, "a method"),
                };
                self.raise(
                    code,
                    format!("A destructuring pattern cannot contain {what}"),
                    self.ast.span(key),
                )?;
                Ok(())
            }
            NodeKind::SpreadElement { argument } => {
                if !is_last {
                    self.raise(
                        ErrorCode::ElementAfterRest,
                        "The rest element must be last",
                        self.ast.span(prop),
                    )?;
                }
                self.check_rest_conversion(argument)?;
                self.ast.replace_kind(prop, NodeKind::RestElement { argument });
                Ok(())
            }
            NodeKind::ObjectProperty { value, .. } => self.to_assignable(value, is_lhs),
            NodeKind::RestElement { .. } => Ok(()),
            _ => self.to_assignable(prop, is_lhs),
        }
    }

    fn to_assignable_list(
        &mut self,
        elements: &[Option<NodeId>],
        trailing_comma: Option<u32>,
        is_lhs: bool,
    ) -> Result<(), SyntaxError> {
        let last = elements.len().saturating_sub(1);
        for (i, elem) in elements.iter().enumerate() {
            let Some(elem) = elem else { continue };
            let is_spread = matches!(self.ast.kind(*elem), NodeKind::SpreadElement { .. });
            self.to_assignable(*elem, is_lhs)?;
            if matches!(self.ast.kind(*elem), NodeKind::RestElement { .. }) {
                if i != last {
                    self.raise(
                        ErrorCode::ElementAfterRest,
                        "The rest element must be last",
                        self.ast.span(*elem),
                    )?;
                } else if is_spread {
                    // A converted spread's target must have pattern shape.
                    if let NodeKind::RestElement { argument } = self.ast.kind(*elem).clone() {
                        if !matches!(
                            self.ast.kind(argument),
                            NodeKind::Identifier { .. }
                                | NodeKind::MemberExpression { .. }
                                | NodeKind::ArrayPattern { .. }
                                | NodeKind::ObjectPattern { .. }
                                | NodeKind::Placeholder { .. }
                        ) {
                            self.raise(
                                ErrorCode::InvalidRestTarget,
                                "Invalid rest operator target",
                                self.ast.span(argument),
                            )?;
                        }
                    }
                    if let Some(comma) = trailing_comma {
                        self.raise(
                            ErrorCode::RestTrailingComma,
                            "A trailing comma is not permitted after the rest element",
                            crate::span::Span::new(comma, comma + 1),
                        )?;
                    }
                }
            }
        }
        Ok(())
    }

    fn check_rest_conversion(&mut self, argument: NodeId) -> Result<(), SyntaxError> {
        if !matches!(
            self.ast.kind(argument),
            NodeKind::Identifier { .. }
                | NodeKind::MemberExpression { .. }
                | NodeKind::ArrayExpression { .. }
                | NodeKind::ObjectExpression { .. }
                | NodeKind::ArrayPattern { .. }
                | NodeKind::ObjectPattern { .. }
                | NodeKind::Placeholder { .. }
        ) {
            self.raise(
                ErrorCode::InvalidRestTarget,
                "Invalid rest operator target",
                self.ast.span(argument),
            )?;
        }
        Ok(())
    }

    /// Verify that `id` is a legal assignment/binding target in the given
    /// binding context. For non-`None` contexts the bound names are also
    /// registered into the scope under construction.
    pub(crate) fn check_lval(
        &mut self,
        id: NodeId,
        bind: BindKind,
        mut clashes: Option<&mut FxHashSet<String>>,
        disallow_let: bool,
        strict_mode_changed: bool,
    ) -> Result<(), SyntaxError> {
        match self.ast.kind(id).clone() {
            NodeKind::Identifier { name } => {
                let span = self.ast.span(id);
                let strict_violation = self.strict
                    && if strict_mode_changed {
                        is_strict_bind_reserved_word(&name)
                    } else {
                        matches!(name.as_str(), "eval" | "arguments")
                    };
                if strict_violation {
                    let code = if bind == BindKind::None {
                        ErrorCode::StrictEvalArguments
                    } else {
                        ErrorCode::StrictEvalArgumentsBinding
                    };
                    self.raise(code, format!("Assigning to \"{name}\" in strict mode"), span)?;
                }
                if let Some(set) = clashes.as_deref_mut() {
                    if !set.insert(name.clone()) {
                        self.raise(
                            ErrorCode::ParamDupe,
                            format!("Duplicate parameter name \"{name}\""),
                            span,
                        )?;
                    }
                }
                if disallow_let && name == "let" {
                    self.raise(
                        ErrorCode::LetInLexicalBinding,
                        "`let` cannot be bound by a lexical declaration",
                        span,
                    )?;
                }
                if bind != BindKind::None {
                    self.declare_name(&name, bind, span)?;
                }
                Ok(())
            }

            NodeKind::MemberExpression { .. } => {
                if bind != BindKind::None {
                    self.raise(
                        ErrorCode::InvalidPropertyBindingPattern,
                        "A member expression cannot be a binding pattern",
                        self.ast.span(id),
                    )?;
                }
                Ok(())
            }

            NodeKind::ObjectPattern { properties } => {
                for prop in properties {
                    match self.ast.kind(prop).clone() {
                        NodeKind::ObjectProperty { value, .. } => {
                            self.check_lval(
                                value,
                                bind,
                                clashes.as_deref_mut(),
                                disallow_let,
                                strict_mode_changed,
                            )?;
                        }
                        NodeKind::RestElement { argument } => {
                            self.check_lval(
                                argument,
                                bind,
                                clashes.as_deref_mut(),
                                disallow_let,
                                strict_mode_changed,
                            )?;
                        }
                        // Already reported by the assignable conversion.
                        NodeKind::ObjectMethod { .. } => {}
                        _ => {
                            self.check_lval(
                                prop,
                                bind,
                                clashes.as_deref_mut(),
                                disallow_let,
                                strict_mode_changed,
                            )?;
                        }
                    }
                }
                Ok(())
            }

            NodeKind::ArrayPattern { elements } => {
                for elem in elements.into_iter().flatten() {
                    self.check_lval(
                        elem,
                        bind,
                        clashes.as_deref_mut(),
                        disallow_let,
                        strict_mode_changed,
                    )?;
                }
                Ok(())
            }

            NodeKind::AssignmentPattern { left, .. } => {
                self.check_lval(left, bind, clashes, disallow_let, strict_mode_changed)
            }

            NodeKind::RestElement { argument } => {
                self.check_lval(argument, bind, clashes, disallow_let, strict_mode_changed)
            }

            NodeKind::Placeholder { .. } => Ok(()),

            _ => {
                let code = if bind == BindKind::None {
                    ErrorCode::InvalidLhs
                } else {
                    ErrorCode::InvalidLhsBinding
                };
                self.raise(code, "Invalid assignment target", self.ast.span(id))?;
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::ast::NodeKind;
    use crate::error::ErrorCode;
    use crate::parser::{Parser, ParserOptions};

    fn parse_err(source: &str) -> crate::error::SyntaxError {
        Parser::new(source, ParserOptions::default())
            .expect("options are valid")
            .parse()
            .expect_err("parse should fail")
    }

    #[test]
    fn test_method_in_pattern_rejected() {
        let err = parse_err("({ m() {} } = x);");
        assert_eq!(err.code, ErrorCode::PatternHasMethod);
    }

    #[test]
    fn test_accessor_in_pattern_rejected() {
        let err = parse_err("({ get a() {} } = x);");
        assert_eq!(err.code, ErrorCode::PatternHasAccessor);
    }

    #[test]
    fn test_rest_must_be_last_in_assignment() {
        let err = parse_err("[...a, b] = c;");
        assert_eq!(err.code, ErrorCode::ElementAfterRest);
    }

    #[test]
    fn test_invalid_rest_target() {
        let err = parse_err("({...1} = x);");
        assert_eq!(err.code, ErrorCode::InvalidRestTarget);
    }

    #[test]
    fn test_compound_default_rejected() {
        let err = parse_err("[a += 1] = b;");
        assert_eq!(err.code, ErrorCode::MissingEqInAssignment);
    }

    #[test]
    fn test_nested_destructuring_converts() {
        let result = Parser::new("({a: [b, ...c], d: {e = 1}} = x);", ParserOptions::default())
            .unwrap()
            .parse()
            .unwrap();
        // The whole tree converted: no ObjectExpression remains on the
        // left of the assignment.
        let root = result.ast.root;
        let NodeKind::Program { body, .. } = result.ast.kind(root).clone() else { panic!() };
        let NodeKind::ExpressionStatement { expression } = result.ast.kind(body[0]).clone() else {
            panic!()
        };
        let NodeKind::AssignmentExpression { left, .. } = result.ast.kind(expression).clone()
        else {
            panic!()
        };
        assert!(matches!(result.ast.kind(left), NodeKind::ObjectPattern { .. }));
    }

    #[test]
    fn test_strict_eval_assignment_rejected() {
        let err = parse_err("\"use strict\"; eval = 1;");
        assert_eq!(err.code, ErrorCode::StrictEvalArguments);
    }

    #[test]
    fn test_member_expression_as_binding_rejected() {
        let err = parse_err("let a.b = 1;");
        assert!(matches!(
            err.code,
            ErrorCode::InvalidPropertyBindingPattern | ErrorCode::ExpectedSemicolon | ErrorCode::UnexpectedToken
        ));
    }
}
