//! Syntax capabilities and their grammar hooks.
//!
//! Syntax extensions are independently togglable. The parser does not
//! branch on capability names at its grammar entry points; instead a set
//! of `SyntaxExtension` implementations is selected once at parser
//! construction, and the grammar consults that set through narrow hooks
//! (extra infix operators, decorator prefixes, placeholder atoms).

use crate::ast::BinaryOp;
use crate::error::CapabilityError;
use crate::token::TokenKind;

/// The enabled syntax-extension flags.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Capabilities {
    /// `@decorator` syntax (current proposal placement rules).
    pub decorators: bool,
    /// `@decorator` syntax with the legacy placement rules. Mutually
    /// exclusive with `decorators`.
    pub decorators_legacy: bool,
    /// `a |> f` pipeline operator.
    pub pipeline: bool,
    /// `%%name%%` substitution slots for quasi-code templates.
    pub placeholders: bool,
}

impl Capabilities {
    /// Check for conflicting combinations.
    pub fn validate(&self) -> Result<(), CapabilityError> {
        if self.decorators && self.decorators_legacy {
            return Err(CapabilityError::Conflict("decorators", "decorators-legacy"));
        }
        Ok(())
    }
}

/// One syntax extension's grammar hooks. Implementations are stateless
/// singletons; the extension set holds `'static` references to them.
pub trait SyntaxExtension {
    fn name(&self) -> &'static str;

    /// Claim a token as an extra infix operator: `(precedence, op)`.
    /// Core operators occupy precedences 1..=12; extensions may use 0 for
    /// a tier below everything.
    fn infix(&self, _token: &TokenKind) -> Option<(u8, BinaryOp)> {
        None
    }

    /// This extension enables `@` decorators.
    fn decorators(&self) -> bool {
        false
    }

    /// This extension enables `%%name%%` placeholders.
    fn placeholders(&self) -> bool {
        false
    }
}

struct DecoratorsExt;

impl SyntaxExtension for DecoratorsExt {
    fn name(&self) -> &'static str {
        "decorators"
    }
    fn decorators(&self) -> bool {
        true
    }
}

struct DecoratorsLegacyExt;

impl SyntaxExtension for DecoratorsLegacyExt {
    fn name(&self) -> &'static str {
        "decorators-legacy"
    }
    fn decorators(&self) -> bool {
        true
    }
}

struct PipelineExt;

impl SyntaxExtension for PipelineExt {
    fn name(&self) -> &'static str {
        "pipeline"
    }
    fn infix(&self, token: &TokenKind) -> Option<(u8, BinaryOp)> {
        if matches!(token, TokenKind::PipeGt) {
            Some((0, BinaryOp::Pipeline))
        } else {
            None
        }
    }
}

struct PlaceholdersExt;

impl SyntaxExtension for PlaceholdersExt {
    fn name(&self) -> &'static str {
        "placeholders"
    }
    fn placeholders(&self) -> bool {
        true
    }
}

static DECORATORS: DecoratorsExt = DecoratorsExt;
static DECORATORS_LEGACY: DecoratorsLegacyExt = DecoratorsLegacyExt;
static PIPELINE: PipelineExt = PipelineExt;
static PLACEHOLDERS: PlaceholdersExt = PlaceholdersExt;

/// The extensions selected for one parser instance.
#[derive(Clone)]
pub struct ExtensionSet {
    exts: Vec<&'static dyn SyntaxExtension>,
}

impl ExtensionSet {
    /// Build the extension set for a capability combination.
    pub fn from_capabilities(caps: &Capabilities) -> Result<Self, CapabilityError> {
        caps.validate()?;
        let mut exts: Vec<&'static dyn SyntaxExtension> = Vec::new();
        if caps.decorators {
            exts.push(&DECORATORS);
        }
        if caps.decorators_legacy {
            exts.push(&DECORATORS_LEGACY);
        }
        if caps.pipeline {
            exts.push(&PIPELINE);
        }
        if caps.placeholders {
            exts.push(&PLACEHOLDERS);
        }
        Ok(Self { exts })
    }

    pub fn infix(&self, token: &TokenKind) -> Option<(u8, BinaryOp)> {
        self.exts.iter().find_map(|e| e.infix(token))
    }

    pub fn decorators(&self) -> bool {
        self.exts.iter().any(|e| e.decorators())
    }

    pub fn placeholders(&self) -> bool {
        self.exts.iter().any(|e| e.placeholders())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conflicting_decorator_styles() {
        let caps = Capabilities { decorators: true, decorators_legacy: true, ..Default::default() };
        assert!(caps.validate().is_err());
    }

    #[test]
    fn test_pipeline_infix() {
        let caps = Capabilities { pipeline: true, ..Default::default() };
        let exts = ExtensionSet::from_capabilities(&caps).unwrap();
        assert_eq!(exts.infix(&TokenKind::PipeGt), Some((0, BinaryOp::Pipeline)));
        assert_eq!(exts.infix(&TokenKind::Plus), None);

        let none = ExtensionSet::from_capabilities(&Capabilities::default()).unwrap();
        assert_eq!(none.infix(&TokenKind::PipeGt), None);
    }
}
