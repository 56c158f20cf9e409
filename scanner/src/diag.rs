// diag.rs — Unified diagnostics model
//
// Shared diagnostic types emitted by every phase of an analysis run.
// Diagnostics are data: they travel alongside the report and never abort
// the run. Callers decide which levels fail a build.
//
// Preconditions: none (types only).
// Postconditions: none (types only).
// Failure modes: none.
// Side effects: none.

use std::fmt;

use serde::Serialize;

use crate::source::Location;

// ── Diagnostic code ──────────────────────────────────────────────────────

/// A stable diagnostic code (e.g., `E0200`, `W0101`).
///
/// Codes are `&'static str` constants defined in the `codes` module.
/// Once assigned, a code must never be reassigned to a different meaning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct DiagCode(pub &'static str);

impl fmt::Display for DiagCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

pub mod codes {
    use super::DiagCode;

    // Extraction / field parsing
    pub const UNTERMINATED_DECL: DiagCode = DiagCode("E0100");
    pub const OPAQUE_FIELD: DiagCode = DiagCode("W0101");
    pub const UNSUPPORTED_REGISTER: DiagCode = DiagCode("W0102");
    pub const LEX_ERROR: DiagCode = DiagCode("W0103");
    pub const RESOURCE_ARRAY_CAPPED: DiagCode = DiagCode("W0104");

    // Composite resolution
    pub const UNRESOLVED_MEMBER: DiagCode = DiagCode("E0200");
    pub const COMPOSITE_CYCLE: DiagCode = DiagCode("E0201");

    // Preprocessing
    pub const PREPROCESS_FAILURE: DiagCode = DiagCode("E0300");
    pub const MISSING_INCLUDE: DiagCode = DiagCode("W0301");
    pub const INCLUDE_CYCLE: DiagCode = DiagCode("W0302");

    // Aggregation
    pub const UNKNOWN_ENTRY_REFERENCE: DiagCode = DiagCode("W0400");
}

// ── Severity level ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DiagLevel {
    Error,
    Warning,
}

// ── Taxonomy ─────────────────────────────────────────────────────────────

/// What went wrong, independent of wording. Alignment outcomes (no
/// candidate, ambiguity) are report rows, not diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagKind {
    /// A declaration or field could not be parsed.
    Parse,
    /// Unrecognized characters in source text.
    Lex,
    /// A composite buffer references a declaration that does not exist.
    UnresolvedMember,
    /// A composite references itself transitively.
    CompositeCycle,
    /// The expansion collaborator could not process a whole file.
    PreprocessFailure,
    /// An include could not be found or would recurse; expansion continued.
    MissingInclude,
    /// An entry point names a declaration that is not in the pool.
    UnknownEntryReference,
}

// ── Related location ─────────────────────────────────────────────────────

/// A secondary source location providing context for a diagnostic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RelatedLocation {
    pub location: Location,
    pub label: String,
}

// ── Diagnostic ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    pub code: Option<DiagCode>,
    pub level: DiagLevel,
    pub kind: DiagKind,
    pub location: Option<Location>,
    pub message: String,
    pub hint: Option<String>,
    pub related: Vec<RelatedLocation>,
}

impl Diagnostic {
    /// Create a new diagnostic with no code, location, hint, or related spans.
    pub fn new(level: DiagLevel, kind: DiagKind, message: impl Into<String>) -> Self {
        Self {
            code: None,
            level,
            kind,
            location: None,
            message: message.into(),
            hint: None,
            related: Vec::new(),
        }
    }

    pub fn error(kind: DiagKind, message: impl Into<String>) -> Self {
        Self::new(DiagLevel::Error, kind, message)
    }

    pub fn warning(kind: DiagKind, message: impl Into<String>) -> Self {
        Self::new(DiagLevel::Warning, kind, message)
    }

    /// Attach a stable diagnostic code.
    pub fn with_code(mut self, code: DiagCode) -> Self {
        self.code = Some(code);
        self
    }

    /// Attach the primary location.
    pub fn at(mut self, location: Location) -> Self {
        self.location = Some(location);
        self
    }

    /// Attach a remediation hint.
    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }

    /// Attach a related location.
    pub fn with_related(mut self, location: Location, label: impl Into<String>) -> Self {
        self.related.push(RelatedLocation {
            location,
            label: label.into(),
        });
        self
    }

    pub fn is_error(&self) -> bool {
        self.level == DiagLevel::Error
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let level = match self.level {
            DiagLevel::Error => "error",
            DiagLevel::Warning => "warning",
        };
        if let Some(loc) = &self.location {
            write!(f, "{}: ", loc)?;
        }
        if let Some(code) = &self.code {
            write!(f, "{}[{}]: {}", level, code, self.message)?;
        } else {
            write!(f, "{}: {}", level, self.message)?;
        }
        for rel in &self.related {
            write!(f, "\n  note: {}: {}", rel.location, rel.label)?;
        }
        if let Some(hint) = &self.hint {
            write!(f, "\n  hint: {}", hint)?;
        }
        Ok(())
    }
}

pub fn has_errors(diags: &[Diagnostic]) -> bool {
    diags.iter().any(Diagnostic::is_error)
}
