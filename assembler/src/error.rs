use std::fmt::{Display, Formatter};

use annotate_snippets::snippet::{Annotation, AnnotationType, Slice, Snippet, SourceAnnotation};

use crate::Span;

/// Which stage of the pipeline produced an error.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    Layout,
    Resolve,
    Link,
}

impl Display for Phase {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Phase::Layout => write!(f, "layout"),
            Phase::Resolve => write!(f, "resolve"),
            Phase::Link => write!(f, "link"),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum AsmErrorKind {
    DuplicateSymbol { name: String },
    MissingLabel { directive: String },
    ProgramNameTooLong { name: String },
    MultipleStarts,
    StartMustPrecedeInstructions,
    InvalidReservationCount { shown: String },
    UndefinedSymbol { name: String },
    UndefinedExportedSymbol { name: String },
    ExternalSymbolNotAllowedHere { name: String },
    CannotAddressSymbol { symbol: String, value: i32 },
    IndexedAddressingNotSupported,
    DivisionByZero,
    OriginUnavailable,
    ExpressionNotRelocatable,
    NotAvailable { what: &'static str },
}

use AsmErrorKind::*;

/// An assembly-time diagnostic. Collected, never thrown past the
/// component boundary.
#[derive(Clone, Debug, PartialEq)]
pub struct AsmError {
    pub phase: Phase,
    pub kind: AsmErrorKind,
    pub span: Option<Span>,
    pub breaking: bool,
}

impl AsmError {
    pub fn new(phase: Phase, kind: AsmErrorKind, span: Option<Span>) -> Self {
        AsmError {
            phase,
            kind,
            span,
            breaking: false,
        }
    }

    pub fn breaking(phase: Phase, kind: AsmErrorKind, span: Option<Span>) -> Self {
        AsmError {
            phase,
            kind,
            span,
            breaking: true,
        }
    }

    pub fn message(&self) -> String {
        match &self.kind {
            DuplicateSymbol { name } => format!("duplicate symbol '{}'", name),
            MissingLabel { directive } => format!("missing label at {}", directive),
            ProgramNameTooLong { name } => format!("program name '{}' too long", name),
            MultipleStarts => "multiple STARTs are not allowed".to_string(),
            StartMustPrecedeInstructions => "START must precede all instructions".to_string(),
            InvalidReservationCount { shown } => {
                format!("invalid reservation count '{}'", shown)
            }
            UndefinedSymbol { name } => format!("undefined symbol '{}'", name),
            UndefinedExportedSymbol { name } => {
                format!("exported symbol '{}' is not defined", name)
            }
            ExternalSymbolNotAllowedHere { name } => {
                format!("external symbol '{}' is not allowed here", name)
            }
            CannotAddressSymbol { symbol, value } => {
                format!("cannot address symbol '{}' (value {})", symbol, value)
            }
            IndexedAddressingNotSupported => {
                "indexed addressing is not supported here".to_string()
            }
            DivisionByZero => "division by zero".to_string(),
            OriginUnavailable => {
                "ORG has neither a target nor a saved location counter".to_string()
            }
            ExpressionNotRelocatable => "expression is not relocatable".to_string(),
            NotAvailable { what } => format!("{} not available on this machine", what),
        }
    }

    fn annotations(&self) -> Vec<SourceAnnotation> {
        let mut annotations = Vec::new();
        if let Some(span) = &self.span {
            annotations.push(SourceAnnotation {
                range: span.range(),
                label: self.message(),
                annotation_type: AnnotationType::Error,
            });
        }
        annotations
    }

    pub fn create_snippet(&self, source: String, origin: Option<String>) -> Snippet {
        let slices = if self.span.is_some() {
            vec![Slice {
                source,
                origin,
                line_start: 1,
                fold: true,
                annotations: self.annotations(),
            }]
        } else {
            vec![]
        };
        Snippet {
            title: Some(Annotation {
                label: Some(format!("{}: {}", self.phase, self.message())),
                id: None,
                annotation_type: AnnotationType::Error,
            }),
            footer: vec![],
            slices,
        }
    }
}

impl Display for AsmError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.phase, self.message())?;
        if let Some(span) = &self.span {
            write!(f, " at {}", span)?;
        }
        Ok(())
    }
}

/// Collects diagnostics across a pass. Breaking errors do not interrupt the
/// pass they occur in; they stop the pipeline from entering the next one.
#[derive(Debug, Default)]
pub struct ErrorCatcher {
    errors: Vec<AsmError>,
}

impl ErrorCatcher {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn add(&mut self, error: AsmError) {
        self.errors.push(error);
    }

    pub fn count(&self) -> usize {
        self.errors.len()
    }

    pub fn has_breaking(&self) -> bool {
        self.errors.iter().any(|e| e.breaking)
    }

    pub fn errors(&self) -> &[AsmError] {
        &self.errors
    }

    pub fn into_errors(self) -> Vec<AsmError> {
        self.errors
    }
}

/// A linker failure. The second pass cannot safely continue once a patch
/// target is unknown, so these abort the link operation immediately.
#[derive(Debug)]
pub enum LinkError {
    DuplicateExternalSymbol { name: String, module: String },
    UndefinedExternalSymbol { name: String, module: String },
    PatchRangeNotInAnyTextRecord { section: String, address: i32, nibbles: u8 },
    MalformedModule { line: usize, reason: String },
    Io(std::io::Error),
}

impl Display for LinkError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        use LinkError::*;
        write!(f, "link: ")?;
        match self {
            DuplicateExternalSymbol { name, module } => {
                write!(f, "duplicate external symbol '{}' in module {}", name, module)
            }
            UndefinedExternalSymbol { name, module } => {
                write!(f, "undefined external symbol '{}' in module {}", name, module)
            }
            PatchRangeNotInAnyTextRecord { section, address, nibbles } => write!(
                f,
                "patch range {:06X}+{} half-bytes of section {} is not covered by any text record",
                address, nibbles, section
            ),
            MalformedModule { line, reason } => {
                write!(f, "malformed object module at line {}: {}", line, reason)
            }
            Io(e) => write!(f, "error writing output: {}", e),
        }
    }
}

impl std::error::Error for LinkError {}

impl From<std::io::Error> for LinkError {
    fn from(e: std::io::Error) -> Self {
        LinkError::Io(e)
    }
}
