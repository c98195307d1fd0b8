use std::{
    fmt, io,
    path::{Path, PathBuf},
    string::FromUtf8Error,
};

use indoc::formatdoc;
use serde::Serialize;
use swc_core::common::{SourceMap, Span};

use crate::transforms::directives::{DirectiveKind, DirectiveLocation};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct LineColumn {
    /// 1-based.
    pub line: usize,
    /// 0-based, in characters.
    pub column: usize,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct SourceRange {
    pub start: LineColumn,
    pub end: LineColumn,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    pub message: String,
    pub severity: Severity,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<SourceRange>,
}

impl Diagnostic {
    pub(crate) fn new(cm: &SourceMap, span: Span, message: String, severity: Severity) -> Self {
        let location = (!span.is_dummy()).then(|| {
            let start = cm.lookup_char_pos(span.lo);
            let end = cm.lookup_char_pos(span.hi);
            SourceRange {
                start: LineColumn {
                    line: start.line,
                    column: start.col.0,
                },
                end: LineColumn {
                    line: end.line,
                    column: end.col.0,
                },
            }
        });

        Diagnostic {
            message,
            severity,
            location,
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.location {
            Some(range) => write!(
                f,
                "{}:{}: {}",
                range.start.line, range.start.column, self.message
            ),
            None => f.write_str(&self.message),
        }
    }
}

/// Renders `file:line:column: message` for every diagnostic.
struct DiagnosticList<'a> {
    file: &'a Path,
    diagnostics: &'a [Diagnostic],
}

fn list<'a>(file: &'a Path, diagnostics: &'a [Diagnostic]) -> DiagnosticList<'a> {
    DiagnosticList { file, diagnostics }
}

impl fmt::Display for DiagnosticList<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for diagnostic in self.diagnostics {
            write!(f, "\n  {}:{diagnostic}", self.file.display())?;
        }
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TransformError {
    #[error("failed to parse {}{}", .file.display(), list(.file, .diagnostics))]
    Parse {
        file: PathBuf,
        diagnostics: Vec<Diagnostic>,
    },
    #[error("invalid module boundary in {}{}", .file.display(), list(.file, .diagnostics))]
    Boundary {
        file: PathBuf,
        diagnostics: Vec<Diagnostic>,
    },
    #[error("failed to emit code")]
    Codegen(#[from] io::Error),
    #[error("emitted code is not valid UTF-8")]
    Utf8(#[from] FromUtf8Error),
}

impl TransformError {
    pub fn diagnostics(&self) -> &[Diagnostic] {
        match self {
            TransformError::Parse { diagnostics, .. }
            | TransformError::Boundary { diagnostics, .. } => diagnostics,
            TransformError::Codegen(_) | TransformError::Utf8(_) => &[],
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Environment {
    ClientOnly,
    ServerOnly,
}

#[derive(Clone, Debug)]
pub(crate) enum BoundaryErrorKind {
    ConflictingDirectives {
        span: Span,
        first: DirectiveKind,
        second: DirectiveKind,
    },
    DomDefaultExportNotFunction {
        span: Span,
    },
    DomMissingDefaultExport {
        span: Span,
    },
    DomNamedExport {
        span: Span,
    },
    ExportedSyncFunction {
        span: Span,
    },
    InlineSyncFunction {
        span: Span,
    },
    InlineUseServerInClientComponent {
        span: Span,
    },
    InlineUseServerInMethod {
        span: Span,
    },
    InlineUseServerOutsideServerGraph {
        span: Span,
    },
    MisplacedDirective {
        span: Span,
        directive: DirectiveKind,
        location: DirectiveLocation,
    },
    MisspelledDirective {
        span: Span,
        directive: String,
        expected_directive: DirectiveKind,
    },
    NamespaceReExport {
        span: Span,
    },
    RestrictedApi {
        span: Span,
        api: &'static str,
        module: &'static str,
    },
    RestrictedImport {
        span: Span,
        specifier: String,
        environment: Environment,
    },
    UnsupportedDefaultExport {
        span: Span,
    },
    UnsupportedExportPattern {
        span: Span,
    },
    WrappedDirective {
        span: Span,
        directive: DirectiveKind,
    },
}

impl BoundaryErrorKind {
    pub(crate) fn into_message(self) -> (Span, String) {
        match self {
            BoundaryErrorKind::ConflictingDirectives {
                span,
                first,
                second,
            } => (
                span,
                formatdoc! {
                    r#"
                        Conflicting directives "{first}" and "{second}" found in the same file. A module can only carry one of them.
                    "#
                },
            ),
            BoundaryErrorKind::DomDefaultExportNotFunction { span } => (
                span,
                formatdoc! {
                    r#"
                        The default export of a "use dom" module must be a React function component.
                    "#
                },
            ),
            BoundaryErrorKind::DomMissingDefaultExport { span } => (
                span,
                formatdoc! {
                    r#"
                        The "use dom" directive requires a default export to be present in the file.
                    "#
                },
            ),
            BoundaryErrorKind::DomNamedExport { span } => (
                span,
                formatdoc! {
                    r#"
                        Modules with the "use dom" directive only support a single default export.
                    "#
                },
            ),
            BoundaryErrorKind::ExportedSyncFunction { span } => (
                span,
                formatdoc! {
                    r#"
                        Only async functions are allowed to be exported in a "use server" file.
                    "#
                },
            ),
            BoundaryErrorKind::InlineSyncFunction { span } => (
                span,
                formatdoc! {
                    r#"
                        functions marked with "use server" must be async
                    "#
                },
            ),
            BoundaryErrorKind::InlineUseServerInClientComponent { span } => (
                span,
                formatdoc! {
                    r#"
                        It is not allowed to define inline "use server" annotated Server Actions in Client Components.
                        To use Server Actions in a Client Component, you can either export them from a separate file with "use server" at the top, or pass them down through props from a Server Component.
                    "#
                },
            ),
            BoundaryErrorKind::InlineUseServerInMethod { span } => (
                span,
                formatdoc! {
                    r#"
                        It is not allowed to define inline "use server" annotated class or object methods.
                        To define Server Actions, use function declarations, function expressions or arrow functions instead.
                    "#
                },
            ),
            BoundaryErrorKind::InlineUseServerOutsideServerGraph { span } => (
                span,
                formatdoc! {
                    r#"
                        Inline "use server" functions can only be compiled for the React Server environment.
                        Move the function to a file with "use server" at the top to import it from this module.
                    "#
                },
            ),
            BoundaryErrorKind::MisplacedDirective {
                span,
                directive,
                location,
            } => (
                span,
                formatdoc! {
                    r#"
                        The "{directive}" directive must be at the top of the {location}.
                    "#,
                    location = match location {
                        DirectiveLocation::Module => "file",
                        DirectiveLocation::FunctionBody => "function body",
                    }
                },
            ),
            BoundaryErrorKind::MisspelledDirective {
                span,
                directive,
                expected_directive,
            } => (
                span,
                formatdoc! {
                    r#"
                        Did you mean "{expected_directive}"? "{directive}" is not a supported directive name.
                    "#
                },
            ),
            BoundaryErrorKind::NamespaceReExport { span } => (
                span,
                formatdoc! {
                    r#"
                        Namespace exports for server actions are not supported. Re-export named actions instead: export {{ foo }} from "./bar".
                    "#
                },
            ),
            BoundaryErrorKind::RestrictedApi { span, api, module } => (
                span,
                formatdoc! {
                    r#"
                        "{api}" from "{module}" is a client-only API and cannot be used in a React Server Component.
                        Add the "use client" directive at the top of this file to use it.
                    "#
                },
            ),
            BoundaryErrorKind::RestrictedImport {
                span,
                specifier,
                environment,
            } => (
                span,
                match environment {
                    Environment::ClientOnly => formatdoc! {
                        r#"
                            Importing "{specifier}" is not allowed in the React Server environment.
                            Add the "use client" directive at the top of this file, or of a parent module, to import it.
                        "#
                    },
                    Environment::ServerOnly => formatdoc! {
                        r#"
                            Importing "{specifier}" is not allowed in a client module.
                            It can only be imported from modules that run in the React Server environment.
                        "#
                    },
                },
            ),
            BoundaryErrorKind::UnsupportedDefaultExport { span } => (
                span,
                formatdoc! {
                    r#"
                        Not implemented: 'export default' declarations in "use server" files. Try using 'export {{ name as default }}' instead.
                    "#
                },
            ),
            BoundaryErrorKind::UnsupportedExportPattern { span } => (
                span,
                formatdoc! {
                    r#"
                        Destructuring exports are not supported in "use server" files. Export each action by name instead.
                    "#
                },
            ),
            BoundaryErrorKind::WrappedDirective { span, directive } => (
                span,
                formatdoc! {
                    r#"
                        The "{directive}" directive cannot be wrapped in parentheses.
                    "#
                },
            ),
        }
    }
}

#[derive(Clone, Debug)]
pub(crate) enum BoundaryWarningKind {
    UnresolvedExportAll { span: Span, directive: DirectiveKind },
}

impl BoundaryWarningKind {
    pub(crate) fn into_message(self) -> (Span, String) {
        match self {
            BoundaryWarningKind::UnresolvedExportAll { span, directive } => (
                span,
                formatdoc! {
                    r#"
                        `export *` in a "{directive}" module is not resolved. Names re-exported this way are not included in the generated references; re-export them by name instead.
                    "#
                },
            ),
        }
    }
}
