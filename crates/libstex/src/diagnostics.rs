//! Diagnostic taxonomy for compilation and linking.
//!
//! Diagnostics are *values*, not exceptions: with two exceptions (a missing
//! source file and an unreadable object cache) nothing crosses the object
//! boundary as an error. Every fault is recorded in `Object.errors` at the
//! range it belongs to and survives serialisation into the objectfile, so a
//! later session can re-render it without recompiling.
//!
//! Each diagnostic kind is its own struct with a `thiserror` display; the
//! [`Diagnostic`] enum wraps them transparently and offers constructor
//! helpers, mirroring how the compile passes raise them.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use strum_macros::EnumDiscriminants;
use thiserror::Error;

use crate::location::Location;
use crate::symbols::{reference_kind_serde, ReferenceKind, SymbolError};

/// How severe a diagnostic is when reported to an editor or the terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Severity {
    Info,
    Warning,
    Error,
}

/// A structural fault found while classifying an environment.
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
#[error("{message}")]
pub struct InvalidEnvironment {
    pub message: String,
}

/// An environment that is valid on its own but sits in the wrong context,
/// such as a `modsig` below the file root.
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
#[error("invalid {environment} location: {requirement}")]
pub struct MisplacedEnvironment {
    pub environment: String,
    pub requirement: String,
}

/// The file name does not match what the environment inside it demands.
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
#[error("invalid filename: expected \"{expected}\"")]
pub struct FilenameMismatch {
    pub expected: String,
}

/// A deprecated construct such as `mtref` or the `repos` key.
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
#[error("{message}")]
pub struct DeprecatedConstruct {
    pub message: String,
}

/// An import annotation that repeats what already holds for the current file.
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
#[error("redundant {key} key: \"{value}\" is already the current {key}")]
pub struct RedundantImportKey {
    pub key: String,
    pub value: String,
}

/// The same module imported again into the same scope.
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
#[error("redundant import of module \"{module}\": already imported at {previous}")]
pub struct RedundantImport {
    pub module: String,
    pub previous: Location,
}

/// A non-alternative name collision in the symbol table.
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
#[error("duplicate symbol \"{name}\": already defined at {previous}")]
pub struct DuplicateSymbol {
    pub name: String,
    pub previous: Location,
}

/// An alternative definition whose signature disagrees with its precursors.
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
#[error("invalid redefinition of \"{name}\": {reason} (previous definition at {previous})")]
pub struct InvalidRedefinition {
    pub name: String,
    pub previous: Location,
    pub reason: String,
}

/// A definition or reference that needs an enclosing module but has none.
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
#[error("invalid {environment}: \"{name}\" does not have a module")]
pub struct MissingParentModule {
    pub environment: String,
    pub name: String,
}

/// An imported file does not define the requested module.
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
#[error("module \"{module}\" not defined in file \"{file}\"", file = .file.display())]
pub struct ModuleNotDefined {
    pub module: String,
    pub file: PathBuf,
}

/// An imported file defines the requested module more than once.
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
#[error("module \"{module}\" not unique in file \"{file}\"", file = .file.display())]
pub struct ModuleNotUnique {
    pub module: String,
    pub file: PathBuf,
}

/// An attempt to import a module whose visibility is not public.
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
#[error("module \"{module}\" can't be imported because it is marked private")]
pub struct PrivateModuleImport {
    pub module: String,
}

/// An import that would close a dependency cycle.
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
#[error("dependency to module \"{module}\" creates a cycle at {site}")]
pub struct CyclicDependency {
    pub module: String,
    pub site: Location,
}

/// A reference that resolves to nothing.
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
#[error("undefined symbol \"{name}\" of type {kind}{suggestions}", suggestions = format_suggestions(.suggestions))]
pub struct UndefinedSymbol {
    pub name: String,
    #[serde(with = "reference_kind_serde")]
    pub kind: ReferenceKind,
    pub suggestions: Vec<String>,
}

fn format_suggestions(suggestions: &[String]) -> String {
    if suggestions.is_empty() {
        String::new()
    } else {
        format!(": did you mean {}?", suggestions.join(", "))
    }
}

/// A reference that resolves to several incompatible symbols.
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
#[error("invalid reference to non-unique symbol \"{name}\"")]
pub struct NonUniqueSymbol {
    pub name: String,
}

/// A reference that resolves to a symbol of the wrong kind.
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
#[error("referenced symbol \"{name}\" has wrong type: found {found}, expected {expected}")]
pub struct WrongReferenceKind {
    pub name: String,
    #[serde(with = "reference_kind_serde")]
    pub expected: ReferenceKind,
    #[serde(with = "reference_kind_serde")]
    pub found: ReferenceKind,
}

/// A reference to a symbol annotated as `noverb`.
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
#[error("referenced symbol \"{name}\" is marked as \"noverb\"")]
pub struct NoverbReference {
    pub name: String,
}

/// A reference to a symbol annotated as `noverb` for the current language.
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
#[error("referenced symbol \"{name}\" is marked as \"noverb\" for the language {lang}")]
pub struct NoverbLanguageReference {
    pub name: String,
    pub lang: String,
}

/// A symbol that no linked object ever references.
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
#[error("symbol never referenced: {name}")]
pub struct NeverReferenced {
    pub name: String,
}

/// An error raised while linking a dependency, preserved as text.
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
#[error("failed to link dependency: {message}")]
pub struct LinkFailure {
    pub message: String,
}

/// A syntax error reported by the LaTeX parser.
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
#[error("syntax error: {message}")]
pub struct SyntaxError {
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize, EnumDiscriminants)]
#[strum_discriminants(name(DiagnosticKind))]
pub enum Diagnostic {
    #[error(transparent)]
    SyntaxError(SyntaxError),

    #[error(transparent)]
    InvalidEnvironment(InvalidEnvironment),

    #[error(transparent)]
    MisplacedEnvironment(MisplacedEnvironment),

    #[error(transparent)]
    FilenameMismatch(FilenameMismatch),

    #[error(transparent)]
    DeprecatedConstruct(DeprecatedConstruct),

    #[error(transparent)]
    RedundantImportKey(RedundantImportKey),

    #[error(transparent)]
    RedundantImport(RedundantImport),

    #[error(transparent)]
    DuplicateSymbol(DuplicateSymbol),

    #[error(transparent)]
    InvalidRedefinition(InvalidRedefinition),

    #[error(transparent)]
    MissingParentModule(MissingParentModule),

    #[error(transparent)]
    ModuleNotDefined(ModuleNotDefined),

    #[error(transparent)]
    ModuleNotUnique(ModuleNotUnique),

    #[error(transparent)]
    PrivateModuleImport(PrivateModuleImport),

    #[error(transparent)]
    CyclicDependency(CyclicDependency),

    #[error(transparent)]
    UndefinedSymbol(UndefinedSymbol),

    #[error(transparent)]
    NonUniqueSymbol(NonUniqueSymbol),

    #[error(transparent)]
    WrongReferenceKind(WrongReferenceKind),

    #[error(transparent)]
    NoverbReference(NoverbReference),

    #[error(transparent)]
    NoverbLanguageReference(NoverbLanguageReference),

    #[error(transparent)]
    NeverReferenced(NeverReferenced),

    #[error(transparent)]
    LinkFailure(LinkFailure),
}

impl Diagnostic {
    pub fn severity(&self) -> Severity {
        match self {
            Diagnostic::SyntaxError(_)
            | Diagnostic::InvalidEnvironment(_)
            | Diagnostic::MisplacedEnvironment(_)
            | Diagnostic::DuplicateSymbol(_)
            | Diagnostic::InvalidRedefinition(_)
            | Diagnostic::MissingParentModule(_)
            | Diagnostic::ModuleNotDefined(_)
            | Diagnostic::ModuleNotUnique(_)
            | Diagnostic::PrivateModuleImport(_)
            | Diagnostic::CyclicDependency(_)
            | Diagnostic::UndefinedSymbol(_)
            | Diagnostic::NonUniqueSymbol(_)
            | Diagnostic::WrongReferenceKind(_)
            | Diagnostic::LinkFailure(_) => Severity::Error,
            Diagnostic::FilenameMismatch(_)
            | Diagnostic::DeprecatedConstruct(_)
            | Diagnostic::RedundantImportKey(_)
            | Diagnostic::RedundantImport(_)
            | Diagnostic::NoverbReference(_)
            | Diagnostic::NoverbLanguageReference(_) => Severity::Warning,
            Diagnostic::NeverReferenced(_) => Severity::Info,
        }
    }

    pub fn kind(&self) -> DiagnosticKind {
        DiagnosticKind::from(self)
    }

    pub fn syntax_error(message: impl Into<String>) -> Self {
        Diagnostic::SyntaxError(SyntaxError { message: message.into() })
    }

    pub fn invalid_environment(message: impl Into<String>) -> Self {
        Diagnostic::InvalidEnvironment(InvalidEnvironment { message: message.into() })
    }

    pub fn misplaced_environment(environment: impl Into<String>, requirement: impl Into<String>) -> Self {
        Diagnostic::MisplacedEnvironment(MisplacedEnvironment {
            environment: environment.into(),
            requirement: requirement.into(),
        })
    }

    pub fn filename_mismatch(expected: impl Into<String>) -> Self {
        Diagnostic::FilenameMismatch(FilenameMismatch { expected: expected.into() })
    }

    pub fn deprecated(message: impl Into<String>) -> Self {
        Diagnostic::DeprecatedConstruct(DeprecatedConstruct { message: message.into() })
    }

    pub fn redundant_import_key(key: impl Into<String>, value: impl Into<String>) -> Self {
        Diagnostic::RedundantImportKey(RedundantImportKey { key: key.into(), value: value.into() })
    }

    pub fn redundant_import(module: impl Into<String>, previous: Location) -> Self {
        Diagnostic::RedundantImport(RedundantImport { module: module.into(), previous })
    }

    pub fn missing_parent_module(environment: impl Into<String>, name: impl Into<String>) -> Self {
        Diagnostic::MissingParentModule(MissingParentModule {
            environment: environment.into(),
            name: name.into(),
        })
    }

    pub fn module_not_defined(module: impl Into<String>, file: PathBuf) -> Self {
        Diagnostic::ModuleNotDefined(ModuleNotDefined { module: module.into(), file })
    }

    pub fn module_not_unique(module: impl Into<String>, file: PathBuf) -> Self {
        Diagnostic::ModuleNotUnique(ModuleNotUnique { module: module.into(), file })
    }

    pub fn private_module_import(module: impl Into<String>) -> Self {
        Diagnostic::PrivateModuleImport(PrivateModuleImport { module: module.into() })
    }

    pub fn cyclic_dependency(module: impl Into<String>, site: Location) -> Self {
        Diagnostic::CyclicDependency(CyclicDependency { module: module.into(), site })
    }

    pub fn undefined_symbol(name: impl Into<String>, kind: ReferenceKind, suggestions: Vec<String>) -> Self {
        Diagnostic::UndefinedSymbol(UndefinedSymbol { name: name.into(), kind, suggestions })
    }

    pub fn non_unique_symbol(name: impl Into<String>) -> Self {
        Diagnostic::NonUniqueSymbol(NonUniqueSymbol { name: name.into() })
    }

    pub fn wrong_reference_kind(name: impl Into<String>, expected: ReferenceKind, found: ReferenceKind) -> Self {
        Diagnostic::WrongReferenceKind(WrongReferenceKind { name: name.into(), expected, found })
    }

    pub fn noverb_reference(name: impl Into<String>) -> Self {
        Diagnostic::NoverbReference(NoverbReference { name: name.into() })
    }

    pub fn noverb_language_reference(name: impl Into<String>, lang: impl Into<String>) -> Self {
        Diagnostic::NoverbLanguageReference(NoverbLanguageReference {
            name: name.into(),
            lang: lang.into(),
        })
    }

    pub fn never_referenced(name: impl Into<String>) -> Self {
        Diagnostic::NeverReferenced(NeverReferenced { name: name.into() })
    }

    pub fn link_failure(message: impl Into<String>) -> Self {
        Diagnostic::LinkFailure(LinkFailure { message: message.into() })
    }
}

impl From<SymbolError> for Diagnostic {
    fn from(error: SymbolError) -> Self {
        match error {
            SymbolError::Duplicate { name, previous } => {
                Diagnostic::DuplicateSymbol(DuplicateSymbol { name, previous })
            }
            SymbolError::InvalidRedefinition { name, previous, reason } => {
                Diagnostic::InvalidRedefinition(InvalidRedefinition { name, previous, reason })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::location::{Position, Range};

    #[test]
    fn severities() {
        assert_eq!(Diagnostic::syntax_error("x").severity(), Severity::Error);
        assert_eq!(Diagnostic::deprecated("x").severity(), Severity::Warning);
        assert_eq!(Diagnostic::never_referenced("x").severity(), Severity::Info);
    }

    #[test]
    fn undefined_symbol_message_lists_suggestions() {
        let diagnostic = Diagnostic::undefined_symbol(
            "m?beta",
            ReferenceKind::ANY_DEFINITION,
            vec!["m?alpha".to_string()],
        );
        let message = diagnostic.to_string();
        assert!(message.contains("m?beta"));
        assert!(message.contains("m?alpha"));
    }

    #[test]
    fn symbol_error_conversion() {
        let location = Location::new(
            "/tmp/a.tex",
            Range::new(Position::new(0, 0), Position::new(0, 3)),
        );
        let error = SymbolError::Duplicate { name: "x".into(), previous: location };
        let diagnostic: Diagnostic = error.into();
        assert_eq!(diagnostic.kind(), DiagnosticKind::DuplicateSymbol);
    }
}
