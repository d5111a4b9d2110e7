//! Diagnostics produced by symbol-table construction, typing, the
//! context-condition checks and the transformation pipeline.
//!
//! A `DiagnosticReport` accumulates diagnostics per neuron and is consulted
//! at the end of the semantic phase to decide whether the neuron proceeds.

use serde::Serialize;

use crate::ir::ast::SourcePosition;

/// Severity of a diagnostic
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum Severity {
    /// Progress information
    Info,
    /// A problem that does not prevent code generation
    Warning,
    /// A definite problem, the neuron is excluded outside of dev mode
    Error,
    /// Recorded but not reported
    Suppressed,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Severity::Info => "INFO",
            Severity::Warning => "WARNING",
            Severity::Error => "ERROR",
            Severity::Suppressed => "SUPPRESSED",
        };
        write!(f, "{}", s)
    }
}

/// Identifies the rule that produced a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum DiagnosticCode {
    // Resolution
    VariableNotDefined,
    VariableUsedBeforeDeclaration,
    VariableDefinedRecursively,
    VariableRedeclared,
    FunctionNotDeclared,
    FunctionRedeclared,
    NeuronRedeclared,
    UnknownType,
    OdeWithoutVariable,

    // Typing
    AddSubTypeMismatch,
    SoftIncompatibility,
    HardIncompatibility,
    OperatorTypeMismatch,
    LogicalOperandNotBoolean,
    NoSemantics,
    ImplicitCast,
    ImplicitMagnitudeConversion,
    IncompatibleTypes,
    TypeNotDerivable,

    // Context conditions
    WrongNumberOfArgs,
    ConditionNotBoolean,
    InvariantNotBoolean,
    LoopBoundNotNumeric,
    BufferAssigned,
    ConvolveFirstArgNotShape,
    ConvolveSecondArgNotSpikeBuffer,
    FunctionAliasMultipleLhs,
    InitValueWithoutExpression,
    InitValueWithoutOde,
    InitValueNotResolved,
    SpikeBufferWithoutType,
    MissingReturnValue,
    ReturnTypeMismatch,

    // Pipeline
    StartProcessingNeuron,
    NeuronContainsErrors,
    NeuronSolvedBySolver,
    NeuronAnalyzed,
    TransformationFailed,
}

/// A diagnostic attributed to a source position and, once recorded, to the
/// neuron it was found in.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Diagnostic {
    pub severity: Severity,
    pub code: DiagnosticCode,
    pub message: String,
    pub position: SourcePosition,
    pub neuron: Option<String>,
}

impl Diagnostic {
    pub fn new(severity: Severity, code: DiagnosticCode, message: impl Into<String>) -> Self {
        Self {
            severity,
            code,
            message: message.into(),
            position: SourcePosition::added(),
            neuron: None,
        }
    }

    pub fn error(code: DiagnosticCode, message: impl Into<String>) -> Self {
        Self::new(Severity::Error, code, message)
    }

    pub fn warning(code: DiagnosticCode, message: impl Into<String>) -> Self {
        Self::new(Severity::Warning, code, message)
    }

    pub fn info(code: DiagnosticCode, message: impl Into<String>) -> Self {
        Self::new(Severity::Info, code, message)
    }

    /// Attach a source position
    pub fn at(mut self, position: SourcePosition) -> Self {
        self.position = position;
        self
    }

    /// Attach the owning neuron
    pub fn in_neuron(mut self, neuron: impl Into<String>) -> Self {
        self.neuron = Some(neuron.into());
        self
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.neuron {
            Some(neuron) => write!(
                f,
                "[{}, {}, {}] {:?}: {}",
                self.severity, neuron, self.position, self.code, self.message
            ),
            None => write!(
                f,
                "[{}, {}] {:?}: {}",
                self.severity, self.position, self.code, self.message
            ),
        }
    }
}

/// Accumulated diagnostics
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DiagnosticReport {
    pub diagnostics: Vec<Diagnostic>,
}

impl DiagnosticReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, diagnostic: Diagnostic) {
        log::debug!("{}", diagnostic);
        self.diagnostics.push(diagnostic);
    }

    /// Merge another report into this one
    pub fn merge(&mut self, other: DiagnosticReport) {
        self.diagnostics.extend(other.diagnostics);
    }

    /// Check if any ERROR-severity diagnostics were recorded
    pub fn has_errors(&self) -> bool {
        self.diagnostics.iter().any(Diagnostic::is_error)
    }

    /// Check if any errors or warnings were recorded
    pub fn has_issues(&self) -> bool {
        self.diagnostics
            .iter()
            .any(|d| matches!(d.severity, Severity::Error | Severity::Warning))
    }

    pub fn errors(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics.iter().filter(|d| d.severity == Severity::Error)
    }

    pub fn warnings(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics
            .iter()
            .filter(|d| d.severity == Severity::Warning)
    }

    /// Diagnostics with the given code, in recording order
    pub fn with_code(&self, code: DiagnosticCode) -> Vec<&Diagnostic> {
        self.diagnostics.iter().filter(|d| d.code == code).collect()
    }

    /// Stamp every diagnostic that has no owner with `neuron`
    pub fn attribute_to(&mut self, neuron: &str) {
        for diagnostic in &mut self.diagnostics {
            if diagnostic.neuron.is_none() {
                diagnostic.neuron = Some(neuron.to_string());
            }
        }
    }

    pub fn len(&self) -> usize {
        self.diagnostics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.diagnostics.is_empty()
    }
}
