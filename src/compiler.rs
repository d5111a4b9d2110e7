//! High-level API running the semantic phase and the equation
//! transformation over compilation units.
//!
//! The main entry point is the [`Compiler`] struct, configured through a
//! builder:
//!
//! ```no_run
//! use nestml_core::solver::ProcessSolver;
//! use nestml_core::Compiler;
//!
//! let result = Compiler::new()
//!     .dev_mode(false)
//!     .solver(ProcessSolver::new("ode-toolbox"))
//!     .compile_file("iaf_psc_alpha.json")?;
//! for model in result.included() {
//!     println!("{}", model.name);
//! }
//! # Ok::<(), anyhow::Error>(())
//! ```
//!
//! Neurons are processed one after another. Each one is scoped, typed and
//! checked; a neuron with errors is excluded outside of dev mode, the rest
//! have their equations resolved and are scoped and typed again so the
//! rewritten tree is consistent.

use std::collections::{HashSet, VecDeque};
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use indexmap::IndexMap;
use serde::Serialize;

use crate::ir::analysis::cocos::{check_neuron, check_neuron_names};
use crate::ir::analysis::predefined::PredefinedContext;
use crate::ir::analysis::symbol_table::build_symbol_table;
use crate::ir::analysis::type_checker::check_neuron_types;
use crate::ir::ast::{CompilationUnit, Neuron};
use crate::ir::diagnostics::{Diagnostic, DiagnosticCode, DiagnosticReport};
use crate::ir::transform::ode::{transform_neuron, TransformOptions, TransformOutcome};
use crate::solver::Solver;

/// Knobs of a compilation run.
#[derive(Debug, Clone)]
pub struct CompilerOptions {
    /// Keep neurons with errors and transform them anyway.
    pub dev_mode: bool,
    /// Stop after the checks.
    pub dry_run: bool,
    /// Rounds of alias inlining before aliases are declared cyclic.
    pub max_alias_passes: usize,
}

impl Default for CompilerOptions {
    fn default() -> Self {
        Self {
            dev_mode: false,
            dry_run: false,
            max_alias_passes: TransformOptions::default().max_alias_passes,
        }
    }
}

/// What happened to a neuron.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelStatus {
    /// Ready for rendering.
    Included,
    /// Dropped because of errors found by the checks.
    Excluded,
    /// The transformation of its equations failed.
    Failed,
}

/// One neuron as handed to the renderer.
#[derive(Debug, Clone, Serialize)]
pub struct ModelResult {
    pub name: String,
    pub file_name: String,
    pub status: ModelStatus,
    /// `None` when the transformation did not run.
    pub outcome: Option<TransformOutcome>,
    pub diagnostics: Vec<Diagnostic>,
    pub neuron: Neuron,
}

impl ModelResult {
    pub fn has_errors(&self) -> bool {
        self.diagnostics.iter().any(Diagnostic::is_error)
    }
}

/// Result of a run, models in input order.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CompilationResult {
    pub models: Vec<ModelResult>,
}

impl CompilationResult {
    pub fn included(&self) -> impl Iterator<Item = &ModelResult> {
        self.models
            .iter()
            .filter(|model| model.status == ModelStatus::Included)
    }

    pub fn model(&self, name: &str) -> Option<&ModelResult> {
        self.models.iter().find(|model| model.name == name)
    }

    /// Every diagnostic of the run, model by model.
    pub fn diagnostics(&self) -> impl Iterator<Item = &Diagnostic> {
        self.models.iter().flat_map(|model| &model.diagnostics)
    }
}

/// Compiler for neuron models.
#[derive(Default)]
pub struct Compiler {
    options: CompilerOptions,
    solver: Option<Box<dyn Solver>>,
}

impl Compiler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn options(mut self, options: CompilerOptions) -> Self {
        self.options = options;
        self
    }

    pub fn dev_mode(mut self, dev_mode: bool) -> Self {
        self.options.dev_mode = dev_mode;
        self
    }

    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.options.dry_run = dry_run;
        self
    }

    pub fn max_alias_passes(mut self, passes: usize) -> Self {
        self.options.max_alias_passes = passes;
        self
    }

    /// Solver used for neurons with shapes. Without one those neurons fail.
    pub fn solver(mut self, solver: impl Solver + 'static) -> Self {
        self.solver = Some(Box::new(solver));
        self
    }

    /// Compile a JSON-serialized compilation unit.
    pub fn compile_file(&self, path: impl AsRef<Path>) -> Result<CompilationResult> {
        self.compile_files(&[path])
    }

    /// Compile several files, one compilation unit each. Neuron names must
    /// be unique across all of them.
    pub fn compile_files(&self, paths: &[impl AsRef<Path>]) -> Result<CompilationResult> {
        let mut units = Vec::with_capacity(paths.len());
        for path in paths {
            units.push(read_unit(path.as_ref())?);
        }
        Ok(self.compile_units(units))
    }

    pub fn compile_units(&self, units: Vec<CompilationUnit>) -> CompilationResult {
        let ctx = PredefinedContext::shared();
        let names = check_neuron_names(&units);
        let transform_options = TransformOptions {
            max_alias_passes: self.options.max_alias_passes,
        };

        // Redeclarations are reported in order, one per repeated definition.
        let mut redeclared: IndexMap<String, VecDeque<Diagnostic>> = IndexMap::new();
        for diagnostic in names.diagnostics {
            let name = diagnostic.neuron.clone().unwrap_or_default();
            redeclared.entry(name).or_default().push_back(diagnostic);
        }
        let mut seen = HashSet::new();

        let mut result = CompilationResult::default();
        for unit in units {
            for neuron in unit.neurons {
                let mut report = DiagnosticReport::new();
                if !seen.insert(neuron.name.clone()) {
                    if let Some(diagnostic) = redeclared
                        .get_mut(&neuron.name)
                        .and_then(VecDeque::pop_front)
                    {
                        report.add(diagnostic);
                    }
                }
                result.models.push(self.compile_neuron(
                    neuron,
                    &unit.file_name,
                    &ctx,
                    &transform_options,
                    report,
                ));
            }
        }
        result
    }

    fn compile_neuron(
        &self,
        mut neuron: Neuron,
        file_name: &str,
        ctx: &PredefinedContext,
        transform_options: &TransformOptions,
        mut report: DiagnosticReport,
    ) -> ModelResult {
        log::info!("Start processing neuron '{}'", neuron.name);
        report.add(
            Diagnostic::info(
                DiagnosticCode::StartProcessingNeuron,
                format!("Start processing neuron '{}'", neuron.name),
            )
            .at(neuron.position),
        );

        let (table, scoping) = build_symbol_table(&mut neuron, ctx);
        report.merge(scoping);
        report.merge(check_neuron_types(&mut neuron, &table, ctx));
        report.merge(check_neuron(&neuron, &table));

        let mut status = ModelStatus::Included;
        let mut outcome = None;
        if report.has_errors() && !self.options.dev_mode {
            log::warn!("Neuron '{}' contains errors and is excluded", neuron.name);
            report.add(
                Diagnostic::error(
                    DiagnosticCode::NeuronContainsErrors,
                    format!("Neuron '{}' contains errors, no code is generated", neuron.name),
                )
                .at(neuron.position),
            );
            status = ModelStatus::Excluded;
        } else if !self.options.dry_run {
            match transform_neuron(
                &mut neuron,
                self.solver.as_deref(),
                transform_options,
                &mut report,
            ) {
                Ok(done) => {
                    outcome = Some(done);
                    if done != TransformOutcome::Unchanged {
                        refresh(&mut neuron, ctx, &mut report);
                    }
                }
                Err(error) => {
                    log::error!("Transforming neuron '{}' failed: {:#}", neuron.name, error);
                    report.add(
                        Diagnostic::error(
                            DiagnosticCode::TransformationFailed,
                            format!("Transforming neuron '{}' failed: {:#}", neuron.name, error),
                        )
                        .at(neuron.position),
                    );
                    status = ModelStatus::Failed;
                }
            }
        }

        report.attribute_to(&neuron.name);
        ModelResult {
            name: neuron.name.clone(),
            file_name: file_name.to_string(),
            status,
            outcome,
            diagnostics: report.diagnostics,
            neuron,
        }
    }
}

/// Scope and type the rewritten neuron again, keeping only diagnostics not
/// already recorded.
fn refresh(neuron: &mut Neuron, ctx: &PredefinedContext, report: &mut DiagnosticReport) {
    let (table, mut fresh) = build_symbol_table(neuron, ctx);
    fresh.merge(check_neuron_types(neuron, &table, ctx));
    for diagnostic in fresh.diagnostics {
        if !report.diagnostics.contains(&diagnostic) {
            report.add(diagnostic);
        }
    }
}

fn read_unit(path: &Path) -> Result<CompilationUnit> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("Failed to read file: {}", path.display()))?;
    let mut unit: CompilationUnit = serde_json::from_str(&text)
        .with_context(|| format!("Failed to parse compilation unit: {}", path.display()))?;
    if unit.file_name.is_empty() {
        unit.file_name = path.display().to_string();
    }
    Ok(unit)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::ast::Statement;
    use crate::ir::parse::{parse_block, parse_declarations, parse_equations, parse_input_lines};
    use crate::solver::ReplaySolver;
    use serde_json::json;

    fn alpha_neuron(name: &str) -> Neuron {
        let mut neuron = Neuron::new(name);
        neuron.parameters =
            parse_declarations("tau_m ms = 10 ms\ntau_syn ms = 2 ms\nC_m pF = 250 pF").unwrap();
        neuron.initial_values = parse_declarations("V_m mV = 0 mV").unwrap();
        neuron.equations = Some(
            parse_equations(
                "shape I_shape = pA * e / tau_syn * t * exp(-t / tau_syn)\n\
                 function I_syn pA = curr_sum(I_shape, spikes)\n\
                 V_m' = -V_m / tau_m + I_syn / C_m",
            )
            .unwrap(),
        );
        neuron.input = parse_input_lines("spikes pA <- spike").unwrap();
        neuron.update = Some(
            parse_block("integrate_odes()\nif V_m > 15 mV:\n  V_m = 0 mV\n  emit_spike()\nend")
                .unwrap(),
        );
        neuron
    }

    fn buffer_assigning_neuron() -> Neuron {
        let mut neuron = Neuron::new("broken");
        neuron.input = parse_input_lines("spikes nS <- spike").unwrap();
        neuron.update = Some(parse_block("spikes = 1 nS").unwrap());
        neuron
    }

    fn unit(neurons: Vec<Neuron>) -> CompilationUnit {
        CompilationUnit {
            file_name: "models.nestml".to_string(),
            neurons,
        }
    }

    fn alpha_solver() -> ReplaySolver {
        ReplaySolver::new(json!({
            "solver": "analytical",
            "ode_var_factor": {"__ode_var_factor": "exp(-__h / tau_m)"},
            "const_input": {"__const_input": "0"},
            "propagator": {
                "__P11": "exp(-__h / tau_syn)",
                "__P21": "__h * exp(-__h / tau_syn)",
                "__P22": "exp(-__h / tau_syn)",
                "__P31": "1 / C_m",
                "__P32": "1 / C_m"
            },
            "ode_var_update_instructions": [
                "V_m = __ode_var_factor * V_m + __P31 * I_shape__d + __P32 * I_shape"
            ],
            "shape_state_variables": ["I_shape__d", "I_shape"],
            "shape_initial_values": ["pA * e / tau_syn", "0 pA"],
            "updates_to_shape_state_variables": [
                ["I_shape__d", "__P11 * I_shape__d"],
                ["I_shape", "__P21 * I_shape__d + __P22 * I_shape"]
            ]
        }))
    }

    #[test]
    fn test_buffer_assignment_excludes_neuron() {
        let result = Compiler::new()
            .solver(alpha_solver())
            .compile_units(vec![unit(vec![buffer_assigning_neuron()])]);

        let model = result.model("broken").unwrap();
        assert_eq!(model.status, ModelStatus::Excluded);
        assert_eq!(model.outcome, None);
        let buffer_errors = model
            .diagnostics
            .iter()
            .filter(|d| d.code == DiagnosticCode::BufferAssigned)
            .count();
        assert_eq!(buffer_errors, 1);
        assert!(model
            .diagnostics
            .iter()
            .any(|d| d.code == DiagnosticCode::NeuronContainsErrors));
        assert!(model
            .diagnostics
            .iter()
            .all(|d| d.code != DiagnosticCode::NeuronAnalyzed));
        assert_eq!(result.included().count(), 0);
    }

    #[test]
    fn test_dev_mode_keeps_erroneous_neuron() {
        let result = Compiler::new()
            .dev_mode(true)
            .compile_units(vec![unit(vec![buffer_assigning_neuron()])]);
        let model = result.model("broken").unwrap();
        assert_eq!(model.status, ModelStatus::Included);
        assert_eq!(model.outcome, Some(TransformOutcome::Unchanged));
        assert!(model.has_errors());
    }

    #[test]
    fn test_alpha_neuron_is_discretized() {
        let result = Compiler::new()
            .solver(alpha_solver())
            .compile_units(vec![unit(vec![alpha_neuron("iaf_psc_alpha")])]);

        let model = result.model("iaf_psc_alpha").unwrap();
        assert_eq!(model.status, ModelStatus::Included, "{:?}", model.diagnostics);
        assert_eq!(model.outcome, Some(TransformOutcome::Analytical));
        assert_eq!(model.file_name, "models.nestml");
        assert!(model.neuron.equations.is_none());
        assert!(model.neuron.initial_values.is_empty());
        assert!(model
            .diagnostics
            .iter()
            .all(|d| d.neuron.as_deref() == Some("iaf_psc_alpha")));

        let codes: Vec<DiagnosticCode> = model.diagnostics.iter().map(|d| d.code).collect();
        assert_eq!(codes[0], DiagnosticCode::StartProcessingNeuron);
        assert!(codes.contains(&DiagnosticCode::NeuronAnalyzed));

        let update = model.neuron.update.as_ref().unwrap();
        let increments = update
            .statements
            .iter()
            .filter(|stmt| matches!(stmt, Statement::Assignment(a) if a.rhs.to_string().starts_with("spikes *")))
            .count();
        assert_eq!(increments, 2);
    }

    #[test]
    fn test_missing_solver_fails_only_that_neuron() {
        let mut passive = Neuron::new("passive");
        // each block on its own lines, as in a model file
        passive.parameters = parse_declarations("tau ms = 10 ms").unwrap();
        passive.initial_values = parse_declarations("\nV mV = 0 mV").unwrap();
        passive.equations = Some(parse_equations("\n\n\nV' = -V / tau").unwrap());
        passive.update = Some(parse_block("integrate_odes()").unwrap());

        let result =
            Compiler::new().compile_units(vec![unit(vec![alpha_neuron("alpha"), passive])]);

        let alpha = result.model("alpha").unwrap();
        assert_eq!(alpha.status, ModelStatus::Failed);
        assert!(alpha
            .diagnostics
            .iter()
            .any(|d| d.code == DiagnosticCode::TransformationFailed));

        let passive = result.model("passive").unwrap();
        assert!(!passive.has_errors(), "{:?}", passive.diagnostics);
        assert_eq!(passive.status, ModelStatus::Included);
        assert_eq!(passive.outcome, Some(TransformOutcome::NoShapes));
    }

    #[test]
    fn test_dry_run_and_redeclared_names() {
        let result = Compiler::new().dry_run(true).compile_units(vec![
            unit(vec![alpha_neuron("alpha")]),
            unit(vec![alpha_neuron("alpha")]),
        ]);
        assert_eq!(result.models.len(), 2);
        assert_eq!(result.models[0].status, ModelStatus::Included);
        assert_eq!(result.models[0].outcome, None);
        assert_eq!(result.models[1].status, ModelStatus::Excluded);
        assert_eq!(
            result
                .diagnostics()
                .filter(|d| d.code == DiagnosticCode::NeuronRedeclared)
                .count(),
            1
        );
    }
}
