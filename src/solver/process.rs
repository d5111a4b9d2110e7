//! External solver process speaking JSON over stdin/stdout.

use std::io::Write;
use std::process::{Command, Stdio};

use crate::ir::error::IrError;
use crate::solver::{Solver, SolverRequest, SolverResponse};

/// Runs `program args...` once per request: the request is written to its
/// stdin and the response read from its stdout.
#[derive(Debug, Clone)]
pub struct ProcessSolver {
    program: String,
    args: Vec<String>,
}

impl ProcessSolver {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Split a command line such as `python3 -m ode_solver` on whitespace.
    pub fn from_command_line(command: &str) -> Option<Self> {
        let mut parts = command.split_whitespace();
        let program = parts.next()?;
        Some(parts.fold(Self::new(program), |solver, arg| solver.arg(arg)))
    }
}

impl Solver for ProcessSolver {
    fn solve(&self, request: &SolverRequest) -> Result<SolverResponse, IrError> {
        let payload = serde_json::to_vec(request)
            .map_err(|e| IrError::SolverProcess(format!("failed to encode request: {e}")))?;

        log::debug!("running solver '{}' with {:?}", self.program, self.args);
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| IrError::SolverProcess(format!("failed to spawn {}: {e}", self.program)))?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(&payload)
                .map_err(|e| IrError::SolverProcess(format!("failed to write request: {e}")))?;
        }
        let output = child
            .wait_with_output()
            .map_err(|e| IrError::SolverProcess(format!("failed to wait for solver: {e}")))?;

        if !output.status.success() {
            return Err(IrError::SolverProcess(format!(
                "{} exited with {}: {}",
                self.program,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        let text = String::from_utf8_lossy(&output.stdout);
        SolverResponse::from_json(&text)
    }
}
