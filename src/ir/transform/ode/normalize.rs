//! Convolution normalization.

use indexmap::IndexMap;

use crate::ir::analysis::predefined::{is_convolution_function, FN_CONVOLVE};
use crate::ir::ast::{EquationsBlock, FunctionCall};
use crate::ir::visitor::{MutVisitable, MutVisitor};

/// Shape name to the spike buffer it is convolved with, in order of first
/// appearance.
pub type ShapeBuffers = IndexMap<String, String>;

/// Record every `convolve`/`cond_sum`/`curr_sum` pairing in `equations` and
/// rewrite the calls to the canonical `convolve(shape, buffer)`.
///
/// Calls whose arguments are not plain variables are left alone; they
/// were reported by the convolution check.
pub fn normalize_convolutions(equations: &mut EquationsBlock) -> ShapeBuffers {
    let mut collector = Convolutions::default();
    equations.accept_mut(&mut collector);
    collector.pairs
}

#[derive(Default)]
struct Convolutions {
    pairs: ShapeBuffers,
}

impl MutVisitor for Convolutions {
    fn enter_function_call(&mut self, node: &mut FunctionCall) {
        if !is_convolution_function(&node.name) {
            return;
        }
        let [shape, buffer] = node.args.as_slice() else {
            return;
        };
        let (Some(shape), Some(buffer)) = (shape.as_variable(), buffer.as_variable()) else {
            return;
        };
        let shape = shape.complete_name();
        if let Some(previous) = self.pairs.get(&shape) {
            if *previous != buffer.name {
                log::warn!(
                    "shape '{}' is convolved with both '{}' and '{}', spikes of '{}' are applied",
                    shape,
                    previous,
                    buffer.name,
                    previous
                );
            }
        } else {
            self.pairs.insert(shape, buffer.name.clone());
        }
        node.name = FN_CONVOLVE.to_string();
    }
}
