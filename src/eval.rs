//! The packed evaluator (`spec.md` §4.H): run an [`InferencePlan`] against flat input/output
//! buffers.

use crate::inference::InferencePlan;

/// The activation function this evaluator uses at every non-input node. Note that this is
/// *not* the standard logistic sigmoid `1/(1+exp(-x))`: the steepness constant and the extra
/// `+1` in the denominator are taken from the original trainer this design is descended from,
/// and are preserved verbatim. It ranges over `(0, 0.5)`, not `(0, 1)`.
pub const ACTIVATION_STEEPNESS: f64 = 4.9;

#[inline]
pub fn activate(x: f64) -> f64 {
    1.0 / (2.0 + (-ACTIVATION_STEEPNESS * x).exp())
}

/// Evaluate `plan` against `inputs`, writing each output into `outputs`. Panics if either
/// buffer's length doesn't match the plan's arity (a caller bug, not a degenerate input).
pub fn evaluate(plan: &InferencePlan, inputs: &[f64], outputs: &mut [f64]) {
    assert_eq!(inputs.len(), plan.input_count, "input buffer does not match plan arity");
    assert_eq!(outputs.len(), plan.output_count(), "output buffer does not match plan arity");

    let mut values = vec![0.0; plan.value_count()];
    values[..plan.input_count].copy_from_slice(inputs);

    for (i, node) in plan.nodes.iter().enumerate() {
        let mut sum = 0.0;
        for edge in node.incoming_range() {
            sum += values[plan.edge_from[edge] as usize] * plan.edge_weight[edge];
        }
        values[plan.input_count + i] = activate(sum);
    }

    for (o, &pos) in plan.output_lookup.iter().enumerate() {
        outputs[o] = values[pos as usize];
    }
}
