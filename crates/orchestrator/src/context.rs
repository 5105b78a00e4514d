//! Execution context passed to step actions.

use std::collections::HashMap;

use common::SagaId;
use serde_json::Value;

/// Read view handed to a step action when it runs.
///
/// Carries the saga's original input plus the outputs of every forward step
/// that has completed so far, keyed by step name. Compensations see the same
/// context, which is how a refund finds the charge id its forward step
/// produced.
#[derive(Debug, Clone)]
pub struct SagaContext {
    saga_id: SagaId,
    input: Value,
    step_outputs: HashMap<String, Value>,
}

impl SagaContext {
    pub fn new(saga_id: SagaId, input: Value) -> Self {
        Self {
            saga_id,
            input,
            step_outputs: HashMap::new(),
        }
    }

    pub fn saga_id(&self) -> SagaId {
        self.saga_id
    }

    /// The payload the saga was started with.
    pub fn input(&self) -> &Value {
        &self.input
    }

    /// Output recorded by a previously completed forward step.
    pub fn step_output(&self, step_name: &str) -> Option<&Value> {
        self.step_outputs.get(step_name)
    }

    pub fn step_outputs(&self) -> &HashMap<String, Value> {
        &self.step_outputs
    }

    /// Records a forward step's output so later steps can read it.
    pub fn record_output(&mut self, step_name: impl Into<String>, output: Value) {
        self.step_outputs.insert(step_name.into(), output);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_context_exposes_input() {
        let saga_id = SagaId::new();
        let ctx = SagaContext::new(saga_id, json!({"order_id": "ORD-001"}));

        assert_eq!(ctx.saga_id(), saga_id);
        assert_eq!(ctx.input()["order_id"], "ORD-001");
        assert!(ctx.step_output("reserve-inventory").is_none());
    }

    #[test]
    fn test_recorded_outputs_visible_by_step_name() {
        let mut ctx = SagaContext::new(SagaId::new(), Value::Null);
        ctx.record_output("charge-payment", json!({"charge_id": "PAY-0001"}));

        let output = ctx.step_output("charge-payment").unwrap();
        assert_eq!(output["charge_id"], "PAY-0001");
        assert_eq!(ctx.step_outputs().len(), 1);
    }
}
