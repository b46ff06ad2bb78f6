use serde::Serialize;
use serde_json::Value;

use neubot_core::domain::query::ThoughtStep;

/// Ordered, append-only log of the decisions taken for one query.
#[derive(Debug, Default)]
pub struct TraceRecorder {
    steps: Vec<ThoughtStep>,
}

impl TraceRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record<T: Serialize>(&mut self, description: impl Into<String>, result: T) {
        let result = serde_json::to_value(result)
            .unwrap_or_else(|error| Value::String(format!("<unserializable: {error}>")));
        self.steps.push(ThoughtStep { description: description.into(), result });
    }

    pub fn note(&mut self, description: impl Into<String>) {
        self.steps.push(ThoughtStep { description: description.into(), result: Value::Null });
    }

    pub fn into_steps(self) -> Vec<ThoughtStep> {
        self.steps
    }
}
