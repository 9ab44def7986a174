// Handler Registry and Job Registry: name -> implementation tables built
// once at process start and never mutated afterward.

use crate::domain::JobSpec;
use crate::port::TaskHandler;
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Default)]
pub struct HandlerRegistry {
    handlers: HashMap<String, Arc<dyn TaskHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, task_type: impl Into<String>, handler: Arc<dyn TaskHandler>) {
        self.handlers.insert(task_type.into(), handler);
    }

    pub fn get(&self, task_type: &str) -> Option<Arc<dyn TaskHandler>> {
        self.handlers.get(task_type).cloned()
    }
}

#[derive(Default)]
pub struct JobRegistry {
    specs: HashMap<String, Arc<dyn JobSpec>>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, spec: Arc<dyn JobSpec>) {
        self.specs.insert(spec.job_type().to_string(), spec);
    }

    pub fn get(&self, job_type: &str) -> Option<Arc<dyn JobSpec>> {
        self.specs.get(job_type).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{StageDef, TaskSpec};
    use serde_json::Value;

    struct EchoSpec;
    impl JobSpec for EchoSpec {
        fn job_type(&self) -> &str {
            "ECHO"
        }
        fn stages(&self) -> &[StageDef] {
            static STAGES: &[StageDef] = &[];
            STAGES
        }
        fn create_tasks(&self, _stage: i64, _p: &Value, _job_id: &str, _prior: &[Value]) -> Vec<TaskSpec> {
            vec![]
        }
    }

    #[test]
    fn registers_and_looks_up_by_job_type() {
        let mut registry = JobRegistry::new();
        registry.register(Arc::new(EchoSpec));
        assert!(registry.get("ECHO").is_some());
        assert!(registry.get("MISSING").is_none());
    }
}
