use tracing::debug;

use super::builtin;
use super::definition::WorkflowDefinition;
use crate::errors::{IssueOpsError, Result};

/// Catalog of workflow definitions keyed by workflow type.
///
/// Built once at startup, then only read.
#[derive(Debug, Clone, Default)]
pub struct WorkflowRegistry {
    definitions: Vec<WorkflowDefinition>,
}

impl WorkflowRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding the definitions shipped with the crate.
    pub fn with_builtin_definitions() -> Result<Self> {
        let mut registry = Self::new();
        registry.register(builtin::deprecation_workflow())?;
        Ok(registry)
    }

    /// Validate and add `definition`. Types must be unique.
    pub fn register(&mut self, definition: WorkflowDefinition) -> Result<()> {
        definition.validate()?;
        if self.get(&definition.workflow_type).is_some() {
            return Err(IssueOpsError::configuration(format!(
                "workflow type '{}' is already registered",
                definition.workflow_type
            )));
        }
        debug!(workflow_type = %definition.workflow_type, stages = definition.stages.len(), "Registered workflow");
        self.definitions.push(definition);
        Ok(())
    }

    pub fn get(&self, workflow_type: &str) -> Option<&WorkflowDefinition> {
        self.definitions
            .iter()
            .find(|definition| definition.workflow_type == workflow_type)
    }

    pub fn require(&self, workflow_type: &str) -> Result<&WorkflowDefinition> {
        self.get(workflow_type).ok_or_else(|| {
            IssueOpsError::configuration(format!("unknown workflow type '{workflow_type}'"))
                .with_context("known_types", self.workflow_types().join(", "))
        })
    }

    pub fn workflow_types(&self) -> Vec<&str> {
        self.definitions
            .iter()
            .map(|definition| definition.workflow_type.as_str())
            .collect()
    }

    /// Workflow type an issue belongs to, judged from its labels first and
    /// then from body markers. Registration order breaks ties.
    pub fn detect_workflow_type(&self, labels: &[String], body: &str) -> Option<&str> {
        let by_label = self.definitions.iter().find(|definition| {
            definition.trigger_labels.iter().any(|trigger| {
                labels
                    .iter()
                    .any(|label| label.eq_ignore_ascii_case(trigger))
            })
        });
        let by_marker = || {
            self.definitions.iter().find(|definition| {
                definition
                    .body_markers
                    .iter()
                    .any(|marker| !marker.is_empty() && body.contains(marker.as_str()))
            })
        };

        by_label
            .or_else(by_marker)
            .map(|definition| definition.workflow_type.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::definition::Stage;

    fn simple(workflow_type: &str) -> WorkflowDefinition {
        WorkflowDefinition::new(workflow_type, workflow_type, "")
            .with_stage(Stage::new("only", ""))
    }

    #[test]
    fn test_builtin_registry_has_deprecation() {
        let registry = WorkflowRegistry::with_builtin_definitions().unwrap();
        assert!(registry.get("deprecation").is_some());
        assert!(registry.require("migration").is_err());
    }

    #[test]
    fn test_duplicate_registration_fails() {
        let mut registry = WorkflowRegistry::new();
        registry.register(simple("a")).unwrap();
        assert!(registry.register(simple("a")).is_err());
    }

    #[test]
    fn test_invalid_definition_is_not_registered() {
        let mut registry = WorkflowRegistry::new();
        let err = registry
            .register(WorkflowDefinition::new("empty", "Empty", ""))
            .unwrap_err();
        assert!(matches!(err, IssueOpsError::Configuration { .. }));
        assert!(registry.workflow_types().is_empty());
    }

    #[test]
    fn test_detect_by_label_then_marker() {
        let mut registry = WorkflowRegistry::new();
        registry
            .register(simple("deprecation").with_trigger_label("deprecation"))
            .unwrap();
        registry
            .register(simple("migration").with_body_marker("### Migration Target"))
            .unwrap();

        assert_eq!(
            registry.detect_workflow_type(&["Deprecation".to_string()], ""),
            Some("deprecation")
        );
        assert_eq!(
            registry.detect_workflow_type(&[], "### Migration Target\n\nnew_db"),
            Some("migration")
        );
        assert_eq!(registry.detect_workflow_type(&["bug".to_string()], "hello"), None);
    }
}
