//! # Template Registry & Graph Analyzer
//!
//! Validates task templates at registration time: unique step names,
//! dependencies that resolve to defined steps, and an acyclic dependency
//! graph. Registration is idempotent for byte-equal re-registration and
//! rejected atomically for a differing template under the same
//! (namespace, name, version) triple.

pub mod graph;
pub mod instantiate;

pub use graph::{analyze, analyze_with_config, GraphReport};
pub use instantiate::{initialize_task, instantiate as instantiate_task, validate_context, TaskInstantiation};

use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::error::{OrchestrationError, OrchestrationResult};
use crate::model::NamedTask;

/// Outcome of a `register` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistrationResult {
    /// A new (namespace, name, version) triple was registered.
    Registered,
    /// The triple already existed with a byte-equal definition; a no-op.
    AlreadyRegistered,
}

/// In-process, thread-safe store of registered task templates, keyed by
/// (namespace, name, version).
#[derive(Debug, Default)]
pub struct TemplateRegistry {
    templates: RwLock<HashMap<(String, String, String), NamedTask>>,
}

impl TemplateRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate and register a template. Fails atomically (nothing is
    /// written) on a duplicate-with-different-definition, an unknown
    /// dependency, or a cycle.
    pub async fn register(&self, template: NamedTask) -> OrchestrationResult<RegistrationResult> {
        validate_step_names_unique(&template)?;
        validate_dependencies_known(&template)?;

        let report = analyze(&template);
        if report.has_cycle() {
            warn!(
                namespace = %template.namespace,
                name = %template.name,
                version = %template.version,
                cycles = ?report.cycles,
                "template registration rejected: cycle detected"
            );
            return Err(OrchestrationError::CycleDetected(report.cycles));
        }

        let key = template.triple();
        let mut templates = self.templates.write().await;
        if let Some(existing) = templates.get(&key) {
            return if *existing == template {
                Ok(RegistrationResult::AlreadyRegistered)
            } else {
                Err(OrchestrationError::DuplicateTemplate {
                    namespace: key.0,
                    name: key.1,
                    version: key.2,
                })
            };
        }

        info!(
            namespace = %template.namespace,
            name = %template.name,
            version = %template.version,
            step_count = template.steps.len(),
            "registered task template"
        );
        templates.insert(key, template);
        Ok(RegistrationResult::Registered)
    }

    pub async fn get(
        &self,
        namespace: &str,
        name: &str,
        version: &str,
    ) -> OrchestrationResult<NamedTask> {
        let key = (namespace.to_string(), name.to_string(), version.to_string());
        self.templates
            .read()
            .await
            .get(&key)
            .cloned()
            .ok_or_else(|| OrchestrationError::TemplateNotFound {
                namespace: namespace.to_string(),
                name: name.to_string(),
                version: version.to_string(),
            })
    }

    pub async fn analyze(
        &self,
        namespace: &str,
        name: &str,
        version: &str,
    ) -> OrchestrationResult<GraphReport> {
        let template = self.get(namespace, name, version).await?;
        Ok(analyze(&template))
    }
}

fn validate_step_names_unique(template: &NamedTask) -> OrchestrationResult<()> {
    let mut seen = std::collections::HashSet::new();
    for step in &template.steps {
        if !seen.insert(step.name.as_str()) {
            return Err(OrchestrationError::ConfigurationError(format!(
                "duplicate step name '{}' in template {}/{}/{}",
                step.name, template.namespace, template.name, template.version
            )));
        }
    }
    Ok(())
}

fn validate_dependencies_known(template: &NamedTask) -> OrchestrationResult<()> {
    let known = template.step_names();
    for step in &template.steps {
        for dep in &step.dependencies {
            if !known.contains(dep.as_str()) {
                return Err(OrchestrationError::UnknownDependency {
                    step: step.name.clone(),
                    missing: dep.clone(),
                });
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::StepTemplate;

    fn template(steps: Vec<StepTemplate>) -> NamedTask {
        NamedTask {
            namespace: "billing".into(),
            name: "charge_card".into(),
            version: "1.0.0".into(),
            context_schema: serde_json::json!({"type": "object"}),
            steps,
        }
    }

    #[tokio::test]
    async fn register_new_template_succeeds() {
        let registry = TemplateRegistry::new();
        let result = registry
            .register(template(vec![StepTemplate::new("a", "A")]))
            .await
            .unwrap();
        assert_eq!(result, RegistrationResult::Registered);
    }

    #[tokio::test]
    async fn registering_byte_equal_template_twice_is_a_no_op() {
        let registry = TemplateRegistry::new();
        let t = template(vec![StepTemplate::new("a", "A")]);
        registry.register(t.clone()).await.unwrap();
        let second = registry.register(t).await.unwrap();
        assert_eq!(second, RegistrationResult::AlreadyRegistered);
    }

    #[tokio::test]
    async fn registering_differing_template_with_same_triple_fails() {
        let registry = TemplateRegistry::new();
        registry
            .register(template(vec![StepTemplate::new("a", "A")]))
            .await
            .unwrap();
        let err = registry
            .register(template(vec![StepTemplate::new("a", "A"), StepTemplate::new("b", "B")]))
            .await
            .unwrap_err();
        assert!(matches!(err, OrchestrationError::DuplicateTemplate { .. }));
    }

    #[tokio::test]
    async fn unknown_dependency_is_rejected() {
        let registry = TemplateRegistry::new();
        let err = registry
            .register(template(vec![StepTemplate::new("b", "B").depends_on("missing")]))
            .await
            .unwrap_err();
        assert!(matches!(err, OrchestrationError::UnknownDependency { .. }));
    }

    #[tokio::test]
    async fn duplicate_step_name_is_rejected() {
        let registry = TemplateRegistry::new();
        let err = registry
            .register(template(vec![StepTemplate::new("a", "A"), StepTemplate::new("a", "A2")]))
            .await
            .unwrap_err();
        assert!(matches!(err, OrchestrationError::ConfigurationError(_)));
    }

    #[tokio::test]
    async fn cycle_is_rejected_atomically() {
        let registry = TemplateRegistry::new();
        let err = registry
            .register(template(vec![
                StepTemplate::new("a", "A").depends_on("b"),
                StepTemplate::new("b", "B").depends_on("a"),
            ]))
            .await
            .unwrap_err();
        assert!(matches!(err, OrchestrationError::CycleDetected(_)));
        // Nothing was written: a subsequent lookup fails.
        assert!(registry.get("billing", "charge_card", "1.0.0").await.is_err());
    }

    #[tokio::test]
    async fn analyze_returns_report_for_registered_template() {
        let registry = TemplateRegistry::new();
        registry
            .register(template(vec![
                StepTemplate::new("a", "A"),
                StepTemplate::new("b", "B").depends_on("a"),
            ]))
            .await
            .unwrap();
        let report = registry.analyze("billing", "charge_card", "1.0.0").await.unwrap();
        assert_eq!(report.topology, vec!["a".to_string(), "b".to_string()]);
    }
}
