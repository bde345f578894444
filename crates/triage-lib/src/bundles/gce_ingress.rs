//! GKE ingress backend health from the GCE controller annotation

use async_trait::async_trait;
use k8s_openapi::api::networking::v1::Ingress;

use super::Bundle;
use crate::classifier::{ClassificationRule, Classifier, DegradedRule, IssueTemplate, Subject};
use crate::collector::{Collector, Invocation};
use crate::config::{require, Settings};
use crate::error::TriageError;
use crate::models::{Issue, ResourceKind, ResourceSample, Severity, SeverityScale};
use crate::normalizer::kubernetes::{ingress_sample, kubectl, ItemList};
use crate::normalizer::metric;

const SCALE: SeverityScale = SeverityScale::OneIsMostSevere;

pub struct GceIngressBundle {
    namespace: String,
    context: Option<String>,
    classifier: Classifier,
}

impl GceIngressBundle {
    pub fn from_settings(settings: &Settings) -> Result<Self, TriageError> {
        let namespace = require(&settings.namespace, "NAMESPACE")?;
        Ok(Self {
            namespace: namespace.to_string(),
            context: settings.context.clone(),
            classifier: Classifier::new(rules(), degraded(), SCALE).with_scope(namespace),
        })
    }

    fn list_invocation(&self) -> Invocation {
        kubectl(&self.namespace, self.context.as_deref()).args(["get", "ingress", "-o", "json"])
    }
}

fn rules() -> Vec<ClassificationRule> {
    vec![
        ClassificationRule::new(
            "unhealthy_backends",
            Subject::metric(metric::UNHEALTHY_BACKENDS).greater_than(0.0),
            Severity::level(2),
            IssueTemplate::new(
                "Unhealthy backends for ingress `{resource}` in namespace `{scope}`",
                "All backend services report HEALTHY",
                "{value} backend service(s) are not healthy",
                "Run `gcloud compute backend-services get-health` for the listed backends and check the readiness probes of the Services behind `{resource}`",
            ),
        )
        .only_for(ResourceKind::Ingress),
        ClassificationRule::new(
            "backend_status_missing",
            Subject::metric(metric::BACKEND_COUNT).missing(),
            Severity::level(3),
            IssueTemplate::new(
                "No backend health reported for ingress `{resource}` in namespace `{scope}`",
                "The GCE ingress controller annotates `{resource}` with backend health",
                "Backend health annotation is absent",
                "Check that `{resource}` uses the GCE ingress class and inspect its events with `kubectl describe ingress`",
            ),
        )
        .only_for(ResourceKind::Ingress),
    ]
}

fn degraded() -> DegradedRule {
    DegradedRule {
        severity: Severity::level(3),
        template: IssueTemplate::new(
            "Cannot read backend health for ingress `{resource}` in namespace `{scope}`",
            "The backends annotation on `{resource}` is valid JSON",
            "Annotation unreadable: {value}",
            "Inspect the annotation with `kubectl describe ingress {resource}` and check the GCE ingress controller logs",
        ),
    }
}

#[async_trait]
impl Bundle for GceIngressBundle {
    fn name(&self) -> &'static str {
        "gce_ingress"
    }

    fn scale(&self) -> SeverityScale {
        SCALE
    }

    fn scope(&self) -> String {
        self.namespace.clone()
    }

    fn reproduce_hint(&self) -> String {
        self.list_invocation().to_string()
    }

    async fn collect(&self, collector: &Collector) -> Result<Vec<ResourceSample>, TriageError> {
        let invocation = self.list_invocation();
        let ingresses: ItemList<Ingress> = collector.list("ingresses", &invocation).await?;
        Ok(ingresses
            .items
            .iter()
            .map(|ingress| ingress_sample(ingress, &self.namespace, &invocation))
            .collect())
    }

    fn classify(&self, samples: &[ResourceSample]) -> Vec<Issue> {
        self.classifier.classify(samples)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::mock::MockRunner;
    use crate::collector::CommandOutput;
    use serde_json::{json, Value};
    use std::sync::Arc;

    fn ingress(name: &str, backends: Option<Value>) -> Value {
        let mut annotations = json!({});
        if let Some(b) = backends {
            annotations["ingress.kubernetes.io/backends"] = Value::String(b.to_string());
        }
        json!({
            "apiVersion": "networking.k8s.io/v1",
            "kind": "Ingress",
            "metadata": { "name": name, "annotations": annotations }
        })
    }

    fn bundle(context: Option<&str>) -> GceIngressBundle {
        let settings = Settings {
            namespace: Some("shop".into()),
            context: context.map(String::from),
            ..Settings::default()
        };
        GceIngressBundle::from_settings(&settings).unwrap()
    }

    #[tokio::test]
    async fn test_unhealthy_and_unannotated_ingresses() {
        let runner = MockRunner::new().on_json(
            "get ingress",
            json!({ "items": [
                ingress("web", Some(json!({ "k8s-be-30001--abc": "HEALTHY", "k8s-be-30002--abc": "UNHEALTHY" }))),
                ingress("api", Some(json!({ "k8s-be-30003--abc": "HEALTHY" }))),
                ingress("legacy", None)
            ]}),
        );
        let collector = Collector::new(Arc::new(runner));
        let bundle = bundle(None);

        let samples = bundle.collect(&collector).await.unwrap();
        assert_eq!(samples.len(), 3);
        let issues = bundle.classify(&samples);

        assert_eq!(issues.len(), 2, "{:?}", issues);
        assert_eq!(issues[0].rule, "unhealthy_backends");
        assert_eq!(issues[0].actual, "1 backend service(s) are not healthy");
        assert_eq!(issues[0].resource_id, "shop/web");
        assert_eq!(issues[1].rule, "backend_status_missing");
        assert_eq!(issues[1].severity, Severity::level(3));
    }

    #[tokio::test]
    async fn test_unreadable_annotation_degrades_ingress() {
        let mut broken = ingress("web", None);
        broken["metadata"]["annotations"]["ingress.kubernetes.io/backends"] = json!("not json");
        let runner = MockRunner::new().on_json("get ingress", json!({ "items": [broken] }));
        let bundle = bundle(None);

        let samples = bundle.collect(&Collector::new(Arc::new(runner))).await.unwrap();
        let issues = bundle.classify(&samples);

        assert_eq!(issues.len(), 1, "{:?}", issues);
        assert_eq!(issues[0].rule, "collection_failed");
        assert_eq!(
            issues[0].title,
            "Cannot read backend health for ingress `web` in namespace `shop`"
        );
        assert!(issues[0].actual.starts_with("Annotation unreadable: ingress.kubernetes.io/backends: invalid JSON"));
    }

    #[tokio::test]
    async fn test_context_flag_is_passed() {
        let runner = Arc::new(MockRunner::new().on_json("get ingress", json!({ "items": [] })));
        let collector = Collector::new(runner.clone());

        let samples = bundle(Some("gke_prod")).collect(&collector).await.unwrap();
        assert!(samples.is_empty());
        assert_eq!(
            runner.calls(),
            vec!["kubectl --context gke_prod -n shop get ingress -o json"]
        );
    }

    #[tokio::test]
    async fn test_list_failure_is_fatal() {
        let runner = MockRunner::new().on(
            "get ingress",
            CommandOutput::failure(1, "error: the server doesn't have a resource type \"ingress\""),
        );
        let err = bundle(None)
            .collect(&Collector::new(Arc::new(runner)))
            .await
            .unwrap_err();
        assert!(matches!(err, TriageError::ListFailed { .. }));
    }

    #[test]
    fn test_namespace_required() {
        let err = GceIngressBundle::from_settings(&Settings::default()).err().unwrap();
        assert!(matches!(err, TriageError::MissingConfig(ref k) if k == "NAMESPACE"));
    }
}
