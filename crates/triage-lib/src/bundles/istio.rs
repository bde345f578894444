//! Istio control plane and sidecar checks
//!
//! Control-plane pods are read from the Istio namespace; every workload pod
//! carrying an `istio-proxy` container in the target namespace yields one
//! proxy sample combining `kubectl top`, container limits, mTLS certificate
//! state from `istioctl` and recent sidecar logs.

use async_trait::async_trait;
use chrono::Utc;
use k8s_openapi::api::core::v1::Pod;
use tracing::debug;

use super::Bundle;
use crate::classifier::{
    load_patterns, ClassificationRule, Classifier, DegradedRule, IssueTemplate, Subject,
};
use crate::collector::{Collected, Collector, Invocation};
use crate::config::{require, Settings};
use crate::error::TriageError;
use crate::models::{Issue, ResourceKind, ResourceSample, Severity, SeverityScale};
use crate::normalizer::istio::{parse_secret_table, proxy_sample, ProxyObservation, PROXY_CONTAINER};
use crate::normalizer::kubernetes::{
    component_sample, container_limits, has_container, kubectl, parse_top_containers, pod_name,
    ItemList, TopRow,
};
use crate::normalizer::metric;
use crate::normalizer::timestamps::parse_window;

const SCALE: SeverityScale = SeverityScale::OneIsMostSevere;

/// Control-plane deployment that must always be present
const ISTIOD: &str = "istiod";

pub struct IstioBundle {
    namespace: String,
    istio_namespace: String,
    context: Option<String>,
    log_window: String,
    classifier: Classifier,
}

impl IstioBundle {
    pub fn from_settings(settings: &Settings) -> Result<Self, TriageError> {
        let namespace = require(&settings.namespace, "NAMESPACE")?;
        if parse_window(&settings.log_window).is_none() {
            return Err(TriageError::InvalidConfig(format!(
                "LOG_WINDOW must look like 30m, 1h or 2d, got '{}'",
                settings.log_window
            )));
        }
        let patterns = load_patterns(settings.istio_error_patterns_file.as_deref())?;
        let classifier = Classifier::new(rules(settings), degraded(), SCALE)
            .with_scope(namespace)
            .with_patterns(patterns);

        Ok(Self {
            namespace: namespace.to_string(),
            istio_namespace: settings.istio_namespace.clone(),
            context: settings.context.clone(),
            log_window: settings.log_window.clone(),
            classifier,
        })
    }

    fn kubectl(&self, namespace: &str) -> Invocation {
        kubectl(namespace, self.context.as_deref())
    }

    fn control_plane_invocation(&self) -> Invocation {
        self.kubectl(&self.istio_namespace).args(["get", "pods", "-o", "json"])
    }

    fn workload_invocation(&self) -> Invocation {
        self.kubectl(&self.namespace).args(["get", "pods", "-o", "json"])
    }

    fn top_invocation(&self) -> Invocation {
        self.kubectl(&self.namespace)
            .args(["top", "pod", "--containers", "--no-headers"])
    }

    fn secret_invocation(&self, pod: &str) -> Invocation {
        Invocation::new("istioctl")
            .args(["proxy-config", "secret", pod, "-n", &self.namespace])
            .opt_flag("--context", self.context.as_deref())
    }

    fn logs_invocation(&self, pod: &str) -> Invocation {
        self.kubectl(&self.namespace)
            .args(["logs", pod, "-c", PROXY_CONTAINER])
            .arg(format!("--since={}", self.log_window))
    }

    async fn control_plane(&self, collector: &Collector) -> Result<Vec<ResourceSample>, TriageError> {
        let invocation = self.control_plane_invocation();
        let pods = match collector.fetch::<ItemList<Pod>>(&invocation).await? {
            Collected::Payload(list) => list.items,
            Collected::Failed { stderr } => {
                let id = format!("{}/control-plane", self.istio_namespace);
                return Ok(vec![ResourceSample::new(id, "control plane", ResourceKind::IstioComponent)
                    .with_source_command(invocation.to_string())
                    .with_collection_error(stderr)]);
            }
        };

        let mut samples: Vec<ResourceSample> = pods
            .iter()
            .map(|pod| component_sample(pod, &self.istio_namespace, &invocation))
            .collect();

        if !samples.iter().any(|s| s.attribute("app") == Some(ISTIOD)) {
            samples.push(
                ResourceSample::new(
                    format!("{}/{}", self.istio_namespace, ISTIOD),
                    ISTIOD,
                    ResourceKind::IstioComponent,
                )
                .with_source_command(invocation.to_string())
                .with_status("Missing"),
            );
        }
        Ok(samples)
    }

    async fn proxies(&self, collector: &Collector) -> Result<Vec<ResourceSample>, TriageError> {
        let pods: ItemList<Pod> = collector
            .list("workload pods", &self.workload_invocation())
            .await?;
        let meshed: Vec<&Pod> = pods
            .items
            .iter()
            .filter(|pod| has_container(pod, PROXY_CONTAINER))
            .collect();
        debug!(namespace = %self.namespace, pods = meshed.len(), "Found sidecar-injected pods");
        if meshed.is_empty() {
            return Ok(Vec::new());
        }

        let (usage, top_error): (Vec<TopRow>, Option<String>) =
            match collector.fetch_text(&self.top_invocation()).await? {
                Collected::Payload(text) => (parse_top_containers(&text), None),
                Collected::Failed { stderr } => (Vec::new(), Some(stderr)),
            };

        let now = Utc::now();
        let mut samples = Vec::with_capacity(meshed.len());
        for pod in meshed {
            let name = pod_name(pod);

            let secret = self.secret_invocation(name);
            let secrets = match collector.fetch_text(&secret).await? {
                Collected::Payload(text) => Collected::Payload(parse_secret_table(&text)),
                Collected::Failed { stderr } => Collected::Failed { stderr },
            };

            let logs = self.logs_invocation(name);
            let (log_lines, log_error) = match collector.fetch_text(&logs).await? {
                Collected::Payload(text) => (text.lines().map(String::from).collect(), None),
                Collected::Failed { stderr } => (Vec::new(), Some(stderr)),
            };

            let observation = ProxyObservation {
                namespace: self.namespace.clone(),
                pod: name.to_string(),
                usage: usage
                    .iter()
                    .find(|row| row.pod == name && row.container == PROXY_CONTAINER)
                    .cloned(),
                limits: container_limits(pod, PROXY_CONTAINER),
                secrets,
                log_lines,
            };
            let mut sample = proxy_sample(observation, now, &logs.to_string());
            if let Some(error) = &top_error {
                sample = sample.with_failed_query("kubectl top", error);
            }
            if let Some(error) = &log_error {
                sample = sample.with_failed_query("kubectl logs", error);
            }
            samples.push(sample);
        }
        Ok(samples)
    }
}

fn rules(settings: &Settings) -> Vec<ClassificationRule> {
    vec![
        ClassificationRule::new(
            "control_plane_not_running",
            Subject::Status.is_not("Running"),
            Severity::level(1),
            IssueTemplate::new(
                "Istio control plane pod `{resource}` is not running",
                "Pod phase is Running",
                "Pod phase is {value}",
                "Run `kubectl describe pod {resource}` in the Istio namespace and check istiod logs",
            ),
        )
        .only_for(ResourceKind::IstioComponent),
        ClassificationRule::new(
            "control_plane_restarts",
            Subject::metric(metric::RESTART_COUNT).greater_than(settings.restart_threshold),
            Severity::level(3),
            IssueTemplate::new(
                "Istio control plane pod `{resource}` is restarting",
                "At most {threshold} container restarts",
                "{value} container restarts",
                "Check previous container logs with `kubectl logs --previous` for OOM kills or crashes",
            ),
        )
        .only_for(ResourceKind::IstioComponent),
        ClassificationRule::new(
            "proxy_high_cpu",
            Subject::metric(metric::CPU_PERCENT).greater_than(settings.cpu_threshold),
            Severity::level(2),
            IssueTemplate::new(
                "High istio-proxy CPU usage in pod `{resource}`",
                "Sidecar CPU below {threshold}% of its limit",
                "Sidecar CPU at {value}% of its limit",
                "Raise the sidecar CPU limit with the `sidecar.istio.io/proxyCPULimit` annotation or reduce traffic to `{resource}`",
            ),
        )
        .only_for(ResourceKind::IstioProxy),
        ClassificationRule::new(
            "proxy_high_memory",
            Subject::metric(metric::MEMORY_PERCENT).greater_than(settings.memory_threshold),
            Severity::level(2),
            IssueTemplate::new(
                "High istio-proxy memory usage in pod `{resource}`",
                "Sidecar memory below {threshold}% of its limit",
                "Sidecar memory at {value}% of its limit",
                "Limit the sidecar's config scope with a Sidecar resource or raise `sidecar.istio.io/proxyMemoryLimit`",
            ),
        )
        .only_for(ResourceKind::IstioProxy),
        ClassificationRule::new(
            "certificate_expired",
            Subject::metric(metric::CERT_EXPIRY_HOURS).less_than(0.0),
            Severity::level(1),
            IssueTemplate::new(
                "Expired mTLS certificate in pod `{resource}`",
                "Workload certificate is valid",
                "Certificate expired {value} hours from now",
                "Restart `{resource}` to request a new certificate and check istiod CA health",
            ),
        )
        .only_for(ResourceKind::IstioProxy),
        ClassificationRule::new(
            "certificate_expiring",
            Subject::metric(metric::CERT_EXPIRY_HOURS).less_than(settings.cert_expiry_hours),
            Severity::level(2),
            IssueTemplate::new(
                "mTLS certificate expiring soon in pod `{resource}`",
                "Certificate valid for more than {threshold} hours",
                "Certificate expires in {value} hours",
                "Check that istiod is rotating workload certificates; inspect with `istioctl proxy-config secret {resource}`",
            ),
        )
        .and(Subject::metric(metric::CERT_EXPIRY_HOURS).greater_than(0.0))
        .only_for(ResourceKind::IstioProxy),
        ClassificationRule::new(
            "invalid_certificates",
            Subject::metric(metric::INVALID_CERTS).greater_than(0.0),
            Severity::level(2),
            IssueTemplate::new(
                "Invalid mTLS certificates in pod `{resource}`",
                "All certificates in the proxy are valid",
                "{value} certificate(s) are not valid",
                "Inspect with `istioctl proxy-config secret {resource}` and compare root certificates with istiod",
            ),
        )
        .only_for(ResourceKind::IstioProxy),
    ]
}

fn degraded() -> DegradedRule {
    DegradedRule {
        severity: Severity::level(3),
        template: IssueTemplate::new(
            "Cannot inspect Istio `{resource}`",
            "`{resource}` is readable",
            "Query failed: {value}",
            "Check kubectl access to the Istio namespace and that `istioctl` matches the mesh version",
        ),
    }
}

#[async_trait]
impl Bundle for IstioBundle {
    fn name(&self) -> &'static str {
        "istio"
    }

    fn scale(&self) -> SeverityScale {
        SCALE
    }

    fn scope(&self) -> String {
        self.namespace.clone()
    }

    fn reproduce_hint(&self) -> String {
        self.workload_invocation().to_string()
    }

    async fn collect(&self, collector: &Collector) -> Result<Vec<ResourceSample>, TriageError> {
        let mut samples = self.control_plane(collector).await?;
        samples.extend(self.proxies(collector).await?);
        Ok(samples)
    }

    fn classify(&self, samples: &[ResourceSample]) -> Vec<Issue> {
        self.classifier.classify(samples)
    }
}
