//! Diagnostic bundles
//!
//! A bundle is one check suite for one resource type: how to collect its
//! samples and which static rules classify them. Every bundle runs through
//! the same pipeline (see [`crate::pipeline`]).

mod activity_log;
mod aks;
mod app_service_plan;
mod devops_agents;
mod gce_ingress;
mod istio;

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;

use crate::collector::Collector;
use crate::config::Settings;
use crate::error::TriageError;
use crate::models::{Issue, ResourceSample, SeverityScale};

pub use activity_log::ActivityLogBundle;
pub use aks::AksBundle;
pub use app_service_plan::AppServicePlanBundle;
pub use devops_agents::DevopsAgentsBundle;
pub use gce_ingress::GceIngressBundle;
pub use istio::IstioBundle;

/// One diagnostic check suite
#[async_trait]
pub trait Bundle: Send + Sync {
    /// Stable name, used as the output file prefix
    fn name(&self) -> &'static str;

    /// Which end of the severity range is most urgent for this bundle
    fn scale(&self) -> SeverityScale;

    /// Human label of what is being checked (resource group, namespace...)
    fn scope(&self) -> String;

    /// Command that lists the bundle's base resources
    fn reproduce_hint(&self) -> String;

    /// Gather samples. Fails only for setup problems and an unreadable
    /// base resource list; per-resource failures become degraded samples.
    async fn collect(&self, collector: &Collector) -> Result<Vec<ResourceSample>, TriageError>;

    /// Deterministic sample -> issue mapping
    fn classify(&self, samples: &[ResourceSample]) -> Vec<Issue>;
}

/// Bundles known to the CLI
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BundleKind {
    AppServicePlan,
    Aks,
    DevopsAgents,
    GceIngress,
    Istio,
    ActivityLog,
}

impl BundleKind {
    pub const ALL: [BundleKind; 6] = [
        BundleKind::AppServicePlan,
        BundleKind::Aks,
        BundleKind::DevopsAgents,
        BundleKind::GceIngress,
        BundleKind::Istio,
        BundleKind::ActivityLog,
    ];

    pub fn name(self) -> &'static str {
        match self {
            BundleKind::AppServicePlan => "app_service_plan",
            BundleKind::Aks => "aks",
            BundleKind::DevopsAgents => "devops_agents",
            BundleKind::GceIngress => "gce_ingress",
            BundleKind::Istio => "istio",
            BundleKind::ActivityLog => "activity_log",
        }
    }

    /// Build the bundle, failing on missing scope configuration before any
    /// CLI is run
    pub fn build(self, settings: &Settings) -> Result<Box<dyn Bundle>, TriageError> {
        Ok(match self {
            BundleKind::AppServicePlan => Box::new(AppServicePlanBundle::from_settings(settings)?),
            BundleKind::Aks => Box::new(AksBundle::from_settings(settings)?),
            BundleKind::DevopsAgents => Box::new(DevopsAgentsBundle::from_settings(settings)?),
            BundleKind::GceIngress => Box::new(GceIngressBundle::from_settings(settings)?),
            BundleKind::Istio => Box::new(IstioBundle::from_settings(settings)?),
            BundleKind::ActivityLog => Box::new(ActivityLogBundle::from_settings(settings)?),
        })
    }
}

impl fmt::Display for BundleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for BundleKind {
    type Err = TriageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().replace('-', "_");
        BundleKind::ALL
            .into_iter()
            .find(|k| k.name() == normalized)
            .ok_or_else(|| TriageError::InvalidConfig(format!("unknown bundle '{}'", s)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bundle_kind_round_trip_names() {
        for kind in BundleKind::ALL {
            assert_eq!(kind.name().parse::<BundleKind>().unwrap(), kind);
        }
        assert_eq!("gce-ingress".parse::<BundleKind>().unwrap(), BundleKind::GceIngress);
        assert!("nope".parse::<BundleKind>().is_err());
    }

    #[test]
    fn test_build_requires_scope() {
        let settings = Settings::default();
        let err = BundleKind::AppServicePlan.build(&settings).err().unwrap();
        assert!(matches!(err, TriageError::MissingConfig(ref key) if key == "AZURE_RESOURCE_GROUP"));

        let err = BundleKind::DevopsAgents.build(&settings).err().unwrap();
        assert!(matches!(err, TriageError::MissingConfig(ref key) if key == "AZURE_DEVOPS_ORG"));
    }
}
