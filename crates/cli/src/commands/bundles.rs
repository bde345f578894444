//! `triage bundles`

use serde::Serialize;
use tabled::Tabled;
use triage_lib::BundleKind;

use crate::output::{print_table, OutputFormat};

/// Row for the bundle list
#[derive(Tabled, Serialize)]
struct BundleRow {
    #[tabled(rename = "Bundle")]
    name: &'static str,
    #[tabled(rename = "Command")]
    command: String,
    #[tabled(rename = "Requires")]
    requires: &'static str,
}

fn required_scope(kind: BundleKind) -> &'static str {
    match kind {
        BundleKind::AppServicePlan | BundleKind::ActivityLog => "AZURE_RESOURCE_GROUP",
        BundleKind::Aks => "AZURE_RESOURCE_GROUP, AKS_CLUSTER",
        BundleKind::DevopsAgents => "AZURE_DEVOPS_ORG",
        BundleKind::GceIngress | BundleKind::Istio => "NAMESPACE",
    }
}

pub fn list_bundles(format: OutputFormat) {
    let rows: Vec<BundleRow> = BundleKind::ALL
        .into_iter()
        .map(|kind| BundleRow {
            name: kind.name(),
            command: format!("triage {}", kind.name().replace('_', "-")),
            requires: required_scope(kind),
        })
        .collect();
    print_table(&rows, format, "No bundles available");
}
