//! Settings for a CLI run: environment/config file, then command-line flags

use anyhow::{Context, Result};
use triage_lib::{BundleKind, Settings};

use crate::{Cli, Commands};

impl Commands {
    /// Bundle selected by the subcommand; `None` for informational commands
    pub fn bundle_kind(&self) -> Option<BundleKind> {
        match self {
            Commands::AppServicePlan(_) => Some(BundleKind::AppServicePlan),
            Commands::Aks { .. } => Some(BundleKind::Aks),
            Commands::DevopsAgents { .. } => Some(BundleKind::DevopsAgents),
            Commands::GceIngress(_) => Some(BundleKind::GceIngress),
            Commands::Istio { .. } => Some(BundleKind::Istio),
            Commands::ActivityLog(_) => Some(BundleKind::ActivityLog),
            Commands::Bundles => None,
        }
    }
}

/// Load settings and apply the subcommand's scope flags on top
pub fn load_settings(cli: &Cli) -> Result<Settings> {
    let mut settings = Settings::load().context("Failed to load configuration")?;
    apply_overrides(&mut settings, &cli.command);
    Ok(settings)
}

fn set(target: &mut Option<String>, value: &Option<String>) {
    if let Some(v) = value {
        *target = Some(v.clone());
    }
}

pub fn apply_overrides(settings: &mut Settings, command: &Commands) {
    match command {
        Commands::AppServicePlan(azure) | Commands::ActivityLog(azure) => {
            set(&mut settings.azure_resource_group, &azure.resource_group);
            set(&mut settings.azure_subscription_id, &azure.subscription);
        }
        Commands::Aks { azure, cluster } => {
            set(&mut settings.azure_resource_group, &azure.resource_group);
            set(&mut settings.azure_subscription_id, &azure.subscription);
            set(&mut settings.aks_cluster, cluster);
        }
        Commands::DevopsAgents { org } => set(&mut settings.azure_devops_org, org),
        Commands::GceIngress(kube) => {
            set(&mut settings.namespace, &kube.namespace);
            set(&mut settings.context, &kube.context);
        }
        Commands::Istio {
            kube,
            istio_namespace,
        } => {
            set(&mut settings.namespace, &kube.namespace);
            set(&mut settings.context, &kube.context);
            if let Some(ns) = istio_namespace {
                settings.istio_namespace = ns.clone();
            }
        }
        Commands::Bundles => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{AzureScope, KubeScope};

    #[test]
    fn test_flags_override_settings() {
        let mut settings = Settings {
            azure_resource_group: Some("from-env".into()),
            ..Settings::default()
        };
        let command = Commands::Aks {
            azure: AzureScope {
                resource_group: Some("from-flag".into()),
                subscription: None,
            },
            cluster: Some("prod".into()),
        };

        apply_overrides(&mut settings, &command);
        assert_eq!(settings.azure_resource_group.as_deref(), Some("from-flag"));
        assert_eq!(settings.aks_cluster.as_deref(), Some("prod"));
        assert_eq!(settings.azure_subscription_id, None);
    }

    #[test]
    fn test_absent_flags_keep_settings() {
        let mut settings = Settings {
            namespace: Some("shop".into()),
            ..Settings::default()
        };
        let command = Commands::Istio {
            kube: KubeScope::default(),
            istio_namespace: Some("mesh-system".into()),
        };

        apply_overrides(&mut settings, &command);
        assert_eq!(settings.namespace.as_deref(), Some("shop"));
        assert_eq!(settings.istio_namespace, "mesh-system");
        assert_eq!(command.bundle_kind(), Some(BundleKind::Istio));
    }
}
