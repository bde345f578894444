//! Azure CLI prerequisites: extensions, auth, resource providers

use tracing::info;

use super::{poll_until, Collected, Collector, Invocation, PollPolicy};
use crate::config::AuthMode;
use crate::error::TriageError;

/// Fail the run when an `az` extension is not installed
pub async fn require_az_extension(collector: &Collector, name: &str) -> Result<(), TriageError> {
    let invocation = Invocation::new("az")
        .args(["extension", "show", "--name", name, "-o", "json"]);

    match collector.fetch::<serde_json::Value>(&invocation).await? {
        Collected::Payload(_) => Ok(()),
        Collected::Failed { .. } => Err(TriageError::MissingPrerequisite(format!(
            "Azure CLI extension '{}' is not installed; run `az extension add --name {}`",
            name, name
        ))),
    }
}

/// Check that the selected auth mode is usable before any collection
pub async fn verify_auth(
    collector: &Collector,
    mode: AuthMode,
    pat_present: bool,
) -> Result<(), TriageError> {
    match mode {
        AuthMode::Pat => {
            if pat_present {
                Ok(())
            } else {
                Err(TriageError::MissingConfig(
                    "AZURE_DEVOPS_EXT_PAT (required when AUTH_TYPE=pat)".to_string(),
                ))
            }
        }
        AuthMode::ServicePrincipal => {
            let invocation = Invocation::new("az").args(["account", "show", "-o", "json"]);
            match collector.fetch::<serde_json::Value>(&invocation).await? {
                Collected::Payload(_) => Ok(()),
                Collected::Failed { stderr } => Err(TriageError::Authentication(stderr)),
            }
        }
    }
}

/// Register a resource provider if needed and wait until Azure reports it
/// as `Registered`
pub async fn ensure_provider_registered(
    collector: &Collector,
    namespace: &str,
    policy: PollPolicy,
) -> Result<(), TriageError> {
    let show = Invocation::new("az").args([
        "provider",
        "show",
        "--namespace",
        namespace,
        "--query",
        "registrationState",
        "-o",
        "tsv",
    ]);

    if registration_state(collector, &show).await? == "Registered" {
        return Ok(());
    }

    info!(provider = %namespace, "Registering resource provider");
    let register = Invocation::new("az").args(["provider", "register", "--namespace", namespace]);
    collector.text(&register).await.map_err(|e| {
        TriageError::MissingPrerequisite(format!(
            "could not register provider {}: {}",
            namespace,
            e.stderr()
        ))
    })?;

    let what = format!("resource provider {} registration", namespace);
    poll_until(policy, &what, |_| {
        let show = &show;
        async move { Ok(registration_state(collector, show).await? == "Registered") }
    })
    .await?;

    info!(provider = %namespace, "Resource provider registered");
    Ok(())
}

async fn registration_state(collector: &Collector, show: &Invocation) -> Result<String, TriageError> {
    match collector.fetch_text(show).await? {
        Collected::Payload(state) => Ok(state.trim().to_string()),
        Collected::Failed { .. } => Ok(String::new()),
    }
}
