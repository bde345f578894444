//! Azure DevOps CLI output shapes (`az pipelines`, `az devops user`)

use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;

use super::metric;
use super::units::percent_of;
use crate::collector::{Collected, Invocation};
use crate::models::{ResourceKind, ResourceSample};

/// One element of `az pipelines pool list`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentPoolInfo {
    pub id: u64,
    pub name: String,
    #[serde(default)]
    pub is_hosted: Option<bool>,
    #[serde(default)]
    pub pool_type: Option<String>,
}

/// One element of `az pipelines agent list`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Agent {
    pub name: String,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub enabled: Option<bool>,
    #[serde(default)]
    pub assigned_request: Option<serde_json::Value>,
}

impl Agent {
    fn is_online(&self) -> bool {
        self.status
            .as_deref()
            .map(|s| s.eq_ignore_ascii_case("online"))
            .unwrap_or(false)
    }

    fn is_busy(&self) -> bool {
        self.assigned_request
            .as_ref()
            .map(|r| !r.is_null())
            .unwrap_or(false)
    }
}

/// Agent counts and utilization for one pool
pub fn agent_pool_sample(
    org: &str,
    pool: &AgentPoolInfo,
    agents: Collected<Vec<Agent>>,
    command: &Invocation,
) -> ResourceSample {
    let mut sample = ResourceSample::new(
        format!("{}/_settings/agentpools?poolId={}", org.trim_end_matches('/'), pool.id),
        &pool.name,
        ResourceKind::AgentPool,
    )
    .with_source_command(command.to_string())
    .with_attribute("pool_id", pool.id.to_string());

    if pool.is_hosted.unwrap_or(false) {
        sample = sample.with_attribute("hosted", "true");
    }

    let agents = match agents {
        Collected::Payload(agents) => agents,
        Collected::Failed { stderr } => return sample.with_collection_error(stderr),
    };

    let total = agents.len() as f64;
    let online = agents.iter().filter(|a| a.is_online()).count() as f64;
    let disabled = agents.iter().filter(|a| a.enabled == Some(false)).count() as f64;
    let busy = agents.iter().filter(|a| a.is_online() && a.is_busy()).count() as f64;

    sample
        .with_metric(metric::TOTAL_AGENTS, total)
        .with_metric(metric::ONLINE_AGENTS, online)
        .with_metric(metric::OFFLINE_AGENTS, total - online)
        .with_metric(metric::DISABLED_AGENTS, disabled)
        .with_metric(metric::BUSY_AGENTS, busy)
        .with_optional_metric(metric::UTILIZATION_PERCENT, percent_of(busy, online))
}

/// `az devops user list` response
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserList {
    #[serde(default)]
    pub members: Vec<UserEntitlement>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserEntitlement {
    #[serde(default)]
    pub access_level: Option<AccessLevel>,
    #[serde(default)]
    pub last_accessed_date: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessLevel {
    #[serde(default)]
    pub account_license_type: Option<String>,
}

impl UserEntitlement {
    /// Paid license (anything other than stakeholder / none)
    fn is_licensed(&self) -> bool {
        match self
            .access_level
            .as_ref()
            .and_then(|a| a.account_license_type.as_deref())
        {
            Some(kind) => !matches!(kind.to_ascii_lowercase().as_str(), "stakeholder" | "none"),
            None => false,
        }
    }

    fn accessed_since(&self, cutoff: DateTime<Utc>) -> bool {
        self.last_accessed_date
            .as_deref()
            .and_then(|d| DateTime::parse_from_rfc3339(d).ok())
            .map(|d| d.with_timezone(&Utc) >= cutoff)
            .unwrap_or(false)
    }
}

/// Organization-level license utilization: licensed users seen within the
/// lookback window as a percentage of all licensed users
pub fn license_sample(
    org: &str,
    users: Collected<UserList>,
    lookback: Duration,
    now: DateTime<Utc>,
    command: &Invocation,
) -> ResourceSample {
    let sample = ResourceSample::new(org, org, ResourceKind::Organization)
        .with_source_command(command.to_string());

    let users = match users {
        Collected::Payload(users) => users,
        Collected::Failed { stderr } => return sample.with_collection_error(stderr),
    };

    let cutoff = now - lookback;
    let licensed: Vec<&UserEntitlement> = users.members.iter().filter(|u| u.is_licensed()).collect();
    let active = licensed.iter().filter(|u| u.accessed_since(cutoff)).count() as f64;
    let total = licensed.len() as f64;

    sample
        .with_metric(metric::LICENSED_USERS, total)
        .with_metric(metric::ACTIVE_LICENSED_USERS, active)
        .with_optional_metric(metric::LICENSE_UTILIZATION_PERCENT, percent_of(active, total))
}
