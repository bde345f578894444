//! Vendor output -> [`ResourceSample`](crate::models::ResourceSample)
//!
//! Each submodule owns the serde shapes of one vendor's CLI output and
//! the functions that fold them into samples. Missing data stays missing:
//! a metric without data points is left out of the sample rather than
//! recorded as zero.

pub mod azure;
pub mod devops;
pub mod istio;
pub mod kubernetes;
pub mod timestamps;
pub mod units;

/// Metric names shared between normalizers and bundle rules
pub mod metric {
    pub const CPU_PERCENT: &str = "cpu_percent";
    pub const CPU_MAX_PERCENT: &str = "cpu_max_percent";
    pub const MEMORY_PERCENT: &str = "memory_percent";
    pub const MEMORY_MAX_PERCENT: &str = "memory_max_percent";
    pub const CAPACITY: &str = "capacity";
    pub const SITE_COUNT: &str = "site_count";
    pub const NODE_COUNT: &str = "node_count";
    pub const MIN_COUNT: &str = "min_count";
    pub const MAX_COUNT: &str = "max_count";
    pub const TOTAL_AGENTS: &str = "total_agents";
    pub const ONLINE_AGENTS: &str = "online_agent_count";
    pub const OFFLINE_AGENTS: &str = "offline_agent_count";
    pub const DISABLED_AGENTS: &str = "disabled_agent_count";
    pub const BUSY_AGENTS: &str = "busy_agent_count";
    pub const UTILIZATION_PERCENT: &str = "utilization_percent";
    pub const LICENSED_USERS: &str = "licensed_users";
    pub const ACTIVE_LICENSED_USERS: &str = "active_licensed_users";
    pub const LICENSE_UTILIZATION_PERCENT: &str = "license_utilization_percent";
    pub const BACKEND_COUNT: &str = "backend_count";
    pub const UNHEALTHY_BACKENDS: &str = "unhealthy_backend_count";
    pub const CPU_MILLICORES: &str = "cpu_millicores";
    pub const MEMORY_MI: &str = "memory_mi";
    pub const RESTART_COUNT: &str = "restart_count";
    pub const CERT_EXPIRY_HOURS: &str = "cert_expiry_hours";
    pub const INVALID_CERTS: &str = "invalid_cert_count";
}
