use anyhow::{Result, bail};
use envios_types::{DeliveryState, LifecycleEvent, Role};
use serde::{Deserialize, Serialize};

use crate::table::TRANSITIONS;

/// Default evidence size limit: 5 MiB.
pub const DEFAULT_MAX_EVIDENCE_BYTES: usize = 5 * 1024 * 1024;

/// Permission for one role to fire some events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Grant {
    pub role: Role,
    pub events: Vec<LifecycleEvent>,
    /// Restrict the grant to these source states; empty means any.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub from: Vec<DeliveryState>,
}

impl Grant {
    pub fn new(role: Role, events: &[LifecycleEvent]) -> Self {
        Self {
            role,
            events: events.to_vec(),
            from: Vec::new(),
        }
    }

    fn allows(&self, role: Role, from: DeliveryState, event: LifecycleEvent) -> bool {
        self.role == role
            && self.events.contains(&event)
            && (self.from.is_empty() || self.from.contains(&from))
    }
}

/// Role permissions and tunable rules of the lifecycle.
///
/// Deserializable so that it can be set from the `[policy]` section of the
/// config file. Omitted keys keep their defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LifecyclePolicy {
    pub grants: Vec<Grant>,
    pub create_roles: Vec<Role>,
    pub delete_roles: Vec<Role>,
    /// Require a reason text on failed deliveries
    pub require_failure_reason: bool,
    /// Cap on courier assignments per shipment; unset means unlimited
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_delivery_attempts: Option<u32>,
    pub max_evidence_bytes: usize,
}

impl Default for LifecyclePolicy {
    fn default() -> Self {
        Self {
            grants: vec![
                Grant::new(Role::Admin, &LifecycleEvent::ALL),
                Grant::new(Role::Courier, &LifecycleEvent::ALL),
                Grant::new(Role::Agent, &[LifecycleEvent::Assign]),
            ],
            create_roles: vec![Role::Admin, Role::Agent],
            delete_roles: vec![Role::Admin],
            require_failure_reason: false,
            max_delivery_attempts: None,
            max_evidence_bytes: DEFAULT_MAX_EVIDENCE_BYTES,
        }
    }
}

/// One line of the enumerated policy: a table edge and who may fire it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PolicyRow {
    pub from: DeliveryState,
    pub event: LifecycleEvent,
    pub to: DeliveryState,
    pub roles: Vec<Role>,
}

impl LifecyclePolicy {
    /// The single authorization check for transitions.
    pub fn can_transition(&self, role: Role, from: DeliveryState, event: LifecycleEvent) -> bool {
        self.grants.iter().any(|g| g.allows(role, from, event))
    }

    pub fn can_create(&self, role: Role) -> bool {
        self.create_roles.contains(&role)
    }

    pub fn can_delete(&self, role: Role) -> bool {
        self.delete_roles.contains(&role)
    }

    /// Enumerate every table edge with the roles allowed to fire it.
    pub fn rows(&self) -> Vec<PolicyRow> {
        TRANSITIONS
            .iter()
            .map(|rule| PolicyRow {
                from: rule.from,
                event: rule.event,
                to: rule.to,
                roles: Role::ALL
                    .into_iter()
                    .filter(|role| self.can_transition(*role, rule.from, rule.event))
                    .collect(),
            })
            .collect()
    }

    /// Plain-text rendering of [`LifecyclePolicy::rows`].
    pub fn render_table(&self) -> String {
        let mut out = format!("{:<20} {:<14} {:<20} {}\n", "FROM", "EVENT", "TO", "ROLES");
        for row in self.rows() {
            let roles = if row.roles.is_empty() {
                "-".to_string()
            } else {
                row.roles
                    .iter()
                    .map(Role::as_str)
                    .collect::<Vec<_>>()
                    .join(", ")
            };
            out.push_str(&format!(
                "{:<20} {:<14} {:<20} {}\n",
                row.from.label(),
                row.event.as_str(),
                row.to.label(),
                roles
            ));
        }
        out
    }

    /// Check internal consistency, failing on the first problem.
    pub fn check(&self) -> Result<()> {
        if self.max_evidence_bytes == 0 {
            bail!("policy.max_evidence_bytes must be greater than 0");
        }
        if self.max_delivery_attempts == Some(0) {
            bail!("policy.max_delivery_attempts must be at least 1 when set");
        }
        Ok(())
    }
}
