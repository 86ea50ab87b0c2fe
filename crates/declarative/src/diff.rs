//! Status inspection - queries every resource without changing anything

use crate::context::ProviderRegistry;
use crate::executor::guarded_query;
use crate::planner::ExecutionPlan;
use crate::resource::{Resource, ResourceKind};
use crate::types::QueryState;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// Observed state of one resource
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceStatus {
    pub resource_id: String,
    pub kind: ResourceKind,
    pub description: String,
    pub state: QueryState,
    /// Fallback target that satisfies the resource, when the primary does not
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub via_fallback: Option<String>,
    pub requires_privilege: bool,
}

impl ResourceStatus {
    /// Query a resource and its fallbacks
    ///
    /// Returns `Unknown` for kinds without a registered provider, and for
    /// queries that panic or outlive `timeout`.
    pub fn inspect(
        resource: &Resource,
        registry: &ProviderRegistry,
        timeout: Option<Duration>,
    ) -> Self {
        let mut status = Self {
            resource_id: resource.id.clone(),
            kind: resource.kind(),
            description: resource.description(),
            state: QueryState::Unknown,
            via_fallback: None,
            requires_privilege: false,
        };

        let Some(provider) = registry.get(resource.kind()) else {
            return status;
        };
        status.requires_privilege = provider.requires_privilege(&resource.spec);
        status.state = guarded_query(provider, &resource.spec, timeout);
        if status.state.is_satisfied() {
            return status;
        }

        for fallback in &resource.fallbacks {
            let satisfied = registry
                .get(fallback.kind())
                .is_some_and(|p| guarded_query(p, fallback, timeout).is_satisfied());
            if satisfied {
                status.state = QueryState::Satisfied;
                status.via_fallback = Some(fallback.target());
                break;
            }
        }
        status
    }

    /// Whether an apply run would touch this resource
    pub fn needs_apply(&self) -> bool {
        !self.state.is_satisfied()
    }
}

/// Query every resource of a plan, in execution order
///
/// Queries are side-effect free, so they run in parallel on the global pool.
/// Each one is bounded by `timeout` like an engine query.
pub fn inspect(
    plan: &ExecutionPlan,
    registry: &ProviderRegistry,
    timeout: Option<Duration>,
) -> Vec<ResourceStatus> {
    plan.order()
        .par_iter()
        .map(|&idx| ResourceStatus::inspect(&plan.resources()[idx], registry, timeout))
        .collect()
}

/// Status summary statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatusSummary {
    pub satisfied: usize,
    pub unsatisfied: usize,
    pub unknown: usize,
    /// Resources needing apply whose provider requires privileges
    pub privileged: usize,
}

impl StatusSummary {
    pub fn from_statuses(statuses: &[ResourceStatus]) -> Self {
        let mut summary = Self::default();
        for status in statuses {
            match status.state {
                QueryState::Satisfied => summary.satisfied += 1,
                QueryState::Unsatisfied => summary.unsatisfied += 1,
                QueryState::Unknown => summary.unknown += 1,
            }
            if status.needs_apply() && status.requires_privilege {
                summary.privileged += 1;
            }
        }
        summary
    }

    /// Resources an apply run would attempt
    pub fn pending(&self) -> usize {
        self.unsatisfied + self.unknown
    }

    pub fn has_changes(&self) -> bool {
        self.pending() > 0
    }
}

/// Group statuses by resource kind
pub fn group_by_kind(statuses: &[ResourceStatus]) -> BTreeMap<ResourceKind, Vec<&ResourceStatus>> {
    let mut groups: BTreeMap<ResourceKind, Vec<&ResourceStatus>> = BTreeMap::new();
    for status in statuses {
        groups.entry(status.kind).or_default().push(status);
    }
    groups
}
