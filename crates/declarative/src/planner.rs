//! Execution planner - validates a plan and orders it by dependencies

use crate::error::PlanError;
use crate::resource::{Resource, ResourceKind};
use std::collections::{BTreeSet, HashMap, HashSet};

/// A validated, dependency-ordered plan
///
/// Built once from configuration and never mutated. Construction rejects
/// empty or duplicate ids, dangling `depends_on` entries and cycles, so a
/// plan that exists is always executable.
#[derive(Debug, Clone)]
pub struct ExecutionPlan {
    resources: Vec<Resource>,
    /// Dependency indices per resource, deduplicated
    deps: Vec<Vec<usize>>,
    /// Topological order; ties broken by declaration order
    order: Vec<usize>,
    /// Resources grouped by dependency depth
    layers: Vec<Vec<usize>>,
}

impl ExecutionPlan {
    /// Validate and order a list of resources
    pub fn new(resources: Vec<Resource>) -> Result<Self, PlanError> {
        let mut index = HashMap::with_capacity(resources.len());
        for (i, resource) in resources.iter().enumerate() {
            if resource.id.trim().is_empty() {
                return Err(PlanError::EmptyId);
            }
            if index.insert(resource.id.as_str(), i).is_some() {
                return Err(PlanError::DuplicateId(resource.id.clone()));
            }
        }

        let mut deps = Vec::with_capacity(resources.len());
        for resource in &resources {
            let mut seen = HashSet::new();
            let mut resolved = Vec::new();
            for dep in &resource.depends_on {
                let &d = index
                    .get(dep.as_str())
                    .ok_or_else(|| PlanError::UnknownDependency {
                        resource: resource.id.clone(),
                        dependency: dep.clone(),
                    })?;
                if seen.insert(d) {
                    resolved.push(d);
                }
            }
            deps.push(resolved);
        }

        let order = topological_order(&deps).map_err(|cycle| {
            PlanError::CyclicDependency(cycle.iter().map(|&i| resources[i].id.clone()).collect())
        })?;
        let layers = compute_layers(&deps, &order);

        Ok(Self {
            resources,
            deps,
            order,
            layers,
        })
    }

    /// Resources in declaration order
    pub fn resources(&self) -> &[Resource] {
        &self.resources
    }

    pub fn get(&self, id: &str) -> Option<&Resource> {
        self.resources.iter().find(|r| r.id == id)
    }

    /// Indices of the direct dependencies of the resource at `index`
    pub fn dependencies(&self, index: usize) -> &[usize] {
        &self.deps[index]
    }

    /// Indices in execution order
    pub fn order(&self) -> &[usize] {
        &self.order
    }

    /// Resources in execution order
    pub fn ordered(&self) -> impl Iterator<Item = &Resource> {
        self.order.iter().map(|&i| &self.resources[i])
    }

    /// Index layers; no dependency edges exist within a layer
    pub fn layers(&self) -> &[Vec<usize>] {
        &self.layers
    }

    /// Total number of resources in the plan
    pub fn len(&self) -> usize {
        self.resources.len()
    }

    /// Check if plan is empty
    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    /// Restrict the plan to resources matching a target, plus everything
    /// they transitively depend on
    ///
    /// Target format: "kind" or "kind.name" (name matches as id substring).
    pub fn filter_by_target(self, target: Option<&str>) -> Result<Self, PlanError> {
        let Some(t) = target else {
            return Ok(self);
        };
        let (kind, name) = parse_target(t);

        let mut keep = vec![false; self.resources.len()];
        let mut stack: Vec<usize> = self
            .resources
            .iter()
            .enumerate()
            .filter(|(_, r)| matches_filter(r, kind.as_deref(), name.as_deref()))
            .map(|(i, _)| i)
            .collect();
        while let Some(i) = stack.pop() {
            if keep[i] {
                continue;
            }
            keep[i] = true;
            stack.extend(self.deps[i].iter().copied().filter(|&d| !keep[d]));
        }

        let selected = self
            .resources
            .into_iter()
            .zip(keep)
            .filter_map(|(r, k)| k.then_some(r))
            .collect();
        Self::new(selected)
    }
}

/// Kahn's algorithm with a min-index ready set, so independent resources
/// keep their declaration order. On failure returns the ids on one cycle.
fn topological_order(deps: &[Vec<usize>]) -> Result<Vec<usize>, Vec<usize>> {
    let n = deps.len();
    let mut pending: Vec<usize> = deps.iter().map(Vec::len).collect();
    let mut dependents = vec![Vec::new(); n];
    for (i, ds) in deps.iter().enumerate() {
        for &d in ds {
            dependents[d].push(i);
        }
    }

    let mut ready: BTreeSet<usize> = (0..n).filter(|&i| pending[i] == 0).collect();
    let mut order = Vec::with_capacity(n);
    while let Some(i) = ready.pop_first() {
        order.push(i);
        for &dependent in &dependents[i] {
            pending[dependent] -= 1;
            if pending[dependent] == 0 {
                ready.insert(dependent);
            }
        }
    }

    if order.len() == n {
        Ok(order)
    } else {
        Err(find_cycle(deps, &pending))
    }
}

/// Walk unresolved dependencies until a node repeats
///
/// Every node left with `pending > 0` has at least one unresolved dependency,
/// so the walk always closes a loop.
fn find_cycle(deps: &[Vec<usize>], pending: &[usize]) -> Vec<usize> {
    let Some(start) = (0..deps.len()).find(|&i| pending[i] > 0) else {
        return Vec::new();
    };
    let mut path = vec![start];
    let mut current = start;
    loop {
        let Some(&next) = deps[current].iter().find(|&&d| pending[d] > 0) else {
            return path;
        };
        if let Some(pos) = path.iter().position(|&p| p == next) {
            let mut cycle = path.split_off(pos);
            cycle.push(next);
            return cycle;
        }
        path.push(next);
        current = next;
    }
}

/// Group by longest distance from a root; each layer in declaration order
fn compute_layers(deps: &[Vec<usize>], order: &[usize]) -> Vec<Vec<usize>> {
    let mut depth = vec![0usize; deps.len()];
    for &i in order {
        depth[i] = deps[i].iter().map(|&d| depth[d] + 1).max().unwrap_or(0);
    }
    let count = depth.iter().max().map_or(0, |m| m + 1);
    let mut layers = vec![Vec::new(); count];
    for (i, &d) in depth.iter().enumerate() {
        layers[d].push(i);
    }
    layers
}

/// Parse a target string like "kind.name" into (kind, name)
pub fn parse_target(target: &str) -> (Option<String>, Option<String>) {
    let parts: Vec<&str> = target.split('.').collect();
    match parts.len() {
        1 => (Some(parts[0].to_string()), None),
        2 => (Some(parts[0].to_string()), Some(parts[1].to_string())),
        _ => (None, Some(target.to_string())),
    }
}

/// Check if a resource matches the filter criteria
///
/// A first segment that is not a known kind is treated as an id substring.
fn matches_filter(resource: &Resource, kind: Option<&str>, name: Option<&str>) -> bool {
    match (kind.map(|k| (k, ResourceKind::from_alias(k))), name) {
        (Some((_, Some(k))), name) => {
            resource.kind() == k && name.is_none_or(|n| resource.id.contains(n))
        }
        (Some((raw, None)), None) => resource.id.contains(raw),
        (Some((_, None)), Some(_)) => false,
        (None, Some(n)) => resource.id.contains(n),
        (None, None) => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::{PackageSpec, RepoFileSpec, ResourceSpec};

    fn package(id: &str) -> Resource {
        Resource::new(
            id,
            ResourceSpec::Package(PackageSpec {
                name: id.to_string(),
                group: false,
                allow_erasing: false,
                repo: None,
                provides: None,
            }),
        )
    }

    fn repo(id: &str) -> Resource {
        Resource::new(
            id,
            ResourceSpec::RepoFile(RepoFileSpec {
                path: format!("/etc/yum.repos.d/{id}.repo").into(),
                content: String::new(),
                mode: None,
            }),
        )
    }

    fn ids(plan: &ExecutionPlan) -> Vec<&str> {
        plan.ordered().map(|r| r.id.as_str()).collect()
    }

    #[test]
    fn test_parse_target() {
        assert_eq!(parse_target("packages"), (Some("packages".to_string()), None));
        assert_eq!(
            parse_target("packages.vlc"),
            (Some("packages".to_string()), Some("vlc".to_string()))
        );
        assert_eq!(parse_target("a.b.c"), (None, Some("a.b.c".to_string())));
    }

    #[test]
    fn test_order_preserves_declaration_for_independent() {
        let plan =
            ExecutionPlan::new(vec![package("zsh"), package("git"), package("vim")]).unwrap();
        assert_eq!(ids(&plan), vec!["zsh", "git", "vim"]);
        assert_eq!(plan.layers().len(), 1);
    }

    #[test]
    fn test_order_respects_dependencies() {
        let plan = ExecutionPlan::new(vec![
            package("vlc").depends_on("rpmfusion"),
            package("git"),
            repo("rpmfusion"),
        ])
        .unwrap();
        // git and rpmfusion are ready first; vlc only once rpmfusion is done
        assert_eq!(ids(&plan), vec!["git", "rpmfusion", "vlc"]);
        assert_eq!(plan.layers(), &[vec![1, 2], vec![0]]);
    }

    #[test]
    fn test_layers_use_longest_path() {
        let plan = ExecutionPlan::new(vec![
            repo("a"),
            package("b").depends_on("a"),
            package("c").depends_on("a").depends_on("b"),
            package("d"),
        ])
        .unwrap();
        assert_eq!(plan.layers(), &[vec![0, 3], vec![1], vec![2]]);
    }

    #[test]
    fn test_duplicate_dependencies_are_collapsed() {
        let plan =
            ExecutionPlan::new(vec![repo("a"), package("b").depends_on("a").depends_on("a")])
                .unwrap();
        assert_eq!(plan.dependencies(1), &[0]);
    }

    #[test]
    fn test_rejects_cycle() {
        let err = ExecutionPlan::new(vec![
            package("a").depends_on("c"),
            package("b").depends_on("a"),
            package("c").depends_on("b"),
            package("free"),
        ])
        .unwrap_err();
        match err {
            PlanError::CyclicDependency(cycle) => {
                assert_eq!(cycle.first(), cycle.last());
                assert_eq!(cycle.len(), 4);
                assert!(!cycle.contains(&"free".to_string()));
            }
            other => panic!("expected cycle, got {other:?}"),
        }
    }

    #[test]
    fn test_rejects_self_dependency() {
        let err = ExecutionPlan::new(vec![package("a").depends_on("a")]).unwrap_err();
        assert_eq!(
            err,
            PlanError::CyclicDependency(vec!["a".to_string(), "a".to_string()])
        );
    }

    #[test]
    fn test_rejects_unknown_dependency() {
        let err = ExecutionPlan::new(vec![package("vlc").depends_on("rpmfusion")]).unwrap_err();
        assert_eq!(
            err,
            PlanError::UnknownDependency {
                resource: "vlc".to_string(),
                dependency: "rpmfusion".to_string()
            }
        );
    }

    #[test]
    fn test_rejects_duplicate_and_empty_ids() {
        assert_eq!(
            ExecutionPlan::new(vec![package("git"), package("git")]).unwrap_err(),
            PlanError::DuplicateId("git".to_string())
        );
        assert_eq!(
            ExecutionPlan::new(vec![package(" ")]).unwrap_err(),
            PlanError::EmptyId
        );
    }

    #[test]
    fn test_empty_plan() {
        let plan = ExecutionPlan::new(Vec::new()).unwrap();
        assert!(plan.is_empty());
        assert!(plan.layers().is_empty());
    }

    #[test]
    fn test_filter_pulls_in_dependencies() {
        let plan = ExecutionPlan::new(vec![
            repo("rpmfusion"),
            package("vlc").depends_on("rpmfusion"),
            package("git"),
        ])
        .unwrap();
        let filtered = plan.filter_by_target(Some("packages.vlc")).unwrap();
        assert_eq!(ids(&filtered), vec!["rpmfusion", "vlc"]);
    }

    #[test]
    fn test_filter_by_kind_and_bare_id() {
        let plan = ExecutionPlan::new(vec![repo("rpmfusion"), package("htop")]).unwrap();
        let repos = plan.clone().filter_by_target(Some("repos")).unwrap();
        assert_eq!(ids(&repos), vec!["rpmfusion"]);

        let by_id = plan.filter_by_target(Some("htop")).unwrap();
        assert_eq!(ids(&by_id), vec!["htop"]);
    }
}
