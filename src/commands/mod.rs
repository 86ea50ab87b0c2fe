//! Subcommand implementations

pub mod apply;
pub mod doctor;
pub mod history;
pub mod plan;
pub mod status;

use anyhow::{Context as _, Result};
use declarative::{ExecutionPlan, ProviderRegistry};

use crate::Context;
use crate::config::PlanConfig;
use crate::host::HostFacts;
use crate::resource;

/// A plan file loaded, validated and filtered for one command
pub struct Loaded {
    pub host: HostFacts,
    pub config: PlanConfig,
    pub plan: ExecutionPlan,
}

impl Loaded {
    /// Load the plan file and restrict it to `target`
    pub fn load(ctx: &Context, target: Option<&str>) -> Result<Self> {
        let host = HostFacts::detect();
        let config = PlanConfig::load(ctx.plan.as_deref(), &host)?;
        let plan = ExecutionPlan::new(config.resources.clone())
            .with_context(|| format!("Invalid plan {}", config.path.display()))?
            .filter_by_target(target)
            .context("Invalid target")?;
        if let Some(t) = target
            && plan.is_empty()
        {
            anyhow::bail!("No resources match target `{t}`");
        }
        Ok(Self { host, config, plan })
    }

    /// Providers for this host, checked against the plan
    pub fn registry(&self) -> Result<ProviderRegistry> {
        let registry =
            resource::build_registry(&self.host, self.config.settings.scratch_dir()?);
        registry.check(&self.plan)?;
        Ok(registry)
    }
}
