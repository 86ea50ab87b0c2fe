//! Command execution seam.
//!
//! Backends build argument vectors and hand them to an [`Exec`]. The caller
//! decides how privileged commands reach root (sudo, already root, a test
//! double), so this crate never prompts for credentials itself.

use crate::error::{Error, Result};
use crate::types::RunOutput;
use std::process::Command;

/// Runs commands on behalf of a backend.
pub trait Exec: Send + Sync {
    /// Run `program` with `args`; `privileged` commands modify system state
    fn exec(&self, program: &str, args: &[&str], privileged: bool) -> Result<RunOutput>;
}

/// Runs commands directly, prefixing privileged ones with `sudo -n`
/// unless the process is already root.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemExec {
    pub is_root: bool,
}

impl SystemExec {
    pub fn new(is_root: bool) -> Self {
        Self { is_root }
    }
}

impl Exec for SystemExec {
    fn exec(&self, program: &str, args: &[&str], privileged: bool) -> Result<RunOutput> {
        let mut cmd = if privileged && !self.is_root {
            let mut c = Command::new("sudo");
            c.arg("-n").arg(program);
            c
        } else {
            Command::new(program)
        };
        log::debug!("exec: {program} {}", args.join(" "));
        let output = cmd
            .args(args)
            .output()
            .map_err(|e| Error::from_spawn(program, e))?;
        Ok(output.into())
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::sync::Mutex;

    /// Records invocations and answers from a script keyed by argv prefix
    #[derive(Default)]
    pub struct ScriptedExec {
        pub calls: Mutex<Vec<(String, bool)>>,
        replies: Vec<(String, RunOutput)>,
    }

    impl ScriptedExec {
        pub fn reply(mut self, prefix: &str, output: RunOutput) -> Self {
            self.replies.push((prefix.to_string(), output));
            self
        }

        pub fn calls(&self) -> Vec<(String, bool)> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl Exec for ScriptedExec {
        fn exec(&self, program: &str, args: &[&str], privileged: bool) -> Result<RunOutput> {
            let line = format!("{program} {}", args.join(" "));
            self.calls.lock().unwrap().push((line.clone(), privileged));
            Ok(self
                .replies
                .iter()
                .find(|(prefix, _)| line.starts_with(prefix.as_str()))
                .map(|(_, out)| out.clone())
                .unwrap_or_else(|| RunOutput::ok("")))
        }
    }
}
