//! GSettings resource - read/write GNOME settings
//!
//! Values are compared as normalized GVariant text, so `'prefer-dark'`,
//! `"prefer-dark"` and a bare `prefer-dark` all match, as do `uint32 300`
//! and `300`.

use declarative::{
    ApplyContext, ApplyError, GSettingSpec, Provider, QueryState, ResourceKind, ResourceSpec,
};
use regex::Regex;
use std::io;
use std::process::{Command, Output};
use std::sync::OnceLock;

use super::unsupported;

/// Printed by GLib when no dconf/session backend is reachable; values read
/// that way are defaults and writes are discarded.
const MEMORY_BACKEND: &str = "memory' GSettings backend";

#[derive(Debug, Default)]
pub struct GSettingProvider;

impl GSettingProvider {
    pub fn new() -> Self {
        Self
    }
}

fn type_prefix() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(?:@[a-z{}()]+|u?int(?:16|32|64)|byte|double|objectpath|signature)\s+").ok()
    })
    .as_ref()
}

fn is_bare_word(value: &str) -> bool {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_.:-]*$").ok())
        .as_ref()
        .is_some_and(|re| re.is_match(value))
        && !matches!(value, "true" | "false" | "nothing")
}

/// Canonical GVariant text for comparison
pub fn normalize(value: &str) -> String {
    let value = value.trim();
    let value = match type_prefix() {
        Some(re) => re.replace(value, ""),
        None => value.into(),
    };

    if is_bare_word(&value) {
        return format!("'{value}'");
    }

    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(c) = chars.next() {
        match c {
            '\'' => {
                out.push('\'');
                for inner in chars.by_ref() {
                    out.push(inner);
                    if inner == '\'' {
                        break;
                    }
                }
            }
            '"' => {
                let mut inner = String::new();
                for ch in chars.by_ref() {
                    if ch == '"' {
                        break;
                    }
                    inner.push(ch);
                }
                if inner.contains('\'') {
                    out.push('"');
                    out.push_str(&inner);
                    out.push('"');
                } else {
                    out.push('\'');
                    out.push_str(&inner);
                    out.push('\'');
                }
            }
            c if c.is_whitespace() => {}
            c => out.push(c),
        }
    }
    out
}

/// Interpret `gsettings get` output against the desired value
pub fn classify(output: &Output, desired: &str) -> QueryState {
    let stderr = String::from_utf8_lossy(&output.stderr);
    if stderr.contains(MEMORY_BACKEND) {
        return QueryState::Unknown;
    }
    if !output.status.success() {
        log::debug!("gsettings get failed: {}", stderr.trim());
        return QueryState::Unknown;
    }
    let current = String::from_utf8_lossy(&output.stdout);
    if normalize(&current) == normalize(desired) {
        QueryState::Satisfied
    } else {
        QueryState::Unsatisfied
    }
}

fn gsettings(args: &[&str]) -> io::Result<Output> {
    log::debug!("exec: gsettings {}", args.join(" "));
    Command::new("gsettings").args(args).output()
}

fn spawn_error(err: &io::Error) -> ApplyError {
    if err.kind() == io::ErrorKind::NotFound {
        ApplyError::tool_failed("gsettings not found in PATH")
    } else {
        ApplyError::from_io("gsettings", err)
    }
}

impl Provider for GSettingProvider {
    fn kind(&self) -> ResourceKind {
        ResourceKind::GSetting
    }

    fn query(&self, spec: &ResourceSpec) -> QueryState {
        let ResourceSpec::GSetting(g) = spec else {
            return QueryState::Unknown;
        };
        match gsettings(&["get", &g.schema, &g.key]) {
            Ok(output) => classify(&output, &g.value),
            Err(e) => {
                log::debug!("gsettings: {e}");
                QueryState::Unknown
            }
        }
    }

    fn apply(&self, spec: &ResourceSpec, _ctx: &ApplyContext) -> Result<(), ApplyError> {
        let ResourceSpec::GSetting(g) = spec else {
            return Err(unsupported(self.kind(), spec));
        };
        let output = gsettings(&["set", &g.schema, &g.key, &g.value]).map_err(|e| spawn_error(&e))?;
        check_set(g, &output)?;

        // dconf can accept a write it cannot commit; read it back
        let readback = gsettings(&["get", &g.schema, &g.key]).map_err(|e| spawn_error(&e))?;
        match classify(&readback, &g.value) {
            QueryState::Satisfied => Ok(()),
            _ => Err(ApplyError::tool_failed(format!(
                "{}.{} did not persist (no session bus?)",
                g.schema, g.key
            ))),
        }
    }
}

fn check_set(spec: &GSettingSpec, output: &Output) -> Result<(), ApplyError> {
    let stderr = String::from_utf8_lossy(&output.stderr);
    if stderr.contains(MEMORY_BACKEND) {
        return Err(ApplyError::tool_failed(format!(
            "no session bus: cannot set {}.{}",
            spec.schema, spec.key
        )));
    }
    if output.status.success() {
        Ok(())
    } else {
        Err(ApplyError::from_output("gsettings", &output.clone().into()))
    }
}
