use std::env;
use std::os::unix::fs::PermissionsExt;

/// Check if an executable named `cmd` is on PATH
pub fn command_exists(cmd: &str) -> bool {
    let Some(path) = env::var_os("PATH") else {
        return false;
    };
    env::split_paths(&path).any(|dir| {
        dir.join(cmd)
            .metadata()
            .is_ok_and(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_exists() {
        assert!(command_exists("sh"));
        assert!(!command_exists("choro-definitely-missing"));
    }
}
