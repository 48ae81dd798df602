//! Build command construction
//!
//! The engine is a caller of an external builder CLI whose flag
//! contract is fixed: `./builder --owner=… --udid=… --fcid=… --mac=…
//! --git=… --branch=… --id=… --workdir=… [--dry-run] [--env=<json>]`.
//! The invocation is an argument vector handed to the process-spawn
//! API; no field reaches it without having passed the sanitizer or
//! being an internally generated value.

use std::path::{Path, PathBuf};

use fwforge_config::Config;
use fwforge_errors::Error;
use serde_json::Map;

/// Validated inputs for one builder invocation.
pub struct CommandSpec<'a> {
    pub owner: &'a str,
    pub udid: &'a str,
    pub fcid: &'a str,
    pub mac: &'a str,
    pub git: &'a str,
    pub branch: &'a str,
    pub build_id: &'a str,
    pub workdir: &'a Path,
    pub dry_run: bool,
    pub env_vars: &'a [(String, String)],
}

/// An assembled builder invocation: program, argv, working directory.
#[derive(Debug, Clone)]
pub struct BuildCommand {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
}

impl BuildCommand {
    /// Command for local execution: absolute builder path, run from the
    /// builder root.
    ///
    /// # Errors
    ///
    /// Returns an error if the env var payload cannot be serialized.
    pub fn local(config: &Config, spec: &CommandSpec<'_>) -> Result<Self, Error> {
        Ok(Self {
            program: config.builder_bin(),
            args: Self::args_for(spec)?,
            cwd: Some(config.paths.builder_root.clone()),
        })
    }

    /// Command for remote execution: the worker resolves `./builder`
    /// inside its own root.
    ///
    /// # Errors
    ///
    /// Returns an error if the env var payload cannot be serialized.
    pub fn remote(spec: &CommandSpec<'_>) -> Result<Self, Error> {
        Ok(Self {
            program: PathBuf::from("./builder"),
            args: Self::args_for(spec)?,
            cwd: None,
        })
    }

    fn args_for(spec: &CommandSpec<'_>) -> Result<Vec<String>, Error> {
        let mut args = vec![
            format!("--owner={}", spec.owner),
            format!("--udid={}", spec.udid),
            format!("--fcid={}", spec.fcid),
            format!("--mac={}", format_mac_for_devsec(spec.mac)),
            format!("--git={}", spec.git),
            format!("--branch={}", spec.branch),
            format!("--id={}", spec.build_id),
            format!("--workdir={}", spec.workdir.display()),
        ];
        if spec.dry_run {
            args.push("--dry-run".to_string());
        }
        if !spec.env_vars.is_empty() {
            let map: Map<String, serde_json::Value> = spec
                .env_vars
                .iter()
                .map(|(k, v)| (k.clone(), serde_json::Value::String(v.clone())))
                .collect();
            args.push(format!("--env={}", serde_json::to_string(&map)?));
        }
        Ok(args)
    }

    /// The full argv, program first, as dispatched to a remote worker.
    #[must_use]
    pub fn argv(&self) -> Vec<String> {
        let mut argv = Vec::with_capacity(self.args.len() + 1);
        argv.push(self.program.display().to_string());
        argv.extend(self.args.iter().cloned());
        argv
    }

    /// Materialize as a spawnable process.
    #[must_use]
    pub fn to_tokio(&self) -> tokio::process::Command {
        let mut cmd = tokio::process::Command::new(&self.program);
        cmd.args(&self.args);
        if let Some(cwd) = &self.cwd {
            cmd.current_dir(cwd);
        }
        cmd
    }
}

/// MAC normalization for DevSec: colons stripped, and only the second
/// half kept when a full 12-digit MAC is given — vendor prefixes are
/// identical across a fleet and would leak the hardware family.
#[must_use]
pub fn format_mac_for_devsec(mac: &str) -> String {
    let no_colons: String = mac.chars().filter(|c| *c != ':').collect();
    if no_colons.len() == 12 {
        no_colons[6..].to_string()
    } else {
        no_colons
    }
}

#[cfg(test)]
mod tests {
    use super::{format_mac_for_devsec, BuildCommand, CommandSpec};
    use std::path::Path;

    fn spec<'a>(env_vars: &'a [(String, String)]) -> CommandSpec<'a> {
        CommandSpec {
            owner: "o64",
            udid: "f8e88e40-43c8-11e7-9ad3-b7281c2b9610",
            fcid: "000000",
            mac: "CC:50:E3:0D:98:2C",
            git: "https://github.com/x/fw.git",
            branch: "main",
            build_id: "b-1",
            workdir: Path::new("/data/repos/o/u/b/fw"),
            dry_run: false,
            env_vars,
        }
    }

    #[test]
    fn flag_contract_is_preserved() {
        let cmd = BuildCommand::remote(&spec(&[])).unwrap();
        assert_eq!(
            cmd.argv(),
            vec![
                "./builder",
                "--owner=o64",
                "--udid=f8e88e40-43c8-11e7-9ad3-b7281c2b9610",
                "--fcid=000000",
                "--mac=0D982C",
                "--git=https://github.com/x/fw.git",
                "--branch=main",
                "--id=b-1",
                "--workdir=/data/repos/o/u/b/fw",
            ]
        );
    }

    #[test]
    fn dry_run_and_env_flags_are_appended() {
        let envs = vec![("KEY".to_string(), "value".to_string())];
        let mut s = spec(&envs);
        s.dry_run = true;
        let cmd = BuildCommand::remote(&s).unwrap();
        let argv = cmd.argv();
        assert!(argv.contains(&"--dry-run".to_string()));
        assert!(argv.contains(&"--env={\"KEY\":\"value\"}".to_string()));
        // dry-run comes before env, after the fixed flags
        assert_eq!(argv[argv.len() - 2], "--dry-run");
    }

    #[test]
    fn mac_anonymization() {
        assert_eq!(format_mac_for_devsec("CC:50:E3:0D:98:2C"), "0D982C");
        assert_eq!(format_mac_for_devsec("AABBCCDDEEFF"), "DDEEFF");
        // malformed MACs pass through with colons stripped only
        assert_eq!(format_mac_for_devsec("AA:BB"), "AABB");
    }

    #[test]
    fn local_command_runs_from_builder_root() {
        let config = fwforge_config::Config::default();
        let cmd = BuildCommand::local(&config, &spec(&[])).unwrap();
        assert_eq!(cmd.program, config.builder_bin());
        assert_eq!(cmd.cwd.as_deref(), Some(config.paths.builder_root.as_path()));
    }
}
