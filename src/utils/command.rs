// dbbackup/src/utils/command.rs
use std::ffi::{OsStr, OsString};
use std::fs::File;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use which::{which, which_in};

use crate::errors::{BackupError, Result};

/// Locates and runs the native database client tools.
///
/// By default tools are resolved on `PATH`; a configured `tools_dir`
/// replaces that search path entirely.
#[derive(Debug, Clone, Default)]
pub struct Toolchain {
    search_path: Option<OsString>,
}

impl Toolchain {
    pub fn new(tools_dir: Option<&Path>) -> Self {
        Self {
            search_path: tools_dir.map(|dir| dir.as_os_str().to_os_string()),
        }
    }

    /// Finds `tool` on the search path.
    pub fn locate(&self, tool: &str) -> Result<PathBuf> {
        let found = match &self.search_path {
            Some(paths) => which_in(tool, Some(paths), std::env::current_dir()?),
            None => which(tool),
        };
        found.map_err(|_| BackupError::ToolNotFound(tool.to_string()))
    }

    /// Runs the invocation to completion. Fails if the tool is missing or
    /// exits unsuccessfully; a partially written output file is left as is.
    pub fn run(&self, invocation: &ToolInvocation) -> Result<ToolOutput> {
        let program = self.locate(invocation.tool)?;
        tracing::debug!(
            tool = invocation.tool,
            path = %program.display(),
            args = %invocation.redacted_args(),
            "running native tool"
        );

        let mut command = Command::new(&program);
        command.args(&invocation.args);
        for (key, value) in &invocation.envs {
            command.env(key, value);
        }
        if let Some(stdin_path) = &invocation.stdin_from {
            let stdin = File::open(stdin_path)?;
            command.stdin(Stdio::from(stdin));
        } else {
            command.stdin(Stdio::null());
        }
        if let Some(stdout_path) = &invocation.stdout_to {
            let stdout = File::create(stdout_path)?;
            command.stdout(Stdio::from(stdout));
        }

        let output = command.output()?;
        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();

        if !output.status.success() {
            return Err(BackupError::ToolExecution {
                tool: invocation.tool.to_string(),
                exit_code: output.status.code(),
                stderr: stderr.trim().to_string(),
            });
        }
        Ok(ToolOutput { stdout, stderr })
    }
}

/// Captured output of a successful tool run. `stdout` is empty when it was
/// redirected into a file.
#[derive(Debug, Clone, Default)]
pub struct ToolOutput {
    pub stdout: String,
    pub stderr: String,
}

/// A single subprocess call: binary name, argv, extra environment and
/// optional stdin/stdout redirection.
#[derive(Debug, Clone)]
pub struct ToolInvocation {
    pub tool: &'static str,
    pub args: Vec<OsString>,
    pub envs: Vec<(&'static str, String)>,
    pub stdin_from: Option<PathBuf>,
    pub stdout_to: Option<PathBuf>,
}

impl ToolInvocation {
    pub fn new(tool: &'static str) -> Self {
        Self {
            tool,
            args: Vec::new(),
            envs: Vec::new(),
            stdin_from: None,
            stdout_to: None,
        }
    }

    pub fn arg(mut self, arg: impl AsRef<OsStr>) -> Self {
        self.args.push(arg.as_ref().to_os_string());
        self
    }

    /// Adds `flag value` only when a value is present.
    pub fn opt_arg(self, flag: &str, value: Option<impl AsRef<OsStr>>) -> Self {
        match value {
            Some(value) => self.arg(flag).arg(value),
            None => self,
        }
    }

    pub fn env(mut self, key: &'static str, value: Option<&str>) -> Self {
        if let Some(value) = value {
            self.envs.push((key, value.to_string()));
        }
        self
    }

    pub fn stdin_from(mut self, path: &Path) -> Self {
        self.stdin_from = Some(path.to_path_buf());
        self
    }

    pub fn stdout_to(mut self, path: &Path) -> Self {
        self.stdout_to = Some(path.to_path_buf());
        self
    }

    pub fn args_lossy(&self) -> Vec<String> {
        self.args
            .iter()
            .map(|a| a.to_string_lossy().into_owned())
            .collect()
    }

    /// Space-joined argv with password values masked.
    pub fn redacted_args(&self) -> String {
        let mut rendered = Vec::with_capacity(self.args.len());
        let mut mask_next = false;
        for arg in self.args_lossy() {
            if mask_next {
                rendered.push("***".to_string());
                mask_next = false;
            } else if arg == "--password" {
                rendered.push(arg);
                mask_next = true;
            } else if arg.starts_with("--password=") {
                rendered.push("--password=***".to_string());
            } else {
                rendered.push(arg);
            }
        }
        rendered.join(" ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_locate_missing_tool() {
        let dir = tempfile::tempdir().unwrap();
        let toolchain = Toolchain::new(Some(dir.path()));
        let err = toolchain.locate("pg_dump").unwrap_err();
        assert!(matches!(err, BackupError::ToolNotFound(ref t) if t == "pg_dump"));
    }

    #[test]
    fn test_redacted_args_hide_passwords() {
        let invocation = ToolInvocation::new("mongodump")
            .arg("--username")
            .arg("admin")
            .arg("--password")
            .arg("s3cr3t")
            .arg("--password=inline");
        let rendered = invocation.redacted_args();
        assert!(!rendered.contains("s3cr3t"));
        assert!(!rendered.contains("inline"));
        assert!(rendered.contains("--username admin"));
    }

    #[test]
    fn test_opt_arg_skips_missing_values() {
        let invocation = ToolInvocation::new("pg_dump")
            .opt_arg("-U", None::<&str>)
            .opt_arg("-h", Some("db.internal"));
        assert_eq!(invocation.args_lossy(), vec!["-h", "db.internal"]);
    }

    #[cfg(unix)]
    mod unix {
        use super::*;
        use crate::utils::fake_tool;
        use std::fs;

        #[test]
        fn test_run_redirects_stdout_into_file() -> anyhow::Result<()> {
            let dir = tempfile::tempdir()?;
            fake_tool(dir.path(), "mysqldump", r#"echo "-- dump of $*""#)?;
            let out = dir.path().join("shop.sql");

            let toolchain = Toolchain::new(Some(dir.path()));
            toolchain.run(&ToolInvocation::new("mysqldump").arg("shop").stdout_to(&out))?;

            assert_eq!(fs::read_to_string(&out)?, "-- dump of shop\n");
            Ok(())
        }

        #[test]
        fn test_run_passes_environment() -> anyhow::Result<()> {
            let dir = tempfile::tempdir()?;
            fake_tool(dir.path(), "psql", r#"printf '%s' "$PGPASSWORD""#)?;

            let toolchain = Toolchain::new(Some(dir.path()));
            let output =
                toolchain.run(&ToolInvocation::new("psql").env("PGPASSWORD", Some("pw")))?;
            assert_eq!(output.stdout, "pw");
            Ok(())
        }

        #[test]
        fn test_non_zero_exit_reports_code_and_stderr() -> anyhow::Result<()> {
            let dir = tempfile::tempdir()?;
            fake_tool(dir.path(), "pg_dump", "echo 'connection refused' >&2; exit 3")?;

            let toolchain = Toolchain::new(Some(dir.path()));
            let err = toolchain.run(&ToolInvocation::new("pg_dump")).unwrap_err();
            match err {
                BackupError::ToolExecution { tool, exit_code, stderr } => {
                    assert_eq!(tool, "pg_dump");
                    assert_eq!(exit_code, Some(3));
                    assert_eq!(stderr, "connection refused");
                }
                other => panic!("unexpected error: {other:?}"),
            }
            Ok(())
        }
    }
}
