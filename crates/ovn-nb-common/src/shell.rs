//! Running `ovn-nbctl` command lines.
//!
//! The backend builds whole command lines and hands them to `/bin/sh -c`.
//! Namespace names and ACL match expressions come from the orchestrator,
//! so anything interpolated into a command line goes through [`shellquote`].

use once_cell::sync::Lazy;
use regex::Regex;
use std::process::Stdio;
use tokio::process::Command;

use crate::error::{NbError, NbResult};

/// Default path to the `ovn-nbctl` utility.
pub const OVN_NBCTL_CMD: &str = "/usr/bin/ovn-nbctl";

// Characters still special inside double quotes.
static DQUOTE_SPECIAL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"[$`"\\\n]"#).expect("Invalid regex pattern"));

/// Wraps `s` in double quotes, backslash-escaping `$`, `` ` ``, `"`, `\`
/// and newline.
///
/// ```
/// use ovn_nb_common::shell::shellquote;
///
/// assert_eq!(shellquote("ns1"), "\"ns1\"");
/// assert_eq!(shellquote("ip4.mcast && $x"), "\"ip4.mcast && \\$x\"");
/// ```
pub fn shellquote(s: &str) -> String {
    let mut quoted = String::with_capacity(s.len() + 2);
    quoted.push('"');
    let mut last = 0;
    for m in DQUOTE_SPECIAL.find_iter(s) {
        quoted.push_str(&s[last..m.start()]);
        quoted.push('\\');
        quoted.push_str(m.as_str());
        last = m.end();
    }
    quoted.push_str(&s[last..]);
    quoted.push('"');
    quoted
}

/// What a finished command printed, and how it exited.
#[derive(Debug, Clone)]
pub struct CommandOutput {
    /// Exit status; `None` when the process was killed by a signal.
    pub status: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn ok(&self) -> bool {
        self.status == Some(0)
    }

    /// Text worth putting into an error: stderr when present, else stdout.
    pub fn diagnostics(&self) -> &str {
        if self.stderr.is_empty() {
            &self.stdout
        } else {
            &self.stderr
        }
    }
}

/// Runs `cmd` through the shell.
///
/// Only a spawn failure is an `Err`; inspect [`CommandOutput::ok`] for the
/// exit status.
pub async fn run(cmd: &str) -> NbResult<CommandOutput> {
    tracing::debug!(command = %cmd, "running northbound command");

    let output = Command::new("/bin/sh")
        .arg("-c")
        .arg(cmd)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .output()
        .await
        .map_err(|source| NbError::ShellExec {
            command: cmd.to_string(),
            source,
        })?;

    Ok(CommandOutput {
        status: output.status.code(),
        stdout: String::from_utf8_lossy(&output.stdout).trim().to_string(),
        stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
    })
}

/// Runs `cmd` and returns its trimmed stdout, turning a non-zero exit into
/// [`NbError::CommandFailed`].
pub async fn run_checked(cmd: &str) -> NbResult<String> {
    let out = run(cmd).await?;
    if out.ok() {
        return Ok(out.stdout);
    }
    let exit_code = out.status.unwrap_or(-1);
    tracing::warn!(command = %cmd, exit_code, stderr = %out.stderr, "northbound command failed");
    Err(NbError::CommandFailed {
        command: cmd.to_string(),
        exit_code,
        output: out.diagnostics().to_string(),
    })
}
