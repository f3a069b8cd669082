//! Running external programs like `tar` and `mysqldump`.

use std::borrow::Cow;
use std::io;
use std::process::{Command, ExitStatus, Output};
use std::sync::LazyLock;

use derive_more::{Display, Error};
use regex::Regex;

static PASSWORD_ARG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(^|\s)-p\S+").expect("password pattern is valid"));

/// Errors of an external program.
#[derive(Debug, Display, Error)]
pub enum CommandError {
    /// The program couldn't be started.
    #[display("unable to run {program}: {source}")]
    Spawn { program: String, source: io::Error },
    /// The program ran but reported failure.
    #[display("{program} failed ({status}): {stderr}")]
    Failed {
        program: String,
        status: ExitStatus,
        stderr: String,
    },
}

/// Renders `command` for logs with any inline password masked.
pub fn describe(command: &Command) -> String {
    let mut line = command.get_program().to_string_lossy().into_owned();
    for arg in command.get_args() {
        line.push(' ');
        line.push_str(&arg.to_string_lossy());
    }

    redact_password(&line).into_owned()
}

/// Masks `-p<password>` arguments of MySQL client programs.
pub fn redact_password(line: &str) -> Cow<'_, str> {
    PASSWORD_ARG.replace_all(line, "$1-p****")
}

/// Runs `command` to completion, capturing its output.
///
/// A non-zero exit status becomes [CommandError::Failed] carrying stderr.
pub fn run(command: &mut Command) -> Result<Output, CommandError> {
    let program = command.get_program().to_string_lossy().into_owned();
    log::trace!(target: "process", "Running: {}", describe(command));

    let output = command
        .output()
        .map_err(|source| CommandError::Spawn {
            program: program.clone(),
            source,
        })?;

    if !output.status.success() {
        return Err(CommandError::Failed {
            program,
            status: output.status,
            stderr: String::from_utf8_lossy(&output.stderr).trim_end().into(),
        });
    }

    Ok(output)
}
