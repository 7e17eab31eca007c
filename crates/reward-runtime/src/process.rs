use crate::RuntimeError;
use std::io::{self, Read, Write};
use std::process::{Command, Output, Stdio};
use std::thread;
use tracing::{debug, warn};

/// Build a [`Command`] for `program`, failing early when it is not on `PATH`.
pub(crate) fn command(program: &str) -> Result<Command, RuntimeError> {
    let path =
        which::which(program).map_err(|_| RuntimeError::ProgramMissing(program.to_owned()))?;
    Ok(Command::new(path))
}

fn spawn_err(program: &str, e: io::Error) -> RuntimeError {
    if e.kind() == io::ErrorKind::NotFound {
        RuntimeError::ProgramMissing(program.to_owned())
    } else {
        RuntimeError::Io(e)
    }
}

/// Run with inherited stdio. Non-zero exit is an error carrying the code.
pub(crate) fn run_streamed(program: &str, mut cmd: Command) -> Result<(), RuntimeError> {
    debug!(program, args = ?cmd.get_args().collect::<Vec<_>>(), "exec");
    let status = cmd
        .stdin(Stdio::inherit())
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit())
        .status()
        .map_err(|e| spawn_err(program, e))?;
    if status.success() {
        Ok(())
    } else {
        Err(RuntimeError::SubprocessFailed {
            program: program.to_owned(),
            code: status.code(),
            output: String::new(),
        })
    }
}

/// Run with stdout and stderr captured together.
pub(crate) fn run_captured(program: &str, mut cmd: Command) -> Result<String, RuntimeError> {
    debug!(program, args = ?cmd.get_args().collect::<Vec<_>>(), "exec (captured)");
    let Output {
        status,
        stdout,
        stderr,
    } = cmd
        .stdin(Stdio::null())
        .output()
        .map_err(|e| spawn_err(program, e))?;
    let mut combined = String::from_utf8_lossy(&stdout).into_owned();
    combined.push_str(&String::from_utf8_lossy(&stderr));
    if status.success() {
        Ok(combined)
    } else {
        Err(RuntimeError::SubprocessFailed {
            program: program.to_owned(),
            code: status.code(),
            output: combined,
        })
    }
}

/// Run with `input` streamed into the child's stdin from a producer thread.
///
/// The producer is joined after the child exits. A broken pipe from a child
/// that stopped reading early is not reported separately; the exit status
/// carries the failure.
pub(crate) fn run_with_input(
    program: &str,
    mut cmd: Command,
    mut input: Box<dyn Read + Send>,
) -> Result<(), RuntimeError> {
    debug!(program, args = ?cmd.get_args().collect::<Vec<_>>(), "exec (piped stdin)");
    let mut child = cmd
        .stdin(Stdio::piped())
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit())
        .spawn()
        .map_err(|e| spawn_err(program, e))?;

    let mut stdin = child
        .stdin
        .take()
        .ok_or_else(|| RuntimeError::Api(format!("{program}: stdin not captured")))?;
    let producer = thread::spawn(move || -> io::Result<u64> {
        let copied = io::copy(&mut input, &mut stdin)?;
        stdin.flush()?;
        Ok(copied)
    });

    let status = child.wait()?;
    match producer.join() {
        Ok(Ok(bytes)) => debug!(program, bytes, "stdin stream finished"),
        Ok(Err(e)) if e.kind() == io::ErrorKind::BrokenPipe => {
            debug!(program, "child closed stdin early");
        }
        Ok(Err(e)) => {
            if status.success() {
                return Err(RuntimeError::Io(e));
            }
            warn!(program, "input stream failed: {e}");
        }
        Err(_) => return Err(RuntimeError::Api(format!("{program}: input thread panicked"))),
    }

    if status.success() {
        Ok(())
    } else {
        Err(RuntimeError::SubprocessFailed {
            program: program.to_owned(),
            code: status.code(),
            output: String::new(),
        })
    }
}
