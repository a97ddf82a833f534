use anyhow::{bail, Context, Result};
use std::process::{Command, Output, Stdio};
use std::thread;

/// Controls the external application that would fight the transfer for the
/// watched folder (for example a launcher still writing into it).
///
/// Both calls come from the event loop and must return without waiting for the
/// external application.
pub trait ProcessController: Send {
    fn stop_conflicting_process(&mut self) -> Result<()>;
    fn resume_conflicting_process(&mut self) -> Result<()>;
}

/// Used when nothing needs to be stopped.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopProcessController;

impl ProcessController for NoopProcessController {
    fn stop_conflicting_process(&mut self) -> Result<()> {
        Ok(())
    }

    fn resume_conflicting_process(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Runs configured argv commands, e.g. `["pkill", "-x", "Launcher"]`.
///
/// A command is only launched here. Its exit status is collected on a reaper
/// thread and a failure is logged there, so a resume command that starts a
/// long-running application never holds up the caller.
#[derive(Debug, Default, Clone)]
pub struct CommandProcessController {
    stop_command: Option<Vec<String>>,
    resume_command: Option<Vec<String>>,
}

impl CommandProcessController {
    pub fn new(stop_command: Option<Vec<String>>, resume_command: Option<Vec<String>>) -> Self {
        Self {
            stop_command,
            resume_command,
        }
    }

    /// Spawns `argv` and returns the reaper, which yields the exit check.
    fn launch(argv: &[String]) -> Result<thread::JoinHandle<Result<()>>> {
        let Some((program, args)) = argv.split_first() else {
            bail!("empty command");
        };

        let child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .with_context(|| format!("failed to launch {program}"))?;
        log::debug!("Launched {program} (pid {})", child.id());

        let program = program.clone();
        thread::Builder::new()
            .name("process-reaper".to_string())
            .spawn(move || {
                let output = child
                    .wait_with_output()
                    .with_context(|| format!("failed to wait for {program}"))?;
                let checked = check_exit(&program, &output);
                if let Err(e) = &checked {
                    log::warn!("{e:#}");
                }
                checked
            })
            .context("failed to start reaper thread")
    }

    fn run(argv: &[String]) -> Result<()> {
        // Detached: the reaper outlives this call.
        Self::launch(argv).map(drop)
    }
}

fn check_exit(program: &str, output: &Output) -> Result<()> {
    if !output.status.success() {
        bail!(
            "{program} exited with {}: {}",
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        );
    }
    Ok(())
}

impl ProcessController for CommandProcessController {
    fn stop_conflicting_process(&mut self) -> Result<()> {
        match &self.stop_command {
            Some(argv) => Self::run(argv),
            None => Ok(()),
        }
    }

    fn resume_conflicting_process(&mut self) -> Result<()> {
        match &self.resume_command {
            Some(argv) => Self::run(argv),
            None => Ok(()),
        }
    }
}
