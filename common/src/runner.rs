//! Runner de procesos: lanza el comando de un job con stdout/stderr
//! redirigidos a sus archivos de salida.

use std::{
    fs::{self, File},
    io,
    path::Path,
    process::{ExitStatus, Stdio},
};
use tokio::process::{Child, Command};
use tracing::debug;

use crate::error::SpawnError;
use crate::job::{JobDescriptor, JobId};
use crate::results::ExecutionResult;

/// Proceso de un job, corriendo o terminado.
#[derive(Debug)]
pub struct ProcessHandle {
    job_id: JobId,
    child: Child,
    /// Copias de stdout/stderr del lado padre; se sueltan en la primera salida observada
    outputs: Option<(File, File)>,
    exit_code: Option<i32>,
}

/// Crea (truncando) ambos archivos de salida y arranca el comando del job.
pub fn spawn(job: &JobDescriptor) -> Result<ProcessHandle, SpawnError> {
    let (program, args) = job
        .command
        .program_and_args()
        .ok_or_else(|| SpawnError::Launch {
            program: String::new(),
            source: io::Error::new(io::ErrorKind::InvalidInput, "empty command"),
        })?;

    let stdout = create_output(&job.stdout_path)?;
    let stderr = create_output(&job.stderr_path)?;

    let child_stdout = stdout.try_clone().map_err(|source| SpawnError::Output {
        path: job.stdout_path.clone(),
        source,
    })?;
    let child_stderr = stderr.try_clone().map_err(|source| SpawnError::Output {
        path: job.stderr_path.clone(),
        source,
    })?;

    let child = Command::new(program)
        .args(&args)
        .stdin(Stdio::null())
        .stdout(Stdio::from(child_stdout))
        .stderr(Stdio::from(child_stderr))
        .spawn()
        .map_err(|source| SpawnError::Launch {
            program: program.to_string(),
            source,
        })?;

    debug!("job {} started: {} (pid {:?})", job.id, job.command, child.id());

    Ok(ProcessHandle {
        job_id: job.id.clone(),
        child,
        outputs: Some((stdout, stderr)),
        exit_code: None,
    })
}

fn create_output(path: &Path) -> Result<File, SpawnError> {
    let to_err = |source| SpawnError::Output {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).map_err(to_err)?;
        }
    }
    File::create(path).map_err(to_err)
}

impl ProcessHandle {
    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    /// `block = true` espera la salida; `block = false` devuelve `None` mientras
    /// el proceso siga corriendo.
    pub async fn poll(&mut self, block: bool) -> io::Result<Option<i32>> {
        if block {
            self.wait().await.map(Some)
        } else {
            self.try_poll()
        }
    }

    /// Chequeo sin bloquear.
    pub fn try_poll(&mut self) -> io::Result<Option<i32>> {
        if let Some(code) = self.exit_code {
            return Ok(Some(code));
        }
        match self.child.try_wait()? {
            Some(status) => Ok(Some(self.finish(status))),
            None => Ok(None),
        }
    }

    /// Espera la salida. Cancel-safe: descartar el future deja el handle
    /// usable, así que puede ir en una rama de `select!`.
    pub async fn wait(&mut self) -> io::Result<i32> {
        if let Some(code) = self.exit_code {
            return Ok(code);
        }
        let status = self.child.wait().await?;
        Ok(self.finish(status))
    }

    pub fn outputs_open(&self) -> bool {
        self.outputs.is_some()
    }

    fn finish(&mut self, status: ExitStatus) -> i32 {
        let code = exit_code(status);
        // solo la primera salida observada cierra los archivos
        if let Some((stdout, stderr)) = self.outputs.take() {
            drop(stdout);
            drop(stderr);
        }
        self.exit_code = Some(code);
        code
    }
}

fn exit_code(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return -signal;
        }
    }
    -1
}

/// Corre un job hasta el final. Los errores de spawn y de espera se vuelven
/// `ExecutionResult::Failed` y el job igual se reporta como hecho.
pub async fn execute(job: &JobDescriptor) -> ExecutionResult {
    let mut handle = match spawn(job) {
        Ok(h) => h,
        Err(e) => {
            return ExecutionResult::Failed {
                reason: e.to_string(),
            }
        }
    };
    match handle.wait().await {
        Ok(code) => ExecutionResult::Exited { code },
        Err(e) => ExecutionResult::Failed {
            reason: format!("wait failed: {}", e),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::CommandLine;

    fn job(dir: &Path, id: &str, command: CommandLine) -> JobDescriptor {
        JobDescriptor {
            id: id.to_string(),
            command,
            stdout_path: dir.join(format!("{}.out", id)),
            stderr_path: dir.join(format!("{}.err", id)),
        }
    }

    fn argv(parts: &[&str]) -> CommandLine {
        CommandLine::Argv(parts.iter().map(|s| s.to_string()).collect())
    }

    #[tokio::test]
    async fn exit_codes_are_reported() {
        let tmp = tempfile::tempdir().unwrap();

        let ok = execute(&job(tmp.path(), "ok", argv(&["true"]))).await;
        assert_eq!(ok, ExecutionResult::Exited { code: 0 });
        assert!(ok.is_success());

        let bad = execute(&job(tmp.path(), "bad", argv(&["false"]))).await;
        assert_eq!(bad.exit_code(), Some(1));

        let shell = execute(&job(tmp.path(), "sh", CommandLine::Shell("exit 3".into()))).await;
        assert_eq!(shell.exit_code(), Some(3));
    }

    #[tokio::test]
    async fn streams_are_redirected_and_truncated() {
        let tmp = tempfile::tempdir().unwrap();
        let j = job(
            tmp.path(),
            "echo",
            CommandLine::Shell("echo hello; echo oops >&2".into()),
        );
        fs::write(&j.stdout_path, "stale content that must go away\n").unwrap();

        let result = execute(&j).await;
        assert!(result.is_success());
        assert_eq!(fs::read_to_string(&j.stdout_path).unwrap(), "hello\n");
        assert_eq!(fs::read_to_string(&j.stderr_path).unwrap(), "oops\n");
    }

    #[tokio::test]
    async fn missing_binary_is_a_spawn_failure() {
        let tmp = tempfile::tempdir().unwrap();
        let j = job(tmp.path(), "missing", argv(&["/definitely/not/a/binary"]));

        match spawn(&j) {
            Err(SpawnError::Launch { program, .. }) => {
                assert_eq!(program, "/definitely/not/a/binary")
            }
            other => panic!("expected launch failure, got {:?}", other),
        }

        let result = execute(&j).await;
        assert!(matches!(result, ExecutionResult::Failed { .. }));
        assert_eq!(result.exit_code(), None);
    }

    #[tokio::test]
    async fn non_blocking_poll_then_blocking_poll() {
        let tmp = tempfile::tempdir().unwrap();
        let mut handle = spawn(&job(tmp.path(), "sleep", argv(&["sleep", "1"]))).unwrap();

        assert_eq!(handle.poll(false).await.unwrap(), None);
        assert!(handle.outputs_open());

        assert_eq!(handle.poll(true).await.unwrap(), Some(0));
        assert!(!handle.outputs_open());

        // polls repetidos siguen respondiendo sin tocar los archivos
        assert_eq!(handle.poll(false).await.unwrap(), Some(0));
        assert_eq!(handle.wait().await.unwrap(), 0);
        assert_eq!(handle.job_id(), "sleep");
    }

    #[tokio::test]
    async fn output_directories_are_created() {
        let tmp = tempfile::tempdir().unwrap();
        let j = JobDescriptor {
            id: "nested".into(),
            command: argv(&["true"]),
            stdout_path: tmp.path().join("a/b/out.txt"),
            stderr_path: tmp.path().join("a/c/err.txt"),
        };
        assert!(execute(&j).await.is_success());
        assert!(j.stdout_path.exists());
        assert!(j.stderr_path.exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn signal_death_is_negative() {
        let tmp = tempfile::tempdir().unwrap();
        let result = execute(&job(tmp.path(), "kill", CommandLine::Shell("kill -9 $$".into()))).await;
        assert_eq!(result.exit_code(), Some(-9));
    }
}
