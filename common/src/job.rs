use serde::{Deserialize, Deserializer, Serialize};
use std::{
    collections::HashSet,
    fs,
    path::{Path, PathBuf},
};

use crate::error::ManifestError;

/// Identificador opaco del job, estable entre corridas. Los ids numéricos del
/// manifiesto se normalizan a su texto decimal.
pub type JobId = String;

/// Cómo se lanza un job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CommandLine {
    /// Se ejecuta directo, el primer elemento es el programa
    Argv(Vec<String>),
    /// Se pasa a `sh -c`
    Shell(String),
}

impl CommandLine {
    /// Programa y argumentos, o `None` si el vector de argumentos está vacío.
    pub fn program_and_args(&self) -> Option<(&str, Vec<&str>)> {
        match self {
            CommandLine::Argv(argv) => {
                let (program, args) = argv.split_first()?;
                Some((program.as_str(), args.iter().map(String::as_str).collect()))
            }
            CommandLine::Shell(line) => Some(("sh", vec!["-c", line.as_str()])),
        }
    }
}

impl std::fmt::Display for CommandLine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CommandLine::Argv(argv) => write!(f, "{}", argv.join(" ")),
            CommandLine::Shell(line) => write!(f, "sh -c '{}'", line),
        }
    }
}

/// Una unidad de trabajo: identidad más receta de ejecución.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobDescriptor {
    #[serde(alias = "tid", deserialize_with = "deserialize_job_id")]
    pub id: JobId,

    #[serde(alias = "cmd")]
    pub command: CommandLine,

    /// Se crea (o trunca) justo antes de arrancar el comando
    #[serde(rename = "stdout")]
    pub stdout_path: PathBuf,

    #[serde(rename = "stderr")]
    pub stderr_path: PathBuf,
}

fn deserialize_job_id<'de, D>(deserializer: D) -> Result<JobId, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawId {
        Text(String),
        Number(serde_json::Number),
    }

    Ok(match RawId::deserialize(deserializer)? {
        RawId::Text(s) => s,
        RawId::Number(n) => n.to_string(),
    })
}

/// Lista ordenada y de solo lectura con los jobs de una corrida.
#[derive(Debug, Clone)]
pub struct Manifest {
    path: PathBuf,
    jobs: Vec<JobDescriptor>,
}

impl Manifest {
    /// Lee un arreglo JSON de descriptores de job desde `path`.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ManifestError> {
        let path = path.as_ref().to_path_buf();
        let raw = fs::read_to_string(&path).map_err(|source| ManifestError::Read {
            path: path.clone(),
            source,
        })?;
        let jobs: Vec<JobDescriptor> =
            serde_json::from_str(&raw).map_err(|source| ManifestError::Parse {
                path: path.clone(),
                source,
            })?;
        Self::new(path, jobs)
    }

    /// Valida `jobs` y resuelve las rutas de salida relativas contra el
    /// directorio de `path`.
    pub fn new(path: impl Into<PathBuf>, jobs: Vec<JobDescriptor>) -> Result<Self, ManifestError> {
        let path = path.into();
        let dir = manifest_dir(&path);

        let mut seen = HashSet::with_capacity(jobs.len());
        let mut resolved = Vec::with_capacity(jobs.len());
        for mut job in jobs {
            if !seen.insert(job.id.clone()) {
                return Err(ManifestError::DuplicateId(job.id));
            }
            if job.command.program_and_args().is_none() {
                return Err(ManifestError::EmptyCommand(job.id));
            }
            if job.stdout_path.is_relative() {
                job.stdout_path = dir.join(&job.stdout_path);
            }
            if job.stderr_path.is_relative() {
                job.stderr_path = dir.join(&job.stderr_path);
            }
            resolved.push(job);
        }

        Ok(Self {
            path,
            jobs: resolved,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Directorio del manifiesto; el checkpoint vive aquí también.
    pub fn directory(&self) -> PathBuf {
        manifest_dir(&self.path)
    }

    pub fn jobs(&self) -> &[JobDescriptor] {
        &self.jobs
    }

    pub fn get(&self, index: usize) -> Option<&JobDescriptor> {
        self.jobs.get(index)
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }
}

fn manifest_dir(path: &Path) -> PathBuf {
    match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_manifest(dir: &Path, body: &str) -> PathBuf {
        let path = dir.join("jobs.json");
        fs::write(&path, body).unwrap();
        path
    }

    #[test]
    fn load_accepts_both_field_spellings_and_numeric_ids() {
        let tmp = tempfile::tempdir().unwrap();
        let path = write_manifest(
            tmp.path(),
            r#"[
                {"tid": 7, "cmd": ["echo", "hi"], "stdout": "/tmp/a.out", "stderr": "/tmp/a.err"},
                {"id": "b", "command": "echo $HOME", "stdout": "b.out", "stderr": "logs/b.err"}
            ]"#,
        );

        let manifest = Manifest::load(&path).unwrap();
        assert_eq!(manifest.len(), 2);

        let first = manifest.get(0).unwrap();
        assert_eq!(first.id, "7");
        assert_eq!(
            first.command,
            CommandLine::Argv(vec!["echo".into(), "hi".into()])
        );
        assert_eq!(first.stdout_path, PathBuf::from("/tmp/a.out"));

        let second = manifest.get(1).unwrap();
        assert_eq!(second.command, CommandLine::Shell("echo $HOME".into()));
        assert_eq!(second.stdout_path, tmp.path().join("b.out"));
        assert_eq!(second.stderr_path, tmp.path().join("logs/b.err"));
        assert_eq!(manifest.directory(), tmp.path());
    }

    #[test]
    fn duplicate_ids_are_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let path = write_manifest(
            tmp.path(),
            r#"[
                {"id": 1, "cmd": "true", "stdout": "1.out", "stderr": "1.err"},
                {"id": "1", "cmd": "false", "stdout": "2.out", "stderr": "2.err"}
            ]"#,
        );

        match Manifest::load(&path) {
            Err(ManifestError::DuplicateId(id)) => assert_eq!(id, "1"),
            other => panic!("expected duplicate id error, got {:?}", other),
        }
    }

    #[test]
    fn empty_argv_is_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let path = write_manifest(
            tmp.path(),
            r#"[{"id": "x", "cmd": [], "stdout": "x.out", "stderr": "x.err"}]"#,
        );

        assert!(matches!(
            Manifest::load(&path),
            Err(ManifestError::EmptyCommand(_))
        ));
    }

    #[test]
    fn missing_file_and_bad_json_are_reported() {
        let tmp = tempfile::tempdir().unwrap();
        assert!(matches!(
            Manifest::load(tmp.path().join("nope.json")),
            Err(ManifestError::Read { .. })
        ));

        let path = write_manifest(tmp.path(), "{not json");
        assert!(matches!(
            Manifest::load(&path),
            Err(ManifestError::Parse { .. })
        ));
    }

    #[test]
    fn shell_command_runs_through_sh() {
        let cmd = CommandLine::Shell("exit 3".into());
        let (program, args) = cmd.program_and_args().unwrap();
        assert_eq!(program, "sh");
        assert_eq!(args, vec!["-c", "exit 3"]);

        assert!(CommandLine::Argv(vec![]).program_and_args().is_none());
    }

    #[test]
    fn bare_file_name_resolves_to_current_dir() {
        let manifest = Manifest::new("jobs.json", vec![]).unwrap();
        assert_eq!(manifest.directory(), PathBuf::from("."));
        assert!(manifest.is_empty());
    }
}
