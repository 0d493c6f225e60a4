//! Reparto estático: el participante `rank` de `size` corre las entradas
//! `rank, rank + size, ...` por su cuenta. Sin coordinador ni checkpoint.

use tracing::{info, warn};

use crate::error::{FarmError, Result};
use crate::job::{JobId, Manifest};
use crate::results::ExecutionResult;
use crate::runner;

/// Índices del manifiesto que le tocan a `rank`.
pub fn assigned_indices(rank: usize, size: usize, len: usize) -> impl Iterator<Item = usize> {
    (rank..len).step_by(size.max(1))
}

/// Corre en secuencia la parte de este participante y devuelve el resultado
/// de cada job en orden de ejecución.
pub async fn run_static(
    manifest: &Manifest,
    rank: u32,
    size: u32,
) -> Result<Vec<(JobId, ExecutionResult)>> {
    if size == 0 || rank >= size {
        return Err(FarmError::Config(format!(
            "rank {} is outside a group of {} participants",
            rank, size
        )));
    }

    let mut results = Vec::new();
    for index in assigned_indices(rank as usize, size as usize, manifest.len()) {
        let Some(job) = manifest.get(index) else {
            break;
        };
        info!("rank {} running job {} ({})", rank, job.id, job.command);
        let result = runner::execute(job).await;
        if !result.is_success() {
            warn!("job {} finished with {}", job.id, result);
        }
        results.push((job.id.clone(), result));
    }
    Ok(results)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::{CommandLine, JobDescriptor};

    #[test]
    fn indices_stride_by_group_size() {
        assert_eq!(assigned_indices(1, 3, 8).collect::<Vec<_>>(), vec![1, 4, 7]);
        assert_eq!(assigned_indices(0, 1, 3).collect::<Vec<_>>(), vec![0, 1, 2]);
        assert_eq!(assigned_indices(5, 6, 3).count(), 0);
    }

    #[test]
    fn every_index_has_exactly_one_owner() {
        let size = 4;
        let mut owners = vec![0; 10];
        for rank in 0..size {
            for i in assigned_indices(rank, size, owners.len()) {
                owners[i] += 1;
            }
        }
        assert!(owners.iter().all(|&n| n == 1));
    }

    #[tokio::test]
    async fn runs_only_this_ranks_share() {
        let tmp = tempfile::tempdir().unwrap();
        let jobs = (0..5)
            .map(|i| JobDescriptor {
                id: i.to_string(),
                command: CommandLine::Shell(format!("exit {}", i)),
                stdout_path: tmp.path().join(format!("{}.out", i)),
                stderr_path: tmp.path().join(format!("{}.err", i)),
            })
            .collect();
        let manifest = Manifest::new(tmp.path().join("jobs.json"), jobs).unwrap();

        let results = run_static(&manifest, 1, 2).await.unwrap();
        let ids: Vec<_> = results.iter().map(|(id, _)| id.as_str()).collect();
        assert_eq!(ids, vec!["1", "3"]);
        assert_eq!(results[1].1.exit_code(), Some(3));
        assert!(!tmp.path().join("0.out").exists());
    }

    #[tokio::test]
    async fn rank_outside_group_is_rejected() {
        let manifest = Manifest::new("jobs.json", vec![]).unwrap();
        assert!(matches!(
            run_static(&manifest, 2, 2).await,
            Err(FarmError::Config(_))
        ));
    }
}
