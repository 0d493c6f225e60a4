// master/src/state.rs

use common::{JobDescriptor, JobId, Manifest, Rank};
use std::collections::{BTreeMap, BTreeSet, VecDeque};

/// Progreso de toda la granja. Solo lo toca el loop del coordinador.
///
/// Un id está en exactamente uno de: sin repartir (manifiesto después del
/// cursor, o la cola de reintento), `in_flight`, `completed`.
#[derive(Debug)]
pub struct RunState {
    manifest: Manifest,
    // próximo índice del manifiesto sin revisar
    cursor: usize,
    // jobs recuperados de un worker que no los terminó
    requeued: VecDeque<JobDescriptor>,
    completed: BTreeSet<JobId>,
    in_flight: BTreeMap<Rank, JobDescriptor>,
    resumed: usize,
}

impl RunState {
    pub fn fresh(manifest: Manifest) -> Self {
        Self::resume(manifest, BTreeSet::new())
    }

    /// Arranca desde un conjunto persistido; esos ids nunca se reparten.
    pub fn resume(manifest: Manifest, completed: BTreeSet<JobId>) -> Self {
        // ids que ya no están en el manifiesto se persisten pero no se cuentan
        let resumed = manifest
            .jobs()
            .iter()
            .filter(|job| completed.contains(&job.id))
            .count();
        Self {
            manifest,
            cursor: 0,
            requeued: VecDeque::new(),
            completed,
            in_flight: BTreeMap::new(),
            resumed,
        }
    }

    /// Próximo job que no está completado ni en vuelo.
    pub fn next_pending(&mut self) -> Option<JobDescriptor> {
        if let Some(job) = self.requeued.pop_front() {
            return Some(job);
        }
        while let Some(job) = self.manifest.get(self.cursor) {
            self.cursor += 1;
            if !self.completed.contains(&job.id) {
                return Some(job.clone());
            }
        }
        None
    }

    /// Registra `job` corriendo en `rank`. Si el rank tenía otro, vuelve a la
    /// cola.
    pub fn assign(&mut self, rank: Rank, job: JobDescriptor) {
        debug_assert!(!self.completed.contains(&job.id));
        if let Some(previous) = self.in_flight.insert(rank, job) {
            self.requeued.push_back(previous);
        }
    }

    /// Pasa el job de `rank` al conjunto completado.
    pub fn complete(&mut self, rank: Rank) -> Option<JobId> {
        let job = self.in_flight.remove(&rank)?;
        self.completed.insert(job.id.clone());
        Some(job.id)
    }

    /// Recupera el job de `rank` sin completarlo.
    pub fn release(&mut self, rank: Rank) -> Option<JobId> {
        let job = self.in_flight.remove(&rank)?;
        let id = job.id.clone();
        self.requeued.push_back(job);
        Some(id)
    }

    /// Devuelve a la cola un job que se sacó pero nunca arrancó.
    pub fn requeue(&mut self, job: JobDescriptor) {
        self.requeued.push_front(job);
    }

    pub fn in_flight_on(&self, rank: Rank) -> Option<&JobId> {
        self.in_flight.get(&rank).map(|job| &job.id)
    }

    pub fn in_flight_ids(&self) -> BTreeMap<Rank, JobId> {
        self.in_flight
            .iter()
            .map(|(rank, job)| (*rank, job.id.clone()))
            .collect()
    }

    pub fn completed(&self) -> &BTreeSet<JobId> {
        &self.completed
    }

    pub fn resumed(&self) -> usize {
        self.resumed
    }

    pub fn total(&self) -> usize {
        self.manifest.len()
    }

    /// No queda nada por repartir.
    pub fn is_drained(&self) -> bool {
        self.requeued.is_empty()
            && self.manifest.jobs()[self.cursor.min(self.manifest.len())..]
                .iter()
                .all(|job| self.completed.contains(&job.id))
    }

    /// Todos los jobs del manifiesto están completos.
    pub fn is_finished(&self) -> bool {
        self.in_flight.is_empty() && self.is_drained()
    }

    /// Jobs del manifiesto completados, sin contar ids viejos del checkpoint.
    pub fn completed_in_manifest(&self) -> usize {
        self.total() - self.unfinished()
    }

    /// Jobs del manifiesto fuera del conjunto completado.
    pub fn unfinished(&self) -> usize {
        self.manifest
            .jobs()
            .iter()
            .filter(|job| !self.completed.contains(&job.id))
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::CommandLine;
    use std::path::PathBuf;

    fn manifest(ids: &[&str]) -> Manifest {
        let jobs = ids
            .iter()
            .map(|id| JobDescriptor {
                id: id.to_string(),
                command: CommandLine::Shell("true".into()),
                stdout_path: PathBuf::from(format!("/tmp/{}.out", id)),
                stderr_path: PathBuf::from(format!("/tmp/{}.err", id)),
            })
            .collect();
        Manifest::new("/tmp/jobs.json", jobs).unwrap()
    }

    fn ids(list: &[&str]) -> BTreeSet<JobId> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn resume_skips_completed_ids() {
        let mut state = RunState::resume(manifest(&["a", "b", "c"]), ids(&["b"]));
        assert_eq!(state.resumed(), 1);

        let handed: Vec<_> = std::iter::from_fn(|| state.next_pending())
            .map(|j| j.id)
            .collect();
        assert_eq!(handed, vec!["a", "c"]);
        assert!(state.is_drained());
    }

    #[test]
    fn complete_moves_job_out_of_flight() {
        let mut state = RunState::fresh(manifest(&["a", "b"]));
        let a = state.next_pending().unwrap();
        state.assign(1, a);
        assert_eq!(state.in_flight_on(1).map(String::as_str), Some("a"));
        assert!(!state.is_finished());

        assert_eq!(state.complete(1).as_deref(), Some("a"));
        assert_eq!(state.in_flight_on(1), None);
        assert!(state.completed().contains("a"));
        assert_eq!(state.complete(1), None);

        let b = state.next_pending().unwrap();
        state.assign(2, b);
        state.complete(2);
        assert!(state.is_finished());
        assert_eq!(state.unfinished(), 0);
    }

    #[test]
    fn released_jobs_are_handed_out_again() {
        let mut state = RunState::fresh(manifest(&["a", "b"]));
        let a = state.next_pending().unwrap();
        state.assign(1, a);

        assert_eq!(state.release(1).as_deref(), Some("a"));
        assert!(!state.is_drained());
        assert_eq!(state.next_pending().unwrap().id, "a");
        assert_eq!(state.next_pending().unwrap().id, "b");
        assert_eq!(state.next_pending(), None);
    }

    #[test]
    fn one_job_per_rank() {
        let mut state = RunState::fresh(manifest(&["a", "b", "c"]));
        let a = state.next_pending().unwrap();
        let b = state.next_pending().unwrap();
        state.assign(1, a);
        state.assign(1, b);

        let in_flight = state.in_flight_ids();
        assert_eq!(in_flight.len(), 1);
        assert_eq!(in_flight.get(&1).map(String::as_str), Some("b"));
        // "a" se desplazó, no se perdió
        assert_eq!(state.next_pending().unwrap().id, "a");
    }

    #[test]
    fn requeue_puts_job_in_front() {
        let mut state = RunState::fresh(manifest(&["a", "b"]));
        let a = state.next_pending().unwrap();
        state.requeue(a);
        assert_eq!(state.next_pending().unwrap().id, "a");
    }

    #[test]
    fn stale_checkpoint_ids_are_not_counted() {
        let state = RunState::resume(manifest(&["a", "b"]), ids(&["a", "gone"]));
        assert_eq!(state.resumed(), 1);
        assert_eq!(state.completed_in_manifest(), 1);
        assert_eq!(state.unfinished(), 1);
        // se sigue persistiendo tal cual
        assert!(state.completed().contains("gone"));
    }

    #[test]
    fn fully_checkpointed_manifest_is_finished_from_the_start() {
        let state = RunState::resume(manifest(&["a", "b"]), ids(&["a", "b"]));
        assert!(state.is_finished());
        assert_eq!(state.total(), 2);
    }
}
