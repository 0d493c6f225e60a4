use serde::{Deserialize, Serialize};

/// Resultado de un job tal como llega al coordinador. Cualquier variante cuenta
/// como completado; el valor se loguea, nunca se persiste.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ExecutionResult {
    /// El proceso terminó. Morir por la señal `n` se reporta como `-n`.
    Exited { code: i32 },
    /// No se pudo lanzar o esperar el proceso
    Failed { reason: String },
}

impl ExecutionResult {
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            ExecutionResult::Exited { code } => Some(*code),
            ExecutionResult::Failed { .. } => None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.exit_code() == Some(0)
    }
}

impl std::fmt::Display for ExecutionResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExecutionResult::Exited { code } => write!(f, "exit code {}", code),
            ExecutionResult::Failed { reason } => write!(f, "failed: {}", reason),
        }
    }
}
