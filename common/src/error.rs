//! Tipos de error compartidos por coordinador, workers y CLI.

use std::path::PathBuf;
use thiserror::Error;

use crate::protocol::Rank;

/// Error de más alto nivel de la granja
#[derive(Error, Debug)]
pub enum FarmError {
    #[error("Manifest error: {0}")]
    Manifest(#[from] ManifestError),

    #[error("Checkpoint error: {0}")]
    Checkpoint(#[from] CheckpointError),

    #[error("Spawn error: {0}")]
    Spawn(#[from] SpawnError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Problemas al cargar o validar el manifiesto
#[derive(Error, Debug)]
pub enum ManifestError {
    #[error("Failed to read manifest '{path}': {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse manifest '{path}': {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Duplicate job id '{0}' in manifest")]
    DuplicateId(String),

    #[error("Job '{0}' has an empty command")]
    EmptyCommand(String),
}

#[derive(Error, Debug)]
pub enum CheckpointError {
    #[error("Failed to read checkpoint '{path}': {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Checkpoint '{path}' is corrupt: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to write checkpoint '{path}': {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to serialize checkpoint: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// No se pudo lanzar el comando de un job
#[derive(Error, Debug)]
pub enum SpawnError {
    #[error("Failed to open output file '{path}': {source}")]
    Output {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to launch '{program}': {source}")]
    Launch {
        program: String,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// El otro extremo ya no está
    #[error("Peer {0} disconnected")]
    Disconnected(Rank),

    /// Respuesta a un rank sin request pendiente
    #[error("No pending request from rank {0}")]
    NoPendingRequest(Rank),

    /// Se llamó `recv` pero el coordinador nunca respondió
    #[error("No reply pending from coordinator")]
    NoReply,

    #[error("Unknown rank {0}")]
    UnknownRank(Rank),

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Inbox closed")]
    Closed,
}

/// Alias de Result
pub type Result<T> = std::result::Result<T, FarmError>;

/// Result para operaciones de transporte
pub type TransportResult<T> = std::result::Result<T, TransportError>;
