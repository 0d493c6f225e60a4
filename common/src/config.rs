//! Lecturas de entorno compartidas por los binarios.
//!
//! Los lanzadores (aprun, mpirun, srun) exportan el rank y la cantidad de
//! participantes con sus propios nombres de variable; `FARM_*` siempre gana.

use std::{env, str::FromStr};

use crate::protocol::Rank;

pub const DEFAULT_LISTEN_ADDR: &str = "0.0.0.0:8080";
pub const DEFAULT_MASTER_URL: &str = "http://localhost:8080";

pub const RANK_ENV_VARS: &[&str] = &[
    "FARM_RANK",
    "PMI_RANK",
    "OMPI_COMM_WORLD_RANK",
    "ALPS_APP_PE",
    "SLURM_PROCID",
];

pub const SIZE_ENV_VARS: &[&str] = &[
    "FARM_SIZE",
    "PMI_SIZE",
    "OMPI_COMM_WORLD_SIZE",
    "SLURM_NTASKS",
];

/// Valor parseado de `name`; `None` si no está o no parsea.
pub fn env_parse<T: FromStr>(name: &str) -> Option<T> {
    env::var(name).ok().and_then(|s| s.trim().parse::<T>().ok())
}

pub fn env_or<T: FromStr>(name: &str, default: T) -> T {
    env_parse(name).unwrap_or(default)
}

/// Primera variable de `names` con un valor parseable.
pub fn first_env<T: FromStr>(names: &[&'static str]) -> Option<(&'static str, T)> {
    names
        .iter()
        .find_map(|name| env_parse(name).map(|value| (*name, value)))
}

/// Interruptor booleano: `0`, `false`, `no` y `off` son falso; cualquier otro
/// valor definido es verdadero.
pub fn env_flag(name: &str, default: bool) -> bool {
    match env::var(name) {
        Ok(v) => !matches!(
            v.trim().to_ascii_lowercase().as_str(),
            "0" | "false" | "no" | "off"
        ),
        Err(_) => default,
    }
}

pub fn rank_from_env() -> Option<Rank> {
    first_env(RANK_ENV_VARS).map(|(_, rank)| rank)
}

pub fn size_from_env() -> Option<u32> {
    first_env(SIZE_ENV_VARS).map(|(_, size)| size)
}

/// URL base del coordinador: `MASTER_URL`, o localhost para pruebas locales.
pub fn master_base_url() -> String {
    env::var("MASTER_URL").unwrap_or_else(|_| DEFAULT_MASTER_URL.to_string())
}
