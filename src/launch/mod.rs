//! Distributed launch environment
//!
//! Rank and world-size parameters are consumed verbatim from the
//! environment a launcher sets; this layer never spawns processes.

use std::env;

/// Process placement as declared by the launcher environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DistributedEnv {
    pub rank: usize,
    pub local_rank: usize,
    pub world_size: usize,
    pub master_addr: String,
    pub master_port: u16,
}

impl DistributedEnv {
    /// Single-process defaults.
    pub fn single_process() -> Self {
        Self {
            rank: 0,
            local_rank: 0,
            world_size: 1,
            master_addr: "localhost".to_string(),
            master_port: 29500,
        }
    }

    /// Read `RANK`, `LOCAL_RANK`, `WORLD_SIZE`, `MASTER_ADDR` and
    /// `MASTER_PORT`, falling back to single-process defaults for any
    /// variable that is unset or unparsable.
    pub fn from_env() -> Self {
        let defaults = Self::single_process();
        Self {
            rank: env_parse("RANK").unwrap_or(defaults.rank),
            local_rank: env_parse("LOCAL_RANK").unwrap_or(defaults.local_rank),
            world_size: env_parse("WORLD_SIZE").unwrap_or(defaults.world_size),
            master_addr: env::var("MASTER_ADDR").unwrap_or(defaults.master_addr),
            master_port: env_parse("MASTER_PORT").unwrap_or(defaults.master_port),
        }
    }

    pub fn is_main_process(&self) -> bool {
        self.rank == 0
    }
}

impl Default for DistributedEnv {
    fn default() -> Self {
        Self::single_process()
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|value| value.parse().ok())
}
