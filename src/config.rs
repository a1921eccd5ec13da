use std::cmp;
use std::fs;

use crate::args::Args;
use crate::errors::Result;
use crate::log::LogLevel;

/// Runtime configuration. A value of this struct is passed explicitly to
/// the cluster, every peer, and every coordinator flow; nothing reads
/// configuration through a global.
#[derive(Debug, Clone)]
pub struct Config {
    pub num_nodes: usize,
    pub num_tokens: usize,
    pub n: usize,
    pub r: usize,
    pub w: usize,
    pub client_get_timeout_ms: u64,
    pub client_put_timeout_ms: u64,
    pub set_data_timeout_ms: u64,
    /// 1 - info, 2 - verbose with a pinned layout seed, 3 - very verbose
    pub debug_level: u8,
}

#[derive(Deserialize)]
pub struct ConfigFile {
    pub num_nodes: Option<usize>,
    pub num_tokens: Option<usize>,
    pub n: Option<usize>,
    pub r: Option<usize>,
    pub w: Option<usize>,
    pub client_get_timeout_ms: Option<u64>,
    pub client_put_timeout_ms: Option<u64>,
    pub set_data_timeout_ms: Option<u64>,
    pub debug_level: Option<u8>,
}

impl Config {
    pub fn from_file(file: ConfigFile) -> Config {
        let mut base: Config = Default::default();
        if let Some(p) = file.num_nodes {
            base.num_nodes = p
        }
        if let Some(t) = file.num_tokens {
            base.num_tokens = t
        }
        if let Some(n) = file.n {
            base.n = n
        }
        if let Some(r) = file.r {
            base.r = r
        }
        if let Some(w) = file.w {
            base.w = w
        }
        if let Some(t) = file.client_get_timeout_ms {
            base.client_get_timeout_ms = t
        }
        if let Some(t) = file.client_put_timeout_ms {
            base.client_put_timeout_ms = t
        }
        if let Some(t) = file.set_data_timeout_ms {
            base.set_data_timeout_ms = t
        }
        if let Some(d) = file.debug_level {
            base.debug_level = d
        }
        base
    }

    pub fn log_level(&self) -> LogLevel {
        match self.debug_level {
            0 => LogLevel::Error,
            1 => LogLevel::Info,
            2 => LogLevel::Debug,
            _ => LogLevel::Trace,
        }
    }

    /// Layout shuffles are reproducible at verbose debug levels.
    pub fn pinned_seed(&self) -> bool {
        self.debug_level >= 2
    }
}

impl Default for Config {
    fn default() -> Config {
        Config {
            num_nodes: 10,
            num_tokens: 10,
            n: 8,
            r: 3,
            w: 3,
            client_get_timeout_ms: 2000,
            client_put_timeout_ms: 2000,
            set_data_timeout_ms: 1000,
            debug_level: 2,
        }
    }
}

pub fn load(args: &Args) -> Result<Config> {
    match args.config {
        Some(ref path) => {
            let expanded = shellexpand::tilde(path).into_owned();
            let data = fs::read_to_string(&expanded)?;
            let file: ConfigFile = toml::from_str(&data)?;
            Ok(Config::from_file(file))
        }
        None => Ok(Default::default()),
    }
}

/// Sanity checks that do not prevent startup but deserve a warning.
pub fn validate(cfg: &Config) {
    let n = cmp::min(cfg.n, cfg.num_nodes);
    if cfg.r + cfg.w <= n {
        error!(
            "R ({}) + W ({}) <= N ({}): reads are not guaranteed to observe prior writes",
            cfg.r, cfg.w, n
        );
    }
    if cfg.num_tokens < cfg.num_nodes {
        info!(
            "fewer tokens ({}) than peers ({}): some peers will own no data",
            cfg.num_tokens, cfg.num_nodes
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_file_overlay() {
        let file = ConfigFile {
            num_nodes: Some(5),
            num_tokens: None,
            n: Some(3),
            r: None,
            w: None,
            client_get_timeout_ms: None,
            client_put_timeout_ms: Some(500),
            set_data_timeout_ms: None,
            debug_level: None,
        };
        let cfg = Config::from_file(file);
        assert_eq!(cfg.num_nodes, 5);
        assert_eq!(cfg.num_tokens, 10);
        assert_eq!(cfg.n, 3);
        assert_eq!(cfg.client_put_timeout_ms, 500);
        assert_eq!(cfg.set_data_timeout_ms, 1000);
    }

    #[test]
    fn file_parses() {
        let file: ConfigFile = toml::from_str(
            "num_nodes = 3\nnum_tokens = 9\ndebug_level = 1\n",
        )
        .unwrap();
        let cfg = Config::from_file(file);
        assert_eq!(cfg.num_nodes, 3);
        assert_eq!(cfg.num_tokens, 9);
        assert_eq!(cfg.debug_level, 1);
    }
}
