use serde::Deserialize;

use std::{path, time};

use pdk::{import, nexter, translate};

#[derive(Clone)]
pub struct Config {
    pub translator: translate::Config,
    pub import: import::Config,
    pub ingest: Ingest,
    pub proxy: Proxy,
}

#[derive(Clone)]
pub struct Ingest {
    pub host: String,
    pub index: String,
    pub subject: Option<String>,
    pub strings: Vec<String>,
    pub concurrency: usize,
    pub shard_width: u64,
    pub float_scale: f64,
}

#[derive(Clone)]
pub struct Proxy {
    pub bind: String,
    pub upstream: String,
}

impl Default for Config {
    fn default() -> Config {
        TomlConfig::default().into()
    }
}

#[derive(Clone, Default, Deserialize)]
pub struct TomlConfig {
    translator: Option<TomlTranslator>,
    import: Option<TomlImport>,
    ingest: Option<TomlIngest>,
    proxy: Option<TomlProxy>,
}

#[derive(Clone, Default, Deserialize)]
pub struct TomlTranslator {
    kind: Option<translate::Kind>,
    dir: Option<path::PathBuf>,
    frames: Option<Vec<String>>,
    buckets: Option<usize>,
    map_size: Option<usize>,
    batch_size: Option<usize>,
    fsync: Option<bool>,
}

#[derive(Clone, Default, Deserialize)]
pub struct TomlImport {
    chan_size: Option<usize>,
    batch_size: Option<usize>,
    retries: Option<usize>,
    backoff_ms: Option<u64>,
}

#[derive(Clone, Default, Deserialize)]
pub struct TomlIngest {
    host: Option<String>,
    index: Option<String>,
    subject: Option<String>,
    strings: Option<Vec<String>>,
    concurrency: Option<usize>,
    shard_width: Option<u64>,
    float_scale: Option<f64>,
}

#[derive(Clone, Default, Deserialize)]
pub struct TomlProxy {
    bind: Option<String>,
    upstream: Option<String>,
}

impl From<TomlConfig> for Config {
    fn from(cfg: TomlConfig) -> Config {
        Config {
            translator: cfg.translator.unwrap_or_default().into(),
            import: cfg.import.unwrap_or_default().into(),
            ingest: cfg.ingest.unwrap_or_default().into(),
            proxy: cfg.proxy.unwrap_or_default().into(),
        }
    }
}

impl From<TomlTranslator> for translate::Config {
    fn from(cfg: TomlTranslator) -> translate::Config {
        let dir = cfg.dir.unwrap_or_else(|| "pdk-data".into());
        let kind = cfg.kind.unwrap_or(translate::Kind::Bucket);

        let mut config = translate::Config::new(dir.as_os_str(), kind);
        config
            .set_frames(cfg.frames.unwrap_or_default())
            .set_buckets(cfg.buckets.unwrap_or(translate::BUCKETS))
            .set_map_size(cfg.map_size.unwrap_or(translate::MAP_SIZE))
            .set_batch_size(cfg.batch_size.unwrap_or(translate::BATCH_SIZE))
            .set_fsync(cfg.fsync.unwrap_or(true));
        config
    }
}

impl From<TomlImport> for import::Config {
    fn from(cfg: TomlImport) -> import::Config {
        let backoff = match cfg.backoff_ms {
            Some(ms) => time::Duration::from_millis(ms),
            None => import::BACKOFF,
        };

        let mut config = import::Config::new();
        config
            .set_chan_size(cfg.chan_size.unwrap_or(import::CHAN_SIZE))
            .set_batch_size(cfg.batch_size.unwrap_or(import::BATCH_SIZE))
            .set_retries(cfg.retries.unwrap_or(import::RETRIES))
            .set_backoff(backoff);
        config
    }
}

impl From<TomlIngest> for Ingest {
    fn from(cfg: TomlIngest) -> Ingest {
        Ingest {
            host: cfg.host.unwrap_or_else(|| "http://localhost:10101".to_string()),
            index: cfg.index.unwrap_or_else(|| "pdk".to_string()),
            subject: cfg.subject,
            strings: cfg.strings.unwrap_or_default(),
            concurrency: cfg.concurrency.unwrap_or_else(num_cpus::get),
            shard_width: cfg.shard_width.unwrap_or(nexter::SHARD_WIDTH),
            float_scale: cfg.float_scale.unwrap_or(1.0),
        }
    }
}

impl From<TomlProxy> for Proxy {
    fn from(cfg: TomlProxy) -> Proxy {
        Proxy {
            bind: cfg.bind.unwrap_or_else(|| "127.0.0.1:13131".to_string()),
            upstream: cfg
                .upstream
                .unwrap_or_else(|| "http://localhost:10101".to_string()),
        }
    }
}
