use structopt::StructOpt;

use std::ffi;

use pdk::{util::files, Result};

mod cmd_ingest;
mod cmd_proxy;
mod config;

use config::{Config, TomlConfig};

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: jemallocator::Jemalloc = jemallocator::Jemalloc;

/// Options for cmd
#[derive(StructOpt)]
pub struct Opt {
    #[structopt(long = "toml", help = "Location to config file")]
    toml: Option<ffi::OsString>,

    #[structopt(
        long = "translator",
        help = "Translator backend, one of mem, bucket, batch"
    )]
    translator: Option<String>,

    #[structopt(long = "dir", help = "Location of persisted translator")]
    dir: Option<ffi::OsString>,

    #[structopt(subcommand)]
    subcmd: SubCommand,
}

#[derive(Clone, StructOpt)]
pub enum SubCommand {
    /// Ingest subcommand, to load records from a file into an index.
    Ingest {
        #[structopt(long = "format", default_value = "json")]
        format: String,

        #[structopt(long = "host", help = "Index server, like http://localhost:10101")]
        host: Option<String>,

        #[structopt(long = "index", help = "Index to ingest into")]
        index: Option<String>,

        #[structopt(long = "subject", help = "Property naming the column of a record")]
        subject: Option<String>,

        #[structopt(long = "concurrency")]
        concurrency: Option<usize>,

        #[structopt(long = "dry-run", help = "Map records without importing them")]
        dry_run: bool,

        input: ffi::OsString,
    },
    /// Proxy subcommand, to serve queries translating results back to values.
    Proxy {
        #[structopt(long = "bind", help = "Address to listen on")]
        bind: Option<String>,

        #[structopt(long = "upstream", help = "Index server, like http://localhost:10101")]
        upstream: Option<String>,
    },
}

fn main() {
    let filter = match tracing_subscriber::EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => tracing_subscriber::EnvFilter::new("pdk=info"),
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let opts = Opt::from_iter(std::env::args_os());

    let res = handle(opts);
    res.map_err(|e| println!("Error: {}", e)).ok();
}

fn handle(opts: Opt) -> Result<()> {
    let mut cfg: Config = {
        let loc_toml = files::find_config(opts.toml.clone(), &["pdk.toml", ".pdk.toml"]);
        match loc_toml.as_ref() {
            Some(loc_toml) => files::load_toml::<_, TomlConfig>(loc_toml)?.into(),
            None => Config::default(),
        }
    };

    if let Some(kind) = opts.translator.as_ref() {
        cfg.translator.kind = kind.parse()?;
    }
    if let Some(dir) = opts.dir.as_ref() {
        cfg.translator.dir = dir.clone();
    }

    match opts.subcmd {
        c @ SubCommand::Ingest { .. } => cmd_ingest::handle(cmd_ingest::Handle::from(c), cfg),
        c @ SubCommand::Proxy { .. } => cmd_proxy::handle(cmd_proxy::Handle::from(c), cfg),
    }
}
