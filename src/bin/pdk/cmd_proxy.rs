use log::{info, warn};

use std::sync::Arc;

use pdk::{
    err_at,
    proxy::{self, HttpUpstream, Proxy},
    translate, Result,
};

use crate::{config::Config, SubCommand};

pub struct Handle {
    bind: Option<String>,
    upstream: Option<String>,
}

impl From<SubCommand> for Handle {
    fn from(subcmd: SubCommand) -> Handle {
        match subcmd {
            SubCommand::Proxy { bind, upstream } => Handle { bind, upstream },
            _ => unreachable!(),
        }
    }
}

pub fn handle(h: Handle, mut cfg: Config) -> Result<()> {
    if let Some(bind) = h.bind {
        cfg.proxy.bind = bind;
    }
    if let Some(upstream) = h.upstream {
        cfg.proxy.upstream = upstream;
    }

    let translator = translate::open(cfg.translator.clone())?;
    info!(target: "pdk", "translator frames {:?}", translator.to_frames()?);

    let upstream = HttpUpstream::new(&cfg.proxy.upstream)?;
    let proxy = Arc::new(Proxy::new(upstream, Arc::clone(&translator))?);

    let rt = err_at!(IOError, tokio::runtime::Runtime::new())?;
    let res = rt.block_on(async {
        let listener = err_at!(
            IOError,
            tokio::net::TcpListener::bind(&cfg.proxy.bind).await,
            "bind {:?}",
            cfg.proxy.bind
        )?;
        proxy::serve(listener, proxy, shutdown_signal()).await
    });

    translator.close()?;
    res
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!(target: "pdk", "received ctrl-c, shutting down"),
        Err(err) => {
            warn!(target: "pdk", "ctrl-c handler: {}", err);
            std::future::pending::<()>().await
        }
    }
}
