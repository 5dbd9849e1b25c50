use log::info;

use std::{ffi, fs, io, sync::Arc};

use pdk::{
    err_at,
    import::{http::HttpSink, Importer, MemSink, Sink},
    ingest::{self, CollapsingMapper, CsvParser, CsvSource, Indexer, Ingester, JsonParser},
    nexter::RangeAllocator,
    translate, Result,
};

use crate::{config::Config, SubCommand};

pub struct Handle {
    format: String,
    host: Option<String>,
    index: Option<String>,
    subject: Option<String>,
    concurrency: Option<usize>,
    dry_run: bool,
    input: ffi::OsString,
}

impl From<SubCommand> for Handle {
    fn from(subcmd: SubCommand) -> Handle {
        match subcmd {
            SubCommand::Ingest {
                format,
                host,
                index,
                subject,
                concurrency,
                dry_run,
                input,
            } => Handle {
                format,
                host,
                index,
                subject,
                concurrency,
                dry_run,
                input,
            },
            _ => unreachable!(),
        }
    }
}

pub fn handle(h: Handle, mut cfg: Config) -> Result<()> {
    if let Some(host) = h.host.clone() {
        cfg.ingest.host = host;
    }
    if let Some(index) = h.index.clone() {
        cfg.ingest.index = index;
    }
    if let Some(subject) = h.subject.clone() {
        cfg.ingest.subject = Some(subject);
    }
    if let Some(concurrency) = h.concurrency {
        cfg.ingest.concurrency = concurrency;
    }

    let translator = translate::open(cfg.translator.clone())?;

    let res = match h.dry_run {
        true => {
            let sink = Arc::new(MemSink::new());
            let res = run(&h, &cfg, Arc::clone(&translator), Arc::clone(&sink));
            info!(
                target: "pdk",
                "dry run, frames:{:?} fields:{:?}",
                sink.to_frames()?,
                sink.to_fields()?
            );
            res
        }
        false => {
            let sink = HttpSink::new(&cfg.ingest.host, &cfg.ingest.index)?;
            sink.create_index()?;
            run(&h, &cfg, Arc::clone(&translator), Arc::new(sink))
        }
    };

    translator.close()?;
    res
}

fn run<S>(
    h: &Handle,
    cfg: &Config,
    translator: Arc<dyn translate::Translator>,
    sink: Arc<S>,
) -> Result<()>
where
    S: Sink,
{
    let importer = Arc::new(Importer::new(cfg.import.clone(), sink));

    let allocator = Arc::new(RangeAllocator::new(cfg.ingest.shard_width));
    let mut mapper = CollapsingMapper::new(translator, allocator);
    mapper.set_float_scale(cfg.ingest.float_scale);

    let file = {
        let loc = &h.input;
        err_at!(IOError, fs::File::open(loc), "open {:?}", loc)?
    };

    match h.format.as_str() {
        "json" => {
            let source = ingest::LineSource::new(io::BufReader::new(file));
            let mut parser = JsonParser::new();
            if let Some(subject) = cfg.ingest.subject.as_ref() {
                parser.set_subject(subject);
            }
            run_pipeline(cfg, source, parser, mapper, importer)
        }
        "csv" => {
            let source = CsvSource::new(io::BufReader::new(file))?;
            info!(target: "pdk", "csv headers {:?}", source.to_headers());
            let mut parser = CsvParser::new();
            if let Some(subject) = cfg.ingest.subject.as_ref() {
                parser.set_subject(subject);
            }
            parser.set_strings(cfg.ingest.strings.clone());
            run_pipeline(cfg, source, parser, mapper, importer)
        }
        format => err_at!(InvalidInput, msg: "invalid format {:?}", format),
    }
}

fn run_pipeline<S, P, I>(
    cfg: &Config,
    source: S,
    parser: P,
    mapper: CollapsingMapper,
    indexer: Arc<I>,
) -> Result<()>
where
    S: ingest::Source,
    P: ingest::Parser<S::Record>,
    I: Indexer,
{
    let mut ingester = Ingester::new(source, parser, mapper, indexer);
    ingester
        .set_name(&cfg.ingest.index)
        .set_concurrency(cfg.ingest.concurrency);
    ingester.run()?;

    let stats = ingester.to_stats();
    println!("{}", stats);
    Ok(())
}

