use clap::{Parser, Subcommand, ValueEnum};
use log::{debug, error, info};
use sparsenc::app_config::AppConfig;
use sparsenc::snc::{verify_copy, CodeFamily, DecoderKind, Field};
use sparsenc::{logger, telemetry, Result};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Instant;

#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
#[clap(propagate_version = true)]
struct Cli {
    /// TOML configuration file
    #[clap(short, long, global = true)]
    config: Option<PathBuf>,

    /// Increase log verbosity (-v debug, -vv trace)
    #[clap(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[clap(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Encodes a file, passes every packet through the wire codec and decodes
    /// it again, writing the recovery next to the input
    Roundtrip {
        /// The file to code
        #[clap(required = true)]
        file: PathBuf,

        /// Where to write the recovery (default: <file>.dec.copy)
        #[clap(short, long)]
        output: Option<PathBuf>,

        #[clap(long, value_enum)]
        code: Option<CodeArg>,

        #[clap(long, value_enum)]
        decoder: Option<DecoderArg>,

        #[clap(long, value_enum)]
        field: Option<FieldArg>,

        /// Simulated packet loss probability
        #[clap(long)]
        erasure_rate: Option<f64>,

        /// Decode segments in parallel
        #[clap(long)]
        parallel: bool,
    },
    /// Prints the session metadata derived for a data size
    Info {
        /// Data size in bytes
        #[clap(long, required = true)]
        size: usize,
    },
    /// Prints the effective configuration as TOML
    Config,
    /// Prints process metrics in Prometheus text format
    Metrics,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum CodeArg {
    Rand,
    Band,
    Windwrap,
}

impl From<CodeArg> for CodeFamily {
    fn from(c: CodeArg) -> Self {
        match c {
            CodeArg::Rand => CodeFamily::Random,
            CodeArg::Band => CodeFamily::Band,
            CodeArg::Windwrap => CodeFamily::WindWrap,
        }
    }
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum DecoderArg {
    Gg,
    Oa,
    Bd,
    Cbd,
}

impl From<DecoderArg> for DecoderKind {
    fn from(d: DecoderArg) -> Self {
        match d {
            DecoderArg::Gg => DecoderKind::Gg,
            DecoderArg::Oa => DecoderKind::Oa,
            DecoderArg::Bd => DecoderKind::Bd,
            DecoderArg::Cbd => DecoderKind::Cbd,
        }
    }
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum FieldArg {
    Binary,
    Gf256,
}

impl From<FieldArg> for Field {
    fn from(f: FieldArg) -> Self {
        match f {
            FieldArg::Binary => Field::Binary,
            FieldArg::Gf256 => Field::Gf256,
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    logger::init(logger::level_for(cli.verbose));

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    let mut cfg = match &cli.config {
        Some(path) => AppConfig::from_file(path)?,
        None => AppConfig::default(),
    };

    match cli.command {
        Commands::Roundtrip {
            file,
            output,
            code,
            decoder,
            field,
            erasure_rate,
            parallel,
        } => {
            if let Some(c) = code {
                cfg.session.code = c.into();
            }
            if let Some(d) = decoder {
                cfg.decoder.kind = d.into();
            }
            if let Some(f) = field {
                cfg.session.field = f.into();
            }
            if let Some(rate) = erasure_rate {
                cfg.chunk.erasure_rate = rate;
            }
            cfg.chunk.parallel |= parallel;
            cfg.validate()?;
            let output = output.unwrap_or_else(|| dec_copy_path(&file));
            roundtrip(&cfg, &file, &output)?;
        }
        Commands::Info { size } => {
            cfg.validate()?;
            let params = cfg.session.parameters(size, 0)?;
            let text = serde_json::to_string_pretty(&params.info())
                .map_err(|e| sparsenc::SncError::Config(e.to_string()))?;
            println!("{}", text);
        }
        Commands::Config => {
            print!("{}", cfg.to_toml()?);
        }
        Commands::Metrics => {
            print!("{}", telemetry::gather());
        }
    }
    Ok(())
}

fn dec_copy_path(file: &Path) -> PathBuf {
    let mut name = file.as_os_str().to_owned();
    name.push(".dec.copy");
    PathBuf::from(name)
}

fn roundtrip(cfg: &AppConfig, input: &Path, output: &Path) -> Result<()> {
    info!(
        "{:?} code over {:?}, {:?} decoder: {}",
        cfg.session.code,
        cfg.session.field,
        cfg.decoder.kind,
        input.display()
    );
    let started = Instant::now();
    let report = cfg.driver().run_file(input, output)?;

    for seg in &report.segments {
        println!(
            "segment {:>3}: {:>9} bytes  packets {:>7}  overhead {:.3}  cost {:.3}",
            seg.index, seg.len, seg.packets_sent, seg.overhead, seg.cost
        );
    }

    let digest = verify_copy(input, output)?;
    info!(
        "{} recovered in {:.2?}, sha256 {}",
        output.display(),
        started.elapsed(),
        digest
    );
    debug!("metrics:\n{}", telemetry::gather());
    Ok(())
}
