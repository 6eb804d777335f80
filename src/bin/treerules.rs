//! Command-line front end
//!
//! ```text
//! treerules fr_gsd.conllu 'e:X->Y; X[upos=VERB]; Y[upos=NOUN]' 'X.Number = Y.Number' 'e.label; Y.upos'
//! ```

use clap::Parser;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use treerules::config::ConfigError;
use treerules::report::{PValueStyle, write_report};
use treerules::{
    EngineKind, ExtractionConfig, ExtractionError, GrewCli, NativeEngine, QueryEngine, Strategy,
    Treebank, extract,
};

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

/// Extraction of grammar rules from a treebank
#[derive(Parser)]
#[command(name = "treerules", version, about, long_about = None)]
struct Cli {
    /// CoNLL-U treebank (plain or .gz)
    treebank: Option<PathBuf>,

    /// Base pattern P1
    p1: Option<String>,

    /// Outcome pattern P2
    p2: Option<String>,

    /// Predictors P3: `;`-separated clauses or key references like `X.upos`
    p3: Option<String>,

    /// Score every non-empty combination of predictors
    #[arg(short, long)]
    all: bool,

    /// Query engine
    #[arg(long, value_enum)]
    engine: Option<EngineKind>,

    /// Path to the grew executable
    #[arg(long, env = "GREW_BINARY")]
    grew_binary: Option<PathBuf>,

    /// Corpus passed to grew (defaults to the treebank)
    #[arg(long)]
    corpus: Option<PathBuf>,

    /// JSON configuration file; other flags override it
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Candidate generation for key references
    #[arg(long, value_enum)]
    strategy: Option<Strategy>,

    /// Keep rules dominated by one of their supersets
    #[arg(long)]
    no_prune: bool,

    /// Decide P2 per match of P1 and count from the matches alone
    #[arg(long)]
    local_outcome: bool,

    /// Print the significance (number of leading zeros) instead of the p-value
    #[arg(long)]
    compact: bool,

    /// Output file (defaults to stdout)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Log level
    #[arg(long, env = "TREERULES_LOG", default_value = "info")]
    log_level: String,
}

impl Cli {
    fn into_config(self) -> Result<(ExtractionConfig, Option<PathBuf>, bool), ConfigError> {
        let mut config = match &self.config {
            Some(path) => ExtractionConfig::from_file(path)?,
            None => ExtractionConfig::default(),
        };

        if let Some(path) = self.treebank {
            config.treebank_path = Some(path);
        }
        if let Some(p1) = self.p1 {
            config.base = p1;
        }
        if let Some(p2) = self.p2 {
            config.outcome = p2;
        }
        if let Some(p3) = self.p3 {
            config.predictors = p3;
        }
        if self.all {
            config.exhaustive = true;
        }
        if let Some(engine) = self.engine {
            config.engine = engine;
        }
        if let Some(binary) = self.grew_binary {
            config.grew_binary = binary;
        }
        if let Some(corpus) = self.corpus {
            config.corpus = Some(corpus);
        }
        if let Some(strategy) = self.strategy {
            config.strategy = strategy;
        }
        if self.no_prune {
            config.prune = false;
        }
        if self.local_outcome {
            config.local_outcome = true;
        }

        config.validate()?;
        Ok((config, self.output, self.compact))
    }
}

fn run(cli: Cli) -> Result<(), ExtractionError> {
    let (config, output, compact) = cli.into_config()?;
    let treebank_path = config
        .treebank_path
        .clone()
        .ok_or(ConfigError::Missing("treebank"))?;
    let treebank = Treebank::from_file(&treebank_path)?;

    let native;
    let grew;
    let engine: &dyn QueryEngine = match config.engine {
        EngineKind::Native => {
            native = NativeEngine::new(&treebank);
            &native
        }
        EngineKind::Grew => {
            let corpus = config.grew_corpus().unwrap_or(&treebank_path);
            grew = GrewCli::new(&config.grew_binary, corpus);
            tracing::info!(corpus = %grew.corpus().display(), "querying grew");
            &grew
        }
    };

    let extraction = extract(engine, &treebank, &config)?;

    let style = if compact {
        PValueStyle::Significance
    } else {
        PValueStyle::Raw
    };
    let mut out: Box<dyn Write> = match output {
        Some(path) => Box::new(BufWriter::new(File::create(path)?)),
        None => Box::new(BufWriter::new(io::stdout().lock())),
    };
    write_report(&mut out, &extraction, style)?;
    out.flush()?;
    Ok(())
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| cli.log_level.clone().into());
    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!("{err}");
            ExitCode::FAILURE
        }
    }
}
