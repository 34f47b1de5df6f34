mod report;

use anyhow::{Context, Error, bail};
use clap::{Args, Parser, Subcommand, ValueEnum};
use log::debug;
use matmask::mask::DEFAULT_MAX_ATTEMPTS;
use matmask::party::{CriteriaParty, DataParty, ProtocolParams, Threshold, run_local};
use matmask::table::{DEFAULT_DELIMITER, LabeledTable, read_table};
use matmask::transport::{Deadline, Phase, TcpTransport};
use report::DecisionReport;

use std::path::{Path, PathBuf};
use std::time::Duration;

/// Computes pass/fail decisions `S·W >= T` between a data holder and a criteria holder
/// without either side revealing its matrix.
#[derive(Debug, Parser)]
#[command(name = "matmask", version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Holds the weights and thresholds and waits for the data party to connect.
    #[command(arg_required_else_help = true)]
    Criteria {
        /// Address to listen on.
        #[arg(long, default_value = "127.0.0.1:7878")]
        listen: String,
        /// Weights table: one row per score column, one column per criterion.
        #[arg(long)]
        weights: PathBuf,
        /// Thresholds table; only its first data row is used.
        #[arg(long)]
        thresholds: PathBuf,
        /// Number of subjects the data party will send.
        #[arg(long)]
        subjects: usize,
        #[command(flatten)]
        run: RunArgs,
    },
    /// Holds the scores, generates the mask and connects to the criteria party.
    #[command(arg_required_else_help = true)]
    Data {
        /// Address of the listening criteria party.
        #[arg(long, default_value = "127.0.0.1:7878")]
        connect: String,
        /// Scores table: one row per subject.
        #[arg(long)]
        scores: PathBuf,
        /// Number of criteria the criteria party holds.
        #[arg(long)]
        criteria: usize,
        #[command(flatten)]
        run: RunArgs,
    },
    /// Runs both parties in this process, mostly for trying things out.
    #[command(arg_required_else_help = true)]
    Local {
        #[arg(long)]
        scores: PathBuf,
        #[arg(long)]
        weights: PathBuf,
        #[arg(long)]
        thresholds: PathBuf,
        #[command(flatten)]
        run: RunArgs,
    },
}

#[derive(Debug, Args)]
struct RunArgs {
    /// Mask dimension; defaults to the width of the scores (or height of the weights).
    #[arg(long)]
    mask_dimension: Option<usize>,
    #[arg(long, default_value_t = DEFAULT_MAX_ATTEMPTS)]
    max_mask_attempts: usize,
    /// Seconds to wait for each table; 0 waits forever.
    #[arg(long, default_value_t = 600)]
    timeout_secs: u64,
    /// Cell delimiter of the input tables.
    #[arg(long, default_value_t = DEFAULT_DELIMITER)]
    delimiter: char,
    /// Labels for the decision columns, comma separated.
    #[arg(long, value_delimiter = ',')]
    criteria_labels: Option<Vec<String>>,
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    format: OutputFormat,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

impl RunArgs {
    fn params(
        &self,
        table_dimension: usize,
        subjects: usize,
        criteria: usize,
    ) -> Result<ProtocolParams, Error> {
        let mask_dimension = self.mask_dimension.unwrap_or(table_dimension);
        let params = ProtocolParams::try_with(mask_dimension, subjects, criteria)?
            .with_max_mask_attempts(self.max_mask_attempts)
            .with_round_timeout(self.timeout());
        Ok(params)
    }

    fn timeout(&self) -> Option<Duration> {
        (self.timeout_secs > 0).then(|| Duration::from_secs(self.timeout_secs))
    }

    /// Bounds connection setup by the same timeout as a single round.
    fn deadline(&self) -> Deadline {
        Deadline::from_timeout(self.timeout())
    }

    fn read(&self, path: &Path) -> Result<LabeledTable, Error> {
        read_table(path, self.delimiter).with_context(|| format!("reading {}", path.display()))
    }

    fn print(&self, report: &DecisionReport) -> Result<(), Error> {
        match self.format {
            OutputFormat::Text => println!("{}", report),
            OutputFormat::Json => println!("{}", serde_json::to_string_pretty(report)?),
        }
        Ok(())
    }
}

fn main() -> Result<(), Error> {
    // Log to stderr (if you run with `RUST_LOG=debug`).
    env_logger::init();

    let args = Cli::parse();
    match args.command {
        Commands::Criteria {
            listen,
            weights,
            thresholds,
            subjects,
            run,
        } => {
            let weights = run.read(&weights)?;
            let threshold = Threshold::from_table(&run.read(&thresholds)?)?;
            let params = run.params(weights.values.rows(), subjects, weights.values.cols())?;

            let mut transport = TcpTransport::listen(&listen, Phase::Mask, &run.deadline())
                .with_context(|| format!("waiting for the data party on {}", listen))?;
            let mut party = CriteriaParty::try_with(params, weights.values, threshold)?;
            let decision = party.run(&mut transport).context("criteria party run")?;

            let labels = run.criteria_labels.clone().or(Some(weights.column_labels));
            run.print(&DecisionReport::new("criteria", &decision, None, labels))
        }
        Commands::Data {
            connect,
            scores,
            criteria,
            run,
        } => {
            let scores = run.read(&scores)?;
            let params = run.params(scores.values.cols(), scores.values.rows(), criteria)?;

            let mut transport = TcpTransport::connect(&connect, Phase::Mask, &run.deadline())
                .with_context(|| format!("connecting to the criteria party at {}", connect))?;
            let mut party = DataParty::try_with(params, scores.values)?;
            let decision = party.run(&mut transport).context("data party run")?;

            run.print(&DecisionReport::new(
                "data",
                &decision,
                Some(scores.row_labels),
                run.criteria_labels.clone(),
            ))
        }
        Commands::Local {
            scores,
            weights,
            thresholds,
            run,
        } => {
            let scores = run.read(&scores)?;
            let weights = run.read(&weights)?;
            let threshold = Threshold::from_table(&run.read(&thresholds)?)?;
            if scores.values.cols() != weights.values.rows() {
                bail!(
                    "scores have {} columns but weights have {} rows",
                    scores.values.cols(),
                    weights.values.rows()
                );
            }
            let params = run.params(
                scores.values.cols(),
                scores.values.rows(),
                weights.values.cols(),
            )?;

            let outcome = run_local(params, scores.values, weights.values, threshold)
                .context("local run")?;
            debug!("Recombined product:\n{}", outcome.product);

            let labels = run.criteria_labels.clone().or(Some(weights.column_labels));
            run.print(&DecisionReport::new(
                "local",
                &outcome.decision,
                Some(scores.row_labels),
                labels,
            ))
        }
    }
}
