// -----------------------------------------------------------------------------
// startup-bench - container cold/warm startup latency benchmark for ECS
// -----------------------------------------------------------------------------

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tokio::runtime::Builder as RtBuilder;
use tracing::{info, warn};

use startup_bench::config::BenchConfig;
use startup_bench::ec2::{self, InstanceControl};
use startup_bench::fargate;
use startup_bench::infra::{self, StackOutputs};
use startup_bench::logging;
use startup_bench::results_dir::ResultsDir;
use startup_bench::scheduler::EcsScheduler;
use startup_bench::scheduler_cli::CliScheduler;

// -----------------------------------------------------------------------------
// CLI definition
// -----------------------------------------------------------------------------
#[derive(Parser)]
#[command(
    name = "startup-bench",
    version,
    about = "Measures container cold vs warm startup latency on ECS (EC2 and Fargate)"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbose output (-v for debug, -vv for trace, -vvv for trace with AWS debug)
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count)]
    verbose: u8,

    /// Optional YAML config overriding the built-in defaults
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Base directory for the per-run results directory
    #[arg(long, value_name = "DIR")]
    output: Option<PathBuf>,
}

/// Which image-source configuration the deployed task definition uses.
/// Only affects run labeling and image output paths; the stacks themselves
/// are provisioned outside this tool.
#[derive(Debug, Clone, Copy, ValueEnum)]
enum ImageType {
    /// Task definition pulls from a private registry
    #[value(alias = "privateimage")]
    Private,
    /// Task definition pulls from a public registry
    #[value(alias = "publicimage")]
    Public,
}

impl ImageType {
    fn label(self) -> &'static str {
        match self {
            ImageType::Private => "privateimage",
            ImageType::Public => "publicimage",
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Launch a concurrent batch of Fargate tasks and measure startup latency
    ///
    /// Examples:
    ///   startup-bench fargate --image-type private
    ///   startup-bench fargate --image-type public --count 50 -v
    Fargate {
        #[arg(long, value_enum)]
        image_type: ImageType,

        /// Override the number of tasks to launch
        #[arg(long)]
        count: Option<usize>,

        /// Drive the scheduler through the aws CLI instead of the SDK
        #[arg(long)]
        use_cli: bool,
    },
    /// Run serial cold-vs-hot rounds against an EC2-backed cluster
    ///
    /// Examples:
    ///   startup-bench ec2 --image-type private
    ///   startup-bench ec2 --image-type private --rounds 20
    Ec2 {
        #[arg(long, value_enum)]
        image_type: ImageType,

        /// Override the number of measured rounds
        #[arg(long)]
        rounds: Option<usize>,

        /// Drive the scheduler through the aws CLI instead of the SDK
        #[arg(long)]
        use_cli: bool,
    },
}

// -----------------------------------------------------------------------------
// main
// -----------------------------------------------------------------------------
fn main() -> Result<()> {
    let cli = Cli::parse();

    let rt = RtBuilder::new_multi_thread().enable_all().build()?;
    rt.block_on(dispatch(cli))
}

async fn dispatch(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Fargate {
            image_type,
            count,
            use_cli,
        } => {
            let mut cfg = load_config(cli.config.as_deref(), BenchConfig::default)?;
            if let Some(count) = count {
                cfg.task_count = count;
            }
            let label = format!("fargate-{}", image_type.label());
            let mut results =
                ResultsDir::create(&label, cli.output.as_deref(), cli.config.as_deref())?;
            logging::init(cli.verbose, Some(&results.console_log_path()))?;
            run_fargate(&cfg, image_type, use_cli, &mut results).await
        }
        Commands::Ec2 {
            image_type,
            rounds,
            use_cli,
        } => {
            let mut cfg = load_config(cli.config.as_deref(), BenchConfig::ec2)?;
            if let Some(rounds) = rounds {
                cfg.rounds = rounds;
            }
            let label = format!("ec2-{}", image_type.label());
            let mut results =
                ResultsDir::create(&label, cli.output.as_deref(), cli.config.as_deref())?;
            logging::init(cli.verbose, Some(&results.console_log_path()))?;
            run_ec2(&cfg, use_cli, &mut results).await
        }
    }
}

fn load_config(
    path: Option<&std::path::Path>,
    defaults: impl FnOnce() -> BenchConfig,
) -> Result<BenchConfig> {
    match path {
        Some(path) => BenchConfig::load(path),
        None => Ok(defaults()),
    }
}

async fn run_fargate(
    cfg: &BenchConfig,
    image_type: ImageType,
    use_cli: bool,
    results: &mut ResultsDir,
) -> Result<()> {
    let t0 = Instant::now();
    info!("fargate benchmark: {} tasks on {}", cfg.task_count, cfg.cluster);

    let aws = infra::aws_config(&cfg.region).await;
    let outputs = StackOutputs::new(&aws, &cfg.stack_name);
    let network = fargate::resolve_network(&outputs)
        .await
        .context("could not resolve stack outputs; create/check the stack first")?;

    if use_cli {
        let scheduler = Arc::new(CliScheduler::new(
            cfg.region.as_str(),
            cfg.cluster.as_str(),
            cfg.task_definition.as_str(),
            Some(network),
        ));
        fargate::run(cfg, scheduler, results, image_type.label()).await?;
    } else {
        let scheduler = Arc::new(EcsScheduler::new(
            &aws,
            cfg.cluster.as_str(),
            cfg.task_definition.as_str(),
            Some(network),
        ));
        fargate::run(cfg, scheduler, results, image_type.label()).await?;
    }

    results.finalize(t0.elapsed().as_secs_f64())?;
    info!("benchmark complete");
    Ok(())
}

async fn run_ec2(cfg: &BenchConfig, use_cli: bool, results: &mut ResultsDir) -> Result<()> {
    let t0 = Instant::now();
    info!("ec2 benchmark: {} rounds on {}", cfg.rounds, cfg.cluster);

    if let Some(script) = &cfg.create_script {
        infra::run_stack_script(script)
            .await
            .context("stack creation failed")?;
    }

    let aws = infra::aws_config(&cfg.region).await;
    let outputs = StackOutputs::new(&aws, &cfg.stack_name);
    let subnet_id = outputs.require("SubnetId").await?;
    let launch_template_id = outputs.require("LaunchTemplateId").await?;
    info!("subnet: {subnet_id}");
    info!("launch template: {launch_template_id}");

    let instances = InstanceControl::new(&aws, launch_template_id, subnet_id);

    if use_cli {
        let scheduler = Arc::new(CliScheduler::new(
            cfg.region.as_str(),
            cfg.cluster.as_str(),
            cfg.task_definition.as_str(),
            None,
        ));
        ec2::run(cfg, scheduler, &instances, results).await?;
    } else {
        let scheduler =
            Arc::new(EcsScheduler::new(&aws, cfg.cluster.as_str(), cfg.task_definition.as_str(), None));
        ec2::run(cfg, scheduler, &instances, results).await?;
    }

    if let Some(script) = &cfg.delete_script {
        if let Err(err) = infra::run_stack_script(script).await {
            warn!("stack cleanup failed, check the console: {err:#}");
        }
    }

    results.finalize(t0.elapsed().as_secs_f64())?;
    info!("benchmark complete");
    Ok(())
}
