use anyhow::{Context, Result, anyhow};
use clap::{ArgAction, Args, Parser, Subcommand};
use log::{error, info};
use std::path::PathBuf;
use std::process::ExitCode;

use foamrun::analysis::standard_group;
use foamrun::config::{FoamConfig, LogLevel};
use foamrun::parallel::MpiLauncher;
use foamrun::runner::{Analyzed, BasicRunner, Convergence, RunData, RunHandler, RunnerBuilder, Utility};

#[derive(Parser, Debug)]
#[command(name = "foamrun", version, about = "Run OpenFOAM solvers and utilities under supervision")]
struct Cli {
    /// Path to a configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// More log output, repeat for even more
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run a solver and analyze its output
    Run {
        #[command(flatten)]
        run: RunArgs,

        /// Write one data file per analyzed quantity
        #[arg(long)]
        data_files: bool,

        /// Change the end time of the case for this run
        #[arg(long)]
        end_time: Option<f64>,

        /// The solver and its arguments
        #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
        command: Vec<String>,
    },

    /// Run a steady solver and stop it once the residuals converged
    Steady {
        #[command(flatten)]
        run: RunArgs,

        #[arg(long)]
        data_files: bool,

        #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
        command: Vec<String>,
    },

    /// Run a utility and collect what expressions match in its output
    Utility {
        #[command(flatten)]
        run: RunArgs,

        /// Expression to look for, as name=regexp; %f% stands for a number
        #[arg(long = "expr", value_parser = parse_key_value)]
        exprs: Vec<(String, String)>,

        #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
        command: Vec<String>,
    },
}

#[derive(Args, Debug)]
struct LogArgs {
    /// Case directory, defaults to -case of the command or the current directory
    #[arg(long)]
    case: Option<PathBuf>,

    /// Name of the log file instead of PyFoam.<solver>
    #[arg(long)]
    logname: Option<String>,

    /// Compress the log file
    #[arg(long)]
    compress: bool,

    /// Do not write a log file
    #[arg(long)]
    no_log: bool,

    /// Only keep the last N lines in the log file
    #[arg(long, value_name = "N")]
    log_tail: Option<usize>,

    /// Do not echo the output
    #[arg(long)]
    silent: bool,

    /// Only print the simulation time
    #[arg(long)]
    progress: bool,

    /// Print every simulation time on its own line
    #[arg(long)]
    long_progress: bool,
}

#[derive(Args, Debug)]
struct ParallelArgs {
    /// Number of processes for a parallel run
    #[arg(long)]
    procnr: Option<usize>,

    /// MPI machine file for a parallel run
    #[arg(long)]
    machinefile: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct RunArgs {
    #[command(flatten)]
    log: LogArgs,

    #[command(flatten)]
    parallel: ParallelArgs,

    /// Continue from the latest time of the case
    #[arg(long)]
    restart: bool,

    /// Remark recorded with the run
    #[arg(long)]
    remark: Option<String>,

    /// Id of the job in a queueing system
    #[arg(long)]
    job_id: Option<String>,

    /// Parameter recorded with the run, as key=value
    #[arg(long = "parameter", value_parser = parse_key_value)]
    parameters: Vec<(String, String)>,

    /// Do not write the PyFoamState files
    #[arg(long)]
    no_state: bool,

    /// Print the command line with this prefix before running
    #[arg(long)]
    echo_command_line: Option<String>,

    /// Print the run data as JSON at the end
    #[arg(long)]
    dump: bool,
}

fn parse_key_value(s: &str) -> std::result::Result<(String, String), String> {
    s.split_once('=')
        .map(|(k, v)| (k.trim().to_string(), v.to_string()))
        .filter(|(k, _)| !k.is_empty())
        .ok_or_else(|| format!("expected name=value, got '{}'", s))
}

fn builder(args: &RunArgs, command: &[String], config: &FoamConfig) -> Result<RunnerBuilder> {
    let log = &args.log;
    let mut builder = RunnerBuilder::new(command.iter().cloned())
        .config(config.clone())
        .compress(log.compress)
        .no_log(log.no_log)
        .silent(log.silent)
        .restart(args.restart)
        .write_state(!args.no_state);

    if let Some(case) = &log.case {
        builder = builder.case_dir(case);
    }
    if let Some(name) = &log.logname {
        builder = builder.log_name(name);
    }
    if let Some(lines) = log.log_tail {
        builder = builder.log_tail(lines);
    }
    if log.progress || log.long_progress {
        builder = builder.progress(log.long_progress);
    }
    if let Some(remark) = &args.remark {
        builder = builder.remark(remark);
    }
    if let Some(id) = &args.job_id {
        builder = builder.job_id(id);
    }
    for (key, value) in &args.parameters {
        builder = builder.parameter(key, value);
    }
    if let Some(prefix) = &args.echo_command_line {
        builder = builder.echo_command_line(prefix);
    }

    let parallel = &args.parallel;
    if parallel.procnr.is_some() || parallel.machinefile.is_some() {
        let launcher = MpiLauncher::new(parallel.machinefile.clone(), parallel.procnr, &config.mpi)
            .context("Parallel setup failed")?;
        builder = builder.launcher(launcher);
    }

    Ok(builder)
}

async fn execute<H: RunHandler>(runner: &mut BasicRunner<H>) -> Result<RunData> {
    let data = runner
        .start()
        .await
        .with_context(|| format!("Running {} failed", runner.argv().join(" ")))?;
    info!("{}: {} lines, {} warnings, OK = {}", data.solver, data.lines, data.warnings, data.ok);
    Ok(data)
}

fn report(data: &RunData, dump: bool) -> Result<ExitCode> {
    if dump {
        println!("{}", serde_json::to_string_pretty(data)?);
    }
    if data.ok {
        Ok(ExitCode::SUCCESS)
    } else {
        if let Some(text) = &data.error_text {
            error!("{}", text.trim_end());
        }
        Ok(ExitCode::FAILURE)
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let config = match FoamConfig::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            foamrun::init_logging(&LogLevel::Error);
            error!("Failed to load configuration: {}", e);
            return Err(anyhow!("Failed to load configuration: {}", e));
        }
    };
    let level = match cli.verbose {
        0 => config.logging.level.clone(),
        1 => LogLevel::Debug,
        _ => LogLevel::Trace,
    };
    foamrun::init_logging(&level);

    match cli.command {
        Commands::Run {
            run,
            data_files,
            end_time,
            command,
        } => {
            let group = standard_group(&config)?;
            let handler = Analyzed::new(group).with_data_files(data_files);
            let mut builder = builder(&run, &command, &config)?;
            if let Some(end_time) = end_time {
                builder = builder.end_time(end_time);
            }
            let mut runner = builder.build_with(handler)?;
            let data = execute(&mut runner).await?;
            if !run.log.silent && !run.dump {
                if let Some(group) = runner.handler().group() {
                    print!("{}", group.summarize());
                }
            }
            report(&data, run.dump)
        }
        Commands::Steady {
            run,
            data_files,
            command,
        } => {
            let handler = Convergence::new(standard_group(&config)?)?.with_data_files(data_files);
            let mut runner = builder(&run, &command, &config)?.build_with(handler)?;
            let data = execute(&mut runner).await?;
            if runner.handler().is_converged() {
                info!("Converged at time {:?}", data.time);
            }
            report(&data, run.dump)
        }
        Commands::Utility { run, exprs, command } => {
            let mut utility = Utility::new();
            for (name, expr) in &exprs {
                utility
                    .add_expression(name, expr)
                    .with_context(|| format!("Invalid expression {}", name))?;
            }
            let mut runner = builder(&run, &command, &config)?.build_utility(utility)?;
            let data = execute(&mut runner).await?;

            let utility = runner.handler();
            if run.dump {
                let matches: serde_json::Map<String, serde_json::Value> = exprs
                    .iter()
                    .filter_map(|(name, _)| {
                        let analyzer = utility.analyzer(name)?;
                        serde_json::to_value(analyzer.matches()).ok().map(|v| (name.clone(), v))
                    })
                    .collect();
                let dump = serde_json::json!({ "run": data, "matches": matches });
                println!("{}", serde_json::to_string_pretty(&dump)?);
            } else {
                for (name, _) in &exprs {
                    for id in utility.ids(name) {
                        if let Some(last) = utility.last(name, id) {
                            println!("{} {}: {:?}", name, id, last.values);
                        }
                    }
                }
            }
            report(&data, false)
        }
    }
}
