use traffic_shaper::admission::AdmissionController;
use traffic_shaper::cli::{self, Command, FormatArg};
use traffic_shaper::config;
use traffic_shaper::dispatch::Tier;
use traffic_shaper::engine;
use traffic_shaper::error::{Error, Result};
use traffic_shaper::output::{self, Formatter, HumanFormatter, JsonFormatter, SummaryFormatter};

fn main() {
    if let Err(err) = run() {
        eprintln!("Error: {}", err);
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let args = cli::parse_args()?;
    cli::init_tracing(args.verbose)?;

    match args.command {
        Command::Run(run) => {
            let config = config::apply_seed(config::load_config(&run.config)?, run.seed);
            let result = engine::run_simulation(&config)?;
            print!("{}", formatter_for(run.format).write(&result)?);
        }
        Command::ShowConfig(show) => {
            let config = config::load_config(&show.config)?;
            print!("{}", output::describe_config(&config));
        }
        Command::Export(export) => {
            let config = config::load_config(&export.config)?;
            let controller = AdmissionController::from_snapshot(&config.controller)?;
            let encoded = serde_json::to_string_pretty(&controller.snapshot())
                .map_err(|err| Error::Output(format!("failed to encode snapshot: {}", err)))?;
            println!("{}", encoded);
        }
        Command::ListTiers => {
            for tier in Tier::ALL {
                println!("{}", tier);
            }
        }
    }

    Ok(())
}

fn formatter_for(format: FormatArg) -> Box<dyn Formatter> {
    match format {
        FormatArg::Human => Box::new(HumanFormatter),
        FormatArg::Summary => Box::new(SummaryFormatter),
        FormatArg::Json => Box::new(JsonFormatter),
    }
}
