pub mod commands;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand, ValueEnum};
use karbon_core::calc::policy::UnknownCategoryPolicy;
use karbon_core::config::{ConfigOverrides, LoadOptions};

use commands::calculate::{CalculationOptions, CalculationRequest};

#[derive(Debug, Parser)]
#[command(
    name = "karbon",
    about = "Karbon emission estimator CLI",
    long_about = "Estimate logistics, electricity, and fuel emissions against a versioned factor \
                  table, inspect categories and configuration, or chat with the estimator.",
    after_help = "Examples:\n  karbon logistics --weight-kg 100 --distance-km 10 --category truk_diesel_kecil\n  \
                  karbon electricity --kwh 100 --category listrik_papua --policy default\n  \
                  karbon categories --kind fuel\n  karbon doctor --json"
)]
pub struct Cli {
    #[arg(long, global = true, help = "Path to a karbon.toml config file")]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Estimate freight emissions from weight, distance, and transport category")]
    Logistics {
        #[arg(long, help = "Shipment weight in kilograms")]
        weight_kg: f64,
        #[arg(long, help = "Distance travelled in kilometres")]
        distance_km: f64,
        #[arg(long, help = "Transport category key, e.g. truk_diesel_kecil")]
        category: String,
        #[command(flatten)]
        output: OutputArgs,
    },
    #[command(about = "Estimate emissions from grid electricity consumption")]
    Electricity {
        #[arg(long, help = "Energy consumed in kWh")]
        kwh: f64,
        #[arg(long, default_value = "", help = "Grid category key, e.g. listrik_indonesia")]
        category: String,
        #[command(flatten)]
        output: OutputArgs,
    },
    #[command(about = "Estimate emissions from burned fuel")]
    Fuel {
        #[arg(long, help = "Fuel quantity in the configured basis (liters or kilograms)")]
        quantity: f64,
        #[arg(long, help = "Fuel kind: diesel, gasoline, or lpg")]
        fuel_kind: String,
        #[command(flatten)]
        output: OutputArgs,
    },
    #[command(about = "List registered emission categories from the active factor table")]
    Categories {
        #[arg(long, help = "Only list one activity kind (logistics, electricity, fuel)")]
        kind: Option<String>,
    },
    #[command(about = "Start an interactive chat session backed by the calculation tools")]
    Chat,
    #[command(
        about = "Inspect effective configuration values with source attribution and redaction"
    )]
    Config,
    #[command(about = "Validate config, factor table, category policy, and LLM readiness")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
}

#[derive(Debug, Args)]
struct OutputArgs {
    #[arg(long, help = "Ask the language model for a narrative around the result")]
    narrate: bool,
    #[arg(long, value_name = "PATH", help = "Write a plain-text report to PATH")]
    report: Option<PathBuf>,
    #[arg(long, value_enum, help = "Override policy.on_unknown_category for this run")]
    policy: Option<PolicyArg>,
    #[arg(long, help = "Free-text context passed to the narrative")]
    context: Option<String>,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum PolicyArg {
    Reject,
    Default,
}

impl From<PolicyArg> for UnknownCategoryPolicy {
    fn from(value: PolicyArg) -> Self {
        match value {
            PolicyArg::Reject => Self::Reject,
            PolicyArg::Default => Self::Default,
        }
    }
}

impl OutputArgs {
    fn split(self, config_path: Option<PathBuf>) -> (CalculationOptions, LoadOptions) {
        let options = CalculationOptions {
            narrate: self.narrate,
            report_path: self.report,
            context: self.context,
        };
        let mut load = load_options(config_path);
        load.overrides =
            ConfigOverrides { on_unknown_category: self.policy.map(Into::into), ..load.overrides };
        (options, load)
    }
}

// An explicit --config path must exist.
fn load_options(config_path: Option<PathBuf>) -> LoadOptions {
    let require_file = config_path.is_some();
    LoadOptions { config_path, require_file, overrides: ConfigOverrides::default() }
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();
    let config_path = cli.config;

    let result = match cli.command {
        Command::Logistics { weight_kg, distance_km, category, output } => {
            let (options, load) = output.split(config_path);
            let request =
                CalculationRequest::Logistics { weight_kg, distance_km, category_key: category };
            commands::calculate::run(request, options, load)
        }
        Command::Electricity { kwh, category, output } => {
            let (options, load) = output.split(config_path);
            let request = CalculationRequest::Electricity { kwh, category_key: category };
            commands::calculate::run(request, options, load)
        }
        Command::Fuel { quantity, fuel_kind, output } => {
            let (options, load) = output.split(config_path);
            let request = CalculationRequest::Fuel { quantity, fuel_kind };
            commands::calculate::run(request, options, load)
        }
        Command::Categories { kind } => {
            commands::categories::run(kind.as_deref(), load_options(config_path))
        }
        Command::Chat => commands::chat::run(load_options(config_path)),
        Command::Config => commands::CommandResult {
            exit_code: 0,
            output: commands::config::run(load_options(config_path)),
        },
        Command::Doctor { json } => commands::CommandResult {
            exit_code: 0,
            output: commands::doctor::run(json, load_options(config_path)),
        },
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
