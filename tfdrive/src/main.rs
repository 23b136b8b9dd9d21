//! Command-line front end for the terraform driver.
//!
//! Loads [`Options`] from a TOML file (or defaults), runs one command, and exits
//! with a stable exit code. Captured terraform output is streamed through
//! `tracing` while the command runs.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use tfdrive::exit_codes::{DEFAULT_ERROR_EXIT_CODE, DEFAULT_SUCCESS_EXIT_CODE};
use tfdrive::{DecodedOutput, Options, OutputShape, Terraform, load_options, logging};

#[derive(Parser)]
#[command(
    name = "tfdrive",
    version,
    about = "Run terraform commands with retries and structured output"
)]
struct Cli {
    /// Options file (TOML). Defaults apply when omitted.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Terraform directory, overriding the options file.
    #[arg(short = 'C', long, global = true)]
    dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// `terraform init`.
    Init,
    /// `terraform apply -auto-approve`.
    Apply {
        /// Run `init` and `get` first.
        #[arg(long)]
        init: bool,
    },
    /// `terraform destroy -auto-approve`.
    Destroy,
    /// `terraform plan -detailed-exitcode`; exits with the plan's exit code.
    Plan {
        /// Run `init` first.
        #[arg(long)]
        init: bool,
    },
    /// Read outputs; structured shapes are printed as JSON.
    Output {
        #[arg(long, value_enum, default_value_t = ShapeArg::Single)]
        shape: ShapeArg,
        keys: Vec<String>,
    },
    /// Run terraform with arbitrary arguments.
    Run {
        #[arg(trailing_var_arg = true, allow_hyphen_values = true, required = true)]
        args: Vec<String>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum ShapeArg {
    Single,
    Required,
    List,
    Map,
    All,
}

impl From<ShapeArg> for OutputShape {
    fn from(shape: ShapeArg) -> Self {
        match shape {
            ShapeArg::Single => OutputShape::Single,
            ShapeArg::Required => OutputShape::Required,
            ShapeArg::List => OutputShape::List,
            ShapeArg::Map => OutputShape::Map,
            ShapeArg::All => OutputShape::All,
        }
    }
}

fn main() {
    logging::init();
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("{:#}", err);
            std::process::exit(DEFAULT_ERROR_EXIT_CODE);
        }
    }
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    let mut options = match &cli.config {
        Some(path) => load_options(path)?,
        None => Options::default(),
    };
    if let Some(dir) = cli.dir {
        options.terraform_dir = dir;
    }
    options.validate().context("invalid options")?;

    let terraform = Terraform::new();
    match cli.command {
        Command::Init => {
            terraform.init(&options)?;
        }
        Command::Apply { init: true } => {
            terraform.init_and_apply(&options)?;
        }
        Command::Apply { init: false } => {
            terraform.apply(&options)?;
        }
        Command::Destroy => {
            terraform.destroy(&options)?;
        }
        Command::Plan { init } => {
            let code = if init {
                terraform.init_and_plan(&options)?
            } else {
                terraform.plan_exit_code(&options)?
            };
            println!("{code}");
            return Ok(code);
        }
        Command::Output { shape, keys } => {
            let decoded = terraform.output_shaped(&options, shape.into(), &keys)?;
            print_output(&decoded)?;
        }
        Command::Run { args } => {
            let out = terraform.run_command(&options, &args)?;
            println!("{out}");
        }
    }
    Ok(DEFAULT_SUCCESS_EXIT_CODE)
}

fn print_output(decoded: &DecodedOutput) -> Result<()> {
    match decoded {
        DecodedOutput::Single(value) => println!("{value}"),
        structured => {
            let json = serde_json::to_string_pretty(structured).context("serialize output")?;
            println!("{json}");
        }
    }
    Ok(())
}
