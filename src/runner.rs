use std::path::{Path, PathBuf};

use clap::{Args, Command, FromArgMatches as _};
use log::info;

use crate::context::Context;
use crate::error::EpiError;
use crate::global_properties::ContextGlobalPropertiesExt;
use crate::log::{set_log_level, LevelFilter};
use crate::parameters::Parameters;
use crate::random::ContextRandomExt;
use crate::report::ContextReportExt;

/// Command line arguments shared by every simulation binary.
#[derive(Args, Debug, Default)]
pub struct BaseArgs {
    /// Random seed. Overrides the seed in the configuration file
    #[arg(short, long)]
    pub random_seed: Option<u64>,

    /// Path to the JSON configuration file
    #[arg(short, long, default_value = "")]
    pub config: String,

    /// Directory for report output
    #[arg(short, long, default_value = "")]
    pub output_dir: String,

    /// Prefix prepended to every report file name
    #[arg(short, long, default_value = "")]
    pub prefix: String,

    /// Overwrite existing report files
    #[arg(short, long)]
    pub force_overwrite: bool,

    /// Enable logging at this level (error, warn, info, debug, trace)
    #[arg(short, long)]
    pub log_level: Option<String>,
}

fn create_cli() -> Command {
    let cli = Command::new("epi-clusters").about("Agent-based epidemic simulation over clustered contact networks");
    BaseArgs::augment_args(cli)
}

/// Parses the command line, prepares a `Context` from it, runs `setup_fn`
/// and executes the simulation.
///
/// # Errors
///
/// Returns an error if the arguments cannot be parsed, the configuration is
/// invalid, or `setup_fn` fails.
pub fn run_with_args<F>(setup_fn: F) -> Result<Context, Box<dyn std::error::Error>>
where
    F: FnOnce(&mut Context, &BaseArgs) -> Result<(), EpiError>,
{
    let matches = create_cli().get_matches();
    let args = BaseArgs::from_arg_matches(&matches)?;
    Ok(run_with_args_internal(&args, setup_fn)?)
}

fn run_with_args_internal<F>(args: &BaseArgs, setup_fn: F) -> Result<Context, EpiError>
where
    F: FnOnce(&mut Context, &BaseArgs) -> Result<(), EpiError>,
{
    if let Some(level) = &args.log_level {
        let level: LevelFilter = level
            .parse()
            .map_err(|_| EpiError::EpiError(format!("unknown log level: {level}")))?;
        set_log_level(level);
    }

    let mut context = Context::new();

    if !args.config.is_empty() {
        info!("loading configuration from {}", args.config);
        context.load_global_property_from_file(Parameters, Path::new(&args.config))?;
    }

    let report_config = context.report_options();
    if !args.output_dir.is_empty() {
        report_config.directory(PathBuf::from(&args.output_dir));
    }
    report_config
        .file_prefix(args.prefix.clone())
        .overwrite(args.force_overwrite);

    let seed = args.random_seed.unwrap_or_else(|| {
        context
            .get_global_property_value(Parameters)
            .map_or(0, |params| params.seed)
    });
    context.init_random(seed);

    setup_fn(&mut context, args)?;

    context.execute();
    Ok(context)
}
