//! Downscaling saliency CLI.
//!
//! Computes relevance maps for a downscaling model checkpoint, manages
//! relevance settings and verifies relevance bundles.

use clap::{Args, Parser, Subcommand};
use ds_bundle::{BundleError, BundleReader, BundleWriter, BUNDLE_SCHEMA_VERSION};
use ds_common::{
    format_batch_human, format_error_human, Error, OutputFormat, RunId, StructuredError,
    SCHEMA_VERSION,
};
use ds_config::{LossKind, CONFIG_SCHEMA_VERSION};
use ds_core::config::{
    list_presets, load_settings, ConfigError, ConfigOptions, LoadedSettings, PresetName,
    RelevanceSettings, SettingsOverrides,
};
use ds_core::events::{FanoutEmitter, JsonlWriter, MemoryEmitter, ProgressEmitter};
use ds_core::exit_codes::ExitCode;
use ds_core::logging::{
    event_names, get_host_id, init_logging, LogConfig, LogContext, LogFormat, LogLevel, Stage,
};
use ds_core::report::RunSummary;
use ds_core::{
    io, log_event, AbortHandle, Baseline, DistributionalLoss, ModelCheckpoint, RelevanceEngine,
    RelevanceOptions,
};
use serde::Serialize;
use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// Relevance maps for climate downscaling models
#[derive(Parser)]
#[command(name = "ds-core")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[command(flatten)]
    global: GlobalOpts,
}

/// Global options available to all commands
#[derive(Args, Debug)]
struct GlobalOpts {
    /// Settings file (relevance.json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Output format
    #[arg(long, short = 'f', global = true, default_value = "json")]
    format: OutputFormat,

    /// Increase verbosity (-v, -vv)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Only log errors
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Log format on stderr (human or jsonl)
    #[arg(long, global = true)]
    log_format: Option<LogFormat>,

    /// Disable colored output
    #[arg(long, global = true)]
    no_color: bool,

    /// Stop starting new samples after this many seconds
    #[arg(long, global = true)]
    timeout: Option<u64>,
}

#[derive(Subcommand)]
enum Commands {
    /// Compute relevance maps for a model checkpoint
    Relevance(RelevanceArgs),

    /// Settings management
    Config(ConfigArgs),

    /// Inspect relevance bundles
    Bundle(BundleArgs),

    /// Print version information
    Version,
}

#[derive(Args, Debug)]
struct RelevanceArgs {
    /// Test inputs dataset (JSON)
    #[arg(long)]
    inputs: PathBuf,

    /// Baseline dataset drawn from the training period (JSON)
    #[arg(long)]
    baseline: PathBuf,

    /// Model checkpoint (JSON)
    #[arg(long)]
    model: PathBuf,

    /// Output locations (JSON)
    #[arg(long)]
    locations: PathBuf,

    /// Observed targets per sample and location, for --log-likelihood
    #[arg(long)]
    observed: Option<PathBuf>,

    /// Start from a named preset instead of the settings file
    #[arg(long)]
    preset: Option<PresetName>,

    /// Distributional loss (bernoulli_gamma or gaussian)
    #[arg(long)]
    loss: Option<LossKind>,

    /// Perturbed copies per unit
    #[arg(long)]
    samples: Option<usize>,

    #[arg(long)]
    seed: Option<u64>,

    /// Perturb square patches of this side length instead of whole channels
    #[arg(long)]
    patch_size: Option<usize>,

    /// Resample from a window shifted by up to this many cells
    #[arg(long)]
    window_size: Option<usize>,

    /// Report absolute scores
    #[arg(long)]
    absolute: bool,

    /// Score the log-likelihood of observed targets instead of the expectation
    #[arg(long)]
    log_likelihood: bool,

    /// Worker threads
    #[arg(long)]
    threads: Option<usize>,

    /// Write the relevance map document here
    #[arg(long, short = 'o')]
    output: Option<PathBuf>,

    /// Write a relevance bundle (.dsb) here
    #[arg(long)]
    bundle: Option<PathBuf>,
}

impl RelevanceArgs {
    fn overrides(&self) -> SettingsOverrides {
        SettingsOverrides {
            loss: self.loss,
            num_samples: self.samples,
            seed: self.seed,
            patch_size: self.patch_size,
            window_size: self.window_size,
            absolute: self.absolute,
            log_likelihood: self.log_likelihood,
            threads: self.threads,
        }
    }
}

#[derive(Args, Debug)]
struct ConfigArgs {
    #[command(subcommand)]
    command: ConfigCommands,
}

#[derive(Subcommand, Debug)]
enum ConfigCommands {
    /// Show the effective settings
    Show {
        #[arg(long)]
        preset: Option<PresetName>,
    },
    /// Validate a settings file
    Validate {
        /// File to validate (defaults to the resolved settings file)
        path: Option<PathBuf>,
    },
    /// List available presets
    Presets,
    /// Print the JSON Schema of the settings file
    Schema,
}

#[derive(Args, Debug)]
struct BundleArgs {
    #[command(subcommand)]
    command: BundleCommands,
}

#[derive(Subcommand, Debug)]
enum BundleCommands {
    /// Verify every file checksum in a bundle
    Verify { path: PathBuf },
}

fn main() {
    let cli = Cli::parse();

    let cli_level = (cli.global.verbose > 0 || cli.global.quiet)
        .then(|| LogLevel::from_verbosity(cli.global.verbose, cli.global.quiet));
    let log_config = LogConfig::from_env(cli_level, cli.global.log_format);
    init_logging(&log_config);

    let exit_code = match &cli.command {
        Commands::Relevance(args) => run_relevance(&cli.global, args),
        Commands::Config(args) => run_config(&cli.global, args),
        Commands::Bundle(args) => run_bundle(&cli.global, args),
        Commands::Version => {
            print_version(&cli.global);
            ExitCode::Clean
        }
    };

    std::process::exit(exit_code.as_i32());
}

// ============================================================================
// Output helpers
// ============================================================================

fn print_json<T: Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(json) => println!("{json}"),
        Err(e) => eprintln!("failed to serialize output: {e}"),
    }
}

fn use_color(global: &GlobalOpts) -> bool {
    !global.no_color && std::io::stderr().is_terminal()
}

/// Report a fatal engine error and return its exit code.
fn fail(global: &GlobalOpts, ctx: &LogContext, err: &Error) -> ExitCode {
    let code = ExitCode::for_error(err);
    let reason = err.to_string();
    log_event!(
        ctx,
        ERROR,
        event_names::RUN_FINISHED,
        Stage::Init,
        "Command failed",
        exit_code = code.as_i32(),
        reason = reason.as_str()
    );
    match global.format {
        OutputFormat::Json => {
            let structured = StructuredError::from(err).with_context("run_id", &ctx.run_id);
            print_json(&serde_json::json!({
                "schema_version": SCHEMA_VERSION,
                "run_id": ctx.run_id,
                "exit_code": code.as_i32(),
                "error": structured,
            }));
        }
        OutputFormat::Exitcode => {}
        _ => eprintln!("{}", format_error_human(err, use_color(global))),
    }
    code
}

fn fail_config(global: &GlobalOpts, ctx: &LogContext, err: &ConfigError) -> ExitCode {
    let code = err.exit_code();
    let reason = err.to_string();
    log_event!(
        ctx,
        ERROR,
        event_names::CONFIG_ERROR,
        Stage::Init,
        "Settings could not be loaded",
        exit_code = code.as_i32(),
        reason = reason.as_str()
    );
    match global.format {
        OutputFormat::Json => print_json(&serde_json::json!({
            "schema_version": SCHEMA_VERSION,
            "run_id": ctx.run_id,
            "exit_code": code.as_i32(),
            "error": { "code_name": code.code_name(), "message": reason },
        })),
        OutputFormat::Exitcode => {}
        _ => eprintln!(
            "✗ Settings Error\n  Reason: {reason}\n  Fix: Run 'ds-core config validate' on the settings file."
        ),
    }
    code
}

fn bundle_exit_code(err: &BundleError) -> ExitCode {
    match err {
        BundleError::Io(_) => ExitCode::IoError,
        BundleError::UnsupportedVersion { .. } => ExitCode::VersionError,
        _ => ExitCode::ArgsError,
    }
}

fn new_context() -> LogContext {
    LogContext::new(RunId::new().to_string(), get_host_id())
}

fn load(
    global: &GlobalOpts,
    ctx: &LogContext,
    options: ConfigOptions,
) -> Result<LoadedSettings, ExitCode> {
    match load_settings(&options) {
        Ok(loaded) => {
            if loaded.used_defaults() {
                log_event!(
                    ctx,
                    DEBUG,
                    event_names::CONFIG_DEFAULT_USED,
                    Stage::Init,
                    "No settings file found; using defaults"
                );
            } else {
                let source = loaded.path.source.to_string();
                log_event!(
                    ctx,
                    DEBUG,
                    event_names::CONFIG_LOADED,
                    Stage::Init,
                    "Settings loaded",
                    source = source.as_str()
                );
            }
            Ok(loaded)
        }
        Err(err) => Err(fail_config(global, ctx, &err)),
    }
}

// ============================================================================
// relevance
// ============================================================================

struct Inputs {
    tensor: ds_core::ChannelTensor,
    baseline: Baseline,
    checkpoint: ModelCheckpoint,
    locations: Vec<ds_core::OutputLocation>,
    observed: Option<ndarray::Array2<f64>>,
}

fn read_inputs(args: &RelevanceArgs, ctx: &LogContext) -> ds_common::Result<Inputs> {
    let tensor = io::read_dataset(&args.inputs)?;
    let (s, r, c, ch) = tensor.view().dim();
    let path = args.inputs.display().to_string();
    log_event!(
        ctx,
        DEBUG,
        event_names::INPUT_LOADED,
        Stage::Load,
        "Test inputs loaded",
        path = path.as_str(),
        samples = s,
        rows = r,
        cols = c,
        channels = ch
    );

    let baseline = Baseline::from_tensor(io::read_dataset(&args.baseline)?)?;
    let checkpoint = ModelCheckpoint::from_file(&args.model)?;
    let model_path = args.model.display().to_string();
    log_event!(
        ctx,
        DEBUG,
        event_names::MODEL_LOADED,
        Stage::Load,
        "Model checkpoint loaded",
        path = model_path.as_str()
    );

    let locations = io::read_locations(&args.locations)?;
    let observed = match &args.observed {
        Some(path) => Some(io::read_observed(path)?),
        None => None,
    };

    Ok(Inputs {
        tensor,
        baseline,
        checkpoint,
        locations,
        observed,
    })
}

fn run_relevance(global: &GlobalOpts, args: &RelevanceArgs) -> ExitCode {
    let ctx = new_context();
    log_event!(
        ctx,
        INFO,
        event_names::RUN_STARTED,
        Stage::Init,
        "Starting relevance command"
    );

    let loaded = match load(
        global,
        &ctx,
        ConfigOptions {
            settings_path: global.config.clone(),
            preset: args.preset,
            overrides: args.overrides(),
        },
    ) {
        Ok(loaded) => loaded,
        Err(code) => return code,
    };

    let inputs = match read_inputs(args, &ctx) {
        Ok(inputs) => inputs,
        Err(err) => return fail(global, &ctx, &err),
    };

    let settings = &loaded.settings;
    if let Some(trained) = inputs.checkpoint.loss() {
        if trained != settings.loss.kind {
            let trained_with = trained.as_str();
            let selected = settings.loss.kind.as_str();
            log_event!(
                ctx,
                WARN,
                event_names::MODEL_LOADED,
                Stage::Load,
                "Checkpoint was trained with a different loss",
                trained_with = trained_with,
                selected = selected
            );
        }
    }

    let memory = Arc::new(MemoryEmitter::new());
    let mut sinks: Vec<Arc<dyn ProgressEmitter>> = Vec::new();
    sinks.push(memory.clone());
    if global.format == OutputFormat::Json && !global.quiet {
        sinks.push(Arc::new(JsonlWriter::new(std::io::stderr())));
    }
    let emitter: Arc<dyn ProgressEmitter> = Arc::new(FanoutEmitter::new(sinks));

    let abort = AbortHandle::new();
    if let Some(secs) = global.timeout {
        let handle = abort.clone();
        std::thread::spawn(move || {
            std::thread::sleep(Duration::from_secs(secs));
            handle.abort();
        });
    }

    let model = inputs.checkpoint.into_predictor();
    let mut engine = RelevanceEngine::new(
        model.as_ref(),
        DistributionalLoss::from_settings(&settings.loss),
        RelevanceOptions::from_settings(settings),
    )
    .with_emitter(emitter)
    .with_abort(abort)
    .with_log_context(ctx.clone());
    if let Some(observed) = inputs.observed {
        engine = engine.with_observed(observed);
    }

    let run = match engine.compute(&inputs.tensor, &inputs.locations, &inputs.baseline) {
        Ok(run) => run,
        Err(err) => return fail(global, &ctx, &err),
    };
    let summary = RunSummary::from_run(&ctx.run_id, &run, Some(loaded.snapshot.clone()));

    if let Some(path) = &args.output {
        if let Err(err) = io::write_map(path, &run.map) {
            return fail(global, &ctx, &err);
        }
        let path = path.display().to_string();
        log_event!(
            ctx,
            INFO,
            event_names::EXPORT_MAP_WRITTEN,
            Stage::Export,
            "Relevance map written",
            path = path.as_str()
        );
    }

    if let Some(path) = &args.bundle {
        let document = run.map.to_document();
        if let Err(err) = write_bundle(path, &ctx, &loaded, &document, &summary, &memory) {
            let reason = err.to_string();
            log_event!(
                ctx,
                ERROR,
                event_names::INTERNAL_ERROR,
                Stage::Export,
                "Bundle could not be written",
                reason = reason.as_str()
            );
            if global.format != OutputFormat::Exitcode {
                eprintln!("✗ Bundle Error\n  Reason: {reason}");
            }
            return bundle_exit_code(&err);
        }
    }

    let code = summary.exit_code();
    log_event!(
        ctx,
        INFO,
        event_names::RUN_FINISHED,
        Stage::Export,
        "Relevance command finished",
        exit_code = code.as_i32()
    );

    match global.format {
        OutputFormat::Json => print_json(&summary),
        OutputFormat::Md => print!("{}", summary.to_markdown()),
        OutputFormat::Summary => println!("{}", summary.one_line()),
        OutputFormat::Exitcode => {}
    }
    let human = matches!(global.format, OutputFormat::Md | OutputFormat::Summary);
    if human && !run.outcome.failed.is_empty() {
        eprint!("{}", format_batch_human(&run.outcome, use_color(global)));
    }
    code
}

fn write_bundle(
    path: &Path,
    ctx: &LogContext,
    loaded: &LoadedSettings,
    document: &ds_core::relevance::RelevanceMapDocument,
    summary: &RunSummary,
    events: &MemoryEmitter,
) -> Result<(), BundleError> {
    let mut writer = BundleWriter::new(ctx.run_id.clone(), ctx.host_id.clone())
        .with_tool_version(env!("CARGO_PKG_VERSION"))
        .with_config_hash(loaded.snapshot.settings_hash.clone());
    if let Some(description) = &loaded.settings.description {
        writer = writer.with_description(description.clone());
    }
    writer.add_relevance_map(document)?;
    writer.add_summary(summary)?;
    writer.add_config(&loaded.settings)?;
    writer.add_log("progress", events.to_jsonl_bytes());
    let manifest = writer.write(path)?;

    let path = path.display().to_string();
    log_event!(
        ctx,
        INFO,
        event_names::EXPORT_BUNDLE_WRITTEN,
        Stage::Export,
        "Relevance bundle written",
        path = path.as_str(),
        files = manifest.file_count()
    );
    Ok(())
}

// ============================================================================
// config
// ============================================================================

fn run_config(global: &GlobalOpts, args: &ConfigArgs) -> ExitCode {
    let ctx = new_context();
    match &args.command {
        ConfigCommands::Show { preset } => {
            let loaded = match load(
                global,
                &ctx,
                ConfigOptions {
                    settings_path: global.config.clone(),
                    preset: *preset,
                    ..Default::default()
                },
            ) {
                Ok(loaded) => loaded,
                Err(code) => return code,
            };
            match global.format {
                OutputFormat::Json => print_json(&serde_json::json!({
                    "schema_version": SCHEMA_VERSION,
                    "source": loaded.path.source.to_string(),
                    "path": loaded.path.path.as_ref().map(|p| p.display().to_string()),
                    "settings": loaded.settings,
                    "snapshot": loaded.snapshot,
                })),
                OutputFormat::Summary => println!(
                    "settings {} from {}",
                    loaded.snapshot.short_id(),
                    loaded.path.source
                ),
                OutputFormat::Md => {
                    println!("# ds-core settings");
                    println!();
                    println!("- source: {}", loaded.path.source);
                    println!("- settings hash: {}", loaded.snapshot.short_id());
                    println!();
                    println!("```json");
                    print_json(&loaded.settings);
                    println!("```");
                }
                OutputFormat::Exitcode => {}
            }
            ExitCode::Clean
        }
        ConfigCommands::Validate { path } => {
            let settings_path = path.clone().or_else(|| global.config.clone());
            let loaded = match load(
                global,
                &ctx,
                ConfigOptions {
                    settings_path,
                    ..Default::default()
                },
            ) {
                Ok(loaded) => loaded,
                Err(code) => return code,
            };
            match global.format {
                OutputFormat::Json => print_json(&serde_json::json!({
                    "status": "ok",
                    "source": loaded.path.source.to_string(),
                    "path": loaded.path.path.as_ref().map(|p| p.display().to_string()),
                    "file_hash": loaded.content_hash,
                })),
                OutputFormat::Exitcode => {}
                _ => println!("✓ settings valid ({})", loaded.path.source),
            }
            ExitCode::Clean
        }
        ConfigCommands::Presets => {
            let presets = list_presets();
            match global.format {
                OutputFormat::Json => print_json(&presets),
                OutputFormat::Exitcode => {}
                _ => {
                    for preset in &presets {
                        println!("{:<14} {}", preset.name, preset.description);
                    }
                }
            }
            ExitCode::Clean
        }
        ConfigCommands::Schema => {
            if global.format != OutputFormat::Exitcode {
                print_json(&RelevanceSettings::json_schema());
            }
            ExitCode::Clean
        }
    }
}

// ============================================================================
// bundle
// ============================================================================

fn run_bundle(global: &GlobalOpts, args: &BundleArgs) -> ExitCode {
    match &args.command {
        BundleCommands::Verify { path } => {
            let mut reader = match BundleReader::open(path) {
                Ok(reader) => reader,
                Err(err) => {
                    if global.format != OutputFormat::Exitcode {
                        eprintln!("✗ Bundle Error\n  Reason: {err}");
                    }
                    return bundle_exit_code(&err);
                }
            };
            let failures = reader.verify_all();
            let manifest = reader.manifest();
            let ok = failures.is_empty();
            match global.format {
                OutputFormat::Json => print_json(&serde_json::json!({
                    "path": path.display().to_string(),
                    "run_id": manifest.run_id,
                    "bundle_version": manifest.bundle_version,
                    "files": manifest.file_count(),
                    "status": if ok { "ok" } else { "corrupt" },
                    "failures": failures,
                })),
                OutputFormat::Exitcode => {}
                _ => {
                    if ok {
                        println!(
                            "✓ {} files verified ({})",
                            manifest.file_count(),
                            manifest.run_id
                        );
                    } else {
                        println!(
                            "✗ {} of {} files failed verification",
                            failures.len(),
                            manifest.file_count()
                        );
                        for failure in &failures {
                            println!("  - {failure}");
                        }
                    }
                }
            }
            if ok {
                ExitCode::Clean
            } else {
                ExitCode::ArgsError
            }
        }
    }
}

// ============================================================================
// version
// ============================================================================

fn print_version(global: &GlobalOpts) {
    let version = env!("CARGO_PKG_VERSION");
    match global.format {
        OutputFormat::Json => print_json(&serde_json::json!({
            "version": version,
            "schema_version": SCHEMA_VERSION,
            "config_schema_version": CONFIG_SCHEMA_VERSION,
            "bundle_schema_version": BUNDLE_SCHEMA_VERSION,
        })),
        OutputFormat::Exitcode => {}
        _ => println!("ds-core {version}"),
    }
}
