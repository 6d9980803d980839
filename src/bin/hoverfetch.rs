//! Hoverfetch CLI - Command-line interface for the prediction engine
//!
//! Commands:
//! - run: Stream events from stdin and write host instructions (streaming mode)
//! - replay: Replay an event file into an instruction file (batch mode)
//! - validate: Validate inbound event schema
//! - profiles: Print the operating profile table
//! - doctor: Diagnose configuration and persisted state

use clap::{Parser, Subcommand, ValueEnum};
use std::fs;
use std::io::{self, BufRead, Read, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use hoverfetch::collaborators::StaticTrustPolicy;
use hoverfetch::governor::{Mode, PROFILES};
use hoverfetch::persistence::{JsonFileStore, PersistedState};
use hoverfetch::types::{HostInstruction, TrustLevel};
use hoverfetch::{
    EngineConfig, EngineError, EventAdapter, InboundEvent, PredictionEngine, HOVERFETCH_VERSION,
    PRODUCER_NAME, SCHEMA_VERSION,
};

/// Hoverfetch - Predictive link prefetch engine
#[derive(Parser)]
#[command(name = "hoverfetch")]
#[command(version = HOVERFETCH_VERSION)]
#[command(about = "Score links from pointer motion and plan speculative loads", long_about = None)]
struct Cli {
    /// Emit logs as JSON (filter with HOVERFETCH_LOG)
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Stream NDJSON events from stdin and write host instructions to stdout
    Run {
        #[command(flatten)]
        engine: EngineArgs,

        /// Output format
        #[arg(long, default_value = "ndjson")]
        output_format: OutputFormat,

        /// Flush output after each event
        #[arg(long, default_value = "true")]
        flush: bool,
    },

    /// Replay an event file and write every host instruction (batch mode)
    Replay {
        /// Input file path (use - for stdin)
        #[arg(short, long)]
        input: PathBuf,

        /// Output file path (use - for stdout)
        #[arg(short, long)]
        output: PathBuf,

        /// Input format
        #[arg(long, default_value = "ndjson")]
        input_format: InputFormat,

        /// Output format
        #[arg(long, default_value = "ndjson")]
        output_format: OutputFormat,

        #[command(flatten)]
        engine: EngineArgs,
    },

    /// Validate inbound event schema
    Validate {
        /// Input file path (use - for stdin)
        #[arg(short, long)]
        input: PathBuf,

        /// Input format
        #[arg(long, default_value = "ndjson")]
        input_format: InputFormat,

        /// Output validation report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print the operating profile table
    Profiles {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Diagnose configuration and persisted state
    Doctor {
        /// Check an engine configuration file
        #[arg(long)]
        config: Option<PathBuf>,

        /// Check a persisted state file
        #[arg(long)]
        state: Option<PathBuf>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

/// Options shared by commands that build an engine
#[derive(clap::Args)]
struct EngineArgs {
    /// Engine configuration file (JSON)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Persist engine state to this file
    #[arg(long)]
    state: Option<PathBuf>,

    /// Initial mode (turbo, balanced, eco, auto)
    #[arg(long)]
    mode: Option<String>,

    /// Domains trusted for prerender (repeatable)
    #[arg(long = "trusted")]
    trusted: Vec<String>,

    /// Domains denied prefetch and prerender (repeatable)
    #[arg(long = "untrusted")]
    untrusted: Vec<String>,
}

#[derive(Clone, ValueEnum)]
enum InputFormat {
    /// Newline-delimited JSON (one event per line)
    Ndjson,
    /// JSON array of events
    Json,
}

#[derive(Clone, ValueEnum)]
enum OutputFormat {
    /// Newline-delimited JSON (one instruction per line)
    Ndjson,
    /// JSON array of instructions
    Json,
    /// Pretty-printed JSON
    JsonPretty,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!(
                "{}",
                serde_json::to_string(&CliError::from(e)).unwrap_or_else(|_| "Unknown error".to_string())
            );
            ExitCode::FAILURE
        }
    }
}

/// Logs go to stderr so stdout stays a clean instruction stream.
/// Default: only warnings. Set HOVERFETCH_LOG=debug for verbose output.
fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_env("HOVERFETCH_LOG")
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn run(cli: Cli) -> Result<(), HoverfetchCliError> {
    match cli.command {
        Commands::Run {
            engine,
            output_format,
            flush,
        } => cmd_run(&engine, output_format, flush),

        Commands::Replay {
            input,
            output,
            input_format,
            output_format,
            engine,
        } => cmd_replay(&input, &output, input_format, output_format, &engine),

        Commands::Validate {
            input,
            input_format,
            json,
        } => cmd_validate(&input, input_format, json),

        Commands::Profiles { json } => cmd_profiles(json),

        Commands::Doctor {
            config,
            state,
            json,
        } => cmd_doctor(config.as_deref(), state.as_deref(), json),
    }
}

fn build_engine(args: &EngineArgs) -> Result<PredictionEngine, HoverfetchCliError> {
    let config = match &args.config {
        Some(path) => EngineConfig::from_json(&fs::read_to_string(path)?)?,
        None => EngineConfig::default(),
    };

    let mut trust = StaticTrustPolicy::new();
    for domain in &args.trusted {
        trust = trust.with_domain(domain.as_str(), TrustLevel::Trusted);
    }
    for domain in &args.untrusted {
        trust = trust.with_domain(domain.as_str(), TrustLevel::Untrusted);
    }

    let mut engine = PredictionEngine::new(config)?.with_trust_policy(trust);
    if let Some(path) = &args.state {
        engine = engine.with_state_store(JsonFileStore::new(path));
    }
    if let Some(mode) = &args.mode {
        if !engine.set_mode(mode) {
            return Err(HoverfetchCliError::Engine(EngineError::InvalidMode(mode.clone())));
        }
    }
    Ok(engine)
}

fn cmd_run(args: &EngineArgs, output_format: OutputFormat, flush: bool) -> Result<(), HoverfetchCliError> {
    let mut engine = build_engine(args)?;

    let stdin = io::stdin();
    let mut stdout = io::stdout();

    for line in stdin.lock().lines() {
        let line = line?;
        let trimmed = line.trim();

        if trimmed.is_empty() {
            continue;
        }

        let event: InboundEvent = serde_json::from_str(trimmed)
            .map_err(|e| HoverfetchCliError::ParseError(format!("Failed to parse event: {}", e)))?;
        event.validate()?;

        let instructions = engine.handle_event(&event)?;
        if instructions.is_empty() {
            continue;
        }

        write!(stdout, "{}", format_output(&instructions, &output_format)?)?;
        if flush {
            stdout.flush()?;
        }
    }

    stdout.flush()?;
    Ok(())
}

fn cmd_replay(
    input: &Path,
    output: &Path,
    input_format: InputFormat,
    output_format: OutputFormat,
    args: &EngineArgs,
) -> Result<(), HoverfetchCliError> {
    let input_data = read_input(input)?;
    let events = parse_events(&input_data, &input_format)?;
    if events.is_empty() {
        return Err(HoverfetchCliError::NoEvents);
    }

    let mut engine = build_engine(args)?;
    let mut instructions = Vec::new();
    for event in &events {
        instructions.extend(engine.handle_event(event)?);
    }

    let rendered = format_output(&instructions, &output_format)?;
    if output.to_string_lossy() == "-" {
        let mut stdout = io::stdout();
        write!(stdout, "{}", rendered)?;
        stdout.flush()?;
    } else {
        fs::write(output, rendered)?;
    }

    tracing::info!(
        events = events.len(),
        instructions = instructions.len(),
        "replay complete"
    );
    Ok(())
}

fn cmd_validate(input: &Path, input_format: InputFormat, json: bool) -> Result<(), HoverfetchCliError> {
    let input_data = read_input(input)?;
    let events = parse_events(&input_data, &input_format)?;
    let results = EventAdapter::validate_events(&events);

    let report = ValidationReport {
        schema_version: SCHEMA_VERSION.to_string(),
        total_events: events.len(),
        valid_events: events.len() - results.len(),
        invalid_events: results.len(),
        errors: results
            .iter()
            .map(|r| ValidationErrorDetail {
                index: r.index,
                event_type: r.event_type.to_string(),
                error: r.error.to_string(),
            })
            .collect(),
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("Validation Report ({})", report.schema_version);
        println!("=================");
        println!("Total events:   {}", report.total_events);
        println!("Valid events:   {}", report.valid_events);
        println!("Invalid events: {}", report.invalid_events);

        if !report.errors.is_empty() {
            println!("\nErrors:");
            for err in &report.errors {
                println!("  - {} (index {}): {}", err.event_type, err.index, err.error);
            }
        }
    }

    if report.invalid_events > 0 {
        Err(HoverfetchCliError::ValidationFailed(report.invalid_events))
    } else {
        Ok(())
    }
}

fn cmd_profiles(json: bool) -> Result<(), HoverfetchCliError> {
    if json {
        println!("{}", serde_json::to_string_pretty(&PROFILES)?);
        return Ok(());
    }

    println!("{:<10} {:>10} {:>10} {:>11} {:>10} {:>10}", "profile", "prerender", "prefetch", "preconnect", "prr quota", "pf quota");
    for profile in PROFILES {
        println!(
            "{:<10} {:>10} {:>10} {:>11} {:>10} {:>10}",
            profile.name.as_str(),
            profile.prerender_threshold,
            profile.prefetch_threshold,
            profile.preconnect_threshold,
            profile.prerender_quota,
            profile.prefetch_quota
        );
    }
    println!();
    println!("Scores below 30 earn no hint. Prerender requires a trusted domain.");
    Ok(())
}

fn cmd_doctor(config: Option<&Path>, state: Option<&Path>, json: bool) -> Result<(), HoverfetchCliError> {
    let mut checks: Vec<DoctorCheck> = Vec::new();

    checks.push(DoctorCheck {
        name: "version".to_string(),
        status: CheckStatus::Ok,
        message: format!("Hoverfetch version {}", HOVERFETCH_VERSION),
    });

    checks.push(DoctorCheck {
        name: "schema_version".to_string(),
        status: CheckStatus::Ok,
        message: format!("Input schema: {}", SCHEMA_VERSION),
    });

    if let Some(config_path) = config {
        checks.push(match fs::read_to_string(config_path) {
            Ok(content) => match EngineConfig::from_json(&content) {
                Ok(config) => DoctorCheck {
                    name: "config".to_string(),
                    status: CheckStatus::Ok,
                    message: format!(
                        "Config valid (throttle {}ms, pool capacity {})",
                        config.scoring.base_interval_ms, config.pool.capacity
                    ),
                },
                Err(e) => DoctorCheck {
                    name: "config".to_string(),
                    status: CheckStatus::Error,
                    message: e.to_string(),
                },
            },
            Err(e) => DoctorCheck {
                name: "config".to_string(),
                status: CheckStatus::Error,
                message: format!("Cannot read config file: {}", e),
            },
        });
    }

    if let Some(state_path) = state {
        let check = if !state_path.exists() {
            DoctorCheck {
                name: "state".to_string(),
                status: CheckStatus::Warning,
                message: "State file does not exist; the engine will start empty".to_string(),
            }
        } else {
            match fs::read_to_string(state_path) {
                Ok(content) => match PersistedState::from_json(&content) {
                    Ok(state) => DoctorCheck {
                        name: "state".to_string(),
                        status: CheckStatus::Ok,
                        message: format!(
                            "State valid (mode {}, {} pooled directives, {} successful predictions, saved {})",
                            state.mode,
                            state.directives.len(),
                            state.counters.successful_predictions,
                            state.saved_at.to_rfc3339()
                        ),
                    },
                    Err(e) => DoctorCheck {
                        name: "state".to_string(),
                        status: CheckStatus::Warning,
                        message: format!("Unreadable state will be ignored: {}", e),
                    },
                },
                Err(e) => DoctorCheck {
                    name: "state".to_string(),
                    status: CheckStatus::Error,
                    message: format!("Cannot read state file: {}", e),
                },
            }
        };
        checks.push(check);
    }

    let stdin_check = if atty::is(atty::Stream::Stdin) {
        DoctorCheck {
            name: "stdin".to_string(),
            status: CheckStatus::Ok,
            message: "stdin is a TTY (interactive mode)".to_string(),
        }
    } else {
        DoctorCheck {
            name: "stdin".to_string(),
            status: CheckStatus::Ok,
            message: "stdin is a pipe (streaming mode ready)".to_string(),
        }
    };
    checks.push(stdin_check);

    let report = DoctorReport {
        producer: PRODUCER_NAME.to_string(),
        version: HOVERFETCH_VERSION.to_string(),
        default_mode: Mode::default().to_string(),
        checks,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("Hoverfetch Doctor Report");
        println!("========================");
        println!("Producer: {}", report.producer);
        println!("Version:  {}", report.version);
        println!("Mode:     {}", report.default_mode);
        println!("\nChecks:");

        for check in &report.checks {
            let status_icon = match check.status {
                CheckStatus::Ok => "[OK]",
                CheckStatus::Warning => "[WARN]",
                CheckStatus::Error => "[ERR]",
            };
            println!("  {} {}: {}", status_icon, check.name, check.message);
        }
    }

    let has_errors = report.checks.iter().any(|c| matches!(c.status, CheckStatus::Error));
    if has_errors {
        Err(HoverfetchCliError::DoctorFailed)
    } else {
        Ok(())
    }
}

// Helper functions

fn read_input(input: &Path) -> Result<String, HoverfetchCliError> {
    if input.to_string_lossy() == "-" {
        let mut buffer = String::new();
        io::stdin().read_to_string(&mut buffer)?;
        Ok(buffer)
    } else {
        Ok(fs::read_to_string(input)?)
    }
}

fn parse_events(data: &str, format: &InputFormat) -> Result<Vec<InboundEvent>, HoverfetchCliError> {
    Ok(match format {
        InputFormat::Ndjson => EventAdapter::parse_ndjson(data)?,
        InputFormat::Json => EventAdapter::parse_array(data)?,
    })
}

fn format_output(instructions: &[HostInstruction], format: &OutputFormat) -> Result<String, HoverfetchCliError> {
    match format {
        OutputFormat::Ndjson => {
            let mut lines: Vec<String> = Vec::new();
            for instruction in instructions {
                lines.push(serde_json::to_string(instruction)?);
            }
            Ok(lines.join("\n") + "\n")
        }
        OutputFormat::Json => Ok(serde_json::to_string(instructions)? + "\n"),
        OutputFormat::JsonPretty => Ok(serde_json::to_string_pretty(instructions)? + "\n"),
    }
}

// Error types

#[derive(Debug)]
enum HoverfetchCliError {
    Io(io::Error),
    Engine(EngineError),
    Json(serde_json::Error),
    Validation(hoverfetch::schema::ValidationError),
    NoEvents,
    ValidationFailed(usize),
    DoctorFailed,
    ParseError(String),
}

impl From<io::Error> for HoverfetchCliError {
    fn from(e: io::Error) -> Self {
        HoverfetchCliError::Io(e)
    }
}

impl From<EngineError> for HoverfetchCliError {
    fn from(e: EngineError) -> Self {
        HoverfetchCliError::Engine(e)
    }
}

impl From<serde_json::Error> for HoverfetchCliError {
    fn from(e: serde_json::Error) -> Self {
        HoverfetchCliError::Json(e)
    }
}

impl From<hoverfetch::schema::ValidationError> for HoverfetchCliError {
    fn from(e: hoverfetch::schema::ValidationError) -> Self {
        HoverfetchCliError::Validation(e)
    }
}

#[derive(serde::Serialize)]
struct CliError {
    code: String,
    message: String,
    hint: Option<String>,
}

impl From<HoverfetchCliError> for CliError {
    fn from(e: HoverfetchCliError) -> Self {
        match e {
            HoverfetchCliError::Io(e) => CliError {
                code: "IO_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check file paths and permissions".to_string()),
            },
            HoverfetchCliError::Engine(EngineError::InvalidConfig(msg)) => CliError {
                code: "CONFIG_ERROR".to_string(),
                message: msg,
                hint: Some("Run 'hoverfetch doctor --config <file>' for details".to_string()),
            },
            HoverfetchCliError::Engine(EngineError::InvalidMode(mode)) => CliError {
                code: "INVALID_MODE".to_string(),
                message: format!("Unknown mode: {}", mode),
                hint: Some("Use one of: turbo, balanced, eco, auto".to_string()),
            },
            HoverfetchCliError::Engine(e) => CliError {
                code: "ENGINE_ERROR".to_string(),
                message: e.to_string(),
                hint: Some(format!("Ensure input matches the {} schema", SCHEMA_VERSION)),
            },
            HoverfetchCliError::Json(e) => CliError {
                code: "JSON_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check JSON syntax".to_string()),
            },
            HoverfetchCliError::Validation(e) => CliError {
                code: "VALIDATION_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Run 'hoverfetch validate' for details".to_string()),
            },
            HoverfetchCliError::NoEvents => CliError {
                code: "NO_EVENTS".to_string(),
                message: "No events found in input".to_string(),
                hint: Some("Ensure input file is not empty".to_string()),
            },
            HoverfetchCliError::ValidationFailed(count) => CliError {
                code: "VALIDATION_FAILED".to_string(),
                message: format!("{} events failed validation", count),
                hint: Some("Fix validation errors and retry".to_string()),
            },
            HoverfetchCliError::DoctorFailed => CliError {
                code: "DOCTOR_FAILED".to_string(),
                message: "One or more health checks failed".to_string(),
                hint: Some("Review the doctor report for details".to_string()),
            },
            HoverfetchCliError::ParseError(msg) => CliError {
                code: "PARSE_ERROR".to_string(),
                message: msg,
                hint: Some("Check input format".to_string()),
            },
        }
    }
}

// Report types

#[derive(serde::Serialize)]
struct ValidationReport {
    schema_version: String,
    total_events: usize,
    valid_events: usize,
    invalid_events: usize,
    errors: Vec<ValidationErrorDetail>,
}

#[derive(serde::Serialize)]
struct ValidationErrorDetail {
    index: usize,
    event_type: String,
    error: String,
}

#[derive(serde::Serialize)]
struct DoctorReport {
    producer: String,
    version: String,
    default_mode: String,
    checks: Vec<DoctorCheck>,
}

#[derive(serde::Serialize)]
struct DoctorCheck {
    name: String,
    status: CheckStatus,
    message: String,
}

#[derive(serde::Serialize)]
enum CheckStatus {
    Ok,
    Warning,
    Error,
}
