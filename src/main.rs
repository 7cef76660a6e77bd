mod assembler;
mod ast;
mod codegen;
mod config;
mod lexer;
mod parser;
mod post;
mod review;
mod validator;

use ariadne::{Label, Report, ReportKind, Source};
use clap::Parser;
use codegen::{CodeGenerator, GCodeOutput};
use config::{Config, PostArgs};
use post::{Diagnostic, PostProcessorType, Processed};
use review::{EditorReview, NoReview, Reviewer};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, Level};

/// Rewrite generic CNC G-code (or a JSON job) for a laser cutter
#[derive(Parser, Debug)]
#[clap(name = "laserpost", version)]
struct Cli {
    /// G-code file, or a `.json` job file
    #[clap(value_parser)]
    input: PathBuf,

    /// Where to write the program; `-` prints it instead
    #[clap(short, long, value_parser, default_value = "-")]
    output: PathBuf,

    /// Input is already laser G-code: only drop redundant lines
    #[clap(long)]
    cleanup: bool,

    /// Verify the beam invariants of the result
    #[clap(long)]
    check: bool,

    /// Debug logging
    #[clap(short, long)]
    verbose: bool,

    #[clap(flatten)]
    post: PostArgs,
}

#[derive(thiserror::Error, Debug)]
enum Error {
    #[error("{0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Config(#[from] config::ConfigError),

    #[error("{0}")]
    Parse(#[from] parser::ParseError),

    #[error("review failed: {0}")]
    Review(#[from] review::ReviewError),

    #[error("{} beam check failure(s), first: {}", .0.len(), first_failure(.0))]
    Validation(Vec<validator::ValidationError>),
}

fn first_failure(errors: &[validator::ValidationError]) -> String {
    errors.first().map(|e| e.to_string()).unwrap_or_default()
}

fn is_job(path: &Path) -> bool {
    path.extension()
        .map(|ext| ext.eq_ignore_ascii_case("json"))
        .unwrap_or(false)
}

/// Run the generation pass when needed, then the selected post-processor.
/// Returns the generic text the diagnostics point into alongside the result.
fn postprocess(
    source: &str,
    job: bool,
    kind: PostProcessorType,
    config: &Config,
) -> Result<(String, Processed), Error> {
    let generic = if job {
        let job = parser::parse_job(source)?;
        CodeGenerator::new(config).generate(&job)
    } else {
        GCodeOutput::from_text(source)
    };

    let processor = kind.get_processor(config);
    debug!(post = processor.name(), lines = generic.lines.len(), "postprocessing");
    let processed = processor.process(&generic);

    Ok((generic.to_string(), processed))
}

fn report(name: &str, text: &str, diagnostics: &[Diagnostic]) {
    for diagnostic in diagnostics {
        let result = Report::build(ReportKind::Warning, name, diagnostic.span.start)
            .with_message(format!("malformed word on line {}", diagnostic.line))
            .with_label(Label::new((name, diagnostic.span.clone())).with_message(&diagnostic.message))
            .finish()
            .eprint((name, Source::from(text)));
        if let Err(e) = result {
            eprintln!("line {}: {} ({})", diagnostic.line, diagnostic.message, e);
        }
    }
}

fn main() {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_max_level(if cli.verbose { Level::DEBUG } else { Level::INFO })
        .init();

    if let Err(e) = run(&cli) {
        eprintln!("error: {}", e);
        std::process::exit(1);
    }
}

fn run(cli: &Cli) -> Result<(), Error> {
    let config = cli.post.clone().into_config()?;
    let kind = if cli.cleanup {
        PostProcessorType::Cleanup
    } else {
        PostProcessorType::Laser
    };

    let source = fs::read_to_string(&cli.input)?;
    let (generic, processed) = postprocess(&source, is_job(&cli.input), kind, &config)?;

    let name = cli.input.display().to_string();
    report(&name, &generic, &processed.diagnostics);

    let reviewer: Box<dyn Reviewer> = match EditorReview::from_env() {
        Some(editor) if config.review => Box::new(editor),
        _ => Box::new(NoReview),
    };
    let buffer = reviewer.review(processed.output.to_string())?;

    if cli.check {
        if let Err(errors) = validator::Validator::new(&config).validate_output(&buffer) {
            eprintln!("Validation errors:");
            for err in &errors {
                eprintln!("  - {}", err);
            }
            return Err(Error::Validation(errors));
        }
    }

    if !review::persist(&buffer, &cli.output)? {
        print!("{}", buffer);
    }

    Ok(())
}
