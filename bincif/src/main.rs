//! CIF command-line tool for checking, re-serializing, and transcoding CIF documents.
//!
//! Usage: cif [OPTIONS] [FILE|DIR]
//!
//! Options:
//!   -t, --to <FORMAT>      Output format (cif, json, yaml, toml, cbor, diag) [default: cif]
//!   -w, --write            Write output to file with inferred name
//!   -o, --output <FILE>    Write output to specified file
//!       --check            Parse only and report (exit 0 if no errors, 1 otherwise)
//!       --strict           Stop at the first error
//!       --rules <RULES>    Rule set (default, 1.0, 1.1) [default: default]
//!       --decode-escapes   Decode CIF text escapes in JSON, YAML, TOML and CBOR output
//!   -v, --verbose...       More logging (repeat for more)
//!   -h, --help             Print help
//!   -V, --version          Print version

use std::fs;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::process;

use clap::{ArgAction, Parser as _, ValueEnum};
use libcif::{encode, Diagnostic, Document, ErrorPolicy, Flow, Format, Node, Parser, Report};
use tracing_subscriber::EnvFilter;

mod transcode;

/// CIF: check, reformat, and transcode Crystallographic Information Files
#[derive(Debug, clap::Parser)]
#[command(name = "cif")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Input file or directory (reads from stdin if not provided).
    /// A directory processes every .cif file in it, with --check or --write.
    path: Option<PathBuf>,

    /// Output format
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Cif)]
    to: OutputFormat,

    /// Write output to file with inferred extension
    #[arg(short, long, conflicts_with = "output")]
    write: bool,

    /// Write output to specified file (not valid with directory input)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Parse only and report diagnostics; exit 1 if any error was found
    #[arg(long)]
    check: bool,

    /// Stop at the first error instead of recovering
    #[arg(long)]
    strict: bool,

    /// Rule set to parse with
    #[arg(long, value_enum, default_value_t = RuleSet::Default)]
    rules: RuleSet,

    /// Decode CIF text escapes (\a, \'e, \\infty, ...) in non-CIF output
    #[arg(long)]
    decode_escapes: bool,

    /// Increase logging verbosity (-v debug, -vv trace)
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Cif,
    Json,
    Yaml,
    Toml,
    Cbor,
    Diag,
}

impl OutputFormat {
    fn format(self) -> Format {
        match self {
            OutputFormat::Cif => Format::Cif,
            OutputFormat::Json => Format::Json,
            OutputFormat::Yaml => Format::Yaml,
            OutputFormat::Toml => Format::Toml,
            OutputFormat::Cbor => Format::Cbor,
            OutputFormat::Diag => Format::CborDiag,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum RuleSet {
    /// Accept what either revision accepts, warning on differences
    Default,
    /// CIF 1.0
    #[value(name = "1.0")]
    Cif10,
    /// CIF 1.1
    #[value(name = "1.1")]
    Cif11,
}

impl RuleSet {
    fn parser(self) -> Parser {
        match self {
            RuleSet::Default => Parser::new(),
            RuleSet::Cif10 => Parser::cif_1_0(),
            RuleSet::Cif11 => Parser::cif_1_1(),
        }
    }
}

/// Prints each diagnostic to stderr as it is reported.
struct Console<'a> {
    input_file: Option<&'a str>,
    strict: bool,
    errors: usize,
    warnings: usize,
}

impl<'a> Console<'a> {
    fn new(input_file: Option<&'a str>, strict: bool) -> Self {
        Self {
            input_file,
            strict,
            errors: 0,
            warnings: 0,
        }
    }

    fn print(&self, kind: &str, diagnostic: &Diagnostic) {
        match self.input_file {
            Some(path) => eprintln!("{}: {}: {}", path, kind, diagnostic),
            None => eprintln!("{}: {}", kind, diagnostic),
        }
    }
}

impl ErrorPolicy for Console<'_> {
    fn handle(&mut self, report: &mut Report<'_>) -> Flow {
        let diagnostic = report.diagnostic();
        if diagnostic.is_error() {
            self.errors += 1;
            self.print("error", diagnostic);
            if self.strict {
                return Flow::Abort;
            }
        } else {
            self.warnings += 1;
            self.print("warning", diagnostic);
        }
        Flow::Continue
    }
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "libcif=debug,cif=debug",
        _ => "libcif=trace,cif=trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_ansi(false)
        .init();
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    if let Some(path) = &cli.path {
        if path.is_dir() {
            if cli.output.is_some() {
                eprintln!("Error: --output cannot be used with directory input");
                process::exit(1);
            }
            if !cli.check && !cli.write {
                eprintln!("Error: directory input requires --check or --write");
                process::exit(1);
            }
            process::exit(process_directory(path, &cli));
        }
    }

    let raw_bytes: Vec<u8> = match &cli.path {
        Some(path) => match fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) => {
                eprintln!("Error reading {}: {}", path.display(), e);
                process::exit(1);
            }
        },
        None => {
            let mut buffer = Vec::new();
            if let Err(e) = io::stdin().read_to_end(&mut buffer) {
                eprintln!("Error reading stdin: {}", e);
                process::exit(1);
            }
            buffer
        }
    };

    let input_file = cli.path.as_deref().map(|p| p.to_string_lossy());
    let exit_code = process_input(&raw_bytes, input_file.as_deref(), cli.output.as_deref(), &cli);
    process::exit(exit_code);
}

fn process_directory(dir_path: &Path, cli: &Cli) -> i32 {
    let entries = match fs::read_dir(dir_path) {
        Ok(e) => e,
        Err(e) => {
            eprintln!("Error reading directory {}: {}", dir_path.display(), e);
            return 1;
        }
    };

    let mut paths: Vec<PathBuf> = entries
        .flatten()
        .map(|entry| entry.path())
        .filter(|path| path.extension().is_some_and(|e| e.eq_ignore_ascii_case("cif")))
        .collect();
    paths.sort();
    tracing::debug!(dir = %dir_path.display(), files = paths.len(), "processing directory");

    let mut had_errors = false;
    for path in paths {
        let path_str = path.to_string_lossy();
        let input = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) => {
                eprintln!("Error reading {}: {}", path_str, e);
                had_errors = true;
                continue;
            }
        };
        if process_input(&input, Some(path_str.as_ref()), None, cli) != 0 {
            had_errors = true;
        }
    }

    if had_errors {
        1
    } else {
        0
    }
}

/// Parse one input and write it in the requested format; returns the exit code.
fn process_input(
    input: &[u8],
    input_file: Option<&str>,
    output_file: Option<&Path>,
    cli: &Cli,
) -> i32 {
    let parser = cli.rules.parser();
    let mut console = Console::new(input_file, cli.strict);

    // CIF 1.1 is ASCII; anything that is not UTF-8 is read byte for byte.
    let result = match std::str::from_utf8(input) {
        Ok(text) => parser.parse_str(text, &mut console),
        Err(_) => {
            tracing::debug!("input is not UTF-8, reading bytes as characters");
            parser.parse_bytes(input, &mut console)
        }
    };
    let doc = match result {
        Ok(doc) => doc,
        Err(e) => {
            match input_file {
                Some(path) => eprintln!("{}: {}", path, e),
                None => eprintln!("Parse error: {}", e),
            }
            return 1;
        }
    };
    tracing::debug!(
        errors = console.errors,
        warnings = console.warnings,
        blocks = doc.blocks().len(),
        "parsed"
    );

    if cli.check {
        if console.errors > 0 {
            return 1;
        }
        if let Some(path) = input_file {
            println!("{}: ok", path);
        }
        return 0;
    }

    match render(&doc, cli) {
        Ok(Output::Text(text)) => {
            write_output(text.as_bytes(), output_file, cli.write, input_file, cli.to, true)
        }
        Ok(Output::Binary(bytes)) => {
            write_output(&bytes, output_file, cli.write, input_file, cli.to, false)
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            1
        }
    }
}

enum Output {
    Text(String),
    Binary(Vec<u8>),
}

fn render(doc: &Document, cli: &Cli) -> Result<Output, String> {
    let node = || Node::from_document(doc, cli.decode_escapes);
    match cli.to {
        OutputFormat::Cif => encode(doc, Format::Cif)
            .map(Output::Text)
            .map_err(|e| format!("Cannot write CIF: {}", e)),
        OutputFormat::Json => Ok(Output::Text(node().to_json())),
        OutputFormat::Yaml => transcode::yaml::encode(&node())
            .map(Output::Text)
            .map_err(|e| format!("Cannot convert to YAML: {}", e)),
        OutputFormat::Toml => transcode::toml::encode(&node())
            .map(Output::Text)
            .map_err(|e| format!("Cannot convert to TOML: {}", e)),
        OutputFormat::Cbor => transcode::cbor::encode(&node())
            .map(Output::Binary)
            .map_err(|e| format!("Cannot convert to CBOR: {}", e)),
        OutputFormat::Diag => {
            // Render from the encoded bytes so the notation reflects the wire form
            let bytes = transcode::cbor::encode(&node())
                .map_err(|e| format!("Cannot convert to CBOR: {}", e))?;
            transcode::cbor::diagnostic(&bytes)
                .map(Output::Text)
                .map_err(|e| format!("Cannot render CBOR diagnostic notation: {}", e))
        }
    }
}

fn write_output(
    output: &[u8],
    output_file: Option<&Path>,
    write_back: bool,
    input_file: Option<&str>,
    format: OutputFormat,
    is_text: bool,
) -> i32 {
    let target = match (output_file, write_back, input_file) {
        (Some(path), _, _) => Some(path.to_path_buf()),
        (None, true, Some(input_path)) => {
            Some(Path::new(input_path).with_extension(format.format().extension()))
        }
        (None, true, None) => {
            eprintln!("Error: --write requires an input file");
            return 1;
        }
        (None, false, _) => None,
    };

    if let Some(path) = target {
        if let Err(e) = fs::write(&path, output) {
            eprintln!("Error writing {}: {}", path.display(), e);
            return 1;
        }
        tracing::debug!(path = %path.display(), "output written");
        return 0;
    }

    let stdout = io::stdout();
    let mut handle = stdout.lock();
    let mut result = handle.write_all(output);
    // Text output ends with a newline
    if result.is_ok() && is_text && !output.ends_with(b"\n") {
        result = handle.write_all(b"\n");
    }
    if let Err(e) = result {
        eprintln!("Error writing to stdout: {}", e);
        return 1;
    }
    0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cli(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("cif").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn test_defaults() {
        let cli = cli(&[]);
        assert_eq!(cli.to, OutputFormat::Cif);
        assert_eq!(cli.rules, RuleSet::Default);
        assert!(cli.path.is_none());
        assert!(!cli.check && !cli.strict && !cli.write);
    }

    #[test]
    fn test_options() {
        let cli = cli(&["-t", "diag", "--rules", "1.1", "-vv", "--decode-escapes", "a.cif"]);
        assert_eq!(cli.to, OutputFormat::Diag);
        assert_eq!(cli.rules, RuleSet::Cif11);
        assert_eq!(cli.verbose, 2);
        assert!(cli.decode_escapes);
        assert_eq!(cli.path, Some(PathBuf::from("a.cif")));
    }

    #[test]
    fn test_write_conflicts_with_output() {
        let args = ["cif", "-w", "-o", "out.json", "a.cif"];
        assert!(Cli::try_parse_from(args).is_err());
    }

    #[test]
    fn test_console_counts_and_aborts() {
        let source = "data_x _a 1 _a 2 _b\n";
        let mut lenient = Console::new(None, false);
        let doc = Parser::cif_1_1().parse_str(source, &mut lenient).unwrap();
        assert_eq!(lenient.errors, 2);
        assert!(doc.block("x").is_some());

        let mut strict = Console::new(None, true);
        assert!(Parser::cif_1_1().parse_str(source, &mut strict).is_err());
        assert_eq!(strict.errors, 1);
    }

    #[test]
    fn test_render_json_with_escapes() {
        let doc = libcif::parse("data_x _a '\\m'\n").unwrap();
        let Output::Text(plain) = render(&doc, &cli(&["-t", "json"])).unwrap() else {
            panic!("expected text");
        };
        assert!(plain.contains("\"\\\\m\""), "{}", plain);
        let Output::Text(decoded) =
            render(&doc, &cli(&["-t", "json", "--decode-escapes"])).unwrap()
        else {
            panic!("expected text");
        };
        assert!(decoded.contains("\"μ\""), "{}", decoded);
    }
}
