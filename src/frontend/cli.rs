use crate::core::Value;
use crate::frontend::config::RunnerConfig;
use crate::infrastructure::logging::{self, LogConfig, LogFormat};
use crate::runner::LiveRunner;
use std::fs;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use tracing::Level;

const USAGE: &str = "Usage: liverunner [OPTIONS] [FILE]...\n\nOptions:\n  \
     --config FILE      Load configuration from FILE (default: discover .liverunner.toml)\n  \
     --import LIB       Import LIB before running (repeatable)\n  \
     --include DIR      Add a library search directory (repeatable)\n  \
     --log-level LEVEL  trace, debug, info, warn or error (default: warn)\n  \
     --log-format FMT   pretty, compact or json (default: compact)\n  \
     --dump             Print engine state after running the files\n  \
     --no-color         Disable colored output\n\n\
     Without files, reads statements from stdin. REPL commands:\n  \
     :inspect NAME  :dump  :reset  :import LIB...  :symbols  :quit";

#[derive(Debug, Clone)]
pub struct CliConfig {
    pub config_path: Option<PathBuf>,
    pub imports: Vec<String>,
    pub include_directories: Vec<String>,
    pub log_level: Level,
    pub log_format: LogFormat,
    pub files: Vec<PathBuf>,
    pub dump: bool,
    pub color: bool,
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            config_path: None,
            imports: Vec::new(),
            include_directories: Vec::new(),
            log_level: Level::WARN,
            log_format: LogFormat::Compact,
            files: Vec::new(),
            dump: false,
            color: true,
        }
    }
}

/// What the REPL should do after a line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplAction {
    Continue,
    Quit,
}

pub struct Cli {
    config: CliConfig,
    runner: LiveRunner,
}

impl Cli {
    pub fn new(config: CliConfig) -> Result<Self, String> {
        let mut runner_config = match &config.config_path {
            Some(path) => RunnerConfig::load(path)?,
            None => RunnerConfig::discover(),
        };
        for dir in &config.include_directories {
            runner_config = runner_config.with_include_directory(dir.clone());
        }
        if runner_config.session.root_module_path.is_none() {
            if let Some(first) = config.files.first() {
                runner_config = runner_config.with_root_module(first.clone());
            }
        }

        let runner = LiveRunner::new(runner_config).map_err(|e| e.to_string())?;
        Ok(Self { config, runner })
    }

    pub fn runner(&self) -> &LiveRunner {
        &self.runner
    }

    pub fn run(&self) -> Result<i32, String> {
        if !self.config.imports.is_empty() {
            let names: Vec<&str> = self.config.imports.iter().map(String::as_str).collect();
            self.runner.import_libraries(&names).map_err(|e| e.to_string())?;
        }

        if self.config.files.is_empty() {
            let stdin = io::stdin();
            let stdout = io::stdout();
            self.repl(stdin.lock(), &mut stdout.lock())
                .map_err(|e| format!("I/O error: {}", e))?;
            return Ok(0);
        }

        let mut failures = 0;
        for path in &self.config.files {
            let source = fs::read_to_string(path)
                .map_err(|e| format!("Failed to read {}: {}", path.display(), e))?;

            match self.runner.update(&source) {
                Ok(summary) => {
                    for value in &summary.values {
                        println!("{}", value);
                    }
                }
                Err(e) => {
                    failures += 1;
                    self.print_error(&format!("{}: {}", path.display(), e));
                }
            }
        }

        if self.config.dump {
            print!("{}", self.runner.dump_state());
        }

        Ok(if failures == 0 { 0 } else { 1 })
    }

    /// Read lines until EOF or `:quit`.
    pub fn repl<R: BufRead, W: Write>(&self, input: R, out: &mut W) -> io::Result<()> {
        for line in input.lines() {
            if self.execute_line(&line?, out)? == ReplAction::Quit {
                break;
            }
        }
        Ok(())
    }

    pub fn execute_line<W: Write>(&self, line: &str, out: &mut W) -> io::Result<ReplAction> {
        let line = line.trim();
        if line.is_empty() {
            return Ok(ReplAction::Continue);
        }

        let Some(command) = line.strip_prefix(':') else {
            match self.runner.update(line) {
                Ok(summary) => {
                    for value in &summary.values {
                        writeln!(out, "{}", value)?;
                    }
                    for name in &summary.defined {
                        if let Ok(value) = self.runner.inspect(name) {
                            writeln!(out, "{} = {}", name, value)?;
                        }
                    }
                }
                Err(e) => writeln!(out, "error: {}", e)?,
            }
            return Ok(ReplAction::Continue);
        };

        let mut parts = command.split_whitespace();
        match parts.next().unwrap_or("") {
            "inspect" | "i" => match parts.next() {
                Some(name) => match self.runner.inspect(name) {
                    Ok(value) => writeln!(out, "{}", describe(&value))?,
                    Err(e) => writeln!(out, "error: {}", e)?,
                },
                None => writeln!(out, "usage: :inspect NAME")?,
            },
            "dump" => write!(out, "{}", self.runner.dump_state())?,
            "reset" => {
                self.runner.reinitialize();
                writeln!(out, "reset")?;
            }
            "import" => {
                let names: Vec<&str> = parts.collect();
                if names.is_empty() {
                    writeln!(out, "usage: :import LIB...")?;
                } else {
                    match self.runner.import_libraries(&names) {
                        Ok(symbols) => writeln!(out, "imported {} symbols", symbols.len())?,
                        Err(e) => writeln!(out, "error: {}", e)?,
                    }
                }
            }
            "symbols" => {
                for symbol in self.runner.symbols() {
                    writeln!(out, "{} ({:?}, {})", symbol.name, symbol.kind, symbol.library)?;
                }
            }
            "quit" | "q" => return Ok(ReplAction::Quit),
            other => writeln!(out, "unknown command ':{}'", other)?,
        }

        Ok(ReplAction::Continue)
    }

    fn print_error(&self, msg: &str) {
        if self.config.color {
            eprintln!("\x1b[31m{}\x1b[0m", msg);
        } else {
            eprintln!("{}", msg);
        }
    }
}

fn describe(value: &Value) -> String {
    format!("{} : {}", value, value.type_name())
}

pub fn parse_args() -> Result<CliConfig, String> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    parse_args_from(&args)
}

pub fn parse_args_from(args: &[String]) -> Result<CliConfig, String> {
    let mut config = CliConfig::default();
    let mut i = 0;

    let value_of = |i: usize, flag: &str| -> Result<String, String> {
        args.get(i)
            .cloned()
            .ok_or_else(|| format!("{} requires an argument", flag))
    };

    while i < args.len() {
        match args[i].as_str() {
            "-h" | "--help" => return Err(USAGE.to_string()),
            "--config" => {
                i += 1;
                config.config_path = Some(PathBuf::from(value_of(i, "--config")?));
            }
            "--import" => {
                i += 1;
                config.imports.push(value_of(i, "--import")?);
            }
            "--include" => {
                i += 1;
                config.include_directories.push(value_of(i, "--include")?);
            }
            "--log-level" => {
                i += 1;
                config.log_level = logging::parse_level(&value_of(i, "--log-level")?)?;
            }
            "--log-format" => {
                i += 1;
                config.log_format = value_of(i, "--log-format")?.parse()?;
            }
            "--dump" => config.dump = true,
            "--no-color" => config.color = false,
            arg if arg.starts_with("--") => {
                return Err(format!("Unknown option: {}\n\n{}", arg, USAGE));
            }
            path => config.files.push(PathBuf::from(path)),
        }
        i += 1;
    }

    Ok(config)
}

/// Entry point for the CLI binary
pub fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = parse_args()?;
    let _guard = logging::init_logging(
        LogConfig::new()
            .with_level(config.log_level)
            .with_format(config.log_format),
    );

    let cli = Cli::new(config)?;
    let exit_code = cli.run()?;
    drop(cli);
    std::process::exit(exit_code);
}
