// Mon Feb 09 2026 - Alex

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use rayon::prelude::*;
use rulescan::compiler::DEFAULT_NAMESPACE;
use rulescan::utils::{escape_bytes, format_bytes, format_duration, pluralize, LoggingUtils, ScopedTimer};
use rulescan::{CallbackMessage, CallbackResult, Config, RuleResult, Rules, RulesCompiler};
use std::fmt::{self, Write as _};
use std::fs;
use std::path::PathBuf;
use std::time::Instant;

#[derive(Parser, Debug)]
#[command(name = "rulescan")]
#[command(author = "Alex")]
#[command(version = "1.0.0")]
#[command(about = "Multi-pattern rule scanner for files and process memory", long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Repeat for more output (-v info, -vv debug, -vvv trace).
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[arg(long, global = true)]
    no_color: bool,

    /// JSON scan settings; command line flags take precedence.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Compile a JSON rule description.
    Compile(CompileArgs),
    /// Scan files, directories or processes with compiled rules.
    Scan(ScanArgs),
    /// Describe a compiled rules file.
    Info(InfoArgs),
}

#[derive(Parser, Debug)]
struct CompileArgs {
    rules: PathBuf,

    #[arg(short, long, default_value = "rules.rscn")]
    output: PathBuf,
}

#[derive(Parser, Debug)]
struct ScanArgs {
    compiled: PathBuf,

    /// Files, directories, or process ids with --pid.
    #[arg(required = true)]
    targets: Vec<String>,

    #[arg(long)]
    pid: bool,

    /// Seconds before a scan is abandoned.
    #[arg(short, long)]
    timeout: Option<u64>,

    /// Override an external variable.
    #[arg(short = 'd', long = "define", value_name = "NAME=VALUE")]
    defines: Vec<String>,

    #[arg(short, long)]
    fast: bool,

    #[arg(short = 's', long)]
    print_strings: bool,

    #[arg(short = 'g', long)]
    print_tags: bool,

    #[arg(short = 'n', long)]
    negate: bool,

    #[arg(short = 'p', long)]
    threads: Option<usize>,

    #[arg(long)]
    no_progress: bool,

    /// Print time spent per rule after scanning.
    #[arg(long)]
    profile: bool,
}

#[derive(Parser, Debug)]
struct InfoArgs {
    compiled: PathBuf,
}

enum Target {
    File(PathBuf),
    Process(u32),
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Target::File(path) => write!(f, "{}", path.display()),
            Target::Process(pid) => write!(f, "{}", pid),
        }
    }
}

fn main() {
    let args = Args::parse();

    if args.no_color {
        colored::control::set_override(false);
    }
    LoggingUtils::init_for_cli(args.verbose, !args.no_color);

    match run(args) {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(e) => {
            eprintln!("{} {:#}", "[!]".red(), e);
            std::process::exit(1);
        }
    }
}

fn run(args: Args) -> Result<bool> {
    let config = match &args.config {
        Some(path) => Config::load(path).with_context(|| format!("failed to load {}", path.display()))?,
        None => Config::default(),
    };

    match &args.command {
        Command::Compile(compile_args) => compile(compile_args),
        Command::Scan(scan_args) => scan(scan_args, config),
        Command::Info(info_args) => info(info_args),
    }
}

fn compile(args: &CompileArgs) -> Result<bool> {
    let _timer = ScopedTimer::new("compile");

    let rules = RulesCompiler::from_json_file(&args.rules)
        .with_context(|| format!("failed to read {}", args.rules.display()))?
        .build()
        .context("compilation failed")?;
    rules
        .save(&args.output)
        .with_context(|| format!("failed to write {}", args.output.display()))?;

    println!(
        "{} Compiled {} into {}",
        "[+]".green(),
        pluralize(rules.rules().len(), "rule", "rules"),
        args.output.display()
    );
    Ok(true)
}

fn scan(args: &ScanArgs, mut config: Config) -> Result<bool> {
    if let Some(timeout) = args.timeout {
        config.timeout_seconds = timeout;
    }
    if let Some(threads) = args.threads {
        config.max_threads = threads;
    }
    config.fast_mode |= args.fast;
    config.print_strings |= args.print_strings;
    config.print_tags |= args.print_tags;
    config.negate |= args.negate;
    config.show_progress &= !args.no_progress;
    config.profile |= args.profile;
    for define in &args.defines {
        let (name, value) = define
            .split_once('=')
            .with_context(|| format!("invalid definition '{}', expected NAME=VALUE", define))?;
        config.externals.insert(name.to_string(), value.to_string());
    }
    config.validate().map_err(anyhow::Error::msg)?;

    let mut rules = Rules::load(&args.compiled)
        .with_context(|| format!("failed to load {}", args.compiled.display()))?;
    config.apply_externals(&mut rules)?;

    let targets = if args.pid {
        args.targets
            .iter()
            .map(|t| t.parse().map(Target::Process).with_context(|| format!("invalid pid '{}'", t)))
            .collect::<Result<Vec<_>>>()?
    } else {
        collect_files(&args.targets)?
    };

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(config.max_threads)
        .build()
        .context("failed to start worker threads")?;

    let progress = (targets.len() > 1 && config.show_progress).then(|| {
        let pb = ProgressBar::new(targets.len() as u64);
        let style = ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
            .map(|s| s.progress_chars("#>-"))
            .unwrap_or_else(|_| ProgressStyle::default_bar());
        pb.set_style(style);
        pb
    });

    let start = Instant::now();
    let rules = &rules;
    let config = &config;
    let outcomes: Vec<bool> = pool.install(|| {
        targets
            .par_iter()
            .map(|target| {
                let outcome = scan_target(rules, target, config);
                let ok = outcome.is_ok();
                let report = match outcome {
                    Ok(report) => report,
                    Err(e) => format!("{} {}: {}\n", "[!]".red(), target, e),
                };
                if !report.is_empty() {
                    let report = report.trim_end_matches('\n');
                    match &progress {
                        Some(pb) => pb.println(report),
                        None => println!("{}", report),
                    }
                }
                if let Some(pb) = &progress {
                    pb.inc(1);
                }
                ok
            })
            .collect()
    });

    if let Some(pb) = progress {
        pb.finish_and_clear();
    }
    log::info!(
        "scanned {} in {}",
        pluralize(targets.len(), "target", "targets"),
        format_duration(start.elapsed())
    );

    if config.profile {
        print_profile(rules);
    }

    Ok(outcomes.iter().all(|ok| *ok))
}

fn print_profile(rules: &Rules) {
    let mut profile = rules.profiling_info();
    profile.sort_by(|a, b| b.time.cmp(&a.time));

    println!();
    println!("{}", "Profiling (microseconds per rule):".yellow().bold());
    for entry in &profile {
        println!("  {}", entry);
    }
}

fn collect_files(targets: &[String]) -> Result<Vec<Target>> {
    let mut files = Vec::new();
    for target in targets {
        let path = PathBuf::from(target);
        if path.is_dir() {
            let mut entries: Vec<PathBuf> = fs::read_dir(&path)
                .with_context(|| format!("failed to list {}", path.display()))?
                .filter_map(|entry| entry.ok())
                .map(|entry| entry.path())
                .filter(|p| p.is_file())
                .collect();
            entries.sort();
            files.extend(entries.into_iter().map(Target::File));
        } else {
            files.push(Target::File(path));
        }
    }
    Ok(files)
}

fn scan_target(rules: &Rules, target: &Target, config: &Config) -> Result<String, rulescan::Error> {
    let name = target.to_string();
    let mut report = String::new();

    let callback = |message: CallbackMessage<'_>| {
        match message {
            CallbackMessage::RuleMatching(result) if !config.negate => {
                format_rule(&mut report, &result, &name, config)
            }
            CallbackMessage::RuleNotMatching(result) if config.negate => {
                format_rule(&mut report, &result, &name, config)
            }
            _ => {}
        }
        CallbackResult::Continue
    };

    match target {
        Target::File(path) => rules.scan_file(path, config.scan_flags(), config.timeout(), callback)?,
        Target::Process(pid) => rules.scan_proc(*pid, config.scan_flags(), config.timeout(), callback)?,
    }
    Ok(report)
}

fn format_rule(out: &mut String, result: &RuleResult<'_>, target: &str, config: &Config) {
    let namespace = result.namespace().name();
    let identifier = if namespace == DEFAULT_NAMESPACE {
        result.identifier().to_string()
    } else {
        format!("{}:{}", namespace, result.identifier())
    };

    let _ = write!(out, "{}", identifier.green().bold());
    if config.print_tags {
        let _ = write!(out, " [{}]", result.tags().join(","));
    }
    let _ = writeln!(out, " {}", target);

    if config.print_strings {
        for (string, matches) in result.matched_strings() {
            for m in matches {
                let _ = writeln!(
                    out,
                    "0x{:x}:${}: {}",
                    m.address(),
                    string.identifier(),
                    escape_bytes(&m.data)
                );
            }
        }
    }
}

fn info(args: &InfoArgs) -> Result<bool> {
    let rules = Rules::load(&args.compiled)
        .with_context(|| format!("failed to load {}", args.compiled.display()))?;
    let size = fs::metadata(&args.compiled)?.len();

    println!("{}", "Compiled rules".cyan().bold());
    println!("{}", "-".repeat(40).cyan());
    println!("  File: {} ({})", args.compiled.display(), format_bytes(size));
    println!("  Namespaces: {}", rules.namespaces().len());
    println!(
        "  Rules: {} ({} private, {} global)",
        rules.rules().len(),
        rules.rules().iter().filter(|r| r.is_private()).count(),
        rules.rules().iter().filter(|r| r.is_global()).count()
    );
    println!("  Strings: {}", rules.strings().len());
    println!("  Automaton states: {}", rules.automaton().num_states());
    println!("  Transition cells: {}", rules.automaton().transition_table().len());
    println!("  Code: {}", format_bytes(rules.code().len() as u64));

    if !rules.externals().is_empty() {
        println!();
        println!("{}", "Externals:".yellow().bold());
        for external in rules.externals() {
            println!(
                "  {} = {} ({})",
                external.identifier().cyan(),
                external.value(),
                external.value().type_name()
            );
        }
    }

    println!();
    println!("{}", "Rules:".yellow().bold());
    for rule in rules.rules() {
        let mut flags = Vec::new();
        if rule.is_private() {
            flags.push("private");
        }
        if rule.is_global() {
            flags.push("global");
        }
        let mut line = format!("  {}:{}", rules.namespace_of(rule).name(), rule.identifier().cyan());
        if !rule.tags().is_empty() {
            line.push_str(&format!(" [{}]", rule.tags().join(",")));
        }
        if !flags.is_empty() {
            line.push_str(&format!(" ({})", flags.join(", ")));
        }
        println!("{} - {}", line, pluralize(rule.strings().len(), "string", "strings"));
    }

    Ok(true)
}
