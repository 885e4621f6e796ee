use clap::Parser;
use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::process;
use virt_lint::config::LintConfig;
use virt_lint::connection;
use virt_lint::logging;
use virt_lint::version::{version, version_string};
use virt_lint::{VirtLint, VirtLintResult};

#[derive(Parser, Debug)]
#[command(name = "virt-lint", about = "Check domain XML against host capabilities")]
#[command(disable_version_flag = true)]
struct Args {
    /// Connection URI
    #[arg(short = 'c', long = "connect", value_name = "URI")]
    uri: Option<String>,

    /// The path to the domain XML, otherwise read the XML from stdin
    #[arg(short, long, value_name = "FILE")]
    path: Option<PathBuf>,

    /// Turn debugging information on
    #[arg(short, long)]
    debug: bool,

    /// Comma separated list of validator tags, empty means all
    #[arg(short, long, value_name = "TAGS", value_delimiter = ',', action = clap::ArgAction::Append)]
    validators: Vec<String>,

    /// List known validator tags
    #[arg(short = 'l', long = "list-validator-tags")]
    list: bool,

    /// Fail instead of skipping validators that need a connection
    #[arg(short, long)]
    strict: bool,

    /// Additional validator directory, searched before configured ones
    #[arg(long = "validators-dir", value_name = "DIR")]
    validators_dir: Vec<PathBuf>,

    /// Host capabilities XML for offline validation
    #[arg(long, value_name = "FILE")]
    caps: Option<PathBuf>,

    /// Domain capabilities XML for offline validation
    #[arg(long, value_name = "FILE")]
    domcaps: Vec<PathBuf>,

    /// TOML configuration file
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Print version
    #[arg(short = 'V', long = "version")]
    version: bool,
}

impl Args {
    fn tags(&self) -> Vec<String> {
        self.validators
            .iter()
            .map(|t| t.trim())
            .filter(|t| !t.is_empty())
            .map(str::to_string)
            .collect()
    }
}

fn main() {
    let args = Args::parse();

    if args.version {
        println!("virt-lint: {}", version_string(version()));
        return;
    }

    if let Err(e) = run(&args) {
        eprintln!("Validation failed: {e}");
        if let Some(hint) = e.user_message() {
            eprintln!("  hint: {hint}");
        }
        process::exit(1);
    }
}

fn load_config(args: &Args) -> VirtLintResult<LintConfig> {
    let mut config =
        LintConfig::load(args.config.as_deref())?.with_extra_locations(&args.validators_dir);
    if args.strict {
        config = config.with_strict(true);
    }
    if args.debug {
        config = config.with_debug_logging();
        config.logging.forward_to_log_crate = true;
    }
    Ok(config)
}

fn init_logging(config: &LintConfig, debug: bool) {
    let mut builder = env_logger::Builder::from_default_env();
    if debug {
        builder.filter_level(log::LevelFilter::Debug);
    }
    // A second init only happens in tests
    let _ = builder.try_init();

    if let Err(e) = logging::init_global_logging(&config.logging) {
        log::debug!("{e}");
    }
}

fn read_file(path: &Path) -> VirtLintResult<String> {
    Ok(fs::read_to_string(path)?)
}

fn read_domain(path: Option<&Path>) -> VirtLintResult<String> {
    match path {
        Some(path) => read_file(path),
        None => {
            let mut domxml = String::new();
            io::stdin().read_to_string(&mut domxml)?;
            Ok(domxml)
        }
    }
}

fn run(args: &Args) -> VirtLintResult<()> {
    let config = load_config(args)?;
    init_logging(&config, args.debug);

    if args.list {
        if args.debug {
            println!("Validator tags:");
        }
        for tag in VirtLint::list_validator_tags(&config)? {
            println!("{tag}");
        }
        return Ok(());
    }

    for line in validate(args, &config)? {
        println!("{line}");
    }
    Ok(())
}

fn registry_summary(vl: &VirtLint) -> String {
    let stats = vl.registry().get_statistics();
    let mut summary = stats.to_string();
    for location in &stats.missing_locations {
        summary.push_str(&format!(" absent={}", location.display()));
    }
    summary
}

/// Output lines of a successful run
fn validate(args: &Args, config: &LintConfig) -> VirtLintResult<Vec<String>> {
    let domxml = read_domain(args.path.as_deref())?;

    let conn = match &args.uri {
        Some(uri) => {
            log::debug!("Attempting to connect to hypervisor: '{uri}'");
            Some(connection::open(uri)?)
        }
        None => None,
    };

    let mut vl = VirtLint::with_config(config, conn)?;
    log::debug!("Validator registry: {}", registry_summary(&vl));

    if let Some(caps) = &args.caps {
        let xml = read_file(caps)?;
        vl.capabilities_set(Some(xml.as_str()))?;
    }
    for domcaps in &args.domcaps {
        vl.domain_capabilities_add(&read_file(domcaps)?)?;
    }

    vl.validate(&domxml, &args.tags(), config.strict)?;

    let lines = vl
        .warnings()?
        .iter()
        .map(|w| format!("Warning: {w}"))
        .collect();

    vl.release()?;
    Ok(lines)
}
