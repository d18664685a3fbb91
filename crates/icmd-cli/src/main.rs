//! `icmd` -- run one icommand assertion from the shell.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use icmd_harness::config::{mask_sensitive, ConfigLoader, ConfigSource};
use icmd_harness::{Check, Harness, HarnessError, RegexMatcher, Session, SessionContext};
use tracing::debug;

/// Assert on the outcome of an icommand.
#[derive(Parser, Debug)]
#[command(name = "icmd", version, about)]
struct Cli {
    /// Log harness activity at debug level.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Config file to load on top of the user and workspace files.
    #[arg(long, global = true, env = "ICMD_HARNESS_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run a command and check its exit status and output.
    Run(RunArgs),
    /// Print the effective configuration and where each value came from.
    Config,
}

#[derive(clap::Args, Debug)]
struct RunArgs {
    /// User to run as (default: the configured admin user).
    #[arg(long)]
    user: Option<String>,

    /// Zone of the user (default: the configured zone).
    #[arg(long)]
    zone: Option<String>,

    /// Session identifier (default: generated).
    #[arg(long)]
    session_id: Option<String>,

    /// Text that must appear on stdout. Repeatable.
    #[arg(long = "list", value_name = "TEXT", conflicts_with_all = ["error", "empty"])]
    list: Vec<String>,

    /// Text that must appear in the error output. Repeatable.
    #[arg(long = "error", value_name = "TEXT", conflicts_with = "empty")]
    error: Vec<String>,

    /// Stdout must be empty.
    #[arg(long)]
    empty: bool,

    /// Expect the command to fail.
    #[arg(long)]
    fail: bool,

    /// Treat expected text as regular expressions.
    #[arg(long)]
    regex: bool,

    /// Interrupt the command after this many seconds.
    #[arg(long, value_name = "SECS")]
    timeout: Option<u64>,

    /// The command line to run.
    #[arg(last = true, required = true, num_args = 1..)]
    command: Vec<String>,
}

impl RunArgs {
    fn check(&self) -> Check {
        if !self.list.is_empty() {
            Check::List(self.list.clone())
        } else if !self.error.is_empty() {
            Check::Error(self.error.clone())
        } else if self.empty {
            Check::Empty
        } else {
            Check::Any
        }
    }

    /// Re-quote the trailing arguments into one command line.
    fn command_line(&self) -> String {
        shell_join(&self.command)
    }
}

fn shell_join(args: &[String]) -> String {
    args.iter()
        .map(|arg| {
            let plain = !arg.is_empty()
                && arg
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || "-_./:=%@+,".contains(c));
            if plain {
                arg.clone()
            } else {
                format!("'{}'", arg.replace('\'', r"'\''"))
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    icmd_harness::logging::init_cli_logging(cli.verbose);

    match dispatch(cli) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::from(2)
        }
    }
}

fn dispatch(cli: Cli) -> anyhow::Result<ExitCode> {
    let mut loader = ConfigLoader::new();
    if let Some(path) = cli.config {
        loader = loader.with_explicit_path(path);
    }
    let effective = loader.load()?;

    match cli.command {
        Commands::Config => {
            print_config(&effective);
            Ok(ExitCode::SUCCESS)
        }
        Commands::Run(args) => run(&effective.config, args),
    }
}

fn run(config: &icmd_harness::HarnessConfig, args: RunArgs) -> anyhow::Result<ExitCode> {
    let mut config = config.clone();
    if let Some(secs) = args.timeout {
        config.command_timeout_secs = Some(secs);
    }
    if let Some(zone) = &args.zone {
        config.zone = zone.clone();
    }
    let user = args.user.clone().unwrap_or_else(|| config.admin_user.clone());

    let mut builder = Session::builder(&user, &config.zone)
        .host(&config.host)
        .port(config.port)
        .default_resource(&config.default_resource);
    if let Some(id) = &args.session_id {
        builder = builder.session_id(id);
    }
    if let Some(dir) = &config.bin_dir {
        builder = builder.bin_dir(dir.clone());
    }
    let session = builder.build()?;
    debug!(
        user = session.user_name(),
        zone = session.zone_name(),
        session_id = session.session_id(),
        "session ready"
    );

    let command_line = args.command_line();
    let check = args.check();
    let harness = Harness::from_config(&config);
    let outcome = match (args.regex, args.fail) {
        (false, false) => harness.assert_icmd(&session, &command_line, check),
        (false, true) => harness.assert_icmd_fail(&session, &command_line, check),
        (true, false) => harness
            .with_matcher(RegexMatcher)
            .assert_icmd(&session, &command_line, check),
        (true, true) => harness
            .with_matcher(RegexMatcher)
            .assert_icmd_fail(&session, &command_line, check),
    };

    match outcome {
        Ok(result) => {
            print!("{}", result.stdout);
            eprint!("{}", result.stderr);
            Ok(ExitCode::SUCCESS)
        }
        Err(HarnessError::AssertionMismatch { diagnostic }) => {
            eprintln!("FAIL\n{diagnostic}");
            Ok(ExitCode::from(1))
        }
        Err(e) => Err(e.into()),
    }
}

fn print_config(effective: &icmd_harness::config::EffectiveConfig) {
    let mut table = match toml::Value::try_from(&effective.config) {
        Ok(toml::Value::Table(table)) => table,
        _ => return,
    };
    for key in ["admin_password", "test_password"] {
        if let Some(toml::Value::String(secret)) = table.get_mut(key) {
            *secret = mask_sensitive(secret);
        }
    }
    for (key, value) in &table {
        let source = effective
            .sources
            .get(key)
            .cloned()
            .unwrap_or(ConfigSource::BuiltinDefault);
        println!("{key} = {value}  # {source}");
    }
    for path in &effective.source_files {
        println!("# loaded {}", path.display());
    }
}
