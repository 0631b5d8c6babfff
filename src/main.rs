use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use doclinks::commands::{self, RunOptions};
use doclinks::report;

#[derive(Parser)]
#[command(name = "doclinks", about = "Check links and anchors in markdown documentation")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[command(flatten)]
    flags: Flags,
}

#[derive(Subcommand)]
enum Commands {
    /// Crawl a markdown tree and check every link
    Check {
        /// Documentation root
        #[arg(default_value = ".")]
        root: PathBuf,
    },
    /// Check links in the doc comments of a TypeScript/JavaScript module
    Module {
        /// Local path or http(s) URL of the module
        entry: String,
    },
}

#[derive(Args)]
#[allow(clippy::struct_excessive_bools, reason = "independent CLI switches")]
struct Flags {
    /// Local links carry no file extension
    #[arg(long, global = true)]
    clean_urls: bool,
    /// File a directory link resolves to
    #[arg(long, global = true, value_name = "NAME")]
    index_file: Option<String>,
    /// Accept .html extensions on local links
    #[arg(long, global = true)]
    allow_html: bool,
    /// Also check the generated reference subtree
    #[arg(long, global = true)]
    include_reference: bool,
    /// Leave warnings out of the report
    #[arg(long, global = true)]
    hide_warnings: bool,
    /// Rewrite fixable issues in place
    #[arg(long, global = true)]
    fix: bool,
    /// Use and write the .doclinks-cache.json issue cache
    #[arg(long, global = true)]
    debug: bool,
    /// Debug logging on stderr
    #[arg(long, short, global = true)]
    verbose: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.flags.verbose);

    let options = RunOptions {
        allow_html: cli.flags.allow_html,
        clean_urls: cli.flags.clean_urls,
        debug: cli.flags.debug,
        fix: cli.flags.fix,
        hide_warnings: cli.flags.hide_warnings,
        include_reference: cli.flags.include_reference,
        index_file: cli.flags.index_file,
    };

    let result = match cli.command {
        Commands::Check { root } => commands::check(&root, &options),
        Commands::Module { entry } => commands::module(&entry, &options),
    };

    return match result {
        Ok(code) => code,
        Err(e) => {
            report::print_error(&e);
            ExitCode::FAILURE
        },
    };
}

/// Compact stderr logging; `RUST_LOG` wins, else `warn` (`debug` when verbose).
fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| return EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .init();
}
