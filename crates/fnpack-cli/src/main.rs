mod commands;

use clap::{Parser, Subcommand};
use clap_complete::Shell;
use commands::{EXIT_CONFIG_ERROR, EXIT_FAILURE};
use fnpack_runtime::CacheHints;
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(
    name = "fnpack",
    version,
    about = "Reproducible packager for serverless functions and shared layers"
)]
struct Cli {
    /// Path to the fnpack configuration file.
    #[arg(long, short, default_value = fnpack_schema::CONFIG_FILE, global = true)]
    config: PathBuf,

    /// Output results as structured JSON.
    #[arg(long, default_value_t = false, global = true)]
    json: bool,

    /// Enable verbose (debug) logging output.
    #[arg(short, long, default_value_t = false, global = true)]
    verbose: bool,

    /// Enable trace-level logging (more detailed than --verbose).
    #[arg(long, default_value_t = false, global = true)]
    trace: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Build every layer and function for every platform.
    Build {
        /// Distribution root for archives, staged assets, and the manifest.
        #[arg(long, default_value = "dist")]
        dist: PathBuf,
        /// Cache spec used for both import and export (e.g. type=local,src=.cache).
        #[arg(long)]
        cache: Option<String>,
        /// Cache import spec; overrides --cache.
        #[arg(long)]
        cache_from: Option<String>,
        /// Cache export spec; overrides --cache.
        #[arg(long)]
        cache_to: Option<String>,
        /// Push image targets to their registry.
        #[arg(long, default_value_t = false)]
        push: bool,
        /// Number of parallel build tasks.
        #[arg(short = 'j', long, default_value_t = 1)]
        concurrency: usize,
        /// Build backend: buildx or mock.
        #[arg(long, default_value = "buildx")]
        backend: String,
        /// Named buildx builder instance.
        #[arg(long)]
        builder: Option<String>,
    },
    /// Show the resolved build targets.
    Plan,
    /// Show which layers each function merges.
    Graph,
    /// Print the build recipe for one target.
    Render {
        /// Function or layer name.
        target: String,
        /// Platform to resolve the image tag for.
        #[arg(long)]
        platform: Option<String>,
    },
    /// Write a starter configuration file.
    Init {
        /// Overwrite an existing file.
        #[arg(long, default_value_t = false)]
        force: bool,
    },
    /// Check build prerequisites and the configuration.
    Doctor,
    /// Generate shell completions for bash, zsh, fish, elvish, or powershell.
    Completions {
        /// Shell to generate completions for.
        shell: Shell,
    },
    /// Generate man pages in the specified directory.
    ManPages {
        /// Output directory for man pages.
        #[arg(default_value = "man")]
        dir: PathBuf,
    },
}

fn main() -> ExitCode {
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        let msg = info.to_string();
        if msg.contains("Broken pipe")
            || msg.contains("broken pipe")
            || msg.contains("os error 32")
            || msg.contains("failed printing to stdout")
        {
            std::process::exit(0);
        }
        default_hook(info);
    }));

    let cli = Cli::parse();

    let default_level = if cli.trace {
        "trace"
    } else if cli.verbose {
        "debug"
    } else {
        "warn"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_env("FNPACK_LOG")
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .with_target(false)
        .without_time()
        .with_writer(std::io::stderr)
        .init();

    let json_output = cli.json;

    if let Commands::Build { backend, .. } = &cli.command {
        if backend == "buildx" && std::env::var("FNPACK_SKIP_PREREQS").as_deref() != Ok("1") {
            let missing = fnpack_runtime::check_buildx_prereqs("docker");
            if !missing.is_empty() {
                eprintln!("error: {}", fnpack_runtime::format_missing(&missing));
                return ExitCode::from(EXIT_FAILURE);
            }
        }
    }

    let result = match cli.command {
        Commands::Build {
            dist,
            cache,
            cache_from,
            cache_to,
            push,
            concurrency,
            backend,
            builder,
        } => {
            let cache = CacheHints {
                from: cache_from.or_else(|| cache.clone()),
                to: cache_to.or(cache),
            };
            commands::build::run(
                &cli.config,
                &commands::build::BuildArgs {
                    dist,
                    cache,
                    push,
                    concurrency,
                    backend,
                    builder,
                },
                json_output,
            )
        }
        Commands::Plan => commands::plan::run(&cli.config, json_output),
        Commands::Graph => commands::graph::run(&cli.config, json_output),
        Commands::Render { target, platform } => {
            commands::render::run(&cli.config, &target, platform.as_deref(), json_output)
        }
        Commands::Init { force } => commands::init::run(&cli.config, force, json_output),
        Commands::Doctor => commands::doctor::run(&cli.config, json_output),
        Commands::Completions { shell } => commands::completions::run::<Cli>(shell),
        Commands::ManPages { dir } => commands::man_pages::run::<Cli>(&dir),
    };

    match result {
        Ok(code) => ExitCode::from(code),
        Err(msg) => {
            eprintln!("error: {msg}");
            let code = if msg.starts_with(commands::CONFIG_ERROR_PREFIX) {
                EXIT_CONFIG_ERROR
            } else {
                EXIT_FAILURE
            };
            ExitCode::from(code)
        }
    }
}
