//! `hopic` CLI entry point: parses the global options and the
//! nine subcommands, wires up `tracing`, and maps the top-level `Result`'s
//! error to a process exit code via [`exit::exit_code_for`].

mod build;
mod checkout;
mod credentials;
mod exit;
mod info;
mod prepare;
mod submit;
mod unbundle;
mod vars;
mod workspace;

use camino::Utf8PathBuf;
use clap::{Parser, Subcommand};
use hopic_core::ObservabilityConfig;

#[derive(Parser, Debug)]
#[command(name = "hopic", version, about = "Change-integration and build-orchestration engine")]
struct Cli {
    /// Workspace root to operate on.
    #[arg(long, global = true, default_value = ".")]
    workspace: Utf8PathBuf,

    /// Path to the pipeline config file (default: discovered from `workspace`).
    #[arg(long, global = true)]
    config: Option<Utf8PathBuf>,

    /// Environment variable to make available for config interpolation (repeatable).
    #[arg(long = "whitelisted-var", global = true)]
    whitelisted_vars: Vec<String>,

    /// Render `VERSION`/`PUBLISH_VERSION` as a publishable release rather than a dev build.
    #[arg(long, global = true)]
    publishable_version: bool,

    /// Suppress all but error-level logging.
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Increase log verbosity (-v debug, -vv trace).
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Emit machine-readable projections as JSON even on a TTY.
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Clones or updates the workspace to the requested remote/ref/commit.
    CheckoutSourceTree {
        #[arg(long)]
        target_remote: String,
        #[arg(long)]
        target_ref: String,
        #[arg(long)]
        target_commit: Option<String>,
        #[arg(long)]
        clean: bool,
        #[arg(long)]
        ignore_initial_submodule_checkout_failure: bool,
    },
    /// Prepares the source tree for one of the three change modes.
    PrepareSourceTree {
        #[arg(long)]
        target_ref: String,
        #[arg(long)]
        author_name: Option<String>,
        #[arg(long)]
        author_email: Option<String>,
        #[arg(long)]
        author_date: Option<String>,
        #[arg(long)]
        commit_date: Option<String>,
        #[command(subcommand)]
        mode: PrepareCommands,
    },
    /// Runs the selected phases/variants.
    Build {
        #[arg(long = "phase")]
        phases: Vec<String>,
        #[arg(long = "variant")]
        variants: Vec<String>,
        #[arg(long)]
        dry_run: bool,
    },
    /// Fast-forwards configured worktree refs from a bundle.
    UnbundleWorktrees {
        #[arg(long)]
        bundle: Utf8PathBuf,
    },
    /// Pushes the prepared commit and runs post-submit.
    Submit {
        #[arg(long)]
        target_remote: Option<String>,
    },
    /// Prints the whitelisted config projection outer drivers consume.
    Getinfo {
        #[arg(long = "phase")]
        phases: Vec<String>,
        #[arg(long = "variant")]
        variants: Vec<String>,
        #[arg(long)]
        post_submit: bool,
    },
    /// Dumps the fully resolved config.
    ShowConfig,
    /// Dumps the environment variables a build would pass through.
    ShowEnv,
    /// Exits 0 iff the current target ref may publish.
    MayPublish,
}

#[derive(Subcommand, Debug)]
enum PrepareCommands {
    /// Merges a change request's source ref into `target-ref`.
    MergeChangeRequest {
        #[arg(long)]
        source_remote: String,
        #[arg(long)]
        source_ref: String,
        #[arg(long)]
        change_request: Option<String>,
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        description: Option<String>,
        #[arg(long = "approved-by")]
        approved_by: Vec<String>,
    },
    /// Applies a configured modality-source-preparation step.
    ApplyModalityChange {
        #[arg(long)]
        name: String,
    },
    /// Bumps the configured version file.
    BumpVersion,
}

fn main() {
    let cli = Cli::parse();

    let cfg = ObservabilityConfig { json: cli.json };
    let filter = hopic_core::env_filter(cli.quiet, cli.verbose, "info");
    hopic_core::init(cfg, filter);

    if let Err(err) = run(&cli) {
        tracing::error!("{err:#}");
        std::process::exit(exit::exit_code_for(&err));
    }
}

fn run(cli: &Cli) -> anyhow::Result<()> {
    match &cli.command {
        Commands::CheckoutSourceTree { target_remote, target_ref, target_commit, clean, ignore_initial_submodule_checkout_failure } => {
            let args = checkout::CheckoutArgs {
                target_remote: target_remote.clone(),
                target_ref: target_ref.clone(),
                target_commit: target_commit.clone(),
                clean: *clean,
                ignore_initial_submodule_checkout_failure: *ignore_initial_submodule_checkout_failure,
            };
            let commit = checkout::run(&cli.workspace, &args)?;
            println!("{commit}");
        }
        Commands::PrepareSourceTree { target_ref, author_name, author_email, author_date, commit_date, mode } => {
            let loaded = workspace::load(&cli.workspace, cli.config.as_deref(), &cli.whitelisted_vars)?;
            let identity = prepare::IdentityArgs {
                author_name: author_name.clone(),
                author_email: author_email.clone(),
                author_date: author_date.clone(),
                commit_date: commit_date.clone(),
            };
            let submode = match mode {
                PrepareCommands::MergeChangeRequest { source_remote, source_ref, change_request, title, description, approved_by } => {
                    prepare::SubMode::MergeChangeRequest {
                        source_remote: source_remote.clone(),
                        source_ref: source_ref.clone(),
                        change_request: change_request.clone(),
                        title: title.clone(),
                        description: description.clone(),
                        approved_by: approved_by.clone(),
                    }
                }
                PrepareCommands::ApplyModalityChange { name } => prepare::SubMode::ApplyModalityChange { name: name.clone() },
                PrepareCommands::BumpVersion => prepare::SubMode::BumpVersion,
            };
            let outcome = prepare::run(&loaded, target_ref, &identity, submode, env!("CARGO_PKG_VERSION"))?;
            print_json(&outcome, cli.json)?;
        }
        Commands::Build { phases, variants, dry_run } => {
            let loaded = workspace::load(&cli.workspace, cli.config.as_deref(), &cli.whitelisted_vars)?;
            let args = build::BuildArgs {
                phases: phases.clone(),
                variants: variants.clone(),
                dry_run: *dry_run,
                publishable_version: cli.publishable_version,
            };
            let outcomes = build::run(&loaded, &args)?;
            print_json(&outcomes, cli.json)?;
        }
        Commands::UnbundleWorktrees { bundle } => {
            let refspecs = unbundle::run(&cli.workspace, bundle)?;
            print_json(&refspecs, cli.json)?;
        }
        Commands::Submit { target_remote } => {
            let loaded = workspace::load(&cli.workspace, cli.config.as_deref(), &cli.whitelisted_vars)?;
            let outcome = submit::run(&cli.workspace, &loaded.config, target_remote.as_deref())?;
            print_json(&outcome, cli.json)?;
        }
        Commands::Getinfo { phases, variants, post_submit } => {
            let loaded = workspace::load(&cli.workspace, cli.config.as_deref(), &cli.whitelisted_vars)?;
            let args = info::GetinfoArgs { phases: phases.clone(), variants: variants.clone(), post_submit: *post_submit };
            let projection = info::getinfo(&loaded, &args)?;
            println!("{}", serde_json::to_string_pretty(&projection)?);
        }
        Commands::ShowConfig => {
            let loaded = workspace::load(&cli.workspace, cli.config.as_deref(), &cli.whitelisted_vars)?;
            println!("{}", serde_json::to_string_pretty(&info::show_config(&loaded)?)?);
        }
        Commands::ShowEnv => {
            let loaded = workspace::load(&cli.workspace, cli.config.as_deref(), &cli.whitelisted_vars)?;
            let env = info::show_env(&loaded, &cli.whitelisted_vars);
            println!("{}", serde_json::to_string_pretty(&env)?);
        }
        Commands::MayPublish => {
            let loaded = workspace::load(&cli.workspace, cli.config.as_deref(), &cli.whitelisted_vars)?;
            if !info::may_publish(&cli.workspace, &loaded.config)? {
                std::process::exit(1);
            }
        }
    }
    Ok(())
}

fn print_json<T: serde::Serialize>(value: &T, pretty: bool) -> anyhow::Result<()> {
    if pretty {
        println!("{}", serde_json::to_string_pretty(value)?);
    } else {
        println!("{}", serde_json::to_string(value)?);
    }
    Ok(())
}
