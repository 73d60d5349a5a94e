use std::io::IsTerminal;
use std::path::{Path, PathBuf};

use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use miette::{Context, IntoDiagnostic, Result};
use tracing_subscriber::EnvFilter;

use patchwise_core::{
    ChangedFile, OutputFormat, PatchwiseConfig, PullTarget, RunOverrides, RunSettings, SoftResult,
};
use patchwise_difflens::filter::{DiffFilter, SkippedFile};
use patchwise_difflens::parser::{parse_unified_diff, strip_heredoc};
use patchwise_review::context::{read_guideline_files, ContextLoader};
use patchwise_review::github::{GitHubClient, PullRequestInfo, PullRequestSink};
use patchwise_review::llm::LlmClient;
use patchwise_review::pipeline::{ReviewContext, ReviewPipeline};
use patchwise_review::publish::{CommentSink, ConsoleSink};

const CONFIG_FILE: &str = ".patchwise.toml";

#[derive(Parser)]
#[command(
    name = "patchwise",
    version,
    about = "AI review comments for GitHub pull requests",
    long_about = "Patchwise reviews each file of a pull request's latest commit with a\n\
                  generative model and posts the suggestions as line-anchored review comments.\n\n\
                  Examples:\n  \
                    patchwise review                       Review the PR named by PR_NUMBER and GITHUB_REPOSITORY\n  \
                    patchwise review --pr owner/repo#42    Review a specific pull request\n  \
                    patchwise review --dry-run             Print comments instead of posting them\n  \
                    patchwise doctor                       Check setup and environment"
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    /// Path to configuration file (default: .patchwise.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Output format
    #[arg(
        long,
        global = true,
        default_value = "text",
        long_help = "Output format for command results.\n\n\
                       Formats:\n  \
                         text      Human-readable summary (default)\n  \
                         json      Machine-readable JSON with camelCase keys\n  \
                         markdown  GitHub-flavored Markdown"
    )]
    format: OutputFormat,

    /// Enable debug logging
    #[arg(long, short, global = true)]
    verbose: bool,

    /// When to use colors
    #[arg(long, global = true, default_value = "auto")]
    color: ColorChoice,
}

#[derive(Subcommand)]
enum Command {
    /// Review a pull request and post comments
    #[command(long_about = "Review a pull request and post comments.\n\n\
        Fetches the changed files of the most recent commit, asks the model for\n\
        'line N: comment' suggestions per file, and posts them as inline review\n\
        comments (at most review.max_comments per run). Responses that cannot be\n\
        anchored are posted as one issue comment per file.\n\n\
        Required environment: GEMINI_API_KEY (or OPENAI_API_KEY), GITHUB_TOKEN,\n\
        PR_NUMBER and GITHUB_REPOSITORY (or --pr).\n\n\
        Examples:\n  patchwise review\n  patchwise review --pr octocat/hello-world#42 --dry-run\n  \
        patchwise review --diff-file changes.patch")]
    Review {
        /// Pull request reference (owner/repo#number)
        #[arg(long)]
        pr: Option<String>,
        /// Review this unified diff instead of the latest commit's patches
        #[arg(long)]
        diff_file: Option<PathBuf>,
        /// Print comments to stdout instead of posting them
        #[arg(long)]
        dry_run: bool,
        /// Extra glob pattern of files to skip (repeatable)
        #[arg(long = "skip-pattern")]
        skip_patterns: Vec<String>,
    },
    /// Create a default .patchwise.toml configuration file
    #[command(long_about = "Create a default .patchwise.toml configuration file.\n\n\
        Generates a commented template with all available options.\n\
        Fails if .patchwise.toml already exists.")]
    Init,
    /// Check your Patchwise setup and environment
    #[command(long_about = "Check your Patchwise setup and environment.\n\n\
        Reports the config file, model provider and key, GitHub token, target pull\n\
        request, and storage settings. Use --format json for machine-readable output.")]
    Doctor,
    /// Generate shell completion scripts
    #[command(hide = true)]
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

#[derive(Clone, PartialEq, Eq, ValueEnum)]
enum ColorChoice {
    /// Auto-detect based on terminal
    Auto,
    /// Always use colors
    Always,
    /// Never use colors
    Never,
}

fn print_welcome(use_color: bool) {
    let version = env!("CARGO_PKG_VERSION");

    if use_color {
        println!("\x1b[1mpatchwise\x1b[0m v{version}: AI review comments for pull requests\n");
        println!("Commands:");
        println!("  \x1b[32mreview\x1b[0m    Review a pull request and post comments");
        println!("  \x1b[32mdoctor\x1b[0m    Check your setup and environment");
        println!("  \x1b[32minit\x1b[0m      Create default configuration\n");
    } else {
        println!("patchwise v{version}: AI review comments for pull requests\n");
        println!("Commands:");
        println!("  review    Review a pull request and post comments");
        println!("  doctor    Check your setup and environment");
        println!("  init      Create default configuration\n");
    }

    println!("Run 'patchwise <command> --help' for details.");
}

fn init_tracing(verbose: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if verbose {
            EnvFilter::new("warn,patchwise=debug")
        } else {
            EnvFilter::new("warn,patchwise=info")
        }
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn env_var(key: &str) -> Option<String> {
    std::env::var(key).ok()
}

fn load_config(path: Option<&Path>) -> Result<PatchwiseConfig> {
    let mut config = match path {
        Some(path) => PatchwiseConfig::from_file(path)?,
        None => {
            let default_path = Path::new(CONFIG_FILE);
            if default_path.exists() {
                PatchwiseConfig::from_file(default_path)?
            } else {
                PatchwiseConfig::default()
            }
        }
    };
    config.apply_env(env_var);
    Ok(config)
}

/// Diff supplied up front, from `--diff-file` or `INPUT_DIFF`.
fn read_diff_input(file: Option<&Path>) -> Result<Option<String>> {
    match file {
        Some(path) => std::fs::read_to_string(path)
            .into_diagnostic()
            .wrap_err(format!("reading {}", path.display()))
            .map(Some),
        None => Ok(env_var("INPUT_DIFF").filter(|d| !d.trim().is_empty())),
    }
}

/// Files to review, the commit to anchor on, and what was filtered out.
struct ReviewInput {
    files: Vec<ChangedFile>,
    commit: Option<String>,
    skipped: Vec<SkippedFile>,
}

async fn collect_files(
    github: &GitHubClient,
    target: &PullTarget,
    filter: &DiffFilter,
    diff_input: Option<String>,
    pull: Option<&PullRequestInfo>,
) -> ReviewInput {
    if let Some(diff) = diff_input {
        match SoftResult::capture(parse_unified_diff(strip_heredoc(&diff)), "diff parsing") {
            SoftResult::Success(files) if !files.is_empty() => {
                let result = filter.filter(files);
                tracing::info!(
                    kept = result.kept.len(),
                    skipped = result.skipped.len(),
                    "using supplied diff"
                );
                return ReviewInput {
                    files: result.kept,
                    commit: pull.map(|p| p.head_sha.clone()),
                    skipped: result.skipped,
                };
            }
            _ => tracing::warn!("supplied diff has no files; fetching from GitHub"),
        }
    }

    match github.latest_commit_changes(target, filter).await {
        SoftResult::Success(changes) => ReviewInput {
            files: changes.files,
            commit: Some(changes.sha),
            skipped: changes.skipped,
        },
        SoftResult::Empty => {
            // No commit to anchor on, so every review becomes an issue comment
            let files =
                SoftResult::capture(github.pull_files(target).await, "pull request file listing")
                    .unwrap_or_default();
            let result = filter.filter(files);
            ReviewInput {
                files: result.kept,
                commit: None,
                skipped: result.skipped,
            }
        }
        SoftResult::Failed(_) => ReviewInput {
            files: Vec::new(),
            commit: None,
            skipped: Vec::new(),
        },
    }
}

async fn run_review(
    mut config: PatchwiseConfig,
    overrides: RunOverrides,
    diff_file: Option<&Path>,
    format: OutputFormat,
    verbose: bool,
) -> Result<()> {
    // Fails before any remote client exists when required values are missing
    let settings = RunSettings::resolve(&config, env_var, &overrides)?;
    config.llm.api_key = Some(settings.llm_api_key.clone());
    let target = settings.target.clone();
    tracing::info!(pr = %target, model = %config.llm.model, dry_run = overrides.dry_run, "starting review");

    let diff_input = read_diff_input(diff_file)?;

    let github = GitHubClient::new(settings.github_token.as_deref())?;
    let llm = LlmClient::new(&config.llm)?;
    let loader = ContextLoader::new(&config.storage)?;
    let filter = DiffFilter::from_config(&config.review);

    let pull = SoftResult::capture(github.get_pull_request(&target).await, "pull request lookup")
        .into_option();

    let mut guidelines = loader.load_guidelines().await.unwrap_or_default();
    guidelines.push_str(&read_guideline_files(&config.review.guideline_files));
    let history = loader.load_history().await.unwrap_or_default();

    let input = collect_files(&github, &target, &filter, diff_input, pull.as_ref()).await;
    if input.files.is_empty() {
        tracing::info!(pr = %target, "no reviewable files");
    }

    let context = ReviewContext {
        guidelines,
        history,
        pull_title: pull.as_ref().map(|p| p.title.clone()),
        pull_body: pull.as_ref().and_then(|p| p.body.clone()),
    };

    let sink: Box<dyn CommentSink> = if overrides.dry_run {
        Box::new(ConsoleSink)
    } else {
        Box::new(PullRequestSink::new(github.clone(), target.clone()))
    };

    let pipeline = ReviewPipeline::new(Box::new(llm), sink, config.review.clone())
        .with_progress(std::io::stderr().is_terminal() && !verbose);
    let report = pipeline
        .run(&input.files, input.commit.as_deref(), &context, input.skipped)
        .await;

    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&report).into_diagnostic()?);
        }
        OutputFormat::Markdown => print!("{}", report.to_markdown()),
        OutputFormat::Text => print!("{report}"),
    }

    Ok(())
}

#[derive(serde::Serialize)]
struct CheckResult {
    name: &'static str,
    status: &'static str,
    detail: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    hint: Option<String>,
}

impl CheckResult {
    fn pass(name: &'static str, detail: impl Into<String>) -> Self {
        Self {
            name,
            status: "pass",
            detail: detail.into(),
            hint: None,
        }
    }

    fn fail(name: &'static str, detail: impl Into<String>, hint: impl Into<String>) -> Self {
        Self {
            name,
            status: "fail",
            detail: detail.into(),
            hint: Some(hint.into()),
        }
    }

    fn info(name: &'static str, detail: impl Into<String>) -> Self {
        Self {
            name,
            status: "info",
            detail: detail.into(),
            hint: None,
        }
    }

    fn symbol(&self, use_color: bool) -> &'static str {
        match (self.status, use_color) {
            ("pass", true) => "\x1b[32m\u{2713}\x1b[0m",
            ("fail", true) => "\x1b[31m\u{2717}\x1b[0m",
            (_, true) => "\x1b[33m~\x1b[0m",
            ("pass", false) => "\u{2713}",
            ("fail", false) => "\u{2717}",
            (_, false) => "~",
        }
    }
}

fn doctor_checks(
    config: &PatchwiseConfig,
    config_path: &Path,
    env: impl Fn(&str) -> Option<String>,
) -> Vec<CheckResult> {
    let get = |key: &str| env(key).filter(|v| !v.trim().is_empty());
    let mut checks = Vec::new();

    if config_path.exists() {
        checks.push(CheckResult::pass(
            "config_file",
            format!("{} found", config_path.display()),
        ));
    } else {
        checks.push(CheckResult::info(
            "config_file",
            format!("{} not found, using defaults", config_path.display()),
        ));
    }

    checks.push(CheckResult::pass(
        "llm_provider",
        format!("{} (model: {})", config.llm.provider, config.llm.model),
    ));
    let llm_var = config.llm.api_key_env_var();
    if config.llm.api_key.is_some() || get(llm_var).is_some() {
        checks.push(CheckResult::pass("llm_api_key", format!("{llm_var} set")));
    } else {
        checks.push(CheckResult::fail(
            "llm_api_key",
            format!("{llm_var} not set"),
            format!("export {llm_var}=... or set api_key in {CONFIG_FILE}"),
        ));
    }

    if get("GITHUB_TOKEN").or_else(|| get("GH_TOKEN")).is_some() {
        checks.push(CheckResult::pass("github_token", "GITHUB_TOKEN set"));
    } else {
        checks.push(CheckResult::fail(
            "github_token",
            "GITHUB_TOKEN not set",
            "export GITHUB_TOKEN=... (not needed with --dry-run)",
        ));
    }

    match (get("GITHUB_REPOSITORY"), get("PR_NUMBER")) {
        (Some(repository), Some(number)) => match PullTarget::from_parts(&repository, &number) {
            Ok(target) => checks.push(CheckResult::pass("pull_request", target.to_string())),
            Err(e) => checks.push(CheckResult::fail(
                "pull_request",
                e.to_string(),
                "GITHUB_REPOSITORY must be owner/repo and PR_NUMBER a number",
            )),
        },
        _ => checks.push(CheckResult::fail(
            "pull_request",
            "PR_NUMBER or GITHUB_REPOSITORY not set",
            "export both, or pass --pr owner/repo#number to review",
        )),
    }

    match &config.storage.bucket {
        Some(bucket) => checks.push(CheckResult::pass(
            "guidelines",
            format!("gs://{bucket}/{}*.md", config.storage.guidelines_prefix),
        )),
        None => checks.push(CheckResult::info(
            "guidelines",
            "no storage bucket (set GUIDELINES_BUCKET to load guidelines)",
        )),
    }

    for file in &config.review.guideline_files {
        if Path::new(file).is_file() {
            checks.push(CheckResult::pass("guideline_file", file.clone()));
        } else {
            checks.push(CheckResult::info(
                "guideline_file",
                format!("{file} not found, skipped"),
            ));
        }
    }

    checks.push(CheckResult::info(
        "history",
        if config.storage.history_enabled {
            "enabled"
        } else {
            "disabled"
        },
    ));

    checks
}

fn run_doctor(
    config: &PatchwiseConfig,
    config_path: &Path,
    format: OutputFormat,
    use_color: bool,
) -> Result<()> {
    let checks = doctor_checks(config, config_path, env_var);
    let version = env!("CARGO_PKG_VERSION");

    match format {
        OutputFormat::Json => {
            let json = serde_json::json!({
                "version": version,
                "checks": checks,
            });
            println!("{}", serde_json::to_string_pretty(&json).into_diagnostic()?);
        }
        _ => {
            println!("Patchwise v{version}: environment check\n");

            for check in &checks {
                let label = check.name.replace('_', " ");
                println!(
                    "  {} {label:<20} {}",
                    check.symbol(use_color),
                    check.detail
                );
                if let Some(hint) = &check.hint {
                    println!("    hint: {hint}");
                }
            }

            let passed = checks.iter().filter(|c| c.status == "pass").count();
            let failed = checks.iter().filter(|c| c.status == "fail").count();
            let info = checks.iter().filter(|c| c.status == "info").count();
            println!("\n{passed} checks passed, {failed} failed, {info} info");
        }
    }

    Ok(())
}

const DEFAULT_CONFIG: &str = r#"# Patchwise Configuration
# Environment variables override these values; CLI flags override both.

[llm]
# provider = "gemini"            # "gemini" or "openai" (any OpenAI-compatible endpoint)
# model = "gemini-2.0-flash"     # GEMINI_MODEL overrides
# base_url = "https://generativelanguage.googleapis.com"
# API key: GEMINI_API_KEY / OPENAI_API_KEY

[review]
# max_comments = 20              # inline comments per run, across all files
# max_diff_chars = 100000        # longer diffs are truncated
# skip_patterns = ["docs/**", "*.pb.go"]
# guideline_files = ["README.md"] # local files appended to guidelines

[storage]
# bucket = "my-review-context"   # GUIDELINES_BUCKET overrides
# guidelines_prefix = "guidelines/"
# history_prefix = "history/"
# history_enabled = false
# access_token = "..."           # STORAGE_ACCESS_TOKEN overrides
"#;

#[tokio::main]
async fn main() -> Result<()> {
    miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new()
                .terminal_links(true)
                .build(),
        )
    }))
    .into_diagnostic()?;
    human_panic::setup_panic!();

    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = load_config(cli.config.as_deref())?;

    let use_color = match cli.color {
        ColorChoice::Always => true,
        ColorChoice::Never => false,
        ColorChoice::Auto => std::io::stdout().is_terminal() && std::env::var("NO_COLOR").is_err(),
    };

    match cli.command {
        None => print_welcome(use_color),
        Some(Command::Review {
            pr,
            diff_file,
            dry_run,
            skip_patterns,
        }) => {
            let mut config = config;
            config.review.skip_patterns.extend(skip_patterns);
            let target = pr.as_deref().map(str::parse::<PullTarget>).transpose()?;
            let overrides = RunOverrides { target, dry_run };
            run_review(config, overrides, diff_file.as_deref(), cli.format, cli.verbose).await?;
        }
        Some(Command::Init) => {
            let path = Path::new(CONFIG_FILE);
            if path.exists() {
                miette::bail!("{CONFIG_FILE} already exists");
            }
            std::fs::write(path, DEFAULT_CONFIG).into_diagnostic()?;
            println!("Created {CONFIG_FILE} with default configuration");
        }
        Some(Command::Doctor) => {
            let config_path = cli
                .config
                .clone()
                .unwrap_or_else(|| PathBuf::from(CONFIG_FILE));
            run_doctor(&config, &config_path, cli.format, use_color)?;
        }
        Some(Command::Completions { shell }) => {
            let mut cmd = Cli::command();
            clap_complete::generate(shell, &mut cmd, "patchwise", &mut std::io::stdout());
        }
    }

    Ok(())
}
