//! treemend - iterative, rule-driven source repair
//!
//! The `treemend` command scans a source tree, patches or rewrites damaged
//! files, and re-runs the project's checks until they pass.
//!
//! ## Commands
//!
//! - `run`: repair and verify until convergence or exhaustion
//! - `classify`: show each file's damage tier without changing anything
//! - `rules`: list the active rule table in application order
//! - `checks`: list the configured verification checks
//! - `relax`: write the tool configs for a strictness level
//!
//! Exit codes for `run`: 0 converged, 1 exhausted, 2 fatal error.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::{error, warn, Level};

use treemend_ci::{builtin_checks, resolve_checks, ConvergenceController, ProcessHarness};
use treemend_core::scanner::relative_display;
use treemend_core::{
    render_summary_md, EngineConfig, RepairEngine, RuleProfile, Tier, TreemendError,
};

const EXIT_OK: u8 = 0;
const EXIT_FATAL: u8 = 2;

#[derive(Parser, Debug)]
#[command(name = "treemend")]
#[command(version = treemend_core::VERSION)]
#[command(about = "Iterative, rule-driven source repair", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Repair a tree and re-verify until the checks pass
    Run {
        /// Root of the tree to repair
        root: PathBuf,

        /// Checks to run (comma-separated, default: all enabled)
        #[arg(long, value_delimiter = ',')]
        checks: Option<Vec<String>>,

        /// Maximum repair iterations
        #[arg(long)]
        iterations: Option<u32>,

        /// Classify and repair in memory only; write nothing, run no checks
        #[arg(long)]
        dry_run: bool,

        /// Rule profile: smart or aggressive
        #[arg(long)]
        profile: Option<RuleProfile>,

        /// Config file (default: <ROOT>/treemend.toml if present)
        #[arg(long)]
        config: Option<PathBuf>,

        /// Wall-clock limit for the whole run
        #[arg(long)]
        deadline_secs: Option<u64>,

        /// Repair workers (0 = one per core)
        #[arg(long)]
        workers: Option<usize>,

        /// Directory for run reports (default: <ROOT>/.treemend/runs)
        #[arg(long)]
        report_dir: Option<PathBuf>,

        /// Never relax tool strictness
        #[arg(long)]
        no_escalate: bool,
    },

    /// Show the damage tier of every file
    Classify {
        /// Root of the tree to classify
        root: PathBuf,

        /// Config file (default: <ROOT>/treemend.toml if present)
        #[arg(long)]
        config: Option<PathBuf>,

        /// Print rows as a JSON array
        #[arg(long)]
        json_output: bool,
    },

    /// List the active rules in application order
    Rules {
        /// Rule profile: smart or aggressive
        #[arg(long)]
        profile: Option<RuleProfile>,

        /// Config file
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// List the configured verification checks
    Checks {
        /// Config file
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Write the relaxed tool configs for a strictness level
    Relax {
        /// Root of the tree
        root: PathBuf,

        /// Strictness level (0 = strictest, writes nothing)
        #[arg(long)]
        level: u32,

        /// Config file (default: <ROOT>/treemend.toml if present)
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Setup logging
    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    treemend_core::init_tracing(cli.json, level);

    match dispatch(cli.command).await {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            error!(error = %format!("{e:#}"), "treemend failed");
            eprintln!("error: {e:#}");
            ExitCode::from(EXIT_FATAL)
        }
    }
}

async fn dispatch(command: Commands) -> Result<u8> {
    match command {
        Commands::Run {
            root,
            checks,
            iterations,
            dry_run,
            profile,
            config,
            deadline_secs,
            workers,
            report_dir,
            no_escalate,
        } => {
            let mut engine_config = load_config(config.as_deref(), Some(&root))?;
            let overrides = RunOverrides {
                checks,
                iterations,
                dry_run,
                profile,
                deadline_secs,
                workers,
                report_dir,
                no_escalate,
            };
            overrides.apply(&mut engine_config);
            cmd_run(&root, engine_config).await
        }
        Commands::Classify {
            root,
            config,
            json_output,
        } => {
            let engine_config = load_config(config.as_deref(), Some(&root))?;
            cmd_classify(&root, engine_config, json_output)
        }
        Commands::Rules { profile, config } => {
            let mut engine_config = load_config(config.as_deref(), None)?;
            if let Some(profile) = profile {
                engine_config.transform.profile = profile;
            }
            cmd_rules(engine_config)
        }
        Commands::Checks { config } => cmd_checks(load_config(config.as_deref(), None)?),
        Commands::Relax {
            root,
            level,
            config,
        } => {
            let engine_config = load_config(config.as_deref(), Some(&root))?;
            cmd_relax(&root, level, engine_config)
        }
    }
}

/// Explicit `--config`, else `<root>/treemend.toml`, else defaults.
fn load_config(path: Option<&Path>, root: Option<&Path>) -> Result<EngineConfig> {
    match (path, root) {
        (Some(path), _) => EngineConfig::load(path)
            .with_context(|| format!("Failed to load config {}", path.display())),
        (None, Some(root)) => EngineConfig::discover(root)
            .with_context(|| format!("Failed to load config under {}", root.display())),
        (None, None) => Ok(EngineConfig::default()),
    }
}

/// Command-line values that take precedence over the config file.
#[derive(Debug, Default)]
struct RunOverrides {
    checks: Option<Vec<String>>,
    iterations: Option<u32>,
    dry_run: bool,
    profile: Option<RuleProfile>,
    deadline_secs: Option<u64>,
    workers: Option<usize>,
    report_dir: Option<PathBuf>,
    no_escalate: bool,
}

impl RunOverrides {
    fn apply(self, config: &mut EngineConfig) {
        if let Some(checks) = self.checks {
            config.controller.only_checks = checks
                .into_iter()
                .map(|c| c.trim().to_string())
                .filter(|c| !c.is_empty())
                .collect();
        }
        if let Some(cap) = self.iterations {
            config.controller.iteration_cap = cap;
        }
        if self.dry_run {
            config.controller.dry_run = true;
        }
        if let Some(profile) = self.profile {
            config.transform.profile = profile;
        }
        if let Some(secs) = self.deadline_secs {
            config.controller.deadline_secs = Some(secs);
        }
        if let Some(workers) = self.workers {
            config.controller.workers = workers;
        }
        if let Some(dir) = self.report_dir {
            config.report.dir = Some(dir);
        }
        if self.no_escalate {
            config.controller.escalate = false;
        }
    }
}

// ---------------------------------------------------------------------------
// run
// ---------------------------------------------------------------------------

async fn cmd_run(root: &Path, config: EngineConfig) -> Result<u8> {
    let checks = resolve_checks(&config.checks, &config.controller.only_checks)
        .context("Failed to select checks")?;
    let engine = RepairEngine::from_config(config).context("Invalid configuration")?;
    let harness = ProcessHarness::new(checks).context("Invalid check definitions")?;
    let controller =
        ConvergenceController::new(engine, harness).context("Failed to start repair workers")?;

    let cancel = controller.cancellation();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!(event = "run.interrupt", "interrupt received, stopping after current phase");
            cancel.cancel();
        }
    });

    let (report, run_dir) = controller
        .run_and_record(root)
        .await
        .with_context(|| format!("Repair run failed for {}", root.display()))?;

    println!("{}", render_summary_md(&report));
    println!("Report: {}", run_dir.join("report.json").display());

    Ok(report.exit_code() as u8)
}

// ---------------------------------------------------------------------------
// classify
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize, PartialEq)]
struct ClassifyRow {
    path: String,
    tier: Option<Tier>,
    signatures: Vec<String>,
    error: Option<String>,
}

fn classify_tree(engine: &RepairEngine, root: &Path) -> Result<Vec<ClassifyRow>> {
    let paths = engine
        .scanner(root)
        .scan(root)
        .with_context(|| format!("Failed to scan {}", root.display()))?;

    let rows = paths
        .iter()
        .map(|path| {
            let rel = relative_display(root, path);
            match fs::read_to_string(path) {
                Ok(content) => {
                    let classification = engine.classifier().classify(&content);
                    ClassifyRow {
                        path: rel,
                        tier: Some(classification.tier),
                        signatures: classification.signatures,
                        error: None,
                    }
                }
                Err(e) => {
                    warn!(path = %rel, error = %e, "skipping unreadable file");
                    ClassifyRow {
                        path: rel,
                        tier: None,
                        signatures: Vec::new(),
                        error: Some(e.to_string()),
                    }
                }
            }
        })
        .collect();
    Ok(rows)
}

fn cmd_classify(root: &Path, config: EngineConfig, json_output: bool) -> Result<u8> {
    let engine = RepairEngine::from_config(config).context("Invalid configuration")?;
    let rows = classify_tree(&engine, root)?;

    if json_output {
        println!("{}", serde_json::to_string_pretty(&rows)?);
        return Ok(EXIT_OK);
    }

    if rows.is_empty() {
        println!("No matching files under {}", root.display());
        return Ok(EXIT_OK);
    }
    for row in &rows {
        let tier = row.tier.map(|t| t.as_str()).unwrap_or("skipped");
        if row.signatures.is_empty() {
            println!("{:<14} {}", tier, row.path);
        } else {
            println!("{:<14} {}  [{}]", tier, row.path, row.signatures.join(", "));
        }
    }

    let count = |tier: Tier| rows.iter().filter(|r| r.tier == Some(tier)).count();
    println!();
    println!(
        "{} files: {} clean, {} patchable, {} unsalvageable",
        rows.len(),
        count(Tier::Clean),
        count(Tier::Patchable),
        count(Tier::Unsalvageable)
    );
    Ok(EXIT_OK)
}

// ---------------------------------------------------------------------------
// rules / checks / relax
// ---------------------------------------------------------------------------

fn cmd_rules(config: EngineConfig) -> Result<u8> {
    let profile = config.transform.profile;
    let engine = RepairEngine::from_config(config).context("Invalid configuration")?;

    println!("Profile: {}", profile.as_str());
    for rule in engine.rules().rules() {
        let gate = rule
            .requires_signature()
            .map(|sig| format!(" (needs {sig})"))
            .unwrap_or_default();
        println!(
            "  {:>4}  {:<36} {:<10} {}{}",
            rule.priority(),
            rule.id(),
            rule.profile().as_str(),
            rule.spec().description,
            gate
        );
    }
    Ok(EXIT_OK)
}

fn cmd_checks(config: EngineConfig) -> Result<u8> {
    let checks = if config.checks.is_empty() {
        builtin_checks()
    } else {
        config.checks
    };

    for check in &checks {
        let state = if check.enabled { "enabled" } else { "disabled" };
        println!(
            "  {:<12} {:<9} {:>4}s  {}",
            check.name,
            state,
            check.timeout_secs,
            check.command.join(" ")
        );
    }
    Ok(EXIT_OK)
}

fn cmd_relax(root: &Path, level: u32, config: EngineConfig) -> Result<u8> {
    if !root.is_dir() {
        return Err(TreemendError::RootNotFound(root.to_path_buf()).into());
    }
    let engine = RepairEngine::from_config(config).context("Invalid configuration")?;
    let max = engine.synthesizer().max_level();
    if level > max {
        bail!("Level {level} exceeds the maximum strictness level {max}");
    }

    let synthesis = engine
        .synthesizer()
        .write(root, level)
        .with_context(|| format!("Failed to write tool configs under {}", root.display()))?;
    if synthesis.artifacts.is_empty() && synthesis.skipped.is_empty() {
        println!("Level 0: no relaxations, nothing written");
    }
    for skipped in &synthesis.skipped {
        println!(
            "Skipped {} ({}): {}",
            skipped.file.as_deref().unwrap_or("?"),
            skipped.check,
            skipped.message
        );
    }
    for artifact in &synthesis.artifacts {
        println!(
            "Wrote {} ({} at level {})",
            artifact.path.display(),
            artifact.tool,
            artifact.level
        );
    }
    Ok(EXIT_OK)
}

#[cfg(test)]
mod tests {
    use super::*;

    const WRECKED_ROUTE: &str = r#"import { NextRequest; NextResponse } from 'next/server';
<<<<<<< HEAD
export async function GET(req: NextRequest) {
  return NextResponse.json({ items: [] };
"#;

    fn seed(root: &Path, rel: &str, content: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    #[test]
    fn test_run_flags_parse() {
        let cli = Cli::try_parse_from([
            "treemend",
            "--verbose",
            "run",
            "web",
            "--checks",
            "typecheck,build",
            "--iterations",
            "4",
            "--profile",
            "aggressive",
            "--no-escalate",
        ])
        .unwrap();
        assert!(cli.verbose);
        match cli.command {
            Commands::Run {
                root,
                checks,
                iterations,
                profile,
                no_escalate,
                dry_run,
                ..
            } => {
                assert_eq!(root, PathBuf::from("web"));
                assert_eq!(
                    checks,
                    Some(vec!["typecheck".to_string(), "build".to_string()])
                );
                assert_eq!(iterations, Some(4));
                assert_eq!(profile, Some(RuleProfile::Aggressive));
                assert!(no_escalate);
                assert!(!dry_run);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_version_comes_from_core() {
        use clap::CommandFactory;
        assert_eq!(Cli::command().get_version(), Some(treemend_core::VERSION));
    }

    #[test]
    fn test_unknown_profile_rejected() {
        let err = Cli::try_parse_from(["treemend", "rules", "--profile", "reckless"]);
        assert!(err.is_err());
    }

    #[test]
    fn test_overrides_take_precedence() {
        let mut config = EngineConfig::default();
        config.controller.iteration_cap = 9;
        RunOverrides {
            checks: Some(vec![" lint ".to_string(), String::new()]),
            iterations: Some(2),
            dry_run: true,
            report_dir: Some(PathBuf::from("out")),
            no_escalate: true,
            ..RunOverrides::default()
        }
        .apply(&mut config);

        assert_eq!(config.controller.only_checks, vec!["lint"]);
        assert_eq!(config.controller.iteration_cap, 2);
        assert!(config.controller.dry_run);
        assert!(!config.controller.escalate);
        assert_eq!(config.report.dir, Some(PathBuf::from("out")));
    }

    #[test]
    fn test_absent_overrides_keep_file_values() {
        let mut config = EngineConfig::default();
        config.controller.iteration_cap = 9;
        config.controller.workers = 3;
        RunOverrides::default().apply(&mut config);
        assert_eq!(config.controller.iteration_cap, 9);
        assert_eq!(config.controller.workers, 3);
        assert!(config.controller.escalate);
    }

    #[test]
    fn test_classify_tree() {
        let dir = tempfile::tempdir().unwrap();
        seed(dir.path(), "app/api/items/route.ts", WRECKED_ROUTE);
        seed(dir.path(), "src/order.ts", "const o = { status: 'PENDING'; };\n");
        seed(dir.path(), "src/ok.ts", "export const ok = 1;\n");

        let engine = RepairEngine::builtin().unwrap();
        let rows = classify_tree(&engine, dir.path()).unwrap();

        let tiers: Vec<_> = rows.iter().map(|r| (r.path.as_str(), r.tier)).collect();
        assert_eq!(
            tiers,
            vec![
                ("app/api/items/route.ts", Some(Tier::Unsalvageable)),
                ("src/ok.ts", Some(Tier::Clean)),
                ("src/order.ts", Some(Tier::Patchable)),
            ]
        );
        // Classification never writes.
        assert_eq!(
            fs::read_to_string(dir.path().join("src/order.ts")).unwrap(),
            "const o = { status: 'PENDING'; };\n"
        );
    }

    #[test]
    fn test_load_config_from_root() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("treemend.toml"),
            "[controller]\niteration_cap = 7\n",
        )
        .unwrap();
        let config = load_config(None, Some(dir.path())).unwrap();
        assert_eq!(config.controller.iteration_cap, 7);
        assert_eq!(
            load_config(None, None).unwrap().controller.iteration_cap,
            EngineConfig::default().controller.iteration_cap
        );
    }

    #[test]
    fn test_relax_writes_tool_configs() {
        let dir = tempfile::tempdir().unwrap();
        let code = cmd_relax(dir.path(), 1, EngineConfig::default()).unwrap();
        assert_eq!(code, EXIT_OK);

        let tsconfig: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(dir.path().join("tsconfig.json")).unwrap())
                .unwrap();
        assert_eq!(tsconfig["compilerOptions"]["skipLibCheck"], true);
        assert!(dir.path().join(".eslintrc.json").exists());
    }

    #[test]
    fn test_relax_rejects_level_beyond_ladder() {
        let dir = tempfile::tempdir().unwrap();
        assert!(cmd_relax(dir.path(), 99, EngineConfig::default()).is_err());
        assert!(!dir.path().join("tsconfig.json").exists());
    }

    #[tokio::test]
    async fn test_dry_run_command_exits_exhausted() {
        let dir = tempfile::tempdir().unwrap();
        seed(dir.path(), "src/order.ts", "const o = { status: 'PENDING'; };\n");

        let mut config = EngineConfig::default();
        config.controller.dry_run = true;
        let code = cmd_run(dir.path(), config).await.unwrap();

        assert_eq!(code, 1);
        assert!(dir.path().join(".treemend/runs").is_dir());
    }
}
