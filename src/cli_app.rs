//! Top-level CLI definition and dispatch.

use std::io::{self, IsTerminal, Write};
use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, Utc};
use clap::{Args, Parser, Subcommand};
use colored::{Colorize, control};
use serde_json::{Value, json};
use thiserror::Error;

use provebit::core::config::Config;
use provebit::core::errors::PvbError;
use provebit::core::paths::{is_within, resolve_absolute_path};
use provebit::daemon::loop_main::MerkleDaemon;
use provebit::daemon::signals::SignalHandler;
use provebit::logger::change_log::{ChangeLog, ChangeLogEntry};
use provebit::logger::jsonl::{JsonlConfig, JsonlWriter};
use provebit::proof::codec::{
    self, DecodeOptions, KEY_BLOCK_ID, KEY_IDEAL_TIME, KEY_PROVEN_TIME, KEY_TRANSACTION_ID,
    KEY_TRANSACTION_PATH,
};
use provebit::proof::{ProofArtifact, VerificationReport, verify_against_tree, verify_file};
use provebit::tree::{FileMerkleTree, IntegrityTree, hash_hex};

/// provebit: Merkle integrity tree over a directory, with portable proofs.
#[derive(Debug, Parser)]
#[command(
    name = "pvb",
    author,
    version,
    about = "provebit - directory integrity tree and document proofs",
    long_about = None,
    arg_required_else_help = true
)]
pub struct Cli {
    /// Override config file path.
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,
    /// Force JSON output mode.
    #[arg(long, global = true)]
    json: bool,
    /// Disable colored output.
    #[arg(long, global = true)]
    no_color: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Subcommand)]
enum Command {
    /// Watch a directory and keep its integrity tree current until interrupted.
    Daemon(DaemonArgs),
    /// Build the tree for a directory and print its root digest.
    Root(RootArgs),
    /// Create, inspect and verify proof artifacts.
    Proof(ProofArgs),
}

#[derive(Debug, Clone, Args)]
struct DaemonArgs {
    /// Directory to watch (overrides `daemon.watch_dir`).
    #[arg(long, value_name = "PATH")]
    dir: Option<PathBuf>,
    /// Poll period in milliseconds (overrides `daemon.poll_interval_ms`).
    #[arg(long, value_name = "MS")]
    period_ms: Option<u64>,
    /// Mirror the change log to this JSONL file.
    #[arg(long, value_name = "PATH")]
    change_log: Option<PathBuf>,
}

#[derive(Debug, Clone, Args)]
struct RootArgs {
    dir: PathBuf,
}

#[derive(Debug, Clone, Args)]
struct ProofArgs {
    #[command(subcommand)]
    command: ProofCommand,
}

#[derive(Debug, Clone, Subcommand)]
enum ProofCommand {
    /// Build a proof for one file from the directory's current tree.
    Create(ProofCreateArgs),
    /// Decode and print a proof file.
    Show(ProofShowArgs),
    /// Check a proof against a file, and optionally against a directory's tree.
    Verify(ProofVerifyArgs),
}

#[derive(Debug, Clone, Args)]
struct ProofCreateArgs {
    /// Tree root directory.
    #[arg(long, value_name = "PATH")]
    dir: PathBuf,
    /// File to attest; must lie under `--dir`.
    #[arg(long, value_name = "PATH")]
    file: PathBuf,
    /// Anchoring transaction ID (lowercase hex).
    #[arg(long, value_name = "HEX")]
    tx_id: String,
    /// Anchoring transaction path (lowercase hex).
    #[arg(long, value_name = "HEX")]
    tx_path: String,
    /// Block ID (lowercase hex).
    #[arg(long, value_name = "HEX")]
    block_id: String,
    /// Requested proof time, `YYYY-MM-DD HH:MM:SS[.f]` UTC or RFC 3339. Default: now.
    #[arg(long, value_name = "TIME")]
    ideal_time: Option<String>,
    /// Confirmation time, same formats. Default: now.
    #[arg(long, value_name = "TIME")]
    proven_time: Option<String>,
    /// Output proof file.
    #[arg(long, value_name = "PATH")]
    out: PathBuf,
}

#[derive(Debug, Clone, Args)]
struct ProofShowArgs {
    proof: PathBuf,
}

#[derive(Debug, Clone, Args)]
struct ProofVerifyArgs {
    proof: PathBuf,
    file: PathBuf,
    /// Also check the proof's root against a fresh tree of this directory.
    #[arg(long, value_name = "PATH")]
    dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OutputMode {
    Human,
    Json,
}

/// CLI error type with explicit exit-code mapping.
#[derive(Debug, Error)]
pub enum CliError {
    /// Invalid user input or rejected data.
    #[error("{0}")]
    User(String),
    /// Environment/runtime failure.
    #[error("{0}")]
    Runtime(String),
    /// Internal bug or invariant violation.
    #[error("{0}")]
    Internal(String),
    #[error("failed to serialize output: {0}")]
    Json(#[from] serde_json::Error),
    #[error("failed to write output: {0}")]
    Io(#[from] io::Error),
}

impl CliError {
    /// Process exit code contract for the CLI.
    pub const fn exit_code(&self) -> i32 {
        match self {
            Self::User(_) => 1,
            Self::Runtime(_) | Self::Io(_) => 2,
            Self::Internal(_) | Self::Json(_) => 3,
        }
    }
}

impl From<PvbError> for CliError {
    fn from(err: PvbError) -> Self {
        match err {
            PvbError::InvalidConfig { .. }
            | PvbError::MissingConfig { .. }
            | PvbError::ConfigParse { .. }
            | PvbError::ProofDecoding { .. }
            | PvbError::ProofFormat { .. }
            | PvbError::ProofMissingField { .. }
            | PvbError::ProofVersion { .. } => Self::User(err.to_string()),
            PvbError::Serialization { .. } => Self::Internal(err.to_string()),
            _ => Self::Runtime(err.to_string()),
        }
    }
}

/// Dispatch CLI commands.
pub fn run(cli: &Cli) -> Result<(), CliError> {
    if cli.no_color {
        control::set_override(false);
    }

    match &cli.command {
        Command::Daemon(args) => run_daemon(cli, args),
        Command::Root(args) => run_root(cli, args),
        Command::Proof(args) => match &args.command {
            ProofCommand::Create(args) => run_proof_create(cli, args),
            ProofCommand::Show(args) => run_proof_show(cli, args),
            ProofCommand::Verify(args) => run_proof_verify(cli, args),
        },
    }
}

// ---------------------------------------------------------------------------
// daemon
// ---------------------------------------------------------------------------

fn run_daemon(cli: &Cli, args: &DaemonArgs) -> Result<(), CliError> {
    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(dir) = &args.dir {
        config.daemon.watch_dir.clone_from(dir);
    }
    if let Some(period) = args.period_ms {
        config.daemon.poll_interval_ms = period;
    }
    if let Some(path) = &args.change_log {
        config.paths.change_log.clone_from(path);
        config.daemon.persist_change_log = true;
    }

    let tree = FileMerkleTree::build(&config.daemon.watch_dir)?;
    let log = if config.daemon.persist_change_log {
        let writer = JsonlWriter::open(JsonlConfig::for_path(&config.paths.change_log));
        eprintln!(
            "[PVB-DAEMON] change log mirror {} (state={}, existing_bytes={})",
            config.paths.change_log.display(),
            writer.state(),
            writer.bytes_written()
        );
        ChangeLog::with_sink(writer)
    } else {
        ChangeLog::new()
    };

    eprintln!(
        "[PVB-DAEMON] tracking {} files under {} (root={}, config_hash={})",
        tree.leaf_count(),
        tree.root_directory().display(),
        hash_hex(&tree.root_digest()),
        config.stable_hash().unwrap_or_default()
    );

    let handle = MerkleDaemon::with_change_log(tree, &config.daemon, log)?.spawn()?;
    let signals = SignalHandler::new();
    if signals.wait_for_shutdown(Duration::from_millis(100), || handle.is_finished()) {
        eprintln!("[PVB-DAEMON] shutdown requested, stopping monitor");
    }
    handle.cancel();

    let num_events = handle.num_events();
    let root = handle.root_digest();
    let entries = handle.change_log_snapshot();
    let outcome = handle.join();

    match output_mode(cli) {
        OutputMode::Human => {
            for entry in &entries {
                println!("{}", entry.text);
            }
            println!(
                "{} {} events, root {}",
                "daemon stopped:".bold(),
                num_events,
                hash_hex(&root)
            );
        }
        OutputMode::Json => {
            write_json_line(&json!({
                "command": "daemon",
                "events": num_events,
                "root": hash_hex(&root),
                "change_log": entries.iter().map(change_log_json).collect::<Vec<_>>(),
                "error": outcome.as_ref().err().map(ToString::to_string),
            }))?;
        }
    }

    outcome.map_err(CliError::from)
}

fn change_log_json(entry: &ChangeLogEntry) -> Value {
    json!({ "ts": entry.ts, "kind": entry.kind, "text": entry.text })
}

// ---------------------------------------------------------------------------
// root
// ---------------------------------------------------------------------------

fn run_root(cli: &Cli, args: &RootArgs) -> Result<(), CliError> {
    let tree = FileMerkleTree::build(&args.dir)?;
    let root = hash_hex(&tree.root_digest());

    match output_mode(cli) {
        OutputMode::Human => {
            println!("{root}");
            println!(
                "{} files, {} tracked paths under {}",
                tree.leaf_count(),
                tree.tracked_count(),
                tree.root_directory().display()
            );
        }
        OutputMode::Json => write_json_line(&json!({
            "command": "root",
            "dir": tree.root_directory(),
            "root": root,
            "files": tree.leaf_count(),
            "tracked": tree.tracked_count(),
            "built_at": tree.built_at().map(|t| t.to_rfc3339()),
        }))?,
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// proof
// ---------------------------------------------------------------------------

fn run_proof_create(cli: &Cli, args: &ProofCreateArgs) -> Result<(), CliError> {
    let tree = FileMerkleTree::build(&args.dir)?;
    let file = resolve_absolute_path(&args.file);
    if !is_within(&file, tree.root_directory()) {
        return Err(CliError::User(format!(
            "{} is outside {}",
            file.display(),
            tree.root_directory().display()
        )));
    }
    let digest = tree.file_digest(&file).ok_or_else(|| {
        CliError::User(format!(
            "{} is not a tracked file under {}",
            file.display(),
            tree.root_directory().display()
        ))
    })?;

    let mut proof = ProofArtifact::new(tree.root_digest().to_vec(), digest.to_vec());
    proof
        .set_transaction_id(codec::decode_hex(KEY_TRANSACTION_ID, &args.tx_id)?)
        .set_transaction_path(codec::decode_hex(KEY_TRANSACTION_PATH, &args.tx_path)?)
        .set_block_id(codec::decode_hex(KEY_BLOCK_ID, &args.block_id)?);
    if let Some(raw) = &args.ideal_time {
        proof.set_ideal_time(parse_time_arg(KEY_IDEAL_TIME, raw)?);
    }
    if let Some(raw) = &args.proven_time {
        proof.set_proven_time(parse_time_arg(KEY_PROVEN_TIME, raw)?);
    }

    codec::write_to_file(&proof, &args.out)?;

    match output_mode(cli) {
        OutputMode::Human => {
            println!("{} {}", "wrote".green(), args.out.display());
            print_proof_human(&proof);
        }
        OutputMode::Json => write_json_line(&json!({
            "command": "proof create",
            "out": args.out,
            "proof": codec::encode(&proof),
        }))?,
    }
    Ok(())
}

fn run_proof_show(cli: &Cli, args: &ProofShowArgs) -> Result<(), CliError> {
    let proof = codec::read_from_file(&args.proof, &decode_options(cli)?)?;
    match output_mode(cli) {
        OutputMode::Human => print_proof_human(&proof),
        OutputMode::Json => write_json_line(&json!({
            "command": "proof show",
            "proof": codec::encode(&proof),
            "time_ordered": proof.is_time_ordered(),
        }))?,
    }
    Ok(())
}

fn run_proof_verify(cli: &Cli, args: &ProofVerifyArgs) -> Result<(), CliError> {
    let proof = codec::read_from_file(&args.proof, &decode_options(cli)?)?;
    let report = match &args.dir {
        Some(dir) => {
            let tree = FileMerkleTree::build(dir)?;
            verify_against_tree(&proof, &args.file, &tree)?
        }
        None => verify_file(&proof, &args.file)?,
    };

    match output_mode(cli) {
        OutputMode::Human => print_report_human(&report),
        OutputMode::Json => write_json_line(&json!({
            "command": "proof verify",
            "valid": report.is_valid(),
            "report": report,
        }))?,
    }

    if report.is_valid() {
        Ok(())
    } else {
        Err(CliError::User(format!(
            "proof does not match {}",
            args.file.display()
        )))
    }
}

fn decode_options(cli: &Cli) -> Result<DecodeOptions, CliError> {
    let config = Config::load(cli.config.as_deref())?;
    Ok(DecodeOptions {
        version_policy: config.proof.version_policy,
    })
}

fn parse_time_arg(field: &'static str, raw: &str) -> Result<DateTime<Utc>, CliError> {
    if let Ok(ts) = codec::decode_timestamp(field, raw) {
        return Ok(ts);
    }
    DateTime::parse_from_rfc3339(raw)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| CliError::User(format!("invalid {field} {raw:?}: {e}")))
}

fn print_proof_human(proof: &ProofArtifact) {
    for (key, value) in codec::encode(proof) {
        println!("{:>16}: {value}", key.bold());
    }
    if !proof.is_time_ordered() {
        println!(
            "{} proven time precedes ideal time",
            "warning:".yellow().bold()
        );
    }
}

fn print_report_human(report: &VerificationReport) {
    let verdict = |ok: bool| if ok { "ok".green() } else { "MISMATCH".red().bold() };
    println!("{:>12}: {}", "file".bold(), report.file.display());
    println!("{:>12}: {}", "computed".bold(), report.computed_file_hash);
    println!("{:>12}: {}", "file hash".bold(), verdict(report.file_hash_matches));
    if let Some(root_ok) = report.merkle_root_matches {
        println!("{:>12}: {}", "merkle root".bold(), verdict(root_ok));
    }
    if !report.time_ordered {
        println!(
            "{:>12}: {}",
            "times".bold(),
            "proven before ideal".yellow()
        );
    }
}

// ---------------------------------------------------------------------------
// output helpers
// ---------------------------------------------------------------------------

fn write_json_line(payload: &Value) -> Result<(), CliError> {
    let mut stdout = io::stdout().lock();
    serde_json::to_writer(&mut stdout, payload)?;
    writeln!(stdout)?;
    Ok(())
}

fn output_mode(cli: &Cli) -> OutputMode {
    let env_mode = std::env::var("PVB_OUTPUT_FORMAT").ok();
    resolve_output_mode(cli.json, env_mode.as_deref(), io::stdout().is_terminal())
}

fn resolve_output_mode(json_flag: bool, env_mode: Option<&str>, stdout_is_tty: bool) -> OutputMode {
    if json_flag {
        return OutputMode::Json;
    }

    let fallback = if stdout_is_tty {
        OutputMode::Human
    } else {
        OutputMode::Json
    };

    match env_mode
        .map(str::trim)
        .map(str::to_ascii_lowercase)
        .as_deref()
    {
        Some("json") => OutputMode::Json,
        Some("human") => OutputMode::Human,
        _ => fallback,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn cli(args: &[&str]) -> Cli {
        Cli::try_parse_from(args).expect("args should parse")
    }

    #[test]
    fn parses_global_flags_before_and_after_subcommand() {
        let before = Cli::try_parse_from([
            "pvb",
            "--config",
            "/tmp/pvb.toml",
            "--json",
            "--no-color",
            "root",
            "/data",
        ]);
        assert!(before.is_ok());

        let after = Cli::try_parse_from(["pvb", "root", "/data", "--json", "--no-color"]);
        assert!(after.is_ok());
    }

    #[test]
    fn parses_all_subcommands() {
        let cases = [
            vec!["pvb", "daemon"],
            vec!["pvb", "daemon", "--dir", "/data", "--period-ms", "250"],
            vec!["pvb", "daemon", "--change-log", "/tmp/changes.jsonl"],
            vec!["pvb", "root", "/data"],
            vec![
                "pvb", "proof", "create", "--dir", "/data", "--file", "/data/a.txt", "--tx-id",
                "ab", "--tx-path", "01", "--block-id", "cd", "--out", "/tmp/a.proof",
            ],
            vec!["pvb", "proof", "show", "/tmp/a.proof"],
            vec!["pvb", "proof", "verify", "/tmp/a.proof", "/data/a.txt"],
            vec!["pvb", "proof", "verify", "/tmp/a.proof", "/data/a.txt", "--dir", "/data"],
        ];
        for case in cases {
            assert!(Cli::try_parse_from(case.clone()).is_ok(), "failed: {case:?}");
        }
    }

    #[test]
    fn proof_create_requires_anchoring_values() {
        let parsed = Cli::try_parse_from([
            "pvb", "proof", "create", "--dir", "/data", "--file", "/data/a.txt", "--out",
            "/tmp/a.proof",
        ]);
        assert!(parsed.is_err());
    }

    #[test]
    fn output_mode_resolution() {
        assert_eq!(resolve_output_mode(true, Some("human"), true), OutputMode::Json);
        assert_eq!(resolve_output_mode(false, Some("json"), true), OutputMode::Json);
        assert_eq!(resolve_output_mode(false, Some(" HUMAN "), false), OutputMode::Human);
        assert_eq!(resolve_output_mode(false, None, true), OutputMode::Human);
        assert_eq!(resolve_output_mode(false, Some("auto"), false), OutputMode::Json);
    }

    #[test]
    fn error_exit_codes() {
        let user: CliError = PvbError::ProofMissingField {
            field: "Merkle Root",
        }
        .into();
        assert_eq!(user.exit_code(), 1);

        let runtime: CliError = PvbError::RootUnavailable {
            path: PathBuf::from("/gone"),
        }
        .into();
        assert_eq!(runtime.exit_code(), 2);

        let internal: CliError = PvbError::Serialization {
            context: "test",
            details: "boom".to_string(),
        }
        .into();
        assert_eq!(internal.exit_code(), 3);
    }

    #[test]
    fn time_args_accept_canonical_and_rfc3339() {
        let canonical = parse_time_arg(KEY_IDEAL_TIME, "2016-03-01 12:00:00.5").unwrap();
        let rfc = parse_time_arg(KEY_IDEAL_TIME, "2016-03-01T12:00:00.5Z").unwrap();
        assert_eq!(canonical, rfc);
        assert!(parse_time_arg(KEY_IDEAL_TIME, "noon").is_err());
    }

    #[test]
    fn root_command_runs() {
        let tmp = tempfile::TempDir::new().unwrap();
        fs::write(tmp.path().join("a.txt"), "a").unwrap();
        let dir = tmp.path().to_string_lossy().into_owned();
        run(&cli(&["pvb", "--json", "root", &dir])).unwrap();
    }

    #[test]
    fn create_then_verify_and_detect_tampering() {
        let tmp = tempfile::TempDir::new().unwrap();
        let data = tmp.path().join("data");
        fs::create_dir(&data).unwrap();
        fs::write(data.join("a.txt"), "attested").unwrap();
        let config = tmp.path().join("config.toml");
        fs::write(&config, "[proof]\nversion_policy = \"reject\"\n").unwrap();
        let out = tmp.path().join("a.proof");

        let data_s = data.to_string_lossy().into_owned();
        let file_s = data.join("a.txt").to_string_lossy().into_owned();
        let out_s = out.to_string_lossy().into_owned();
        let config_s = config.to_string_lossy().into_owned();

        run(&cli(&[
            "pvb", "--json", "--config", &config_s, "proof", "create", "--dir", &data_s,
            "--file", &file_s, "--tx-id", "abcd", "--tx-path", "00ff", "--block-id", "01",
            "--out", &out_s,
        ]))
        .unwrap();
        run(&cli(&["pvb", "--json", "--config", &config_s, "proof", "show", &out_s])).unwrap();
        run(&cli(&[
            "pvb", "--json", "--config", &config_s, "proof", "verify", &out_s, &file_s,
            "--dir", &data_s,
        ]))
        .unwrap();

        fs::write(data.join("a.txt"), "tampered").unwrap();
        let err = run(&cli(&[
            "pvb", "--json", "--config", &config_s, "proof", "verify", &out_s, &file_s,
        ]))
        .unwrap_err();
        assert_eq!(err.exit_code(), 1);
    }

    #[test]
    fn create_rejects_untracked_file() {
        let tmp = tempfile::TempDir::new().unwrap();
        let outside = tempfile::TempDir::new().unwrap();
        fs::write(outside.path().join("b.txt"), "b").unwrap();
        let dir = tmp.path().to_string_lossy().into_owned();
        let file = outside.path().join("b.txt").to_string_lossy().into_owned();
        let out = tmp.path().join("b.proof").to_string_lossy().into_owned();

        let err = run(&cli(&[
            "pvb", "--json", "proof", "create", "--dir", &dir, "--file", &file, "--tx-id", "",
            "--tx-path", "", "--block-id", "", "--out", &out,
        ]))
        .unwrap_err();
        assert!(matches!(&err, CliError::User(msg) if msg.contains("is outside")));
    }

    #[test]
    fn create_rejects_directory_inside_tree() {
        let tmp = tempfile::TempDir::new().unwrap();
        fs::create_dir(tmp.path().join("sub")).unwrap();
        fs::write(tmp.path().join("sub/a.txt"), "a").unwrap();
        let dir = tmp.path().to_string_lossy().into_owned();
        let sub = tmp.path().join("sub").to_string_lossy().into_owned();
        let out = tmp.path().join("sub.proof").to_string_lossy().into_owned();

        let err = run(&cli(&[
            "pvb", "--json", "proof", "create", "--dir", &dir, "--file", &sub, "--tx-id", "",
            "--tx-path", "", "--block-id", "", "--out", &out,
        ]))
        .unwrap_err();
        assert!(matches!(&err, CliError::User(msg) if msg.contains("not a tracked file")));
    }
}
