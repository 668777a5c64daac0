use anyhow::{Context, Result};
use clap::{ArgAction, Parser, Subcommand};
use colored::Colorize;
use std::env;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use walkdir::WalkDir;
use x4_save_patcher::compression;
use x4_save_patcher::config::{load_from_path, normalize, ConfigError, Patch, PatchSet};
use x4_save_patcher::{
    default_output_path, export_patched, index_path, ExportOptions, ExportReport, SaveError,
    SaveModel,
};
use xxhash_rust::xxh3::Xxh3;

#[derive(Parser)]
#[command(name = "x4-save-patcher")]
#[command(about = "Inspect and patch X4 save games", long_about = None)]
#[command(version)]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Index a save and print what it contains
    Index {
        /// Save file (.xml or .xml.gz)
        save: PathBuf,

        /// Print the full index as JSON
        #[arg(long)]
        json: bool,
    },

    /// Apply a patch file and write an edited copy of the save
    Apply {
        /// Save file (.xml or .xml.gz)
        save: PathBuf,

        /// Patch file (.json or .toml)
        #[arg(short, long)]
        patches: PathBuf,

        /// Output path (defaults to <save>.edited.xml[.gz] next to the save)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Gzip the output (default: match the source)
        #[arg(long, conflicts_with = "no_compress")]
        compress: bool,

        /// Write plain XML
        #[arg(long)]
        no_compress: bool,

        /// Skip the backup of the source save
        #[arg(long)]
        no_backup: bool,

        /// Print the export report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Validate a patch file and print the merged edits
    Check {
        /// Patch file (.json or .toml)
        #[arg(short, long)]
        patches: PathBuf,
    },

    /// Check that re-applying a patch file changes nothing
    Verify {
        /// Save file (.xml or .xml.gz)
        save: PathBuf,

        /// Patch file (.json or .toml)
        #[arg(short, long)]
        patches: PathBuf,
    },

    /// List saves in a directory
    List {
        /// Directory to scan (defaults to $X4_SAVE_DIR, then the current directory)
        dir: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Index { save, json } => cmd_index(&save, json),

        Commands::Apply {
            save,
            patches,
            output,
            compress,
            no_compress,
            no_backup,
            json,
        } => {
            let compress = if compress {
                Some(true)
            } else if no_compress {
                Some(false)
            } else {
                None
            };
            cmd_apply(&save, &patches, output, compress, no_backup, json)
        }

        Commands::Check { patches } => cmd_check(&patches),

        Commands::Verify { save, patches } => cmd_verify(&save, &patches),

        Commands::List { dir } => cmd_list(dir),
    }
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();
}

/// Load a patch file, printing each validation issue on failure.
fn load_patch_set(path: &Path) -> Result<PatchSet> {
    match load_from_path(path) {
        Ok(set) => Ok(set),
        Err(ConfigError::Validation { source, .. }) => {
            eprintln!(
                "{} {}: {} invalid patch(es)",
                "✗".red(),
                path.display(),
                source.issues.len()
            );
            for issue in &source.issues {
                eprintln!("  - #{} {}: {}", issue.index, issue.kind.bold(), issue.reason);
            }
            std::process::exit(1);
        }
        Err(e) => Err(e.into()),
    }
}

fn cmd_index(save: &Path, json: bool) -> Result<()> {
    let model = index_path(save).with_context(|| format!("failed to index {}", save.display()))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&model)?);
        return Ok(());
    }

    print_summary(save, &model);
    Ok(())
}

fn print_summary(save: &Path, model: &SaveModel) {
    let info = &model.metadata;
    println!("{}", "Save Index".bold());
    println!("File: {}", save.display());
    if !info.save_name.is_empty() {
        println!("Name: {}", info.save_name);
    }
    println!(
        "Version: {}",
        info.product_version().unwrap_or("unknown")
    );
    if info.modified == Some(true) {
        println!("{}", "Marked as modified".yellow());
    }
    println!();

    let credits = &model.credits;
    println!("Player: {}", credits.player_name);
    match credits.money() {
        Some(money) => println!("Credits: {}", money.to_string().green()),
        None => println!("Credits: {}", "not found".yellow()),
    }
    if credits.wallet_account_occurrences > 0 {
        println!(
            "Wallet: {} ({} account entries)",
            credits.wallet_account_id.as_deref().unwrap_or("?"),
            credits.wallet_account_occurrences
        );
    }
    println!();

    println!("  {} factions", model.factions.len());
    println!("  {} player relations", model.relations.player.len());
    println!("  {} licence types", model.licences.by_type.len());
    println!("  {} blueprints", model.blueprints.owned.len());
    println!("  {} inventory wares", model.inventory.player.len());
    println!("  {} NPCs with skills", model.skills.npcs.len());
    println!("  {} ships", model.skills.ships.len());

    if !model.licences.player_faction_found {
        println!();
        println!(
            "{} {}",
            "⊘".cyan(),
            "No player faction: relation and licence edits are unavailable".dimmed()
        );
    }
}

fn cmd_apply(
    save: &Path,
    patch_file: &Path,
    output: Option<PathBuf>,
    compress: Option<bool>,
    no_backup: bool,
    json: bool,
) -> Result<()> {
    let set = load_patch_set(patch_file)?;

    let compress = match compress {
        Some(compress) => compress,
        None => compression::is_compressed(save)
            .with_context(|| format!("failed to read {}", save.display()))?,
    };
    let output = output.unwrap_or_else(|| default_output_path(save, compress));
    let options = ExportOptions {
        compress,
        create_backup: !no_backup,
        version_range: set.meta.version_range.clone(),
    };

    if !json {
        println!("Save: {}", save.display());
        println!("Patches: {} ({} entries)", patch_file.display(), set.patches.len());
        println!();
    }

    match export_patched(save, &output, &set.patches, &options) {
        Ok(report) if json => {
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(())
        }
        Ok(report) => {
            print_report(&report);
            Ok(())
        }
        Err(e) => {
            report_failure(&e);
            std::process::exit(1);
        }
    }
}

fn print_report(report: &ExportReport) {
    for (label, count) in report.counts.entries() {
        if count > 0 {
            println!("{} {}: {}", "✓".green(), label, count);
        }
    }
    if report.counts.total() == 0 {
        println!("{} {}", "⊙".yellow(), "No locations changed");
    }

    println!();
    println!("{}", "Summary:".bold());
    println!(
        "  {} locations changed",
        format!("{}", report.counts.total()).green()
    );
    println!("  Output: {}", report.output_path.display());
    if let Some(backup) = &report.backup_path {
        println!("  Backup: {}", backup.display());
    }
    println!(
        "  Compressed: {}",
        if report.compressed { "yes" } else { "no" }
    );
}

fn report_failure(error: &SaveError) {
    eprintln!("{} Export failed - {}", "✗".red(), error);
    match error {
        SaveError::Reference(_) => {
            eprintln!(
                "  {}",
                "CONFLICT: a patch refers to something this save does not contain".red()
            );
            eprintln!("  No output was written; the source save is unchanged.");
        }
        SaveError::VersionMismatch { .. } => {
            eprintln!("  Action: use a patch file made for this game version");
        }
        SaveError::MalformedDocument { .. } => {
            eprintln!("  The save is truncated or not an X4 save document.");
        }
        _ => {}
    }
}

fn cmd_check(patch_file: &Path) -> Result<()> {
    let set = load_patch_set(patch_file)?;
    let diff = normalize(&set.patches)?;

    println!(
        "{} {}: {} patch(es) valid",
        "✓".green(),
        patch_file.display(),
        set.patches.len()
    );
    if !set.meta.name.is_empty() {
        println!("Name: {}", set.meta.name);
    }
    if let Some(range) = &set.meta.version_range {
        println!("Version range: {}", range);
    }
    if diff.is_empty() {
        println!("{} {}", "⊙".yellow(), "Patch set changes nothing");
        return Ok(());
    }

    println!();
    println!("{}", serde_json::to_string_pretty(&diff)?);
    Ok(())
}

/// Patches whose second application is not a no-op by definition.
fn is_repeatable(patch: &Patch) -> bool {
    !matches!(
        patch,
        Patch::AddInventoryItem { .. } | Patch::DeleteObject { .. }
    )
}

fn cmd_verify(save: &Path, patch_file: &Path) -> Result<()> {
    let set = load_patch_set(patch_file)?;
    let temp_dir = tempfile::tempdir()?;
    let first = temp_dir.path().join("first.xml");
    let second = temp_dir.path().join("second.xml");
    let options = ExportOptions {
        compress: false,
        create_backup: false,
        version_range: set.meta.version_range.clone(),
    };

    println!("{}", "Verifying patches...".bold());
    println!("Save: {}", save.display());
    println!();

    if let Err(e) = export_patched(save, &first, &set.patches, &options) {
        report_failure(&e);
        std::process::exit(1);
    }

    let repeatable: Vec<Patch> = set.patches.iter().filter(|p| is_repeatable(p)).cloned().collect();
    let skipped = set.patches.len() - repeatable.len();
    if skipped > 0 {
        println!(
            "{} {} cumulative patch(es) skipped on the second pass",
            "⊘".cyan(),
            skipped
        );
    }

    if let Err(e) = export_patched(&first, &second, &repeatable, &options) {
        report_failure(&e);
        std::process::exit(1);
    }

    let first_hash = hash_file(&first)?;
    let second_hash = hash_file(&second)?;

    println!();
    println!("{}", "Summary:".bold());
    println!("  first pass:  {:016x}", first_hash);
    println!("  second pass: {:016x}", second_hash);

    if first_hash != second_hash {
        eprintln!("{} {}", "✗".red(), "MISMATCH: re-applying the patches changed the save");
        std::process::exit(1);
    }

    println!("{} {}", "✓".green(), "Verified: re-applying changes nothing");
    Ok(())
}

fn hash_file(path: &Path) -> Result<u64> {
    let mut file = File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
    let mut hasher = Xxh3::new();
    let mut buf = vec![0u8; 64 * 1024];
    loop {
        let read = file.read(&mut buf)?;
        if read == 0 {
            break;
        }
        hasher.update(&buf[..read]);
    }
    Ok(hasher.digest())
}

fn is_save_file(path: &Path) -> bool {
    let name = match path.file_name().and_then(|name| name.to_str()) {
        Some(name) => name.to_ascii_lowercase(),
        None => return false,
    };
    (name.ends_with(".xml") || name.ends_with(".xml.gz")) && !name.contains(".backup.")
}

fn format_age(modified: SystemTime) -> String {
    let age = SystemTime::now()
        .duration_since(modified)
        .unwrap_or(Duration::ZERO)
        .as_secs();
    match age {
        0..=59 => "just now".to_string(),
        60..=3599 => format!("{}m ago", age / 60),
        3600..=86_399 => format!("{}h ago", age / 3600),
        _ => format!("{}d ago", age / 86_400),
    }
}

fn cmd_list(dir: Option<PathBuf>) -> Result<()> {
    let dir = dir
        .or_else(|| env::var_os("X4_SAVE_DIR").map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from("."));

    let mut saves = Vec::new();
    for entry in WalkDir::new(&dir).max_depth(2) {
        let entry = entry?;
        if !entry.file_type().is_file() || !is_save_file(entry.path()) {
            continue;
        }
        let metadata = entry.metadata()?;
        let modified = metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH);
        saves.push((entry.path().to_path_buf(), modified, metadata.len()));
    }

    // Newest first, like the in-game load menu.
    saves.sort_by(|a, b| b.1.cmp(&a.1));

    println!("{}", format!("Saves in {}", dir.display()).bold());
    if saves.is_empty() {
        println!("  {}", "No .xml or .xml.gz saves found".yellow());
        return Ok(());
    }

    for (path, modified, size) in &saves {
        let name = path
            .strip_prefix(&dir)
            .unwrap_or(path)
            .display()
            .to_string();
        println!(
            "  {:<40} {:>10} {}",
            name,
            format!("{:.1} MB", *size as f64 / (1024.0 * 1024.0)),
            format_age(*modified).dimmed()
        );
    }
    Ok(())
}
