use anyhow::{bail, Context, Result};
use catalog_core::aggregator::{self, SortKey};
use catalog_core::config::{self, AppConfig};
use catalog_core::export;
use catalog_core::launch::{DawLauncher, SystemLauncher};
use catalog_core::plugins::{self, PluginList};
use catalog_core::prefs::Preferences;
use catalog_core::scanner::ScanOptions;
use catalog_core::workspace::{self, DeleteMode, Workspace};
use clap::{Parser, Subcommand, ValueEnum};
use cli::output;
use cli::project::{self, CopyFlags, Interrupt};
use std::path::{Path, PathBuf};
use storage::{MetadataStore, ProjectMetadata};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let interrupt = Interrupt::new();
    interrupt.install();

    let cli = Cli::parse();
    let cfg = config::load(cli.config.as_deref())?;
    let prefs_path = match cli.prefs {
        Some(p) => p,
        None => Preferences::default_path()?,
    };
    let mut prefs = Preferences::load_from(&prefs_path);

    match cli.command {
        Commands::Scan {
            roots,
            filter,
            sort,
            desc,
            ratings,
            json,
            fields,
        } => run_scan(&cfg, &interrupt, roots, filter, sort, desc, ratings, json, &fields).await,
        Commands::Show {
            project,
            roots,
            json,
        } => run_show(&cfg, &interrupt, &project, roots, json).await,
        Commands::Copy {
            project,
            roots,
            dest,
            keep_bak,
            strip_dot_underscore,
            rename,
            notes,
            json,
        } => {
            let flags = CopyFlags {
                keep_bak,
                strip_dot_underscore,
                rename,
                notes,
            };
            run_copy(&cfg, &interrupt, &mut prefs, &prefs_path, &project, roots, dest, flags, json).await
        }
        Commands::Meta { action } => run_meta(&cfg, action),
        Commands::Plugins { list_file, action } => run_plugins(list_file, action),
        Commands::Ws { action } => run_ws(&cfg, &mut prefs, &prefs_path, action),
        Commands::Open { file, exe } => {
            let exe = project::daw_executable(exe, &cfg, &prefs);
            SystemLauncher.open(exe.as_deref(), &file)?;
            Ok(())
        }
        Commands::Prefs { action } => run_prefs(&mut prefs, &prefs_path, action),
    }
}

#[derive(Parser)]
#[command(name = "cpr-catalog", version, about = "Catalog, tag and export Cubase projects")]
struct Cli {
    /// Path to config TOML
    #[arg(short, long, global = true)]
    config: Option<String>,

    /// Preferences file (defaults to ~/.trie_morceaux/preferences.json)
    #[arg(long, global = true, hide = true)]
    prefs: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum SortArg {
    Name,
    Date,
    Size,
    Rating,
}

impl From<SortArg> for SortKey {
    fn from(arg: SortArg) -> Self {
        match arg {
            SortArg::Name => SortKey::Name,
            SortArg::Date => SortKey::Date,
            SortArg::Size => SortKey::Size,
            SortArg::Rating => SortKey::Rating,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Scan source folders and list the projects found
    Scan {
        /// Source roots; scan.roots from the config when omitted
        roots: Vec<PathBuf>,
        /// Only projects whose name contains this text
        #[arg(long)]
        filter: Option<String>,
        #[arg(long, value_enum, default_value_t = SortArg::Name)]
        sort: SortArg,
        /// Sort descending
        #[arg(long, default_value_t = false)]
        desc: bool,
        /// Join ratings from the metadata store
        #[arg(long, default_value_t = false)]
        ratings: bool,
        /// Output JSON
        #[arg(long)]
        json: bool,
        /// Restrict JSON fields (comma-separated), e.g. name,total_size_mb,latest_cpr
        #[arg(long, value_delimiter = ',', num_args = 1.., default_values_t = Vec::<String>::new())]
        fields: Vec<String>,
    },
    /// Show every file of one project with its metadata
    Show {
        project: String,
        #[arg(long = "root")]
        roots: Vec<PathBuf>,
        #[arg(long)]
        json: bool,
    },
    /// Copy a project into a clean Cubase folder layout
    Copy {
        project: String,
        #[arg(long = "root")]
        roots: Vec<PathBuf>,
        /// Destination root; export.destination from the config when omitted
        #[arg(long)]
        dest: Option<PathBuf>,
        /// Copy .bak files into "Auto Saves"
        #[arg(long, default_value_t = false)]
        keep_bak: bool,
        /// Leave out macOS "._" files
        #[arg(long, default_value_t = false)]
        strip_dot_underscore: bool,
        /// Name of the destination folder
        #[arg(long)]
        rename: Option<String>,
        /// Written to notes.txt in the destination
        #[arg(long)]
        notes: Option<String>,
        #[arg(long)]
        json: bool,
    },
    /// Read and edit project tags, rating and notes
    Meta {
        #[command(subcommand)]
        action: MetaAction,
    },
    /// Detect plugins and maintain the known-plugin list
    Plugins {
        /// Plugin list file (defaults to ~/.trie_morceaux/vsti_list.json)
        #[arg(long, global = true)]
        list_file: Option<PathBuf>,
        #[command(subcommand)]
        action: PluginAction,
    },
    /// Work inside one folder of projects
    Ws {
        #[command(subcommand)]
        action: WsAction,
    },
    /// Open a .cpr file in Cubase
    Open {
        file: PathBuf,
        /// DAW executable to use
        #[arg(long)]
        exe: Option<PathBuf>,
    },
    /// Show or change saved preferences
    Prefs {
        #[command(subcommand)]
        action: PrefsAction,
    },
}

#[derive(Subcommand)]
enum MetaAction {
    Get {
        project: String,
        /// Project folder (required for local metadata)
        #[arg(long)]
        dir: Option<PathBuf>,
        #[arg(long)]
        json: bool,
    },
    /// Replace the whole record
    Set {
        project: String,
        #[arg(long)]
        dir: Option<PathBuf>,
        #[arg(long, value_delimiter = ',', num_args = 1.., default_values_t = Vec::<String>::new())]
        tags: Vec<String>,
        #[arg(long, default_value_t = 0)]
        rating: u8,
        #[arg(long, default_value = "")]
        notes: String,
    },
    Tag {
        project: String,
        tag: String,
        #[arg(long)]
        dir: Option<PathBuf>,
    },
    Untag {
        project: String,
        tag: String,
        #[arg(long)]
        dir: Option<PathBuf>,
    },
    Rate {
        project: String,
        rating: u8,
        #[arg(long)]
        dir: Option<PathBuf>,
    },
    Notes {
        project: String,
        text: String,
        #[arg(long)]
        dir: Option<PathBuf>,
    },
    /// Every tag in use
    Tags {
        /// Project folders to read (local metadata)
        dirs: Vec<PathBuf>,
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum PluginAction {
    /// List plugins referenced by a project file
    Detect {
        file: PathBuf,
        #[arg(long)]
        json: bool,
    },
    List {
        #[arg(long)]
        json: bool,
    },
    Add { name: String },
    Remove { name: String },
    Rename { old: String, new: String },
}

#[derive(Subcommand)]
enum WsAction {
    /// List a folder
    Ls {
        path: PathBuf,
        #[arg(long)]
        json: bool,
    },
    Mkdir { path: PathBuf },
    Touch {
        path: PathBuf,
        #[arg(long, default_value = "")]
        content: String,
    },
    Rename { from: PathBuf, to: PathBuf },
    /// Move to the trash (or delete for good with --permanent)
    Rm {
        path: PathBuf,
        #[arg(long, default_value_t = false)]
        permanent: bool,
    },
    /// Projects in a workspace folder with their local ratings
    Projects {
        root: Option<PathBuf>,
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum PrefsAction {
    Show,
    Set { key: String, value: String },
}

#[allow(clippy::too_many_arguments)]
async fn run_scan(
    cfg: &AppConfig,
    interrupt: &Interrupt,
    roots: Vec<PathBuf>,
    filter: Option<String>,
    sort: SortArg,
    desc: bool,
    ratings: bool,
    json: bool,
    fields: &[String],
) -> Result<()> {
    let roots = project::effective_roots(&roots, cfg)?;
    let result = project::scan_roots(roots, cfg, interrupt).await?;
    let ratings = ratings || matches!(sort, SortArg::Rating);
    let mut summaries = aggregator::filter_by_name(result.summaries(), filter.as_deref().unwrap_or(""));
    if ratings {
        let store = cfg.metadata.store()?;
        aggregator::with_ratings(&mut summaries, &store);
    }
    aggregator::sort_summaries(&mut summaries, sort.into(), desc);

    if json {
        let values = summaries
            .iter()
            .map(serde_json::to_value)
            .collect::<Result<Vec<_>, _>>()?;
        let out = serde_json::json!({
            "status": if result.cancelled { "cancelled" } else { "ok" },
            "files": result.files_seen,
            "errors": result.errors,
            "skipped_roots": result.skipped_roots,
            "projects": output::filter_fields(values, fields),
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
    } else {
        print!("{}", output::summary_table(&summaries));
        println!(
            "{} projects, {} files{}",
            summaries.len(),
            result.files_seen,
            if result.cancelled { " (cancelled)" } else { "" }
        );
    }
    Ok(())
}

async fn run_show(
    cfg: &AppConfig,
    interrupt: &Interrupt,
    name: &str,
    roots: Vec<PathBuf>,
    json: bool,
) -> Result<()> {
    let roots = project::effective_roots(&roots, cfg)?;
    let result = project::scan_roots(roots, cfg, interrupt).await?;
    let record = project::find_project(&result, name)?;
    let summary = aggregator::summarize(record);
    let store = cfg.metadata.store()?;
    let dir = project::metadata_dir(cfg, Some(record), None);
    let metadata = store.peek(name, dir.as_deref())?;

    if json {
        let out = serde_json::json!({
            "summary": summary,
            "record": record,
            "metadata": metadata,
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
    } else {
        print!("{}", output::project_details(record, &summary, metadata.as_ref()));
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
async fn run_copy(
    cfg: &AppConfig,
    interrupt: &Interrupt,
    prefs: &mut Preferences,
    prefs_path: &Path,
    name: &str,
    roots: Vec<PathBuf>,
    dest: Option<PathBuf>,
    flags: CopyFlags,
    json: bool,
) -> Result<()> {
    let dest = project::destination(dest, cfg)?;
    let roots = project::effective_roots(&roots, cfg)?;
    let result = project::scan_roots(roots, cfg, interrupt).await?;
    let record = project::find_project(&result, name)?;

    let options = project::export_options(flags, cfg);
    project::remember_copy(prefs, &options);
    prefs.save_to(prefs_path)?;

    let store = cfg.metadata.store()?;
    let dir = project::metadata_dir(cfg, Some(record), None);
    let mut metadata = store.load(name, dir.as_deref())?;
    if let Some(notes) = &options.notes {
        metadata.notes = notes.clone();
    }

    let report = export::export_project(record, &dest, &options, &metadata);
    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!(
            "{} -> {}: {} copied, {} skipped, {} failed",
            name,
            report.project_dir.display(),
            report.copied.len(),
            report.skipped.len(),
            report.failures.len()
        );
        for failure in &report.failures {
            println!("  failed: {} ({})", failure.path.display(), failure.error);
        }
    }
    if !report.success {
        bail!(
            "copy of {} failed: {}",
            name,
            report.message.unwrap_or_default()
        );
    }
    Ok(())
}

fn print_metadata(meta: &ProjectMetadata, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(meta)?);
    } else {
        print!("{}", output::metadata_text(meta));
    }
    Ok(())
}

fn run_meta(cfg: &AppConfig, action: MetaAction) -> Result<()> {
    let store: MetadataStore = cfg.metadata.store()?;
    let dir_for = |dir: Option<PathBuf>| project::metadata_dir(cfg, None, dir.as_deref());
    match action {
        MetaAction::Get { project, dir, json } => {
            let meta = store.load(&project, dir_for(dir).as_deref())?;
            print_metadata(&meta, json)
        }
        MetaAction::Set {
            project,
            dir,
            tags,
            rating,
            notes,
        } => {
            let dir = dir_for(dir);
            let saved =
                project::replace_metadata(&store, &project, dir.as_deref(), tags, rating, notes)?;
            print_metadata(&saved, false)
        }
        MetaAction::Tag { project, tag, dir } => {
            let meta = store.add_tag(&project, dir_for(dir).as_deref(), &tag)?;
            print_metadata(&meta, false)
        }
        MetaAction::Untag { project, tag, dir } => {
            let meta = store.remove_tag(&project, dir_for(dir).as_deref(), &tag)?;
            print_metadata(&meta, false)
        }
        MetaAction::Rate {
            project,
            rating,
            dir,
        } => {
            let meta = store
                .set_rating(&project, dir_for(dir).as_deref(), rating)
                .with_context(|| format!("rating {} not saved", project))?;
            print_metadata(&meta, false)
        }
        MetaAction::Notes { project, text, dir } => {
            let meta = store.set_notes(&project, dir_for(dir).as_deref(), &text)?;
            print_metadata(&meta, false)
        }
        MetaAction::Tags { dirs, json } => {
            let tags = store.all_tags(&dirs)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&tags)?);
            } else {
                for tag in tags {
                    println!("{}", tag);
                }
            }
            Ok(())
        }
    }
}

fn run_plugins(list_file: Option<PathBuf>, action: PluginAction) -> Result<()> {
    let path = match list_file {
        Some(p) => p,
        None => PluginList::default_path()?,
    };
    let mut list = PluginList::load(&path)?;
    match action {
        PluginAction::Detect { file, json } => {
            let detector = list.detector()?;
            let found = plugins::detect_file(&detector, &file)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&found)?);
            } else {
                for name in &found {
                    println!("{}", name);
                }
                info!("{} plugins found in {}", found.len(), file.display());
            }
            Ok(())
        }
        PluginAction::List { json } => {
            if json {
                println!("{}", serde_json::to_string_pretty(&list)?);
            } else {
                for name in list.names() {
                    println!("{}", name);
                }
            }
            Ok(())
        }
        PluginAction::Add { name } => {
            if !list.add(&name) {
                bail!("{} is already listed", name);
            }
            list.save(&path)?;
            Ok(())
        }
        PluginAction::Remove { name } => {
            if !list.remove(&name) {
                bail!("{} is not listed", name);
            }
            list.save(&path)?;
            Ok(())
        }
        PluginAction::Rename { old, new } => {
            if !list.rename(&old, &new) {
                bail!("cannot rename {} to {}", old, new);
            }
            list.save(&path)?;
            Ok(())
        }
    }
}

fn run_ws(
    cfg: &AppConfig,
    prefs: &mut Preferences,
    prefs_path: &Path,
    action: WsAction,
) -> Result<()> {
    match action {
        WsAction::Ls { path, json } => {
            let items = workspace::list_dir(&path)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&items)?);
            } else {
                print!("{}", output::listing(&items));
            }
        }
        WsAction::Mkdir { path } => workspace::create_dir(&path)?,
        WsAction::Touch { path, content } => workspace::create_file(&path, &content)?,
        WsAction::Rename { from, to } => workspace::rename_item(&from, &to)?,
        WsAction::Rm { path, permanent } => {
            let mode = if permanent {
                DeleteMode::Permanent
            } else {
                DeleteMode::Trash
            };
            workspace::delete_item(&path, mode)?
        }
        WsAction::Projects { root, json } => {
            let root = root
                .or_else(|| (!prefs.last_workspace.is_empty()).then(|| PathBuf::from(&prefs.last_workspace)))
                .context("no workspace folder given")?;
            let ws = Workspace::open(&root, ScanOptions::from(&cfg.scan))?;
            prefs.last_workspace = root.to_string_lossy().into_owned();
            prefs.save_to(prefs_path)?;

            let mut summaries = ws.projects();
            aggregator::with_ratings(&mut summaries, &MetadataStore::local());
            if json {
                println!("{}", serde_json::to_string_pretty(&summaries)?);
            } else {
                print!("{}", output::summary_table(&summaries));
            }
        }
    }
    Ok(())
}

fn run_prefs(prefs: &mut Preferences, prefs_path: &Path, action: PrefsAction) -> Result<()> {
    match action {
        PrefsAction::Show => println!("{}", serde_json::to_string_pretty(prefs)?),
        PrefsAction::Set { key, value } => {
            if !prefs.set(&key, &value)? {
                bail!("unknown preference {}", key);
            }
            prefs.save_to(prefs_path)?;
        }
    }
    Ok(())
}
