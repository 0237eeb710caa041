use anyhow::{bail, Context};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use vrs_core::config::{data_dir_from_env_value, node_name_from_env_value};
use vrs_core::constants::{DEFAULT_BASE_URL, SYSTEM_COMMITTER};
use vrs_core::directory::wire::{tree_from_yaml, tree_to_yaml};
use vrs_core::{
    AuditDetails, ChangeType, CoreConfig, DirectoryService, EhrService, FolderPath, Lookup,
    ObjectId, ObjectVersionId, RevisionHistory, Storage, VersionIdentifier,
};

#[derive(Parser)]
#[command(name = "vrs")]
#[command(about = "VRS versioned record store CLI")]
struct Cli {
    /// Data directory of the file-backed store
    #[arg(long, env = "VRS_DATA_DIR")]
    data_dir: Option<String>,

    /// Node name stamped into new version ids
    #[arg(long, env = "VRS_NODE_NAME")]
    node_name: Option<String>,

    /// Committer recorded in the audit of every change
    #[arg(long, default_value = SYSTEM_COMMITTER)]
    committer: String,

    /// Single-line change description
    #[arg(long)]
    description: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// EHR records and their status
    Ehr {
        #[command(subcommand)]
        command: EhrCommand,
    },
    /// The versioned folder tree of an EHR
    Directory {
        #[command(subcommand)]
        command: DirectoryCommand,
    },
    /// Version identifiers
    Version {
        #[command(subcommand)]
        command: VersionCommand,
    },
}

#[derive(Subcommand)]
enum EhrCommand {
    /// Create an EHR
    Create {
        /// Use this id instead of a generated one
        #[arg(long)]
        ehr_id: Option<String>,
        /// EHR_STATUS as a YAML file (default: queryable, modifiable, no subject)
        #[arg(long)]
        status: Option<PathBuf>,
    },
    /// List all EHRs
    List,
    /// Print the EHR_STATUS of an EHR
    Status {
        ehr_id: String,
        /// RFC 3339 instant (default: latest)
        #[arg(long)]
        at: Option<String>,
    },
}

#[derive(Subcommand)]
enum DirectoryCommand {
    /// Create the directory from a YAML FOLDER file
    Create { ehr_id: String, file: PathBuf },
    /// Replace the directory, or one sub-folder of it, from a YAML FOLDER file
    Update {
        ehr_id: String,
        file: PathBuf,
        /// Latest directory version id
        #[arg(long)]
        if_match: String,
        /// Slash-separated folder names (default: the whole tree)
        #[arg(long)]
        path: Option<String>,
    },
    /// Detach the directory from the EHR
    Delete {
        ehr_id: String,
        /// Latest directory version id
        #[arg(long)]
        if_match: String,
    },
    /// Print the directory, or the folder at a path, as YAML
    Show {
        ehr_id: String,
        /// Explicit directory version id
        #[arg(long, conflicts_with = "at")]
        version: Option<String>,
        /// RFC 3339 instant (default: latest)
        #[arg(long)]
        at: Option<String>,
        #[arg(long)]
        path: Option<String>,
    },
    /// List every version of the directory
    History { ehr_id: String },
}

#[derive(Subcommand)]
enum VersionCommand {
    /// Split an object id or version id into its parts
    Parse { id: String },
}

/// Services over one data directory.
struct Store {
    ehrs: EhrService,
    directories: DirectoryService,
}

impl Store {
    fn open(data_dir: Option<String>, node_name: Option<String>) -> anyhow::Result<Self> {
        let Some(data_dir) = data_dir_from_env_value(data_dir)? else {
            bail!("--data-dir (or VRS_DATA_DIR) is required");
        };
        let node_name = node_name_from_env_value(node_name)?;
        let storage = Storage::open_dir(&data_dir, node_name.clone())?;
        let cfg = Arc::new(CoreConfig::new(Some(data_dir), node_name, DEFAULT_BASE_URL)?);

        Ok(Self {
            ehrs: EhrService::new(cfg.clone(), storage.clone()),
            directories: DirectoryService::new(cfg, storage),
        })
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let stdout = std::io::stdout();
    run(cli, &mut stdout.lock())
}

fn run(cli: Cli, out: &mut impl Write) -> anyhow::Result<()> {
    let Cli {
        data_dir,
        node_name,
        committer,
        description,
        command,
    } = cli;
    let audit = Audit {
        committer,
        description,
    };

    match command {
        Commands::Ehr { command } => {
            run_ehr(&Store::open(data_dir, node_name)?, &audit, command, out)
        }
        Commands::Directory { command } => {
            run_directory(&Store::open(data_dir, node_name)?, &audit, command, out)
        }
        Commands::Version {
            command: VersionCommand::Parse { id },
        } => parse_version(&id, out),
    }
}

/// Audit flags shared by every mutating command.
struct Audit {
    committer: String,
    description: Option<String>,
}

impl Audit {
    fn details(&self, change_type: ChangeType) -> anyhow::Result<AuditDetails> {
        Ok(AuditDetails::new(
            &self.committer,
            change_type,
            self.description.as_deref(),
        )?)
    }
}

fn run_ehr(
    store: &Store,
    audit: &Audit,
    command: EhrCommand,
    out: &mut impl Write,
) -> anyhow::Result<()> {
    match command {
        EhrCommand::Create { ehr_id, status } => {
            let status = match status {
                Some(file) => Some(openehr::read_ehr_status_yaml(&read_file(&file)?)?),
                None => None,
            };
            let audit = audit.details(ChangeType::Creation)?;
            let record = match ehr_id {
                Some(id) => store
                    .ehrs
                    .create_ehr_with_id(ObjectId::parse(&id)?, status, audit)?,
                None => store.ehrs.create_ehr(status, audit)?,
            };
            writeln!(out, "Created EHR: {}", record.ehr_id)?;
        }
        EhrCommand::List => {
            let records = store.ehrs.list_ehrs()?;
            if records.is_empty() {
                writeln!(out, "No EHRs found.")?;
            }
            for record in records {
                writeln!(
                    out,
                    "ID: {}, System: {}, Created: {}, Directory: {}",
                    record.ehr_id,
                    record.system_id,
                    record.time_created.to_rfc3339(),
                    record
                        .directory_id
                        .map_or_else(|| "-".to_owned(), |id| id.to_string())
                )?;
            }
        }
        EhrCommand::Status { ehr_id, at } => {
            let ehr_id = ObjectId::parse(&ehr_id)?;
            let found = store.ehrs.ehr_status_at_time(&ehr_id, instant(at)?)?;
            let status = vrs_core::ehr::stamped(&found.snapshot.content, &found.entry.version);
            write!(out, "{}", openehr::write_ehr_status_yaml(&status)?)?;
        }
    }
    Ok(())
}

fn run_directory(
    store: &Store,
    audit: &Audit,
    command: DirectoryCommand,
    out: &mut impl Write,
) -> anyhow::Result<()> {
    match command {
        DirectoryCommand::Create { ehr_id, file } => {
            let ehr_id = ObjectId::parse(&ehr_id)?;
            let tree = tree_from_yaml(&read_file(&file)?)?;
            let entry = store
                .directories
                .create(&ehr_id, tree, audit.details(ChangeType::Creation)?)?;
            writeln!(out, "Created directory: {}", entry.version)?;
        }
        DirectoryCommand::Update {
            ehr_id,
            file,
            if_match,
            path,
        } => {
            let ehr_id = ObjectId::parse(&ehr_id)?;
            let path = FolderPath::parse_optional(path.as_deref())?;
            let expected = VersionIdentifier::parse(&if_match)?;
            let subtree = tree_from_yaml(&read_file(&file)?)?;
            let entry = store.directories.update_at_path(
                &ehr_id,
                Some(&expected),
                &path,
                subtree,
                audit.details(ChangeType::Modification)?,
            )?;
            writeln!(out, "Updated directory: {}", entry.version)?;
        }
        DirectoryCommand::Delete { ehr_id, if_match } => {
            let ehr_id = ObjectId::parse(&ehr_id)?;
            let expected = VersionIdentifier::parse(&if_match)?;
            let version = store.directories.delete(
                &ehr_id,
                Some(&expected),
                audit.details(ChangeType::Deleted)?,
            )?;
            writeln!(out, "Deleted directory: {version}")?;
        }
        DirectoryCommand::Show {
            ehr_id,
            version,
            at,
            path,
        } => {
            let ehr_id = ObjectId::parse(&ehr_id)?;
            let found = match version {
                Some(version) => store.directories.get(
                    &ehr_id,
                    &ObjectVersionId::parse(&version)?,
                    path.as_deref(),
                )?,
                None => store
                    .directories
                    .get_at_time(&ehr_id, instant(at)?, path.as_deref())?,
            };
            match found {
                Lookup::Found(view) => {
                    let is_root = FolderPath::parse_optional(path.as_deref())?.is_root();
                    let uid = is_root.then_some(&view.version);
                    write!(out, "{}", tree_to_yaml(&view.folder, uid)?)?;
                }
                Lookup::NotFound => writeln!(out, "No folder at that path.")?,
            }
        }
        DirectoryCommand::History { ehr_id } => {
            let ehr_id = ObjectId::parse(&ehr_id)?;
            print_history(&store.directories.history(&ehr_id)?, out)?;
        }
    }
    Ok(())
}

fn parse_version(id: &str, out: &mut impl Write) -> anyhow::Result<()> {
    let parsed = VersionIdentifier::parse(id)?;
    writeln!(out, "Object ID: {}", parsed.object_id())?;
    match parsed.version() {
        Some(version) => {
            writeln!(out, "Origin: {}", version.origin())?;
            writeln!(out, "Ordinal: {}", version.ordinal())?;
        }
        None => writeln!(out, "Bare id (latest version)")?,
    }
    Ok(())
}

fn print_history(history: &RevisionHistory, out: &mut impl Write) -> anyhow::Result<()> {
    for entry in history.all() {
        write!(
            out,
            "{} {} {} by {}",
            entry.version,
            entry.committed_at.to_rfc3339(),
            entry.audit.change_type(),
            entry.audit.committer()
        )?;
        if let Some(description) = entry.audit.description() {
            write!(out, ": {description}")?;
        }
        writeln!(out)?;
    }
    Ok(())
}

fn instant(value: Option<String>) -> anyhow::Result<Option<DateTime<Utc>>> {
    value
        .map(|text| {
            DateTime::parse_from_rfc3339(text.trim())
                .map(|at| at.with_timezone(&Utc))
                .with_context(|| format!("invalid RFC 3339 instant: {text}"))
        })
        .transpose()
}

fn read_file(path: &Path) -> anyhow::Result<String> {
    std::fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))
}
