use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use rayon::ThreadPoolBuilder;
use rvo_edicrop::extract::extract_crop_fields;
use rvo_edicrop::{
    encode_geojson_to_gml, parse_xml_tree, write_feature_collection, ClientConfig, EdiCropClient,
    FeatureCollection, FieldMutation, HttpTransport, MutationTicket, Period, Poller,
    StaticCredential,
};
use serde_json::Value;
use std::collections::HashSet;
use std::fs::{self, File};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;
use tracing::{debug, error, info, warn};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Convert crop-field responses (XML file, ZIP file or directory) to GeoJSON
    Convert(ConvertArgs),

    /// Print the RD New GML border for a GeoJSON geometry or Feature
    Encode {
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },

    /// Submit a JSON array of mutations for a farm and print the ticket
    Submit {
        #[command(flatten)]
        service: ServiceArgs,
        #[arg(long)]
        farm: String,
        #[arg(value_name = "MUTATIONS")]
        mutations: PathBuf,
    },

    /// Print the current processing status of a ticket
    Status {
        #[command(flatten)]
        service: ServiceArgs,
        ticket: String,
    },

    /// Poll a ticket until it settles
    Wait {
        #[command(flatten)]
        service: ServiceArgs,
        ticket: String,
        /// Seconds between polls
        #[arg(long, default_value_t = 5)]
        interval: u64,
        #[arg(long)]
        max_attempts: Option<u32>,
    },

    /// Print the validation messages of a ticket
    Validation {
        #[command(flatten)]
        service: ServiceArgs,
        ticket: String,
    },

    /// Fetch a TAN sequence number and formalize a validated ticket
    Formalize {
        #[command(flatten)]
        service: ServiceArgs,
        ticket: String,
        #[arg(long)]
        farm: String,
        #[arg(long)]
        tan: String,
    },

    /// Cancel a ticket
    Cancel {
        #[command(flatten)]
        service: ServiceArgs,
        ticket: String,
    },

    /// Download the registered crop fields of a farm as GeoJSON
    Fields {
        #[command(flatten)]
        service: ServiceArgs,
        #[arg(long)]
        farm: String,
        /// First day of the period (YYYY-MM-DD)
        #[arg(long)]
        begin: String,
        /// Last day of the period (YYYY-MM-DD)
        #[arg(long)]
        end: String,
        /// Write to this file instead of stdout
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,
    },
}

#[derive(Args, Debug)]
struct ConvertArgs {
    /// Input XML file, ZIP file or directory
    #[arg(value_name = "INPUT")]
    input: PathBuf,

    /// Output directory
    #[arg(short, long, value_name = "DIR")]
    output: PathBuf,

    /// Number of worker threads (default: number of CPU cores)
    #[arg(short, long)]
    threads: Option<usize>,
}

#[derive(Args, Debug)]
struct ServiceArgs {
    /// Service endpoint URL
    #[arg(long, env = "EDICROP_ENDPOINT")]
    endpoint: String,

    /// Bearer token
    #[arg(long, env = "EDICROP_TOKEN", hide_env_values = true)]
    token: String,

    /// Sender id placed in every request
    #[arg(long)]
    sender: Option<String>,

    /// Per-request timeout in seconds
    #[arg(long, default_value_t = 30)]
    timeout: u64,
}

impl ServiceArgs {
    fn client(&self) -> Result<EdiCropClient<HttpTransport, StaticCredential>> {
        let mut config = ClientConfig::new(&self.endpoint)
            .with_timeout(Some(Duration::from_secs(self.timeout)));
        if let Some(sender) = &self.sender {
            config = config.with_sender(sender);
        }
        Ok(EdiCropClient::new(
            config,
            HttpTransport::new()?,
            StaticCredential::new(&self.token),
        ))
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let start_time = std::time::Instant::now();

    match cli.command {
        Command::Convert(args) => convert(&args)?,
        Command::Encode { file } => {
            let value: Value = serde_json::from_str(&fs::read_to_string(&file)?)?;
            let geometry = value.get("geometry").unwrap_or(&value);
            println!("{}", encode_geojson_to_gml(geometry)?);
        }
        Command::Submit {
            service,
            farm,
            mutations,
        } => {
            let mutations = read_mutations(&mutations)?;
            let ticket = service.client()?.submit_mutations(&farm, &mutations)?;
            println!("{ticket}");
        }
        Command::Status { service, ticket } => {
            let status = service.client()?.poll_status(&MutationTicket::new(ticket))?;
            println!("{}", serde_json::to_string_pretty(&status)?);
        }
        Command::Wait {
            service,
            ticket,
            interval,
            max_attempts,
        } => wait(&service, ticket, interval, max_attempts)?,
        Command::Validation { service, ticket } => {
            let result = service
                .client()?
                .fetch_validation(&MutationTicket::new(ticket))?;
            info!(
                "Ticket {}: {} messages",
                result.ticket,
                result.messages.len()
            );
            println!("{}", serde_json::to_string_pretty(&result.messages)?);
        }
        Command::Formalize {
            service,
            ticket,
            farm,
            tan,
        } => {
            let client = service.client()?;
            let sequence = client.fetch_tan_sequence(&farm)?;
            let result = client.formalize(&MutationTicket::new(ticket), sequence, &tan)?;
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        Command::Cancel { service, ticket } => {
            let result = service.client()?.cancel(&MutationTicket::new(ticket))?;
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        Command::Fields {
            service,
            farm,
            begin,
            end,
            output,
        } => {
            let collection = service
                .client()?
                .fetch_crop_fields(&farm, &Period::new(begin, end))?;
            match output {
                Some(path) => {
                    write_feature_collection(&path, &collection)?;
                    info!("Written GeoJSON: {:?}", path);
                }
                None => println!("{}", serde_json::to_string_pretty(&collection)?),
            }
        }
    }

    info!("Total processing time: {:?}", start_time.elapsed());
    Ok(())
}

fn read_mutations(path: &Path) -> Result<Vec<FieldMutation>> {
    let value: Value = serde_json::from_str(&fs::read_to_string(path)?)?;
    let items = value
        .as_array()
        .with_context(|| format!("{} must hold a JSON array of mutations", path.display()))?;
    items
        .iter()
        .map(|item| FieldMutation::from_json(item).map_err(anyhow::Error::from))
        .collect()
}

fn wait(service: &ServiceArgs, ticket: String, interval: u64, max_attempts: Option<u32>) -> Result<()> {
    let client = service.client()?;
    let mut poller = Poller::new(&client, MutationTicket::new(ticket))
        .interval(Duration::from_secs(interval));
    if let Some(max) = max_attempts {
        poller = poller.max_attempts(max);
    }

    let mut last = None;
    for status in poller {
        match status {
            Ok(status) => last = Some(status),
            Err(err) if err.is_retryable() => warn!("Poll timed out, retrying: {}", err),
            Err(err) => return Err(err.into()),
        }
    }

    match last {
        Some(status) if status.state().is_settled() => {
            println!("{}", serde_json::to_string_pretty(&status)?);
            Ok(())
        }
        Some(status) => anyhow::bail!(
            "ticket still {} ({}%) after polling stopped",
            status.code,
            status.percentage
        ),
        None => anyhow::bail!("no status received"),
    }
}

fn convert(args: &ConvertArgs) -> Result<()> {
    if let Some(threads) = args.threads {
        ThreadPoolBuilder::new()
            .num_threads(threads)
            .build_global()
            .context("Failed to build thread pool")?;
    }

    fs::create_dir_all(&args.output)?;
    let conversion = Conversion::new(&args.input, &args.output);

    if args.input.is_dir() {
        info!("Processing directory: {:?}", args.input);
        return conversion.run_directory();
    }
    if !args.input.is_file() {
        error!("Invalid input path: {:?}", args.input);
        anyhow::bail!("Input path must be a file or directory");
    }
    let Some(source) = Source::of(&args.input) else {
        error!("Unsupported file type: {:?}", args.input);
        anyhow::bail!("Input file must be .xml or .zip");
    };

    let converted = conversion.run_file(&args.input, source)?;
    info!("Converted {} responses from {:?}", converted, args.input);
    Ok(())
}

/// Response containers `convert` reads.
#[derive(Debug, Clone, Copy)]
enum Source {
    Xml,
    Zip,
}

impl Source {
    fn of(path: &Path) -> Option<Self> {
        match path.extension().and_then(|s| s.to_str()) {
            Some("xml") => Some(Self::Xml),
            Some("zip") => Some(Self::Zip),
            _ => None,
        }
    }
}

/// One `convert` run.
///
/// Targets mirror the input layout below the output directory: `a/fields.xml`
/// becomes `a/fields.geojson`, and the entries of `nested/batch.zip` land in
/// `nested/batch/`. Two inputs mapping to the same target fail the run.
struct Conversion<'a> {
    root: &'a Path,
    output: &'a Path,
    claimed: Mutex<HashSet<PathBuf>>,
}

impl<'a> Conversion<'a> {
    fn new(root: &'a Path, output: &'a Path) -> Self {
        Self {
            root,
            output,
            claimed: Mutex::new(HashSet::new()),
        }
    }

    fn run_directory(&self) -> Result<()> {
        use rayon::prelude::*;

        let inputs = collect_inputs(self.root)?;
        info!("Found {} input files (XML/ZIP)", inputs.len());

        let failures: Vec<String> = inputs
            .par_iter()
            .filter_map(|(path, source)| {
                self.run_file(path, *source)
                    .err()
                    .map(|err| format!("{}: {:#}", path.display(), err))
            })
            .collect();

        if !failures.is_empty() {
            error!("Failed to process {} files", failures.len());
            anyhow::bail!(
                "{} files failed to process:\n  {}",
                failures.len(),
                failures.join("\n  ")
            );
        }
        Ok(())
    }

    /// Returns the number of response documents written.
    fn run_file(&self, path: &Path, source: Source) -> Result<usize> {
        match source {
            Source::Xml => {
                let xml = fs::read_to_string(path)?;
                self.write_document(&xml, &path.display().to_string(), self.relative(path))?;
                Ok(1)
            }
            Source::Zip => self.run_archive(path),
        }
    }

    fn run_archive(&self, path: &Path) -> Result<usize> {
        let folder = self.relative(path).with_extension("");
        let mut archive = zip::ZipArchive::new(File::open(path)?)?;
        let mut written = 0usize;

        for i in 0..archive.len() {
            let mut entry = archive.by_index(i)?;
            if entry.is_dir() || !entry.name().ends_with(".xml") {
                continue;
            }
            let Some(inner) = entry.enclosed_name() else {
                warn!("Skipping ZIP entry outside the archive root: {}", entry.name());
                continue;
            };
            let origin = format!("{} in {}", entry.name(), path.display());
            let mut xml = String::new();
            entry.read_to_string(&mut xml)?;

            self.write_document(&xml, &origin, folder.join(inner))?;
            written += 1;
        }

        debug!("Converted {} responses from {:?}", written, path);
        Ok(written)
    }

    /// Converts one response document and writes it below the output
    /// directory at `relative`, extension swapped for `.geojson`.
    fn write_document(&self, xml: &str, origin: &str, relative: PathBuf) -> Result<()> {
        let collection =
            convert_response(xml).with_context(|| format!("converting {origin}"))?;

        let target = self.output.join(relative).with_extension("geojson");
        self.claim(&target)?;
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        write_feature_collection(&target, &collection)?;
        info!(
            "Written GeoJSON: {:?} ({} features)",
            target,
            collection.len()
        );
        Ok(())
    }

    /// Path of `source` below the input root. A single-file input maps to
    /// its own file name.
    fn relative(&self, source: &Path) -> PathBuf {
        match source.strip_prefix(self.root) {
            Ok(relative) if !relative.as_os_str().is_empty() => relative.to_path_buf(),
            _ => source.file_name().map(PathBuf::from).unwrap_or_default(),
        }
    }

    fn claim(&self, target: &Path) -> Result<()> {
        let mut claimed = self
            .claimed
            .lock()
            .map_err(|_| anyhow::anyhow!("output registry poisoned"))?;
        if !claimed.insert(target.to_path_buf()) {
            anyhow::bail!(
                "{} would be written by more than one input",
                target.display()
            );
        }
        Ok(())
    }
}

fn convert_response(xml: &str) -> Result<FeatureCollection> {
    let root = parse_xml_tree(xml)?;
    Ok(extract_crop_fields(&root)?)
}

fn collect_inputs(dir: &Path) -> Result<Vec<(PathBuf, Source)>> {
    let mut inputs = Vec::new();

    let mut entries = fs::read_dir(dir)?.collect::<std::io::Result<Vec<_>>>()?;
    entries.sort_by_key(|entry| entry.path());

    for entry in entries {
        let path = entry.path();
        if path.is_dir() {
            inputs.extend(collect_inputs(&path)?);
        } else if let Some(source) = Source::of(&path) {
            inputs.push((path, source));
        }
    }

    Ok(inputs)
}
