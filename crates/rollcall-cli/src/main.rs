mod config;

use anyhow::{bail, Context, Result};
use chrono::{Local, NaiveDate};
use clap::{Parser, Subcommand};
use config::Config;
use rollcall_core::encoder::{ARCFACE_MODEL_FILE, SCRFD_MODEL_FILE};
use rollcall_core::ledger::{parse_date, DATE_FORMAT};
use rollcall_core::{
    AttendanceError, AttendanceLedger, AttendanceService, CsvEncodingStore, CsvLedger,
    EncodingStore, FaceLabel, MarkOutcome, OnnxFaceEncoder, Recognition,
};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "rollcall", about = "Face-recognition attendance register")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Enroll one person from a photo (first detected face is used)
    Enroll {
        /// Person's display name
        #[arg(short, long)]
        name: String,
        /// Photo containing the person's face
        image: PathBuf,
    },
    /// Rebuild the encoding store from a `<person>/<image>` directory tree
    Train {
        /// Training directory (defaults to the configured one)
        #[arg(short, long)]
        dir: Option<PathBuf>,
    },
    /// Recognize faces in a photo and mark attendance for known people
    Recognize {
        image: PathBuf,
        /// Print the result as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show the attendance list for a day
    View {
        /// Day as DD-MM-YYYY (defaults to today)
        #[arg(short, long, value_parser = parse_day)]
        date: Option<NaiveDate>,
        #[arg(long)]
        json: bool,
    },
    /// List enrolled people
    List,
    /// Show configuration and store summary
    Status,
}

type Service = AttendanceService<OnnxFaceEncoder, CsvEncodingStore, CsvLedger>;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config = Config::load()?;
    tracing::debug!(?config, "configuration loaded");

    match cli.command {
        Commands::Enroll { name, image } => {
            let mut service = open_service(&config)?;
            let bytes = read_image(&image)?;
            match service.enroll_bytes(&name, &bytes) {
                Ok(record) => println!(
                    "Enrolled {} ({}-d encoding) from {}",
                    record.name,
                    record.embedding.len(),
                    image.display()
                ),
                Err(AttendanceError::NoFaceDetected) => {
                    bail!("no face detected in {}; nothing enrolled", image.display())
                }
                Err(e) => return Err(e).context("enrollment failed"),
            }
        }
        Commands::Train { dir } => {
            let dir = dir.unwrap_or_else(|| config.training_dir.clone());
            let mut service = open_service(&config)?;
            let report = service
                .train(&dir)
                .with_context(|| format!("training from {}", dir.display()))?;
            println!(
                "Trained {} encodings for {} people from {}",
                report.records,
                report.people,
                dir.display()
            );
            for path in &report.skipped {
                println!("  skipped {}", path.display());
            }
        }
        Commands::Recognize { image, json } => {
            let mut service = open_service(&config)?;
            let bytes = read_image(&image)?;
            let now = Local::now().naive_local();
            let result = service
                .recognize_bytes(&bytes, now)
                .context("recognition failed")?;
            if json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                print_recognition(&result);
            }
        }
        Commands::View { date, json } => {
            let date = date.unwrap_or_else(|| Local::now().date_naive());
            let ledger = CsvLedger::new(&config.attendance_dir);
            let entries = ledger.view(date).context("reading attendance")?;
            if json {
                println!("{}", serde_json::to_string_pretty(&entries)?);
            } else if entries.is_empty() {
                println!("No attendance recorded for {}", date.format(DATE_FORMAT));
            } else {
                println!("Attendance for {}:", date.format(DATE_FORMAT));
                for entry in &entries {
                    println!("  {:<24} {}", entry.name, entry.time.format("%H:%M:%S"));
                }
            }
        }
        Commands::List => {
            let counts = enrolled_counts(&CsvEncodingStore::new(&config.store_path))?;
            if counts.is_empty() {
                println!("No faces enrolled");
            } else {
                for (name, count) in &counts {
                    println!("{name:<24} {count} encoding(s)");
                }
            }
        }
        Commands::Status => {
            let store = CsvEncodingStore::new(&config.store_path);
            let ledger = CsvLedger::new(&config.attendance_dir);
            let counts = enrolled_counts(&store)?;
            let today = Local::now().date_naive();
            let present = ledger.view(today).context("reading today's attendance")?.len();
            let status = serde_json::json!({
                "config_file": config.source,
                "store_path": store.path(),
                "attendance_dir": ledger.dir(),
                "ledger_today": ledger.path_for(today),
                "training_dir": config.training_dir,
                "model_dir": config.model_dir,
                "models_present": models_present(&config.model_dir),
                "matching": config.matching,
                "people": counts.len(),
                "records": counts.values().sum::<usize>(),
                "date": today.format(DATE_FORMAT).to_string(),
                "present_today": present,
            });
            println!("{}", serde_json::to_string_pretty(&status)?);
        }
    }

    Ok(())
}

fn open_service(config: &Config) -> Result<Service> {
    let encoder = OnnxFaceEncoder::load(&config.model_dir).with_context(|| {
        format!(
            "loading face models from {} (expected {SCRFD_MODEL_FILE} and {ARCFACE_MODEL_FILE})",
            config.model_dir.display()
        )
    })?;
    Ok(AttendanceService::new(
        encoder,
        CsvEncodingStore::new(&config.store_path),
        CsvLedger::new(&config.attendance_dir),
        config.matching,
    ))
}

fn read_image(path: &Path) -> Result<Vec<u8>> {
    std::fs::read(path).with_context(|| format!("reading image {}", path.display()))
}

fn parse_day(raw: &str) -> Result<NaiveDate, String> {
    parse_date(raw).map_err(|e| format!("expected DD-MM-YYYY: {e}"))
}

/// Encodings per enrolled name, sorted by name.
fn enrolled_counts(store: &impl EncodingStore) -> Result<BTreeMap<String, usize>> {
    let mut counts = BTreeMap::new();
    for record in store.load().context("reading encoding store")? {
        *counts.entry(record.name).or_insert(0) += 1;
    }
    Ok(counts)
}

fn models_present(model_dir: &Path) -> bool {
    [SCRFD_MODEL_FILE, ARCFACE_MODEL_FILE]
        .iter()
        .all(|file| model_dir.join(file).is_file())
}

fn print_recognition(result: &Recognition) {
    let Recognition::Faces { faces, known_set_empty } = result else {
        println!("No faces detected");
        return;
    };
    if *known_set_empty {
        println!("No faces enrolled yet; run `rollcall enroll` or `rollcall train` first");
    }
    for face in faces {
        let note = match (&face.label, face.attendance) {
            (FaceLabel::Unknown, _) => String::new(),
            (_, Some(MarkOutcome::Marked)) => " (attendance marked)".to_string(),
            (_, Some(MarkOutcome::AlreadyMarked)) => " (already marked today)".to_string(),
            (_, None) => String::new(),
        };
        match face.distance {
            Some(d) => println!("{}{note}  distance={d:.3}", face.label),
            None => println!("{}{note}", face.label),
        }
    }
}
