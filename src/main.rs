use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use uuid::Uuid;

use scanline::config::{self, IntakeConfig};
use scanline::db::{self, get_ocr_result};
use scanline::models::enums::DocumentType;
use scanline::models::OcrOwner;
use scanline::pipeline::extraction::{sanitize_ocr_text, ExtractedDocumentData, FieldExtractor};
use scanline::pipeline::matching::{find_matching_patient, MatchWeights};
use scanline::pipeline::ocr::{OcrEngine, OcrError, PlainTextOcr};
use scanline::pipeline::processor::DocumentProcessor;
use scanline::pipeline::worker::start_processing_worker;

#[derive(Parser)]
#[command(name = "scanline")]
#[command(version, about = "Extract patient fields from scanned clinical documents")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run field extraction on a text file and print the result as JSON
    Extract {
        /// OCR text file
        file: PathBuf,
        /// Document type (referral, lab_result, intake_form, unknown); guessed when omitted
        #[arg(long, value_parser = parse_document_type)]
        doc_type: Option<DocumentType>,
    },
    /// Look up the best registry match for an identity
    Match {
        #[arg(long)]
        first: Option<String>,
        #[arg(long)]
        last: Option<String>,
        /// Date of birth in any supported format
        #[arg(long)]
        dob: Option<String>,
    },
    /// Process a stored document or referral scan through the background worker
    Process {
        /// Document (or referral scan) UUID
        id: Uuid,
        /// Treat the id as a referral scan
        #[arg(long)]
        referral: bool,
    },
}

/// Accepts the common spellings `DocumentType::from_guess` knows; anything
/// it cannot place is an error rather than a silent `unknown`.
fn parse_document_type(raw: &str) -> Result<DocumentType, String> {
    match DocumentType::from_guess(raw) {
        DocumentType::Unknown if !raw.trim().eq_ignore_ascii_case("unknown") => Err(format!(
            "unrecognized document type '{raw}' \
             (expected referral, lab_result, intake_form or unknown)"
        )),
        document_type => Ok(document_type),
    }
}

/// Read a text file and extract fields the same way a processing run does.
fn extract_file(
    file: &Path,
    doc_type: Option<DocumentType>,
) -> Result<ExtractedDocumentData, OcrError> {
    let mime_type = mime_guess::from_path(file).first_or_octet_stream();
    let ocr = PlainTextOcr.process(file, mime_type.essence_str())?;
    let document_type = doc_type.unwrap_or(ocr.document_type);
    let text = sanitize_ocr_text(&ocr.text);
    Ok(FieldExtractor::default().extract_all_data(&text, document_type))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    scanline::init_tracing();
    let cli = Cli::parse();
    let config = IntakeConfig::from_env();
    tracing::debug!(app = config::APP_NAME, version = config::APP_VERSION, "Starting");

    match cli.command {
        Commands::Extract { file, doc_type } => {
            let data = extract_file(&file, doc_type)?;
            println!("{}", serde_json::to_string_pretty(&data)?);
        }
        Commands::Match { first, last, dob } => {
            let conn = db::open_database(&config.database_path)?;
            let found = find_matching_patient(
                &conn,
                first.as_deref(),
                last.as_deref(),
                dob.as_deref(),
                &MatchWeights::default(),
            )?;
            match found {
                Some(patient) => println!("{}", serde_json::to_string_pretty(&patient)?),
                None => println!("No matching patient."),
            }
        }
        Commands::Process { id, referral } => {
            let owner = if referral {
                OcrOwner::ReferralScan(id)
            } else {
                OcrOwner::Document(id)
            };
            let conn = db::open_database(&config.database_path)?;
            let processor = Arc::new(DocumentProcessor::from_config(&config)?);
            let (queue, worker) =
                start_processing_worker(config.database_path.clone(), processor, config.workers);

            let ocr_result_id = queue.request(&conn, owner)?;
            drop(queue);
            worker.join().await;

            match get_ocr_result(&conn, &ocr_result_id)? {
                Some(result) => println!("{}", serde_json::to_string_pretty(&result)?),
                None => eprintln!("OCR result {ocr_result_id} disappeared"),
            }
        }
    }

    Ok(())
}
