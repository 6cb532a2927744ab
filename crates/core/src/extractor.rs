use crate::error::IngestError;
use crate::llm::LlmClient;
use crate::models::{
    InferredExtraction, RelationshipType, StaticExtraction, SubjectType, WorkflowTrigger,
};
use crate::prompts::{
    INFERRED_EXTRACTION_PROMPT, INFERRED_EXTRACTION_SYSTEM, STATIC_EXTRACTION_PROMPT,
    STATIC_EXTRACTION_SYSTEM,
};
use crate::text::{normalize_whitespace, truncate_chars};
use crate::traits::ProfileExtractor;
use async_trait::async_trait;
use lopdf::Document;
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use tracing::debug;
use walkdir::WalkDir;

const DOCUMENT_EXTENSIONS: [&str; 4] = ["pdf", "txt", "md", "text"];
const MAX_PROMPT_CHARS: usize = 24_000;

/// Reads an uploaded document into the `rawExtract` text of a trigger. PDFs go
/// through lopdf page by page; everything else must be UTF-8.
pub fn read_raw_extract(path: &Path) -> Result<String, IngestError> {
    let is_pdf = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"));

    let text = if is_pdf {
        read_pdf_text(path)?
    } else {
        let bytes = std::fs::read(path)?;
        String::from_utf8(bytes)
            .map_err(|error| IngestError::Encoding(format!("{}: {error}", path.display())))?
    };

    let text = normalize_whitespace(&text);
    if text.is_empty() {
        return Err(IngestError::Extraction(format!(
            "document has no readable text: {}",
            path.display()
        )));
    }
    Ok(text)
}

fn read_pdf_text(path: &Path) -> Result<String, IngestError> {
    let document = Document::load(path).map_err(|error| IngestError::PdfParse(error.to_string()))?;

    let mut pages = Vec::new();
    for page_no in document.get_pages().keys() {
        let text = document
            .extract_text(&[*page_no])
            .map_err(|error| IngestError::PdfParse(error.to_string()))?;
        if !text.trim().is_empty() {
            pages.push(text);
        }
    }

    if pages.is_empty() {
        return Err(IngestError::PdfParse(format!(
            "pdf had no readable page text: {}",
            path.display()
        )));
    }
    Ok(pages.join("\n"))
}

/// Documents under `folder`, recursively, sorted.
pub fn discover_documents(folder: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = WalkDir::new(folder)
        .into_iter()
        .filter_map(|item| item.ok())
        .filter(|entry| entry.file_type().is_file())
        .filter(|entry| {
            entry
                .path()
                .extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| {
                    DOCUMENT_EXTENSIONS
                        .iter()
                        .any(|known| ext.eq_ignore_ascii_case(known))
                })
        })
        .map(|entry| entry.path().to_path_buf())
        .collect();

    files.sort_unstable();
    files
}

/// Subject id derived from the file stem, e.g. `resumes/Jane Doe.pdf` ->
/// `jane-doe`.
pub fn subject_id_for_path(path: &Path) -> Result<String, IngestError> {
    let stem = path
        .file_stem()
        .and_then(|stem| stem.to_str())
        .ok_or_else(|| IngestError::MissingFileName(path.display().to_string()))?;

    let slug = stem
        .split(|ch: char| !ch.is_alphanumeric())
        .filter(|part| !part.is_empty())
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join("-");
    if slug.is_empty() {
        return Err(IngestError::MissingFileName(path.display().to_string()));
    }
    Ok(slug)
}

pub fn input_checksum(raw_extract: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(raw_extract.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Builds a trigger event for a document on disk.
pub fn trigger_for_path(
    path: &Path,
    subject_type: SubjectType,
    owner_id: &str,
) -> Result<WorkflowTrigger, IngestError> {
    if owner_id.trim().is_empty() {
        return Err(IngestError::InvalidArgument("owner id is empty".to_string()));
    }
    Ok(WorkflowTrigger {
        subject_type,
        subject_id: subject_id_for_path(path)?,
        owner_id: owner_id.to_string(),
        session: None,
        raw_extract: read_raw_extract(path)?,
    })
}

/// Relationship types the static stage may state for a document type.
pub fn static_relationships(subject_type: SubjectType) -> &'static [RelationshipType] {
    match subject_type {
        SubjectType::Resume => &[
            RelationshipType::HasSkill,
            RelationshipType::HasCertification,
            RelationshipType::HasEducation,
            RelationshipType::WorkedAt,
            RelationshipType::WorkedAs,
        ],
        SubjectType::JobDescription => &[
            RelationshipType::RequiresSkill,
            RelationshipType::PrefersSkill,
            RelationshipType::RequiredCertification,
            RelationshipType::RequiredEducation,
        ],
    }
}

/// Relationship types the inferred stage may add.
pub fn inferred_relationships(subject_type: SubjectType) -> &'static [RelationshipType] {
    match subject_type {
        SubjectType::Resume => &[RelationshipType::PotentialRole, RelationshipType::InIndustry],
        SubjectType::JobDescription => &[RelationshipType::SuitableForRole],
    }
}

fn relations_schema(allowed: &[RelationshipType]) -> Value {
    let names: Vec<&str> = allowed.iter().map(|relationship| relationship.as_str()).collect();
    json!({
        "type": "array",
        "items": {
            "type": "object",
            "additionalProperties": false,
            "required": ["relationship", "target"],
            "properties": {
                "relationship": { "type": "string", "enum": names },
                "target": { "type": "string" }
            }
        }
    })
}

fn static_schema(subject_type: SubjectType) -> Value {
    let nullable = json!({ "type": ["string", "null"] });
    json!({
        "type": "object",
        "additionalProperties": false,
        "required": ["attributes", "relations"],
        "properties": {
            "attributes": {
                "type": "object",
                "additionalProperties": false,
                "required": ["display_name", "title", "location", "clearance", "compensation", "summary"],
                "properties": {
                    "display_name": nullable,
                    "title": nullable,
                    "location": nullable,
                    "clearance": nullable,
                    "compensation": nullable,
                    "summary": nullable
                }
            },
            "relations": relations_schema(static_relationships(subject_type))
        }
    })
}

fn inferred_schema(subject_type: SubjectType) -> Value {
    json!({
        "type": "object",
        "additionalProperties": false,
        "required": ["summary", "relations"],
        "properties": {
            "summary": { "type": ["string", "null"] },
            "relations": relations_schema(inferred_relationships(subject_type))
        }
    })
}

fn type_list(allowed: &[RelationshipType]) -> String {
    allowed
        .iter()
        .map(|relationship| relationship.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Model-backed extractor for the two enrichment stages.
pub struct LlmProfileExtractor {
    llm: LlmClient,
}

impl LlmProfileExtractor {
    pub fn new(llm: LlmClient) -> Self {
        Self { llm }
    }
}

#[async_trait]
impl ProfileExtractor for LlmProfileExtractor {
    async fn extract_static(&self, trigger: &WorkflowTrigger) -> Result<StaticExtraction, IngestError> {
        let allowed = static_relationships(trigger.subject_type);
        let prompt = STATIC_EXTRACTION_PROMPT
            .replace("{subject_type}", trigger.subject_type.as_str())
            .replace("{relationship_types}", &type_list(allowed))
            .replace("{raw_extract}", truncate_chars(&trigger.raw_extract, MAX_PROMPT_CHARS));

        let extraction: StaticExtraction = self
            .llm
            .call_json(
                STATIC_EXTRACTION_SYSTEM,
                &prompt,
                "static_extraction",
                &static_schema(trigger.subject_type),
            )
            .await?;
        debug!(
            subject_id = %trigger.subject_id,
            relations = extraction.relations.len(),
            "static extraction finished"
        );
        Ok(extraction)
    }

    async fn extract_inferred(
        &self,
        trigger: &WorkflowTrigger,
        known: &StaticExtraction,
    ) -> Result<InferredExtraction, IngestError> {
        let allowed = inferred_relationships(trigger.subject_type);
        let known_json = serde_json::to_string_pretty(known)
            .map_err(|error| IngestError::Extraction(error.to_string()))?;
        let prompt = INFERRED_EXTRACTION_PROMPT
            .replace("{subject_type}", trigger.subject_type.as_str())
            .replace("{known}", &known_json)
            .replace("{relationship_types}", &type_list(allowed))
            .replace("{raw_extract}", truncate_chars(&trigger.raw_extract, MAX_PROMPT_CHARS));

        let extraction: InferredExtraction = self
            .llm
            .call_json(
                INFERRED_EXTRACTION_SYSTEM,
                &prompt,
                "inferred_extraction",
                &inferred_schema(trigger.subject_type),
            )
            .await?;
        debug!(
            subject_id = %trigger.subject_id,
            relations = extraction.relations.len(),
            "inferred extraction finished"
        );
        Ok(extraction)
    }
}
