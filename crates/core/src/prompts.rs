pub const EVALUATION_SYSTEM: &str = "You are a senior technical recruiter. You judge whether a candidate \
fits a job opportunity using only the facts provided. Answer with JSON that matches the supplied schema \
exactly. Do not invent qualifications the candidate does not list.";

pub const EVALUATION_PROMPT: &str = r#"Evaluate the candidate against the job.

## Job
{job}

## Candidate
{candidate}

## Pre-computed composite score
{composite_score} (0 to 1, from embedding similarity and relationship overlap)

Set each *_fit flag to true only when the candidate clearly meets that dimension
or the job states no requirement for it. overall_fit is your final accept/reject
verdict. compatibility_score is an integer from 0 to 10. development_areas lists
short, concrete gaps. recommendation is two or three sentences for the employer."#;

pub const STATIC_EXTRACTION_SYSTEM: &str = "You extract explicit facts from recruiting documents. Copy \
facts that are stated in the text; never guess. Answer with JSON that matches the supplied schema exactly.";

pub const STATIC_EXTRACTION_PROMPT: &str = r#"Document type: {subject_type}

Extract the stated attributes and relationships from the document below.
Allowed relationship types for this document type: {relationship_types}.
Use null for attributes the document does not state.

---
{raw_extract}
---"#;

pub const INFERRED_EXTRACTION_SYSTEM: &str = "You are a career analyst. From a recruiting document and \
the facts already extracted from it, infer roles, industries and a short summary. Answer with JSON that \
matches the supplied schema exactly.";

pub const INFERRED_EXTRACTION_PROMPT: &str = r#"Document type: {subject_type}

Known facts:
{known}

Infer additional relationships of these types only: {relationship_types}.
Write a summary of at most three sentences.

---
{raw_extract}
---"#;
