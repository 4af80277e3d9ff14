use chrono::Utc;
use tracing::{debug, info, info_span, warn, Instrument};

use crate::document::{Document, DocumentStatus, OcrMetadata};
use crate::sanitize;
use crate::text::confidence;
use crate::worker::job::Job;

use super::context::PipelineContext;
use super::error::PipelineError;

/// Result of running the pipeline for one job attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum ProcessOutcome {
    Processed {
        document_number: Option<String>,
        confidence: f64,
    },
    /// The document was already terminal; nothing was touched.
    Duplicate(DocumentStatus),
    /// No document with the job's id exists.
    Missing,
}

pub struct Pipeline {
    ctx: PipelineContext,
}

impl Pipeline {
    pub fn new(ctx: PipelineContext) -> Self {
        Self { ctx }
    }

    pub fn context(&self) -> &PipelineContext {
        &self.ctx
    }

    /// Runs OCR, extraction and indexing for the job's document.
    ///
    /// The document is moved to Processing first and to Processed only after
    /// the index accepted it. A document that is already terminal is left
    /// alone, so redelivered jobs never re-run OCR or re-index.
    pub async fn process(&self, job: &Job) -> Result<ProcessOutcome, PipelineError> {
        let span = info_span!("job",
            job_id = %job.id,
            document_id = %job.document_id,
            attempt = job.attempts,
            max_attempts = job.max_attempts,
        );
        self.run(job).instrument(span).await
    }

    async fn run(&self, job: &Job) -> Result<ProcessOutcome, PipelineError> {
        let id = job.document_id.as_str();

        // Step 1: claim the document
        let mut doc = match self.claim(id).await? {
            Ok(doc) => doc,
            Err(outcome) => return Ok(outcome),
        };

        // Step 2: fetch the stored file
        let bytes = async {
            debug!(file = %sanitize::redact_storage_key(&doc.storage_path), "Fetching file");
            self.ctx.files.fetch(&doc.storage_path).await
        }
        .instrument(info_span!("fetch_file"))
        .await?;

        // Step 3: OCR under the configured timeout
        let ocr = &self.ctx.config.ocr;
        let output = self
            .ctx
            .ocr
            .invoke(&bytes, &ocr.language, ocr.timeout)
            .instrument(info_span!("ocr", engine = self.ctx.ocr.engine(), bytes = bytes.len()))
            .await?;
        let text = output.text.trim().to_string();

        // Step 4: document number and confidence
        let (document_number, metadata) = {
            let _step = info_span!("extract").entered();
            let extraction = self.ctx.extractor.extract_detailed(&text);
            let score = confidence::score(&text);
            let low_confidence = score < self.ctx.config.confidence_threshold;

            match &extraction {
                Some(found) => debug!(rule = found.rule, "Extracted document number"),
                None => debug!("No document number found"),
            }
            if low_confidence {
                warn!(
                    confidence = score,
                    threshold = self.ctx.config.confidence_threshold,
                    "Low OCR confidence"
                );
            }

            let metadata = OcrMetadata {
                engine: output.engine.to_string(),
                language: ocr.language.clone(),
                confidence: score,
                timestamp: Utc::now(),
                engine_version: output.engine_version.clone(),
                low_confidence,
            };
            (extraction.map(|e| e.number), metadata)
        };

        // Step 5: persist OCR results
        let stored = self
            .ctx
            .store
            .update_with_ocr_results(id, &text, document_number.as_deref(), Some(&metadata))
            .instrument(info_span!("persist"))
            .await?;
        if !stored {
            // Finished by another delivery while this one ran OCR.
            return self.finished_elsewhere(id).await;
        }

        // Step 6: index, then finalize
        let now = Utc::now();
        doc.status = DocumentStatus::Processed;
        doc.full_text = Some(text);
        doc.extracted_doc_number = document_number.clone();
        doc.ocr_metadata = Some(metadata.clone());
        doc.processed_at = Some(now);
        doc.updated_at = now;

        async {
            self.ctx.indexer.index(&doc.to_search_document()).await?;
            if !self
                .ctx
                .store
                .update_status(id, DocumentStatus::Processed, None)
                .await?
            {
                warn!("Document left Processing before it could be finalized");
            }
            Ok::<_, PipelineError>(())
        }
        .instrument(info_span!("index"))
        .await?;

        info!(
            confidence = metadata.confidence,
            has_number = document_number.is_some(),
            "Document processed"
        );
        Ok(ProcessOutcome::Processed {
            document_number,
            confidence: metadata.confidence,
        })
    }

    /// Moves the document to Processing. The inner `Err` carries the outcome
    /// when there is nothing to do.
    async fn claim(&self, id: &str) -> Result<Result<Document, ProcessOutcome>, PipelineError> {
        let Some(doc) = self.ctx.store.get_by_id(id).await? else {
            return Ok(Err(ProcessOutcome::Missing));
        };
        if doc.status.is_terminal() {
            return Ok(Err(ProcessOutcome::Duplicate(doc.status)));
        }

        if !self
            .ctx
            .store
            .update_status(id, DocumentStatus::Processing, None)
            .await?
        {
            return self.finished_elsewhere(id).await.map(Err);
        }
        Ok(Ok(doc))
    }

    async fn finished_elsewhere(&self, id: &str) -> Result<ProcessOutcome, PipelineError> {
        Ok(match self.ctx.store.get_by_id(id).await? {
            Some(doc) => ProcessOutcome::Duplicate(doc.status),
            None => ProcessOutcome::Missing,
        })
    }
}
