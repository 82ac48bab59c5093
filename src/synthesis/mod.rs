use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{Local, Utc};
use log::info;

use crate::db::Database;
use crate::error::{Error, Result};
use crate::llm::{TextSynthesizer, DEFAULT_SUMMARY_PROMPT};
use crate::models::{Record, RecordContent, ScreenContext};

/// Placeholder in the summary prompt template that the rendered record
/// lines are substituted into.
pub const RECORDS_PLACEHOLDER: &str = "{records}";

/// On-demand aggregation of a day's records into one narrative document.
pub struct SynthesisEngine {
    db: Database,
    synthesizer: Arc<dyn TextSynthesizer>,
}

impl SynthesisEngine {
    pub fn new(db: Database, synthesizer: Arc<dyn TextSynthesizer>) -> Self {
        Self { db, synthesizer }
    }

    /// Generates today's summary and writes it into the vault, overwriting
    /// any earlier file for the same date. Nothing is written on failure.
    pub async fn generate_summary(&self) -> Result<PathBuf> {
        let settings = self.db.get_settings().await?;

        let vault = settings
            .vault_path
            .as_deref()
            .filter(|p| !p.trim().is_empty())
            .ok_or_else(|| Error::Config("vault path is not configured".into()))?;
        let vault = Path::new(vault);
        if !vault.is_dir() {
            return Err(Error::Config(format!(
                "vault path {} does not exist",
                vault.display()
            )));
        }

        let today = Utc::now().date_naive();
        let records = self.db.records_for_utc_day(today).await?;
        if records.is_empty() {
            return Err(Error::NoRecords);
        }

        let template = settings
            .summary_prompt
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or(DEFAULT_SUMMARY_PROMPT);
        let prompt = template.replace(RECORDS_PLACEHOLDER, &render_records(&records));

        let summary = self.synthesizer.synthesize(&settings, &prompt).await?;

        let output_path = vault.join(format!("{}.md", today.format("%Y-%m-%d")));
        std::fs::write(&output_path, &summary)?;
        let output_path = output_path.canonicalize()?;

        info!("daily summary written to {}", output_path.display());
        Ok(output_path)
    }
}

fn render_records(records: &[Record]) -> String {
    records
        .iter()
        .map(render_line)
        .collect::<Vec<_>>()
        .join("\n")
}

fn render_line(record: &Record) -> String {
    let time = record.timestamp.with_timezone(&Local).format("%H:%M");
    match &record.content {
        RecordContent::Auto(ScreenContext::Structured(analysis)) => format!(
            "- [{time}] perception: {} (software: {}; keywords: {})",
            analysis.current_focus,
            analysis.active_software,
            analysis.context_keywords.join(", ")
        ),
        RecordContent::Auto(ScreenContext::Raw(text)) => {
            format!("- [{time}] perception: {text}")
        }
        RecordContent::Manual(text) => format!("- [{time}] note: {text}"),
    }
}
