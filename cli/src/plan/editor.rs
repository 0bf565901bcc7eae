use super::{parse_text, CompositionPlanDocument, PlanEditError, PlanParseError};
use tracing::debug;

/// Keeps the plan's JSON text and its structured form in step.
///
/// Text edits go through [`PlanEditor::parse`]; a failed parse records the
/// error and keeps the offending text, but the last good document survives.
/// Structural edits go through [`PlanEditor::apply`], which always rewrites
/// the text from the new document.
#[derive(Debug, Clone, Default)]
pub struct PlanEditor {
    text: String,
    document: Option<CompositionPlanDocument>,
    error: Option<PlanParseError>,
    revision: u64,
}

impl PlanEditor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// Last successfully parsed or applied document.
    pub fn document(&self) -> Option<&CompositionPlanDocument> {
        self.document.as_ref()
    }

    pub fn error(&self) -> Option<&PlanParseError> {
        self.error.as_ref()
    }

    /// Bumped whenever the structured document changes.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// The current text parses and yields a sections list.
    pub fn is_valid(&self) -> bool {
        self.document.is_some() && self.error.is_none()
    }

    pub fn parse(&mut self, text: impl Into<String>) -> Result<(), PlanParseError> {
        self.text = text.into();
        match parse_text(&self.text) {
            Ok(document) => {
                self.replace_document(document);
                self.error = None;
                Ok(())
            }
            Err(err) => {
                debug!("plan text rejected: {err}");
                self.error = Some(err.clone());
                Err(err)
            }
        }
    }

    /// Replaces the document wholesale and rewrites the text.
    pub fn load(&mut self, document: CompositionPlanDocument) -> Result<(), PlanEditError> {
        let text = document
            .to_pretty_json()
            .map_err(|err| PlanEditError::Serialize(err.to_string()))?;
        self.text = text;
        self.replace_document(document);
        self.error = None;
        Ok(())
    }

    pub fn apply<F>(&mut self, mutator: F) -> Result<(), PlanEditError>
    where
        F: FnOnce(CompositionPlanDocument) -> CompositionPlanDocument,
    {
        self.try_apply(|document| Ok(mutator(document)))
    }

    /// Runs a fallible edit against a copy; on rejection nothing changes.
    pub fn try_apply<F>(&mut self, mutator: F) -> Result<(), PlanEditError>
    where
        F: FnOnce(CompositionPlanDocument) -> Result<CompositionPlanDocument, PlanEditError>,
    {
        let current = self.document.clone().ok_or(PlanEditError::NoDocument)?;
        let updated = mutator(current)?;
        self.load(updated)
    }

    /// Pretty-prints the current text if it parses.
    pub fn format(&mut self) -> Result<(), PlanParseError> {
        let document = parse_text(&self.text).inspect_err(|err| {
            self.error = Some(err.clone());
        })?;
        let formatted = document
            .to_pretty_json()
            .map_err(|err| PlanParseError::Structure(err.to_string()))?;
        self.text = formatted;
        self.replace_document(document);
        self.error = None;
        Ok(())
    }

    pub fn clear(&mut self) {
        self.text.clear();
        self.error = None;
        if self.document.take().is_some() {
            self.revision += 1;
        }
    }

    fn replace_document(&mut self, document: CompositionPlanDocument) {
        if self.document.as_ref() != Some(&document) {
            self.revision += 1;
        }
        self.document = Some(document);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::TagList;
    use serde_json::json;

    const VALID: &str = r#"{"sections": [{"section_name": "Intro", "duration_ms": 3000}]}"#;

    #[test]
    fn invalid_text_keeps_last_good_document() {
        let mut editor = PlanEditor::new();
        editor.parse(VALID).unwrap();
        let good = editor.document().cloned().unwrap();
        let revision = editor.revision();

        let broken = r#"{"sections": [{"section_name": "Intro",, }"#;
        assert!(matches!(editor.parse(broken), Err(PlanParseError::Syntax(_))));
        assert_eq!(editor.text(), broken);
        assert_eq!(editor.document(), Some(&good));
        assert_eq!(editor.revision(), revision);
        assert!(editor.error().is_some());
        assert!(!editor.is_valid());

        editor.parse(VALID).unwrap();
        assert!(editor.error().is_none());
        assert!(editor.is_valid());
    }

    #[test]
    fn valid_text_replaces_document_without_reformatting() {
        let mut editor = PlanEditor::new();
        editor.parse(VALID).unwrap();
        let replacement = r#"{"sections": []}"#;
        editor.parse(replacement).unwrap();
        assert_eq!(editor.text(), replacement);
        assert!(editor.document().unwrap().sections().is_empty());
    }

    #[test]
    fn apply_rewrites_text_from_structure() {
        let mut editor = PlanEditor::new();
        editor.parse(VALID).unwrap();
        editor.apply(CompositionPlanDocument::with_section_added).unwrap();
        editor.try_apply(|doc| doc.with_tag_added(TagList::PositiveGlobal, "warm")).unwrap();

        let reparsed: serde_json::Value = serde_json::from_str(editor.text()).unwrap();
        assert_eq!(reparsed["composition_plan"]["sections"][1]["section_name"], json!("Section 2"));
        assert_eq!(reparsed["composition_plan"]["positive_global_styles"], json!(["warm"]));
        assert_eq!(&reparsed, &editor.document().unwrap().to_value().unwrap());
    }

    #[test]
    fn apply_clears_a_pending_text_error() {
        let mut editor = PlanEditor::new();
        editor.parse(VALID).unwrap();
        let _ = editor.parse("{");
        editor.apply(CompositionPlanDocument::with_section_added).unwrap();
        assert!(editor.is_valid());
        assert_eq!(editor.document().unwrap().sections().len(), 2);
    }

    #[test]
    fn rejected_edit_leaves_state_untouched() {
        let mut editor = PlanEditor::new();
        editor.parse(VALID).unwrap();
        let text = editor.text().to_string();
        let revision = editor.revision();
        assert_eq!(
            editor.try_apply(|doc| doc.with_section_removed(3)),
            Err(PlanEditError::SectionOutOfRange { index: 3, len: 1 })
        );
        assert_eq!(editor.text(), text);
        assert_eq!(editor.revision(), revision);
    }

    #[test]
    fn apply_without_document_is_rejected() {
        let mut editor = PlanEditor::new();
        assert_eq!(
            editor.apply(CompositionPlanDocument::with_section_added),
            Err(PlanEditError::NoDocument)
        );
    }

    #[test]
    fn format_pretty_prints_or_reports() {
        let mut editor = PlanEditor::new();
        editor.parse(VALID).unwrap();
        editor.format().unwrap();
        assert!(editor.text().contains("\n  \"composition_plan\""));

        let good = editor.document().cloned();
        let _ = editor.parse("[");
        assert!(editor.format().is_err());
        assert_eq!(editor.document().cloned(), good);
        assert_eq!(editor.text(), "[");
    }

    #[test]
    fn clear_drops_everything() {
        let mut editor = PlanEditor::new();
        editor.parse(VALID).unwrap();
        editor.clear();
        assert!(editor.document().is_none());
        assert!(editor.text().is_empty());
        assert!(!editor.is_valid());
    }
}
