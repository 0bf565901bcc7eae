//! Composition plan document model.
//!
//! The backend speaks two shapes for the same plan. The wrapped shape nests
//! the musical content under `composition_plan` next to `song_metadata`; the
//! direct shape puts `sections` and the global styles at the top level.
//! [`normalize`] folds either into [`CompositionPlanDocument`], which always
//! serializes as the wrapped shape. Fields this crate does not model are kept
//! in `extra` maps so that a load/edit/save cycle never drops data.

mod edit;
mod editor;

pub use edit::{PlanEditError, TagList};
pub use editor::PlanEditor;

use crate::types::RenderPlanPayload;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

pub const DEFAULT_SECTION_DURATION_MS: u64 = 4000;

const WRAPPED_KEY: &str = "composition_plan";
const METADATA_KEY: &str = "song_metadata";
const SECTIONS_KEY: &str = "sections";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlanParseError {
    #[error("invalid JSON: {0}")]
    Syntax(String),
    #[error("composition plan must be a JSON object")]
    NotAnObject,
    #[error("composition plan is missing a `sections` list")]
    MissingSections,
    #[error("invalid composition plan: {0}")]
    Structure(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Section {
    #[serde(default, alias = "name")]
    pub section_name: String,
    #[serde(default = "default_duration_ms")]
    pub duration_ms: u64,
    #[serde(default, alias = "positive_style")]
    pub positive_local_styles: Vec<String>,
    #[serde(default, alias = "negative_style")]
    pub negative_local_styles: Vec<String>,
    #[serde(default)]
    pub lines: Vec<String>,
    #[serde(flatten)]
    pub extra: IndexMap<String, Value>,
}

fn default_duration_ms() -> u64 {
    DEFAULT_SECTION_DURATION_MS
}

impl Section {
    pub fn new(name: impl Into<String>, duration_ms: u64) -> Self {
        Self {
            section_name: name.into(),
            duration_ms,
            positive_local_styles: Vec::new(),
            negative_local_styles: Vec::new(),
            lines: Vec::new(),
            extra: IndexMap::new(),
        }
    }

    pub fn is_instrumental(&self) -> bool {
        self.lines.iter().all(|line| line.trim().is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompositionPlanCore {
    #[serde(default)]
    pub positive_global_styles: Vec<String>,
    #[serde(default)]
    pub negative_global_styles: Vec<String>,
    pub sections: Vec<Section>,
    #[serde(flatten)]
    pub extra: IndexMap<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SongMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub genres: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub moods: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(flatten)]
    pub extra: IndexMap<String, Value>,
}

/// Canonical (wrapped) composition plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompositionPlanDocument {
    pub composition_plan: CompositionPlanCore,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub song_metadata: Option<SongMetadata>,
    #[serde(flatten)]
    pub extra: IndexMap<String, Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlanShape {
    /// `{ composition_plan: { sections, .. }, song_metadata }`
    Wrapped,
    /// `{ sections, .. }`
    Direct,
}

impl PlanShape {
    pub fn detect(raw: &Value) -> Result<Self, PlanParseError> {
        let object = raw.as_object().ok_or(PlanParseError::NotAnObject)?;
        if object.get(WRAPPED_KEY).map(Value::is_object).unwrap_or(false) {
            return Ok(Self::Wrapped);
        }
        if object.contains_key(SECTIONS_KEY) {
            return Ok(Self::Direct);
        }
        Err(PlanParseError::MissingSections)
    }
}

/// Folds either wire shape into the canonical document.
pub fn normalize(raw: Value) -> Result<CompositionPlanDocument, PlanParseError> {
    match PlanShape::detect(&raw)? {
        PlanShape::Wrapped => {
            let wrapped_has_sections = raw
                .get(WRAPPED_KEY)
                .and_then(Value::as_object)
                .map(|core| core.contains_key(SECTIONS_KEY))
                .unwrap_or(false);
            if !wrapped_has_sections {
                return Err(PlanParseError::MissingSections);
            }
            serde_json::from_value(raw).map_err(structure_error)
        }
        PlanShape::Direct => {
            let Value::Object(mut object) = raw else {
                return Err(PlanParseError::NotAnObject);
            };
            let song_metadata = match object.remove(METADATA_KEY) {
                None | Some(Value::Null) => None,
                Some(value) => Some(serde_json::from_value(value).map_err(structure_error)?),
            };
            let composition_plan =
                serde_json::from_value(Value::Object(object)).map_err(structure_error)?;
            Ok(CompositionPlanDocument { composition_plan, song_metadata, extra: IndexMap::new() })
        }
    }
}

/// Strict JSON parse followed by [`normalize`].
pub fn parse_text(text: &str) -> Result<CompositionPlanDocument, PlanParseError> {
    let raw: Value =
        serde_json::from_str(text).map_err(|err| PlanParseError::Syntax(err.to_string()))?;
    normalize(raw)
}

fn structure_error(err: serde_json::Error) -> PlanParseError {
    PlanParseError::Structure(err.to_string())
}

impl CompositionPlanDocument {
    pub fn from_sections(sections: Vec<Section>) -> Self {
        Self {
            composition_plan: CompositionPlanCore {
                positive_global_styles: Vec::new(),
                negative_global_styles: Vec::new(),
                sections,
                extra: IndexMap::new(),
            },
            song_metadata: None,
            extra: IndexMap::new(),
        }
    }

    pub fn sections(&self) -> &[Section] {
        &self.composition_plan.sections
    }

    pub fn title(&self) -> Option<&str> {
        self.song_metadata
            .as_ref()
            .and_then(|metadata| metadata.title.as_deref())
            .filter(|title| !title.trim().is_empty())
    }

    pub fn description(&self) -> Option<&str> {
        self.song_metadata
            .as_ref()
            .and_then(|metadata| metadata.description.as_deref())
            .filter(|description| !description.trim().is_empty())
    }

    pub fn metadata_mut(&mut self) -> &mut SongMetadata {
        self.song_metadata.get_or_insert_with(SongMetadata::default)
    }

    pub fn total_duration_ms(&self) -> u64 {
        self.sections().iter().map(|section| section.duration_ms).sum()
    }

    /// Body for `POST /render`: the core without the wrapper.
    pub fn render_core(&self) -> &CompositionPlanCore {
        &self.composition_plan
    }

    /// Projection sent on the render socket once the server is ready.
    pub fn render_payload(&self, title: Option<String>) -> RenderPlanPayload {
        let core = &self.composition_plan;
        RenderPlanPayload {
            title: title.filter(|title| !title.trim().is_empty()),
            positive_global_styles: core.positive_global_styles.clone(),
            negative_global_styles: core.negative_global_styles.clone(),
            sections: core.sections.clone(),
        }
    }

    pub fn to_pretty_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn to_value(&self) -> Result<Value, serde_json::Error> {
        serde_json::to_value(self)
    }
}

/// Builds a direct-shape plan value; used by fixtures and the offline planner.
pub fn direct_plan_value(
    positive: &[&str],
    negative: &[&str],
    sections: Vec<Value>,
    metadata: Option<Value>,
) -> Value {
    let mut object = Map::new();
    object.insert("positive_global_styles".into(), strings(positive));
    object.insert("negative_global_styles".into(), strings(negative));
    object.insert(SECTIONS_KEY.into(), Value::Array(sections));
    if let Some(metadata) = metadata {
        object.insert(METADATA_KEY.into(), metadata);
    }
    Value::Object(object)
}

fn strings(items: &[&str]) -> Value {
    Value::Array(items.iter().map(|item| Value::String((*item).to_string())).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn wrapped_fixture() -> Value {
        json!({
            "composition_plan": {
                "positive_global_styles": ["electronic", "140 bpm"],
                "negative_global_styles": ["acoustic"],
                "sections": [
                    {
                        "section_name": "Intro",
                        "positive_local_styles": ["glitch effects"],
                        "negative_local_styles": ["vocals"],
                        "duration_ms": 3000,
                        "lines": []
                    },
                    {
                        "section_name": "Main Section",
                        "positive_local_styles": ["full energy"],
                        "negative_local_styles": [],
                        "duration_ms": 4000,
                        "lines": ["Go!", "Faster!"],
                        "energy": "high"
                    }
                ]
            },
            "song_metadata": {
                "title": "Adrenaline Spike",
                "genres": ["electronic"],
                "languages": ["English"],
                "is_explicit": false
            },
            "words_timestamps": null
        })
    }

    fn direct_fixture() -> Value {
        json!({
            "positive_global_styles": ["lo-fi"],
            "negative_global_styles": [],
            "sections": [
                {"section_name": "A", "duration_ms": 5000, "lines": ["one"]},
                {"section_name": "B", "duration_ms": 6000},
                {"section_name": "C", "duration_ms": 7000, "positive_local_styles": ["fade"]}
            ]
        })
    }

    #[test]
    fn detects_both_shapes_explicitly() {
        assert_eq!(PlanShape::detect(&wrapped_fixture()), Ok(PlanShape::Wrapped));
        assert_eq!(PlanShape::detect(&direct_fixture()), Ok(PlanShape::Direct));
        assert_eq!(PlanShape::detect(&json!({"title": "x"})), Err(PlanParseError::MissingSections));
        assert_eq!(PlanShape::detect(&json!([1, 2])), Err(PlanParseError::NotAnObject));
    }

    #[test]
    fn normalizes_direct_shape_into_wrapped() {
        let document = normalize(direct_fixture()).unwrap();
        let names: Vec<_> =
            document.sections().iter().map(|section| section.section_name.as_str()).collect();
        assert_eq!(names, ["A", "B", "C"]);
        assert_eq!(document.sections()[1].positive_local_styles, Vec::<String>::new());
        assert_eq!(document.composition_plan.positive_global_styles, vec!["lo-fi".to_string()]);
        assert!(document.song_metadata.is_none());

        let encoded = document.to_value().unwrap();
        assert!(encoded.get("composition_plan").is_some());
        assert!(encoded.get("sections").is_none());
    }

    #[test]
    fn normalize_is_idempotent_for_both_shapes() {
        for fixture in [wrapped_fixture(), direct_fixture()] {
            let once = normalize(fixture).unwrap();
            let twice = normalize(once.to_value().unwrap()).unwrap();
            assert_eq!(once, twice);
        }
    }

    #[test]
    fn keeps_unmodelled_fields_through_round_trip() {
        let document = normalize(wrapped_fixture()).unwrap();
        assert_eq!(document.sections()[1].extra.get("energy"), Some(&json!("high")));
        let metadata = document.song_metadata.as_ref().unwrap();
        assert_eq!(metadata.extra.get("is_explicit"), Some(&json!(false)));
        assert_eq!(document.extra.get("words_timestamps"), Some(&Value::Null));

        let encoded = document.to_value().unwrap();
        assert_eq!(encoded["composition_plan"]["sections"][1]["energy"], json!("high"));
        assert_eq!(encoded["song_metadata"]["languages"], json!(["English"]));
    }

    #[test]
    fn direct_shape_may_carry_metadata() {
        let mut raw = direct_fixture();
        raw["song_metadata"] = json!({"title": "Sam's Day", "moods": ["happy"]});
        let document = normalize(raw).unwrap();
        assert_eq!(document.title(), Some("Sam's Day"));
        assert!(document.composition_plan.extra.get("song_metadata").is_none());
    }

    #[test]
    fn accepts_legacy_section_field_names() {
        let raw = json!({
            "sections": [{"name": "Verse", "duration_ms": 8000, "positive_style": ["warm"]}]
        });
        let document = normalize(raw).unwrap();
        let section = &document.sections()[0];
        assert_eq!(section.section_name, "Verse");
        assert_eq!(section.positive_local_styles, vec!["warm".to_string()]);
        let encoded = serde_json::to_value(section).unwrap();
        assert!(encoded.get("name").is_none());
        assert_eq!(encoded["section_name"], json!("Verse"));
    }

    #[test]
    fn rejects_malformed_plans() {
        assert!(matches!(parse_text("{ not json"), Err(PlanParseError::Syntax(_))));
        assert!(matches!(
            parse_text(r#"{"sections": "nope"}"#),
            Err(PlanParseError::Structure(_))
        ));
        assert_eq!(
            parse_text(r#"{"composition_plan": {"positive_global_styles": []}}"#),
            Err(PlanParseError::MissingSections)
        );
    }

    #[test]
    fn empty_sections_list_is_valid() {
        let document = parse_text(r#"{"sections": []}"#).unwrap();
        assert!(document.sections().is_empty());
        assert_eq!(document.total_duration_ms(), 0);
    }

    #[test]
    fn render_payload_projects_styles_sections_and_title() {
        let document = normalize(wrapped_fixture()).unwrap();
        let payload = document.render_payload(Some("Spike".into()));
        assert_eq!(payload.title.as_deref(), Some("Spike"));
        assert_eq!(payload.positive_global_styles.len(), 2);
        assert_eq!(payload.sections, document.sections());
        assert!(document.render_payload(Some("   ".into())).title.is_none());
    }
}
