//! Pure document transformations used by the visual editor.
//!
//! Each operation consumes a document and returns the edited one, so the
//! editor can run it against a clone and keep the original on rejection.

use super::{CompositionPlanDocument, Section, DEFAULT_SECTION_DURATION_MS};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlanEditError {
    #[error("no composition plan loaded")]
    NoDocument,
    #[error("section {index} out of range ({len} sections)")]
    SectionOutOfRange { index: usize, len: usize },
    #[error("line {index} out of range ({len} lines)")]
    LineOutOfRange { index: usize, len: usize },
    #[error("section name cannot be empty")]
    EmptyName,
    #[error("value cannot be empty")]
    EmptyValue,
    #[error("duration must be a positive number of milliseconds")]
    InvalidDuration,
    #[error("failed to serialize composition plan: {0}")]
    Serialize(String),
}

/// Every tag list the editor can address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagList {
    PositiveGlobal,
    NegativeGlobal,
    PositiveLocal(usize),
    NegativeLocal(usize),
    Genres,
    Moods,
    Tags,
}

impl TagList {
    pub fn label(&self) -> &'static str {
        match self {
            Self::PositiveGlobal => "Positive global styles",
            Self::NegativeGlobal => "Negative global styles",
            Self::PositiveLocal(_) => "Positive local styles",
            Self::NegativeLocal(_) => "Negative local styles",
            Self::Genres => "Genres",
            Self::Moods => "Moods",
            Self::Tags => "Tags",
        }
    }
}

type EditResult = Result<CompositionPlanDocument, PlanEditError>;

impl CompositionPlanDocument {
    pub fn tags(&self, list: TagList) -> &[String] {
        let core = &self.composition_plan;
        match list {
            TagList::PositiveGlobal => &core.positive_global_styles,
            TagList::NegativeGlobal => &core.negative_global_styles,
            TagList::PositiveLocal(index) => core
                .sections
                .get(index)
                .map(|section| section.positive_local_styles.as_slice())
                .unwrap_or(&[]),
            TagList::NegativeLocal(index) => core
                .sections
                .get(index)
                .map(|section| section.negative_local_styles.as_slice())
                .unwrap_or(&[]),
            TagList::Genres => {
                self.song_metadata.as_ref().map(|m| m.genres.as_slice()).unwrap_or(&[])
            }
            TagList::Moods => self.song_metadata.as_ref().map(|m| m.moods.as_slice()).unwrap_or(&[]),
            TagList::Tags => self.song_metadata.as_ref().map(|m| m.tags.as_slice()).unwrap_or(&[]),
        }
    }

    fn tags_mut(&mut self, list: TagList) -> Result<&mut Vec<String>, PlanEditError> {
        match list {
            TagList::PositiveGlobal => Ok(&mut self.composition_plan.positive_global_styles),
            TagList::NegativeGlobal => Ok(&mut self.composition_plan.negative_global_styles),
            TagList::PositiveLocal(index) => {
                Ok(&mut self.section_mut(index)?.positive_local_styles)
            }
            TagList::NegativeLocal(index) => {
                Ok(&mut self.section_mut(index)?.negative_local_styles)
            }
            TagList::Genres => Ok(&mut self.metadata_mut().genres),
            TagList::Moods => Ok(&mut self.metadata_mut().moods),
            TagList::Tags => Ok(&mut self.metadata_mut().tags),
        }
    }

    fn section_mut(&mut self, index: usize) -> Result<&mut Section, PlanEditError> {
        let len = self.composition_plan.sections.len();
        self.composition_plan
            .sections
            .get_mut(index)
            .ok_or(PlanEditError::SectionOutOfRange { index, len })
    }

    /// Appends `Section N` with the default duration and empty lists.
    pub fn with_section_added(mut self) -> Self {
        let name = format!("Section {}", self.composition_plan.sections.len() + 1);
        self.composition_plan.sections.push(Section::new(name, DEFAULT_SECTION_DURATION_MS));
        self
    }

    pub fn with_section_removed(mut self, index: usize) -> EditResult {
        let len = self.composition_plan.sections.len();
        if index >= len {
            return Err(PlanEditError::SectionOutOfRange { index, len });
        }
        self.composition_plan.sections.remove(index);
        Ok(self)
    }

    pub fn with_section_moved(mut self, from: usize, to: usize) -> EditResult {
        let len = self.composition_plan.sections.len();
        for index in [from, to] {
            if index >= len {
                return Err(PlanEditError::SectionOutOfRange { index, len });
            }
        }
        let section = self.composition_plan.sections.remove(from);
        self.composition_plan.sections.insert(to, section);
        Ok(self)
    }

    pub fn with_section_renamed(mut self, index: usize, name: &str) -> EditResult {
        let name = name.trim();
        if name.is_empty() {
            return Err(PlanEditError::EmptyName);
        }
        self.section_mut(index)?.section_name = name.to_string();
        Ok(self)
    }

    pub fn with_section_duration(mut self, index: usize, duration_ms: u64) -> EditResult {
        if duration_ms == 0 {
            return Err(PlanEditError::InvalidDuration);
        }
        self.section_mut(index)?.duration_ms = duration_ms;
        Ok(self)
    }

    /// Inserts a trimmed tag; an existing tag is left alone.
    pub fn with_tag_added(mut self, list: TagList, tag: &str) -> EditResult {
        let tag = tag.trim();
        if tag.is_empty() {
            return Err(PlanEditError::EmptyValue);
        }
        let tags = self.tags_mut(list)?;
        if !tags.iter().any(|existing| existing == tag) {
            tags.push(tag.to_string());
        }
        Ok(self)
    }

    pub fn with_tag_removed(mut self, list: TagList, tag: &str) -> EditResult {
        self.tags_mut(list)?.retain(|existing| existing != tag);
        Ok(self)
    }

    pub fn with_last_tag_popped(mut self, list: TagList) -> EditResult {
        self.tags_mut(list)?.pop();
        Ok(self)
    }

    pub fn with_line_added(mut self, section: usize, line: &str) -> EditResult {
        let line = line.trim();
        if line.is_empty() {
            return Err(PlanEditError::EmptyValue);
        }
        self.section_mut(section)?.lines.push(line.to_string());
        Ok(self)
    }

    pub fn with_line_edited(mut self, section: usize, index: usize, line: &str) -> EditResult {
        let line = line.trim();
        if line.is_empty() {
            return Err(PlanEditError::EmptyValue);
        }
        let lines = &mut self.section_mut(section)?.lines;
        let len = lines.len();
        let slot = lines.get_mut(index).ok_or(PlanEditError::LineOutOfRange { index, len })?;
        *slot = line.to_string();
        Ok(self)
    }

    pub fn with_line_removed(mut self, section: usize, index: usize) -> EditResult {
        let lines = &mut self.section_mut(section)?.lines;
        if index >= lines.len() {
            return Err(PlanEditError::LineOutOfRange { index, len: lines.len() });
        }
        lines.remove(index);
        Ok(self)
    }

    pub fn with_line_moved(mut self, section: usize, from: usize, to: usize) -> EditResult {
        let lines = &mut self.section_mut(section)?.lines;
        let len = lines.len();
        for index in [from, to] {
            if index >= len {
                return Err(PlanEditError::LineOutOfRange { index, len });
            }
        }
        let line = lines.remove(from);
        lines.insert(to, line);
        Ok(self)
    }

    /// Blank titles clear the field.
    pub fn with_title(mut self, title: &str) -> Self {
        let title = title.trim();
        self.metadata_mut().title = (!title.is_empty()).then(|| title.to_string());
        self
    }

    pub fn with_description(mut self, description: &str) -> Self {
        let description = description.trim();
        self.metadata_mut().description =
            (!description.is_empty()).then(|| description.to_string());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::normalize;
    use serde_json::json;

    fn document(count: usize) -> CompositionPlanDocument {
        let sections = (0..count)
            .map(|index| {
                json!({
                    "section_name": format!("S{index}"),
                    "duration_ms": 1000 * (index as u64 + 1),
                    "positive_local_styles": [format!("style-{index}")],
                    "lines": [format!("line {index}")]
                })
            })
            .collect::<Vec<_>>();
        normalize(json!({ "sections": sections })).unwrap()
    }

    fn names(document: &CompositionPlanDocument) -> Vec<String> {
        document.sections().iter().map(|section| section.section_name.clone()).collect()
    }

    #[test]
    fn removing_a_section_keeps_the_rest_in_order() {
        let original = document(4);
        for index in 0..4 {
            let edited = original.clone().with_section_removed(index).unwrap();
            let mut expected = original.sections().to_vec();
            expected.remove(index);
            assert_eq!(edited.sections(), expected.as_slice());
        }
        assert_eq!(
            original.with_section_removed(9).unwrap_err(),
            PlanEditError::SectionOutOfRange { index: 9, len: 4 }
        );
    }

    #[test]
    fn removing_the_last_section_leaves_an_empty_list() {
        let edited = document(1).with_section_removed(0).unwrap();
        assert!(edited.sections().is_empty());
        assert_eq!(edited.to_value().unwrap()["composition_plan"]["sections"], json!([]));
    }

    #[test]
    fn moving_sections_is_a_permutation() {
        let original = document(5);
        let moved = original.clone().with_section_moved(0, 3).unwrap();
        assert_eq!(names(&moved), ["S1", "S2", "S3", "S0", "S4"]);

        let mut before = original.sections().to_vec();
        let mut after = moved.sections().to_vec();
        before.sort_by(|a, b| a.section_name.cmp(&b.section_name));
        after.sort_by(|a, b| a.section_name.cmp(&b.section_name));
        assert_eq!(before, after);

        let back = moved.with_section_moved(3, 0).unwrap();
        assert_eq!(back, original);
    }

    #[test]
    fn added_sections_get_defaults() {
        let edited = document(2).with_section_added();
        let added = edited.sections().last().unwrap();
        assert_eq!(added.section_name, "Section 3");
        assert_eq!(added.duration_ms, DEFAULT_SECTION_DURATION_MS);
        assert!(added.positive_local_styles.is_empty());
        assert!(added.negative_local_styles.is_empty());
        assert!(added.lines.is_empty());
    }

    #[test]
    fn tag_inserts_are_trimmed_and_deduplicated() {
        let edited = document(1)
            .with_tag_added(TagList::PositiveGlobal, " warm ")
            .and_then(|doc| doc.with_tag_added(TagList::PositiveGlobal, "warm"))
            .and_then(|doc| doc.with_tag_added(TagList::NegativeLocal(0), "vocals"))
            .and_then(|doc| doc.with_tag_added(TagList::Genres, "pop"))
            .unwrap();
        assert_eq!(edited.tags(TagList::PositiveGlobal), ["warm"]);
        assert_eq!(edited.tags(TagList::NegativeLocal(0)), ["vocals"]);
        assert_eq!(edited.tags(TagList::Genres), ["pop"]);
        assert_eq!(
            edited.clone().with_tag_added(TagList::Moods, "  "),
            Err(PlanEditError::EmptyValue)
        );

        let popped = edited.with_last_tag_popped(TagList::PositiveLocal(0)).unwrap();
        assert!(popped.tags(TagList::PositiveLocal(0)).is_empty());
        let removed = popped.with_tag_removed(TagList::PositiveGlobal, "warm").unwrap();
        assert!(removed.tags(TagList::PositiveGlobal).is_empty());
    }

    #[test]
    fn rename_and_duration_validate_input() {
        let original = document(2);
        assert_eq!(original.clone().with_section_renamed(0, "  "), Err(PlanEditError::EmptyName));
        assert_eq!(
            original.clone().with_section_duration(1, 0),
            Err(PlanEditError::InvalidDuration)
        );
        let edited = original
            .with_section_renamed(1, " Chorus ")
            .and_then(|doc| doc.with_section_duration(1, 2500))
            .unwrap();
        assert_eq!(edited.sections()[1].section_name, "Chorus");
        assert_eq!(edited.sections()[1].duration_ms, 2500);
    }

    #[test]
    fn lyric_lines_can_be_added_edited_moved_and_removed() {
        let edited = document(1)
            .with_line_added(0, "second")
            .and_then(|doc| doc.with_line_edited(0, 0, "first"))
            .and_then(|doc| doc.with_line_added(0, "third"))
            .and_then(|doc| doc.with_line_moved(0, 2, 1))
            .unwrap();
        assert_eq!(edited.sections()[0].lines, ["first", "third", "second"]);

        let trimmed = edited.with_line_removed(0, 1).unwrap();
        assert_eq!(trimmed.sections()[0].lines, ["first", "second"]);
        assert_eq!(
            trimmed.with_line_removed(0, 5),
            Err(PlanEditError::LineOutOfRange { index: 5, len: 2 })
        );
    }

    #[test]
    fn metadata_edits_create_the_block_on_demand() {
        let edited = document(1).with_title(" Sam's Day ").with_description("party");
        assert_eq!(edited.title(), Some("Sam's Day"));
        assert_eq!(edited.description(), Some("party"));
        let cleared = edited.with_title("");
        assert_eq!(cleared.title(), None);
    }
}
