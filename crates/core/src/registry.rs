//! Question type registry.
//!
//! Exam content is authored outside the system, so the same presentational
//! type shows up under several spellings (`fill-in-gaps`, `Fill_In_Gaps`,
//! `multiple_choice_multiple_listening`, ...). Everything funnels through
//! [`normalize_tag`] and lands on one [`QuestionKind`], which fixes the
//! answer shape the store will enforce for that question.

use std::fmt;

use crate::model::{AnswerShape, ExamCategory, Question};

/// Section qualifiers that some authored tags carry as a suffix.
const SECTION_SUFFIXES: [&str; 2] = ["_listening", "_reading"];

/// Lower-case, map `-` and whitespace to `_`, drop a trailing section qualifier.
#[must_use]
pub fn normalize_tag(tag: &str) -> String {
    let mut normalized: String = tag
        .trim()
        .chars()
        .map(|c| {
            if c == '-' || c.is_whitespace() {
                '_'
            } else {
                c.to_ascii_lowercase()
            }
        })
        .collect();

    for suffix in SECTION_SUFFIXES {
        if normalized.len() > suffix.len() && normalized.ends_with(suffix) {
            normalized.truncate(normalized.len() - suffix.len());
            break;
        }
    }
    normalized
}

/// Every presentational question family the engine knows about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QuestionKind {
    MultipleChoiceSingle,
    MultipleChoiceMultiple,
    TrueFalseNotGiven,
    YesNoNotGiven,
    WritingTask,
    WritingTask1,
    WritingTask2,
    FillInGaps,
    FillInGapsShortAnswers,
    FormCompletion,
    SentenceCompletion,
    FlowchartCompletion,
    NoteCompletion,
    SummaryCompletionText,
    SummaryCompletionList,
    TableCompletion,
    Matching,
    MatchingHeadings,
    MatchingFeatures,
    MatchingSentenceEndings,
    MapLabeling,
}

impl QuestionKind {
    /// Resolve an authored tag, or `None` if the type is not supported.
    #[must_use]
    pub fn from_tag(tag: &str) -> Option<Self> {
        let kind = match normalize_tag(tag).as_str() {
            "multiple_choice_single" | "mcq_single" => Self::MultipleChoiceSingle,
            "multiple_choice_multiple" | "mcq_multiple" => Self::MultipleChoiceMultiple,
            "true_false_not_given" | "identifying_information" => Self::TrueFalseNotGiven,
            "yes_no_not_given" => Self::YesNoNotGiven,
            "writing_task" => Self::WritingTask,
            "writing_task_1" | "writing_task1" => Self::WritingTask1,
            "writing_task_2" | "writing_task2" => Self::WritingTask2,
            "fill_in_gaps" | "fill_in_the_gaps" => Self::FillInGaps,
            "fill_in_gaps_short_answers" => Self::FillInGapsShortAnswers,
            "form_completion" => Self::FormCompletion,
            "sentence_completion" => Self::SentenceCompletion,
            "flowchart_completion" | "flow_chart_completion" => Self::FlowchartCompletion,
            "note_completion" => Self::NoteCompletion,
            "summary_completion" | "summary_completion_text" => Self::SummaryCompletionText,
            "summary_completion_list" => Self::SummaryCompletionList,
            "table_completion" => Self::TableCompletion,
            "matching" => Self::Matching,
            "matching_headings" => Self::MatchingHeadings,
            "matching_features" => Self::MatchingFeatures,
            "matching_sentence_endings" => Self::MatchingSentenceEndings,
            "map_labeling" | "map_labelling" | "labelling_on_a_map" => Self::MapLabeling,
            _ => return None,
        };
        Some(kind)
    }

    /// The answer variant every question of this kind uses.
    #[must_use]
    pub fn shape(self) -> AnswerShape {
        match self {
            Self::MultipleChoiceSingle
            | Self::TrueFalseNotGiven
            | Self::YesNoNotGiven
            | Self::WritingTask
            | Self::WritingTask1
            | Self::WritingTask2 => AnswerShape::Scalar,
            Self::FillInGaps
            | Self::FillInGapsShortAnswers
            | Self::FormCompletion
            | Self::SentenceCompletion
            | Self::FlowchartCompletion
            | Self::NoteCompletion
            | Self::SummaryCompletionText => AnswerShape::OrderedList,
            Self::SummaryCompletionList
            | Self::TableCompletion
            | Self::Matching
            | Self::MatchingHeadings
            | Self::MatchingFeatures
            | Self::MatchingSentenceEndings
            | Self::MapLabeling => AnswerShape::KeyedMap,
            Self::MultipleChoiceMultiple => AnswerShape::SelectionSet,
        }
    }

    /// The paper this kind is usually authored for. Some kinds appear in both
    /// listening and reading papers; those report listening.
    #[must_use]
    pub fn category(self) -> ExamCategory {
        match self {
            Self::WritingTask | Self::WritingTask1 | Self::WritingTask2 => ExamCategory::Writing,
            Self::TrueFalseNotGiven
            | Self::YesNoNotGiven
            | Self::NoteCompletion
            | Self::SummaryCompletionText
            | Self::SummaryCompletionList
            | Self::MatchingHeadings
            | Self::MatchingFeatures
            | Self::MatchingSentenceEndings => ExamCategory::Reading,
            _ => ExamCategory::Listening,
        }
    }

    /// Default minimum essay length when the payload does not declare one.
    #[must_use]
    pub fn default_min_words(self) -> Option<usize> {
        match self {
            Self::WritingTask | Self::WritingTask1 => Some(150),
            Self::WritingTask2 => Some(250),
            _ => None,
        }
    }

    /// Canonical tag for this kind.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::MultipleChoiceSingle => "multiple_choice_single",
            Self::MultipleChoiceMultiple => "multiple_choice_multiple",
            Self::TrueFalseNotGiven => "true_false_not_given",
            Self::YesNoNotGiven => "yes_no_not_given",
            Self::WritingTask => "writing_task",
            Self::WritingTask1 => "writing_task_1",
            Self::WritingTask2 => "writing_task_2",
            Self::FillInGaps => "fill_in_gaps",
            Self::FillInGapsShortAnswers => "fill_in_gaps_short_answers",
            Self::FormCompletion => "form_completion",
            Self::SentenceCompletion => "sentence_completion",
            Self::FlowchartCompletion => "flowchart_completion",
            Self::NoteCompletion => "note_completion",
            Self::SummaryCompletionText => "summary_completion_text",
            Self::SummaryCompletionList => "summary_completion_list",
            Self::TableCompletion => "table_completion",
            Self::Matching => "matching",
            Self::MatchingHeadings => "matching_headings",
            Self::MatchingFeatures => "matching_features",
            Self::MatchingSentenceEndings => "matching_sentence_endings",
            Self::MapLabeling => "map_labeling",
        }
    }
}

impl fmt::Display for QuestionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Answer shape for a tag, `None` for unsupported types.
#[must_use]
pub fn classify(tag: &str) -> Option<AnswerShape> {
    QuestionKind::from_tag(tag).map(QuestionKind::shape)
}

/// Placeholder content for a question whose type is not supported.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub message: String,
    pub detected_tag: String,
    /// Pretty-printed JSON of the whole question.
    pub dump: String,
}

/// What a renderer should show for a question.
#[derive(Debug, Clone, PartialEq)]
pub enum QuestionView<'a> {
    Supported {
        question: &'a Question,
        kind: QuestionKind,
    },
    Fallback(Diagnostic),
}

/// Route a question to its presentational family, degrading to a raw dump
/// instead of failing when the type is unknown.
#[must_use]
pub fn dispatch(question: &Question) -> QuestionView<'_> {
    if let Some(kind) = QuestionKind::from_tag(question.type_tag()) {
        return QuestionView::Supported { question, kind };
    }

    let detected_tag = normalize_tag(question.type_tag());
    let dump = serde_json::to_string_pretty(question)
        .unwrap_or_else(|_| question.payload().to_string());
    QuestionView::Fallback(Diagnostic {
        message: format!(
            "Question type \"{}\" is not yet implemented.",
            question.type_tag()
        ),
        detected_tag,
        dump,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::QuestionIndex;
    use serde_json::json;

    #[test]
    fn separators_and_case_normalize_to_one_tag() {
        for tag in ["fill-in-gaps", "FILL_IN_GAPS", " Fill-In_Gaps ", "fill in gaps"] {
            assert_eq!(normalize_tag(tag), "fill_in_gaps", "{tag}");
            assert_eq!(QuestionKind::from_tag(tag), Some(QuestionKind::FillInGaps));
        }
    }

    #[test]
    fn section_suffix_is_dropped() {
        assert_eq!(
            QuestionKind::from_tag("multiple_choice_multiple_listening"),
            Some(QuestionKind::MultipleChoiceMultiple)
        );
        assert_eq!(
            QuestionKind::from_tag("sentence-completion-reading"),
            Some(QuestionKind::SentenceCompletion)
        );
        // a bare suffix is not stripped down to nothing
        assert_eq!(normalize_tag("_listening"), "_listening");
    }

    #[test]
    fn every_family_maps_to_its_shape() {
        assert_eq!(classify("mcq_single"), Some(AnswerShape::Scalar));
        assert_eq!(classify("yes-no-not-given"), Some(AnswerShape::Scalar));
        assert_eq!(classify("writing_task2"), Some(AnswerShape::Scalar));
        assert_eq!(classify("note_completion"), Some(AnswerShape::OrderedList));
        assert_eq!(classify("flow-chart-completion"), Some(AnswerShape::OrderedList));
        assert_eq!(classify("summary_completion"), Some(AnswerShape::OrderedList));
        assert_eq!(classify("summary_completion_list"), Some(AnswerShape::KeyedMap));
        assert_eq!(classify("labelling_on_a_map"), Some(AnswerShape::KeyedMap));
        assert_eq!(classify("table_completion"), Some(AnswerShape::KeyedMap));
        assert_eq!(classify("mcq-multiple"), Some(AnswerShape::SelectionSet));
        assert_eq!(classify("drag_and_drop"), None);
    }

    #[test]
    fn writing_kinds_carry_minimums() {
        assert_eq!(QuestionKind::WritingTask1.default_min_words(), Some(150));
        assert_eq!(QuestionKind::WritingTask2.default_min_words(), Some(250));
        assert_eq!(QuestionKind::Matching.default_min_words(), None);
        assert_eq!(QuestionKind::WritingTask2.category(), ExamCategory::Writing);
    }

    #[test]
    fn unknown_type_degrades_to_diagnostic() {
        let question = Question::new(
            QuestionIndex::new(7),
            "Drag-And-Drop",
            None,
            json!({"items": ["a", "b"]}),
        );

        let QuestionView::Fallback(diag) = dispatch(&question) else {
            panic!("expected fallback");
        };
        assert_eq!(diag.detected_tag, "drag_and_drop");
        assert!(diag.message.contains("Drag-And-Drop"));
        assert!(diag.dump.contains("\"items\""));
        assert!(diag.dump.contains("\"index\": 7"));
    }

    #[test]
    fn known_type_dispatches_to_kind() {
        let question = Question::new(QuestionIndex::new(1), "Map-Labelling", None, json!({}));
        assert!(matches!(
            dispatch(&question),
            QuestionView::Supported {
                kind: QuestionKind::MapLabeling,
                ..
            }
        ));
    }
}
