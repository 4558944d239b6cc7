use std::fmt;

use exam_core::model::{AnswerPatch, QuestionIndex};
use services::SessionCommand;

#[derive(Debug, PartialEq, Eq)]
pub enum InputError {
    UnknownCommand(String),
    MissingArgument { command: &'static str, what: &'static str },
    InvalidNumber { raw: String },
}

impl fmt::Display for InputError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InputError::UnknownCommand(cmd) => write!(f, "unknown command: {cmd} (try `help`)"),
            InputError::MissingArgument { command, what } => {
                write!(f, "{command} needs {what}")
            }
            InputError::InvalidNumber { raw } => write!(f, "not a number: {raw}"),
        }
    }
}

impl std::error::Error for InputError {}

pub const HELP: &str = "\
commands:
  answer <q> <text>        set a single answer or essay
  blank <q> <pos> <text>   fill blank <pos> (from 0)
  pick <q> <key> <text>    set a keyed sub-answer (matching, table cell, map label)
  select <q> <value>       add a choice
  unselect <q> <value>     remove a choice
  goto <q> | next | prev   move between questions
  mark [q]                 toggle review mark (current question by default)
  status                   show progress and time left
  submit                   ask to submit
  submit!                  submit without asking";

/// One parsed line: a session command, a help request, or nothing.
#[derive(Debug, PartialEq, Eq)]
pub enum Line {
    Command(SessionCommand),
    Help,
    Blank,
}

fn number<T: std::str::FromStr>(
    raw: Option<&str>,
    command: &'static str,
    what: &'static str,
) -> Result<T, InputError> {
    let raw = raw.ok_or(InputError::MissingArgument { command, what })?;
    raw.parse().map_err(|_| InputError::InvalidNumber {
        raw: raw.to_string(),
    })
}

fn question(raw: Option<&str>, command: &'static str) -> Result<QuestionIndex, InputError> {
    number::<u32>(raw, command, "a question number").map(QuestionIndex::new)
}

fn word<'a>(
    raw: Option<&'a str>,
    command: &'static str,
    what: &'static str,
) -> Result<&'a str, InputError> {
    raw.filter(|w| !w.is_empty())
        .ok_or(InputError::MissingArgument { command, what })
}

/// Split off the first whitespace-delimited word, returning the trimmed rest.
fn split_word(text: &str) -> (Option<&str>, &str) {
    let text = text.trim_start();
    if text.is_empty() {
        return (None, "");
    }
    match text.split_once(char::is_whitespace) {
        Some((head, rest)) => (Some(head), rest.trim_start()),
        None => (Some(text), ""),
    }
}

pub fn parse_line(line: &str) -> Result<Line, InputError> {
    let (command, rest) = split_word(line.trim());
    let Some(command) = command else {
        return Ok(Line::Blank);
    };

    let parsed = match command {
        "help" | "?" => return Ok(Line::Help),
        "answer" => {
            let (q, text) = split_word(rest);
            SessionCommand::Answer {
                index: question(q, "answer")?,
                patch: AnswerPatch::Replace(text.to_string()),
            }
        }
        "blank" => {
            let (q, rest) = split_word(rest);
            let (pos, text) = split_word(rest);
            SessionCommand::Answer {
                index: question(q, "blank")?,
                patch: AnswerPatch::Blank {
                    position: number(pos, "blank", "a blank position")?,
                    value: text.to_string(),
                },
            }
        }
        "pick" => {
            let (q, rest) = split_word(rest);
            let (key, text) = split_word(rest);
            SessionCommand::Answer {
                index: question(q, "pick")?,
                patch: AnswerPatch::Entry {
                    key: word(key, "pick", "a key")?.to_string(),
                    value: text.to_string(),
                },
            }
        }
        "select" | "unselect" => {
            let (q, value) = split_word(rest);
            let name = if command == "select" { "select" } else { "unselect" };
            SessionCommand::Answer {
                index: question(q, name)?,
                patch: AnswerPatch::Select {
                    value: word(Some(value), name, "a value")?.to_string(),
                    included: command == "select",
                },
            }
        }
        "goto" => SessionCommand::GoTo(question(split_word(rest).0, "goto")?),
        "next" => SessionCommand::Next,
        "prev" => SessionCommand::Previous,
        "mark" => match split_word(rest).0 {
            Some(raw) => SessionCommand::ToggleReview(Some(question(Some(raw), "mark")?)),
            None => SessionCommand::ToggleReview(None),
        },
        "status" => SessionCommand::Status,
        "submit" => SessionCommand::Submit { confirmed: false },
        "submit!" => SessionCommand::Submit { confirmed: true },
        other => return Err(InputError::UnknownCommand(other.to_string())),
    };
    Ok(Line::Command(parsed))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn q(n: u32) -> QuestionIndex {
        QuestionIndex::new(n)
    }

    #[test]
    fn answer_keeps_the_full_text() {
        assert_eq!(
            parse_line("answer 4   the quick  fox").unwrap(),
            Line::Command(SessionCommand::Answer {
                index: q(4),
                patch: AnswerPatch::Replace("the quick  fox".into()),
            })
        );
    }

    #[test]
    fn blank_and_pick_take_a_slot() {
        assert_eq!(
            parse_line("blank 2 1 blue").unwrap(),
            Line::Command(SessionCommand::Answer {
                index: q(2),
                patch: AnswerPatch::Blank {
                    position: 1,
                    value: "blue".into(),
                },
            })
        );
        assert_eq!(
            parse_line("pick 3 0-1 iv").unwrap(),
            Line::Command(SessionCommand::Answer {
                index: q(3),
                patch: AnswerPatch::Entry {
                    key: "0-1".into(),
                    value: "iv".into(),
                },
            })
        );
    }

    #[test]
    fn selection_and_navigation() {
        assert_eq!(
            parse_line("unselect 5 C").unwrap(),
            Line::Command(SessionCommand::Answer {
                index: q(5),
                patch: AnswerPatch::Select {
                    value: "C".into(),
                    included: false,
                },
            })
        );
        assert_eq!(
            parse_line("goto 7").unwrap(),
            Line::Command(SessionCommand::GoTo(q(7)))
        );
        assert_eq!(
            parse_line("mark").unwrap(),
            Line::Command(SessionCommand::ToggleReview(None))
        );
        assert_eq!(
            parse_line("submit!").unwrap(),
            Line::Command(SessionCommand::Submit { confirmed: true })
        );
        assert_eq!(parse_line("   ").unwrap(), Line::Blank);
    }

    #[test]
    fn bad_input_is_reported() {
        assert_eq!(
            parse_line("goto x"),
            Err(InputError::InvalidNumber { raw: "x".into() })
        );
        assert_eq!(
            parse_line("select 2"),
            Err(InputError::MissingArgument {
                command: "select",
                what: "a value",
            })
        );
        assert!(matches!(
            parse_line("jump 3"),
            Err(InputError::UnknownCommand(_))
        ));
    }
}
