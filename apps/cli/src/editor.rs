//! Line-based question editor shown after generation.
//!
//! Numbers typed by the user are 1-based; everything below the parser is
//! 0-based.

use std::io::Write;

use adapt_core::{AttemptOutcome, CoursePipeline, QuestionEditor};
use adapt_shared::{
    AdaptError, CorrectIndex, QUIZ_OPTION_COUNT, Question, QuestionKind, QuestionType, Result,
};
use color_eyre::eyre;
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};

use crate::interrupt::Interrupt;
use crate::progress::CliProgress;

const HELP: &str = "\
Commands (N = question number, K = option 1-4):
  list                  show all questions
  show N                show one question in full
  prompt N <text>       replace the question text
  option N K <text>     replace a quiz option
  correct N K           mark the correct quiz option
  answer N <text>       replace the expected answer of an open question
  add quiz|open         append a blank question
  rm N                  delete a question
  up N / down N         move a question
  regen                 generate a new set (discards edits)
  save                  create the course
  quit                  leave without saving";

/// A change to the question list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Edit {
    Prompt { index: usize, text: String },
    Option { index: usize, option: usize, text: String },
    Correct { index: usize, option: usize },
    Answer { index: usize, text: String },
    Add(QuestionType),
    Remove(usize),
    Up(usize),
    Down(usize),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum EditorCommand {
    Help,
    List,
    Show(usize),
    Edit(Edit),
    Regenerate,
    Save,
    Quit,
}

/// How the editor session ended.
pub(crate) enum EditorExit {
    /// The course was saved; see [`CoursePipeline::finalized`].
    Saved,
    Quit,
    Cancelled,
}

// ---------------------------------------------------------------------------
// Parsing
// ---------------------------------------------------------------------------

/// Split off the first whitespace-delimited word.
fn next_word(input: &str) -> (&str, &str) {
    let input = input.trim_start();
    match input.split_once(char::is_whitespace) {
        Some((word, rest)) => (word, rest.trim_start()),
        None => (input, ""),
    }
}

/// A 1-based number from the user, returned 0-based.
fn number(word: &str, what: &str) -> std::result::Result<usize, String> {
    match word.parse::<usize>() {
        Ok(0) => Err(format!("{what} numbers start at 1")),
        Ok(n) => Ok(n - 1),
        Err(_) if word.is_empty() => Err(format!("missing {what} number")),
        Err(_) => Err(format!("\"{word}\" is not a {what} number")),
    }
}

fn text(rest: &str) -> std::result::Result<String, String> {
    let rest = rest.trim();
    if rest.is_empty() {
        Err("missing text".into())
    } else {
        Ok(rest.to_string())
    }
}

/// Parse one input line. Blank lines yield `None`.
pub(crate) fn parse_command(line: &str) -> std::result::Result<Option<EditorCommand>, String> {
    let (word, rest) = next_word(line);
    let command = match word.to_ascii_lowercase().as_str() {
        "" => return Ok(None),
        "help" | "?" => EditorCommand::Help,
        "list" | "ls" => EditorCommand::List,
        "show" => EditorCommand::Show(number(next_word(rest).0, "question")?),
        "prompt" => {
            let (n, rest) = next_word(rest);
            EditorCommand::Edit(Edit::Prompt {
                index: number(n, "question")?,
                text: text(rest)?,
            })
        }
        "option" => {
            let (n, rest) = next_word(rest);
            let (k, rest) = next_word(rest);
            EditorCommand::Edit(Edit::Option {
                index: number(n, "question")?,
                option: number(k, "option")?,
                text: text(rest)?,
            })
        }
        "correct" => {
            let (n, rest) = next_word(rest);
            EditorCommand::Edit(Edit::Correct {
                index: number(n, "question")?,
                option: number(next_word(rest).0, "option")?,
            })
        }
        "answer" => {
            let (n, rest) = next_word(rest);
            EditorCommand::Edit(Edit::Answer {
                index: number(n, "question")?,
                text: text(rest)?,
            })
        }
        "add" => {
            let kind = next_word(rest).0;
            let question_type = kind
                .parse::<QuestionType>()
                .map_err(|_| format!("add what? expected quiz or open, got \"{kind}\""))?;
            EditorCommand::Edit(Edit::Add(question_type))
        }
        "rm" | "remove" => EditorCommand::Edit(Edit::Remove(number(next_word(rest).0, "question")?)),
        "up" => EditorCommand::Edit(Edit::Up(number(next_word(rest).0, "question")?)),
        "down" => EditorCommand::Edit(Edit::Down(number(next_word(rest).0, "question")?)),
        "regen" | "regenerate" => EditorCommand::Regenerate,
        "save" => EditorCommand::Save,
        "quit" | "exit" | "q" => EditorCommand::Quit,
        other => return Err(format!("unknown command \"{other}\", type `help`")),
    };
    Ok(Some(command))
}

// ---------------------------------------------------------------------------
// Applying edits
// ---------------------------------------------------------------------------

/// Clone the question at `index`, change it, and write it back.
fn modify(
    editor: &mut QuestionEditor,
    index: usize,
    change: impl FnOnce(&mut Question) -> Result<()>,
) -> Result<()> {
    let mut question = editor
        .get(index)
        .cloned()
        .ok_or(AdaptError::IndexOutOfRange {
            index,
            len: editor.len(),
        })?;
    change(&mut question)?;
    editor.update(index, question)
}

fn not_a(expected: QuestionType, index: usize) -> AdaptError {
    AdaptError::validation(format!("question {} is not of type {expected}", index + 1))
}

pub(crate) fn apply_edit(editor: &mut QuestionEditor, edit: Edit) -> Result<()> {
    match edit {
        Edit::Prompt { index, text } => modify(editor, index, |q| {
            q.prompt = text;
            Ok(())
        }),
        Edit::Option {
            index,
            option,
            text,
        } => modify(editor, index, |q| match &mut q.kind {
            QuestionKind::Quiz { quiz_options, .. } => {
                let slot = quiz_options.get_mut(option).ok_or_else(|| {
                    AdaptError::validation(format!("options are numbered 1-{QUIZ_OPTION_COUNT}"))
                })?;
                *slot = text;
                Ok(())
            }
            QuestionKind::Open { .. } => Err(not_a(QuestionType::Quiz, index)),
        }),
        Edit::Correct { index, option } => modify(editor, index, |q| match &mut q.kind {
            QuestionKind::Quiz { correct_index, .. } => {
                *correct_index = CorrectIndex::try_from(option).map_err(|_| {
                    AdaptError::validation(format!("options are numbered 1-{QUIZ_OPTION_COUNT}"))
                })?;
                Ok(())
            }
            QuestionKind::Open { .. } => Err(not_a(QuestionType::Quiz, index)),
        }),
        Edit::Answer { index, text } => modify(editor, index, |q| match &mut q.kind {
            QuestionKind::Open { expected_answer } => {
                *expected_answer = text;
                Ok(())
            }
            QuestionKind::Quiz { .. } => Err(not_a(QuestionType::Open, index)),
        }),
        Edit::Add(question_type) => {
            editor.add(question_type);
            Ok(())
        }
        Edit::Remove(index) => editor.remove(index).map(|_| ()),
        Edit::Up(index) => {
            editor.move_up(index);
            Ok(())
        }
        Edit::Down(index) => {
            editor.move_down(index);
            Ok(())
        }
    }
}

// ---------------------------------------------------------------------------
// Rendering
// ---------------------------------------------------------------------------

fn shorten(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let mut short: String = text.chars().take(max.saturating_sub(1)).collect();
    short.push('…');
    short
}

pub(crate) fn render_list(editor: &QuestionEditor) -> String {
    if editor.is_empty() {
        return "  (no questions, use `add quiz` or `add open`)".into();
    }
    let mut out = format!(
        "  {} questions: {} quiz, {} open\n",
        editor.len(),
        editor.quiz_count(),
        editor.open_count()
    );
    for (i, q) in editor.iter().enumerate() {
        let cursor = if editor.selected() == Some(i) { '>' } else { ' ' };
        let prompt = if q.prompt.is_empty() {
            "(empty)".to_string()
        } else {
            shorten(&q.prompt, 70)
        };
        out.push_str(&format!(
            "{cursor} {:>3}. [{}] {prompt}\n",
            i + 1,
            q.question_type()
        ));
    }
    out.trim_end().to_string()
}

pub(crate) fn render_question(index: usize, question: &Question) -> String {
    let mut out = format!(
        "  {}. [{}] {}\n",
        index + 1,
        question.question_type(),
        question.prompt
    );
    match &question.kind {
        QuestionKind::Quiz {
            quiz_options,
            correct_index,
        } => {
            for (k, option) in quiz_options.iter().enumerate() {
                let mark = if k == correct_index.get() { '*' } else { ' ' };
                out.push_str(&format!("     {mark} {}) {option}\n", k + 1));
            }
        }
        QuestionKind::Open { expected_answer } => {
            out.push_str(&format!("     expected: {expected_answer}\n"));
        }
    }
    out.trim_end().to_string()
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

type Input = Lines<BufReader<Stdin>>;

async fn read_line(input: &mut Input) -> eyre::Result<Option<String>> {
    print!("adapt> ");
    std::io::stdout().flush()?;
    Ok(input.next_line().await?)
}

/// Run the editor until the course is saved or the user leaves.
pub(crate) async fn run(wizard: &mut CoursePipeline, interrupt: &Interrupt) -> eyre::Result<EditorExit> {
    if let Some(editor) = wizard.editor() {
        println!("{}", render_list(editor));
    }
    println!("  Type `help` for commands.");

    let mut input = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = read_line(&mut input).await? {
        let command = match parse_command(&line) {
            Ok(Some(command)) => command,
            Ok(None) => continue,
            Err(message) => {
                eprintln!("  {message}");
                continue;
            }
        };

        match command {
            EditorCommand::Help => println!("{HELP}"),
            EditorCommand::List => {
                if let Some(editor) = wizard.editor() {
                    println!("{}", render_list(editor));
                }
            }
            EditorCommand::Show(index) => match wizard.editor().and_then(|e| e.get(index)) {
                Some(question) => println!("{}", render_question(index, question)),
                None => eprintln!("  no question {}", index + 1),
            },
            EditorCommand::Edit(edit) => {
                let added = matches!(edit, Edit::Add(_));
                let editor = wizard.editor_mut()?;
                match apply_edit(editor, edit) {
                    Ok(()) if added => {
                        let n = editor.len();
                        println!("  Added question {n}. Fill it in with `prompt {n} <text>`.");
                    }
                    Ok(()) => println!("{}", render_list(editor)),
                    Err(e) => eprintln!("  {e}"),
                }
            }
            EditorCommand::Regenerate => {
                let progress = CliProgress::new();
                let outcome = {
                    let _armed = interrupt.arm(wizard.cancel_token());
                    wizard.regenerate(&progress).await
                };
                progress.finish();
                match outcome {
                    Ok(AttemptOutcome::Ready) => {
                        if let Some(editor) = wizard.editor() {
                            println!("{}", render_list(editor));
                        }
                    }
                    Ok(AttemptOutcome::Cancelled) => return Ok(EditorExit::Cancelled),
                    Err(e) => eprintln!("  {e} (previous questions kept)"),
                }
            }
            EditorCommand::Save => {
                let progress = CliProgress::new();
                let saved = wizard.save(&progress).await;
                progress.finish();
                match saved {
                    Ok(_) => return Ok(EditorExit::Saved),
                    Err(e) => eprintln!("  {e}"),
                }
            }
            EditorCommand::Quit => return Ok(EditorExit::Quit),
        }
    }

    Ok(EditorExit::Quit)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn editor() -> QuestionEditor {
        QuestionEditor::new(vec![
            Question {
                id: "q1".into(),
                prompt: "Who approves leave?".into(),
                kind: QuestionKind::Quiz {
                    quiz_options: ["HR".into(), "Manager".into(), "CEO".into(), "Nobody".into()],
                    correct_index: CorrectIndex::try_from(1u8).unwrap(),
                },
            },
            Question {
                id: "q2".into(),
                prompt: "Describe the escalation path".into(),
                kind: QuestionKind::Open {
                    expected_answer: "Lead, then manager".into(),
                },
            },
        ])
    }

    #[test]
    fn parses_one_based_numbers() {
        assert_eq!(
            parse_command("option 2 4 Ask the duty manager").unwrap(),
            Some(EditorCommand::Edit(Edit::Option {
                index: 1,
                option: 3,
                text: "Ask the duty manager".into()
            }))
        );
        assert_eq!(
            parse_command("  rm 1 ").unwrap(),
            Some(EditorCommand::Edit(Edit::Remove(0)))
        );
        assert_eq!(parse_command("").unwrap(), None);
        assert_eq!(parse_command("SAVE").unwrap(), Some(EditorCommand::Save));
    }

    #[test]
    fn rejects_bad_input() {
        assert!(parse_command("show 0").unwrap_err().contains("start at 1"));
        assert!(parse_command("show").unwrap_err().contains("missing"));
        assert!(parse_command("prompt 1").unwrap_err().contains("missing text"));
        assert!(parse_command("add essay").is_err());
        assert!(parse_command("frobnicate").unwrap_err().contains("unknown command"));
    }

    #[test]
    fn edits_respect_question_type() {
        let mut editor = editor();
        apply_edit(
            &mut editor,
            Edit::Correct {
                index: 0,
                option: 3,
            },
        )
        .unwrap();
        match &editor.get(0).unwrap().kind {
            QuestionKind::Quiz { correct_index, .. } => assert_eq!(correct_index.get(), 3),
            QuestionKind::Open { .. } => panic!("expected quiz"),
        }

        let err = apply_edit(
            &mut editor,
            Edit::Answer {
                index: 0,
                text: "x".into(),
            },
        )
        .unwrap_err();
        assert!(err.to_string().contains("not of type open"));

        assert!(
            apply_edit(
                &mut editor,
                Edit::Option {
                    index: 1,
                    option: 0,
                    text: "x".into()
                }
            )
            .is_err()
        );
        assert!(apply_edit(&mut editor, Edit::Correct { index: 0, option: 4 }).is_err());
    }

    #[test]
    fn prompt_edit_keeps_id_and_order() {
        let mut editor = editor();
        apply_edit(
            &mut editor,
            Edit::Prompt {
                index: 1,
                text: "New prompt".into(),
            },
        )
        .unwrap();
        assert_eq!(editor.get(1).unwrap().id, "q2");
        assert_eq!(editor.get(1).unwrap().prompt, "New prompt");
        assert!(apply_edit(&mut editor, Edit::Remove(5)).is_err());
    }

    #[test]
    fn renders_list_and_question() {
        let editor = editor();
        let list = render_list(&editor);
        assert!(list.contains("2 questions: 1 quiz, 1 open"));
        assert!(list.contains(">   1. [quiz] Who approves leave?"));

        let shown = render_question(0, editor.get(0).unwrap());
        assert!(shown.contains("* 2) Manager"));
        assert!(render_list(&QuestionEditor::default()).contains("no questions"));
    }

    #[test]
    fn shorten_adds_ellipsis() {
        assert_eq!(shorten("short", 10), "short");
        assert_eq!(shorten("abcdefghij", 5), "abcd…");
    }
}
