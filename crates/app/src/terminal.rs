use std::sync::Mutex;

use async_trait::async_trait;
use proctor_core::model::{
    AnswerValue, AssessmentDefinition, OptionId, Question, QuestionId, QuestionKind, SessionStatus,
};
use services::{ExitPrompt, SessionCommand, SessionView};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::{mpsc, oneshot, watch};

/// Leave confirmation answered by the next line typed on stdin.
#[derive(Default)]
pub struct TerminalPrompt {
    pending: Mutex<Option<oneshot::Sender<bool>>>,
}

impl TerminalPrompt {
    /// The reply slot of a prompt still waiting for an answer.
    ///
    /// A prompt the session dropped (the deadline passed first) no longer counts.
    fn take_pending(&self) -> Option<oneshot::Sender<bool>> {
        self.pending
            .lock()
            .ok()
            .and_then(|mut slot| slot.take())
            .filter(|reply| !reply.is_closed())
    }
}

#[async_trait]
impl ExitPrompt for TerminalPrompt {
    async fn confirm_exit(&self) -> bool {
        let (reply, answer) = oneshot::channel();
        if let Ok(mut slot) = self.pending.lock() {
            *slot = Some(reply);
        }
        println!("Leaving ends the assessment and submits your answers. Leave? [y/N]");
        answer.await.unwrap_or(false)
    }
}

fn is_yes(line: &str) -> bool {
    matches!(line.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}

/// What is currently printed, so ticks don't redraw the question.
#[derive(Debug, Default, PartialEq, Eq)]
struct Screen {
    position: Option<usize>,
    status: Option<SessionStatus>,
    error: Option<String>,
}

/// Read learner input into session commands and print view changes.
///
/// Returns on stdin EOF or once the session stops listening.
pub async fn drive(
    definition: &AssessmentDefinition,
    commands: mpsc::Sender<SessionCommand>,
    mut views: watch::Receiver<SessionView>,
    prompt: &TerminalPrompt,
) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut screen = Screen::default();

    loop {
        tokio::select! {
            changed = views.changed() => {
                if changed.is_err() {
                    return;
                }
                let view = views.borrow_and_update().clone();
                render(definition, &view, &mut screen);
            }
            line = lines.next_line() => {
                let Ok(Some(line)) = line else {
                    return;
                };
                if let Some(reply) = prompt.take_pending() {
                    let _ = reply.send(is_yes(&line));
                    continue;
                }
                let view = views.borrow().clone();
                match parse_command(definition, &view, &line) {
                    Ok(command) => {
                        if commands.send(command).await.is_err() {
                            return;
                        }
                    }
                    Err(message) => eprintln!("{message}"),
                }
            }
        }
    }
}

fn render(definition: &AssessmentDefinition, view: &SessionView, screen: &mut Screen) {
    let next = Screen {
        position: view.position,
        status: Some(view.status),
        error: view.last_error.clone(),
    };
    if next == *screen {
        return;
    }

    if next.error != screen.error
        && let Some(error) = &next.error
    {
        eprintln!("! {error}");
    }
    if next.position != screen.position || next.status != screen.status {
        match view.status {
            SessionStatus::Active => print_question(definition, view),
            SessionStatus::Submitting => println!("Submitting..."),
            SessionStatus::SubmitFailed => {
                println!("Submission failed. Type `retry` to send your answers again.");
            }
            SessionStatus::Finished => println!("Submitted."),
            SessionStatus::Waiting => {}
        }
    }
    *screen = next;
}

fn find_question(definition: &AssessmentDefinition, id: QuestionId) -> Option<&Question> {
    definition.questions().iter().find(|question| question.id() == id)
}

fn print_question(definition: &AssessmentDefinition, view: &SessionView) {
    let Some(question) = view.question_id.and_then(|id| find_question(definition, id)) else {
        return;
    };

    let mut header = view.position_label().unwrap_or_default();
    if view.show_progress {
        header.push_str(&format!("  ({} answered)", view.progress.answered));
    }
    if let Some(left) = view.global_remaining_label() {
        header.push_str(&format!("  [{left} left]"));
    }
    if let Some(limit) = question.time_limit() {
        header.push_str(&format!("  [{}s for this question]", limit.as_secs()));
    }

    println!();
    println!("{header}");
    println!("{}", question.prompt());
    for (number, id) in view.options.iter().enumerate() {
        if let Some(option) = question.options().iter().find(|option| option.id == *id) {
            println!("  {}. {}", number + 1, option.label);
        }
    }
    match question.kind() {
        QuestionKind::MultiChoice => println!("(option numbers, separated by commas)"),
        QuestionKind::ShortText | QuestionKind::LongText => println!("(type your answer)"),
        QuestionKind::SingleChoice => {}
    }
}

/// Map one line of input onto a command for the question on screen.
fn parse_command(
    definition: &AssessmentDefinition,
    view: &SessionView,
    line: &str,
) -> Result<SessionCommand, String> {
    let input = line.trim();
    match input {
        "n" | "next" => return Ok(SessionCommand::Next),
        "p" | "prev" => return Ok(SessionCommand::Previous),
        "b" | "back" => return Ok(SessionCommand::Back),
        "s" | "submit" => return Ok(SessionCommand::ExitAndSubmit),
        "r" | "retry" => return Ok(SessionCommand::RetrySubmit),
        "" => return Err("type an answer, or next / prev / back / submit".to_string()),
        _ => {}
    }

    let question = view
        .question_id
        .and_then(|id| find_question(definition, id))
        .ok_or_else(|| "no question is on screen".to_string())?;
    let answer = match question.kind() {
        QuestionKind::SingleChoice => AnswerValue::Choice(pick(view, input)?),
        QuestionKind::MultiChoice => AnswerValue::Choices(
            input
                .split(',')
                .map(|part| pick(view, part))
                .collect::<Result<_, _>>()?,
        ),
        QuestionKind::ShortText | QuestionKind::LongText => AnswerValue::Text(input.to_string()),
    };
    Ok(SessionCommand::Commit(answer))
}

fn pick(view: &SessionView, raw: &str) -> Result<OptionId, String> {
    let number: usize = raw
        .trim()
        .parse()
        .map_err(|_| format!("not an option number: {}", raw.trim()))?;
    number
        .checked_sub(1)
        .and_then(|index| view.options.get(index))
        .copied()
        .ok_or_else(|| format!("there is no option {number}"))
}

#[cfg(test)]
mod tests {
    use proctor_core::model::{
        AnswerOption, AssessmentDraft, AssessmentId, AssessmentSettings, QuestionDraft,
    };
    use services::lockdown::GuardState;
    use services::session::SessionProgress;

    use super::*;

    fn definition() -> AssessmentDefinition {
        AssessmentDraft::new(AssessmentId::new(1), "Terminal")
            .with_settings(AssessmentSettings::practice())
            .with_question(
                QuestionDraft::new(QuestionId::new(1), QuestionKind::SingleChoice, "Pick")
                    .with_options(vec![
                        AnswerOption::new(OptionId::new(10), "a"),
                        AnswerOption::new(OptionId::new(11), "b"),
                    ]),
            )
            .with_question(
                QuestionDraft::new(QuestionId::new(2), QuestionKind::MultiChoice, "Pick some")
                    .with_options(vec![
                        AnswerOption::new(OptionId::new(20), "a"),
                        AnswerOption::new(OptionId::new(21), "b"),
                        AnswerOption::new(OptionId::new(22), "c"),
                    ]),
            )
            .with_question(QuestionDraft::new(
                QuestionId::new(3),
                QuestionKind::ShortText,
                "Why",
            ))
            .validate()
            .expect("valid definition")
    }

    fn view_of(question: u64, options: &[u64]) -> SessionView {
        SessionView {
            status: SessionStatus::Active,
            position: Some(0),
            current_index: 0,
            question_id: Some(QuestionId::new(question)),
            options: options.iter().copied().map(OptionId::new).collect(),
            progress: SessionProgress {
                total: 3,
                answered: 0,
                remaining: 3,
                is_complete: false,
            },
            show_progress: true,
            global_remaining_secs: None,
            question_remaining_secs: None,
            focus_loss_count: 0,
            is_away: false,
            lockdown: GuardState::Disarmed,
            last_error: None,
            submission_id: None,
        }
    }

    #[test]
    fn numbers_follow_display_order() {
        let definition = definition();
        let view = view_of(1, &[11, 10]);

        let command = parse_command(&definition, &view, "1").expect("command");
        assert_eq!(
            command,
            SessionCommand::Commit(AnswerValue::Choice(OptionId::new(11)))
        );
        assert!(parse_command(&definition, &view, "3").is_err());
        assert!(parse_command(&definition, &view, "zero").is_err());
    }

    #[test]
    fn multi_choice_and_text_answers() {
        let definition = definition();

        let command =
            parse_command(&definition, &view_of(2, &[20, 21, 22]), "3, 1").expect("command");
        assert_eq!(
            command,
            SessionCommand::Commit(AnswerValue::Choices(vec![
                OptionId::new(22),
                OptionId::new(20)
            ]))
        );

        let command = parse_command(&definition, &view_of(3, &[]), "  because  ").expect("command");
        assert_eq!(
            command,
            SessionCommand::Commit(AnswerValue::Text("because".into()))
        );
    }

    #[test]
    fn keywords_win_over_answers() {
        let definition = definition();
        let view = view_of(3, &[]);

        assert_eq!(parse_command(&definition, &view, "next"), Ok(SessionCommand::Next));
        assert_eq!(parse_command(&definition, &view, "b"), Ok(SessionCommand::Back));
        assert_eq!(
            parse_command(&definition, &view, "submit"),
            Ok(SessionCommand::ExitAndSubmit)
        );
        assert!(parse_command(&definition, &view, "   ").is_err());
    }

    #[tokio::test]
    async fn pending_prompt_takes_the_next_line() {
        let prompt = std::sync::Arc::new(TerminalPrompt::default());
        let waiting = {
            let prompt = std::sync::Arc::clone(&prompt);
            tokio::spawn(async move { prompt.confirm_exit().await })
        };

        let reply = loop {
            if let Some(reply) = prompt.take_pending() {
                break reply;
            }
            tokio::task::yield_now().await;
        };
        reply.send(is_yes(" Y ")).expect("prompt is waiting");
        assert!(waiting.await.expect("prompt task"));
        assert!(prompt.take_pending().is_none());
    }

    #[tokio::test]
    async fn dropped_prompt_releases_the_next_line() {
        let prompt = std::sync::Arc::new(TerminalPrompt::default());
        let waiting = {
            let prompt = std::sync::Arc::clone(&prompt);
            tokio::spawn(async move { prompt.confirm_exit().await })
        };
        while prompt.pending.lock().expect("slot").is_none() {
            tokio::task::yield_now().await;
        }

        waiting.abort();
        let _ = waiting.await;
        assert!(prompt.take_pending().is_none());
    }
}
