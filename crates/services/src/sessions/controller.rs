use std::sync::Arc;
use std::time::Duration;

use gateway::{Backend, LibraryApi, LiveSessionApi, SubmissionApi};
use proctor_core::Clock;
use proctor_core::model::{
    AnswerOption, AnswerValue, AssessmentDefinition, Cursor, ParticipantId, Question, QuestionId,
    SessionState, SessionStateError, SessionStatus, SubmissionReceipt, SubmitTrigger,
};
use tokio::sync::{broadcast, mpsc, watch};
use tracing::{debug, info, warn};

use super::events::{SessionCommand, SessionEvent, Transition};
use super::progress::SessionProgress;
use super::view::SessionView;
use crate::error::SessionError;
use crate::finalizer::{FinalizeRequest, LibraryUpdate, SubmissionFinalizer};
use crate::lockdown::{BackIntercept, ExitPrompt, GuardState, LockdownGuard, StaticPrompt, UnloadDecision};
use crate::proctoring::{FocusSource, FocusState, ProctoringMonitor};
use crate::progress::ProgressReporter;
use crate::sequencer::{QuestionSequencer, Sequence};
use crate::time::SessionClock;
use crate::timers::{TimerEvent, TimerSubsystem};

/// Backend contracts a session talks to.
#[derive(Clone)]
pub struct SessionDeps {
    pub live: Arc<dyn LiveSessionApi>,
    pub submissions: Arc<dyn SubmissionApi>,
    pub library: Arc<dyn LibraryApi>,
    pub participant: ParticipantId,
}

impl SessionDeps {
    #[must_use]
    pub fn from_backend(backend: &Backend, participant: ParticipantId) -> Self {
        Self {
            live: Arc::clone(&backend.live),
            submissions: Arc::clone(&backend.submissions),
            library: Arc::clone(&backend.library),
            participant,
        }
    }
}

/// Configures a `SessionController` before the sequence is fixed.
pub struct SessionBuilder {
    definition: AssessmentDefinition,
    deps: SessionDeps,
    clock: Clock,
    seed: Option<u64>,
    focus: Option<Arc<dyn FocusSource>>,
    prompt: Arc<dyn ExitPrompt>,
}

impl SessionBuilder {
    #[must_use]
    pub fn new(definition: AssessmentDefinition, deps: SessionDeps) -> Self {
        Self {
            definition,
            deps,
            clock: Clock::default_clock(),
            seed: None,
            focus: None,
            prompt: Arc::new(StaticPrompt(false)),
        }
    }

    #[must_use]
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    #[must_use]
    pub fn with_shuffle_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    #[must_use]
    pub fn with_focus_source(mut self, source: Arc<dyn FocusSource>) -> Self {
        self.focus = Some(source);
        self
    }

    /// Dialog used to confirm leaving a locked-down session. Defaults to always staying.
    #[must_use]
    pub fn with_exit_prompt(mut self, prompt: Arc<dyn ExitPrompt>) -> Self {
        self.prompt = prompt;
        self
    }

    /// Fix the question order and build a waiting session.
    ///
    /// # Errors
    ///
    /// Returns `SessionError` if the definition has no questions.
    pub fn build(self) -> Result<SessionController, SessionError> {
        let sequencer = match self.seed {
            Some(seed) => QuestionSequencer::with_seed(seed),
            None => QuestionSequencer::new(),
        };
        sequencer.sequence(&self.definition)?;
        let settings = *self.definition.settings();
        let state = SessionState::new(self.definition.question_count(), settings.allow_backtrack)?;

        let (timers, timer_events) = TimerSubsystem::new();
        let (focus_tx, focus_events) = mpsc::unbounded_channel();
        let reporter = ProgressReporter::new(
            self.deps.live,
            self.definition.live_session(),
            self.deps.participant,
        );
        let finalizer = SubmissionFinalizer::new(self.deps.submissions, self.deps.library);
        let progress = SessionProgress::from_state(&state);
        let (view, _) = watch::channel(SessionView {
            status: state.status(),
            position: None,
            current_index: state.cursor().wire_index(state.total()),
            question_id: None,
            options: Vec::new(),
            progress,
            show_progress: settings.show_progress,
            global_remaining_secs: None,
            question_remaining_secs: None,
            focus_loss_count: 0,
            is_away: false,
            lockdown: GuardState::Disarmed,
            last_error: None,
            submission_id: None,
        });

        Ok(SessionController {
            monitor: ProctoringMonitor::new(reporter.clone()),
            guard: LockdownGuard::new(settings.lockdown),
            clock: SessionClock::new(self.clock),
            definition: self.definition,
            sequencer,
            state,
            timers,
            timer_events,
            focus_source: self.focus,
            focus_tx,
            focus_events,
            prompt: self.prompt,
            reporter,
            finalizer,
            trigger: None,
            receipt: None,
            last_error: None,
            view,
        })
    }
}

/// Drives one learner through one assessment.
///
/// The controller owns the session state; timers and the focus listener run as
/// separate tasks and report back through channels drained by `step` or
/// `run_until_finished`.
pub struct SessionController {
    definition: AssessmentDefinition,
    sequencer: QuestionSequencer,
    state: SessionState,
    clock: SessionClock,
    timers: TimerSubsystem,
    timer_events: mpsc::UnboundedReceiver<TimerEvent>,
    monitor: ProctoringMonitor,
    focus_source: Option<Arc<dyn FocusSource>>,
    focus_tx: mpsc::UnboundedSender<FocusState>,
    focus_events: mpsc::UnboundedReceiver<FocusState>,
    guard: LockdownGuard,
    prompt: Arc<dyn ExitPrompt>,
    reporter: ProgressReporter,
    finalizer: SubmissionFinalizer,
    trigger: Option<SubmitTrigger>,
    receipt: Option<SubmissionReceipt>,
    last_error: Option<String>,
    view: watch::Sender<SessionView>,
}

impl SessionController {
    /// Shorthand for `SessionBuilder::new(definition, deps).build()`.
    ///
    /// # Errors
    ///
    /// Returns `SessionError` if the definition has no questions.
    pub fn new(definition: AssessmentDefinition, deps: SessionDeps) -> Result<Self, SessionError> {
        SessionBuilder::new(definition, deps).build()
    }

    //
    // ─── ACCESSORS ─────────────────────────────────────────────────────────────
    //

    #[must_use]
    pub fn definition(&self) -> &AssessmentDefinition {
        &self.definition
    }

    #[must_use]
    pub fn state(&self) -> &SessionState {
        &self.state
    }

    #[must_use]
    pub fn status(&self) -> SessionStatus {
        self.state.status()
    }

    /// Presentation order, fixed when the session was built.
    #[must_use]
    pub fn sequence(&self) -> Option<&Sequence> {
        self.sequencer.computed()
    }

    #[must_use]
    pub fn current_position(&self) -> Option<usize> {
        self.state.cursor().index()
    }

    fn current_authoring_index(&self) -> Option<usize> {
        self.current_position()
            .and_then(|position| self.sequence()?.question_index(position))
    }

    #[must_use]
    pub fn current_question(&self) -> Option<&Question> {
        self.current_authoring_index()
            .and_then(|index| self.definition.question(index))
    }

    /// Options of the current question in display order.
    #[must_use]
    pub fn current_options(&self) -> Vec<&AnswerOption> {
        match (self.sequence(), self.current_authoring_index(), self.current_question()) {
            (Some(sequence), Some(index), Some(question)) => sequence.options_for(index, question),
            _ => Vec::new(),
        }
    }

    #[must_use]
    pub fn receipt(&self) -> Option<&SubmissionReceipt> {
        self.receipt.as_ref()
    }

    #[must_use]
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    #[must_use]
    pub fn reporter(&self) -> &ProgressReporter {
        &self.reporter
    }

    #[must_use]
    pub fn finalizer(&self) -> &SubmissionFinalizer {
        &self.finalizer
    }

    #[must_use]
    pub fn guard_state(&self) -> GuardState {
        self.guard.state()
    }

    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<SessionView> {
        self.view.subscribe()
    }

    #[must_use]
    pub fn library_updates(&self) -> broadcast::Receiver<LibraryUpdate> {
        self.finalizer.subscribe_library()
    }

    #[must_use]
    pub fn view(&self) -> SessionView {
        let position = self.current_position();
        SessionView {
            status: self.state.status(),
            position,
            current_index: self.state.cursor().wire_index(self.state.total()),
            question_id: self.current_question().map(Question::id),
            options: self.current_options().iter().map(|option| option.id).collect(),
            progress: SessionProgress::from_state(&self.state),
            show_progress: self.definition.settings().show_progress,
            global_remaining_secs: self.timers.global_remaining().map(ceil_secs),
            question_remaining_secs: self.timers.question_remaining().map(ceil_secs),
            focus_loss_count: self.state.focus_loss_count(),
            is_away: self.state.is_away(),
            lockdown: self.guard.state(),
            last_error: self.last_error.clone(),
            submission_id: self.receipt.as_ref().map(|r| r.submission_id.clone()),
        }
    }

    fn publish(&self) {
        self.view.send_replace(self.view());
    }

    //
    // ─── LEARNER ACTIONS ───────────────────────────────────────────────────────
    //

    /// Waiting → Active: stamps the start, arms timers, focus tracking and lockdown.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::State` unless the session is waiting.
    pub fn start(&mut self) -> Result<Transition, SessionError> {
        self.state.start(self.clock.now())?;

        if let Some(limit) = self.definition.time_limit() {
            self.timers.start_global(limit);
        }
        self.arm_question_timer();
        let settings = *self.definition.settings();
        if settings.track_focus_loss
            && let Some(source) = &self.focus_source
        {
            self.monitor.attach(source.as_ref(), self.focus_tx.clone());
        }
        self.guard.arm();
        self.reporter.join();

        info!(
            assessment_id = %self.definition.id(),
            questions = self.state.total(),
            live = self.reporter.is_live(),
            "session started"
        );
        self.publish();
        Ok(Transition::Started)
    }

    /// Record the answer for the current question, then advance.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Answer` when the value does not fit the question, or
    /// `SessionError::State` outside the active phase.
    pub async fn commit_answer(&mut self, answer: AnswerValue) -> Result<Transition, SessionError> {
        let id = self.store_answer(answer.clone())?;
        self.reporter
            .report_answer(id, Some(answer), false, self.clock.now());
        self.next_question().await
    }

    /// Record the answer for the current question without advancing.
    ///
    /// Drafts stay local; the observer only hears about committed answers.
    ///
    /// # Errors
    ///
    /// Same as `commit_answer`.
    pub fn record_answer(&mut self, answer: AnswerValue) -> Result<Transition, SessionError> {
        self.store_answer(answer)?;
        self.publish();
        Ok(Transition::Recorded)
    }

    fn store_answer(&mut self, answer: AnswerValue) -> Result<QuestionId, SessionError> {
        let status = self.state.status();
        if status != SessionStatus::Active {
            return Err(SessionStateError::NotActive(status).into());
        }
        let question = self.current_question().ok_or(SessionError::NoCurrentQuestion)?;
        question.check_answer(&answer)?;
        let id = question.id();

        self.state.record_answer(id, answer)?;
        debug!(question_id = %id, "answer recorded");
        Ok(id)
    }

    /// Move forward one question; past the last one the session submits.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Submission` if the completion submit fails.
    pub async fn next_question(&mut self) -> Result<Transition, SessionError> {
        if self.state.status() != SessionStatus::Active {
            return Ok(Transition::Ignored);
        }
        match self.state.advance()? {
            Cursor::End => self.submit(SubmitTrigger::Completed).await,
            Cursor::At(position) => {
                self.arm_question_timer();
                self.publish();
                Ok(Transition::Moved { position })
            }
            Cursor::Waiting => Ok(Transition::Ignored),
        }
    }

    /// Move back one question.
    ///
    /// # Errors
    ///
    /// Returns `SessionStateError::CannotMoveBack` without backtracking or on the
    /// first question.
    pub fn previous_question(&mut self) -> Result<Transition, SessionError> {
        let cursor = self.state.retreat()?;
        self.arm_question_timer();
        self.publish();
        Ok(match cursor {
            Cursor::At(position) => Transition::Moved { position },
            Cursor::Waiting | Cursor::End => Transition::Ignored,
        })
    }

    /// Submit now with whatever has been answered.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Submission` if the submit fails.
    pub async fn exit_and_submit(&mut self) -> Result<Transition, SessionError> {
        self.submit(SubmitTrigger::ManualExit).await
    }

    /// Back navigation. Under lockdown the learner must confirm, which submits.
    ///
    /// Timers keep running while the confirmation is open. If one of them ends the
    /// session first, the prompt is dropped and that transition is returned.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Submission` if the lockdown exit or a timeout submit fails.
    pub async fn navigate_back(&mut self) -> Result<Transition, SessionError> {
        match self.guard.intercept_back() {
            BackIntercept::PassThrough => Ok(Transition::LeaveAllowed),
            BackIntercept::Pending => Ok(Transition::Ignored),
            BackIntercept::Confirm => {
                self.publish();
                let confirmed = match self.await_exit_prompt().await {
                    PromptOutcome::Answered(confirmed) => confirmed,
                    PromptOutcome::Ended(outcome) => return outcome,
                };
                if self.guard.resolve(confirmed) {
                    info!(assessment_id = %self.definition.id(), "learner left locked-down session");
                    self.submit(SubmitTrigger::LockdownExit).await
                } else {
                    self.publish();
                    Ok(Transition::Stayed)
                }
            }
        }
    }

    /// Wait for the exit prompt while still handling timer events.
    async fn await_exit_prompt(&mut self) -> PromptOutcome {
        let prompt = Arc::clone(&self.prompt);
        let answer = prompt.confirm_exit();
        tokio::pin!(answer);

        loop {
            tokio::select! {
                biased;
                Some(event) = self.timer_events.recv() => {
                    let outcome = self.handle_timer(event).await;
                    if outcome.is_err() || self.state.status() != SessionStatus::Active {
                        debug!(status = ?self.state.status(), "exit prompt dropped");
                        return PromptOutcome::Ended(outcome);
                    }
                }
                confirmed = &mut answer => return PromptOutcome::Answered(confirmed),
            }
        }
    }

    /// Tab close / reload. Never submits.
    #[must_use]
    pub fn before_unload(&self) -> UnloadDecision {
        self.guard.before_unload()
    }

    /// Re-send the cached payload after a failed submit.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Submission` if the retry fails too.
    pub async fn retry_submit(&mut self) -> Result<Transition, SessionError> {
        if self.state.status() != SessionStatus::SubmitFailed {
            return Ok(Transition::Ignored);
        }
        self.state.transition(SessionStatus::Submitting)?;
        let trigger = self.trigger.unwrap_or(SubmitTrigger::ManualExit);
        info!(assessment_id = %self.definition.id(), ?trigger, "retrying submission");
        self.send_submission(trigger).await
    }

    /// Apply a host command.
    ///
    /// # Errors
    ///
    /// Returns whatever the underlying action returns.
    pub async fn apply(&mut self, command: SessionCommand) -> Result<Transition, SessionError> {
        match command {
            SessionCommand::Start => self.start(),
            SessionCommand::Commit(answer) => self.commit_answer(answer).await,
            SessionCommand::Record(answer) => self.record_answer(answer),
            SessionCommand::Next => self.next_question().await,
            SessionCommand::Previous => self.previous_question(),
            SessionCommand::Back => self.navigate_back().await,
            SessionCommand::ExitAndSubmit => self.exit_and_submit().await,
            SessionCommand::RetrySubmit => self.retry_submit().await,
        }
    }

    //
    // ─── INTERNAL EVENTS ───────────────────────────────────────────────────────
    //

    /// Apply one timer or focus event.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Submission` if a timeout submit fails.
    pub async fn handle(&mut self, event: SessionEvent) -> Result<Transition, SessionError> {
        match event {
            SessionEvent::Timer(event) => self.handle_timer(event).await,
            SessionEvent::Focus(focus) => Ok(self.handle_focus(focus)),
        }
    }

    async fn handle_timer(&mut self, event: TimerEvent) -> Result<Transition, SessionError> {
        let Some(event) = self.timers.resolve(event) else {
            return Ok(Transition::Ignored);
        };
        if self.state.status() != SessionStatus::Active {
            return Ok(Transition::Ignored);
        }
        match event {
            TimerEvent::GlobalTick { .. } | TimerEvent::QuestionTick { .. } => {
                self.publish();
                Ok(Transition::Ticked)
            }
            TimerEvent::GlobalExpired => {
                info!(assessment_id = %self.definition.id(), "time limit reached");
                self.submit(SubmitTrigger::GlobalTimeout).await
            }
            TimerEvent::QuestionExpired { .. } => self.expire_question().await,
        }
    }

    async fn expire_question(&mut self) -> Result<Transition, SessionError> {
        if let Some(question) = self.current_question() {
            let id = question.id();
            let answer = self.state.answer_for(id).cloned();
            debug!(question_id = %id, answered = answer.is_some(), "question time limit reached");
            self.reporter.report_answer(id, answer, true, self.clock.now());
        }
        self.next_question().await
    }

    fn handle_focus(&mut self, focus: FocusState) -> Transition {
        if self.state.status() != SessionStatus::Active {
            return Transition::Ignored;
        }
        let now = self.clock.now();
        match self.monitor.apply(&mut self.state, focus, now) {
            Some(change) => {
                debug!(?change, focus_loss_count = self.state.focus_loss_count(), "focus changed");
                self.publish();
                Transition::Focus(change)
            }
            None => Transition::Ignored,
        }
    }

    async fn next_event(&mut self) -> Option<SessionEvent> {
        tokio::select! {
            biased;
            Some(event) = self.timer_events.recv() => Some(SessionEvent::Timer(event)),
            Some(focus) = self.focus_events.recv() => Some(SessionEvent::Focus(focus)),
            else => None,
        }
    }

    /// Wait for the next internal event, then handle it along with every timer event
    /// already queued, expiries first.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Submission` if a timeout submit fails.
    pub async fn step(&mut self) -> Result<Vec<Transition>, SessionError> {
        match self.next_event().await {
            Some(event) => self.dispatch(event).await,
            None => Ok(Vec::new()),
        }
    }

    async fn dispatch(&mut self, first: SessionEvent) -> Result<Vec<Transition>, SessionError> {
        let mut batch = vec![first];
        while let Ok(event) = self.timer_events.try_recv() {
            batch.push(SessionEvent::Timer(event));
        }
        batch.sort_by_key(SessionEvent::priority);

        let mut transitions = Vec::with_capacity(batch.len());
        for event in batch {
            transitions.push(self.handle(event).await?);
        }
        Ok(transitions)
    }

    /// Run the event loop until the session is submitted.
    ///
    /// Failed commands are logged and surfaced through the view; the loop keeps going
    /// so the learner can retry.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Abandoned` if the command channel closes first.
    pub async fn run_until_finished(
        &mut self,
        mut commands: mpsc::Receiver<SessionCommand>,
    ) -> Result<SubmissionReceipt, SessionError> {
        loop {
            if let Some(receipt) = &self.receipt {
                return Ok(receipt.clone());
            }
            tokio::select! {
                biased;
                Some(event) = self.next_event() => {
                    if let Err(err) = self.dispatch(event).await {
                        self.note_error(&err);
                    }
                }
                command = commands.recv() => match command {
                    Some(command) => {
                        if let Err(err) = self.apply(command).await {
                            self.note_error(&err);
                        }
                    }
                    None => {
                        self.abandon();
                        return Err(SessionError::Abandoned);
                    }
                },
            }
        }
    }

    fn note_error(&mut self, err: &SessionError) {
        warn!(assessment_id = %self.definition.id(), error = %err, "session action failed");
        self.last_error = Some(err.to_string());
        self.publish();
    }

    fn abandon(&mut self) {
        if self.state.status() == SessionStatus::Active {
            self.leave_active();
            self.reporter.leave();
        }
        warn!(
            assessment_id = %self.definition.id(),
            status = ?self.state.status(),
            "session abandoned"
        );
        self.publish();
    }

    //
    // ─── SUBMISSION ────────────────────────────────────────────────────────────
    //

    async fn submit(&mut self, trigger: SubmitTrigger) -> Result<Transition, SessionError> {
        if self.state.status() != SessionStatus::Active {
            debug!(?trigger, status = ?self.state.status(), "submit trigger ignored");
            return Ok(Transition::Ignored);
        }
        self.state.transition(SessionStatus::Submitting)?;
        self.trigger = Some(trigger);
        self.leave_active();
        info!(assessment_id = %self.definition.id(), ?trigger, "submitting session");
        self.send_submission(trigger).await
    }

    fn leave_active(&mut self) {
        self.timers.cancel_all();
        let now = self.clock.now();
        self.monitor.detach(&mut self.state, now);
        self.guard.disarm();
    }

    async fn send_submission(&mut self, trigger: SubmitTrigger) -> Result<Transition, SessionError> {
        self.publish();
        let request = FinalizeRequest {
            definition: &self.definition,
            state: &self.state,
            trigger,
            now: self.clock.now(),
        };
        let result = self.finalizer.finalize(request).await;

        match result {
            Ok(receipt) => {
                self.state.transition(SessionStatus::Finished)?;
                self.receipt = Some(receipt.clone());
                self.last_error = None;
                self.reporter.leave();
                self.publish();
                Ok(Transition::Submitted(receipt))
            }
            Err(err) => {
                self.state.transition(SessionStatus::SubmitFailed)?;
                self.last_error = Some(err.to_string());
                self.publish();
                Err(err.into())
            }
        }
    }

    fn arm_question_timer(&mut self) {
        match self.current_question().and_then(Question::time_limit) {
            Some(limit) => {
                self.timers.start_question(limit);
            }
            None => self.timers.cancel_question(),
        }
    }
}

/// How an open exit prompt ended.
enum PromptOutcome {
    Answered(bool),
    /// A timer event ended the active phase first.
    Ended(Result<Transition, SessionError>),
}

fn ceil_secs(duration: Duration) -> u64 {
    duration.as_secs() + u64::from(duration.subsec_nanos() > 0)
}
