use serde::Serialize;

use crate::executor::{QueryExecutor, ResultSet};
use crate::generate::{CandidateQuery, Narrator, Synthesizer, TextGenerator};
use crate::judge::{Judge, RejectReason, Verdict};
use crate::schema::SchemaDescriptor;

/// Generation/validation cycles allowed per request before failing closed.
pub const MAX_RETRIES: u32 = 3;

// ---------------------------------------------------------------------------
// States and outcomes
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Generating,
    Judging,
    Executing,
    Analyzing,
    Failed,
    Succeeded,
}

/// Why a session ended in `Failed`. The judge's closed taxonomy plus the
/// two runtime categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureCode {
    InjectionSuspected,
    MalformedSyntax,
    NotReadOnly,
    UnknownTable,
    UnknownColumn,
    ExecutionError,
    GenerationUnavailable,
}

impl From<RejectReason> for FailureCode {
    fn from(reason: RejectReason) -> Self {
        match reason {
            RejectReason::InjectionSuspected => FailureCode::InjectionSuspected,
            RejectReason::MalformedSyntax => FailureCode::MalformedSyntax,
            RejectReason::NotReadOnly => FailureCode::NotReadOnly,
            RejectReason::UnknownTable => FailureCode::UnknownTable,
            RejectReason::UnknownColumn => FailureCode::UnknownColumn,
        }
    }
}

impl FailureCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureCode::InjectionSuspected => "injection_suspected",
            FailureCode::MalformedSyntax => "malformed_syntax",
            FailureCode::NotReadOnly => "not_read_only",
            FailureCode::UnknownTable => "unknown_table",
            FailureCode::UnknownColumn => "unknown_column",
            FailureCode::ExecutionError => "execution_error",
            FailureCode::GenerationUnavailable => "generation_unavailable",
        }
    }
}

/// Caller-facing result of one analytics request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Outcome {
    Succeeded {
        answer: String,
        row_count: usize,
    },
    Failed {
        reason: FailureCode,
        user_message: String,
    },
}

impl Outcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Succeeded { .. })
    }

    /// Text to show the user. Never contains raw database errors.
    pub fn message(&self) -> &str {
        match self {
            Outcome::Succeeded { answer, .. } => answer,
            Outcome::Failed { user_message, .. } => user_message,
        }
    }
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

/// Per-request state. Owned by the controller for one `run` and handed back
/// in the report; never shared between requests.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RetrySession {
    /// Generation attempts made so far, `0..=MAX_RETRIES`.
    pub attempt: u32,
    pub last_verdict: Option<Verdict>,
    /// Raw text of the last rejection or runtime error. For logs only.
    pub last_error: Option<String>,
    /// Feedback sent to the next generation, oldest first.
    pub feedback: Vec<String>,
    /// Every phase entered, in order.
    pub history: Vec<Phase>,
}

impl RetrySession {
    pub fn phase(&self) -> Option<Phase> {
        self.history.last().copied()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionReport {
    pub outcome: Outcome,
    /// The query that was executed, when one got that far.
    pub executed_sql: Option<String>,
    pub session: RetrySession,
}

// Internal transition carrying the data each phase needs.
enum Step {
    Generate,
    Judge(CandidateQuery),
    Execute(CandidateQuery),
    Analyze(CandidateQuery, ResultSet),
    Fail(FailureCode),
    Succeed(String, usize),
}

impl Step {
    fn phase(&self) -> Phase {
        match self {
            Step::Generate => Phase::Generating,
            Step::Judge(_) => Phase::Judging,
            Step::Execute(_) => Phase::Executing,
            Step::Analyze(..) => Phase::Analyzing,
            Step::Fail(_) => Phase::Failed,
            Step::Succeed(..) => Phase::Succeeded,
        }
    }
}

// ---------------------------------------------------------------------------
// Controller
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy)]
pub struct ControllerSettings {
    pub sql_temperature: f32,
    pub narration_temperature: f32,
    /// Rows shown to the narrator; the executor itself is uncapped.
    pub narrator_max_rows: usize,
}

impl Default for ControllerSettings {
    fn default() -> Self {
        Self {
            sql_temperature: 0.0,
            narration_temperature: 0.7,
            narrator_max_rows: 50,
        }
    }
}

/// Drives synthesizer → judge → executor → narrator for one request, feeding
/// structured rejection reasons back into generation, and failing closed
/// after `MAX_RETRIES` attempts.
pub struct RetryController<'a> {
    schema: &'a SchemaDescriptor,
    judge: Judge,
    generator: &'a dyn TextGenerator,
    executor: &'a dyn QueryExecutor,
    settings: ControllerSettings,
}

impl<'a> RetryController<'a> {
    pub fn new(
        schema: &'a SchemaDescriptor,
        generator: &'a dyn TextGenerator,
        executor: &'a dyn QueryExecutor,
    ) -> Self {
        Self {
            schema,
            judge: Judge::default(),
            generator,
            executor,
            settings: ControllerSettings::default(),
        }
    }

    pub fn with_judge(mut self, judge: Judge) -> Self {
        self.judge = judge;
        self
    }

    pub fn with_settings(mut self, settings: ControllerSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn run(&self, question: &str) -> SessionReport {
        let synthesizer = Synthesizer::new(self.generator, self.settings.sql_temperature);
        let narrator = Narrator::new(
            self.generator,
            self.settings.narration_temperature,
            self.settings.narrator_max_rows,
        );

        let mut session = RetrySession::default();
        let mut executed_sql = None;
        let mut step = Step::Generate;

        loop {
            let phase = step.phase();
            tracing::debug!(?phase, attempt = session.attempt, "retry controller transition");
            session.history.push(phase);

            step = match step {
                Step::Generate => {
                    session.attempt += 1;
                    match synthesizer.synthesize(
                        question,
                        self.schema,
                        &session.feedback,
                        session.attempt,
                        session.last_error.clone(),
                    ) {
                        Ok(candidate) => Step::Judge(candidate),
                        Err(e) => {
                            tracing::warn!(error = %e, "query synthesis failed");
                            session.last_error = Some(e.to_string());
                            Step::Fail(FailureCode::GenerationUnavailable)
                        }
                    }
                }

                Step::Judge(candidate) => {
                    let verdict = self.judge.judge(&candidate.sql, self.schema);
                    let next = match &verdict {
                        Verdict::Accepted { warnings } => {
                            for warning in warnings {
                                tracing::debug!(%warning, "judge warning");
                            }
                            Step::Execute(candidate)
                        }
                        Verdict::Rejected(rejection) => {
                            tracing::warn!(
                                attempt = session.attempt,
                                reason = %rejection.reason,
                                detail = %rejection.detail,
                                "candidate query rejected"
                            );
                            session.last_error = Some(rejection.to_string());
                            session.feedback.push(rejection.feedback(self.schema));
                            self.retry_or_fail(&session, rejection.reason.into())
                        }
                    };
                    session.last_verdict = Some(verdict);
                    next
                }

                Step::Execute(candidate) => match self.executor.execute(&candidate.sql) {
                    Ok(results) => {
                        executed_sql = Some(candidate.sql.clone());
                        Step::Analyze(candidate, results)
                    }
                    Err(e) => {
                        tracing::warn!(attempt = session.attempt, error = %e, "query execution failed");
                        session.last_error = Some(e.to_string());
                        session.feedback.push(format!(
                            "SQL execution error: {e}\n\nPlease revise your query."
                        ));
                        self.retry_or_fail(&session, FailureCode::ExecutionError)
                    }
                },

                Step::Analyze(candidate, results) => {
                    match narrator.narrate(question, &candidate.sql, &results) {
                        Ok(answer) => Step::Succeed(answer, results.row_count()),
                        Err(e) => {
                            tracing::warn!(error = %e, "result narration failed");
                            session.last_error = Some(e.to_string());
                            Step::Fail(FailureCode::GenerationUnavailable)
                        }
                    }
                }

                Step::Fail(reason) => {
                    tracing::warn!(
                        attempts = session.attempt,
                        reason = reason.as_str(),
                        last_error = session.last_error.as_deref().unwrap_or(""),
                        "analytics session failed"
                    );
                    let user_message = failure_message(reason, session.attempt);
                    return SessionReport {
                        outcome: Outcome::Failed {
                            reason,
                            user_message,
                        },
                        executed_sql,
                        session,
                    };
                }

                Step::Succeed(answer, row_count) => {
                    tracing::info!(attempts = session.attempt, row_count, "analytics session succeeded");
                    return SessionReport {
                        outcome: Outcome::Succeeded { answer, row_count },
                        executed_sql,
                        session,
                    };
                }
            };
        }
    }

    fn retry_or_fail(&self, session: &RetrySession, reason: FailureCode) -> Step {
        if session.attempt < MAX_RETRIES {
            Step::Generate
        } else {
            Step::Fail(reason)
        }
    }
}

fn failure_message(reason: FailureCode, attempts: u32) -> String {
    match reason {
        FailureCode::GenerationUnavailable => {
            "Sorry, the assistant is unavailable right now. Please try again in a moment."
                .to_string()
        }
        _ => format!(
            "I apologize, but I wasn't able to build a safe query to answer your question \
             after {attempts} attempts. Could you try rephrasing your question or asking \
             something more specific?"
        ),
    }
}
