use crate::types::FallStatus;
use futures::future::BoxFuture;
use std::collections::VecDeque;
use std::io::{BufRead, Write};
use std::sync::Mutex;

/// What the user answered when asked about a possible fall
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptOutcome {
    /// "I am okay"
    Okay,
    /// "I need help"
    NeedHelp,
    /// Prompt closed without a choice
    Dismissed,
}

impl PromptOutcome {
    /// Status to report for this answer. Dismissing reports nothing.
    pub fn status(&self) -> Option<FallStatus> {
        match self {
            PromptOutcome::Okay => Some(FallStatus::Resolved),
            PromptOutcome::NeedHelp => Some(FallStatus::Confirmed),
            PromptOutcome::Dismissed => None,
        }
    }
}

/// Text shown to the user
#[derive(Debug, Clone)]
pub struct FallPrompt {
    pub title: String,
    pub message: String,
    pub okay_label: String,
    pub help_label: String,
}

impl Default for FallPrompt {
    fn default() -> Self {
        Self {
            title: "Fall Detected".to_string(),
            message: "Are you okay?".to_string(),
            okay_label: "I am okay".to_string(),
            help_label: "I need help".to_string(),
        }
    }
}

/// Asks the user to confirm a detected fall.
///
/// Resolves exactly once and has no timeout; it waits for the user.
pub trait ConfirmationPrompt: Send + Sync {
    fn confirm<'a>(&'a self, prompt: &'a FallPrompt) -> BoxFuture<'a, PromptOutcome>;
}

/// Prompt on the controlling terminal
pub struct TerminalPrompt;

impl ConfirmationPrompt for TerminalPrompt {
    fn confirm<'a>(&'a self, prompt: &'a FallPrompt) -> BoxFuture<'a, PromptOutcome> {
        let prompt = prompt.clone();
        Box::pin(async move {
            let answer = tokio::task::spawn_blocking(move || {
                let stdin = std::io::stdin();
                let mut input = stdin.lock();
                ask(&prompt, &mut input, &mut std::io::stderr())
            })
            .await;

            match answer {
                Ok(outcome) => outcome,
                Err(e) => {
                    log::error!("Prompt task failed: {}", e);
                    PromptOutcome::Dismissed
                }
            }
        })
    }
}

fn ask(prompt: &FallPrompt, input: &mut impl BufRead, out: &mut impl Write) -> PromptOutcome {
    loop {
        let _ = writeln!(out, "\n*** {} ***\n{}", prompt.title, prompt.message);
        let _ = writeln!(out, "  [1] {}\n  [2] {}", prompt.okay_label, prompt.help_label);
        let _ = write!(out, "> ");
        let _ = out.flush();

        let mut line = String::new();
        match input.read_line(&mut line) {
            Ok(0) | Err(_) => return PromptOutcome::Dismissed,
            Ok(_) => {}
        }

        if let Some(outcome) = parse_answer(&line) {
            return outcome;
        }
    }
}

fn parse_answer(line: &str) -> Option<PromptOutcome> {
    match line.trim().to_ascii_lowercase().as_str() {
        "1" | "ok" | "okay" => Some(PromptOutcome::Okay),
        "2" | "help" => Some(PromptOutcome::NeedHelp),
        _ => None,
    }
}

/// Answers from a fixed script, then dismisses
#[derive(Default)]
pub struct ScriptedPrompt {
    answers: Mutex<VecDeque<PromptOutcome>>,
    asked: Mutex<u32>,
}

impl ScriptedPrompt {
    pub fn new(answers: impl IntoIterator<Item = PromptOutcome>) -> Self {
        Self {
            answers: Mutex::new(answers.into_iter().collect()),
            asked: Mutex::new(0),
        }
    }

    pub fn times_asked(&self) -> u32 {
        self.asked.lock().map(|n| *n).unwrap_or(0)
    }
}

impl ConfirmationPrompt for ScriptedPrompt {
    fn confirm<'a>(&'a self, _prompt: &'a FallPrompt) -> BoxFuture<'a, PromptOutcome> {
        if let Ok(mut asked) = self.asked.lock() {
            *asked += 1;
        }
        let outcome = self
            .answers
            .lock()
            .ok()
            .and_then(|mut answers| answers.pop_front())
            .unwrap_or(PromptOutcome::Dismissed);
        Box::pin(async move { outcome })
    }
}
