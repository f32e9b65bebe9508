//! Interactive confirmation for untrusted repositories and license terms.

use anyhow::Result;
use log::debug;
use std::sync::Arc;

use crate::runtime::Runtime;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsentAnswer {
    Yes,
    YesToAll,
    No,
    NoToAll,
}

impl ConsentAnswer {
    pub fn is_yes(self) -> bool {
        matches!(self, ConsentAnswer::Yes | ConsentAnswer::YesToAll)
    }

    fn parse(input: &str) -> Option<Self> {
        match input.trim().to_lowercase().as_str() {
            "y" | "yes" => Some(ConsentAnswer::Yes),
            "a" => Some(ConsentAnswer::YesToAll),
            "" | "n" | "no" => Some(ConsentAnswer::No),
            "l" => Some(ConsentAnswer::NoToAll),
            _ => None,
        }
    }
}

#[cfg_attr(test, mockall::automock)]
pub trait Consent: Send + Sync {
    fn confirm(&self, question: &str) -> Result<ConsentAnswer>;
}

/// Asks on the terminal through [`Runtime::prompt`].
pub struct ConsoleConsent<R: Runtime> {
    runtime: Arc<R>,
}

impl<R: Runtime> ConsoleConsent<R> {
    pub fn new(runtime: Arc<R>) -> Self {
        Self { runtime }
    }
}

impl<R: Runtime> Consent for ConsoleConsent<R> {
    fn confirm(&self, question: &str) -> Result<ConsentAnswer> {
        let prompt = format!(
            "{}\n[y] Yes  [a] Yes to All  [n] No  [l] No to All (default is \"n\"):",
            question
        );
        loop {
            let input = self.runtime.prompt(&prompt)?;
            if let Some(answer) = ConsentAnswer::parse(&input) {
                return Ok(answer);
            }
            debug!("Unrecognised answer '{}', asking again", input);
        }
    }
}

/// Answers every question with "yes to all" (`--yes`).
pub struct AssumeYes;

impl Consent for AssumeYes {
    fn confirm(&self, _question: &str) -> Result<ConsentAnswer> {
        Ok(ConsentAnswer::YesToAll)
    }
}

/// What a question is about. "To all" answers apply per topic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsentTopic {
    UntrustedRepository,
    License,
}

/// Operation-scoped wrapper that remembers "to all" answers.
pub struct ConsentSession<'a> {
    consent: &'a dyn Consent,
    remembered: Vec<(ConsentTopic, bool)>,
}

impl<'a> ConsentSession<'a> {
    pub fn new(consent: &'a dyn Consent) -> Self {
        Self {
            consent,
            remembered: Vec::new(),
        }
    }

    /// Ask `question` unless an earlier "to all" answer covers `topic`.
    pub fn ask(&mut self, topic: ConsentTopic, question: &str) -> Result<bool> {
        if let Some((_, answer)) = self.remembered.iter().find(|(t, _)| *t == topic) {
            debug!("Reusing earlier answer for {:?}: {}", topic, answer);
            return Ok(*answer);
        }
        let answer = self.consent.confirm(question)?;
        if matches!(answer, ConsentAnswer::YesToAll | ConsentAnswer::NoToAll) {
            self.remembered.push((topic, answer.is_yes()));
        }
        Ok(answer.is_yes())
    }
}
