//! Answering one user question end to end.
//!
//! Order of operations per query:
//!
//! 1. rebuild decision
//! 2. clear the stop request and last suggestions, mark the query running
//! 3. small talk
//! 4. empty knowledge base
//! 5. ask the chain (with the previous turn as context when asked to)
//! 6. clean up line wrapping
//! 7. one retry when the answer looks like a refusal or repeats the last one
//! 8. citations, unless the answer still looks unsatisfactory
//! 9. follow-up suggestions for satisfactory answers
//! 10. record the turn and save the transcript
//!
//! A stop request is honoured after every model call. A stopped query
//! leaves no trace: nothing is appended to the history and nothing is saved.

use tracing::{error, info, warn};

use crate::{
    cancel::{Halt, Step},
    error::Result,
    loader::DocumentLoader,
    providers::{ChatModel, Embedder},
    session::{LastTurn, Session},
    text_util::{
        build_sources_text,
        format_key_points,
        greeting_reply,
        looks_like_refusal,
        parse_suggestions,
        refers_to_previous,
        suggestion_prompt,
    },
};

pub const EMPTY_KNOWLEDGE_BASE_MESSAGE: &str =
    "⚠️ Knowledge base is empty or not loaded. Please add and enable a PDF.";
pub const STOPPED_MESSAGE: &str = "🟥 Response was stopped.";
pub const NO_HISTORY_MESSAGE: &str =
    "I don't have enough history to reference the previous question.";

/// Temperature of the retry and suggestion calls.
pub const SECONDARY_TEMPERATURE: f32 = 0.4;

/// How an answer is judged before it is shown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnswerVerdict {
    Satisfactory,
    Empty,
    Refusal,
    /// Identical to the previous answer.
    Repeated,
}

impl AnswerVerdict {
    pub fn is_satisfactory(self) -> bool {
        self == Self::Satisfactory
    }
}

/// Judge an answer against the refusal phrases and the previous turn.
///
/// A repeat matches either the previous answer as shown (with citations)
/// or its body alone.
pub fn assess_answer(answer: &str, last: Option<&LastTurn>) -> AnswerVerdict {
    if answer.trim().is_empty() {
        AnswerVerdict::Empty
    } else if looks_like_refusal(answer) {
        AnswerVerdict::Refusal
    } else if last.is_some_and(|t| answer == t.shown || answer == t.body) {
        AnswerVerdict::Repeated
    } else {
        AnswerVerdict::Satisfactory
    }
}

pub fn followup_context_prompt(prev_question: &str, prev_answer: &str, question: &str) -> String {
    format!(
        "You are continuing a conversation.\n\n\
         Previous Question: \"{prev_question}\"\n\
         Previous Answer: \"{prev_answer}\"\n\n\
         Now answer this follow-up question based on the context above:\n\"{question}\""
    )
}

pub fn retry_prompt(question: &str, follow_up: bool) -> String {
    if follow_up {
        format!("Recheck all context carefully and expand on this answer:\n{question}")
    } else {
        format!("Carefully search the entire PDF and answer clearly:\n{question}")
    }
}

impl<D: DocumentLoader, E: Embedder, L: ChatModel> Session<D, E, L> {
    /// Answer a question. Never fails: errors and stops come back as text.
    pub async fn answer(&mut self, question: &str) -> String {
        self.ensure_current().await;
        let _query = self.cancel.begin_query();
        self.suggestions.clear();

        match self.resolve(question).await {
            Ok(text) => text,
            Err(Halt::Stopped) => {
                info!("query stopped");
                self.suggestions.clear();
                STOPPED_MESSAGE.to_string()
            }
            Err(Halt::Failed(e)) => {
                error!(error = %e, "query failed");
                self.suggestions.clear();
                format!("❌ Oops! An error occurred: {e}")
            }
        }
    }

    async fn resolve(&mut self, question: &str) -> Step<String> {
        let normalized = question.trim().to_lowercase();

        if let Some(reply) = greeting_reply(&normalized) {
            self.record(question, reply, reply)?;
            return Ok(reply.to_string());
        }

        let Some(chain) = &self.knowledge else {
            return Ok(EMPTY_KNOWLEDGE_BASE_MESSAGE.to_string());
        };

        let follow_up = refers_to_previous(&normalized);
        let prompt = if follow_up {
            let Some((prev_q, prev_a)) = self.history.last() else {
                return Ok(NO_HISTORY_MESSAGE.to_string());
            };
            followup_context_prompt(prev_q, prev_a, question)
        } else {
            question.to_string()
        };

        self.cancel.checkpoint()?;
        let result = chain
            .ask(
                &self.embedder,
                &self.llm,
                &prompt,
                self.history.turns(),
                &self.cancel,
            )
            .await?;
        self.cancel.checkpoint()?;

        let mut answer = format_key_points(result.answer.trim());

        let verdict = assess_answer(&answer, self.last_turn.as_ref());
        if !verdict.is_satisfactory() {
            info!(?verdict, "answer unsatisfactory, retrying once");
            let retry = self
                .llm
                .complete(&retry_prompt(question, follow_up), SECONDARY_TEMPERATURE)
                .await?;
            self.cancel.checkpoint()?;
            let retry = retry.trim();
            if !retry.is_empty() {
                answer = retry.to_string();
            }
        }

        let satisfactory = assess_answer(&answer, self.last_turn.as_ref()).is_satisfactory();
        let shown = if satisfactory {
            format!("{answer}{}", build_sources_text(&result.sources))
        } else {
            answer.clone()
        };

        if satisfactory {
            self.suggestions = self.suggest(&answer).await?;
        }

        self.record(question, &answer, &shown)?;
        Ok(shown)
    }

    /// Follow-up questions for an answer. A failed call yields none.
    async fn suggest(&self, answer: &str) -> Step<Vec<String>> {
        let reply = self
            .llm
            .complete(&suggestion_prompt(answer), SECONDARY_TEMPERATURE)
            .await;
        self.cancel.checkpoint()?;

        match reply {
            Ok(text) => Ok(parse_suggestions(&text)),
            Err(e) => {
                warn!(error = %e, "could not generate suggestions");
                Ok(Vec::new())
            }
        }
    }

    /// A turn that could not be saved is dropped again.
    fn record(&mut self, question: &str, body: &str, shown: &str) -> Result<()> {
        self.history.push(question, shown);
        if let Err(e) = self.transcripts.save(&self.history) {
            self.history.pop();
            return Err(e);
        }
        self.last_turn = Some(LastTurn {
            body: body.to_string(),
            shown: shown.to_string(),
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn last(body: &str, shown: &str) -> LastTurn {
        LastTurn {
            body: body.to_string(),
            shown: shown.to_string(),
        }
    }

    #[test]
    fn verdicts() {
        assert_eq!(assess_answer("Pin versions.", None), AnswerVerdict::Satisfactory);
        assert_eq!(assess_answer("   ", None), AnswerVerdict::Empty);
        assert_eq!(
            assess_answer("I'm sorry, the PDF does not contain information on that.", None),
            AnswerVerdict::Refusal
        );
    }

    #[test]
    fn repeats_match_body_or_shown_answer() {
        let previous = last("Pin versions.", "Pin versions.\n\n📚 Sources:\n• a.pdf (p. 1)\n");
        assert_eq!(
            assess_answer("Pin versions.", Some(&previous)),
            AnswerVerdict::Repeated
        );
        assert_eq!(
            assess_answer(&previous.shown.clone(), Some(&previous)),
            AnswerVerdict::Repeated
        );
        assert_eq!(
            assess_answer("Pin versions and audit.", Some(&previous)),
            AnswerVerdict::Satisfactory
        );
    }

    #[test]
    fn retry_prompts_differ_by_path() {
        assert_eq!(
            retry_prompt("q?", false),
            "Carefully search the entire PDF and answer clearly:\nq?"
        );
        assert_eq!(
            retry_prompt("q?", true),
            "Recheck all context carefully and expand on this answer:\nq?"
        );
    }

    #[test]
    fn followup_prompt_carries_previous_turn() {
        let prompt = followup_context_prompt("What is X?", "X is Y.", "Tell me more about the previous question");
        assert!(prompt.contains("Previous Question: \"What is X?\""));
        assert!(prompt.contains("Previous Answer: \"X is Y.\""));
        assert!(prompt.ends_with("\"Tell me more about the previous question\""));
    }
}
