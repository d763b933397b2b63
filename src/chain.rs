//! Retrieval-augmented answering over a knowledge base.
//!
//! A follow-up question is first rewritten into a standalone question using
//! the conversation so far, then the retrieved passages are stuffed into a
//! single answering prompt.

use std::fmt::Write as _;

use tracing::debug;

use crate::{
    cancel::{CancellationFlag, Step},
    chunking::Passage,
    providers::{ChatModel, Embedder},
    retriever::HybridRetriever,
};

/// Temperature for condensing and answering.
pub const CHAIN_TEMPERATURE: f32 = 0.2;
/// Put in front of the question in the answering prompt only. Retrieval
/// sees the bare question.
pub const QUESTION_PREFIX: &str = "Use all available PDF context:\n";

/// An answer and the passages it was grounded on.
#[derive(Debug, Clone)]
pub struct ChainAnswer {
    pub answer: String,
    pub sources: Vec<Passage>,
}

/// A built knowledge base: the retriever plus the chain that queries it.
#[derive(Debug)]
pub struct ConversationChain {
    retriever: HybridRetriever,
}

impl ConversationChain {
    pub fn new(retriever: HybridRetriever) -> Self {
        Self { retriever }
    }

    /// Answer `question` in the light of `history`.
    ///
    /// Checks `cancel` after every model call.
    pub async fn ask<E: Embedder, L: ChatModel>(
        &self,
        embedder: &E,
        llm: &L,
        question: &str,
        history: &[(String, String)],
        cancel: &CancellationFlag,
    ) -> Step<ChainAnswer> {
        let standalone = if history.is_empty() {
            question.to_string()
        } else {
            let condensed = llm
                .complete(&condense_prompt(history, question), CHAIN_TEMPERATURE)
                .await?;
            cancel.checkpoint()?;
            let condensed = condensed.trim();
            if condensed.is_empty() {
                question.to_string()
            } else {
                debug!(standalone = condensed, "condensed follow-up question");
                condensed.to_string()
            }
        };

        let query_vector = embedder.embed_query(&standalone).await?;
        cancel.checkpoint()?;

        let sources: Vec<Passage> = self
            .retriever
            .retrieve(&standalone, &query_vector)?
            .into_iter()
            .map(|r| r.passage)
            .collect();
        debug!(retrieved = sources.len(), "passages retrieved");

        let answer = llm
            .complete(&answer_prompt(&sources, &standalone), CHAIN_TEMPERATURE)
            .await?;
        cancel.checkpoint()?;

        Ok(ChainAnswer { answer, sources })
    }
}

pub fn condense_prompt(history: &[(String, String)], question: &str) -> String {
    let mut transcript = String::new();
    for (q, a) in history {
        let _ = write!(transcript, "\nHuman: {q}\nAssistant: {a}");
    }
    format!(
        "Given the following conversation and a follow up question, rephrase the \
         follow up question to be a standalone question, in its original language.\n\n\
         Chat History:\n{transcript}\nFollow Up Input: {question}\nStandalone question:"
    )
}

pub fn answer_prompt(passages: &[Passage], question: &str) -> String {
    let context = passages
        .iter()
        .map(|p| p.text.as_str())
        .collect::<Vec<_>>()
        .join("\n\n");
    format!(
        "Use the following pieces of context to answer the question at the end. \
         If you don't know the answer, just say that you don't know, don't try to \
         make up an answer.\n\n{context}\n\nQuestion: {QUESTION_PREFIX}{question}\nHelpful Answer:"
    )
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::{
        error::{Error, Result},
        index_cache::CacheEntry,
        lexical_index::{LexicalIndex, WRITER_MEMORY_BUDGET},
        semantic_index::SemanticIndex,
    };

    struct FixedEmbedder;

    impl Embedder for FixedEmbedder {
        fn name(&self) -> &str {
            "fixed"
        }

        async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Ok(texts.iter().map(|_| vec![1.0]).collect())
        }

        async fn embed_query(&self, _text: &str) -> Result<Vec<f32>> {
            Ok(vec![1.0])
        }
    }

    /// Replies with queued responses and records every prompt.
    struct ScriptedModel {
        replies: Mutex<Vec<String>>,
        prompts: Mutex<Vec<String>>,
        cancel_on_call: Option<CancellationFlag>,
    }

    impl ScriptedModel {
        fn new(replies: &[&str]) -> Self {
            Self {
                replies: Mutex::new(replies.iter().rev().map(|s| s.to_string()).collect()),
                prompts: Mutex::new(Vec::new()),
                cancel_on_call: None,
            }
        }

        fn prompts(&self) -> Vec<String> {
            self.prompts.lock().unwrap().clone()
        }
    }

    impl ChatModel for ScriptedModel {
        async fn complete(&self, prompt: &str, _temperature: f32) -> Result<String> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            if let Some(flag) = &self.cancel_on_call {
                flag.cancel();
            }
            self.replies
                .lock()
                .unwrap()
                .pop()
                .ok_or_else(|| Error::Model("no scripted reply".to_string()))
        }
    }

    fn chain() -> ConversationChain {
        let passage = Passage {
            id: 0,
            source: "guide.pdf".to_string(),
            page: 3,
            text: "Pin dependencies to reduce supply chain risk.".to_string(),
        };
        let lexical = LexicalIndex::open_in_ram().unwrap();
        let mut writer = lexical.writer(WRITER_MEMORY_BUDGET).unwrap();
        lexical.add_passage(&writer, &passage).unwrap();
        writer.commit().unwrap();
        let semantic = SemanticIndex::from_entries(vec![(passage, vec![1.0])]).unwrap();
        ConversationChain::new(HybridRetriever::new(CacheEntry { lexical, semantic }))
    }

    #[tokio::test]
    async fn first_question_is_answered_directly() {
        let llm = ScriptedModel::new(&["Pin your dependencies."]);
        let answer = chain()
            .ask(&FixedEmbedder, &llm, "How to reduce risk?", &[], &CancellationFlag::new())
            .await
            .unwrap();

        assert_eq!(answer.answer, "Pin your dependencies.");
        assert_eq!(answer.sources.len(), 1);
        assert_eq!(answer.sources[0].page, 3);

        let prompts = llm.prompts();
        assert_eq!(prompts.len(), 1);
        assert!(prompts[0].contains("Pin dependencies to reduce supply chain risk."));
        assert!(prompts[0].ends_with(
            "Question: Use all available PDF context:\nHow to reduce risk?\nHelpful Answer:"
        ));
    }

    #[tokio::test]
    async fn follow_up_is_condensed_first() {
        let llm = ScriptedModel::new(&["What does pinning do?", "It fixes versions."]);
        let history = vec![("What is pinning?".to_string(), "Fixing versions.".to_string())];

        let answer = chain()
            .ask(&FixedEmbedder, &llm, "And why?", &history, &CancellationFlag::new())
            .await
            .unwrap();
        assert_eq!(answer.answer, "It fixes versions.");

        let prompts = llm.prompts();
        assert_eq!(prompts.len(), 2);
        assert!(prompts[0].contains("Human: What is pinning?\nAssistant: Fixing versions."));
        assert!(prompts[0].contains("Follow Up Input: And why?"));
        assert!(prompts[1].contains("PDF context:\nWhat does pinning do?"));
    }

    #[tokio::test]
    async fn stop_during_condense_skips_the_rest() {
        let flag = CancellationFlag::new();
        let mut llm = ScriptedModel::new(&["standalone", "answer"]);
        llm.cancel_on_call = Some(flag.clone());
        let history = vec![("q".to_string(), "a".to_string())];

        let result = chain()
            .ask(&FixedEmbedder, &llm, "follow up", &history, &flag)
            .await;
        assert!(matches!(result, Err(crate::cancel::Halt::Stopped)));
        assert_eq!(llm.prompts().len(), 1);
    }

    /// Records the texts it embeds as queries.
    #[derive(Default)]
    struct RecordingEmbedder {
        queries: Mutex<Vec<String>>,
    }

    impl Embedder for RecordingEmbedder {
        fn name(&self) -> &str {
            "recording"
        }

        async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Ok(texts.iter().map(|_| vec![1.0]).collect())
        }

        async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
            self.queries.lock().unwrap().push(text.to_string());
            Ok(vec![1.0])
        }
    }

    #[tokio::test]
    async fn retrieval_sees_the_bare_question() {
        let embedder = RecordingEmbedder::default();
        let llm = ScriptedModel::new(&["Pin your dependencies."]);
        chain()
            .ask(&embedder, &llm, "How to reduce risk?", &[], &CancellationFlag::new())
            .await
            .unwrap();

        assert_eq!(*embedder.queries.lock().unwrap(), vec!["How to reduce risk?"]);
        assert!(llm.prompts()[0].contains(QUESTION_PREFIX));
    }

    #[test]
    fn answer_prompt_joins_context() {
        let p = |text: &str| Passage {
            id: 0,
            source: "a.pdf".to_string(),
            page: 1,
            text: text.to_string(),
        };
        let prompt = answer_prompt(&[p("one"), p("two")], "q?");
        assert!(prompt.contains("one\n\ntwo"));
    }
}
