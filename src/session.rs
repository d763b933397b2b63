//! The state one conversation runs against.
//!
//! A [`Session`] owns the document registry, the knowledge base built from
//! the enabled documents, the fingerprint it was built for, and the
//! conversation. Only the rebuild decision and the query pipeline mutate the
//! knowledge base and its fingerprint.

use tracing::{error, info};

use crate::{
    builder::KnowledgeBaseBuilder,
    cancel::CancellationFlag,
    chain::ConversationChain,
    documents::DocumentRegistry,
    error::Result,
    fingerprint::Fingerprint,
    history::{ConversationHistory, TranscriptStore},
    index_cache::IndexCache,
    loader::DocumentLoader,
    providers::{ChatModel, Embedder},
};

/// Result of the rebuild decision that runs before every query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KnowledgeState {
    /// No document is enabled. Any knowledge base was torn down.
    Empty,
    /// The enabled set is unchanged since the last successful build.
    Current,
    /// A knowledge base was (re)assembled for a new enabled set.
    Rebuilt { from_cache: bool },
    /// Building failed. Queries see an empty knowledge base.
    Unavailable,
}

/// The previous answer, with and without its citation block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LastTurn {
    pub body: String,
    pub shown: String,
}

pub struct Session<D, E, L> {
    pub(crate) loader: D,
    pub(crate) embedder: E,
    pub(crate) llm: L,
    pub(crate) registry: DocumentRegistry,
    pub(crate) cache: IndexCache,
    pub(crate) knowledge: Option<ConversationChain>,
    pub(crate) active: Option<Fingerprint>,
    pub(crate) history: ConversationHistory,
    pub(crate) transcripts: TranscriptStore,
    pub(crate) last_turn: Option<LastTurn>,
    pub(crate) suggestions: Vec<String>,
    pub(crate) cancel: CancellationFlag,
}

impl<D: DocumentLoader, E: Embedder, L: ChatModel> Session<D, E, L> {
    pub fn new(
        loader: D,
        embedder: E,
        llm: L,
        registry: DocumentRegistry,
        cache: IndexCache,
        transcripts: TranscriptStore,
    ) -> Self {
        Self {
            loader,
            embedder,
            llm,
            registry,
            cache,
            knowledge: None,
            active: None,
            history: ConversationHistory::new(),
            transcripts,
            last_turn: None,
            suggestions: Vec::new(),
            cancel: CancellationFlag::new(),
        }
    }

    /// Bring the knowledge base in line with the enabled documents.
    ///
    /// Never fails: a build error is logged and leaves the session without
    /// a knowledge base, so the next query reports it as empty.
    pub async fn ensure_current(&mut self) -> KnowledgeState {
        let paths = self.registry.enabled_paths();
        if paths.is_empty() {
            if self.knowledge.is_some() || self.active.is_some() {
                info!("no documents enabled, clearing knowledge base");
            }
            self.knowledge = None;
            self.active = None;
            return KnowledgeState::Empty;
        }

        let fingerprint = Fingerprint::of(&paths);
        if self.knowledge.is_some() && self.active.as_ref() == Some(&fingerprint) {
            return KnowledgeState::Current;
        }

        info!(
            fingerprint = fingerprint.short(),
            documents = paths.len(),
            "enabled documents changed, rebuilding knowledge base"
        );
        // The old knowledge base is replaced wholesale, never patched.
        self.knowledge = None;
        self.active = None;

        let builder = KnowledgeBaseBuilder::new(&self.loader, &self.embedder, &self.cache);
        match builder.build(&fingerprint, &paths).await {
            Ok(outcome) => {
                self.knowledge = Some(ConversationChain::new(outcome.retriever));
                self.active = Some(fingerprint);
                KnowledgeState::Rebuilt {
                    from_cache: outcome.from_cache,
                }
            }
            Err(e) => {
                error!(error = %e, "failed to build knowledge base");
                KnowledgeState::Unavailable
            }
        }
    }

    /// Ask the running query to stop at its next checkpoint.
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    /// A handle other tasks can use to stop queries of this session.
    pub fn cancellation_flag(&self) -> CancellationFlag {
        self.cancel.clone()
    }

    /// Save the current conversation (if any) and start an empty one.
    pub fn new_chat(&mut self) -> Result<()> {
        if !self.history.is_empty() {
            self.transcripts.save(&self.history)?;
        }
        self.history.clear();
        self.last_turn = None;
        self.suggestions.clear();
        self.transcripts.start_new();
        Ok(())
    }

    /// Continue a saved conversation.
    pub fn resume_chat(&mut self, name: &str) -> Result<()> {
        self.history = self.transcripts.load(name)?;
        self.last_turn = self.history.last().map(|(_, a)| LastTurn {
            body: a.to_string(),
            shown: a.to_string(),
        });
        self.suggestions.clear();
        Ok(())
    }

    /// Swap the chat model, e.g. after a settings change.
    pub fn set_chat_model(&mut self, llm: L) {
        self.llm = llm;
    }

    pub fn registry(&self) -> &DocumentRegistry {
        &self.registry
    }

    /// Document changes take effect at the next query.
    pub fn registry_mut(&mut self) -> &mut DocumentRegistry {
        &mut self.registry
    }

    pub fn history(&self) -> &ConversationHistory {
        &self.history
    }

    pub fn transcripts(&self) -> &TranscriptStore {
        &self.transcripts
    }

    /// Follow-up questions proposed after the last answer.
    pub fn suggestions(&self) -> &[String] {
        &self.suggestions
    }

    pub fn last_answer(&self) -> Option<&str> {
        self.last_turn.as_ref().map(|t| t.shown.as_str())
    }

    pub fn active_fingerprint(&self) -> Option<&Fingerprint> {
        self.active.as_ref()
    }

    pub fn has_knowledge_base(&self) -> bool {
        self.knowledge.is_some()
    }

    pub fn llm(&self) -> &L {
        &self.llm
    }

    pub fn embedder(&self) -> &E {
        &self.embedder
    }
}
