use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{Error, Result};

/// Question/answer pairs of the current conversation, oldest first.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConversationHistory {
    turns: Vec<(String, String)>,
}

impl ConversationHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, question: impl Into<String>, answer: impl Into<String>) {
        self.turns.push((question.into(), answer.into()));
    }

    /// Remove and return the newest turn.
    pub fn pop(&mut self) -> Option<(String, String)> {
        self.turns.pop()
    }

    pub fn last(&self) -> Option<(&str, &str)> {
        self.turns.last().map(|(q, a)| (q.as_str(), a.as_str()))
    }

    pub fn turns(&self) -> &[(String, String)] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn clear(&mut self) {
        self.turns.clear();
    }
}

/// One JSON file per conversation under the chats directory, named after
/// the time the conversation was first saved.
///
/// Each file is an array of `[question, answer]` pairs.
#[derive(Debug)]
pub struct TranscriptStore {
    dir: PathBuf,
    current: Option<PathBuf>,
}

impl TranscriptStore {
    pub fn new(dir: PathBuf) -> Result<Self> {
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir, current: None })
    }

    /// File the current conversation is written to, once saved.
    pub fn current(&self) -> Option<&Path> {
        self.current.as_deref()
    }

    /// Write `history` to the current transcript, starting a new file on
    /// the first save of a conversation.
    pub fn save(&mut self, history: &ConversationHistory) -> Result<PathBuf> {
        let path = match &self.current {
            Some(path) => path.clone(),
            None => {
                let path = self.fresh_path();
                self.current = Some(path.clone());
                path
            }
        };

        let json = serde_json::to_string_pretty(history.turns())?;
        std::fs::write(&path, json)?;
        debug!(path = %path.display(), turns = history.len(), "transcript saved");
        Ok(path)
    }

    /// The next save goes to a new file.
    pub fn start_new(&mut self) {
        self.current = None;
    }

    /// Transcript file names, oldest first.
    pub fn list(&self) -> Result<Vec<String>> {
        let mut names = Vec::new();
        for entry in std::fs::read_dir(&self.dir)? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().to_string();
            if name.ends_with(".json") && entry.file_type()?.is_file() {
                names.push(name);
            }
        }
        names.sort();
        Ok(names)
    }

    /// Read a transcript and continue it: later saves go to the same file.
    pub fn load(&mut self, name: &str) -> Result<ConversationHistory> {
        let path = self.resolve(name)?;
        let turns: Vec<(String, String)> =
            serde_json::from_str(&std::fs::read_to_string(&path)?)?;
        self.current = Some(path);
        Ok(ConversationHistory { turns })
    }

    /// Read a transcript without making it current.
    pub fn read(&self, name: &str) -> Result<ConversationHistory> {
        let path = self.resolve(name)?;
        let turns: Vec<(String, String)> =
            serde_json::from_str(&std::fs::read_to_string(&path)?)?;
        Ok(ConversationHistory { turns })
    }

    pub fn delete(&mut self, name: &str) -> Result<()> {
        let path = self.resolve(name)?;
        std::fs::remove_file(&path)?;
        if self.current.as_deref() == Some(path.as_path()) {
            self.current = None;
        }
        Ok(())
    }

    fn resolve(&self, name: &str) -> Result<PathBuf> {
        let not_found = || Error::NotFound {
            kind: "transcript",
            name: name.to_string(),
        };
        if name.is_empty() || name.contains(['/', '\\']) || name.starts_with('.') {
            return Err(not_found());
        }
        let path = self.dir.join(name);
        if !path.is_file() {
            return Err(not_found());
        }
        Ok(path)
    }

    fn fresh_path(&self) -> PathBuf {
        let stamp = chrono::Local::now().format("%Y%m%d-%H%M%S").to_string();
        let mut path = self.dir.join(format!("{stamp}.json"));
        let mut n = 1;
        while path.exists() {
            path = self.dir.join(format!("{stamp}-{n}.json"));
            n += 1;
        }
        path
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn history(pairs: &[(&str, &str)]) -> ConversationHistory {
        let mut h = ConversationHistory::new();
        for (q, a) in pairs {
            h.push(*q, *a);
        }
        h
    }

    #[test]
    fn history_last_and_clear() {
        let mut h = history(&[("q1", "a1"), ("q2", "a2")]);
        assert_eq!(h.last(), Some(("q2", "a2")));
        assert_eq!(h.len(), 2);
        assert_eq!(h.pop(), Some(("q2".to_string(), "a2".to_string())));
        assert_eq!(h.last(), Some(("q1", "a1")));
        h.clear();
        assert!(h.last().is_none());
    }

    #[test]
    fn save_writes_pairs_as_json_arrays() {
        let tmp = tempfile::tempdir().unwrap();
        let mut store = TranscriptStore::new(tmp.path().join("chats")).unwrap();

        let path = store.save(&history(&[("hi", "Hello!")])).unwrap();
        let name = path.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.ends_with(".json"));
        // YYYYmmdd-HHMMSS.json
        assert_eq!(name.len(), "20250101-120000.json".len());

        let raw: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(raw, serde_json::json!([["hi", "Hello!"]]));
    }

    #[test]
    fn saves_within_a_conversation_reuse_the_file() {
        let tmp = tempfile::tempdir().unwrap();
        let mut store = TranscriptStore::new(tmp.path().to_path_buf()).unwrap();

        let first = store.save(&history(&[("q1", "a1")])).unwrap();
        let second = store.save(&history(&[("q1", "a1"), ("q2", "a2")])).unwrap();
        assert_eq!(first, second);
        assert_eq!(store.list().unwrap().len(), 1);
    }

    #[test]
    fn start_new_uses_a_new_file() {
        let tmp = tempfile::tempdir().unwrap();
        let mut store = TranscriptStore::new(tmp.path().to_path_buf()).unwrap();

        let first = store.save(&history(&[("q1", "a1")])).unwrap();
        store.start_new();
        let second = store.save(&history(&[("q2", "a2")])).unwrap();
        assert_ne!(first, second);
        assert_eq!(store.list().unwrap().len(), 2);
    }

    #[test]
    fn load_continues_the_transcript() {
        let tmp = tempfile::tempdir().unwrap();
        let mut store = TranscriptStore::new(tmp.path().to_path_buf()).unwrap();
        let path = store.save(&history(&[("q1", "a1")])).unwrap();
        let name = path.file_name().unwrap().to_string_lossy().to_string();

        store.start_new();
        let mut loaded = store.load(&name).unwrap();
        assert_eq!(loaded.last(), Some(("q1", "a1")));

        loaded.push("q2", "a2");
        assert_eq!(store.save(&loaded).unwrap(), path);
        assert_eq!(store.read(&name).unwrap().len(), 2);
    }

    #[test]
    fn delete_and_unknown_names() {
        let tmp = tempfile::tempdir().unwrap();
        let mut store = TranscriptStore::new(tmp.path().to_path_buf()).unwrap();
        let path = store.save(&history(&[("q", "a")])).unwrap();
        let name = path.file_name().unwrap().to_string_lossy().to_string();

        store.delete(&name).unwrap();
        assert!(store.list().unwrap().is_empty());
        assert!(store.current().is_none());

        assert!(matches!(store.load(&name), Err(Error::NotFound { .. })));
        assert!(matches!(store.read("../etc/passwd"), Err(Error::NotFound { .. })));
    }
}
