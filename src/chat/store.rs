use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::chat::Message;
use crate::error::{Result, TutorError};

pub const MESSAGES_KEY: &str = "make_master_messages";
pub const TOPIC_KEY: &str = "make_master_active_topic";

const IMAGES_DIR: &str = "images";

/// Conversation state on disk: one JSON file per key, plus generated diagrams.
pub struct ConversationStore {
    dir: PathBuf,
}

impl ConversationStore {
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|e| {
            TutorError::Storage(format!("failed to create {}: {e}", dir.display()))
        })?;
        Ok(Self { dir })
    }

    #[must_use]
    pub fn directory(&self) -> &Path {
        &self.dir
    }

    fn key_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }

    fn read(&self, key: &str) -> Result<Option<String>> {
        match fs::read_to_string(self.key_path(key)) {
            Ok(s) => Ok(Some(s)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(TutorError::Storage(format!("failed to read {key}: {e}"))),
        }
    }

    /// Write through a temporary file so a crash never leaves half a file behind.
    fn write(&self, key: &str, contents: &str) -> Result<()> {
        let path = self.key_path(key);
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, contents)
            .map_err(|e| TutorError::Storage(format!("failed to write {key}: {e}")))?;
        fs::rename(&tmp, &path)
            .map_err(|e| TutorError::Storage(format!("failed to replace {key}: {e}")))
    }

    fn remove(&self, key: &str) -> Result<()> {
        match fs::remove_file(self.key_path(key)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(TutorError::Storage(format!("failed to remove {key}: {e}"))),
        }
    }

    /// Saved transcript, with nothing left marked as streaming. Unreadable
    /// data is reported and treated as an empty transcript.
    #[must_use]
    pub fn load_messages(&self) -> Vec<Message> {
        let raw = match self.read(MESSAGES_KEY) {
            Ok(Some(raw)) => raw,
            Ok(None) => return Vec::new(),
            Err(e) => {
                tracing::warn!("{e}");
                return Vec::new();
            }
        };

        match serde_json::from_str::<Vec<Message>>(&raw) {
            Ok(messages) => messages
                .into_iter()
                .map(|mut m| {
                    m.is_streaming = false;
                    for image in &mut m.images {
                        image.is_loading = false;
                    }
                    m
                })
                .collect(),
            Err(e) => {
                tracing::warn!("ignoring saved messages: {e}");
                Vec::new()
            }
        }
    }

    pub fn save_messages(&self, messages: &[Message]) -> Result<()> {
        self.write(MESSAGES_KEY, &serde_json::to_string(messages)?)
    }

    #[must_use]
    pub fn load_topic(&self) -> Option<String> {
        match self.read(TOPIC_KEY) {
            Ok(Some(raw)) => serde_json::from_str(&raw)
                .map_err(|e| tracing::warn!("ignoring saved topic: {e}"))
                .ok(),
            Ok(None) => None,
            Err(e) => {
                tracing::warn!("{e}");
                None
            }
        }
    }

    /// Record the active topic; `None` forgets it.
    pub fn save_topic(&self, topic: Option<&str>) -> Result<()> {
        match topic {
            Some(id) => self.write(TOPIC_KEY, &serde_json::to_string(id)?),
            None => self.remove(TOPIC_KEY),
        }
    }

    /// Forget the transcript and the active topic. Saved diagrams stay.
    pub fn clear(&self) -> Result<()> {
        self.remove(MESSAGES_KEY)?;
        self.remove(TOPIC_KEY)
    }

    /// Store a generated diagram and return its path.
    pub fn save_image(&self, message_id: &str, index: usize, bytes: &[u8]) -> Result<PathBuf> {
        let dir = self.dir.join(IMAGES_DIR);
        fs::create_dir_all(&dir).map_err(|e| {
            TutorError::Storage(format!("failed to create {}: {e}", dir.display()))
        })?;
        let path = dir.join(format!("{message_id}-{index}.jpg"));
        fs::write(&path, bytes).map_err(|e| {
            TutorError::Storage(format!("failed to write {}: {e}", path.display()))
        })?;
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::{MessageImage, Sender};

    fn store() -> (tempfile::TempDir, ConversationStore) {
        let dir = tempfile::tempdir().unwrap_or_else(|e| panic!("{e}"));
        let store = ConversationStore::open(dir.path().join("state"))
            .unwrap_or_else(|e| panic!("{e}"));
        (dir, store)
    }

    #[test]
    fn empty_store_loads_nothing() {
        let (_dir, store) = store();
        assert!(store.load_messages().is_empty());
        assert!(store.load_topic().is_none());
    }

    #[test]
    fn messages_survive_and_lose_streaming_flags() {
        let (_dir, store) = store();
        let mut reply = Message::streaming_reply();
        reply.text = "respuesta".to_string();
        reply.images.push(MessageImage::pending("diagram"));
        let messages = vec![Message::user("pregunta"), reply];

        store.save_messages(&messages).unwrap_or_else(|e| panic!("{e}"));
        let loaded = store.load_messages();

        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[0], messages[0]);
        assert_eq!(loaded[1].sender, Sender::Bot);
        assert!(!loaded[1].is_streaming);
        assert!(!loaded[1].images[0].is_loading);
        assert!(store.directory().join("make_master_messages.json").exists());
    }

    #[test]
    fn corrupt_messages_load_as_empty() {
        let (_dir, store) = store();
        fs::write(store.directory().join("make_master_messages.json"), "{not json")
            .unwrap_or_else(|e| panic!("{e}"));
        assert!(store.load_messages().is_empty());
    }

    #[test]
    fn older_records_without_optional_fields_load() {
        let (_dir, store) = store();
        fs::write(
            store.directory().join("make_master_messages.json"),
            r#"[{"id":"1","text":"hola","sender":"USER","timestamp":1}]"#,
        )
        .unwrap_or_else(|e| panic!("{e}"));
        let loaded = store.load_messages();
        assert_eq!(loaded.len(), 1);
        assert!(loaded[0].images.is_empty());
    }

    #[test]
    fn topic_round_trip_and_removal() {
        let (_dir, store) = store();
        store.save_topic(Some("http-apis")).unwrap_or_else(|e| panic!("{e}"));
        assert_eq!(store.load_topic().as_deref(), Some("http-apis"));
        store.save_topic(None).unwrap_or_else(|e| panic!("{e}"));
        assert!(store.load_topic().is_none());
        store.save_topic(None).unwrap_or_else(|e| panic!("{e}"));
    }

    #[test]
    fn clear_forgets_both_keys() {
        let (_dir, store) = store();
        store
            .save_messages(&[Message::user("x")])
            .unwrap_or_else(|e| panic!("{e}"));
        store.save_topic(Some("intro")).unwrap_or_else(|e| panic!("{e}"));
        store.clear().unwrap_or_else(|e| panic!("{e}"));
        assert!(store.load_messages().is_empty());
        assert!(store.load_topic().is_none());
        store.clear().unwrap_or_else(|e| panic!("{e}"));
    }

    #[test]
    fn no_temp_files_left_behind() {
        let (_dir, store) = store();
        store
            .save_messages(&[Message::user("x")])
            .unwrap_or_else(|e| panic!("{e}"));
        let names: Vec<String> = fs::read_dir(store.directory())
            .unwrap_or_else(|e| panic!("{e}"))
            .filter_map(|e| e.ok())
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["make_master_messages.json"]);
    }

    #[test]
    fn images_land_in_their_own_directory() {
        let (_dir, store) = store();
        let path = store
            .save_image("42-0", 1, &[0xFF, 0xD8])
            .unwrap_or_else(|e| panic!("{e}"));
        assert!(path.starts_with(store.directory().join("images")));
        assert_eq!(fs::read(&path).unwrap_or_else(|e| panic!("{e}")), vec![0xFF, 0xD8]);
    }
}
