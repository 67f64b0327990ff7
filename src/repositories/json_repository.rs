use std::path::PathBuf;

use super::chat_repository::{BoxFuture, ChatRepository};
use super::error::{RepositoryError, RepositoryResult};
use crate::models::chat::Chat;

/// JSON file-based repository for chats.
/// Stores each chat as a separate file in `<config_dir>/banter/chats/`.
pub struct JsonChatRepository {
    chats_dir: PathBuf,
}

impl JsonChatRepository {
    pub fn new() -> RepositoryResult<Self> {
        let chats_dir = dirs::config_dir()
            .ok_or_else(|| RepositoryError::Initialization {
                message: "Could not determine config directory".to_string(),
            })?
            .join("banter")
            .join("chats");

        Ok(Self { chats_dir })
    }

    /// Repository rooted at an explicit directory (tests, portable installs).
    pub fn with_dir(chats_dir: PathBuf) -> Self {
        Self { chats_dir }
    }

    fn chat_path(&self, id: &str) -> PathBuf {
        self.chats_dir.join(format!("{}.json", id))
    }
}

impl ChatRepository for JsonChatRepository {
    fn load_all(&self) -> BoxFuture<'static, RepositoryResult<Vec<Chat>>> {
        let chats_dir = self.chats_dir.clone();

        Box::pin(async move {
            tokio::task::spawn_blocking(move || {
                std::fs::create_dir_all(&chats_dir)?;

                let mut chats = Vec::new();
                for entry in std::fs::read_dir(&chats_dir)? {
                    let entry = entry?;
                    let path = entry.path();

                    if path.extension().and_then(|s| s.to_str()) == Some("json") {
                        let content = std::fs::read_to_string(&path)?;
                        let chat: Chat = serde_json::from_str(&content)?;
                        chats.push(chat);
                    }
                }

                chats.sort_by_key(|chat| std::cmp::Reverse(chat.updated_at));
                Ok(chats)
            })
            .await
            .map_err(|err| RepositoryError::Initialization {
                message: format!("load task failed: {}", err),
            })?
        })
    }

    fn save(&self, chat: Chat) -> BoxFuture<'static, RepositoryResult<()>> {
        let path = self.chat_path(&chat.id);
        let chats_dir = self.chats_dir.clone();

        Box::pin(async move {
            tokio::task::spawn_blocking(move || {
                std::fs::create_dir_all(&chats_dir)?;

                let json = serde_json::to_string_pretty(&chat)?;

                // Write to temp, then rename, so a crash never leaves a
                // half-written chat file.
                let temp_path = path.with_extension("json.tmp");
                std::fs::write(&temp_path, json)?;
                std::fs::rename(&temp_path, &path)?;

                Ok(())
            })
            .await
            .map_err(|err| RepositoryError::Initialization {
                message: format!("save task failed: {}", err),
            })?
        })
    }

    fn delete(&self, id: &str) -> BoxFuture<'static, RepositoryResult<()>> {
        let path = self.chat_path(id);

        Box::pin(async move {
            tokio::task::spawn_blocking(move || {
                if path.exists() {
                    std::fs::remove_file(&path)?;
                }
                Ok(())
            })
            .await
            .map_err(|err| RepositoryError::Initialization {
                message: format!("delete task failed: {}", err),
            })?
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::chat::Message;

    #[tokio::test]
    async fn test_round_trip_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let repo = JsonChatRepository::with_dir(dir.path().to_path_buf());

        let mut chat = Chat::new("llama3.2".into());
        chat.push_message(Message::user("hello".into(), Vec::new()));
        chat.push_message(Message::assistant("hi".into(), Some("greeting".into())));
        chat.set_context(Some(vec![5, 6, 7]));
        let id = chat.id.clone();

        repo.save(chat).await.unwrap();

        let loaded = repo.load_all().await.unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].id, id);
        assert_eq!(loaded[0].messages.len(), 2);
        assert_eq!(loaded[0].messages[1].thinking.as_deref(), Some("greeting"));
        assert_eq!(loaded[0].context, Some(vec![5, 6, 7]));
    }

    #[tokio::test]
    async fn test_save_replaces_existing() {
        let dir = tempfile::tempdir().unwrap();
        let repo = JsonChatRepository::with_dir(dir.path().to_path_buf());

        let mut chat = Chat::new("llama3.2".into());
        let id = chat.id.clone();
        repo.save(chat.clone()).await.unwrap();

        chat.set_title("Renamed".into());
        repo.save(chat).await.unwrap();

        let loaded = repo.load_all().await.unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].id, id);
        assert_eq!(loaded[0].title, "Renamed");
    }

    #[tokio::test]
    async fn test_delete_removes_file_and_tolerates_unknown_id() {
        let dir = tempfile::tempdir().unwrap();
        let repo = JsonChatRepository::with_dir(dir.path().to_path_buf());

        let chat = Chat::new("llama3.2".into());
        let id = chat.id.clone();
        repo.save(chat).await.unwrap();

        repo.delete(&id).await.unwrap();
        repo.delete("never-existed").await.unwrap();

        assert_eq!(repo.load_all().await.unwrap().len(), 0);
    }
}
