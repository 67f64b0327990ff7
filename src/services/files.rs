use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{ChatError, ChatResult};
use crate::models::cancellation::CancelCheck;
use crate::repositories::BoxFuture;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileStatus {
    Pending,
    Extracting,
    Done,
    Failed,
}

/// Per-file progress reported while attachments are being processed.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FileProgress {
    pub path: PathBuf,
    pub file_name: String,
    /// 0.0 ..= 1.0
    pub progress: f32,
    pub status: FileStatus,
}

/// An attachment with its extracted text, ready to fold into the prompt.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProcessedFile {
    pub path: PathBuf,
    pub file_name: String,
    pub content: String,
}

pub type ProgressCallback = Arc<dyn Fn(FileProgress) + Send + Sync>;

/// Extraction boundary. Rich formats (PDF, spreadsheets) live behind this
/// trait in the host application; the core only needs text out.
pub trait FileContentProcessor: Send + Sync + 'static {
    fn process_files(
        &self,
        paths: Vec<PathBuf>,
        on_progress: ProgressCallback,
        is_cancelled: CancelCheck,
    ) -> BoxFuture<'static, ChatResult<Vec<ProcessedFile>>>;
}

fn file_name_of(path: &PathBuf) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string_lossy().into_owned())
}

/// Reads attachments as UTF-8 text, one file at a time, reporting progress
/// and honoring cancellation between files.
#[derive(Default)]
pub struct PlainTextProcessor;

impl FileContentProcessor for PlainTextProcessor {
    fn process_files(
        &self,
        paths: Vec<PathBuf>,
        on_progress: ProgressCallback,
        is_cancelled: CancelCheck,
    ) -> BoxFuture<'static, ChatResult<Vec<ProcessedFile>>> {
        Box::pin(async move {
            let mut processed = Vec::with_capacity(paths.len());

            for path in paths {
                if is_cancelled() {
                    return Err(ChatError::Cancelled);
                }

                let file_name = file_name_of(&path);
                on_progress(FileProgress {
                    path: path.clone(),
                    file_name: file_name.clone(),
                    progress: 0.0,
                    status: FileStatus::Extracting,
                });

                let content = tokio::fs::read_to_string(&path).await.map_err(|err| {
                    on_progress(FileProgress {
                        path: path.clone(),
                        file_name: file_name.clone(),
                        progress: 1.0,
                        status: FileStatus::Failed,
                    });
                    ChatError::Validation {
                        message: format!("could not read {}: {}", file_name, err),
                    }
                })?;

                debug!(file = %file_name, bytes = content.len(), "attachment processed");
                on_progress(FileProgress {
                    path: path.clone(),
                    file_name: file_name.clone(),
                    progress: 1.0,
                    status: FileStatus::Done,
                });

                processed.push(ProcessedFile {
                    path,
                    file_name,
                    content,
                });
            }

            Ok(processed)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::cancellation::CancellationToken;
    use parking_lot::Mutex;
    use std::io::Write;

    fn collect_progress() -> (ProgressCallback, Arc<Mutex<Vec<FileProgress>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let callback: ProgressCallback = Arc::new(move |progress| sink.lock().push(progress));
        (callback, seen)
    }

    #[tokio::test]
    async fn test_reads_files_and_reports_progress() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "attachment body").unwrap();

        let (callback, seen) = collect_progress();
        let token = CancellationToken::new();

        let processed = PlainTextProcessor
            .process_files(vec![file.path().to_path_buf()], callback, token.checker())
            .await
            .unwrap();

        assert_eq!(processed.len(), 1);
        assert!(processed[0].content.contains("attachment body"));

        let events = seen.lock();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].status, FileStatus::Extracting);
        assert_eq!(events[1].status, FileStatus::Done);
        assert_eq!(events[1].progress, 1.0);
    }

    #[tokio::test]
    async fn test_cancelled_before_work_returns_cancelled() {
        let (callback, _) = collect_progress();
        let token = CancellationToken::new();
        token.cancel();

        let result = PlainTextProcessor
            .process_files(vec![PathBuf::from("/nonexistent")], callback, token.checker())
            .await;

        assert!(matches!(result, Err(ChatError::Cancelled)));
    }

    #[tokio::test]
    async fn test_unreadable_file_is_a_validation_error() {
        let (callback, seen) = collect_progress();
        let token = CancellationToken::new();

        let result = PlainTextProcessor
            .process_files(
                vec![PathBuf::from("/definitely/not/here.txt")],
                callback,
                token.checker(),
            )
            .await;

        assert!(matches!(result, Err(ChatError::Validation { .. })));
        assert_eq!(seen.lock().last().unwrap().status, FileStatus::Failed);
    }
}
