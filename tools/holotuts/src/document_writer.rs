use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;

use serde_json::json;
use tokio::sync::{mpsc, oneshot};

use crate::errors::HoloTutsError;
use crate::logging::append_run_log;
use crate::runtime::FileSystem;

type WriteResult = Result<(), HoloTutsError>;

#[derive(Debug)]
enum WriteCmd {
    Save {
        path: PathBuf,
        contents: String,
        reply: oneshot::Sender<WriteResult>,
    },
}

/// Writes whole documents either inline or on a dedicated writer thread.
///
/// In background mode at most one write is in flight: `write` and `flush` wait
/// for the previous write before doing anything else, so its failure is
/// reported to the caller of the next operation.
pub struct DocumentWriter {
    file_system: Arc<dyn FileSystem>,
    write_tx: Option<mpsc::Sender<WriteCmd>>,
    writer_join: Option<thread::JoinHandle<()>>,
    pending: Option<oneshot::Receiver<WriteResult>>,
}

impl Drop for DocumentWriter {
    fn drop(&mut self) {
        let _ = self.flush();
        drop(self.write_tx.take());
        if let Some(handle) = self.writer_join.take() {
            let _ = handle.join();
        }
    }
}

impl DocumentWriter {
    pub fn inline(file_system: Arc<dyn FileSystem>) -> Self {
        Self {
            file_system,
            write_tx: None,
            writer_join: None,
            pending: None,
        }
    }

    pub fn background(file_system: Arc<dyn FileSystem>) -> Self {
        let (write_tx, mut write_rx) = mpsc::channel::<WriteCmd>(1);
        let thread_fs = Arc::clone(&file_system);
        let writer_join = thread::spawn(move || {
            while let Some(cmd) = write_rx.blocking_recv() {
                match cmd {
                    WriteCmd::Save {
                        path,
                        contents,
                        reply,
                    } => {
                        let result = thread_fs.write_string(&path, &contents);
                        let _ = reply.send(result);
                    }
                }
            }
        });

        Self {
            file_system,
            write_tx: Some(write_tx),
            writer_join: Some(writer_join),
            pending: None,
        }
    }

    pub fn is_background(&self) -> bool {
        self.write_tx.is_some()
    }

    pub fn file_system(&self) -> &Arc<dyn FileSystem> {
        &self.file_system
    }

    pub fn write(&mut self, path: &Path, contents: String) -> WriteResult {
        self.flush()?;
        let Some(write_tx) = self.write_tx.as_ref() else {
            return self.file_system.write_string(path, &contents);
        };

        let (reply_tx, reply_rx) = oneshot::channel();
        write_tx
            .blocking_send(WriteCmd::Save {
                path: path.to_path_buf(),
                contents,
                reply: reply_tx,
            })
            .map_err(|_| HoloTutsError::Io("document writer is closed".to_string()))?;
        self.pending = Some(reply_rx);
        Ok(())
    }

    /// Waits for the in-flight write, if any.
    pub fn flush(&mut self) -> WriteResult {
        let Some(pending) = self.pending.take() else {
            return Ok(());
        };
        let result = pending.blocking_recv().map_err(|_| {
            HoloTutsError::Io("document writer stopped before replying".to_string())
        })?;
        if let Err(error) = &result {
            append_run_log(
                "error",
                "document_writer.failed",
                json!({ "error": error.to_string() }),
            );
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::DocumentWriter;
    use crate::errors::HoloTutsError;
    use crate::runtime::{FakeFileSystem, FileSystem};
    use std::path::Path;
    use std::sync::Arc;

    #[test]
    fn inline_writes_land_immediately() {
        let fs = FakeFileSystem::default();
        let mut writer = DocumentWriter::inline(Arc::new(fs.clone()));
        assert!(!writer.is_background());
        writer
            .write(Path::new("/doc.json"), "{}".to_string())
            .expect("write");
        assert_eq!(fs.file("/doc.json").as_deref(), Some("{}"));
    }

    #[test]
    fn background_writes_are_visible_after_flush() {
        let fs = FakeFileSystem::default();
        let mut writer = DocumentWriter::background(Arc::new(fs.clone()));
        writer
            .write(Path::new("/doc.json"), "first".to_string())
            .expect("queue first");
        writer
            .write(Path::new("/doc.json"), "second".to_string())
            .expect("queue second");
        writer.flush().expect("flush");
        assert_eq!(fs.file("/doc.json").as_deref(), Some("second"));
        assert_eq!(fs.write_log().len(), 2);
    }

    #[test]
    fn background_failure_surfaces_on_next_operation() {
        let fs = FakeFileSystem::default();
        let mut writer = DocumentWriter::background(Arc::new(fs.clone()));
        fs.set_fail_next(HoloTutsError::Io("disk full".to_string()));
        writer
            .write(Path::new("/doc.json"), "lost".to_string())
            .expect("queued");
        let err = writer
            .write(Path::new("/doc.json"), "next".to_string())
            .expect_err("previous failure reported");
        assert!(matches!(err, HoloTutsError::Io(message) if message == "disk full"));
        assert!(!fs.exists(Path::new("/doc.json")));
    }

    #[test]
    fn drop_flushes_pending_write() {
        let fs = FakeFileSystem::default();
        {
            let mut writer = DocumentWriter::background(Arc::new(fs.clone()));
            writer
                .write(Path::new("/doc.json"), "final".to_string())
                .expect("queue");
        }
        assert_eq!(fs.file("/doc.json").as_deref(), Some("final"));
    }
}
