//! JSON file store.
//!
//! Layout under the state directory:
//!
//! ```text
//! executions/<id>.json    one record per execution
//! logs/<id>.jsonl         node logs, one JSON object per line
//! checkpoints/<id>.json   checkpoint blob
//! ```

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use super::{ExecutionRecord, ExecutionStore, NodeLog, StoreResult, TRACING_TARGET};
use crate::context::ExecutionId;
use crate::error::PersistenceError;

const EXECUTIONS_DIR: &str = "executions";
const LOGS_DIR: &str = "logs";
const CHECKPOINTS_DIR: &str = "checkpoints";

/// Store persisting JSON files under a directory.
///
/// Record updates are serialized through a lock so read-modify-write
/// operations such as [`set_can_resume`](ExecutionStore::set_can_resume)
/// do not interleave within one process.
#[derive(Debug)]
pub struct FileStore {
    root: PathBuf,
    write_lock: Mutex<()>,
}

impl FileStore {
    /// Opens a store rooted at `root`, creating the directory layout.
    pub async fn open(root: impl Into<PathBuf>) -> StoreResult<Self> {
        let root = root.into();
        for dir in [EXECUTIONS_DIR, LOGS_DIR, CHECKPOINTS_DIR] {
            fs::create_dir_all(root.join(dir))
                .await
                .map_err(|e| io_error("open", &root.join(dir), e))?;
        }

        tracing::debug!(target: TRACING_TARGET, root = %root.display(), "Opened file store");
        Ok(Self {
            root,
            write_lock: Mutex::new(()),
        })
    }

    /// Returns the state directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn execution_path(&self, id: ExecutionId) -> PathBuf {
        self.root.join(EXECUTIONS_DIR).join(format!("{id}.json"))
    }

    fn log_path(&self, id: ExecutionId) -> PathBuf {
        self.root.join(LOGS_DIR).join(format!("{id}.jsonl"))
    }

    fn checkpoint_path(&self, id: ExecutionId) -> PathBuf {
        self.root.join(CHECKPOINTS_DIR).join(format!("{id}.json"))
    }

    /// Lists the ids of every stored execution.
    pub async fn list_executions(&self) -> StoreResult<Vec<ExecutionId>> {
        let dir = self.root.join(EXECUTIONS_DIR);
        let mut entries = fs::read_dir(&dir)
            .await
            .map_err(|e| io_error("list_executions", &dir, e))?;

        let mut ids = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| io_error("list_executions", &dir, e))?
        {
            let path = entry.path();
            if let Some(id) = path
                .file_stem()
                .and_then(|stem| stem.to_str())
                .and_then(|stem| stem.parse::<ExecutionId>().ok())
            {
                ids.push(id);
            }
        }
        ids.sort();
        Ok(ids)
    }
}

fn io_error(operation: &str, path: &Path, error: std::io::Error) -> PersistenceError {
    PersistenceError::new(operation, format!("{}: {error}", path.display()))
}

async fn write_json<T: Serialize>(operation: &str, path: &Path, value: &T) -> StoreResult<()> {
    let bytes = serde_json::to_vec_pretty(value)
        .map_err(|e| PersistenceError::new(operation, e.to_string()))?;

    // Write then rename so readers never observe a partial file.
    let temporary = path.with_extension("json.tmp");
    fs::write(&temporary, bytes)
        .await
        .map_err(|e| io_error(operation, &temporary, e))?;
    fs::rename(&temporary, path)
        .await
        .map_err(|e| io_error(operation, path, e))
}

async fn read_json<T: DeserializeOwned>(operation: &str, path: &Path) -> StoreResult<Option<T>> {
    let bytes = match fs::read(path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(io_error(operation, path, e)),
    };
    serde_json::from_slice(&bytes)
        .map(Some)
        .map_err(|e| PersistenceError::new(operation, format!("{}: {e}", path.display())))
}

#[async_trait::async_trait]
impl ExecutionStore for FileStore {
    async fn create_execution(&self, record: &ExecutionRecord) -> StoreResult<()> {
        let _guard = self.write_lock.lock().await;
        let path = self.execution_path(record.id);
        if fs::try_exists(&path).await.unwrap_or(false) {
            return Err(PersistenceError::new(
                "create_execution",
                format!("execution {} already exists", record.id),
            ));
        }
        write_json("create_execution", &path, record).await
    }

    async fn update_execution(&self, record: &ExecutionRecord) -> StoreResult<()> {
        let _guard = self.write_lock.lock().await;
        write_json("update_execution", &self.execution_path(record.id), record).await
    }

    async fn get_execution(&self, id: ExecutionId) -> StoreResult<Option<ExecutionRecord>> {
        read_json("get_execution", &self.execution_path(id)).await
    }

    async fn create_node_log(&self, log: &NodeLog) -> StoreResult<()> {
        let path = self.log_path(log.execution_id);
        let mut line = serde_json::to_vec(log)
            .map_err(|e| PersistenceError::new("create_node_log", e.to_string()))?;
        line.push(b'\n');

        let _guard = self.write_lock.lock().await;
        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .map_err(|e| io_error("create_node_log", &path, e))?;
        file.write_all(&line)
            .await
            .map_err(|e| io_error("create_node_log", &path, e))?;
        file.flush()
            .await
            .map_err(|e| io_error("create_node_log", &path, e))
    }

    async fn node_logs(&self, id: ExecutionId) -> StoreResult<Vec<NodeLog>> {
        let path = self.log_path(id);
        let contents = match fs::read_to_string(&path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(io_error("node_logs", &path, e)),
        };

        contents
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| {
                serde_json::from_str(line)
                    .map_err(|e| PersistenceError::new("node_logs", format!("{}: {e}", path.display())))
            })
            .collect()
    }

    async fn save_checkpoint(&self, id: ExecutionId, checkpoint: &Value) -> StoreResult<()> {
        write_json("save_checkpoint", &self.checkpoint_path(id), checkpoint).await
    }

    async fn load_checkpoint(&self, id: ExecutionId) -> StoreResult<Option<Value>> {
        read_json("load_checkpoint", &self.checkpoint_path(id)).await
    }

    async fn clear_checkpoint(&self, id: ExecutionId) -> StoreResult<()> {
        let path = self.checkpoint_path(id);
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(io_error("clear_checkpoint", &path, e)),
        }
    }

    async fn set_can_resume(&self, id: ExecutionId, can_resume: bool) -> StoreResult<()> {
        let _guard = self.write_lock.lock().await;
        let path = self.execution_path(id);
        let mut record: ExecutionRecord = read_json("set_can_resume", &path)
            .await?
            .ok_or_else(|| {
                PersistenceError::new("set_can_resume", format!("execution {id} does not exist"))
            })?;
        record.can_resume = can_resume;
        write_json("set_can_resume", &path, &record).await
    }
}

#[cfg(test)]
mod tests {
    use serde_json::{Map, json};

    use super::*;
    use crate::context::{NodeOutput, NodeStatus};
    use crate::definition::{NodeDefinition, NodeType};
    use crate::store::ExecutionStatus;

    #[tokio::test]
    async fn test_records_survive_reopen() {
        let dir = tempfile::tempdir().expect("tempdir");
        let id = ExecutionId::new();
        {
            let store = FileStore::open(dir.path()).await.expect("open");
            let mut record = ExecutionRecord::pending(id, "wf", "org", "user", Map::new());
            store.create_execution(&record).await.expect("create");
            record.status = ExecutionStatus::Failed;
            store.update_execution(&record).await.expect("update");
            store.set_can_resume(id, true).await.expect("flag");
        }

        let store = FileStore::open(dir.path()).await.expect("reopen");
        let record = store.get_execution(id).await.expect("read").expect("present");
        assert_eq!(record.status, ExecutionStatus::Failed);
        assert!(record.can_resume);
        assert_eq!(store.list_executions().await.expect("list"), vec![id]);
        assert!(dir.path().join("executions").join(format!("{id}.json")).exists());
    }

    #[tokio::test]
    async fn test_node_logs_append_as_jsonl() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = FileStore::open(dir.path()).await.expect("open");
        let id = ExecutionId::new();
        let node = NodeDefinition::new("n1", "Writer", NodeType::Process);

        for text in ["one", "two"] {
            let mut data = Map::new();
            data.insert("result".into(), json!(text));
            let log = NodeLog::from_output(id, &NodeOutput::success(&node, data));
            store.create_node_log(&log).await.expect("append");
        }

        let logs = store.node_logs(id).await.expect("read");
        assert_eq!(logs.len(), 2);
        assert_eq!(logs[1].data.get("result"), Some(&json!("two")));
        assert_eq!(logs[0].status, NodeStatus::Success);

        let raw = std::fs::read_to_string(dir.path().join("logs").join(format!("{id}.jsonl")))
            .expect("raw");
        assert_eq!(raw.lines().count(), 2);
    }

    #[tokio::test]
    async fn test_checkpoint_files() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = FileStore::open(dir.path()).await.expect("open");
        let id = ExecutionId::new();

        assert_eq!(store.load_checkpoint(id).await.expect("load"), None);
        store.save_checkpoint(id, &json!({ "version": "1.0.0" })).await.expect("save");
        assert_eq!(
            store.load_checkpoint(id).await.expect("load"),
            Some(json!({ "version": "1.0.0" }))
        );
        store.clear_checkpoint(id).await.expect("clear");
        store.clear_checkpoint(id).await.expect("clear twice");
        assert_eq!(store.load_checkpoint(id).await.expect("load"), None);
    }
}
