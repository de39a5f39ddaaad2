//! Stitching chunk outputs into the final artifact.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use thiserror::Error;
use tracing::{debug, info};

use rendergrid_storage::{ArtifactStore, StoreError};

/// How long presigned chunk URLs handed to an external muxer stay valid.
const CHUNK_URL_TTL: Duration = Duration::from_secs(60 * 60);

#[derive(Debug, Error)]
pub enum StitchError {
    #[error("nothing to stitch")]
    Empty,

    #[error("artifact store: {0}")]
    Store(#[from] StoreError),

    #[error("failed to run muxer {command}: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("muxer {command} exited with {code:?}: {stderr}")]
    Command {
        command: String,
        code: Option<i32>,
        stderr: String,
    },
}

/// Joins ordered chunk outputs into one artifact at `output_key`.
#[async_trait]
pub trait Muxer: Send + Sync + 'static {
    /// `chunk_refs` are object keys in chunk index order. Returns the
    /// reference of the stitched output.
    async fn stitch(
        &self,
        job_id: &str,
        chunk_refs: &[String],
        output_key: &str,
    ) -> Result<String, StitchError>;
}

/// Byte-wise concatenation through the artifact store.
///
/// Correct for formats that concatenate cleanly (MPEG-TS, raw PCM, the
/// test fixtures); containers like MP4 need [`CommandMuxer`].
#[derive(Clone)]
pub struct ConcatMuxer {
    store: ArtifactStore,
}

impl ConcatMuxer {
    pub fn new(store: ArtifactStore) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Muxer for ConcatMuxer {
    async fn stitch(
        &self,
        job_id: &str,
        chunk_refs: &[String],
        output_key: &str,
    ) -> Result<String, StitchError> {
        if chunk_refs.is_empty() {
            return Err(StitchError::Empty);
        }
        let mut joined = BytesMut::new();
        for key in chunk_refs {
            joined.extend_from_slice(&self.store.get_object(key).await?);
        }
        let size = joined.len();
        self.store.put_object(output_key, joined.freeze()).await?;
        info!(job_id, chunks = chunk_refs.len(), size, output_key, "chunks concatenated");
        Ok(output_key.to_string())
    }
}

/// Runs an external muxer and stores what it writes to stdout.
///
/// The command receives its configured args followed by one presigned URL
/// per chunk, in order.
#[derive(Clone)]
pub struct CommandMuxer {
    command: String,
    args: Vec<String>,
    store: ArtifactStore,
}

impl CommandMuxer {
    pub fn new(command: impl Into<String>, args: Vec<String>, store: ArtifactStore) -> Self {
        Self {
            command: command.into(),
            args,
            store,
        }
    }
}

#[async_trait]
impl Muxer for CommandMuxer {
    async fn stitch(
        &self,
        job_id: &str,
        chunk_refs: &[String],
        output_key: &str,
    ) -> Result<String, StitchError> {
        if chunk_refs.is_empty() {
            return Err(StitchError::Empty);
        }
        let mut urls = Vec::with_capacity(chunk_refs.len());
        for key in chunk_refs {
            urls.push(self.store.presign(key, CHUNK_URL_TTL).await?);
        }

        let mut command = tokio::process::Command::new(&self.command);
        command.kill_on_drop(true);
        command.args(&self.args).args(&urls);
        command.stdin(Stdio::null());
        command.stdout(Stdio::piped());
        command.stderr(Stdio::piped());
        debug!(job_id, command = %self.command, chunks = urls.len(), "running muxer");

        let output = command.output().await.map_err(|source| StitchError::Spawn {
            command: self.command.clone(),
            source,
        })?;
        if !output.status.success() {
            return Err(StitchError::Command {
                command: self.command.clone(),
                code: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        let size = output.stdout.len();
        self.store
            .put_object(output_key, Bytes::from(output.stdout))
            .await?;
        info!(job_id, command = %self.command, size, output_key, "chunks muxed");
        Ok(output_key.to_string())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use rendergrid_storage::MemoryBlobStore;

    use super::*;

    async fn store_with_chunks() -> (ArtifactStore, Vec<String>) {
        let store = ArtifactStore::for_region(
            Arc::new(MemoryBlobStore::new()),
            "rendergrid",
            "000000000000",
            "us-east-1",
        );
        let mut keys = Vec::new();
        for (i, body) in ["aa", "bb", "cc"].iter().enumerate() {
            let key = format!("renders/job/chunks/{i}");
            store.put_object(&key, Bytes::from(*body)).await.unwrap();
            keys.push(key);
        }
        (store, keys)
    }

    #[tokio::test]
    async fn concat_joins_in_given_order() {
        let (store, mut keys) = store_with_chunks().await;
        keys.swap(0, 2);
        let muxer = ConcatMuxer::new(store.clone());
        let out = muxer.stitch("job", &keys, "renders/job/out.ts").await.unwrap();
        assert_eq!(out, "renders/job/out.ts");
        assert_eq!(store.get_object(&out).await.unwrap(), Bytes::from("ccbbaa"));
    }

    #[tokio::test]
    async fn concat_reports_missing_chunk() {
        let (store, mut keys) = store_with_chunks().await;
        keys.push("renders/job/chunks/missing".to_string());
        let err = ConcatMuxer::new(store)
            .stitch("job", &keys, "renders/job/out.ts")
            .await
            .unwrap_err();
        assert!(matches!(err, StitchError::Store(StoreError::NotFound(_))));
    }

    #[tokio::test]
    async fn empty_input_is_rejected() {
        let (store, _) = store_with_chunks().await;
        let err = ConcatMuxer::new(store).stitch("job", &[], "out").await.unwrap_err();
        assert!(matches!(err, StitchError::Empty));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn command_output_is_stored() {
        let (store, keys) = store_with_chunks().await;
        let muxer = CommandMuxer::new(
            "sh",
            vec!["-c".to_string(), "echo $#".to_string(), "mux".to_string()],
            store.clone(),
        );
        let out = muxer.stitch("job", &keys, "renders/job/out.txt").await.unwrap();
        assert_eq!(store.get_object(&out).await.unwrap(), Bytes::from("3\n"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn command_failure_carries_stderr() {
        let (store, keys) = store_with_chunks().await;
        let muxer = CommandMuxer::new(
            "sh",
            vec!["-c".to_string(), "echo bad input >&2; exit 3".to_string()],
            store,
        );
        let err = muxer.stitch("job", &keys, "out").await.unwrap_err();
        match err {
            StitchError::Command { code, stderr, .. } => {
                assert_eq!(code, Some(3));
                assert_eq!(stderr, "bad input");
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
