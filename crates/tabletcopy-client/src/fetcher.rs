//! Pulls one data item from the remote as a sequence of chunks.

use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use tabletcopy_storage::WritableSink;
use tabletcopy_transport::RetryExecutor;

use crate::error::{CopyError, CopyResult};
use crate::messages::{DataId, FetchDataRequest};
use crate::proxy::RemoteBootstrapProxy;
use crate::verifier::verify_chunk;

/// Fetches data items of one session into local sinks.
pub struct ChunkFetcher<'a> {
    proxy: &'a dyn RemoteBootstrapProxy,
    session_id: &'a str,
    max_chunk_size: u64,
    idle_timeout: Duration,
    retry: RetryExecutor,
    cancel: &'a CancellationToken,
    log_prefix: &'a str,
}

impl<'a> ChunkFetcher<'a> {
    /// Creates a fetcher for `session_id`.
    pub fn new(
        proxy: &'a dyn RemoteBootstrapProxy,
        session_id: &'a str,
        max_chunk_size: u64,
        idle_timeout: Duration,
        retry: RetryExecutor,
        cancel: &'a CancellationToken,
        log_prefix: &'a str,
    ) -> Self {
        Self {
            proxy,
            session_id,
            max_chunk_size,
            idle_timeout,
            retry,
            cancel,
            log_prefix,
        }
    }

    /// Downloads `data_id` into `sink` and closes it, returning the number of
    /// bytes written.
    ///
    /// On failure the sink is abandoned: its file is closed and removed, so
    /// nothing partially written survives.
    pub async fn fetch<S>(&self, data_id: &DataId, sink: &mut S) -> CopyResult<u64>
    where
        S: WritableSink + ?Sized,
    {
        match self.download(data_id, sink).await {
            Ok(total) => {
                sink.close()?;
                Ok(total)
            }
            Err(e) => {
                if let Err(abandon_err) = sink.abandon() {
                    warn!(
                        prefix = self.log_prefix,
                        sink = %sink.describe(),
                        error = %abandon_err,
                        "failed to discard partial download"
                    );
                }
                Err(e)
            }
        }
    }

    async fn download<S>(&self, data_id: &DataId, sink: &mut S) -> CopyResult<u64>
    where
        S: WritableSink + ?Sized,
    {
        let mut offset = 0u64;
        let mut expected_total: Option<u64> = None;
        let mut last_call: Option<Instant> = None;
        loop {
            if self.cancel.is_cancelled() {
                return Err(CopyError::Aborted(format!(
                    "download of {} cancelled at offset {}",
                    data_id, offset
                )));
            }
            if let Some(last) = last_call {
                let gap = last.elapsed();
                if gap > self.idle_timeout {
                    warn!(
                        prefix = self.log_prefix,
                        data_id = %data_id,
                        gap_ms = gap.as_millis() as u64,
                        idle_timeout_ms = self.idle_timeout.as_millis() as u64,
                        "gap between chunk requests exceeds session idle timeout"
                    );
                }
            }

            let req = FetchDataRequest {
                session_id: self.session_id.to_string(),
                data_id: data_id.clone(),
                offset,
                max_length: self.max_chunk_size,
            };
            let proxy = self.proxy;
            let resp = self
                .retry
                .execute(|| proxy.fetch_data(req.clone()))
                .await
                .into_result()
                .map_err(|e| CopyError::from_remote(&format!("unable to fetch {}", data_id), e))?;
            last_call = Some(Instant::now());

            let chunk = resp.chunk;
            match expected_total {
                None => expected_total = Some(chunk.total_data_length),
                Some(total) if total != chunk.total_data_length => {
                    return Err(CopyError::DataCorruption(format!(
                        "{}: total length changed from {} to {} at offset {}",
                        data_id, total, chunk.total_data_length, offset
                    )));
                }
                Some(_) => {}
            }
            verify_chunk(data_id, offset, &chunk)?;
            if chunk.data.is_empty() && offset < chunk.total_data_length {
                return Err(CopyError::DataCorruption(format!(
                    "{}: empty chunk at offset {} of {}",
                    data_id, offset, chunk.total_data_length
                )));
            }
            sink.append(&chunk.data)?;
            offset += chunk.data.len() as u64;
            debug!(
                prefix = self.log_prefix,
                data_id = %data_id,
                offset,
                total = chunk.total_data_length,
                "appended chunk"
            );
            if offset >= chunk.total_data_length {
                return Ok(offset);
            }
        }
    }
}
