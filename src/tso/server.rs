// Copyright 2025 Ojima Abraham
// SPDX-License-Identifier: Apache-2.0

//! The single-threaded decider loop and its client handle.

use std::sync::Arc;
use std::thread;

use crossbeam_channel::{unbounded, Sender};
use tokio::sync::oneshot;
use tracing::info;

use crate::storage::{CommitTable, StorageError, TimestampStorage};

use super::cache::CommitCache;
use super::config::TsoConfig;
use super::decider::CommitDecider;
use super::messages::{
    CommitRequest, CommitResponse, CompleteAbort, CompleteReincarnation, MultiCommitRequest,
    PrepareCommit, PrepareResponse, TimestampRequest, TimestampResponse, TsoRequest, TsoResponse,
};
use super::oracle::BatchTimestampOracle;
use super::panicker::Panicker;
use super::timestamp::{Timestamp, NO_TIMESTAMP};

/// Transport-level failures talking to a status-oracle partition.
#[derive(Debug, thiserror::Error)]
pub enum TsoError {
    #[error("status oracle unavailable")]
    Disconnected,

    #[error("unexpected response type from status oracle")]
    UnexpectedResponse,
}

struct Envelope {
    request: TsoRequest,
    reply: Option<oneshot::Sender<TsoResponse>>,
}

/// One status-oracle partition: oracle, conflict cache and decider running on
/// a dedicated thread that drains a serialized request queue.
///
/// All mutations of the cache and the low-watermark happen on that thread;
/// the in-memory decision path never blocks, and the only blocking operation
/// in the loop is the commit-table publish.
pub struct TsoServer;

impl TsoServer {
    /// Builds the partition's oracle and decider and starts the decider
    /// thread. The returned handle is the only way in; the thread exits when
    /// every handle is dropped.
    pub fn spawn(
        config: TsoConfig,
        storage: Arc<dyn TimestampStorage>,
        commit_table: Arc<dyn CommitTable>,
        panicker: Arc<dyn Panicker>,
    ) -> Result<TsoHandle, StorageError> {
        let oracle = BatchTimestampOracle::new(
            config.timestamp_batch,
            config.allocation_threshold,
            storage,
            panicker,
        )?;
        let cache = CommitCache::new(config.cache_sets, config.cache_ways);
        let mut decider = CommitDecider::new(oracle, cache, commit_table);

        let partition_index = config.partition_index;
        let (requests, queue) = unbounded::<Envelope>();

        thread::Builder::new()
            .name(format!("tso-decider-{partition_index}"))
            .spawn(move || {
                info!(partition_index, "status oracle partition started");
                for Envelope { request, reply } in queue.iter() {
                    let response = handle(&mut decider, partition_index, request);
                    if let (Some(reply), Some(response)) = (reply, response) {
                        // A dropped receiver means the client gave up on the
                        // request; it resolves through the commit table.
                        let _ = reply.send(response);
                    }
                }
                info!(partition_index, "status oracle partition stopped");
            })
            .expect("failed to spawn tso-decider thread");

        Ok(TsoHandle { requests })
    }
}

fn handle(
    decider: &mut CommitDecider,
    partition_index: usize,
    request: TsoRequest,
) -> Option<TsoResponse> {
    match request {
        TsoRequest::Timestamp(TimestampRequest { .. }) => {
            Some(TsoResponse::Timestamp(TimestampResponse {
                timestamp: decider.timestamp(),
            }))
        }
        TsoRequest::Commit(CommitRequest {
            start_ts,
            writes,
            reads,
        }) => Some(TsoResponse::Commit(
            decider.commit(start_ts, &writes, &reads).into(),
        )),
        TsoRequest::Prepare(PrepareCommit {
            start_ts,
            writes,
            reads,
            ..
        }) => Some(TsoResponse::Prepare(PrepareResponse {
            committed: decider.prepare(start_ts, writes, &reads),
        })),
        TsoRequest::MultiCommit(MultiCommitRequest {
            vts,
            successful_prepared,
        }) => {
            let start_ts = vts.get(partition_index).copied().unwrap_or(NO_TIMESTAMP);
            Some(TsoResponse::Commit(
                decider.multi_commit(start_ts, successful_prepared).into(),
            ))
        }
        TsoRequest::CompleteAbort(CompleteAbort { start_ts }) => {
            decider.complete_abort(start_ts);
            None
        }
        TsoRequest::CompleteReincarnation(CompleteReincarnation { start_ts }) => {
            decider.complete_reincarnation(start_ts);
            None
        }
    }
}

/// Cloneable client end of a partition's request queue.
#[derive(Clone)]
pub struct TsoHandle {
    requests: Sender<Envelope>,
}

impl TsoHandle {
    pub(crate) fn request(
        &self,
        request: TsoRequest,
    ) -> Result<oneshot::Receiver<TsoResponse>, TsoError> {
        let (reply, response) = oneshot::channel();
        self.requests
            .send(Envelope {
                request,
                reply: Some(reply),
            })
            .map_err(|_| TsoError::Disconnected)?;
        Ok(response)
    }

    fn notify(&self, request: TsoRequest) {
        let _ = self.requests.send(Envelope {
            request,
            reply: None,
        });
    }

    /// Requests a start timestamp.
    pub async fn timestamp(
        &self,
        client_id: u64,
        sequence: Option<u64>,
    ) -> Result<Timestamp, TsoError> {
        let response = self
            .request(TsoRequest::Timestamp(TimestampRequest {
                client_id,
                sequence,
            }))?
            .await
            .map_err(|_| TsoError::Disconnected)?;
        match response {
            TsoResponse::Timestamp(TimestampResponse { timestamp }) => Ok(timestamp),
            _ => Err(TsoError::UnexpectedResponse),
        }
    }

    /// Sends a single-partition commit request.
    pub async fn commit(&self, request: CommitRequest) -> Result<CommitResponse, TsoError> {
        let response = self
            .request(TsoRequest::Commit(request))?
            .await
            .map_err(|_| TsoError::Disconnected)?;
        match response {
            TsoResponse::Commit(response) => Ok(response),
            _ => Err(TsoError::UnexpectedResponse),
        }
    }

    /// Sends one partition's prepare for a global commit.
    pub async fn prepare(&self, request: PrepareCommit) -> Result<PrepareResponse, TsoError> {
        let response = self
            .request(TsoRequest::Prepare(request))?
            .await
            .map_err(|_| TsoError::Disconnected)?;
        match response {
            TsoResponse::Prepare(response) => Ok(response),
            _ => Err(TsoError::UnexpectedResponse),
        }
    }

    /// Reports completed abort cleanup. Fire-and-forget.
    pub fn complete_abort(&self, start_ts: Timestamp) {
        self.notify(TsoRequest::CompleteAbort(CompleteAbort { start_ts }));
    }

    /// Reports completed reincarnation. Fire-and-forget.
    pub fn complete_reincarnation(&self, start_ts: Timestamp) {
        self.notify(TsoRequest::CompleteReincarnation(CompleteReincarnation {
            start_ts,
        }));
    }
}
