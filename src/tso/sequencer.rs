// Copyright 2025 Ojima Abraham
// SPDX-License-Identifier: Apache-2.0

//! The sequencer: one total order for global transactions.

use std::thread;

use crossbeam_channel::{unbounded, Sender};
use tokio::sync::oneshot;
use tracing::info;

use super::messages::{
    CommitResponse, MultiCommitRequest, TimestampRequest, TsoRequest, TsoResponse,
};
use super::server::{TsoError, TsoHandle};
use super::timestamp::Timestamp;

enum SequencerRequest {
    GlobalTimestamps {
        client_id: u64,
        sequence: u64,
        reply: oneshot::Sender<Result<Vec<Timestamp>, TsoError>>,
    },
    GlobalCommit {
        request: MultiCommitRequest,
        reply: oneshot::Sender<Result<Vec<CommitResponse>, TsoError>>,
    },
}

/// Broadcasts global-transaction requests to every partition under a single
/// total order.
///
/// The sequencer owns one handle per partition and services its queue one
/// request at a time, so every partition queue receives global begins and
/// commit vectors in the same relative order. That shared order is what makes
/// all partitions decide a global transaction the same way.
pub struct Sequencer;

impl Sequencer {
    /// Starts the sequencer thread over the partitions, in partition order.
    ///
    /// The thread carries its own single-threaded runtime: each broadcast
    /// enqueues on every partition and then awaits the per-request
    /// completion tokens, the same way [`TsoHandle`]'s request methods do.
    pub fn spawn(partitions: Vec<TsoHandle>) -> SequencerHandle {
        let (requests, queue) = unbounded::<SequencerRequest>();

        thread::Builder::new()
            .name("sequencer".into())
            .spawn(move || {
                let runtime = tokio::runtime::Builder::new_current_thread()
                    .build()
                    .expect("failed to build sequencer runtime");
                info!(partitions = partitions.len(), "sequencer started");
                for request in queue.iter() {
                    match request {
                        SequencerRequest::GlobalTimestamps {
                            client_id,
                            sequence,
                            reply,
                        } => {
                            let vts = runtime.block_on(broadcast_timestamps(
                                &partitions,
                                client_id,
                                sequence,
                            ));
                            let _ = reply.send(vts);
                        }
                        SequencerRequest::GlobalCommit { request, reply } => {
                            let responses =
                                runtime.block_on(broadcast_commit(&partitions, request));
                            let _ = reply.send(responses);
                        }
                    }
                }
            })
            .expect("failed to spawn sequencer thread");

        SequencerHandle { requests }
    }
}

async fn broadcast_timestamps(
    partitions: &[TsoHandle],
    client_id: u64,
    sequence: u64,
) -> Result<Vec<Timestamp>, TsoError> {
    // Enqueue on every partition before waiting on any, so the partitions
    // allocate concurrently.
    let pending = partitions
        .iter()
        .map(|partition| {
            partition.request(TsoRequest::Timestamp(TimestampRequest {
                client_id,
                sequence: Some(sequence),
            }))
        })
        .collect::<Result<Vec<_>, _>>()?;

    let mut vts = Vec::with_capacity(pending.len());
    for response in pending {
        match response.await {
            Ok(TsoResponse::Timestamp(response)) => vts.push(response.timestamp),
            Ok(_) => return Err(TsoError::UnexpectedResponse),
            Err(_) => return Err(TsoError::Disconnected),
        }
    }
    Ok(vts)
}

async fn broadcast_commit(
    partitions: &[TsoHandle],
    request: MultiCommitRequest,
) -> Result<Vec<CommitResponse>, TsoError> {
    let pending = partitions
        .iter()
        .map(|partition| partition.request(TsoRequest::MultiCommit(request.clone())))
        .collect::<Result<Vec<_>, _>>()?;

    let mut responses = Vec::with_capacity(pending.len());
    for response in pending {
        match response.await {
            Ok(TsoResponse::Commit(response)) => responses.push(response),
            Ok(_) => return Err(TsoError::UnexpectedResponse),
            Err(_) => return Err(TsoError::Disconnected),
        }
    }
    Ok(responses)
}

/// Cloneable client end of the sequencer queue.
#[derive(Clone)]
pub struct SequencerHandle {
    requests: Sender<SequencerRequest>,
}

impl SequencerHandle {
    /// Obtains one start timestamp from every partition under `sequence`.
    pub async fn global_timestamps(
        &self,
        client_id: u64,
        sequence: u64,
    ) -> Result<Vec<Timestamp>, TsoError> {
        let (reply, response) = oneshot::channel();
        self.requests
            .send(SequencerRequest::GlobalTimestamps {
                client_id,
                sequence,
                reply,
            })
            .map_err(|_| TsoError::Disconnected)?;
        response.await.map_err(|_| TsoError::Disconnected)?
    }

    /// Broadcasts the commit vector; returns each partition's decision in
    /// partition order.
    pub async fn global_commit(
        &self,
        request: MultiCommitRequest,
    ) -> Result<Vec<CommitResponse>, TsoError> {
        let (reply, response) = oneshot::channel();
        self.requests
            .send(SequencerRequest::GlobalCommit { request, reply })
            .map_err(|_| TsoError::Disconnected)?;
        response.await.map_err(|_| TsoError::Disconnected)?
    }
}
