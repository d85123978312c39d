// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Worker pool that executes driver invocations
//!
//! All workers share one driver instance and pull from one queue, so
//! whichever worker is free takes the next request (competing consumers).
//! A supervisor task watches the pool and replaces any worker that panics
//! (which would take a driver bug), keeping the pool at full strength.

use slog::Logger;
use std::sync::Arc;
use tokio::sync::oneshot;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use vimdriver_common::api::Error;
use vimdriver_common::api::InvocationRequest;
use vimdriver_common::api::InvocationResponse;

use crate::dispatch;
use crate::driver::VimDriver;

/// One enqueued invocation: the request plus the channel its response goes
/// back on
///
/// Dropping the receiving half tells the worker the caller is gone; the
/// worker then abandons the invocation instead of computing a response
/// nobody will read.
pub struct QueuedRequest {
    pub request: InvocationRequest,
    pub reply: oneshot::Sender<InvocationResponse>,
}

/// Handle on a running pool of invocation workers
pub struct WorkerPool {
    shutdown: CancellationToken,
    drained: CancellationToken,
    supervisor: tokio::task::JoinHandle<()>,
}

impl WorkerPool {
    /// Start `nworkers` workers feeding from `queue`
    pub fn start(
        driver: Arc<dyn VimDriver>,
        queue: flume::Receiver<QueuedRequest>,
        nworkers: usize,
        log: Logger,
    ) -> WorkerPool {
        let shutdown = CancellationToken::new();
        let drained = CancellationToken::new();
        let supervisor = tokio::spawn(supervise(
            driver,
            queue,
            nworkers,
            shutdown.clone(),
            drained.clone(),
            log,
        ));
        WorkerPool { shutdown, drained, supervisor }
    }

    /// Token cancelled once no queued request can receive a response anymore
    ///
    /// After this fires, a reply channel that has not yet produced a
    /// response never will, and callers still holding one should report
    /// unavailability.
    pub fn drained_token(&self) -> CancellationToken {
        self.drained.clone()
    }

    /// Stop the workers and wait for them to wind down
    ///
    /// Requests still in flight and requests still sitting in the queue are
    /// both answered with a `Cancelled` fault.
    pub async fn shutdown(self) {
        self.shutdown.cancel();
        let _ = self.supervisor.await;
    }
}

async fn supervise(
    driver: Arc<dyn VimDriver>,
    queue: flume::Receiver<QueuedRequest>,
    nworkers: usize,
    shutdown: CancellationToken,
    drained: CancellationToken,
    log: Logger,
) {
    let mut workers = JoinSet::new();
    for worker_id in 0..nworkers {
        spawn_worker(&mut workers, worker_id, &driver, &queue, &shutdown, &log);
    }

    let mut next_worker_id = nworkers;
    while let Some(joined) = workers.join_next().await {
        match joined {
            Ok(worker_id) => {
                debug!(log, "worker exited"; "worker_id" => worker_id);
            }
            Err(error) if error.is_panic() && !shutdown.is_cancelled() => {
                // The worker dropped its reply channel when it unwound, so
                // the caller whose request hit the bug sees the transport
                // report unavailability rather than hanging.
                warn!(log, "worker panicked; starting a replacement";
                    "error" => %error,
                    "replacement_worker_id" => next_worker_id,
                );
                spawn_worker(
                    &mut workers,
                    next_worker_id,
                    &driver,
                    &queue,
                    &shutdown,
                    &log,
                );
                next_worker_id += 1;
            }
            Err(error) => {
                debug!(log, "worker task failed during shutdown";
                    "error" => %error);
            }
        }
    }
    // Catch anything the workers did not get to, including requests a
    // panicking worker left behind. The receiver must be gone before the
    // drained token fires so that a send racing with this drain is either
    // refused outright or crosses after the token, never silently stranded.
    drain_queue(&queue, &log);
    drop(queue);
    drained.cancel();
    info!(log, "all workers stopped");
}

/// Answer everything still sitting in `queue` with a `Cancelled` fault
fn drain_queue(queue: &flume::Receiver<QueuedRequest>, log: &Logger) {
    while let Ok(QueuedRequest { request, reply }) = queue.try_recv() {
        info!(log, "request cancelled before reaching a worker";
            "operation" => &request.operation,
            "correlation_id" => %request.correlation_id,
        );
        let response = InvocationResponse::fault(
            request.correlation_id,
            Error::Cancelled,
        );
        let _ = reply.send(response);
    }
}

fn spawn_worker(
    workers: &mut JoinSet<usize>,
    worker_id: usize,
    driver: &Arc<dyn VimDriver>,
    queue: &flume::Receiver<QueuedRequest>,
    shutdown: &CancellationToken,
    log: &Logger,
) {
    workers.spawn(worker_loop(
        worker_id,
        driver.clone(),
        queue.clone(),
        shutdown.clone(),
        log.new(o!("worker_id" => worker_id)),
    ));
}

async fn worker_loop(
    worker_id: usize,
    driver: Arc<dyn VimDriver>,
    queue: flume::Receiver<QueuedRequest>,
    shutdown: CancellationToken,
    log: Logger,
) -> usize {
    debug!(log, "worker started");
    loop {
        let queued = tokio::select! {
            _ = shutdown.cancelled() => {
                drain_queue(&queue, &log);
                break;
            }
            recv = queue.recv_async() => match recv {
                Ok(queued) => queued,
                // The sender side is gone: the server is being torn down.
                Err(flume::RecvError::Disconnected) => break,
            },
        };
        handle_request(&*driver, queued, &shutdown, &log).await;
    }
    debug!(log, "worker stopping");
    worker_id
}

async fn handle_request(
    driver: &dyn VimDriver,
    queued: QueuedRequest,
    shutdown: &CancellationToken,
    log: &Logger,
) {
    let QueuedRequest { request, mut reply } = queued;
    debug!(log, "request dequeued";
        "operation" => &request.operation,
        "correlation_id" => %request.correlation_id,
    );
    let response = tokio::select! {
        _ = reply.closed() => {
            info!(log, "request abandoned by caller";
                "operation" => &request.operation,
                "correlation_id" => %request.correlation_id,
            );
            return;
        }
        _ = shutdown.cancelled() => {
            InvocationResponse::fault(request.correlation_id, Error::Cancelled)
        }
        response = dispatch::dispatch(driver, &request) => response,
    };
    debug!(log, "request complete";
        "operation" => &request.operation,
        "correlation_id" => %request.correlation_id,
        "status" => ?response.status,
    );
    if reply.send(response).is_err() {
        info!(log, "caller went away before the response was ready";
            "operation" => &request.operation,
            "correlation_id" => %request.correlation_id,
        );
    }
}
