//! Single-flight command executor.
//!
//! The wire format carries no request ids, so a frame is paired with
//! "the next message" only while its sender holds the execution slot.
//! Every consumed response and every failed attempt is acknowledged.

use probewire_core::frame::ACK;
use probewire_core::{Command, Frame, Response};
use tokio::time::{sleep, timeout, timeout_at, Instant};

use crate::error::{EngineError, TransportError};
use crate::session::{Purpose, Session};
use crate::transport::InboundReceiver;

/// How a frame reaches the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Submission {
    /// Pushed onto the outbound queue for the dispatcher to forward.
    /// Waits for the execution slot.
    Queued,
    /// Sent from the calling task. Never waits for the slot; used by the
    /// dispatcher itself, which cannot drain its own queue.
    Direct,
}

/// Which response ends an attempt successfully.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Expect {
    /// `$OK`.
    Ok,
    /// Any data answer.
    Payload,
    /// A stop-notification.
    Stop,
}

/// One logical request.
#[derive(Debug, Clone)]
pub(crate) struct Request {
    pub(crate) frame: Frame,
    pub(crate) submission: Submission,
    pub(crate) attempts: u32,
    pub(crate) expect: Expect,
    pub(crate) purpose: Purpose,
}

impl Request {
    /// An explicit command, always queued.
    pub(crate) fn command(command: &Command, attempts: u32, expect: Expect) -> Self {
        Self {
            frame: command.frame(),
            submission: Submission::Queued,
            attempts,
            expect,
            purpose: Purpose::Command,
        }
    }

    /// A memory read.
    pub(crate) fn read(command: &Command, submission: Submission, attempts: u32) -> Self {
        Self {
            frame: command.frame(),
            submission,
            attempts,
            expect: Expect::Payload,
            purpose: Purpose::Read,
        }
    }
}

/// How one attempt ended.
enum Answer {
    /// The expected response; still needs its acknowledgment.
    Reply(String),
    /// The awaited stop-notification, already acknowledged.
    Halted(String),
    /// The target's error marker.
    Rejected(String),
    /// Nothing usable inside the response window.
    Silent,
}

impl Session {
    /// Run `request` to completion.
    ///
    /// Returns the message that answered it. Per-attempt timeouts are
    /// retried; once the budget is spent the call fails with
    /// [`EngineError::NoResponse`].
    pub(crate) async fn execute(&self, request: Request) -> Result<String, EngineError> {
        if request.purpose == Purpose::Command && !self.wait_for_read_to_finish().await {
            tracing::warn!(frame = %request.frame, "background read still running");
            return Err(EngineError::Busy);
        }

        let mut inbound = match request.submission {
            Submission::Queued => self.slot.lock().await,
            Submission::Direct => self.slot.try_lock().map_err(|_| EngineError::Busy)?,
        };
        // Declared after the slot guard so the flag drops first.
        let _in_flight = self.flags.begin(request.purpose);

        self.discard_stale(&mut inbound, request.submission);

        for attempt in 1..=request.attempts {
            tracing::debug!(frame = %request.frame, attempt, "submitting");
            match self.submit(&request) {
                Ok(()) => match self.await_answer(&mut inbound, &request).await {
                    Answer::Reply(message) => {
                        self.acknowledge(request.submission);
                        return Ok(message);
                    }
                    Answer::Halted(message) => return Ok(message),
                    Answer::Rejected(response) => {
                        self.acknowledge(request.submission);
                        return Err(EngineError::Protocol {
                            frame: request.frame.to_string(),
                            response,
                        });
                    }
                    Answer::Silent => {}
                },
                Err(e) => {
                    tracing::warn!(frame = %request.frame, attempt, error = %e, "send failed");
                }
            }
            sleep(self.options.retry_backoff).await;
            tracing::debug!(frame = %request.frame, attempt, "acknowledging timeout");
            self.acknowledge(request.submission);
        }

        tracing::warn!(
            frame = %request.frame,
            attempts = request.attempts,
            "no response"
        );
        Err(EngineError::NoResponse {
            frame: request.frame.to_string(),
            attempts: request.attempts,
        })
    }

    /// Wait up to the busy window for a background read to finish.
    async fn wait_for_read_to_finish(&self) -> bool {
        let mut reads = self.flags.watch_reads();
        // The borrowed `Ref` must drop before `reads` does.
        let cleared = matches!(
            timeout(self.options.busy_wait, reads.wait_for(|busy| !*busy)).await,
            Ok(Ok(_))
        );
        cleared
    }

    /// Drop messages left over from earlier requests.
    ///
    /// Stop-notifications among them are still reported.
    pub(crate) fn discard_stale(&self, inbound: &mut InboundReceiver, submission: Submission) {
        for _ in 0..self.options.stale_drain_limit {
            let Ok(message) = inbound.try_recv() else {
                break;
            };
            match Response::classify(&message) {
                Response::Stop(payload) => self.handle_halt(payload, submission),
                _ => tracing::debug!(message = ?message, "discarding stale message"),
            }
        }
    }

    fn submit(&self, request: &Request) -> Result<(), TransportError> {
        match request.submission {
            Submission::Queued => {
                self.outbound.push(request.frame.to_string());
                Ok(())
            }
            Submission::Direct => self.transport.send(request.frame.as_str()),
        }
    }

    /// Emit `+` on the same path the request used.
    pub(crate) fn acknowledge(&self, submission: Submission) {
        match submission {
            Submission::Queued => self.outbound.push(ACK.to_string()),
            Submission::Direct => {
                if let Err(e) = self.transport.send(ACK) {
                    tracing::warn!(error = %e, "acknowledgment not sent");
                }
            }
        }
    }

    async fn await_answer(&self, inbound: &mut InboundReceiver, request: &Request) -> Answer {
        let deadline = Instant::now() + self.options.response_wait;
        loop {
            let message = match timeout_at(deadline, inbound.recv()).await {
                Ok(Some(message)) => message,
                Ok(None) | Err(_) => return Answer::Silent,
            };
            tracing::trace!(message = ?message, "inbound");
            match Response::classify(&message) {
                Response::Stop(payload) => {
                    self.handle_halt(payload, request.submission);
                    if request.expect == Expect::Stop {
                        return Answer::Halted(message);
                    }
                }
                Response::Error => return Answer::Rejected(message),
                Response::Ok if request.expect != Expect::Stop => return Answer::Reply(message),
                Response::Payload(_) if request.expect == Expect::Payload => {
                    return Answer::Reply(message)
                }
                Response::NotReady | Response::Ok | Response::Payload(_) => {
                    tracing::debug!(frame = %request.frame, message = ?message, "not answered");
                    return Answer::Silent;
                }
            }
        }
    }
}
