//! The state machine that drives one normalization run on one site. All
//! sites walk the same phase progression; the coordinator is itself a
//! participant that additionally owns the aggregator and the fan-in barrier.

use std::time::{Duration, Instant};

use tracing::info;

use crate::config::Mode;
use crate::engine::aggregate::CoordinatorAggregator;
use crate::engine::{quantile, upper_quartile};
use crate::input::MatrixSource;
use crate::model::store::{LocalMeans, ParticipantStore};
use crate::output::{NormalizedResult, ResultSink};
use crate::protocol::mailbox::Mailbox;
use crate::protocol::payload::Payload;
use crate::protocol::{Phase, ProtocolError, RunError};

#[derive(Debug, Clone)]
pub struct DriverParams {
    /// Sleep between inbox checks while suspended on a barrier.
    pub poll_interval: Duration,
    /// How long the coordinator lets its final broadcast drain before it
    /// marks the run finished.
    pub finish_grace: Duration,
}

impl Default for DriverParams {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(1),
            finish_grace: Duration::from_secs(10),
        }
    }
}

/// Role is assigned by the host platform, never chosen by the driver.
#[derive(Debug)]
pub enum Role {
    Participant,
    Coordinator {
        /// Total number of sites in the federation, this one included.
        sites: usize,
        aggregator: CoordinatorAggregator,
    },
}

impl Role {
    pub fn coordinator(sites: usize) -> Self {
        Role::Coordinator {
            sites,
            aggregator: CoordinatorAggregator,
        }
    }

    pub fn is_coordinator(&self) -> bool {
        matches!(self, Role::Coordinator { .. })
    }
}

pub struct ProtocolDriver {
    role: Role,
    mode: Mode,
    params: DriverParams,
    mailbox: Mailbox,
}

impl ProtocolDriver {
    pub fn new(mode: Mode, role: Role, params: DriverParams) -> Self {
        Self {
            role,
            mode,
            params,
            mailbox: Mailbox::new(),
        }
    }

    /// The handle the host platform uses to feed and drain this site.
    pub fn mailbox(&self) -> Mailbox {
        self.mailbox.clone()
    }

    pub fn run(
        &mut self,
        source: &dyn MatrixSource,
        sink: &mut dyn ResultSink,
    ) -> Result<(), RunError> {
        let outcome = self.run_inner(source, sink);
        if let Err(err) = &outcome {
            self.mailbox.mark_failed();
            sink.report_failure(err);
        }
        self.mailbox.mark_finished();
        outcome
    }

    fn run_inner(
        &mut self,
        source: &dyn MatrixSource,
        sink: &mut dyn ResultSink,
    ) -> Result<(), RunError> {
        info!(
            mode = %self.mode,
            coordinator = self.role.is_coordinator(),
            "initializing"
        );
        self.check_cancel(Phase::Init)?;

        let bundle = source
            .load()
            .map_err(|e| RunError::new(Phase::ReadInput, e))?;
        let mut store = ParticipantStore::new(bundle);
        info!(
            n_genes = store.matrix.n_rows(),
            n_samples = store.matrix.n_cols(),
            "read input"
        );
        self.check_cancel(Phase::ReadInput)?;

        let phase = Phase::LocalCompute;
        let payload = match self.mode {
            Mode::Quantile => {
                quantile::compute_local_means(&mut store)
                    .map_err(|e| RunError::new(phase, e))?;
                Payload::QLocalMeans(
                    store
                        .local_means
                        .get()
                        .map_err(|e| RunError::new(phase, e))?
                        .clone(),
                )
            }
            Mode::UpperQuartile => {
                upper_quartile::compute_local_zeros(&mut store)
                    .map_err(|e| RunError::new(phase, e))?;
                Payload::UqLocalZeros(
                    store
                        .local_zeros
                        .get()
                        .map_err(|e| RunError::new(phase, e))?
                        .clone(),
                )
            }
        };
        self.dispatch_round(payload);
        self.check_cancel(phase)?;

        match &self.role {
            Role::Coordinator { sites, aggregator } => {
                let phase = Phase::GlobalAggregate;
                let payloads = self.wait_for_inbox(phase, *sites)?;
                match self.mode {
                    Mode::Quantile => {
                        let mut means = Vec::with_capacity(payloads.len());
                        for payload in payloads {
                            means.push(expect_local_means(phase, payload)?);
                        }
                        let global = aggregator
                            .global_means(&means)
                            .map_err(|e| RunError::new(phase, e))?;
                        store
                            .global_means
                            .set(global.clone())
                            .map_err(|e| RunError::new(phase, e))?;
                        info!("broadcasting the global means");
                        self.mailbox
                            .enqueue_outgoing(Payload::QGlobalMeans(global).encode());
                    }
                    Mode::UpperQuartile => {
                        let mut zeros = Vec::with_capacity(payloads.len());
                        for payload in payloads {
                            zeros.push(expect_local_zeros(phase, payload)?);
                        }
                        let global = aggregator.global_zeros(&zeros);
                        store
                            .global_zeros
                            .set(global.clone())
                            .map_err(|e| RunError::new(phase, e))?;
                        info!(rows = global.len(), "broadcasting the global zero rows");
                        self.mailbox
                            .enqueue_outgoing(Payload::UqGlobalZeros(global).encode());
                    }
                }
            }
            Role::Participant => {
                let phase = Phase::WaitFirst;
                let payload = self.receive_one(phase)?;
                match (self.mode, payload) {
                    (Mode::Quantile, Payload::QGlobalMeans(global)) => {
                        info!("received the global means from the coordinator");
                        store
                            .global_means
                            .set(global)
                            .map_err(|e| RunError::new(phase, e))?;
                    }
                    (Mode::UpperQuartile, Payload::UqGlobalZeros(global)) => {
                        info!("received the global zero rows from the coordinator");
                        store
                            .global_zeros
                            .set(global)
                            .map_err(|e| RunError::new(phase, e))?;
                    }
                    (Mode::Quantile, other) => {
                        return Err(unexpected(phase, "global means", &other));
                    }
                    (Mode::UpperQuartile, other) => {
                        return Err(unexpected(phase, "global zero rows", &other));
                    }
                }
            }
        }
        self.check_cancel(Phase::LocalResult)?;

        match self.mode {
            Mode::Quantile => {
                quantile::compute_local_result(&mut store)
                    .map_err(|e| RunError::new(Phase::LocalResult, e))?;
            }
            Mode::UpperQuartile => {
                let phase = Phase::LocalResult;
                upper_quartile::compute_uquartile(&mut store)
                    .map_err(|e| RunError::new(phase, e))?;
                let payload = Payload::UqLocalFactors(
                    store
                        .uquartile
                        .get()
                        .map_err(|e| RunError::new(phase, e))?
                        .clone(),
                );
                self.dispatch_round(payload);
                self.check_cancel(phase)?;

                match &self.role {
                    Role::Coordinator { sites, aggregator } => {
                        let phase = Phase::GlobalResultAggregate;
                        let payloads = self.wait_for_inbox(phase, *sites)?;
                        let mut concatenated = Vec::new();
                        for payload in payloads {
                            concatenated.extend(expect_local_factors(phase, payload)?);
                        }
                        let factor = aggregator
                            .global_scaling_factor(&concatenated)
                            .map_err(|e| RunError::new(phase, e))?;
                        store
                            .scaling_factor
                            .set(factor)
                            .map_err(|e| RunError::new(phase, e))?;
                        info!(factor, "broadcasting the scaling factor");
                        self.mailbox
                            .enqueue_outgoing(Payload::UqScalingFactor(factor).encode());
                    }
                    Role::Participant => {
                        let phase = Phase::WaitSecond;
                        match self.receive_one(phase)? {
                            Payload::UqScalingFactor(factor) => {
                                info!(factor, "received the scaling factor");
                                store
                                    .scaling_factor
                                    .set(factor)
                                    .map_err(|e| RunError::new(phase, e))?;
                            }
                            other => return Err(unexpected(phase, "scaling factor", &other)),
                        }
                    }
                }
                upper_quartile::compute_local_result(&mut store)
                    .map_err(|e| RunError::new(Phase::SetLocalResult, e))?;
            }
        }
        self.check_cancel(Phase::WriteResults)?;

        let phase = Phase::WriteResults;
        let (norm_factors, scaling_factor) = match self.mode {
            Mode::Quantile => (None, None),
            Mode::UpperQuartile => (
                Some(
                    store
                        .normfac
                        .get()
                        .map_err(|e| RunError::new(phase, e))?
                        .as_slice(),
                ),
                Some(
                    *store
                        .scaling_factor
                        .get()
                        .map_err(|e| RunError::new(phase, e))?,
                ),
            ),
        };
        let result = NormalizedResult {
            matrix: store.result.get().map_err(|e| RunError::new(phase, e))?,
            sample_names: store.sample_names.as_deref(),
            gene_names: store.gene_names.as_deref(),
            norm_factors,
            scaling_factor,
        };
        sink.write_result(&result)
            .map_err(|e| RunError::new(phase, e))?;
        info!("results written");

        if self.role.is_coordinator() {
            // Let the final broadcast drain before declaring the run done.
            let deadline = Instant::now() + self.params.finish_grace;
            let nap = self.params.poll_interval.min(Duration::from_millis(100));
            while self.mailbox.outgoing_len() > 0 && Instant::now() < deadline {
                if self.mailbox.is_cancelled() {
                    break;
                }
                std::thread::sleep(nap);
            }
        }
        info!("{}", Phase::Finish);
        Ok(())
    }

    fn check_cancel(&self, phase: Phase) -> Result<(), RunError> {
        if self.mailbox.is_cancelled() {
            return Err(RunError::new(phase, ProtocolError::Cancelled));
        }
        Ok(())
    }

    /// Local payload leaves the site: participants enqueue it for the
    /// coordinator; the coordinator appends it to its own inbox ahead of the
    /// barrier check so it never deadlocks on itself.
    fn dispatch_round(&self, payload: Payload) {
        let bytes = payload.encode();
        if self.role.is_coordinator() {
            self.mailbox.handle_incoming(bytes);
        } else {
            info!(payload = payload.kind_name(), "sending to the coordinator");
            self.mailbox.enqueue_outgoing(bytes);
        }
    }

    /// Timed poll until the inbox holds `needed` payloads, then drain and
    /// decode all of them. The inbox is cleared before the state transition.
    fn wait_for_inbox(&self, phase: Phase, needed: usize) -> Result<Vec<Payload>, RunError> {
        loop {
            self.check_cancel(phase)?;
            if self.mailbox.inbox_len() >= needed {
                let raw = self.mailbox.drain_inbox();
                if raw.len() != needed {
                    return Err(RunError::new(
                        phase,
                        ProtocolError::UnexpectedPayloadCount {
                            expected: needed,
                            received: raw.len(),
                        },
                    ));
                }
                let mut payloads = Vec::with_capacity(raw.len());
                for bytes in raw {
                    payloads.push(Payload::decode(&bytes).map_err(|e| RunError::new(phase, e))?);
                }
                return Ok(payloads);
            }
            std::thread::sleep(self.params.poll_interval);
        }
    }

    fn receive_one(&self, phase: Phase) -> Result<Payload, RunError> {
        let mut payloads = self.wait_for_inbox(phase, 1)?;
        payloads.pop().ok_or_else(|| {
            RunError::new(
                phase,
                ProtocolError::UnexpectedPayloadCount {
                    expected: 1,
                    received: 0,
                },
            )
        })
    }
}

fn unexpected(phase: Phase, expected: &'static str, received: &Payload) -> RunError {
    RunError::new(
        phase,
        ProtocolError::UnexpectedPayload {
            expected,
            received: received.kind_name(),
        },
    )
}

fn expect_local_means(phase: Phase, payload: Payload) -> Result<LocalMeans, RunError> {
    match payload {
        Payload::QLocalMeans(means) => Ok(means),
        other => Err(unexpected(phase, "local means", &other)),
    }
}

fn expect_local_zeros(phase: Phase, payload: Payload) -> Result<Vec<u64>, RunError> {
    match payload {
        Payload::UqLocalZeros(zeros) => Ok(zeros),
        other => Err(unexpected(phase, "local zero rows", &other)),
    }
}

fn expect_local_factors(phase: Phase, payload: Payload) -> Result<Vec<f64>, RunError> {
    match payload {
        Payload::UqLocalFactors(factors) => Ok(factors),
        other => Err(unexpected(phase, "local upper quartile factors", &other)),
    }
}

#[cfg(test)]
#[path = "../../tests/src_inline/protocol/driver.rs"]
mod tests;
