pub mod driver;
pub mod mailbox;
pub mod payload;
pub mod relay;

use thiserror::Error;

use crate::engine::EngineError;
use crate::input::InputError;
use crate::model::store::StoreError;
use crate::numeric::NumericError;
use crate::output::OutputError;

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("payload is truncated")]
    Truncated,
    #[error("payload has a bad magic header")]
    BadMagic,
    #[error("unknown payload kind {0}")]
    UnknownKind(u8),
    #[error("payload has trailing bytes after its body")]
    TrailingBytes,
    #[error("expected a {expected} payload, received {received}")]
    UnexpectedPayload {
        expected: &'static str,
        received: &'static str,
    },
    #[error("expected {expected} payloads at the aggregation barrier, received {received}")]
    UnexpectedPayloadCount { expected: usize, received: usize },
    #[error("run cancelled by the host")]
    Cancelled,
}

/// The state of one normalization run. All sites walk the same progression;
/// the coordinator takes the aggregation branches, plain participants the
/// waiting branches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Init,
    ReadInput,
    LocalCompute,
    WaitFirst,
    GlobalAggregate,
    LocalResult,
    WaitSecond,
    GlobalResultAggregate,
    SetLocalResult,
    WriteResults,
    Finish,
}

impl Phase {
    pub fn name(self) -> &'static str {
        match self {
            Phase::Init => "initializing",
            Phase::ReadInput => "read input",
            Phase::LocalCompute => "local computation",
            Phase::WaitFirst => "wait for aggregation",
            Phase::GlobalAggregate => "global aggregation",
            Phase::LocalResult => "local result computation",
            Phase::WaitSecond => "wait for second aggregation",
            Phase::GlobalResultAggregate => "global result computation",
            Phase::SetLocalResult => "set local result",
            Phase::WriteResults => "writing results",
            Phase::Finish => "finishing",
        }
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Error)]
pub enum RunErrorKind {
    #[error(transparent)]
    Input(#[from] InputError),
    #[error(transparent)]
    Numeric(#[from] NumericError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
    #[error(transparent)]
    Output(#[from] OutputError),
}

impl From<EngineError> for RunErrorKind {
    fn from(value: EngineError) -> Self {
        match value {
            EngineError::Numeric(e) => RunErrorKind::Numeric(e),
            EngineError::Store(e) => RunErrorKind::Store(e),
            EngineError::Input(msg) => RunErrorKind::Input(InputError::InvalidInput(msg)),
        }
    }
}

/// A failure wrapped with the phase it occurred in.
#[derive(Debug, Error)]
#[error("{phase}: {kind}")]
pub struct RunError {
    pub phase: &'static str,
    pub kind: RunErrorKind,
}

impl RunError {
    pub fn new(phase: Phase, kind: impl Into<RunErrorKind>) -> Self {
        Self {
            phase: phase.name(),
            kind: kind.into(),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self.kind, RunErrorKind::Protocol(ProtocolError::Cancelled))
    }
}
