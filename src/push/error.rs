use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushStep {
    WorkerRegistration,
    PlatformSubscribe,
    ServerRegistration,
}

impl fmt::Display for PushStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            PushStep::WorkerRegistration => "worker registration",
            PushStep::PlatformSubscribe => "platform subscribe",
            PushStep::ServerRegistration => "server registration",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum PushError {
    #[error("push messaging is not supported on this platform")]
    UnsupportedPlatform,
    #[error("push subscription failed at {step}: {message}")]
    Subscription { step: PushStep, message: String },
}

impl PushError {
    pub fn at(step: PushStep, err: impl fmt::Display) -> Self {
        PushError::Subscription {
            step,
            message: err.to_string(),
        }
    }

    pub fn step(&self) -> Option<PushStep> {
        match self {
            PushError::UnsupportedPlatform => None,
            PushError::Subscription { step, .. } => Some(*step),
        }
    }
}
