use thiserror::Error;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum SessionError {
    #[error("A trace session is already running")]
    AlreadyRunning,

    #[error("The CPU must be paused before it can be stepped")]
    NotStepping,
}

/// At most one recording or auto-step runs at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Session {
    #[default]
    Idle,
    Running,
}

impl Session {
    pub fn begin(&mut self) -> Result<(), SessionError> {
        match self {
            Self::Idle => {
                *self = Self::Running;
                Ok(())
            }
            Self::Running => Err(SessionError::AlreadyRunning),
        }
    }

    pub fn end(&mut self) {
        *self = Self::Idle;
    }

    pub fn is_running(&self) -> bool {
        *self == Self::Running
    }
}
