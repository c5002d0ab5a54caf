use ulid::Ulid;

#[derive(Debug)]
pub enum EngineError {
    /// ID-addressed row absent.
    NotFound(Ulid),
    /// Malformed window or equipment field outside its bounds.
    Validation(&'static str),
    /// Equipment still has reservations that have not ended.
    HasLiveReservations(Ulid),
    /// The operation's deadline expired before it could commit.
    Timeout(&'static str),
    /// The durable store failed; `op` names the operation that hit it.
    Store { op: &'static str, reason: String },
}

impl EngineError {
    pub(crate) fn store(op: &'static str, reason: impl std::fmt::Display) -> Self {
        EngineError::Store {
            op,
            reason: reason.to_string(),
        }
    }
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::NotFound(id) => write!(f, "not found: {id}"),
            EngineError::Validation(msg) => write!(f, "validation failed: {msg}"),
            EngineError::HasLiveReservations(id) => {
                write!(f, "cannot delete equipment {id}: has live reservations")
            }
            EngineError::Timeout(op) => write!(f, "{op}: deadline exceeded"),
            EngineError::Store { op, reason } => write!(f, "{op}: store error: {reason}"),
        }
    }
}

impl std::error::Error for EngineError {}
