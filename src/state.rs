//! Connection lifecycle states.

/// Send-direction lifecycle of a connection.
///
/// ```text
///  Open ──FIN sent──▶ FinSent ──FIN acked──▶ FinAcked ──peer FIN delivered──▶ Closed
/// ```
///
/// The receive direction is tracked independently: the peer's FIN may arrive
/// and be delivered in any of the first three states.  `Closed` is terminal —
/// a connection is dropped as soon as it reports it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    /// Data transfer in progress; our send direction is open.
    Open,
    /// We sent a FIN and are waiting for it to be acknowledged.
    FinSent,
    /// Our FIN (and therefore all of our data) has been acknowledged.
    FinAcked,
    /// Teardown complete or the connection was aborted.
    Closed,
}

impl std::fmt::Display for State {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self:?}")
    }
}
