//! Component B's retry policy as an explicit state machine, instead of
//! control-flow on mutable flags (§9: "Coroutine-less retry loop").

use std::time::Duration;

/// How a failed statement's sqlstate should be handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Data, serialisation, syntax or pl/pgsql `RAISE` error. Surface it,
    /// never retry.
    QueryError,
    /// Anything else, including the `22000` first-attempt special case.
    /// Probe the connection, reconnect if needed, and retry once.
    PossiblyConnectionLevel,
}

/// Classifies a sqlstate per §4.B. `attempt` is 1 for the first try, 2 for
/// the retry; the `22000` exception only applies on the first attempt.
pub fn classify(sqlstate: &str, attempt: u8) -> Disposition {
    if attempt == 1 && sqlstate == "22000" {
        return Disposition::PossiblyConnectionLevel;
    }

    let class = sqlstate.get(0..2).unwrap_or("");
    match class {
        "22" | "40" | "42" => Disposition::QueryError,
        _ if sqlstate.starts_with("P0") => Disposition::QueryError,
        _ => Disposition::PossiblyConnectionLevel,
    }
}

/// The bounded retry state machine: `Fresh → Tried → Retrying(k) → TimedOut
/// → Fatal`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FacadeState {
    Fresh,
    Tried,
    Retrying(u8),
    TimedOut,
    Fatal,
}

/// More than three reconnect attempts puts the facade into `TimedOut`.
pub const MAX_RETRIES: u8 = 3;

impl FacadeState {
    pub fn new() -> Self {
        FacadeState::Fresh
    }

    /// Advances the state machine after a possibly-connection-level
    /// failure. Returns the new state and, when it is `Retrying`, the
    /// backoff duration to sleep before the next attempt.
    pub fn on_connection_failure(self, backoff_unit: Duration) -> (FacadeState, Option<Duration>) {
        match self {
            FacadeState::Fresh | FacadeState::Tried => {
                let next = FacadeState::Retrying(1);
                (next, Some(backoff_unit))
            }
            FacadeState::Retrying(k) if k < MAX_RETRIES => {
                let next_k = k + 1;
                let next = FacadeState::Retrying(next_k);
                (next, Some(backoff_unit * u32::from(next_k)))
            }
            FacadeState::Retrying(_) => (FacadeState::TimedOut, None),
            FacadeState::TimedOut => (FacadeState::Fatal, None),
            FacadeState::Fatal => (FacadeState::Fatal, None),
        }
    }

    pub fn on_success(self) -> FacadeState {
        FacadeState::Tried
    }

    pub fn is_fatal(self) -> bool {
        matches!(self, FacadeState::Fatal)
    }
}

impl Default for FacadeState {
    fn default() -> Self {
        FacadeState::new()
    }
}

/// Linear backoff unit; `retry_index * unit` per the design notes' literal
/// `3, 6, 9` second variant (§9 open question 3), exposed so callers can
/// tune it without a recompile.
pub const DEFAULT_BACKOFF_UNIT: Duration = Duration::from_secs(3);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn class_22_is_query_error_except_22000_first_attempt() {
        assert_eq!(classify("22001", 1), Disposition::QueryError);
        assert_eq!(classify("22000", 1), Disposition::PossiblyConnectionLevel);
        assert_eq!(classify("22000", 2), Disposition::QueryError);
    }

    #[test]
    fn classes_40_42_p0_are_query_errors() {
        assert_eq!(classify("40001", 1), Disposition::QueryError);
        assert_eq!(classify("42601", 1), Disposition::QueryError);
        assert_eq!(classify("P0001", 1), Disposition::QueryError);
    }

    #[test]
    fn unclassified_sqlstate_is_possibly_connection_level() {
        assert_eq!(classify("08006", 1), Disposition::PossiblyConnectionLevel);
    }

    #[test]
    fn backoff_is_linear_in_retry_index() {
        let unit = Duration::from_secs(3);
        let (s1, d1) = FacadeState::Fresh.on_connection_failure(unit);
        assert_eq!(s1, FacadeState::Retrying(1));
        assert_eq!(d1, Some(Duration::from_secs(3)));

        let (s2, d2) = s1.on_connection_failure(unit);
        assert_eq!(s2, FacadeState::Retrying(2));
        assert_eq!(d2, Some(Duration::from_secs(6)));

        let (s3, d3) = s2.on_connection_failure(unit);
        assert_eq!(s3, FacadeState::Retrying(3));
        assert_eq!(d3, Some(Duration::from_secs(9)));
    }

    #[test]
    fn exhausting_retries_times_out_then_is_fatal() {
        let unit = Duration::from_secs(3);
        let mut state = FacadeState::Retrying(MAX_RETRIES);
        let (timed_out, d) = state.on_connection_failure(unit);
        assert_eq!(timed_out, FacadeState::TimedOut);
        assert_eq!(d, None);
        state = timed_out;
        let (fatal, d2) = state.on_connection_failure(unit);
        assert_eq!(fatal, FacadeState::Fatal);
        assert_eq!(d2, None);
        assert!(fatal.is_fatal());
    }
}
