//! Parsing of the `grpc-timeout` request header.
//!
//! The header carries a relative timeout as up to eight ASCII digits followed
//! by a unit: `H` hours, `M` minutes, `S` seconds, `m` milliseconds, `u`
//! microseconds, `n` nanoseconds. The server turns it into the absolute
//! [`Deadline`] of the call session at the moment the call is accepted.

use core::time::Duration;
use rivulet::Deadline;
use tonic::Request;

/// Name of the header carrying the caller's timeout.
pub const GRPC_TIMEOUT_HEADER: &str = "grpc-timeout";

const MAX_DIGITS: usize = 8;

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum TimeoutError {
    #[error("timeout value must be 1 to {MAX_DIGITS} digits, got {len}")]
    InvalidLength { len: usize },
    #[error("timeout value is not a number")]
    InvalidValue,
    #[error("unknown timeout unit {unit:?}")]
    InvalidUnit { unit: char },
}

/// Parses a `grpc-timeout` header value.
///
/// # Errors
///
/// Returns a [`TimeoutError`] if the digits or the unit are malformed.
pub fn parse_grpc_timeout(value: &str) -> Result<Duration, TimeoutError> {
    let Some(unit) = value.chars().last() else {
        return Err(TimeoutError::InvalidLength { len: 0 });
    };
    let digits = &value[..value.len() - unit.len_utf8()];
    if digits.is_empty() || digits.len() > MAX_DIGITS {
        return Err(TimeoutError::InvalidLength { len: digits.len() });
    }
    if !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(TimeoutError::InvalidValue);
    }
    let amount: u64 = digits.parse().map_err(|_| TimeoutError::InvalidValue)?;

    let timeout = match unit {
        'H' => Duration::from_secs(amount * 60 * 60),
        'M' => Duration::from_secs(amount * 60),
        'S' => Duration::from_secs(amount),
        'm' => Duration::from_millis(amount),
        'u' => Duration::from_micros(amount),
        'n' => Duration::from_nanos(amount),
        unit => return Err(TimeoutError::InvalidUnit { unit }),
    };
    Ok(timeout)
}

/// The caller's timeout for `request`, if it sent a well-formed one.
///
/// A malformed header is ignored: the call then runs under the server's
/// default deadline only.
pub fn request_timeout<T>(request: &Request<T>) -> Option<Duration> {
    let raw = request.metadata().get(GRPC_TIMEOUT_HEADER)?.to_str().ok()?;
    match parse_grpc_timeout(raw) {
        Ok(timeout) => Some(timeout),
        Err(_e) => None,
    }
}

/// The effective deadline of a call accepted now: the earlier of the caller's
/// timeout and the server default.
pub fn call_deadline<T>(request: &Request<T>, default: Option<Duration>) -> Option<Deadline> {
    Deadline::earliest(
        request_timeout(request).map(Deadline::after),
        default.map(Deadline::after),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_every_unit() {
        assert_eq!(parse_grpc_timeout("2H"), Ok(Duration::from_secs(7200)));
        assert_eq!(parse_grpc_timeout("3M"), Ok(Duration::from_secs(180)));
        assert_eq!(parse_grpc_timeout("5S"), Ok(Duration::from_secs(5)));
        assert_eq!(parse_grpc_timeout("250m"), Ok(Duration::from_millis(250)));
        assert_eq!(parse_grpc_timeout("99999999u"), Ok(Duration::from_micros(99_999_999)));
        assert_eq!(parse_grpc_timeout("7n"), Ok(Duration::from_nanos(7)));
    }

    #[test]
    fn rejects_malformed_values() {
        assert_eq!(
            parse_grpc_timeout(""),
            Err(TimeoutError::InvalidLength { len: 0 })
        );
        assert_eq!(
            parse_grpc_timeout("S"),
            Err(TimeoutError::InvalidLength { len: 0 })
        );
        assert_eq!(
            parse_grpc_timeout("123456789S"),
            Err(TimeoutError::InvalidLength { len: 9 })
        );
        assert_eq!(parse_grpc_timeout("1x0S"), Err(TimeoutError::InvalidValue));
        assert_eq!(parse_grpc_timeout("-1S"), Err(TimeoutError::InvalidValue));
        assert_eq!(
            parse_grpc_timeout("10s"),
            Err(TimeoutError::InvalidUnit { unit: 's' })
        );
    }

    #[tokio::test(start_paused = true)]
    async fn tighter_of_header_and_default_wins() {
        let mut request = Request::new(());
        request.set_timeout(Duration::from_millis(300));
        assert_eq!(request_timeout(&request), Some(Duration::from_millis(300)));

        let deadline = call_deadline(&request, Some(Duration::from_secs(5))).unwrap();
        assert_eq!(deadline.remaining(), Duration::from_millis(300));

        let deadline = call_deadline(&request, Some(Duration::from_millis(100))).unwrap();
        assert_eq!(deadline.remaining(), Duration::from_millis(100));
    }

    #[test]
    fn missing_or_malformed_header_means_default_only() {
        let request = Request::new(());
        assert_eq!(request_timeout(&request), None);

        let mut request = Request::new(());
        request
            .metadata_mut()
            .insert(GRPC_TIMEOUT_HEADER, "soon".parse().unwrap());
        assert_eq!(request_timeout(&request), None);
    }
}
