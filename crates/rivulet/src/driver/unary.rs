use crate::{CallSession, Endpoint, Error, Result, Supervisor};
use core::future::Future;

/// Runs a unary handler for a request that was already delivered.
///
/// The handler receives a clone of the session [`Supervisor`] so long-running
/// work can poll for expiry between increments. The whole invocation is also
/// raced against the supervisor: a handler that is still running when the
/// deadline passes is dropped and the call reports
/// [`Error::DeadlineExceeded`] instead of a late result.
///
/// The session is closed when this returns, whatever the outcome.
pub async fn drive<Req, Resp, F, Fut>(session: &CallSession, request: Req, handler: F) -> Result<Resp>
where
    F: FnOnce(Req, Supervisor) -> Fut,
    Fut: Future<Output = Result<Resp>>,
{
    session.request_received();
    let outcome = run(session, request, handler).await;
    session.finish();

    #[cfg(feature = "tracing")]
    if let Err(e) = &outcome {
        tracing::debug!("unary call ended with {}: {e}", e.code());
    }

    outcome
}

/// Serves one unary call over a connected endpoint: reads the single request,
/// runs the handler, and sends exactly one response or one error.
pub async fn serve<Req, Resp, F, Fut>(endpoint: Endpoint<Resp, Req>, handler: F) -> Result<()>
where
    Resp: Send + 'static,
    F: FnOnce(Req, Supervisor) -> Fut,
    Fut: Future<Output = Result<Resp>>,
{
    let Endpoint {
        session,
        mut outbound,
        mut inbound,
    } = endpoint;

    let outcome = match inbound.recv().await {
        Ok(Some(request)) => run(&session, request, handler).await,
        Ok(None) => Err(Error::invalid_argument("unary call closed without a request")),
        Err(err) => Err(err),
    };

    match outcome {
        Ok(resp) => outbound.send(resp).await,
        Err(err) => {
            outbound.fail(err.clone());
            Err(err)
        }
    }
}

/// Issues one unary call over a connected endpoint and awaits the single
/// response.
pub async fn call<Req, Resp>(endpoint: Endpoint<Req, Resp>, request: Req) -> Result<Resp> {
    let Endpoint {
        mut outbound,
        mut inbound,
        ..
    } = endpoint;

    outbound.send(request).await?;
    match inbound.recv().await? {
        Some(resp) => Ok(resp),
        None => Err(Error::internal("unary call ended without a response")),
    }
}

async fn run<Req, Resp, F, Fut>(session: &CallSession, request: Req, handler: F) -> Result<Resp>
where
    F: FnOnce(Req, Supervisor) -> Fut,
    Fut: Future<Output = Result<Resp>>,
{
    let supervisor = session.supervisor().clone();
    session
        .supervisor()
        .guard(handler(request, supervisor))
        .await
        .and_then(|resp| resp)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{CallShape, Deadline, DirectionState, handler::arithmetic, loopback};
    use core::time::Duration;

    #[tokio::test]
    async fn drive_returns_single_response_and_closes() {
        let session = CallSession::accept(CallShape::Unary, Supervisor::default());
        let out = drive(&session, (2, 3), |(a, b), _| async move {
            Ok(arithmetic::sum(a, b))
        })
        .await;
        assert_eq!(out, Ok(5));
        assert_eq!(session.state(), DirectionState::Closed);
    }

    #[tokio::test]
    async fn validation_failure_is_invalid_argument() {
        let session = CallSession::accept(CallShape::Unary, Supervisor::default());
        let out = drive(&session, -25, |n, _| async move { arithmetic::square_root(n) }).await;
        assert!(matches!(out, Err(Error::InvalidArgument { .. })));
        assert!(session.is_closed());
    }

    #[tokio::test(start_paused = true)]
    async fn slow_handler_is_cut_off_at_deadline() {
        let deadline = Deadline::after(Duration::from_secs(1));
        let session = CallSession::accept(CallShape::Unary, Supervisor::new(Some(deadline)));
        let out = drive(&session, (), |(), _| async {
            tokio::time::sleep(Duration::from_secs(3)).await;
            Ok("late")
        })
        .await;
        assert_eq!(out, Err(Error::DeadlineExceeded));
    }

    #[tokio::test]
    async fn loopback_call_round_trip() {
        let (caller, server) = loopback::<(i32, i32), i32>(CallShape::Unary, 1, None);
        let server = tokio::spawn(serve(server, |(a, b), _| async move {
            Ok(arithmetic::sum(a, b))
        }));
        assert_eq!(call(caller, (2, 3)).await, Ok(5));
        assert_eq!(server.await.unwrap(), Ok(()));
    }

    #[tokio::test]
    async fn loopback_call_surfaces_single_error() {
        let (caller, server) = loopback::<i32, f64>(CallShape::Unary, 1, None);
        let server = tokio::spawn(serve(server, |n, _| async move {
            arithmetic::square_root(n)
        }));
        let out = call(caller, -25).await;
        assert!(matches!(out, Err(Error::InvalidArgument { .. })));
        assert!(server.await.unwrap().is_err());
    }
}
