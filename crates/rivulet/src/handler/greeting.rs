use crate::driver::{Aggregate, PairedAggregate, pacing};
use crate::{Result, SleepProvider, Supervisor};
use core::{fmt, time::Duration};
use futures::{Stream, StreamExt};

/// A first/last name pair.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Greeting {
    pub first_name: String,
    pub last_name: String,
}

impl Greeting {
    pub fn new(first_name: impl Into<String>, last_name: impl Into<String>) -> Self {
        Self {
            first_name: first_name.into(),
            last_name: last_name.into(),
        }
    }
}

impl fmt::Display for Greeting {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Hello, {} {}", self.first_name, self.last_name)
    }
}

/// `"Hello, {first} {last}"`.
pub fn compose(greeting: &Greeting) -> String {
    greeting.to_string()
}

/// The `repeat` numbered greetings of the many-times variant.
pub fn many_times(greeting: &Greeting, repeat: usize) -> impl Iterator<Item = String> + use<> {
    let greeting = compose(greeting);
    (0..repeat).map(move |i| format!("{greeting} {i}"))
}

/// [`many_times`] as a server-stream source, one greeting every `pace`.
pub fn many_times_paced(
    greeting: &Greeting,
    repeat: usize,
    pace: Option<Duration>,
) -> impl Stream<Item = Result<String>> + use<> {
    pacing::paced(many_times(greeting, repeat), pace).map(Ok)
}

/// Concatenates a greeting for every name sent on a client stream.
///
/// A stream closed without any name yields the empty string.
#[derive(Clone, Debug, Default)]
pub struct LongGreet {
    text: String,
}

impl Aggregate for LongGreet {
    type Unit = Greeting;
    type Output = String;

    fn update(&mut self, greeting: Greeting) -> Result<()> {
        self.text.push_str(&compose(&greeting));
        self.text.push(' ');
        Ok(())
    }

    fn finish(self) -> Result<String> {
        Ok(self.text)
    }
}

/// Greets every name of a bidi stream as it arrives.
#[derive(Clone, Copy, Debug, Default)]
pub struct GreetEveryone;

impl PairedAggregate for GreetEveryone {
    type Unit = Greeting;
    type Output = String;

    fn step(&mut self, greeting: Greeting) -> Result<String> {
        let mut reply = compose(&greeting);
        reply.push(' ');
        Ok(reply)
    }
}

/// Simulated work performed by [`greet_with_deadline`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Workload {
    pub increments: u32,
    pub step: Duration,
}

impl Default for Workload {
    fn default() -> Self {
        Self {
            increments: 3,
            step: Duration::from_secs(1),
        }
    }
}

/// Greets after performing `workload`, checking the session at every
/// increment boundary.
///
/// # Errors
///
/// [`crate::Error::DeadlineExceeded`] or [`crate::Error::Cancelled`] as soon as
/// the session stops being live; the rest of the workload is skipped.
pub async fn greet_with_deadline<S: SleepProvider>(
    greeting: Greeting,
    supervisor: &Supervisor,
    workload: Workload,
) -> Result<String> {
    supervisor
        .work_in_increments::<S>(workload.increments, workload.step)
        .await?;
    Ok(compose(&greeting))
}
