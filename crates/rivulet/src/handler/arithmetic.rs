use crate::{Error, Result, driver::Aggregate, driver::PairedAggregate};

/// Adds two numbers, wrapping on overflow.
pub const fn sum(first: i32, second: i32) -> i32 {
    first.wrapping_add(second)
}

/// Returns the non-negative square root of `number`.
///
/// # Errors
///
/// Returns [`Error::InvalidArgument`] for negative input.
pub fn square_root(number: i32) -> Result<f64> {
    if number < 0 {
        return Err(Error::invalid_argument(format!(
            "Received a negative number: {number}"
        )));
    }
    Ok(f64::from(number).sqrt())
}

/// Lazily decomposes a number into its prime factors, ascending, with
/// multiplicity.
///
/// Trial division starts at 2 and only advances the divisor when it no longer
/// divides the remaining quotient. Input `<= 1` yields nothing.
#[derive(Clone, Debug)]
pub struct PrimeFactors {
    remaining: i64,
    divisor: i64,
}

impl Iterator for PrimeFactors {
    type Item = i64;

    fn next(&mut self) -> Option<Self::Item> {
        while self.remaining > 1 {
            // Once divisor^2 exceeds the quotient, the quotient itself is prime.
            let past_root = self
                .divisor
                .checked_mul(self.divisor)
                .is_none_or(|square| square > self.remaining);
            if past_root {
                let factor = self.remaining;
                self.remaining = 1;
                return Some(factor);
            }
            if self.remaining % self.divisor == 0 {
                self.remaining /= self.divisor;
                return Some(self.divisor);
            }
            self.divisor += 1;
        }
        None
    }
}

pub const fn prime_factors(number: i64) -> PrimeFactors {
    PrimeFactors {
        remaining: number,
        divisor: 2,
    }
}

/// Running maximum over a bidi stream, answering every number with the
/// maximum seen so far.
///
/// Starts unset rather than at zero, so all-negative streams are reported
/// correctly.
#[derive(Clone, Copy, Debug, Default)]
pub struct RunningMaximum {
    max: Option<i32>,
}

impl PairedAggregate for RunningMaximum {
    type Unit = i32;
    type Output = i32;

    fn step(&mut self, number: i32) -> Result<i32> {
        let max = match self.max {
            Some(max) if number <= max => max,
            _ => number,
        };
        self.max = Some(max);
        Ok(max)
    }
}

/// Arithmetic mean of every number sent on a client stream.
#[derive(Clone, Copy, Debug, Default)]
pub struct Average {
    sum: i64,
    count: u64,
}

impl Aggregate for Average {
    type Unit = i32;
    type Output = f64;

    fn update(&mut self, number: i32) -> Result<()> {
        self.sum += i64::from(number);
        self.count += 1;
        Ok(())
    }

    #[allow(clippy::cast_precision_loss)]
    fn finish(self) -> Result<f64> {
        if self.count == 0 {
            return Err(Error::invalid_argument("no data points"));
        }
        Ok(self.sum as f64 / self.count as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn is_prime(n: i64) -> bool {
        n >= 2 && (2..).take_while(|d| d * d <= n).all(|d| n % d != 0)
    }

    #[test]
    fn sum_and_wrap() {
        assert_eq!(sum(2, 3), 5);
        assert_eq!(sum(-7, 3), -4);
        assert_eq!(sum(i32::MAX, 1), i32::MIN);
    }

    #[test]
    fn square_root_rejects_negatives() {
        assert_eq!(square_root(25), Ok(5.0));
        assert_eq!(square_root(0), Ok(0.0));
        for n in [-1, -25, i32::MIN] {
            let err = square_root(n).unwrap_err();
            assert_eq!(
                err,
                Error::invalid_argument(format!("Received a negative number: {n}"))
            );
        }
    }

    #[test]
    fn prime_factors_of_twelve() {
        assert_eq!(prime_factors(12).collect::<Vec<_>>(), vec![2, 2, 3]);
        assert_eq!(prime_factors(120).collect::<Vec<_>>(), vec![2, 2, 2, 3, 5]);
        assert_eq!(prime_factors(97).collect::<Vec<_>>(), vec![97]);
    }

    #[test]
    fn prime_factors_of_small_and_negative_inputs_are_empty() {
        for n in [1, 0, -1, -12, i64::MIN] {
            assert_eq!(prime_factors(n).count(), 0, "input {n}");
        }
    }

    #[test]
    fn prime_factors_multiply_back() {
        for n in 2..5_000_i64 {
            let factors: Vec<_> = prime_factors(n).collect();
            assert_eq!(factors.iter().product::<i64>(), n);
            assert!(factors.iter().all(|&f| is_prime(f)), "{n}: {factors:?}");
            assert!(factors.windows(2).all(|w| w[0] <= w[1]), "{n}: {factors:?}");
        }
    }

    #[test]
    fn prime_factors_of_large_inputs() {
        let big_prime = 2_147_483_647_i64;
        assert_eq!(prime_factors(big_prime).collect::<Vec<_>>(), vec![big_prime]);
        assert_eq!(
            prime_factors(i64::MAX).collect::<Vec<_>>(),
            vec![7, 7, 73, 127, 337, 92_737, 649_657]
        );
    }

    #[test]
    fn running_maximum_scenario() {
        let mut max = RunningMaximum::default();
        let out: Vec<_> = [3, 51, 93, 54, 32]
            .into_iter()
            .map(|n| max.step(n).unwrap())
            .collect();
        assert_eq!(out, vec![3, 51, 93, 93, 93]);
    }

    #[test]
    fn running_maximum_is_prefix_max() {
        let inputs = [-9, -3, -12, 0, -1, 7, 7, 2, i32::MIN, i32::MAX, 5];
        let mut max = RunningMaximum::default();
        let mut prev = None;
        for k in 0..inputs.len() {
            let out = max.step(inputs[k]).unwrap();
            assert_eq!(Some(out), inputs[..=k].iter().copied().max());
            assert!(prev.is_none_or(|p| p <= out));
            prev = Some(out);
        }
    }

    #[test]
    fn average_scenario() {
        let mut avg = Average::default();
        for n in [3, 5, 9, 54, 32] {
            avg.update(n).unwrap();
        }
        assert!((avg.finish().unwrap() - 20.6).abs() < 1e-9);
    }

    #[test]
    fn average_does_not_overflow() {
        let mut avg = Average::default();
        avg.update(i32::MAX).unwrap();
        avg.update(i32::MAX).unwrap();
        assert_eq!(avg.finish(), Ok(f64::from(i32::MAX)));
    }

    #[test]
    fn empty_average_is_invalid_argument() {
        assert_eq!(
            Average::default().finish(),
            Err(Error::invalid_argument("no data points"))
        );
    }
}
