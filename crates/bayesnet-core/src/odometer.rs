//! Iterative mixed-radix enumeration of state combinations.
//!
//! Every Cartesian product in the engine (query assignments, summed-out
//! assignments, CPT parent configurations) is walked with one counter instead
//! of recursion, so stack depth does not grow with the number of variables.

/// Counts through `∏ radices` digit vectors in row-major order: the last digit
/// moves fastest, the first slowest.
///
/// An empty radix list yields exactly one empty combination. A zero radix
/// yields nothing.
#[derive(Debug, Clone)]
pub struct StateOdometer {
    radices: Vec<usize>,
    digits: Vec<usize>,
    exhausted: bool,
}

impl StateOdometer {
    pub fn new(radices: Vec<usize>) -> Self {
        let exhausted = radices.iter().any(|&r| r == 0);
        let digits = vec![0; radices.len()];
        Self {
            radices,
            digits,
            exhausted,
        }
    }

    /// Number of combinations the odometer walks through in total.
    pub fn combinations(&self) -> usize {
        self.radices.iter().product()
    }

    /// Advance by one, carrying leftwards. Returns false on wrap-around.
    fn advance(&mut self) -> bool {
        for pos in (0..self.digits.len()).rev() {
            self.digits[pos] += 1;
            if self.digits[pos] < self.radices[pos] {
                return true;
            }
            self.digits[pos] = 0;
        }
        false
    }
}

impl Iterator for StateOdometer {
    type Item = Vec<usize>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.exhausted {
            return None;
        }
        let current = self.digits.clone();
        if !self.advance() {
            self.exhausted = true;
        }
        Some(current)
    }
}

/// Row-major linear index of `digits` under `radices` (last digit least
/// significant). Callers guarantee `digits[i] < radices[i]`.
pub fn encode(digits: &[usize], radices: &[usize]) -> usize {
    digits
        .iter()
        .zip(radices)
        .fold(0, |acc, (&digit, &radix)| acc * radix + digit)
}

/// Inverse of [`encode`]: peel digits off the least significant (last) end.
pub fn decode(mut index: usize, radices: &[usize]) -> Vec<usize> {
    let mut digits = vec![0; radices.len()];
    for pos in (0..radices.len()).rev() {
        digits[pos] = index % radices[pos];
        index /= radices[pos];
    }
    digits
}
