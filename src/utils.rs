//! Numeric helpers shared by every calculator.
//!
//! Undefined results (zero base price, too few points, zero variance) are
//! `f64::NAN` and stay NaN through any further arithmetic. Ranking goes
//! through [`rank_descending`] so NaN is always ordered last.

use std::cmp::Ordering;

use crate::model::Price;

#[derive(Default, Debug, Clone, Copy)]
pub struct RunningMean {
    value: f64,
    length: usize,
}

impl RunningMean {
    pub fn feed(&mut self, value: f64) {
        self.value += value;
        self.length += 1;
    }

    pub fn clear(&mut self) {
        self.value = 0.0;
        self.length = 0;
    }

    /// NaN when nothing was fed.
    pub fn avg(&self) -> f64 {
        self.value / self.length as f64
    }
}

impl FromIterator<f64> for RunningMean {
    fn from_iter<I: IntoIterator<Item = f64>>(iter: I) -> Self {
        let mut mean = Self::default();
        for value in iter {
            mean.feed(value);
        }
        mean
    }
}

/// Fractional change from `prev` to `next`.
pub fn pct_change(prev: Price, next: Price) -> f64 {
    if prev == 0.0 {
        return f64::NAN;
    }
    (next - prev) / prev
}

/// Percentage change from `first` to `last`.
pub fn percent_return(first: Price, last: Price) -> f64 {
    pct_change(first, last) * 100.0
}

/// Standard deviation with the N-1 denominator.
pub fn sample_std(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return f64::NAN;
    }

    let mean = values.iter().sum::<f64>() / values.len() as f64;
    let squares = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>();

    (squares / (values.len() - 1) as f64).sqrt()
}

/// Pearson coefficient of two aligned series.
pub fn pearson(xs: &[f64], ys: &[f64]) -> f64 {
    let n = xs.len().min(ys.len());
    if n < 2 {
        return f64::NAN;
    }

    let (xs, ys) = (&xs[..n], &ys[..n]);
    let mean_x = xs.iter().sum::<f64>() / n as f64;
    let mean_y = ys.iter().sum::<f64>() / n as f64;

    let (mut sxy, mut sxx, mut syy) = (0.0, 0.0, 0.0);
    for (x, y) in xs.iter().zip(ys) {
        let (dx, dy) = (x - mean_x, y - mean_y);
        sxy += dx * dy;
        sxx += dx * dx;
        syy += dy * dy;
    }

    if sxx == 0.0 || syy == 0.0 {
        return f64::NAN;
    }

    (sxy / (sxx * syy).sqrt()).clamp(-1.0, 1.0)
}

/// Descending by value with NaN last; equal values fall back to symbol order.
pub fn rank_descending((a, a_symbol): (f64, &str), (b, b_symbol): (f64, &str)) -> Ordering {
    match (a.is_nan(), b.is_nan()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        (false, false) => b.partial_cmp(&a).unwrap_or(Ordering::Equal),
    }
    .then_with(|| a_symbol.cmp(b_symbol))
}
