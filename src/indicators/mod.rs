//! Technical indicators over price/volume series
//!
//! Series functions return one entry per input element, `None` during the
//! warm-up period, so results stay index-aligned with the window:
//! - SMA / EMA (EMA seeded with the SMA of the first `period` values)
//! - RSI (Wilder's smoothing)
//! - MACD with EMA signal line
//! - Bollinger Bands (population standard deviation)
//! - Rate of change (percent)
//! - Slow stochastic oscillator
//!
//! Scalar helpers cover mean, standard deviation, percent changes and the
//! least-squares slope used for trend strength.

/// Arithmetic mean, `None` for an empty slice
pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

/// Sample standard deviation (n - 1 denominator)
pub fn sample_std(values: &[f64]) -> Option<f64> {
    if values.len() < 2 {
        return None;
    }
    let m = mean(values)?;
    let ss: f64 = values.iter().map(|v| (v - m).powi(2)).sum();
    Some((ss / (values.len() - 1) as f64).sqrt())
}

/// Population standard deviation (n denominator)
pub fn population_std(values: &[f64]) -> Option<f64> {
    let m = mean(values)?;
    let ss: f64 = values.iter().map(|v| (v - m).powi(2)).sum();
    Some((ss / values.len() as f64).sqrt())
}

/// Period-over-period fractional changes (length `n - 1`)
pub fn pct_changes(values: &[f64]) -> Vec<f64> {
    values
        .windows(2)
        .map(|pair| (pair[1] - pair[0]) / pair[0])
        .filter(|r| r.is_finite())
        .collect()
}

/// Least-squares slope of `values` against their index
pub fn linreg_slope(values: &[f64]) -> Option<f64> {
    let n = values.len();
    if n < 2 {
        return None;
    }
    let n_f = n as f64;
    let sum_x: f64 = (0..n).map(|i| i as f64).sum();
    let sum_x2: f64 = (0..n).map(|i| (i as f64).powi(2)).sum();
    let sum_y: f64 = values.iter().sum();
    let sum_xy: f64 = values.iter().enumerate().map(|(i, y)| i as f64 * y).sum();
    let denom = n_f * sum_x2 - sum_x * sum_x;
    if denom == 0.0 {
        return None;
    }
    Some((n_f * sum_xy - sum_x * sum_y) / denom)
}

/// Simple moving average series
pub fn sma(values: &[f64], period: usize) -> Vec<Option<f64>> {
    let mut out = vec![None; values.len()];
    if period == 0 || values.len() < period {
        return out;
    }
    let mut sum: f64 = values[..period].iter().sum();
    out[period - 1] = Some(sum / period as f64);
    for i in period..values.len() {
        sum += values[i] - values[i - period];
        out[i] = Some(sum / period as f64);
    }
    out
}

/// Exponential moving average series, seeded with the SMA of the first `period` values
pub fn ema(values: &[f64], period: usize) -> Vec<Option<f64>> {
    let mut out = vec![None; values.len()];
    if period == 0 || values.len() < period {
        return out;
    }
    let multiplier = 2.0 / (period as f64 + 1.0);
    let mut current = values[..period].iter().sum::<f64>() / period as f64;
    out[period - 1] = Some(current);
    for i in period..values.len() {
        current = (values[i] - current) * multiplier + current;
        out[i] = Some(current);
    }
    out
}

/// EMA over a series that itself has a warm-up prefix
fn ema_of_optional(values: &[Option<f64>], period: usize) -> Vec<Option<f64>> {
    let mut out = vec![None; values.len()];
    let Some(start) = values.iter().position(|v| v.is_some()) else {
        return out;
    };
    let dense: Vec<f64> = values[start..].iter().map(|v| v.unwrap_or(0.0)).collect();
    for (offset, value) in ema(&dense, period).into_iter().enumerate() {
        out[start + offset] = value;
    }
    out
}

/// SMA over a series that itself has a warm-up prefix
fn sma_of_optional(values: &[Option<f64>], period: usize) -> Vec<Option<f64>> {
    let mut out = vec![None; values.len()];
    let Some(start) = values.iter().position(|v| v.is_some()) else {
        return out;
    };
    let dense: Vec<f64> = values[start..].iter().map(|v| v.unwrap_or(0.0)).collect();
    for (offset, value) in sma(&dense, period).into_iter().enumerate() {
        out[start + offset] = value;
    }
    out
}

/// RSI using Wilder's smoothing. First value at index `period`.
pub fn rsi(closes: &[f64], period: usize) -> Vec<Option<f64>> {
    let mut out = vec![None; closes.len()];
    if period == 0 || closes.len() < period + 1 {
        return out;
    }

    let mut avg_gain = 0.0;
    let mut avg_loss = 0.0;
    for i in 1..=period {
        let change = closes[i] - closes[i - 1];
        if change > 0.0 {
            avg_gain += change;
        } else {
            avg_loss -= change;
        }
    }
    avg_gain /= period as f64;
    avg_loss /= period as f64;
    out[period] = Some(rsi_value(avg_gain, avg_loss));

    let p = period as f64;
    for i in (period + 1)..closes.len() {
        let change = closes[i] - closes[i - 1];
        let gain = change.max(0.0);
        let loss = (-change).max(0.0);
        avg_gain = (avg_gain * (p - 1.0) + gain) / p;
        avg_loss = (avg_loss * (p - 1.0) + loss) / p;
        out[i] = Some(rsi_value(avg_gain, avg_loss));
    }
    out
}

fn rsi_value(avg_gain: f64, avg_loss: f64) -> f64 {
    let total = avg_gain + avg_loss;
    if total < 1e-12 {
        // No movement = neutral
        return 50.0;
    }
    100.0 * avg_gain / total
}

/// MACD line, signal line and histogram
#[derive(Debug, Clone)]
pub struct MacdSeries {
    pub macd: Vec<Option<f64>>,
    pub signal: Vec<Option<f64>>,
    pub hist: Vec<Option<f64>>,
}

pub fn macd(closes: &[f64], fast: usize, slow: usize, signal_period: usize) -> MacdSeries {
    let fast_ema = ema(closes, fast);
    let slow_ema = ema(closes, slow);
    let line: Vec<Option<f64>> = fast_ema
        .iter()
        .zip(slow_ema.iter())
        .map(|(f, s)| match (f, s) {
            (Some(f), Some(s)) => Some(f - s),
            _ => None,
        })
        .collect();
    let signal = ema_of_optional(&line, signal_period);
    let hist = line
        .iter()
        .zip(signal.iter())
        .map(|(m, s)| match (m, s) {
            (Some(m), Some(s)) => Some(m - s),
            _ => None,
        })
        .collect();
    MacdSeries {
        macd: line,
        signal,
        hist,
    }
}

/// Bollinger Bands (upper, middle, lower)
#[derive(Debug, Clone)]
pub struct BandSeries {
    pub upper: Vec<Option<f64>>,
    pub middle: Vec<Option<f64>>,
    pub lower: Vec<Option<f64>>,
}

pub fn bollinger(closes: &[f64], period: usize, num_std: f64) -> BandSeries {
    let n = closes.len();
    let mut upper = vec![None; n];
    let mut middle = vec![None; n];
    let mut lower = vec![None; n];
    if period == 0 || n < period {
        return BandSeries {
            upper,
            middle,
            lower,
        };
    }
    for i in (period - 1)..n {
        let slice = &closes[i + 1 - period..=i];
        if let (Some(m), Some(sd)) = (mean(slice), population_std(slice)) {
            upper[i] = Some(m + num_std * sd);
            middle[i] = Some(m);
            lower[i] = Some(m - num_std * sd);
        }
    }
    BandSeries {
        upper,
        middle,
        lower,
    }
}

/// Rate of change in percent: `(close / close[-period] - 1) * 100`
pub fn roc(closes: &[f64], period: usize) -> Vec<Option<f64>> {
    let mut out = vec![None; closes.len()];
    for i in period..closes.len() {
        let base = closes[i - period];
        if base != 0.0 {
            out[i] = Some((closes[i] / base - 1.0) * 100.0);
        }
    }
    out
}

/// Slow stochastic %K / %D
#[derive(Debug, Clone)]
pub struct StochasticSeries {
    pub slow_k: Vec<Option<f64>>,
    pub slow_d: Vec<Option<f64>>,
}

pub fn stochastic(
    highs: &[f64],
    lows: &[f64],
    closes: &[f64],
    k_period: usize,
    slow_k_period: usize,
    slow_d_period: usize,
) -> StochasticSeries {
    let n = closes.len().min(highs.len()).min(lows.len());
    let mut fast_k = vec![None; n];
    if k_period > 0 && n >= k_period {
        for i in (k_period - 1)..n {
            let window = i + 1 - k_period..=i;
            let hh = highs[window.clone()]
                .iter()
                .copied()
                .fold(f64::NEG_INFINITY, f64::max);
            let ll = lows[window].iter().copied().fold(f64::INFINITY, f64::min);
            let range = hh - ll;
            fast_k[i] = Some(if range > 0.0 {
                100.0 * (closes[i] - ll) / range
            } else {
                50.0
            });
        }
    }
    let slow_k = sma_of_optional(&fast_k, slow_k_period);
    let slow_d = sma_of_optional(&slow_k, slow_d_period);
    StochasticSeries { slow_k, slow_d }
}

/// Last element of an index-aligned series
pub fn last(series: &[Option<f64>]) -> Option<f64> {
    series.last().copied().flatten()
}

/// Second-to-last element of an index-aligned series
pub fn prev(series: &[Option<f64>]) -> Option<f64> {
    if series.len() < 2 {
        return None;
    }
    series[series.len() - 2]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close_to(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_sma_alignment() {
        let out = sma(&[1.0, 2.0, 3.0, 4.0], 2);
        assert_eq!(out, vec![None, Some(1.5), Some(2.5), Some(3.5)]);
    }

    #[test]
    fn test_ema_seeded_with_sma() {
        let out = ema(&[2.0, 4.0, 6.0, 8.0], 3);
        assert_eq!(out[1], None);
        assert!(close_to(out[2].unwrap(), 4.0));
        // multiplier 0.5: (8 - 4) * 0.5 + 4
        assert!(close_to(out[3].unwrap(), 6.0));
    }

    #[test]
    fn test_std_variants() {
        let values = [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0];
        assert!(close_to(population_std(&values).unwrap(), 2.0));
        assert!(sample_std(&values).unwrap() > 2.0);
        assert!(sample_std(&[1.0]).is_none());
    }

    #[test]
    fn test_rsi_extremes() {
        let rising: Vec<f64> = (0..30).map(|i| 100.0 + i as f64).collect();
        assert!(close_to(last(&rsi(&rising, 14)).unwrap(), 100.0));

        let falling: Vec<f64> = (0..30).map(|i| 100.0 - i as f64).collect();
        assert!(close_to(last(&rsi(&falling, 14)).unwrap(), 0.0));

        let flat = vec![100.0; 30];
        assert!(close_to(last(&rsi(&flat, 14)).unwrap(), 50.0));

        let short = rsi(&rising[..14], 14);
        assert!(short.iter().all(|v| v.is_none()));
    }

    #[test]
    fn test_macd_warmup() {
        let closes: Vec<f64> = (0..40).map(|i| 100.0 + (i as f64).sin()).collect();
        let series = macd(&closes, 12, 26, 9);
        assert!(series.macd[24].is_none());
        assert!(series.macd[25].is_some());
        assert!(series.signal[32].is_none());
        assert!(series.signal[33].is_some());
        assert!(series.hist[33].is_some());
    }

    #[test]
    fn test_bollinger_flat_series_collapses() {
        let bands = bollinger(&[10.0; 20], 20, 2.0);
        assert!(close_to(last(&bands.upper).unwrap(), 10.0));
        assert!(close_to(last(&bands.lower).unwrap(), 10.0));
    }

    #[test]
    fn test_roc_percent() {
        let closes: Vec<f64> = (0..11).map(|i| if i == 10 { 110.0 } else { 100.0 }).collect();
        assert!(close_to(last(&roc(&closes, 10)).unwrap(), 10.0));
    }

    #[test]
    fn test_linreg_slope() {
        let values: Vec<f64> = (0..20).map(|i| 3.0 + 0.5 * i as f64).collect();
        assert!(close_to(linreg_slope(&values).unwrap(), 0.5));
    }

    #[test]
    fn test_stochastic_warmup_and_range() {
        let closes: Vec<f64> = (0..25).map(|i| 100.0 + i as f64).collect();
        let highs: Vec<f64> = closes.iter().map(|c| c + 1.0).collect();
        let lows: Vec<f64> = closes.iter().map(|c| c - 1.0).collect();
        let stoch = stochastic(&highs, &lows, &closes, 14, 3, 3);
        assert!(stoch.slow_k[14].is_none());
        assert!(stoch.slow_k[15].is_some());
        assert!(stoch.slow_d[16].is_none());
        assert!(stoch.slow_d[17].is_some());
        let k = last(&stoch.slow_k).unwrap();
        assert!(k > 80.0 && k <= 100.0);
    }
}
