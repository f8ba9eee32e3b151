#![allow(dead_code)]

use chrono::NaiveDate;
use rust_decimal::Decimal;

use stat_arb_core::PriceSeries;

pub const N: usize = 250;

/// Uniform noise on [-1, 1] in 0.01 steps from a 64-bit LCG.
pub fn noise(seed: u64, n: usize) -> Vec<Decimal> {
    let mut state = seed;
    (0..n)
        .map(|_| {
            state = state
                .wrapping_mul(6364136223846793005)
                .wrapping_add(1442695040888963407);
            Decimal::new(((state >> 33) % 201) as i64 - 100, 2)
        })
        .collect()
}

pub fn walk(seed: u64, n: usize, from: Decimal) -> Vec<Decimal> {
    let mut level = from;
    noise(seed, n)
        .into_iter()
        .map(|e| {
            level += e;
            level
        })
        .collect()
}

pub fn series(symbol: &str, prices: &[Decimal]) -> PriceSeries {
    let start = NaiveDate::from_ymd_opt(2023, 1, 2).unwrap();
    PriceSeries::from_daily(symbol, start, prices).unwrap()
}
