//! Seeded synthetic cohort shaped like the Pima diabetes table.

#![allow(dead_code)]

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::StandardNormal;
use std::fmt::Write as _;
use std::fs;
use std::path::Path;

pub const HEADER: &str = "Pregnancies,Glucose,BloodPressure,SkinThickness,Insulin,BMI,DiabetesPedigreeFunction,Age,Outcome";

/// The reference patient sits exactly on the generating model's decision
/// boundary.
pub fn true_logit(row: &[f64; 8]) -> f64 {
    0.045 * (row[1] - 120.0)
        + 0.09 * (row[5] - 25.0)
        + 0.04 * (row[7] - 30.0)
        + 0.8 * (row[6] - 0.5)
        + 0.1 * (row[0] - 1.0)
}

fn normal(rng: &mut StdRng, mean: f64, sd: f64, lo: f64, hi: f64) -> f64 {
    (mean + sd * rng.sample::<f64, _>(StandardNormal)).clamp(lo, hi)
}

/// `n` rows of eight features plus outcome. Blood pressure, skin thickness
/// and insulin carry zero-coded missing values.
pub fn cohort(n: usize, seed: u64) -> Vec<[f64; 9]> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..n)
        .map(|_| {
            let mut x = [
                rng.gen_range(0..=4) as f64,
                normal(&mut rng, 110.0, 30.0, 44.0, 199.0).round(),
                normal(&mut rng, 72.0, 12.0, 24.0, 122.0).round(),
                normal(&mut rng, 29.0, 10.0, 7.0, 99.0).round(),
                normal(&mut rng, 125.0, 80.0, 14.0, 846.0).round(),
                (normal(&mut rng, 27.0, 7.0, 18.2, 67.1) * 10.0).round() / 10.0,
                (normal(&mut rng, 0.47, 0.3, 0.078, 2.42) * 1000.0).round() / 1000.0,
                21.0 + rng.gen_range(0..25) as f64,
            ];
            let p = 1.0 / (1.0 + (-true_logit(&x)).exp());
            let outcome = if rng.gen_range(0.0..1.0) < p { 1.0 } else { 0.0 };
            for (j, rate) in [(2, 0.05), (3, 0.25), (4, 0.45)] {
                if rng.gen_range(0.0..1.0) < rate {
                    x[j] = 0.0;
                }
            }
            [x[0], x[1], x[2], x[3], x[4], x[5], x[6], x[7], outcome]
        })
        .collect()
}

pub fn to_csv(rows: &[[f64; 9]]) -> String {
    let mut text = String::from(HEADER);
    text.push('\n');
    for row in rows {
        let cells: Vec<String> = row.iter().map(|v| v.to_string()).collect();
        let _ = writeln!(text, "{}", cells.join(","));
    }
    text
}

pub fn write_cohort(path: &Path, n: usize, seed: u64) {
    fs::write(path, to_csv(&cohort(n, seed))).expect("write synthetic dataset");
}
