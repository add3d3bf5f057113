//! Synthetic customer datasets
//!
//! Deterministic (seeded) generator used by benchmarks, demos, and the CLI
//! `synth` command. A fraction of rows are seeded as fuzzy duplicates of
//! other rows: the name is perturbed by a trailing character while the email
//! is copied exactly, which is the shape the matcher is tuned for.

use chrono::{Days, NaiveDate};
use rand::rngs::StdRng;
use rand::{RngExt, SeedableRng};

use crate::table::{Table, Value};

const LETTERS: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ";
const CITIES: [&str; 5] = ["New York", "Los Angeles", "Chicago", "Houston", "Phoenix"];
const STATES: [&str; 5] = ["NY", "CA", "IL", "TX", "AZ"];
const SUFFIXES: [&str; 3] = ["Inc", "LLC", "Corp"];

fn random_string(rng: &mut StdRng, len: usize) -> String {
    (0..len)
        .map(|_| LETTERS[rng.random_range(0..LETTERS.len())] as char)
        .collect()
}

fn pick<'a>(rng: &mut StdRng, options: &[&'a str]) -> &'a str {
    options[rng.random_range(0..options.len())]
}

/// Generate `rows` synthetic customer records with roughly
/// `rows * dup_fraction` seeded near-duplicate pairs.
///
/// Same seed, same table.
pub fn generate(rows: usize, dup_fraction: f64, seed: u64) -> Table {
    let mut rng = StdRng::seed_from_u64(seed);

    let mut first_names: Vec<String> = (0..rows)
        .map(|_| {
            let len = rng.random_range(3..=10);
            random_string(&mut rng, len)
        })
        .collect();
    let mut last_names: Vec<String> = (0..rows)
        .map(|_| {
            let len = rng.random_range(4..=12);
            random_string(&mut rng, len)
        })
        .collect();
    let mut emails: Vec<String> = (0..rows)
        .map(|_| {
            format!(
                "{}@{}.com",
                random_string(&mut rng, 5),
                random_string(&mut rng, 5)
            )
        })
        .collect();

    // Seed fuzzy duplicates: copy last name and email, nudge the first name.
    let dup_count = (rows as f64 * dup_fraction.clamp(0.0, 1.0)) as usize;
    for _ in 0..dup_count {
        if rows < 2 {
            break;
        }
        let original = rng.random_range(0..rows);
        let duplicate = rng.random_range(0..rows);
        if original == duplicate {
            continue;
        }
        first_names[duplicate] = format!("{}x", first_names[original]);
        last_names[duplicate] = last_names[original].clone();
        emails[duplicate] = emails[original].clone();
    }

    let base = NaiveDate::from_ymd_opt(2023, 1, 1).expect("static calendar date");
    let mut table = Table::new([
        "Cust_Id",
        "first_name",
        "last_name",
        "email",
        "phone1",
        "company_name",
        "address",
        "city",
        "state",
        "zip",
        "Transaction_Date",
    ]);

    for i in 0..rows {
        let phone = format!("555-{}", rng.random_range(1000..=9999));
        let company = format!("{} {}", random_string(&mut rng, 8), pick(&mut rng, &SUFFIXES));
        let address = format!(
            "{} {} St",
            rng.random_range(100..=9999),
            random_string(&mut rng, 8)
        );
        let city = pick(&mut rng, &CITIES).to_string();
        let state = pick(&mut rng, &STATES).to_string();
        let zip = format!("{}", rng.random_range(10000..=99999));
        let date = base
            .checked_add_days(Days::new(i as u64))
            .unwrap_or(base);

        table.push_row(vec![
            Value::Int(i as i64 + 1),
            Value::Str(first_names[i].clone()),
            Value::Str(last_names[i].clone()),
            Value::Str(emails[i].clone()),
            Value::Str(phone),
            Value::Str(company),
            Value::Str(address),
            Value::Str(city),
            Value::Str(state),
            Value::Str(zip),
            Value::Date(date),
        ]);
    }

    tracing::debug!(rows, seeded_duplicates = dup_count, seed, "generated synthetic dataset");
    table
}
