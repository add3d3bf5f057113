//! CLI end-to-end: synth -> single -> cross, plus registry inspection.

use assert_cmd::Command;
use predicates::prelude::*;

fn fuzzydup() -> Command {
    Command::cargo_bin("fuzzydup").expect("binary builds")
}

#[test]
fn test_synth_single_cross_pipeline() {
    let dir = tempfile::TempDir::new().unwrap();
    let sample = dir.path().join("crm_sample.csv");
    let out_dir = dir.path().join("outputs");

    fuzzydup()
        .args(["synth", "--rows", "80", "--dup-fraction", "0.15", "--seed", "7", "-o"])
        .arg(&sample)
        .assert()
        .success()
        .stdout(predicate::str::contains("Generated"));
    assert!(sample.exists());

    fuzzydup()
        .arg("single")
        .arg(&sample)
        .args(["--fuzzy", "first_name,last_name", "--exact", "email", "-o"])
        .arg(&out_dir)
        .assert()
        .success()
        .stdout(predicate::str::contains("Processed"));

    let single_output = out_dir.join("crm_sample_Output.xlsx");
    assert!(single_output.exists());
    assert!(out_dir.join("processed_outputs.json").exists());

    // Cross mode consumes the per-source output workbook's final sheet.
    let precedence = dir.path().join("precedence.csv");
    std::fs::write(&precedence, "source_system,precedence\ncrm_sample,1\n").unwrap();

    fuzzydup()
        .arg("cross")
        .arg(&single_output)
        .args(["--fuzzy", "first_name,last_name", "--exact", "email"])
        .arg("--precedence")
        .arg(&precedence)
        .arg("-o")
        .arg(&out_dir)
        .assert()
        .success()
        .stdout(predicate::str::contains("cross-system"));

    assert!(out_dir.join("All_Final_Sheets_Combined.xlsx").exists());
    assert!(out_dir.join("CrossSystem_Winner_Output.xlsx").exists());
}

#[test]
fn test_single_json_stats() {
    let dir = tempfile::TempDir::new().unwrap();
    let sample = dir.path().join("erp_batch.csv");
    std::fs::write(
        &sample,
        "Cust_Id,first_name,last_name,email,Transaction Date\n\
         1,Jon,Doe,a@x.com,2024-01-01\n\
         2,John,Doe,a@x.com,2024-06-01\n\
         3,Alice,Roe,b@x.com,2024-02-01\n",
    )
    .unwrap();

    fuzzydup()
        .arg("single")
        .arg(&sample)
        .args([
            "--fuzzy",
            "first_name,last_name",
            "--exact",
            "email",
            "--overall-threshold",
            "85",
            "--json",
            "-o",
        ])
        .arg(dir.path().join("outputs"))
        .assert()
        .success()
        .stdout(predicate::str::contains("\"duplicate_records\": 2"));
}

#[test]
fn test_single_requires_match_columns() {
    let dir = tempfile::TempDir::new().unwrap();
    let sample = dir.path().join("x.csv");
    std::fs::write(&sample, "Cust_Id,a\n1,foo\n").unwrap();

    fuzzydup()
        .arg("single")
        .arg(&sample)
        .assert()
        .failure()
        .stderr(predicate::str::contains("no matching columns"));
}

#[test]
fn test_outputs_list_empty() {
    let dir = tempfile::TempDir::new().unwrap();
    fuzzydup()
        .args(["outputs", "list", "-o"])
        .arg(dir.path().join("outputs"))
        .assert()
        .success()
        .stdout(predicate::str::contains("No recorded outputs"));
}
