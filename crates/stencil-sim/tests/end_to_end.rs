//! End-to-end harness test: simulations file in, verified runs and JSON
//! records out.

use stencil_sim::config::{Simulations, SynchronizerKind};
use stencil_sim::report::{Reports, RunRecord, FUNCTION_NAME};
use stencil_sim::runner::execute;
use stencil_sim::workload::Workload;
use stepsync::ThreadRegistry;

#[test]
fn test_simulations_file_drives_verified_runs() {
    ThreadRegistry::global().register_current_thread();

    let dir = tempfile::tempdir().unwrap();
    let simulations_path = dir.path().join("simulations.json");
    std::fs::write(
        &simulations_path,
        r#"{
            "iterations": 2,
            "workload": { "iterations": 4, "rows": 12, "spin": 20 },
            "runs": [
                { "synchronizer": "sequential" },
                { "synchronizer": "alt_bit" },
                { "synchronizer": "static_step_plus", "extras": { "step": 3 } },
                { "synchronizer": "dsp_prod_unblocks", "extras": { "step": 6 } }
            ]
        }"#,
    )
    .unwrap();

    let simulations = Simulations::load(&simulations_path).unwrap();
    assert_eq!(simulations.runs.len(), 4);

    let workload = Workload::new(3, simulations.workload);
    let mut reports = Reports::new();

    for run in &simulations.runs {
        let mut times = Vec::new();
        for _ in 0..simulations.iterations {
            let outcome = execute(run.synchronizer, run.extras, &workload, None).unwrap();
            times.push(outcome.seconds);

            if run.synchronizer == SynchronizerKind::StaticStepPlus {
                let iteration_times = outcome.iteration_times.expect("promise family records");
                assert_eq!(iteration_times.len(), workload.iterations);
                assert_eq!(iteration_times[0].len(), workload.threads);
            }
        }

        reports.add_run(RunRecord {
            synchronizer: run.synchronizer.name().to_owned(),
            function: FUNCTION_NAME.to_owned(),
            extras: run.extras,
            times,
        });
    }

    let runs_path = dir.path().join("runs.json");
    reports.write_runs(Some(&runs_path)).unwrap();

    let parsed: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&runs_path).unwrap()).unwrap();
    let records = parsed.as_array().unwrap();
    assert_eq!(records.len(), 4);
    assert_eq!(records[0]["synchronizer"], "sequential");
    assert_eq!(records[3]["times"].as_array().unwrap().len(), 2);
}

#[test]
fn test_malformed_simulations_file_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("bad.json");
    std::fs::write(&path, r#"{ "iterations": 1 }"#).unwrap();

    assert!(Simulations::load(&path).is_err());
}
