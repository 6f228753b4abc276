use super::*;
use approx::assert_relative_eq;

use crate::input::{InputError, MatrixBundle};
use crate::model::matrix::Matrix;
use crate::output::OutputError;
use crate::protocol::RunErrorKind;
use crate::protocol::relay::run_relay;

struct MemorySource {
    bundle: MatrixBundle,
}

impl MatrixSource for MemorySource {
    fn load(&self) -> Result<MatrixBundle, InputError> {
        Ok(self.bundle.clone())
    }
}

#[derive(Default)]
struct MemorySink {
    matrix: Option<Matrix>,
    sample_names: Option<Vec<String>>,
    gene_names: Option<Vec<String>>,
    norm_factors: Option<Vec<f64>>,
    scaling_factor: Option<f64>,
    failure: Option<String>,
}

impl ResultSink for MemorySink {
    fn write_result(&mut self, result: &NormalizedResult<'_>) -> Result<(), OutputError> {
        self.matrix = Some(result.matrix.clone());
        self.sample_names = result.sample_names.map(<[String]>::to_vec);
        self.gene_names = result.gene_names.map(<[String]>::to_vec);
        self.norm_factors = result.norm_factors.map(<[f64]>::to_vec);
        self.scaling_factor = result.scaling_factor;
        Ok(())
    }

    fn report_failure(&mut self, error: &RunError) {
        self.failure = Some(error.to_string());
    }
}

fn bundle_from(rows: &[Vec<f64>]) -> MatrixBundle {
    MatrixBundle {
        matrix: Matrix::from_rows(rows).unwrap(),
        sample_names: None,
        gene_names: None,
    }
}

fn test_params() -> DriverParams {
    DriverParams {
        poll_interval: Duration::from_millis(2),
        finish_grace: Duration::from_millis(50),
    }
}

/// Runs a whole federation over in-memory sources; site 0 coordinates.
fn run_federation(mode: Mode, bundles: Vec<MatrixBundle>) -> Vec<(Result<(), RunError>, MemorySink)> {
    let sites = bundles.len();
    let mut mailboxes = Vec::with_capacity(sites);
    let mut workers = Vec::with_capacity(sites);
    for (idx, bundle) in bundles.into_iter().enumerate() {
        let role = if idx == 0 {
            Role::coordinator(sites)
        } else {
            Role::Participant
        };
        let mut driver = ProtocolDriver::new(mode, role, test_params());
        mailboxes.push(driver.mailbox());
        workers.push(std::thread::spawn(move || {
            let source = MemorySource { bundle };
            let mut sink = MemorySink::default();
            let outcome = driver.run(&source, &mut sink);
            (outcome, sink)
        }));
    }
    run_relay(&mailboxes[0], &mailboxes[1..]);
    workers.into_iter().map(|w| w.join().unwrap()).collect()
}

#[test]
fn test_quantile_two_sites_end_to_end() {
    let mut labeled = bundle_from(&[
        vec![5.0, 2.0],
        vec![2.0, 1.0],
        vec![3.0, 4.0],
        vec![4.0, 5.0],
    ]);
    labeled.sample_names = Some(vec!["s1".to_string(), "s2".to_string()]);
    labeled.gene_names = Some(vec![
        "g1".to_string(),
        "g2".to_string(),
        "g3".to_string(),
        "g4".to_string(),
    ]);
    let results = run_federation(
        Mode::Quantile,
        vec![
            labeled,
            bundle_from(&[
                vec![3.0, 1.0],
                vec![2.0, 2.0],
                vec![6.0, 4.0],
                vec![1.0, 3.0],
            ]),
        ],
    );

    let (outcome_a, sink_a) = &results[0];
    let (outcome_b, sink_b) = &results[1];
    assert!(outcome_a.is_ok(), "coordinator failed: {outcome_a:?}");
    assert!(outcome_b.is_ok(), "participant failed: {outcome_b:?}");

    let matrix_a = sink_a.matrix.as_ref().unwrap();
    assert_eq!(matrix_a.column(0), &[5.0, 1.25, 2.25, 3.5]);
    assert_eq!(matrix_a.column(1), &[2.25, 1.25, 3.5, 5.0]);
    assert!(sink_a.norm_factors.is_none());
    // Labels of the output equal the labels of the input.
    assert_eq!(sink_a.sample_names.as_ref().unwrap(), &vec!["s1", "s2"]);
    assert_eq!(
        sink_a.gene_names.as_ref().unwrap(),
        &vec!["g1", "g2", "g3", "g4"]
    );

    let matrix_b = sink_b.matrix.as_ref().unwrap();
    assert_eq!(matrix_b.column(0), &[3.5, 2.25, 5.0, 1.25]);
    assert_eq!(matrix_b.column(1), &[1.25, 2.25, 5.0, 3.5]);
    assert!(sink_b.sample_names.is_none());
}

#[test]
fn test_upper_quartile_two_sites_end_to_end() {
    let results = run_federation(
        Mode::UpperQuartile,
        vec![
            bundle_from(&[
                vec![2.0, 4.0],
                vec![0.0, 0.0],
                vec![6.0, 8.0],
                vec![4.0, 2.0],
            ]),
            bundle_from(&[
                vec![1.0, 2.0],
                vec![0.0, 0.0],
                vec![3.0, 4.0],
                vec![5.0, 6.0],
            ]),
        ],
    );

    let quartiles: [f64; 4] = [5.0 / 12.0, 6.0 / 14.0, 4.0 / 9.0, 5.0 / 12.0];
    let expected_factor =
        (quartiles.iter().map(|v| v.ln()).sum::<f64>() / quartiles.len() as f64).exp();

    for (outcome, sink) in &results {
        assert!(outcome.is_ok(), "site failed: {outcome:?}");
        assert_relative_eq!(
            sink.scaling_factor.unwrap(),
            expected_factor,
            epsilon = 1e-12
        );
        let matrix = sink.matrix.as_ref().unwrap();
        // The shared zero row survives with its original index.
        assert_eq!(matrix.n_rows(), 4);
        assert_eq!(matrix.get(1, 0), 0.0);
        assert_eq!(matrix.get(1, 1), 0.0);
    }

    let (_, sink_a) = &results[0];
    let factors_a = sink_a.norm_factors.as_ref().unwrap();
    assert_relative_eq!(factors_a[0], quartiles[0] / expected_factor, epsilon = 1e-12);
    assert_relative_eq!(factors_a[1], quartiles[1] / expected_factor, epsilon = 1e-12);
    let matrix_a = sink_a.matrix.as_ref().unwrap();
    assert_relative_eq!(matrix_a.get(0, 0), 2.0 / factors_a[0], epsilon = 1e-12);
    assert_relative_eq!(matrix_a.get(2, 1), 8.0 / factors_a[1], epsilon = 1e-12);
}

#[test]
fn test_single_site_coordinator_runs_alone() {
    let mut driver = ProtocolDriver::new(Mode::Quantile, Role::coordinator(1), test_params());
    let source = MemorySource {
        bundle: bundle_from(&[
            vec![5.0, 2.0],
            vec![2.0, 1.0],
            vec![3.0, 4.0],
            vec![4.0, 5.0],
        ]),
    };
    let mut sink = MemorySink::default();
    driver.run(&source, &mut sink).unwrap();

    let matrix = sink.matrix.unwrap();
    assert_eq!(matrix.column(0), &[5.0, 1.5, 2.5, 4.0]);
    assert_eq!(matrix.column(1), &[2.5, 1.5, 4.0, 5.0]);
}

#[test]
fn test_cancel_aborts_a_waiting_participant() {
    let mut driver = ProtocolDriver::new(Mode::Quantile, Role::Participant, test_params());
    let mailbox = driver.mailbox();
    let worker = std::thread::spawn(move || {
        let source = MemorySource {
            bundle: bundle_from(&[vec![1.0, 2.0], vec![3.0, 4.0]]),
        };
        let mut sink = MemorySink::default();
        (driver.run(&source, &mut sink), sink)
    });

    // The participant parks in its first wait; cancel from the outside.
    std::thread::sleep(Duration::from_millis(20));
    mailbox.cancel();
    let (outcome, sink) = worker.join().unwrap();

    let err = outcome.unwrap_err();
    assert!(err.is_cancelled());
    assert_eq!(err.phase, "wait for aggregation");
    assert!(sink.failure.unwrap().contains("cancelled"));
    assert!(mailbox.is_finished());
    assert!(mailbox.has_failed());
}

#[test]
fn test_unexpected_payload_kind_is_a_protocol_error() {
    let mut driver = ProtocolDriver::new(Mode::Quantile, Role::Participant, test_params());
    let mailbox = driver.mailbox();
    // The broadcast a quantile participant expects is the global means.
    mailbox.handle_incoming(Payload::UqScalingFactor(2.0).encode());

    let source = MemorySource {
        bundle: bundle_from(&[vec![1.0, 2.0], vec![3.0, 4.0]]),
    };
    let mut sink = MemorySink::default();
    let err = driver.run(&source, &mut sink).unwrap_err();
    assert!(matches!(
        err.kind,
        RunErrorKind::Protocol(ProtocolError::UnexpectedPayload { .. })
    ));
}

#[test]
fn test_mismatched_row_counts_fail_at_the_coordinator() {
    let results = run_federation(
        Mode::Quantile,
        vec![
            bundle_from(&[vec![1.0], vec![2.0], vec![3.0]]),
            bundle_from(&[vec![1.0], vec![2.0]]),
        ],
    );

    let (outcome_coord, sink_coord) = &results[0];
    let err = outcome_coord.as_ref().unwrap_err();
    assert_eq!(err.phase, "global aggregation");
    assert!(err.to_string().contains("same number of rows"));
    assert!(sink_coord.failure.is_some());

    // The waiting participant is cancelled instead of hanging.
    let (outcome_part, _) = &results[1];
    assert!(outcome_part.as_ref().unwrap_err().is_cancelled());
}

#[test]
fn test_nan_aborts_an_upper_quartile_run() {
    let results = run_federation(
        Mode::UpperQuartile,
        vec![
            bundle_from(&[vec![1.0, f64::NAN], vec![2.0, 3.0]]),
            bundle_from(&[vec![1.0, 2.0], vec![3.0, 4.0]]),
        ],
    );

    let (outcome_coord, _) = &results[0];
    let err = outcome_coord.as_ref().unwrap_err();
    assert_eq!(err.phase, "local computation");
    assert!(err.to_string().contains("NaN not supported"));
    let (outcome_part, _) = &results[1];
    assert!(outcome_part.as_ref().unwrap_err().is_cancelled());
}
