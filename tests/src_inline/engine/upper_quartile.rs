use super::*;
use approx::assert_relative_eq;

use crate::engine::aggregate::CoordinatorAggregator;
use crate::input::MatrixBundle;
use crate::numeric::geometric_mean;

fn store_from(rows: &[Vec<f64>]) -> ParticipantStore {
    ParticipantStore::new(MatrixBundle {
        matrix: Matrix::from_rows(rows).unwrap(),
        sample_names: None,
        gene_names: None,
    })
}

fn site_a() -> ParticipantStore {
    store_from(&[
        vec![2.0, 4.0],
        vec![0.0, 0.0],
        vec![6.0, 8.0],
        vec![4.0, 2.0],
    ])
}

fn site_b() -> ParticipantStore {
    store_from(&[
        vec![1.0, 2.0],
        vec![0.0, 0.0],
        vec![3.0, 4.0],
        vec![5.0, 6.0],
    ])
}

#[test]
fn test_local_zeros_are_the_all_zero_rows() {
    let mut store = store_from(&[
        vec![0.0, 0.0],
        vec![1.0, 2.0],
        vec![0.0, 0.0],
        vec![0.0, 3.0],
    ]);
    compute_local_zeros(&mut store).unwrap();
    assert_eq!(store.local_zeros.get().unwrap(), &vec![0, 2]);
}

#[test]
fn test_nan_input_aborts() {
    let mut store = store_from(&[vec![1.0, f64::NAN], vec![2.0, 3.0]]);
    let err = compute_local_zeros(&mut store).unwrap_err();
    match err {
        EngineError::Input(msg) => assert_eq!(msg, "NaN not supported"),
        other => panic!("unexpected error: {other:?}"),
    }
}

#[test]
fn test_row_zero_at_only_one_site_is_retained() {
    let mut a = store_from(&[vec![0.0, 0.0], vec![1.0, 2.0], vec![3.0, 4.0]]);
    let mut b = store_from(&[vec![5.0, 6.0], vec![1.0, 2.0], vec![3.0, 4.0]]);
    compute_local_zeros(&mut a).unwrap();
    compute_local_zeros(&mut b).unwrap();

    let global = CoordinatorAggregator.global_zeros(&[
        a.local_zeros.get().unwrap().clone(),
        b.local_zeros.get().unwrap().clone(),
    ]);
    assert!(global.is_empty());
}

#[test]
fn test_two_site_factors_and_centering() {
    let mut a = site_a();
    let mut b = site_b();
    compute_local_zeros(&mut a).unwrap();
    compute_local_zeros(&mut b).unwrap();

    let aggregator = CoordinatorAggregator;
    let global_zeros = aggregator.global_zeros(&[
        a.local_zeros.get().unwrap().clone(),
        b.local_zeros.get().unwrap().clone(),
    ]);
    assert_eq!(global_zeros, vec![1]);

    a.global_zeros.set(global_zeros.clone()).unwrap();
    b.global_zeros.set(global_zeros).unwrap();
    compute_uquartile(&mut a).unwrap();
    compute_uquartile(&mut b).unwrap();

    // q75 / library size per sample after dropping the shared zero row.
    let ua = a.uquartile.get().unwrap().clone();
    let ub = b.uquartile.get().unwrap().clone();
    assert_relative_eq!(ua[0], 5.0 / 12.0, epsilon = 1e-12);
    assert_relative_eq!(ua[1], 6.0 / 14.0, epsilon = 1e-12);
    assert_relative_eq!(ub[0], 4.0 / 9.0, epsilon = 1e-12);
    assert_relative_eq!(ub[1], 5.0 / 12.0, epsilon = 1e-12);

    let concatenated: Vec<f64> = ua.iter().chain(ub.iter()).copied().collect();
    let factor = aggregator.global_scaling_factor(&concatenated).unwrap();

    a.scaling_factor.set(factor).unwrap();
    b.scaling_factor.set(factor).unwrap();
    compute_local_result(&mut a).unwrap();
    compute_local_result(&mut b).unwrap();

    // Centering law: the centered factors have geometric mean 1.
    let all_factors: Vec<f64> = a
        .normfac
        .get()
        .unwrap()
        .iter()
        .chain(b.normfac.get().unwrap().iter())
        .copied()
        .collect();
    assert_relative_eq!(geometric_mean(&all_factors).unwrap(), 1.0, epsilon = 1e-12);

    // The zero row is retained and stays zero; other rows are X / normfac.
    let result = a.result.get().unwrap();
    let normfac = a.normfac.get().unwrap();
    assert_eq!(result.get(1, 0), 0.0);
    assert_eq!(result.get(1, 1), 0.0);
    assert_relative_eq!(result.get(0, 0), 2.0 / normfac[0], epsilon = 1e-12);
    assert_relative_eq!(result.get(2, 1), 8.0 / normfac[1], epsilon = 1e-12);
    assert_eq!(result.n_rows(), 4);
}

#[test]
fn test_single_remaining_row_warns_with_unit_factors() {
    let mut store = store_from(&[vec![0.0, 0.0], vec![3.0, 4.0]]);
    store.global_zeros.set(vec![0]).unwrap();
    compute_uquartile(&mut store).unwrap();
    assert_eq!(store.uquartile.get().unwrap(), &vec![1.0, 1.0]);
}

#[test]
fn test_no_remaining_rows_aborts() {
    let mut store = store_from(&[vec![0.0, 0.0], vec![0.0, 0.0]]);
    store.global_zeros.set(vec![0, 1]).unwrap();
    assert!(matches!(
        compute_uquartile(&mut store),
        Err(EngineError::Input(_))
    ));
}

#[test]
fn test_empty_matrix_aborts() {
    let mut store = ParticipantStore::new(MatrixBundle {
        matrix: Matrix::zeros(0, 2),
        sample_names: None,
        gene_names: None,
    });
    assert!(matches!(
        compute_local_zeros(&mut store),
        Err(EngineError::Input(_))
    ));
}
