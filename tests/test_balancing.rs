//! Integration test: stratified splitting and SMOTE balancing of labeled tables

use churnflow::error::ChurnError;
use churnflow::feature_engineering::{LabeledTable, N_FEATURES};
use churnflow::synthetic::ClassBalancer;
use churnflow::training::StratifiedSplitter;
use ndarray::{Array1, Array2};

fn imbalanced(n0: usize, n1: usize) -> LabeledTable {
    let n = n0 + n1;
    let x = Array2::from_shape_fn((n, N_FEATURES), |(i, j)| {
        let base = if i < n0 { 0.0 } else { 50.0 };
        base + ((i * 7 + j * 3) % 11) as f64
    });
    let y = Array1::from_shape_fn(n, |i| i64::from(i >= n0));
    LabeledTable::new(x, y).unwrap()
}

#[test]
fn test_ninety_ten_balances_to_ninety_ninety() {
    let table = imbalanced(90, 10);
    let (balanced, n_synthetic) = ClassBalancer::new().balance(&table).unwrap();

    let counts = balanced.class_counts();
    assert_eq!(counts[&0], 90);
    assert_eq!(counts[&1], 90);
    assert_eq!(n_synthetic, 80);

    // Majority rows come through untouched, in order
    let original_majority = table.x().slice(ndarray::s![..90, ..]);
    let kept_majority = balanced.x().slice(ndarray::s![..90, ..]);
    assert_eq!(original_majority, kept_majority);
}

#[test]
fn test_synthetic_rows_stay_inside_minority_hull() {
    let table = imbalanced(90, 10);
    let (balanced, _) = ClassBalancer::new().with_seed(3).balance(&table).unwrap();

    for (row, &label) in balanced.x().rows().into_iter().zip(balanced.y().iter()).skip(100) {
        assert_eq!(label, 1);
        for (j, &v) in row.iter().enumerate() {
            let column = table.x().column(j);
            let min = column.iter().skip(90).cloned().fold(f64::INFINITY, f64::min);
            let max = column.iter().skip(90).cloned().fold(f64::NEG_INFINITY, f64::max);
            assert!(v >= min - 1e-9 && v <= max + 1e-9);
        }
    }
}

#[test]
fn test_single_class_is_unchanged() {
    let table = imbalanced(25, 0);
    let (balanced, n_synthetic) = ClassBalancer::new().balance(&table).unwrap();
    assert_eq!(n_synthetic, 0);
    assert_eq!(balanced.x(), table.x());
    assert_eq!(balanced.y(), table.y());
}

#[test]
fn test_balancing_is_seed_deterministic() {
    let table = imbalanced(40, 8);
    let (a, _) = ClassBalancer::new().with_seed(11).balance(&table).unwrap();
    let (b, _) = ClassBalancer::new().with_seed(11).balance(&table).unwrap();
    assert_eq!(a.x(), b.x());
}

#[test]
fn test_lone_minority_row_cannot_be_oversampled() {
    let table = imbalanced(20, 1);
    assert!(matches!(
        ClassBalancer::new().balance(&table),
        Err(ChurnError::InsufficientData(_))
    ));
}

#[test]
fn test_split_is_deterministic_and_stratified() {
    let table = imbalanced(85, 15);
    let splitter = StratifiedSplitter::new(0.2).with_seed(42);

    let (train_a, test_a) = splitter.split(&table).unwrap();
    let (train_b, test_b) = splitter.split(&table).unwrap();
    assert_eq!(train_a.x(), train_b.x());
    assert_eq!(test_a.y(), test_b.y());

    assert_eq!(test_a.n_rows(), 20);
    assert_eq!(train_a.n_rows(), 80);
    // round(15 * 0.2) = 3 churners in test
    assert_eq!(test_a.class_counts()[&1], 3);
    assert!((test_a.churn_rate() - table.churn_rate()).abs() <= 1.0 / test_a.n_rows() as f64);
}

#[test]
fn test_split_then_balance_leaves_test_natural() {
    let table = imbalanced(85, 15);
    let (train, test) = StratifiedSplitter::new(0.2).split(&table).unwrap();
    let (balanced, _) = ClassBalancer::new().balance(&train).unwrap();

    assert_eq!(balanced.class_counts()[&0], balanced.class_counts()[&1]);
    assert_eq!(test.class_counts()[&0], 17);
    assert_eq!(test.class_counts()[&1], 3);
}
