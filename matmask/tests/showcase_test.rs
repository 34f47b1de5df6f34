use matmask::errors::MatMaskError;
use matmask::party::{DEFAULT_MASK_DIMENSION, ProtocolParams, Threshold, run_local};
use matmask::table::{DEFAULT_DELIMITER, LabeledTable, read_table};

use std::sync::Once;

static INIT: Once = Once::new();

fn init_logging() {
    INIT.call_once(|| {
        let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
            .is_test(true)
            .try_init();
    });
}

fn demo_table(name: &str) -> Result<LabeledTable, MatMaskError> {
    let path = format!("{}/../demos/{}", env!("CARGO_MANIFEST_DIR"), name);
    read_table(path, DEFAULT_DELIMITER)
}

#[test]
fn showcase_school_admissions() -> Result<(), MatMaskError> {
    init_logging();

    let scores = demo_table("scores.csv")?;
    let weights = demo_table("weights.csv")?;
    let threshold = Threshold::from_table(&demo_table("thresholds.csv")?)?;

    assert_eq!(scores.values.shape(), (4, DEFAULT_MASK_DIMENSION));
    assert_eq!(weights.values.shape(), (DEFAULT_MASK_DIMENSION, 4));
    assert_eq!(
        weights.column_labels,
        vec!["school_a", "school_b", "school_c", "school_d"]
    );

    let params = ProtocolParams::try_with(
        DEFAULT_MASK_DIMENSION,
        scores.values.rows(),
        weights.values.cols(),
    )?;
    let run = run_local(params, scores.values, weights.values, threshold)?;

    log::debug!("Recombined product:\n{}", run.product);

    let expected_product = vec![
        vec![375.0, 382.5, 480.0, 415.0],
        vec![355.0, 440.0, 382.5, 385.0],
        vec![450.0, 492.0, 541.0, 500.0],
        vec![225.0, 270.0, 257.5, 245.0],
    ];
    for (got, want) in run.product.iter_rows().zip(&expected_product) {
        for (g, w) in got.iter().zip(want) {
            assert!((g - w).abs() < 1e-6, "{} != {}", g, w);
        }
    }

    assert_eq!(
        run.decision.as_matrix().to_rows(),
        vec![
            vec![1.0, 0.0, 1.0, 0.0],
            vec![0.0, 1.0, 0.0, 0.0],
            vec![1.0, 1.0, 1.0, 1.0],
            vec![0.0, 0.0, 0.0, 0.0],
        ]
    );
    assert_eq!(run.decision.pass_count(), 7);
    assert_eq!(scores.row_labels, vec!["S1", "S2", "S3", "S4"]);
    Ok(())
}
