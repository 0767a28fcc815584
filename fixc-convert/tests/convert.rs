use std::fs;

use fixc_convert::{convert, ConvertError, Dataset, ModelParams};
use fixc_ir::WordLength;
use proptest::prelude::*;

const MODEL: &str = "\
# linear model
Z 2 3
0.5 -1.0 0.25
2.0 0.0 -0.125
b 2
0.1
-0.1
g
3.5
";

#[test]
fn text_model_parses_shapes_and_values() {
    let params = ModelParams::parse(MODEL, "model.txt").expect("parse");
    assert_eq!(params.len(), 3);
    let z = params.get("Z").expect("Z");
    assert_eq!(z.shape, vec![2, 3]);
    assert_eq!(z.values[3], 2.0);
    assert_eq!(z.max_abs(), 2.0);
    assert!(params.get("g").expect("g").shape.is_empty());
}

#[test]
fn value_count_must_match_shape() {
    let err = ModelParams::parse("Z 2 2\n1 2 3\n", "m").expect_err("short tensor");
    match err {
        ConvertError::Parse { line, message, .. } => {
            assert_eq!(line, 1);
            assert!(message.contains("declares 4 values but 3"), "{message}");
        }
        other => panic!("unexpected error {other:?}"),
    }
}

#[test]
fn nan_and_inf_are_values_not_headers() {
    for bad in ["nan", "inf", "NaN", "infinity"] {
        let text = format!("W 1 2\n{bad} 0.5\n");
        match ModelParams::parse(&text, "m").expect_err(bad) {
            ConvertError::Parse { line, message, .. } => {
                assert_eq!(line, 2, "{bad}");
                assert!(message.contains("non-finite"), "{message}");
            }
            other => panic!("unexpected error {other:?}"),
        }
    }
}

#[test]
fn values_before_header_are_rejected() {
    assert!(ModelParams::parse("1.0 2.0\n", "m").is_err());
}

#[test]
fn tsv_reads_label_first() {
    let ds = Dataset::from_tsv("1\t0.5\t-2\n0\t1.5\t3\n\n", "d").expect("tsv");
    assert_eq!(ds.labels, vec![1, 0]);
    assert_eq!(ds.cols, 2);
    assert_eq!(ds.rows[1], vec![1.5, 3.0]);
}

#[test]
fn tsv_rejects_ragged_rows() {
    let err = Dataset::from_tsv("1\t0.5\t-2\n0\t1.5\n", "d").expect_err("ragged");
    assert!(err.to_string().contains("expected 2 features"));
}

#[test]
fn binary_layout_is_little_endian_header_then_rows() {
    let ds = Dataset {
        cols: 1,
        labels: vec![3],
        rows: vec![vec![1.0]],
    };
    let bytes = ds.to_bytes();
    assert_eq!(&bytes[0..4], &1u32.to_le_bytes());
    assert_eq!(&bytes[4..8], &1u32.to_le_bytes());
    assert_eq!(&bytes[8..12], &3i32.to_le_bytes());
    assert_eq!(&bytes[12..16], &1.0f32.to_le_bytes());
}

#[test]
fn truncated_binary_is_a_layout_error() {
    let mut bytes = Dataset {
        cols: 2,
        labels: vec![0, 1],
        rows: vec![vec![0.0, 1.0], vec![2.0, 3.0]],
    }
    .to_bytes();
    bytes.pop();
    assert!(matches!(
        Dataset::from_bytes(&bytes),
        Err(ConvertError::Layout { .. })
    ));
}

#[test]
fn convert_writes_all_outputs() {
    let dir = tempfile::tempdir().expect("tempdir");
    let model = dir.path().join("model.txt");
    let train = dir.path().join("train.tsv");
    fs::write(&model, MODEL).unwrap();
    fs::write(&train, "1\t0.5\t-2\t1\n0\t1.5\t3\t0\n").unwrap();

    let out = dir.path().join("out");
    let converted = convert(&model, Some(&train), None, &out, 15, WordLength::W16).expect("convert");

    assert_eq!(converted.scales.get("Z"), Some(13));
    assert!(converted.test_bin.is_none());
    let train_bin = converted.train_bin.expect("train binary");
    let ds = Dataset::read_binary(&train_bin).expect("read back");
    assert_eq!(ds.labels, vec![1, 0]);
    let header = fs::read_to_string(&converted.header).unwrap();
    assert!(header.contains("FIXC_SCALE_g"));
    assert!(out.join("scales.json").exists());
}

proptest! {
    #[test]
    fn binary_layout_preserves_rows(
        rows in proptest::collection::vec((any::<i32>(), proptest::collection::vec(-1e3f32..1e3, 3)), 0..8)
    ) {
        let ds = Dataset {
            cols: 3,
            labels: rows.iter().map(|r| r.0).collect(),
            rows: rows.iter().map(|r| r.1.clone()).collect(),
        };
        let back = Dataset::from_bytes(&ds.to_bytes()).unwrap();
        prop_assert_eq!(back.labels, ds.labels);
        prop_assert_eq!(back.rows, ds.rows);
    }
}
