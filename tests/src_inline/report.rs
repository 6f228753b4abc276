use super::*;

#[test]
fn test_summary_serializes_every_field() {
    let dir = std::env::temp_dir().join(format!("fednorm_report_{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join("summary.json");

    write_summary(
        &path,
        &RunSummary {
            tool: "fednorm",
            version: "0.1.0",
            normalization: "upper quartile".to_string(),
            n_genes: 4,
            n_samples: 2,
            scaling_factor: Some(0.5),
            labeled: true,
        },
    )
    .unwrap();

    let value: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(value["tool"], "fednorm");
    assert_eq!(value["normalization"], "upper quartile");
    assert_eq!(value["n_genes"], 4);
    assert_eq!(value["scaling_factor"], 0.5);
    assert_eq!(value["labeled"], true);
}

#[test]
fn test_summary_omits_an_absent_scaling_factor() {
    let dir = std::env::temp_dir().join(format!("fednorm_report_q_{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join("summary.json");

    write_summary(
        &path,
        &RunSummary {
            tool: "fednorm",
            version: "0.1.0",
            normalization: "quantile".to_string(),
            n_genes: 1,
            n_samples: 1,
            scaling_factor: None,
            labeled: false,
        },
    )
    .unwrap();

    let text = std::fs::read_to_string(&path).unwrap();
    assert!(!text.contains("scaling_factor"));
}
