//! Integration test: configured pipelines reading and writing files

use serde_json::json;
use sluice_pipeline::{ErrorPolicy, Pipeline, PipelineConfig};
use sluice_value::Value;
use std::path::{Path, PathBuf};

fn data_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/data")
}

fn write_config(dir: &Path, policy: &str) -> PathBuf {
    write_config_with_errors(dir, policy, "{ type: json_lines, path: errors.jsonl }")
}

fn write_config_with_errors(dir: &Path, policy: &str, error_output: &str) -> PathBuf {
    let data = data_dir();
    let config = format!(
        r"
input: {{ type: json_lines, path: {input} }}
pipeline:
  max_in_flight: 2
  processors:
    - mapping: {{ file: {mapping} }}
error_policy: {policy}
error_output: {error_output}
output: {{ type: json_lines, path: out.jsonl }}
",
        input = data.join("orders.jsonl").display(),
        mapping = data.join("enrich.yaml").display(),
    );
    let path = dir.join("pipeline.yaml");
    std::fs::write(&path, config).unwrap();
    path
}

fn read_lines(path: &Path) -> Vec<serde_json::Value> {
    std::fs::read_to_string(path)
        .unwrap()
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect()
}

#[tokio::test]
async fn test_route_policy_end_to_end() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let config = PipelineConfig::from_file(&write_config(dir.path(), "route"))?;
    let pipeline = Pipeline::from_config(&config)?;
    assert_eq!(pipeline.error_policy(), ErrorPolicy::Route);

    let report = pipeline.run(&config).await?;
    assert_eq!(report.stats.received, 5);
    assert_eq!(report.stats.succeeded, 3);
    assert_eq!(report.stats.failed, 2);

    let outputs = read_lines(&dir.path().join("out.jsonl"));
    assert_eq!(
        outputs,
        vec![
            json!({"id": 1, "qty": 2, "price": 3, "total": 6, "size": "single"}),
            json!({"id": 2, "qty": 12, "price": 1, "total": 12, "size": "bulk"}),
            json!({"id": 5, "qty": 1, "price": 0.5, "total": 0.5, "size": "single"}),
        ]
    );

    let errors = read_lines(&dir.path().join("errors.jsonl"));
    assert_eq!(errors.len(), 2);
    assert_eq!(errors[0], json!({"id": 3, "qty": "many", "price": 1}));
    assert_eq!(errors[1], json!("this is not json"));

    assert!(report.outputs.is_empty());
    assert!(report.errors.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_routed_errors_carry_the_failure_reason() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let config = PipelineConfig::from_file(&write_config_with_errors(
        dir.path(),
        "route",
        "{ type: memory }",
    ))?;
    let report = Pipeline::from_config(&config)?.run(&config).await?;

    assert_eq!(report.errors.len(), 2);
    let error_text = report.errors[0].metadata("error").map(ToString::to_string);
    assert!(error_text.unwrap().contains("root.total"));
    assert!(report.errors[1].metadata("error").is_some());
    Ok(())
}

#[tokio::test]
async fn test_drop_policy_leaves_error_output_empty() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let config = PipelineConfig::from_file(&write_config(dir.path(), "drop"))?;
    let report = Pipeline::from_config(&config)?.run(&config).await?;

    assert_eq!(report.stats.succeeded, 3);
    assert_eq!(report.stats.failed, 2);
    assert_eq!(read_lines(&dir.path().join("out.jsonl")).len(), 3);
    assert!(read_lines(&dir.path().join("errors.jsonl")).is_empty());
    Ok(())
}

#[tokio::test]
async fn test_fail_policy_keeps_outputs_before_the_failure() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let config = PipelineConfig::from_file(&write_config(dir.path(), "fail"))?;
    let err = Pipeline::from_config(&config)?
        .run(&config)
        .await
        .unwrap_err();

    assert!(err.to_string().starts_with("Processing failed for message 2"));
    let outputs = read_lines(&dir.path().join("out.jsonl"));
    assert_eq!(outputs.len(), 2);
    assert_eq!(outputs[1]["id"], json!(2));
    Ok(())
}

#[tokio::test]
async fn test_memory_input_and_inline_mapping() -> anyhow::Result<()> {
    let yaml = r"
input:
  type: memory
  messages:
    - { name: ada }
    - { name: grace }
pipeline:
  processors:
    - mapping:
        name: greet
        mode: replace
        statements:
          - target: root.greeting
            expr: { op: add, lhs: { op: lit, value: 'hello ' }, rhs: { op: this, path: name } }
output: { type: memory }
";
    let config = PipelineConfig::from_yaml(yaml)?;
    let report = Pipeline::from_config(&config)?.run(&config).await?;

    let greetings: Vec<_> = report.outputs.iter().map(|m| m.payload.clone()).collect();
    assert_eq!(
        greetings,
        vec![
            Value::from(json!({"greeting": "hello ada"})),
            Value::from(json!({"greeting": "hello grace"})),
        ]
    );
    Ok(())
}
