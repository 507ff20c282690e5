#![allow(missing_docs)]

use std::collections::BTreeMap;

use nestore::format::NodeKind;
use nestore::{Dict, Nestore, Summary, Value, dict};

fn stored_sample() -> Dict {
    dict([
        ("amp", Value::from(0.05)),
        ("phase", Value::from(1.2345)),
        ("n", Value::from(7)),
        ("trace", Value::from(vec![vec![0.0, 1.0, 2.0], vec![3.0, 4.0, 5.0]])),
        (
            "wide",
            Value::dict((0..6).map(|i| (format!("p{i}"), Value::from(i)))),
        ),
        (
            "cfg",
            Value::dict([("rate", Value::from(250.0)), ("name", Value::from("fast"))]),
        ),
    ])
}

#[test]
fn test_summary_of_stored_data() -> nestore::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("summary.nst");
    Nestore::write(&path, stored_sample())?;

    let data = Nestore::read(&path, None::<&str>)?;
    let s = Nestore::summarize(&data);

    assert_eq!(s["amp"], Summary::Text("5.000e-02 (type : float)".into()));
    assert_eq!(s["phase"], Summary::Text("1.235 (type : float)".into()));
    assert_eq!(s["n"], Summary::Text("7 (type : int)".into()));
    assert_eq!(s["trace"], Summary::Text("shape: (2, 3) (type: ndarray)".into()));
    assert_eq!(s["wide"], Summary::Text("variable of type dict".into()));

    let cfg = s["cfg"].as_nested().expect("cfg expanded");
    assert_eq!(cfg["rate"].as_text(), Some("2.500e+02 (type : float)"));
    assert_eq!(cfg["name"].as_text(), Some("variable of type str"));
    Ok(())
}

#[test]
fn test_max_depth_option() {
    let data = dict([(
        "a",
        Value::dict([("b", Value::dict([("c", Value::dict([("d", 1)]))]))]),
    )]);

    let deep = Nestore::summarize(&data);
    let c = deep["a"].as_nested().and_then(|a| a["b"].as_nested()).expect("expanded");
    assert_eq!(c["c"].as_text(), Some("variable of type dict"));

    let flat = Nestore::options().max_depth(0).summarize(&data);
    assert_eq!(flat["a"].as_text(), Some("variable of type dict"));
}

#[test]
fn test_render_is_sorted_and_annotated() -> nestore::Result<()> {
    let data = dict([
        ("zeta", Value::from(3)),
        ("alpha", Value::dict([("volts", Value::from(vec![1.0, 2.0]))])),
    ]);
    let notes = BTreeMap::from([("volts".to_string(), " (V)".to_string())]);

    let out = Nestore::render(&data, Some(&notes))?;
    let expected = r#"{
    "alpha": {
        "volts" (V): "shape: (2,) (type: list)"
    },
    "zeta": "3 (type : int)"
}"#;
    assert_eq!(out, expected);

    let plain = Nestore::options().render(&data, None)?;
    assert!(plain.contains("\"volts\": "));
    Ok(())
}

#[test]
fn test_inspect_report() -> nestore::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("inspect.nst");
    Nestore::write(&path, stored_sample())?;

    let report = Nestore::inspect(&path)?;
    assert_eq!(report.version, nestore::format::FORMAT_VERSION);
    assert_eq!(report.file_size, std::fs::metadata(&path)?.len());
    assert_eq!(report.tree.kind, NodeKind::Group);
    assert_eq!(report.tree.child_count, 6);

    let trace = report
        .tree
        .children
        .iter()
        .find(|c| c.key == "trace")
        .expect("trace node");
    assert_eq!(trace.kind, NodeKind::Leaf);
    assert_eq!(
        trace.description.as_deref(),
        Some("Array<float64> shape (2, 3)")
    );

    let text = report.to_string();
    assert!(text.contains("trace"));
    assert!(text.contains("(group)"));

    let json = serde_json::to_value(&report)?;
    assert_eq!(json["tree"]["children"].as_array().map(Vec::len), Some(6));
    Ok(())
}
