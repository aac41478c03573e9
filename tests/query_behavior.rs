use std::fs;
use std::path::{Path, PathBuf};

use tempfile::{tempdir, TempDir};
use time::macros::datetime;

use pmstore::meta::distinct_transport_points;
use pmstore::{ingest_folder, query, EngineChoice, IngestOptions, QueryRequest, QueryResult};

const QFACTOR: &str = "QFACTOR-AVG";
const PREFEC: &str = "PREFEC-AVG";

/// Two-day store for NODE1 with both TP kinds and every missing-value token.
fn fixture_store() -> (TempDir, PathBuf) {
    let dir = tempdir().expect("tempdir");
    let src = dir.path().join("src");
    fs::create_dir(&src).expect("mkdir src");
    fs::write(
        src.join("pm.csv"),
        concat!(
            "Time,NE,TP,QFACTOR-AVG,PREFEC-AVG\n",
            "2025-06-10 00:00,NODE1,OTS-1,12.0,1e-5\n",
            "2025-06-10 00:15,NODE1,OCH-2,NS,2e-5\n",
            "2025-06-10 00:30,NODE1,OTS-1,,3e-5\n",
            "2025-06-11 00:00,NODE1,OCH-2,13.0,NA\n",
            "2025-06-11 00:15,NODE1,OTS-1,14.0,5e-5\n",
        ),
    )
    .expect("write csv");

    let out = dir.path().join("store");
    let summary = ingest_folder(&src, &out, &IngestOptions::default()).expect("ingest");
    assert_eq!(summary.rows_written, 5);
    assert_eq!(summary.segments_written, 2);
    (dir, out)
}

fn run(out: &Path, request: QueryRequest) -> QueryResult {
    query(out, &request).expect("query")
}

fn both_engines(mut request: QueryRequest, out: &Path) -> (QueryResult, QueryResult) {
    request.engine = EngineChoice::Pushdown;
    let pushdown = run(out, request.clone());
    request.engine = EngineChoice::PerSegment;
    let per_segment = run(out, request);
    (pushdown, per_segment)
}

fn assert_equivalent(a: &QueryResult, b: &QueryResult) {
    assert_eq!(a.times, b.times);
    assert_eq!(a.element_ids, b.element_ids);
    assert_eq!(a.transport_points, b.transport_points);
    assert_eq!(a.kpi_names, b.kpi_names);
    assert_eq!(a.kpi_values, b.kpi_values);
}

#[test]
fn start_after_end_yields_empty_table() {
    let (_dir, out) = fixture_store();
    let mut request = QueryRequest::new("NODE1", vec![QFACTOR.into()]);
    request.start = Some(datetime!(2025-06-11 00:00));
    request.end = Some(datetime!(2025-06-10 00:00));

    let (pushdown, per_segment) = both_engines(request, &out);
    assert!(pushdown.is_empty());
    assert!(per_segment.is_empty());
}

#[test]
fn time_bounds_are_inclusive() {
    let (_dir, out) = fixture_store();
    let mut request = QueryRequest::new("NODE1", vec![QFACTOR.into()]);
    request.start = Some(datetime!(2025-06-10 00:15));
    request.end = Some(datetime!(2025-06-11 00:00));

    let result = run(&out, request);
    assert_eq!(
        result.times,
        vec![
            datetime!(2025-06-10 00:15),
            datetime!(2025-06-10 00:30),
            datetime!(2025-06-11 00:00),
        ]
    );
}

#[test]
fn unmatched_tp_substring_yields_empty_table() {
    let (_dir, out) = fixture_store();
    let mut request = QueryRequest::new("NODE1", vec![QFACTOR.into()]);
    request.tp_contains = Some("zzz".into());

    let (pushdown, per_segment) = both_engines(request, &out);
    assert!(pushdown.is_empty());
    assert!(per_segment.is_empty());
}

#[test]
fn tp_substring_is_case_insensitive_in_both_backends() {
    let (_dir, out) = fixture_store();
    let mut request = QueryRequest::new("NODE1", vec![QFACTOR.into()]);
    request.tp_contains = Some("och".into());

    let (pushdown, per_segment) = both_engines(request, &out);
    assert_equivalent(&pushdown, &per_segment);
    assert_eq!(pushdown.len(), 2);
    assert!(pushdown
        .transport_points
        .iter()
        .all(|tp| tp.as_deref() == Some("OCH-2")));
}

#[test]
fn max_rows_keeps_the_latest_window() {
    let (_dir, out) = fixture_store();
    let mut request = QueryRequest::new("NODE1", vec![QFACTOR.into()]);
    request.max_rows = 2;

    let result = run(&out, request);
    assert_eq!(
        result.times,
        vec![datetime!(2025-06-11 00:00), datetime!(2025-06-11 00:15)]
    );
    assert_eq!(result.kpi(QFACTOR).unwrap(), &[Some(13.0), Some(14.0)]);
}

#[test]
fn missing_tokens_become_missing_values_not_errors() {
    let (_dir, out) = fixture_store();
    let request = QueryRequest::new("NODE1", vec![QFACTOR.into(), PREFEC.into()]);

    let result = run(&out, request);
    assert_eq!(result.len(), 5);
    assert_eq!(
        result.kpi(QFACTOR).unwrap(),
        &[Some(12.0), None, None, Some(13.0), Some(14.0)]
    );
    assert_eq!(
        result.kpi(PREFEC).unwrap(),
        &[Some(1e-5), Some(2e-5), Some(3e-5), None, Some(5e-5)]
    );
}

#[test]
fn unknown_kpi_is_silently_dropped() {
    let (_dir, out) = fixture_store();
    let request = QueryRequest::new("NODE1", vec![QFACTOR.into(), "NO-SUCH-KPI".into()]);

    let (pushdown, per_segment) = both_engines(request, &out);
    assert_equivalent(&pushdown, &per_segment);
    assert_eq!(pushdown.kpi_names, vec![QFACTOR.to_string()]);
    assert_eq!(pushdown.len(), 5);
}

#[test]
fn backends_agree_on_unfiltered_and_filtered_scans() {
    let (_dir, out) = fixture_store();

    let request = QueryRequest::new("NODE1", vec![QFACTOR.into(), PREFEC.into()]);
    let (pushdown, per_segment) = both_engines(request, &out);
    assert_equivalent(&pushdown, &per_segment);
    assert_eq!(pushdown.len(), 5);

    let mut request = QueryRequest::new("NODE1", vec![PREFEC.into()]);
    request.start = Some(datetime!(2025-06-10 00:10));
    request.tp_contains = Some("OTS".into());
    request.max_rows = 1;
    let (pushdown, per_segment) = both_engines(request, &out);
    assert_equivalent(&pushdown, &per_segment);
    assert_eq!(pushdown.times, vec![datetime!(2025-06-11 00:15)]);
}

#[test]
fn kpi_present_in_only_some_segments_is_null_elsewhere() {
    let (dir, out) = fixture_store();
    let extra_src = dir.path().join("src_extra");
    fs::create_dir(&extra_src).expect("mkdir src_extra");
    fs::write(
        extra_src.join("extra.csv"),
        concat!(
            "Time,NE,TP,OSNR-AVG\n",
            "2025-06-12 00:00,NODE1,OTS-1,33.0\n",
        ),
    )
    .expect("write csv");
    ingest_folder(&extra_src, &out, &IngestOptions::default()).expect("ingest extra");

    let request = QueryRequest::new("NODE1", vec!["OSNR-AVG".into()]);
    let result = run(&out, request);
    assert_eq!(result.kpi_names, vec!["OSNR-AVG".to_string()]);
    assert_eq!(result.len(), 6);
    let osnr = result.kpi("OSNR-AVG").unwrap();
    assert_eq!(osnr[..5], [None, None, None, None, None]);
    assert_eq!(osnr[5], Some(33.0));
}

#[test]
fn distinct_transport_points_are_exported() {
    let (_dir, out) = fixture_store();
    let names = distinct_transport_points(&out, "NODE1").expect("scan");
    let names: Vec<_> = names.into_iter().collect();
    assert_eq!(names, ["OCH-2", "OTS-1"]);
}
