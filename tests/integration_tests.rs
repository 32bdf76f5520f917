use delivery_fare::config::{DegeneratePolicy, MalformedPolicy, PipelineConfig};
use delivery_fare::error::PipelineError;
use delivery_fare::output::{write_fares, write_fares_to};
use delivery_fare::pipeline::{FareRun, LocationRecord, PointFilter};
use delivery_fare::{compute_fare, estimate_fares, geo_distance, process_stream};
use std::fs;
use std::fs::File;
use std::io::BufReader;

const SAMPLE: &str = "id_delivery,lat,lng,timestamp
1,35.0,51.0,1609459200
1,35.1,51.1,1609459260
2,36.0,52.0,1609459320
2,36.1,52.1,1609459380
";

// Same route as SAMPLE, one hour per leg starting at 06:00 UTC.
const SAMPLE_HOURLY: &str = "id_delivery,lat,lng,timestamp
1,35.0,51.0,1609480800
1,35.1,51.1,1609484400
2,36.0,52.0,1609484400
2,36.1,52.1,1609488000
";

async fn run(data: &'static str, config: PipelineConfig) -> FareRun {
    estimate_fares(data.as_bytes(), config).await.unwrap()
}

fn render(run: &FareRun) -> String {
    let mut buffer = Vec::new();
    write_fares_to(&mut buffer, &run.aggregate.fares).unwrap();
    String::from_utf8(buffer).unwrap()
}

#[tokio::test]
async fn test_sample_yields_one_row_per_trip_in_order() {
    let run = run(SAMPLE, PipelineConfig::default()).await;

    assert_eq!(run.ingest.chunks_produced, 2);
    // each second fix is ~14 km away after one minute, far above 100 km/h
    assert_eq!(run.aggregate.points_dropped, 2);
    assert_eq!(run.aggregate.degenerate_trips, 2);
    assert_eq!(
        render(&run),
        "id_delivery,fare_estimate\n1,0.00\n2,0.00\n"
    );
}

#[tokio::test]
async fn test_sample_with_degenerate_trips_omitted() {
    let config = PipelineConfig {
        degenerate: DegeneratePolicy::Omit,
        ..Default::default()
    };
    let run = run(SAMPLE, config).await;

    assert!(run.aggregate.fares.is_empty());
    assert_eq!(run.aggregate.omitted_trips, 2);
}

#[tokio::test]
async fn test_hourly_sample_is_priced_at_day_rate() {
    let run = run(SAMPLE_HOURLY, PipelineConfig::default()).await;

    assert_eq!(run.aggregate.points_dropped, 0);
    assert_eq!(
        render(&run),
        "id_delivery,fare_estimate\n1,11.93\n2,11.88\n"
    );
}

#[tokio::test]
async fn test_fares_file_round_trip_through_disk() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("trips.csv");
    let output = dir.path().join("fares.csv");
    fs::write(&input, SAMPLE_HOURLY).unwrap();

    let file = BufReader::new(File::open(&input).unwrap());
    let run = estimate_fares(file, PipelineConfig::default()).await.unwrap();
    write_fares(output.to_str().unwrap(), &run.aggregate.fares).unwrap();

    let content = fs::read_to_string(&output).unwrap();
    let rows: Vec<_> = content.lines().collect();
    assert_eq!(rows, vec!["id_delivery,fare_estimate", "1,11.93", "2,11.88"]);
}

#[tokio::test]
async fn test_shuffled_trip_order_is_sorted_numerically() {
    let data = "id_delivery,lat,lng,timestamp
30,35.0,51.0,1609480800
30,35.001,51.0,1609480860
4,35.0,51.0,1609480800
4,35.001,51.0,1609480860
200,35.0,51.0,1609480800
200,35.001,51.0,1609480860
";
    let run = run(data, PipelineConfig::default()).await;
    let ids: Vec<_> = run.aggregate.fares.iter().map(|f| f.trip_id.as_str()).collect();

    assert_eq!(ids, vec!["4", "30", "200"]);
}

#[tokio::test]
async fn test_every_distinct_trip_id_gets_its_own_row() {
    let data = "id_delivery,lat,lng,timestamp
01,35.0,51.0,1609480800
01,35.001,51.0,1609480860
99999999999999999999,35.0,51.0,1609480800
99999999999999999999,35.001,51.0,1609480860
1,35.0,51.0,1609480800
1,35.001,51.0,1609480860
";
    let run = run(data, PipelineConfig::default()).await;
    let ids: Vec<_> = run.aggregate.fares.iter().map(|f| f.trip_id.as_str()).collect();

    assert_eq!(ids, vec!["01", "1", "99999999999999999999"]);
    assert_eq!(run.aggregate.duplicate_trips, 0);
}

#[tokio::test]
async fn test_malformed_rows_skip_or_abort() {
    let data = "id_delivery,lat,lng,timestamp
1,35.0,51.0,1609480800
1,35.001,,1609480860
1,35.001,51.0,1609480860
";
    let skipped = run(data, PipelineConfig::default()).await;
    assert_eq!(skipped.ingest.malformed_skipped, 1);
    assert_eq!(skipped.aggregate.fares.len(), 1);

    let config = PipelineConfig {
        on_malformed: MalformedPolicy::Abort,
        ..Default::default()
    };
    let err = estimate_fares(data.as_bytes(), config).await.unwrap_err();
    assert!(err.to_string().contains("line 3"));
}

#[tokio::test]
async fn test_non_numeric_trip_id_stops_the_run() {
    let data = "id_delivery,lat,lng,timestamp
1,35.0,51.0,1609480800
delivery-2,35.0,51.0,1609480800
";
    let err = estimate_fares(data.as_bytes(), PipelineConfig::default())
        .await
        .unwrap_err();

    assert!(matches!(err, PipelineError::InvalidTripIdentifier(e) if e.trip_id == "delivery-2"));
}

#[test]
fn test_core_entry_points_compose() {
    let records = vec![
        LocationRecord::new("1", 35.0, 51.0, 1609480800),
        LocationRecord::new("1", 35.001, 51.0, 1609480860),
        LocationRecord::new("1", 35.1, 51.0, 1609480920),
    ];

    let chunk = process_stream(records.clone()).next().unwrap();
    let filtered = PointFilter::default().filter(chunk.clone());
    assert_eq!(filtered.points(), &records[..2]);

    let result = compute_fare(chunk);
    assert_eq!(result.trip_id, "1");
    assert!(result.fare >= 3.47);
}

#[test]
fn test_geo_distance_known_value() {
    let d = geo_distance(51.5007, 0.1246, 40.6892, 74.0445);
    assert!((d - 5575.0).abs() / 5575.0 < 0.01);
}
