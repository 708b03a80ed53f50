use std::io::{Cursor, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use encoding_rs::IBM866;
use geoexport_core::{Exporter, ExportSettings, Ogr2Ogr};
use geoexport_core_common::{
    ConversionEngine, ConversionOutcome, ConversionRequest, EngineDriver, EngineError,
};
use geoexport_http::{AppState, GeoJsonFileLayer, LayerStore, build_app};
use reqwest::StatusCode;
use reqwest::header::{CONTENT_DISPOSITION, CONTENT_TYPE};
use serde_json::Value;
use tempfile::TempDir;
use tokio::task::JoinHandle;

const ROADS: &str = r#"{
    "type": "FeatureCollection",
    "features": [
        {"type": "Feature", "id": 1, "properties": {"name": "Main St", "lanes": 2},
         "geometry": {"type": "Point", "coordinates": [111319.49079327357, 0.0]}},
        {"type": "Feature", "id": 2, "properties": {"name": "Ring", "lanes": 1},
         "geometry": {"type": "MultiPoint", "coordinates": [[0.0, 0.0], [222638.98158654713, 0.0]]}}
    ]
}"#;

/// Produces the files `ogr2ogr` would, without running it.
struct ScriptedEngine {
    fail: bool,
}

#[async_trait]
impl ConversionEngine for ScriptedEngine {
    async fn list_drivers(&self) -> Result<Vec<EngineDriver>, EngineError> {
        Ok(["ESRI Shapefile", "CSV", "GeoJSON", "PostgreSQL"]
            .map(EngineDriver::named)
            .to_vec())
    }

    async fn convert(&self, request: &ConversionRequest) -> Result<ConversionOutcome, EngineError> {
        if self.fail {
            return Ok(ConversionOutcome {
                code: Some(1),
                stderr: format!("ERROR 1: cannot open {}", request.input.display()),
            });
        }
        std::fs::copy(&request.input, &request.output).unwrap();
        if request.driver == "ESRI Shapefile" {
            for ext in ["shx", "dbf", "prj"] {
                std::fs::write(request.output.with_extension(ext), ext).unwrap();
            }
        }
        Ok(ConversionOutcome {
            code: Some(0),
            stderr: String::new(),
        })
    }
}

struct TestServer {
    base: String,
    work_root: TempDir,
    _data: TempDir,
    shutdown: tokio::sync::oneshot::Sender<()>,
    handle: JoinHandle<()>,
}

impl TestServer {
    async fn stop(self) {
        let _ = self.shutdown.send(());
        let _ = self.handle.await;
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base)
    }

    /// Waits for the server to release every job file.
    async fn assert_work_root_empty(&self) {
        for _ in 0..50 {
            if residue(self.work_root.path()).is_empty() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        panic!("leftover files: {:?}", residue(self.work_root.path()));
    }
}

fn residue(root: &Path) -> Vec<PathBuf> {
    std::fs::read_dir(root)
        .unwrap()
        .map(|e| e.unwrap().path())
        .collect()
}

fn layers(data: &Path) -> LayerStore {
    let roads = data.join("roads.geojson");
    std::fs::write(&roads, ROADS).unwrap();
    LayerStore::new([
        GeoJsonFileLayer::new(12, "Roads", &roads),
        GeoJsonFileLayer::new(13, "Карта", &roads),
        GeoJsonFileLayer::new(14, "Secret", &roads).with_readers(vec!["s3cret".into()]),
        GeoJsonFileLayer::new(15, "Line\nBreak", &roads),
    ])
}

async fn start_server(engine: Arc<dyn ConversionEngine>, legacy: bool) -> TestServer {
    let work_root = TempDir::new().unwrap();
    let data = TempDir::new().unwrap();

    let exporter = Exporter::discover(
        engine,
        ExportSettings {
            work_root: work_root.path().to_path_buf(),
        },
    )
    .await
    .expect("driver discovery");
    let state = AppState::new(exporter, Arc::new(layers(data.path())))
        .with_legacy_unsupported_status(legacy);

    let app = build_app(state);
    let listener = tokio::net::TcpListener::bind((std::net::Ipv4Addr::LOCALHOST, 0))
        .await
        .unwrap();
    let addr = listener.local_addr().unwrap();
    let (tx, rx) = tokio::sync::oneshot::channel::<()>();
    let handle = tokio::spawn(async move {
        let _ = axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = rx.await;
            })
            .await;
    });

    TestServer {
        base: format!("http://{addr}"),
        work_root,
        _data: data,
        shutdown: tx,
        handle,
    }
}

async fn scripted(fail: bool, legacy: bool) -> TestServer {
    start_server(Arc::new(ScriptedEngine { fail }), legacy).await
}

fn zip_entries(bytes: &[u8]) -> Vec<(Vec<u8>, Vec<u8>)> {
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes.to_vec())).unwrap();
    (0..archive.len())
        .map(|i| {
            let mut file = archive.by_index(i).unwrap();
            let name = file.name_raw().to_vec();
            let mut content = Vec::new();
            file.read_to_end(&mut content).unwrap();
            (name, content)
        })
        .collect()
}

#[tokio::test]
async fn shapefile_export_is_a_named_zip_with_sidecars() {
    let server = scripted(false, false).await;
    let resp = reqwest::get(server.url("/resource/12/ogr_export/shp"))
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.headers()[CONTENT_TYPE], "application/zip");
    assert_eq!(
        resp.headers()[CONTENT_DISPOSITION],
        "attachment; filename=\"Roads.shp.zip\""
    );

    let body = resp.bytes().await.unwrap();
    let names: Vec<String> = zip_entries(&body)
        .into_iter()
        .map(|(name, _)| String::from_utf8(name).unwrap())
        .collect();
    assert_eq!(
        names,
        vec!["Roads/Roads.dbf", "Roads/Roads.prj", "Roads/Roads.shp", "Roads/Roads.shx"]
    );

    server.assert_work_root_empty().await;
    server.stop().await;
}

#[tokio::test]
async fn api_prefix_serves_the_same_export() {
    let server = scripted(false, false).await;
    let resp = reqwest::get(server.url("/api/resource/12/ogr_export/geojson"))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let body = resp.bytes().await.unwrap();
    let entries = zip_entries(&body);
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].0, b"Roads/Roads.geojson");

    // The scripted engine copies its input: the interchange document.
    let document: Value = serde_json::from_slice(&entries[0].1).unwrap();
    assert_eq!(document["crs"]["properties"]["name"], "EPSG:3857");
    assert_eq!(document["features"].as_array().unwrap().len(), 2);

    // Columns keep the layer's field order.
    let columns: Vec<&String> = document["features"][0]["properties"]
        .as_object()
        .unwrap()
        .keys()
        .collect();
    assert_eq!(columns, vec!["name", "lanes"]);

    server.stop().await;
}

#[tokio::test]
async fn cyrillic_names_use_cp866_entries() {
    let server = scripted(false, false).await;
    let resp = reqwest::get(server.url("/resource/13/ogr_export/csv"))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(
        resp.headers()[CONTENT_DISPOSITION].as_bytes(),
        "attachment; filename=\"Карта.csv.zip\"".as_bytes()
    );

    let body = resp.bytes().await.unwrap();
    let entries = zip_entries(&body);
    let (name, content) = &entries[0];
    let (decoded, _, had_errors) = IBM866.decode(name);
    assert!(!had_errors);
    assert_eq!(decoded, "Карта/Карта.csv");

    // CSV exports are single part: the multipoint became two features.
    let document: Value = serde_json::from_slice(content).unwrap();
    assert_eq!(document["features"].as_array().unwrap().len(), 3);

    server.stop().await;
}

#[tokio::test]
async fn control_characters_in_names_are_replaced_in_the_header() {
    let server = scripted(false, false).await;
    let resp = reqwest::get(server.url("/resource/15/ogr_export/csv"))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(
        resp.headers()[CONTENT_DISPOSITION],
        "attachment; filename=\"Line_Break.csv.zip\""
    );
    resp.bytes().await.unwrap();

    server.assert_work_root_empty().await;
    server.stop().await;
}

#[tokio::test]
async fn unsupported_format_is_rejected_without_writes() {
    let server = scripted(false, false).await;
    let resp = reqwest::get(server.url("/resource/12/ogr_export/bogus"))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["stage"], "validating");
    assert_eq!(
        body["error"],
        "Unsupported format 'bogus'. Supported formats: csv, geojson, shp"
    );
    assert!(residue(server.work_root.path()).is_empty());

    // Excluded drivers are not exportable either.
    let resp = reqwest::get(server.url("/resource/12/ogr_export/postgresql"))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    server.stop().await;
}

#[tokio::test]
async fn legacy_status_for_unsupported_format() {
    let server = scripted(false, true).await;
    let resp = reqwest::get(server.url("/resource/12/ogr_export/bogus"))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    server.stop().await;
}

#[tokio::test]
async fn access_control() {
    let server = scripted(false, false).await;
    let client = reqwest::Client::new();
    let url = server.url("/resource/14/ogr_export/csv");

    let resp = client.get(&url).send().await.unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

    let resp = client.get(&url).bearer_auth("guess").send().await.unwrap();
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);

    let resp = client.get(&url).bearer_auth("s3cret").send().await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(
        resp.headers()[CONTENT_DISPOSITION],
        "attachment; filename=\"Secret.csv.zip\""
    );
    resp.bytes().await.unwrap();

    let resp = client
        .get(server.url("/resource/99/ogr_export/csv"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);

    server.assert_work_root_empty().await;
    server.stop().await;
}

#[tokio::test]
async fn failed_conversion_leaves_nothing_behind() {
    let server = scripted(true, false).await;
    let resp = reqwest::get(server.url("/resource/12/ogr_export/shp"))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);

    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["stage"], "converting");
    assert!(!body["error"].as_str().unwrap().contains("ERROR 1"));

    server.assert_work_root_empty().await;
    server.stop().await;
}

#[tokio::test]
async fn concurrent_exports_do_not_collide() {
    let server = scripted(false, false).await;
    let client = reqwest::Client::new();

    let requests = (0..4).map(|_| {
        let client = client.clone();
        let url = server.url("/resource/12/ogr_export/shp");
        async move { client.get(url).send().await.unwrap().bytes().await.unwrap() }
    });
    let bodies = spawn_all(requests).await;
    for body in bodies {
        assert_eq!(zip_entries(&body).len(), 4);
    }

    server.assert_work_root_empty().await;
    server.stop().await;
}

async fn spawn_all<F, T>(futures: impl IntoIterator<Item = F>) -> Vec<T>
where
    F: std::future::Future<Output = T> + Send + 'static,
    T: Send + 'static,
{
    let handles: Vec<_> = futures.into_iter().map(tokio::spawn).collect();
    let mut out = Vec::new();
    for handle in handles {
        out.push(handle.await.unwrap());
    }
    out
}

fn ogr2ogr_available() -> bool {
    std::process::Command::new("ogr2ogr")
        .arg("--version")
        .output()
        .is_ok_and(|o| o.status.success())
}

#[tokio::test]
async fn round_trip_through_ogr2ogr() {
    if !ogr2ogr_available() {
        eprintln!("skipping round trip: ogr2ogr not on PATH");
        return;
    }

    let server = start_server(Arc::new(Ogr2Ogr::default()), false).await;
    let resp = reqwest::get(server.url("/resource/12/ogr_export/geojson"))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let body = resp.bytes().await.unwrap();
    let entries = zip_entries(&body);
    let (_, content) = entries
        .iter()
        .find(|(name, _)| name.as_slice() == b"Roads/Roads.geojson")
        .expect("converted layer in archive");

    let document: Value = serde_json::from_slice(content).unwrap();
    let features = document["features"].as_array().unwrap();
    assert_eq!(features.len(), 2);

    // 111319.49 m east of the origin in web mercator is 1 degree of longitude.
    let x = features[0]["geometry"]["coordinates"][0].as_f64().unwrap();
    assert!((x - 1.0).abs() < 1e-6, "unexpected longitude {x}");
    assert_eq!(features[1]["geometry"]["type"], "MultiPoint");

    server.assert_work_root_empty().await;
    server.stop().await;
}
