//! Integration tests for catalog search
//!
//! These tests drive the public client, filter and pagination API against an
//! in-process stand-in for the M2M service.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{json, Value};

use usgs_explorer::app::client::ApiEnvelope;
use usgs_explorer::app::filter::{compile_expression, CompileOutcome, CompiledQuery, SceneFilter};
use usgs_explorer::app::{
    CatalogClient, ClientConfig, FilterCache, RetryPolicy, SceneQuery, ScenePaginator, Transport,
};
use usgs_explorer::auth::Credentials;
use usgs_explorer::errors::{AuthError, CatalogError, FilterError, NetworkResult};

const DATASETS: &[&str] = &["declassii", "declassiii", "landsat_tm_c2_l1"];

/// Serves `total_hits` scenes of every known dataset
struct CatalogStub {
    total_hits: u64,
    calls: Mutex<Vec<(String, Value)>>,
}

impl CatalogStub {
    fn new(total_hits: u64) -> Self {
        Self {
            total_hits,
            calls: Mutex::new(Vec::new()),
        }
    }

    fn calls_to(&self, endpoint: &str) -> Vec<Value> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(e, _)| e == endpoint)
            .map(|(_, payload)| payload.clone())
            .collect()
    }

    fn scene_page(&self, payload: &Value) -> ApiEnvelope {
        let start = payload["startingNumber"].as_u64().unwrap_or(1);
        let max = payload["maxResults"].as_u64().unwrap_or(100);
        let end = (start + max - 1).min(self.total_hits);
        let results: Vec<Value> = (start..=end)
            .map(|n| json!({ "entityId": format!("SCENE{:04}", n), "displayId": format!("D{}", n) }))
            .collect();
        ApiEnvelope::ok(json!({
            "results": results,
            "recordsReturned": results.len(),
            "totalHits": self.total_hits,
            "startingNumber": start,
            "nextRecord": end + 1,
        }))
    }
}

fn declassii_filters() -> Value {
    json!([
        {
            "id": "5e839ff7d71d4811",
            "fieldLabel": "Camera Type",
            "searchSql": "CAMERA = ?",
            "fieldConfig": { "type": "Select" },
            "valueList": [
                { "value": "L", "label": "Lower" },
                { "value": "U", "label": "Upper" },
                { "value": "A", "label": "Aft" }
            ]
        },
        {
            "id": "5e839ff8cfa94807",
            "fieldLabel": "Camera Resolution",
            "searchSql": "CAMERA_RESOL = ?",
            "fieldConfig": { "type": "Select" },
            "valueList": [
                { "value": "2", "label": "2 to 4 feet" },
                { "value": "6", "label": "6 to 10 feet" }
            ]
        },
        {
            "id": "5e839ff8ba6eead0",
            "fieldLabel": "Download Available",
            "searchSql": "DOWNLOAD_AVAILABLE = ?",
            "fieldConfig": { "type": "Select" },
            "valueList": [
                { "value": "Y", "label": "Yes" },
                { "value": "N", "label": "No" }
            ]
        },
        {
            "id": "5e839ff7d71d4812",
            "fieldLabel": "Entity ID",
            "searchSql": "ENTITY_ID like ?",
            "fieldConfig": { "type": "Text" }
        }
    ])
}

#[async_trait]
impl Transport for CatalogStub {
    async fn post_json(
        &self,
        endpoint: &str,
        payload: &Value,
        auth_key: Option<&str>,
    ) -> NetworkResult<ApiEnvelope> {
        self.calls
            .lock()
            .unwrap()
            .push((endpoint.to_string(), payload.clone()));

        if !matches!(endpoint, "login" | "login-token") && auth_key != Some("stub-key") {
            return Ok(ApiEnvelope::error("AUTH_UNAUTHROIZED", "missing key"));
        }

        let dataset_known = payload["datasetName"]
            .as_str()
            .map_or(true, |name| DATASETS.contains(&name));
        if !dataset_known {
            return Ok(ApiEnvelope::error("DATASET_INVALID", "Invalid dataset"));
        }

        Ok(match endpoint {
            "login" | "login-token" => ApiEnvelope::ok(json!("stub-key")),
            "logout" => ApiEnvelope::ok(Value::Null),
            "dataset-search" => ApiEnvelope::ok(Value::Array(
                DATASETS
                    .iter()
                    .map(|alias| json!({ "datasetAlias": alias }))
                    .collect(),
            )),
            "dataset-filters" => ApiEnvelope::ok(declassii_filters()),
            "scene-search" => self.scene_page(payload),
            other => ApiEnvelope::error("UNKNOWN_ENDPOINT", other),
        })
    }
}

fn client(stub: &Arc<CatalogStub>) -> Arc<CatalogClient> {
    let config = ClientConfig {
        retry: RetryPolicy::immediate(0),
        ..ClientConfig::default()
    };
    Arc::new(CatalogClient::with_transport(
        stub.clone(),
        Credentials::with_password("tester", "secret").unwrap(),
        config,
        Arc::new(FilterCache::new()),
    ))
}

fn scene_ids(scenes: &[usgs_explorer::app::SceneResult]) -> Vec<String> {
    scenes.iter().map(|s| s.entity_id.clone()).collect()
}

#[tokio::test]
async fn test_expression_reaches_scene_search_payload() {
    let stub = Arc::new(CatalogStub::new(3));
    let client = client(&stub);

    let schema = client.filters_for("declassii").await.unwrap();
    let outcome = compile_expression("camera=L & camera_resol=6 | DOWNLOAD_AVAILABLE=Y", &schema)
        .unwrap();
    let CompileOutcome::Query(query) = outcome else {
        panic!("expected a compiled query");
    };

    let paginator = ScenePaginator::new(
        client.clone(),
        SceneQuery::new("declassii").with_filter(SceneFilter::new().with_metadata(query)),
    );
    let scenes = paginator.collect_all().await.unwrap();
    assert_eq!(scene_ids(&scenes), vec!["SCENE0001", "SCENE0002", "SCENE0003"]);

    let searches = stub.calls_to("scene-search");
    assert_eq!(searches.len(), 1);
    let metadata = &searches[0]["sceneFilter"]["metadataFilter"];
    assert_eq!(metadata["filterType"], "or");
    assert_eq!(metadata["childFilters"][0]["filterType"], "and");
    assert_eq!(
        metadata["childFilters"][0]["childFilters"][0],
        json!({ "filterType": "value", "filterId": "5e839ff7d71d4811", "value": "L", "operand": "like" })
    );
    assert_eq!(metadata["childFilters"][1]["filterId"], "5e839ff8ba6eead0");
    assert_eq!(metadata["childFilters"][1]["value"], "Y");
}

#[tokio::test]
async fn test_equivalent_field_and_value_spellings() {
    let stub = Arc::new(CatalogStub::new(0));
    let client = client(&stub);
    let schema = client.filters_for("declassii").await.unwrap();

    let compiled: Vec<CompiledQuery> = [
        "camera=L",
        "CAMERA=l",
        "5e839ff7d71d4811=L",
        "Camera Type=Lower",
    ]
    .iter()
    .map(|expression| match compile_expression(expression, &schema).unwrap() {
        CompileOutcome::Query(query) => query,
        CompileOutcome::ValueListing(_) => panic!("unexpected listing for {}", expression),
    })
    .collect();

    assert!(compiled.windows(2).all(|pair| pair[0] == pair[1]));
    // The schema is fetched once per dataset
    client.filters_for("declassii").await.unwrap();
    assert_eq!(stub.calls_to("dataset-filters").len(), 1);
}

#[tokio::test]
async fn test_unknown_field_and_value_carry_suggestions() {
    let stub = Arc::new(CatalogStub::new(0));
    let client = client(&stub);
    let schema = client.filters_for("declassii").await.unwrap();

    match compile_expression("camra=L", &schema) {
        Err(FilterError::UnknownField {
            field,
            available,
            suggestions,
        }) => {
            assert_eq!(field, "camra");
            assert_eq!(available.len(), 4);
            assert!(!suggestions.is_empty() && suggestions.len() <= 4);
            assert!(suggestions[0].starts_with("Camera Type"));
        }
        other => panic!("expected unknown field, got {:?}", other),
    }

    match compile_expression("camera=Lowr", &schema) {
        Err(FilterError::UnknownValue {
            value,
            available,
            suggestions,
            ..
        }) => {
            assert_eq!(value, "Lowr");
            assert_eq!(available.len(), 3);
            assert_eq!(suggestions[0], "L (Lower)");
        }
        other => panic!("expected unknown value, got {:?}", other),
    }
}

#[tokio::test]
async fn test_value_query_lists_values_without_searching() {
    let stub = Arc::new(CatalogStub::new(10));
    let client = client(&stub);
    let schema = client.filters_for("declassii").await.unwrap();

    match compile_expression("DOWNLOAD_AVAILABLE=?", &schema).unwrap() {
        CompileOutcome::ValueListing(listing) => {
            assert_eq!(listing.filter.sql_name, "DOWNLOAD_AVAILABLE");
            let ids: Vec<&str> = listing.values.iter().map(|v| v.id.as_str()).collect();
            assert_eq!(ids, vec!["Y", "N"]);
        }
        CompileOutcome::Query(_) => panic!("expected a value listing"),
    }
    assert!(stub.calls_to("scene-search").is_empty());
}

#[tokio::test]
async fn test_pagination_yields_every_hit_in_order() {
    let stub = Arc::new(CatalogStub::new(25));
    let client = client(&stub);

    let paginator = ScenePaginator::new(
        client.clone(),
        SceneQuery::new("declassii").with_page_size(10),
    );
    let scenes = paginator.collect_all().await.unwrap();

    let expected: Vec<String> = (1..=25).map(|n| format!("SCENE{:04}", n)).collect();
    assert_eq!(scene_ids(&scenes), expected);

    let starts: Vec<u64> = stub
        .calls_to("scene-search")
        .iter()
        .map(|p| p["startingNumber"].as_u64().unwrap())
        .collect();
    assert_eq!(starts, vec![1, 11, 21]);
}

#[tokio::test]
async fn test_pagination_stops_at_limit() {
    let stub = Arc::new(CatalogStub::new(25));
    let client = client(&stub);

    let paginator = ScenePaginator::new(
        client.clone(),
        SceneQuery::new("declassii")
            .with_page_size(10)
            .with_limit(Some(12)),
    );
    let scenes = paginator.collect_all().await.unwrap();
    assert_eq!(scenes.len(), 12);
    assert_eq!(scenes[11].entity_id, "SCENE0012");

    let sizes: Vec<u64> = stub
        .calls_to("scene-search")
        .iter()
        .map(|p| p["maxResults"].as_u64().unwrap())
        .collect();
    assert_eq!(sizes, vec![10, 2]);
}

#[tokio::test]
async fn test_unknown_dataset_suggests_aliases() {
    let stub = Arc::new(CatalogStub::new(5));
    let client = client(&stub);

    let paginator = ScenePaginator::new(client.clone(), SceneQuery::new("declasii"));
    match paginator.collect_all().await {
        Err(CatalogError::UnknownDataset { name, suggestions }) => {
            assert_eq!(name, "declasii");
            assert_eq!(suggestions[0], "declassii");
            assert!(suggestions.len() <= DATASETS.len());
        }
        other => panic!("expected unknown dataset, got {:?}", other),
    }
}

#[tokio::test]
async fn test_logout_ends_the_session() {
    let stub = Arc::new(CatalogStub::new(5));
    let client = client(&stub);

    client.login().await.unwrap();
    client.logout().await.unwrap();
    client.logout().await.unwrap();
    assert_eq!(stub.calls_to("logout").len(), 1);

    let err = client.filters_for("declassii").await.unwrap_err();
    assert!(matches!(err, CatalogError::Auth(AuthError::LoggedOut)));
}
