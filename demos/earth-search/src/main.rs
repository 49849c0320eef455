//! Earth Search demo
//!
//! Searches Sentinel-2 scenes over a small area and prints their cloud cover.
//! Pass another catalog address as the first argument to point it elsewhere.

#![allow(clippy::print_stdout, clippy::print_stderr)]

use futures_util::TryStreamExt;
use stac_client::prelude::*;

const DEFAULT_CATALOG: &str = "https://earth-search.aws.element84.com/v1";

fn scene_search() -> SearchBuilder {
    SearchBuilder::new()
        .collections("sentinel-2-l2a")
        .bbox([-72.5, 40.5, -72.0, 41.0])
        .datetime("2023-06-01/2023-06-30")
        .query_shortcut("eo:cloud_cover<20")
        .limit(10)
        .max_items(25)
}

fn describe(item: &Item) -> String {
    let cloud_cover = item
        .property("eo:cloud_cover")
        .and_then(serde_json::Value::as_f64)
        .map_or_else(|| "?".to_string(), |value| format!("{value:.1}%"));
    let datetime = item
        .property("datetime")
        .and_then(serde_json::Value::as_str)
        .unwrap_or("?");
    format!("{} {datetime} clouds {cloud_cover}", item.id)
}

async fn run(catalog: &str) -> stac_client::Result<()> {
    let client = Client::open(catalog).await?;
    println!(
        "{} advertises {} conformance classes",
        client.root().title.as_deref().unwrap_or(&client.root().id),
        client.conformance().uris().len()
    );

    let search = client.search(scene_search())?;
    if let Some(matched) = search.matched().await? {
        println!("{matched} scenes match, showing at most 25");
    }

    let mut items = std::pin::pin!(search.items());
    while let Some(item) = items.try_next().await? {
        println!("{}", describe(&item));
    }
    Ok(())
}

#[tokio::main]
async fn main() {
    let catalog = std::env::args()
        .nth(1)
        .unwrap_or_else(|| DEFAULT_CATALOG.to_string());

    if let Err(err) = run(&catalog).await {
        eprintln!("search failed ({}): {err}", err.kind());
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use wiremock::{
        Mock, MockServer, ResponseTemplate,
        matchers::{body_partial_json, method, path},
    };

    use super::*;

    #[tokio::test]
    async fn demo_runs_against_a_mock_catalog() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "mock",
                "conformsTo": [
                    "https://api.stacspec.org/v1.0.0/core",
                    "https://api.stacspec.org/v1.0.0/item-search",
                    "https://api.stacspec.org/v1.0.0/item-search#query",
                ],
                "links": [{
                    "rel": "search",
                    "href": format!("{}/search", server.uri()),
                    "type": "application/geo+json",
                    "method": "POST",
                }],
            })))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/search"))
            .and(body_partial_json(json!({"query": {"eo:cloud_cover": {"lt": 20}}})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "type": "FeatureCollection",
                "numberMatched": 1,
                "features": [{
                    "type": "Feature",
                    "id": "S2A_1",
                    "properties": {"datetime": "2023-06-02T15:37:10Z", "eo:cloud_cover": 3.5},
                }],
            })))
            .mount(&server)
            .await;

        let catalog = format!("{}/", server.uri());
        run(&catalog).await.expect("demo run");
    }

    #[test]
    fn describe_formats_cloud_cover() {
        let item: Item = serde_json::from_value(json!({
            "id": "S2A_1",
            "properties": {"datetime": "2023-06-02T15:37:10Z", "eo:cloud_cover": 3.5},
        }))
        .expect("item");
        assert_eq!(describe(&item), "S2A_1 2023-06-02T15:37:10Z clouds 3.5%");
    }
}
