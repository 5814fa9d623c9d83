//! services/api/src/bin/openapi.rs
//!
//! Writes the listings API document to `openapi.json`, or to the path given as
//! the first argument.

use api_lib::web::rest::ApiDoc;
use utoipa::OpenApi;

fn render() -> Result<String, serde_json::Error> {
    ApiDoc::openapi().to_pretty_json()
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "openapi.json".to_string());
    std::fs::write(&path, render()?)?;
    println!("Wrote listings API document to {path}");
    Ok(())
}
