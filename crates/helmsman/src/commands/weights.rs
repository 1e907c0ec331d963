use helmsman_traffic::FlatWeights;

/// Expand a flat identifier → weight JSON object.
pub fn expand(json: &str) -> anyhow::Result<String> {
    let flat: FlatWeights = serde_json::from_str(json)?;
    let nested = helmsman_traffic::expand(&flat)?;
    Ok(serde_json::to_string_pretty(&nested)?)
}
