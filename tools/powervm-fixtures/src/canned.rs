use crate::errors::FixtureError;
use crate::runtime::FileSystem;
use crate::virt::Feed;
use std::path::Path;

pub const MS_HTTPRESP_FILE: &str = "fake_managedsystem.json";

/// Load a canned management response (a JSON document with `entries`).
pub fn load_feed(fs: &dyn FileSystem, path: &Path) -> Result<Feed, FixtureError> {
    let text = fs.read_to_string(path)?;
    serde_json::from_str(&text)
        .map_err(|e| FixtureError::CannedResponse(format!("{}: {e}", path.display())))
}

/// Trim a feed down to its first entry, as if the endpoint knew one host.
pub fn single_host(mut feed: Feed) -> Result<Feed, FixtureError> {
    if feed.entries.is_empty() {
        return Err(FixtureError::CannedResponse(
            "canned feed has no entries".to_string(),
        ));
    }
    feed.entries.truncate(1);
    Ok(feed)
}
