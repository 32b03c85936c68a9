//! Known network membership
//!
//! The list lives in the `newspack_network_sites` option. The Hub owns it
//! and pushes it to Nodes with `network_nodes_synced`.

use serde_json::Value;
use tracing::warn;

use newsnet_core::meta_keys::OPTION_NETWORK_SITES;
use newsnet_core::{SiteStore, SiteUrl, StorageError};

/// Every known network site, including this one if listed
pub fn network_sites(site: &dyn SiteStore) -> Result<Vec<SiteUrl>, StorageError> {
    let Some(Value::Array(entries)) = site.get_option(OPTION_NETWORK_SITES)? else {
        return Ok(Vec::new());
    };

    let mut sites = Vec::with_capacity(entries.len());
    for entry in entries {
        let Some(raw) = entry.as_str() else {
            continue;
        };
        match SiteUrl::parse(raw) {
            Ok(url) if !sites.contains(&url) => sites.push(url),
            Ok(_) => {}
            Err(e) => warn!(url = raw, error = %e, "Skipping malformed network site"),
        }
    }
    Ok(sites)
}

/// Known network sites other than `site` itself
pub fn other_network_sites(site: &dyn SiteStore) -> Result<Vec<SiteUrl>, StorageError> {
    let own = site.site_url();
    Ok(network_sites(site)?
        .into_iter()
        .filter(|url| url != own)
        .collect())
}

/// Replace the known network list
pub fn set_network_sites(site: &dyn SiteStore, sites: &[SiteUrl]) -> Result<(), StorageError> {
    let value = Value::Array(sites.iter().map(|s| Value::from(s.as_str())).collect());
    site.update_option(OPTION_NETWORK_SITES, value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use newsnet_storage::MemorySite;
    use serde_json::json;

    #[test]
    fn test_network_sites_normalizes_and_skips_garbage() {
        let site = MemorySite::in_memory(SiteUrl::parse("https://a.test").unwrap());
        assert!(network_sites(&site).unwrap().is_empty());

        site.update_option(
            OPTION_NETWORK_SITES,
            json!(["https://a.test/", "https://b.test", "https://B.test/", 7, "not a url"]),
        )
        .unwrap();

        let all = network_sites(&site).unwrap();
        assert_eq!(all.len(), 2);

        let others = other_network_sites(&site).unwrap();
        assert_eq!(others, vec![SiteUrl::parse("https://b.test").unwrap()]);
    }

    #[test]
    fn test_set_network_sites_replaces() {
        let site = MemorySite::in_memory(SiteUrl::parse("https://a.test").unwrap());
        let b = SiteUrl::parse("https://b.test").unwrap();
        set_network_sites(&site, &[b.clone()]).unwrap();
        assert_eq!(network_sites(&site).unwrap(), vec![b]);
        set_network_sites(&site, &[]).unwrap();
        assert!(network_sites(&site).unwrap().is_empty());
    }
}
