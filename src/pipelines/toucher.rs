//! Keep the last-modified dates of URL (link-only) resources reasonable:
//! a dataset updated `ONLINE` shows the current run time, anything else
//! is pinned back to the resource's own creation date.

use chrono::Local;
use tracing::{error, info};

use crate::ckan::Resource;
use crate::config::ToucherConfig;
use crate::error::Result;
use crate::matcher;

pub async fn run(config: &ToucherConfig) -> Result<()> {
    let client = config.ckan.client();
    info!("getting all ids from {}", client.base_url());
    let ids = client.package_list().await?;
    for id in ids {
        info!("dataset id {id}");
        let dataset = client.package_show(&id).await?;
        for resource in &dataset.resources {
            if !resource.format.eq_ignore_ascii_case("URL") {
                continue;
            }
            let mut touched = resource.clone();
            touched.last_modified =
                touched_last_modified(dataset.update_period.as_deref(), resource);
            match client.resource_update(&touched).await {
                Ok(_) => info!(
                    "resource updated: {}, {}, {}",
                    dataset.name,
                    resource.name,
                    resource.url.as_deref().unwrap_or("")
                ),
                Err(e) => error!("failed to touch {} in {}: {e}", resource.name, dataset.name),
            }
        }
    }
    Ok(())
}

/// The value a URL resource's `last_modified` is forced to.
pub fn touched_last_modified(update_period: Option<&str>, resource: &Resource) -> Option<String> {
    let online = update_period
        .map(|p| p.eq_ignore_ascii_case("ONLINE"))
        .unwrap_or(false);
    if online {
        Some(matcher::format_timestamp(Local::now().naive_local()))
    } else {
        resource.created.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url_resource() -> Resource {
        Resource {
            name: "portal link".to_string(),
            format: "URL".to_string(),
            created: Some("2021-06-01T08:00:00".to_string()),
            last_modified: Some("2023-01-01T00:00:00".to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_online_datasets_touch_to_now() {
        let touched = touched_last_modified(Some("ONLINE"), &url_resource()).unwrap();
        assert!(touched.starts_with(&Local::now().format("%Y-").to_string()));
    }

    #[test]
    fn test_other_periods_pin_to_created() {
        for period in [Some("yearly"), Some("monthly"), None] {
            assert_eq!(
                touched_last_modified(period, &url_resource()).as_deref(),
                Some("2021-06-01T08:00:00")
            );
        }
    }
}
