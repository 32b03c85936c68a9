//! REST routes of the network, relative to a site URL

/// Hub: Nodes fetch events after their watermark
pub const PULL: &str = "/wp-json/newspack-network/v1/pull";

/// Hub: Nodes submit locally originated events
pub const WEBHOOK: &str = "/wp-json/newspack-network/v1/webhook";

/// Node: set the destinations of a post and distribute it
pub const DISTRIBUTE: &str = "/wp-json/newspack-network/v1/content-distribution/distribute/{post_id}";

/// Node: adopt a legacy Distributor copy
pub const DISTRIBUTOR_LINK: &str =
    "/wp-json/newspack-network/v1/content-distribution/distributor-migrator/link/{post_id}";

/// Node: run a pull cycle now
pub const PULL_NOW: &str = "/wp-json/newspack-network/v1/pull-now";

/// Fill the `{post_id}` segment of a route
pub fn with_post_id(route: &str, post_id: u64) -> String {
    route.replace("{post_id}", &post_id.to_string())
}
