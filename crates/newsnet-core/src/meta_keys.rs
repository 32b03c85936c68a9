//! Reserved meta keys, option keys, and taxonomies

/// Last applied full payload of an incoming copy
pub const INCOMING_PAYLOAD: &str = "newspack_network_post_payload";

/// Network post ID of an incoming copy (the join key)
pub const NETWORK_POST_ID: &str = "newspack_network_post_id";

/// Origin site URL of an incoming copy; kept when the copy is deleted
pub const INCOMING_ORIGIN: &str = "newspack_network_post_origin";

/// Whether an incoming copy stopped auto-applying updates
pub const UNLINKED: &str = "newspack_network_post_unlinked";

/// Destination URLs of an outgoing post
pub const DISTRIBUTED_SITES: &str = "newspack_network_distributed";

/// Legacy Distributor: subscriptions held by an origin post
pub const DT_SUBSCRIPTIONS: &str = "dt_subscriptions";

/// Set on an origin post once every Distributor subscription is linked
pub const DISTRIBUTOR_MIGRATED: &str = "newspack_network_distributor_migrated";

/// Legacy Distributor: origin URL of a pulled/pushed copy
pub const DT_ORIGINAL_POST_URL: &str = "dt_original_post_url";

/// Legacy Distributor: subscription signature stored on the copy
pub const DT_SUBSCRIPTION_SIGNATURE: &str = "dt_subscription_signature";

/// Legacy Distributor meta removed once a copy is linked
pub const DT_COPY_KEYS: &[&str] = &[
    DT_ORIGINAL_POST_URL,
    DT_SUBSCRIPTION_SIGNATURE,
    "dt_original_post_id",
    "dt_original_blog_id",
    "dt_original_source_id",
    "dt_syndicate_time",
    "dt_full_connection",
    "dt_unlinked",
];

/// Meta never sent in outgoing payloads
pub const OUTGOING_RESERVED: &[&str] = &[
    INCOMING_PAYLOAD,
    INCOMING_ORIGIN,
    NETWORK_POST_ID,
    UNLINKED,
    DISTRIBUTED_SITES,
    DT_SUBSCRIPTIONS,
    DISTRIBUTOR_MIGRATED,
    DT_ORIGINAL_POST_URL,
    DT_SUBSCRIPTION_SIGNATURE,
    "_edit_lock",
    "_edit_last",
    "_thumbnail_id",
    "_wp_old_slug",
    "_wp_old_date",
    "_pingme",
    "_encloseme",
];

/// Meta an incoming resync neither deletes nor overwrites
pub const INCOMING_RESERVED: &[&str] = &[
    INCOMING_PAYLOAD,
    INCOMING_ORIGIN,
    NETWORK_POST_ID,
    UNLINKED,
    DISTRIBUTED_SITES,
    "_edit_lock",
    "_edit_last",
    "_thumbnail_id",
];

/// Taxonomies an incoming resync leaves untouched
///
/// `author` carries Co-Authors Plus bylines, which are resolved locally.
pub const RESERVED_TAXONOMIES: &[&str] = &["author", "post_format", "nav_menu"];

/// Node option: ID of the last fully processed Hub event
pub const OPTION_LAST_PROCESSED: &str = "newspack_network_last_processed_action";

/// Node option: message of the last failed pull
pub const OPTION_LAST_PULL_ERROR: &str = "newspack_network_pull_error";

/// Known network site URLs
pub const OPTION_NETWORK_SITES: &str = "newspack_network_sites";

/// Node option: queued outbound events
pub const OPTION_OUTBOX: &str = "newspack_network_outbox";

/// User meta: origin site of a synced reader
pub const USER_REMOTE_SITE: &str = "newspack_network_remote_site";

/// User meta: membership states per origin site
pub const USER_MEMBERSHIPS: &str = "newspack_network_memberships";

/// User meta: local avatar attachment
pub const USER_AVATAR: &str = "simple_local_avatar";

pub fn is_outgoing_reserved(key: &str) -> bool {
    OUTGOING_RESERVED.contains(&key)
}

pub fn is_incoming_reserved(key: &str) -> bool {
    INCOMING_RESERVED.contains(&key)
}

pub fn is_reserved_taxonomy(taxonomy: &str) -> bool {
    RESERVED_TAXONOMIES.contains(&taxonomy)
}
