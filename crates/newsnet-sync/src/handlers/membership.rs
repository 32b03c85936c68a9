use async_trait::async_trait;
use serde_json::{Map, Value};
use tracing::{debug, info};

use newsnet_core::meta_keys::USER_MEMBERSHIPS;
use newsnet_core::{ActionKind, Event};

use super::{required_email, required_str};
use crate::dispatch::{HandlerContext, IncomingEvent};
use crate::error::SyncResult;

/// `newspack_network_woo_membership_updated`: record a membership state
///
/// Stored in user meta as `{origin: {plan_network_id: status}}`, so a
/// repeated event overwrites the same entry.
pub struct MembershipUpdated;

#[async_trait]
impl IncomingEvent for MembershipUpdated {
    fn action(&self) -> ActionKind {
        ActionKind::MembershipUpdated
    }

    async fn handle(&self, ctx: &HandlerContext, event: &Event) -> SyncResult<()> {
        let email = required_email(event)?;
        let plan = required_str(event, "plan_network_id")?;
        let status = required_str(event, "new_status")?;

        let Some(user) = ctx.site.find_user_by_email(email)? else {
            debug!(event_id = event.id, "Member unknown on this site");
            return Ok(());
        };

        let mut memberships = match user.meta.get(USER_MEMBERSHIPS) {
            Some(Value::Object(map)) => map.clone(),
            _ => Map::new(),
        };
        let per_origin = memberships
            .entry(event.site.as_str())
            .or_insert_with(|| Value::Object(Map::new()));
        if !per_origin.is_object() {
            *per_origin = Value::Object(Map::new());
        }
        if let Value::Object(plans) = per_origin {
            plans.insert(plan.to_string(), Value::from(status));
        }

        ctx.site
            .update_user_meta(user.id, USER_MEMBERSHIPS, Value::Object(memberships))?;
        info!(event_id = event.id, user_id = %user.id, plan, status, "Recorded membership");
        Ok(())
    }
}
