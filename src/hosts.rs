//! Host (device) endpoints of the Falcon API.
//!
//! These wrappers show the shape of every per-endpoint method: fill in a
//! [`CallArguments`] and forward it to [`FalconClient::dispatch`]. Results
//! come back untouched.
//!
//! - [`query_devices_by_filter`]: search hosts with an FQL filter.
//! - [`get_device_details`]: fetch host records by agent ID (AID).
//! - [`perform_action`]: contain, lift containment, hide or unhide hosts.
//! - [`update_device_tags`]: add or remove Falcon Grouping Tags.
//!
//! ## FQL filtering
//!
//! [`query_devices_by_filter`] accepts an optional Falcon Query Language
//! expression, for example `platform_name:'Windows'+hostname:'web*'`.
//! Pass `None` to list every host (subject to `limit`).

use std::fmt;

use serde::Serialize;
use serde_json::json;

use crate::client::FalconClient;
use crate::request::CallArguments;
use crate::result::ApiResult;

// ── Request types ──────────────────────────────────────────────────────

/// Actions accepted by `PerformActionV2`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceAction {
    /// Network-contain the host.
    Contain,
    LiftContainment,
    /// Hide the host from the console.
    HideHost,
    UnhideHost,
}

impl DeviceAction {
    pub fn as_str(self) -> &'static str {
        match self {
            DeviceAction::Contain => "contain",
            DeviceAction::LiftContainment => "lift_containment",
            DeviceAction::HideHost => "hide_host",
            DeviceAction::UnhideHost => "unhide_host",
        }
    }
}

impl fmt::Display for DeviceAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether `UpdateDeviceTags` appends or removes the given tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TagAction {
    Add,
    Remove,
}

// ── Endpoint functions ─────────────────────────────────────────────────

/// Searches for host AIDs.
///
/// `limit` caps the page size (the API accepts up to 5000).
pub async fn query_devices_by_filter(
    client: &FalconClient,
    filter: Option<&str>,
    limit: Option<u32>,
) -> ApiResult {
    let mut args = CallArguments::new();
    if let Some(filter) = filter {
        args = args.query("filter", filter);
    }
    if let Some(limit) = limit {
        args = args.query("limit", limit);
    }
    client.dispatch("QueryDevicesByFilter", args).await
}

/// Retrieves full host records for the given AIDs.
pub async fn get_device_details(client: &FalconClient, ids: &[&str]) -> ApiResult {
    client
        .dispatch("GetDeviceDetails", CallArguments::new().ids(ids.iter().copied()))
        .await
}

/// Runs `action` against the given hosts. The AIDs travel in the JSON body.
pub async fn perform_action(client: &FalconClient, action: DeviceAction, ids: &[&str]) -> ApiResult {
    let args = CallArguments::new()
        .action_name(action.as_str())
        .ids(ids.iter().copied());
    client.dispatch("PerformActionV2", args).await
}

/// Appends or removes grouping tags on the given hosts.
///
/// Tags are sent as given; Falcon expects grouping tags in the form
/// `FalconGroupingTags/<name>`.
pub async fn update_device_tags(
    client: &FalconClient,
    action: TagAction,
    ids: &[&str],
    tags: &[&str],
) -> ApiResult {
    let body = json!({
        "action": action,
        "device_ids": ids,
        "tags": tags
    });
    client
        .dispatch("UpdateDeviceTags", CallArguments::new().body(body))
        .await
}
