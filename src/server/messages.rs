//! Client fan-out message vocabulary.
//!
//! Every message is a named event with a structured JSON payload, tagged by
//! `type` in kebab-case. Query requests carry an optional `id` reply token
//! which is echoed on the response; broadcast events carry none.

use serde::{Deserialize, Serialize};

use crate::types::{
    CrosspointState, LabelTarget, RouterStatus, Salvo, SalvoEntry,
};

/// Requests accepted from clients.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ClientRequest {
    #[serde(rename_all = "camelCase")]
    TakeCrosspoint {
        #[serde(default)]
        id: Option<u64>,
        #[serde(default)]
        matrix: u8,
        level: u8,
        destination: u16,
        source: u16,
    },

    #[serde(rename_all = "camelCase")]
    TakeMultiLevel {
        #[serde(default)]
        id: Option<u64>,
        #[serde(default)]
        matrix: u8,
        levels: Vec<u8>,
        destination: u16,
        source: u16,
    },

    #[serde(rename_all = "camelCase")]
    QueryCrosspoint {
        #[serde(default)]
        id: Option<u64>,
        #[serde(default)]
        matrix: u8,
        level: u8,
        destination: u16,
    },

    #[serde(rename_all = "camelCase")]
    SetLabel {
        #[serde(default)]
        id: Option<u64>,
        target: LabelTarget,
        #[serde(default)]
        matrix: u8,
        #[serde(default)]
        level: u8,
        index: u16,
        label: String,
    },

    #[serde(rename_all = "camelCase")]
    GetLabel {
        #[serde(default)]
        id: Option<u64>,
        target: LabelTarget,
        #[serde(default)]
        matrix: u8,
        #[serde(default)]
        level: u8,
        index: u16,
    },

    #[serde(rename_all = "camelCase")]
    GetAllLabels {
        #[serde(default)]
        id: Option<u64>,
    },

    #[serde(rename_all = "camelCase")]
    CreateSalvo {
        #[serde(default)]
        id: Option<u64>,
        salvo_id: u32,
        name: String,
        crosspoints: Vec<SalvoEntry>,
    },

    #[serde(rename_all = "camelCase")]
    ExecuteSalvo {
        #[serde(default)]
        id: Option<u64>,
        salvo_id: u32,
    },

    #[serde(rename_all = "camelCase")]
    GetAllSalvos {
        #[serde(default)]
        id: Option<u64>,
    },

    #[serde(rename_all = "camelCase")]
    GetStatus {
        #[serde(default)]
        id: Option<u64>,
    },

    #[serde(rename_all = "camelCase")]
    GetAllCrosspoints {
        #[serde(default)]
        id: Option<u64>,
    },

    #[serde(rename_all = "camelCase")]
    GetCrosspointsByLevel {
        #[serde(default)]
        id: Option<u64>,
        #[serde(default)]
        matrix: u8,
        level: u8,
    },

    Subscribe,
    Unsubscribe,
}

/// A label record as shipped to clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LabelRecord {
    pub target: LabelTarget,
    pub matrix: u8,
    pub level: u8,
    pub index: u16,
    pub label: String,
}

/// Events delivered to clients: request replies (carrying the echoed `id`)
/// and subscription broadcasts.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ClientEvent {
    /// A cache entry changed.
    #[serde(rename_all = "camelCase")]
    CrosspointChange { crosspoint: CrosspointState },

    /// Reply to `query-crosspoint`.
    #[serde(rename_all = "camelCase")]
    CrosspointState {
        #[serde(skip_serializing_if = "Option::is_none")]
        id: Option<u64>,
        crosspoint: Option<CrosspointState>,
    },

    /// Bulk snapshot, on request.
    #[serde(rename_all = "camelCase")]
    CrosspointUpdate {
        #[serde(skip_serializing_if = "Option::is_none")]
        id: Option<u64>,
        crosspoints: Vec<CrosspointState>,
    },

    /// A label was written.
    #[serde(rename_all = "camelCase")]
    LabelChange { label: LabelRecord },

    /// Reply to `get-label`.
    #[serde(rename_all = "camelCase")]
    Label {
        #[serde(skip_serializing_if = "Option::is_none")]
        id: Option<u64>,
        label: Option<LabelRecord>,
    },

    /// Reply to `get-all-labels`.
    #[serde(rename_all = "camelCase")]
    Labels {
        #[serde(skip_serializing_if = "Option::is_none")]
        id: Option<u64>,
        labels: Vec<LabelRecord>,
    },

    /// A salvo was created or replaced.
    #[serde(rename_all = "camelCase")]
    SalvoChange { salvo: Salvo },

    /// Reply to `get-all-salvos`.
    #[serde(rename_all = "camelCase")]
    Salvos {
        #[serde(skip_serializing_if = "Option::is_none")]
        id: Option<u64>,
        salvos: Vec<Salvo>,
    },

    /// Router link came up.
    RouterConnected,

    /// Router link went down.
    RouterDisconnected,

    /// A command or the link failed. Carries the reply token when the
    /// failure belongs to one client's request.
    #[serde(rename_all = "camelCase")]
    RouterError {
        #[serde(skip_serializing_if = "Option::is_none")]
        id: Option<u64>,
        message: String,
    },

    /// Reply to `get-status`, also broadcast periodically.
    #[serde(rename_all = "camelCase")]
    StatusUpdate {
        #[serde(skip_serializing_if = "Option::is_none")]
        id: Option<u64>,
        status: RouterStatus,
    },

    /// Positive acknowledgement of a mutating request.
    #[serde(rename_all = "camelCase")]
    Ok { id: u64 },
}
