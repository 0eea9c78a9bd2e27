//! Coordination constants, enums, and the notification protocol.
//!
//! This module lives in `core` (zero internal deps) so that the store
//! adapters, the event log, the coordinator, and whatever transport layer
//! embeds them all reference the same TTL bounds, presence enums, identifier
//! rules, and notification shapes.

use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::types::{ActorId, ResourceId, Timestamp};

// ---------------------------------------------------------------------------
// Lock TTL constants
// ---------------------------------------------------------------------------

/// Default lock TTL in seconds (30 minutes).
pub const DEFAULT_LOCK_TTL_SECS: u64 = 1800;

/// Maximum lock TTL in seconds (4 hours).
pub const MAX_LOCK_TTL_SECS: u64 = 14_400;

/// Minimum lock TTL in milliseconds (1 second).
pub const MIN_LOCK_TTL_MS: u64 = 1000;

// ---------------------------------------------------------------------------
// Presence constants
// ---------------------------------------------------------------------------

/// Expected interval between client heartbeats (in seconds).
pub const HEARTBEAT_INTERVAL_SECS: u64 = 30;

/// Presence records live this many seconds past their last refresh.
pub const PRESENCE_STALE_THRESHOLD_SECS: u64 = 120;

// ---------------------------------------------------------------------------
// Identifier limits
// ---------------------------------------------------------------------------

/// Longest accepted resource or actor identifier.
pub const MAX_IDENTIFIER_LEN: usize = 128;

/// Longest accepted event type tag.
pub const MAX_EVENT_TYPE_LEN: usize = 64;

/// Identifiers become store key segments, so `:` is excluded.
static IDENTIFIER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9_.@/\-]*$").expect("valid regex"));

/// Event types become broker topic segments.
static EVENT_TYPE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9_.\-]*$").expect("valid regex"));

// ---------------------------------------------------------------------------
// Lock TTL policy
// ---------------------------------------------------------------------------

/// Default and clamp bounds applied to every requested lock TTL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockTtlPolicy {
    pub default: Duration,
    pub min: Duration,
    pub max: Duration,
}

impl LockTtlPolicy {
    /// Resolve a requested TTL: `None` takes the default, anything outside
    /// `[min, max]` is clamped silently.
    pub fn resolve(&self, requested: Option<Duration>) -> Duration {
        requested.unwrap_or(self.default).max(self.min).min(self.max)
    }

    /// Check that the bounds are ordered and the default lies inside them.
    pub fn validate(&self) -> Result<(), String> {
        if self.min.is_zero() {
            return Err("Minimum lock TTL must be greater than zero".into());
        }
        if self.min > self.max {
            return Err(format!(
                "Minimum lock TTL ({:?}) exceeds maximum ({:?})",
                self.min, self.max
            ));
        }
        if self.default < self.min || self.default > self.max {
            return Err(format!(
                "Default lock TTL ({:?}) must lie within [{:?}, {:?}]",
                self.default, self.min, self.max
            ));
        }
        Ok(())
    }
}

impl Default for LockTtlPolicy {
    fn default() -> Self {
        Self {
            default: Duration::from_secs(DEFAULT_LOCK_TTL_SECS),
            min: Duration::from_millis(MIN_LOCK_TTL_MS),
            max: Duration::from_secs(MAX_LOCK_TTL_SECS),
        }
    }
}

// ---------------------------------------------------------------------------
// Presence mode / status
// ---------------------------------------------------------------------------

/// How an actor is attached to a resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PresenceMode {
    Editor,
    Viewer,
}

impl PresenceMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Editor => "editor",
            Self::Viewer => "viewer",
        }
    }
}

impl fmt::Display for PresenceMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PresenceMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "editor" => Ok(Self::Editor),
            "viewer" => Ok(Self::Viewer),
            other => Err(format!(
                "Invalid presence mode '{other}'. Must be one of: editor, viewer"
            )),
        }
    }
}

/// Self-reported availability of an attached actor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PresenceStatus {
    Online,
    Away,
    Offline,
}

impl PresenceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Online => "online",
            Self::Away => "away",
            Self::Offline => "offline",
        }
    }
}

impl fmt::Display for PresenceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PresenceStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "online" => Ok(Self::Online),
            "away" => Ok(Self::Away),
            "offline" => Ok(Self::Offline),
            other => Err(format!(
                "Invalid presence status '{other}'. Must be one of: online, away, offline"
            )),
        }
    }
}

// ---------------------------------------------------------------------------
// Notification protocol
// ---------------------------------------------------------------------------

/// Why a lock stopped being held.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReleaseReason {
    /// The owner released it.
    Released,
    /// An administrator removed it regardless of owner.
    AdministrativeOverride,
}

/// Outbound notifications for other actors attached to the same resource.
///
/// The core only builds these values; broadcasting them is the transport
/// layer's job. Serialized as JSON with an internally-tagged `"type"`
/// discriminator so clients can route by type string.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum Notification {
    #[serde(rename = "actor-joined")]
    ActorJoined {
        resource_id: ResourceId,
        actor_id: ActorId,
        mode: PresenceMode,
    },

    #[serde(rename = "actor-left")]
    ActorLeft {
        resource_id: ResourceId,
        actor_id: ActorId,
    },

    #[serde(rename = "status-changed")]
    StatusChanged {
        resource_id: ResourceId,
        actor_id: ActorId,
        status: PresenceStatus,
    },

    #[serde(rename = "lock-acquired")]
    LockAcquired {
        resource_id: ResourceId,
        owner_id: ActorId,
        lock_id: String,
        expires_at: Timestamp,
    },

    #[serde(rename = "lock-released")]
    LockReleased {
        resource_id: ResourceId,
        /// `None` when an override removed a lock that had already lapsed.
        owner_id: Option<ActorId>,
        reason: ReleaseReason,
    },

    #[serde(rename = "event-published")]
    EventPublished {
        resource_id: ResourceId,
        actor_id: ActorId,
        event_id: String,
        event_type: String,
    },
}

impl Notification {
    /// The resource whose attached actors should receive this notification.
    pub fn resource_id(&self) -> &str {
        match self {
            Self::ActorJoined { resource_id, .. }
            | Self::ActorLeft { resource_id, .. }
            | Self::StatusChanged { resource_id, .. }
            | Self::LockAcquired { resource_id, .. }
            | Self::LockReleased { resource_id, .. }
            | Self::EventPublished { resource_id, .. } => resource_id,
        }
    }
}

// ---------------------------------------------------------------------------
// Validation helpers
// ---------------------------------------------------------------------------

/// Validate a resource or actor identifier. `kind` names it in the message.
pub fn validate_identifier(kind: &str, value: &str) -> Result<(), String> {
    if value.is_empty() {
        return Err(format!("{kind} must not be empty"));
    }
    if value.len() > MAX_IDENTIFIER_LEN {
        return Err(format!(
            "{kind} must be at most {MAX_IDENTIFIER_LEN} bytes, got {}",
            value.len()
        ));
    }
    if !IDENTIFIER_RE.is_match(value) {
        return Err(format!(
            "{kind} '{value}' contains invalid characters (allowed: letters, digits, '_', '.', '@', '/', '-')"
        ));
    }
    Ok(())
}

/// Validate a resource/actor pair in one call.
pub fn validate_presence_ref(resource_id: &str, actor_id: &str) -> Result<(), String> {
    validate_identifier("resource_id", resource_id)?;
    validate_identifier("actor_id", actor_id)
}

/// Validate a free-form event type tag.
pub fn validate_event_type(event_type: &str) -> Result<(), String> {
    if event_type.is_empty() {
        return Err("event_type must not be empty".into());
    }
    if event_type.len() > MAX_EVENT_TYPE_LEN {
        return Err(format!(
            "event_type must be at most {MAX_EVENT_TYPE_LEN} bytes, got {}",
            event_type.len()
        ));
    }
    if !EVENT_TYPE_RE.is_match(event_type) {
        return Err(format!(
            "event_type '{event_type}' contains invalid characters (allowed: letters, digits, '_', '.', '-')"
        ));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
