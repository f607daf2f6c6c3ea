//! Channel names and keyed-store layout. Every key is prefixed with
//! `hemostat:` so a shared broker instance can host other tenants.

/// Pub/sub channels connecting the four agents.
pub mod channels {
    pub const HEALTH_ALERT: &str = "hemostat:health_alert";
    pub const REMEDIATION_NEEDED: &str = "hemostat:remediation_needed";
    pub const REMEDIATION_COMPLETE: &str = "hemostat:remediation_complete";
    pub const FALSE_ALARM: &str = "hemostat:false_alarm";
}

/// Message kinds; each matches its channel suffix.
pub mod kinds {
    pub const HEALTH_ALERT: &str = "health_alert";
    pub const REMEDIATION_NEEDED: &str = "remediation_needed";
    pub const REMEDIATION_COMPLETE: &str = "remediation_complete";
    pub const FALSE_ALARM: &str = "false_alarm";
}

/// Keyed-store entries. Ownership: `stats` and `history` are written by
/// Monitor and Analyzer respectively; `cooldown`, `circuit`, `lock` and
/// `audit` by the Responder; `events` and `dedupe` by the Alert agent.
pub mod keys {
    pub const EVENTS_ALL: &str = "hemostat:events:all";

    pub fn stats(container: &str) -> String {
        format!("hemostat:stats:{container}")
    }

    pub fn history(container: &str) -> String {
        format!("hemostat:history:{container}")
    }

    pub fn cooldown(container: &str) -> String {
        format!("hemostat:cooldown:{container}")
    }

    pub fn circuit(container: &str) -> String {
        format!("hemostat:circuit:{container}")
    }

    pub fn lock(container: &str) -> String {
        format!("hemostat:lock:{container}")
    }

    pub fn audit(container: &str) -> String {
        format!("hemostat:audit:{container}")
    }

    pub fn events(kind: &str) -> String {
        format!("hemostat:events:{kind}")
    }

    pub fn dedupe(hash: &str) -> String {
        format!("hemostat:dedupe:{hash}")
    }
}
