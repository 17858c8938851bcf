//! Provider health tracking and selection.
//!
//! # States
//! - Eligible: provider may receive requests
//! - Cooling: provider failed recently and is skipped until the cooldown ends
//!
//! # State Transitions
//! ```text
//! Eligible → Cooling: any recorded failure (cooldown restarts on each failure)
//! Cooling → Eligible: recorded success, or primary failure (fallbacks only)
//! Cooling(until) counts as eligible once `now > until`
//! ```

use serde::Serialize;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::ProviderDescriptor;

/// Default time a failed provider is skipped.
pub const DEFAULT_COOLDOWN: Duration = Duration::from_secs(5 * 60);

/// Health of a single provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Health {
  Eligible,
  Cooling {
    since: Instant,
    until: Instant,
    reason: String,
  },
}

impl Health {
  /// Whether the health state alone allows selection at `now`.
  pub fn allows(&self, now: Instant) -> bool {
    match self {
      Health::Eligible => true,
      Health::Cooling { until, .. } => now > *until,
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderRole {
  Primary,
  Fallback,
}

/// Point-in-time view of one provider, for operational output.
#[derive(Debug, Clone, Serialize)]
pub struct ProviderStatus {
  pub name: String,
  pub role: ProviderRole,
  pub active: bool,
  pub eligible: bool,
  pub last_error: Option<String>,
  pub cooldown_remaining_secs: Option<u64>,
}

#[derive(Debug)]
struct ProviderSlot {
  descriptor: Arc<ProviderDescriptor>,
  active: bool,
  health: Health,
}

impl ProviderSlot {
  fn is_eligible(&self, now: Instant) -> bool {
    self.active && self.health.allows(now)
  }
}

/// Ordered set of providers; index 0 is the primary.
#[derive(Debug)]
pub struct ProviderRegistry {
  slots: Mutex<Vec<ProviderSlot>>,
  cooldown: Duration,
}

impl ProviderRegistry {
  /// Create a registry around `primary` with the default cooldown.
  pub fn new(primary: ProviderDescriptor) -> Self {
    Self {
      slots: Mutex::new(vec![ProviderSlot {
        descriptor: Arc::new(primary),
        active: true,
        health: Health::Eligible,
      }]),
      cooldown: DEFAULT_COOLDOWN,
    }
  }

  pub fn with_cooldown(mut self, cooldown: Duration) -> Self {
    self.cooldown = cooldown;
    self
  }

  /// Append a fallback. Inactive fallbacks stay on standby until the primary fails.
  pub fn with_fallback(self, descriptor: ProviderDescriptor, active: bool) -> Self {
    self
      .slots
      .lock()
      .unwrap_or_else(PoisonError::into_inner)
      .push(ProviderSlot {
        descriptor: Arc::new(descriptor),
        active,
        health: Health::Eligible,
      });
    self
  }

  /// Primary if eligible, else the first eligible fallback, else the primary anyway.
  pub fn best_eligible(&self) -> Arc<ProviderDescriptor> {
    let now = Instant::now();
    let slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);

    match slots.iter().find(|slot| slot.is_eligible(now)) {
      Some(slot) => Arc::clone(&slot.descriptor),
      None => {
        debug!("No eligible provider, falling back to primary");
        Arc::clone(&slots[0].descriptor)
      }
    }
  }

  /// Start the cooldown for `name`. A primary failure also resets every fallback.
  pub fn mark_failure(&self, name: &str, reason: &str) {
    let now = Instant::now();
    let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);

    let Some(index) = slots.iter().position(|s| s.descriptor.name == name) else {
      warn!(provider = %name, "Failure reported for unknown provider");
      return;
    };

    slots[index].health = Health::Cooling {
      since: now,
      until: now + self.cooldown,
      reason: reason.to_string(),
    };
    warn!(
      provider = %name,
      reason,
      cooldown_secs = self.cooldown.as_secs(),
      "Provider marked as failing"
    );

    if index == 0 {
      for slot in slots.iter_mut().skip(1) {
        slot.active = true;
        slot.health = Health::Eligible;
      }
      if slots.len() > 1 {
        info!(fallbacks = slots.len() - 1, "Primary failed, fallbacks reactivated");
      }
    }
  }

  /// Clear the error state of `name` only.
  pub fn mark_success(&self, name: &str) {
    let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
    if let Some(slot) = slots.iter_mut().find(|s| s.descriptor.name == name) {
      if slot.health != Health::Eligible {
        info!(provider = %name, "Provider recovered");
      }
      slot.health = Health::Eligible;
    }
  }

  pub fn is_eligible(&self, name: &str) -> bool {
    let now = Instant::now();
    let slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
    slots
      .iter()
      .any(|s| s.descriptor.name == name && s.is_eligible(now))
  }

  pub fn statuses(&self) -> Vec<ProviderStatus> {
    let now = Instant::now();
    let slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
    slots
      .iter()
      .enumerate()
      .map(|(index, slot)| {
        let (last_error, remaining) = match &slot.health {
          Health::Eligible => (None, None),
          Health::Cooling { until, reason, .. } => (
            Some(reason.clone()),
            Some(until.saturating_duration_since(now).as_secs()),
          ),
        };
        ProviderStatus {
          name: slot.descriptor.name.clone(),
          role: if index == 0 {
            ProviderRole::Primary
          } else {
            ProviderRole::Fallback
          },
          active: slot.active,
          eligible: slot.is_eligible(now),
          last_error,
          cooldown_remaining_secs: remaining,
        }
      })
      .collect()
  }
}
