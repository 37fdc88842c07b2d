use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::warn;

/// What [`select_speakers`] does when no speaker reaches the minimum
/// duration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackPolicy {
    /// Keep every speaker.
    #[default]
    KeepAll,
    /// Keep nobody.
    KeepNone,
}

impl fmt::Display for FallbackPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::KeepAll => write!(f, "keep_all"),
            Self::KeepNone => write!(f, "keep_none"),
        }
    }
}

impl FromStr for FallbackPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "keep_all" => Ok(Self::KeepAll),
            "keep_none" => Ok(Self::KeepNone),
            other => Err(format!("unknown fallback policy {other:?}")),
        }
    }
}

/// Indices of the speakers whose total duration is at least `min_dur`.
pub fn select_speakers(durations: &[f64], min_dur: f64, fallback: FallbackPolicy) -> Vec<usize> {
    let kept: Vec<usize> = durations
        .iter()
        .enumerate()
        .filter(|&(_, &d)| d >= min_dur)
        .map(|(i, _)| i)
        .collect();
    if !kept.is_empty() || durations.is_empty() {
        return kept;
    }
    warn!(speakers = durations.len(), min_dur, policy = %fallback, "no speaker reaches the minimum duration");
    match fallback {
        FallbackPolicy::KeepAll => (0..durations.len()).collect(),
        FallbackPolicy::KeepNone => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_long_speakers() {
        let kept = select_speakers(&[12.0, 3.5, 10.0, 9.99], 10.0, FallbackPolicy::KeepAll);
        assert_eq!(kept, vec![0, 2]);
    }

    #[test]
    fn fallback_when_everyone_is_short() {
        let d = [1.0, 2.0, 3.0];
        assert_eq!(select_speakers(&d, 10.0, FallbackPolicy::KeepAll), vec![0, 1, 2]);
        assert!(select_speakers(&d, 10.0, FallbackPolicy::KeepNone).is_empty());
        assert!(select_speakers(&[], 10.0, FallbackPolicy::KeepAll).is_empty());
    }

    #[test]
    fn policy_names() {
        assert_eq!("keep_none".parse::<FallbackPolicy>().unwrap(), FallbackPolicy::KeepNone);
        assert_eq!(FallbackPolicy::default().to_string(), "keep_all");
    }
}
