use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::ModelError;

/// Role of an instance inside a deployment.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Runmode {
    Author,
    Publish,
    Dispatcher,
}

/// How an instance's storage is laid out.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VolumeLayout {
    /// Content repository on the instance's own claim.
    Repository,
    /// Farm and virtual-host configuration projected from the deployment's
    /// base configuration.
    DispatcherConfig,
}

/// Per-runmode behavior, looked up once instead of branching on labels.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RunmodeProfile {
    /// Port the instance serves (and is configured) on.
    pub port: u16,
    /// Readiness probe path.
    pub probe_path: &'static str,
    pub volume: VolumeLayout,
    /// Whether the instance gets a bootstrapped admin credential.
    pub has_credentials: bool,
}

const AUTHOR: RunmodeProfile = RunmodeProfile {
    port: 4502,
    probe_path: "/system/health?tags=shallow",
    volume: VolumeLayout::Repository,
    has_credentials: true,
};

const PUBLISH: RunmodeProfile = RunmodeProfile {
    port: 4503,
    probe_path: "/system/health?tags=shallow",
    volume: VolumeLayout::Repository,
    has_credentials: true,
};

const DISPATCHER: RunmodeProfile = RunmodeProfile {
    port: 80,
    probe_path: "/",
    volume: VolumeLayout::DispatcherConfig,
    has_credentials: false,
};

impl Runmode {
    /// All runmodes in reconciliation order.
    pub const ALL: [Runmode; 3] = [Runmode::Author, Runmode::Publish, Runmode::Dispatcher];

    /// Label value and name segment, e.g. `"publish"`.
    pub fn as_str(&self) -> &'static str {
        match self {
            Runmode::Author => "author",
            Runmode::Publish => "publish",
            Runmode::Dispatcher => "dispatcher",
        }
    }

    pub fn profile(&self) -> &'static RunmodeProfile {
        match self {
            Runmode::Author => &AUTHOR,
            Runmode::Publish => &PUBLISH,
            Runmode::Dispatcher => &DISPATCHER,
        }
    }
}

impl fmt::Display for Runmode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Runmode {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "author" => Ok(Runmode::Author),
            "publish" => Ok(Runmode::Publish),
            "dispatcher" => Ok(Runmode::Dispatcher),
            other => Err(ModelError::UnknownRunmode(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn profile_ports() {
        assert_eq!(Runmode::Author.profile().port, 4502);
        assert_eq!(Runmode::Publish.profile().port, 4503);
        assert_eq!(Runmode::Dispatcher.profile().port, 80);
    }

    #[test]
    fn only_aem_instances_carry_credentials() {
        assert!(Runmode::Author.profile().has_credentials);
        assert!(Runmode::Publish.profile().has_credentials);
        assert!(!Runmode::Dispatcher.profile().has_credentials);
    }

    #[test]
    fn parse_labels() {
        for mode in Runmode::ALL {
            assert_eq!(mode.as_str().parse::<Runmode>().unwrap(), mode);
        }
        assert!("publisher".parse::<Runmode>().is_err());
    }
}
