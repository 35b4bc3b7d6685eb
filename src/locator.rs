//! Resource locators for entries that live in another space.
//!
//! Locators look like `crn:contentful:::content:spaces/<space>/environments/<env>/entries/<id>`.
//! Only the last path segment is needed to look an entry up, but the full locator is kept on the
//! [`LinkDescriptor`](crate::properties::LinkDescriptor) so a reference can be written back in
//! the same shape it was read.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

use crate::error::ReftreeError;

pub const LOCATOR_PREFIX: &str = "crn:contentful:::content:";

static LOCATOR_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?P<scheme>[^/]+):spaces/(?P<space>[^/]+)/environments/(?P<env>[^/]+)/entries/(?P<id>[^/]+)$")
        .expect("static locator pattern")
});

/// Final `/`-separated segment of a locator. Inputs without a `/` are returned unchanged.
pub fn entry_id_from_urn(urn: &str) -> &str {
    urn.rsplit('/').next().unwrap_or(urn)
}

/// Space + environment pair that external references point into.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SpaceLocator {
    pub space_id: String,
    pub environment_id: String,
}

impl SpaceLocator {
    pub fn new<S: Into<String>, E: Into<String>>(space_id: S, environment_id: E) -> Self {
        SpaceLocator {
            space_id: space_id.into(),
            environment_id: environment_id.into(),
        }
    }

    pub fn entry(&self, entry_id: &str) -> EntryLocator {
        EntryLocator {
            space: self.clone(),
            entry_id: entry_id.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntryLocator {
    pub space: SpaceLocator,
    pub entry_id: String,
}

impl EntryLocator {
    pub fn parse(urn: &str) -> Result<EntryLocator, ReftreeError> {
        let caps = LOCATOR_RE
            .captures(urn)
            .ok_or_else(|| ReftreeError::Validation(format!("not an entry locator: {urn}")))?;
        Ok(EntryLocator {
            space: SpaceLocator::new(&caps["space"], &caps["env"]),
            entry_id: caps["id"].to_string(),
        })
    }
}

impl Display for EntryLocator {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "{LOCATOR_PREFIX}spaces/{}/environments/{}/entries/{}",
            self.space.space_id, self.space.environment_id, self.entry_id
        )
    }
}
