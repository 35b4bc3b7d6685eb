use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

/// Reasons a session throws its tree away and materializes again.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RefreshTrigger {
    /// The editor navigated to a different root entry.
    RootChanged(String),
    /// The host reported that the root entry's sys metadata changed.
    EntrySystemChanged,
    /// A slide-in editor closed; a descendant may have been edited.
    EditorClosed(String),
    /// Explicit request, e.g. after a gateway write.
    Manual,
}

impl Display for RefreshTrigger {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        match self {
            RefreshTrigger::RootChanged(id) => write!(f, "RootChanged({id})"),
            RefreshTrigger::EntrySystemChanged => write!(f, "EntrySystemChanged"),
            RefreshTrigger::EditorClosed(id) => write!(f, "EditorClosed({id})"),
            RefreshTrigger::Manual => write!(f, "Manual"),
        }
    }
}

/// Events published by a [`TreeSession`](crate::session::TreeSession) to its listener.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TreeEvent {
    /// A materialization was started for (generation, root id).
    Started(u64, String),
    /// A materialization committed: (generation, root id, node count).
    Materialized(u64, String, usize),
    /// A finished materialization was discarded because a newer one started.
    Discarded(u64),
    /// Children dropped during a pass: (parent id, target id, reason).
    ChildDropped(String, String, String),
    /// A reference array was rewritten: (container id, field).
    ReferencesUpdated(String, String),
    /// A variant was cloned: (source id, clone id).
    VariantCloned(String, String),
}

impl Display for TreeEvent {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        match self {
            TreeEvent::Started(generation, root) => write!(f, "Started({generation}, {root})"),
            TreeEvent::Materialized(generation, root, count) => {
                write!(f, "Materialized({generation}, {root}, {count} nodes)")
            }
            TreeEvent::Discarded(generation) => write!(f, "Discarded({generation})"),
            TreeEvent::ChildDropped(parent, target, _) => {
                write!(f, "ChildDropped({parent} -> {target})")
            }
            TreeEvent::ReferencesUpdated(id, field) => {
                write!(f, "ReferencesUpdated({id}.{field})")
            }
            TreeEvent::VariantCloned(source, clone) => {
                write!(f, "VariantCloned({source} -> {clone})")
            }
        }
    }
}
