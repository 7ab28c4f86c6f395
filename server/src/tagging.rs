//! Tag detection between the current tagger and every runner

use crate::registry::SessionRegistry;
use log::{debug, info};
use shared::Role;

/// What happens to the previous tagger when a runner gets tagged
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum TagPolicy {
    /// The old tagger keeps its role, so several taggers can coexist and more
    /// than one runner can flip in a single pass.
    #[default]
    #[value(name = "keep")]
    KeepPreviousTagger,
    /// The old tagger becomes a runner and the pass stops at the first tag.
    #[value(name = "demote")]
    DemotePreviousTagger,
}

/// Result of one resolution pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TagOutcome {
    /// Runners that became taggers, in registry order
    pub tagged: Vec<u32>,
    /// Runners in range that a shield protected
    pub blocked: Vec<u32>,
}

impl TagOutcome {
    pub fn is_empty(&self) -> bool {
        self.tagged.is_empty() && self.blocked.is_empty()
    }
}

/// Runs one tag resolution pass over the registry
///
/// The tagger is the first session holding the role. Runners are checked in
/// registry order against the tagger's position as read at the start of the
/// pass; shielded runners are skipped and the scan continues.
pub fn resolve_tags(registry: &SessionRegistry, policy: TagPolicy) -> TagOutcome {
    let mut outcome = TagOutcome::default();

    let Some(tagger) = registry.find_tagger() else {
        return outcome;
    };
    let chaser = tagger.player();

    for session in registry.snapshot() {
        if session.id() == tagger.id() {
            continue;
        }

        let flipped = session.with_player(|runner| {
            if runner.role != Role::Runner || !chaser.in_tag_range(runner) {
                return None;
            }
            if runner.shield {
                return Some(false);
            }
            runner.role = Role::Tagger;
            Some(true)
        });

        match flipped {
            Some(true) => {
                info!("Client {} tagged client {}", tagger.id(), session.id());
                outcome.tagged.push(session.id());

                if policy == TagPolicy::DemotePreviousTagger {
                    tagger.with_player(|old| old.role = Role::Runner);
                    break;
                }
            }
            Some(false) => {
                debug!("Shield blocked tag on client {}", session.id());
                outcome.blocked.push(session.id());
            }
            None => {}
        }
    }

    outcome
}
