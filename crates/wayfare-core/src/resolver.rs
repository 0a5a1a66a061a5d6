//! Review decisions for merge suggestions.
//!
//! A suggestion starts `active` and ends either merged (the source group is
//! folded into the destination and deleted, taking the suggestion with it)
//! or dismissed (kept with `active = false` so the pair never resurfaces).
//! Requests against unknown or already-resolved suggestions are no-ops.

use crate::types::{GroupId, MergeSuggestion, SuggestionId};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolveAction {
    Merge,
    Dismiss,
}

/// Why a resolve request left everything as it was.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Unchanged {
    UnknownSuggestion,
    NotAuthorized,
    AlreadyResolved,
}

/// What the store has to do for a resolve request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolveStep {
    Merge { suggestion: SuggestionId, into: GroupId, from: GroupId },
    Dismiss { suggestion: SuggestionId },
    Skip(Unchanged),
}

/// Reported result of a resolve request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Resolution {
    Merged { into: GroupId, removed: GroupId },
    Dismissed { suggestion: SuggestionId },
    Unchanged { reason: Unchanged },
}

impl From<ResolveStep> for Resolution {
    fn from(step: ResolveStep) -> Self {
        match step {
            ResolveStep::Merge { into, from, .. } => Resolution::Merged { into, removed: from },
            ResolveStep::Dismiss { suggestion } => Resolution::Dismissed { suggestion },
            ResolveStep::Skip(reason) => Resolution::Unchanged { reason },
        }
    }
}

/// Decide how to handle a resolve request.
///
/// `authorized` says whether the actor owns or belongs to the suggestion's trip.
pub fn plan(
    suggestion: Option<&MergeSuggestion>,
    action: ResolveAction,
    authorized: bool,
) -> ResolveStep {
    let Some(suggestion) = suggestion else {
        return ResolveStep::Skip(Unchanged::UnknownSuggestion);
    };
    if !authorized {
        return ResolveStep::Skip(Unchanged::NotAuthorized);
    }
    if !suggestion.is_active() {
        return ResolveStep::Skip(Unchanged::AlreadyResolved);
    }

    match action {
        ResolveAction::Merge => ResolveStep::Merge {
            suggestion: suggestion.id,
            into: suggestion.destination(),
            from: suggestion.source(),
        },
        ResolveAction::Dismiss => ResolveStep::Dismiss { suggestion: suggestion.id },
    }
}

/// Whether `actor` may resolve suggestions for a trip with the given owner
/// and member contacts. Contacts compare case-insensitively.
pub fn is_participant<'a>(
    actor: &str,
    owner: &str,
    member_contacts: impl IntoIterator<Item = &'a str>,
) -> bool {
    let actor = actor.trim();
    if actor.is_empty() {
        return false;
    }
    owner.trim().eq_ignore_ascii_case(actor)
        || member_contacts
            .into_iter()
            .any(|c| c.trim().eq_ignore_ascii_case(actor))
}
